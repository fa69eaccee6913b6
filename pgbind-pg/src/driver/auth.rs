//! Authentication dispatch during the startup handshake.
//!
//! The server's first authentication request selects the mechanism:
//! trust (`AuthOk`), cleartext, MD5, or SASL with SCRAM-SHA-256. Anything
//! else is unsupported and fatal.

use super::{PgConnection, PgError, PgResult};
use crate::protocol::{BackendMessage, FrontendMessage, ScramClient};
use md5::{Digest, Md5};
use tracing::{debug, warn};

const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

/// Drive the post-startup message loop until `ReadyForQuery`, answering
/// authentication requests along the way.
pub(crate) async fn authenticate(
    conn: &mut PgConnection,
    user: &str,
    password: Option<&str>,
) -> PgResult<()> {
    let mut scram: Option<ScramClient> = None;

    loop {
        match conn.recv().await? {
            BackendMessage::AuthOk => {
                debug!("authentication ok");
            }
            BackendMessage::AuthCleartext => {
                debug!("server requested cleartext password");
                let password = required(password)?;
                conn.send(&FrontendMessage::Password(password.to_string()))
                    .await?;
            }
            BackendMessage::AuthMd5 { salt } => {
                debug!("server requested md5 password");
                let password = required(password)?;
                conn.send(&FrontendMessage::Password(md5_response(user, password, &salt)))
                    .await?;
            }
            BackendMessage::AuthSasl { mechanisms } => {
                debug!(?mechanisms, "server requested SASL");
                let password = required(password)?;
                if !mechanisms.iter().any(|m| m == SCRAM_SHA_256) {
                    return Err(PgError::Auth(format!(
                        "server offers no supported SASL mechanism (got {mechanisms:?})"
                    )));
                }
                let client = ScramClient::new(user, password);
                conn.send(&FrontendMessage::SaslInitialResponse {
                    mechanism: SCRAM_SHA_256.to_string(),
                    data: client.client_first_message().into_bytes(),
                })
                .await?;
                scram = Some(client);
            }
            BackendMessage::AuthSaslContinue { data } => {
                let client = scram
                    .as_mut()
                    .ok_or_else(|| PgError::Auth("SASL continue before SASL start".to_string()))?;
                let final_message = client
                    .client_final_message(&data)
                    .map_err(|e| PgError::Auth(e.to_string()))?;
                conn.send(&FrontendMessage::SaslResponse(final_message.into_bytes()))
                    .await?;
            }
            BackendMessage::AuthSaslFinal { data } => {
                let client = scram
                    .as_ref()
                    .ok_or_else(|| PgError::Auth("SASL final before SASL start".to_string()))?;
                client
                    .verify_server_final(&data)
                    .map_err(|e| PgError::Auth(e.to_string()))?;
                debug!("server signature verified");
            }
            BackendMessage::ParameterStatus { .. } => {}
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => {
                conn.process_id = process_id;
                conn.secret_key = secret_key;
            }
            BackendMessage::NoticeResponse(notice) => {
                warn!(message = notice.message(), "server notice during startup");
            }
            BackendMessage::ReadyForQuery(_) => return Ok(()),
            BackendMessage::ErrorResponse(fields) => {
                return Err(PgError::Auth(fields.message().to_string()));
            }
            other => {
                return Err(PgError::Auth(format!(
                    "unsupported authentication flow (unexpected {other:?})"
                )));
            }
        }
    }
}

fn required(password: Option<&str>) -> PgResult<&str> {
    password.ok_or_else(|| PgError::Auth("server requires a password, none configured".to_string()))
}

/// The MD5 password response:
/// `"md5" + hex(md5(hex(md5(password + user)) + salt))`.
fn md5_response(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let mut inner = Md5::new();
    inner.update(password.as_bytes());
    inner.update(user.as_bytes());
    let inner_hex = hex::encode(inner.finalize());

    let mut outer = Md5::new();
    outer.update(inner_hex.as_bytes());
    outer.update(salt);
    format!("md5{}", hex::encode(outer.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_response_matches_known_vector() {
        // md5(hex(md5("pencil" + "user")) + 0x01020304)
        assert_eq!(
            md5_response("user", "pencil", &[1, 2, 3, 4]),
            "md54376eb6913b38f9aaff38dc7cf19ca76"
        );
    }

    #[test]
    fn md5_response_is_prefixed_and_hex() {
        let resp = md5_response("alice", "secret", &[0, 0, 0, 0]);
        assert!(resp.starts_with("md5"));
        assert_eq!(resp.len(), 35);
        assert!(resp[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
