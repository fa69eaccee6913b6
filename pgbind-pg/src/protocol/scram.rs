//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677), channel binding `n` only.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// GS2 header for "no channel binding".
const GS2_HEADER: &str = "n,,";
/// base64("n,,"), sent back in the client-final message.
const GS2_HEADER_B64: &str = "biws";

/// A failed SCRAM exchange. Always fatal to authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScramError {
    #[error("server message is not valid UTF-8")]
    NotUtf8,
    #[error("server-first message is missing its {0} attribute")]
    MissingAttribute(&'static str),
    #[error("server nonce does not extend the client nonce")]
    NonceMismatch,
    #[error("server salt is not valid base64")]
    BadSalt,
    #[error("iteration count is not a positive integer")]
    BadIterationCount,
    #[error("server-final message carries no verifier")]
    MissingVerifier,
    #[error("server signature is not valid base64")]
    BadVerifier,
    #[error("server signature mismatch")]
    SignatureMismatch,
    #[error("exchange is not far enough along to verify the server")]
    OutOfOrder,
}

/// Client side of one SCRAM-SHA-256 exchange.
pub struct ScramClient {
    username: String,
    password: String,
    client_nonce: String,
    auth_message: Option<String>,
    salted_password: Option<[u8; 32]>,
}

impl ScramClient {
    /// Create a client with a fresh random nonce: 18 random bytes,
    /// base64-encoded to 24 characters.
    pub fn new(username: &str, password: &str) -> Self {
        let mut raw = [0u8; 18];
        rand::rng().fill(&mut raw[..]);
        Self::with_nonce(username, password, BASE64.encode(raw))
    }

    fn with_nonce(username: &str, password: &str, client_nonce: String) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            client_nonce,
            auth_message: None,
            salted_password: None,
        }
    }

    /// The client-first message: `n,,n=<user>,r=<nonce>`.
    pub fn client_first_message(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare())
    }

    fn client_first_bare(&self) -> String {
        format!("n={},r={}", self.username, self.client_nonce)
    }

    /// Consume the server-first message and produce the client-final
    /// message `c=biws,r=<server_nonce>,p=<base64(proof)>`.
    pub fn client_final_message(&mut self, server_first: &[u8]) -> Result<String, ScramError> {
        let server_first = std::str::from_utf8(server_first).map_err(|_| ScramError::NotUtf8)?;

        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;
        for part in server_first.split(',') {
            if let Some(value) = part.strip_prefix("r=") {
                nonce = Some(value.to_string());
            } else if let Some(value) = part.strip_prefix("s=") {
                salt = Some(BASE64.decode(value).map_err(|_| ScramError::BadSalt)?);
            } else if let Some(value) = part.strip_prefix("i=") {
                iterations =
                    Some(value.parse::<u32>().map_err(|_| ScramError::BadIterationCount)?);
            }
        }
        let nonce = nonce.ok_or(ScramError::MissingAttribute("r"))?;
        let salt = salt.ok_or(ScramError::MissingAttribute("s"))?;
        let iterations = iterations.ok_or(ScramError::MissingAttribute("i"))?;

        if !nonce.starts_with(&self.client_nonce) {
            return Err(ScramError::NonceMismatch);
        }
        if iterations == 0 {
            return Err(ScramError::BadIterationCount);
        }

        let mut salted_password = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            self.password.as_bytes(),
            &salt,
            iterations,
            &mut salted_password,
        );
        self.salted_password = Some(salted_password);

        let client_key = hmac(&salted_password, b"Client Key");
        let stored_key = Sha256::digest(&client_key);

        let client_final_without_proof = format!("c={},r={}", GS2_HEADER_B64, nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            client_final_without_proof
        );

        let client_signature = hmac(stored_key.as_slice(), auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();
        self.auth_message = Some(auth_message);

        Ok(format!(
            "{},p={}",
            client_final_without_proof,
            BASE64.encode(proof)
        ))
    }

    /// Check the server-final `v=<signature>` against the expected
    /// ServerSignature. A mismatch means the server never knew the
    /// password.
    pub fn verify_server_final(&self, server_final: &[u8]) -> Result<(), ScramError> {
        let server_final = std::str::from_utf8(server_final).map_err(|_| ScramError::NotUtf8)?;
        let verifier = server_final
            .strip_prefix("v=")
            .ok_or(ScramError::MissingVerifier)?;
        let received = BASE64
            .decode(verifier.trim_end())
            .map_err(|_| ScramError::BadVerifier)?;

        let salted_password = self.salted_password.ok_or(ScramError::OutOfOrder)?;
        let auth_message = self.auth_message.as_ref().ok_or(ScramError::OutOfOrder)?;

        let server_key = hmac(&salted_password, b"Server Key");
        let expected = hmac(&server_key, auth_message.as_bytes());
        if expected.as_slice() != received.as_slice() {
            return Err(ScramError::SignatureMismatch);
        }
        Ok(())
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7677 §3 example exchange.
    const USER: &str = "user";
    const PASSWORD: &str = "pencil";
    const CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const SERVER_FIRST: &[u8] =
        b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
    const SERVER_FINAL: &[u8] = b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

    fn rfc_client() -> ScramClient {
        ScramClient::with_nonce(USER, PASSWORD, CLIENT_NONCE.to_string())
    }

    #[test]
    fn client_first_message_carries_gs2_header() {
        let client = rfc_client();
        assert_eq!(
            client.client_first_message(),
            "n,,n=user,r=rOprNGfwEbeRWgbNEkqO"
        );
    }

    #[test]
    fn random_nonce_is_24_chars() {
        let client = ScramClient::new(USER, PASSWORD);
        assert_eq!(client.client_nonce.len(), 24);
    }

    #[test]
    fn produces_rfc_7677_proof() {
        let mut client = rfc_client();
        let final_message = client.client_final_message(SERVER_FIRST).unwrap();
        assert_eq!(
            final_message,
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
             p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );
    }

    #[test]
    fn accepts_rfc_7677_server_signature() {
        let mut client = rfc_client();
        client.client_final_message(SERVER_FIRST).unwrap();
        client.verify_server_final(SERVER_FINAL).unwrap();
    }

    #[test]
    fn rejects_forged_server_signature() {
        let mut client = rfc_client();
        client.client_final_message(SERVER_FIRST).unwrap();
        let err = client
            .verify_server_final(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
            .unwrap_err();
        assert_eq!(err, ScramError::SignatureMismatch);
    }

    #[test]
    fn rejects_server_nonce_that_drops_the_client_prefix() {
        let mut client = rfc_client();
        let err = client
            .client_final_message(b"r=somebodyElsesNonce,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096")
            .unwrap_err();
        assert_eq!(err, ScramError::NonceMismatch);
    }

    #[test]
    fn rejects_zero_iterations() {
        let mut client = rfc_client();
        let err = client
            .client_final_message(
                b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=0",
            )
            .unwrap_err();
        assert_eq!(err, ScramError::BadIterationCount);
    }

    #[test]
    fn rejects_garbage_salt() {
        let mut client = rfc_client();
        let err = client
            .client_final_message(b"r=rOprNGfwEbeRWgbNEkqOxyz,s=!!!,i=4096")
            .unwrap_err();
        assert_eq!(err, ScramError::BadSalt);
    }

    #[test]
    fn verify_before_final_is_out_of_order() {
        let client = rfc_client();
        let err = client.verify_server_final(SERVER_FINAL).unwrap_err();
        assert_eq!(err, ScramError::OutOfOrder);
    }
}
