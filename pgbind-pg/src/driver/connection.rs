//! The owning PostgreSQL session: TCP stream, buffers, startup handshake.

use super::{auth, PgError, PgResult};
use crate::protocol::FrontendMessage;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, trace};

/// Initial receive/send buffer capacity.
pub(crate) const BUFFER_CAPACITY: usize = 16 * 1024;

/// A raw PostgreSQL connection, authenticated and ready for queries.
pub struct PgConnection {
    pub(crate) stream: TcpStream,
    pub(crate) buffer: BytesMut,
    pub(crate) write_buf: BytesMut,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) process_id: i32,
    pub(crate) secret_key: i32,
}

impl PgConnection {
    /// Open a TCP connection, run the startup handshake and whatever
    /// authentication the server asks for, and wait for `ReadyForQuery`.
    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: Option<&str>,
        database: &str,
    ) -> PgResult<Self> {
        let addr = format!("{host}:{port}");
        debug!(addr = %addr, user = %user, database = %database, "connecting");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| PgError::Connection(format!("cannot reach {addr}: {e}")))?;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream,
            buffer: BytesMut::with_capacity(BUFFER_CAPACITY),
            write_buf: BytesMut::with_capacity(BUFFER_CAPACITY),
            read_timeout: None,
            process_id: 0,
            secret_key: 0,
        };

        conn.send(&FrontendMessage::Startup {
            user: user.to_string(),
            database: database.to_string(),
        })
        .await?;

        auth::authenticate(&mut conn, user, password).await?;
        debug!(process_id = conn.process_id, "connection ready");
        Ok(conn)
    }

    /// Apply a deadline to every subsequent socket read.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Backend process id, for diagnostics.
    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    /// Gracefully end the session: Terminate, then close the socket.
    pub async fn close(mut self) -> PgResult<()> {
        trace!("sending Terminate");
        let bytes = FrontendMessage::Terminate.encode();
        self.stream.write_all(&bytes).await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Best-effort Terminate when the connection is dropped without `close()`,
/// so the server does not log an unexpected EOF.
impl Drop for PgConnection {
    fn drop(&mut self) {
        let terminate: [u8; 5] = [b'X', 0, 0, 0, 4];
        let _ = self.stream.try_write(&terminate);
    }
}
