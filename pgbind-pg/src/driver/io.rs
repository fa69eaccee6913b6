//! Core send/receive for the connection.

use super::{PgConnection, PgError, PgResult};
use crate::protocol::{BackendMessage, FrontendMessage};
use bytes::Buf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

impl PgConnection {
    /// Encode and write one message immediately.
    pub(crate) async fn send(&mut self, msg: &FrontendMessage) -> PgResult<()> {
        let bytes = msg.encode();
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    /// Stage a message in the send buffer; `flush()` writes the batch.
    pub(crate) fn buffer_msg(&mut self, msg: &FrontendMessage) {
        let bytes = msg.encode();
        self.write_buf.extend_from_slice(&bytes);
    }

    /// Write the whole staged batch in one syscall.
    pub(crate) async fn flush(&mut self) -> PgResult<()> {
        if !self.write_buf.is_empty() {
            self.stream.write_all(&self.write_buf).await?;
            self.write_buf.clear();
        }
        Ok(())
    }

    /// Receive one backend message, refilling the buffer from the socket
    /// as needed. Consumed bytes are recycled; decoded payloads are owned.
    pub(crate) async fn recv(&mut self) -> PgResult<BackendMessage> {
        loop {
            if let Some((msg, consumed)) = BackendMessage::decode(&self.buffer)? {
                self.buffer.advance(consumed);
                trace!(?msg, "recv");
                return Ok(msg);
            }

            if self.buffer.capacity() - self.buffer.len() < 4096 {
                self.buffer.reserve(super::connection::BUFFER_CAPACITY);
            }
            let n = match self.read_timeout {
                Some(deadline) => tokio::time::timeout(deadline, self.stream.read_buf(&mut self.buffer))
                    .await
                    .map_err(|_| PgError::Connection("read timed out".to_string()))??,
                None => self.stream.read_buf(&mut self.buffer).await?,
            };
            if n == 0 {
                return Err(PgError::Connection(
                    "connection closed by server".to_string(),
                ));
            }
        }
    }

    /// Receive messages up to and including the next `ReadyForQuery`.
    pub(crate) async fn recv_until_ready(&mut self) -> PgResult<Vec<BackendMessage>> {
        let mut messages = Vec::new();
        loop {
            let msg = self.recv().await?;
            let done = matches!(msg, BackendMessage::ReadyForQuery(_));
            messages.push(msg);
            if done {
                return Ok(messages);
            }
        }
    }
}
