//! Decoding errors for the backend message stream.

use thiserror::Error;

/// A malformed or unsupported frame. Always fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The length field is below the 4-byte minimum it must include.
    #[error("frame length {0} is shorter than the 4-byte minimum")]
    FrameTooShort(i32),

    /// A message type byte this client does not recognise.
    #[error("unknown message type byte 0x{0:02x}")]
    UnknownMessageType(u8),

    /// An authentication request code this client does not recognise.
    #[error("unknown authentication request code {0}")]
    UnknownAuthCode(i32),

    /// The `ReadyForQuery` status byte was not one of I/T/E.
    #[error("unknown transaction status byte 0x{0:02x}")]
    UnknownTransactionStatus(u8),

    /// A payload ended before its declared contents.
    #[error("truncated {0} payload")]
    Truncated(&'static str),

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A string field was missing its NUL terminator.
    #[error("missing NUL terminator in {0}")]
    MissingTerminator(&'static str),
}
