//! PostgreSQL wire protocol (version 3).
//!
//! Pure, synchronous computation: frontend message encoding, backend
//! message decoding, and the SCRAM-SHA-256 exchange. The async I/O layer
//! in `driver` consumes these.

mod error;
pub mod scram;
mod wire;

pub use error::ProtocolError;
pub use scram::ScramClient;
pub use wire::{
    BackendMessage, DescribeTarget, ErrorFields, FrontendMessage, RowField, TransactionStatus,
};

/// Protocol version 3.0.
pub const PROTOCOL_VERSION: i32 = 196608;
