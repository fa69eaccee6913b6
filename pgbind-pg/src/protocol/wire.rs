//! Frontend message encoding and backend message decoding.
//!
//! Reference: https://www.postgresql.org/docs/current/protocol-message-formats.html
//!
//! All multi-byte integers are big-endian. Framing is
//! `[type byte][int32 length-including-itself][payload]`; StartupMessage
//! alone has no type byte. Decoded payloads are owned values, so the
//! receive buffer can be recycled between reads.

use super::{ProtocolError, PROTOCOL_VERSION};
use bytes::BytesMut;

/// What a Describe / Close message addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeTarget {
    Statement,
    Portal,
}

impl DescribeTarget {
    fn as_byte(self) -> u8 {
        match self {
            DescribeTarget::Statement => b'S',
            DescribeTarget::Portal => b'P',
        }
    }
}

/// Frontend (client → server) messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    /// Sent first; carries the protocol version and session parameters.
    Startup { user: String, database: String },
    /// Cleartext or MD5 password response.
    Password(String),
    /// First message of a SASL exchange: mechanism plus initial response.
    SaslInitialResponse { mechanism: String, data: Vec<u8> },
    /// Subsequent SASL message: raw response bytes.
    SaslResponse(Vec<u8>),
    /// Prepare a statement. No parameter-type hints are sent; the server
    /// infers every `$n`.
    Parse { statement: String, sql: String },
    /// Ask for a statement's parameter and row shapes.
    Describe { target: DescribeTarget, name: String },
    /// Release a prepared statement or portal.
    Close { target: DescribeTarget, name: String },
    /// End of an extended-protocol batch.
    Sync,
    /// Simple query protocol.
    Query(String),
    Terminate,
}

impl FrontendMessage {
    /// Encode to wire bytes.
    pub fn encode(&self) -> BytesMut {
        match self {
            FrontendMessage::Startup { user, database } => {
                let mut content = Vec::new();
                content.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
                put_cstr(&mut content, "user");
                put_cstr(&mut content, user);
                put_cstr(&mut content, "database");
                put_cstr(&mut content, database);
                content.push(0);

                let mut buf = BytesMut::with_capacity(content.len() + 4);
                buf.extend_from_slice(&((content.len() + 4) as i32).to_be_bytes());
                buf.extend_from_slice(&content);
                buf
            }
            FrontendMessage::Password(password) => {
                let mut content = Vec::with_capacity(password.len() + 1);
                put_cstr(&mut content, password);
                frame(b'p', &content)
            }
            FrontendMessage::SaslInitialResponse { mechanism, data } => {
                let mut content = Vec::with_capacity(mechanism.len() + data.len() + 5);
                put_cstr(&mut content, mechanism);
                content.extend_from_slice(&(data.len() as i32).to_be_bytes());
                content.extend_from_slice(data);
                frame(b'p', &content)
            }
            FrontendMessage::SaslResponse(data) => frame(b'p', data),
            FrontendMessage::Parse { statement, sql } => {
                let mut content = Vec::with_capacity(statement.len() + sql.len() + 4);
                put_cstr(&mut content, statement);
                put_cstr(&mut content, sql);
                content.extend_from_slice(&0i16.to_be_bytes());
                frame(b'P', &content)
            }
            FrontendMessage::Describe { target, name } => {
                let mut content = Vec::with_capacity(name.len() + 2);
                content.push(target.as_byte());
                put_cstr(&mut content, name);
                frame(b'D', &content)
            }
            FrontendMessage::Close { target, name } => {
                let mut content = Vec::with_capacity(name.len() + 2);
                content.push(target.as_byte());
                put_cstr(&mut content, name);
                frame(b'C', &content)
            }
            FrontendMessage::Sync => frame(b'S', &[]),
            FrontendMessage::Query(sql) => {
                let mut content = Vec::with_capacity(sql.len() + 1);
                put_cstr(&mut content, sql);
                frame(b'Q', &content)
            }
            FrontendMessage::Terminate => frame(b'X', &[]),
        }
    }
}

fn put_cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn frame(msg_type: u8, content: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(content.len() + 5);
    buf.extend_from_slice(&[msg_type]);
    buf.extend_from_slice(&((content.len() + 4) as i32).to_be_bytes());
    buf.extend_from_slice(content);
    buf
}

/// Transaction status delivered with `ReadyForQuery`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// 'I'
    Idle,
    /// 'T'
    InBlock,
    /// 'E'
    Failed,
}

/// One field of a `RowDescription`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowField {
    pub name: String,
    /// Originating table OID; 0 for computed expressions.
    pub table_oid: u32,
    /// Originating attribute number; <= 0 for computed expressions.
    pub column_attr: i16,
    pub type_oid: u32,
    pub type_len: i16,
    pub type_mod: i32,
    pub format_code: i16,
}

/// The `(code_byte, value)` pairs of an ErrorResponse / NoticeResponse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields(pub Vec<(u8, String)>);

impl ErrorFields {
    pub fn get(&self, code: u8) -> Option<&str> {
        self.0
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }

    /// The server's `M` field; every ErrorResponse carries one.
    pub fn message(&self) -> &str {
        self.get(b'M').unwrap_or("unknown server error")
    }

    /// The optional `D` detail field.
    pub fn detail(&self) -> Option<&str> {
        self.get(b'D')
    }

    pub fn severity(&self) -> Option<&str> {
        self.get(b'S')
    }

    /// The SQLSTATE `C` field.
    pub fn sqlstate(&self) -> Option<&str> {
        self.get(b'C')
    }
}

/// Backend (server → client) messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    AuthOk,
    AuthCleartext,
    AuthMd5 { salt: [u8; 4] },
    AuthSasl { mechanisms: Vec<String> },
    AuthSaslContinue { data: Vec<u8> },
    AuthSaslFinal { data: Vec<u8> },
    ParameterStatus { name: String, value: String },
    BackendKeyData { process_id: i32, secret_key: i32 },
    ReadyForQuery(TransactionStatus),
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    ParameterDescription { type_oids: Vec<u32> },
    RowDescription { fields: Vec<RowField> },
    DataRow { columns: Vec<Option<Vec<u8>>> },
    CommandComplete { tag: String },
    ErrorResponse(ErrorFields),
    NoticeResponse(ErrorFields),
    EmptyQueryResponse,
}

impl BackendMessage {
    /// Decode one message from the front of `buf`.
    ///
    /// `Ok(Some((msg, consumed)))` when a whole frame is buffered;
    /// `Ok(None)` when more bytes are needed; `Err` on a malformed frame.
    pub fn decode(buf: &[u8]) -> Result<Option<(BackendMessage, usize)>, ProtocolError> {
        if buf.len() < 5 {
            return Ok(None);
        }
        let msg_type = buf[0];
        let msg_len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        if msg_len < 4 {
            return Err(ProtocolError::FrameTooShort(msg_len));
        }
        let total = 1 + msg_len as usize;
        if buf.len() < total {
            return Ok(None);
        }
        let payload = &buf[5..total];

        let message = match msg_type {
            b'R' => decode_auth(payload)?,
            b'S' => {
                let mut r = Reader::new(payload, "ParameterStatus");
                BackendMessage::ParameterStatus {
                    name: r.cstr()?.to_string(),
                    value: r.cstr()?.to_string(),
                }
            }
            b'K' => {
                let mut r = Reader::new(payload, "BackendKeyData");
                BackendMessage::BackendKeyData {
                    process_id: r.i32()?,
                    secret_key: r.i32()?,
                }
            }
            b'Z' => {
                let mut r = Reader::new(payload, "ReadyForQuery");
                let status = match r.u8()? {
                    b'I' => TransactionStatus::Idle,
                    b'T' => TransactionStatus::InBlock,
                    b'E' => TransactionStatus::Failed,
                    other => return Err(ProtocolError::UnknownTransactionStatus(other)),
                };
                BackendMessage::ReadyForQuery(status)
            }
            b'1' => BackendMessage::ParseComplete,
            b'2' => BackendMessage::BindComplete,
            b'3' => BackendMessage::CloseComplete,
            b'n' => BackendMessage::NoData,
            b't' => decode_parameter_description(payload)?,
            b'T' => decode_row_description(payload)?,
            b'D' => decode_data_row(payload)?,
            b'C' => {
                let mut r = Reader::new(payload, "CommandComplete");
                BackendMessage::CommandComplete {
                    tag: r.cstr()?.to_string(),
                }
            }
            b'E' => BackendMessage::ErrorResponse(decode_error_fields(payload)?),
            b'N' => BackendMessage::NoticeResponse(decode_error_fields(payload)?),
            b'I' => BackendMessage::EmptyQueryResponse,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        };

        Ok(Some((message, total)))
    }
}

fn decode_auth(payload: &[u8]) -> Result<BackendMessage, ProtocolError> {
    let mut r = Reader::new(payload, "Authentication");
    let code = r.i32()?;
    let message = match code {
        0 => BackendMessage::AuthOk,
        3 => BackendMessage::AuthCleartext,
        5 => {
            let salt = r.bytes(4)?;
            BackendMessage::AuthMd5 {
                salt: [salt[0], salt[1], salt[2], salt[3]],
            }
        }
        10 => {
            let mut mechanisms = Vec::new();
            while r.peek() != Some(0) && !r.is_empty() {
                mechanisms.push(r.cstr()?.to_string());
            }
            BackendMessage::AuthSasl { mechanisms }
        }
        11 => BackendMessage::AuthSaslContinue {
            data: r.rest().to_vec(),
        },
        12 => BackendMessage::AuthSaslFinal {
            data: r.rest().to_vec(),
        },
        other => return Err(ProtocolError::UnknownAuthCode(other)),
    };
    Ok(message)
}

fn decode_parameter_description(payload: &[u8]) -> Result<BackendMessage, ProtocolError> {
    let mut r = Reader::new(payload, "ParameterDescription");
    let count = r.i16()? as usize;
    let mut type_oids = Vec::with_capacity(count);
    for _ in 0..count {
        type_oids.push(r.u32()?);
    }
    Ok(BackendMessage::ParameterDescription { type_oids })
}

fn decode_row_description(payload: &[u8]) -> Result<BackendMessage, ProtocolError> {
    let mut r = Reader::new(payload, "RowDescription");
    let count = r.i16()? as usize;
    let mut fields = Vec::with_capacity(count);
    for _ in 0..count {
        fields.push(RowField {
            name: r.cstr()?.to_string(),
            table_oid: r.u32()?,
            column_attr: r.i16()?,
            type_oid: r.u32()?,
            type_len: r.i16()?,
            type_mod: r.i32()?,
            format_code: r.i16()?,
        });
    }
    Ok(BackendMessage::RowDescription { fields })
}

fn decode_data_row(payload: &[u8]) -> Result<BackendMessage, ProtocolError> {
    let mut r = Reader::new(payload, "DataRow");
    let count = r.i16()? as usize;
    let mut columns = Vec::with_capacity(count);
    for _ in 0..count {
        let len = r.i32()?;
        if len == -1 {
            columns.push(None);
        } else {
            columns.push(Some(r.bytes(len as usize)?.to_vec()));
        }
    }
    Ok(BackendMessage::DataRow { columns })
}

fn decode_error_fields(payload: &[u8]) -> Result<ErrorFields, ProtocolError> {
    let mut r = Reader::new(payload, "ErrorResponse");
    let mut fields = Vec::new();
    loop {
        let code = match r.peek() {
            None | Some(0) => break,
            Some(code) => code,
        };
        r.u8()?;
        fields.push((code, r.cstr()?.to_string()));
    }
    Ok(ErrorFields(fields))
}

/// Bounds-checked payload cursor; every miss is a `ProtocolError`.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    ctx: &'static str,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], ctx: &'static str) -> Self {
        Self { buf, pos: 0, ctx }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ProtocolError::Truncated(self.ctx))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.bytes(1)?[0])
    }

    fn i16(&mut self) -> Result<i16, ProtocolError> {
        let b = self.bytes(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        let b = self.bytes(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn cstr(&mut self) -> Result<&'a str, ProtocolError> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::MissingTerminator(self.ctx))?;
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|_| ProtocolError::InvalidUtf8(self.ctx))?;
        self.pos += nul + 1;
        Ok(s)
    }
}
