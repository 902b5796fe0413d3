//! Session messages — inbound control records.
//!
//! | Type | Message              | Length (with delimiter) |
//! |------|----------------------|-------------------------|
//! | `A`  | login accepted       | 12                      |
//! | `J`  | login rejected       | 22                      |
//! | `H`  | heartbeat            | 2                       |
//! | `E`  | error notification   | 102                     |
//! | `S`  | sequenced data       | variable                |
//!
//! A sequenced-data record carries an embedded [`super::sequenced`] message
//! after a fixed sub-header; `S` immediately followed by the delimiter marks
//! the end of the session.

use super::{CodecError, CodecResult, Message, type_name};

/// Bytes between the start of a sequenced-data record and its embedded message.
pub const SEQUENCED_HEADER_LEN: usize = 10;

/// Inbound control record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionType {
    LoginAccepted = b'A',
    LoginRejected = b'J',
    Heartbeat = b'H',
    SequencedData = b'S',
    ErrorNotification = b'E',
}

impl SessionType {
    pub fn from_byte(byte: u8) -> CodecResult<Self> {
        match byte {
            b'A' => Ok(Self::LoginAccepted),
            b'J' => Ok(Self::LoginRejected),
            b'H' => Ok(Self::Heartbeat),
            b'S' => Ok(Self::SequencedData),
            b'E' => Ok(Self::ErrorNotification),
            other => Err(CodecError::UnknownMessage(format!(
                "Wrong session message: unknown type ({})",
                type_name(other)
            ))),
        }
    }

    /// Full record length in bytes, or `0` for variable-length records.
    pub const fn size(self) -> usize {
        match self {
            Self::LoginAccepted => 11 + 1,
            Self::LoginRejected => 21 + 1,
            Self::Heartbeat => 1 + 1,
            Self::SequencedData => 0,
            Self::ErrorNotification => 101 + 1,
        }
    }
}

/// Smallest possible answer to a login request.
pub const LOGIN_RESPONSE_MIN: usize = min(SessionType::LoginAccepted.size(), SessionType::LoginRejected.size());
/// Largest possible answer to a login request.
pub const LOGIN_RESPONSE_MAX: usize = max(SessionType::LoginAccepted.size(), SessionType::LoginRejected.size());

const fn min(a: usize, b: usize) -> usize {
    if a < b { a } else { b }
}

const fn max(a: usize, b: usize) -> usize {
    if a > b { a } else { b }
}

/// A fixed-length session record whose size matches its type.
#[derive(Debug, Clone, Copy)]
pub struct SessionMessage<'a> {
    message: Message<'a>,
    kind: SessionType,
}

impl<'a> SessionMessage<'a> {
    pub fn parse(bytes: &'a [u8]) -> CodecResult<Self> {
        let message = Message::new(bytes)?;
        let kind = SessionType::from_byte(message.abstract_type())?;
        if kind.size() != message.len() {
            return Err(CodecError::format("Wrong session message: wrong size"));
        }
        Ok(Self { message, kind })
    }

    pub fn kind(&self) -> SessionType {
        self.kind
    }

    /// Reason text of a login rejection.
    pub fn reject_reason(&self) -> CodecResult<&'a str> {
        self.message.parse_str(1, 20)
    }

    /// Text of an error notification.
    pub fn error_text(&self) -> CodecResult<&'a str> {
        self.message.parse_str(1, 100)
    }
}
