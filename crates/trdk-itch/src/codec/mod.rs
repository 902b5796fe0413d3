//! ITCH message framing and field codec.
//!
//! Every record on the wire is ASCII, fixed-width and terminated by a single
//! delimiter byte (`0x0A`). The first byte is the *abstract type*, whose
//! meaning depends on the message family:
//!
//! | Family      | Direction | Module        |
//! |-------------|-----------|---------------|
//! | Session     | inbound   | [`session`]   |
//! | Client      | outbound  | [`request`]   |
//! | Sequenced   | inbound   | [`sequenced`] |
//!
//! Fields are addressed by `(offset, size)` windows inside the payload and are
//! padded with spaces. This module provides the shared framing rule, the field
//! parsers of [`Message`] and the field writers of [`MessageBuilder`]. No I/O.

pub mod request;
pub mod sequenced;
pub mod session;

use thiserror::Error;
use trdk_core::OrderId;

/// Terminator of every framed record.
pub const DELIMITER: u8 = 0x0A;

/// Codec errors.
///
/// `Format` means the bytes are corrupt (wrong size, delimiter or field
/// content). `UnknownMessage` means the type byte is not recognised, which may
/// point at a protocol version mismatch rather than corruption.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("message format error: {0}")]
    Format(String),

    #[error("unknown message: {0}")]
    UnknownMessage(String),

    #[error("failed to store \"{value}\" into message field ({offset}, {size}): value is too long")]
    FieldOverflow { offset: usize, size: usize, value: String },

    #[error("message field ({offset}, {size}) does not round-trip")]
    RoundTrip { offset: usize, size: usize },
}

impl CodecError {
    pub(crate) fn format(what: impl Into<String>) -> Self {
        Self::Format(what.into())
    }
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Printable form of a type byte for error messages.
pub(crate) fn type_name(byte: u8) -> String {
    byte.escape_ascii().to_string()
}

// ---------------------------------------------------------------------------
// Message — validated read-only view
// ---------------------------------------------------------------------------

/// A framed record: type byte at offset 0, delimiter at the last offset.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    bytes: &'a [u8],
}

impl<'a> Message<'a> {
    /// Validate the framing rule and wrap `bytes`.
    pub fn new(bytes: &'a [u8]) -> CodecResult<Self> {
        if bytes.len() < 2 {
            return Err(CodecError::format("Wrong message: buffer is empty"));
        }
        if bytes[bytes.len() - 1] != DELIMITER {
            return Err(CodecError::format("Wrong message: wrong delimiter"));
        }
        Ok(Self { bytes })
    }

    #[inline]
    pub fn abstract_type(&self) -> u8 {
        self.bytes[0]
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false`: a framed message holds at least a type and a delimiter.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Raw field window; must lie between the type byte and the delimiter.
    pub fn field(&self, offset: usize, size: usize) -> CodecResult<&'a [u8]> {
        if offset == 0 || size == 0 || offset + size > self.bytes.len() - 1 {
            return Err(CodecError::Format(format!(
                "Field ({offset}, {size}) is out of message with size {}",
                self.bytes.len()
            )));
        }
        Ok(&self.bytes[offset..offset + size])
    }

    /// Field as text with padding spaces trimmed.
    pub fn parse_str(&self, offset: usize, size: usize) -> CodecResult<&'a str> {
        let raw = self.field(offset, size)?;
        std::str::from_utf8(raw)
            .map(str::trim)
            .map_err(|_| CodecError::format("Failed to parse field with type String"))
    }

    /// Field as a C-string style token: everything up to the first space.
    pub fn parse_token(&self, offset: usize, size: usize) -> CodecResult<&'a str> {
        let raw = self.field(offset, size)?;
        let end = raw.iter().position(|&b| b == b' ').unwrap_or(raw.len());
        std::str::from_utf8(&raw[..end])
            .map_err(|_| CodecError::format("Failed to parse field with type Token"))
    }

    pub fn parse_i32(&self, offset: usize, size: usize) -> CodecResult<i32> {
        self.parse_number(offset, size, "Integer")
    }

    pub fn parse_order_id(&self, offset: usize, size: usize) -> CodecResult<OrderId> {
        self.parse_number(offset, size, "Order ID")
    }

    pub fn parse_f64(&self, offset: usize, size: usize) -> CodecResult<f64> {
        let text = self.parse_str(offset, size)?;
        if text.is_empty() {
            return Err(CodecError::format("Failed to parse field with type Double"));
        }
        fast_float2::parse(text)
            .map_err(|_| CodecError::format("Failed to parse field with type Double"))
    }

    pub fn parse_bool(&self, offset: usize) -> CodecResult<bool> {
        match self.parse_char(offset)? {
            b'T' => Ok(true),
            b'F' => Ok(false),
            _ => Err(CodecError::format("Failed to parse field with type Boolean")),
        }
    }

    pub fn parse_char(&self, offset: usize) -> CodecResult<u8> {
        Ok(self.field(offset, 1)?[0])
    }

    fn parse_number<T: std::str::FromStr>(
        &self,
        offset: usize,
        size: usize,
        type_name: &str,
    ) -> CodecResult<T> {
        let text = self.parse_str(offset, size)?;
        text.parse()
            .map_err(|_| CodecError::Format(format!("Failed to parse field with type {type_name}")))
    }
}

// ---------------------------------------------------------------------------
// MessageBuilder — owned record under construction
// ---------------------------------------------------------------------------

/// An outbound record: space-filled, type byte at 0, delimiter at the end.
///
/// Every setter re-parses the written field and fails if the value does not
/// come back unchanged.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    bytes: Vec<u8>,
}

impl MessageBuilder {
    /// `len` is the full record length, delimiter included (at least 2).
    pub fn new(abstract_type: u8, len: usize) -> Self {
        let len = len.max(2);
        let mut bytes = vec![b' '; len];
        bytes[0] = abstract_type;
        bytes[len - 1] = DELIMITER;
        Self { bytes }
    }

    /// Copy `value` into the window, starting at `offset`.
    pub fn set_str(&mut self, offset: usize, size: usize, value: &str) -> CodecResult<&mut Self> {
        self.check_window(offset, size)?;
        if value.len() > size {
            return Err(CodecError::FieldOverflow { offset, size, value: value.to_string() });
        }
        self.bytes[offset..offset + value.len()].copy_from_slice(value.as_bytes());
        if self.view().parse_str(offset, size)? != value {
            return Err(CodecError::RoundTrip { offset, size });
        }
        Ok(self)
    }

    /// Write `value` right-justified; leading positions stay spaces.
    pub fn set_i32(&mut self, offset: usize, size: usize, value: i32) -> CodecResult<&mut Self> {
        self.check_window(offset, size)?;
        let text = value.to_string();
        if text.len() > size {
            return Err(CodecError::FieldOverflow { offset, size, value: text });
        }
        let begin = offset + size - text.len();
        self.bytes[begin..offset + size].copy_from_slice(text.as_bytes());
        if self.view().parse_i32(offset, size)? != value {
            return Err(CodecError::RoundTrip { offset, size });
        }
        Ok(self)
    }

    pub fn set_bool(&mut self, offset: usize, value: bool) -> CodecResult<&mut Self> {
        self.check_window(offset, 1)?;
        self.bytes[offset] = if value { b'T' } else { b'F' };
        if self.view().parse_bool(offset)? != value {
            return Err(CodecError::RoundTrip { offset, size: 1 });
        }
        Ok(self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn view(&self) -> Message<'_> {
        Message { bytes: &self.bytes }
    }

    fn check_window(&self, offset: usize, size: usize) -> CodecResult<()> {
        self.view().field(offset, size).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(payload: &str) -> Vec<u8> {
        let mut bytes = payload.as_bytes().to_vec();
        bytes.push(DELIMITER);
        bytes
    }

    #[test]
    fn framing_rejects_missing_delimiter() {
        let err = Message::new(b"H ").unwrap_err();
        assert!(matches!(err, CodecError::Format(_)));
        assert!(matches!(Message::new(b"\n"), Err(CodecError::Format(_))));
    }

    #[test]
    fn parses_padded_fields() {
        let bytes = record("X  42 EUR/USD 1.25000   T");
        let msg = Message::new(&bytes).unwrap();
        assert_eq!(msg.abstract_type(), b'X');
        assert_eq!(msg.parse_i32(1, 4).unwrap(), 42);
        assert_eq!(msg.parse_token(6, 7).unwrap(), "EUR/USD");
        assert_eq!(msg.parse_f64(14, 10).unwrap(), 1.25);
        assert!(msg.parse_bool(24).unwrap());
        assert_eq!(msg.parse_order_id(1, 4).unwrap(), 42);
    }

    #[test]
    fn token_stops_at_space() {
        let bytes = record("NUSD/JP Y");
        let msg = Message::new(&bytes).unwrap();
        assert_eq!(msg.parse_token(1, 7).unwrap(), "USD/JP");
        assert_eq!(msg.parse_str(1, 8).unwrap(), "USD/JP Y");
    }

    #[test]
    fn non_numeric_fields_are_format_errors() {
        let bytes = record("X abc      ");
        let msg = Message::new(&bytes).unwrap();
        assert!(matches!(msg.parse_i32(1, 4), Err(CodecError::Format(_))));
        assert!(matches!(msg.parse_f64(1, 4), Err(CodecError::Format(_))));
        assert!(matches!(msg.parse_i32(5, 5), Err(CodecError::Format(_))));
        assert!(matches!(msg.parse_bool(2), Err(CodecError::Format(_))));
    }

    #[test]
    fn field_outside_payload_is_rejected() {
        let bytes = record("H");
        let msg = Message::new(&bytes).unwrap();
        assert!(msg.field(1, 1).is_err());
        assert!(msg.field(0, 1).is_err());
    }

    #[test]
    fn setters_round_trip() {
        let mut builder = MessageBuilder::new(b'Z', 40);
        builder.set_str(1, 10, "login").unwrap();
        builder.set_i32(11, 9, -12345).unwrap();
        builder.set_i32(20, 9, 0).unwrap();
        builder.set_bool(29, false).unwrap();
        builder.set_i32(30, 9, 999_999_999).unwrap();

        let msg = Message::new(builder.as_bytes()).unwrap();
        assert_eq!(msg.parse_str(1, 10).unwrap(), "login");
        assert_eq!(msg.parse_i32(11, 9).unwrap(), -12345);
        assert_eq!(msg.parse_i32(20, 9).unwrap(), 0);
        assert!(!msg.parse_bool(29).unwrap());
        assert_eq!(msg.parse_i32(30, 9).unwrap(), 999_999_999);
        // Right-justified with space padding.
        assert_eq!(&builder.as_bytes()[20..29], b"        0");
    }

    #[test]
    fn integer_round_trip_at_field_width() {
        for (size, value) in [(1, 9), (2, -9), (3, 999), (4, -999), (9, 999_999_999)] {
            let mut builder = MessageBuilder::new(b'Z', size + 2);
            builder.set_i32(1, size, value).unwrap();
            let msg = Message::new(builder.as_bytes()).unwrap();
            assert_eq!(msg.parse_i32(1, size).unwrap(), value);
        }
    }

    #[test]
    fn setters_reject_overflow() {
        let mut builder = MessageBuilder::new(b'Z', 6);
        assert!(matches!(
            builder.set_str(1, 4, "toolong"),
            Err(CodecError::FieldOverflow { .. })
        ));
        assert!(matches!(
            builder.set_i32(1, 2, 123),
            Err(CodecError::FieldOverflow { .. })
        ));
    }

    #[test]
    fn padded_string_does_not_round_trip() {
        let mut builder = MessageBuilder::new(b'Z', 12);
        assert!(matches!(
            builder.set_str(1, 10, " pad"),
            Err(CodecError::RoundTrip { offset: 1, size: 10 })
        ));
    }
}
