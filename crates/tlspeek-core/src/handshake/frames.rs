//! Parse-once projections of the TLS framing layers.
//!
//! Each type borrows from the tokenizer's buffer and validates only its own
//! field ranges; interpreting the payload is the parser's job.

use crate::error::{must, ParseError};
use crate::handshake::types::{ContentType, HandshakeType, ProtocolVersion};
use crate::tokenizer::BinaryTokenizer;

/// RFC 5246: a record fragment MUST NOT exceed 2^14 bytes.
pub const MAX_FRAGMENT_LEN: usize = 1 << 14;

pub const EXT_SERVER_NAME: u16 = 0;
pub const EXT_STATUS_REQUEST: u16 = 5;
pub const EXT_HEARTBEAT: u16 = 15;
pub const EXT_ALPN: u16 = 16;
pub const EXT_SESSION_TICKET: u16 = 35;
pub const EXT_SUPPORTED_VERSIONS: u16 = 43;

/// Read a (major, minor) version pair. Only SSLv2's 0.2 marker and major
/// version 3 are valid.
pub fn parse_protocol_version(
    tk: &mut BinaryTokenizer<'_>,
    field: &'static str,
) -> Result<ProtocolVersion, ParseError> {
    let major = tk.uint8(field)?;
    let minor = tk.uint8(field)?;
    let raw = u16::from_be_bytes([major, minor]);
    must(major == 3 || raw == 0x0002, field, "unsupported major version")?;
    ProtocolVersion::from_wire(raw)
        .ok_or_else(|| ParseError::malformed(field, format!("version 0x{:04x}", raw)))
}

/// A modern TLS record: type, version, and a length-prefixed fragment.
#[derive(Debug, Clone, Copy)]
pub struct TlsPlaintext<'a> {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub fragment: &'a [u8],
}

impl<'a> TlsPlaintext<'a> {
    pub fn parse(tk: &mut BinaryTokenizer<'a>) -> Result<Self, ParseError> {
        let raw_type = tk.uint8("TLSPlaintext.type")?;
        let content_type = ContentType::from_wire(raw_type).ok_or_else(|| {
            ParseError::malformed("TLSPlaintext.type", format!("unknown content type {}", raw_type))
        })?;
        let version = parse_protocol_version(tk, "TLSPlaintext.version")?;
        let length = usize::from(tk.uint16("TLSPlaintext.length")?);
        // RFC 5246: length MUST NOT exceed 2^14
        must(
            length <= MAX_FRAGMENT_LEN,
            "TLSPlaintext.length",
            "longer than 2^14 bytes",
        )?;
        // RFC 5246: MUST NOT send zero-length [non-application] fragments
        must(
            length != 0 || content_type == ContentType::ApplicationData,
            "TLSPlaintext.length",
            "zero-length fragment",
        )?;
        let fragment = tk.area(length, "TLSPlaintext.fragment")?;
        Ok(Self {
            content_type,
            version,
            fragment,
        })
    }
}

/// A legacy SSLv2-style record: a 2-byte head with the no-padding bit set
/// and a 15-bit length.
#[derive(Debug, Clone, Copy)]
pub struct Sslv2Record<'a> {
    pub fragment: &'a [u8],
}

impl<'a> Sslv2Record<'a> {
    pub fn parse(tk: &mut BinaryTokenizer<'a>) -> Result<Self, ParseError> {
        let head = tk.uint16("Sslv2Record.head")?;
        let length = head & 0x7fff;
        must(head & 0x8000 != 0, "Sslv2Record.head", "padding flag is not set")?;
        must(length != 0, "Sslv2Record.head", "zero length")?;
        let fragment = tk.area(usize::from(length), "Sslv2Record.fragment")?;
        Ok(Self { fragment })
    }
}

/// Whether `data` starts with an SSLv2-style record carrying a ClientHello.
/// Needs three bytes to decide.
pub fn is_sslv2_record(data: &[u8]) -> Result<bool, ParseError> {
    let mut tk = BinaryTokenizer::new(data);
    let head = tk.uint16("?v2Hello.msg_head")?;
    let msg_type = tk.uint8("?v2Hello.msg_type")?;
    Ok(head & 0x8000 != 0 && head & 0x7fff != 0 && msg_type == 1)
}

#[derive(Debug, Clone, Copy)]
pub struct Handshake<'a> {
    pub msg_type: HandshakeType,
    pub raw_type: u8,
    pub body: &'a [u8],
}

impl<'a> Handshake<'a> {
    pub fn parse(tk: &mut BinaryTokenizer<'a>) -> Result<Self, ParseError> {
        let raw_type = tk.uint8("Handshake.msg_type")?;
        let body = tk.pstring24("Handshake.msg_body")?;
        Ok(Self {
            msg_type: HandshakeType::from(raw_type),
            raw_type,
            body,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: u8,
    pub description: u8,
}

impl Alert {
    pub fn parse(tk: &mut BinaryTokenizer<'_>) -> Result<Self, ParseError> {
        let level = tk.uint8("Alert.level")?;
        let description = tk.uint8("Alert.description")?;
        Ok(Self { level, description })
    }

    pub fn fatal(&self) -> bool {
        self.level == 2
    }
}

/// One TLV entry of a Hello extension block.
#[derive(Debug, Clone, Copy)]
pub struct Extension<'a> {
    pub ext_type: u16,
    pub data: &'a [u8],
}

impl<'a> Extension<'a> {
    pub fn parse(tk: &mut BinaryTokenizer<'a>) -> Result<Self, ParseError> {
        let ext_type = tk.uint16("Extension.type")?;
        let data = tk.pstring16("Extension.data")?;
        Ok(Self { ext_type, data })
    }

    /// Whether the parser acts on this extension type.
    pub fn supported(&self) -> bool {
        matches!(
            self.ext_type,
            EXT_SERVER_NAME
                | EXT_STATUS_REQUEST
                | EXT_HEARTBEAT
                | EXT_ALPN
                | EXT_SESSION_TICKET
                | EXT_SUPPORTED_VERSIONS
        )
    }
}
