use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};
use tls_parser::TlsCipherSuite;

use crate::tokenizer::BinaryTokenizer;

/// A protocol version as its two wire bytes (major, minor).
///
/// Wire values order the same way the versions do: SSLv2 (0x0002) is earlier
/// than SSLv3 (0x0300), which is earlier than every TLS 1.x (0x0301..).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion(u16);

impl ProtocolVersion {
    pub const SSL_2_0: Self = Self(0x0002);
    pub const SSL_3_0: Self = Self(0x0300);
    pub const TLS_1_0: Self = Self(0x0301);
    pub const TLS_1_1: Self = Self(0x0302);
    pub const TLS_1_2: Self = Self(0x0303);
    pub const TLS_1_3: Self = Self(0x0304);

    /// Interpret a wire value, returning `None` for versions this parser
    /// cannot place (GREASE, drafts, garbage).
    pub fn from_wire(raw: u16) -> Option<Self> {
        let major = (raw >> 8) as u8;
        match (major, raw as u8) {
            (0, 2) => Some(Self::SSL_2_0),
            (3, _) => Some(Self(raw)),
            _ => None,
        }
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn is_tls13_or_later(self) -> bool {
        self >= Self::TLS_1_3
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SSL_2_0 => write!(f, "SSLv2"),
            Self::SSL_3_0 => write!(f, "SSLv3"),
            Self(raw) => write!(f, "TLSv1.{}", (raw & 0xff) - 1),
        }
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// TLS record content types (RFC 5246 section 6.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
}

impl ContentType {
    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeType {
    ClientHello,
    ServerHello,
    Certificate,
    ServerHelloDone,
    Other(u8),
}

impl From<u8> for HandshakeType {
    fn from(raw: u8) -> Self {
        match raw {
            1 => Self::ClientHello,
            2 => Self::ServerHello,
            11 => Self::Certificate,
            14 => Self::ServerHelloDone,
            other => Self::Other(other),
        }
    }
}

/// Which peer produced the bytes being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    FromClient,
    FromServer,
}

/// Handshake progress. Declaration order is progress order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParserState {
    AtHelloNone,
    AtHelloStarted,
    AtHelloReceived,
    AtHelloDoneReceived,
    AtNstReceived,
    AtCcsReceived,
    AtFinishReceived,
}

/// Negotiation details extracted from a Hello.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TlsDetails {
    /// Record-layer version of the last record seen.
    pub tls_version: Option<ProtocolVersion>,
    /// Hello legacy version, or the compliant supported_versions choice.
    pub tls_supported_version: Option<ProtocolVersion>,
    #[serde(serialize_with = "serialize_hex")]
    pub client_random: Vec<u8>,
    #[serde(serialize_with = "serialize_hex")]
    pub session_id: Vec<u8>,
    pub ciphers: BTreeSet<u16>,
    pub compression_supported: bool,
    pub do_heartbeats: bool,
    pub tls_tickets_extension: bool,
    pub has_tls_ticket: bool,
    pub tls_status_request: bool,
    pub unsupported_extensions: bool,
    /// SNI host name; empty when absent.
    pub server_name: String,
    /// Raw ALPN ProtocolNameList payload.
    #[serde(serialize_with = "serialize_hex")]
    pub tls_app_layer_proto_neg: Vec<u8>,
    /// Extension type codes in wire order.
    pub extensions: Vec<u16>,
}

impl TlsDetails {
    /// Split the raw ALPN list into protocol names, for display. Entries that
    /// are not valid UTF-8 are shown lossily; a malformed tail is dropped.
    pub fn alpn_protocols(&self) -> Vec<String> {
        let mut tk = BinaryTokenizer::complete(&self.tls_app_layer_proto_neg);
        let mut protocols = Vec::new();
        while !tk.at_end() {
            match tk.pstring8("ProtocolName") {
                Ok(name) => protocols.push(String::from_utf8_lossy(name).into_owned()),
                Err(_) => break,
            }
        }
        protocols
    }

    /// IANA names of the cipher suites, or the hex id when unknown.
    pub fn cipher_names(&self) -> Vec<String> {
        self.ciphers
            .iter()
            .map(|id| match TlsCipherSuite::from_id(*id) {
                Some(suite) => suite.name.to_string(),
                None => format!("0x{:04x}", id),
            })
            .collect()
    }
}

fn serialize_hex<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    let hex: String = bytes
        .as_ref()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    serializer.serialize_str(&hex)
}
