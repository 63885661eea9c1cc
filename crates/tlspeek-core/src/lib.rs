//! Incremental, read-only inspection of TLS/SSL handshakes.
//!
//! [`tokenizer::BinaryTokenizer`] extracts big-endian integers and
//! length-prefixed byte strings with commit/rollback checkpoints;
//! [`handshake::HandshakeParser`] builds on it to reassemble records into
//! handshake messages and pull negotiation details out of the Hello.

pub mod error;
pub mod handshake;
pub mod tokenizer;

pub use error::ParseError;
