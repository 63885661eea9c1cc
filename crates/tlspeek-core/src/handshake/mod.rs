pub mod frames;
mod hello;
pub mod parser;
pub mod types;

#[cfg(test)]
mod testutil;

pub use frames::Alert;
pub use parser::HandshakeParser;
pub use types::{MessageSource, ParserState, ProtocolVersion, TlsDetails};
