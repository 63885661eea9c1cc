use tracing::{debug, trace, warn};

use crate::error::{must, ParseError};
use crate::handshake::frames::{is_sslv2_record, Alert, Handshake, Sslv2Record, TlsPlaintext};
use crate::handshake::hello::{parse_client_hello, parse_server_hello, parse_v2_client_hello};
use crate::handshake::types::{
    ContentType, HandshakeType, MessageSource, ParserState, ProtocolVersion, TlsDetails,
};
use crate::tokenizer::BinaryTokenizer;

/// Incremental parser for one direction of one TLS connection.
///
/// Feed it the whole buffer received so far on every read; it resumes where
/// the last complete record ended and reports whether it has seen enough.
///
/// ```
/// use tlspeek_core::handshake::{HandshakeParser, MessageSource};
///
/// let mut parser = HandshakeParser::new(MessageSource::FromClient);
/// assert_eq!(parser.parse_hello(&[0x16, 0x03]), Ok(false));
/// assert!(parser.details().is_none());
/// ```
#[derive(Debug)]
pub struct HandshakeParser {
    source: MessageSource,
    state: ParserState,
    details: TlsDetails,
    resuming_session: bool,
    /// Why parsing stopped, once it has.
    done: Option<&'static str>,
    fatal_alert: Option<Alert>,
    failure: Option<ParseError>,
    /// Framing decided on the first call with enough bytes.
    expecting_modern_records: Option<bool>,
    /// Start of the first record not yet consumed.
    records_sync: usize,
    /// Content type of the buffered fragments.
    content_type: Option<ContentType>,
    fragments: Vec<u8>,
    /// Start of the first buffered message not yet consumed.
    messages_sync: usize,
}

impl HandshakeParser {
    pub fn new(source: MessageSource) -> Self {
        Self {
            source,
            state: ParserState::AtHelloNone,
            details: TlsDetails::default(),
            resuming_session: false,
            done: None,
            fatal_alert: None,
            failure: None,
            expecting_modern_records: None,
            records_sync: 0,
            content_type: None,
            fragments: Vec::new(),
            messages_sync: 0,
        }
    }

    /// Parse everything received so far.
    ///
    /// `data` must extend the buffer passed on the previous call. Returns
    /// `Ok(true)` once parsing is done, `Ok(false)` when more bytes are
    /// needed, and an error when the input is malformed. Errors are sticky:
    /// every later call returns the same error.
    pub fn parse_hello(&mut self, data: &[u8]) -> Result<bool, ParseError> {
        if self.done.is_some() {
            return Ok(true);
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        match self.parse_records(data) {
            Ok(()) => {
                debug!(done = ?self.done, "success");
                Ok(true)
            }
            Err(err) if err.is_insufficient_input() => {
                debug!(received = data.len(), "need more data");
                Ok(false)
            }
            Err(err) => {
                debug!(error = %err, "parsing error");
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    pub fn source(&self) -> MessageSource {
        self.source
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Why parsing finished, e.g. `"ClientHello"` or `"SSLv2"`.
    pub fn done_reason(&self) -> Option<&'static str> {
        self.done
    }

    /// Whether a ChangeCipherSpec showed a pre-1.3 session being resumed.
    pub fn resuming_session(&self) -> bool {
        self.resuming_session
    }

    /// The fatal alert that ended parsing, if one did.
    pub fn fatal_alert(&self) -> Option<Alert> {
        self.fatal_alert
    }

    /// Extracted details; `None` until `parse_hello` has returned `true`.
    pub fn details(&self) -> Option<&TlsDetails> {
        self.done.map(|_| &self.details)
    }

    /// Hand the extracted details over to the caller.
    pub fn into_details(self) -> Option<TlsDetails> {
        self.done.map(|_| self.details)
    }

    fn parse_records(&mut self, data: &[u8]) -> Result<(), ParseError> {
        let modern = match self.expecting_modern_records {
            Some(modern) => modern,
            None => {
                let modern = !is_sslv2_record(data)?;
                debug!(modern, "detected record framing");
                self.expecting_modern_records = Some(modern);
                modern
            }
        };

        let mut tk = BinaryTokenizer::resume(data, self.records_sync);
        while self.done.is_none() {
            if modern {
                self.parse_modern_record(&mut tk)?;
            } else {
                self.parse_version2_record(&mut tk)?;
            }
        }
        Ok(())
    }

    fn parse_modern_record(&mut self, tk: &mut BinaryTokenizer<'_>) -> Result<(), ParseError> {
        let record = TlsPlaintext::parse(tk)?;
        tk.commit();
        self.records_sync = tk.sync_point();
        trace!(
            content_type = ?record.content_type,
            version = %record.version,
            length = record.fragment.len(),
            "record"
        );

        self.details.tls_version = Some(record.version);

        if self.content_type == Some(record.content_type) {
            self.fragments.extend_from_slice(record.fragment);
        } else {
            self.flush_interrupted_messages(&record)?;
            if self.done.is_some() {
                return Ok(());
            }
            self.fragments.clear();
            self.fragments.extend_from_slice(record.fragment);
            self.messages_sync = 0;
            self.content_type = Some(record.content_type);
        }

        if tk.at_end() && self.done.is_none() {
            self.parse_messages()?;
        }
        Ok(())
    }

    fn parse_version2_record(&mut self, tk: &mut BinaryTokenizer<'_>) -> Result<(), ParseError> {
        let record = Sslv2Record::parse(tk)?;
        tk.commit();
        self.records_sync = tk.sync_point();
        trace!(length = record.fragment.len(), "SSLv2 record");

        self.details.tls_version = Some(ProtocolVersion::SSL_2_0);
        self.require_state_before(ParserState::AtHelloReceived, "V2ClientHello")?;
        self.require_source(MessageSource::FromClient, "V2ClientHello")?;
        parse_v2_client_hello(&mut self.details, record.fragment)?;
        self.state = ParserState::AtHelloReceived;
        self.done = Some("SSLv2");
        Ok(())
    }

    /// Parse buffered messages before `next` switches the content type. A
    /// message left incomplete can never be finished, which is fatal unless
    /// `next` is a fatal alert ending the handshake anyway.
    fn flush_interrupted_messages(&mut self, next: &TlsPlaintext<'_>) -> Result<(), ParseError> {
        match self.parse_messages() {
            Err(err) if err.is_insufficient_input() => {
                let mut tk_alert = BinaryTokenizer::complete(next.fragment);
                let fatal_alert = next.content_type == ContentType::Alert
                    && Alert::parse(&mut tk_alert).is_ok_and(|alert| alert.fatal());
                must(
                    fatal_alert,
                    "TLSPlaintext.type",
                    "content type changed in the middle of a message",
                )?;
                debug!(
                    content_type = ?self.content_type,
                    leftovers = self.fragments.len() - self.messages_sync,
                    "dropping incomplete message cut short by a fatal alert"
                );
                Ok(())
            }
            result => result,
        }
    }

    fn parse_messages(&mut self) -> Result<(), ParseError> {
        let Some(content_type) = self.content_type else {
            return Ok(());
        };
        let fragments = std::mem::take(&mut self.fragments);
        let mut tk = BinaryTokenizer::resume(&fragments, self.messages_sync);
        let result = self.parse_messages_of(content_type, &mut tk);
        self.messages_sync = tk.sync_point();
        self.fragments = fragments;
        result
    }

    fn parse_messages_of(
        &mut self,
        content_type: ContentType,
        tk: &mut BinaryTokenizer<'_>,
    ) -> Result<(), ParseError> {
        trace!(?content_type, size = tk.leftovers().len(), "fragments");
        while self.done.is_none() && !tk.at_end() {
            match content_type {
                ContentType::ChangeCipherSpec => self.parse_change_cipher_spec_message(tk)?,
                ContentType::Alert => self.parse_alert_message(tk)?,
                ContentType::Handshake => self.parse_handshake_message(tk)?,
                ContentType::ApplicationData => skip_message(tk, "app data")?,
            }
            tk.commit();
        }
        Ok(())
    }

    fn parse_change_cipher_spec_message(
        &mut self,
        tk: &mut BinaryTokenizer<'_>,
    ) -> Result<(), ParseError> {
        skip_message(tk, "ChangeCipherSpec msg")?;

        // TLS 1.3 peers send it around the Hello for middlebox compatibility
        // only; it says nothing about resumption there.
        if let Some(version) = self.details.tls_supported_version {
            if version.is_tls13_or_later() {
                trace!(%version, "ignoring ChangeCipherSpec");
                return Ok(());
            }
        }

        self.resuming_session = true;
        // everything after it may be encrypted
        self.done = Some("ChangeCipherSpec in v1.2-");
        Ok(())
    }

    fn parse_alert_message(&mut self, tk: &mut BinaryTokenizer<'_>) -> Result<(), ParseError> {
        let alert = Alert::parse(tk)?;
        if alert.fatal() {
            warn!(
                level = alert.level,
                description = alert.description,
                "fatal alert"
            );
            self.fatal_alert = Some(alert);
            self.done = Some("fatal Alert");
        } else {
            debug!(
                level = alert.level,
                description = alert.description,
                "ignoring alert"
            );
        }
        Ok(())
    }

    fn parse_handshake_message(&mut self, tk: &mut BinaryTokenizer<'_>) -> Result<(), ParseError> {
        let message = Handshake::parse(tk)?;

        match message.msg_type {
            HandshakeType::ClientHello => {
                self.require_state_before(ParserState::AtHelloReceived, "ClientHello")?;
                self.require_source(MessageSource::FromClient, "ClientHello")?;
                parse_client_hello(&mut self.details, self.source, message.body)?;
                self.state = ParserState::AtHelloReceived;
                self.done = Some("ClientHello");
            }
            HandshakeType::ServerHello => {
                self.require_state_before(ParserState::AtHelloReceived, "ServerHello")?;
                self.require_source(MessageSource::FromServer, "ServerHello")?;
                parse_server_hello(&mut self.details, self.source, message.body)?;
                self.state = ParserState::AtHelloReceived;
                // everything after a TLS 1.3 ServerHello is encrypted
                if self
                    .details
                    .tls_supported_version
                    .is_some_and(ProtocolVersion::is_tls13_or_later)
                {
                    self.done = Some("ServerHello in v1.3+");
                }
            }
            HandshakeType::ServerHelloDone => {
                self.require_state_before(ParserState::AtHelloDoneReceived, "ServerHelloDone")?;
                // zero-length
                self.state = ParserState::AtHelloDoneReceived;
                self.done = Some("ServerHelloDone");
            }
            HandshakeType::Certificate | HandshakeType::Other(_) => {
                debug!(
                    msg_type = message.raw_type,
                    length = message.body.len(),
                    "ignoring handshake msg"
                );
            }
        }
        Ok(())
    }

    fn require_state_before(
        &self,
        target: ParserState,
        field: &'static str,
    ) -> Result<(), ParseError> {
        must(self.state < target, field, "unexpected at this handshake stage")
    }

    fn require_source(&self, expected: MessageSource, field: &'static str) -> Result<(), ParseError> {
        must(self.source == expected, field, "sent by the wrong peer")
    }
}

/// Skip everything buffered: fragments of one content type cannot be split
/// into messages without understanding them.
fn skip_message(tk: &mut BinaryTokenizer<'_>, description: &'static str) -> Result<(), ParseError> {
    tk.skip(tk.leftovers().len(), description)
}
