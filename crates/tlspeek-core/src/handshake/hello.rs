//! Field and extension extraction for ClientHello and ServerHello bodies.
//!
//! Message bodies arrive already framed, so every tokenizer here is built over
//! complete input: running short inside a body is a fatal truncation, never a
//! request for more data.

use tracing::{debug, trace};

use crate::error::{must, ParseError};
use crate::handshake::frames::{
    parse_protocol_version, Extension, EXT_ALPN, EXT_HEARTBEAT, EXT_SERVER_NAME,
    EXT_SESSION_TICKET, EXT_STATUS_REQUEST, EXT_SUPPORTED_VERSIONS,
};
use crate::handshake::types::{MessageSource, ProtocolVersion, TlsDetails};
use crate::tokenizer::BinaryTokenizer;

const HELLO_RANDOM_SIZE: usize = 32;

pub(crate) fn parse_client_hello(
    details: &mut TlsDetails,
    source: MessageSource,
    body: &[u8],
) -> Result<(), ParseError> {
    let mut tk = BinaryTokenizer::complete(body);
    let legacy_version = parse_protocol_version(&mut tk, "ClientHello.version")?;
    details.tls_supported_version = Some(legacy_version);
    details.client_random = tk.area(HELLO_RANDOM_SIZE, "ClientHello.random")?.to_vec();
    details.session_id = tk.pstring8("ClientHello.session_id")?.to_vec();
    parse_ciphers(details, tk.pstring16("ClientHello.cipher_suites")?)?;
    details.compression_supported =
        parse_compression_methods(tk.pstring8("ClientHello.compression_methods")?)?;
    // an extension-free Hello ends here
    if !tk.at_end() {
        let extensions = tk.pstring16("ClientHello.extensions")?;
        parse_extensions(details, source, legacy_version, extensions)?;
    }
    Ok(())
}

pub(crate) fn parse_server_hello(
    details: &mut TlsDetails,
    source: MessageSource,
    body: &[u8],
) -> Result<(), ParseError> {
    let mut tk = BinaryTokenizer::complete(body);
    let legacy_version = parse_protocol_version(&mut tk, "ServerHello.version")?;
    details.tls_supported_version = Some(legacy_version);
    tk.skip(HELLO_RANDOM_SIZE, "ServerHello.random")?;
    details.session_id = tk.pstring8("ServerHello.session_id")?.to_vec();
    // may be a suite the proxy itself cannot use
    details
        .ciphers
        .insert(tk.uint16("ServerHello.cipher_suite")?);
    details.compression_supported = tk.uint8("ServerHello.compression_method")? != 0;
    if !tk.at_end() {
        let extensions = tk.pstring16("ServerHello.extensions")?;
        parse_extensions(details, source, legacy_version, extensions)?;
    }
    Ok(())
}

/// SSLv2-compatible ClientHello (RFC 5246 appendix E.2): type, version, three
/// lengths, then cipher specs, session id and challenge.
pub(crate) fn parse_v2_client_hello(details: &mut TlsDetails, body: &[u8]) -> Result<(), ParseError> {
    let mut tk = BinaryTokenizer::complete(body);
    let msg_type = tk.uint8("V2ClientHello.type")?;
    must(msg_type == 1, "V2ClientHello.type", "not a ClientHello")?;
    details.tls_supported_version = Some(parse_protocol_version(&mut tk, "V2ClientHello.version")?);
    let ciphers_len = tk.uint16("V2ClientHello.cipher_specs.length")?;
    let session_id_len = tk.uint16("V2ClientHello.session_id.length")?;
    let challenge_len = tk.uint16("V2ClientHello.challenge.length")?;
    parse_v2_ciphers(
        details,
        tk.area(usize::from(ciphers_len), "V2ClientHello.cipher_specs")?,
    )?;
    details.session_id = tk
        .area(usize::from(session_id_len), "V2ClientHello.session_id")?
        .to_vec();
    tk.skip(usize::from(challenge_len), "V2ClientHello.challenge")?;
    Ok(())
}

fn parse_ciphers(details: &mut TlsDetails, raw: &[u8]) -> Result<(), ParseError> {
    let mut tk = BinaryTokenizer::complete(raw);
    while !tk.at_end() {
        details.ciphers.insert(tk.uint16("cipher_suite")?);
    }
    Ok(())
}

/// SSLv2 cipher specs are 3 bytes. Only entries with a zero first byte map to
/// SSLv3/TLS suites; SSLv2-only kinds are dropped.
fn parse_v2_ciphers(details: &mut TlsDetails, raw: &[u8]) -> Result<(), ParseError> {
    let mut tk = BinaryTokenizer::complete(raw);
    while !tk.at_end() {
        let prefix = tk.uint8("cipher_spec.prefix")?;
        let cipher = tk.uint16("cipher_spec.cipher")?;
        if prefix == 0 {
            details.ciphers.insert(cipher);
        } else {
            trace!(prefix, cipher, "ignoring SSLv2-only cipher spec");
        }
    }
    Ok(())
}

fn parse_compression_methods(raw: &[u8]) -> Result<bool, ParseError> {
    let mut tk = BinaryTokenizer::complete(raw);
    while !tk.at_end() {
        if tk.uint8("compression_method")? != 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

fn parse_extensions(
    details: &mut TlsDetails,
    source: MessageSource,
    legacy_version: ProtocolVersion,
    raw: &[u8],
) -> Result<(), ParseError> {
    let mut tk = BinaryTokenizer::complete(raw);
    while !tk.at_end() {
        let extension = Extension::parse(&mut tk)?;
        details.extensions.push(extension.ext_type);

        if !details.unsupported_extensions && !extension.supported() {
            debug!(ext_type = extension.ext_type, "first unsupported extension");
            details.unsupported_extensions = true;
        }

        match extension.ext_type {
            // RFC 6066 section 3
            EXT_SERVER_NAME => details.server_name = parse_sni_extension(extension.data)?,
            // RFC 6066 section 8
            EXT_STATUS_REQUEST => details.tls_status_request = true,
            // RFC 6520
            EXT_HEARTBEAT => details.do_heartbeats = true,
            // RFC 7301; keep the whole list, including protocols we do not speak
            EXT_ALPN => {
                let mut tk_alpn = BinaryTokenizer::complete(extension.data);
                details.tls_app_layer_proto_neg =
                    tk_alpn.pstring16("ProtocolNameList")?.to_vec();
            }
            // RFC 5077
            EXT_SESSION_TICKET => {
                details.tls_tickets_extension = true;
                details.has_tls_ticket = !extension.data.is_empty();
            }
            // RFC 8446 section 4.2.1
            EXT_SUPPORTED_VERSIONS => {
                parse_supported_versions(details, source, legacy_version, extension.data)?
            }
            _ => {}
        }
    }
    Ok(())
}

/// Returns the first host_name entry, possibly empty. Other name types are
/// skipped.
fn parse_sni_extension(data: &[u8]) -> Result<String, ParseError> {
    // servers answer with an empty extension, not an empty list
    if data.is_empty() {
        return Ok(String::new());
    }

    let mut tk = BinaryTokenizer::complete(data);
    let list = tk.pstring16("ServerNameList")?;
    must(tk.at_end(), "ServerNameList", "leftovers after the server name list")?;

    let mut tk_list = BinaryTokenizer::complete(list);
    while !tk_list.at_end() {
        let name_type = tk_list.uint8("ServerName.name_type")?;
        let name = tk_list.pstring16("ServerName.name")?;
        if name_type == 0 {
            let host_name = String::from_utf8_lossy(name).into_owned();
            debug!(host_name = %host_name, "SNI");
            return Ok(host_name);
        }
        trace!(name_type, "skipping unknown server name type");
    }
    Ok(String::new())
}

/// A compliant sender pairs this extension with a legacy version of exactly
/// TLS 1.2; anything else makes us ignore the extension and keep the legacy
/// value.
fn parse_supported_versions(
    details: &mut TlsDetails,
    source: MessageSource,
    legacy_version: ProtocolVersion,
    data: &[u8],
) -> Result<(), ParseError> {
    if legacy_version != ProtocolVersion::TLS_1_2 {
        debug!(%legacy_version, "ignoring supported_versions next to a non-1.2 legacy version");
        return Ok(());
    }

    let mut tk = BinaryTokenizer::complete(data);
    let selected = match source {
        MessageSource::FromClient => {
            let mut tk_versions = BinaryTokenizer::complete(tk.pstring8("SupportedVersions")?);
            let mut highest: Option<ProtocolVersion> = None;
            while !tk_versions.at_end() {
                let raw = tk_versions.uint16("supported_version")?;
                match ProtocolVersion::from_wire(raw) {
                    Some(version) => highest = highest.max(Some(version)),
                    // GREASE and drafts
                    None => trace!(raw, "skipping unknown version"),
                }
            }
            // an empty or unknown-only list leaves the legacy version alone
            let Some(highest) = highest else {
                return Ok(());
            };
            highest
        }
        MessageSource::FromServer => {
            let raw = tk.uint16("selected_version")?;
            let Some(version) = ProtocolVersion::from_wire(raw) else {
                trace!(raw, "ignoring unknown selected version");
                return Ok(());
            };
            // a server negotiating TLS 1.2 or earlier MUST NOT send this
            if version <= ProtocolVersion::TLS_1_2 {
                debug!(%version, "ignoring supported_versions selecting a pre-1.3 version");
                return Ok(());
            }
            version
        }
    };

    debug!(version = %selected, "supported_versions");
    details.tls_supported_version = Some(selected);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::testutil::{
        client_hello_body, extension, server_hello_body, sni_extension, supported_versions_client,
    };

    fn client(body: &[u8]) -> Result<TlsDetails, ParseError> {
        let mut details = TlsDetails::default();
        parse_client_hello(&mut details, MessageSource::FromClient, body)?;
        Ok(details)
    }

    #[test]
    fn test_client_hello_without_extensions() {
        let body = client_hello_body(0x0303, &[0x002f], &[0], None);
        let details = client(&body).unwrap();
        assert_eq!(details.tls_supported_version, Some(ProtocolVersion::TLS_1_2));
        assert_eq!(details.client_random, vec![0x11; 32]);
        assert_eq!(details.session_id, vec![0x22; 4]);
        assert!(details.extensions.is_empty());
        assert!(!details.compression_supported);
    }

    #[test]
    fn test_nonzero_compression_method_is_reported() {
        let body = client_hello_body(0x0303, &[0x002f], &[0, 1], None);
        assert!(client(&body).unwrap().compression_supported);
    }

    #[test]
    fn test_odd_cipher_list_is_truncation() {
        let mut body = client_hello_body(0x0303, &[], &[0], None);
        // replace the empty cipher list with a one-byte list
        let at = 2 + 32 + 1 + 4;
        body.splice(at..at + 2, [0x00, 0x01, 0x2f]);
        assert!(matches!(client(&body), Err(ParseError::Truncated { .. })));
    }

    #[test]
    fn test_sni_picks_first_host_name() {
        let list = [
            &[0x01, 0x00, 0x01, b'x'][..],
            &[0x00, 0x00, 0x03, b'a', b'.', b'b'],
            &[0x00, 0x00, 0x01, b'c'],
        ]
        .concat();
        let mut data = (list.len() as u16).to_be_bytes().to_vec();
        data.extend_from_slice(&list);
        assert_eq!(parse_sni_extension(&data).unwrap(), "a.b");
    }

    #[test]
    fn test_empty_sni_extension_is_empty_name() {
        let body = client_hello_body(0x0303, &[0x002f], &[0], Some(&extension(0, &[])));
        let details = client(&body).unwrap();
        assert_eq!(details.server_name, "");
        assert_eq!(details.extensions, vec![0]);
        assert!(!details.unsupported_extensions);
    }

    #[test]
    fn test_sni_with_leftovers_is_malformed() {
        let mut data = sni_extension("example.com")[4..].to_vec();
        data.push(0);
        assert!(matches!(
            parse_sni_extension(&data),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_flag_extensions() {
        let extensions = [
            extension(5, &[1, 0, 0, 0, 0]),
            extension(15, &[1]),
            extension(35, &[]),
        ]
        .concat();
        let body = client_hello_body(0x0303, &[0x002f], &[0], Some(&extensions));
        let details = client(&body).unwrap();
        assert!(details.tls_status_request);
        assert!(details.do_heartbeats);
        assert!(details.tls_tickets_extension);
        assert!(!details.has_tls_ticket);
        assert!(!details.unsupported_extensions);
    }

    #[test]
    fn test_non_empty_session_ticket_means_resumption_ticket() {
        let body = client_hello_body(0x0303, &[0x002f], &[0], Some(&extension(35, &[9; 16])));
        let details = client(&body).unwrap();
        assert!(details.tls_tickets_extension);
        assert!(details.has_tls_ticket);
    }

    #[test]
    fn test_client_supported_versions_skips_grease_and_drafts() {
        let ext = supported_versions_client(&[0x0a0a, 0x7f1c, 0x0303, 0x0304, 0x0302]);
        let body = client_hello_body(0x0303, &[0x1301], &[0], Some(&ext));
        let details = client(&body).unwrap();
        assert_eq!(details.tls_supported_version, Some(ProtocolVersion::TLS_1_3));
    }

    #[test]
    fn test_client_supported_versions_with_only_unknown_values_is_ignored() {
        let ext = supported_versions_client(&[0x2a2a, 0x7f17]);
        let body = client_hello_body(0x0303, &[0x1301], &[0], Some(&ext));
        let details = client(&body).unwrap();
        assert_eq!(details.tls_supported_version, Some(ProtocolVersion::TLS_1_2));
    }

    #[test]
    fn test_client_may_offer_only_a_legacy_version() {
        let ext = supported_versions_client(&[0x0302]);
        let body = client_hello_body(0x0303, &[0x002f], &[0], Some(&ext));
        let details = client(&body).unwrap();
        assert_eq!(details.tls_supported_version, Some(ProtocolVersion::TLS_1_1));
    }

    fn server(body: &[u8]) -> TlsDetails {
        let mut details = TlsDetails::default();
        parse_server_hello(&mut details, MessageSource::FromServer, body).unwrap();
        details
    }

    #[test]
    fn test_server_hello_records_selected_suite() {
        let details = server(&server_hello_body(0x0303, 0xc02f, None));
        assert_eq!(details.tls_supported_version, Some(ProtocolVersion::TLS_1_2));
        assert!(details.client_random.is_empty());
        assert_eq!(details.ciphers.iter().copied().collect::<Vec<_>>(), vec![0xc02f]);
    }

    #[test]
    fn test_server_selected_version_must_be_tls13_or_later() {
        let tls13 = extension(43, &[0x03, 0x04]);
        let details = server(&server_hello_body(0x0303, 0x1301, Some(&tls13)));
        assert_eq!(details.tls_supported_version, Some(ProtocolVersion::TLS_1_3));

        let tls12 = extension(43, &[0x03, 0x03]);
        let details = server(&server_hello_body(0x0303, 0xc02f, Some(&tls12)));
        assert_eq!(details.tls_supported_version, Some(ProtocolVersion::TLS_1_2));

        let unknown = extension(43, &[0x7f, 0x1c]);
        let details = server(&server_hello_body(0x0303, 0x1301, Some(&unknown)));
        assert_eq!(details.tls_supported_version, Some(ProtocolVersion::TLS_1_2));
    }

    #[test]
    fn test_v2_hello_keeps_only_v3_ciphers() {
        let body = [
            &[0x01, 0x03, 0x01][..],
            &[0x00, 0x09, 0x00, 0x00, 0x00, 0x10],
            &[0x00, 0x00, 0x2f, 0x07, 0x00, 0xc0, 0x00, 0x00, 0x35],
            &[0xcc; 16],
        ]
        .concat();
        let mut details = TlsDetails::default();
        parse_v2_client_hello(&mut details, &body).unwrap();
        assert_eq!(details.tls_supported_version, Some(ProtocolVersion::TLS_1_0));
        assert_eq!(details.ciphers.iter().copied().collect::<Vec<_>>(), vec![0x002f, 0x0035]);
        assert!(details.session_id.is_empty());
    }

    #[test]
    fn test_v2_hello_must_be_a_client_hello() {
        let body = [0x04, 0x03, 0x01, 0, 0, 0, 0, 0, 0];
        let mut details = TlsDetails::default();
        assert!(matches!(
            parse_v2_client_hello(&mut details, &body),
            Err(ParseError::Malformed { field: "V2ClientHello.type", .. })
        ));
    }
}
