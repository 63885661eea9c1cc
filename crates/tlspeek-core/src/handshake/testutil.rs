//! Byte-level builders for handshake test vectors.

fn pstring8(body: &[u8]) -> Vec<u8> {
    let mut out = vec![body.len() as u8];
    out.extend_from_slice(body);
    out
}

fn pstring16(body: &[u8]) -> Vec<u8> {
    let mut out = (body.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(body);
    out
}

pub fn extension(ext_type: u16, data: &[u8]) -> Vec<u8> {
    let mut out = ext_type.to_be_bytes().to_vec();
    out.extend(pstring16(data));
    out
}

pub fn sni_extension(host: &str) -> Vec<u8> {
    let mut entry = vec![0u8];
    entry.extend(pstring16(host.as_bytes()));
    extension(0, &pstring16(&entry))
}

pub fn alpn_extension(protocols: &[&str]) -> Vec<u8> {
    let list: Vec<u8> = protocols
        .iter()
        .flat_map(|p| pstring8(p.as_bytes()))
        .collect();
    extension(16, &pstring16(&list))
}

pub fn supported_versions_client(versions: &[u16]) -> Vec<u8> {
    let list: Vec<u8> = versions.iter().flat_map(|v| v.to_be_bytes()).collect();
    extension(43, &pstring8(&list))
}

/// ClientHello body with a 0x11-filled random and a 4-byte 0x22 session id.
pub fn client_hello_body(
    version: u16,
    ciphers: &[u16],
    compression: &[u8],
    extensions: Option<&[u8]>,
) -> Vec<u8> {
    let mut out = version.to_be_bytes().to_vec();
    out.extend_from_slice(&[0x11; 32]);
    out.extend(pstring8(&[0x22; 4]));
    let suites: Vec<u8> = ciphers.iter().flat_map(|c| c.to_be_bytes()).collect();
    out.extend(pstring16(&suites));
    out.extend(pstring8(compression));
    if let Some(extensions) = extensions {
        out.extend(pstring16(extensions));
    }
    out
}

/// ServerHello body with a 0x33-filled random and an 8-byte 0x44 session id.
pub fn server_hello_body(version: u16, cipher: u16, extensions: Option<&[u8]>) -> Vec<u8> {
    let mut out = version.to_be_bytes().to_vec();
    out.extend_from_slice(&[0x33; 32]);
    out.extend(pstring8(&[0x44; 8]));
    out.extend_from_slice(&cipher.to_be_bytes());
    out.push(0);
    if let Some(extensions) = extensions {
        out.extend(pstring16(extensions));
    }
    out
}

pub fn handshake(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let len = body.len() as u32;
    let mut out = vec![msg_type];
    out.extend_from_slice(&len.to_be_bytes()[1..]);
    out.extend_from_slice(body);
    out
}

pub fn record(content_type: u8, version: u16, fragment: &[u8]) -> Vec<u8> {
    let mut out = vec![content_type];
    out.extend_from_slice(&version.to_be_bytes());
    out.extend(pstring16(fragment));
    out
}

/// A whole ClientHello handshake message in one TLS 1.0 record.
pub fn client_hello_record(body: &[u8]) -> Vec<u8> {
    record(22, 0x0301, &handshake(1, body))
}
