use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::trace;

use tlspeek_core::handshake::{HandshakeParser, MessageSource};
use tlspeek_core::ParseError;

const READ_CHUNK: usize = 4096;

/// How much the proxy is willing to buffer while peeking one direction.
#[derive(Debug, Clone, Copy)]
pub struct PeekLimits {
    pub max_bytes: usize,
    pub timeout: Duration,
}

/// Why peeking at one direction stopped.
#[derive(Debug)]
pub enum PeekOutcome {
    /// The parser saw enough.
    Done,
    /// The bytes are not a TLS handshake we understand.
    Failed(ParseError),
    /// The peer closed before the parser was done.
    Eof,
    LimitReached,
    TimedOut,
}

/// Everything read while peeking, plus the parser that read it.
pub struct Peeked {
    pub parser: HandshakeParser,
    pub buffer: Vec<u8>,
    pub outcome: PeekOutcome,
}

/// Read from `reader` until the parser is done or a limit is hit, copying
/// every chunk to `relay` as it arrives. The whole buffer received so far is
/// handed to the parser after each read.
pub async fn peek_hello<R, W>(
    reader: &mut R,
    relay: &mut W,
    source: MessageSource,
    limits: PeekLimits,
) -> io::Result<Peeked>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut parser = HandshakeParser::new(source);
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    let deadline = Instant::now() + limits.timeout;

    let outcome = loop {
        if buffer.len() >= limits.max_bytes {
            break PeekOutcome::LimitReached;
        }

        let n = match timeout_at(deadline, reader.read(&mut chunk)).await {
            Ok(read) => read?,
            Err(_) => break PeekOutcome::TimedOut,
        };
        if n == 0 {
            break PeekOutcome::Eof;
        }

        relay.write_all(&chunk[..n]).await?;
        buffer.extend_from_slice(&chunk[..n]);

        match parser.parse_hello(&buffer) {
            Ok(true) => break PeekOutcome::Done,
            Ok(false) => trace!(?source, buffered = buffer.len(), "need more data"),
            Err(e) => break PeekOutcome::Failed(e),
        }
    };

    Ok(Peeked {
        parser,
        buffer,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: PeekLimits = PeekLimits {
        max_bytes: 64 * 1024,
        timeout: Duration::from_secs(5),
    };

    /// TLS 1.2 ClientHello carrying SNI "a.test" and no other extension.
    fn client_hello() -> Vec<u8> {
        let sni = [
            &[0x00, 0x00, 0x00, 0x0b, 0x00, 0x09, 0x00, 0x00, 0x06][..],
            b"a.test",
        ]
        .concat();
        let mut body = vec![0x03, 0x03];
        body.extend_from_slice(&[0x11; 32]);
        body.extend_from_slice(&[0x00, 0x00, 0x02, 0x00, 0x2f, 0x01, 0x00]);
        body.extend_from_slice(&(sni.len() as u16).to_be_bytes());
        body.extend_from_slice(&sni);

        let mut message = vec![0x01, 0x00];
        message.extend_from_slice(&(body.len() as u16).to_be_bytes());
        message.extend_from_slice(&body);

        let mut record = vec![0x16, 0x03, 0x01];
        record.extend_from_slice(&(message.len() as u16).to_be_bytes());
        record.extend_from_slice(&message);
        record
    }

    #[tokio::test]
    async fn test_peeks_a_hello_delivered_in_small_chunks() {
        let hello = client_hello();
        let (mut tx, mut rx) = tokio::io::duplex(64);
        let sent = hello.clone();
        let writer = tokio::spawn(async move {
            for piece in sent.chunks(7) {
                tx.write_all(piece).await.unwrap();
                tokio::task::yield_now().await;
            }
            tx
        });

        let mut relayed = Vec::new();
        let peeked = peek_hello(&mut rx, &mut relayed, MessageSource::FromClient, LIMITS)
            .await
            .unwrap();
        let _tx = writer.await.unwrap();

        assert!(matches!(peeked.outcome, PeekOutcome::Done));
        assert_eq!(peeked.buffer, hello);
        assert_eq!(relayed, hello);
        let details = peeked.parser.details().unwrap();
        assert_eq!(details.server_name, "a.test");
    }

    #[tokio::test]
    async fn test_early_close_is_eof() {
        let hello = client_hello();
        let mut reader = &hello[..20];
        let peeked = peek_hello(&mut reader, &mut tokio::io::sink(), MessageSource::FromClient, LIMITS)
            .await
            .unwrap();
        assert!(matches!(peeked.outcome, PeekOutcome::Eof));
        assert_eq!(peeked.buffer.len(), 20);
    }

    #[tokio::test]
    async fn test_plain_http_fails_to_parse() {
        let mut reader = &b"GET / HTTP/1.1\r\nHost: a.test\r\n\r\n"[..];
        let peeked = peek_hello(&mut reader, &mut tokio::io::sink(), MessageSource::FromClient, LIMITS)
            .await
            .unwrap();
        assert!(matches!(peeked.outcome, PeekOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_buffering_stops_at_the_limit() {
        let hello = client_hello();
        let mut reader = &hello[..30];
        let limits = PeekLimits {
            max_bytes: 16,
            ..LIMITS
        };
        let peeked = peek_hello(&mut reader, &mut tokio::io::sink(), MessageSource::FromClient, limits)
            .await
            .unwrap();
        assert!(matches!(peeked.outcome, PeekOutcome::LimitReached));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (_tx, mut rx) = tokio::io::duplex(64);
        let limits = PeekLimits {
            timeout: Duration::from_millis(20),
            ..LIMITS
        };
        let peeked = peek_hello(&mut rx, &mut tokio::io::sink(), MessageSource::FromServer, limits)
            .await
            .unwrap();
        assert!(matches!(peeked.outcome, PeekOutcome::TimedOut));
    }
}
