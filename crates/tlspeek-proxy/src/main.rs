use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Level};

use tlspeek_core::handshake::{HandshakeParser, MessageSource};

mod peek;

use peek::{peek_hello, PeekLimits, PeekOutcome};

#[derive(Parser)]
#[command(name = "tlspeek-proxy")]
#[command(about = "Peek at TLS Hellos in both directions, then splice the connection")]
struct Cli {
    /// Address to accept client connections on
    #[arg(short, long, default_value = "0.0.0.0:8443")]
    listen: SocketAddr,

    /// Fixed upstream (host:port). If omitted, connect to the client's SNI
    /// host name on --default-port.
    #[arg(short, long)]
    upstream: Option<String>,

    /// Upstream port used with SNI routing
    #[arg(long, default_value_t = 443)]
    default_port: u16,

    /// Give up peeking a direction after buffering this many bytes
    #[arg(long, default_value_t = 64 * 1024)]
    max_peek_bytes: usize,

    /// Give up peeking a direction after this many seconds
    #[arg(long, default_value_t = 10)]
    peek_timeout: u64,

    /// Print one JSON object per peeked Hello
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Log parser decisions
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

struct Config {
    upstream: Option<String>,
    default_port: u16,
    limits: PeekLimits,
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = Arc::new(Config {
        upstream: cli.upstream,
        default_port: cli.default_port,
        limits: PeekLimits {
            max_bytes: cli.max_peek_bytes,
            timeout: Duration::from_secs(cli.peek_timeout),
        },
        json: cli.json,
    });

    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("Failed to listen on {}", cli.listen))?;

    info!("tlspeek proxy listening on {}", cli.listen);
    match &config.upstream {
        Some(upstream) => info!("Forwarding to {}", upstream),
        None => info!("Routing by SNI to port {}", config.default_port),
    }

    loop {
        let (stream, peer) = listener.accept().await?;
        let config = Arc::clone(&config);

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, &config).await {
                error!("[{}] {:#}", peer, e);
            }
        });
    }
}

async fn handle_connection(mut client: TcpStream, peer: SocketAddr, config: &Config) -> Result<()> {
    let from_client = peek_hello(
        &mut client,
        &mut tokio::io::sink(),
        MessageSource::FromClient,
        config.limits,
    )
    .await
    .context("reading from client")?;
    report(peer, &from_client.parser, &from_client.outcome, config.json);

    let target = match (&config.upstream, from_client.parser.details()) {
        (Some(upstream), _) => upstream.clone(),
        (None, Some(details)) if !details.server_name.is_empty() => {
            format!("{}:{}", details.server_name, config.default_port)
        }
        _ => bail!("no upstream configured and no SNI to route by"),
    };

    let mut upstream = TcpStream::connect(&target)
        .await
        .with_context(|| format!("connecting to {}", target))?;
    debug!("[{}] connected to {}", peer, target);
    upstream
        .write_all(&from_client.buffer)
        .await
        .context("forwarding client bytes")?;

    // Only worth peeking at a server that got a Hello it can answer.
    if matches!(from_client.outcome, PeekOutcome::Done) {
        let from_server = peek_hello(
            &mut upstream,
            &mut client,
            MessageSource::FromServer,
            config.limits,
        )
        .await
        .context("reading from server")?;
        report(peer, &from_server.parser, &from_server.outcome, config.json);
        if matches!(from_server.outcome, PeekOutcome::Eof) {
            return Ok(());
        }
    }

    let (up, down) = tokio::io::copy_bidirectional(&mut client, &mut upstream)
        .await
        .context("splicing")?;
    debug!("[{}] closed after {} bytes up, {} bytes down", peer, up, down);
    Ok(())
}

fn report(peer: SocketAddr, parser: &HandshakeParser, outcome: &PeekOutcome, json: bool) {
    let direction = match parser.source() {
        MessageSource::FromClient => "client",
        MessageSource::FromServer => "server",
    };

    let details = match (outcome, parser.details()) {
        (PeekOutcome::Done, Some(details)) => details,
        (PeekOutcome::Failed(e), _) => {
            warn!("[{}] {} sent something that is not a TLS Hello: {}", peer, direction, e);
            return;
        }
        (other, _) => {
            warn!("[{}] gave up peeking {}: {:?}", peer, direction, other);
            return;
        }
    };

    if json {
        match serde_json::to_string(details) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("[{}] cannot serialize details: {}", peer, e),
        }
        return;
    }

    let version = |v: Option<tlspeek_core::handshake::ProtocolVersion>| {
        v.map_or_else(|| "(unknown)".to_string(), |v| v.to_string())
    };

    info!(
        "[{}] {} Hello ({}): SNI={} version={} record={} ciphers={} ALPN=[{}] resuming={}",
        peer,
        direction,
        parser.done_reason().unwrap_or("?"),
        if details.server_name.is_empty() {
            "(none)"
        } else {
            details.server_name.as_str()
        },
        version(details.tls_supported_version),
        version(details.tls_version),
        details.ciphers.len(),
        details.alpn_protocols().join(","),
        parser.resuming_session(),
    );
    if let Some(alert) = parser.fatal_alert() {
        warn!(
            "[{}] {} sent fatal alert {}",
            peer, direction, alert.description
        );
    }
}
