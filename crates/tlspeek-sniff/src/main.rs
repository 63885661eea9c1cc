use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};

mod capture;
mod grease;
mod output;
mod packet;
mod reassembly;

#[derive(Parser)]
#[command(name = "tlspeek-sniff")]
#[command(about = "Passive TLS Hello inspector: parses client and server Hellos from network traffic")]
struct Cli {
    /// Network interface to capture on (e.g., eth0, wlan0).
    /// If omitted, lists available interfaces and exits.
    #[arg(short, long)]
    interface: Option<String>,

    /// BPF filter expression
    #[arg(short, long, default_value = "tcp port 443")]
    filter: String,

    /// TCP port the TLS servers listen on; decides which side is the client
    #[arg(long, default_value_t = 443)]
    server_port: u16,

    /// Enable promiscuous mode (capture all traffic on the segment)
    #[arg(short, long, default_value_t = false)]
    promisc: bool,

    /// Snap length: max bytes captured per packet
    #[arg(short, long, default_value_t = 1600)]
    snaplen: i32,

    /// Print cipher suite names and log parser decisions
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Output format: "text" (human-readable) or "json" (NDJSON, one object per line)
    #[arg(short, long, default_value = "text")]
    output: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let iface = match cli.interface {
        Some(name) => name,
        None => {
            capture::list_interfaces()?;
            return Ok(());
        }
    };

    let format = output::OutputFormat::parse(&cli.output)?;

    info!("Capturing on interface: {}", iface);
    info!("BPF filter: {}", cli.filter);
    info!("Server port: {}", cli.server_port);
    info!("Press Ctrl+C to stop\n");

    capture::run_capture(
        &iface,
        &cli.filter,
        cli.promisc,
        cli.snaplen,
        cli.server_port,
        cli.verbose,
        format,
    )
}
