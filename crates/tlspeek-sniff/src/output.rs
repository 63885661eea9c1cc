use serde::Serialize;

use tlspeek_core::handshake::{MessageSource, ProtocolVersion, TlsDetails};

use crate::grease::filter_grease_u16;
use crate::packet::HelloReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid output format '{}'. Expected 'text' or 'json'.", s),
        }
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    timestamp: String,
    src_ip: String,
    src_port: u16,
    dst_ip: String,
    dst_port: u16,
    source: MessageSource,
    done_reason: &'a str,
    resuming_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fatal_alert: Option<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    alpn: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cipher_names: Option<Vec<String>>,
    details: &'a TlsDetails,
}

pub fn print_report(report: &HelloReport, format: OutputFormat, verbose: bool) {
    match format {
        OutputFormat::Text => print!("{}", render_text(report, verbose)),
        OutputFormat::Json => match render_json(report, verbose) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!("Cannot serialize report for {}: {}", report.flow, e),
        },
    }
}

fn version(v: Option<ProtocolVersion>) -> String {
    v.map_or_else(|| "(unknown)".to_string(), |v| format!("{} (0x{:04x})", v, v.raw()))
}

fn render_text(report: &HelloReport, verbose: bool) -> String {
    let details = &report.details;
    let mut out = String::new();
    let mut line = |label: &str, value: String| {
        out.push_str(&format!("  {:<12}{}\n", label, value));
    };

    out_rule(&mut line);
    line(
        "Source:",
        format!("{}:{}", report.flow.src_ip, report.flow.src_port),
    );
    line(
        "Dest:",
        format!("{}:{}", report.flow.dst_ip, report.flow.dst_port),
    );
    line(
        "Sent by:",
        match report.source {
            MessageSource::FromClient => "client".to_string(),
            MessageSource::FromServer => "server".to_string(),
        },
    );
    line("Done at:", report.done_reason.to_string());
    line(
        "SNI:",
        if details.server_name.is_empty() {
            "(none)".to_string()
        } else {
            details.server_name.clone()
        },
    );
    line("Record ver:", version(details.tls_version));
    line("TLS ver:", version(details.tls_supported_version));
    line("Ciphers:", format!("{} suites", details.ciphers.len()));
    if verbose {
        for name in details.cipher_names() {
            line("", name);
        }
    }
    let extensions: Vec<String> = filter_grease_u16(&details.extensions)
        .iter()
        .map(|e| e.to_string())
        .collect();
    line("Extensions:", extensions.join(","));
    let alpn = details.alpn_protocols();
    if !alpn.is_empty() {
        line("ALPN:", alpn.join(", "));
    }
    if !details.session_id.is_empty() {
        line(
            "Session id:",
            format!("{} bytes", details.session_id.len()),
        );
    }
    if report.resuming_session {
        line("Resuming:", "yes".to_string());
    }
    if let Some(alert) = report.fatal_alert {
        line("Alert:", format!("fatal, description {}", alert.description));
    }
    out_rule(&mut line);
    out.push('\n');
    out
}

fn out_rule(line: &mut impl FnMut(&str, String)) {
    line("", "─".repeat(48));
}

fn render_json(report: &HelloReport, verbose: bool) -> serde_json::Result<String> {
    let record = JsonRecord {
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        src_ip: report.flow.src_ip.to_string(),
        src_port: report.flow.src_port,
        dst_ip: report.flow.dst_ip.to_string(),
        dst_port: report.flow.dst_port,
        source: report.source,
        done_reason: report.done_reason,
        resuming_session: report.resuming_session,
        fatal_alert: report.fatal_alert.map(|a| a.description),
        alpn: report.details.alpn_protocols(),
        cipher_names: verbose.then(|| report.details.cipher_names()),
        details: &report.details,
    };
    serde_json::to_string(&record)
}
