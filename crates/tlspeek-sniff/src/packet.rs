use std::net::IpAddr;

use anyhow::{bail, Result};
use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use tlspeek_core::handshake::{Alert, HandshakeParser, MessageSource, TlsDetails};

use crate::reassembly::FlowKey;

/// The TCP part of a captured frame.
pub struct Segment {
    pub flow: FlowKey,
    pub payload: Vec<u8>,
    /// FIN or RST: the flow will carry no more data.
    pub closing: bool,
}

/// What one direction of a connection revealed about its handshake.
pub struct HelloReport {
    pub flow: FlowKey,
    pub source: MessageSource,
    pub done_reason: &'static str,
    pub resuming_session: bool,
    pub fatal_alert: Option<Alert>,
    pub details: TlsDetails,
}

impl HelloReport {
    /// Build a report from a parser that has finished. Returns `None` while
    /// the parser still wants more data.
    pub fn from_parser(flow: FlowKey, parser: HandshakeParser) -> Option<Self> {
        let source = parser.source();
        let done_reason = parser.done_reason()?;
        let resuming_session = parser.resuming_session();
        let fatal_alert = parser.fatal_alert();
        let details = parser.into_details()?;
        Some(Self {
            flow,
            source,
            done_reason,
            resuming_session,
            fatal_alert,
            details,
        })
    }
}

/// Slice a captured Ethernet frame down to its TCP segment.
///
/// Returns:
/// - `Ok(Some(segment))` for TCP segments with payload or a FIN/RST flag
/// - `Ok(None)` for bare ACKs and SYNs
/// - `Err` if the frame is not TCP over IP
pub fn parse_packet(raw: &[u8]) -> Result<Option<Segment>> {
    let sliced = SlicedPacket::from_ethernet(raw)?;

    let (src_ip, dst_ip) = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let hdr = ipv4.header();
            (
                IpAddr::V4(hdr.source_addr()),
                IpAddr::V4(hdr.destination_addr()),
            )
        }
        Some(NetSlice::Ipv6(ipv6)) => {
            let hdr = ipv6.header();
            (
                IpAddr::V6(hdr.source_addr()),
                IpAddr::V6(hdr.destination_addr()),
            )
        }
        _ => bail!("No IP header found"),
    };

    let Some(TransportSlice::Tcp(tcp)) = &sliced.transport else {
        bail!("Not a TCP packet");
    };

    let closing = tcp.fin() || tcp.rst();
    if tcp.payload().is_empty() && !closing {
        return Ok(None);
    }

    Ok(Some(Segment {
        flow: FlowKey {
            src_ip,
            src_port: tcp.source_port(),
            dst_ip,
            dst_port: tcp.destination_port(),
        },
        payload: tcp.payload().to_vec(),
        closing,
    }))
}
