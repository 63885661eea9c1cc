use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use tlspeek_core::handshake::{HandshakeParser, MessageSource};
use tlspeek_core::ParseError;

/// Identifies a unidirectional TCP flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// Bytes seen so far on one flow, and the parser fed with them.
struct FlowSession {
    data: Vec<u8>,
    parser: HandshakeParser,
    first_seen: Instant,
}

/// Outcome of feeding a segment to the flow table.
pub enum ProcessResult {
    /// The parser finished; it carries the extracted details.
    Complete(HandshakeParser),
    /// Segment was buffered; the parser needs more data.
    Buffering,
    /// The flow is not TLS we can read.
    Failed(ParseError),
    /// Segment was skipped (not relevant for inspection).
    Skipped,
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_BUFFER: usize = 64 * 1024;
const DEFAULT_MAX_FLOWS: usize = 4096;
const MAX_COMPLETED: usize = 65536;

/// Keeps one `HandshakeParser` per unidirectional flow towards or from the
/// server port and re-runs it over the accumulated payload after every
/// segment.
///
/// Segments must arrive in order; a retransmitted or reordered segment
/// corrupts the flow's byte stream and usually ends in a parse failure.
pub struct FlowTable {
    flows: HashMap<FlowKey, FlowSession>,
    completed: HashSet<FlowKey>,
    server_port: u16,
    timeout: Duration,
    max_buffer_size: usize,
    max_flows: usize,
}

impl FlowTable {
    pub fn new(server_port: u16) -> Self {
        Self {
            flows: HashMap::new(),
            completed: HashSet::new(),
            server_port,
            timeout: DEFAULT_TIMEOUT,
            max_buffer_size: DEFAULT_MAX_BUFFER,
            max_flows: DEFAULT_MAX_FLOWS,
        }
    }

    /// Which peer sends on this flow, judged by the server port.
    fn source_of(&self, flow: &FlowKey) -> Option<MessageSource> {
        if flow.dst_port == self.server_port {
            Some(MessageSource::FromClient)
        } else if flow.src_port == self.server_port {
            Some(MessageSource::FromServer)
        } else {
            None
        }
    }

    /// Append a TCP payload to its flow and re-run the flow's parser.
    pub fn process(&mut self, flow: FlowKey, tcp_payload: &[u8]) -> ProcessResult {
        // Already inspected this flow; skip all further packets.
        if self.completed.contains(&flow) || tcp_payload.is_empty() {
            return ProcessResult::Skipped;
        }

        if !self.flows.contains_key(&flow) {
            let Some(source) = self.source_of(&flow) else {
                return ProcessResult::Skipped;
            };
            if self.flows.len() >= self.max_flows {
                debug!("Max concurrent flows ({}) reached, evicting oldest", self.max_flows);
                self.evict_oldest();
            }
            self.flows.insert(
                flow,
                FlowSession {
                    data: Vec::new(),
                    parser: HandshakeParser::new(source),
                    first_seen: Instant::now(),
                },
            );
        }

        let Some(session) = self.flows.get_mut(&flow) else {
            return ProcessResult::Skipped;
        };
        session.data.extend_from_slice(tcp_payload);

        if session.data.len() > self.max_buffer_size {
            warn!(
                "Handshake too large to buffer: {} bytes (max {}). Skipping {}",
                session.data.len(),
                self.max_buffer_size,
                flow
            );
            self.finish(flow);
            return ProcessResult::Skipped;
        }

        match session.parser.parse_hello(&session.data) {
            Ok(false) => {
                debug!("Buffering handshake: {} bytes ({})", session.data.len(), flow);
                ProcessResult::Buffering
            }
            Ok(true) => match self.finish(flow) {
                Some(session) => {
                    debug!(
                        "Parsed handshake after {} bytes ({})",
                        session.data.len(),
                        flow
                    );
                    ProcessResult::Complete(session.parser)
                }
                None => ProcessResult::Skipped,
            },
            Err(e) => {
                debug!("Not a readable TLS handshake: {} ({})", e, flow);
                self.finish(flow);
                ProcessResult::Failed(e)
            }
        }
    }

    /// Forget a flow whose connection is closing.
    pub fn close(&mut self, flow: &FlowKey) {
        if let Some(session) = self.flows.remove(flow) {
            debug!(
                "Flow closed before the handshake was parsed: {} ({} bytes buffered)",
                flow,
                session.data.len()
            );
        }
        self.completed.remove(flow);
    }

    fn finish(&mut self, flow: FlowKey) -> Option<FlowSession> {
        if self.completed.len() >= MAX_COMPLETED {
            debug!("Completed set full, clearing {} entries", self.completed.len());
            self.completed.clear();
        }
        self.completed.insert(flow);
        self.flows.remove(&flow)
    }

    fn evict_oldest(&mut self) {
        if let Some((&oldest_key, _)) = self.flows.iter().min_by_key(|(_, s)| s.first_seen) {
            debug!("Evicting stale flow buffer: {}", oldest_key);
            self.flows.remove(&oldest_key);
        }
    }

    /// Evict all flows that have exceeded the timeout.
    /// Returns the number of evicted flows.
    pub fn evict_stale(&mut self) -> usize {
        let now = Instant::now();
        let before = self.flows.len();

        self.flows.retain(|flow, session| {
            let stale = now.duration_since(session.first_seen) > self.timeout;
            if stale {
                debug!(
                    "Evicting timed-out flow: {} (buffered {} bytes, age {:?})",
                    flow,
                    session.data.len(),
                    now.duration_since(session.first_seen)
                );
            }
            !stale
        });

        before - self.flows.len()
    }
}
