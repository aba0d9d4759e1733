use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use util::sync::RwLock;
use waitgroup::WaitGroup;

use super::*;
use crate::notifier::Notifiers;
use crate::twcc::TwccRecorder;

/// Tool name announced in SDES unless `with_tool_name` overrides it.
pub const DEFAULT_TOOL_NAME: &str = concat!("rtp-session ", env!("CARGO_PKG_VERSION"));
/// log2 of the per sender history kept for NACK, 512 packets.
const DEFAULT_SEND_HISTORY_LOG2: u8 = 9;

/// SessionBuilder collects the negotiated parameters of an RtpSession.
#[derive(Default)]
pub struct SessionBuilder {
    clock_rate: Option<u32>,
    media_kind: MediaKind,
    report_interval: Option<Duration>,
    housekeeping_interval: Option<Duration>,
    max_out_of_order_packets: Option<usize>,
    out_of_order_wait: Option<Duration>,
    stale_receiver_timeout: Option<Duration>,
    feedback: Feedback,
    header_extensions: HeaderExtensionMap,
    rtx_payload_type: Option<u8>,
    redundancy_payload_type: Option<u8>,
    tool_name: Option<String>,
    cname: Option<String>,
    any_sync_source: Option<bool>,
    now: Option<FnTimeGen>,
}

impl SessionBuilder {
    /// with_clock_rate sets the RTP timestamp rate of the media, 8000 by default.
    pub fn with_clock_rate(mut self, clock_rate: u32) -> SessionBuilder {
        self.clock_rate = Some(clock_rate);
        self
    }

    pub fn with_media_kind(mut self, media_kind: MediaKind) -> SessionBuilder {
        self.media_kind = media_kind;
        self
    }

    /// with_report_interval sets how often `send_report` runs once started.
    pub fn with_report_interval(mut self, interval: Duration) -> SessionBuilder {
        self.report_interval = Some(interval);
        self
    }

    /// with_housekeeping_interval sets how often pending gaps and stale
    /// sources are checked and TWCC feedback is flushed.
    pub fn with_housekeeping_interval(mut self, interval: Duration) -> SessionBuilder {
        self.housekeeping_interval = Some(interval);
        self
    }

    pub fn with_max_out_of_order_packets(mut self, max: usize) -> SessionBuilder {
        self.max_out_of_order_packets = Some(max);
        self
    }

    pub fn with_out_of_order_wait_time(mut self, wait: Duration) -> SessionBuilder {
        self.out_of_order_wait = Some(wait);
        self
    }

    pub fn with_stale_receiver_timeout(mut self, timeout: Duration) -> SessionBuilder {
        self.stale_receiver_timeout = Some(timeout);
        self
    }

    /// with_feedback sets the RTCP feedback types the remote agreed to.
    pub fn with_feedback(mut self, feedback: Feedback) -> SessionBuilder {
        self.feedback = feedback;
        self
    }

    pub fn with_header_extensions(mut self, header_extensions: HeaderExtensionMap) -> SessionBuilder {
        self.header_extensions = header_extensions;
        self
    }

    pub fn with_rtx_payload_type(mut self, payload_type: u8) -> SessionBuilder {
        self.rtx_payload_type = Some(payload_type);
        self
    }

    pub fn with_redundancy_payload_type(mut self, payload_type: u8) -> SessionBuilder {
        self.redundancy_payload_type = Some(payload_type);
        self
    }

    pub fn with_tool_name(mut self, tool_name: &str) -> SessionBuilder {
        self.tool_name = Some(tool_name.to_owned());
        self
    }

    /// with_cname sets the CNAME of sources created without one.
    pub fn with_cname(mut self, cname: &str) -> SessionBuilder {
        self.cname = Some(cname.to_owned());
        self
    }

    /// with_any_sync_source lets one receiver take packets from whatever SSRC
    /// the remote picks, off by default.
    pub fn with_any_sync_source(mut self, allow: bool) -> SessionBuilder {
        self.any_sync_source = Some(allow);
        self
    }

    /// with_now_fn sets an alternative for SystemTime::now.
    pub fn with_now_fn(mut self, now: FnTimeGen) -> SessionBuilder {
        self.now = Some(now);
        self
    }

    fn source_options(&self) -> SourceOptions {
        let defaults = SourceOptions::default();
        SourceOptions {
            clock_rate: self.clock_rate.unwrap_or(defaults.clock_rate),
            max_out_of_order_packets: self
                .max_out_of_order_packets
                .unwrap_or(defaults.max_out_of_order_packets),
            out_of_order_wait: self
                .out_of_order_wait
                .unwrap_or_else(|| self.media_kind.out_of_order_wait()),
            send_history_log2: if self.feedback.contains(Feedback::NACK) {
                Some(DEFAULT_SEND_HISTORY_LOG2)
            } else {
                None
            },
            rtx_payload_type: self.rtx_payload_type,
            redundancy_payload_type: self.redundancy_payload_type,
            abs_send_time_id: self
                .header_extensions
                .id_for(ABS_SEND_TIME_URI, ExtensionDirection::Receive),
        }
    }

    /// build creates a session sending through `transport`. Call `start` on
    /// it to begin periodic reporting.
    pub fn build(self, transport: Arc<dyn Transport + Send + Sync>) -> RtpSession {
        let (close_tx, close_rx) = mpsc::channel(1);
        let config = SessionConfig {
            source_options: self.source_options(),
            report_interval: self.report_interval.unwrap_or(Duration::from_secs(4)),
            housekeeping_interval: self
                .housekeeping_interval
                .unwrap_or(Duration::from_millis(20)),
            stale_receiver_timeout: self
                .stale_receiver_timeout
                .unwrap_or(Duration::from_secs(10)),
            feedback: self.feedback,
            tool_name: self
                .tool_name
                .unwrap_or_else(|| DEFAULT_TOOL_NAME.to_owned()),
            cname: self.cname.unwrap_or_default(),
        };

        RtpSession {
            internal: Arc::new(SessionInternal {
                config,
                now: self.now,
                transport,
                header_extensions: self.header_extensions,
                sources: RwLock::new(SourceMap {
                    sources: HashMap::new(),
                    primaries: BTreeMap::new(),
                    defaults: [None, None],
                    aliases: HashMap::new(),
                    explicit: false,
                }),
                any_sync_source: AtomicBool::new(self.any_sync_source.unwrap_or(false)),
                closed: AtomicBool::new(false),
                notifiers: RwLock::new(Notifiers::default()),
                dispatching: RwLock::new(()),
                twcc: util::sync::Mutex::new(TwccRecorder::new(0)),
                transport_sequence: AtomicU16::new(0),
                fir_sequence: AtomicU8::new(0),
                tstr_sequence: AtomicU8::new(0),
                close_rx: Mutex::new(Some(close_rx)),
            }),

            wg: Mutex::new(Some(WaitGroup::new())),
            close_tx: Mutex::new(Some(close_tx)),
        }
    }
}
