
mod send_history;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Weak;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rtcp::extended_report::DlrrReport;
use rtcp::reception_report::{ReceptionReport, TOTAL_LOST_MAX, TOTAL_LOST_MIN};
use rtcp::sender_report::SenderReport;
use rtp::extension::abs_send_time_extension::{ntp2unix, unix2ntp, AbsSendTimeExtension};
use rtp::packet::Packet;
use rtp::sequence::{new_fixed_sequencer, new_random_sequencer, Sequencer};
use send_history::SendHistory;
use util::marshal::Unmarshal;

use crate::error::{Error, Result};
use crate::stats::SyncSourceStats;
use crate::{Direction, JitterBuffer, ReceiveType, RewriteMode, SendReceiveStatus};

/// A delta above this is a packet from the past: late or duplicated.
const SEQUENCE_REORDER_THRESHOLD: u16 = u16::MAX - 99;
/// A forward delta above this is treated as a jump, not as loss.
const SEQUENCE_RESTART_THRESHOLD: u16 = 3000;
const MAX_CONSECUTIVE_JUMPS: u32 = 10;
/// 128 * 64 sequence numbers of receive history
const RECEIVED_BITMAP_WORDS: usize = 128;
const MAX_RTT_DELAY: Duration = Duration::from_secs(2);
const MIN_RTT: Duration = Duration::from_millis(1);
const JITTER_GUARD_BITS: u32 = 4;

/// Per source knobs, derived from the session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    pub clock_rate: u32,
    pub max_out_of_order_packets: usize,
    pub out_of_order_wait: Duration,
    /// log2 of the send history size, None when NACK is not negotiated
    pub send_history_log2: Option<u8>,
    pub rtx_payload_type: Option<u8>,
    pub redundancy_payload_type: Option<u8>,
    /// id of the abs-send-time extension on received packets
    pub abs_send_time_id: Option<u16>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        SourceOptions {
            clock_rate: 8000,
            max_out_of_order_packets: 20,
            out_of_order_wait: Duration::from_millis(40),
            send_history_log2: None,
            rtx_payload_type: None,
            redundancy_payload_type: None,
            abs_send_time_id: None,
        }
    }
}

/// What became of a received packet: frames ready for delivery, in sequence
/// order, and sequence numbers given up as lost.
#[derive(Debug, Default)]
pub struct ReceiveOutcome {
    pub frames: Vec<(Packet, ReceiveType)>,
    pub lost: Vec<u16>,
}

impl ReceiveOutcome {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.lost.is_empty()
    }
}

/// ReportMark is the receive position a reception report was cut at. It
/// becomes the baseline of the next report once committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportMark {
    expected: u64,
    received: u64,
}

/// cumulative_lost is expected minus received, negative when duplicates
/// outnumber losses, clamped to the signed 24 bits of a report block.
pub(crate) fn cumulative_lost(expected: u64, received: u64) -> i32 {
    let lost = expected as i64 - received as i64;
    lost.clamp(TOTAL_LOST_MIN as i64, TOTAL_LOST_MAX as i64) as i32
}

#[derive(Debug)]
struct PendingFrame {
    packet: Packet,
    receive_type: ReceiveType,
}

/// SyncSourceState tracks one SSRC, in either direction.
pub struct SyncSourceState {
    ssrc: u32,
    direction: Direction,
    cname: String,
    options: SourceOptions,
    stats: SyncSourceStats,

    rtx_ssrc: Option<u32>,
    rtx_primary: Option<u32>,
    rtx_payload_type: Option<u8>,
    closing: bool,
    jitter_buffer: Option<Weak<dyn JitterBuffer + Send + Sync>>,

    // receive sequencing
    started: bool,
    last_seq: u16,
    ext_last: u64,
    base_ext: u64,
    accepted: u64,
    consecutive_jumps: u32,
    received: Vec<u64>,
    pending: BTreeMap<u64, PendingFrame>,
    deadline: Option<SystemTime>,
    primary_payload_type: Option<u8>,

    // jitter
    jitter_q4: u64,
    last_arrival_units: i64,
    last_timestamp: u32,

    // receiver reports
    expected_prior: u64,
    received_prior: u64,
    last_sr: Option<(u64, SystemTime)>,
    rrtr: Option<(u32, SystemTime)>,

    // sending
    sequencer: Option<Box<dyn Sequencer + Send + Sync>>,
    last_sent_seq: u16,
    sent_started: bool,
    report_timestamp: u32,
    report_absolute_time: Option<SystemTime>,
    packets_at_last_sr: u64,
    last_sr_sent: Option<(u64, SystemTime)>,
    history: Option<SendHistory>,
}

impl fmt::Debug for SyncSourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSourceState")
            .field("ssrc", &format_args!("{:08x}", self.ssrc))
            .field("direction", &self.direction)
            .field("cname", &self.cname)
            .field("rtx_ssrc", &self.rtx_ssrc)
            .field("rtx_primary", &self.rtx_primary)
            .field("ext_last", &self.ext_last)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl SyncSourceState {
    pub fn new(ssrc: u32, direction: Direction, cname: &str, options: SourceOptions) -> Self {
        let history = match direction {
            Direction::Sender => options.send_history_log2.map(SendHistory::new),
            Direction::Receiver => None,
        };
        SyncSourceState {
            ssrc,
            direction,
            cname: cname.to_owned(),
            stats: SyncSourceStats::new(ssrc, direction, cname),
            rtx_ssrc: None,
            rtx_primary: None,
            rtx_payload_type: options.rtx_payload_type,
            closing: false,
            jitter_buffer: None,

            started: false,
            last_seq: 0,
            ext_last: 0,
            base_ext: 0,
            accepted: 0,
            consecutive_jumps: 0,
            received: vec![0u64; RECEIVED_BITMAP_WORDS],
            pending: BTreeMap::new(),
            deadline: None,
            primary_payload_type: None,

            jitter_q4: 0,
            last_arrival_units: 0,
            last_timestamp: 0,

            expected_prior: 0,
            received_prior: 0,
            last_sr: None,
            rrtr: None,

            sequencer: None,
            last_sent_seq: 0,
            sent_started: false,
            report_timestamp: 0,
            report_absolute_time: None,
            packets_at_last_sr: 0,
            last_sr_sent: None,
            history,
            options,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn cname(&self) -> &str {
        &self.cname
    }

    pub fn set_cname(&mut self, cname: &str) {
        if self.cname != cname {
            log::debug!("ssrc={:08x} cname set to {}", self.ssrc, cname);
            self.cname = cname.to_owned();
            self.stats.cname = cname.to_owned();
        }
    }

    pub fn rtx_ssrc(&self) -> Option<u32> {
        self.rtx_ssrc
    }

    /// rtx_primary is set on a retransmission source and names its primary.
    pub fn rtx_primary(&self) -> Option<u32> {
        self.rtx_primary
    }

    pub fn rtx_payload_type(&self) -> Option<u8> {
        self.rtx_payload_type
    }

    pub fn is_rtx(&self) -> bool {
        self.rtx_primary.is_some()
    }

    pub(crate) fn link_rtx(&mut self, rtx_ssrc: u32, payload_type: u8) {
        self.rtx_ssrc = Some(rtx_ssrc);
        self.rtx_payload_type = Some(payload_type);
    }

    pub(crate) fn link_primary(&mut self, primary: u32, payload_type: u8) {
        self.rtx_primary = Some(primary);
        self.rtx_payload_type = Some(payload_type);
    }

    pub(crate) fn set_rtx_payload_type(&mut self, payload_type: u8) {
        self.rtx_payload_type = Some(payload_type);
    }

    pub(crate) fn unlink_rtx(&mut self) {
        self.rtx_ssrc = None;
        self.rtx_primary = None;
    }

    pub fn set_jitter_buffer(&mut self, jitter_buffer: Option<Weak<dyn JitterBuffer + Send + Sync>>) {
        self.jitter_buffer = jitter_buffer;
    }

    pub fn mark_closing(&mut self) {
        self.closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// can_remove is true once a closing source has nothing left to deliver.
    pub fn can_remove(&self) -> bool {
        self.closing && self.pending.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// cancel_pending drops held frames without counting them lost.
    pub fn cancel_pending(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }

    pub fn packets_received(&self) -> u64 {
        self.accepted
    }

    pub fn packets_sent(&self) -> u64 {
        match self.direction {
            Direction::Sender => self.stats.packets,
            Direction::Receiver => 0,
        }
    }

    /// statistics returns a snapshot with the derived values filled in.
    pub fn statistics(&self) -> SyncSourceStats {
        let mut stats = self.stats.clone();
        stats.rtx_ssrc = self.rtx_ssrc;
        if self.direction == Direction::Receiver {
            stats.packets_lost = self.expected() as i64 - self.accepted as i64;
            stats.jitter = self.jitter();
            stats.jitter_ms = if self.options.clock_rate > 0 {
                stats.jitter as f64 * 1000.0 / self.options.clock_rate as f64
            } else {
                0.0
            };
            stats.extended_sequence_number = self.ext_last as u32;
            if let Some(jb) = self.jitter_buffer.as_ref().and_then(|w| w.upgrade()) {
                stats.jitter_buffer_too_late = jb.packets_too_late();
            }
        }
        stats
    }

    /// jitter is the interarrival jitter in timestamp units.
    pub fn jitter(&self) -> u32 {
        (self.jitter_q4 >> JITTER_GUARD_BITS).min(u32::MAX as u64) as u32
    }

    fn expected(&self) -> u64 {
        if self.started {
            self.ext_last + 1 - self.base_ext
        } else {
            0
        }
    }

    fn set_received(&mut self, seq: u16) {
        let pos = (seq as usize) % (self.received.len() * 64);
        self.received[pos / 64] |= 1 << (pos % 64);
    }

    fn del_received(&mut self, seq: u16) {
        let pos = (seq as usize) % (self.received.len() * 64);
        self.received[pos / 64] &= u64::MAX ^ (1u64 << (pos % 64));
    }

    fn get_received(&self, seq: u16) -> bool {
        let pos = (seq as usize) % (self.received.len() * 64);
        (self.received[pos / 64] & (1 << (pos % 64))) != 0
    }

    /// Without a jitter buffer, or with one that does not delay, the source
    /// puts packets back in order itself.
    fn resequencing(&self) -> bool {
        match self.jitter_buffer.as_ref().and_then(|w| w.upgrade()) {
            Some(jb) => jb.current_jitter_delay().is_zero(),
            None => true,
        }
    }

    /// on_receive_data runs one received packet through the sequencing state.
    pub fn on_receive_data(
        &mut self,
        mut packet: Packet,
        receive_type: ReceiveType,
        now: SystemTime,
    ) -> Result<ReceiveOutcome> {
        if receive_type == ReceiveType::Network && !self.is_rtx() {
            let pt = packet.payload_type();
            if self.rtx_payload_type == Some(pt) {
                strip_osn(&mut packet)?;
                return self.on_receive_data(packet, ReceiveType::Retransmit, now);
            }
            if self.options.redundancy_payload_type == Some(pt) {
                return self.on_receive_redundant(packet, now);
            }
        }

        if receive_type.is_retransmission() {
            if let Some(pt) = self.primary_payload_type {
                packet.set_payload_type(pt);
            }
        } else if receive_type == ReceiveType::Network {
            self.primary_payload_type = Some(packet.payload_type());
            self.note_transmit_time(&packet, now);
        }

        let mut out = ReceiveOutcome::default();
        self.process(packet, receive_type, now, &mut out);
        self.check_pending(now, &mut out);
        Ok(out)
    }

    /// unwrap_retransmission turns a packet received on this rtx source into
    /// the packet its primary lost. The caller feeds the result to the
    /// primary as `ReceiveType::FromRtx`.
    pub fn unwrap_retransmission(&mut self, mut packet: Packet, now: SystemTime) -> Result<Packet> {
        self.stats.packets += 1;
        self.stats.octets += packet.payload_size() as u64;
        self.stats.first_packet_time.get_or_insert(now);
        self.stats.last_packet_time = Some(now);
        strip_osn(&mut packet)?;
        Ok(packet)
    }

    fn on_receive_redundant(&mut self, packet: Packet, now: SystemTime) -> Result<ReceiveOutcome> {
        let payload = Bytes::copy_from_slice(packet.payload());
        let (secondary, primary) = rtp::redundancy::decode_redundant(&payload)
            .map_err(|err| Error::InvalidPacket(err.to_string()))?;

        let mut out = ReceiveOutcome::default();
        let n = secondary.len();
        for (i, block) in secondary.iter().enumerate() {
            if !self.started {
                break;
            }
            let mut p = packet.clone();
            p.set_sequence_number(packet.sequence_number().wrapping_sub((n - i) as u16));
            p.set_timestamp(
                packet
                    .timestamp()
                    .wrapping_sub(block.timestamp_offset as u32),
            );
            p.set_payload_type(block.payload_type);
            p.set_marker(false);
            p.set_payload(&block.data);
            self.process(p, ReceiveType::Redundant, now, &mut out);
        }

        let mut p = packet;
        p.set_payload_type(primary.payload_type);
        p.set_payload(&primary.data);
        self.primary_payload_type = Some(primary.payload_type);
        self.note_transmit_time(&p, now);
        self.process(p, ReceiveType::Network, now, &mut out);
        self.check_pending(now, &mut out);

        Ok(out)
    }

    fn note_transmit_time(&mut self, packet: &Packet, now: SystemTime) {
        let Some(id) = self.options.abs_send_time_id else {
            return;
        };
        let Some(mut raw) = packet.get_extension(id) else {
            return;
        };
        match AbsSendTimeExtension::unmarshal(&mut raw) {
            Ok(ext) => {
                let ntp = ext.extend(unix2ntp(now));
                self.stats.last_transmit_time = Some(ntp2unix(ntp));
            }
            Err(err) => log::trace!("ssrc={:08x} bad abs-send-time: {}", self.ssrc, err),
        }
    }

    fn process(
        &mut self,
        packet: Packet,
        receive_type: ReceiveType,
        now: SystemTime,
        out: &mut ReceiveOutcome,
    ) {
        let seq = packet.sequence_number();
        self.stats.last_packet_time = Some(now);

        if !self.started {
            log::debug!("ssrc={:08x} first packet seq={}", self.ssrc, seq);
            self.started = true;
            self.stats.first_packet_time = Some(now);
            self.ext_last = seq as u64;
            self.base_ext = seq as u64;
            self.set_jitter_reference(packet.timestamp(), now);
            self.accept(seq as u64, packet, receive_type, out);
            return;
        }

        let delta = seq.wrapping_sub(self.last_seq.wrapping_add(1));
        if delta == 0 {
            self.consecutive_jumps = 0;
            if receive_type.is_retransmission() {
                self.stats.rtx_packets += 1;
            }
            if receive_type == ReceiveType::Network {
                if self.pending.is_empty() {
                    self.update_jitter(packet.timestamp(), now);
                } else {
                    self.stats.out_of_order += 1;
                }
            }
            self.accept(self.ext_last + 1, packet, receive_type, out);
            self.release_pending(now, out);
        } else if delta > SEQUENCE_REORDER_THRESHOLD {
            match receive_type {
                ReceiveType::Redundant => {}
                ReceiveType::Retransmit | ReceiveType::FromRtx if self.get_received(seq) => {
                    log::trace!("ssrc={:08x} duplicate retransmission seq={}", self.ssrc, seq);
                    self.stats.rtx_duplicates += 1;
                }
                _ => {
                    log::trace!("ssrc={:08x} late packet seq={}", self.ssrc, seq);
                    self.stats.late_out_of_order += 1;
                }
            }
        } else if delta > SEQUENCE_RESTART_THRESHOLD {
            if receive_type.is_retransmission() {
                self.stats.late_out_of_order += 1;
            }
            if receive_type != ReceiveType::Network {
                return;
            }
            self.on_jump(packet, now, out);
        } else {
            self.consecutive_jumps = 0;
            self.on_gap(delta, packet, receive_type, now, out);
        }
    }

    fn on_jump(&mut self, packet: Packet, now: SystemTime, out: &mut ReceiveOutcome) {
        let seq = packet.sequence_number();
        self.stats.out_of_order += 1;
        self.consecutive_jumps += 1;

        if self.consecutive_jumps < MAX_CONSECUTIVE_JUMPS {
            log::trace!(
                "ssrc={:08x} sequence jump {} -> {}",
                self.ssrc,
                self.last_seq,
                seq
            );
            self.deliver(packet, ReceiveType::Network, out);
            return;
        }

        log::debug!(
            "ssrc={:08x} resynchronising sequence {} -> {}",
            self.ssrc,
            self.last_seq,
            seq
        );
        let mut ext = (self.ext_last & !0xFFFF) | seq as u64;
        if seq < self.last_seq {
            ext += 0x10000;
        }
        // the jump itself is not loss
        self.base_ext += ext - self.ext_last - 1;
        self.consecutive_jumps = 0;
        self.cancel_pending();
        self.set_jitter_reference(packet.timestamp(), now);
        self.accept(ext, packet, ReceiveType::Network, out);
    }

    fn on_gap(
        &mut self,
        delta: u16,
        packet: Packet,
        receive_type: ReceiveType,
        now: SystemTime,
        out: &mut ReceiveOutcome,
    ) {
        let ext = self.ext_last + 1 + delta as u64;

        if receive_type != ReceiveType::Network {
            // only fills a hole we are already waiting on
            let expected = self
                .pending
                .keys()
                .next_back()
                .map_or(false, |&last| ext < last);
            if self.pending.contains_key(&ext) {
                if receive_type.is_retransmission() {
                    self.stats.rtx_duplicates += 1;
                }
            } else if expected {
                if receive_type.is_retransmission() {
                    self.stats.rtx_packets += 1;
                }
                self.pending.insert(
                    ext,
                    PendingFrame {
                        packet,
                        receive_type,
                    },
                );
            } else if receive_type.is_retransmission() {
                log::trace!(
                    "ssrc={:08x} unexpected retransmission seq={}",
                    self.ssrc,
                    packet.sequence_number()
                );
                self.stats.late_out_of_order += 1;
            }
            return;
        }

        if !self.resequencing() {
            self.record_loss(self.ext_last + 1, ext, out);
            self.set_jitter_reference(packet.timestamp(), now);
            self.accept(ext, packet, receive_type, out);
            return;
        }

        if self.pending.contains_key(&ext) {
            log::trace!(
                "ssrc={:08x} duplicate of held seq={}",
                self.ssrc,
                packet.sequence_number()
            );
            return;
        }
        if self.pending.is_empty() {
            self.deadline = Some(now + self.options.out_of_order_wait);
        }
        log::trace!(
            "ssrc={:08x} holding seq={} waiting for {} packets",
            self.ssrc,
            packet.sequence_number(),
            delta
        );
        self.pending.insert(
            ext,
            PendingFrame {
                packet,
                receive_type,
            },
        );
    }

    fn accept(
        &mut self,
        ext: u64,
        packet: Packet,
        receive_type: ReceiveType,
        out: &mut ReceiveOutcome,
    ) {
        self.ext_last = ext;
        self.last_seq = packet.sequence_number();
        self.accepted += 1;
        self.set_received(self.last_seq);
        self.deliver(packet, receive_type, out);
    }

    fn deliver(&mut self, packet: Packet, receive_type: ReceiveType, out: &mut ReceiveOutcome) {
        self.stats.packets += 1;
        self.stats.octets += packet.payload_size() as u64;
        if packet.marker() {
            self.stats.markers += 1;
        }
        out.frames.push((packet, receive_type));
    }

    /// record_loss gives up on extended sequence numbers `from..to`.
    fn record_loss(&mut self, from: u64, to: u64, out: &mut ReceiveOutcome) {
        let gap = to.saturating_sub(from);
        if gap == 0 {
            return;
        }
        log::trace!("ssrc={:08x} lost {} packets from {}", self.ssrc, gap, from as u16);
        self.stats.packets_unrecovered += gap;
        self.stats.max_consecutive_lost = self.stats.max_consecutive_lost.max(gap);
        for ext in from..to {
            self.del_received(ext as u16);
            out.lost.push(ext as u16);
        }
    }

    fn release_pending(&mut self, now: SystemTime, out: &mut ReceiveOutcome) {
        while let Some(&ext) = self.pending.keys().next() {
            if ext != self.ext_last + 1 {
                break;
            }
            if let Some(frame) = self.pending.remove(&ext) {
                self.accept(ext, frame.packet, frame.receive_type, out);
            }
        }

        self.deadline = if self.pending.is_empty() {
            None
        } else {
            Some(now + self.options.out_of_order_wait)
        };
    }

    fn check_pending(&mut self, now: SystemTime, out: &mut ReceiveOutcome) {
        while !self.pending.is_empty()
            && (self.pending.len() > self.options.max_out_of_order_packets
                || self.deadline.map_or(false, |d| now >= d))
        {
            let Some(&ext) = self.pending.keys().next() else {
                break;
            };
            let Some(frame) = self.pending.remove(&ext) else {
                break;
            };
            self.record_loss(self.ext_last + 1, ext, out);
            self.accept(ext, frame.packet, frame.receive_type, out);
            self.release_pending(now, out);
        }
    }

    /// poll_pending finalises gaps whose wait has run out.
    pub fn poll_pending(&mut self, now: SystemTime) -> ReceiveOutcome {
        let mut out = ReceiveOutcome::default();
        self.check_pending(now, &mut out);
        out
    }

    fn arrival_units(&self, now: SystemTime) -> i64 {
        let us = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_micros();
        (us * self.options.clock_rate as u128 / 1_000_000) as i64
    }

    fn set_jitter_reference(&mut self, timestamp: u32, now: SystemTime) {
        self.last_arrival_units = self.arrival_units(now);
        self.last_timestamp = timestamp;
    }

    /// RFC 3550 A.8, with the estimate kept in fixed point.
    fn update_jitter(&mut self, timestamp: u32, now: SystemTime) {
        let arrival = self.arrival_units(now);
        let d = (arrival - self.last_arrival_units)
            - timestamp.wrapping_sub(self.last_timestamp) as i32 as i64;
        self.jitter_q4 =
            self.jitter_q4 + d.unsigned_abs() - ((self.jitter_q4 + 8) >> JITTER_GUARD_BITS);
        self.stats.max_jitter = self.stats.max_jitter.max(self.jitter());

        self.last_arrival_units = arrival;
        self.last_timestamp = timestamp;
    }

    /// receiver_report builds this source's block for an SR or RR, or None
    /// when nothing arrived since the last committed one. The interval
    /// baseline only moves with `commit_receiver_report`.
    pub fn receiver_report(&self, now: SystemTime) -> Option<(ReceptionReport, ReportMark)> {
        if !self.started || self.accepted == self.received_prior {
            return None;
        }

        let expected = self.expected();
        let expected_interval = expected.saturating_sub(self.expected_prior);
        let received_interval = self.accepted.saturating_sub(self.received_prior);
        let lost_interval = expected_interval.saturating_sub(received_interval);
        let fraction_lost = if expected_interval == 0 || lost_interval == 0 {
            0
        } else {
            ((lost_interval << 8) / expected_interval).min(255) as u8
        };

        let (last_sender_report, delay) = match self.last_sr {
            Some((ntp, at)) => ((ntp >> 16) as u32, delay_since(at, now)),
            None => (0, 0),
        };

        let report = ReceptionReport {
            ssrc: self.ssrc,
            fraction_lost,
            total_lost: cumulative_lost(expected, self.accepted),
            last_sequence_number: self.ext_last as u32,
            jitter: self.jitter(),
            last_sender_report,
            delay,
        };
        let mark = ReportMark {
            expected,
            received: self.accepted,
        };
        Some((report, mark))
    }

    /// commit_receiver_report records that the block cut at `mark` went out.
    pub fn commit_receiver_report(&mut self, mark: ReportMark) {
        self.expected_prior = mark.expected;
        self.received_prior = mark.received;
    }

    /// on_send_receiver_report is `receiver_report` committed at once.
    pub fn on_send_receiver_report(&mut self, now: SystemTime) -> Option<ReceptionReport> {
        let (report, mark) = self.receiver_report(now)?;
        self.commit_receiver_report(mark);
        Some(report)
    }

    /// has_sent_since_report is true when an SR would carry new counts.
    pub fn has_sent_since_report(&self) -> bool {
        self.stats.packets > self.packets_at_last_sr
    }

    /// on_send_sender_report fills an SR from the last sent packet, or None
    /// when nothing has been sent yet and an RR should go out instead.
    pub fn on_send_sender_report(&mut self, now: SystemTime) -> Option<SenderReport> {
        if self.direction != Direction::Sender || self.stats.packets == 0 {
            return None;
        }

        let elapsed = self
            .report_absolute_time
            .and_then(|at| now.duration_since(at).ok())
            .unwrap_or_default();
        let advance = elapsed.as_micros() * self.options.clock_rate as u128 / 1_000_000;
        let rtp_time = self.report_timestamp.wrapping_add(advance as u32);
        let ntp_time = unix2ntp(now);

        self.last_sr_sent = Some((ntp_time, now));
        self.packets_at_last_sr = self.stats.packets;

        Some(SenderReport {
            ssrc: self.ssrc,
            ntp_time,
            rtp_time,
            packet_count: self.stats.packets as u32,
            octet_count: self.stats.octets as u32,
            ..Default::default()
        })
    }

    /// on_receive_sender_report stores the reference for LSR/DLSR.
    pub fn on_receive_sender_report(&mut self, sr: &SenderReport, now: SystemTime) {
        self.last_sr = Some((sr.ntp_time, now));
        self.stats.last_sender_report_time = Some(now);
    }

    /// on_receive_reception_report takes a remote block about this sender.
    pub fn on_receive_reception_report(&mut self, report: &ReceptionReport, now: SystemTime) {
        self.stats.remote_fraction_lost = report.fraction_lost;
        self.stats.remote_jitter = report.jitter;
        self.update_rtt(report.last_sender_report, report.delay, now);
    }

    pub fn on_receive_rrtr(&mut self, ntp: u64, now: SystemTime) {
        self.rrtr = Some(((ntp >> 16) as u32, now));
    }

    /// on_receive_dlrr handles the answer to an RRTR we sent with our SR.
    pub fn on_receive_dlrr(&mut self, report: &DlrrReport, now: SystemTime) {
        self.update_rtt(report.last_rr, report.dlrr, now);
    }

    pub fn dlrr_report(&self, now: SystemTime) -> Option<DlrrReport> {
        self.rrtr.map(|(last_rr, at)| DlrrReport {
            ssrc: self.ssrc,
            last_rr,
            dlrr: delay_since(at, now),
        })
    }

    fn update_rtt(&mut self, lsr: u32, dlsr: u32, now: SystemTime) {
        if lsr == 0 {
            return;
        }
        let Some((_, sent)) = self.last_sr_sent else {
            return;
        };
        let Ok(my_delay) = now.duration_since(sent) else {
            return;
        };
        if my_delay > MAX_RTT_DELAY {
            log::trace!(
                "ssrc={:08x} report too old for RTT: {:?}",
                self.ssrc,
                my_delay
            );
            return;
        }

        let dlsr = Duration::from_micros(dlsr as u64 * 1_000_000 / 65536);
        if my_delay <= dlsr {
            self.stats.round_trip_time.get_or_insert(MIN_RTT);
        } else {
            self.stats.round_trip_time = Some(my_delay - dlsr);
        }
    }

    /// is_stale is true for a receiver that stopped sending both media and
    /// sender reports for longer than `timeout`.
    pub fn is_stale(&self, now: SystemTime, timeout: Duration) -> bool {
        let older = |t: SystemTime| now.duration_since(t).map_or(false, |d| d > timeout);
        self.direction == Direction::Receiver
            && !self.is_rtx()
            && self.stats.packets > 0
            && self.last_sr.map_or(true, |(_, at)| older(at))
            && self.stats.last_packet_time.map_or(false, older)
    }

    fn next_sequence_number(&mut self) -> u16 {
        if self.sequencer.is_none() {
            let sequencer: Box<dyn Sequencer + Send + Sync> = if self.sent_started {
                Box::new(new_fixed_sequencer(self.last_sent_seq.wrapping_add(1)))
            } else {
                Box::new(new_random_sequencer())
            };
            self.sequencer = Some(sequencer);
        }
        self.sequencer
            .as_ref()
            .map_or(self.last_sent_seq.wrapping_add(1), |s| s.next_sequence_number())
    }

    /// on_send_data updates the send state for an outgoing packet and
    /// rewrites the header as `mode` allows.
    pub fn on_send_data(
        &mut self,
        packet: &mut Packet,
        mode: RewriteMode,
        now: SystemTime,
    ) -> Result<SendReceiveStatus> {
        let is_rtx = self.is_rtx();
        if is_rtx {
            let Some(pt) = self.rtx_payload_type else {
                return Err(Error::Other(format!(
                    "rtx source {:08x} has no payload type",
                    self.ssrc
                )));
            };
            let mut payload = Vec::with_capacity(2 + packet.payload_size());
            payload.extend_from_slice(&packet.sequence_number().to_be_bytes());
            payload.extend_from_slice(packet.payload());
            packet.set_payload(&payload);
            packet.set_payload_type(pt);
        }

        match mode {
            RewriteMode::RetransmitFirst => self.stats.rtx_packets += 1,
            RewriteMode::RetransmitAgain => self.stats.rtx_duplicates += 1,
            _ => {}
        }

        if is_rtx || matches!(mode, RewriteMode::RewriteHeader | RewriteMode::RewriteSsrc) {
            packet.set_ssrc(self.ssrc);
        }
        if is_rtx || mode == RewriteMode::RewriteHeader {
            let seq = self.next_sequence_number();
            packet.set_sequence_number(seq);
        } else if !mode.is_retransmission() {
            self.sequencer = None;
        }
        if !mode.is_retransmission() || is_rtx {
            self.last_sent_seq = packet.sequence_number();
            self.sent_started = true;
        }

        self.stats.packets += 1;
        self.stats.octets += packet.payload_size() as u64;
        if packet.marker() {
            self.stats.markers += 1;
        }
        self.stats.first_packet_time.get_or_insert(now);
        self.stats.last_packet_time = Some(now);

        if mode == RewriteMode::RewriteNothing || mode.is_retransmission() {
            return Ok(SendReceiveStatus::ProcessPacket);
        }

        self.report_timestamp = packet.timestamp();
        self.report_absolute_time = Some(now);
        if let Some(history) = self.history.as_mut() {
            history.add(packet);
        }

        Ok(SendReceiveStatus::ProcessPacket)
    }

    /// take_for_resend fetches a NACKed packet from history, reporting how it
    /// should be rewritten.
    pub fn take_for_resend(&mut self, seq: u16) -> Option<(Packet, RewriteMode)> {
        let (packet, again) = self.history.as_mut()?.take_for_resend(seq)?;
        let mode = if again {
            RewriteMode::RetransmitAgain
        } else {
            RewriteMode::RetransmitFirst
        };
        Some((packet, mode))
    }

    pub fn on_nack_sent(&mut self) {
        self.stats.nacks_sent += 1;
    }

    pub fn on_nack_received(&mut self) {
        self.stats.nacks_received += 1;
    }
}

/// strip_osn replaces the sequence number with the original one carried in
/// the first two payload bytes of a retransmission (RFC 4588).
pub(crate) fn strip_osn(packet: &mut Packet) -> Result<()> {
    let payload = packet.payload();
    if payload.len() < 2 {
        return Err(Error::InvalidPacket(format!(
            "retransmission payload of {} bytes has no original sequence number",
            payload.len()
        )));
    }
    let osn = u16::from_be_bytes([payload[0], payload[1]]);
    let rest = payload[2..].to_vec();
    packet.set_sequence_number(osn);
    packet.set_payload(&rest);
    Ok(())
}

/// delay_since is the time since `at` in 1/65536 seconds.
fn delay_since(at: SystemTime, now: SystemTime) -> u32 {
    now.duration_since(at)
        .map(|d| (d.as_micros() * 65536 / 1_000_000).min(u32::MAX as u128) as u32)
        .unwrap_or(0)
}
