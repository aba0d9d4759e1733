mod builder;
mod control;
mod report;

pub use builder::{SessionBuilder, DEFAULT_TOOL_NAME};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use rtp::extension::abs_send_time_extension::AbsSendTimeExtension;
use rtp::extension::transport_cc_extension::TransportCcExtension;
use rtp::extension::{ABS_SEND_TIME_URI, TRANSPORT_CC_URI};
use rtp::packet::Packet;
use tokio::sync::{mpsc, Mutex};
use util::marshal::{Marshal, Unmarshal};
use util::sync::RwLock;
use waitgroup::WaitGroup;

use crate::error::{Error, Result};
use crate::header_extension::profile_for_id;
use crate::notifier::{ControlEvent, NotifierId, Notifiers};
use crate::stats::SyncSourceStats;
use crate::sync_source::{ReceiveOutcome, SourceOptions, SyncSourceState};
use crate::twcc::TwccRecorder;
use crate::*;

type SourceRef = Arc<util::sync::Mutex<SyncSourceState>>;

pub(crate) struct SessionConfig {
    pub(crate) source_options: SourceOptions,
    pub(crate) report_interval: Duration,
    pub(crate) housekeeping_interval: Duration,
    pub(crate) stale_receiver_timeout: Duration,
    pub(crate) feedback: Feedback,
    pub(crate) tool_name: String,
    pub(crate) cname: String,
}

/// SourceMap holds every source of the session, both directions, keyed by
/// SSRC. Aliases map a remote SSRC accepted in any-source mode onto the
/// receiver that took it.
pub(crate) struct SourceMap {
    pub(crate) sources: HashMap<u32, SourceRef>,
    /// direction of each primary (non-rtx) source; never changes once set
    pub(crate) primaries: BTreeMap<u32, Direction>,
    pub(crate) defaults: [Option<u32>; 2],
    pub(crate) aliases: HashMap<u32, u32>,
    /// set once a source was added through `add_sync_source`
    pub(crate) explicit: bool,
}

impl SourceMap {
    fn get(&self, ssrc: u32) -> Option<SourceRef> {
        self.sources
            .get(&ssrc)
            .or_else(|| self.aliases.get(&ssrc).and_then(|id| self.sources.get(id)))
            .cloned()
    }

    /// of_direction lists the primary sources of `direction`, by SSRC. It
    /// takes no source lock.
    fn of_direction(&self, direction: Direction) -> Vec<SourceRef> {
        self.primaries
            .iter()
            .filter(|(_, d)| **d == direction)
            .filter_map(|(id, _)| self.sources.get(id).cloned())
            .collect()
    }

    fn unused_ssrc(&self) -> u32 {
        loop {
            let ssrc = rand::random::<u32>();
            if ssrc >= 4 && !self.sources.contains_key(&ssrc) {
                return ssrc;
            }
        }
    }
}

/// SyncSourceInfo describes a source and its retransmission link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSourceInfo {
    pub ssrc: u32,
    pub direction: Direction,
    pub cname: String,
    pub rtx_ssrc: Option<u32>,
    pub rtx_primary: Option<u32>,
    pub rtx_payload_type: Option<u8>,
}

pub(crate) struct SessionInternal {
    pub(crate) config: SessionConfig,
    pub(crate) now: Option<FnTimeGen>,
    pub(crate) transport: Arc<dyn Transport + Send + Sync>,
    pub(crate) header_extensions: HeaderExtensionMap,
    pub(crate) sources: RwLock<SourceMap>,
    pub(crate) any_sync_source: AtomicBool,
    pub(crate) closed: AtomicBool,
    pub(crate) notifiers: RwLock<Notifiers>,
    /// held shared while callbacks run, so close can wait them out
    pub(crate) dispatching: RwLock<()>,
    pub(crate) twcc: util::sync::Mutex<TwccRecorder>,
    pub(crate) transport_sequence: AtomicU16,
    pub(crate) fir_sequence: AtomicU8,
    pub(crate) tstr_sequence: AtomicU8,
    pub(crate) close_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl SessionInternal {
    fn now(&self) -> SystemTime {
        if let Some(f) = &self.now {
            f()
        } else {
            SystemTime::now()
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn source(&self, ssrc: u32) -> Option<SourceRef> {
        self.sources.read().get(ssrc)
    }

    fn require(&self, feedback: Feedback) -> Result<()> {
        if self.config.feedback.intersects(feedback) {
            Ok(())
        } else {
            Err(Error::FeedbackNotNegotiated)
        }
    }

    fn insert_source(
        &self,
        map: &mut SourceMap,
        ssrc: u32,
        direction: Direction,
        cname: &str,
    ) -> u32 {
        let id = if ssrc == 0 { map.unused_ssrc() } else { ssrc };
        let cname = if cname.is_empty() {
            self.config.cname.as_str()
        } else {
            cname
        };
        let state = SyncSourceState::new(id, direction, cname, self.config.source_options.clone());
        map.sources
            .insert(id, Arc::new(util::sync::Mutex::new(state)));
        map.primaries.insert(id, direction);
        map.defaults[direction.index()].get_or_insert(id);
        log::debug!("added {:?} ssrc={:08x} cname={}", direction, id, cname);
        id
    }

    fn add_sync_source(&self, ssrc: u32, direction: Direction, cname: &str) -> Result<u32> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let mut map = self.sources.write();
        if let Some(existing) = map.sources.get(&ssrc) {
            let s = existing.lock();
            return if cname.is_empty() || (s.direction() == direction && s.cname() == cname) {
                Ok(ssrc)
            } else {
                Err(Error::SsrcClash(ssrc))
            };
        }
        map.explicit = true;
        Ok(self.insert_source(&mut map, ssrc, direction, cname))
    }

    /// default_sender returns the sender used when none is named, creating
    /// one the first time.
    fn default_sender(&self) -> Result<SourceRef> {
        {
            let map = self.sources.read();
            if let Some(s) = map.defaults[Direction::Sender.index()].and_then(|id| map.get(id)) {
                return Ok(s);
            }
        }
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let mut map = self.sources.write();
        let id = match map.defaults[Direction::Sender.index()] {
            Some(id) => id,
            None => self.insert_source(&mut map, 0, Direction::Sender, ""),
        };
        map.get(id).ok_or(Error::UnknownSsrc(id))
    }

    fn local_sender_ssrc(&self) -> Result<u32> {
        Ok(self.default_sender()?.lock().ssrc())
    }

    /// remove_source drops `ssrc` and its rtx partner. The returned SSRCs
    /// are the removed senders, owed a BYE.
    fn remove_source(&self, ssrc: u32) -> Result<Vec<u32>> {
        let mut map = self.sources.write();
        let source = map.sources.remove(&ssrc).ok_or(Error::UnknownSsrc(ssrc))?;
        map.primaries.remove(&ssrc);
        let (direction, rtx_ssrc, rtx_primary) = {
            let s = source.lock();
            (s.direction(), s.rtx_ssrc(), s.rtx_primary())
        };

        let mut removed = vec![ssrc];
        if let Some(primary) = rtx_primary.and_then(|id| map.sources.get(&id)) {
            primary.lock().unlink_rtx();
        }
        if let Some(rtx) = rtx_ssrc {
            if map.sources.remove(&rtx).is_some() {
                removed.push(rtx);
            }
        }
        map.aliases.retain(|_, id| !removed.contains(id));

        let slot = direction.index();
        if map.defaults[slot].map_or(false, |id| removed.contains(&id)) {
            map.defaults[slot] = None;
            map.defaults[slot] = map
                .primaries
                .iter()
                .find(|(_, d)| **d == direction)
                .map(|(id, _)| *id);
        }
        log::debug!("removed {:?} ssrc={:?}", direction, removed);

        Ok(match direction {
            Direction::Sender => removed,
            Direction::Receiver => vec![],
        })
    }

    fn enable_sync_source_rtx(&self, primary: u32, payload_type: u8, rtx_ssrc: u32) -> Result<u32> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }

        let mut map = self.sources.write();
        let source = map.sources.get(&primary).cloned().ok_or(Error::UnknownSsrc(primary))?;
        let mut p = source.lock();
        if p.is_rtx() {
            return Err(Error::RtxSource(primary));
        }

        if let Some(existing) = p.rtx_ssrc() {
            if rtx_ssrc == 0 || rtx_ssrc == existing {
                p.set_rtx_payload_type(payload_type);
                if let Some(rtx) = map.sources.get(&existing) {
                    rtx.lock().set_rtx_payload_type(payload_type);
                }
                return Ok(existing);
            }
            map.sources.remove(&existing);
            p.unlink_rtx();
            log::debug!("ssrc={:08x} dropped rtx ssrc={:08x}", primary, existing);
        }

        if rtx_ssrc != 0 && map.sources.contains_key(&rtx_ssrc) {
            return Err(Error::SsrcClash(rtx_ssrc));
        }
        let id = if rtx_ssrc == 0 { map.unused_ssrc() } else { rtx_ssrc };

        let mut rtx = SyncSourceState::new(
            id,
            p.direction(),
            p.cname(),
            self.config.source_options.clone(),
        );
        rtx.link_primary(primary, payload_type);
        p.link_rtx(id, payload_type);
        drop(p);

        map.sources.insert(id, Arc::new(util::sync::Mutex::new(rtx)));
        log::debug!(
            "ssrc={:08x} linked rtx ssrc={:08x} pt={}",
            primary,
            id,
            payload_type
        );
        Ok(id)
    }

    /// receiver_for finds the receiver of a packet from `ssrc`, applying the
    /// any-source policy to SSRCs not seen before.
    fn receiver_for(&self, ssrc: u32) -> Option<SourceRef> {
        if let Some(s) = self.source(ssrc) {
            return Some(s);
        }
        if self.is_closed() {
            return None;
        }

        let mut map = self.sources.write();
        if let Some(s) = map.get(ssrc) {
            return Some(s);
        }

        let slot = Direction::Receiver.index();
        if self.any_sync_source.load(Ordering::SeqCst) {
            if let Some(id) = map.defaults[slot] {
                let aliased = map.aliases.values().any(|a| *a == id);
                let source = map.sources.get(&id).cloned();
                return match source {
                    Some(s) if !aliased => {
                        log::debug!("ssrc={:08x} accepted onto receiver {:08x}", ssrc, id);
                        map.aliases.insert(ssrc, id);
                        Some(s)
                    }
                    _ => {
                        log::debug!("packet from ssrc={:08x} ignored, expecting {:08x}", ssrc, id);
                        None
                    }
                };
            }
        } else if map.explicit && map.defaults[slot].is_some() {
            log::debug!("packet from unannounced ssrc={:08x} ignored", ssrc);
            return None;
        }

        let id = self.insert_source(&mut map, ssrc, Direction::Receiver, "");
        map.get(id)
    }

    fn record_twcc(&self, packet: &Packet, now: SystemTime) {
        if !self.config.feedback.contains(Feedback::TWCC) {
            return;
        }
        let Some(id) = self
            .header_extensions
            .id_for(TRANSPORT_CC_URI, ExtensionDirection::Receive)
        else {
            return;
        };
        let Some(mut raw) = packet.get_extension(id) else {
            return;
        };
        match TransportCcExtension::unmarshal(&mut raw) {
            Ok(tcc) => {
                let arrival = now
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_micros() as i64)
                    .unwrap_or(0);
                self.twcc
                    .lock()
                    .record(packet.ssrc(), tcc.transport_sequence, arrival);
            }
            Err(err) => log::debug!("ssrc={:08x} bad transport-cc extension: {}", packet.ssrc(), err),
        }
    }

    /// deliver hands released frames to the data notifiers.
    fn deliver(&self, frames: Vec<(Packet, ReceiveType)>) -> SendReceiveStatus {
        if frames.is_empty() {
            return SendReceiveStatus::ProcessPacket;
        }
        let _dispatch = self.dispatching.read_recursive();
        let notifiers = self.notifiers.read().snapshot();
        let mut status = SendReceiveStatus::ProcessPacket;
        for (packet, receive_type) in &frames {
            match notifiers.notify_data(packet, *receive_type) {
                SendReceiveStatus::AbortTransport => return SendReceiveStatus::AbortTransport,
                s => {
                    if status == SendReceiveStatus::ProcessPacket {
                        status = s;
                    }
                }
            }
        }
        status
    }

    /// finish_outcome delivers frames and builds the NACK for losses.
    fn finish_outcome(&self, media_ssrc: u32, outcome: ReceiveOutcome) -> (SendReceiveStatus, Option<Bytes>) {
        let status = self.deliver(outcome.frames);
        if outcome.lost.is_empty() || !self.config.feedback.contains(Feedback::NACK) {
            return (status, None);
        }
        match self.build_nack(media_ssrc, &outcome.lost) {
            Ok(buf) => (status, Some(buf)),
            Err(err) => {
                log::warn!("ssrc={:08x} could not build NACK: {}", media_ssrc, err);
                (status, None)
            }
        }
    }

    fn receive_data(&self, buf: &[u8]) -> (SendReceiveStatus, Option<Bytes>) {
        let packet = match Packet::decode(BytesMut::from(buf)) {
            Ok(packet) => packet,
            Err(err) => {
                log::debug!("{}", Error::InvalidPacket(err.to_string()));
                return (SendReceiveStatus::IgnorePacket, None);
            }
        };
        let now = self.now();
        let ssrc = packet.ssrc();
        let Some(source) = self.receiver_for(ssrc) else {
            return (SendReceiveStatus::IgnorePacket, None);
        };
        self.record_twcc(&packet, now);
        log::trace!("ssrc={:08x} received seq={}", ssrc, packet.sequence_number());

        let received = {
            let mut s = source.lock();
            if s.is_rtx() {
                let primary = s.rtx_primary();
                let unwrapped = s.unwrap_retransmission(packet, now);
                drop(s);
                match (unwrapped, primary.and_then(|id| self.source(id))) {
                    (Ok(packet), Some(primary)) => {
                        let mut p = primary.lock();
                        let media_ssrc = p.ssrc();
                        p.on_receive_data(packet, ReceiveType::FromRtx, now)
                            .map(|outcome| (media_ssrc, outcome))
                    }
                    (Ok(_), None) => Err(Error::UnknownSsrc(primary.unwrap_or_default())),
                    (Err(err), _) => Err(err),
                }
            } else {
                let media_ssrc = s.ssrc();
                s.on_receive_data(packet, ReceiveType::Network, now)
                    .map(|outcome| (media_ssrc, outcome))
            }
        };

        match received {
            Ok((media_ssrc, outcome)) => self.finish_outcome(media_ssrc, outcome),
            Err(err) => {
                log::debug!("ssrc={:08x} packet dropped: {}", ssrc, err);
                (SendReceiveStatus::IgnorePacket, None)
            }
        }
    }

    fn sender_for_write(&self, ssrc: u32, mode: RewriteMode) -> Result<SourceRef> {
        if ssrc != 0 {
            if let Some(s) = self.source(ssrc) {
                if s.lock().direction() == Direction::Sender {
                    return Ok(s);
                }
                if !matches!(mode, RewriteMode::RewriteHeader | RewriteMode::RewriteSsrc) {
                    return Err(Error::SsrcClash(ssrc));
                }
            } else if !matches!(mode, RewriteMode::RewriteHeader | RewriteMode::RewriteSsrc) {
                let mut map = self.sources.write();
                if let Some(s) = map.get(ssrc) {
                    return Ok(s);
                }
                let id = self.insert_source(&mut map, ssrc, Direction::Sender, "");
                return map.get(id).ok_or(Error::UnknownSsrc(id));
            }
        }
        self.default_sender()
    }

    fn add_send_extensions(&self, packet: &mut Packet, now: SystemTime) -> Result<()> {
        let abs_send_time = self
            .header_extensions
            .id_for(ABS_SEND_TIME_URI, ExtensionDirection::Send);
        let transport_cc = self
            .header_extensions
            .id_for(TRANSPORT_CC_URI, ExtensionDirection::Send);
        let Some(max_id) = abs_send_time.max(transport_cc) else {
            return Ok(());
        };
        let profile = profile_for_id(max_id);

        if let Some(id) = abs_send_time {
            let raw = AbsSendTimeExtension::new(now).marshal()?;
            packet.set_extension(profile, id, &raw)?;
        }
        if let Some(id) = transport_cc {
            let tcc = TransportCcExtension {
                transport_sequence: self.transport_sequence.fetch_add(1, Ordering::SeqCst),
            };
            let raw = tcc.marshal()?;
            packet.set_extension(profile, id, &raw)?;
        }
        Ok(())
    }

    fn write_data(&self, mut packet: Packet, mode: RewriteMode) -> Result<(SendReceiveStatus, Bytes)> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        let now = self.now();
        let source = self.sender_for_write(packet.ssrc(), mode)?;
        let status = source.lock().on_send_data(&mut packet, mode, now)?;
        if !mode.is_retransmission() {
            self.add_send_extensions(&mut packet, now)?;
        }
        log::trace!(
            "ssrc={:08x} sending seq={} mode={:?}",
            packet.ssrc(),
            packet.sequence_number(),
            mode
        );
        Ok((status, packet.freeze()))
    }

    /// housekeeping releases or gives up on held packets, removes sources
    /// that are gone and flushes TWCC feedback.
    fn housekeeping(&self) -> Vec<Bytes> {
        let now = self.now();
        let mut out = vec![];

        let receivers = self.sources.read().of_direction(Direction::Receiver);
        for receiver in receivers {
            let (media_ssrc, outcome) = {
                let mut r = receiver.lock();
                if !r.has_pending() {
                    continue;
                }
                (r.ssrc(), r.poll_pending(now))
            };
            if outcome.is_empty() {
                continue;
            }
            if let (_, Some(nack)) = self.finish_outcome(media_ssrc, outcome) {
                out.push(nack);
            }
        }

        self.remove_gone(now);

        if self.config.feedback.contains(Feedback::TWCC) {
            match self.build_twcc() {
                Ok(Some(buf)) => out.push(buf),
                Ok(None) => {}
                Err(err) => log::warn!("could not build TWCC feedback: {}", err),
            }
        }
        out
    }

    /// remove_gone drops receivers that said BYE and drained, or went stale.
    fn remove_gone(&self, now: SystemTime) {
        let timeout = self.config.stale_receiver_timeout;
        let gone: Vec<u32> = {
            let map = self.sources.read();
            map.sources
                .iter()
                .filter_map(|(id, s)| {
                    let s = s.try_lock()?;
                    let stale = s.is_stale(now, timeout);
                    let done = s.can_remove() && !s.is_rtx();
                    if s.direction() == Direction::Receiver && (stale || done) {
                        if stale {
                            log::debug!("ssrc={:08x} is stale", id);
                        }
                        Some(*id)
                    } else {
                        None
                    }
                })
                .collect()
        };
        for id in gone {
            if let Err(err) = self.remove_source(id) {
                log::debug!("ssrc={:08x} already removed: {}", id, err);
            }
        }
    }

    fn close(&self) {
        let sources: Vec<SourceRef> = self.sources.read().sources.values().cloned().collect();
        for s in &sources {
            s.lock().mark_closing();
        }
        self.closed.store(true, Ordering::SeqCst);
        self.notifiers.write().clear();
        drop(self.dispatching.write());
        for s in &sources {
            s.lock().cancel_pending();
        }
    }
}

/// RtpSession runs RTP and RTCP for one media stream: it owns the
/// synchronisation sources of both directions, builds reports and feedback,
/// and turns received control packets into events.
pub struct RtpSession {
    pub(crate) internal: Arc<SessionInternal>,

    pub(crate) wg: Mutex<Option<WaitGroup>>,
    pub(crate) close_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl RtpSession {
    /// builder returns a new SessionBuilder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    async fn is_closed(&self) -> bool {
        let close_tx = self.close_tx.lock().await;
        close_tx.is_none()
    }

    async fn send_all(&self, bufs: Vec<Bytes>, channel: Channel) {
        for buf in bufs {
            if let Err(err) = self.internal.transport.send(&buf, channel).await {
                log::warn!("failed sending: {}", err);
            }
        }
    }

    /// add_sync_source registers a source, allocating an SSRC when `ssrc`
    /// is zero.
    pub fn add_sync_source(&self, ssrc: u32, direction: Direction, cname: &str) -> Result<u32> {
        self.internal.add_sync_source(ssrc, direction, cname)
    }

    /// remove_sync_source drops a source and its rtx partner, saying BYE
    /// for senders.
    pub async fn remove_sync_source(&self, ssrc: u32) -> Result<()> {
        let byes = self.internal.remove_source(ssrc)?;
        if byes.is_empty() {
            return Ok(());
        }
        let buf = self.internal.build_bye(&byes)?;
        self.internal
            .transport
            .send(&buf, Channel::Control)
            .await
            .map_err(|err| Error::TransportFailure(err.to_string()))?;
        Ok(())
    }

    /// enable_sync_source_rtx links a retransmission source to `primary`
    /// and returns its SSRC.
    pub fn enable_sync_source_rtx(&self, primary: u32, rtx_payload_type: u8, rtx_ssrc: u32) -> Result<u32> {
        self.internal
            .enable_sync_source_rtx(primary, rtx_payload_type, rtx_ssrc)
    }

    pub fn get_sync_source_info(&self, ssrc: u32) -> Option<SyncSourceInfo> {
        let source = self.internal.source(ssrc)?;
        let s = source.lock();
        Some(SyncSourceInfo {
            ssrc: s.ssrc(),
            direction: s.direction(),
            cname: s.cname().to_owned(),
            rtx_ssrc: s.rtx_ssrc(),
            rtx_primary: s.rtx_primary(),
            rtx_payload_type: s.rtx_payload_type(),
        })
    }

    /// sync_source_ids lists the SSRCs of `direction`, rtx sources included.
    pub fn sync_source_ids(&self, direction: Direction) -> Vec<u32> {
        let map = self.internal.sources.read();
        let mut ids: Vec<u32> = map
            .sources
            .iter()
            .filter(|(_, s)| s.lock().direction() == direction)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn set_any_sync_source(&self, allow: bool) {
        self.internal.any_sync_source.store(allow, Ordering::SeqCst);
    }

    pub fn set_jitter_buffer(
        &self,
        ssrc: u32,
        jitter_buffer: Option<Weak<dyn JitterBuffer + Send + Sync>>,
    ) -> Result<()> {
        let source = self.internal.source(ssrc).ok_or(Error::UnknownSsrc(ssrc))?;
        source.lock().set_jitter_buffer(jitter_buffer);
        Ok(())
    }

    /// write_data stamps `packet` for its sender and transmits it. A failed
    /// send is returned as `Error::TransportFailure`, which maps to
    /// `SendReceiveStatus::AbortTransport`.
    pub async fn write_data(&self, packet: Packet, mode: RewriteMode) -> Result<SendReceiveStatus> {
        let (status, buf) = self.internal.write_data(packet, mode)?;
        if status != SendReceiveStatus::ProcessPacket {
            return Ok(status);
        }
        match self.internal.transport.send(&buf, Channel::Data).await {
            Ok(_) => Ok(status),
            Err(err) => {
                log::warn!("failed sending: {}", err);
                Err(match err {
                    Error::TransportFailure(_) => err,
                    err => Error::TransportFailure(err.to_string()),
                })
            }
        }
    }

    /// send_report sends the periodic compound packet of one sender, or of
    /// all of them when `ssrc` is zero. Without `force` nothing goes out for
    /// a sender with nothing new to say.
    pub async fn send_report(&self, ssrc: u32, force: bool) -> Result<()> {
        let bufs = self.internal.build_reports(ssrc, force)?;
        for buf in bufs {
            self.internal
                .transport
                .send(&buf, Channel::Control)
                .await
                .map_err(|err| Error::TransportFailure(err.to_string()))?;
        }
        Ok(())
    }

    /// on_receive_data takes one datagram from the data channel.
    pub async fn on_receive_data(&self, buf: &[u8]) -> Result<SendReceiveStatus> {
        let (status, nack) = self.internal.receive_data(buf);
        if let Some(nack) = nack {
            self.send_all(vec![nack], Channel::Control).await;
        }
        Ok(status)
    }

    /// on_receive_control takes one datagram from the control channel.
    pub async fn on_receive_control(&self, buf: &[u8]) -> Result<SendReceiveStatus> {
        let (status, resend) = self.internal.receive_control(buf);
        self.send_all(resend, Channel::Data).await;
        Ok(status)
    }

    /// send_nack asks the sender of `media_ssrc` for the listed packets.
    pub async fn send_nack(&self, media_ssrc: u32, lost: &[u16]) -> Result<()> {
        self.internal.require(Feedback::NACK)?;
        let buf = self.internal.build_nack(media_ssrc, lost)?;
        self.send_control(buf).await
    }

    /// send_twcc flushes the transport-wide arrivals recorded so far.
    pub async fn send_twcc(&self) -> Result<()> {
        self.internal.require(Feedback::TWCC)?;
        match self.internal.build_twcc()? {
            Some(buf) => self.send_control(buf).await,
            None => Ok(()),
        }
    }

    /// send_flow_control caps the bitrate of `media_ssrc`, as TMMBR or, when
    /// only that was negotiated, as REMB.
    pub async fn send_flow_control(&self, media_ssrc: u32, bitrate: u64, overhead: u16) -> Result<()> {
        self.internal.require(Feedback::TMMBR | Feedback::REMB)?;
        let buf = self.internal.build_flow_control(media_ssrc, bitrate, overhead)?;
        self.send_control(buf).await
    }

    /// send_intra_frame_request asks for a key frame with PLI, or FIR when
    /// PLI was not negotiated.
    pub async fn send_intra_frame_request(&self, media_ssrc: u32) -> Result<()> {
        self.internal.require(Feedback::PLI | Feedback::FIR)?;
        let buf = self.internal.build_intra_frame_request(media_ssrc)?;
        self.send_control(buf).await
    }

    pub async fn send_temporal_spatial_trade_off(&self, media_ssrc: u32, index: u8) -> Result<()> {
        self.internal.require(Feedback::TSTR)?;
        let buf = self
            .internal
            .build_temporal_spatial_trade_off(media_ssrc, index)?;
        self.send_control(buf).await
    }

    async fn send_control(&self, buf: Bytes) -> Result<()> {
        self.internal
            .transport
            .send(&buf, Channel::Control)
            .await
            .map_err(|err| Error::TransportFailure(err.to_string()))?;
        Ok(())
    }

    pub fn statistics(&self, ssrc: u32) -> Option<SyncSourceStats> {
        self.internal.source(ssrc).map(|s| s.lock().statistics())
    }

    /// all_statistics snapshots every source, ordered by SSRC.
    pub fn all_statistics(&self) -> Vec<SyncSourceStats> {
        let sources: Vec<SourceRef> = self
            .internal
            .sources
            .read()
            .sources
            .values()
            .cloned()
            .collect();
        let mut stats: Vec<SyncSourceStats> = sources.iter().map(|s| s.lock().statistics()).collect();
        stats.sort_by_key(|s| s.ssrc);
        stats
    }

    /// add_data_notifier registers a callback for delivered packets. Lower
    /// priorities run first.
    pub fn add_data_notifier<F>(&self, priority: i32, notifier: F) -> Result<NotifierId>
    where
        F: Fn(&Packet, ReceiveType) -> SendReceiveStatus + Send + Sync + 'static,
    {
        let mut notifiers = self.internal.notifiers.write();
        if self.internal.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(notifiers.add_data(priority, Arc::new(notifier)))
    }

    /// add_control_notifier registers a callback for control events.
    pub fn add_control_notifier<F>(&self, priority: i32, notifier: F) -> Result<NotifierId>
    where
        F: Fn(&ControlEvent) + Send + Sync + 'static,
    {
        let mut notifiers = self.internal.notifiers.write();
        if self.internal.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(notifiers.add_control(priority, Arc::new(notifier)))
    }

    pub fn remove_notifier(&self, id: NotifierId) -> bool {
        self.internal.notifiers.write().remove(id)
    }

    /// start spawns the report and housekeeping timers.
    pub async fn start(&self) -> Result<()> {
        if self.is_closed().await {
            return Err(Error::SessionClosed);
        }

        let mut w = {
            let wait_group = self.wg.lock().await;
            wait_group.as_ref().map(|wg| wg.worker())
        };
        let internal = Arc::clone(&self.internal);
        tokio::spawn(async move {
            let _d = w.take();
            if let Err(err) = RtpSession::run(internal).await {
                log::warn!("rtp session run got error: {}", err);
            }
        });
        Ok(())
    }

    async fn run(internal: Arc<SessionInternal>) -> Result<()> {
        let mut report_ticker = tokio::time::interval(internal.config.report_interval);
        let mut housekeeping_ticker = tokio::time::interval(internal.config.housekeeping_interval);
        let mut close_rx = {
            let mut close_rx = internal.close_rx.lock().await;
            if let Some(close) = close_rx.take() {
                close
            } else {
                return Err(Error::ErrInvalidCloseRx);
            }
        };

        loop {
            tokio::select! {
                _ = report_ticker.tick() => {
                    let bufs = match internal.build_reports(0, false) {
                        Ok(bufs) => bufs,
                        Err(err) => {
                            log::warn!("building reports: {}", err);
                            continue;
                        }
                    };
                    for buf in bufs {
                        if let Err(err) = internal.transport.send(&buf, Channel::Control).await {
                            log::warn!("failed sending: {}", err);
                        }
                    }
                }
                _ = housekeeping_ticker.tick() => {
                    for buf in internal.housekeeping() {
                        if let Err(err) = internal.transport.send(&buf, Channel::Control).await {
                            log::warn!("failed sending: {}", err);
                        }
                    }
                }
                _ = close_rx.recv() => {
                    return Ok(());
                }
            }
        }
    }

    /// close stops the timers, then shuts every source down without
    /// finalising held packets. Notifier callbacks in flight finish first.
    pub async fn close(&self) -> Result<()> {
        {
            let mut close_tx = self.close_tx.lock().await;
            close_tx.take();
        }

        {
            let mut wait_group = self.wg.lock().await;
            if let Some(wg) = wait_group.take() {
                wg.wait().await;
            }
        }

        self.internal.close();
        Ok(())
    }
}
