use std::fmt;
use std::sync::Arc;

use rtcp::application_defined::ApplicationDefined;
use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;
use rtp::packet::Packet;

use crate::{ReceiveType, SendReceiveStatus};

/// ControlEvent is what control notifiers see of an incoming compound packet.
#[derive(Debug)]
pub enum ControlEvent {
    /// TMMBR entry or REMB asking us to cap the bitrate of `ssrc`
    FlowControl {
        ssrc: u32,
        bitrate: u64,
        overhead: u16,
    },
    /// TMMBN entry confirming a cap we asked for
    FlowControlNotification {
        ssrc: u32,
        bitrate: u64,
        overhead: u16,
    },
    /// PLI, or FIR when `full` is set
    IntraFrameRequest { ssrc: u32, full: bool },
    /// TSTR, or TSTN when `notification` is set
    TemporalSpatialTradeOff {
        ssrc: u32,
        index: u8,
        notification: bool,
    },
    TransportCc(TransportLayerCc),
    Application(ApplicationDefined),
    /// every decoded sub-report, after the typed events above
    Packet(Box<dyn rtcp::packet::Packet + Send + Sync>),
}

pub type DataNotifier = Arc<dyn Fn(&Packet, ReceiveType) -> SendReceiveStatus + Send + Sync>;
pub type ControlNotifier = Arc<dyn Fn(&ControlEvent) + Send + Sync>;

/// NotifierId identifies a registered notifier for removal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotifierId(u64);

impl fmt::Display for NotifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notifier#{}", self.0)
    }
}

struct Entry<F> {
    id: NotifierId,
    priority: i32,
    notifier: F,
}

/// insert keeps the list sorted by priority, later registrations behind
/// earlier ones of the same priority.
fn insert<F>(list: &mut Vec<Entry<F>>, entry: Entry<F>) {
    let pos = list.partition_point(|e| e.priority <= entry.priority);
    list.insert(pos, entry);
}

/// Notifiers holds the data and control callbacks, lowest priority first.
#[derive(Default)]
pub(crate) struct Notifiers {
    next_id: u64,
    data: Vec<Entry<DataNotifier>>,
    control: Vec<Entry<ControlNotifier>>,
}

impl Notifiers {
    fn next_id(&mut self) -> NotifierId {
        self.next_id += 1;
        NotifierId(self.next_id)
    }

    pub(crate) fn add_data(&mut self, priority: i32, notifier: DataNotifier) -> NotifierId {
        let id = self.next_id();
        insert(
            &mut self.data,
            Entry {
                id,
                priority,
                notifier,
            },
        );
        id
    }

    pub(crate) fn add_control(&mut self, priority: i32, notifier: ControlNotifier) -> NotifierId {
        let id = self.next_id();
        insert(
            &mut self.control,
            Entry {
                id,
                priority,
                notifier,
            },
        );
        id
    }

    pub(crate) fn remove(&mut self, id: NotifierId) -> bool {
        let before = self.data.len() + self.control.len();
        self.data.retain(|e| e.id != id);
        self.control.retain(|e| e.id != id);
        before != self.data.len() + self.control.len()
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
        self.control.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty() && self.control.is_empty()
    }

    /// snapshot copies the callback lists. Callbacks run from the copy with
    /// the notifier lock released, so they may add or remove notifiers.
    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            data: self
                .data
                .iter()
                .map(|e| (e.id, Arc::clone(&e.notifier)))
                .collect(),
            control: self.control.iter().map(|e| Arc::clone(&e.notifier)).collect(),
        }
    }
}

/// Snapshot is the callback lists as they were when a dispatch began.
pub(crate) struct Snapshot {
    data: Vec<(NotifierId, DataNotifier)>,
    control: Vec<ControlNotifier>,
}

impl Snapshot {
    /// notify_data stops at the first notifier that does not answer
    /// `ProcessPacket` and returns its status.
    pub(crate) fn notify_data(&self, packet: &Packet, receive_type: ReceiveType) -> SendReceiveStatus {
        for (id, notifier) in &self.data {
            let status = notifier(packet, receive_type);
            if status != SendReceiveStatus::ProcessPacket {
                log::trace!("{} stopped ssrc={:08x} seq={}", id, packet.ssrc(), packet.sequence_number());
                return status;
            }
        }
        SendReceiveStatus::ProcessPacket
    }

    pub(crate) fn notify_control(&self, event: &ControlEvent) {
        for notifier in &self.control {
            notifier(event);
        }
    }
}
