#![warn(rust_2018_idioms)]
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::Serialize;

mod error;
pub mod feedback;
pub mod header_extension;
pub mod mock;
pub mod notifier;
pub mod session;
pub mod stats;
pub mod sync_source;
pub mod twcc;

pub use error::{flatten_errs, Error, Result};
pub use feedback::Feedback;
pub use header_extension::{ExtensionDirection, HeaderExtensionMap};
pub use notifier::{ControlEvent, NotifierId};
pub use session::{RtpSession, SessionBuilder, SyncSourceInfo};
pub use stats::SyncSourceStats;

/// FnTimeGen replaces SystemTime::now, mostly for tests.
pub type FnTimeGen = Arc<dyn Fn() -> SystemTime + Sync + 'static + Send>;

/// Direction of a synchronisation source relative to this session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Sender,
    Receiver,
}

impl Direction {
    pub(crate) fn index(self) -> usize {
        match self {
            Direction::Sender => 0,
            Direction::Receiver => 1,
        }
    }
}

/// How an RTP packet reached the state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReceiveType {
    /// straight off the wire
    Network,
    /// resent on the primary SSRC
    Retransmit,
    /// unwrapped from a linked rtx SSRC
    FromRtx,
    /// rebuilt from a secondary RFC 2198 block
    Redundant,
}

impl ReceiveType {
    pub(crate) fn is_retransmission(self) -> bool {
        matches!(self, ReceiveType::Retransmit | ReceiveType::FromRtx)
    }
}

/// RewriteMode selects which header fields `write_data` may touch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RewriteMode {
    /// stamp the SSRC and assign the next sequence number
    RewriteHeader,
    /// stamp the SSRC only
    RewriteSsrc,
    /// leave the header alone, statistics only
    RewriteNothing,
    /// first resend of a packet from history
    RetransmitFirst,
    /// a packet resent more than once
    RetransmitAgain,
}

impl RewriteMode {
    pub(crate) fn is_retransmission(self) -> bool {
        matches!(
            self,
            RewriteMode::RetransmitFirst | RewriteMode::RetransmitAgain
        )
    }
}

/// Result of handing a packet to the session or to a notifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SendReceiveStatus {
    ProcessPacket,
    IgnorePacket,
    AbortTransport,
}

/// The transport channel a datagram goes out on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Channel {
    Data,
    Control,
}

/// Media kind picks the default out of order wait time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MediaKind {
    #[default]
    Audio,
    Video,
}

impl MediaKind {
    pub(crate) fn out_of_order_wait(self) -> Duration {
        match self {
            MediaKind::Audio => Duration::from_millis(40),
            MediaKind::Video => Duration::from_millis(100),
        }
    }
}

/// Transport carries datagrams to the remote party. The session never
/// retries a failed send.
#[async_trait]
pub trait Transport {
    async fn send(&self, buf: &[u8], channel: Channel) -> Result<usize>;
}

/// JitterBuffer is the view the state machine needs of a receiver's jitter
/// buffer. A buffer with a non-zero delay reorders on its own, so the source
/// stops holding packets back.
pub trait JitterBuffer {
    fn current_jitter_delay(&self) -> Duration;
    fn packets_too_late(&self) -> u64;
}
