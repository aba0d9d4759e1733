use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::Direction;

/// SyncSourceStats is a snapshot of one source's counters. Receive counters
/// are filled for receivers and send counters for senders; a field that does
/// not apply stays at zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSourceStats {
    pub ssrc: u32,
    pub direction: Direction,
    pub cname: String,
    pub rtx_ssrc: Option<u32>,

    pub packets: u64,
    pub octets: u64,
    pub markers: u64,
    /// expected minus received, may go negative with duplicates from the network
    pub packets_lost: i64,
    pub packets_unrecovered: u64,
    pub max_consecutive_lost: u64,
    pub out_of_order: u64,
    pub late_out_of_order: u64,
    pub rtx_packets: u64,
    pub rtx_duplicates: u64,
    pub nacks_sent: u64,
    pub nacks_received: u64,
    pub jitter_buffer_too_late: u64,

    /// interarrival jitter in timestamp units
    pub jitter: u32,
    pub max_jitter: u32,
    pub jitter_ms: f64,
    pub extended_sequence_number: u32,

    /// what the remote receiver last told us about this sender
    pub remote_fraction_lost: u8,
    pub remote_jitter: u32,

    pub round_trip_time: Option<Duration>,
    pub first_packet_time: Option<SystemTime>,
    pub last_packet_time: Option<SystemTime>,
    pub last_sender_report_time: Option<SystemTime>,
    /// sender clock from the abs-send-time extension of the last packet
    pub last_transmit_time: Option<SystemTime>,
}

impl SyncSourceStats {
    pub(crate) fn new(ssrc: u32, direction: Direction, cname: &str) -> Self {
        SyncSourceStats {
            ssrc,
            direction,
            cname: cname.to_owned(),
            rtx_ssrc: None,
            packets: 0,
            octets: 0,
            markers: 0,
            packets_lost: 0,
            packets_unrecovered: 0,
            max_consecutive_lost: 0,
            out_of_order: 0,
            late_out_of_order: 0,
            rtx_packets: 0,
            rtx_duplicates: 0,
            nacks_sent: 0,
            nacks_received: 0,
            jitter_buffer_too_late: 0,
            jitter: 0,
            max_jitter: 0,
            jitter_ms: 0.0,
            extended_sequence_number: 0,
            remote_fraction_lost: 0,
            remote_jitter: 0,
            round_trip_time: None,
            first_packet_time: None,
            last_packet_time: None,
            last_sender_report_time: None,
            last_transmit_time: None,
        }
    }
}
