#[cfg(test)]
mod twcc_test;

use rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;

#[derive(Default, Debug, PartialEq, Eq, Clone, Copy)]
struct Arrival {
    /// transport-wide sequence number with the wrap count in the high bits
    sequence_number: u32,
    arrival_time_us: i64,
}

/// TwccRecorder collects transport-wide sequence numbers and arrival times
/// of received packets and turns them into feedback as described in
/// <https://datatracker.ietf.org/doc/html/draft-holmer-rmcat-transport-wide-cc-extensions-01>
#[derive(Default, Debug, PartialEq, Eq, Clone)]
pub struct TwccRecorder {
    arrivals: Vec<Arrival>,

    cycles: u32,
    last_sequence_number: u16,
    started: bool,

    sender_ssrc: u32,
    media_ssrc: u32,
    fb_pkt_count: u8,
}

impl TwccRecorder {
    /// new creates a recorder whose feedback is sent from `sender_ssrc`.
    pub fn new(sender_ssrc: u32) -> Self {
        TwccRecorder {
            sender_ssrc,
            ..Default::default()
        }
    }

    pub fn set_sender_ssrc(&mut self, sender_ssrc: u32) {
        self.sender_ssrc = sender_ssrc;
    }

    /// record notes that the packet of `media_ssrc` carrying transport-wide
    /// `sequence_number` arrived at `arrival_time_us` microseconds.
    pub fn record(&mut self, media_ssrc: u32, sequence_number: u16, arrival_time_us: i64) {
        self.media_ssrc = media_ssrc;

        let mut cycles = self.cycles;
        let wrapped_back = self.started
            && self.cycles > 0
            && sequence_number > 0xf000
            && self.last_sequence_number < 0x0fff;
        if wrapped_back {
            // a late packet from before the last wrap
            cycles -= 1 << 16;
        } else {
            if self.started && sequence_number < 0x0fff && self.last_sequence_number > 0xf000 {
                self.cycles += 1 << 16;
                cycles = self.cycles;
            }
            self.last_sequence_number = sequence_number;
        }
        self.started = true;

        self.arrivals.push(Arrival {
            sequence_number: cycles | sequence_number as u32,
            arrival_time_us,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }

    /// build_feedback drains the recorded arrivals into as many feedback
    /// packets as it takes to carry them.
    pub fn build_feedback(&mut self) -> Vec<TransportLayerCc> {
        if self.arrivals.is_empty() {
            return vec![];
        }

        self.arrivals.sort_by_key(|a| a.sequence_number);
        self.arrivals.dedup_by_key(|a| a.sequence_number);
        let arrivals: Vec<(u16, i64)> = self
            .arrivals
            .drain(..)
            .map(|a| ((a.sequence_number & 0xffff) as u16, a.arrival_time_us))
            .collect();

        let mut feedback = vec![];
        let mut rest = &arrivals[..];
        while !rest.is_empty() {
            let (fb, consumed) = TransportLayerCc::from_arrivals(
                self.sender_ssrc,
                self.media_ssrc,
                self.fb_pkt_count,
                rest,
            );
            if consumed == 0 {
                log::warn!("twcc arrival at {} could not be encoded", rest[0].0);
                break;
            }
            self.fb_pkt_count = self.fb_pkt_count.wrapping_add(1);
            feedback.push(fb);
            rest = &rest[consumed..];
        }

        feedback
    }
}
