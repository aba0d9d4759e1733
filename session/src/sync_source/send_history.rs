use rtp::packet::Packet;

const UINT16SIZE_HALF: u16 = 1 << 15;

#[derive(Debug, Clone)]
struct HistoryEntry {
    packet: Packet,
    resent: bool,
}

/// SendHistory keeps the last `size` packets of a sender, indexed by sequence
/// number, so that NACKed packets can be sent again.
#[derive(Debug)]
pub(crate) struct SendHistory {
    entries: Vec<Option<HistoryEntry>>,
    size: u16,
    last_added: u16,
    started: bool,
}

impl SendHistory {
    /// new keeps 2^log2_size packets, log2_size at most 15.
    pub(crate) fn new(log2_size: u8) -> Self {
        let size = 1u16 << log2_size.min(15);
        SendHistory {
            entries: vec![None; size as usize],
            size,
            last_added: 0,
            started: false,
        }
    }

    pub(crate) fn add(&mut self, packet: &Packet) {
        let seq = packet.sequence_number();
        if self.started {
            let diff = seq.wrapping_sub(self.last_added);
            if diff == 0 {
                return;
            }
            if diff < UINT16SIZE_HALF {
                // forget whatever used to sit in the slots we skipped
                let mut i = self.last_added.wrapping_add(1);
                while i != seq {
                    self.entries[(i % self.size) as usize] = None;
                    i = i.wrapping_add(1);
                }
            }
        }

        self.entries[(seq % self.size) as usize] = Some(HistoryEntry {
            packet: packet.clone(),
            resent: false,
        });
        self.last_added = seq;
        self.started = true;
    }

    fn slot(&self, seq: u16) -> Option<usize> {
        let diff = self.last_added.wrapping_sub(seq);
        if !self.started || diff >= UINT16SIZE_HALF || diff >= self.size {
            return None;
        }
        Some((seq % self.size) as usize)
    }

    pub(crate) fn get(&self, seq: u16) -> Option<&Packet> {
        let slot = self.slot(seq)?;
        self.entries[slot].as_ref().map(|e| &e.packet)
    }

    /// take_for_resend returns a copy of the packet and whether it had been
    /// resent before.
    pub(crate) fn take_for_resend(&mut self, seq: u16) -> Option<(Packet, bool)> {
        let slot = self.slot(seq)?;
        let entry = self.entries[slot].as_mut()?;
        let again = entry.resent;
        entry.resent = true;
        Some((entry.packet.clone(), again))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn packet(seq: u16) -> Packet {
        let mut p = Packet::with_payload(&[seq as u8]);
        p.set_sequence_number(seq);
        p
    }

    #[test]
    fn test_send_history() {
        let starts: Vec<u16> = vec![
            0, 1, 2, 511, 512, 32767, 32768, 32769, 65527, 65530, 65534, 65535,
        ];
        for start in starts {
            let mut h = SendHistory::new(3);

            let add = |h: &mut SendHistory, nums: &[u16]| {
                for n in nums {
                    h.add(&packet(start.wrapping_add(*n)));
                }
            };
            let assert_get = |h: &SendHistory, nums: &[u16]| {
                for n in nums {
                    let seq = start.wrapping_add(*n);
                    match h.get(seq) {
                        Some(p) => assert_eq!(p.sequence_number(), seq, "start {start}"),
                        None => panic!("packet not found: {seq} (start {start})"),
                    }
                }
            };
            let assert_not_get = |h: &SendHistory, nums: &[u16]| {
                for n in nums {
                    let seq = start.wrapping_add(*n);
                    assert!(h.get(seq).is_none(), "packet found: {seq} (start {start})");
                }
            };

            add(&mut h, &[0, 1, 2, 3, 4, 5, 6, 7]);
            assert_get(&h, &[0, 1, 2, 3, 4, 5, 6, 7]);

            add(&mut h, &[8]);
            assert_get(&h, &[8]);
            assert_not_get(&h, &[0]);

            add(&mut h, &[10]);
            assert_get(&h, &[10]);
            assert_not_get(&h, &[1, 2, 9]);

            add(&mut h, &[22]);
            assert_get(&h, &[22]);
            assert_not_get(&h, &[3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 20, 21]);
        }
    }

    #[test]
    fn test_send_history_resend_flag() {
        let mut h = SendHistory::new(4);
        assert!(h.take_for_resend(0).is_none());

        for seq in 100..110 {
            h.add(&packet(seq));
        }

        let (p, again) = h.take_for_resend(105).expect("in history");
        assert_eq!(p.sequence_number(), 105);
        assert!(!again);

        let (_, again) = h.take_for_resend(105).expect("in history");
        assert!(again);

        assert!(h.take_for_resend(110).is_none());
        assert!(h.take_for_resend(90).is_none());
    }
}
