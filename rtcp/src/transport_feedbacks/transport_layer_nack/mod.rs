#[cfg(test)]
mod transport_layer_nack_test;

use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::*;
use crate::util::*;

/// Bit n set means packet_id + n + 1 was lost too.
type PacketBitmap = u16;

/// NackPair is the wire form of up to 17 lost sequence numbers: one id
/// followed by a bitmap of the 16 after it.
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct NackPair {
    pub packet_id: u16,
    pub lost_packets: PacketBitmap,
}

/// Yields the sequence numbers of a NackPair in ascending (wrapping) order.
pub struct NackIterator {
    packet_id: u16,
    bitfield: PacketBitmap,
    yielded_first: bool,
}

impl Iterator for NackIterator {
    type Item = u16;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.yielded_first {
            self.yielded_first = true;
            return Some(self.packet_id);
        }
        if self.bitfield == 0 {
            return None;
        }

        let bit = self.bitfield.trailing_zeros() as u16;
        self.bitfield &= self.bitfield - 1;
        Some(self.packet_id.wrapping_add(bit + 1))
    }
}

impl NackPair {
    pub fn new(seq: u16) -> Self {
        Self {
            packet_id: seq,
            lost_packets: 0,
        }
    }

    /// packet_list returns every sequence number this pair reports lost.
    pub fn packet_list(&self) -> Vec<u16> {
        self.into_iter().collect()
    }
}

impl IntoIterator for NackPair {
    type Item = u16;
    type IntoIter = NackIterator;

    fn into_iter(self) -> Self::IntoIter {
        NackIterator {
            packet_id: self.packet_id,
            bitfield: self.lost_packets,
            yielded_first: false,
        }
    }
}

const NACK_OFFSET: usize = 8;
const NACK_PAIR_LENGTH: usize = 4;

/// TransportLayerNack is the generic NACK of RFC 4585 6.2.1: the sender of
/// `media_ssrc` is asked to retransmit the listed packets.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct TransportLayerNack {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,

    pub nacks: Vec<NackPair>,
}

impl TransportLayerNack {
    /// new packs `lost`, ordered oldest first, into as few pairs as possible.
    pub fn new(sender_ssrc: u32, media_ssrc: u32, lost: &[u16]) -> Self {
        TransportLayerNack {
            sender_ssrc,
            media_ssrc,
            nacks: nack_pairs_from_sequence_numbers(lost),
        }
    }

    /// packet_list flattens every pair into the list of lost sequence numbers.
    pub fn packet_list(&self) -> Vec<u16> {
        self.nacks.iter().flat_map(|p| p.into_iter()).collect()
    }
}

impl fmt::Display for TransportLayerNack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "TransportLayerNack {:x} -> {:x}",
            self.sender_ssrc, self.media_ssrc
        )?;
        for nack in &self.nacks {
            writeln!(f, "\t{}\t{:016b}", nack.packet_id, nack.lost_packets)?;
        }
        Ok(())
    }
}

impl Packet for TransportLayerNack {
    fn header(&self) -> Header {
        Header {
            padding: get_padding_size(self.raw_size()) != 0,
            count: FORMAT_TLN,
            packet_type: PacketType::TransportSpecificFeedback,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH + NACK_OFFSET + self.nacks.len() * NACK_PAIR_LENGTH
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<TransportLayerNack>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for TransportLayerNack {
    fn marshal_size(&self) -> usize {
        let l = self.raw_size();
        l + get_padding_size(l)
    }
}

impl Marshal for TransportLayerNack {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize, util::Error> {
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P|  FMT=1  |   PT=RTPFB    |          length               |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                  SSRC of packet sender                        |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                  SSRC of media source                         |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |            PID                |             BLP               |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        if self.raw_size() / 4 - 1 > u16::MAX as usize {
            return Err(Error::TooManyReports.into());
        }
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort.into());
        }

        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);

        for nack in &self.nacks {
            buf.put_u16(nack.packet_id);
            buf.put_u16(nack.lost_packets);
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for TransportLayerNack {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self, util::Error>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < (HEADER_LENGTH + NACK_OFFSET) {
            return Err(Error::PacketTooShort.into());
        }

        let h = Header::unmarshal(raw_packet)?;
        if h.packet_type != PacketType::TransportSpecificFeedback || h.count != FORMAT_TLN {
            return Err(Error::WrongType.into());
        }
        if raw_packet_len < h.packet_len() || h.packet_len() < HEADER_LENGTH + NACK_OFFSET {
            return Err(Error::PacketTooShort.into());
        }

        let sender_ssrc = raw_packet.get_u32();
        let media_ssrc = raw_packet.get_u32();

        let count = (h.packet_len() - HEADER_LENGTH - NACK_OFFSET) / NACK_PAIR_LENGTH;
        let mut nacks = Vec::with_capacity(count);
        for _ in 0..count {
            nacks.push(NackPair {
                packet_id: raw_packet.get_u16(),
                lost_packets: raw_packet.get_u16(),
            });
        }

        if raw_packet.has_remaining() {
            raw_packet.advance(raw_packet.remaining());
        }

        Ok(TransportLayerNack {
            sender_ssrc,
            media_ssrc,
            nacks,
        })
    }
}

/// nack_pairs_from_sequence_numbers packs sequence numbers into NackPairs. The
/// input is expected oldest first; a number up to 16 after the current pair's
/// id (counting across the 16-bit wrap) joins its bitmap.
pub fn nack_pairs_from_sequence_numbers(seq_nos: &[u16]) -> Vec<NackPair> {
    let mut pairs: Vec<NackPair> = vec![];

    for &seq in seq_nos {
        if let Some(pair) = pairs.last_mut() {
            let distance = seq.wrapping_sub(pair.packet_id);
            if distance == 0 {
                continue;
            }
            if distance <= 16 {
                pair.lost_packets |= 1 << (distance - 1);
                continue;
            }
        }
        pairs.push(NackPair::new(seq));
    }

    pairs
}
