#[cfg(test)]
mod transport_layer_cc_test;

use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::*;
use crate::util::*;

type Result<T> = std::result::Result<T, util::Error>;

/// https://tools.ietf.org/html/draft-holmer-rmcat-transport-wide-cc-extensions-01#section-3.1.5
pub const TYPE_TCC_DELTA_SCALE_FACTOR: i64 = 250;
/// The reference time counts multiples of 64ms.
pub const REFERENCE_TIME_UNIT_US: i64 = 64_000;

/// bytes between the end of the RTCP header and the first packet chunk
const PACKET_CHUNK_OFFSET: usize = 16;
const PACKET_STATUS_CHUNK_LENGTH: usize = 2;
const MAX_RUN_LENGTH: u16 = 0x1fff;
const TWO_BIT_VECTOR_CAPACITY: usize = 7;
const ONE_BIT_VECTOR_CAPACITY: usize = 14;

/// type of packet status symbol and recv delta
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum SymbolTypeTcc {
    #[default]
    PacketNotReceived = 0,
    PacketReceivedSmallDelta = 1,
    PacketReceivedLargeDelta = 2,
    /// reserved in the draft; decoded as received with no delta
    PacketReceivedWithoutDelta = 3,
}

impl From<u16> for SymbolTypeTcc {
    fn from(val: u16) -> Self {
        match val & 0x3 {
            0 => SymbolTypeTcc::PacketNotReceived,
            1 => SymbolTypeTcc::PacketReceivedSmallDelta,
            2 => SymbolTypeTcc::PacketReceivedLargeDelta,
            _ => SymbolTypeTcc::PacketReceivedWithoutDelta,
        }
    }
}

impl SymbolTypeTcc {
    fn has_delta(self) -> bool {
        matches!(
            self,
            SymbolTypeTcc::PacketReceivedSmallDelta | SymbolTypeTcc::PacketReceivedLargeDelta
        )
    }

    /// symbol for a quantised delta: small when it fits one unsigned byte.
    fn for_delta(delta: i64) -> Self {
        if (0..=u8::MAX as i64).contains(&delta) {
            SymbolTypeTcc::PacketReceivedSmallDelta
        } else {
            SymbolTypeTcc::PacketReceivedLargeDelta
        }
    }
}

/// SymbolSizeTypeTcc selects 1-bit (14 symbols) or 2-bit (7 symbols) status vectors.
#[derive(Default, PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u16)]
pub enum SymbolSizeTypeTcc {
    #[default]
    OneBit = 0,
    TwoBit = 1,
}

/// PacketStatusChunk describes the status of a run of consecutive sequence numbers.
///
/// Run length chunk, T=0:
/// 0                   1
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |T| S |       Run Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///
/// Status vector chunk, T=1:
/// 0                   1
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |T|S|       symbol list         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketStatusChunk {
    RunLength {
        symbol: SymbolTypeTcc,
        run_length: u16,
    },
    StatusVector {
        symbol_size: SymbolSizeTypeTcc,
        symbols: Vec<SymbolTypeTcc>,
    },
}

impl PacketStatusChunk {
    fn encode(&self) -> u16 {
        match self {
            PacketStatusChunk::RunLength { symbol, run_length } => {
                ((*symbol as u16) << 13) | (run_length & MAX_RUN_LENGTH)
            }
            PacketStatusChunk::StatusVector {
                symbol_size,
                symbols,
            } => {
                let bits = match symbol_size {
                    SymbolSizeTypeTcc::OneBit => 1,
                    SymbolSizeTypeTcc::TwoBit => 2,
                };
                let mut word = 0x8000 | ((*symbol_size as u16) << 14);
                for (i, s) in symbols.iter().enumerate() {
                    let shift = 14 - bits * (i as u16 + 1);
                    word |= ((*s as u16) & ((1 << bits) - 1)) << shift;
                }
                word
            }
        }
    }

    fn decode(word: u16) -> Self {
        if word & 0x8000 == 0 {
            return PacketStatusChunk::RunLength {
                symbol: SymbolTypeTcc::from(word >> 13),
                run_length: word & MAX_RUN_LENGTH,
            };
        }

        if word & 0x4000 == 0 {
            // in a 1-bit vector a set bit means "received, small delta"
            let symbols = (0..ONE_BIT_VECTOR_CAPACITY)
                .map(|i| SymbolTypeTcc::from((word >> (13 - i)) & 0x1))
                .collect();
            PacketStatusChunk::StatusVector {
                symbol_size: SymbolSizeTypeTcc::OneBit,
                symbols,
            }
        } else {
            let symbols = (0..TWO_BIT_VECTOR_CAPACITY)
                .map(|i| SymbolTypeTcc::from((word >> (12 - 2 * i)) & 0x3))
                .collect();
            PacketStatusChunk::StatusVector {
                symbol_size: SymbolSizeTypeTcc::TwoBit,
                symbols,
            }
        }
    }

    fn symbol_count(&self) -> usize {
        match self {
            PacketStatusChunk::RunLength { run_length, .. } => *run_length as usize,
            PacketStatusChunk::StatusVector { symbols, .. } => symbols.len(),
        }
    }

    fn symbols(&self) -> Box<dyn Iterator<Item = SymbolTypeTcc> + '_> {
        match self {
            PacketStatusChunk::RunLength { symbol, run_length } => {
                Box::new(std::iter::repeat(*symbol).take(*run_length as usize))
            }
            PacketStatusChunk::StatusVector { symbols, .. } => Box::new(symbols.iter().copied()),
        }
    }
}

/// RecvDelta are represented as multiples of 250us
/// small delta is 1 byte: [0, 63.75]ms = [0, 255]*250us
/// big delta is 2 bytes: [-8192.0, 8191.75]ms = [-32768, 32767]*250us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecvDelta {
    pub type_tcc_packet: SymbolTypeTcc,
    /// us
    pub delta: i64,
}

impl RecvDelta {
    fn len(&self) -> usize {
        match self.type_tcc_packet {
            SymbolTypeTcc::PacketReceivedSmallDelta => 1,
            SymbolTypeTcc::PacketReceivedLargeDelta => 2,
            _ => 0,
        }
    }
}

impl MarshalSize for RecvDelta {
    fn marshal_size(&self) -> usize {
        self.len()
    }
}

impl Marshal for RecvDelta {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        let delta = self.delta / TYPE_TCC_DELTA_SCALE_FACTOR;
        if buf.remaining_mut() < self.len() {
            return Err(Error::BufferTooShort.into());
        }

        match self.type_tcc_packet {
            SymbolTypeTcc::PacketReceivedSmallDelta if (0..=u8::MAX as i64).contains(&delta) => {
                buf.put_u8(delta as u8);
                Ok(1)
            }
            SymbolTypeTcc::PacketReceivedLargeDelta
                if (i16::MIN as i64..=i16::MAX as i64).contains(&delta) =>
            {
                buf.put_i16(delta as i16);
                Ok(2)
            }
            _ => Err(Error::DeltaExceedLimit.into()),
        }
    }
}

/// TransportLayerCC for sender-BWE
/// https://tools.ietf.org/html/draft-holmer-rmcat-transport-wide-cc-extensions-01#page-5
///
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|  FMT=15 |    PT=205     |           length              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                     SSRC of packet sender                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      SSRC of media source                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      base sequence number     |      packet status count      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 reference time                | fb pkt. count |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          packet chunk         |         packet chunk          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// .                                                               .
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         packet chunk          |  recv delta   |  recv delta   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// .                                                               .
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           recv delta          |  recv delta   | zero padding  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct TransportLayerCc {
    /// SSRC of sender
    pub sender_ssrc: u32,
    /// SSRC of the media source
    pub media_ssrc: u32,
    /// Transport wide sequence of rtp extension
    pub base_sequence_number: u16,
    pub packet_status_count: u16,
    /// 24 bits, multiples of 64ms
    pub reference_time: u32,
    pub fb_pkt_count: u8,
    pub packet_chunks: Vec<PacketStatusChunk>,
    pub recv_deltas: Vec<RecvDelta>,
}

impl TransportLayerCc {
    /// from_arrivals encodes `arrivals`, pairs of transport sequence number and
    /// arrival time in microseconds, ordered by (wrapping) sequence number.
    ///
    /// Returns the feedback and how many arrivals it covers. Fewer than all are
    /// covered when the gap to the next packet does not fit a 16-bit delta or
    /// the status count would overflow; the caller starts a new feedback there.
    pub fn from_arrivals(
        sender_ssrc: u32,
        media_ssrc: u32,
        fb_pkt_count: u8,
        arrivals: &[(u16, i64)],
    ) -> (Self, usize) {
        let mut fb = TransportLayerCc {
            sender_ssrc,
            media_ssrc,
            fb_pkt_count,
            ..Default::default()
        };
        let Some(&(base, first_time)) = arrivals.first() else {
            return (fb, 0);
        };

        let reference = first_time.div_euclid(REFERENCE_TIME_UNIT_US);
        fb.base_sequence_number = base;
        fb.reference_time = (reference as u32) & 0x00ff_ffff;

        let mut statuses: Vec<SymbolTypeTcc> = vec![];
        // reconstructed time of the last received packet, so rounding never accumulates
        let mut last_us = reference * REFERENCE_TIME_UNIT_US;
        let mut next_seq = base;
        let mut consumed = 0;

        for &(seq, arrival) in arrivals {
            let gap = seq.wrapping_sub(next_seq) as usize;
            if consumed > 0 && gap > u16::MAX as usize / 2 {
                // duplicate or reordered behind the last one
                consumed += 1;
                continue;
            }
            if statuses.len() + gap + 1 > u16::MAX as usize {
                break;
            }

            let delta = (arrival - last_us).div_euclid(TYPE_TCC_DELTA_SCALE_FACTOR);
            if delta < i16::MIN as i64 || delta > i16::MAX as i64 {
                break;
            }

            statuses.extend(std::iter::repeat(SymbolTypeTcc::PacketNotReceived).take(gap));
            let symbol = SymbolTypeTcc::for_delta(delta);
            statuses.push(symbol);
            fb.recv_deltas.push(RecvDelta {
                type_tcc_packet: symbol,
                delta: delta * TYPE_TCC_DELTA_SCALE_FACTOR,
            });

            last_us += delta * TYPE_TCC_DELTA_SCALE_FACTOR;
            next_seq = seq.wrapping_add(1);
            consumed += 1;
        }

        fb.packet_status_count = statuses.len() as u16;
        fb.packet_chunks = build_chunks(&statuses);

        (fb, consumed)
    }

    /// packet_arrivals decodes every reported sequence number with its arrival
    /// time in microseconds, None for packets reported missing. Times are
    /// relative to the 24-bit reference time, so they wrap every 2^24 * 64ms.
    pub fn packet_arrivals(&self) -> Vec<(u16, Option<i64>)> {
        let mut time = self.reference_time as i64 * REFERENCE_TIME_UNIT_US;
        let mut deltas = self.recv_deltas.iter();
        let mut out = Vec::with_capacity(self.packet_status_count as usize);

        let symbols = self
            .packet_chunks
            .iter()
            .flat_map(|c| c.symbols())
            .take(self.packet_status_count as usize);
        for (i, symbol) in symbols.enumerate() {
            let seq = self.base_sequence_number.wrapping_add(i as u16);
            match symbol {
                SymbolTypeTcc::PacketNotReceived => out.push((seq, None)),
                SymbolTypeTcc::PacketReceivedWithoutDelta => out.push((seq, Some(time))),
                _ => {
                    if let Some(d) = deltas.next() {
                        time += d.delta;
                    }
                    out.push((seq, Some(time)));
                }
            }
        }

        out
    }
}

/// build_chunks packs statuses into run length chunks where a run of at least
/// seven equal symbols starts, and 2-bit vectors of seven symbols elsewhere.
fn build_chunks(statuses: &[SymbolTypeTcc]) -> Vec<PacketStatusChunk> {
    let mut chunks = vec![];
    let mut i = 0;

    while i < statuses.len() {
        let run = statuses[i..]
            .iter()
            .take(MAX_RUN_LENGTH as usize)
            .take_while(|s| **s == statuses[i])
            .count();

        if run >= TWO_BIT_VECTOR_CAPACITY || i + run == statuses.len() {
            chunks.push(PacketStatusChunk::RunLength {
                symbol: statuses[i],
                run_length: run as u16,
            });
            i += run;
        } else {
            let end = (i + TWO_BIT_VECTOR_CAPACITY).min(statuses.len());
            chunks.push(PacketStatusChunk::StatusVector {
                symbol_size: SymbolSizeTypeTcc::TwoBit,
                symbols: statuses[i..end].to_vec(),
            });
            i = end;
        }
    }

    chunks
}

impl fmt::Display for TransportLayerCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TransportLayerCC:")?;
        writeln!(f, "\tSender Ssrc {}", self.sender_ssrc)?;
        writeln!(f, "\tMedia Ssrc {}", self.media_ssrc)?;
        writeln!(f, "\tBase Sequence Number {}", self.base_sequence_number)?;
        writeln!(f, "\tStatus Count {}", self.packet_status_count)?;
        writeln!(f, "\tReference Time {}", self.reference_time)?;
        writeln!(f, "\tFeedback Packet Count {}", self.fb_pkt_count)?;
        writeln!(f, "\tChunks {:?}", self.packet_chunks)?;
        writeln!(f, "\tRecv Deltas {:?}", self.recv_deltas)
    }
}

impl Packet for TransportLayerCc {
    fn header(&self) -> Header {
        Header {
            padding: get_padding_size(self.raw_size()) != 0,
            count: FORMAT_TCC,
            packet_type: PacketType::TransportSpecificFeedback,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH
            + PACKET_CHUNK_OFFSET
            + self.packet_chunks.len() * PACKET_STATUS_CHUNK_LENGTH
            + self.recv_deltas.iter().map(|d| d.len()).sum::<usize>()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<TransportLayerCc>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for TransportLayerCc {
    fn marshal_size(&self) -> usize {
        let l = self.raw_size();
        l + get_padding_size(l)
    }
}

impl Marshal for TransportLayerCc {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort.into());
        }

        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        buf.put_u16(self.base_sequence_number);
        buf.put_u16(self.packet_status_count);
        buf.put_u32(append_nbits_to_uint32(
            self.reference_time & 0x00ff_ffff,
            8,
            self.fb_pkt_count as u32,
        ));

        for chunk in &self.packet_chunks {
            buf.put_u16(chunk.encode());
        }

        for delta in &self.recv_deltas {
            let n = delta.marshal_to(buf)?;
            buf = &mut buf[n..];
        }

        if h.padding {
            put_padding(buf, self.raw_size());
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for TransportLayerCc {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < HEADER_LENGTH + PACKET_CHUNK_OFFSET {
            return Err(Error::PacketTooShort.into());
        }

        let h = Header::unmarshal(raw_packet)?;
        if h.packet_type != PacketType::TransportSpecificFeedback || h.count != FORMAT_TCC {
            return Err(Error::WrongType.into());
        }

        // https://tools.ietf.org/html/rfc4585#page-33
        let total_length = h.packet_len();
        if total_length < HEADER_LENGTH + PACKET_CHUNK_OFFSET || raw_packet_len < total_length {
            return Err(Error::PacketTooShort.into());
        }

        let mut body: Bytes = raw_packet.copy_to_bytes(total_length - HEADER_LENGTH);
        if raw_packet.has_remaining() {
            raw_packet.advance(raw_packet.remaining());
        }

        let sender_ssrc = body.get_u32();
        let media_ssrc = body.get_u32();
        let base_sequence_number = body.get_u16();
        let packet_status_count = body.get_u16();
        let reference_time = get_24bits_from_bytes(&body[..3]);
        body.advance(3);
        let fb_pkt_count = body.get_u8();

        let mut packet_chunks = vec![];
        let mut symbols: Vec<SymbolTypeTcc> = vec![];
        while symbols.len() < packet_status_count as usize {
            if body.remaining() < PACKET_STATUS_CHUNK_LENGTH {
                return Err(Error::PacketStatusChunkLength.into());
            }

            let mut chunk = PacketStatusChunk::decode(body.get_u16());
            let wanted = packet_status_count as usize - symbols.len();
            if let PacketStatusChunk::StatusVector { symbols: list, .. } = &mut chunk {
                // the final vector may describe more packets than were reported
                list.truncate(wanted);
            }
            if chunk.symbol_count() == 0 {
                return Err(Error::PacketStatusChunkLength.into());
            }
            symbols.extend(chunk.symbols().take(wanted));
            packet_chunks.push(chunk);
        }

        let mut recv_deltas = vec![];
        for symbol in symbols.into_iter().filter(|s| s.has_delta()) {
            let delta = match symbol {
                SymbolTypeTcc::PacketReceivedSmallDelta if body.remaining() >= 1 => {
                    body.get_u8() as i64
                }
                SymbolTypeTcc::PacketReceivedLargeDelta if body.remaining() >= 2 => {
                    body.get_i16() as i64
                }
                _ => return Err(Error::PacketTooShort.into()),
            };
            recv_deltas.push(RecvDelta {
                type_tcc_packet: symbol,
                delta: delta * TYPE_TCC_DELTA_SCALE_FACTOR,
            });
        }

        Ok(TransportLayerCc {
            sender_ssrc,
            media_ssrc,
            base_sequence_number,
            packet_status_count,
            reference_time,
            fb_pkt_count,
            packet_chunks,
            recv_deltas,
        })
    }
}
