
use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::*;

type Result<T> = std::result::Result<T, util::Error>;

const TST_OFFSET: usize = 8;
const TST_ENTRY_LENGTH: usize = 8;
const INDEX_MAX: u8 = 31;

/// TradeOffEntry is one FCI entry of TSTR or TSTN, RFC 5104 4.3.2.
///
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                              SSRC                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Seq nr.      |  Reserved                           | Index   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct TradeOffEntry {
    pub ssrc: u32,
    pub sequence_number: u8,
    /// 0 favours spatial quality, 31 favours frame rate
    pub index: u8,
}

/// TemporalSpatialTradeOff carries either a request (TSTR, FMT 5) or the
/// matching notification (TSTN, FMT 6); the two share one layout.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct TemporalSpatialTradeOff<const FORMAT: u8> {
    pub sender_ssrc: u32,
    pub entries: Vec<TradeOffEntry>,
}

pub type TemporalSpatialTradeOffRequest = TemporalSpatialTradeOff<FORMAT_TSTR>;
pub type TemporalSpatialTradeOffNotification = TemporalSpatialTradeOff<FORMAT_TSTN>;

impl<const FORMAT: u8> fmt::Display for TemporalSpatialTradeOff<FORMAT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if FORMAT == FORMAT_TSTR { "TSTR" } else { "TSTN" };
        write!(f, "{label} {:x}", self.sender_ssrc)?;
        for e in &self.entries {
            write!(f, " ({:x} seq {} index {})", e.ssrc, e.sequence_number, e.index)?;
        }
        Ok(())
    }
}

impl<const FORMAT: u8> Packet for TemporalSpatialTradeOff<FORMAT> {
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.ssrc).collect()
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH + TST_OFFSET + self.entries.len() * TST_ENTRY_LENGTH
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<TemporalSpatialTradeOff<FORMAT>>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl<const FORMAT: u8> MarshalSize for TemporalSpatialTradeOff<FORMAT> {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl<const FORMAT: u8> Marshal for TemporalSpatialTradeOff<FORMAT> {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort.into());
        }
        if self.entries.iter().any(|e| e.index > INDEX_MAX) {
            return Err(Error::InvalidTradeOff.into());
        }

        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put_u32(self.sender_ssrc);
        buf.put_u32(0);

        for e in &self.entries {
            buf.put_u32(e.ssrc);
            buf.put_u32((e.sequence_number as u32) << 24 | e.index as u32);
        }

        Ok(self.marshal_size())
    }
}

impl<const FORMAT: u8> Unmarshal for TemporalSpatialTradeOff<FORMAT> {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < HEADER_LENGTH + TST_OFFSET {
            return Err(Error::PacketTooShort.into());
        }

        let h = Header::unmarshal(raw_packet)?;
        if h.packet_type != PacketType::PayloadSpecificFeedback || h.count != FORMAT {
            return Err(Error::WrongType.into());
        }
        if h.packet_len() > raw_packet_len || h.packet_len() < HEADER_LENGTH + TST_OFFSET {
            return Err(Error::PacketTooShort.into());
        }

        let sender_ssrc = raw_packet.get_u32();
        let _media_ssrc = raw_packet.get_u32();

        let count = (h.packet_len() - HEADER_LENGTH - TST_OFFSET) / TST_ENTRY_LENGTH;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let ssrc = raw_packet.get_u32();
            let word = raw_packet.get_u32();
            entries.push(TradeOffEntry {
                ssrc,
                sequence_number: (word >> 24) as u8,
                index: (word & INDEX_MAX as u32) as u8,
            });
        }

        if raw_packet.has_remaining() {
            raw_packet.advance(raw_packet.remaining());
        }

        Ok(TemporalSpatialTradeOff {
            sender_ssrc,
            entries,
        })
    }
}
