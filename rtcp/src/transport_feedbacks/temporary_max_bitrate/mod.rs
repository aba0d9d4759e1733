#[cfg(test)]
mod temporary_max_bitrate_test;

use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::*;

type Result<T> = std::result::Result<T, util::Error>;

const TMMB_OFFSET: usize = 8;
const TMMB_ENTRY_LENGTH: usize = 8;
const MANTISSA_BITS: u32 = 17;
const MANTISSA_MAX: u64 = (1 << MANTISSA_BITS) - 1;
const OVERHEAD_MAX: u16 = (1 << 9) - 1;

/// TmmbEntry is one FCI entry of a TMMBR or TMMBN message, RFC 5104 4.2.1.
///
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                              SSRC                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | MxTBR Exp |  MxTBR Mantissa                 |Measured Overhead|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct TmmbEntry {
    pub ssrc: u32,
    /// bits per second; values that need more than 17 bits of mantissa lose precision
    pub bitrate: u64,
    /// per packet overhead in bytes, 9 bits
    pub overhead: u16,
}

impl TmmbEntry {
    fn marshal_to(&self, buf: &mut &mut [u8]) -> Result<()> {
        if self.overhead > OVERHEAD_MAX {
            return Err(Error::InvalidOverhead.into());
        }

        let mut exp = 0u32;
        let mut mantissa = self.bitrate;
        while mantissa > MANTISSA_MAX {
            mantissa >>= 1;
            exp += 1;
        }

        buf.put_u32(self.ssrc);
        buf.put_u32(exp << 26 | (mantissa as u32) << 9 | self.overhead as u32);
        Ok(())
    }

    fn unmarshal<B: Buf>(raw_packet: &mut B) -> Self {
        let ssrc = raw_packet.get_u32();
        let word = raw_packet.get_u32();

        let exp = word >> 26;
        let mantissa = ((word >> 9) & MANTISSA_MAX as u32) as u64;
        let bitrate = if exp + MANTISSA_BITS > 64 {
            u64::MAX
        } else {
            mantissa << exp
        };

        TmmbEntry {
            ssrc,
            bitrate,
            overhead: (word & OVERHEAD_MAX as u32) as u16,
        }
    }
}

fn marshal_tmmb(
    mut buf: &mut [u8],
    h: Header,
    sender_ssrc: u32,
    entries: &[TmmbEntry],
    size: usize,
) -> Result<usize> {
    if buf.remaining_mut() < size {
        return Err(Error::BufferTooShort.into());
    }

    let n = h.marshal_to(buf)?;
    buf = &mut buf[n..];

    buf.put_u32(sender_ssrc);
    // media source SSRC is unused, RFC 5104 4.2.1.2
    buf.put_u32(0);

    for entry in entries {
        entry.marshal_to(&mut buf)?;
    }

    Ok(size)
}

fn unmarshal_tmmb<B: Buf>(raw_packet: &mut B, format: u8) -> Result<(u32, Vec<TmmbEntry>)> {
    let raw_packet_len = raw_packet.remaining();
    if raw_packet_len < HEADER_LENGTH + TMMB_OFFSET {
        return Err(Error::PacketTooShort.into());
    }

    let h = Header::unmarshal(raw_packet)?;
    if h.packet_type != PacketType::TransportSpecificFeedback || h.count != format {
        return Err(Error::WrongType.into());
    }
    if h.packet_len() > raw_packet_len || h.packet_len() < HEADER_LENGTH + TMMB_OFFSET {
        return Err(Error::PacketTooShort.into());
    }

    let sender_ssrc = raw_packet.get_u32();
    let _media_ssrc = raw_packet.get_u32();

    let count = (h.packet_len() - HEADER_LENGTH - TMMB_OFFSET) / TMMB_ENTRY_LENGTH;
    let entries = (0..count)
        .map(|_| TmmbEntry::unmarshal(raw_packet))
        .collect();

    if raw_packet.has_remaining() {
        raw_packet.advance(raw_packet.remaining());
    }

    Ok((sender_ssrc, entries))
}

/// TemporaryMaxBitrateRequest (TMMBR) asks the listed media senders to cap
/// their bitrate, RFC 5104 4.2.1.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct TemporaryMaxBitrateRequest {
    pub sender_ssrc: u32,
    pub entries: Vec<TmmbEntry>,
}

/// TemporaryMaxBitrateNotification (TMMBN) announces the bounding set a media
/// sender currently honours, RFC 5104 4.2.2.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct TemporaryMaxBitrateNotification {
    pub sender_ssrc: u32,
    pub entries: Vec<TmmbEntry>,
}

macro_rules! impl_tmmb {
    ($name:ident, $format:expr, $label:expr) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                writeln!(f, "{} from {:x}", $label, self.sender_ssrc)?;
                for e in &self.entries {
                    writeln!(f, "\t{:x} {} bps overhead {}", e.ssrc, e.bitrate, e.overhead)?;
                }
                Ok(())
            }
        }

        impl Packet for $name {
            fn header(&self) -> Header {
                Header {
                    padding: false,
                    count: $format,
                    packet_type: PacketType::TransportSpecificFeedback,
                    length: ((self.marshal_size() / 4) - 1) as u16,
                }
            }

            fn destination_ssrc(&self) -> Vec<u32> {
                self.entries.iter().map(|e| e.ssrc).collect()
            }

            fn raw_size(&self) -> usize {
                HEADER_LENGTH + TMMB_OFFSET + self.entries.len() * TMMB_ENTRY_LENGTH
            }

            fn as_any(&self) -> &(dyn Any + Send + Sync) {
                self
            }

            fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
                other
                    .as_any()
                    .downcast_ref::<$name>()
                    .map_or(false, |a| self == a)
            }

            fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
                Box::new(self.clone())
            }
        }

        impl MarshalSize for $name {
            fn marshal_size(&self) -> usize {
                self.raw_size()
            }
        }

        impl Marshal for $name {
            fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
                marshal_tmmb(
                    buf,
                    self.header(),
                    self.sender_ssrc,
                    &self.entries,
                    self.marshal_size(),
                )
            }
        }

        impl Unmarshal for $name {
            fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
            where
                Self: Sized,
                B: Buf,
            {
                let (sender_ssrc, entries) = unmarshal_tmmb(raw_packet, $format)?;
                Ok($name {
                    sender_ssrc,
                    entries,
                })
            }
        }
    };
}

impl_tmmb!(TemporaryMaxBitrateRequest, FORMAT_TMMBR, "TMMBR");
impl_tmmb!(TemporaryMaxBitrateNotification, FORMAT_TMMBN, "TMMBN");
