#[cfg(test)]
mod compound_packet_test;

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::header::*;
use crate::packet::*;
use crate::raw_packet::RawPacket;
use crate::receiver_report::*;
use crate::sender_report::*;
use crate::source_description::*;

/// Fields of one sub-packet header, read straight from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubpacketHeader {
    pub version: u8,
    pub padding: bool,
    pub count: u8,
    pub packet_type: u8,
    /// total length of the sub-packet in bytes, header included
    pub len: usize,
}

impl SubpacketHeader {
    fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < HEADER_LENGTH {
            return None;
        }
        Some(SubpacketHeader {
            version: (raw[0] >> VERSION_SHIFT) & VERSION_MASK,
            padding: (raw[0] >> PADDING_SHIFT) & PADDING_MASK != 0,
            count: (raw[0] >> COUNT_SHIFT) & COUNT_MASK,
            packet_type: raw[1],
            len: (u16::from_be_bytes([raw[2], raw[3]]) as usize + 1) * 4,
        })
    }

    fn is_valid(&self) -> bool {
        self.version == RTP_VERSION && Header::is_valid_packet_type(self.packet_type)
    }
}

/// A CompoundPacket owns the bytes of one RTCP datagram: a run of sub-packets,
/// each a 4 byte header followed by a body of `length` 32-bit words.
///
/// Received datagrams are walked with `next_subpacket` or decoded as a whole
/// with `packets`. Outgoing datagrams are assembled in place: either with
/// `start_new_subpacket`, `set_payload_size` and `end_subpacket`, or with
/// `add_packet` for any typed sub-report.
///
/// RFC 3550 6.1 expects a compound packet to open with an SR or RR followed by
/// an SDES carrying a CNAME; `validate` checks that rule on demand, the walk
/// itself does not.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct CompoundPacket {
    buffer: BytesMut,
    /// offset of the sub-packet `next_subpacket` stopped on
    cursor: Option<usize>,
    /// offset of the header of the sub-packet being built
    open: Option<usize>,
}

impl fmt::Debug for CompoundPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompoundPacket")
            .field("len", &self.buffer.len())
            .field("cursor", &self.cursor)
            .field("open", &self.open)
            .finish()
    }
}

impl fmt::Display for CompoundPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompoundPacket [")?;
        let mut offset = 0;
        while let Some(h) = SubpacketHeader::parse(&self.buffer[offset..]) {
            if offset != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}/{} ({} bytes)", PacketType::from(h.packet_type), h.count, h.len)?;
            offset += h.len;
            if offset > self.buffer.len() {
                write!(f, " truncated")?;
                break;
            }
        }
        write!(f, "]")
    }
}

impl From<Bytes> for CompoundPacket {
    fn from(raw: Bytes) -> Self {
        CompoundPacket {
            buffer: BytesMut::from(&raw[..]),
            ..Default::default()
        }
    }
}

impl From<&[u8]> for CompoundPacket {
    fn from(raw: &[u8]) -> Self {
        CompoundPacket {
            buffer: BytesMut::from(raw),
            ..Default::default()
        }
    }
}

impl CompoundPacket {
    pub fn new() -> Self {
        CompoundPacket::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        CompoundPacket {
            buffer: BytesMut::with_capacity(capacity),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The datagram as written so far.
    pub fn bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buffer)
    }

    /// Consumes the packet, yielding its bytes without a copy.
    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }

    /// is_valid reports whether the buffer holds at least one sub-packet and every
    /// sub-packet has version 2, a type in 192..=223, and a length that fits.
    pub fn is_valid(&self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }

        let mut offset = 0;
        while offset < self.buffer.len() {
            let h = match SubpacketHeader::parse(&self.buffer[offset..]) {
                Some(h) => h,
                None => return false,
            };
            if !h.is_valid() || offset + h.len > self.buffer.len() {
                return false;
            }
            offset += h.len;
        }
        true
    }

    /// next_subpacket moves the cursor onto the following sub-packet. The first
    /// call lands on the first one. Returns false, leaving the cursor in place,
    /// when no complete sub-packet follows.
    pub fn next_subpacket(&mut self) -> bool {
        let next = match self.cursor.and_then(|c| self.header_at(c).map(|h| c + h.len)) {
            Some(next) => next,
            None if self.cursor.is_none() => 0,
            None => return false,
        };

        match self.header_at(next) {
            Some(h) if next + h.len <= self.buffer.len() => {
                self.cursor = Some(next);
                true
            }
            _ => false,
        }
    }

    /// Rewinds the cursor so the next `next_subpacket` lands on the first sub-packet.
    pub fn rewind(&mut self) {
        self.cursor = None;
    }

    /// Header of the sub-packet under the cursor.
    pub fn subpacket_header(&self) -> Option<SubpacketHeader> {
        self.cursor.and_then(|c| self.header_at(c))
    }

    /// Raw bytes, header included, of the sub-packet under the cursor.
    pub fn subpacket(&self) -> Option<&[u8]> {
        let c = self.cursor?;
        let h = self.header_at(c)?;
        self.buffer.get(c..c + h.len)
    }

    /// Decodes the sub-packet under the cursor.
    pub fn decode_subpacket(&self) -> Result<Box<dyn Packet + Send + Sync>> {
        let mut raw = self.subpacket().ok_or(Error::PacketTooShort)?;
        unmarshaller(&mut raw).map_err(Error::flatten)
    }

    /// start_new_subpacket writes a header for a sub-packet of type `packet_type`
    /// with `count` in the RC/FMT field. Its length is filled in by `end_subpacket`.
    pub fn start_new_subpacket(&mut self, packet_type: u8, count: u8) -> Result<()> {
        if !Header::is_valid_packet_type(packet_type) {
            return Err(Error::InvalidPacketType);
        }
        if count > COUNT_MASK {
            return Err(Error::InvalidHeader);
        }
        if self.open.is_some() {
            self.end_subpacket()?;
        }

        self.open = Some(self.buffer.len());
        self.buffer
            .put_u8(RTP_VERSION << VERSION_SHIFT | (count & COUNT_MASK) << COUNT_SHIFT);
        self.buffer.put_u8(packet_type);
        self.buffer.put_u16(0);
        Ok(())
    }

    /// set_payload_size resizes the body of the open sub-packet to `size` bytes,
    /// zero filling any growth, and hands back the body for writing.
    pub fn set_payload_size(&mut self, size: usize) -> Result<&mut [u8]> {
        let start = self.open.ok_or(Error::NoOpenSubpacket)? + HEADER_LENGTH;
        self.buffer.resize(start + size, 0);
        Ok(&mut self.buffer[start..])
    }

    /// end_subpacket zero pads the open sub-packet to a 32-bit boundary and
    /// writes its length field.
    pub fn end_subpacket(&mut self) -> Result<()> {
        let start = self.open.take().ok_or(Error::NoOpenSubpacket)?;

        let unaligned = (self.buffer.len() - start) % 4;
        if unaligned != 0 {
            self.buffer.put_bytes(0, 4 - unaligned);
        }

        let words = (self.buffer.len() - start) / 4 - 1;
        if words > u16::MAX as usize {
            self.buffer.truncate(start);
            return Err(Error::LengthOverrun(words * 4, u16::MAX as usize * 4));
        }
        self.buffer[start + 2..start + 4].copy_from_slice(&(words as u16).to_be_bytes());
        Ok(())
    }

    /// add_packet appends a complete typed sub-report.
    pub fn add_packet(&mut self, packet: &(dyn Packet + Send + Sync)) -> Result<()> {
        let h = packet.header();
        // an opaque packet keeps its wire type even when `PacketType` cannot name it
        let packet_type = packet
            .as_any()
            .downcast_ref::<RawPacket>()
            .map_or(h.packet_type as u8, |raw| raw.packet_type());
        self.start_new_subpacket(packet_type, h.count)?;

        let size = packet.marshal_size();
        let start = self.buffer.len() - HEADER_LENGTH;
        self.buffer.resize(start + size, 0);
        if let Err(err) = packet.marshal_to(&mut self.buffer[start..]) {
            self.buffer.truncate(start);
            self.open = None;
            return Err(Error::flatten(err));
        }

        self.end_subpacket()
    }

    /// packets decodes every sub-packet it can reach. A sub-packet that fails to
    /// decode is reported in the error list and skipped; a header that does not
    /// fit ends the walk. Sub-packets decoded before a failure are kept.
    pub fn packets(&self) -> (Vec<Box<dyn Packet + Send + Sync>>, Vec<Error>) {
        let mut packets = vec![];
        let mut errors = vec![];

        let mut raw = &self.buffer[..];
        while raw.has_remaining() {
            let h = match SubpacketHeader::parse(raw) {
                Some(h) => h,
                None => {
                    errors.push(Error::PacketTooShort);
                    break;
                }
            };
            if h.len > raw.len() {
                errors.push(Error::LengthOverrun(h.len, raw.len()));
                break;
            }

            let (mut sub, rest) = raw.split_at(h.len);
            raw = rest;

            if h.version != RTP_VERSION {
                errors.push(Error::BadVersion);
                continue;
            }
            if !Header::is_valid_packet_type(h.packet_type) {
                errors.push(Error::InvalidPacketType);
                continue;
            }

            match unmarshaller(&mut sub) {
                Ok(p) => packets.push(p),
                Err(err) => errors.push(Error::flatten(err)),
            }
        }

        (packets, errors)
    }

    /// validate decodes the whole datagram and checks the RFC 3550 layout: an SR
    /// or RR first, then only RRs until an SDES that carries a CNAME.
    pub fn validate(&self) -> Result<()> {
        self.cname().map(|_| ())
    }

    /// cname returns the CNAME every compound packet must announce.
    pub fn cname(&self) -> Result<Bytes> {
        let mut raw = &self.buffer[..];
        let packets = unmarshal(&mut raw).map_err(|err| match Error::flatten(err) {
            Error::InvalidHeader => Error::EmptyCompound,
            err => err,
        })?;

        let first = packets[0].as_any();
        if !first.is::<SenderReport>() && !first.is::<ReceiverReport>() {
            return Err(Error::BadFirstPacket);
        }

        for p in &packets[1..] {
            if p.as_any().is::<ReceiverReport>() {
                continue;
            }
            let sdes = p
                .as_any()
                .downcast_ref::<SourceDescription>()
                .ok_or(Error::PacketBeforeCname)?;
            return sdes
                .chunks
                .iter()
                .find_map(|c| c.item(SdesType::SdesCname))
                .cloned()
                .ok_or(Error::MissingCname);
        }

        Err(Error::MissingCname)
    }

    fn header_at(&self, offset: usize) -> Option<SubpacketHeader> {
        self.buffer.get(offset..).and_then(SubpacketHeader::parse)
    }
}
