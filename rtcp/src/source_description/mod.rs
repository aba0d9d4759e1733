
use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::*;
use crate::util::*;

type Result<T> = std::result::Result<T, util::Error>;

const SDES_SOURCE_LEN: usize = 4;
/// type octet plus length octet
const SDES_ITEM_HEADER_LEN: usize = 2;

/// SdesType identifies an SDES item, RFC 3550 6.5.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum SdesType {
    /// terminates the item list of a chunk
    #[default]
    SdesEnd = 0,
    SdesCname = 1,
    SdesName = 2,
    SdesEmail = 3,
    SdesPhone = 4,
    SdesLocation = 5,
    SdesTool = 6,
    SdesNote = 7,
    SdesPrivate = 8,
}

const SDES_TYPES: [(SdesType, &str); 9] = [
    (SdesType::SdesEnd, "END"),
    (SdesType::SdesCname, "CNAME"),
    (SdesType::SdesName, "NAME"),
    (SdesType::SdesEmail, "EMAIL"),
    (SdesType::SdesPhone, "PHONE"),
    (SdesType::SdesLocation, "LOC"),
    (SdesType::SdesTool, "TOOL"),
    (SdesType::SdesNote, "NOTE"),
    (SdesType::SdesPrivate, "PRIV"),
];

impl fmt::Display for SdesType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(SDES_TYPES[*self as usize].1)
    }
}

impl From<u8> for SdesType {
    /// Unknown item types read as END.
    fn from(b: u8) -> Self {
        SDES_TYPES
            .get(b as usize)
            .map_or(SdesType::SdesEnd, |(t, _)| *t)
    }
}

/// SourceDescriptionChunk lists the items about one SSRC or CSRC.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct SourceDescriptionChunk {
    pub source: u32,
    pub items: Vec<SourceDescriptionItem>,
}

impl SourceDescriptionChunk {
    /// item returns the text of the first item of `sdes_type`.
    pub fn item(&self, sdes_type: SdesType) -> Option<&Bytes> {
        self.items
            .iter()
            .find(|it| it.sdes_type == sdes_type)
            .map(|it| &it.text)
    }

    /// unpadded size: source, items and the END octet
    fn raw_size(&self) -> usize {
        SDES_SOURCE_LEN + self.items.iter().map(|it| it.marshal_size()).sum::<usize>() + 1
    }
}

impl MarshalSize for SourceDescriptionChunk {
    fn marshal_size(&self) -> usize {
        let l = self.raw_size();
        l + get_padding_size(l)
    }
}

impl Marshal for SourceDescriptionChunk {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        let size = self.marshal_size();
        if buf.remaining_mut() < size {
            return Err(Error::BufferTooShort.into());
        }

        buf.put_u32(self.source);
        for it in &self.items {
            let n = it.marshal_to(buf)?;
            buf = &mut buf[n..];
        }
        // END, then zeros up to the next word
        buf.put_bytes(0, size - self.raw_size() + 1);
        Ok(size)
    }
}

impl Unmarshal for SourceDescriptionChunk {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let available = raw_packet.remaining();
        if available < SDES_SOURCE_LEN + 1 {
            return Err(Error::PacketTooShort.into());
        }

        let source = raw_packet.get_u32();
        let mut consumed = SDES_SOURCE_LEN;
        let mut items = vec![];
        while consumed < available {
            let item = SourceDescriptionItem::unmarshal(raw_packet)?;
            if item.sdes_type != SdesType::SdesEnd {
                consumed += item.marshal_size();
                items.push(item);
                continue;
            }

            let padding = get_padding_size(consumed + 1);
            if raw_packet.remaining() < padding {
                return Err(Error::PacketTooShort.into());
            }
            raw_packet.advance(padding);
            return Ok(SourceDescriptionChunk { source, items });
        }

        Err(Error::PacketTooShort.into())
    }
}

/// SourceDescriptionItem is one typed text of a chunk. Items are not padded
/// individually.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct SourceDescriptionItem {
    /// never `SdesEnd` in an item that gets marshaled
    pub sdes_type: SdesType,
    pub text: Bytes,
}

impl SourceDescriptionItem {
    pub fn new(sdes_type: SdesType, text: impl Into<Bytes>) -> Self {
        SourceDescriptionItem {
            sdes_type,
            text: text.into(),
        }
    }

    /// private builds a PRIV item, whose text is a length prefixed prefix
    /// string followed by the value.
    pub fn private(prefix: &[u8], value: &[u8]) -> std::result::Result<Self, Error> {
        let len = 1 + prefix.len() + value.len();
        if len > SDES_MAX_OCTET_COUNT {
            return Err(Error::SdesTextTooLong);
        }
        let mut text = Vec::with_capacity(len);
        text.put_u8(prefix.len() as u8);
        text.extend_from_slice(prefix);
        text.extend_from_slice(value);
        Ok(SourceDescriptionItem::new(SdesType::SdesPrivate, text))
    }

    /// private_parts splits a PRIV item into its prefix and value.
    pub fn private_parts(&self) -> Option<(Bytes, Bytes)> {
        if self.sdes_type != SdesType::SdesPrivate {
            return None;
        }
        let prefix_len = *self.text.first()? as usize;
        if 1 + prefix_len > self.text.len() {
            return None;
        }
        Some((
            self.text.slice(1..1 + prefix_len),
            self.text.slice(1 + prefix_len..),
        ))
    }
}

impl MarshalSize for SourceDescriptionItem {
    fn marshal_size(&self) -> usize {
        SDES_ITEM_HEADER_LEN + self.text.len()
    }
}

impl Marshal for SourceDescriptionItem {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if self.sdes_type == SdesType::SdesEnd {
            return Err(Error::SdesMissingType.into());
        }
        if self.text.len() > SDES_MAX_OCTET_COUNT {
            return Err(Error::SdesTextTooLong.into());
        }
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort.into());
        }

        buf.put_u8(self.sdes_type as u8);
        buf.put_u8(self.text.len() as u8);
        buf.put_slice(&self.text);
        Ok(self.marshal_size())
    }
}

impl Unmarshal for SourceDescriptionItem {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if !raw_packet.has_remaining() {
            return Err(Error::PacketTooShort.into());
        }
        let sdes_type = SdesType::from(raw_packet.get_u8());
        if sdes_type == SdesType::SdesEnd {
            return Ok(SourceDescriptionItem::default());
        }

        if !raw_packet.has_remaining() {
            return Err(Error::PacketTooShort.into());
        }
        let len = raw_packet.get_u8() as usize;
        if raw_packet.remaining() < len {
            return Err(Error::PacketTooShort.into());
        }
        Ok(SourceDescriptionItem {
            sdes_type,
            text: raw_packet.copy_to_bytes(len),
        })
    }
}

/// SourceDescription (SDES) carries chunks of items about sources, the
/// CNAME above all.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct SourceDescription {
    pub chunks: Vec<SourceDescriptionChunk>,
}

impl SourceDescription {
    /// cname returns the CNAME announced for `source`.
    pub fn cname(&self, source: u32) -> Option<&Bytes> {
        self.chunks
            .iter()
            .find(|c| c.source == source)
            .and_then(|c| c.item(SdesType::SdesCname))
    }
}

impl fmt::Display for SourceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Source Description:")?;
        for c in &self.chunks {
            writeln!(f, "\t{:x}", c.source)?;
            for it in &c.items {
                writeln!(f, "\t\t{}: {}", it.sdes_type, String::from_utf8_lossy(&it.text))?;
            }
        }
        Ok(())
    }
}

impl Packet for SourceDescription {
    fn header(&self) -> Header {
        Header {
            padding: get_padding_size(self.raw_size()) != 0,
            count: self.chunks.len() as u8,
            packet_type: PacketType::SourceDescription,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        self.chunks.iter().map(|x| x.source).collect()
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH + self.chunks.iter().map(|c| c.marshal_size()).sum::<usize>()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<SourceDescription>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for SourceDescription {
    fn marshal_size(&self) -> usize {
        let l = self.raw_size();
        l + get_padding_size(l)
    }
}

impl Marshal for SourceDescription {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if self.chunks.len() > COUNT_MAX {
            return Err(Error::TooManyChunks.into());
        }
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort.into());
        }

        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];
        for c in &self.chunks {
            let n = c.marshal_to(buf)?;
            buf = &mut buf[n..];
        }
        if h.padding {
            put_padding(buf, self.raw_size());
        }
        Ok(self.marshal_size())
    }
}

impl Unmarshal for SourceDescription {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let total = raw_packet.remaining();
        let h = Header::unmarshal(raw_packet)?;
        if h.packet_type != PacketType::SourceDescription {
            return Err(Error::WrongType.into());
        }

        let mut read = HEADER_LENGTH;
        let mut chunks = Vec::with_capacity(h.count as usize);
        while read < total {
            let chunk = SourceDescriptionChunk::unmarshal(raw_packet)?;
            read += chunk.marshal_size();
            chunks.push(chunk);
        }
        if chunks.len() != h.count as usize {
            return Err(Error::InvalidHeader.into());
        }

        raw_packet.advance(raw_packet.remaining());
        Ok(SourceDescription { chunks })
    }
}
