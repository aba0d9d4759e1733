
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::{Error, Result};
use crate::header::*;

/// Packet is one RTP datagram held in a single owned buffer laid out as
/// `header | payload | padding`. Setters that change the CSRC list or the
/// header extension move the payload so that the buffer stays contiguous.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Packet {
    buf: BytesMut,
    header_size: usize,
    payload_size: usize,
    padding_size: usize,
}

impl Default for Packet {
    fn default() -> Self {
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH);
        buf.resize(HEADER_LENGTH, 0);
        buf[0] = RTP_VERSION << VERSION_SHIFT;
        Packet {
            buf,
            header_size: HEADER_LENGTH,
            payload_size: 0,
            padding_size: 0,
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = "RTP PACKET:\n".to_string();

        out += format!("\tVersion: {}\n", self.version()).as_str();
        out += format!("\tMarker: {}\n", self.marker()).as_str();
        out += format!("\tPayload Type: {}\n", self.payload_type()).as_str();
        out += format!("\tSequence Number: {}\n", self.sequence_number()).as_str();
        out += format!("\tTimestamp: {}\n", self.timestamp()).as_str();
        out += format!("\tSSRC: {} ({:x})\n", self.ssrc(), self.ssrc()).as_str();
        if self.csrc_count() > 0 {
            out += format!("\tCSRC: {:?}\n", self.csrc()).as_str();
        }
        if let Some(profile) = self.extension_profile() {
            out += format!("\tExtension: {} ids={:?}\n", profile, self.extension_ids()).as_str();
        }
        out += format!("\tPayload Length: {}\n", self.payload_size).as_str();
        if self.padding_size > 0 {
            out += format!("\tPadding: {}\n", self.padding_size).as_str();
        }

        write!(f, "{out}")
    }
}

impl Packet {
    pub fn new() -> Self {
        Packet::default()
    }

    /// with_payload creates a packet with an empty header and a copy of payload.
    pub fn with_payload(payload: &[u8]) -> Self {
        let mut p = Packet::default();
        p.set_payload(payload);
        p
    }

    /// decode validates a received datagram and takes ownership of its bytes.
    ///
    /// The buffer must hold the fixed header, every declared CSRC and the whole
    /// declared extension. A padding count in the last byte is only trusted when
    /// it fits after the header; otherwise it is treated as payload.
    pub fn decode(buf: BytesMut) -> Result<Self> {
        let raw_packet_len = buf.len();
        if raw_packet_len < HEADER_LENGTH {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P|X|  CC   |M|     PT      |       sequence number         |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                           timestamp                           |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |           synchronization source (SSRC) identifier            |
         * +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
         * |            contributing source (CSRC) identifiers             |
         * |                             ....                              |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        let b0 = buf[0];
        let version = b0 >> VERSION_SHIFT & VERSION_MASK;
        if version != RTP_VERSION {
            return Err(Error::ErrInvalidVersion(version));
        }

        let cc = (b0 & CC_MASK) as usize;
        let mut header_size = CSRC_OFFSET + cc * CSRC_LENGTH;
        if raw_packet_len < header_size {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        if (b0 >> EXTENSION_SHIFT & EXTENSION_MASK) > 0 {
            if raw_packet_len < header_size + EXTENSION_HEADER_LENGTH {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            let words = u16::from_be_bytes([buf[header_size + 2], buf[header_size + 3]]) as usize;
            header_size += EXTENSION_HEADER_LENGTH + words * 4;
            if raw_packet_len < header_size {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
        }

        let mut padding_size = 0;
        if (b0 >> PADDING_SHIFT & PADDING_MASK) > 0 && raw_packet_len > header_size {
            let declared = buf[raw_packet_len - 1] as usize;
            if header_size + declared <= raw_packet_len {
                padding_size = declared;
            }
        }

        Ok(Packet {
            buf,
            header_size,
            payload_size: raw_packet_len - header_size - padding_size,
            padding_size,
        })
    }

    pub fn version(&self) -> u8 {
        self.buf[0] >> VERSION_SHIFT & VERSION_MASK
    }

    pub fn padding(&self) -> bool {
        (self.buf[0] >> PADDING_SHIFT & PADDING_MASK) > 0
    }

    pub fn extension(&self) -> bool {
        (self.buf[0] >> EXTENSION_SHIFT & EXTENSION_MASK) > 0
    }

    pub fn csrc_count(&self) -> usize {
        (self.buf[0] & CC_MASK) as usize
    }

    pub fn marker(&self) -> bool {
        (self.buf[1] >> MARKER_SHIFT & MARKER_MASK) > 0
    }

    pub fn set_marker(&mut self, marker: bool) {
        if marker {
            self.buf[1] |= MARKER_MASK << MARKER_SHIFT;
        } else {
            self.buf[1] &= PT_MASK;
        }
    }

    pub fn payload_type(&self) -> u8 {
        self.buf[1] & PT_MASK
    }

    pub fn set_payload_type(&mut self, payload_type: u8) {
        self.buf[1] = (self.buf[1] & !PT_MASK) | (payload_type & PT_MASK);
    }

    pub fn sequence_number(&self) -> u16 {
        u16::from_be_bytes([self.buf[SEQ_NUM_OFFSET], self.buf[SEQ_NUM_OFFSET + 1]])
    }

    pub fn set_sequence_number(&mut self, sequence_number: u16) {
        self.buf[SEQ_NUM_OFFSET..SEQ_NUM_OFFSET + 2].copy_from_slice(&sequence_number.to_be_bytes());
    }

    pub fn timestamp(&self) -> u32 {
        self.get_u32_at(TIMESTAMP_OFFSET)
    }

    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.put_u32_at(TIMESTAMP_OFFSET, timestamp);
    }

    pub fn ssrc(&self) -> u32 {
        self.get_u32_at(SSRC_OFFSET)
    }

    pub fn set_ssrc(&mut self, ssrc: u32) {
        self.put_u32_at(SSRC_OFFSET, ssrc);
    }

    pub fn csrc(&self) -> Vec<u32> {
        (0..self.csrc_count())
            .map(|i| self.get_u32_at(CSRC_OFFSET + i * CSRC_LENGTH))
            .collect()
    }

    /// set_csrc replaces the contributing source list, moving any header
    /// extension and the payload to make room.
    pub fn set_csrc(&mut self, csrc: &[u32]) -> Result<()> {
        if csrc.len() > MAX_CSRC_COUNT {
            return Err(Error::ErrTooManyCsrcs);
        }

        let old_len = self.csrc_count() * CSRC_LENGTH;
        self.splice_header(CSRC_OFFSET, old_len, csrc.len() * CSRC_LENGTH);
        self.buf[0] = (self.buf[0] & !CC_MASK) | csrc.len() as u8;
        for (i, c) in csrc.iter().enumerate() {
            self.put_u32_at(CSRC_OFFSET + i * CSRC_LENGTH, *c);
        }

        Ok(())
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn padding_size(&self) -> usize {
        self.padding_size
    }

    pub fn packet_size(&self) -> usize {
        self.header_size + self.payload_size + self.padding_size
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[self.header_size..self.header_size + self.payload_size]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.header_size..self.header_size + self.payload_size]
    }

    /// as_bytes returns the wire form of the packet.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..]
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    /// set_payload replaces the payload, keeping the current padding length.
    pub fn set_payload(&mut self, payload: &[u8]) {
        let padding = self.padding_size;
        self.buf.truncate(self.header_size);
        self.buf.extend_from_slice(payload);
        self.payload_size = payload.len();
        self.padding_size = 0;
        self.write_padding(padding);
    }

    /// set_payload_size grows (zero filled) or truncates the payload.
    pub fn set_payload_size(&mut self, size: usize) {
        let padding = self.padding_size;
        self.buf.truncate(self.header_size + self.payload_size.min(size));
        self.buf.resize(self.header_size + size, 0);
        self.payload_size = size;
        self.padding_size = 0;
        self.write_padding(padding);
    }

    /// set_padding_size appends `size` bytes of padding, the last holding the count.
    /// Zero removes padding.
    pub fn set_padding_size(&mut self, size: usize) -> Result<()> {
        if size > u8::MAX as usize {
            return Err(Error::ErrInvalidPaddingSize);
        }
        self.buf.truncate(self.header_size + self.payload_size);
        self.padding_size = 0;
        self.write_padding(size);
        Ok(())
    }

    fn write_padding(&mut self, size: usize) {
        if size == 0 {
            self.buf[0] &= !(PADDING_MASK << PADDING_SHIFT);
            return;
        }
        let start = self.buf.len();
        self.buf.resize(start + size, 0);
        self.buf[start + size - 1] = size as u8;
        self.buf[0] |= PADDING_MASK << PADDING_SHIFT;
        self.padding_size = size;
    }

    /// adjust_header_size grows or shrinks the header, moving the payload and
    /// padding so they follow the new header end. New header bytes are zeroed.
    pub fn adjust_header_size(&mut self, new_header_size: usize) {
        let old = self.header_size;
        if new_header_size > old {
            self.splice_header(old, 0, new_header_size - old);
        } else if new_header_size < old {
            self.splice_header(new_header_size, old - new_header_size, 0);
        }
    }

    // Replaces `old_len` bytes at `at` with `new_len` zero bytes, moving everything after.
    fn splice_header(&mut self, at: usize, old_len: usize, new_len: usize) {
        let tail = at + old_len;
        let total = self.buf.len();
        if new_len > old_len {
            let grow = new_len - old_len;
            self.buf.resize(total + grow, 0);
            self.buf.copy_within(tail..total, tail + grow);
        } else if new_len < old_len {
            let shrink = old_len - new_len;
            self.buf.copy_within(tail..total, tail - shrink);
            self.buf.truncate(total - shrink);
        }
        self.buf[at..at + new_len].fill(0);
        self.header_size = self.header_size + new_len - old_len;
    }

    fn extension_offset(&self) -> usize {
        CSRC_OFFSET + self.csrc_count() * CSRC_LENGTH
    }

    fn extension_body(&self) -> Option<(ExtensionProfile, usize, usize)> {
        if !self.extension() {
            return None;
        }
        let off = self.extension_offset();
        let profile = u16::from_be_bytes([self.buf[off], self.buf[off + 1]]);
        Some((
            ExtensionProfile::from_profile(profile),
            off + EXTENSION_HEADER_LENGTH,
            self.header_size,
        ))
    }

    /// extension_profile reports the addressing mode of the header extension, if any.
    pub fn extension_profile(&self) -> Option<ExtensionProfile> {
        self.extension_body().map(|(profile, _, _)| profile)
    }

    /// get_extension returns the payload of extension `id`. For RFC 3550
    /// extensions `id` is the profile value.
    pub fn get_extension(&self, id: u16) -> Option<&[u8]> {
        let (profile, start, end) = self.extension_body()?;
        let (elements, _) = parse_extension_elements(profile, &self.buf[start..end]);
        elements
            .into_iter()
            .find(|e| e.id == id)
            .map(|e| &self.buf[start + e.data..start + e.data + e.len])
    }

    /// get_extensions returns every extension element in header order.
    pub fn get_extensions(&self) -> Vec<Extension> {
        match self.extension_body() {
            Some((profile, start, end)) => {
                let body = &self.buf[start..end];
                parse_extension_elements(profile, body)
                    .0
                    .into_iter()
                    .map(|e| Extension {
                        id: e.id,
                        payload: Bytes::copy_from_slice(&body[e.data..e.data + e.len]),
                    })
                    .collect()
            }
            None => vec![],
        }
    }

    fn extension_ids(&self) -> Vec<u16> {
        self.get_extensions().iter().map(|e| e.id).collect()
    }

    /// set_extension stores `payload` under `id`.
    ///
    /// A new id is appended and the extension length grows to the next 32 bit
    /// boundary. An existing id is overwritten in place, which requires the same
    /// length; remove and re-add to change it. If the packet carries an extension
    /// of another profile it is replaced. For `ExtensionProfile::Rfc3550` the id
    /// is ignored and the profile value identifies the extension.
    pub fn set_extension(
        &mut self,
        profile: ExtensionProfile,
        id: u16,
        payload: &[u8],
    ) -> Result<()> {
        match profile {
            ExtensionProfile::OneByte => {
                if id == 0 || id > MAX_ONE_BYTE_EXTENSION_ID {
                    return Err(Error::ErrRfc8285oneByteHeaderIdrange);
                }
                if payload.is_empty() || payload.len() > 16 {
                    return Err(Error::ErrRfc8285oneByteHeaderSize);
                }
            }
            ExtensionProfile::TwoByte => {
                if id == 0 || id > MAX_TWO_BYTE_EXTENSION_ID {
                    return Err(Error::ErrRfc8285twoByteHeaderIdrange);
                }
                if payload.len() > u8::MAX as usize {
                    return Err(Error::ErrRfc8285twoByteHeaderSize);
                }
            }
            ExtensionProfile::Rfc3550(_) => {
                if padded_len(payload.len()) / 4 > u16::MAX as usize {
                    return Err(Error::ErrRfc3550headerSize);
                }
            }
        }

        let current = self.extension_body();
        let (start, end) = match current {
            Some((cur, start, end)) if cur.same_mode(&profile) => (start, end),
            _ => {
                self.replace_extension(profile, &[(id, payload)]);
                return Ok(());
            }
        };

        if let ExtensionProfile::Rfc3550(_) = profile {
            let old = end - start;
            if old != padded_len(payload.len()) {
                return Err(Error::ErrExtensionLengthMismatch(old, payload.len()));
            }
            self.buf[start..end].fill(0);
            self.buf[start..start + payload.len()].copy_from_slice(payload);
            return Ok(());
        }

        let (elements, used) = parse_extension_elements(profile, &self.buf[start..end]);
        if let Some(e) = elements.iter().find(|e| e.id == id) {
            if e.len != payload.len() {
                return Err(Error::ErrExtensionLengthMismatch(e.len, payload.len()));
            }
            self.buf[start + e.data..start + e.data + e.len].copy_from_slice(payload);
            return Ok(());
        }

        let element = encode_element(profile, id, payload);
        let old_body = end - start;
        let new_body = padded_len(used + element.len()).max(old_body);
        if new_body > old_body {
            self.splice_header(end, 0, new_body - old_body);
        }
        let at = start + used;
        self.buf[at..at + element.len()].copy_from_slice(&element);
        self.buf[at + element.len()..start + new_body].fill(0);
        self.set_extension_words(new_body / 4);

        Ok(())
    }

    /// remove_extension drops extension `id`, removing the whole extension
    /// header when it was the last element.
    pub fn remove_extension(&mut self, id: u16) -> Result<()> {
        let (profile, start, end) = self
            .extension_body()
            .ok_or(Error::ErrHeaderExtensionNotFound)?;
        let body = &self.buf[start..end];
        let (elements, _) = parse_extension_elements(profile, body);
        if !elements.iter().any(|e| e.id == id) {
            return Err(Error::ErrHeaderExtensionNotFound);
        }

        let remaining: Vec<(u16, Vec<u8>)> = elements
            .iter()
            .filter(|e| e.id != id)
            .map(|e| (e.id, body[e.data..e.data + e.len].to_vec()))
            .collect();
        if remaining.is_empty() {
            self.clear_extension();
            return Ok(());
        }

        let refs: Vec<(u16, &[u8])> = remaining.iter().map(|(i, p)| (*i, &p[..])).collect();
        self.replace_extension(profile, &refs);
        Ok(())
    }

    /// clear_extension removes the header extension block and the X bit.
    pub fn clear_extension(&mut self) {
        if !self.extension() {
            return;
        }
        let off = self.extension_offset();
        self.splice_header(off, self.header_size - off, 0);
        self.buf[0] &= !(EXTENSION_MASK << EXTENSION_SHIFT);
    }

    fn replace_extension(&mut self, profile: ExtensionProfile, elements: &[(u16, &[u8])]) {
        let mut body = vec![];
        for (id, payload) in elements {
            match profile {
                ExtensionProfile::Rfc3550(_) => body.extend_from_slice(payload),
                _ => body.extend_from_slice(&encode_element(profile, *id, payload)),
            }
        }
        body.resize(padded_len(body.len()), 0);

        let off = self.extension_offset();
        let old_len = if self.extension() {
            self.header_size - off
        } else {
            0
        };
        self.splice_header(off, old_len, EXTENSION_HEADER_LENGTH + body.len());
        self.buf[off..off + 2].copy_from_slice(&profile.profile().to_be_bytes());
        let start = off + EXTENSION_HEADER_LENGTH;
        self.buf[start..start + body.len()].copy_from_slice(&body);
        self.set_extension_words(body.len() / 4);
        self.buf[0] |= EXTENSION_MASK << EXTENSION_SHIFT;
    }

    fn set_extension_words(&mut self, words: usize) {
        let off = self.extension_offset() + 2;
        self.buf[off..off + 2].copy_from_slice(&(words as u16).to_be_bytes());
    }

    fn get_u32_at(&self, off: usize) -> u32 {
        u32::from_be_bytes([
            self.buf[off],
            self.buf[off + 1],
            self.buf[off + 2],
            self.buf[off + 3],
        ])
    }

    fn put_u32_at(&mut self, off: usize, v: u32) {
        self.buf[off..off + 4].copy_from_slice(&v.to_be_bytes());
    }
}

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

fn encode_element(profile: ExtensionProfile, id: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    match profile {
        ExtensionProfile::OneByte => out.put_u8(((id as u8) << 4) | (payload.len() as u8 - 1)),
        ExtensionProfile::TwoByte => {
            out.put_u8(id as u8);
            out.put_u8(payload.len() as u8);
        }
        ExtensionProfile::Rfc3550(_) => {}
    }
    out.extend_from_slice(payload);
    out
}

impl MarshalSize for Packet {
    fn marshal_size(&self) -> usize {
        self.packet_size()
    }
}

impl Marshal for Packet {
    /// marshal_to copies the wire form of the packet into buf.
    fn marshal_to(&self, buf: &mut [u8]) -> std::result::Result<usize, util::Error> {
        let size = self.packet_size();
        if buf.len() < size {
            return Err(Error::ErrBufferTooSmall.into());
        }
        buf[..size].copy_from_slice(&self.buf[..size]);
        Ok(size)
    }
}

impl Unmarshal for Packet {
    /// Unmarshal consumes the whole remaining buffer as one RTP datagram.
    fn unmarshal<B>(raw_packet: &mut B) -> std::result::Result<Self, util::Error>
    where
        Self: Sized,
        B: Buf,
    {
        let raw = raw_packet.copy_to_bytes(raw_packet.remaining());
        Ok(Packet::decode(BytesMut::from(&raw[..]))?)
    }
}
