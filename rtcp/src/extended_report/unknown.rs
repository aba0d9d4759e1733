use super::*;

/// UnknownReportBlock keeps a block of an unsupported type as opaque bytes,
/// so it survives a decode and re-encode unchanged.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct UnknownReportBlock {
    pub block_type: u8,
    pub type_specific: u8,
    pub bytes: Bytes,
}

impl MarshalSize for UnknownReportBlock {
    fn marshal_size(&self) -> usize {
        let l = XR_HEADER_LENGTH + self.bytes.len();
        l + get_padding_size(l)
    }
}

impl Marshal for UnknownReportBlock {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < self.marshal_size() {
            return Err(error::Error::BufferTooShort.into());
        }

        let h = XRHeader {
            block_type: self.block_type,
            type_specific: self.type_specific,
            block_length: ((self.marshal_size() - XR_HEADER_LENGTH) / 4) as u16,
        };
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put(self.bytes.clone());
        for _ in 0..get_padding_size(self.bytes.len()) {
            buf.put_u8(0);
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for UnknownReportBlock {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let xr_header = XRHeader::unmarshal(raw_packet)?;
        let block_length = xr_header.block_length as usize * 4;
        if raw_packet.remaining() < block_length {
            return Err(error::Error::PacketTooShort.into());
        }

        Ok(UnknownReportBlock {
            block_type: xr_header.block_type,
            type_specific: xr_header.type_specific,
            bytes: raw_packet.copy_to_bytes(block_length),
        })
    }
}
