use super::*;

const DLRR_REPORT_LENGTH: usize = 12;

/// DlrrReport is one entry of a DLRR block: the sender's answer to the RRTR
/// last heard from `ssrc`. Both times are in 1/65536 seconds, middle 32 bits of NTP.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct DlrrReport {
    pub ssrc: u32,
    pub last_rr: u32,
    pub dlrr: u32,
}

/// DlrrReportBlock encodes a Delay Since Last Receiver Report block,
/// RFC 3611 section 4.5.
///
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     BT=5      |   reserved    |         block length          |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                 SSRC_1 (SSRC of first receiver)               | sub-
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+ block
/// |                         last RR (LRR)                         |   1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                   delay since last RR (DLRR)                  |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// :                               ...                             :   2
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct DlrrReportBlock {
    pub reports: Vec<DlrrReport>,
}

impl MarshalSize for DlrrReportBlock {
    fn marshal_size(&self) -> usize {
        XR_HEADER_LENGTH + self.reports.len() * DLRR_REPORT_LENGTH
    }
}

impl Marshal for DlrrReportBlock {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < self.marshal_size() {
            return Err(error::Error::BufferTooShort.into());
        }

        let h = XRHeader {
            block_type: BLOCK_TYPE_DLRR,
            type_specific: 0,
            block_length: (self.reports.len() * DLRR_REPORT_LENGTH / 4) as u16,
        };
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        for rep in &self.reports {
            buf.put_u32(rep.ssrc);
            buf.put_u32(rep.last_rr);
            buf.put_u32(rep.dlrr);
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for DlrrReportBlock {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let xr_header = XRHeader::unmarshal(raw_packet)?;
        let block_length = xr_header.block_length as usize * 4;
        if block_length % DLRR_REPORT_LENGTH != 0 || raw_packet.remaining() < block_length {
            return Err(error::Error::PacketTooShort.into());
        }

        let mut reports = Vec::with_capacity(block_length / DLRR_REPORT_LENGTH);
        for _ in 0..block_length / DLRR_REPORT_LENGTH {
            reports.push(DlrrReport {
                ssrc: raw_packet.get_u32(),
                last_rr: raw_packet.get_u32(),
                dlrr: raw_packet.get_u32(),
            });
        }

        Ok(DlrrReportBlock { reports })
    }
}
