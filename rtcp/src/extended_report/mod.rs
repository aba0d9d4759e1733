#[cfg(test)]
mod extended_report_test;

pub mod dlrr;
pub mod rrt;
pub mod unknown;

use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
pub use dlrr::{DlrrReport, DlrrReportBlock};
pub use rrt::ReceiverReferenceTimeReportBlock;
pub use unknown::UnknownReportBlock;
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error;
use crate::header::{Header, PacketType, HEADER_LENGTH, SSRC_LENGTH};
use crate::packet::Packet;
use crate::util::{get_padding_size, put_padding};

type Result<T> = std::result::Result<T, util::Error>;

const XR_HEADER_LENGTH: usize = 4;

/// BlockType specifies the type of report in a report block.
/// Extended Report block types from RFC 3611.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockType {
    #[default]
    Unknown,
    ReceiverReferenceTime, // RFC 3611, section 4.4
    Dlrr,                  // RFC 3611, section 4.5
}

pub const BLOCK_TYPE_RRTR: u8 = 4;
pub const BLOCK_TYPE_DLRR: u8 = 5;

impl From<u8> for BlockType {
    fn from(v: u8) -> Self {
        match v {
            BLOCK_TYPE_RRTR => BlockType::ReceiverReferenceTime,
            BLOCK_TYPE_DLRR => BlockType::Dlrr,
            _ => BlockType::Unknown,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            BlockType::ReceiverReferenceTime => "RRTR",
            BlockType::Dlrr => "DLRR",
            BlockType::Unknown => "Unknown",
        };
        write!(f, "{s}")
    }
}

/// XRHeader is the common start of every report block. `block_length` counts
/// the 32-bit words following the header.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct XRHeader {
    pub block_type: u8,
    pub type_specific: u8,
    pub block_length: u16,
}

impl MarshalSize for XRHeader {
    fn marshal_size(&self) -> usize {
        XR_HEADER_LENGTH
    }
}

impl Marshal for XRHeader {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |      BT       | type-specific |         block length          |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        if buf.remaining_mut() < XR_HEADER_LENGTH {
            return Err(error::Error::BufferTooShort.into());
        }

        buf.put_u8(self.block_type);
        buf.put_u8(self.type_specific);
        buf.put_u16(self.block_length);

        Ok(XR_HEADER_LENGTH)
    }
}

impl Unmarshal for XRHeader {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if raw_packet.remaining() < XR_HEADER_LENGTH {
            return Err(error::Error::PacketTooShort.into());
        }

        Ok(XRHeader {
            block_type: raw_packet.get_u8(),
            type_specific: raw_packet.get_u8(),
            block_length: raw_packet.get_u16(),
        })
    }
}

/// ReportBlock is one block of an ExtendedReport.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ReportBlock {
    ReceiverReferenceTime(ReceiverReferenceTimeReportBlock),
    Dlrr(DlrrReportBlock),
    Unknown(UnknownReportBlock),
}

impl ReportBlock {
    pub fn block_type(&self) -> BlockType {
        match self {
            ReportBlock::ReceiverReferenceTime(_) => BlockType::ReceiverReferenceTime,
            ReportBlock::Dlrr(_) => BlockType::Dlrr,
            ReportBlock::Unknown(_) => BlockType::Unknown,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        match self {
            ReportBlock::Dlrr(b) => b.reports.iter().map(|r| r.ssrc).collect(),
            _ => vec![],
        }
    }
}

impl fmt::Display for ReportBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportBlock::ReceiverReferenceTime(b) => write!(f, "RRTR ntp={:x}", b.ntp_timestamp),
            ReportBlock::Dlrr(b) => write!(f, "DLRR {} entries", b.reports.len()),
            ReportBlock::Unknown(b) => write!(f, "block type {} ({} bytes)", b.block_type, b.bytes.len()),
        }
    }
}

impl MarshalSize for ReportBlock {
    fn marshal_size(&self) -> usize {
        match self {
            ReportBlock::ReceiverReferenceTime(b) => b.marshal_size(),
            ReportBlock::Dlrr(b) => b.marshal_size(),
            ReportBlock::Unknown(b) => b.marshal_size(),
        }
    }
}

impl Marshal for ReportBlock {
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        match self {
            ReportBlock::ReceiverReferenceTime(b) => b.marshal_to(buf),
            ReportBlock::Dlrr(b) => b.marshal_to(buf),
            ReportBlock::Unknown(b) => b.marshal_to(buf),
        }
    }
}

impl Unmarshal for ReportBlock {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if raw_packet.remaining() < XR_HEADER_LENGTH {
            return Err(error::Error::PacketTooShort.into());
        }

        let block = match BlockType::from(raw_packet.chunk()[0]) {
            BlockType::ReceiverReferenceTime => {
                ReportBlock::ReceiverReferenceTime(ReceiverReferenceTimeReportBlock::unmarshal(raw_packet)?)
            }
            BlockType::Dlrr => ReportBlock::Dlrr(DlrrReportBlock::unmarshal(raw_packet)?),
            BlockType::Unknown => ReportBlock::Unknown(UnknownReportBlock::unmarshal(raw_packet)?),
        };
        Ok(block)
    }
}

/// The ExtendedReport packet is an Implementation of RTCP Extended
/// reports defined in RFC 3611. Each packet contains one or
/// more report blocks, each of which conveys a different kind of
/// information.
///
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|reserved |   PT=XR=207   |             length            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                              ssrc                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// :                         report blocks                         :
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct ExtendedReport {
    pub sender_ssrc: u32,
    pub reports: Vec<ReportBlock>,
}

impl ExtendedReport {
    /// receiver_reference_time returns the NTP time of the first RRTR block.
    pub fn receiver_reference_time(&self) -> Option<u64> {
        self.reports.iter().find_map(|b| match b {
            ReportBlock::ReceiverReferenceTime(rrt) => Some(rrt.ntp_timestamp),
            _ => None,
        })
    }

    /// dlrr_reports iterates the sub-blocks of every DLRR block.
    pub fn dlrr_reports(&self) -> impl Iterator<Item = &DlrrReport> {
        self.reports
            .iter()
            .filter_map(|b| match b {
                ReportBlock::Dlrr(d) => Some(d.reports.iter()),
                _ => None,
            })
            .flatten()
    }
}

impl fmt::Display for ExtendedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ExtendedReport from {:x}", self.sender_ssrc)?;
        for block in &self.reports {
            writeln!(f, "\t{block}")?;
        }
        Ok(())
    }
}

impl Packet for ExtendedReport {
    fn header(&self) -> Header {
        Header {
            padding: get_padding_size(self.raw_size()) != 0,
            count: 0,
            packet_type: PacketType::ExtendedReport,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    /// destination_ssrc returns the sources named by DLRR sub-blocks.
    fn destination_ssrc(&self) -> Vec<u32> {
        self.reports
            .iter()
            .flat_map(|b| b.destination_ssrc())
            .collect()
    }

    fn raw_size(&self) -> usize {
        let reps_length: usize = self.reports.iter().map(|r| r.marshal_size()).sum();
        HEADER_LENGTH + SSRC_LENGTH + reps_length
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<ExtendedReport>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for ExtendedReport {
    fn marshal_size(&self) -> usize {
        let l = self.raw_size();
        l + get_padding_size(l)
    }
}

impl Marshal for ExtendedReport {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if buf.remaining_mut() < self.marshal_size() {
            return Err(error::Error::BufferTooShort.into());
        }

        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put_u32(self.sender_ssrc);

        for report in &self.reports {
            let n = report.marshal_to(buf)?;
            buf = &mut buf[n..];
        }

        if h.padding {
            put_padding(buf, self.raw_size());
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for ExtendedReport {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < (HEADER_LENGTH + SSRC_LENGTH) {
            return Err(error::Error::PacketTooShort.into());
        }

        let header = Header::unmarshal(raw_packet)?;
        if header.packet_type != PacketType::ExtendedReport {
            return Err(error::Error::WrongType.into());
        }

        let sender_ssrc = raw_packet.get_u32();

        let mut reports = vec![];
        while raw_packet.has_remaining() {
            reports.push(ReportBlock::unmarshal(raw_packet)?);
        }

        Ok(ExtendedReport {
            sender_ssrc,
            reports,
        })
    }
}
