use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::*;

pub(crate) const RECEPTION_REPORT_LENGTH: usize = 24;
pub(crate) const TOTAL_LOST_OFFSET: usize = 5;
pub(crate) const LAST_SEQ_OFFSET: usize = 8;

pub const TOTAL_LOST_MAX: i32 = (1 << 23) - 1;
pub const TOTAL_LOST_MIN: i32 = -(1 << 23);

/// ReceptionReport is one report block of an SR or RR: what we heard from
/// `ssrc` since the previous report.
///
/// ```text
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                              SSRC                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | fraction lost |       cumulative number of packets lost       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           extended highest sequence number received           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                      interarrival jitter                      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         last SR (LSR)                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                   delay since last SR (DLSR)                  |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// ```
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct ReceptionReport {
    pub ssrc: u32,
    /// losses since the previous report, in 1/256
    pub fraction_lost: u8,
    /// expected minus received since the start; signed 24 bits on the wire,
    /// clamped when encoding
    pub total_lost: i32,
    /// cycles in the high 16 bits, highest sequence number in the low 16
    pub last_sequence_number: u32,
    /// in timestamp units
    pub jitter: u32,
    /// middle 32 bits of the NTP time of the last SR from `ssrc`, zero if none
    pub last_sender_report: u32,
    /// since that SR arrived, in 1/65536 seconds
    pub delay: u32,
}

impl fmt::Display for ReceptionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x}\t{}/{}\t{}",
            self.ssrc, self.fraction_lost, self.total_lost, self.last_sequence_number
        )
    }
}

impl Packet for ReceptionReport {
    fn header(&self) -> Header {
        Header::default()
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![]
    }

    fn raw_size(&self) -> usize {
        RECEPTION_REPORT_LENGTH
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<ReceptionReport>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for ReceptionReport {
    fn marshal_size(&self) -> usize {
        RECEPTION_REPORT_LENGTH
    }
}

impl Marshal for ReceptionReport {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize, util::Error> {
        if buf.remaining_mut() < RECEPTION_REPORT_LENGTH {
            return Err(Error::BufferTooShort.into());
        }

        let total_lost = self.total_lost.clamp(TOTAL_LOST_MIN, TOTAL_LOST_MAX) as u32;
        buf.put_u32(self.ssrc);
        buf.put_u32(u32::from(self.fraction_lost) << 24 | (total_lost & 0x00ff_ffff));
        buf.put_u32(self.last_sequence_number);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sender_report);
        buf.put_u32(self.delay);
        Ok(RECEPTION_REPORT_LENGTH)
    }
}

impl Unmarshal for ReceptionReport {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self, util::Error>
    where
        Self: Sized,
        B: Buf,
    {
        if raw_packet.remaining() < RECEPTION_REPORT_LENGTH {
            return Err(Error::PacketTooShort.into());
        }

        let ssrc = raw_packet.get_u32();
        let loss = raw_packet.get_u32();
        Ok(ReceptionReport {
            ssrc,
            fraction_lost: (loss >> 24) as u8,
            // shift the 24 bit field up and back to sign extend it
            total_lost: ((loss << 8) as i32) >> 8,
            last_sequence_number: raw_packet.get_u32(),
            jitter: raw_packet.get_u32(),
            last_sender_report: raw_packet.get_u32(),
            delay: raw_packet.get_u32(),
        })
    }
}

/// put_report_blocks writes the report blocks of an SR or RR and returns the
/// rest of `buf`.
pub(crate) fn put_report_blocks<'a>(
    reports: &[ReceptionReport],
    mut buf: &'a mut [u8],
) -> Result<&'a mut [u8], util::Error> {
    for report in reports {
        let n = report.marshal_to(buf)?;
        buf = &mut buf[n..];
    }
    Ok(buf)
}

/// get_report_blocks reads the `count` report blocks announced by an SR or
/// RR header.
pub(crate) fn get_report_blocks<B: Buf>(
    count: u8,
    raw_packet: &mut B,
) -> Result<Vec<ReceptionReport>, util::Error> {
    (0..count)
        .map(|_| ReceptionReport::unmarshal(raw_packet))
        .collect()
}

/// fmt_report_blocks is the table both report types print.
pub(crate) fn fmt_report_blocks(f: &mut fmt::Formatter<'_>, reports: &[ReceptionReport]) -> fmt::Result {
    writeln!(f, "\tSSRC    \tLost\tLastSequence")?;
    for report in reports {
        writeln!(f, "\t{report}")?;
    }
    Ok(())
}
