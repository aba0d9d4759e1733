use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;

/// PacketType is the second octet of every RTCP sub-packet.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// any type byte this crate has no codec for
    #[default]
    Unsupported = 0,
    SenderReport = 200,
    ReceiverReport = 201,
    SourceDescription = 202,
    Goodbye = 203,
    ApplicationDefined = 204,
    /// RTPFB, RFC 4585
    TransportSpecificFeedback = 205,
    /// PSFB, RFC 4585
    PayloadSpecificFeedback = 206,
    /// RFC 3611
    ExtendedReport = 207,
}

impl PacketType {
    /// name is the short form used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            PacketType::Unsupported => "Unsupported",
            PacketType::SenderReport => "SR",
            PacketType::ReceiverReport => "RR",
            PacketType::SourceDescription => "SDES",
            PacketType::Goodbye => "BYE",
            PacketType::ApplicationDefined => "APP",
            PacketType::TransportSpecificFeedback => "TSFB",
            PacketType::PayloadSpecificFeedback => "PSFB",
            PacketType::ExtendedReport => "XR",
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl From<u8> for PacketType {
    fn from(b: u8) -> Self {
        const KNOWN: [PacketType; 8] = [
            PacketType::SenderReport,
            PacketType::ReceiverReport,
            PacketType::SourceDescription,
            PacketType::Goodbye,
            PacketType::ApplicationDefined,
            PacketType::TransportSpecificFeedback,
            PacketType::PayloadSpecificFeedback,
            PacketType::ExtendedReport,
        ];
        KNOWN
            .iter()
            .copied()
            .find(|t| *t as u8 == b)
            .unwrap_or(PacketType::Unsupported)
    }
}

// Feedback messages reuse the count bits as the message type (FMT).

/// RTPFB: generic NACK, RFC 4585 6.2.1
pub const FORMAT_TLN: u8 = 1;
/// RTPFB: TMMBR, RFC 5104 4.2.1
pub const FORMAT_TMMBR: u8 = 3;
/// RTPFB: TMMBN, RFC 5104 4.2.2
pub const FORMAT_TMMBN: u8 = 4;
/// RTPFB: transport-wide congestion control (draft-holmer-rmcat-transport-wide-cc-extensions)
pub const FORMAT_TCC: u8 = 15;

/// PSFB: PLI, RFC 4585 6.3.1
pub const FORMAT_PLI: u8 = 1;
/// PSFB: FIR, RFC 5104 4.3.1
pub const FORMAT_FIR: u8 = 4;
/// PSFB: TSTR, RFC 5104 4.3.2
pub const FORMAT_TSTR: u8 = 5;
/// PSFB: TSTN, RFC 5104 4.3.3
pub const FORMAT_TSTN: u8 = 6;
/// PSFB: application layer feedback, carrying REMB
pub const FORMAT_REMB: u8 = 15;

/// Type bytes that demultiplex as RTCP next to RTP, RFC 5761 4.
pub const PACKET_TYPE_MIN: u8 = 192;
pub const PACKET_TYPE_MAX: u8 = 223;

pub const RTP_VERSION: u8 = 2;
pub const VERSION_SHIFT: u8 = 6;
pub const VERSION_MASK: u8 = 0x3;
pub const PADDING_SHIFT: u8 = 5;
pub const PADDING_MASK: u8 = 0x1;
pub const COUNT_SHIFT: u8 = 0;
pub const COUNT_MASK: u8 = 0x1f;

pub const HEADER_LENGTH: usize = 4;
pub const COUNT_MAX: usize = COUNT_MASK as usize;
pub const SSRC_LENGTH: usize = 4;
pub const SDES_MAX_OCTET_COUNT: usize = u8::MAX as usize;

/// Header is the four octets opening every RTCP sub-packet:
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|  count  |      PT       |             length            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Header {
    /// trailing padding octets are counted in `length`
    pub padding: bool,
    /// report count, source count or FMT, depending on `packet_type`
    pub count: u8,
    pub packet_type: PacketType,
    /// size in 32-bit words minus one, header and padding included
    pub length: u16,
}

impl Header {
    /// is_valid_packet_type reports whether the raw type byte lies in the RTCP range.
    pub fn is_valid_packet_type(b: u8) -> bool {
        (PACKET_TYPE_MIN..=PACKET_TYPE_MAX).contains(&b)
    }

    /// length in bytes of the whole sub-packet described by this header.
    pub fn packet_len(&self) -> usize {
        (self.length as usize + 1) * 4
    }

    fn first_octet(&self) -> u8 {
        (RTP_VERSION << VERSION_SHIFT)
            | ((self.padding as u8) << PADDING_SHIFT)
            | (self.count << COUNT_SHIFT)
    }
}

impl MarshalSize for Header {
    fn marshal_size(&self) -> usize {
        HEADER_LENGTH
    }
}

impl Marshal for Header {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize, util::Error> {
        if self.count > COUNT_MASK {
            return Err(Error::InvalidHeader.into());
        }
        if buf.remaining_mut() < HEADER_LENGTH {
            return Err(Error::BufferTooShort.into());
        }

        buf.put_u8(self.first_octet());
        buf.put_u8(self.packet_type as u8);
        buf.put_u16(self.length);
        Ok(HEADER_LENGTH)
    }
}

impl Unmarshal for Header {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self, util::Error>
    where
        Self: Sized,
        B: Buf,
    {
        if raw_packet.remaining() < HEADER_LENGTH {
            return Err(Error::PacketTooShort.into());
        }

        let first = raw_packet.get_u8();
        if (first >> VERSION_SHIFT) & VERSION_MASK != RTP_VERSION {
            return Err(Error::BadVersion.into());
        }
        Ok(Header {
            padding: (first >> PADDING_SHIFT) & PADDING_MASK == 1,
            count: (first >> COUNT_SHIFT) & COUNT_MASK,
            packet_type: raw_packet.get_u8().into(),
            length: raw_packet.get_u16(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_header_unmarshal() {
        let tests = vec![
            (
                "receiver report with one block",
                vec![0x81u8, 201, 0x00, 0x07],
                Ok(Header {
                    padding: false,
                    count: 1,
                    packet_type: PacketType::ReceiverReport,
                    length: 7,
                }),
            ),
            (
                "padded bye",
                vec![0xa2, 203, 0x00, 0x03],
                Ok(Header {
                    padding: true,
                    count: 2,
                    packet_type: PacketType::Goodbye,
                    length: 3,
                }),
            ),
            ("version one", vec![0x41, 201, 0x00, 0x01], Err(Error::BadVersion)),
            ("three octets", vec![0x81, 201, 0x00], Err(Error::PacketTooShort)),
        ];

        for (name, data, want) in tests {
            let got = Header::unmarshal(&mut Bytes::from(data));
            match want {
                Ok(want) => assert_eq!(got.ok(), Some(want), "{name}"),
                Err(want) => {
                    let err = got.expect_err(name);
                    assert_eq!(want, err, "{name}");
                }
            }
        }
    }

    #[test]
    fn test_header_packet_type_range() {
        let tests = vec![(191u8, false), (192, true), (200, true), (223, true), (224, false)];
        for (b, want) in tests {
            assert_eq!(Header::is_valid_packet_type(b), want, "type {b}");
        }

        let mut raw = Bytes::from_static(&[0x80, 0xd0, 0x00, 0x01]);
        let h = Header::unmarshal(&mut raw).expect("unmarshal");
        assert_eq!(h.packet_type, PacketType::Unsupported);
        assert_eq!(h.packet_len(), 8);
        assert_eq!(PacketType::from(207).to_string(), "XR");
    }

    #[test]
    fn test_header_marshal() {
        let h = Header {
            padding: true,
            count: 31,
            packet_type: PacketType::SenderReport,
            length: 4,
        };
        let raw = h.marshal().expect("marshal");
        assert_eq!(&raw[..], &[0xbf, 200, 0x00, 0x04]);

        let too_many = Header {
            count: 32,
            ..Default::default()
        };
        assert_eq!(Error::InvalidHeader, too_many.marshal().expect_err("count 32"));
    }
}
