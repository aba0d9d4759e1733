#[cfg(test)]
mod application_defined_test;

use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;
use crate::header::*;
use crate::packet::*;
use crate::util::*;

type Result<T> = std::result::Result<T, util::Error>;

pub const APP_NAME_LENGTH: usize = 4;
const APP_DATA_OFFSET: usize = HEADER_LENGTH + SSRC_LENGTH + APP_NAME_LENGTH;

/// ApplicationDefined (APP) carries data whose meaning is agreed between
/// applications out of band, RFC 3550 6.7. The subtype travels in the count field.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct ApplicationDefined {
    pub sub_type: u8,
    pub ssrc: u32,
    pub name: [u8; APP_NAME_LENGTH],
    pub data: Bytes,
}

impl ApplicationDefined {
    pub fn new(sub_type: u8, ssrc: u32, name: &str, data: Bytes) -> std::result::Result<Self, Error> {
        if sub_type as usize > COUNT_MAX {
            return Err(Error::InvalidSubtype);
        }
        let name: [u8; APP_NAME_LENGTH] = name
            .as_bytes()
            .try_into()
            .map_err(|_| Error::AppNameLength)?;

        Ok(ApplicationDefined {
            sub_type,
            ssrc,
            name,
            data,
        })
    }

    /// name as text, with non ASCII octets replaced.
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

impl fmt::Display for ApplicationDefined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ApplicationDefined {} from {:x} subtype {} ({} bytes)",
            self.name_str(),
            self.ssrc,
            self.sub_type,
            self.data.len()
        )
    }
}

impl Packet for ApplicationDefined {
    fn header(&self) -> Header {
        Header {
            padding: get_padding_size(self.raw_size()) != 0,
            count: self.sub_type,
            packet_type: PacketType::ApplicationDefined,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.ssrc]
    }

    fn raw_size(&self) -> usize {
        APP_DATA_OFFSET + self.data.len()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &(dyn Packet + Send + Sync)) -> bool {
        other
            .as_any()
            .downcast_ref::<ApplicationDefined>()
            .map_or(false, |a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet + Send + Sync> {
        Box::new(self.clone())
    }
}

impl MarshalSize for ApplicationDefined {
    fn marshal_size(&self) -> usize {
        let l = self.raw_size();
        l + get_padding_size(l)
    }
}

impl Marshal for ApplicationDefined {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P| subtype |   PT=APP=204  |             length            |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                           SSRC/CSRC                           |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                          name (ASCII)                         |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                   application-dependent data                ...
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        if self.sub_type as usize > COUNT_MAX {
            return Err(Error::InvalidSubtype.into());
        }
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort.into());
        }

        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put_u32(self.ssrc);
        buf.put_slice(&self.name);
        buf.put(self.data.clone());

        if h.padding {
            put_padding(buf, self.raw_size());
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for ApplicationDefined {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < APP_DATA_OFFSET {
            return Err(Error::PacketTooShort.into());
        }

        let h = Header::unmarshal(raw_packet)?;
        if h.packet_type != PacketType::ApplicationDefined {
            return Err(Error::WrongType.into());
        }

        let ssrc = raw_packet.get_u32();
        let mut name = [0u8; APP_NAME_LENGTH];
        raw_packet.copy_to_slice(&mut name);

        let mut data = raw_packet.copy_to_bytes(raw_packet.remaining());
        if h.padding && !data.is_empty() {
            // the last octet counts the padding, itself included
            let pad = data[data.len() - 1] as usize;
            if pad == 0 || pad > data.len() {
                return Err(Error::WrongPadding.into());
            }
            data.truncate(data.len() - pad);
        }

        Ok(ApplicationDefined {
            sub_type: h.count,
            ssrc,
            name,
            data,
        })
    }
}
