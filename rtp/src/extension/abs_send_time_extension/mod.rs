#[cfg(test)]
mod abs_send_time_extension_test;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::Error;

pub const ABS_SEND_TIME_EXTENSION_SIZE: usize = 3;

/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01.
const NTP_UNIX_OFFSET_SECS: u64 = 0x83AA7E80;
/// The 24 bit field counts 6.18 fixed point seconds, dropping the low 14 bits
/// of the 32.32 NTP time.
const ABS_SEND_TIME_SHIFT: u32 = 14;
const ABS_SEND_TIME_MASK: u64 = 0xFFFFFF;
/// One wrap of the field, expressed in 32.32 NTP units.
const ABS_SEND_TIME_WRAP: u64 = 1 << (24 + ABS_SEND_TIME_SHIFT);

/// AbsSendTimeExtension carries the sender's wall clock at transmit time, see
/// http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone)]
pub struct AbsSendTimeExtension {
    pub timestamp: u64,
}

impl Unmarshal for AbsSendTimeExtension {
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self, util::Error>
    where
        Self: Sized,
        B: Buf,
    {
        if raw_packet.remaining() < ABS_SEND_TIME_EXTENSION_SIZE {
            return Err(Error::ErrBufferTooSmall.into());
        }

        let mut b = [0u8; 4];
        raw_packet.copy_to_slice(&mut b[1..]);

        Ok(AbsSendTimeExtension {
            timestamp: u32::from_be_bytes(b) as u64,
        })
    }
}

impl MarshalSize for AbsSendTimeExtension {
    fn marshal_size(&self) -> usize {
        ABS_SEND_TIME_EXTENSION_SIZE
    }
}

impl Marshal for AbsSendTimeExtension {
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize, util::Error> {
        if buf.remaining_mut() < ABS_SEND_TIME_EXTENSION_SIZE {
            return Err(Error::ErrBufferTooSmall.into());
        }

        let v = (self.timestamp & ABS_SEND_TIME_MASK) as u32;
        buf.put_slice(&v.to_be_bytes()[1..]);

        Ok(ABS_SEND_TIME_EXTENSION_SIZE)
    }
}

impl AbsSendTimeExtension {
    /// new takes the 24 bits of `send_time` the extension can carry.
    pub fn new(send_time: SystemTime) -> Self {
        Self::from_ntp(unix2ntp(send_time))
    }

    pub fn from_ntp(ntp: u64) -> Self {
        AbsSendTimeExtension {
            timestamp: (ntp >> ABS_SEND_TIME_SHIFT) & ABS_SEND_TIME_MASK,
        }
    }

    /// extend rebuilds a full NTP time from the 24 bit field, taking the high
    /// bits from `reference` and stepping back one wrap if the result would lie
    /// after it. The field wraps every 64 seconds.
    pub fn extend(&self, reference: u64) -> u64 {
        let high = reference & !(ABS_SEND_TIME_WRAP - 1);
        let ntp = high | (self.timestamp & ABS_SEND_TIME_MASK) << ABS_SEND_TIME_SHIFT;
        if ntp > reference && ntp >= ABS_SEND_TIME_WRAP {
            ntp - ABS_SEND_TIME_WRAP
        } else {
            ntp
        }
    }

    /// estimate returns the send time assuming the packet arrived at `receive`
    /// less than 64 seconds after it was sent.
    pub fn estimate(&self, receive: SystemTime) -> SystemTime {
        ntp2unix(self.extend(unix2ntp(receive)))
    }
}

/// unix2ntp converts a wall clock time to 32.32 fixed point NTP time.
pub fn unix2ntp(st: SystemTime) -> u64 {
    let since_epoch = st.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = since_epoch.as_secs() + NTP_UNIX_OFFSET_SECS;
    let frac = ((since_epoch.subsec_nanos() as u64) << 32) / 1_000_000_000;

    secs << 32 | frac
}

/// ntp2unix converts 32.32 fixed point NTP time to wall clock time. Times
/// before the unix epoch clamp to it.
pub fn ntp2unix(ntp: u64) -> SystemTime {
    let secs = (ntp >> 32).saturating_sub(NTP_UNIX_OFFSET_SECS);
    let nanos = ((ntp & 0xFFFFFFFF) * 1_000_000_000) >> 32;

    UNIX_EPOCH
        .checked_add(Duration::new(secs, nanos as u32))
        .unwrap_or(UNIX_EPOCH)
}
