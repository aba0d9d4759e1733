use std::time::Duration;

use bytes::{Bytes, BytesMut};
use chrono::NaiveDate;

use super::*;
use crate::error::Result;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, nano: u32) -> SystemTime {
    let nanos = NaiveDate::from_ymd_opt(y, mo, d)
        .and_then(|date| date.and_hms_nano_opt(h, mi, s, nano))
        .map(|t| t.timestamp_nanos())
        .unwrap_or_default();
    UNIX_EPOCH + Duration::from_nanos(nanos as u64)
}

#[test]
fn test_ntp_conversion() {
    let tests = vec![
        (utc(1985, 6, 23, 9, 0, 0, 0), 0xa0c65b1000000000u64),
        (utc(2000, 1, 1, 4, 59, 59, 500000), 0xbc18084f0020c49b),
        (utc(2019, 3, 27, 18, 39, 30, 8675309), 0xe04641e202388b88),
    ];

    for (t, n) in &tests {
        assert_eq!(unix2ntp(*t), *n, "unix2ntp {t:?}");
    }

    for (t, n) in &tests {
        let back = ntp2unix(*n);
        let diff = match back.duration_since(*t) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        assert!(
            diff < Duration::from_nanos(2),
            "ntp2unix differs: want {t:?}, got {back:?}"
        );
    }
}

#[test]
fn test_abs_send_time_marshal() -> Result<()> {
    let raw = Bytes::from_static(&[0x12, 0x34, 0x56]);
    let ext = AbsSendTimeExtension::unmarshal(&mut raw.clone())?;
    assert_eq!(ext.timestamp, 0x123456);

    let mut dst = BytesMut::new();
    dst.resize(ext.marshal_size(), 0);
    ext.marshal_to(&mut dst)?;
    assert_eq!(dst.freeze(), raw);

    let mut short = &[0x12u8, 0x34][..];
    assert!(AbsSendTimeExtension::unmarshal(&mut short).is_err());

    Ok(())
}

#[test]
fn test_abs_send_time_estimate() {
    let tests = vec![
        (utc(2022, 5, 1, 12, 0, 0, 0), utc(2022, 5, 1, 12, 0, 0, 30_000_000)),
        // seven seconds in flight
        (utc(2022, 5, 1, 12, 0, 3, 0), utc(2022, 5, 1, 12, 0, 10, 0)),
    ];

    for (send, receive) in tests {
        let ext = AbsSendTimeExtension::new(send);
        let estimated = ext.estimate(receive);
        let diff = match estimated.duration_since(send) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        assert!(
            diff < Duration::from_micros(4),
            "estimate {estimated:?} too far from {send:?}"
        );
    }
}

#[test]
fn test_abs_send_time_extend_across_wrap() {
    let wrap = 1u64 << 38;
    let reference = 5 * wrap + 100;
    let ext = AbsSendTimeExtension {
        timestamp: ABS_SEND_TIME_MASK,
    };
    assert_eq!(ext.extend(reference), 5 * wrap - (1 << 14));

    let ext = AbsSendTimeExtension { timestamp: 0 };
    assert_eq!(ext.extend(reference), 5 * wrap);
}
