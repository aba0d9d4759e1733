use bytes::Bytes;

use super::*;

#[test]
fn test_tmmbr_decode() {
    let mut data = Bytes::from_static(&[
        0x83, 0xcd, 0x00, 0x04, // v=2, FMT=3, RTPFB, len=4
        0x00, 0x00, 0x00, 0x01, // sender=1
        0x00, 0x00, 0x00, 0x00, // media=0
        0x00, 0x00, 0x00, 0x09, // ssrc=9
        0x08, 0x03, 0xe8, 0x28, // exp=2, mantissa=500, overhead=40
    ]);

    let got = TemporaryMaxBitrateRequest::unmarshal(&mut data).expect("unmarshal");
    assert_eq!(
        got,
        TemporaryMaxBitrateRequest {
            sender_ssrc: 1,
            entries: vec![TmmbEntry {
                ssrc: 9,
                bitrate: 2000,
                overhead: 40,
            }],
        }
    );
}

#[test]
fn test_tmmb_bitrate_encoding() {
    let tests = vec![
        // (bitrate in, bitrate after round trip)
        (0, 0),
        (131_071, 131_071),
        (131_072, 131_072),
        (1_000_000, 1_000_000),
        (1_000_001, 1_000_000),
        (2_500_000_000, 2_499_969_024),
    ];

    for (bitrate, want) in tests {
        let req = TemporaryMaxBitrateRequest {
            sender_ssrc: 5,
            entries: vec![TmmbEntry {
                ssrc: 6,
                bitrate,
                overhead: 511,
            }],
        };
        let data = req.marshal().expect("marshal");
        let got = TemporaryMaxBitrateRequest::unmarshal(&mut data.clone()).expect("unmarshal");
        assert_eq!(got.entries[0].bitrate, want, "bitrate {bitrate}");
        assert_eq!(got.entries[0].overhead, 511);
    }
}

#[test]
fn test_tmmbn_is_not_tmmbr() {
    let tmmbn = TemporaryMaxBitrateNotification {
        sender_ssrc: 1,
        entries: vec![],
    };
    let data = tmmbn.marshal().expect("marshal");
    assert_eq!(data[0] & 0x1f, FORMAT_TMMBN);

    let err = TemporaryMaxBitrateRequest::unmarshal(&mut data.clone()).expect_err("wrong fmt");
    assert_eq!(Error::WrongType, err);
    assert_eq!(
        TemporaryMaxBitrateNotification::unmarshal(&mut data.clone()).expect("unmarshal"),
        tmmbn
    );
}

#[test]
fn test_tmmb_overhead_limit() {
    let req = TemporaryMaxBitrateRequest {
        sender_ssrc: 1,
        entries: vec![TmmbEntry {
            ssrc: 2,
            bitrate: 64_000,
            overhead: 512,
        }],
    };
    assert_eq!(Error::InvalidOverhead, req.marshal().expect_err("overhead"));
}
