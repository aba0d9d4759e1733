use bytes::Bytes;

use super::*;

fn report_block() -> ReceptionReport {
    ReceptionReport {
        ssrc: 0xbc5e9a40,
        fraction_lost: 0,
        total_lost: 0,
        last_sequence_number: 0x46e1,
        jitter: 273,
        last_sender_report: 0x9f36432,
        delay: 150137,
    }
}

#[test]
fn test_sender_report_unmarshal() {
    let valid = [
        0x81u8, 0xc8, 0x0, 0xc, // v=2, p=0, count=1, SR, len=12
        0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
        0xda, 0x8b, 0xd1, 0xfc, 0xdd, 0xdd, 0xa0, 0x5a, // ntp=0xda8bd1fcdddda05a
        0xaa, 0xf4, 0xed, 0xd5, // rtp=0xaaf4edd5
        0x00, 0x00, 0x00, 0x01, // packetCount=1
        0x00, 0x00, 0x00, 0x02, // octetCount=2
        0xbc, 0x5e, 0x9a, 0x40, // ssrc=0xbc5e9a40
        0x0, 0x0, 0x0, 0x0, // fracLost=0, totalLost=0
        0x0, 0x0, 0x46, 0xe1, // lastSeq=0x46e1
        0x0, 0x0, 0x1, 0x11, // jitter=273
        0x9, 0xf3, 0x64, 0x32, // lsr=0x9f36432
        0x0, 0x2, 0x4a, 0x79, // delay=150137
    ];
    let mut wrong_type = valid;
    wrong_type[1] = 0xc9;
    let mut bad_count = valid;
    bad_count[0] = 0x82;

    let tests = vec![
        ("nil", Bytes::new(), None, Some(Error::PacketTooShort)),
        (
            "valid",
            Bytes::copy_from_slice(&valid),
            Some(SenderReport {
                ssrc: 0x902f9e2e,
                ntp_time: 0xda8bd1fcdddda05a,
                rtp_time: 0xaaf4edd5,
                packet_count: 1,
                octet_count: 2,
                reports: vec![report_block()],
                profile_extensions: Bytes::new(),
            }),
            None,
        ),
        (
            "wrong type",
            Bytes::copy_from_slice(&wrong_type),
            None,
            Some(Error::WrongType),
        ),
        (
            "bad count in header",
            Bytes::copy_from_slice(&bad_count),
            None,
            Some(Error::PacketTooShort),
        ),
    ];

    for (name, data, want, want_error) in tests {
        let result = SenderReport::unmarshal(&mut data.clone());
        match want_error {
            Some(err) => {
                let got = result.expect_err("want error");
                assert_eq!(err, got, "Unmarshal {name}: err = {got:?}, want {err:?}");
            }
            None => {
                let got = result.expect("unmarshal");
                assert_eq!(Some(got), want, "Unmarshal {name}");
            }
        }
    }
}

#[test]
fn test_sender_report_roundtrip() {
    let tests = vec![
        (
            "valid",
            SenderReport {
                ssrc: 1,
                ntp_time: 999,
                rtp_time: 555,
                packet_count: 32,
                octet_count: 11,
                reports: vec![
                    report_block(),
                    ReceptionReport {
                        ssrc: 2,
                        total_lost: -3,
                        ..Default::default()
                    },
                ],
                profile_extensions: Bytes::new(),
            },
            None,
        ),
        (
            "also valid",
            SenderReport {
                ssrc: 2,
                reports: vec![report_block()],
                profile_extensions: Bytes::from_static(&[1, 2, 3, 4]),
                ..Default::default()
            },
            None,
        ),
        (
            "extension",
            SenderReport {
                ssrc: 1,
                profile_extensions: Bytes::from_static(&[1, 2, 3, 4]),
                ..Default::default()
            },
            None,
        ),
        (
            "count overflow",
            SenderReport {
                ssrc: 1,
                reports: vec![report_block(); COUNT_MAX + 1],
                ..Default::default()
            },
            Some(Error::TooManyReports),
        ),
    ];

    for (name, want, want_error) in tests {
        let got = want.marshal();
        match want_error {
            Some(err) => {
                let got_err = got.expect_err("want marshal error");
                assert_eq!(err, got_err, "Marshal {name}");
            }
            None => {
                let data = got.expect("marshal");
                assert_eq!(want.header().length as usize, data.len() / 4 - 1, "{name}");
                let actual = SenderReport::unmarshal(&mut data.clone())
                    .unwrap_or_else(|_| panic!("Unmarshal {name}"));
                assert_eq!(actual, want, "{name} round trip");
            }
        }
    }
}

#[test]
fn test_sender_report_destination_ssrc() {
    let sr = SenderReport {
        ssrc: 7,
        reports: vec![report_block()],
        ..Default::default()
    };
    assert_eq!(sr.destination_ssrc(), vec![0xbc5e9a40, 7]);
}
