use super::*;

fn encoded_packet() -> Bytes {
    Bytes::from_static(&[
        // RTCP header
        0x80, 0xCF, 0x00, 0x0B, // v=2, p=0, XR, len=11
        // sender SSRC
        0x01, 0x02, 0x03, 0x04, //
        // Receiver Reference Time
        0x04, 0x00, 0x00, 0x02, // BT=4, block length=2
        0xE0, 0x00, 0x00, 0x01, 0x80, 0x00, 0x00, 0x00, //
        // DLRR
        0x05, 0x00, 0x00, 0x03, // BT=5, block length=3
        0x88, 0x88, 0x88, 0x88, 0x00, 0x01, 0x80, 0x00, 0x00, 0x00, 0x40, 0x00, //
        // Statistics Summary, kept opaque
        0x06, 0xE0, 0x00, 0x02, // BT=6, flags, block length=2
        0xFE, 0xDC, 0xBA, 0x98, 0x12, 0x34, 0x56, 0x78,
    ])
}

fn decoded_packet() -> ExtendedReport {
    ExtendedReport {
        sender_ssrc: 0x01020304,
        reports: vec![
            ReportBlock::ReceiverReferenceTime(ReceiverReferenceTimeReportBlock {
                ntp_timestamp: 0xE000000180000000,
            }),
            ReportBlock::Dlrr(DlrrReportBlock {
                reports: vec![DlrrReport {
                    ssrc: 0x88888888,
                    last_rr: 0x00018000,
                    dlrr: 0x00004000,
                }],
            }),
            ReportBlock::Unknown(UnknownReportBlock {
                block_type: 6,
                type_specific: 0xE0,
                bytes: Bytes::from_static(&[0xFE, 0xDC, 0xBA, 0x98, 0x12, 0x34, 0x56, 0x78]),
            }),
        ],
    }
}

#[test]
fn test_extended_report_decode() {
    let got = ExtendedReport::unmarshal(&mut encoded_packet()).expect("unmarshal");
    assert_eq!(got, decoded_packet());
    assert_eq!(got.receiver_reference_time(), Some(0xE000000180000000));
    assert_eq!(
        got.dlrr_reports().map(|r| r.ssrc).collect::<Vec<u32>>(),
        vec![0x88888888]
    );
    assert_eq!(got.destination_ssrc(), vec![0x88888888]);
}

#[test]
fn test_extended_report_encode() {
    let got = decoded_packet().marshal().expect("marshal");
    assert_eq!(got, encoded_packet());
}

#[test]
fn test_extended_report_errors() {
    let tests = vec![
        (
            "block overruns packet",
            Bytes::from_static(&[
                0x80, 0xCF, 0x00, 0x03, 0x01, 0x02, 0x03, 0x04, // BT=5, block length=3
                0x05, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01,
            ]),
            error::Error::PacketTooShort,
        ),
        (
            "rrtr with wrong length",
            Bytes::from_static(&[
                0x80, 0xCF, 0x00, 0x03, 0x01, 0x02, 0x03, 0x04, // BT=4, block length=1
                0x04, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
            ]),
            error::Error::PacketTooShort,
        ),
        (
            "truncated block header",
            Bytes::from_static(&[0x80, 0xCF, 0x00, 0x02, 0x01, 0x02, 0x03, 0x04, 0x04, 0x00]),
            error::Error::PacketTooShort,
        ),
        (
            "wrong packet type",
            Bytes::from_static(&[0x80, 0xC9, 0x00, 0x01, 0x01, 0x02, 0x03, 0x04]),
            error::Error::WrongType,
        ),
    ];

    for (name, mut data, want) in tests {
        let got = ExtendedReport::unmarshal(&mut data).expect_err(name);
        assert_eq!(want, got, "{name}");
    }
}

#[test]
fn test_extended_report_unknown_block_is_padded() {
    let xr = ExtendedReport {
        sender_ssrc: 1,
        reports: vec![ReportBlock::Unknown(UnknownReportBlock {
            block_type: 42,
            type_specific: 0,
            bytes: Bytes::from_static(&[1, 2, 3]),
        })],
    };
    let data = xr.marshal().expect("marshal");
    assert_eq!(data.len(), 16);
    assert_eq!(&data[8..12], &[42, 0, 0, 1]);

    let got = ExtendedReport::unmarshal(&mut data.clone()).expect("unmarshal");
    assert_eq!(
        got.reports,
        vec![ReportBlock::Unknown(UnknownReportBlock {
            block_type: 42,
            type_specific: 0,
            bytes: Bytes::from_static(&[1, 2, 3, 0]),
        })]
    );
}
