use bytes::Bytes;

use super::*;

#[test]
fn test_raw_packet_roundtrip() {
    let tests: Vec<(&str, RawPacket, Option<Error>)> = vec![
        (
            "valid",
            RawPacket(Bytes::from_static(&[
                // v=2, p=0, count=1, BYE, len=2
                0x81, 0xcb, 0x00, 0x02, // ssrc=0x902f9e2e
                0x90, 0x2f, 0x9e, 0x2e, // len=3, text=FOO
                0x03, 0x46, 0x4f, 0x4f,
            ])),
            None,
        ),
        (
            "unknown packet type",
            RawPacket(Bytes::from_static(&[
                // v=2, p=0, count=0, type=210, len=1
                0x80, 0xd2, 0x00, 0x01, 0x01, 0x02, 0x03, 0x04,
            ])),
            None,
        ),
        (
            "short header",
            RawPacket(Bytes::from_static(&[0x80])),
            Some(Error::PacketTooShort),
        ),
        (
            "invalid header",
            RawPacket(Bytes::from_static(&[
                // v=0, p=0, count=0, RR, len=4
                0x00, 0xc9, 0x00, 0x04,
            ])),
            Some(Error::BadVersion),
        ),
    ];

    for (name, pkt, unmarshal_error) in tests {
        let result = RawPacket::unmarshal(&mut pkt.0.clone());
        match unmarshal_error {
            Some(err) => {
                let got = result.expect_err("want unmarshal error");
                assert_eq!(err, got, "Unmarshal {name}: err = {got:?}, want {err:?}");
            }
            None => {
                let decoded = result.expect("unmarshal");
                assert_eq!(decoded, pkt, "Unmarshal {name}");
                assert_eq!(decoded.packet_type(), pkt.0[1], "{name}");

                let data = decoded.marshal().expect("marshal");
                assert_eq!(data, pkt.0, "Marshal {name}");
            }
        }
    }
}

#[test]
fn test_raw_packet_header() {
    let pkt = RawPacket(Bytes::from_static(&[0x8f, 0xcd, 0x00, 0x01, 0, 0, 0, 1]));
    let h = pkt.header();
    assert_eq!(h.packet_type, PacketType::TransportSpecificFeedback);
    assert_eq!(h.count, 15);
    assert_eq!(h.length, 1);
}
