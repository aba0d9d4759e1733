use bytes::Bytes;

use super::*;

#[test]
fn test_goodbye_unmarshal() {
    let tests = vec![
        (
            "single source with reason",
            Bytes::from_static(&[
                0x81, 0xcb, 0x00, 0x02, // v=2, p=0, count=1, BYE, len=2
                0x11, 0x22, 0x33, 0x44, // ssrc=0x11223344
                0x03, 0x42, 0x59, 0x45, // len=3, text=BYE
            ]),
            Ok(Goodbye {
                sources: vec![0x11223344],
                reason: Bytes::from_static(b"BYE"),
            }),
        ),
        (
            "reason with null padding",
            Bytes::from_static(&[
                0x81, 0xcb, 0x00, 0x02, // v=2, p=0, count=1, BYE, len=2
                0x11, 0x22, 0x33, 0x44, // ssrc=0x11223344
                0x01, 0x42, 0x00, 0x00, // len=1, text=B
            ]),
            Ok(Goodbye {
                sources: vec![0x11223344],
                reason: Bytes::from_static(b"B"),
            }),
        ),
        (
            "two sources without reason",
            Bytes::from_static(&[
                0x82, 0xcb, 0x00, 0x02, // v=2, p=0, count=2, BYE, len=2
                0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02,
            ]),
            Ok(Goodbye {
                sources: vec![1, 2],
                reason: Bytes::new(),
            }),
        ),
        (
            "no sources",
            Bytes::from_static(&[0x80, 0xcb, 0x00, 0x00]),
            Ok(Goodbye::default()),
        ),
        (
            "reason longer than packet",
            Bytes::from_static(&[
                0x81, 0xcb, 0x00, 0x02, 0x11, 0x22, 0x33, 0x44, // len=4, only 3 octets follow
                0x04, 0x42, 0x59, 0x45,
            ]),
            Err(Error::PacketTooShort),
        ),
        (
            "missing source",
            Bytes::from_static(&[0x82, 0xcb, 0x00, 0x01, 0x11, 0x22, 0x33, 0x44]),
            Err(Error::PacketTooShort),
        ),
        (
            "unaligned",
            Bytes::from_static(&[0x81, 0xcb, 0x00, 0x02, 0x11, 0x22, 0x33, 0x44, 0x01, 0x42]),
            Err(Error::PacketTooShort),
        ),
        (
            "not a goodbye",
            Bytes::from_static(&[0x81, 0xc8, 0x00, 0x01, 0x11, 0x22, 0x33, 0x44]),
            Err(Error::WrongType),
        ),
        ("empty", Bytes::new(), Err(Error::PacketTooShort)),
    ];

    for (name, mut data, want) in tests {
        let got = Goodbye::unmarshal(&mut data);
        match want {
            Ok(want) => {
                let got = got.unwrap_or_else(|err| panic!("Unmarshal {name}: {err:?}"));
                assert_eq!(got, want, "Unmarshal {name}");
            }
            Err(err) => {
                let got_err = got.expect_err(name);
                assert_eq!(err, got_err, "Unmarshal {name}");
            }
        }
    }
}

#[test]
fn test_goodbye_marshal() {
    let tests = vec![
        (
            "odd reason length is padded",
            Goodbye {
                sources: vec![0x01020304],
                reason: Bytes::from_static(b"gone"),
            },
            None,
        ),
        (
            "max sources",
            Goodbye {
                sources: (0..COUNT_MAX as u32).collect(),
                reason: Bytes::new(),
            },
            None,
        ),
        (
            "too many sources",
            Goodbye {
                sources: vec![0; COUNT_MAX + 1],
                reason: Bytes::new(),
            },
            Some(Error::TooManySources),
        ),
        (
            "reason too long",
            Goodbye {
                sources: vec![1],
                reason: Bytes::from(vec![b'x'; 256]),
            },
            Some(Error::ReasonTooLong),
        ),
    ];

    for (name, want, want_error) in tests {
        match (want.marshal(), want_error) {
            (Ok(data), None) => {
                assert_eq!(data.len() % 4, 0, "{name}: length not aligned");
                assert_eq!(data.len(), want.header().packet_len(), "{name}");
                let got = Goodbye::unmarshal(&mut data.clone())
                    .unwrap_or_else(|err| panic!("Unmarshal {name}: {err:?}"));
                assert_eq!(got, want, "{name}");
            }
            (Err(got_err), Some(err)) => assert_eq!(err, got_err, "Marshal {name}"),
            (got, want_error) => panic!("Marshal {name}: got {got:?}, want {want_error:?}"),
        }
    }
}

#[test]
fn test_goodbye_destination_ssrc() {
    let bye = Goodbye {
        sources: vec![7, 8],
        reason: Bytes::new(),
    };
    assert_eq!(bye.destination_ssrc(), vec![7, 8]);
    assert_eq!(bye.header().count, 2);
}
