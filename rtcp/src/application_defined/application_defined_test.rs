use bytes::Bytes;

use super::*;

#[test]
fn test_application_defined_unmarshal() {
    let tests = vec![
        (
            "aligned data",
            Bytes::from_static(&[
                0x83, 0xcc, 0x00, 0x03, // v=2, p=0, subtype=3, APP, len=3
                0x12, 0x34, 0x56, 0x78, // ssrc
                b'T', b'E', b'S', b'T', // name
                0xde, 0xad, 0xbe, 0xef, // data
            ]),
            Ok(ApplicationDefined {
                sub_type: 3,
                ssrc: 0x12345678,
                name: *b"TEST",
                data: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
            }),
        ),
        (
            "padded data",
            Bytes::from_static(&[
                0xa0, 0xcc, 0x00, 0x03, // v=2, p=1, subtype=0, APP, len=3
                0x00, 0x00, 0x00, 0x01, // ssrc
                b'a', b'b', b'c', b'd', // name
                0x01, 0x00, 0x00, 0x03, // data=01, 3 octets of padding
            ]),
            Ok(ApplicationDefined {
                sub_type: 0,
                ssrc: 1,
                name: *b"abcd",
                data: Bytes::from_static(&[0x01]),
            }),
        ),
        (
            "padding larger than data",
            Bytes::from_static(&[
                0xa0, 0xcc, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, b'a', b'b', b'c', b'd', 0x00, 0x00,
                0x00, 0x09,
            ]),
            Err(Error::WrongPadding),
        ),
        (
            "no name",
            Bytes::from_static(&[0x80, 0xcc, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01]),
            Err(Error::PacketTooShort),
        ),
        (
            "wrong type",
            Bytes::from_static(&[
                0x80, 0xcb, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, b'a', b'b', b'c', b'd',
            ]),
            Err(Error::WrongType),
        ),
    ];

    for (name, mut data, want) in tests {
        let got = ApplicationDefined::unmarshal(&mut data);
        match want {
            Ok(want) => {
                let got = got.unwrap_or_else(|err| panic!("Unmarshal {name}: {err:?}"));
                assert_eq!(got, want, "Unmarshal {name}");
            }
            Err(err) => assert_eq!(err, got.expect_err(name), "Unmarshal {name}"),
        }
    }
}

#[test]
fn test_application_defined_marshal_pads() {
    let app = ApplicationDefined::new(31, 0xcafe, "QOS!", Bytes::from_static(b"hello"))
        .expect("valid app");
    let data = app.marshal().expect("marshal");

    assert_eq!(data.len(), 20);
    assert_eq!(data[0], 0x80 | 0x20 | 31);
    assert_eq!(data[1], 204);
    assert_eq!(data[19], 3);

    let got = ApplicationDefined::unmarshal(&mut data.clone()).expect("unmarshal");
    assert_eq!(got, app);
    assert_eq!(got.name_str(), "QOS!");
    assert_eq!(got.destination_ssrc(), vec![0xcafe]);
}

#[test]
fn test_application_defined_new_validates() {
    assert_eq!(
        ApplicationDefined::new(32, 1, "NAME", Bytes::new()),
        Err(Error::InvalidSubtype)
    );
    assert_eq!(
        ApplicationDefined::new(1, 1, "LONGER", Bytes::new()),
        Err(Error::AppNameLength)
    );
    assert_eq!(
        ApplicationDefined::new(1, 1, "abc", Bytes::new()),
        Err(Error::AppNameLength)
    );
}
