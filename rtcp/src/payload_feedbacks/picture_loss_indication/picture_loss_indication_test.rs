use bytes::Bytes;

use super::*;

#[test]
fn test_picture_loss_indication_unmarshal() {
    let tests = vec![
        (
            "pli",
            Bytes::from_static(&[
                0x81, 0xce, 0x00, 0x02, // v=2, p=0, FMT=1, PSFB, len=2
                0x00, 0x00, 0x10, 0x00, // sender=0x1000
                0xca, 0xfe, 0xba, 0xbe, // media=0xcafebabe
            ]),
            Ok(PictureLossIndication::new(0x1000, 0xcafebabe)),
        ),
        (
            "length field too small",
            Bytes::from_static(&[
                0x81, 0xce, 0x00, 0x01, 0x00, 0x00, 0x10, 0x00, 0xca, 0xfe, 0xba, 0xbe,
            ]),
            Err(Error::PacketTooShort),
        ),
        (
            "truncated",
            Bytes::from_static(&[0x81, 0xce, 0x00, 0x02, 0x00, 0x00]),
            Err(Error::PacketTooShort),
        ),
        (
            "version 0",
            Bytes::from_static(&[0; 12]),
            Err(Error::BadVersion),
        ),
        (
            "fir is not pli",
            Bytes::from_static(&[
                0x84, 0xce, 0x00, 0x02, 0x00, 0x00, 0x10, 0x00, 0xca, 0xfe, 0xba, 0xbe,
            ]),
            Err(Error::WrongType),
        ),
    ];

    for (name, mut data, want) in tests {
        let got = PictureLossIndication::unmarshal(&mut data);
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
fn test_picture_loss_indication_marshal() {
    let pli = PictureLossIndication::new(1, 2);
    let data = pli.marshal().expect("marshal");
    assert_eq!(
        data,
        Bytes::from_static(&[0x81, 0xce, 0x00, 0x02, 0, 0, 0, 1, 0, 0, 0, 2])
    );
    assert_eq!(pli.destination_ssrc(), vec![2]);
    assert_eq!(pli.to_string(), "PLI from 1 for 2");
}
