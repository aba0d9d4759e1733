use bytes::Bytes;

use super::*;

#[test]
fn test_transport_layer_nack_unmarshal() {
    let tests = vec![
        (
            "one pair",
            Bytes::from_static(&[
                0x81, 0xcd, 0x00, 0x03, // v=2, p=0, FMT=1, RTPFB, len=3
                0x00, 0x00, 0x00, 0x01, // sender=1
                0x00, 0x00, 0x00, 0x02, // media=2
                0x01, 0x00, 0x80, 0x01, // pid=256, blp=0x8001
            ]),
            Ok(TransportLayerNack {
                sender_ssrc: 1,
                media_ssrc: 2,
                nacks: vec![NackPair {
                    packet_id: 256,
                    lost_packets: 0x8001,
                }],
            }),
        ),
        (
            "no pairs",
            Bytes::from_static(&[
                0x81, 0xcd, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02,
            ]),
            Ok(TransportLayerNack {
                sender_ssrc: 1,
                media_ssrc: 2,
                nacks: vec![],
            }),
        ),
        (
            "length beyond data",
            Bytes::from_static(&[
                0x81, 0xcd, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x05,
                0x00, 0x00,
            ]),
            Err(Error::PacketTooShort),
        ),
        (
            "missing media ssrc",
            Bytes::from_static(&[0x81, 0xcd, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01]),
            Err(Error::PacketTooShort),
        ),
        (
            "tmmbr is not a nack",
            Bytes::from_static(&[
                0x83, 0xcd, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02,
            ]),
            Err(Error::WrongType),
        ),
        ("empty", Bytes::new(), Err(Error::PacketTooShort)),
    ];

    for (name, mut data, want) in tests {
        let got = TransportLayerNack::unmarshal(&mut data);
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
fn test_transport_layer_nack_lost_set_round_trip() {
    let nack = TransportLayerNack::new(0x1234, 0x5678, &[5, 6, 9, 20]);
    assert_eq!(
        nack.nacks,
        vec![NackPair {
            packet_id: 5,
            lost_packets: 0x4009,
        }]
    );

    let data = nack.marshal().expect("marshal");
    assert_eq!(data.len(), 16);

    let got = TransportLayerNack::unmarshal(&mut data.clone()).expect("unmarshal");
    assert_eq!(got, nack);
    assert_eq!(got.packet_list(), vec![5, 6, 9, 20]);
    assert_eq!(got.destination_ssrc(), vec![0x5678]);
}

#[test]
fn test_nack_pairs_from_sequence_numbers() {
    let tests: Vec<(&str, Vec<u16>, Vec<NackPair>)> = vec![
        ("empty", vec![], vec![]),
        ("single", vec![42], vec![NackPair::new(42)]),
        (
            "seventeen fit one pair",
            (100..=116).collect(),
            vec![NackPair {
                packet_id: 100,
                lost_packets: 0xffff,
            }],
        ),
        (
            "eighteenth starts a new pair",
            vec![100, 117],
            vec![NackPair::new(100), NackPair::new(117)],
        ),
        (
            "duplicates are ignored",
            vec![7, 7, 8, 8],
            vec![NackPair {
                packet_id: 7,
                lost_packets: 0x0001,
            }],
        ),
        (
            "across the wrap",
            vec![65534, 65535, 0, 1],
            vec![NackPair {
                packet_id: 65534,
                lost_packets: 0x0007,
            }],
        ),
    ];

    for (name, seq_nos, want) in tests {
        let got = nack_pairs_from_sequence_numbers(&seq_nos);
        assert_eq!(got, want, "{name}");

        let flattened: Vec<u16> = got.iter().flat_map(|p| p.packet_list()).collect();
        let mut expected = seq_nos.clone();
        expected.dedup();
        assert_eq!(flattened, expected, "{name} packet list");
    }
}

#[test]
fn test_nack_pair_iterates_in_order() {
    let pair = NackPair {
        packet_id: 65530,
        lost_packets: 0b1000_0000_0010_0001,
    };
    assert_eq!(pair.packet_list(), vec![65530, 65531, 0, 10]);
}
