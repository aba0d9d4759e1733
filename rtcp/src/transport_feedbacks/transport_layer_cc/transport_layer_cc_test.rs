use bytes::Bytes;

use super::*;

fn vector_packet() -> (Bytes, TransportLayerCc) {
    (
        Bytes::from_static(&[
            0xaf, 0xcd, 0x00, 0x06, // v=2, p=1, FMT=15, RTPFB, len=6
            0x00, 0x00, 0x00, 0x01, // sender=1
            0x00, 0x00, 0x00, 0x02, // media=2
            0x00, 0x0a, 0x00, 0x03, // base=10, count=3
            0x00, 0x00, 0x10, 0x05, // reference=16, fb count=5
            0xd2, 0x00, // 2-bit vector: small, missing, large
            0x04, // small delta, 1ms
            0xff, 0xf8, // large delta, -2ms
            0x00, 0x00, 0x03, // padding
        ]),
        TransportLayerCc {
            sender_ssrc: 1,
            media_ssrc: 2,
            base_sequence_number: 10,
            packet_status_count: 3,
            reference_time: 16,
            fb_pkt_count: 5,
            packet_chunks: vec![PacketStatusChunk::StatusVector {
                symbol_size: SymbolSizeTypeTcc::TwoBit,
                symbols: vec![
                    SymbolTypeTcc::PacketReceivedSmallDelta,
                    SymbolTypeTcc::PacketNotReceived,
                    SymbolTypeTcc::PacketReceivedLargeDelta,
                ],
            }],
            recv_deltas: vec![
                RecvDelta {
                    type_tcc_packet: SymbolTypeTcc::PacketReceivedSmallDelta,
                    delta: 1000,
                },
                RecvDelta {
                    type_tcc_packet: SymbolTypeTcc::PacketReceivedLargeDelta,
                    delta: -2000,
                },
            ],
        },
    )
}

#[test]
fn test_transport_layer_cc_decode_two_bit_vector() {
    let (mut data, want) = vector_packet();
    let got = TransportLayerCc::unmarshal(&mut data).expect("unmarshal");
    assert_eq!(got, want);
    assert_eq!(
        got.packet_arrivals(),
        vec![(10, Some(1_025_000)), (11, None), (12, Some(1_023_000))]
    );
}

#[test]
fn test_transport_layer_cc_encode_two_bit_vector() {
    let (data, packet) = vector_packet();
    assert_eq!(packet.marshal().expect("marshal"), data);
}

#[test]
fn test_transport_layer_cc_decode_one_bit_vector() {
    let mut data = Bytes::from_static(&[
        0x8f, 0xcd, 0x00, 0x05, // v=2, p=0, FMT=15, RTPFB, len=5
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, //
        0x00, 0x64, 0x00, 0x0e, // base=100, count=14
        0x00, 0x00, 0x00, 0x00, // reference=0, fb count=0
        0xa0, 0x01, // 1-bit vector: first and last received
        0x01, 0x02, // small deltas
    ]);

    let got = TransportLayerCc::unmarshal(&mut data).expect("unmarshal");
    let arrivals = got.packet_arrivals();
    assert_eq!(arrivals.len(), 14);
    assert_eq!(arrivals[0], (100, Some(250)));
    assert_eq!(arrivals[13], (113, Some(750)));
    assert!(arrivals[1..13].iter().all(|(_, t)| t.is_none()));
}

#[test]
fn test_transport_layer_cc_decode_errors() {
    let tests = vec![
        (
            "missing delta",
            Bytes::from_static(&[
                0x8f, 0xcd, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
                0x00, 0x03, 0x00, 0x00, 0x00, 0x00, // run of 3 small deltas, 2 present
                0x20, 0x03, 0x01, 0x01,
            ]),
            Error::PacketTooShort,
        ),
        (
            "chunks end before status count",
            Bytes::from_static(&[
                0x8f, 0xcd, 0x00, 0x05, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
                0x00, 0x08, 0x00, 0x00, 0x00, 0x00, // 7 symbols then an empty run
                0xc0, 0x00, 0x00, 0x00,
            ]),
            Error::PacketStatusChunkLength,
        ),
        (
            "length beyond data",
            Bytes::from_static(&[
                0x8f, 0xcd, 0x00, 0x09, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]),
            Error::PacketTooShort,
        ),
        (
            "nack is not twcc",
            Bytes::from_static(&[
                0x81, 0xcd, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ]),
            Error::WrongType,
        ),
    ];

    for (name, mut data, want) in tests {
        let got = TransportLayerCc::unmarshal(&mut data).expect_err(name);
        assert_eq!(want, got, "{name}");
    }
}

#[test]
fn test_transport_layer_cc_arrivals_round_trip() {
    let arrivals: Vec<(u16, i64)> = vec![
        (65533, 1_000_123),
        (65534, 1_020_456),
        (0, 1_030_001),
        (1, 1_029_000),
        (5, 1_500_000),
        (6, 1_500_100),
    ];

    let (fb, consumed) = TransportLayerCc::from_arrivals(7, 8, 3, &arrivals);
    assert_eq!(consumed, arrivals.len());
    assert_eq!(fb.base_sequence_number, 65533);
    assert_eq!(fb.packet_status_count, 10);
    assert_eq!(fb.reference_time, 15);

    let data = fb.marshal().expect("marshal");
    let got = TransportLayerCc::unmarshal(&mut data.clone()).expect("unmarshal");
    assert_eq!(got, fb);

    let decoded = got.packet_arrivals();
    assert_eq!(decoded.len(), 10);
    let mut want = arrivals.iter();
    for (seq, time) in decoded {
        match time {
            Some(t) => {
                let &(want_seq, want_time) = want.next().expect("more arrivals than sent");
                assert_eq!(seq, want_seq);
                assert!(
                    (want_time - t).abs() < 250,
                    "seq {seq}: decoded {t}, sent {want_time}"
                );
            }
            None => assert!([65535, 2, 3, 4].contains(&seq), "seq {seq} reported lost"),
        }
    }
    assert!(want.next().is_none());
}

#[test]
fn test_transport_layer_cc_long_run_uses_run_length() {
    let arrivals: Vec<(u16, i64)> = (0..20u16).map(|i| (i, 64_000 + i as i64 * 1000)).collect();
    let (fb, consumed) = TransportLayerCc::from_arrivals(1, 2, 0, &arrivals);

    assert_eq!(consumed, 20);
    assert_eq!(
        fb.packet_chunks,
        vec![PacketStatusChunk::RunLength {
            symbol: SymbolTypeTcc::PacketReceivedSmallDelta,
            run_length: 20,
        }]
    );
}

#[test]
fn test_transport_layer_cc_splits_on_delta_overflow() {
    let arrivals = vec![(1u16, 0i64), (2, 1_000), (3, 10_000_000), (4, 10_001_000)];
    let (fb, consumed) = TransportLayerCc::from_arrivals(1, 2, 0, &arrivals);

    assert_eq!(consumed, 2);
    assert_eq!(fb.packet_status_count, 2);

    let (rest, consumed) = TransportLayerCc::from_arrivals(1, 2, 1, &arrivals[2..]);
    assert_eq!(consumed, 2);
    assert_eq!(rest.base_sequence_number, 3);
}

#[test]
fn test_transport_layer_cc_empty_arrivals() {
    let (fb, consumed) = TransportLayerCc::from_arrivals(1, 2, 0, &[]);
    assert_eq!(consumed, 0);
    assert_eq!(fb.packet_status_count, 0);
    assert!(fb.packet_arrivals().is_empty());
}
