use rtcp::transport_feedbacks::transport_layer_cc::TYPE_TCC_DELTA_SCALE_FACTOR;
use util::marshal::{Marshal, Unmarshal};

use super::*;
use crate::error::Result;

const SENDER: u32 = 0x0102_0304;
const MEDIA: u32 = 0x0a0b_0c0d;
const BASE_US: i64 = 1_000_000_000;

fn assert_close(got: &[(u16, Option<i64>)], want: &[(u16, i64)]) {
    let received: Vec<(u16, i64)> = got
        .iter()
        .filter_map(|(seq, t)| t.map(|t| (*seq, t)))
        .collect();
    assert_eq!(received.len(), want.len(), "{got:?}");
    for ((seq, t), (want_seq, want_t)) in received.iter().zip(want) {
        assert_eq!(seq, want_seq);
        assert!(
            (t - want_t).abs() < TYPE_TCC_DELTA_SCALE_FACTOR,
            "seq {seq}: {t} vs {want_t}"
        );
    }
}

#[test]
fn test_twcc_recorder_round_trip() -> Result<()> {
    let mut r = TwccRecorder::new(SENDER);
    assert!(r.build_feedback().is_empty());

    // uneven spacing, one packet missing
    let arrivals: Vec<(u16, i64)> = vec![
        (10, BASE_US + 137),
        (11, BASE_US + 20_411),
        (13, BASE_US + 41_003),
        (14, BASE_US + 40_800),
        (15, BASE_US + 99_999),
    ];
    for &(seq, t) in &arrivals {
        r.record(MEDIA, seq, t);
    }

    let feedback = r.build_feedback();
    assert_eq!(feedback.len(), 1);
    let fb = &feedback[0];
    assert_eq!(fb.sender_ssrc, SENDER);
    assert_eq!(fb.media_ssrc, MEDIA);
    assert_eq!(fb.base_sequence_number, 10);
    assert_eq!(fb.packet_status_count, 6);
    assert_eq!(fb.fb_pkt_count, 0);

    let raw = fb.marshal()?;
    let decoded = TransportLayerCc::unmarshal(&mut raw.clone())?;
    assert_eq!(decoded.base_sequence_number, 10);
    assert_eq!(decoded.packet_status_count, 6);
    assert_eq!(decoded.reference_time, fb.reference_time);

    let got = decoded.packet_arrivals();
    assert_eq!(got[2], (12, None));
    assert_close(&got, &arrivals);

    assert!(r.is_empty());
    r.record(MEDIA, 16, BASE_US + 120_000);
    assert_eq!(r.build_feedback()[0].fb_pkt_count, 1);

    Ok(())
}

#[test]
fn test_twcc_recorder_sequence_wrap() {
    let mut r = TwccRecorder::new(SENDER);
    let order: Vec<(u16, i64)> = vec![
        (65534, BASE_US),
        (0, BASE_US + 2_000),
        (65535, BASE_US + 1_000),
        (1, BASE_US + 3_000),
    ];
    for &(seq, t) in &order {
        r.record(MEDIA, seq, t);
    }

    let feedback = r.build_feedback();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].base_sequence_number, 65534);
    assert_eq!(feedback[0].packet_status_count, 4);
    assert_close(
        &feedback[0].packet_arrivals(),
        &[
            (65534, BASE_US),
            (65535, BASE_US + 1_000),
            (0, BASE_US + 2_000),
            (1, BASE_US + 3_000),
        ],
    );
}

#[test]
fn test_twcc_recorder_duplicates() {
    let mut r = TwccRecorder::new(SENDER);
    let order: Vec<(u16, i64)> = vec![
        (3, BASE_US + 30),
        (1, BASE_US + 10),
        (2, BASE_US + 20),
        (2, BASE_US + 25),
    ];
    for &(seq, t) in &order {
        r.record(MEDIA, seq, t);
    }

    let feedback = r.build_feedback();
    assert_eq!(feedback.len(), 1);
    let seqs: Vec<u16> = feedback[0]
        .packet_arrivals()
        .iter()
        .map(|(seq, _)| *seq)
        .collect();
    assert_eq!(seqs, vec![1, 2, 3]);
}

#[test]
fn test_twcc_recorder_splits_long_gaps() {
    let mut r = TwccRecorder::new(SENDER);
    // a 16 bit delta of 250us steps covers a little over 8 seconds
    r.record(MEDIA, 100, BASE_US);
    r.record(MEDIA, 101, BASE_US + 5_000);
    r.record(MEDIA, 102, BASE_US + 10_000_000);
    r.record(MEDIA, 103, BASE_US + 10_020_000);

    let feedback = r.build_feedback();
    assert_eq!(feedback.len(), 2);
    assert_eq!(
        (feedback[0].base_sequence_number, feedback[0].packet_status_count),
        (100, 2)
    );
    assert_eq!(
        (feedback[1].base_sequence_number, feedback[1].packet_status_count),
        (102, 2)
    );
    assert_eq!(feedback[0].fb_pkt_count, 0);
    assert_eq!(feedback[1].fb_pkt_count, 1);
    assert_close(
        &feedback[1].packet_arrivals(),
        &[(102, BASE_US + 10_000_000), (103, BASE_US + 10_020_000)],
    );
}
