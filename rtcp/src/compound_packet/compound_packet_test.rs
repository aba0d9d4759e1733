use super::*;
use crate::goodbye::Goodbye;
use crate::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use crate::reception_report::ReceptionReport;

// A compound RTCP datagram from a packet dump
const REAL_PACKET: [u8; 116] = [
    // Receiver Report (offset=0)
    // v=2, p=0, count=1, RR, len=7
    0x81, 0xc9, 0x0, 0x7, // ssrc=0x902f9e2e
    0x90, 0x2f, 0x9e, 0x2e, // ssrc=0xbc5e9a40
    0xbc, 0x5e, 0x9a, 0x40, // fracLost=0, totalLost=0
    0x0, 0x0, 0x0, 0x0, // lastSeq=0x46e1
    0x0, 0x0, 0x46, 0xe1, // jitter=273
    0x0, 0x0, 0x1, 0x11, // lsr=0x9f36432
    0x9, 0xf3, 0x64, 0x32, // delay=150137
    0x0, 0x2, 0x4a, 0x79,
    // Source Description (offset=32)
    // v=2, p=0, count=1, SDES, len=12
    0x81, 0xca, 0x0, 0xc, // ssrc=0x902f9e2e
    0x90, 0x2f, 0x9e, 0x2e, // CNAME, len=38
    0x1, 0x26, // text="{9c00eb92-1afb-9d49-a47d-91f64eee69f5}"
    0x7b, 0x39, 0x63, 0x30, 0x30, 0x65, 0x62, 0x39, 0x32, 0x2d, 0x31, 0x61, 0x66, 0x62, 0x2d,
    0x39, 0x64, 0x34, 0x39, 0x2d, 0x61, 0x34, 0x37, 0x64, 0x2d, 0x39, 0x31, 0x66, 0x36, 0x34,
    0x65, 0x65, 0x65, 0x36, 0x39, 0x66, 0x35, 0x7d, // END + padding
    0x0, 0x0, 0x0, 0x0,
    // Goodbye (offset=84)
    // v=2, p=0, count=1, BYE, len=1
    0x81, 0xcb, 0x0, 0x1, // source=0x902f9e2e
    0x90, 0x2f, 0x9e, 0x2e, // Picture Loss Indication (offset=92)
    0x81, 0xce, 0x0, 0x2, // sender=0x902f9e2e
    0x90, 0x2f, 0x9e, 0x2e, // media=0x902f9e2e
    0x90, 0x2f, 0x9e, 0x2e, // RapidResynchronizationRequest (offset=104)
    0x85, 0xcd, 0x0, 0x2, // sender=0x902f9e2e
    0x90, 0x2f, 0x9e, 0x2e, // media=0x902f9e2e
    0x90, 0x2f, 0x9e, 0x2e,
];

const REAL_CNAME: &[u8] = b"{9c00eb92-1afb-9d49-a47d-91f64eee69f5}";

fn receiver_report(ssrc: u32) -> ReceiverReport {
    ReceiverReport {
        ssrc,
        reports: vec![ReceptionReport {
            ssrc: 0xbc5e9a40,
            last_sequence_number: 0x46e1,
            jitter: 273,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn cname(source: u32, text: &'static str) -> SourceDescription {
    SourceDescription {
        chunks: vec![SourceDescriptionChunk {
            source,
            items: vec![SourceDescriptionItem::new(SdesType::SdesCname, text)],
        }],
    }
}

#[test]
fn test_compound_packet_walk() {
    let mut compound = CompoundPacket::from(&REAL_PACKET[..]);
    assert!(compound.is_valid());

    let mut seen = vec![];
    while compound.next_subpacket() {
        let h = compound.subpacket_header().expect("header under cursor");
        seen.push((h.packet_type, h.count, h.len));
    }
    assert_eq!(
        seen,
        vec![(201, 1, 32), (202, 1, 52), (203, 1, 8), (206, 1, 12), (205, 5, 12)]
    );

    // the cursor stays on the last sub-packet
    assert!(!compound.next_subpacket());
    assert_eq!(compound.subpacket(), Some(&REAL_PACKET[104..]));

    compound.rewind();
    assert!(compound.next_subpacket());
    let first = compound.decode_subpacket().expect("decode RR");
    assert!(first.as_any().is::<ReceiverReport>());
}

#[test]
fn test_compound_packet_decodes_every_type() {
    let compound = CompoundPacket::from(Bytes::from_static(&REAL_PACKET));
    let (packets, errors) = compound.packets();
    assert!(errors.is_empty(), "errors: {errors:?}");
    assert_eq!(packets.len(), 5);

    let rr = packets[0]
        .as_any()
        .downcast_ref::<ReceiverReport>()
        .expect("RR");
    assert_eq!(rr.ssrc, 0x902f9e2e);
    assert_eq!(rr.reports[0].delay, 150137);

    let sdes = packets[1]
        .as_any()
        .downcast_ref::<SourceDescription>()
        .expect("SDES");
    assert_eq!(sdes.cname(0x902f9e2e).map(|c| &c[..]), Some(REAL_CNAME));

    let bye = packets[2].as_any().downcast_ref::<Goodbye>().expect("BYE");
    assert_eq!(bye.sources, vec![0x902f9e2e]);

    assert!(packets[3].as_any().is::<PictureLossIndication>());
    // no codec for RRR, it stays opaque
    assert!(packets[4].as_any().is::<RawPacket>());

    assert_eq!(compound.cname().expect("cname"), Bytes::from_static(REAL_CNAME));
}

#[test]
fn test_compound_packet_truncated_sdes() {
    let compound = CompoundPacket::from(&REAL_PACKET[..52]);
    assert!(!compound.is_valid());

    let (packets, errors) = compound.packets();
    assert_eq!(packets.len(), 1);
    assert!(packets[0].as_any().is::<ReceiverReport>());
    assert_eq!(errors, vec![Error::LengthOverrun(52, 20)]);

    let mut compound = compound;
    assert!(compound.next_subpacket());
    assert!(!compound.next_subpacket());
}

#[test]
fn test_compound_packet_skips_undecodable_subpacket() {
    let mut raw = REAL_PACKET[..32].to_vec();
    // BYE announcing one source but carrying none
    raw.extend_from_slice(&[0x81, 0xcb, 0x00, 0x00]);
    raw.extend_from_slice(&REAL_PACKET[92..104]);

    let compound = CompoundPacket::from(&raw[..]);
    assert!(compound.is_valid());

    let (packets, errors) = compound.packets();
    assert_eq!(packets.len(), 2);
    assert!(packets[1].as_any().is::<PictureLossIndication>());
    assert_eq!(errors, vec![Error::PacketTooShort]);
}

#[test]
fn test_compound_packet_rejects_foreign_subpackets() {
    let tests = vec![
        ("empty", vec![], false, vec![]),
        (
            "version 1",
            vec![0x41, 0xcb, 0x00, 0x01, 0, 0, 0, 1],
            false,
            vec![Error::BadVersion],
        ),
        (
            "rtp payload type",
            vec![0x80, 0x60, 0x00, 0x01, 0, 0, 0, 1],
            false,
            vec![Error::InvalidPacketType],
        ),
        (
            "stray bytes after a packet",
            vec![0x81, 0xcb, 0x00, 0x01, 0, 0, 0, 1, 0x81],
            false,
            vec![Error::PacketTooShort],
        ),
    ];

    for (name, raw, valid, want_errors) in tests {
        let compound = CompoundPacket::from(&raw[..]);
        assert_eq!(compound.is_valid(), valid, "{name}");
        let (_, errors) = compound.packets();
        assert_eq!(errors, want_errors, "{name}");
    }
}

#[test]
fn test_compound_packet_build() {
    let mut compound = CompoundPacket::new();
    compound.add_packet(&receiver_report(1)).expect("add RR");
    compound.add_packet(&cname(1, "cname")).expect("add SDES");

    // APP written by hand: subtype 3, ssrc, name, 5 bytes of data
    compound
        .start_new_subpacket(PacketType::ApplicationDefined as u8, 3)
        .expect("start APP");
    let body = compound.set_payload_size(13).expect("payload");
    body[..4].copy_from_slice(&1u32.to_be_bytes());
    body[4..8].copy_from_slice(b"TEST");
    body[8..].copy_from_slice(&[1, 2, 3, 4, 5]);
    compound.end_subpacket().expect("end APP");

    assert!(compound.is_valid());
    assert_eq!(compound.len() % 4, 0);
    compound.validate().expect("valid compound");
    assert_eq!(compound.cname().expect("cname"), Bytes::from_static(b"cname"));

    let (packets, errors) = compound.packets();
    assert!(errors.is_empty(), "errors: {errors:?}");
    assert_eq!(packets.len(), 3);
    assert_eq!(
        packets[0].as_any().downcast_ref::<ReceiverReport>(),
        Some(&receiver_report(1))
    );

    let raw = compound.freeze();
    let app = &raw[raw.len() - 20..];
    assert_eq!(&app[..4], &[0x83, 0xcc, 0x00, 0x04]);
    assert_eq!(&app[12..], &[1, 2, 3, 4, 5, 0, 0, 0]);
}

#[test]
fn test_compound_packet_builder_misuse() {
    let mut compound = CompoundPacket::new();
    assert_eq!(compound.end_subpacket(), Err(Error::NoOpenSubpacket));
    assert_eq!(
        compound.set_payload_size(4).map(|b| b.len()),
        Err(Error::NoOpenSubpacket)
    );
    assert_eq!(
        compound.start_new_subpacket(96, 0),
        Err(Error::InvalidPacketType)
    );
    assert_eq!(
        compound.start_new_subpacket(PacketType::Goodbye as u8, 32),
        Err(Error::InvalidHeader)
    );

    // an open sub-packet is closed by the next start
    compound
        .start_new_subpacket(PacketType::Goodbye as u8, 0)
        .expect("start");
    compound
        .start_new_subpacket(PacketType::Goodbye as u8, 0)
        .expect("start");
    compound.end_subpacket().expect("end");
    assert_eq!(&compound.bytes()[..], &[0x80, 0xcb, 0, 0, 0x80, 0xcb, 0, 0]);
}

#[test]
fn test_compound_packet_validate() {
    let tests: Vec<(&str, Vec<Box<dyn Packet + Send + Sync>>, Result<()>)> = vec![
        ("empty", vec![], Err(Error::EmptyCompound)),
        (
            "bye first",
            vec![Box::new(Goodbye {
                sources: vec![1],
                reason: Bytes::new(),
            })],
            Err(Error::BadFirstPacket),
        ),
        (
            "feedback before sdes",
            vec![
                Box::new(receiver_report(1)),
                Box::new(PictureLossIndication::new(1, 2)),
            ],
            Err(Error::PacketBeforeCname),
        ),
        (
            "sdes without cname",
            vec![
                Box::new(receiver_report(1)),
                Box::new(SourceDescription {
                    chunks: vec![SourceDescriptionChunk {
                        source: 1,
                        items: vec![SourceDescriptionItem::new(SdesType::SdesName, "name")],
                    }],
                }),
            ],
            Err(Error::MissingCname),
        ),
        (
            "report only",
            vec![Box::new(receiver_report(1))],
            Err(Error::MissingCname),
        ),
        (
            "extra receiver reports before sdes",
            vec![
                Box::new(SenderReport {
                    ssrc: 1,
                    ..Default::default()
                }),
                Box::new(receiver_report(1)),
                Box::new(cname(1, "cname")),
                Box::new(Goodbye {
                    sources: vec![1],
                    reason: Bytes::new(),
                }),
            ],
            Ok(()),
        ),
    ];

    for (name, packets, want) in tests {
        let mut compound = CompoundPacket::new();
        for p in &packets {
            compound.add_packet(p.as_ref()).expect("add_packet");
        }
        assert_eq!(compound.validate(), want, "{name}");
    }
}
