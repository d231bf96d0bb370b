use bitstream::BitWriter;
use proptest::prelude::*;
use wire::{
    begin_frame, begin_section, end_frame, finish_section, FrameReader, Limits, PacketId,
    ReplicableId, SectionHeader,
};

#[derive(Clone, Debug)]
struct Section {
    replicable: u64,
    group: u8,
    payload: Vec<u8>,
    trailing_bits: u8,
}

fn section_strategy() -> impl Strategy<Value = Section> {
    (
        any::<u64>(),
        any::<u8>(),
        prop::collection::vec(any::<u8>(), 0..24),
        0u8..8,
    )
        .prop_map(|(replicable, group, payload, trailing_bits)| Section {
            replicable,
            group,
            payload,
            trailing_bits,
        })
}

fn encode(packet: u8, sections: &[Section]) -> Vec<u8> {
    let mut writer = BitWriter::new();
    begin_frame(&mut writer, PacketId::new(packet));
    for section in sections {
        let mark = begin_section(
            &mut writer,
            SectionHeader::new(ReplicableId::new(section.replicable), section.group),
        );
        for byte in &section.payload {
            writer.write_u8(*byte);
        }
        writer.write_bits(0, section.trailing_bits).unwrap();
        finish_section(&mut writer, mark).unwrap();
    }
    end_frame(&mut writer);
    writer.finish()
}

proptest! {
    #[test]
    fn skipped_sections_do_not_disturb_others(
        packet in any::<u8>(),
        sections in prop::collection::vec(section_strategy(), 0..12),
        skip_mask in any::<u16>(),
    ) {
        let bytes = encode(packet, &sections);
        let mut frame = FrameReader::new(&bytes, &Limits::default()).unwrap();
        prop_assert_eq!(frame.packet_id(), PacketId::new(packet));

        for (i, expected) in sections.iter().enumerate() {
            let info = frame.next_section().unwrap().unwrap();
            prop_assert_eq!(info.header.replicable, ReplicableId::new(expected.replicable));
            prop_assert_eq!(info.header.group_index, expected.group);
            prop_assert_eq!(
                info.payload_bits,
                expected.payload.len() * 8 + usize::from(expected.trailing_bits)
            );
            if skip_mask & (1 << i) == 0 {
                let mut payload = frame.payload(&info).unwrap();
                for byte in &expected.payload {
                    prop_assert_eq!(payload.read_u8().unwrap(), *byte);
                }
            }
            frame.end_section(&info).unwrap();
        }
        prop_assert!(frame.next_section().unwrap().is_none());
    }
}

#[test]
fn garbage_frames_do_not_panic() {
    let inputs: [&[u8]; 4] = [&[], &[7], &[7, 0xFF], &[1, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]];
    for input in inputs {
        if let Ok(mut frame) = FrameReader::new(input, &Limits::for_testing()) {
            while let Ok(Some(info)) = frame.next_section() {
                if frame.end_section(&info).is_err() {
                    break;
                }
            }
        }
    }
}
