#![no_main]

use groups::{
    BodyState, CollectionGroup, CollectionSyncConfig, Inventory, PhysicsGroup, StateGroup,
};
use libfuzzer_sys::fuzz_target;
use wire::{Endpoint, FrameReader, Limits, ReplicableId};

fuzz_target!(|data: &[u8]| {
    let limits = Limits::for_testing();
    let Ok(mut frame) = FrameReader::new(data, &limits) else {
        return;
    };
    let mut physics = PhysicsGroup::new(BodyState::default(), ReplicableId::new(1), Endpoint::new(1));
    let mut inventory = CollectionGroup::new(Inventory::new(None), CollectionSyncConfig::for_testing());

    // Every section goes to one of the two real decoders.
    while let Ok(Some(section)) = frame.next_section() {
        let group: &mut dyn StateGroup = if section.header.group_index % 2 == 0 {
            &mut physics
        } else {
            &mut inventory
        };
        if let Ok(mut payload) = frame.payload(&section) {
            let _ = group.deserialize(&mut payload);
        }
        let _ = frame.end_section(&section);
    }
});
