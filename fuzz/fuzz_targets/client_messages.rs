#![no_main]

use groups::{CollectionGroup, CollectionSyncConfig, Inventory, StateGroup};
use libfuzzer_sys::fuzz_target;
use repgraph::{ReplicaFactory, ReplicationClient};
use wire::{CreateMessage, Limits};

struct AnyType;

impl ReplicaFactory for AnyType {
    fn create(&mut self, message: &CreateMessage) -> Option<Vec<Box<dyn StateGroup>>> {
        let group = CollectionGroup::new(
            Inventory::new(Some(message.replicable)),
            CollectionSyncConfig::for_testing(),
        );
        Some(vec![Box::new(group)])
    }
}

fuzz_target!(|data: &[u8]| {
    let mut client = ReplicationClient::new(AnyType, Limits::for_testing());
    let mut idx = 0usize;
    while idx + 1 < data.len() && idx < 4096 {
        let kind = data[idx] % 5;
        let len = (data[idx + 1] as usize % 120).saturating_add(1);
        idx += 2;
        let end = (idx + len).min(data.len());
        let _ = client.receive_raw(kind, &data[idx..end]);
        idx = end;
    }
});
