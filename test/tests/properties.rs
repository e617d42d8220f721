//! Property tests for the dispatch table and the command queue.

use std::collections::HashMap;

use proptest::prelude::*;

use ticknet_shared::{CommandQueue, MessageTable};

#[derive(Debug, Clone)]
enum TableOp {
    Register(u8, u32),
    Unregister(u8),
}

fn table_op() -> impl Strategy<Value = TableOp> {
    prop_oneof![
        (any::<u8>(), any::<u32>()).prop_map(|(id, tag)| TableOp::Register(id, tag)),
        any::<u8>().prop_map(TableOp::Unregister),
    ]
}

proptest! {
    /// The table behaves like a map: the last registration for an id wins
    /// and unregistration removes exactly that id.
    #[test]
    fn dispatch_table_tracks_a_map_model(ops in proptest::collection::vec(table_op(), 0..64)) {
        let mut table: MessageTable<u32> = MessageTable::new();
        let mut model: HashMap<u8, u32> = HashMap::new();

        for op in ops {
            match op {
                TableOp::Register(id, tag) => {
                    table.register(id, tag);
                    model.insert(id, tag);
                }
                TableOp::Unregister(id) => {
                    table.unregister(id);
                    model.remove(&id);
                }
            }
        }

        prop_assert_eq!(table.len(), model.len());
        for id in 0..=u8::MAX {
            prop_assert_eq!(table.get(id), model.get(&id));
            prop_assert_eq!(table.is_registered(id), model.contains_key(&id));
        }
    }

    /// Draining executes queued commands strictly in enqueue order.
    #[test]
    fn command_queue_preserves_enqueue_order(values in proptest::collection::vec(any::<u32>(), 0..64)) {
        let mut queue: CommandQueue<Vec<u32>> = CommandQueue::new();
        for value in values.clone() {
            queue.enqueue(move |executed| executed.push(value));
        }

        let mut executed = Vec::new();
        queue.drain(&mut executed);

        prop_assert_eq!(executed, values);
        prop_assert!(queue.is_empty());
    }
}
