#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use ticketd::contracts::{is_valid_namespace, Engine};
use ticketd::engine::TicketEngine;
use ticketd::storage::MemoryCounterStore;

fuzz_target!(|data: &[u8]| {
    let key = String::from_utf8_lossy(data);
    let engine = TicketEngine::new(Arc::new(MemoryCounterStore::new())).unwrap();

    // Only valid namespace identifiers may ever reach the store
    match engine.set_key(&key) {
        Ok(()) => {
            assert!(is_valid_namespace(&key));
            let first = engine.next_int().unwrap();
            assert_eq!(engine.last_int().unwrap(), first);
        }
        Err(_) => assert!(!is_valid_namespace(&key)),
    }
});
