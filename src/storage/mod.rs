pub mod autoinc;
mod memory;
mod rocksdb;

pub use autoinc::AutoIncrement;
pub use memory::{MemoryCounterStore, MemorySession};
pub use self::rocksdb::{RocksDbCounterStore, RocksDbSession};
