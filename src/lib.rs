pub mod api;
pub mod contracts;
pub mod engine;
pub mod metrics;
pub mod registry;
pub mod storage;
