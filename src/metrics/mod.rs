//! Observability metrics for the ticket server.
//!
//! Counters and histograms are lock-free atomics; error counts live in a
//! concurrent map keyed by operation and error code.

pub mod histogram;
pub mod registry;

pub use histogram::Histogram;
pub use registry::{EngineMetrics, MetricsRegistry, Operation};
