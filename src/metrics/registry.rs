//! Metrics for the ticket server, rendered in Prometheus text format.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use dashmap::DashMap;

use super::Histogram;
use crate::contracts::TicketError;

/// Engine operation being measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    NextInt,
    LastInt,
    SetLastInt,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::NextInt => "next_int",
            Operation::LastInt => "last_int",
            Operation::SetLastInt => "set_last_int",
        }
    }
}

/// Central registry for ticket server metrics.
#[derive(Default)]
pub struct MetricsRegistry {
    start_time: OnceLock<Instant>,
    /// Engine operation metrics
    pub engine: Arc<EngineMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Self::default();
        let _ = registry.start_time.set(Instant::now());
        registry
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time
            .get()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn format_prometheus(&self) -> String {
        let mut out = String::with_capacity(4096);

        let _ = writeln!(out, "# HELP ticketd_uptime_secs Server uptime in seconds");
        let _ = writeln!(out, "# TYPE ticketd_uptime_secs gauge");
        let _ = writeln!(out, "ticketd_uptime_secs {:.3}", self.uptime_secs());

        out.push_str(&self.engine.format_prometheus());
        out
    }
}

/// Counters, latencies and failures of engine operations.
#[derive(Default)]
pub struct EngineMetrics {
    pub next_int_total: AtomicU64,
    pub last_int_total: AtomicU64,
    pub set_last_int_total: AtomicU64,
    /// Floor changes refused because they would move the sequence backward
    pub floor_rejections_total: AtomicU64,
    /// Largest integer handed out through this process
    pub last_issued: AtomicI64,
    pub next_int_latency_us: Histogram,
    pub last_int_latency_us: Histogram,
    /// Failures keyed by (operation, error code)
    errors: DashMap<(Operation, &'static str), u64>,
}

impl EngineMetrics {
    #[inline]
    pub fn record_next_int(&self, value: i64, latency_us: u64) {
        self.next_int_total.fetch_add(1, Ordering::Relaxed);
        self.last_issued.fetch_max(value, Ordering::Relaxed);
        self.next_int_latency_us.observe(latency_us);
    }

    #[inline]
    pub fn record_last_int(&self, latency_us: u64) {
        self.last_int_total.fetch_add(1, Ordering::Relaxed);
        self.last_int_latency_us.observe(latency_us);
    }

    #[inline]
    pub fn record_set_last_int(&self) {
        self.set_last_int_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, operation: Operation, error: &TicketError) {
        if let TicketError::MonotonicityViolation { .. } = error {
            self.floor_rejections_total.fetch_add(1, Ordering::Relaxed);
        }
        *self.errors.entry((operation, error.code())).or_insert(0) += 1;
    }

    /// Failures recorded for one operation and error code.
    pub fn error_count(&self, operation: Operation, code: &str) -> u64 {
        self.errors
            .iter()
            .filter(|e| e.key().0 == operation && e.key().1 == code)
            .map(|e| *e.value())
            .sum()
    }

    pub fn format_prometheus(&self) -> String {
        let mut out = String::with_capacity(4096);

        for (name, help, value) in [
            (
                "ticketd_next_int_total",
                "Integers issued",
                &self.next_int_total,
            ),
            (
                "ticketd_last_int_total",
                "Last-integer queries served",
                &self.last_int_total,
            ),
            (
                "ticketd_set_last_int_total",
                "Floor changes applied",
                &self.set_last_int_total,
            ),
            (
                "ticketd_floor_rejections_total",
                "Floor changes refused as below the last integer",
                &self.floor_rejections_total,
            ),
        ] {
            let _ = writeln!(out, "# HELP {} {}", name, help);
            let _ = writeln!(out, "# TYPE {} counter", name);
            let _ = writeln!(out, "{} {}", name, value.load(Ordering::Relaxed));
        }

        let _ = writeln!(
            out,
            "# HELP ticketd_last_issued Largest integer issued by this process"
        );
        let _ = writeln!(out, "# TYPE ticketd_last_issued gauge");
        let _ = writeln!(
            out,
            "ticketd_last_issued {}",
            self.last_issued.load(Ordering::Relaxed)
        );

        self.next_int_latency_us.write_prometheus(
            &mut out,
            "ticketd_next_int_latency_us",
            "Latency of integer issuance in microseconds",
        );
        self.last_int_latency_us.write_prometheus(
            &mut out,
            "ticketd_last_int_latency_us",
            "Latency of last-integer queries in microseconds",
        );

        let _ = writeln!(out, "# HELP ticketd_errors_total Failed operations by error code");
        let _ = writeln!(out, "# TYPE ticketd_errors_total counter");
        let mut errors: Vec<_> = self
            .errors
            .iter()
            .map(|e| (e.key().0.as_str(), e.key().1, *e.value()))
            .collect();
        errors.sort();
        for (operation, code, count) in errors {
            let _ = writeln!(
                out,
                "ticketd_errors_total{{operation=\"{}\",code=\"{}\"}} {}",
                operation, code, count
            );
        }

        out
    }
}
