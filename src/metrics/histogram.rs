//! Lock-free latency histogram with fixed microsecond buckets.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of finite buckets.
pub const BUCKET_COUNT: usize = 10;

/// Upper bounds of the finite buckets, in microseconds.
///
/// Issuance is a session open plus one fsynced WAL write, so the range runs from
/// an in-memory hit (25μs) to a slow disk (250ms).
pub const LATENCY_BUCKETS_US: [u64; BUCKET_COUNT] = [
    25, 100, 250, 1_000, 2_500, 10_000, 25_000, 50_000, 100_000, 250_000,
];

/// Thread-safe histogram.
///
/// # Example
///
/// ```
/// use ticketd::metrics::Histogram;
///
/// let histogram = Histogram::new();
/// histogram.observe(150);
///
/// let (sum, count, _) = histogram.snapshot();
/// assert_eq!((sum, count), (150, 1));
/// ```
pub struct Histogram {
    sum: AtomicU64,
    count: AtomicU64,
    /// Cumulative: bucket `i` counts every observation `<= LATENCY_BUCKETS_US[i]`
    buckets: [AtomicU64; BUCKET_COUNT],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Records one observation in microseconds.
    #[inline]
    pub fn observe(&self, value_us: u64) {
        self.sum.fetch_add(value_us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (bucket, &bound) in self.buckets.iter().zip(LATENCY_BUCKETS_US.iter()) {
            if value_us <= bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Returns `(sum, count, cumulative_bucket_counts)`.
    pub fn snapshot(&self) -> (u64, u64, [u64; BUCKET_COUNT]) {
        let buckets = std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed));
        (
            self.sum.load(Ordering::Relaxed),
            self.count.load(Ordering::Relaxed),
            buckets,
        )
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Writes the histogram in Prometheus exposition format.
    pub fn write_prometheus(&self, out: &mut String, name: &str, help: &str) {
        let (sum, count, buckets) = self.snapshot();

        let _ = writeln!(out, "# HELP {} {}", name, help);
        let _ = writeln!(out, "# TYPE {} histogram", name);
        for (bound, value) in LATENCY_BUCKETS_US.iter().zip(buckets.iter()) {
            let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", name, bound, value);
        }
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, count);
        let _ = writeln!(out, "{}_sum {}", name, sum);
        let _ = writeln!(out, "{}_count {}", name, count);
    }
}
