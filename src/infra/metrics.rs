//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so the control loop never waits on the web server or the
//! reporter. Reporting is the only operation that resets anything (via swap).
//!
//! NOTE: All atomics use Relaxed ordering. They are statistical counters only;
//! do NOT use them for coordination or logic decisions.

use crate::domain::types::{Direction, SensorId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Tick duration bucket boundaries (microseconds)
/// Buckets: ≤1ms, ≤2ms, ≤5ms, ≤10ms, ≤20ms, ≤50ms, ≤100ms, ≤200ms, ≤500ms, ≤1s, >1s
const BUCKET_BOUNDS: [u64; 10] =
    [1_000, 2_000, 5_000, 10_000, 20_000, 50_000, 100_000, 200_000, 500_000, 1_000_000];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a tick duration using binary search
#[inline]
fn bucket_index(duration_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < duration_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] = [
        1_000, 2_000, 5_000, 10_000, 20_000, 50_000, 100_000, 200_000, 500_000, 1_000_000,
        2_000_000,
    ];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Control-loop ticks ever run (monotonic)
    ticks_total: AtomicU64,
    /// Ticks since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Sum of tick durations (reset on report)
    tick_duration_sum_us: AtomicU64,
    /// Max tick duration (reset on report)
    tick_duration_max_us: AtomicU64,
    /// Tick duration histogram (reset on report)
    tick_duration_buckets: [AtomicU64; NUM_BUCKETS],
    /// Ticks that blew their time budget (monotonic)
    tick_overruns_total: AtomicU64,
    crossings_in_total: AtomicU64,
    crossings_out_total: AtomicU64,
    /// Ticks skipped by the debounce gate (monotonic)
    debounced_ticks_total: AtomicU64,
    /// Both sensors active while idle (monotonic)
    ambiguous_total: AtomicU64,
    /// Opposite sensor arrived after the timeout (monotonic)
    late_total: AtomicU64,
    /// Attempts that timed out with no opposite sensor (monotonic)
    abandoned_total: AtomicU64,
    /// Ranging calls that hit the measure timeout, per sensor (monotonic)
    ranging_timeouts: [AtomicU64; 2],
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            tick_duration_sum_us: AtomicU64::new(0),
            tick_duration_max_us: AtomicU64::new(0),
            tick_duration_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            tick_overruns_total: AtomicU64::new(0),
            crossings_in_total: AtomicU64::new(0),
            crossings_out_total: AtomicU64::new(0),
            debounced_ticks_total: AtomicU64::new(0),
            ambiguous_total: AtomicU64::new(0),
            late_total: AtomicU64::new(0),
            abandoned_total: AtomicU64::new(0),
            ranging_timeouts: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record one control-loop tick and how long it took (lock-free)
    #[inline]
    pub fn record_tick(&self, duration_us: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.tick_duration_sum_us.fetch_add(duration_us, Ordering::Relaxed);
        self.tick_duration_buckets[bucket_index(duration_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.tick_duration_max_us, duration_us);
    }

    #[inline]
    pub fn record_tick_overrun(&self) {
        self.tick_overruns_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_crossing(&self, direction: Direction) {
        match direction {
            Direction::In => self.crossings_in_total.fetch_add(1, Ordering::Relaxed),
            Direction::Out => self.crossings_out_total.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub fn record_debounced(&self) {
        self.debounced_ticks_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ambiguous(&self) {
        self.ambiguous_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_late(&self) {
        self.late_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_abandoned(&self) {
        self.abandoned_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ranging_timeout(&self, sensor: SensorId) {
        self.ranging_timeouts[sensor.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    pub fn crossings_total(&self, direction: Direction) -> u64 {
        match direction {
            Direction::In => self.crossings_in_total.load(Ordering::Relaxed),
            Direction::Out => self.crossings_out_total.load(Ordering::Relaxed),
        }
    }

    pub fn ranging_timeouts(&self, sensor: SensorId) -> u64 {
        self.ranging_timeouts[sensor.index()].load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let tick_count = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let duration_sum = self.tick_duration_sum_us.swap(0, Ordering::Relaxed);
        let duration_max = self.tick_duration_max_us.swap(0, Ordering::Relaxed);
        let tick_buckets = swap_buckets(&self.tick_duration_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        self.summarize(tick_count, duration_sum, duration_max, tick_buckets, elapsed)
    }

    /// Same summary as `report` for the window so far, without resetting it.
    /// Used by scrapes so they do not cut the reporter's window short.
    pub fn peek(&self) -> MetricsSummary {
        let tick_count = self.ticks_since_report.load(Ordering::Relaxed);
        let duration_sum = self.tick_duration_sum_us.load(Ordering::Relaxed);
        let duration_max = self.tick_duration_max_us.load(Ordering::Relaxed);
        let mut tick_buckets = [0u64; NUM_BUCKETS];
        for (slot, bucket) in tick_buckets.iter_mut().zip(&self.tick_duration_buckets) {
            *slot = bucket.load(Ordering::Relaxed);
        }
        let elapsed = self.last_report_time.lock().elapsed();

        self.summarize(tick_count, duration_sum, duration_max, tick_buckets, elapsed)
    }

    fn summarize(
        &self,
        tick_count: u64,
        duration_sum: u64,
        duration_max: u64,
        tick_buckets: [u64; NUM_BUCKETS],
        elapsed: Duration,
    ) -> MetricsSummary {
        let ticks_per_sec = if elapsed.as_secs_f64() > 0.0 {
            tick_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let tick_avg_us = if tick_count > 0 { duration_sum / tick_count } else { 0 };

        MetricsSummary {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_per_sec,
            tick_avg_us,
            tick_max_us: duration_max,
            tick_p50_us: percentile_from_buckets(&tick_buckets, 0.50),
            tick_p99_us: percentile_from_buckets(&tick_buckets, 0.99),
            tick_buckets,
            tick_overruns_total: self.tick_overruns_total.load(Ordering::Relaxed),
            crossings_in_total: self.crossings_in_total.load(Ordering::Relaxed),
            crossings_out_total: self.crossings_out_total.load(Ordering::Relaxed),
            debounced_ticks_total: self.debounced_ticks_total.load(Ordering::Relaxed),
            ambiguous_total: self.ambiguous_total.load(Ordering::Relaxed),
            late_total: self.late_total.load(Ordering::Relaxed),
            abandoned_total: self.abandoned_total.load(Ordering::Relaxed),
            ranging_timeouts_a: self.ranging_timeouts(SensorId::A),
            ranging_timeouts_b: self.ranging_timeouts(SensorId::B),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub ticks_per_sec: f64,
    pub tick_avg_us: u64,
    pub tick_max_us: u64,
    /// Tick duration histogram since the last report
    pub tick_buckets: [u64; NUM_BUCKETS],
    pub tick_p50_us: u64,
    pub tick_p99_us: u64,
    pub tick_overruns_total: u64,
    pub crossings_in_total: u64,
    pub crossings_out_total: u64,
    pub debounced_ticks_total: u64,
    pub ambiguous_total: u64,
    pub late_total: u64,
    pub abandoned_total: u64,
    pub ranging_timeouts_a: u64,
    pub ranging_timeouts_b: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            ticks_per_sec = format!("{:.1}", self.ticks_per_sec),
            tick_avg_us = %self.tick_avg_us,
            tick_max_us = %self.tick_max_us,
            tick_p99_us = %self.tick_p99_us,
            overruns = %self.tick_overruns_total,
            crossings_in = %self.crossings_in_total,
            crossings_out = %self.crossings_out_total,
            late = %self.late_total,
            abandoned = %self.abandoned_total,
            ranging_timeouts_a = %self.ranging_timeouts_a,
            ranging_timeouts_b = %self.ranging_timeouts_b,
            "metrics"
        );
    }
}
