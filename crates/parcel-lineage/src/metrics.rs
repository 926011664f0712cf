//! Metrics for staleness resolution.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `parcel_stale_status_total` | Counter | `status` | Statuses resolved |
//! | `parcel_stale_dependency_skips_total` | Counter | `reason` | Dependency comparisons skipped |
//! | `parcel_stale_resolve_duration_seconds` | Histogram | - | Time to resolve one status |
//!
//! Metrics go through the `metrics` facade; without an installed recorder
//! they are no-ops.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

/// Metric names.
pub mod names {
    /// Counter: statuses resolved.
    pub const STALE_STATUS_TOTAL: &str = "parcel_stale_status_total";
    /// Counter: dependency comparisons skipped.
    pub const STALE_DEPENDENCY_SKIPS_TOTAL: &str = "parcel_stale_dependency_skips_total";
    /// Histogram: status resolution time in seconds.
    pub const STALE_RESOLVE_DURATION_SECONDS: &str = "parcel_stale_resolve_duration_seconds";
}

/// Label keys.
pub mod labels {
    /// Resolved status (missing, fresh, stale).
    pub const STATUS: &str = "status";
    /// Why a comparison was skipped.
    pub const REASON: &str = "reason";
}

/// Reasons a dependency comparison is skipped.
pub mod skip_reasons {
    /// The upstream maps to too many partitions.
    pub const PARTITION_THRESHOLD: &str = "partition_threshold";
    /// An `All` mapping onto a time-window upstream.
    pub const ALL_TIME_WINDOW: &str = "all_time_window";
    /// A self-dependency of an asset with too many partitions.
    pub const SELF_DEPENDENCY: &str = "self_dependency";
}

/// Records staleness metrics.
#[derive(Debug, Clone, Default)]
pub struct LineageMetrics;

impl LineageMetrics {
    /// Creates a recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Increments `parcel_stale_status_total`.
    pub fn record_status(&self, status: &str) {
        counter!(names::STALE_STATUS_TOTAL, labels::STATUS => status.to_string()).increment(1);
    }

    /// Increments `parcel_stale_dependency_skips_total`.
    pub fn record_dependency_skip(&self, reason: &'static str) {
        counter!(names::STALE_DEPENDENCY_SKIPS_TOTAL, labels::REASON => reason).increment(1);
    }

    /// Records one resolution in `parcel_stale_resolve_duration_seconds`.
    pub fn observe_resolve_duration(&self, duration: Duration) {
        histogram!(names::STALE_RESOLVE_DURATION_SECONDS).record(duration.as_secs_f64());
    }
}

/// Calls `on_drop` with the elapsed time when dropped.
///
/// ```rust
/// use parcel_lineage::metrics::{LineageMetrics, TimingGuard};
///
/// let metrics = LineageMetrics::new();
/// {
///     let _guard = TimingGuard::new(|elapsed| metrics.observe_resolve_duration(elapsed));
/// }
/// ```
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Starts timing.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}
