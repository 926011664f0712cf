//! Observability infrastructure for parcel.
//!
//! Structured logging with consistent spans. Library code only emits through
//! the `tracing` facade; binaries and test harnesses decide where it goes.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `parcel_lineage=debug`)
///
/// # Example
///
/// ```rust
/// use parcel_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // A subscriber may already be installed by the host process.
        let _ = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };
    });
}

/// Creates a span for partition-space operations (enumeration, ranges, subsets).
///
/// # Example
///
/// ```rust
/// use parcel_core::observability::partitions_span;
///
/// let span = partitions_span("paginate", "date|region");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn partitions_span(operation: &str, definition: &str) -> Span {
    tracing::debug_span!("partitions", op = operation, definition = definition)
}

/// Creates a span for lineage operations on one asset.
#[must_use]
pub fn lineage_span(operation: &str, asset_key: &str) -> Span {
    tracing::debug_span!("lineage", op = operation, asset = asset_key)
}
