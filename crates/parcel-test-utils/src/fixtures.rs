//! Pre-built fixtures with fixed clocks.

use chrono::{DateTime, TimeZone, Utc};
use parcel_core::{AssetKey, AssetPartitionKey};
use parcel_lineage::stale::{StaleCause, StaleCauseCategory};
use parcel_partitions::prelude::*;

/// A UTC instant.
pub fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// A context with no dynamic store at `effective_dt`.
pub fn context_at(effective_dt: DateTime<Utc>) -> PartitionLoadingContext<'static> {
    PartitionLoadingContext::new(effective_dt)
}

/// A static dimension.
pub fn static_keys(keys: &[&str]) -> PartitionsDefinition {
    PartitionsDefinition::static_keys(keys.iter().copied()).expect("valid static keys")
}

/// A daily series starting at `start` (`%Y-%m-%d`).
pub fn daily_from(start: &str) -> TimeWindowPartitions {
    TimeWindowPartitions::daily(start).expect("valid daily start")
}

/// `date` (daily from 2024-01-01) by `region` (`eu`, `us`).
pub fn date_region_definition() -> MultiPartitionsDefinition {
    MultiPartitionsDefinition::new([
        ("date", daily_from("2024-01-01").into()),
        ("region", static_keys(&["eu", "us"])),
    ])
    .expect("valid definition")
}

/// An asset partition key; `None` for an unpartitioned asset.
pub fn asset_partition(asset: &str, partition: Option<&str>) -> AssetPartitionKey {
    AssetPartitionKey::new(AssetKey::new(asset), partition.map(str::to_string))
}

/// A cause without dependency or children.
pub fn cause(asset: &str, category: StaleCauseCategory, reason: &str) -> StaleCause {
    StaleCause::new(asset_partition(asset, None), category, reason)
}

/// The `DATA` cause raised when `dependency` wrote a new version, with
/// its one-level explanation.
pub fn data_cause(
    key: AssetPartitionKey,
    dependency: AssetPartitionKey,
    versioned: bool,
) -> StaleCause {
    let (reason, child_reason) = if versioned {
        ("has a new dependency data version", "has a new data version")
    } else {
        ("has a new dependency materialization", "has a new materialization")
    };
    StaleCause::new(key, StaleCauseCategory::Data, reason)
        .with_dependency(dependency.clone())
        .with_children(vec![StaleCause::new(
            dependency,
            StaleCauseCategory::Data,
            child_reason,
        )])
}
