//! Data version recording: derived versions, provenance tags, legacy tags,
//! records without provenance and request validation.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;

use parcel_core::{AssetKey, AssetPartitionKey};
use parcel_lineage::data_version::{
    input_event_pointer_tag, CODE_VERSION_TAG, LEGACY_DATA_VERSION_TAG,
    LEGACY_INPUT_DATA_VERSION_TAG_PREFIX,
};
use parcel_lineage::prelude::*;
use parcel_lineage::store::NewRecord;
use parcel_test_utils::{
    asset_partition, data_cause, date_region_definition, init_test_logging, static_keys, utc,
    LineageHarness,
};

fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn versioned_asset_keeps_its_version() {
    let harness = LineageHarness::new([AssetNode::materializable("asset1").with_code_version("abc")]);
    harness.materialize("asset1", None);
    let first = harness.data_version("asset1", None);
    harness.materialize("asset1", None);
    assert_eq!(harness.data_version("asset1", None), first);
    assert_eq!(first, compute_logical_data_version("abc", &BTreeMap::new()));
}

#[test]
fn unversioned_asset_gets_a_new_version_each_time() {
    let harness = LineageHarness::new([AssetNode::materializable("asset1")]);
    harness.materialize("asset1", None);
    let first = harness.data_version("asset1", None);
    harness.materialize("asset1", None);
    assert_ne!(harness.data_version("asset1", None), first);
}

#[test]
fn versioned_downstream_follows_unversioned_upstream() {
    let harness = LineageHarness::new([
        AssetNode::materializable("asset1"),
        AssetNode::materializable("asset2")
            .with_code_version("xyz")
            .with_dependency("asset1"),
    ]);
    harness.materialize("asset1", None);
    harness.materialize("asset2", None);
    let first = harness.data_version("asset2", None);

    harness.materialize("asset2", None);
    assert_eq!(harness.data_version("asset2", None), first);

    harness.materialize("asset1", None);
    harness.materialize("asset2", None);
    assert_ne!(harness.data_version("asset2", None), first);
}

#[test]
fn current_version_without_records() {
    let harness = LineageHarness::new([
        AssetNode::external("source"),
        AssetNode::materializable("asset").with_dependency("source"),
    ]);
    assert_eq!(harness.data_version("source", None), DataVersion::initial());
    assert_eq!(harness.data_version("asset", None), DataVersion::null());
    assert_eq!(harness.status("source", None), StaleStatus::Fresh);
    assert_eq!(harness.status("asset", None), StaleStatus::Missing);
}

#[test]
fn provenance_records_inputs_and_pointers() {
    let harness = LineageHarness::new([
        AssetNode::external("source"),
        AssetNode::materializable("asset1")
            .with_code_version("1")
            .with_dependency("source"),
    ]);
    let observed = harness.observe("source", None, "v7");
    harness.materialize("asset1", None);

    let provenance = harness.provenance("asset1", None).unwrap();
    assert_eq!(provenance.code_version, "1");
    assert!(!provenance.is_user_provided);
    let source = AssetKey::new("source");
    assert_eq!(provenance.input_data_versions[&source], DataVersion::new("v7"));
    assert_eq!(provenance.input_storage_ids[&source], observed);
}

#[test]
fn unobserved_external_input_is_initial_without_pointer() {
    let harness = LineageHarness::new([
        AssetNode::external("source"),
        AssetNode::materializable("asset1").with_dependency("source"),
    ]);
    harness.materialize("asset1", None);
    let provenance = harness.provenance("asset1", None).unwrap();
    let source = AssetKey::new("source");
    assert_eq!(provenance.input_data_versions[&source], DataVersion::initial());
    assert!(!provenance.input_storage_ids.contains_key(&source));
}

#[test]
fn several_partitions_are_recorded_as_one_input() {
    let harness = LineageHarness::new([
        AssetNode::materializable("asset1").with_partitioning(static_keys(&["a", "b"])),
        AssetNode::materializable("asset2").with_dependency("asset1"),
    ]);
    harness.materialize_version("asset1", Some("a"), "1");
    let b = harness.materialize_version("asset1", Some("b"), "1");
    harness.materialize("asset2", None);
    let first = harness.provenance("asset2", None).unwrap();
    let asset1 = AssetKey::new("asset1");
    assert_eq!(first.input_storage_ids[&asset1], b);

    harness.materialize_version("asset1", Some("a"), "2");
    harness.materialize("asset2", None);
    let second = harness.provenance("asset2", None).unwrap();
    assert_ne!(
        first.input_data_versions[&asset1],
        second.input_data_versions[&asset1]
    );
}

#[test]
fn request_tags_override_input_pointers() {
    let harness = LineageHarness::new([
        AssetNode::materializable("asset1"),
        AssetNode::materializable("asset2").with_dependency("asset1"),
    ]);
    harness.materialize("asset1", None);
    let pointer = input_event_pointer_tag(&AssetKey::new("asset1"));
    harness.materialize_with("asset2", None, |request| request.with_tag(pointer, "500"));

    let provenance = harness.provenance("asset2", None).unwrap();
    assert_eq!(provenance.input_storage_ids[&AssetKey::new("asset1")], 500);
}

#[test]
fn mismatched_observed_input_records_latest_version() {
    init_test_logging();
    let harness = LineageHarness::new([
        AssetNode::materializable("asset1"),
        AssetNode::materializable("asset2").with_dependency("asset1"),
    ]);
    harness.materialize_version("asset1", None, "a");
    harness.materialize_with("asset2", None, |request| {
        request.with_observed_input("asset1", "off-books")
    });

    let provenance = harness.provenance("asset2", None).unwrap();
    assert_eq!(
        provenance.input_data_versions[&AssetKey::new("asset1")],
        DataVersion::new("a")
    );
    assert_eq!(harness.status("asset2", None), StaleStatus::Fresh);
}

#[test]
fn user_versions_are_flagged() {
    let harness = LineageHarness::new([AssetNode::materializable("asset1")]);
    harness.materialize_version("asset1", None, "manual");
    let provenance = harness.provenance("asset1", None).unwrap();
    assert!(provenance.is_user_provided);
    assert_eq!(harness.data_version("asset1", None), DataVersion::new("manual"));
}

#[test]
fn multi_partition_records_carry_dimension_tags() {
    let harness =
        LineageHarness::new([AssetNode::materializable("asset1").with_partitioning(date_region_definition())]);
    harness.materialize("asset1", Some("2024-01-03|us"));
    let record = harness
        .store()
        .latest_record(&AssetKey::new("asset1"), Some("2024-01-03|us"))
        .unwrap()
        .unwrap();
    assert_eq!(record.tags["parcel/partition/date"], "2024-01-03");
    assert_eq!(record.tags["parcel/partition/region"], "us");
}

#[test]
fn legacy_tags_are_read() {
    let harness = LineageHarness::new([
        AssetNode::external("foo"),
        AssetNode::materializable("bar")
            .with_code_version("1")
            .with_dependency("foo"),
    ]);
    let legacy_input = format!("{LEGACY_INPUT_DATA_VERSION_TAG_PREFIX}/foo");
    harness.record_raw(
        "bar",
        None,
        tags(&[
            (LEGACY_DATA_VERSION_TAG, "bar"),
            (CODE_VERSION_TAG, "1"),
            (legacy_input.as_str(), "foo"),
        ]),
    );

    assert_eq!(harness.data_version("bar", None), DataVersion::new("bar"));
    let provenance = harness.provenance("bar", None).unwrap();
    assert_eq!(
        provenance.input_data_versions[&AssetKey::new("foo")],
        DataVersion::new("foo")
    );
    // foo has never been observed, so its current version is INITIAL.
    assert_eq!(
        harness.causes("bar", None),
        vec![data_cause(
            asset_partition("bar", None),
            asset_partition("foo", None),
            true
        )]
    );
}

#[test]
fn record_without_provenance_with_external_input_is_fresh() {
    let harness = LineageHarness::new([
        AssetNode::external("bar"),
        AssetNode::materializable("foo").with_dependency("bar"),
    ]);
    harness.record_raw("foo", None, BTreeMap::new());
    harness.observe("bar", None, "2");

    assert_eq!(harness.data_version("foo", None), DataVersion::unknown());
    assert_eq!(harness.status("foo", None), StaleStatus::Fresh);
    assert!(harness.root_causes("foo", None).is_empty());
}

#[test]
fn record_without_provenance_compares_timestamps() {
    let harness = LineageHarness::new([
        AssetNode::materializable("upstream"),
        AssetNode::materializable("downstream").with_dependency("upstream"),
    ]);
    harness.materialize("upstream", None);
    harness.record_raw("downstream", None, BTreeMap::new());
    assert_eq!(harness.status("downstream", None), StaleStatus::Fresh);

    harness.materialize("upstream", None);
    assert_eq!(
        harness.causes("downstream", None),
        vec![StaleCause::new(
            asset_partition("downstream", None),
            StaleCauseCategory::Data,
            "has a new input"
        )
        .with_dependency(asset_partition("upstream", None))]
    );
}

#[test]
fn invalid_requests_are_rejected() {
    let harness = LineageHarness::new([
        AssetNode::external("source"),
        AssetNode::materializable("plain"),
        AssetNode::materializable("parted").with_partitioning(static_keys(&["a"])),
    ]);
    let recorder = MaterializationRecorder::new(harness.graph(), harness.store(), harness.context());
    let at = utc(2024, 2, 1, 0);

    let cases = [
        AssetPartitionKey::unpartitioned(AssetKey::new("source")),
        asset_partition("plain", Some("a")),
        asset_partition("parted", None),
        asset_partition("parted", Some("zzz")),
    ];
    for key in cases {
        let err = recorder
            .materialize(MaterializeRequest::new(key.clone(), at))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }), "{key}: {err}");
    }

    let err = recorder.observe(AssetKey::new("plain"), "v1", at).unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));
    let err = recorder
        .materialize(MaterializeRequest::new(AssetKey::new("ghost"), at))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownAsset { .. }));
    assert_eq!(harness.store().record_count().unwrap(), 0);
}

#[test]
fn unknown_assets_are_errors() {
    let graph = AssetGraph::new([AssetNode::materializable("asset1")]).unwrap();
    let store = InMemoryEventStore::new();
    let resolver = StaleStatusResolver::new(
        &graph,
        &store,
        parcel_partitions::PartitionLoadingContext::new(utc(2024, 1, 1, 0)),
    );
    let err = resolver.get_status(&AssetKey::new("nope"), None).unwrap_err();
    assert!(matches!(err, Error::UnknownAsset { .. }));
}

#[test]
fn store_writes_without_the_recorder_are_visible() {
    let harness = LineageHarness::new([AssetNode::materializable("asset1")]);
    harness
        .store()
        .store_record(
            NewRecord::materialization(AssetKey::new("asset1"), utc(2024, 3, 1, 0))
                .with_tag(CODE_VERSION_TAG, "c"),
        )
        .unwrap();
    assert_eq!(harness.status("asset1", None), StaleStatus::Fresh);
    assert_eq!(harness.data_version("asset1", None), DataVersion::unknown());
}
