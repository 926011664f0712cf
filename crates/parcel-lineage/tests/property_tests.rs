//! Property-based tests for staleness invariants.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;

use proptest::prelude::*;

use parcel_core::AssetKey;
use parcel_lineage::data_version::combine_partition_data_versions;
use parcel_lineage::prelude::*;
use parcel_test_utils::LineageHarness;

/// A linear chain `a0 <- a1 <- ... <- a{len-1}`, optionally code-versioned.
fn chain(len: usize, versioned: bool) -> Vec<AssetNode> {
    (0..len)
        .map(|i| {
            let mut node = AssetNode::materializable(format!("a{i}").as_str());
            if versioned {
                node = node.with_code_version("1");
            }
            if i > 0 {
                node = node.with_dependency(format!("a{}", i - 1).as_str());
            }
            node
        })
        .collect()
}

proptest! {
    /// Rematerializing one unversioned asset makes exactly its direct
    /// downstream stale; staleness does not propagate further.
    #[test]
    fn staleness_is_not_transitive(len in 2usize..7, pick in 0usize..6) {
        let changed = pick % (len - 1);
        let harness = LineageHarness::new(chain(len, false));
        for i in 0..len {
            harness.materialize(&format!("a{i}"), None);
        }
        harness.materialize(&format!("a{changed}"), None);

        for i in 0..len {
            let expected = if i == changed + 1 { StaleStatus::Stale } else { StaleStatus::Fresh };
            prop_assert_eq!(harness.status(&format!("a{i}"), None), expected);
        }
    }

    /// Rematerializing a fully versioned chain changes nothing.
    #[test]
    fn versioned_rematerialization_is_idempotent(len in 1usize..7, pick in 0usize..6) {
        let changed = pick % len;
        let harness = LineageHarness::new(chain(len, true));
        for i in 0..len {
            harness.materialize(&format!("a{i}"), None);
        }
        let before: Vec<DataVersion> =
            (0..len).map(|i| harness.data_version(&format!("a{i}"), None)).collect();
        harness.materialize(&format!("a{changed}"), None);

        for (i, version) in before.iter().enumerate() {
            let name = format!("a{i}");
            prop_assert_eq!(&harness.data_version(&name, None), version);
            prop_assert_eq!(harness.status(&name, None), StaleStatus::Fresh);
        }
    }

    /// Combined partition versions depend on every partition's version.
    #[test]
    fn combined_version_tracks_each_partition(
        versions in prop::collection::btree_map("[a-z]{1,4}", "[0-9]{1,3}", 1..8),
        bump in any::<prop::sample::Index>(),
    ) {
        let versions: BTreeMap<String, DataVersion> = versions
            .into_iter()
            .map(|(partition, version)| (partition, DataVersion::new(version)))
            .collect();
        let combined = combine_partition_data_versions(&versions);

        let target = bump.get(&versions.keys().cloned().collect::<Vec<_>>()).clone();
        let mut changed = versions.clone();
        changed.insert(target, DataVersion::new("changed"));
        prop_assert_ne!(combine_partition_data_versions(&changed), combined);
    }
}

#[test]
fn logical_version_covers_code_and_inputs() {
    let mut inputs = BTreeMap::new();
    inputs.insert(AssetKey::new("x"), DataVersion::new("1"));
    let with_input = compute_logical_data_version("c", &inputs);
    assert_ne!(with_input, compute_logical_data_version("c", &BTreeMap::new()));
    assert_ne!(with_input, compute_logical_data_version("d", &inputs));
}
