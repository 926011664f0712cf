//! Integration tests for multi-dimensional partition definitions.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use parcel_partitions::paginate::PaginatedResults;
use parcel_partitions::prelude::*;

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn ctx_at(y: i32, m: u32, d: u32) -> PartitionLoadingContext<'static> {
    PartitionLoadingContext::new(at(y, m, d))
}

fn static_def(keys: &[&str]) -> PartitionsDefinition {
    PartitionsDefinition::static_keys(keys.iter().copied()).expect("static keys are distinct")
}

fn strings(keys: impl IntoIterator<Item = MultiPartitionKey>) -> Vec<String> {
    keys.into_iter().map(String::from).collect()
}

fn dim_a_dim_b(a: &[&str], b: &[&str]) -> MultiPartitionsDefinition {
    MultiPartitionsDefinition::new([("dim_a", static_def(a)), ("dim_b", static_def(b))])
        .expect("valid definition")
}

fn date_static() -> MultiPartitionsDefinition {
    MultiPartitionsDefinition::new([
        ("date", TimeWindowPartitions::daily("2015-01-01").unwrap().into()),
        ("static", static_def(&["a", "b", "c", "d"])),
    ])
    .expect("valid definition")
}

fn range_def() -> MultiPartitionsDefinition {
    MultiPartitionsDefinition::new([
        ("a", TimeWindowPartitions::daily("2024-01-01").unwrap().into()),
        ("b", static_def(&["1", "2", "3", "4", "5"])),
    ])
    .expect("valid definition")
}

fn drain(
    def: &MultiPartitionsDefinition,
    ctx: &PartitionLoadingContext<'_>,
    limit: usize,
    ascending: bool,
) -> Vec<String> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let PaginatedResults {
            results,
            cursor: next,
            has_more,
        } = def
            .get_paginated_partition_keys(ctx, limit, ascending, cursor.as_deref())
            .expect("page");
        all.extend(strings(results));
        cursor = next;
        if !has_more {
            return all;
        }
    }
}

#[test]
fn static_product_enumerates_first_dimension_slowest() {
    let def = MultiPartitionsDefinition::new([
        ("xyz", static_def(&["x", "y", "z"])),
        ("abc", static_def(&["a", "b", "c"])),
    ])
    .unwrap();
    let keys = strings(def.partition_keys(&ctx_at(2024, 1, 1)).unwrap());
    assert_eq!(
        keys,
        vec!["a|x", "a|y", "a|z", "b|x", "b|y", "b|z", "c|x", "c|y", "c|z"]
    );
}

#[test]
fn time_dimension_respects_effective_time() {
    let def = MultiPartitionsDefinition::new([
        ("date", TimeWindowPartitions::daily("2021-05-05").unwrap().into()),
        ("abc", static_def(&["a", "b", "c"])),
    ])
    .unwrap();
    let keys = def.partition_keys(&ctx_at(2021, 5, 7)).unwrap();
    let set: BTreeSet<String> = keys.iter().map(ToString::to_string).collect();
    let expected: BTreeSet<String> = [
        "a|2021-05-05",
        "b|2021-05-05",
        "c|2021-05-05",
        "a|2021-05-06",
        "b|2021-05-06",
        "c|2021-05-06",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(set, expected);
    assert_eq!(keys[0].dimension_key("date"), Some("2021-05-05"));
    assert_eq!(keys[0].dimension_key("abc"), Some("a"));
}

#[test]
fn has_partition_key_fails_closed() {
    let def = MultiPartitionsDefinition::new([
        ("dim1", static_def(&["a", "b", "c"])),
        ("dim2", static_def(&["1", "2", "3"])),
    ])
    .unwrap();
    let ctx = ctx_at(2024, 1, 1);
    for (key, expected) in [
        ("a|2", true),
        ("c|1", true),
        ("2|a", false),
        ("a|b", false),
        ("abc", false),
        ("super1@#^k-INVALID", false),
    ] {
        assert_eq!(def.has_partition_key(key, &ctx), expected, "{key}");
    }
}

#[test]
fn basic_pagination() {
    let def = dim_a_dim_b(&["a1", "a2", "a3"], &["b1", "b2"]);
    let ctx = ctx_at(2024, 1, 1);

    let first = def.get_paginated_partition_keys(&ctx, 3, true, None).unwrap();
    assert!(first.has_more);
    assert_eq!(strings(first.results), vec!["a1|b1", "a1|b2", "a2|b1"]);

    let second = def
        .get_paginated_partition_keys(&ctx, 3, true, first.cursor.as_deref())
        .unwrap();
    assert!(!second.has_more);
    assert_eq!(strings(second.results), vec!["a2|b2", "a3|b1", "a3|b2"]);
}

#[test]
fn reverse_pagination() {
    let def = dim_a_dim_b(&["a1", "a2", "a3"], &["b1", "b2"]);
    let ctx = ctx_at(2024, 1, 1);

    let first = def.get_paginated_partition_keys(&ctx, 3, false, None).unwrap();
    assert!(first.has_more);
    assert_eq!(strings(first.results), vec!["a3|b2", "a3|b1", "a2|b2"]);

    let second = def
        .get_paginated_partition_keys(&ctx, 3, false, first.cursor.as_deref())
        .unwrap();
    assert!(!second.has_more);
    assert_eq!(strings(second.results), vec!["a2|b1", "a1|b2", "a1|b1"]);
}

#[test]
fn pagination_accumulates_full_product_both_ways() {
    let def = dim_a_dim_b(&["a1", "a2", "a3", "a4"], &["b1", "b2", "b3", "b4", "b5"]);
    let ctx = ctx_at(2024, 1, 1);

    let forward = drain(&def, &ctx, 4, true);
    assert_eq!(forward.len(), 20);
    assert_eq!(forward, strings(def.partition_keys(&ctx).unwrap()));

    let mut reverse = drain(&def, &ctx, 4, false);
    assert_eq!(reverse.len(), 20);
    reverse.reverse();
    assert_eq!(reverse, forward);
}

#[test]
fn empty_dimension_yields_nothing() {
    let def = dim_a_dim_b(&["a1", "a2"], &[]);
    let page = def
        .get_paginated_partition_keys(&ctx_at(2024, 1, 1), 10, true, None)
        .unwrap();
    assert!(page.results.is_empty());
    assert!(!page.has_more);
    assert_eq!(def.num_partitions(&ctx_at(2024, 1, 1)).unwrap(), 0);
}

#[test]
fn large_product_pages_without_enumerating() {
    let a: Vec<String> = (0..1000).map(|i| format!("a{i}")).collect();
    let b: Vec<String> = (0..1000).map(|i| format!("b{i}")).collect();
    let def = MultiPartitionsDefinition::new([
        ("dim_a", PartitionsDefinition::static_keys(a).unwrap()),
        ("dim_b", PartitionsDefinition::static_keys(b).unwrap()),
    ])
    .unwrap();
    let ctx = ctx_at(2024, 1, 1);
    assert_eq!(def.num_partitions(&ctx).unwrap(), 1_000_000);

    let page = def.get_paginated_partition_keys(&ctx, 10, true, None).unwrap();
    assert_eq!(page.results.len(), 10);
    assert!(page.has_more);
    assert_eq!(page.results[9].as_str(), "a0|b9");

    let tail = def.get_paginated_partition_keys(&ctx, 2, false, None).unwrap();
    assert_eq!(strings(tail.results), vec!["a999|b999", "a999|b998"]);
}

#[test]
fn cursor_from_other_direction_is_rejected() {
    let def = dim_a_dim_b(&["a1", "a2"], &["b1", "b2"]);
    let ctx = ctx_at(2024, 1, 1);
    let page = def.get_paginated_partition_keys(&ctx, 1, true, None).unwrap();
    let err = def
        .get_paginated_partition_keys(&ctx, 1, false, page.cursor.as_deref())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidCursor { .. }));

    let other = MultiPartitionsDefinition::new([("solo", static_def(&["x"]))]).unwrap();
    let err = other
        .get_paginated_partition_keys(&ctx, 1, true, page.cursor.as_deref())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidCursor { .. }));
}

#[test]
fn range_with_single_key_in_secondary() {
    let keys = range_def()
        .get_partition_keys_in_range(
            &PartitionKeyRange::new("2024-01-01|2", "2024-01-03|2"),
            &ctx_at(2024, 2, 1),
        )
        .unwrap();
    assert_eq!(
        strings(keys),
        vec!["2024-01-01|2", "2024-01-02|2", "2024-01-03|2"]
    );
}

#[test]
fn range_with_single_key_in_primary() {
    let keys = range_def()
        .get_partition_keys_in_range(
            &PartitionKeyRange::new("2024-01-01|2", "2024-01-01|4"),
            &ctx_at(2024, 2, 1),
        )
        .unwrap();
    assert_eq!(
        strings(keys),
        vec!["2024-01-01|2", "2024-01-01|3", "2024-01-01|4"]
    );
}

#[test]
fn range_with_multiple_keys_in_both_dimensions() {
    let keys = range_def()
        .get_partition_keys_in_range(
            &PartitionKeyRange::new("2024-01-01|2", "2024-01-03|4"),
            &ctx_at(2024, 2, 1),
        )
        .unwrap();
    assert_eq!(
        strings(keys),
        vec![
            "2024-01-01|2",
            "2024-01-01|3",
            "2024-01-01|4",
            "2024-01-02|2",
            "2024-01-02|3",
            "2024-01-02|4",
            "2024-01-03|2",
            "2024-01-03|3",
            "2024-01-03|4",
        ]
    );
}

#[test]
fn range_endpoint_in_the_future_is_invalid() {
    let err = range_def()
        .get_partition_keys_in_range(
            &PartitionKeyRange::new("2024-01-01|2", "2024-03-01|2"),
            &ctx_at(2024, 2, 1),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRange { .. }));
}

#[test]
fn keys_with_dimension_value_over_time_and_static() {
    let def = date_static();
    let ctx = ctx_at(2015, 1, 5);
    assert_eq!(
        strings(def.keys_with_dimension_value("static", "a", &ctx).unwrap()),
        vec!["2015-01-01|a", "2015-01-02|a", "2015-01-03|a", "2015-01-04|a"]
    );
    assert_eq!(
        strings(def.keys_with_dimension_value("date", "2015-01-01", &ctx).unwrap()),
        vec!["2015-01-01|a", "2015-01-01|b", "2015-01-01|c", "2015-01-01|d"]
    );
}

#[test]
fn keys_with_dimension_value_with_dynamic() {
    let def = MultiPartitionsDefinition::new([
        ("date", TimeWindowPartitions::daily("2015-01-01").unwrap().into()),
        ("dynamic", PartitionsDefinition::dynamic("dummy")),
    ])
    .unwrap();
    let store = InMemoryDynamicPartitionsStore::new();
    let registered: Vec<String> = ["a", "b", "c", "d"].iter().map(ToString::to_string).collect();
    store.add_dynamic_partitions("dummy", &registered).unwrap();

    let ctx = ctx_at(2015, 1, 5).with_dynamic_partitions_store(&store);
    assert_eq!(
        strings(def.keys_with_dimension_value("dynamic", "a", &ctx).unwrap()),
        vec!["2015-01-01|a", "2015-01-02|a", "2015-01-03|a", "2015-01-04|a"]
    );
    assert_eq!(
        strings(def.keys_with_dimension_value("date", "2015-01-01", &ctx).unwrap()),
        vec!["2015-01-01|a", "2015-01-01|b", "2015-01-01|c", "2015-01-01|d"]
    );

    let err = def
        .keys_with_dimension_value("date", "2015-01-01", &ctx_at(2015, 1, 5))
        .unwrap_err();
    assert!(matches!(err, Error::Usage { .. }));
}

#[test]
fn num_partitions_matches_enumeration() {
    let def = date_static();
    let ctx = ctx_at(2015, 2, 1);
    let keys = def.partition_keys(&ctx).unwrap();
    let distinct: BTreeSet<MultiPartitionKey> = keys.iter().cloned().collect();
    assert_eq!(def.num_partitions(&ctx).unwrap(), distinct.len());
    assert_eq!(distinct.len(), 31 * 4);
}

#[test]
fn subset_backcompat_serialization() {
    let def = MultiPartitionsDefinition::new([
        ("abc", static_def(&["a", "b", "c"])),
        ("xyz", static_def(&["x", "y", "z"])),
    ])
    .unwrap();
    let expected = def.empty_subset().with_partition_keys(["a|x", "c|z"]).unwrap();

    let legacy = def.deserialize_subset(r#"["a|x", "c|z"]"#).unwrap();
    assert_eq!(legacy.get_partition_keys(), expected.get_partition_keys());

    let versioned = def
        .deserialize_subset(r#"{"version": 1, "subset": ["a|x", "c|z"]}"#)
        .unwrap();
    assert_eq!(versioned, expected);

    let round_trip = def.deserialize_subset(&expected.serialize().unwrap()).unwrap();
    assert_eq!(round_trip, expected);
}

#[test]
fn subset_equality_depends_on_members_only() {
    let def = date_static();
    let build = |keys: &[&str]| def.empty_subset().with_partition_keys(keys.iter().copied()).unwrap();

    assert_eq!(
        build(&["2015-01-01|a", "2015-01-05|b"]),
        build(&["2015-01-05|b", "2015-01-01|a"])
    );
    assert_ne!(
        build(&["2015-01-01|c", "2015-01-05|b"]),
        build(&["2015-01-01|a", "2015-01-05|b"])
    );
    assert_ne!(
        build(&["2015-01-01|a", "2015-01-05|b"]),
        build(&["2016-01-01|a", "2015-01-05|b"])
    );
}

/// Grid rows are static keys, columns are days from 2015-01-01; `+` marks a
/// member.
fn grid_keys(grid: &[&str]) -> Vec<String> {
    let statics = ["a", "b", "c", "d"];
    let mut keys = Vec::new();
    for (row, line) in grid.iter().enumerate() {
        for (col, mark) in line.chars().enumerate() {
            if mark == '+' {
                let day = at(2015, 1, 1) + chrono::TimeDelta::days(col as i64);
                keys.push(format!("{}|{}", day.format("%Y-%m-%d"), statics[row]));
            }
        }
    }
    keys
}

#[test]
fn subset_addition_and_keys_not_in_subset() {
    let cases: [([&str; 4], [&str; 4]); 4] = [
        (
            ["------", "+-----", "------", "------"],
            ["+-----", "+-----", "------", "------"],
        ),
        (
            ["+--+--", "------", "------", "------"],
            ["+-----", "------", "------", "------"],
        ),
        (
            ["+------", "-+-----", "-++--+-", "+-+++++"],
            ["-+-----", "-+-----", "+-+-+-+", "+++----"],
        ),
        (
            ["+-----+", "------+", "-+++---", "-------"],
            ["+++++++", "-+-+-+-", "-++----", "----+++"],
        ),
    ];
    let def = date_static();

    for (initial, added) in cases {
        let width = initial.iter().map(|row| row.len()).max().unwrap();
        let ctx = PartitionLoadingContext::new(
            at(2015, 1, 1) + chrono::TimeDelta::days(i64::try_from(width).unwrap()),
        );

        let initial_keys = grid_keys(&initial);
        let added_keys = grid_keys(&added);
        let initial_subset = def.empty_subset().with_partition_keys(&initial_keys).unwrap();
        let added_subset = initial_subset.with_partition_keys(&added_keys).unwrap();

        let members: BTreeSet<String> = added_subset.get_partition_keys().iter().map(ToString::to_string).collect();
        let expected_members: BTreeSet<String> =
            initial_keys.iter().chain(&added_keys).cloned().collect();
        assert_eq!(members, expected_members);

        let missing: BTreeSet<String> = added_subset
            .get_partition_keys_not_in_subset(&def, &ctx)
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        let all: BTreeSet<String> = strings(def.partition_keys(&ctx).unwrap()).into_iter().collect();
        let expected_missing: BTreeSet<String> = all.difference(&expected_members).cloned().collect();
        assert_eq!(missing, expected_missing);
        assert_eq!(missing.len() + members.len(), 4 * width);
    }
}

#[test]
fn dynamic_dimension_requires_store() {
    let def = MultiPartitionsDefinition::new([
        ("static", static_def(&["a"])),
        ("dynamic", PartitionsDefinition::dynamic("things")),
    ])
    .unwrap();
    let err = def
        .get_paginated_partition_keys(&ctx_at(2024, 1, 1), 5, true, None)
        .unwrap_err();
    assert!(err.to_string().contains("dynamic partitions store required"));
    assert!(!def.has_partition_key("1|a", &ctx_at(2024, 1, 1)));
}
