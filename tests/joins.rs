// tests/joins.rs
mod common;

use anyhow::{Result, anyhow, bail};
use std::sync::Arc;
use std::time::Duration;
use tablestream::testing::*;
use tablestream::transforms::*;
use tablestream::*;

fn paired(left: Option<Record>, right: Option<Record>) -> Record {
    let mut r = Record::new();
    if let Some(l) = left {
        r.insert(LEFT, l);
    }
    if let Some(rt) = right {
        r.insert(RIGHT, rt);
    }
    r
}

fn run_pair(
    left: Vec<Record>,
    right: Vec<Record>,
    filter: fn(&Record) -> Result<bool>,
) -> TableResult<Vec<Record>> {
    let table = transform(
        from_vec(left),
        pair(from_vec(right), key_identifier("k"), key_identifier("k"), filter),
    );
    collect(&table)
}

#[test]
fn inner_join_pairs_every_match_in_right_order() -> Result<()> {
    common::init_logging();
    let out = run_pair(
        vec![record! { "k" => 1, "a" => 1 }],
        vec![record! { "k" => 1, "b" => 1 }, record! { "k" => 1, "b" => 2 }],
        inner_join,
    )?;
    assert_eq!(
        out,
        vec![
            paired(Some(record! { "k" => 1, "a" => 1 }), Some(record! { "k" => 1, "b" => 1 })),
            paired(Some(record! { "k" => 1, "a" => 1 }), Some(record! { "k" => 1, "b" => 2 })),
        ]
    );
    Ok(())
}

#[test]
fn outer_join_keeps_both_unmatched_sides() -> Result<()> {
    let out = run_pair(vec![record! { "k" => 1 }], vec![record! { "k" => 2 }], outer_join)?;
    assert_eq!(
        out,
        vec![
            paired(Some(record! { "k" => 1 }), None),
            paired(None, Some(record! { "k" => 2 })),
        ]
    );
    Ok(())
}

#[test]
fn left_and_right_join_presets() -> Result<()> {
    let left = vec![record! { "k" => 1, "l" => "x" }, record! { "k" => 2, "l" => "y" }];
    let right = vec![record! { "k" => 1, "r" => "p" }, record! { "k" => 3, "r" => "q" }];

    let out = run_pair(left.clone(), right.clone(), left_join)?;
    assert_eq!(
        out,
        vec![
            paired(Some(left[0].clone()), Some(right[0].clone())),
            paired(Some(left[1].clone()), None),
        ]
    );

    let out = run_pair(left.clone(), right.clone(), right_join)?;
    assert_eq!(
        out,
        vec![
            paired(Some(left[0].clone()), Some(right[0].clone())),
            paired(None, Some(right[1].clone())),
        ]
    );
    Ok(())
}

#[test]
fn many_to_many_produces_cross_product() -> Result<()> {
    let left = vec![record! { "k" => "a", "l" => 1 }, record! { "k" => "a", "l" => 2 }];
    let right = vec![
        record! { "k" => "a", "r" => 1 },
        record! { "k" => "a", "r" => 2 },
        record! { "k" => "a", "r" => 3 },
    ];
    let out = run_pair(left, right, inner_join)?;
    assert_eq!(out.len(), 6);
    Ok(())
}

#[test]
fn null_identities_never_match() -> Result<()> {
    let left = vec![record! { "other" => 1 }];
    let right = vec![record! { "other" => 2 }, record! { "k" => 5 }];
    let out = run_pair(left, right, outer_join)?;
    assert_eq!(
        out,
        vec![
            paired(Some(record! { "other" => 1 }), None),
            paired(None, Some(record! { "other" => 2 })),
            paired(None, Some(record! { "k" => 5 })),
        ]
    );
    Ok(())
}

#[test]
fn unmatched_right_records_follow_right_order() -> Result<()> {
    let right: Vec<Record> = [3, 1, 2, 1, 4].iter().map(|k| record! { "k" => *k }).collect();
    let out = run_pair(vec![record! { "k" => 2 }], right, right_join)?;
    let tail: Vec<Record> = out[1..]
        .iter()
        .filter_map(|p| p.get(RIGHT).and_then(Value::as_record).cloned())
        .collect();
    assert_eq!(
        tail,
        vec![record! { "k" => 3 }, record! { "k" => 1 }, record! { "k" => 1 }, record! { "k" => 4 }]
    );
    Ok(())
}

#[test]
fn join_merges_with_right_winning() -> Result<()> {
    let right = from_vec(vec![record! { "id" => 1, "name" => "right", "extra" => true }]);
    let left = from_vec(vec![record! { "uid" => 1, "name" => "left" }, record! { "uid" => 9 }]);
    let table = transform(left, join(right, "uid", "id", JoinType::Left));
    assert_eq!(
        collect(&table)?,
        vec![
            record! { "uid" => 1, "id" => 1, "name" => "right", "extra" => true },
            record! { "uid" => 9 },
        ]
    );
    Ok(())
}

#[test]
fn join_types_match_their_filters() {
    let both = paired(Some(Record::new()), Some(Record::new()));
    let left_only = paired(Some(Record::new()), None);
    let right_only = paired(None, Some(Record::new()));
    for (join_type, expected) in [
        (JoinType::Left, [true, true, false]),
        (JoinType::Right, [true, false, true]),
        (JoinType::Inner, [true, false, false]),
        (JoinType::Outer, [true, true, true]),
    ] {
        let got = [&both, &left_only, &right_only].map(|p| join_type.keeps(p));
        assert_eq!(got, expected, "{join_type:?}");
    }
}

#[test]
fn errored_right_table_fails_join_and_releases_both_sides() {
    let left = TrackedSource::infinite();
    let right = errored(anyhow!("garbage error"));
    let table = transform(
        left.clone(),
        pair(Arc::clone(&right), key_identifier("k"), key_identifier("k"), inner_join),
    );
    let err = discard(&table).unwrap_err();
    assert_eq!(err.to_string(), "garbage error");
    assert_consumed(&*left);
    assert_consumed(&right);
    assert!(left.wait_finished(Duration::from_secs(10)));
}

#[test]
fn right_identity_error_stops_right_table() {
    let right = TrackedSource::infinite();
    let table = transform(
        from_vec(vec![record! { "k" => 1 }]),
        pair(
            right.clone(),
            key_identifier("k"),
            |_: &Record| -> Result<Value> { bail!("no right identity") },
            inner_join,
        ),
    );
    assert_eq!(discard(&table).unwrap_err().to_string(), "no right identity");
    assert_consumed(&*right);
    assert!(right.wait_finished(Duration::from_secs(10)));
}

#[test]
fn left_identity_error_drains_left_input() {
    let left = TrackedSource::infinite();
    let table = transform(
        left.clone(),
        pair(
            from_vec(vec![record! { "k" => 1 }]),
            |_: &Record| -> Result<Value> { bail!("no left identity") },
            key_identifier("k"),
            inner_join,
        ),
    );
    assert_eq!(discard(&table).unwrap_err().to_string(), "no left identity");
    assert_consumed(&*left);
}

#[test]
fn filter_errors_abort_the_pairing() {
    let table = transform(
        from_vec(vec![record! { "k" => 1 }]),
        pair(
            from_vec(vec![record! { "k" => 1 }]),
            key_identifier("k"),
            key_identifier("k"),
            |_: &Record| -> Result<bool> { bail!("bad filter") },
        ),
    );
    assert_eq!(discard(&table).unwrap_err().to_string(), "bad filter");
}

#[test]
fn composite_identities_join_on_several_keys() -> Result<()> {
    let right = from_vec(vec![
        record! { "a" => 1, "b" => 1, "hit" => "1/1" },
        record! { "a" => 1, "b" => 2, "hit" => "1/2" },
    ]);
    let table = transform(
        from_vec(vec![record! { "a" => 1, "b" => 2 }]),
        pair(right, keys_identifier(&["a", "b"]), keys_identifier(&["a", "b"]), inner_join),
    );
    let out = collect(&table)?;
    assert_eq!(out.len(), 1);
    let hit = out[0].get(RIGHT).and_then(Value::as_record).and_then(|r| r.get("hit")).cloned();
    assert_eq!(hit, Some(Value::from("1/2")));
    Ok(())
}

#[test]
fn stopping_a_pair_stops_an_endless_right_table() {
    let right = TrackedSource::infinite();
    let table = transform(
        from_vec(vec![record! { "k" => 1 }]),
        pair(right.clone(), key_identifier("k"), key_identifier("k"), inner_join),
    );
    assert_stops(&*table);
    assert!(table.err().is_none());
    assert!(right.wait_finished(Duration::from_secs(10)));
}

#[test]
fn stopping_a_join_stops_an_endless_right_table() {
    let right = TrackedSource::infinite();
    let table = transform(
        TrackedSource::infinite(),
        join(right.clone(), "k", "k", JoinType::Left),
    );
    assert_stops(&*table);
    assert!(table.err().is_none());
    assert!(right.wait_finished(Duration::from_secs(10)));
}
