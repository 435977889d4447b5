// tests/grouping.rs
mod common;

use anyhow::{Result, bail};
use tablestream::testing::*;
use tablestream::transforms::*;
use tablestream::*;

#[test]
fn group_by_collects_rows_per_identity() -> Result<()> {
    common::init_logging();
    let table = transform(
        from_vec(vec![
            record! { "g" => "a", "v" => 1 },
            record! { "g" => "b", "v" => 2 },
            record! { "g" => "a", "v" => 3 },
        ]),
        group_by(key_identifier("g")),
    );
    let groups = collect(&table)?;
    assert_eq!(groups.len(), 2);
    assert_rows_unordered_eq(
        groups,
        vec![
            record! {
                "id" => "a",
                "rows" => vec![record! { "g" => "a", "v" => 1 }, record! { "g" => "a", "v" => 3 }],
            },
            record! { "id" => "b", "rows" => vec![record! { "g" => "b", "v" => 2 }] },
        ],
    );
    Ok(())
}

#[test]
fn group_by_emits_groups_in_first_seen_order() -> Result<()> {
    let rows: Vec<Record> = [5, 3, 5, 1, 3].iter().map(|g| record! { "g" => *g }).collect();
    let table = transform(from_vec(rows), group_by(key_identifier("g")));
    let ids: Vec<Value> = collect(&table)?.iter().filter_map(|r| r.get("id").cloned()).collect();
    assert_eq!(ids, vec![Value::Int(5), Value::Int(3), Value::Int(1)]);
    Ok(())
}

#[test]
fn group_by_missing_key_groups_under_null() -> Result<()> {
    let table = transform(
        from_vec(vec![record! { "x" => 1 }, record! { "x" => 2 }]),
        group_by(key_identifier("g")),
    );
    let groups = collect(&table)?;
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].get("id"), Some(&Value::Null));
    Ok(())
}

#[test]
fn group_by_on_empty_input_emits_nothing() -> Result<()> {
    let table = transform(from_vec(vec![]), group_by(key_identifier("g")));
    assert!(collect(&table)?.is_empty());
    Ok(())
}

#[test]
fn group_by_identifier_error_aborts() {
    let source = TrackedSource::infinite();
    let table = transform(
        source.clone(),
        group_by(|_: &Record| -> Result<Value> { bail!("no identity") }),
    );
    assert_eq!(discard(&table).unwrap_err().to_string(), "no identity");
    assert_consumed(&*source);
}

#[test]
fn unique_keeps_first_occurrence() -> Result<()> {
    let table = transform(
        from_vec(vec![
            record! { "id" => 1, "seq" => 0 },
            record! { "id" => 2, "seq" => 1 },
            record! { "id" => 1, "seq" => 2 },
            record! { "id" => 3, "seq" => 3 },
            record! { "id" => 2, "seq" => 4 },
        ]),
        unique(key_identifier("id")),
    );
    let seqs: Vec<i64> = collect(&table)?
        .iter()
        .filter_map(|r| r.get("seq").and_then(Value::as_i64))
        .collect();
    assert_eq!(seqs, vec![0, 1, 3]);
    Ok(())
}

#[test]
fn unique_remembers_identities_across_runs() -> Result<()> {
    let dedupe = unique(key_identifier("id"));
    let first = transform(from_vec(vec![record! { "id" => 1 }]), dedupe.clone());
    assert_eq!(collect(&first)?.len(), 1);
    let second = transform(from_vec(vec![record! { "id" => 1 }, record! { "id" => 2 }]), dedupe);
    assert_eq!(collect(&second)?, vec![record! { "id" => 2 }]);
    Ok(())
}

#[test]
fn unique_identifier_error_aborts() {
    let table = transform(
        from_vec(vec![record! { "id" => 1 }]),
        unique(|_: &Record| -> Result<Value> { bail!("unhashable") }),
    );
    assert_eq!(discard(&table).unwrap_err().to_string(), "unhashable");
}
