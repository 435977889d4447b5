//! The transform library.
//!
//! Every constructor returns a [`Transform`] that can be handed to
//! [`transform`](crate::transform) or chained through a
//! [`Transformer`](crate::Transformer).
//!
//! ## Streaming (one record in, zero or more out, order preserved)
//! - [`table_transform`] - arbitrary per-record emission
//! - [`select`] - keep records passing a predicate
//! - [`map`] - one-to-one rewrite
//! - [`each`] - side effect, records pass through
//! - [`fieldmap`] / [`safe_fieldmap`] - rename and project keys
//! - [`valuemap`] - per-field value substitution
//! - [`concat`] - append other tables after the input
//! - [`unique`] - drop records whose identity was already seen
//!
//! ## Barriers (consume everything before emitting)
//! - [`reduce`] - fold into a single record
//! - [`group_by`] - one record per identity
//! - [`sort`], [`stable_sort`], `stable_compressed_sort`
//!
//! ## Composite
//! - [`pair`] / [`join`] - hash join against a second table
//! - [`concurrently`] - competing-consumer fan-out
//! - [`bypass`] - route a subset of records around a nested chain

mod concurrent;
mod group;
mod pair;
mod sort;

pub use concurrent::{concurrently, concurrently_default};
pub use group::{group_by, unique};
pub use pair::{
    JoinType, LEFT, RIGHT, inner_join, join, left_join, merge_pairing, outer_join, pair,
    right_join,
};
#[cfg(feature = "compressed-sort")]
pub use sort::{SortKey, sort_key, stable_compressed_sort};
pub use sort::{sort, stable_sort};

use crate::config::EngineConfig;
use crate::pipeline::{self, Transform};
use crate::record::{Record, Value};
use crate::sources::from_channel;
use crate::table::{Table, TableRef};
use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::collections::HashMap;
use std::panic;

/// Identity of a record: the value stored under `key`, or `Null` when absent.
pub fn key_identifier(key: &str) -> impl Fn(&Record) -> Result<Value> + Send + Sync + use<> {
    let key = key.to_string();
    move |row: &Record| Ok(row.get(&key).cloned().unwrap_or_default())
}

/// Identity of a record: the list of values stored under each of `keys`.
pub fn keys_identifier(keys: &[&str]) -> impl Fn(&Record) -> Result<Value> + Send + Sync + use<> {
    let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    move |row: &Record| {
        Ok(Value::List(
            keys.iter()
                .map(|k| row.get(k).cloned().unwrap_or_default())
                .collect(),
        ))
    }
}

fn per_record<F>(name: &'static str, f: F) -> Transform
where
    F: Fn(Record, &Sender<Record>) -> Result<()> + Send + Sync + 'static,
{
    Transform::new(name, move |input: Receiver<Record>, output: Sender<Record>| {
        for row in input.iter() {
            f(row, &output)?;
        }
        Ok(())
    })
}

/// Apply `f` to every record; `f` may send any number of records to the output.
pub fn table_transform<F>(f: F) -> Transform
where
    F: Fn(Record, &Sender<Record>) -> Result<()> + Send + Sync + 'static,
{
    per_record("table_transform", f)
}

/// Keep only the records for which `filter` returns `true`.
pub fn select<F>(filter: F) -> Transform
where
    F: Fn(&Record) -> Result<bool> + Send + Sync + 'static,
{
    per_record("select", move |row, output| {
        if filter(&row)? {
            output.send(row)?;
        }
        Ok(())
    })
}

/// Replace every record with the result of `f`.
pub fn map<F>(f: F) -> Transform
where
    F: Fn(Record) -> Result<Record> + Send + Sync + 'static,
{
    per_record("map", move |row, output| {
        output.send(f(row)?)?;
        Ok(())
    })
}

/// Call `f` on every record and pass the record through unchanged.
pub fn each<F>(f: F) -> Transform
where
    F: Fn(&Record) -> Result<()> + Send + Sync + 'static,
{
    per_record("each", move |row, output| {
        f(&row)?;
        output.send(row)?;
        Ok(())
    })
}

fn collect_mappings<M, K, T>(mappings: M) -> Vec<(String, Vec<String>)>
where
    M: IntoIterator<Item = (K, Vec<T>)>,
    K: Into<String>,
    T: Into<String>,
{
    mappings
        .into_iter()
        .map(|(k, targets)| (k.into(), targets.into_iter().map(Into::into).collect()))
        .collect()
}

/// Rename and project keys: each source key is copied to every one of its
/// target keys. Unmapped keys are dropped; mappings whose source key is absent
/// are ignored.
///
/// ```
/// use tablestream::{collect, from_vec, record, transform};
/// use tablestream::transforms::fieldmap;
///
/// let out = transform(from_vec(vec![record! { "a" => 1, "c" => 2 }]), fieldmap([("a", vec!["b"])]));
/// assert_eq!(collect(&out).unwrap(), vec![record! { "b" => 1 }]);
/// ```
pub fn fieldmap<M, K, T>(mappings: M) -> Transform
where
    M: IntoIterator<Item = (K, Vec<T>)>,
    K: Into<String>,
    T: Into<String>,
{
    let mappings = collect_mappings(mappings);
    per_record("fieldmap", move |row, output| {
        let mut mapped = Record::new();
        for (source, targets) in &mappings {
            if let Some(value) = row.get(source) {
                for target in targets {
                    mapped.insert(target.clone(), value.clone());
                }
            }
        }
        output.send(mapped)?;
        Ok(())
    })
}

/// Like [`fieldmap`], but fails if two mappings write the same target key of
/// one record.
pub fn safe_fieldmap<M, K, T>(mappings: M) -> Transform
where
    M: IntoIterator<Item = (K, Vec<T>)>,
    K: Into<String>,
    T: Into<String>,
{
    let mappings = collect_mappings(mappings);
    per_record("safe_fieldmap", move |row, output| {
        let mut mapped = Record::new();
        for (source, targets) in &mappings {
            if let Some(value) = row.get(source) {
                for target in targets {
                    if mapped.insert(target.clone(), value.clone()).is_some() {
                        bail!("multiple mappings to the same key {target}");
                    }
                }
            }
        }
        output.send(mapped)?;
        Ok(())
    })
}

/// Substitute values per field through a lookup table. Values with no entry
/// pass through unchanged.
pub fn valuemap(mappings: HashMap<String, HashMap<Value, Value>>) -> Transform {
    per_record("valuemap", move |row, output| {
        let mapped: Record = row
            .into_iter()
            .map(|(key, value)| {
                let replacement = mappings.get(&key).and_then(|m| m.get(&value)).cloned();
                (key, replacement.unwrap_or(value))
            })
            .collect();
        output.send(mapped)?;
        Ok(())
    })
}

/// Fold every record into one accumulator, starting from an empty record.
///
/// Exactly one record is emitted, **even for empty input**: an empty input
/// produces a single empty record.
pub fn reduce<F>(fold: F) -> Transform
where
    F: Fn(&mut Record, Record) -> Result<()> + Send + Sync + 'static,
{
    Transform::new("reduce", move |input: Receiver<Record>, output: Sender<Record>| {
        let mut acc = Record::new();
        for row in input.iter() {
            fold(&mut acc, row)?;
        }
        output.send(acc)?;
        Ok(())
    })
}

/// Emit the input, then every record of each table in `tables`, in order.
///
/// The first appended table to fail ends the stage with its error; tables after
/// it are stopped and drained. The appended tables are side inputs of the
/// stage, so stopping the stage stops them.
pub fn concat(tables: Vec<TableRef>) -> Transform {
    let inputs = tables.clone();
    Transform::new("concat", move |input: Receiver<Record>, output: Sender<Record>| {
        for row in input.iter() {
            output.send(row)?;
        }
        for (i, table) in tables.iter().enumerate() {
            for row in table.rows() {
                output.send(row)?;
            }
            if let Some(err) = table.err() {
                for rest in &tables[i + 1..] {
                    rest.stop();
                    rest.rows().drain();
                }
                return Err(err.into());
            }
        }
        Ok(())
    })
    .with_inputs(inputs)
}

/// Send records matching `do_bypass` straight to the output and run the rest
/// through `transforms`, chained in order.
///
/// No ordering is guaranteed between bypassed and processed records. The
/// nested stages use the outer stage's [`EngineConfig`], and their side inputs
/// become side inputs of the outer stage.
pub fn bypass<P>(do_bypass: P, transforms: Vec<Transform>) -> Transform
where
    P: Fn(&Record) -> bool + Send + Sync + 'static,
{
    let inputs: Vec<TableRef> = transforms.iter().flat_map(|t| t.inputs().to_vec()).collect();
    Transform::new("bypass", move |input: Receiver<Record>, output: Sender<Record>| {
        let config = EngineConfig::current();
        let (feed, nested_input) = bounded(0);
        let nested = transforms.iter().cloned().fold(from_channel(nested_input), |table, t| {
            pipeline::transform_with(table, t, &config)
        });

        std::thread::scope(|s| {
            let forwarder = s.spawn(|| -> Result<()> {
                for row in nested.rows() {
                    output.send(row)?;
                }
                match nested.err() {
                    Some(err) => Err(err.into()),
                    None => Ok(()),
                }
            });

            let fed = (|| -> Result<()> {
                for row in input.iter() {
                    if do_bypass(&row) {
                        output.send(row)?;
                    } else {
                        feed.send(row)?;
                    }
                }
                Ok(())
            })();
            drop(feed);

            let forwarded = forwarder.join().unwrap_or_else(|p| panic::resume_unwind(p));
            fed.and(forwarded)
        })
    })
    .with_inputs(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn key_identifier_defaults_to_null() -> Result<()> {
        let id = key_identifier("k");
        assert_eq!(id(&record! { "k" => 3 })?, Value::Int(3));
        assert_eq!(id(&record! { "other" => 3 })?, Value::Null);
        Ok(())
    }

    #[test]
    fn keys_identifier_builds_lists() -> Result<()> {
        let id = keys_identifier(&["a", "b"]);
        assert_eq!(
            id(&record! { "a" => 1, "c" => 2 })?,
            Value::List(vec![Value::Int(1), Value::Null])
        );
        Ok(())
    }
}
