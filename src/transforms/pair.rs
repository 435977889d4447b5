//! Hash-join style pairing of the input against a second table.
//!
//! The right table is materialized into identity buckets (it must fit in
//! memory); the input is then streamed and each record is paired with every
//! right record sharing its identity. A pairing is a record with a `left` and/or
//! `right` key holding the original records.
//!
//! A `Null` identity never matches anything, on either side.

use crate::pipeline::Transform;
use crate::record::{Record, Value};
use crate::table::{Table, TableRef};
use crate::transforms::key_identifier;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::debug;

/// Key holding the left record of a pairing.
pub const LEFT: &str = "left";
/// Key holding the right record of a pairing.
pub const RIGHT: &str = "right";

/// Which pairings a [`join`] keeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// Every left record, matched or not.
    Left,
    /// Every right record, matched or not.
    Right,
    /// Only matched pairs.
    Inner,
    /// Everything.
    Outer,
}

impl JoinType {
    /// Whether a pairing survives this join type.
    pub fn keeps(self, pairing: &Record) -> bool {
        let (left, right) = (pairing.contains_key(LEFT), pairing.contains_key(RIGHT));
        match self {
            JoinType::Left => left,
            JoinType::Right => right,
            JoinType::Inner => left && right,
            JoinType::Outer => true,
        }
    }
}

/// Pairing filter for a left join.
pub fn left_join(pairing: &Record) -> Result<bool> {
    Ok(JoinType::Left.keeps(pairing))
}

/// Pairing filter for a right join.
pub fn right_join(pairing: &Record) -> Result<bool> {
    Ok(JoinType::Right.keeps(pairing))
}

/// Pairing filter for an inner join.
pub fn inner_join(pairing: &Record) -> Result<bool> {
    Ok(JoinType::Inner.keeps(pairing))
}

/// Pairing filter for an outer join.
pub fn outer_join(pairing: &Record) -> Result<bool> {
    Ok(JoinType::Outer.keeps(pairing))
}

/// Flatten a pairing into one record: the left record's keys, overwritten by
/// the right record's on conflict.
pub fn merge_pairing(mut pairing: Record) -> Record {
    let mut merged = Record::new();
    for side in [LEFT, RIGHT] {
        if let Some(Value::Record(row)) = pairing.remove(side) {
            merged.merge(row);
        }
    }
    merged
}

/// Pair every input record with the records of `right` that share its
/// identity, and emit the pairings `filter` accepts.
///
/// `right` is a side input of the stage: stopping the stage stops it too.
///
/// Emission order: for each input record, in input order, its matches in the
/// order the right table produced them (or the lone left pairing when nothing
/// matched); then every right record that was never matched, in the order the
/// right table produced them.
///
/// # Errors
/// Fails with the first error from either identity function, from `filter`, or
/// from the right table itself.
pub fn pair<L, R, F>(right: TableRef, left_id: L, right_id: R, filter: F) -> Transform
where
    L: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    R: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    F: Fn(&Record) -> Result<bool> + Send + Sync + 'static,
{
    let pairer = Pairer { right: right.clone(), left_id, right_id };
    Transform::new("pair", move |input: Receiver<Record>, output: Sender<Record>| {
        pairer.run(input, |pairing| {
            if filter(&pairing)? {
                output.send(pairing)?;
            }
            Ok(())
        })
    })
    .with_inputs([right])
}

/// Join the input with `right` on `left_key == right_key`, merging each kept
/// pairing with [`merge_pairing`].
///
/// ```
/// use tablestream::{collect, from_vec, record, transform};
/// use tablestream::transforms::{join, JoinType};
///
/// let right = from_vec(vec![record! { "id" => 1, "name" => "ada" }]);
/// let left = from_vec(vec![record! { "id" => 1, "age" => 36 }, record! { "id" => 2 }]);
/// let joined = transform(left, join(right, "id", "id", JoinType::Inner));
/// assert_eq!(collect(&joined).unwrap(), vec![record! { "id" => 1, "age" => 36, "name" => "ada" }]);
/// ```
pub fn join(right: TableRef, left_key: &str, right_key: &str, join_type: JoinType) -> Transform {
    let pairer = Pairer {
        right: right.clone(),
        left_id: key_identifier(left_key),
        right_id: key_identifier(right_key),
    };
    Transform::new("join", move |input: Receiver<Record>, output: Sender<Record>| {
        pairer.run(input, |pairing| {
            if join_type.keeps(&pairing) {
                output.send(merge_pairing(pairing))?;
            }
            Ok(())
        })
    })
    .with_inputs([right])
}

struct Pairer<L, R> {
    right: TableRef,
    left_id: L,
    right_id: R,
}

// Right records sharing one identity, tagged with their production order.
struct Bucket {
    rows: Vec<(usize, Record)>,
    matched: bool,
}

impl<L, R> Pairer<L, R>
where
    L: Fn(&Record) -> Result<Value>,
    R: Fn(&Record) -> Result<Value>,
{
    fn run<E>(&self, input: Receiver<Record>, mut emit: E) -> Result<()>
    where
        E: FnMut(Record) -> Result<()>,
    {
        let (index, mut buckets, unkeyed) = self.materialize()?;
        debug!(buckets = buckets.len(), unkeyed = unkeyed.len(), "right side materialized");

        for left in input.iter() {
            let id = (self.left_id)(&left)?;
            let slot = if id.is_null() { None } else { index.get(&id).copied() };
            match slot {
                Some(slot) => {
                    let bucket = &mut buckets[slot];
                    bucket.matched = true;
                    for (_, right) in &bucket.rows {
                        emit(pairing(Some(left.clone()), Some(right.clone())))?;
                    }
                }
                None => emit(pairing(Some(left), None))?,
            }
        }

        // Null-keyed right records never match; they come out in production
        // order alongside the unmatched buckets.
        let mut unmatched = unkeyed;
        for bucket in buckets.into_iter().filter(|b| !b.matched) {
            unmatched.extend(bucket.rows);
        }
        unmatched.sort_by_key(|(seq, _)| *seq);
        for (_, right) in unmatched {
            emit(pairing(None, Some(right)))?;
        }
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn materialize(&self) -> Result<(HashMap<Value, usize>, Vec<Bucket>, Vec<(usize, Record)>)> {
        let mut index: HashMap<Value, usize> = HashMap::new();
        let mut buckets: Vec<Bucket> = Vec::new();
        let mut unkeyed = Vec::new();

        let mut rows = self.right.rows();
        let mut seq = 0;
        while let Some(row) = rows.next() {
            seq += 1;
            let id = match (self.right_id)(&row) {
                Ok(id) => id,
                Err(err) => {
                    self.right.stop();
                    rows.drain();
                    return Err(err);
                }
            };
            if id.is_null() {
                unkeyed.push((seq, row));
                continue;
            }
            match index.entry(id) {
                Entry::Occupied(slot) => buckets[*slot.get()].rows.push((seq, row)),
                Entry::Vacant(slot) => {
                    slot.insert(buckets.len());
                    buckets.push(Bucket { rows: vec![(seq, row)], matched: false });
                }
            }
        }
        if let Some(err) = self.right.err() {
            return Err(err.into());
        }
        Ok((index, buckets, unkeyed))
    }
}

fn pairing(left: Option<Record>, right: Option<Record>) -> Record {
    let mut pairing = Record::new();
    if let Some(left) = left {
        pairing.insert(LEFT, left);
    }
    if let Some(right) = right {
        pairing.insert(RIGHT, right);
    }
    pairing
}
