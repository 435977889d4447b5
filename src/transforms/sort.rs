//! Sorting barriers.
//!
//! [`sort`] and [`stable_sort`] take a fallible "less than" comparator and stop
//! at the first comparator error. `stable_compressed_sort` (feature
//! `compressed-sort`) keeps records serialized while sorting by a typed key, to
//! hold large inputs in less memory.

use crate::pipeline::Transform;
use crate::record::Record;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

/// Sort the whole input with `less`. Equal records may be reordered.
pub fn sort<F>(less: F) -> Transform
where
    F: Fn(&Record, &Record) -> Result<bool> + Send + Sync + 'static,
{
    Transform::new("sort", move |input: Receiver<Record>, output: Sender<Record>| {
        let mut rows: Vec<Record> = input.iter().collect();
        debug!(rows = rows.len(), "sorting");
        try_heap_sort(&mut rows, &less)?;
        for row in rows {
            output.send(row)?;
        }
        Ok(())
    })
}

/// Sort the whole input with `less`, keeping equal records in input order.
pub fn stable_sort<F>(less: F) -> Transform
where
    F: Fn(&Record, &Record) -> Result<bool> + Send + Sync + 'static,
{
    Transform::new("stable_sort", move |input: Receiver<Record>, output: Sender<Record>| {
        let rows: Vec<Record> = input.iter().collect();
        debug!(rows = rows.len(), "stable sorting");
        for row in try_merge_sort(rows, &less)? {
            output.send(row)?;
        }
        Ok(())
    })
}

fn try_heap_sort<T, F>(v: &mut [T], less: &F) -> Result<()>
where
    F: Fn(&T, &T) -> Result<bool>,
{
    let n = v.len();
    for root in (0..n / 2).rev() {
        sift_down(v, root, n, less)?;
    }
    for end in (1..n).rev() {
        v.swap(0, end);
        sift_down(v, 0, end, less)?;
    }
    Ok(())
}

fn sift_down<T, F>(v: &mut [T], mut root: usize, end: usize, less: &F) -> Result<()>
where
    F: Fn(&T, &T) -> Result<bool>,
{
    loop {
        let mut child = 2 * root + 1;
        if child >= end {
            return Ok(());
        }
        if child + 1 < end && less(&v[child], &v[child + 1])? {
            child += 1;
        }
        if !less(&v[root], &v[child])? {
            return Ok(());
        }
        v.swap(root, child);
        root = child;
    }
}

fn try_merge_sort<T, F>(mut v: Vec<T>, less: &F) -> Result<Vec<T>>
where
    F: Fn(&T, &T) -> Result<bool>,
{
    if v.len() <= 1 {
        return Ok(v);
    }
    let right = v.split_off(v.len() / 2);
    let left = try_merge_sort(v, less)?;
    let right = try_merge_sort(right, less)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        // Ties go to the left run.
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => less(r, l)?,
            _ => break,
        };
        merged.extend(if take_right { right.next() } else { left.next() });
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

#[cfg(feature = "compressed-sort")]
pub use compressed::{SortKey, sort_key, stable_compressed_sort};

#[cfg(feature = "compressed-sort")]
mod compressed {
    use crate::pipeline::Transform;
    use crate::record::{Record, Value};
    use anyhow::{Result, anyhow};
    use crossbeam_channel::{Receiver, Sender};
    use ordered_float::OrderedFloat;
    use rayon::slice::ParallelSliceMut;
    use std::cmp::Ordering;
    use tracing::debug;

    /// A key [`stable_compressed_sort`] knows how to order.
    ///
    /// Integers and floats compare numerically with each other (an integer
    /// sorts before an equal float); every number sorts before every string.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum SortKey {
        Int(i64),
        Float(OrderedFloat<f64>),
        String(String),
    }

    impl TryFrom<Value> for SortKey {
        type Error = Value;

        fn try_from(value: Value) -> Result<Self, Value> {
            match value {
                Value::Int(i) => Ok(SortKey::Int(i)),
                Value::Float(f) => Ok(SortKey::Float(f)),
                Value::String(s) => Ok(SortKey::String(s)),
                other => Err(other),
            }
        }
    }

    impl Ord for SortKey {
        fn cmp(&self, other: &Self) -> Ordering {
            match (self, other) {
                (SortKey::Int(a), SortKey::Int(b)) => a.cmp(b),
                (SortKey::Float(a), SortKey::Float(b)) => a.cmp(b),
                (SortKey::Int(a), SortKey::Float(b)) => {
                    OrderedFloat(*a as f64).cmp(b).then(Ordering::Less)
                }
                (SortKey::Float(a), SortKey::Int(b)) => {
                    a.cmp(&OrderedFloat(*b as f64)).then(Ordering::Greater)
                }
                (SortKey::String(a), SortKey::String(b)) => a.cmp(b),
                (SortKey::String(_), _) => Ordering::Greater,
                (_, SortKey::String(_)) => Ordering::Less,
            }
        }
    }

    impl PartialOrd for SortKey {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    /// Key function for [`stable_compressed_sort`]: the value under `key`, with
    /// a missing or `Null` value treated as the empty string.
    pub fn sort_key(key: &str) -> impl Fn(&Record) -> Result<Value> + Send + Sync + use<> {
        let key = key.to_string();
        move |row: &Record| match row.get(&key) {
            None | Some(Value::Null) => Ok(Value::from("")),
            Some(value) => Ok(value.clone()),
        }
    }

    /// Stable sort by `get_key`, holding each record serialized (postcard) until
    /// it is emitted.
    ///
    /// # Panics
    /// A key that is not an int, a float or a string is a programming error:
    /// the stage panics, and the panic surfaces from the consuming table's
    /// `err()`.
    pub fn stable_compressed_sort<F>(get_key: F) -> Transform
    where
        F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    {
        Transform::new(
            "stable_compressed_sort",
            move |input: Receiver<Record>, output: Sender<Record>| {
                let mut entries: Vec<(SortKey, Vec<u8>)> = Vec::new();
                for row in input.iter() {
                    let key = SortKey::try_from(get_key(&row)?).unwrap_or_else(|other| {
                        panic!(
                            "unsupported sort key type {}: keys must be int, float or string",
                            other.kind()
                        )
                    });
                    let blob = postcard::to_allocvec(&row)
                        .map_err(|e| anyhow!("failed to compress record: {e}"))?;
                    entries.push((key, blob));
                }
                debug!(rows = entries.len(), "compressed sorting");

                entries.par_sort_by(|a, b| a.0.cmp(&b.0));
                for (_, blob) in entries {
                    let row: Record = postcard::from_bytes(&blob)
                        .map_err(|e| anyhow!("failed to decompress record: {e}"))?;
                    output.send(row)?;
                }
                Ok(())
            },
        )
    }

}
