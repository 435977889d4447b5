//! Identity-based grouping and deduplication.

use crate::pipeline::Transform;
use crate::record::{Record, Value};
use crate::record;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Collect the whole input into groups of records sharing an identity, then
/// emit one `{ "id": <identity>, "rows": [<records>] }` record per group.
///
/// Groups come out in the order their identity was first seen, and records
/// keep their input order within a group.
pub fn group_by<F>(identifier: F) -> Transform
where
    F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
{
    Transform::new("group_by", move |input: Receiver<Record>, output: Sender<Record>| {
        let mut index: HashMap<Value, usize> = HashMap::new();
        let mut groups: Vec<(Value, Vec<Record>)> = Vec::new();
        for row in input.iter() {
            match index.entry(identifier(&row)?) {
                Entry::Occupied(slot) => groups[*slot.get()].1.push(row),
                Entry::Vacant(slot) => {
                    groups.push((slot.key().clone(), vec![row]));
                    slot.insert(groups.len() - 1);
                }
            }
        }
        debug!(groups = groups.len(), "input grouped");

        for (id, rows) in groups {
            output.send(record! { "id" => id, "rows" => rows })?;
        }
        Ok(())
    })
}

/// Pass through only the first record seen for each identity.
///
/// The set of seen identities belongs to the transform, so it is shared by
/// every concurrent run of it and lives as long as the transform does.
pub fn unique<F>(identifier: F) -> Transform
where
    F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
{
    let seen: Mutex<HashSet<Value>> = Mutex::new(HashSet::new());
    Transform::new("unique", move |input: Receiver<Record>, output: Sender<Record>| {
        for row in input.iter() {
            let id = identifier(&row)?;
            let first = seen.lock().unwrap_or_else(PoisonError::into_inner).insert(id);
            if first {
                output.send(row)?;
            }
        }
        Ok(())
    })
}
