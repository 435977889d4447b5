//! In-memory sources.
//!
//! Concrete format adapters live outside this crate; these sources exist to feed
//! pipelines from Rust values, to compose pipelines inside transforms, and to
//! exercise the table contract in tests.
//!
//! - [`from_vec`] / [`from_iter`] - finite sources
//! - [`from_results`] - a source whose producer can fail
//! - [`infinite`] - an endless stream of empty records
//! - [`errored`] - an empty table that reports an error
//! - [`from_channel`] - a table over a caller-fed channel

use crate::error::TableError;
use crate::record::Record;
use crate::table::{Rows, StopFlag, Table, TableRef};
use crossbeam_channel::{Receiver, bounded};
use std::sync::{Arc, OnceLock};
use tracing::trace;

/// A table fed by a producer thread draining an iterator.
pub struct IterTable {
    rows: Receiver<Record>,
    stop: StopFlag,
    err: Arc<OnceLock<TableError>>,
}

impl IterTable {
    /// Spawn a producer over `iter`. The first `Err` ends the sequence and
    /// becomes the table's [`TableError::Source`].
    ///
    /// # Panics
    /// Panics if the producer thread cannot be spawned.
    pub fn spawn<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = anyhow::Result<Record>>,
        I::IntoIter: Send + 'static,
    {
        let (tx, rx) = bounded(0);
        let stop = StopFlag::new();
        let err = Arc::new(OnceLock::new());
        let iter = iter.into_iter();
        {
            let stop = stop.clone();
            let err = Arc::clone(&err);
            std::thread::Builder::new()
                .name("tablestream-source".to_string())
                .spawn(move || {
                    for item in iter {
                        if stop.is_stopped() {
                            trace!("source stopped");
                            break;
                        }
                        match item {
                            Ok(row) => {
                                if tx.send(row).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                let _ = err.set(TableError::from_source(e));
                                break;
                            }
                        }
                    }
                })
                .expect("failed to spawn source thread");
        }
        Self { rows: rx, stop, err }
    }
}

impl Table for IterTable {
    fn rows(&self) -> Rows {
        Rows::new(self.rows.clone(), self.stop.clone())
    }

    fn err(&self) -> Option<TableError> {
        self.err.get().cloned()
    }

    fn stop(&self) {
        self.stop.trigger();
    }
}

/// A table over every record in `rows`.
pub fn from_vec(rows: Vec<Record>) -> TableRef {
    from_iter(rows)
}

/// A table over every record produced by `iter`.
pub fn from_iter<I>(iter: I) -> TableRef
where
    I: IntoIterator<Item = Record>,
    I::IntoIter: Send + 'static,
{
    Arc::new(IterTable::spawn(iter.into_iter().map(Ok)))
}

/// A table over fallible records; the first error ends the sequence.
pub fn from_results<I>(iter: I) -> TableRef
where
    I: IntoIterator<Item = anyhow::Result<Record>>,
    I::IntoIter: Send + 'static,
{
    Arc::new(IterTable::spawn(iter))
}

/// A table that produces empty records until it is stopped.
pub fn infinite() -> TableRef {
    from_iter(std::iter::repeat_with(Record::new))
}

/// An empty table whose `err()` is `err`.
pub fn errored(err: impl Into<anyhow::Error>) -> TableRef {
    Arc::new(ChannelTable {
        rows: closed(),
        stop: StopFlag::new(),
        err: Some(TableError::from_source(err)),
    })
}

/// A table over a channel fed by the caller. The sequence ends when every
/// sender is dropped. `stop()` only stops the table from yielding; the caller
/// keeps ownership of the sending side.
pub fn from_channel(rows: Receiver<Record>) -> TableRef {
    Arc::new(ChannelTable { rows, stop: StopFlag::new(), err: None })
}

struct ChannelTable {
    rows: Receiver<Record>,
    stop: StopFlag,
    err: Option<TableError>,
}

impl Table for ChannelTable {
    fn rows(&self) -> Rows {
        Rows::new(self.rows.clone(), self.stop.clone())
    }

    fn err(&self) -> Option<TableError> {
        self.err.clone()
    }

    fn stop(&self) {
        self.stop.trigger();
    }
}

fn closed() -> Receiver<Record> {
    let (_, rx) = bounded(0);
    rx
}
