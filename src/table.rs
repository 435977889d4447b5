//! The three-operation table contract shared by sources, stages and sinks.
//!
//! A [`Table`] is a lazy, cancelable producer of [`Record`]s:
//! - [`rows`](Table::rows) returns the sequence, terminated when the producer closes it;
//! - [`err`](Table::err) is meaningful once the sequence is exhausted, and never changes after;
//! - [`stop`](Table::stop) is an idempotent cooperative-cancellation request.
//!
//! Tables are shared behind [`TableRef`] (`Arc<dyn Table>`), since every stage keeps a
//! handle on its upstream to propagate `stop()`.

use crate::error::TableError;
use crate::record::Record;
use crossbeam_channel::Receiver;
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cancelable, lazy producer of records with a sticky terminal error.
pub trait Table: Send + Sync {
    /// The record sequence. Every call returns a handle on the same sequence.
    fn rows(&self) -> Rows;

    /// The first non-completion error, or `None`. Only meaningful after
    /// [`rows`](Table::rows) has been observed closed.
    fn err(&self) -> Option<TableError>;

    /// Request cancellation of this table and everything upstream of it.
    /// Safe to call any number of times from any thread.
    fn stop(&self);
}

/// Shared handle on a table.
pub type TableRef = Arc<dyn Table>;

impl<T: Table + ?Sized> Table for Arc<T> {
    fn rows(&self) -> Rows {
        (**self).rows()
    }

    fn err(&self) -> Option<TableError> {
        (**self).err()
    }

    fn stop(&self) {
        (**self).stop()
    }
}

/// A one-way cancellation flag shared between a table and its tasks.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns `true` only for the call that actually raised it.
    pub fn trigger(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Iterator over a table's records.
///
/// Once the owning table has been stopped, `Rows` drains whatever is left of the
/// sequence without yielding it, then ends. Draining (rather than abandoning) the
/// channel is what lets blocked producers upstream run to completion.
pub struct Rows {
    rx: Receiver<Record>,
    stop: StopFlag,
    // Keeps the owning table alive while rows are still being read.
    _owner: Option<Arc<dyn Any + Send + Sync>>,
}

impl Rows {
    pub fn new(rx: Receiver<Record>, stop: StopFlag) -> Self {
        Self { rx, stop, _owner: None }
    }

    pub(crate) fn with_owner(mut self, owner: Arc<dyn Any + Send + Sync>) -> Self {
        self._owner = Some(owner);
        self
    }

    /// Consume and discard everything left in the sequence.
    pub fn drain(&mut self) {
        while self.rx.recv().is_ok() {}
    }
}

impl Iterator for Rows {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.stop.is_stopped() {
            self.drain();
            return None;
        }
        self.rx.recv().ok()
    }
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("stopped", &self.stop.is_stopped())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::thread;

    #[test]
    fn stop_flag_reports_first_trigger_only() {
        let flag = StopFlag::new();
        assert!(!flag.is_stopped());
        assert!(flag.trigger());
        assert!(!flag.trigger());
        assert!(flag.clone().is_stopped());
    }

    #[test]
    fn stopped_rows_drain_silently() {
        let (tx, rx) = bounded(0);
        let producer = thread::spawn(move || {
            for _ in 0..5 {
                tx.send(Record::new()).unwrap();
            }
        });
        let stop = StopFlag::new();
        let mut rows = Rows::new(rx, stop.clone());
        assert!(rows.next().is_some());
        stop.trigger();
        assert!(rows.next().is_none());
        producer.join().unwrap();
    }
}
