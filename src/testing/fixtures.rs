//! Instrumented sources for termination tests.

use crate::error::TableError;
use crate::record::Record;
use crate::sources::IterTable;
use crate::table::{Rows, Table};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// A source that counts the records it has produced and notices when its
/// producer has exited.
///
/// ```
/// use tablestream::{discard, record};
/// use tablestream::testing::TrackedSource;
///
/// let source = TrackedSource::from_vec(vec![record! {}, record! {}]);
/// discard(&*source).unwrap();
/// assert_eq!(source.produced(), 2);
/// assert!(source.wait_finished(std::time::Duration::from_secs(5)));
/// ```
pub struct TrackedSource {
    inner: IterTable,
    produced: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
}

// Dropped together with the producer's iterator, i.e. when the producer exits.
struct FinishGuard(Arc<AtomicBool>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl TrackedSource {
    pub fn from_vec(rows: Vec<Record>) -> Arc<Self> {
        Self::spawn(rows.into_iter())
    }

    /// An endless stream of empty records.
    pub fn infinite() -> Arc<Self> {
        Self::spawn(std::iter::repeat_with(Record::new))
    }

    fn spawn<I>(rows: I) -> Arc<Self>
    where
        I: Iterator<Item = Record> + Send + 'static,
    {
        let produced = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let guard = FinishGuard(Arc::clone(&finished));
        let counter = Arc::clone(&produced);
        let inner = IterTable::spawn(rows.map(move |row| {
            let _guard = &guard;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(row)
        }));
        Arc::new(Self { inner, produced, finished })
    }

    /// Records pulled from the underlying iterator so far.
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    /// Whether the producer has exited.
    pub fn finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Poll [`finished`](Self::finished) until it holds or `timeout` passes.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.finished() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }
}

impl Table for TrackedSource {
    fn rows(&self) -> Rows {
        self.inner.rows()
    }

    fn err(&self) -> Option<TableError> {
        self.inner.err()
    }

    fn stop(&self) {
        self.inner.stop();
    }
}
