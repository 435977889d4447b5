//! The pipeline engine: binds a source [`Table`] and a [`Transform`] into a
//! derived table.
//!
//! Every stage runs three tasks, each on its own thread, connected by unbuffered
//! (rendezvous) channels:
//!
//! ```text
//! source.rows() ──upstream copy──▶ input ──transform──▶ output ──downstream copy──▶ rows()
//! ```
//!
//! 1. The **upstream copy** forwards records from the source into the transform's
//!    input, and stops forwarding (but keeps draining) once the stage is stopped.
//! 2. The **transform task** runs the [`TransformFunc`] exactly once; when it
//!    returns, its input and output channels are dropped.
//! 3. The **downstream copy** forwards the transform's output to the stage's
//!    visible [`rows`](Table::rows), honoring the same stop flag.
//!
//! ## Termination protocol
//! - If the transform fails, the stage stops itself (and transitively everything
//!   upstream, side inputs included), drains the source and the transform's
//!   output, joins its copy tasks and records the transform's error. A stage's own error outranks
//!   anything its upstream reports.
//! - If the transform succeeds, the stage joins both copy tasks and adopts the
//!   upstream table's error, if any.
//!
//! In both cases the error is recorded *before* the visible sequence closes, and
//! every task the stage started has been joined by then.
//!
//! ## Side inputs
//! Some transforms read tables other than their input, such as the right side
//! of a [`pair`](crate::transforms::pair). They declare those tables with
//! [`Transform::with_inputs`], and stopping the stage stops them along with the
//! source.
//!
//! ## Panics
//! A panic in any stage task is treated as fatal rather than as an error. The
//! payload is kept and re-raised by [`err`](Table::err) in whichever thread
//! observes the stage's outcome, so it travels down the chain to the final sink
//! the same way `std::thread::scope` re-raises a worker's panic in its joiner.

use crate::config::EngineConfig;
use crate::error::TableError;
use crate::record::Record;
use crate::stage_id::StageId;
use crate::table::{Rows, StopFlag, Table, TableRef};
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, trace, warn};

/// The per-stage logic of a pipeline.
///
/// A transform receives every input record on `input` and may send any number
/// of records to `output`. It must consume its whole input (unless the stage is
/// stopped, which closes `input` early) and must not return until it has sent
/// everything it intends to send. Returning an error aborts the stage.
///
/// The same transform may be run several times concurrently (see
/// [`concurrently`](crate::transforms::concurrently)), so it takes `&self`.
/// While it runs, [`EngineConfig::current`] returns the stage's configuration.
pub trait TransformFunc: Send + Sync + 'static {
    fn run(&self, input: Receiver<Record>, output: Sender<Record>) -> Result<()>;
}

impl<F> TransformFunc for F
where
    F: Fn(Receiver<Record>, Sender<Record>) -> Result<()> + Send + Sync + 'static,
{
    fn run(&self, input: Receiver<Record>, output: Sender<Record>) -> Result<()> {
        self(input, output)
    }
}

/// A named, shareable transform function.
///
/// All of the library's transform constructors return a `Transform`; any
/// closure with the [`TransformFunc`] signature converts into one.
#[derive(Clone)]
pub struct Transform {
    name: &'static str,
    func: Arc<dyn TransformFunc>,
    inputs: Vec<TableRef>,
}

impl Transform {
    pub fn new(name: &'static str, func: impl TransformFunc) -> Self {
        Self { name, func: Arc::new(func), inputs: Vec::new() }
    }

    /// Declare tables the transform reads besides its input. A stage running
    /// this transform stops them when it is stopped.
    #[must_use]
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = TableRef>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The side inputs declared with [`with_inputs`](Self::with_inputs).
    pub fn inputs(&self) -> &[TableRef] {
        &self.inputs
    }

    pub fn run(&self, input: Receiver<Record>, output: Sender<Record>) -> Result<()> {
        self.func.run(input, output)
    }
}

impl<F: TransformFunc> From<F> for Transform {
    fn from(func: F) -> Self {
        Transform::new("custom", func)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name)
            .field("inputs", &self.inputs.len())
            .finish_non_exhaustive()
    }
}

/// Apply `transform` to `source`, returning the derived table.
///
/// Work starts immediately but is gated by backpressure: nothing moves until the
/// returned table's rows are read.
///
/// # Panics
/// Panics if the operating system refuses to spawn the stage's threads, like
/// [`std::thread::spawn`].
pub fn transform(source: TableRef, transform: impl Into<Transform>) -> TableRef {
    transform_with(source, transform, EngineConfig::global())
}

/// [`transform`] with an explicit [`EngineConfig`].
///
/// # Panics
/// Panics if the operating system refuses to spawn the stage's threads.
pub fn transform_with(
    source: TableRef,
    transform: impl Into<Transform>,
    config: &EngineConfig,
) -> TableRef {
    let func = transform.into();
    let id = StageId::next();
    let shared = Arc::new(Shared {
        id,
        source,
        inputs: func.inputs().to_vec(),
        stop: StopFlag::new(),
        err: OnceLock::new(),
        panic: Mutex::new(PanicState::Clear),
    });

    let (rows_tx, rows_rx) = bounded(0);
    let (in_tx, in_rx) = bounded(0);
    let (out_tx, out_rx) = bounded(0);
    let base = format!("{}-{}-{}", config.thread_prefix, id, func.name());

    let upstream = {
        let rows = shared.source.rows();
        let stop = shared.stop.clone();
        spawn(config, format!("{base}-up"), move || copy_upstream(rows, in_tx, stop))
    };
    let downstream = {
        let output = out_rx.clone();
        let rows_tx = rows_tx.clone();
        let stop = shared.stop.clone();
        spawn(config, format!("{base}-down"), move || {
            copy_downstream(output, rows_tx, stop)
        })
    };
    let stage = Stage {
        shared: Arc::clone(&shared),
        func,
        config: config.clone(),
        upstream,
        downstream,
    };
    spawn(config, base, move || stage.run(in_rx, out_tx, out_rx, rows_tx));

    Arc::new(TransformedTable {
        handle: Arc::new(StageHandle { shared, rows: rows_rx }),
    })
}

fn spawn<F>(config: &EngineConfig, name: String, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    config
        .thread_builder(name)
        .spawn(f)
        .expect("failed to spawn stage thread")
}

/// The table produced by [`transform`].
pub struct TransformedTable {
    handle: Arc<StageHandle>,
}

impl TransformedTable {
    pub fn id(&self) -> StageId {
        self.handle.shared.id
    }
}

impl Table for TransformedTable {
    fn rows(&self) -> Rows {
        let owner: Arc<dyn Any + Send + Sync> = self.handle.clone();
        Rows::new(self.handle.rows.clone(), self.handle.shared.stop.clone()).with_owner(owner)
    }

    fn err(&self) -> Option<TableError> {
        self.handle.shared.raise_panic();
        self.handle.shared.err.get().cloned()
    }

    fn stop(&self) {
        self.handle.shared.stop();
    }
}

impl fmt::Debug for TransformedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformedTable")
            .field("id", &self.handle.shared.id)
            .field("stopped", &self.handle.shared.stop.is_stopped())
            .finish_non_exhaustive()
    }
}

// Owned by the table and by every `Rows` it hands out. Once the last of them
// is gone nobody can read the stage any more, so it is stopped.
struct StageHandle {
    shared: Arc<Shared>,
    rows: Receiver<Record>,
}

impl Drop for StageHandle {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

enum PanicState {
    Clear,
    Pending(Box<dyn Any + Send>),
    Raised,
}

struct Shared {
    id: StageId,
    source: TableRef,
    inputs: Vec<TableRef>,
    stop: StopFlag,
    err: OnceLock<TableError>,
    panic: Mutex<PanicState>,
}

impl Shared {
    fn stop(&self) {
        if self.stop.trigger() {
            trace!(stage = %self.id, "stop requested");
            self.source.stop();
            for input in &self.inputs {
                input.stop();
            }
        }
    }

    fn set_err(&self, err: TableError) {
        // First error is final.
        let _ = self.err.set(err);
    }

    fn record_panic(&self, payload: Box<dyn Any + Send>) {
        let mut state = self.panic.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, PanicState::Clear) {
            *state = PanicState::Pending(payload);
        }
    }

    fn raise_panic(&self) {
        let mut state = self.panic.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, PanicState::Raised) {
            PanicState::Clear => *state = PanicState::Clear,
            PanicState::Pending(payload) => {
                drop(state);
                panic::resume_unwind(payload);
            }
            PanicState::Raised => {
                drop(state);
                panic!("stage {} panicked", self.id);
            }
        }
    }
}

struct Stage {
    shared: Arc<Shared>,
    func: Transform,
    config: EngineConfig,
    upstream: JoinHandle<()>,
    downstream: JoinHandle<()>,
}

impl Stage {
    fn run(
        self,
        input: Receiver<Record>,
        output: Sender<Record>,
        transform_out: Receiver<Record>,
        rows_tx: Sender<Record>,
    ) {
        let Stage { shared, func, config, upstream, downstream } = self;
        let _config = config.enter();
        debug!(stage = %shared.id, transform = func.name(), "stage started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| func.run(input, output)));
        match outcome {
            Ok(Ok(())) => {
                join(&shared, upstream);
                join(&shared, downstream);
                match panic::catch_unwind(AssertUnwindSafe(|| shared.source.err())) {
                    Ok(Some(err)) => shared.set_err(err),
                    Ok(None) => {}
                    Err(payload) => shared.record_panic(payload),
                }
                debug!(stage = %shared.id, transform = func.name(), "stage finished");
            }
            Ok(Err(err)) => {
                let err = TableError::transform(err);
                warn!(
                    stage = %shared.id,
                    transform = func.name(),
                    error = %err,
                    "transform failed, tearing down stage"
                );
                teardown(&shared, &transform_out, upstream, downstream);
                shared.set_err(err);
            }
            Err(payload) => {
                warn!(stage = %shared.id, transform = func.name(), "transform panicked, tearing down stage");
                shared.record_panic(payload);
                teardown(&shared, &transform_out, upstream, downstream);
            }
        }
        // The downstream copy has already dropped its sender, so this closes `rows()`.
        drop(rows_tx);
    }
}

fn teardown(
    shared: &Shared,
    transform_out: &Receiver<Record>,
    upstream: JoinHandle<()>,
    downstream: JoinHandle<()>,
) {
    shared.stop();
    shared.source.rows().drain();
    for input in &shared.inputs {
        input.rows().drain();
    }
    while transform_out.recv().is_ok() {}
    join(shared, upstream);
    join(shared, downstream);
    // The transform's error wins, but a fatal panic upstream must not be lost.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| shared.source.err())) {
        shared.record_panic(payload);
    }
}

fn join(shared: &Shared, handle: JoinHandle<()>) {
    if let Err(payload) = handle.join() {
        shared.record_panic(payload);
    }
}

fn copy_upstream(rows: Rows, input: Sender<Record>, stop: StopFlag) {
    let mut forwarding = true;
    for row in rows {
        if !forwarding || stop.is_stopped() {
            continue;
        }
        // The transform hung up; keep draining so the source can finish.
        if input.send(row).is_err() {
            forwarding = false;
        }
    }
}

fn copy_downstream(output: Receiver<Record>, rows: Sender<Record>, stop: StopFlag) {
    let mut forwarding = true;
    for row in output.iter() {
        if !forwarding || stop.is_stopped() {
            continue;
        }
        if rows.send(row).is_err() {
            forwarding = false;
        }
    }
}
