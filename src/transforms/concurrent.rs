//! Competing-consumer fan-out of a single transform.

use crate::config::EngineConfig;
use crate::pipeline::Transform;
use crate::record::Record;
use anyhow::Context;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

enum WorkerExit {
    Done,
    Failed(anyhow::Error),
    Panicked(Box<dyn Any + Send>),
}

/// Run `workers` copies of `transform` as competing consumers of one input,
/// all writing to the same output. Output order is unspecified.
///
/// The first worker error ends the stage: no further input is handed out, the
/// remaining workers finish what they hold, and the error is returned. A
/// panic in any worker is re-raised in the stage, even one that happens after
/// another worker has failed.
///
/// Worker threads are named and sized by the stage's [`EngineConfig`]. A
/// worker count of zero is treated as one.
pub fn concurrently(transform: impl Into<Transform>, workers: usize) -> Transform {
    fan_out(transform.into(), Some(workers))
}

/// [`concurrently`] with the stage's configured
/// [`default_concurrency`](EngineConfig::default_concurrency).
pub fn concurrently_default(transform: impl Into<Transform>) -> Transform {
    fan_out(transform.into(), None)
}

fn fan_out(inner: Transform, workers: Option<usize>) -> Transform {
    let inputs = inner.inputs().to_vec();
    Transform::new("concurrently", move |input: Receiver<Record>, output: Sender<Record>| {
        let config = EngineConfig::current();
        let workers = workers.unwrap_or(config.default_concurrency).max(1);
        debug!(workers, transform = inner.name(), "starting workers");

        let (work_tx, work_rx) = bounded(0);
        let (abort_tx, abort_rx) = bounded::<()>(0);
        let (exits_tx, exits) = bounded(workers);

        std::thread::scope(|s| {
            // Owned here so an early return closes the workers' input.
            let (input, work_tx) = (input, work_tx);
            for n in 0..workers {
                let (work, output) = (work_rx.clone(), output.clone());
                let exits_tx = exits_tx.clone();
                let (inner, config) = (&inner, &config);
                config
                    .thread_builder(format!("{}-worker-{}-{n}", config.thread_prefix, inner.name()))
                    .spawn_scoped(s, move || {
                        let _config = config.enter();
                        let run = AssertUnwindSafe(|| inner.run(work, output));
                        let exit = match panic::catch_unwind(run) {
                            Ok(Ok(())) => WorkerExit::Done,
                            Ok(Err(err)) => WorkerExit::Failed(err),
                            Err(payload) => WorkerExit::Panicked(payload),
                        };
                        // Capacity covers every worker, so this never blocks.
                        let _ = exits_tx.send(exit);
                    })
                    .context("failed to spawn worker thread")?;
            }
            drop((work_rx, output, exits_tx));
            s.spawn(move || feed(input, work_tx, abort_rx));

            let mut abort = Some(abort_tx);
            let mut failure = None;
            let mut panicked = None;
            for exit in exits.iter() {
                match exit {
                    WorkerExit::Done => {}
                    WorkerExit::Failed(err) if failure.is_none() => {
                        debug!(error = %err, "worker failed, stopping the others");
                        drop(abort.take());
                        failure = Some(err);
                    }
                    WorkerExit::Failed(err) => debug!(error = %err, "further worker failure"),
                    WorkerExit::Panicked(payload) => {
                        warn!("worker panicked");
                        drop(abort.take());
                        panicked.get_or_insert(payload);
                    }
                }
            }
            // Wakes the feeder if it is still waiting for input nobody will take.
            drop(abort);

            if let Some(payload) = panicked {
                panic::resume_unwind(payload);
            }
            failure.map_or(Ok(()), Err)
        })
    })
    .with_inputs(inputs)
}

// Hands input records to whichever worker is free until the input ends, every
// worker has gone, or `abort` is disconnected.
fn feed(input: Receiver<Record>, work: Sender<Record>, abort: Receiver<()>) {
    loop {
        let row = select! {
            recv(input) -> row => match row {
                Ok(row) => row,
                Err(_) => return,
            },
            recv(abort) -> _ => return,
        };
        select! {
            send(work, row) -> sent => if sent.is_err() {
                return;
            },
            recv(abort) -> _ => return,
        }
    }
}
