//! # tablestream
//!
//! A **streaming table-transformation library**. Schema-free [`Record`]s flow
//! through a chain of stages, each stage turning a source [`Table`] into a
//! derived one. Stages run concurrently on their own threads and are connected
//! by unbuffered channels, so records stream through the whole chain with
//! backpressure instead of being materialized between steps.
//!
//! ## Key Features
//!
//! - **Three-operation table contract** - `rows`, `err`, `stop`
//! - **Streaming transforms** - select, map, each, fieldmap, valuemap, unique, concat
//! - **Barrier transforms** - reduce, group_by, sort, stable_sort, stable_compressed_sort
//! - **Joins** - pair any two tables by identity; left, right, inner and outer presets
//! - **Fan-out** - run a transform as N competing consumers with [`concurrently`](transforms::concurrently)
//! - **Clean failure** - the first error anywhere stops everything upstream, every
//!   upstream table is drained, and the error is reported exactly once at the end
//!
//! ## Quick Start
//!
//! ```
//! use tablestream::*;
//! # fn main() -> anyhow::Result<()> {
//! let people = from_vec(vec![
//!     record! { "name" => "ada", "team" => "compilers" },
//!     record! { "name" => "grace", "team" => "compilers" },
//!     record! { "name" => "linus", "team" => "kernels" },
//! ]);
//!
//! let teams = Transformer::new(people)
//!     .group_by(transforms::key_identifier("team"))
//!     .map(|group| {
//!         let size = group.get("rows").and_then(Value::as_list).map_or(0, <[Value]>::len);
//!         Ok(record! { "team" => group.get("id").cloned(), "size" => size as i64 })
//!     })
//!     .sink(collect)?;
//!
//! assert_eq!(teams, vec![
//!     record! { "team" => "compilers", "size" => 2 },
//!     record! { "team" => "kernels", "size" => 1 },
//! ]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Table
//!
//! A [`Table`] is a lazy, cancelable producer of records. [`rows`](Table::rows)
//! yields the sequence, [`err`](Table::err) reports the terminal error once the
//! sequence is exhausted, and [`stop`](Table::stop) asks the table (and everything
//! upstream of it) to wind down. Tables are shared as [`TableRef`].
//!
//! ### Transform
//!
//! A [`Transform`] is the per-stage logic: it reads records from an input
//! channel and writes any number of records to an output channel.
//! [`transform`] binds one to a source table and returns the derived table. The
//! [`transforms`] module holds the library of ready-made transforms, and
//! [`Transformer`] chains them fluently.
//!
//! ### Sources and sinks
//!
//! The [`sources`] module feeds pipelines from Rust values ([`from_vec`],
//! [`from_results`], [`from_channel`], ...). Sinks drain a table and return its
//! error: [`discard`], [`collect`], [`for_each`].
//!
//! ## Errors
//!
//! User code returns [`anyhow::Result`]. Once an error reaches a table it is
//! frozen into a cloneable [`TableError`]. A stage's own failure outranks any
//! error reported by its upstream, so the sink sees the first failure in the
//! chain. Panics inside stages are not errors: they are re-raised from
//! [`Table::err`] in the thread that consumes the failed stage.
//!
//! ## Logging
//!
//! Stage lifecycle events are emitted through [`tracing`]: stage start and
//! finish at `debug`, teardown after a failure at `warn`, stop requests at
//! `trace`. Install any `tracing` subscriber to see them.
//!
//! ## Configuration
//!
//! [`EngineConfig`] controls stage thread names and stack sizes and the default
//! worker count for fan-out. [`transform`] uses [`EngineConfig::global`];
//! [`transform_with`] and [`Transformer::with_config`] take an explicit one.
//!
//! ## Feature flags
//!
//! - `compressed-sort` (default) - [`stable_compressed_sort`](transforms::stable_compressed_sort),
//!   which keeps records serialized with `postcard` while sorting

pub mod config;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod sinks;
pub mod sources;
pub mod stage_id;
pub mod table;
pub mod testing;
pub mod transformer;
pub mod transforms;

pub use config::EngineConfig;
pub use error::{TableError, TableResult};
pub use pipeline::{Transform, TransformFunc, TransformedTable, transform, transform_with};
pub use record::{Record, Value};
pub use sinks::{collect, discard, for_each};
pub use sources::{errored, from_channel, from_iter, from_results, from_vec, infinite};
pub use stage_id::StageId;
pub use table::{Rows, StopFlag, Table, TableRef};
pub use transformer::Transformer;
