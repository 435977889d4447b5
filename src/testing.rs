//! Testing utilities for tablestream pipelines.
//!
//! Pipelines run on background threads, so the interesting properties in a
//! test are usually about termination: did the sink see every record, did the
//! error surface, and did every upstream table get fully consumed? This module
//! provides:
//!
//! - **Collectors**: [`get_rows`], [`has_rows`]
//! - **Assertions**: [`assert_consumed`], [`assert_stops`],
//!   [`assert_rows_unordered_eq`]
//! - **Fixtures**: [`TrackedSource`], a source that reports how far it got
//!
//! # Quick Start
//!
//! ```
//! use tablestream::{discard, transform, record};
//! use tablestream::transforms::select;
//! use tablestream::testing::*;
//!
//! let source = TrackedSource::from_vec(vec![record! { "a" => 1 }, record! { "a" => 2 }]);
//! let table = transform(source.clone(), select(|_| anyhow::bail!("rejected")));
//! assert!(discard(&table).is_err());
//! assert_consumed(&*source);
//! ```
//!
//! All assertions that wait on a table give up after [`WAIT_TIMEOUT`] and
//! panic, instead of hanging the test run.

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

use std::time::Duration;

/// How long assertions wait for a table to close.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
