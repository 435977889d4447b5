//! Fluent pipeline building.
//!
//! A [`Transformer`] wraps a table and appends one stage per call, consuming
//! itself and returning the extended pipeline:
//!
//! ```
//! use tablestream::{Transformer, collect, from_vec, record};
//!
//! let table = Transformer::new(from_vec(vec![record! { "n" => 1 }, record! { "n" => 2 }]))
//!     .select(|r| Ok(r.get("n").and_then(|v| v.as_i64()) == Some(2)))
//!     .fieldmap([("n", vec!["value"])])
//!     .table();
//! assert_eq!(collect(&table).unwrap(), vec![record! { "value" => 2 }]);
//! ```

use crate::config::EngineConfig;
use crate::error::TableResult;
use crate::pipeline::{Transform, transform_with};
use crate::record::{Record, Value};
use crate::table::TableRef;
use crate::transforms::{self, JoinType};
use anyhow::Result;
use crossbeam_channel::Sender;
use std::collections::HashMap;

/// Builder that chains transforms onto a table.
#[derive(Clone)]
pub struct Transformer {
    table: TableRef,
    config: EngineConfig,
}

impl Transformer {
    pub fn new(source: TableRef) -> Self {
        Self { table: source, config: EngineConfig::global().clone() }
    }

    /// Use `config` for every stage added from here on.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Append an arbitrary transform.
    #[must_use]
    pub fn apply(self, transform: impl Into<Transform>) -> Self {
        let table = transform_with(self.table, transform, &self.config);
        Self { table, config: self.config }
    }

    #[must_use]
    pub fn table_transform<F>(self, f: F) -> Self
    where
        F: Fn(Record, &Sender<Record>) -> Result<()> + Send + Sync + 'static,
    {
        self.apply(transforms::table_transform(f))
    }

    #[must_use]
    pub fn select<F>(self, filter: F) -> Self
    where
        F: Fn(&Record) -> Result<bool> + Send + Sync + 'static,
    {
        self.apply(transforms::select(filter))
    }

    #[must_use]
    pub fn map<F>(self, f: F) -> Self
    where
        F: Fn(Record) -> Result<Record> + Send + Sync + 'static,
    {
        self.apply(transforms::map(f))
    }

    #[must_use]
    pub fn each<F>(self, f: F) -> Self
    where
        F: Fn(&Record) -> Result<()> + Send + Sync + 'static,
    {
        self.apply(transforms::each(f))
    }

    #[must_use]
    pub fn fieldmap<M, K, T>(self, mappings: M) -> Self
    where
        M: IntoIterator<Item = (K, Vec<T>)>,
        K: Into<String>,
        T: Into<String>,
    {
        self.apply(transforms::fieldmap(mappings))
    }

    #[must_use]
    pub fn safe_fieldmap<M, K, T>(self, mappings: M) -> Self
    where
        M: IntoIterator<Item = (K, Vec<T>)>,
        K: Into<String>,
        T: Into<String>,
    {
        self.apply(transforms::safe_fieldmap(mappings))
    }

    #[must_use]
    pub fn valuemap(self, mappings: HashMap<String, HashMap<Value, Value>>) -> Self {
        self.apply(transforms::valuemap(mappings))
    }

    #[must_use]
    pub fn reduce<F>(self, fold: F) -> Self
    where
        F: Fn(&mut Record, Record) -> Result<()> + Send + Sync + 'static,
    {
        self.apply(transforms::reduce(fold))
    }

    #[must_use]
    pub fn concat(self, tables: Vec<TableRef>) -> Self {
        self.apply(transforms::concat(tables))
    }

    #[must_use]
    pub fn pair<L, R, F>(self, right: TableRef, left_id: L, right_id: R, filter: F) -> Self
    where
        L: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
        R: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
        F: Fn(&Record) -> Result<bool> + Send + Sync + 'static,
    {
        self.apply(transforms::pair(right, left_id, right_id, filter))
    }

    #[must_use]
    pub fn join(self, right: TableRef, left_key: &str, right_key: &str, join_type: JoinType) -> Self {
        self.apply(transforms::join(right, left_key, right_key, join_type))
    }

    #[must_use]
    pub fn group_by<F>(self, identifier: F) -> Self
    where
        F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    {
        self.apply(transforms::group_by(identifier))
    }

    #[must_use]
    pub fn unique<F>(self, identifier: F) -> Self
    where
        F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    {
        self.apply(transforms::unique(identifier))
    }

    #[must_use]
    pub fn sort<F>(self, less: F) -> Self
    where
        F: Fn(&Record, &Record) -> Result<bool> + Send + Sync + 'static,
    {
        self.apply(transforms::sort(less))
    }

    #[must_use]
    pub fn stable_sort<F>(self, less: F) -> Self
    where
        F: Fn(&Record, &Record) -> Result<bool> + Send + Sync + 'static,
    {
        self.apply(transforms::stable_sort(less))
    }

    #[cfg(feature = "compressed-sort")]
    #[must_use]
    pub fn stable_compressed_sort<F>(self, get_key: F) -> Self
    where
        F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    {
        self.apply(transforms::stable_compressed_sort(get_key))
    }

    #[must_use]
    pub fn concurrently(self, transform: impl Into<Transform>, workers: usize) -> Self {
        self.apply(transforms::concurrently(transform, workers))
    }

    /// [`concurrently`](Self::concurrently) with this builder's configured
    /// default worker count.
    #[must_use]
    pub fn concurrently_default(self, transform: impl Into<Transform>) -> Self {
        self.apply(transforms::concurrently_default(transform))
    }

    #[must_use]
    pub fn bypass<P>(self, do_bypass: P, nested: Vec<Transform>) -> Self
    where
        P: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.apply(transforms::bypass(do_bypass, nested))
    }

    /// The pipeline built so far.
    pub fn table(self) -> TableRef {
        self.table
    }

    /// Hand the pipeline to a sink such as [`discard`](crate::discard) or
    /// [`collect`](crate::collect).
    pub fn sink<T, F>(self, sink: F) -> TableResult<T>
    where
        F: FnOnce(&TableRef) -> TableResult<T>,
    {
        sink(&self.table)
    }
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer").field("config", &self.config).finish_non_exhaustive()
    }
}
