//! The sticky error reported by a [`Table`](crate::Table).
//!
//! User-supplied logic returns plain [`anyhow::Result`]; once an error escapes
//! into a table it is frozen into a [`TableError`], which is cheap to clone so
//! `err()` can be read any number of times by any number of consumers.

use std::sync::Arc;
use thiserror::Error;

/// Convenience alias for results carrying a [`TableError`].
pub type TableResult<T> = std::result::Result<T, TableError>;

/// The first non-completion error observed by a table.
///
/// Both variants render the full `anyhow` context chain of the wrapped error.
#[derive(Clone, Debug, Error)]
pub enum TableError {
    /// Raised by a source collaborator while producing rows.
    #[error("{0:#}")]
    Source(Arc<anyhow::Error>),
    /// Returned by a transform function.
    #[error("{0:#}")]
    Transform(Arc<anyhow::Error>),
}

impl TableError {
    pub fn from_source(err: impl Into<anyhow::Error>) -> Self {
        TableError::Source(Arc::new(err.into()))
    }

    /// Wrap an error returned by a transform. If the error already carries a
    /// `TableError` (a transform re-raising an upstream table's error), that
    /// error is returned unchanged.
    pub fn transform(err: anyhow::Error) -> Self {
        match err.downcast::<TableError>() {
            Ok(inner) => inner,
            Err(err) => TableError::Transform(Arc::new(err)),
        }
    }

    /// Shorthand for a transform error with a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        TableError::Transform(Arc::new(anyhow::Error::msg(message)))
    }

    pub fn inner(&self) -> &anyhow::Error {
        match self {
            TableError::Source(e) | TableError::Transform(e) => e,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, TableError::Source(_))
    }

    /// Look for an error of type `E` anywhere in the wrapped context chain.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.inner().downcast_ref::<E>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn transform_unwraps_nested_table_errors() {
        let upstream = TableError::from_source(anyhow!("disk on fire"));
        let reraised = anyhow::Error::from(upstream.clone());
        let err = TableError::transform(reraised);
        assert!(err.is_source());
        assert_eq!(err.to_string(), "disk on fire");
    }

    #[test]
    fn display_includes_context_chain() {
        let err: anyhow::Result<()> = Err(anyhow!("bad value")).context("while mapping row 3");
        let err = TableError::transform(err.unwrap_err());
        assert_eq!(err.to_string(), "while mapping row 3: bad value");
    }
}
