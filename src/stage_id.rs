//! Lightweight unique identifier for pipeline stages.
//!
//! Each derived table created by [`transform`](crate::transform) is assigned a
//! sequential `StageId`. Ids show up in stage thread names and log fields so a
//! stage can be traced across its tasks.
//!
//! They're small, `Copy`, and hashable.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Unique numeric identifier for a stage within this process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct StageId(u64);

impl StageId {
    /// Allocate the next id (used internally by the engine).
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the underlying numeric value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_increasing() {
        let a = StageId::next();
        let b = StageId::next();
        assert!(b.raw() > a.raw());
        assert_ne!(a, b);
    }
}
