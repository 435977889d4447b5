//! Assertions about table contents and termination.

use super::WAIT_TIMEOUT;
use crate::record::Record;
use crate::table::Table;
use crossbeam_channel::{RecvTimeoutError, bounded};

/// Drain `table` and return everything it produced, ignoring its error.
pub fn get_rows<T: Table + ?Sized>(table: &T) -> Vec<Record> {
    table.rows().collect()
}

/// Whether `table` still produces a record. Consumes that record.
pub fn has_rows<T: Table + ?Sized>(table: &T) -> bool {
    table.rows().next().is_some()
}

/// Assert that `table`'s sequence is closed: reading it yields nothing and
/// returns promptly.
///
/// # Panics
///
/// Panics if the table yields a record, or does not close within
/// [`WAIT_TIMEOUT`].
pub fn assert_consumed<T: Table + ?Sized>(table: &T) {
    let mut rows = table.rows();
    let (tx, rx) = bounded(1);
    std::thread::spawn(move || {
        let _ = tx.send(rows.next());
    });
    match rx.recv_timeout(WAIT_TIMEOUT) {
        Ok(None) => {}
        Ok(Some(row)) => panic!("table was not consumed: it still produced {row}"),
        Err(RecvTimeoutError::Timeout) => {
            panic!("table was not consumed: still open after {WAIT_TIMEOUT:?}")
        }
        Err(RecvTimeoutError::Disconnected) => panic!("table reader panicked"),
    }
}

/// Stop `table` and assert that its sequence then closes.
///
/// # Panics
///
/// Panics if the sequence is still open after [`WAIT_TIMEOUT`].
pub fn assert_stops<T: Table + ?Sized>(table: &T) {
    table.stop();
    // A stopped table drains silently, so this only waits for the close.
    assert_consumed(table);
}

/// Assert that two record collections hold the same records, ignoring order
/// but not multiplicity.
///
/// # Panics
///
/// Panics with both collections if they differ.
///
/// # Example
///
/// ```
/// use tablestream::record;
/// use tablestream::testing::assert_rows_unordered_eq;
///
/// assert_rows_unordered_eq(
///     vec![record! { "a" => 2 }, record! { "a" => 1 }],
///     vec![record! { "a" => 1 }, record! { "a" => 2 }],
/// );
/// ```
pub fn assert_rows_unordered_eq(mut actual: Vec<Record>, mut expected: Vec<Record>) {
    actual.sort();
    expected.sort();
    assert_eq!(
        actual, expected,
        "Record mismatch (order ignored):\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
}
