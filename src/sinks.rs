//! Terminal consumers.
//!
//! A sink fully drains a table and reports the first error anywhere upstream.
//! Records already delivered before an error are not retracted.

use crate::error::{TableError, TableResult};
use crate::record::Record;
use crate::table::Table;

/// Drain `table`, discarding every record, and return its error.
///
/// ```
/// use tablestream::{discard, from_vec, record};
///
/// let table = from_vec(vec![record! { "a" => 1 }]);
/// assert!(discard(&table).is_ok());
/// ```
pub fn discard<T: Table + ?Sized>(table: &T) -> TableResult<()> {
    table.rows().for_each(drop);
    table.err().map_or(Ok(()), Err)
}

/// Drain `table` into a vector.
///
/// # Errors
/// Returns the table's error instead of the rows if it reported one.
pub fn collect<T: Table + ?Sized>(table: &T) -> TableResult<Vec<Record>> {
    let rows: Vec<Record> = table.rows().collect();
    match table.err() {
        Some(err) => Err(err),
        None => Ok(rows),
    }
}

/// Call `f` for every record of `table`.
///
/// If `f` fails the table is stopped and drained before the error is returned,
/// so nothing upstream is left blocked.
pub fn for_each<T, F>(table: &T, mut f: F) -> TableResult<()>
where
    T: Table + ?Sized,
    F: FnMut(Record) -> anyhow::Result<()>,
{
    let mut rows = table.rows();
    while let Some(row) = rows.next() {
        if let Err(err) = f(row) {
            table.stop();
            rows.drain();
            return Err(TableError::transform(err));
        }
    }
    table.err().map_or(Ok(()), Err)
}
