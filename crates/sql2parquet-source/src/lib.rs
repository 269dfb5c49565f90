//! Paged row sources for sql2parquet
//!
//! A [`RowSource`] yields the result of one ordered query as a sequence of
//! Arrow record batches of at most `page_size` rows, advancing an offset
//! cursor after every non-empty page. The first empty page ends the sequence
//! for good; later calls return `None` without touching the database.

use arrow::array::RecordBatch;
use async_trait::async_trait;

mod error;
mod memory;
pub mod postgres;

pub use error::SourceError;
pub use memory::MemoryRowSource;
pub use postgres::PgRowSource;

/// Lifecycle of a row source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Constructed; no connection yet.
    Created,
    /// Connected; no page fetched yet.
    Open,
    /// At least one non-empty page has been returned.
    Active,
    /// An empty page was observed. Terminal.
    Exhausted,
    /// Closed before exhaustion.
    Closed,
}

/// A pull-based, offset-paged producer of record batches
#[async_trait]
pub trait RowSource: Send {
    /// Establish the connection. `Created -> Open`.
    async fn open(&mut self) -> Result<(), SourceError>;

    /// Fetch the next page; `None` once the result set is exhausted.
    ///
    /// The offset only advances when a page is returned, so a failed call can
    /// be retried for the same rows.
    async fn next_batch(&mut self) -> Result<Option<RecordBatch>, SourceError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self);

    /// Rows skipped by the next fetch
    fn offset(&self) -> u64;

    fn state(&self) -> SourceState;
}

/// Append the paging clause to an ordered base query.
///
/// The clause starts on its own line so a trailing `--` comment in the base
/// query cannot swallow it.
pub fn paged_query(base: &str, offset: u64, page_size: usize) -> String {
    format!(
        "{}\nOFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
        base.trim_end(),
        offset,
        page_size
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paged_query() {
        assert_eq!(
            paged_query("SELECT * FROM orders ORDER BY created_on", 100000, 50000),
            "SELECT * FROM orders ORDER BY created_on\nOFFSET 100000 ROWS FETCH NEXT 50000 ROWS ONLY"
        );
    }

    #[test]
    fn test_paged_query_survives_trailing_line_comment() {
        let sql = paged_query("SELECT * FROM orders ORDER BY created_on -- oldest first", 0, 50000);
        let last_line = sql.lines().last().unwrap();
        assert_eq!(last_line, "OFFSET 0 ROWS FETCH NEXT 50000 ROWS ONLY");
        assert!(!last_line.contains("--"));
    }
}
