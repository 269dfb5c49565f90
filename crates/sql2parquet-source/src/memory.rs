// In-memory row source
//
// Pages over an Arrow batch with the same cursor and exhaustion rules as the
// database source. Used by tests and for local dry runs.

use arrow::array::RecordBatch;
use async_trait::async_trait;

use crate::{RowSource, SourceError, SourceState};

pub struct MemoryRowSource {
    data: RecordBatch,
    page_size: usize,
    offset: u64,
    state: SourceState,
    fetches: usize,
}

impl MemoryRowSource {
    /// `page_size` is clamped to at least one row.
    pub fn new(data: RecordBatch, page_size: usize) -> Self {
        Self {
            data,
            page_size: page_size.max(1),
            offset: 0,
            state: SourceState::Created,
            fetches: 0,
        }
    }

    /// Number of page requests that reached the data (exhausted calls excluded).
    pub fn fetches(&self) -> usize {
        self.fetches
    }
}

#[async_trait]
impl RowSource for MemoryRowSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        if self.state == SourceState::Created || self.state == SourceState::Closed {
            self.state = SourceState::Open;
        }
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<RecordBatch>, SourceError> {
        match self.state {
            SourceState::Exhausted => return Ok(None),
            SourceState::Created | SourceState::Closed => return Err(SourceError::NotOpen),
            SourceState::Open | SourceState::Active => {}
        }

        self.fetches += 1;

        let start = usize::try_from(self.offset).unwrap_or(usize::MAX);
        if start >= self.data.num_rows() {
            self.state = SourceState::Exhausted;
            return Ok(None);
        }

        let len = self.page_size.min(self.data.num_rows() - start);
        let page = self.data.slice(start, len);

        self.offset += self.page_size as u64;
        self.state = SourceState::Active;
        Ok(Some(page))
    }

    async fn close(&mut self) {
        if self.state != SourceState::Exhausted {
            self.state = SourceState::Closed;
        }
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn state(&self) -> SourceState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn ids(n: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from_iter_values(0..n))]).unwrap()
    }

    async fn drain(source: &mut MemoryRowSource) -> Vec<RecordBatch> {
        let mut batches = Vec::new();
        while let Some(batch) = source.next_batch().await.unwrap() {
            batches.push(batch);
        }
        batches
    }

    #[tokio::test]
    async fn test_yields_ceil_n_over_p_contiguous_batches() {
        for (n, p) in [(0, 1), (1, 1), (7, 3), (9, 3), (10, 50_000), (100, 7)] {
            let mut source = MemoryRowSource::new(ids(n), p);
            source.open().await.unwrap();
            let batches = drain(&mut source).await;

            let expected = (n as usize).div_ceil(p);
            assert_eq!(batches.len(), expected, "n={} p={}", n, p);

            let mut next_id = 0;
            for batch in &batches {
                assert!(batch.num_rows() > 0 && batch.num_rows() <= p);
                let col = batch
                    .column(0)
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .unwrap();
                for i in 0..col.len() {
                    assert_eq!(col.value(i), next_id);
                    next_id += 1;
                }
            }
            assert_eq!(next_id, n);
        }
    }

    #[tokio::test]
    async fn test_exhaustion_is_terminal() {
        let mut source = MemoryRowSource::new(ids(3), 2);
        source.open().await.unwrap();
        drain(&mut source).await;
        assert_eq!(source.state(), SourceState::Exhausted);

        let fetches = source.fetches();
        assert!(source.next_batch().await.unwrap().is_none());
        assert!(source.next_batch().await.unwrap().is_none());
        assert_eq!(source.fetches(), fetches);
    }

    #[tokio::test]
    async fn test_next_batch_before_open_fails() {
        let mut source = MemoryRowSource::new(ids(3), 2);
        assert!(matches!(
            source.next_batch().await,
            Err(SourceError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn test_offset_advances_by_page_size() {
        let mut source = MemoryRowSource::new(ids(5), 2);
        source.open().await.unwrap();
        assert_eq!(source.offset(), 0);
        source.next_batch().await.unwrap();
        assert_eq!(source.offset(), 2);
        assert_eq!(source.state(), SourceState::Active);
        source.close().await;
        assert_eq!(source.state(), SourceState::Closed);
        source.close().await;
    }
}
