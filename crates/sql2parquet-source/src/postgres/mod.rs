//! PostgreSQL row source over `tokio-postgres`

mod connect;
pub mod convert;
mod numeric;

use arrow::array::RecordBatch;
use async_trait::async_trait;
use sql2parquet_config::SourceConfig;
use tracing::{debug, info, warn};

use crate::{paged_query, RowSource, SourceError, SourceState};
use connect::PgConnection;
pub use convert::{ColumnKind, RowLayout};
pub use numeric::NumericText;

/// Pages an ordered query with `OFFSET .. ROWS FETCH NEXT .. ROWS ONLY`.
pub struct PgRowSource {
    config: SourceConfig,
    query: String,
    page_size: usize,
    offset: u64,
    state: SourceState,
    connection: Option<PgConnection>,
    layout: Option<RowLayout>,
}

impl PgRowSource {
    /// `query` must already be ordered and free of paging clauses.
    pub fn new(config: SourceConfig, query: impl Into<String>, page_size: usize) -> Self {
        Self {
            config,
            query: query.into(),
            page_size: page_size.max(1),
            offset: 0,
            state: SourceState::Created,
            connection: None,
            layout: None,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Reuse the live connection, or reconnect when the server dropped it.
    async fn ensure_connected(&mut self) -> Result<&PgConnection, SourceError> {
        let stale = match &self.connection {
            Some(connection) => connection.client.is_closed(),
            None => true,
        };

        if stale {
            if self.connection.take().is_some() {
                warn!(
                    host = %self.config.host,
                    offset = self.offset,
                    "Postgres connection closed, reconnecting"
                );
            }
            self.connection = Some(connect::connect(&self.config).await?);
        }

        self.connection.as_ref().ok_or(SourceError::NotOpen)
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    async fn open(&mut self) -> Result<(), SourceError> {
        if matches!(self.state, SourceState::Open | SourceState::Active) {
            return Ok(());
        }

        let page_size = self.page_size;
        let statement_sql = paged_query(&self.query, 0, page_size);
        let connection = self.ensure_connected().await?;

        // Preparing fixes the column list and types without fetching rows
        let statement = connection
            .client
            .prepare(&statement_sql)
            .await
            .map_err(|source| SourceError::Query { offset: 0, source })?;
        let layout = RowLayout::from_columns(statement.columns())?;

        info!(
            host = %self.config.host,
            database = %self.config.database,
            columns = layout.schema().fields().len(),
            page_size,
            "Opened Postgres row source"
        );

        self.layout = Some(layout);
        self.offset = 0;
        self.state = SourceState::Open;
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<RecordBatch>, SourceError> {
        match self.state {
            SourceState::Exhausted => return Ok(None),
            SourceState::Created | SourceState::Closed => return Err(SourceError::NotOpen),
            SourceState::Open | SourceState::Active => {}
        }

        let offset = self.offset;
        let sql = paged_query(&self.query, offset, self.page_size);
        let connection = self.ensure_connected().await?;
        let rows = connection
            .client
            .query(sql.as_str(), &[])
            .await
            .map_err(|source| SourceError::Query { offset, source })?;

        if rows.is_empty() {
            debug!(offset, "Row source exhausted");
            self.state = SourceState::Exhausted;
            self.connection = None;
            return Ok(None);
        }

        let layout = self.layout.as_ref().ok_or(SourceError::NotOpen)?;
        let batch = layout.to_batch(&rows)?;

        debug!(offset, rows = batch.num_rows(), "Fetched page");

        self.offset += self.page_size as u64;
        self.state = SourceState::Active;
        Ok(Some(batch))
    }

    async fn close(&mut self) {
        if self.connection.take().is_some() {
            debug!(offset = self.offset, "Closed Postgres row source");
        }
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
