// Initialization utilities
//
// Logging setup and wiring of the production source/sink stack

use sql2parquet_config::{ExportConfig, LogConfig, LogFormat};
use sql2parquet_source::PgRowSource;
use sql2parquet_writer::{BlobSink, OpendalSink, RetryingSink, RetryingSource};
use tracing::info;

use crate::error::{PipelineError, RunFailure};
use crate::pipeline::{Pipeline, PipelineSettings};
use crate::state::{RunState, RunSummary};

/// Initialize tracing/logging from LogConfig
pub fn init_tracing(config: &LogConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}

/// Run one export with the PostgreSQL source and the configured storage backend.
///
/// `config` is expected to be validated already.
pub async fn run_export(config: ExportConfig) -> Result<RunSummary, RunFailure> {
    let setup = |error: PipelineError| RunFailure {
        state: RunState::default(),
        error,
    };

    let query = config
        .source
        .resolved_query()
        .map_err(|e| setup(e.into()))?;
    let sink = OpendalSink::from_config(&config.storage).map_err(|e| setup(e.into()))?;

    info!(
        host = %config.source.host,
        database = %config.source.database,
        destination = %sink.location(),
        page_size = config.export.page_size,
        "Resolved export stack"
    );

    let source = PgRowSource::new(config.source.clone(), query, config.export.page_size);
    let mut pipeline = Pipeline::new(
        PipelineSettings::from_config(&config.export),
        RetryingSource::from_config(source, &config.retry),
        RetryingSink::from_config(sink, &config.retry),
    );

    pipeline.run().await
}
