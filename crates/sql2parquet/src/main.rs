use anyhow::{Context, Result};
use clap::Parser;
use sql2parquet_config::{
    ExportConfig, LogFormat, MixedPartitionPolicy, R2Config, S3Config, StorageBackend,
};
use std::path::PathBuf;
use tracing::info;

/// Export a database table to date-partitioned Parquet objects in chunks
#[derive(Parser)]
#[command(name = "sql2parquet")]
#[command(version)]
#[command(about = "Export a database table to date-partitioned Parquet objects in chunks", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Database host
    #[arg(long, value_name = "HOST")]
    server: Option<String>,

    /// Database port
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Database name
    #[arg(short, long, value_name = "NAME")]
    database: Option<String>,

    /// Database user
    #[arg(short, long, value_name = "USER")]
    username: Option<String>,

    /// Database password
    #[arg(long, value_name = "PASSWORD", env = "SQL2PARQUET_SOURCE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Table to export (requires --order-by)
    #[arg(short, long, value_name = "TABLE", conflicts_with = "query")]
    table: Option<String>,

    /// Verbatim query with a top-level ORDER BY
    #[arg(short, long, value_name = "SQL")]
    query: Option<String>,

    /// ORDER BY list used with --table
    #[arg(long, value_name = "COLUMNS")]
    order_by: Option<String>,

    /// Column whose calendar date selects the partition
    #[arg(long, value_name = "COLUMN")]
    date_column: Option<String>,

    /// Rows per page
    #[arg(long, value_name = "ROWS")]
    page_size: Option<usize>,

    /// Storage backend: fs, s3, r2
    #[arg(long, value_name = "BACKEND")]
    backend: Option<StorageBackend>,

    /// Bucket name (s3 and r2 backends)
    #[arg(long, value_name = "BUCKET")]
    bucket: Option<String>,

    /// Bucket region (s3 backend)
    #[arg(long, value_name = "REGION")]
    region: Option<String>,

    /// Custom S3-compatible endpoint
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Output directory for Parquet files (filesystem backend only)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Prefix placed before the year=/month=/day= directories
    #[arg(long, value_name = "PATH")]
    base_path: Option<String>,

    /// Pages spanning several days: fail, split
    #[arg(long, value_name = "POLICY")]
    on_mixed: Option<MixedPartitionPolicy>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log format: text, json
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Step 1: Load file + environment layers
    let mut config = ExportConfig::load_unvalidated(cli.config.as_deref()).with_context(|| {
        match &cli.config {
            Some(path) => format!("Failed to load config from {}", path.display()),
            None => "Failed to load configuration".to_string(),
        }
    })?;

    // Step 2: Apply CLI overrides (highest priority)
    apply_cli_overrides(&mut config, &cli)?;

    // Step 3: Initialize tracing early so validation warnings show up
    sql2parquet::init_tracing(&config.log);

    // Step 4: Validate once, before any connection is made
    config.validate().context("Invalid configuration")?;

    // Step 5: Display startup info
    display_startup_info(&config);

    // Step 6: Run the export
    let summary = sql2parquet::run_export(config).await?;

    info!("╭─────────────────────────────────────────────────");
    info!("│ Export complete in {:.1}s", summary.elapsed.as_secs_f64());
    info!("│ Rows: {}", summary.state.rows);
    info!("│ Batches fetched: {}", summary.state.batches_fetched);
    info!("│ Objects: {}", summary.state.objects);
    info!("│ Bytes: {}", summary.state.bytes);
    info!("╰─────────────────────────────────────────────────");

    Ok(())
}

fn apply_cli_overrides(config: &mut ExportConfig, cli: &Cli) -> Result<()> {
    if let Some(host) = &cli.server {
        config.source.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.source.port = port;
    }
    if let Some(database) = &cli.database {
        config.source.database = database.clone();
    }
    if let Some(username) = &cli.username {
        config.source.username = username.clone();
    }
    if let Some(password) = &cli.password {
        config.source.password = Some(password.clone());
    }

    // --table and --query each replace whatever the lower layers selected
    if let Some(table) = &cli.table {
        config.source.table = Some(table.clone());
        config.source.query = None;
    }
    if let Some(query) = &cli.query {
        config.source.query = Some(query.clone());
        config.source.table = None;
    }
    if let Some(order_by) = &cli.order_by {
        config.source.order_by = Some(order_by.clone());
    }

    if let Some(column) = &cli.date_column {
        config.export.date_column = column.clone();
    }
    if let Some(page_size) = cli.page_size {
        config.export.page_size = page_size;
    }
    if let Some(base_path) = &cli.base_path {
        config.export.base_path = base_path.clone();
    }
    if let Some(policy) = cli.on_mixed {
        config.export.on_mixed = policy;
    }

    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }

    // Override output directory (only valid for fs backend)
    if let Some(output) = &cli.output {
        if config.storage.backend != StorageBackend::Fs {
            anyhow::bail!(
                "--output flag only works with filesystem backend, but backend is '{}'.\n\
                Either remove --output flag or use --backend fs.",
                config.storage.backend
            );
        }

        let fs_config = config.storage.fs.get_or_insert_with(Default::default);
        fs_config.path = output.to_string_lossy().to_string();
    }

    if let Some(bucket) = &cli.bucket {
        match config.storage.backend {
            StorageBackend::S3 => {
                config.storage.s3.get_or_insert_with(S3Config::default).bucket = bucket.clone()
            }
            StorageBackend::R2 => {
                config.storage.r2.get_or_insert_with(R2Config::default).bucket = bucket.clone()
            }
            StorageBackend::Fs => anyhow::bail!("--bucket requires --backend s3 or r2"),
        }
    }
    if let Some(region) = &cli.region {
        if config.storage.backend != StorageBackend::S3 {
            anyhow::bail!("--region only applies to the s3 backend");
        }
        config.storage.s3.get_or_insert_with(S3Config::default).region = region.clone();
    }
    if let Some(endpoint) = &cli.endpoint {
        match config.storage.backend {
            StorageBackend::S3 => {
                config.storage.s3.get_or_insert_with(S3Config::default).endpoint =
                    Some(endpoint.clone())
            }
            StorageBackend::R2 => {
                config.storage.r2.get_or_insert_with(R2Config::default).endpoint =
                    Some(endpoint.clone())
            }
            StorageBackend::Fs => anyhow::bail!("--endpoint requires --backend s3 or r2"),
        }
    }

    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.log.format = format;
    }

    Ok(())
}

fn display_startup_info(config: &ExportConfig) {
    info!("╭─────────────────────────────────────────────────");
    info!("│ sql2parquet v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    info!(
        "│ Source: {}@{}:{}/{} (ssl: {})",
        config.source.username,
        config.source.host,
        config.source.port,
        config.source.database,
        config.source.ssl_mode
    );
    match (&config.source.table, &config.source.query) {
        (Some(table), _) => info!("│ Table: {}", table),
        (None, Some(_)) => info!("│ Query: custom"),
        (None, None) => {}
    }
    info!("│ Page size: {} rows", config.export.page_size);
    info!("│ Date column: {}", config.export.date_column);
    info!("│ Mixed-day pages: {}", config.export.on_mixed);
    info!("│ Storage backend: {}", config.storage.backend);
    info!("│ Destination: {}", config.storage.location());
    if !config.export.base_path.is_empty() {
        info!("│ Base path: {}", config.export.base_path);
    }
    info!(
        "│ Retry: {} attempts, breaker after {} failures",
        config.retry.max_attempts, config.retry.breaker_threshold
    );
    info!("│ Log level: {}", config.log.level);
    info!("╰─────────────────────────────────────────────────");
}
