// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use tracing::warn;

macro_rules! invalid {
    ($($arg:tt)*) => {
        return Err(ConfigError::invalid(format!($($arg)*)))
    };
}

pub fn validate_config(config: &ExportConfig) -> Result<()> {
    validate_source_config(&config.source)?;
    validate_export_settings(&config.export)?;
    validate_query(&config.source, &config.export)?;
    validate_storage_config(&config.storage)?;
    validate_retry_config(&config.retry)?;

    Ok(())
}

fn validate_source_config(config: &SourceConfig) -> Result<()> {
    if config.host.trim().is_empty() {
        invalid!("source.host must not be empty");
    }

    if config.port == 0 {
        invalid!("source.port must be greater than 0");
    }

    if config.database.trim().is_empty() {
        invalid!("source.database is required");
    }

    if config.username.trim().is_empty() {
        invalid!("source.username is required");
    }

    if config.connect_timeout_secs == 0 {
        invalid!("source.connect_timeout_secs must be greater than 0");
    }

    Ok(())
}

fn validate_export_settings(config: &ExportSettings) -> Result<()> {
    if config.page_size == 0 {
        invalid!("export.page_size must be greater than 0");
    }

    // Every page is materialised in memory before it is encoded
    if config.page_size > 1_000_000 {
        warn!(
            page_size = config.page_size,
            "export.page_size is very large; may cause memory issues"
        );
    }

    let column = config.date_column.trim();
    if column.is_empty() {
        invalid!("export.date_column is required");
    }

    if !column
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$'))
    {
        invalid!(
            "export.date_column must be a plain column name, got '{}'",
            config.date_column
        );
    }

    if config.parquet_row_group_size == 0 {
        invalid!("export.parquet_row_group_size must be greater than 0");
    }

    Ok(())
}

fn validate_query(source: &SourceConfig, export: &ExportSettings) -> Result<()> {
    let sql = source.resolved_query()?;
    let shape = inspect_query(&sql);

    if !shape.has_order_by {
        invalid!("source query must have a top-level ORDER BY; paging over an unordered result is not deterministic");
    }

    if shape.has_offset || shape.has_fetch || shape.has_limit {
        invalid!("source query must not contain top-level OFFSET, FETCH or LIMIT; paging adds its own");
    }

    let leads_with_date = shape
        .order_by_leading
        .as_deref()
        .is_some_and(|leading| leading.eq_ignore_ascii_case(export.date_column.trim()));
    if !leads_with_date {
        warn!(
            date_column = %export.date_column,
            leading = shape.order_by_leading.as_deref().unwrap_or(""),
            "ORDER BY does not lead with the date column; pages are likely to span several days"
        );
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        StorageBackend::Fs => {
            let Some(fs) = config.fs.as_ref() else {
                invalid!("fs storage backend requires 'fs' configuration");
            };

            if fs.path.is_empty() {
                invalid!("storage.fs.path must not be empty");
            }
        }
        StorageBackend::S3 => {
            let Some(s3) = config.s3.as_ref() else {
                invalid!("s3 storage backend requires 's3' configuration");
            };

            if s3.bucket.is_empty() {
                invalid!("storage.s3.bucket is required for S3 backend");
            }

            if s3.region.is_empty() {
                invalid!("storage.s3.region is required for S3 backend");
            }
        }
        StorageBackend::R2 => {
            let Some(r2) = config.r2.as_ref() else {
                invalid!("r2 storage backend requires 'r2' configuration");
            };

            if r2.bucket.is_empty() {
                invalid!("storage.r2.bucket is required for R2 backend");
            }

            if r2.account_id.is_empty() {
                invalid!("storage.r2.account_id is required for R2 backend");
            }

            if r2.access_key_id.is_empty() {
                invalid!("storage.r2.access_key_id is required for R2 backend");
            }

            if r2.secret_access_key.is_empty() {
                invalid!("storage.r2.secret_access_key is required for R2 backend");
            }
        }
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<()> {
    if config.max_attempts == 0 {
        invalid!("retry.max_attempts must be at least 1");
    }

    if config.breaker_threshold == 0 {
        invalid!("retry.breaker_threshold must be at least 1");
    }

    if config.base_delay_ms > config.max_delay_ms {
        invalid!(
            "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
            config.base_delay_ms,
            config.max_delay_ms
        );
    }

    Ok(())
}
