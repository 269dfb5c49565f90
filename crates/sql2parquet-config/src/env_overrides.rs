use super::{
    ConfigError, ExportConfig, FsConfig, LogFormat, MixedPartitionPolicy, R2Config, Result,
    S3Config, SslMode, StorageBackend,
};

pub const ENV_PREFIX: &str = "SQL2PARQUET_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    /// Get a variable by its key without the SQL2PARQUET_ prefix
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the SQL2PARQUET_ prefix
    /// Used for standard variables (PGPASSWORD, AWS_ACCESS_KEY_ID, etc.)
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Apply environment-variable overrides to the export config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut ExportConfig, env: &E) -> Result<()> {
    // Source connection
    if let Some(host) = env.get("SOURCE_HOST") {
        config.source.host = host;
    }
    if let Some(port) = get_env_parsed::<E, u16>(env, "SOURCE_PORT")? {
        config.source.port = port;
    }
    if let Some(database) = env.get("SOURCE_DATABASE") {
        config.source.database = database;
    }
    if let Some(username) = env.get("SOURCE_USERNAME") {
        config.source.username = username;
    }
    if let Some(password) = env.get("SOURCE_PASSWORD") {
        config.source.password = Some(password);
    } else if config.source.password.is_none() {
        // Fall back to the libpq convention
        if let Some(password) = env.get_raw("PGPASSWORD") {
            config.source.password = Some(password);
        }
    }
    if let Some(mode) = env.get("SOURCE_SSL_MODE") {
        config.source.ssl_mode = mode.parse::<SslMode>()?;
    }
    if let Some(secs) = get_env_parsed::<E, u64>(env, "SOURCE_CONNECT_TIMEOUT_SECS")? {
        config.source.connect_timeout_secs = secs;
    }
    if let Some(table) = env.get("SOURCE_TABLE") {
        config.source.table = Some(table);
    }
    if let Some(order_by) = env.get("SOURCE_ORDER_BY") {
        config.source.order_by = Some(order_by);
    }
    if let Some(query) = env.get("SOURCE_QUERY") {
        config.source.query = Some(query);
    }

    // Export settings
    if let Some(page_size) = get_env_parsed::<E, usize>(env, "PAGE_SIZE")? {
        config.export.page_size = page_size;
    }
    if let Some(column) = env.get("DATE_COLUMN") {
        config.export.date_column = column;
    }
    if let Some(base_path) = env.get("BASE_PATH") {
        config.export.base_path = base_path;
    }
    if let Some(policy) = env.get("ON_MIXED") {
        config.export.on_mixed = policy.parse::<MixedPartitionPolicy>()?;
    }
    if let Some(size) = get_env_parsed::<E, usize>(env, "PARQUET_ROW_GROUP_SIZE")? {
        config.export.parquet_row_group_size = size;
    }

    // Storage backend
    if let Some(backend) = env.get("STORAGE_BACKEND") {
        config.storage.backend = backend.parse::<StorageBackend>()?;
    }
    // Filesystem storage
    if let Some(path) = env.get("STORAGE_PATH") {
        config.storage.fs.get_or_insert_with(FsConfig::default).path = path;
    }

    // S3 storage
    if let Some(bucket) = env.get("S3_BUCKET") {
        ensure_s3(config).bucket = bucket;
    }
    if let Some(region) = env.get("S3_REGION") {
        ensure_s3(config).region = region;
    } else if config.storage.backend == StorageBackend::S3 {
        if let Some(region) = env.get_raw("AWS_REGION") {
            let s3 = ensure_s3(config);
            if s3.region.is_empty() {
                s3.region = region;
            }
        }
    }
    if let Some(endpoint) = env.get("S3_ENDPOINT") {
        ensure_s3(config).endpoint = Some(endpoint);
    }

    // R2 storage
    if let Some(bucket) = env.get("R2_BUCKET") {
        ensure_r2(config).bucket = bucket;
    }
    if let Some(account_id) = env.get("R2_ACCOUNT_ID") {
        ensure_r2(config).account_id = account_id;
    }
    // Standard credentials (without SQL2PARQUET_ prefix for compatibility)
    if config.storage.backend == StorageBackend::R2 {
        if let Some(access_key_id) = env.get_raw("AWS_ACCESS_KEY_ID") {
            ensure_r2(config).access_key_id = access_key_id;
        }
        if let Some(secret_access_key) = env.get_raw("AWS_SECRET_ACCESS_KEY") {
            ensure_r2(config).secret_access_key = secret_access_key;
        }
        if let Some(endpoint) = env.get_raw("AWS_ENDPOINT_URL") {
            ensure_r2(config).endpoint = Some(endpoint);
        }
    }

    // Retry policy
    if let Some(val) = get_env_parsed::<E, usize>(env, "RETRY_MAX_ATTEMPTS")? {
        config.retry.max_attempts = val;
    }
    if let Some(val) = get_env_parsed::<E, u64>(env, "RETRY_BASE_DELAY_MS")? {
        config.retry.base_delay_ms = val;
    }
    if let Some(val) = get_env_parsed::<E, u64>(env, "RETRY_MAX_DELAY_MS")? {
        config.retry.max_delay_ms = val;
    }
    if let Some(val) = get_env_parsed::<E, u32>(env, "RETRY_BREAKER_THRESHOLD")? {
        config.retry.breaker_threshold = val;
    }

    // Logging
    if let Some(level) = env.get("LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.log.format = format.parse::<LogFormat>()?;
    }

    Ok(())
}

fn ensure_s3(config: &mut ExportConfig) -> &mut S3Config {
    config.storage.s3.get_or_insert_with(S3Config::default)
}

fn ensure_r2(config: &mut ExportConfig) -> &mut R2Config {
    config.storage.r2.get_or_insert_with(R2Config::default)
}

fn get_env_parsed<E, T>(env: &E, key: &str) -> Result<Option<T>>
where
    E: EnvSource,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env.get(key) {
        Some(val) => val.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Env {
            key: format!("{}{}", ENV_PREFIX, key),
            message: e.to_string(),
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapEnv {
        prefixed: HashMap<String, String>,
        raw: HashMap<String, String>,
    }

    impl MapEnv {
        fn new(prefixed: &[(&str, &str)], raw: &[(&str, &str)]) -> Self {
            let to_map = |pairs: &[(&str, &str)]| {
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            };
            Self {
                prefixed: to_map(prefixed),
                raw: to_map(raw),
            }
        }
    }

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.prefixed.get(key).cloned()
        }

        fn get_raw(&self, key: &str) -> Option<String> {
            self.raw.get(key).cloned()
        }
    }

    #[test]
    fn overrides_source_and_export_settings() {
        let env = MapEnv::new(
            &[
                ("SOURCE_HOST", "db.internal"),
                ("SOURCE_PORT", "6543"),
                ("SOURCE_DATABASE", "sales"),
                ("SOURCE_USERNAME", "exporter"),
                ("SOURCE_PASSWORD", "secret"),
                ("SOURCE_SSL_MODE", "require"),
                ("PAGE_SIZE", "1000"),
                ("DATE_COLUMN", "created_on"),
                ("ON_MIXED", "split"),
                ("STORAGE_BACKEND", "s3"),
                ("S3_BUCKET", "warehouse"),
                ("S3_REGION", "eu-west-1"),
                ("LOG_FORMAT", "json"),
            ],
            &[],
        );

        let mut config = ExportConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.source.host, "db.internal");
        assert_eq!(config.source.port, 6543);
        assert_eq!(config.source.password.as_deref(), Some("secret"));
        assert_eq!(config.source.ssl_mode, SslMode::Require);
        assert_eq!(config.export.page_size, 1000);
        assert_eq!(config.export.on_mixed, MixedPartitionPolicy::Split);
        assert_eq!(config.storage.backend, StorageBackend::S3);
        let s3 = config.storage.s3.as_ref().unwrap();
        assert_eq!(s3.bucket, "warehouse");
        assert_eq!(s3.region, "eu-west-1");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn pgpassword_is_a_fallback_only() {
        let env = MapEnv::new(&[], &[("PGPASSWORD", "from-libpq")]);
        let mut config = ExportConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.source.password.as_deref(), Some("from-libpq"));

        let env = MapEnv::new(&[("SOURCE_PASSWORD", "explicit")], &[("PGPASSWORD", "x")]);
        let mut config = ExportConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.source.password.as_deref(), Some("explicit"));
    }

    #[test]
    fn malformed_numbers_name_the_variable() {
        let env = MapEnv::new(&[("PAGE_SIZE", "lots")], &[]);
        let mut config = ExportConfig::default();
        let err = apply_env_overrides(&mut config, &env).unwrap_err();
        assert!(err.to_string().contains("SQL2PARQUET_PAGE_SIZE"));
    }

    #[test]
    fn r2_credentials_come_from_standard_variables() {
        let env = MapEnv::new(
            &[
                ("STORAGE_BACKEND", "r2"),
                ("R2_BUCKET", "exports"),
                ("R2_ACCOUNT_ID", "abc123"),
            ],
            &[
                ("AWS_ACCESS_KEY_ID", "key"),
                ("AWS_SECRET_ACCESS_KEY", "secret"),
            ],
        );
        let mut config = ExportConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        let r2 = config.storage.r2.as_ref().unwrap();
        assert_eq!(r2.bucket, "exports");
        assert_eq!(r2.access_key_id, "key");
        assert_eq!(r2.secret_access_key, "secret");
    }
}
