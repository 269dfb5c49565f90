// Configuration source loading.
//
// Priority order:
// 1. Environment variables (SQL2PARQUET_* prefix)
// 2. Explicit config file path (--config flag or SQL2PARQUET_CONFIG)
// 3. Inline config content from SQL2PARQUET_CONFIG_CONTENT
// 4. Default config files (./sql2parquet.toml, ./.sql2parquet.toml)
// 5. Built-in defaults

use crate::env_overrides::{self, EnvSource};
use crate::{ConfigError, ExportConfig, Result};
use std::path::Path;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./sql2parquet.toml", "./.sql2parquet.toml"];

/// Load and validate configuration from env + discovered config file.
pub fn load_config<E: EnvSource>(env: &E) -> Result<ExportConfig> {
    let config = load_unvalidated(None, env)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path<E: EnvSource>(path: impl AsRef<Path>, env: &E) -> Result<ExportConfig> {
    let config = load_unvalidated(Some(path.as_ref()), env)?;
    config.validate()?;
    Ok(config)
}

/// Resolve file + env layers without validating.
///
/// An explicit `path` must exist; discovered default files are optional.
pub fn load_unvalidated<E: EnvSource>(path: Option<&Path>, env: &E) -> Result<ExportConfig> {
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => discover_file(env)?.unwrap_or_default(),
    };

    env_overrides::apply_env_overrides(&mut config, env)?;
    Ok(config)
}

fn discover_file<E: EnvSource>(env: &E) -> Result<Option<ExportConfig>> {
    if let Some(path) = env.get("CONFIG") {
        return read_file(Path::new(&path)).map(Some);
    }

    if let Some(content) = env.get("CONFIG_CONTENT") {
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            origin: "SQL2PARQUET_CONFIG_CONTENT".to_string(),
            source,
        })?;
        return Ok(Some(config));
    }

    for path in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path);
        if path.exists() {
            tracing::debug!(path = %path.display(), "Using discovered config file");
            return read_file(path).map(Some);
        }
    }

    Ok(None)
}

fn read_file(path: &Path) -> Result<ExportConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        origin: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct NoEnv;

    impl EnvSource for NoEnv {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn get_raw(&self, _key: &str) -> Option<String> {
            None
        }
    }

    struct InlineEnv(&'static str);

    impl EnvSource for InlineEnv {
        fn get(&self, key: &str) -> Option<String> {
            (key == "CONFIG_CONTENT").then(|| self.0.to_string())
        }

        fn get_raw(&self, _key: &str) -> Option<String> {
            None
        }
    }

    const VALID: &str = r#"
        [source]
        database = "sales"
        username = "exporter"
        query = "SELECT * FROM orders ORDER BY created_on, id"

        [export]
        date_column = "created_on"
    "#;

    #[test]
    fn explicit_file_is_loaded_and_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let config = load_from_file_path(file.path(), &NoEnv).unwrap();
        assert_eq!(config.source.database, "sales");
        assert_eq!(config.export.date_column, "created_on");
    }

    #[test]
    fn missing_explicit_file_is_a_read_error() {
        let err = load_from_file_path("/definitely/not/here.toml", &NoEnv).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn inline_content_is_used_when_no_path_given() {
        let config = load_config(&InlineEnv(VALID)).unwrap();
        assert_eq!(config.source.username, "exporter");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = load_unvalidated(None, &InlineEnv("[source\nhost = ")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
