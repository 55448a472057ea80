//! Configuration management for laborsync.
//!
//! Configuration is loaded from `config.toml` in the data directory. Every
//! field is optional; a missing file means all defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the config file inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Name of the device state file inside the data directory.
pub const DEVICE_FILE: &str = "device.json";

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Shared store file. Two devices pair by pointing at the same file
    /// (default: `remote.json` in the data directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    /// Log filter used when `RUST_LOG` is not set (default: `warn`).
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// How often `watch` re-reads the shared store, in milliseconds
    /// (default: 500).
    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,
}

// Default value functions
fn default_log_filter() -> String {
    "warn".to_string()
}

fn default_watch_interval_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            log_filter: default_log_filter(),
            watch_interval_ms: default_watch_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `config.toml` from `data_dir`, or defaults if it does not exist.
    pub fn load_or_default(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write this configuration to `config.toml` in `data_dir`.
    pub async fn save(&self, data_dir: &Path) -> Result<(), ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self).map_err(ConfigError::EncodeError)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ConfigError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        set_file_permissions_0600(&path)
            .await
            .map_err(|e| ConfigError::WriteError { path, source: e })
    }

    /// The shared store file, resolved against `data_dir`.
    pub fn store_path(&self, data_dir: &Path) -> PathBuf {
        match &self.store_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => data_dir.join(path),
            None => data_dir.join("remote.json"),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to write configuration file.
    #[error("failed to write config file {path}: {source}")]
    WriteError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to encode configuration.
    #[error("failed to encode config: {0}")]
    EncodeError(toml::ser::Error),
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_file_permissions_0600(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.log_filter, "warn");
        assert_eq!(config.watch_interval_ms, 500);
        assert!(config.store_path.is_none());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
store_path = "/tmp/shared.json"
log_filter = "sync_client=debug"
watch_interval_ms = 250
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store_path, Some(PathBuf::from("/tmp/shared.json")));
        assert_eq!(config.log_filter, "sync_client=debug");
        assert_eq!(config.watch_interval_ms, 250);
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn store_path_resolves_against_data_dir() {
        let data_dir = Path::new("/data");
        assert_eq!(
            Config::default().store_path(data_dir),
            PathBuf::from("/data/remote.json")
        );

        let relative = Config {
            store_path: Some(PathBuf::from("shared.json")),
            ..Config::default()
        };
        assert_eq!(relative.store_path(data_dir), PathBuf::from("/data/shared.json"));

        let absolute = Config {
            store_path: Some(PathBuf::from("/elsewhere/shared.json")),
            ..Config::default()
        };
        assert_eq!(
            absolute.store_path(data_dir),
            PathBuf::from("/elsewhere/shared.json")
        );
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempdir().unwrap();
        let config = Config {
            watch_interval_ms: 100,
            ..Config::default()
        };
        config.save(dir.path()).await.unwrap();

        assert_eq!(Config::load_or_default(dir.path()).unwrap(), config);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempdir().unwrap();
        assert_eq!(Config::load_or_default(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "watch_interval_ms = \"fast\"").unwrap();
        assert!(matches!(
            Config::load_or_default(dir.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn config_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        Config::default().save(dir.path()).await.unwrap();

        let perms = tokio::fs::metadata(dir.path().join(CONFIG_FILE))
            .await
            .unwrap()
            .permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "file should be 0600");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("test-data");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        set_dir_permissions_0700(&data_dir).await.unwrap();

        let perms = tokio::fs::metadata(&data_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "dir should be 0700");
    }
}
