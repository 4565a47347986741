//! Settings - 設定の読み込み
//!
//! 優先順位（後勝ち）:
//! 1. 既定値
//! 2. 設定ファイル（`--config` で指定、なければカレントの `carelog.toml` を任意で読む）
//! 3. 環境変数 `CARELOG__<SECTION>__<KEY>`（例: `CARELOG__STORAGE__BACKEND=memory`）
//!
//! `.env` があれば先に読み込みます。

use std::path::{Path, PathBuf};

use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::{Deserialize, Serialize};

use crate::queue::QueueScope;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub storage: StorageSettings,
    pub queue: QueueSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub data_dir: PathBuf,
    /// Artificial latency of the memory backend, per call.
    #[serde(default)]
    pub simulated_latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub scope: QueueScope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

const DEFAULT_CONFIG_FILE: &str = "carelog";
const ENV_PREFIX: &str = "CARELOG";
const ENV_SEPARATOR: &str = "__";

impl Settings {
    /// Load settings from defaults, a config file and the environment.
    ///
    /// An explicit `path` must exist; the implicit `carelog.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = defaults()?
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        tracing::debug!(?settings, "settings loaded");
        Ok(settings)
    }

    /// Defaults overlaid with a TOML document (no environment).
    pub fn from_toml_str(toml: &str) -> Result<Self, SettingsError> {
        Ok(defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage: StorageSettings {
                backend: StorageBackend::File,
                data_dir: PathBuf::from("./carelog-data"),
                simulated_latency_ms: 0,
            },
            queue: QueueSettings::default(),
            log: LogSettings {
                filter: "info".to_string(),
                json: false,
            },
        }
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("storage.backend", "file")?
        .set_default("storage.data_dir", "./carelog-data")?
        .set_default("storage.simulated_latency_ms", 0_i64)?
        .set_default("queue.scope", "global")?
        .set_default("log.filter", "info")?
        .set_default("log.json", false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [storage]
            backend = "memory"
            simulated_latency_ms = 15

            [queue]
            scope = "per_key"

            [log]
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.storage.backend, StorageBackend::Memory);
        assert_eq!(settings.storage.simulated_latency_ms, 15);
        assert_eq!(settings.storage.data_dir, PathBuf::from("./carelog-data"));
        assert_eq!(settings.queue.scope, QueueScope::PerKey);
        assert_eq!(settings.log.filter, "info");
        assert!(settings.log.json);
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let err = Settings::from_toml_str("[queue]\nscope = \"sharded\"").unwrap_err();
        assert!(err.to_string().contains("settings"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(Settings::load(Some(&missing)).is_err());
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carelog.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"/var/lib/carelog\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.storage.data_dir, PathBuf::from("/var/lib/carelog"));
    }
}
