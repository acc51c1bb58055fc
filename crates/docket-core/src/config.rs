//! DocketConfig - worker プール・poll loop・retention の設定
//!
//! 優先順位（後勝ち）:
//! 1. デフォルト値
//! 2. TOML ファイル（`from_file` / `from_toml`）
//! 3. `DOCKET_*` 環境変数（`apply_env_overrides`）
//! 4. CLI フラグ（docket-cli 側で上書き）
//!
//! ```toml
//! store_url = "sqlite://docket.db"
//! workers = 4
//! idle_interval_ms = 500
//! retention_secs = 86400
//! categories = ["reports"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::CategoryFilter;
use crate::queue::RetentionPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    Env { key: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocketConfig {
    /// `sqlite://...` / `sqlite::memory:` / `memory:`
    pub store_url: String,
    /// Runner が起動する worker プロセス数
    pub workers: usize,
    /// 空振り時の待ち時間
    pub idle_interval_ms: u64,
    /// FINISHED / FAILED を残す期間
    pub retention_secs: u64,
    /// 空なら category なしのタスクだけを処理
    pub categories: Vec<String>,
}

impl Default for DocketConfig {
    fn default() -> Self {
        Self {
            store_url: "sqlite://docket.db".to_string(),
            workers: 1,
            idle_interval_ms: 1000,
            retention_secs: RetentionPolicy::DEFAULT_WINDOW.as_secs(),
            categories: Vec::new(),
        }
    }
}

impl DocketConfig {
    /// TOML 文字列から読み込む（環境変数の上書きはしない）
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// `DOCKET_STORE_URL` などで上書きする
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// `lookup` で値を引いて上書きする（テストでは HashMap を渡す）
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        fn number<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { key, value })
        }

        if let Some(v) = lookup("DOCKET_STORE_URL") {
            self.store_url = v;
        }
        if let Some(v) = lookup("DOCKET_WORKERS") {
            self.workers = number("DOCKET_WORKERS", v)?;
        }
        if let Some(v) = lookup("DOCKET_IDLE_INTERVAL_MS") {
            self.idle_interval_ms = number("DOCKET_IDLE_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("DOCKET_RETENTION_SECS") {
            self.retention_secs = number("DOCKET_RETENTION_SECS", v)?;
        }
        if let Some(v) = lookup("DOCKET_CATEGORIES") {
            self.categories = v
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.idle_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "idle_interval_ms must be at least 1".into(),
            ));
        }
        if self.store_url.trim().is_empty() {
            return Err(ConfigError::Invalid("store_url must not be empty".into()));
        }
        Ok(())
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(Duration::from_secs(self.retention_secs))
    }

    pub fn category_filter(&self) -> CategoryFilter {
        CategoryFilter::any_of(self.categories.iter().cloned())
    }
}
