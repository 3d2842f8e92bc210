//! Loader for Perch configuration with YAML + environment overlays.
//!
//! Sources are merged in order: built-in defaults, an optional YAML file
//! (`perch.yaml` by convention), then `PERCH__`-prefixed environment
//! variables with `__` as the section separator (`PERCH__API__KEY`,
//! `PERCH__HARVEST__DATA_DIR`). String values may reference other
//! variables as `${VAR}`. The API credential falls back to `API_KEY` when
//! the merged config does not carry one.
use config::{Config, Environment, File, FileFormat};
use perch_common::observability::LogFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
pub const CREDENTIAL_ENV: &str = "API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("no API credential configured; set {CREDENTIAL_ENV} or api.key")]
    MissingCredential,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PerchConfig {
    pub api: ApiConfig,
    pub harvest: HarvestConfig,
    pub analysis: AnalysisSettings,
    pub log: LogSettings,
}

/// Upstream API connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub key: Option<String>,
    pub timeout_secs: u64,
    /// Retries for network failures and 5xx responses, per page.
    pub max_retries: usize,
    /// 429 waits tolerated per page before giving up.
    pub max_rate_limit_waits: usize,
    pub include_replies: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twitterapi.io".into(),
            key: None,
            timeout_secs: 30,
            max_retries: 5,
            max_rate_limit_waits: 20,
            include_replies: true,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where and how far back to harvest.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub data_dir: PathBuf,
    pub window_months: u32,
    pub max_pages: usize,
    /// Minimum spacing between page requests (free-tier QPS).
    pub page_delay_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            window_months: 24,
            max_pages: 1000,
            page_delay_ms: 5200,
        }
    }
}

impl HarvestConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

/// Report generation for `perch analyze`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub top_keywords: usize,
    /// Render PNG charts next to the tables.
    pub charts: bool,
    /// TTF/OTF font for chart titles and axis labels. Charts are drawn
    /// without text when unset. Needs CJK glyphs for Chinese keywords.
    pub chart_font: Option<PathBuf>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            top_keywords: 30,
            charts: true,
            chart_font: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: None,
            format: LogFormat::Text,
            stderr: true,
            filter: "info".into(),
        }
    }
}

impl PerchConfig {
    /// The API key, or [`ConfigError::MissingCredential`].
    ///
    /// ```
    /// use perch_config::{ConfigError, PerchConfig};
    ///
    /// let mut cfg = PerchConfig::default();
    /// assert!(matches!(cfg.credential(), Err(ConfigError::MissingCredential)));
    /// cfg.api.key = Some("abc".into());
    /// assert_eq!(cfg.credential().unwrap(), "abc");
    /// ```
    pub fn credential(&self) -> Result<&str, ConfigError> {
        self.api
            .key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingCredential)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.harvest.window_months == 0 {
            return Err(ConfigError::Invalid(
                "harvest.window_months must be at least 1".into(),
            ));
        }
        if self.harvest.max_pages == 0 {
            return Err(ConfigError::Invalid(
                "harvest.max_pages must be at least 1".into(),
            ));
        }
        if self.analysis.top_keywords == 0 {
            return Err(ConfigError::Invalid(
                "analysis.top_keywords must be at least 1".into(),
            ));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".into()));
        }
        Ok(())
    }
}

/// Expand `$VAR` / `${VAR}` repeatedly until the value stops changing or
/// the depth cap is hit. Unknown variables are left as written.
fn expand_env(raw: &str) -> String {
    let mut cur = raw.to_string();
    if !cur.contains('$') {
        return cur;
    }
    for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
        let expanded = match shellexpand::env(&cur) {
            Ok(cow) => cow.into_owned(),
            Err(_) => break,
        };
        if expanded == cur {
            break;
        }
        cur = expanded;
    }
    cur
}

fn expand_path(p: &Path) -> PathBuf {
    match p.to_str() {
        Some(s) => PathBuf::from(expand_env(s)),
        None => p.to_path_buf(),
    }
}

/// Builder hiding the `config` crate wiring.
pub struct PerchConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for PerchConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PerchConfigLoader {
    /// Defaults only; `PERCH__` environment overrides are applied last in
    /// [`load`](Self::load), after every file.
    ///
    /// ```
    /// use perch_config::PerchConfigLoader;
    ///
    /// let cfg = PerchConfigLoader::new()
    ///     .with_yaml_str("harvest:\n  window_months: 12")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(cfg.harvest.window_months, 12);
    /// assert_eq!(cfg.harvest.max_pages, 1000);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Load a `.env` file from the working directory (or a parent) into the
    /// process environment. Existing variables win.
    pub fn with_dotenv(self) -> Self {
        let _ = dotenv::dotenv();
        self
    }

    /// Attach a YAML/TOML/JSON file that must exist.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is used only when present.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self.builder.add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Merge the sources, expand `${VAR}` placeholders, apply the
    /// `API_KEY` fallback and validate.
    pub fn load(self) -> Result<PerchConfig, ConfigError> {
        let mut cfg: PerchConfig = self
            .builder
            .add_source(Environment::with_prefix("PERCH").separator("__"))
            .build()?
            .try_deserialize()?;

        cfg.api.base_url = expand_env(&cfg.api.base_url);
        cfg.api.key = cfg
            .api
            .key
            .take()
            .map(|k| expand_env(&k))
            // an unresolved placeholder is not a credential
            .filter(|k| !k.trim().is_empty() && !k.contains("${"))
            .or_else(|| std::env::var(CREDENTIAL_ENV).ok());
        cfg.harvest.data_dir = expand_path(&cfg.harvest.data_dir);
        cfg.log.dir = cfg.log.dir.as_deref().map(expand_path);
        cfg.analysis.chart_font = cfg.analysis.chart_font.as_deref().map(expand_path);

        cfg.validate()?;
        Ok(cfg)
    }
}
