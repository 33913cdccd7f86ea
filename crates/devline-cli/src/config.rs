//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use devline_deviantart::config::{DEFAULT_BASE_URL, DEFAULT_TOKEN_URL};
use devline_deviantart::{ApiSettings, CrawlConfig, Credentials, Pacing};
use serde::Deserialize;

/// Global configuration for devline
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub credentials: CredentialsConfig,
    pub api: ApiConfig,
    pub output: OutputConfig,
    pub pacing: Pacing,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    #[serde(deserialize_with = "deserialize_env_var")]
    pub client_id: Option<String>,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub client_secret: Option<String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            client_id: std::env::var("DEVIANTART_CLIENT_ID").ok(),
            client_secret: std::env::var("DEVIANTART_CLIENT_SECRET").ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_url: String,
    pub max_retries: u32,
    pub token_ttl_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            max_retries: 5,
            token_ttl_secs: 20 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub compression_level: i32,
    /// Write new crawl outputs as `.csv.gz`
    pub gzip: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
            compression_level: 3,
            gzip: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub chunk_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/deviantart.db"),
            chunk_size: devline_db::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./devline.toml (current directory)
    /// 2. ~/.config/devline/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("devline.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "devline") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// API settings; fails when either credential is missing
    pub fn api_settings(&self) -> Result<ApiSettings> {
        let credentials = Credentials {
            client_id: self.credentials.client_id.clone().unwrap_or_default(),
            client_secret: self.credentials.client_secret.clone().unwrap_or_default(),
        };
        if !credentials.is_complete() {
            anyhow::bail!(
                "DeviantArt credentials not set: add [credentials] to the config \
                 or export DEVIANTART_CLIENT_ID and DEVIANTART_CLIENT_SECRET"
            );
        }
        let mut settings = ApiSettings::new(credentials);
        settings.base_url = self.api.base_url.clone();
        settings.token_url = self.api.token_url.clone();
        settings.max_retries = self.api.max_retries;
        settings.token_ttl = Duration::from_secs(self.api.token_ttl_secs);
        Ok(settings)
    }

    /// Crawl runtime for `output_dir`, or the configured output directory
    pub fn crawl_config(&self, output_dir: Option<PathBuf>) -> CrawlConfig {
        let mut crawl = CrawlConfig::new(output_dir.unwrap_or_else(|| self.output.dir.clone()));
        crawl.gzip = self.output.gzip;
        crawl.pacing = self.pacing;
        crawl
    }
}
