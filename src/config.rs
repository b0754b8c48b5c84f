//! Configuration management for scry
//!
//! All configuration is loaded from `./config/scry.toml`.
//! No hardcoded defaults exist in source code - all defaults are in the config template.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/scry.toml";

/// Default configuration file content - this is the ONLY place defaults exist
pub const DEFAULT_CONFIG: &str = include_str!("../config/scry.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' must be at least {min}")]
    BelowMinimum { field: String, min: u64 },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

/// Search pass configuration, shared by both sources
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Pages fetched per query unless overridden on the command line
    #[serde(default = "default_pages_per_query")]
    pub pages_per_query: u32,
    /// Delay between browser result pages
    #[serde(default = "default_browser_delay_secs")]
    pub browser_delay_secs: u64,
    /// Soft cap on browser pages per query
    #[serde(default = "default_browser_page_cap")]
    pub browser_page_cap: u32,
    /// Bounded worker pool for concurrent API queries
    #[serde(default = "default_api_workers")]
    pub api_workers: usize,
    /// Retry budget for transient API failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_delay_ms")]
    pub backoff_base_delay_ms: u64,
    #[serde(default = "default_backoff_max_delay_ms")]
    pub backoff_max_delay_ms: u64,
}

fn default_pages_per_query() -> u32 {
    10
}

fn default_browser_delay_secs() -> u64 {
    3
}

fn default_browser_page_cap() -> u32 {
    30
}

fn default_api_workers() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_max_delay_ms() -> u64 {
    30000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            pages_per_query: default_pages_per_query(),
            browser_delay_secs: default_browser_delay_secs(),
            browser_page_cap: default_browser_page_cap(),
            api_workers: default_api_workers(),
            max_retries: default_max_retries(),
            backoff_base_delay_ms: default_backoff_base_delay_ms(),
            backoff_max_delay_ms: default_backoff_max_delay_ms(),
        }
    }
}

/// CAPTCHA detection configuration for the browser source
#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    /// Case-insensitive substrings that mark a rendered page as a challenge
    #[serde(default = "default_captcha_markers")]
    pub markers: Vec<String>,
}

fn default_captcha_markers() -> Vec<String> {
    vec!["recaptcha".to_string(), "captcha".to_string()]
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            markers: default_captcha_markers(),
        }
    }
}

/// File downloader configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_download_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_download_resume")]
    pub resume: bool,
    #[serde(default = "default_download_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_download_concurrency() -> usize {
    4
}

fn default_download_resume() -> bool {
    true
}

fn default_download_timeout_secs() -> u64 {
    60
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_download_concurrency(),
            resume: default_download_resume(),
            timeout_secs: default_download_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "http.user_agent".to_string(),
            });
        }
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "http.request_timeout_secs".to_string(),
            });
        }
        if self.search.pages_per_query == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "search.pages_per_query".to_string(),
                min: 1,
            });
        }
        if self.search.api_workers == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "search.api_workers".to_string(),
                min: 1,
            });
        }
        if self.captcha.markers.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "captcha.markers".to_string(),
            });
        }
        if self.download.concurrency == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "download.concurrency".to_string(),
                min: 1,
            });
        }
        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write default config
        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}
