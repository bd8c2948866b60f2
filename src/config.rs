use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::vision::DEFAULT_GEMINI_MODEL;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_DATA_DIR: &str = ".calorie-data";
pub const DEFAULT_VISION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the auth/profile backend
    pub api_url: String,
    /// Gemini API key. Supplied at runtime only, never compiled in.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Upper bound on a single photo estimate request
    pub vision_timeout: Duration,
    /// Where local settings and meal ledgers are kept
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables and defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vision_timeout_secs = match lookup("VISION_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("VISION_TIMEOUT_SECS must be a whole number of seconds")?,
            None => DEFAULT_VISION_TIMEOUT_SECS,
        };

        let config = Self {
            api_url: lookup("CALORIE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            gemini_api_key: lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()),
            gemini_model: lookup("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            vision_timeout: Duration::from_secs(vision_timeout_secs),
            data_dir: lookup("CALORIE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            bail!("CALORIE_API_URL must be an http(s) URL, got {}", self.api_url);
        }
        if self.gemini_model.trim().is_empty() {
            bail!("GEMINI_MODEL cannot be empty");
        }
        if self.vision_timeout.is_zero() {
            bail!("VISION_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            vision_timeout: Duration::from_secs(DEFAULT_VISION_TIMEOUT_SECS),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}
