//! Configuration file parser for ~/.config/podcast-ingest/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`,
//! and every setting can come from the environment instead. Unknown keys are
//! accepted by serde but logged as likely typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::episode::{CategoryRuleset, RulesetError, UNCATEGORIZED};
use crate::pipeline::{PersistOptions, DEFAULT_PAGE_SIZE};
use crate::store::DEFAULT_BASE_URL;

pub const ENV_FEED_URL: &str = "PODCAST_FEED_URL";
pub const ENV_CHANNEL_ID: &str = "PODCAST_CHANNEL_ID";
pub const ENV_API_KEY: &str = "NOTION_API_KEY";
pub const ENV_DATABASE_ID: &str = "NOTION_DATABASE_ID";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid classifier rules: {0}")]
    Ruleset(#[from] RulesetError),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// SEC-015: Custom Debug impl on [`StoreConfig`] masks `api_key`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RSS feed to ingest.
    pub feed_url: Option<String>,

    /// Channel id attached to every extracted episode.
    pub channel_id: Option<String>,

    pub store: StoreConfig,
    pub persist: PersistConfig,
    pub classifier: ClassifierConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Notion integration token. `NOTION_API_KEY` takes precedence.
    pub api_key: Option<String>,
    pub database_id: Option<String>,
    pub base_url: String,
    /// Ids per page when scanning for existing episodes; clamped to 1..=100.
    pub page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            database_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// SEC-015: Mask api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("database_id", &self.database_id)
            .field("base_url", &self.base_url)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    pub pacing_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub max_attempts: u32,
    /// Mark new records as awaiting article generation.
    pub trigger_generation: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        let defaults = PersistOptions::default();
        Self {
            pacing_ms: defaults.pacing.as_millis() as u64,
            rate_limit_backoff_ms: defaults.rate_limit_backoff.as_millis() as u64,
            max_attempts: defaults.max_attempts,
            trigger_generation: defaults.trigger_generation,
        }
    }
}

impl PersistConfig {
    pub fn options(&self) -> PersistOptions {
        PersistOptions {
            pacing: Duration::from_millis(self.pacing_ms),
            rate_limit_backoff: Duration::from_millis(self.rate_limit_backoff_ms),
            max_attempts: self.max_attempts.max(1),
            trigger_generation: self.trigger_generation,
        }
    }
}

/// Keyword rules. An empty `categories` list means the built-in table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub fallback: String,
    pub categories: Vec<CategoryConfig>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fallback: UNCATEGORIZED.to_string(),
            categories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub keywords: Vec<String>,
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: &'static [&'static str] =
        &["feed_url", "channel_id", "store", "persist", "classifier"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown top-level keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses TOML text. Blank input yields defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    /// Applies environment overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`; set, non-blank values win over the file.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_FEED_URL) {
            self.feed_url = Some(v);
        }
        if let Some(v) = get(ENV_CHANNEL_ID) {
            self.channel_id = Some(v);
        }
        if let Some(v) = get(ENV_API_KEY) {
            self.store.api_key = Some(v);
        }
        if let Some(v) = get(ENV_DATABASE_ID) {
            self.store.database_id = Some(v);
        }
        self
    }

    /// Names of required settings that are absent, as env var names.
    ///
    /// The feed URL is only required when the feed is fetched over HTTP.
    pub fn missing_settings(&self, needs_feed_url: bool) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());

        let mut missing = Vec::new();
        if needs_feed_url && blank(&self.feed_url) {
            missing.push(ENV_FEED_URL);
        }
        if blank(&self.store.api_key) {
            missing.push(ENV_API_KEY);
        }
        if blank(&self.store.database_id) {
            missing.push(ENV_DATABASE_ID);
        }
        missing
    }

    pub fn validate(&self, needs_feed_url: bool) -> Result<(), ConfigError> {
        let missing = self.missing_settings(needs_feed_url);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }

    /// Builds the classifier ruleset, falling back to the built-in table.
    pub fn ruleset(&self) -> Result<CategoryRuleset, RulesetError> {
        if self.classifier.categories.is_empty() {
            return CategoryRuleset::builtin().with_fallback(self.classifier.fallback.clone());
        }

        CategoryRuleset::new(
            self.classifier
                .categories
                .iter()
                .map(|c| (c.name.clone(), c.keywords.clone())),
            self.classifier.fallback.clone(),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
