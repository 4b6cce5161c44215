//! Configuration management for feedwatch.
//!
//! Configuration is read from a TOML file at startup, validated once, and
//! never re-read for the lifetime of the process. String values support
//! `${VAR}` and `${VAR:-default}` environment variable substitution.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::filter::EntryFilter;

/// Root application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
    #[serde(default)]
    pub disable_web_page_preview: bool,
}

fn default_parse_mode() -> String {
    "HTML".to_string()
}

/// Default settings applied to feeds that don't override them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    #[serde(deserialize_with = "de_interval")]
    pub check_interval: u64,
    pub request_timeout: u64,
    pub max_retries: u32,
    pub proxy: Option<String>,
    pub media_dir: Option<String>,
    pub media_all_entries: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            check_interval: 300,
            request_timeout: 30,
            max_retries: 3,
            proxy: None,
            media_dir: None,
            media_all_entries: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/feedwatch.db"),
        }
    }
}

/// Configuration for a single monitored feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default, deserialize_with = "de_opt_interval")]
    pub check_interval: Option<u64>,
    #[serde(default)]
    pub filters: FilterSpec,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub cookies: Option<HashMap<String, String>>,
    pub media_dir: Option<String>,
    pub media_all_entries: Option<bool>,
}

fn default_true() -> bool {
    true
}

/// Composite per-feed filter: one optional sub-rule per dimension,
/// combined with AND across dimensions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub keywords: KeywordRule,
    pub categories: KeywordRule,
    pub authors: KeywordRule,
    pub regex: RegexRule,
}

/// Include/exclude term lists. Include terms use OR logic;
/// any exclude match rejects regardless of includes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeywordRule {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub case_sensitive: bool,
}

impl KeywordRule {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegexRule {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Parse an interval like "300", "90s", "30m", "6h", "1d" into seconds.
fn parse_interval(s: &str) -> Result<u64, String> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .map(|h| h * 3600)
            .map_err(|_| format!("Invalid hours: {}", hours))
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes
            .parse::<u64>()
            .map(|m| m * 60)
            .map_err(|_| format!("Invalid minutes: {}", minutes))
    } else if let Some(days) = s.strip_suffix('d') {
        days.parse::<u64>()
            .map(|d| d * 86400)
            .map_err(|_| format!("Invalid days: {}", days))
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>()
            .map_err(|_| format!("Invalid seconds: {}", secs))
    } else {
        s.parse::<u64>()
            .map_err(|_| format!("Invalid interval: {}. Use format like '1h', '30m', '300'", s))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInterval {
    Seconds(u64),
    Human(String),
}

impl RawInterval {
    fn into_seconds<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            RawInterval::Seconds(secs) => Ok(secs),
            RawInterval::Human(s) => parse_interval(&s).map_err(E::custom),
        }
    }
}

fn de_interval<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    RawInterval::deserialize(deserializer)?.into_seconds()
}

fn de_opt_interval<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<RawInterval>::deserialize(deserializer)? {
        Some(raw) => raw.into_seconds().map(Some),
        None => Ok(None),
    }
}

fn env_var_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("static pattern")
    })
}

/// Substitute `${VAR}` and `${VAR:-default}` in every string value of a
/// parsed TOML document. Unset variables without a default are left as-is.
fn substitute_env_vars(value: toml::Value) -> toml::Value {
    match value {
        toml::Value::String(s) => {
            let replaced = env_var_pattern().replace_all(&s, |caps: &regex::Captures| {
                let name = &caps[1];
                match std::env::var(name) {
                    Ok(v) => v,
                    Err(_) => match caps.get(2) {
                        Some(default) => default.as_str().to_string(),
                        None => {
                            tracing::warn!(
                                "Environment variable '{}' not set and no default provided",
                                name
                            );
                            caps[0].to_string()
                        }
                    },
                }
            });
            toml::Value::String(replaced.into_owned())
        }
        toml::Value::Array(items) => {
            toml::Value::Array(items.into_iter().map(substitute_env_vars).collect())
        }
        toml::Value::Table(table) => toml::Value::Table(
            table
                .into_iter()
                .map(|(k, v)| (k, substitute_env_vars(v)))
                .collect(),
        ),
        other => other,
    }
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        tracing::info!(
            "Configuration loaded from {}: {} feed(s)",
            path.display(),
            config.feeds.len()
        );

        Ok(config)
    }

    /// Parse, substitute environment variables, and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let raw: toml::Value = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;

        let config: Config =
            substitute_env_vars(raw)
                .try_into()
                .map_err(|e| ConfigError::Parse {
                    path: PathBuf::new(),
                    source: e,
                })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would misbehave at runtime. Runs before
    /// any poller starts so bad filters never reach entry evaluation.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid("telegram.bot_token is empty".into()));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(ConfigError::Invalid("telegram.chat_id is empty".into()));
        }
        match self.telegram.parse_mode.as_str() {
            "HTML" | "MarkdownV2" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "telegram.parse_mode must be HTML or MarkdownV2, got '{}'",
                    other
                )));
            }
        }

        if self.feeds.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one feed must be configured".into(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(ConfigError::Invalid("feed with empty name".into()));
            }
            if feed.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "feed '{}' has an empty url",
                    feed.name
                )));
            }
            if !names.insert(feed.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate feed name '{}'",
                    feed.name
                )));
            }

            for (dim, rule) in [
                ("keywords", &feed.filters.keywords),
                ("categories", &feed.filters.categories),
                ("authors", &feed.filters.authors),
            ] {
                for term in rule.include.iter().chain(rule.exclude.iter()) {
                    if term.trim().is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "feed '{}': blank term in {} filter",
                            feed.name, dim
                        )));
                    }
                }
            }

            // Malformed regex must fail at load, never at entry time.
            EntryFilter::new(&feed.filters).map_err(|e| {
                ConfigError::Invalid(format!("feed '{}': {}", feed.name, e))
            })?;
        }

        Ok(())
    }
}

impl FeedConfig {
    pub fn interval_secs(&self, defaults: &DefaultsConfig) -> u64 {
        self.check_interval.unwrap_or(defaults.check_interval)
    }

    /// Effective media directory. A per-feed empty string disables media
    /// download even when a default directory is configured.
    pub fn media_dir<'a>(&'a self, defaults: &'a DefaultsConfig) -> Option<&'a str> {
        match &self.media_dir {
            Some(dir) if dir.is_empty() => None,
            Some(dir) => Some(dir),
            None => defaults.media_dir.as_deref(),
        }
    }

    pub fn media_all_entries(&self, defaults: &DefaultsConfig) -> bool {
        self.media_all_entries.unwrap_or(defaults.media_all_entries)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
