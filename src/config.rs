//! Runtime configuration.
//!
//! Settings are read once at startup from a single file whose format is
//! picked by extension:
//!
//! - `.json`: a JSON object; non-null scalar values are used as strings
//! - `.yaml` / `.yml`: a YAML mapping
//! - anything else: dotenv syntax (`KEY=VALUE`, `#` comments, quotes).
//!   Lines `dotenvy` rejects are read leniently: split on the first `=`,
//!   trim, strip surrounding quotes. Lines without `=` are skipped.
//!
//! Unknown keys are ignored and a missing file means "all defaults". The raw
//! string map ([`RawConfig`]) is then validated into an immutable [`Config`].
//! Any validation failure is fatal to the process.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const NEWS_URL: &str = "NEWS_URL";
pub const DISCORD_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
pub const CHECK_INTERVAL_SECONDS: &str = "CHECK_INTERVAL_SECONDS";
pub const REQUEST_TIMEOUT_SECONDS: &str = "REQUEST_TIMEOUT_SECONDS";
pub const USER_AGENT: &str = "USER_AGENT";
pub const STATE_DB_PATH: &str = "STATE_DB_PATH";
pub const LOG_FILE: &str = "LOG_FILE";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const POST_ONLY_FIRST_N: &str = "POST_ONLY_FIRST_N";
pub const BOT_NAME: &str = "BOT_NAME";
pub const NEWS_PATH_PATTERN: &str = "NEWS_PATH_PATTERN";

pub const DEFAULT_NEWS_URL: &str = "https://www.seaofthieves.com/ru/news";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; SOTNewsBot/1.0; +https://discord.com/)";
pub const DEFAULT_BOT_NAME: &str = "Sea of Thieves Новости";

/// Recognised keys and their defaults.
const DEFAULTS: &[(&str, &str)] = &[
    (NEWS_URL, DEFAULT_NEWS_URL),
    (DISCORD_WEBHOOK_URL, ""),
    (CHECK_INTERVAL_SECONDS, "900"),
    (REQUEST_TIMEOUT_SECONDS, "15"),
    (USER_AGENT, ""),
    (STATE_DB_PATH, "/var/lib/sot-news-bot/state.db"),
    (LOG_FILE, "/var/log/sot-news-bot/bot.log"),
    (LOG_LEVEL, "INFO"),
    (POST_ONLY_FIRST_N, "8"),
    (BOT_NAME, DEFAULT_BOT_NAME),
    (NEWS_PATH_PATTERN, "/ru/news/"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid env config: {0}")]
    Env(#[from] dotenvy::Error),
    #[error("DISCORD_WEBHOOK_URL is not set")]
    MissingWebhook,
    #[error("{key} is not a valid URL ({value:?}): {source}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{key} must be an http(s) URL, got {value:?}")]
    UnsupportedScheme { key: &'static str, value: String },
    #[error("{key} must be an integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
    #[error("NEWS_PATH_PATTERN is not a valid regular expression: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Validated settings handed to the pipeline. Never re-read after startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub news_url: Url,
    pub webhook_url: Url,
    pub check_interval: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub state_db_path: PathBuf,
    /// `None` logs to stdout only.
    pub log_file: Option<PathBuf>,
    /// `tracing` filter directive derived from `LOG_LEVEL`.
    pub log_level: String,
    /// First-cycle delivery cap; 0 disables it.
    pub first_run_cap: usize,
    pub bot_name: String,
    pub news_path_pattern: Regex,
}

/// Unvalidated key/value settings, pre-filled with defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfig {
    values: BTreeMap<&'static str, String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            values: DEFAULTS
                .iter()
                .map(|(k, v)| (*k, (*v).to_string()))
                .collect(),
        }
    }
}

impl RawConfig {
    /// Load `path` on top of the defaults. A missing file yields defaults.
    ///
    /// Runs before logging is set up, so it does not log.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut raw = Self::default();
        if !path.exists() {
            return Ok(raw);
        }

        let read = || {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        };

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => raw.merge_json(&read()?)?,
            Some("yaml" | "yml") => raw.merge_yaml(&read()?)?,
            _ => raw.merge_env(&read()?)?,
        }
        Ok(raw)
    }

    fn merge_env(&mut self, text: &str) -> Result<(), ConfigError> {
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match dotenvy::from_read_iter(line.as_bytes()).next() {
                Some(Ok((key, value))) => self.set(&key, value),
                Some(Err(dotenvy::Error::LineParse(..))) => {
                    if let Some((key, value)) = split_lenient(line) {
                        self.set(key, value);
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => {}
            }
        }
        Ok(())
    }

    fn merge_json(&mut self, text: &str) -> Result<(), ConfigError> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
        for (key, value) in map {
            let value = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            self.set(&key, value);
        }
        Ok(())
    }

    fn merge_yaml(&mut self, text: &str) -> Result<(), ConfigError> {
        let map: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(text)?;
        for (key, value) in map {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            self.set(&key, value);
        }
        Ok(())
    }

    /// Set a recognised key; unknown keys are ignored.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        if let Some(slot) = self.values.get_mut(key) {
            *slot = value.into();
        }
    }

    /// Set `key` when `value` is present.
    pub fn with_override(mut self, key: &str, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> &str {
        self.values.get(key).map(String::as_str).unwrap_or_default()
    }

    /// Validate into a [`Config`].
    pub fn resolve(&self) -> Result<Config, ConfigError> {
        let webhook = self.get(DISCORD_WEBHOOK_URL).trim();
        if webhook.is_empty() {
            return Err(ConfigError::MissingWebhook);
        }
        let webhook_url = parse_http_url(DISCORD_WEBHOOK_URL, webhook)?;

        let news_url = parse_http_url(NEWS_URL, or_default(self.get(NEWS_URL), DEFAULT_NEWS_URL))?;

        let log_file = Some(self.get(LOG_FILE).trim())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        // Negative caps mean "no cap".
        let first_run_cap = parse_number::<i64>(POST_ONLY_FIRST_N, self.get(POST_ONLY_FIRST_N))?
            .max(0) as usize;

        Ok(Config {
            news_url,
            webhook_url,
            check_interval: parse_seconds(CHECK_INTERVAL_SECONDS, self.get(CHECK_INTERVAL_SECONDS))?,
            request_timeout: parse_seconds(
                REQUEST_TIMEOUT_SECONDS,
                self.get(REQUEST_TIMEOUT_SECONDS),
            )?,
            user_agent: or_default(self.get(USER_AGENT), DEFAULT_USER_AGENT).to_string(),
            state_db_path: PathBuf::from(self.get(STATE_DB_PATH).trim()),
            log_file,
            log_level: log_directive(self.get(LOG_LEVEL)),
            first_run_cap,
            bot_name: or_default(self.get(BOT_NAME), DEFAULT_BOT_NAME).to_string(),
            news_path_pattern: Regex::new(self.get(NEWS_PATH_PATTERN).trim())?,
        })
    }
}

/// `KEY = "value with spaces"` style line; `None` when there is no `=`.
fn split_lenient(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let value = value.trim().trim_matches('"').trim_matches('\'');
    Some((key.trim(), value))
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    let value = value.trim();
    if value.is_empty() { default } else { value }
}

fn parse_http_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::UnsupportedScheme {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

fn parse_seconds(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match parse_number::<u64>(key, value)? {
        0 => Err(ConfigError::Zero { key }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

/// Map classic level names (`WARNING`, `CRITICAL`, ...) to a `tracing`
/// filter directive. Unknown values are passed through lowercased so that
/// full directives such as `sot_news_bot=debug` keep working.
pub fn log_directive(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "" => "info".to_string(),
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    }
}
