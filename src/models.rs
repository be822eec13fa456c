//! Data models shared by the extractor, the state store and the notifier.
//!
//! - [`Item`]: a news entry discovered on one load of the listing page
//! - `PostedRecord`: a stored row, read back in tests
//! - [`WebhookMessage`] / [`Embed`]: the JSON body sent to the webhook
//! - [`RateLimitBody`]: the JSON body of a `429 Too Many Requests` reply

use serde::{Deserialize, Serialize};

/// A news entry extracted from the listing page.
///
/// `url` is absolute and is the only identity key; `title` is `None` when no
/// usable headline could be found in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Absolute article URL, resolved against the listing page.
    pub url: String,
    /// Best-effort headline, raw as found in the markup.
    pub title: Option<String>,
}

impl Item {
    pub fn new(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            url: url.into(),
            title,
        }
    }

    /// The headline, or the URL itself when the markup offered none.
    pub fn title_or_url(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// A row of the `posted` table.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PostedRecord {
    pub url: String,
    /// Title as delivered; never overwritten after the first insert.
    pub title: String,
    pub posted_at: chrono::NaiveDateTime,
}

/// Discord-style webhook execution body.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WebhookMessage {
    /// Display name the message is posted under.
    pub username: String,
    pub embeds: Vec<Embed>,
}

/// A single rich embed: linked title plus a short description.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// Body of a rate-limited reply. Only `retry_after` (seconds) is read.
#[derive(Debug, Deserialize)]
pub struct RateLimitBody {
    pub retry_after: Option<f64>,
}
