//! Webhook delivery with a single rate-limit retry.
//!
//! Each article is posted as one message carrying a single embed (linked
//! title plus a fixed description) under the configured display name.
//!
//! # Rate limiting
//!
//! When the endpoint answers `429 Too Many Requests` the body is expected to
//! carry `{"retry_after": <seconds>}`. The notifier sleeps for exactly that
//! long ([`DEFAULT_RETRY_AFTER`] if the body is unusable) and sends the same
//! message once more. A second 429, or any other non-2xx status, is an error.
//! Network errors and timeouts are returned immediately.
//!
//! Item-level retry is not done here: a failed item stays unrecorded and the
//! poll loop offers it again next cycle.

use reqwest::{Client, Response, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::models::{Embed, RateLimitBody, WebhookMessage};
use crate::utils::truncate_for_log;

/// Fallback delay when a 429 body has no usable `retry_after`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Fixed embed description.
pub const EMBED_DESCRIPTION: &str = "Новая публикация на официальном сайте.";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook still rate limited after waiting {waited:?}")]
    RateLimited { waited: Duration },
    #[error("webhook returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Delivers one article to the destination channel.
pub trait Notify {
    async fn deliver(&self, title: &str, url: &str, username: &str) -> Result<(), NotifyError>;
}

/// [`Notify`] over a Discord-compatible webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NotifyError::Client)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn post(&self, message: &WebhookMessage) -> Result<Response, NotifyError> {
        Ok(self
            .client
            .post(&self.endpoint)
            .json(message)
            .send()
            .await?)
    }
}

/// Build the webhook body for one article.
pub fn build_message(title: &str, url: &str, username: &str) -> WebhookMessage {
    WebhookMessage {
        username: username.to_string(),
        embeds: vec![Embed {
            title: title.to_string(),
            url: url.to_string(),
            description: EMBED_DESCRIPTION.to_string(),
        }],
    }
}

/// Read the retry delay out of a 429 body.
pub fn parse_retry_after(body: &str) -> Duration {
    serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .and_then(|b| b.retry_after)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

async fn into_status_error(response: Response) -> NotifyError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    NotifyError::Status {
        status,
        body: truncate_for_log(&body, 300),
    }
}

impl Notify for WebhookNotifier {
    #[instrument(level = "info", skip(self, title, username))]
    async fn deliver(&self, title: &str, url: &str, username: &str) -> Result<(), NotifyError> {
        let t0 = Instant::now();
        let message = build_message(title, url, username);

        let mut response = self.post(&message).await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            let delay = parse_retry_after(&body);
            warn!(?delay, "Webhook rate limited; sleeping before one retry");
            sleep(delay).await;

            response = self.post(&message).await?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(NotifyError::RateLimited { waited: delay });
            }
        }

        if !response.status().is_success() {
            return Err(into_status_error(response).await);
        }

        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "Webhook accepted message");
        Ok(())
    }
}
