//! Listing page retrieval.
//!
//! A plain timed `GET` with a configurable `User-Agent`. Any non-2xx status
//! is an error. There is no retry here; a failed fetch ends the cycle and the
//! next poll tries again.

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Something that can produce the listing page markup.
pub trait PageSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// [`PageSource`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout` and identify
    /// themselves as `user_agent`.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl PageSource for HttpFetcher {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(request_error)?;
        debug!(bytes = body.len(), "Fetched listing page");
        Ok(body)
    }
}
