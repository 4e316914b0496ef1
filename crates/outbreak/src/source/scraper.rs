use std::future::Future;
use std::time::Duration;

use reqwest::Client;

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Timed out after {secs}s fetching {url}")]
    Timeout { url: String, secs: u64 },
    #[error("Empty response from {0}")]
    EmptyResponse(String),
}

/// Retrieves the raw source document for one cycle.
pub trait Fetch {
    fn fetch(&self) -> impl Future<Output = Result<String, ScraperError>> + Send;
}

#[derive(Debug, Clone)]
pub struct WebScraper {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebScraper {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get_text(&self) -> Result<String, ScraperError> {
        let text = self
            .client
            .get(&self.url)
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?;

        if text.trim().is_empty() {
            return Err(ScraperError::EmptyResponse(self.url.clone()));
        }

        Ok(text)
    }
}

impl Fetch for WebScraper {
    async fn fetch(&self) -> Result<String, ScraperError> {
        log::info!("Fetching source table from {}...", self.url);

        self.get_text().await.map_err(|e| match e {
            ScraperError::HttpError(err) if err.is_timeout() => ScraperError::Timeout {
                url: self.url.clone(),
                secs: self.timeout.as_secs(),
            },
            other => other,
        })
    }
}
