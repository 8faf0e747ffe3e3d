use crate::config::ScannerConfig;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use scanner_core::{Event, EventFeed, ScannerError};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Client for the polisen.se events endpoint.
pub struct PolisFeed {
    client: reqwest::Client,
    url: String,
    retries: u32,
    backoff: Duration,
}

impl PolisFeed {
    pub fn new(config: &ScannerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.feed.timeout())
            .user_agent(format!("{}/{}", config.app_name, env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: config.feed.url.clone(),
            retries: config.feed.retries.max(1),
            backoff: config.feed.backoff(),
        })
    }

    async fn request(&self) -> scanner_core::Result<Vec<Event>> {
        let resp = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        check_status(resp.status())?;
        let body = resp.bytes().await.map_err(transport_error)?;
        parse_events(&body)
    }
}

#[async_trait]
impl EventFeed for PolisFeed {
    fn name(&self) -> &str {
        &self.url
    }

    /// Retries timeouts and unavailability with doubling backoff. Any other
    /// failure is returned at once.
    async fn fetch(&self) -> scanner_core::Result<Vec<Event>> {
        let mut backoff = self.backoff;

        for attempt in 1..=self.retries {
            match self.request().await {
                Ok(events) => {
                    debug!("Fetched {} events", events.len());
                    return Ok(events);
                }
                Err(e) if e.is_retryable() => {
                    warn!("Feed attempt {}/{} failed: {}", attempt, self.retries, e);
                }
                Err(e) => return Err(e),
            }

            if attempt < self.retries {
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }

        Err(ScannerError::FeedUnavailable(format!(
            "failed after {} attempts",
            self.retries
        )))
    }
}

/// Double the delay, capped instead of overflowing.
pub fn next_backoff(backoff: Duration) -> Duration {
    backoff.saturating_mul(2)
}

fn transport_error(e: reqwest::Error) -> ScannerError {
    if e.is_timeout() {
        ScannerError::FeedTimeout
    } else {
        ScannerError::FeedUnavailable(format!("network error: {}", e))
    }
}

/// 403 means the feed is rate limiting us; that and 5xx are worth a retry.
pub fn check_status(status: StatusCode) -> scanner_core::Result<()> {
    if status == StatusCode::FORBIDDEN {
        return Err(ScannerError::FeedUnavailable("blocked (rate limited)".into()));
    }
    if status.is_server_error() {
        return Err(ScannerError::FeedUnavailable(format!("server error {}", status.as_u16())));
    }
    if status != StatusCode::OK {
        return Err(ScannerError::FeedResponse(format!("unexpected status {}", status.as_u16())));
    }
    Ok(())
}

/// The body must be a JSON list. Records without an integer id are skipped.
pub fn parse_events(body: &[u8]) -> scanner_core::Result<Vec<Event>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ScannerError::FeedResponse(format!("invalid JSON: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(ScannerError::FeedResponse("expected a list of events".into()));
    };

    let mut events = Vec::with_capacity(items.len());
    for item in items {
        match Event::try_from(item) {
            Ok(event) => events.push(event),
            Err(e) => warn!("Skipping feed record: {}", e),
        }
    }
    Ok(events)
}
