use std::time::Duration;

use async_trait::async_trait;
use bw_types::ChangeEvent;
use reqwest::{Client, StatusCode};

use crate::error::{SinkError, SinkResult};
use crate::sink::{Ack, Sink};

/// Header carrying the event id so receivers can drop duplicates.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs each event as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> SinkResult<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// Like [`new`](Self::new) with a per-request timeout.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> SinkResult<Self> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| SinkError::Permanent(format!("invalid webhook url {url:?}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bucket-watcher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SinkError::Permanent(format!("http client: {e}")))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Sink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, event: &ChangeEvent) -> SinkResult<Ack> {
        let response = self
            .client
            .post(&self.url)
            .header(IDEMPOTENCY_HEADER, event.id.to_string())
            .json(event)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    SinkError::Permanent(e.to_string())
                } else {
                    SinkError::Retryable(e.to_string())
                }
            })?;

        let status = response.status();
        match classify_status(status) {
            None => Ok(Ack::with_receipt(status.as_u16().to_string())),
            Some(err) => Err(err),
        }
    }
}

/// `None` for success; otherwise how the failure should be treated.
fn classify_status(status: StatusCode) -> Option<SinkError> {
    if status.is_success() {
        None
    } else if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        Some(SinkError::Retryable(format!("webhook returned {status}")))
    } else {
        Some(SinkError::Permanent(format!("webhook returned {status}")))
    }
}
