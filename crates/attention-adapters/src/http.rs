//! HTTP event forwarder to the record-keeping backend.

use std::time::Duration;

use async_trait::async_trait;
use attention_core::domain::AttentionEvent;
use attention_core::ports::{Delivery, EventSink, ForwardError};
use tracing::{debug, warn};

/// Default bound on one backend call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts events to `{base}/api/{endpoint}/` with a bearer token.
///
/// Without a token the forwarder is disabled and reports
/// [`Delivery::Disabled`] for every event.
pub struct HttpEventForwarder {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpEventForwarder {
    /// Creates a forwarder. Empty tokens count as unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let token = token.filter(|t| !t.trim().is_empty());
        if token.is_none() {
            warn!("No backend token configured; events will not be forwarded");
        }
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            timeout,
        })
    }

    /// Whether events are actually posted.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Target URL for `event`.
    #[must_use]
    pub fn url_for(&self, event: &AttentionEvent) -> String {
        format!("{}/api/{}/", self.base_url, event.session.endpoint())
    }
}

#[async_trait]
impl EventSink for HttpEventForwarder {
    async fn send(&self, event: &AttentionEvent) -> Result<Delivery, ForwardError> {
        let Some(token) = &self.token else {
            return Ok(Delivery::Disabled);
        };
        let url = self.url_for(event);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(event)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ForwardError::Timeout {
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    ForwardError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            warn!(%url, status = status.as_u16(), "Backend rejected event");
            return Err(ForwardError::Status {
                status: status.as_u16(),
            });
        }
        debug!(%url, session = %event.session, "Event forwarded");
        Ok(Delivery::Accepted)
    }
}
