//! reqwest-based implementation of the bot HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use skiff_core::{EventBatch, Params, RawEvent, Transport, TransportError, TransportResult};
use tracing::{debug, trace};

use super::{classify_response, endpoint, user_agent};

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL, e.g. `https://api.icq.net/bot/v1`.
    pub api_url: String,
    pub token: String,
    /// Timeout of ordinary calls, and slack added to the poll time for
    /// `events/get`.
    pub request_timeout: Duration,
    pub app_name: Option<String>,
    pub app_version: Option<String>,
}

impl HttpConfig {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token: token.into(),
            request_timeout: Duration::from_secs(20),
            app_name: None,
            app_version: None,
        }
    }
}

/// Bot API client over HTTP.
pub struct HttpTransport {
    client: Client,
    api_url: String,
    token: String,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Builds the underlying HTTP client.
    pub fn new(config: HttpConfig) -> TransportResult<Self> {
        let agent = user_agent(
            &config.token,
            config.app_name.as_deref(),
            config.app_version.as_deref(),
        );
        let client = ClientBuilder::new()
            .user_agent(agent)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url,
            token: config.token,
            request_timeout: config.request_timeout,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn get(&self, method: &str, params: &Params, timeout: Duration) -> TransportResult<Value> {
        // The token is added here and never logged.
        debug!(method, params = ?params, "API request");

        let response = self
            .client
            .get(endpoint(&self.api_url, method))
            .query(&[("token", self.token.as_str())])
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;
        trace!(method, status, body = %body, "API response");

        classify_response(status, &body)
    }
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        // The URL carries the token
        TransportError::Network(e.without_url().to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_events(
        &self,
        poll_time: Duration,
        last_event_id: i64,
    ) -> TransportResult<Vec<RawEvent>> {
        let params: Params = vec![
            ("pollTime", poll_time.as_secs().to_string()),
            ("lastEventId", last_event_id.to_string()),
        ];
        let value = self
            .get("events/get", &params, poll_time + self.request_timeout)
            .await?;
        let batch: EventBatch = serde_json::from_value(value)?;
        Ok(batch.events)
    }

    async fn call_api(&self, method: &str, params: Params) -> TransportResult<Value> {
        self.get(method, &params, self.request_timeout).await
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("api_url", &self.api_url)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_settings_and_hides_token() {
        let mut config = HttpConfig::new("https://api.icq.net/bot/v1", "001.2:345");
        config.request_timeout = Duration::from_secs(5);
        let transport = HttpTransport::new(config).unwrap();

        assert_eq!(transport.api_url(), "https://api.icq.net/bot/v1");
        let debug = format!("{transport:?}");
        assert!(!debug.contains("345"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let mut config = HttpConfig::new("http://127.0.0.1:9", "001.2:345");
        config.request_timeout = Duration::from_secs(2);
        let transport = HttpTransport::new(config).unwrap();

        let err = transport.call_api("self/get", Vec::new()).await.unwrap_err();
        assert!(
            matches!(err, TransportError::Network(ref msg) if !msg.contains("001.2:345")),
            "{err:?}"
        );
    }
}
