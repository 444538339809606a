//! HTTP transport for the Measurement Protocol.

use crate::types::MeasurementPayload;
use crate::Error;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP transport posting payloads to `/mp/collect`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(api_host: &str, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = format!("{}/mp/collect", api_host.trim_end_matches('/'));

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Full collection URL for the given credentials.
    pub fn collect_url(&self, measurement_id: &str, api_secret: &str) -> Result<reqwest::Url, Error> {
        reqwest::Url::parse_with_params(
            &self.endpoint,
            &[("measurement_id", measurement_id), ("api_secret", api_secret)],
        )
        .map_err(|e| Error::Config(format!("invalid endpoint {}: {}", self.endpoint, e)))
    }

    /// Post one payload. No retries.
    pub async fn send(
        &self,
        measurement_id: &str,
        api_secret: &str,
        payload: &MeasurementPayload,
    ) -> Result<StatusCode, Error> {
        let url = self.collect_url(measurement_id, api_secret)?;
        let body = serde_json::to_string(payload)?;

        debug!(
            endpoint = %self.endpoint,
            event_count = payload.events.len(),
            "sending events"
        );

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".into());
            warn!(status = %status, body = %body, "collect request failed");
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = %status, "events sent successfully");

        Ok(status)
    }
}
