//! Relay configuration.

use std::time::Duration;

/// Default Measurement Protocol host.
pub const DEFAULT_API_HOST: &str = "https://www.google-analytics.com";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub(crate) measurement_id: String,
    pub(crate) api_secret: String,
    pub(crate) debug: bool,
    pub(crate) auto_file_transfer_processing: bool,
    pub(crate) api_host: String,
    pub(crate) timeout: Duration,
    pub(crate) max_event_age: Option<Duration>,
}

impl RelayConfig {
    /// Create a new builder with the given measurement id and API secret.
    pub fn builder(
        measurement_id: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> RelayConfigBuilder {
        RelayConfigBuilder::new(measurement_id, api_secret)
    }

    /// Get the GA4 measurement id.
    pub fn measurement_id(&self) -> &str {
        &self.measurement_id
    }

    /// Get the API secret.
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Get the debug flag.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Whether the relay drains the inbox on its own.
    pub fn auto_file_transfer_processing(&self) -> bool {
        self.auto_file_transfer_processing
    }

    /// Get the API host.
    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    /// Get the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Events older than this are sent without `timestamp_micros`.
    pub fn max_event_age(&self) -> Option<Duration> {
        self.max_event_age
    }
}

/// Builder for relay configuration.
#[derive(Debug)]
pub struct RelayConfigBuilder {
    measurement_id: String,
    api_secret: String,
    debug: Option<bool>,
    auto_file_transfer_processing: Option<bool>,
    api_host: Option<String>,
    timeout: Option<Duration>,
    max_event_age: Option<Duration>,
}

impl RelayConfigBuilder {
    /// Create a new builder with the given measurement id and API secret.
    pub fn new(measurement_id: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            measurement_id: measurement_id.into(),
            api_secret: api_secret.into(),
            debug: None,
            auto_file_transfer_processing: None,
            api_host: None,
            timeout: None,
            max_event_age: None,
        }
    }

    /// Enable verbose request logging.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Drain the inbox automatically. Defaults to true.
    pub fn auto_file_transfer_processing(mut self, enabled: bool) -> Self {
        self.auto_file_transfer_processing = Some(enabled);
        self
    }

    /// Set the API host.
    pub fn api_host(mut self, host: impl Into<String>) -> Self {
        self.api_host = Some(host.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Drop `timestamp_micros` from events older than `age`.
    pub fn max_event_age(mut self, age: Duration) -> Self {
        self.max_event_age = Some(age);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<RelayConfig, crate::Error> {
        if self.measurement_id.is_empty() {
            return Err(crate::Error::Config("measurement_id cannot be empty".into()));
        }
        if self.api_secret.is_empty() {
            return Err(crate::Error::Config("api_secret cannot be empty".into()));
        }

        Ok(RelayConfig {
            measurement_id: self.measurement_id,
            api_secret: self.api_secret,
            debug: self.debug.unwrap_or(false),
            auto_file_transfer_processing: self.auto_file_transfer_processing.unwrap_or(true),
            api_host: self
                .api_host
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_HOST.into()),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            max_event_age: self.max_event_age,
        })
    }
}
