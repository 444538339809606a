//! Error types for the GA4 bridge.

/// Errors that can occur inside the bridge.
///
/// Public fire-and-forget entry points log these rather than returning them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid or missing configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CBOR encode or decode failed.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Collect endpoint answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// File queue rejected an enqueue or pop.
    #[error("File transfer failed: {0}")]
    Transfer(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
