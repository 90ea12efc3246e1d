use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Failed to build the HTTP client (bad proxy URL, TLS setup)
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Non-retryable upstream response (4xx other than throttling)
    #[error("Upstream rejected request to {endpoint}: HTTP {status}")]
    Rejected { endpoint: String, status: u16 },

    /// Retry budget exhausted; the page is treated as unavailable
    #[error("Page unavailable from {endpoint} after {attempts} attempts: {last_error}")]
    PageUnavailable {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },
}

impl FetchError {
    /// True when the failure came from running out of retries
    pub fn is_unavailable(&self) -> bool {
        matches!(self, FetchError::PageUnavailable { .. })
    }
}
