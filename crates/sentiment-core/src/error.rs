use thiserror::Error;

/// Failures surfaced by a news source after its retry policy has run its course.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The provider kept answering 429 until the attempt budget ran out.
    #[error("Rate limited by news provider after {attempts} attempts (retry after {retry_after_secs}s)")]
    RateLimited { attempts: u32, retry_after_secs: u64 },

    /// The provider answered with a status other than 2xx or 429.
    #[error("API request failed with status code {status}: {details}")]
    UpstreamError { status: u16, details: String },

    /// The provider answered 2xx but the body was not a JSON list of news items.
    #[error("Unexpected API response format: {0}")]
    MalformedResponse(String),

    /// No HTTP response at all (refused, timed out, DNS) on every attempt.
    #[error("Failed to connect to news provider after {attempts} attempts: {message}")]
    ConnectionFailed { attempts: u32, message: String },
}

impl FetchError {
    /// Whether the failure plausibly says something about the requested ticker
    /// rather than about our connectivity or the provider's health.
    pub fn is_ticker_related(&self) -> bool {
        matches!(
            self,
            FetchError::UpstreamError { .. } | FetchError::RateLimited { .. }
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("Scoring backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid scoring response: {0}")]
    InvalidResponse(String),
}
