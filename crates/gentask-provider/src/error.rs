//! Provider error types.

use thiserror::Error;

use gentask_models::FailureClass;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by provider adapters.
///
/// The two variants are the enumerated classification the fallback
/// coordinator relies on; adapters map provider-specific status codes to
/// them instead of letting callers guess from provider prose.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider says the request itself is invalid (bad input, policy,
    /// auth, quota). Not retryable on the same provider.
    #[error("Provider rejected request: {0}")]
    Rejected(String),

    /// Transient provider trouble (network, 5xx, overload). Retryable.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Whether a retry (same or different provider) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }

    /// The failure class recorded on the attempt.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            ProviderError::Rejected(_) => FailureClass::Rejected,
            ProviderError::Unavailable(_) => FailureClass::Unavailable,
        }
    }

    /// Classify an HTTP status from a provider response.
    ///
    /// 408/429 and 5xx are transient; any other 4xx means the provider
    /// understood the request and refused it.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            Self::Unavailable(format!("{}: {}", status, body))
        } else {
            Self::Rejected(format!("{}: {}", status, body))
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // Transport-level failures are always transient from our side
        Self::Unavailable(err.to_string())
    }
}
