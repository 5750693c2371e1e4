use thiserror::Error;

/// Typed error hierarchy for unibox.
///
/// Use at module boundaries (provider calls, engine lifecycle, config validation).
/// Internal/leaf functions can continue using `anyhow::Result` — the `Internal` variant
/// allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum UniboxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `UniboxError`.
pub type UniboxResult<T> = std::result::Result<T, UniboxError>;

impl UniboxError {
    /// Whether this error is transient and the operation should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Internal(_) => true,
            Self::Auth(_) | Self::Config(_) | Self::MalformedPayload(_) => false,
        }
    }
}

impl From<reqwest::Error> for UniboxError {
    fn from(err: reqwest::Error) -> Self {
        UniboxError::Provider {
            message: err.to_string(),
            retryable: err.is_timeout() || err.is_connect(),
        }
    }
}

#[cfg(test)]
mod tests;
