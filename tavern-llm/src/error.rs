use thiserror::Error;

/// Failures surfaced by the generation service and its transport.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The requested model is not present on the inference service.
    ///
    /// Raised before any generation request is issued so a slow round
    /// trip is never wasted on a call that cannot succeed.
    #[error("model '{0}' is not available on the inference service")]
    ModelUnavailable(String),

    /// Network-level failure reaching the inference service, including
    /// request timeouts.
    #[error("inference service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered, but with a malformed or unexpected body.
    #[error("inference service returned an invalid response: {0}")]
    Protocol(String),
}

impl LlmError {
    /// True when the failure was a transport timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Transport(e) if e.is_timeout())
    }
}
