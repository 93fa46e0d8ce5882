use std::time::Duration;

/// Default inference service endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
/// Model used when a request names none.
pub const DEFAULT_MODEL: &str = "llama3";
/// Default per-request timeout for generation and embeddings.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Connection settings for the inference service.
///
/// Read once at startup and treated as immutable afterwards; the
/// transport client keeps no other state between calls.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL of the inference service, without a trailing slash.
    pub base_url: String,
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Timeout applied to generation and embedding requests.
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl OllamaConfig {
    /// Build a config from `OLLAMA_BASE_URL`, `OLLAMA_DEFAULT_MODEL` and
    /// `OLLAMA_TIMEOUT_MS`, falling back to the documented defaults for
    /// any variable that is unset or unparsable.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_BASE_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let default_model = std::env::var("OLLAMA_DEFAULT_MODEL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeout_ms = std::env::var("OLLAMA_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Override the base URL, trimming any trailing slash.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Override the generation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_ollama() {
        let cfg = OllamaConfig::default();
        assert_eq!(cfg.base_url, "http://localhost:11434");
        assert_eq!(cfg.default_model, "llama3");
        assert_eq!(cfg.timeout, Duration::from_millis(120_000));
    }

    #[test]
    fn with_base_url_trims_trailing_slash() {
        let cfg = OllamaConfig::default().with_base_url("http://host:1234/");
        assert_eq!(cfg.base_url, "http://host:1234");
    }
}
