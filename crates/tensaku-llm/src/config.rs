//! Provider configuration.
//!
//! Connection-level settings for a completion provider: credential, endpoint
//! and default model. Generation parameters (temperature, max tokens) belong
//! to the request, not the provider.

use serde::{Deserialize, Serialize};

/// Configuration for a completion provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (inline).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for the API key (alternative to inline key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Base URL override (for proxies or compatible endpoints).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Default model for this provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl ProviderConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set API key directly.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set API key from environment variable name.
    pub fn with_api_key_env(mut self, env_var: impl Into<String>) -> Self {
        self.api_key_env = Some(env_var.into());
        self
    }

    /// Set base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Resolve the API key from config or environment.
    ///
    /// An inline key wins; otherwise the named environment variable is
    /// consulted. `OPENAI_API_KEY` is read only when neither source is
    /// configured.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }

        if let Some(env_var) = &self.api_key_env {
            return std::env::var(env_var).ok();
        }

        std::env::var("OPENAI_API_KEY").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_key_precedence() {
        // SAFETY: Single-threaded test, no other code is reading this env var concurrently
        unsafe {
            std::env::set_var("TENSAKU_TEST_API_KEY", "key-from-env");
        }

        let config = ProviderConfig::new().with_api_key_env("TENSAKU_TEST_API_KEY");
        assert_eq!(config.resolve_api_key(), Some("key-from-env".into()));

        // Direct key takes precedence
        let config = config.with_api_key("direct-key");
        assert_eq!(config.resolve_api_key(), Some("direct-key".into()));

        // SAFETY: Single-threaded test cleanup
        unsafe {
            std::env::remove_var("TENSAKU_TEST_API_KEY");
        }
    }

    #[test]
    fn test_missing_named_env_var_is_none() {
        let config = ProviderConfig::new().with_api_key_env("TENSAKU_TEST_MISSING_KEY");
        assert_eq!(config.resolve_api_key(), None);
    }

    #[test]
    fn test_serde_skips_unset_fields() {
        let config = ProviderConfig::new().with_default_model("gpt-4o-mini");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, "{\"default_model\":\"gpt-4o-mini\"}");

        let parsed: ProviderConfig = serde_json::from_str("{}").unwrap();
        assert!(parsed.api_key.is_none());
        assert!(parsed.base_url.is_none());
    }
}
