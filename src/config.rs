//! Client configuration loaded from the environment

use crate::watch::RetryPolicy;
use std::time::Duration;

/// Deadline for one aggregate fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Hosted backend base URL (None = in-memory backend)
    pub supabase_url: Option<String>,
    /// Public anon key sent with every REST request
    pub supabase_anon_key: Option<String>,
    /// Credentials used by the binary to sign in against the REST backend
    pub email: Option<String>,
    pub password: Option<String>,
    /// Previously issued access token, used instead of a password sign-in
    pub access_token: Option<String>,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_anon_key: None,
            email: None,
            password: None,
            access_token: None,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Read a variable, treating blank values as unset
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let fetch_timeout = non_empty_var("KIADISA_FETCH_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.fetch_timeout);

        let max_retries = non_empty_var("KIADISA_MAX_RETRIES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.retry.max_retries);

        let backoff_base = non_empty_var("KIADISA_BACKOFF_BASE_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.retry.backoff_base);

        let config = Self {
            supabase_url: non_empty_var("SUPABASE_URL"),
            supabase_anon_key: non_empty_var("SUPABASE_ANON_KEY"),
            email: non_empty_var("KIADISA_EMAIL"),
            password: non_empty_var("KIADISA_PASSWORD"),
            access_token: non_empty_var("SUPABASE_ACCESS_TOKEN"),
            fetch_timeout,
            retry: RetryPolicy {
                max_retries,
                backoff_base,
            },
        };

        if config.supabase_url.is_some() != config.supabase_anon_key.is_some() {
            tracing::warn!(
                "SUPABASE_URL and SUPABASE_ANON_KEY must both be set to use the hosted backend"
            );
        }

        config
    }

    /// Base URL and anon key, when both are configured
    pub fn rest_endpoint(&self) -> Option<(&str, &str)> {
        match (&self.supabase_url, &self.supabase_anon_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}
