//! Fetch configuration.

use std::time::Duration;

use url::Url;

/// Settings consumed by [`HttpFetcher`](super::HttpFetcher).
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Base URL that relative keys such as `/a` are joined onto.
    pub base_url: Option<Url>,
    /// Per-request timeout; `None` waits for the transport.
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
}

impl FetchConfig {
    pub fn default_user_agent() -> &'static str {
        concat!("fetchbind/", env!("CARGO_PKG_VERSION"))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout: None,
            user_agent: Self::default_user_agent().to_string(),
        }
    }
}

impl From<&crate::config::FetchSettings> for FetchConfig {
    fn from(settings: &crate::config::FetchSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            request_timeout: settings.request_timeout,
            user_agent: settings.user_agent.clone(),
        }
    }
}
