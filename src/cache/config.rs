//! Cache configuration.
//!
//! Controls how the shared store resolves concurrent writes via the
//! `[cache]` table of `fetchbind.toml`.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How the store treats a write that settles after a newer request for the
/// same key was already written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Blind overwrite: the request that settles last wins, even when it was
    /// issued first.
    #[default]
    LastSettled,
    /// Reject writes whose request was issued before the one that produced
    /// the stored value.
    NewestIssued,
}

impl WritePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LastSettled => "last_settled",
            Self::NewestIssued => "newest_issued",
        }
    }
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WritePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "last_settled" => Ok(Self::LastSettled),
            "newest_issued" => Ok(Self::NewestIssued),
            other => Err(format!(
                "unknown write policy `{other}` (expected last_settled or newest_issued)"
            )),
        }
    }
}

/// Cache configuration from `fetchbind.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Ordering rule for concurrent writes to the same key.
    pub write_policy: WritePolicy,
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            write_policy: settings.write_policy,
        }
    }
}
