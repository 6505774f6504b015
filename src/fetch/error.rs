use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Why a fetch attempt failed.
///
/// Every variant is recovered locally by moving the binding to `Failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("network request failed: {0}")]
    Network(String),
    #[error("network response was not ok (status {status})")]
    Response { status: u16 },
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn response(status: u16) -> Self {
        Self::Response { status }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Network,
            Self::Response { .. } => FailureKind::Response,
            Self::Decode(_) => FailureKind::Decode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Response,
    Decode,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Response => "response",
            Self::Decode => "decode",
        }
    }
}

/// Failure detail kept on a failed binding.
///
/// Consumers only see the message; the kind is retained for callers that want
/// to branch on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&FetchError> for FailureReport {
    fn from(error: &FetchError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<FetchError> for FailureReport {
    fn from(error: FetchError) -> Self {
        Self::from(&error)
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
