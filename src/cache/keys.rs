//! Request key definitions.
//!
//! A `RequestKey` identifies a cacheable network resource, usually a URL or a
//! path relative to the configured base URL.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Opaque identifier for a cacheable resource.
///
/// Cloning is cheap; every binding and cache entry shares the same
/// allocation for a given key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(Arc<str>);

impl RequestKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Empty keys never trigger a request.
    ///
    /// Whitespace-only keys count as empty too.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Borrow<str> for RequestKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for RequestKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RequestKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&String> for RequestKey {
    fn from(value: &String) -> Self {
        Self::new(value.as_str())
    }
}
