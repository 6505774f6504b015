//! Per-consumer binding state.

use serde::Serialize;

use crate::cache::RequestKey;

use super::error::FailureReport;

/// Lifecycle of the request a binding currently observes.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState<V> {
    Loading,
    Ready(V),
    Failed(FailureReport),
}

impl<V> RequestState<V> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn data(&self) -> Option<&V> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&FailureReport> {
        match self {
            Self::Failed(report) => Some(report),
            _ => None,
        }
    }
}

impl<V: Clone> RequestState<V> {
    pub fn snapshot(&self) -> Snapshot<V> {
        Snapshot {
            data: self.data().cloned(),
            loading: self.is_loading(),
            error: self.error().map(|report| report.message.clone()),
        }
    }
}

/// Read-only `{ data, loading, error }` view handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot<V> {
    pub data: Option<V>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<V> Snapshot<V> {
    pub fn loading() -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
        }
    }
}

/// Identifies one request attempt of one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttemptToken(u64);

impl AttemptToken {
    pub(crate) fn generation(self) -> u64 {
        self.0
    }
}

/// Mutable binding state guarded by the coordinator's mutex.
#[derive(Debug)]
pub(crate) struct BindingSlot<V> {
    key: Option<RequestKey>,
    generation: u64,
    detached: bool,
    state: RequestState<V>,
}

impl<V> BindingSlot<V> {
    pub(crate) fn new() -> Self {
        Self {
            key: None,
            generation: 0,
            detached: false,
            state: RequestState::Loading,
        }
    }

    pub(crate) fn key(&self) -> Option<&RequestKey> {
        self.key.as_ref()
    }

    pub(crate) fn state(&self) -> &RequestState<V> {
        &self.state
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached
    }

    /// Start a new attempt for `key`, invalidating every earlier token.
    pub(crate) fn begin(&mut self, key: RequestKey) -> AttemptToken {
        self.generation += 1;
        self.key = Some(key);
        self.state = RequestState::Loading;
        AttemptToken(self.generation)
    }

    pub(crate) fn is_current(&self, token: AttemptToken) -> bool {
        !self.detached && self.generation == token.0
    }

    /// Apply a settled state if `token` still owns the binding.
    pub(crate) fn settle(&mut self, token: AttemptToken, state: RequestState<V>) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.state = state;
        true
    }

    pub(crate) fn detach(&mut self) {
        self.detached = true;
        self.generation += 1;
    }
}
