//! Fetch coordinator.
//!
//! Drives one binding through `Loading -> Ready | Failed` for whichever key it
//! currently observes. Cache hits are served synchronously; misses run as a
//! tokio task whose settlement is applied only while its attempt token is
//! still current.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::lock::mutex_lock;
use crate::cache::{CacheConfig, CacheStore, RequestKey, Sequence, WritePolicy};

use super::binding::{AttemptToken, BindingSlot, RequestState, Snapshot};
use super::error::{FailureReport, FetchError};
use super::source::{Decoder, Fetcher};

const SOURCE: &str = "fetch::coordinator";

const METRIC_FETCH_MS: &str = "fetchbind_fetch_ms";
const METRIC_FETCH_FAILURE: &str = "fetchbind_fetch_failure_total";
const METRIC_FETCH_DISCARDED: &str = "fetchbind_fetch_discarded_total";

/// What `observe` did with the supplied key.
#[derive(Debug)]
pub enum Observation {
    /// Empty key or detached binding; nothing changed.
    Skipped,
    /// Served from the store without a request.
    Hit,
    /// A request is in flight.
    Pending(JoinHandle<Settlement>),
    /// No tokio runtime was available to issue the request; the binding is
    /// `Failed` with a network error.
    Unscheduled,
}

/// How a request's settlement was handled by its binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Applied,
    /// The binding moved on to another key or was detached first.
    Discarded,
}

impl Observation {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Wait for the in-flight request, if any.
    pub async fn settled(self) -> Option<Settlement> {
        match self {
            Self::Skipped | Self::Hit | Self::Unscheduled => None,
            Self::Pending(handle) => match handle.await {
                Ok(settlement) => Some(settlement),
                Err(err) => {
                    warn!(error = %err, "Fetch task ended without settling");
                    Some(Settlement::Discarded)
                }
            },
        }
    }
}

struct Shared<V> {
    slot: Mutex<BindingSlot<V>>,
    updates: watch::Sender<Snapshot<V>>,
}

impl<V: Clone> Shared<V> {
    fn publish(&self, slot: &BindingSlot<V>) {
        self.updates.send_replace(slot.state().snapshot());
    }
}

/// Binds one consumer to a request key.
///
/// Every coordinator shares the same [`CacheStore`]; binding state is owned
/// exclusively by the coordinator and is detached when it is dropped.
pub struct FetchCoordinator<V> {
    id: Uuid,
    shared: Arc<Shared<V>>,
    store: Arc<CacheStore<V>>,
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder<V>>,
    policy: WritePolicy,
}

impl<V> FetchCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<CacheStore<V>>,
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn Decoder<V>>,
        config: &CacheConfig,
    ) -> Self {
        let slot = BindingSlot::new();
        let (updates, _) = watch::channel(slot.state().snapshot());
        Self {
            id: Uuid::new_v4(),
            shared: Arc::new(Shared {
                slot: Mutex::new(slot),
                updates,
            }),
            store,
            fetcher,
            decoder,
            policy: config.write_policy,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Bind to `key`, serving it from the store or issuing a request.
    ///
    /// Misses are spawned on the current tokio runtime. Outside a runtime the
    /// binding fails immediately with a network error.
    pub fn observe(&self, key: impl Into<RequestKey>) -> Observation {
        let key = key.into();
        if key.is_empty() {
            debug!(binding_id = %self.id, "Ignoring empty request key");
            return Observation::Skipped;
        }

        let mut slot = mutex_lock(&self.shared.slot, SOURCE, "observe");
        if slot.is_detached() {
            debug!(binding_id = %self.id, key = %key, "Ignoring observe on detached binding");
            return Observation::Skipped;
        }

        let token = slot.begin(key.clone());
        self.shared.publish(&slot);

        if let Some(value) = self.store.get(key.as_str()) {
            slot.settle(token, RequestState::Ready(value));
            self.shared.publish(&slot);
            debug!(
                binding_id = %self.id,
                key = %key,
                generation = token.generation(),
                result = "hit",
                "Served binding from cache"
            );
            return Observation::Hit;
        }

        let Ok(runtime) = Handle::try_current() else {
            let err = FetchError::network("no tokio runtime available to issue the request");
            counter!(METRIC_FETCH_FAILURE, "kind" => err.kind().as_str()).increment(1);
            warn!(
                binding_id = %self.id,
                key = %key,
                generation = token.generation(),
                "Cannot issue request outside a tokio runtime"
            );
            slot.settle(token, RequestState::Failed(FailureReport::from(err)));
            self.shared.publish(&slot);
            return Observation::Unscheduled;
        };
        drop(slot);

        let attempt = Attempt {
            binding_id: self.id,
            key,
            token,
            sequence: self.store.next_sequence(),
            policy: self.policy,
            shared: Arc::clone(&self.shared),
            store: Arc::clone(&self.store),
            fetcher: Arc::clone(&self.fetcher),
            decoder: Arc::clone(&self.decoder),
        };
        debug!(
            binding_id = %self.id,
            key = %attempt.key,
            generation = token.generation(),
            sequence = attempt.sequence,
            result = "miss",
            "Issuing request"
        );

        Observation::Pending(runtime.spawn(attempt.run()))
    }

    /// Stop applying settlements to this binding.
    ///
    /// In-flight requests still finish and still write the store.
    pub fn detach(&self) {
        let mut slot = mutex_lock(&self.shared.slot, SOURCE, "detach");
        if !slot.is_detached() {
            slot.detach();
            debug!(binding_id = %self.id, "Binding detached");
        }
    }

    pub fn is_detached(&self) -> bool {
        mutex_lock(&self.shared.slot, SOURCE, "is_detached").is_detached()
    }

    pub fn key(&self) -> Option<RequestKey> {
        mutex_lock(&self.shared.slot, SOURCE, "key").key().cloned()
    }

    pub fn state(&self) -> RequestState<V> {
        mutex_lock(&self.shared.slot, SOURCE, "state")
            .state()
            .clone()
    }

    pub fn snapshot(&self) -> Snapshot<V> {
        mutex_lock(&self.shared.slot, SOURCE, "snapshot")
            .state()
            .snapshot()
    }

    /// Receive a fresh snapshot on every status change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<V>> {
        self.shared.updates.subscribe()
    }
}

impl<V> Drop for FetchCoordinator<V> {
    fn drop(&mut self) {
        mutex_lock(&self.shared.slot, SOURCE, "drop").detach();
    }
}

struct Attempt<V> {
    binding_id: Uuid,
    key: RequestKey,
    token: AttemptToken,
    sequence: Sequence,
    policy: WritePolicy,
    shared: Arc<Shared<V>>,
    store: Arc<CacheStore<V>>,
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder<V>>,
}

impl<V> Attempt<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Decode `body`, turning a panicking decoder into a decode failure.
    fn decode(&self, body: &[u8]) -> Result<V, FetchError> {
        catch_unwind(AssertUnwindSafe(|| self.decoder.decode(body))).unwrap_or_else(|_| {
            warn!(
                binding_id = %self.binding_id,
                key = %self.key,
                "Decoder panicked"
            );
            Err(FetchError::decode("decoder panicked"))
        })
    }

    async fn run(self) -> Settlement {
        let started = Instant::now();
        let outcome = match self.fetcher.fetch(&self.key).await {
            Ok(body) => self.decode(&body),
            Err(err) => Err(err),
        };
        histogram!(METRIC_FETCH_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let next = match outcome {
            Ok(value) => {
                let write = self.store.record(
                    self.key.clone(),
                    value.clone(),
                    self.sequence,
                    self.policy,
                );
                debug!(
                    binding_id = %self.binding_id,
                    key = %self.key,
                    sequence = self.sequence,
                    write = ?write,
                    "Request settled"
                );
                RequestState::Ready(value)
            }
            Err(err) => {
                counter!(METRIC_FETCH_FAILURE, "kind" => err.kind().as_str()).increment(1);
                debug!(
                    binding_id = %self.binding_id,
                    key = %self.key,
                    error = %err,
                    "Request failed"
                );
                RequestState::Failed(FailureReport::from(err))
            }
        };

        let mut slot = mutex_lock(&self.shared.slot, SOURCE, "settle");
        if slot.settle(self.token, next) {
            self.shared.publish(&slot);
            Settlement::Applied
        } else {
            counter!(METRIC_FETCH_DISCARDED).increment(1);
            debug!(
                binding_id = %self.binding_id,
                key = %self.key,
                generation = self.token.generation(),
                detached = slot.is_detached(),
                result = "discarded",
                "Dropped stale settlement"
            );
            Settlement::Discarded
        }
    }
}
