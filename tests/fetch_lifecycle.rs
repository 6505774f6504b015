//! Binding lifecycle tests against a fetcher whose replies the test releases.
//!
//! Covers cache hits, stale-response discard on rebind, teardown safety, and
//! the write-ordering hazard of the shared store.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use fetchbind::cache::{CacheConfig, CacheStore, RequestKey, WritePolicy};
use fetchbind::fetch::{
    FailureKind, FetchCoordinator, FetchError, Fetcher, JsonDecoder, Observation, RequestState,
    Settlement, Snapshot,
};
use serde_json::{Value, json};
use tokio::sync::oneshot;

type Reply = Result<Bytes, FetchError>;

#[derive(Default)]
struct GatedFetcher {
    calls: AtomicUsize,
    gates: Mutex<HashMap<String, VecDeque<oneshot::Receiver<Reply>>>>,
}

impl GatedFetcher {
    fn gate(&self, key: &str) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .expect("gates lock")
            .entry(key.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let spawned attempts run until `expected` fetches have started.
    async fn wait_for_calls(&self, expected: usize) {
        while self.calls() < expected {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch(&self, key: &RequestKey) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self
            .gates
            .lock()
            .expect("gates lock")
            .get_mut(key.as_str())
            .and_then(VecDeque::pop_front);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(FetchError::network("gate dropped"))),
            None => Err(FetchError::network("no gate registered")),
        }
    }
}

fn ok(value: Value) -> Reply {
    Ok(Bytes::from(value.to_string()))
}

struct Harness {
    store: Arc<CacheStore<Value>>,
    fetcher: Arc<GatedFetcher>,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(CacheStore::new()),
            fetcher: Arc::new(GatedFetcher::default()),
        }
    }

    fn binding(&self) -> FetchCoordinator<Value> {
        self.binding_with(WritePolicy::LastSettled)
    }

    fn binding_with(&self, write_policy: WritePolicy) -> FetchCoordinator<Value> {
        FetchCoordinator::new(
            Arc::clone(&self.store),
            self.fetcher.clone(),
            Arc::new(JsonDecoder::<Value>::new()),
            &CacheConfig { write_policy },
        )
    }
}

fn ready(value: Value) -> Snapshot<Value> {
    Snapshot {
        data: Some(value),
        loading: false,
        error: None,
    }
}

#[tokio::test]
async fn concrete_scenario_second_binding_uses_cache() {
    let harness = Harness::new();

    let first = harness.binding();
    let gate = harness.fetcher.gate("/a");
    let observation = first.observe("/a");
    gate.send(ok(json!({"id": 1}))).expect("send reply");
    assert_eq!(observation.settled().await, Some(Settlement::Applied));

    assert_eq!(first.snapshot(), ready(json!({"id": 1})));
    assert_eq!(harness.store.get("/a"), Some(json!({"id": 1})));
    assert_eq!(harness.fetcher.calls(), 1);

    let second = harness.binding();
    assert!(matches!(second.observe("/a"), Observation::Hit));
    assert_eq!(second.snapshot(), ready(json!({"id": 1})));
    assert_eq!(harness.fetcher.calls(), 1);
}

#[tokio::test]
async fn cache_hit_goes_straight_to_ready() {
    let harness = Harness::new();
    harness.store.put("/a".into(), json!("cached"));

    let binding = harness.binding();
    let mut updates = binding.subscribe();
    let observation = binding.observe("/a");

    assert!(matches!(observation, Observation::Hit));
    assert_eq!(observation.settled().await, None);
    assert_eq!(*updates.borrow_and_update(), ready(json!("cached")));
    assert_eq!(harness.fetcher.calls(), 0);
}

#[tokio::test]
async fn cache_hit_never_refreshes() {
    let harness = Harness::new();
    harness.store.put("/a".into(), json!({"version": 1}));
    // A newer server value is available but never requested.
    let _unused = harness.fetcher.gate("/a");

    let binding = harness.binding();
    binding.observe("/a");
    binding.observe("/a");

    assert_eq!(binding.snapshot(), ready(json!({"version": 1})));
    assert_eq!(harness.fetcher.calls(), 0);
}

#[tokio::test]
async fn miss_issues_exactly_one_request() {
    let harness = Harness::new();
    let binding = harness.binding();

    let gate = harness.fetcher.gate("/fresh");
    let observation = binding.observe("/fresh");
    gate.send(ok(json!([1, 2, 3]))).expect("send reply");
    observation.settled().await;
    assert_eq!(harness.fetcher.calls(), 1);

    let again = harness.binding();
    assert!(matches!(again.observe("/fresh"), Observation::Hit));
    assert_eq!(harness.fetcher.calls(), 1);
}

#[tokio::test]
async fn stale_response_is_discarded_after_rebind() {
    let harness = Harness::new();
    let binding = harness.binding();

    let gate_a = harness.fetcher.gate("/a");
    let gate_b = harness.fetcher.gate("/b");

    let pending_a = binding.observe("/a");
    let pending_b = binding.observe("/b");
    assert!(binding.snapshot().loading);

    gate_b.send(ok(json!("b"))).expect("send b");
    assert_eq!(pending_b.settled().await, Some(Settlement::Applied));
    assert_eq!(binding.snapshot(), ready(json!("b")));

    gate_a.send(ok(json!("a"))).expect("send a");
    assert_eq!(pending_a.settled().await, Some(Settlement::Discarded));

    assert_eq!(binding.snapshot(), ready(json!("b")));
    assert_eq!(binding.key().as_ref().map(RequestKey::as_str), Some("/b"));
    // The store write does not depend on the binding.
    assert_eq!(harness.store.get("/a"), Some(json!("a")));
}

#[tokio::test]
async fn stale_failure_does_not_replace_current_data() {
    let harness = Harness::new();
    let binding = harness.binding();

    let gate_a = harness.fetcher.gate("/a");
    let gate_b = harness.fetcher.gate("/b");

    let pending_a = binding.observe("/a");
    let pending_b = binding.observe("/b");

    gate_a.send(Err(FetchError::response(500))).expect("send a");
    assert_eq!(pending_a.settled().await, Some(Settlement::Discarded));
    assert!(binding.snapshot().loading);
    assert!(binding.snapshot().error.is_none());

    gate_b.send(ok(json!({"ok": true}))).expect("send b");
    pending_b.settled().await;
    assert_eq!(binding.snapshot(), ready(json!({"ok": true})));
}

#[tokio::test]
async fn rebind_to_cached_key_discards_in_flight_request() {
    let harness = Harness::new();
    harness.store.put("/cached".into(), json!(2));
    let binding = harness.binding();

    let gate = harness.fetcher.gate("/slow");
    let pending = binding.observe("/slow");
    assert!(matches!(binding.observe("/cached"), Observation::Hit));

    gate.send(ok(json!(1))).expect("send reply");
    assert_eq!(pending.settled().await, Some(Settlement::Discarded));
    assert_eq!(binding.snapshot(), ready(json!(2)));
}

#[tokio::test]
async fn failure_leaves_absent_key_absent() {
    let harness = Harness::new();
    let binding = harness.binding();

    let gate = harness.fetcher.gate("/a");
    let observation = binding.observe("/a");
    gate.send(Err(FetchError::response(503))).expect("send reply");
    observation.settled().await;

    assert_eq!(
        binding.snapshot(),
        Snapshot {
            data: None,
            loading: false,
            error: Some("network response was not ok (status 503)".to_string()),
        }
    );
    match binding.state() {
        RequestState::Failed(report) => assert_eq!(report.kind, FailureKind::Response),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!harness.store.contains("/a"));
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn failure_leaves_existing_entry_untouched() {
    let harness = Harness::new();
    let failing = harness.binding();
    let succeeding = harness.binding();

    let fail_gate = harness.fetcher.gate("/a");
    let ok_gate = harness.fetcher.gate("/a");

    let failing_attempt = failing.observe("/a");
    harness.fetcher.wait_for_calls(1).await;
    let succeeding_attempt = succeeding.observe("/a");
    harness.fetcher.wait_for_calls(2).await;

    ok_gate.send(ok(json!("good"))).expect("send ok");
    succeeding_attempt.settled().await;
    assert_eq!(harness.store.get("/a"), Some(json!("good")));

    fail_gate.send(Err(FetchError::network("connection reset"))).expect("send failure");
    failing_attempt.settled().await;

    assert_eq!(harness.store.get("/a"), Some(json!("good")));
    assert!(failing.snapshot().error.is_some());
    assert!(failing.snapshot().data.is_none());
}

#[tokio::test]
async fn failed_key_is_requested_again_when_observed_again() {
    let harness = Harness::new();
    let binding = harness.binding();

    let first = harness.fetcher.gate("/a");
    let observation = binding.observe("/a");
    first.send(Err(FetchError::network("offline"))).expect("send failure");
    observation.settled().await;
    assert!(binding.snapshot().error.is_some());

    let second = harness.fetcher.gate("/a");
    let observation = binding.observe("/a");
    // The new attempt starts from a clean loading state.
    assert_eq!(binding.snapshot(), Snapshot::loading());
    second.send(ok(json!(1))).expect("send reply");
    observation.settled().await;

    assert_eq!(binding.snapshot(), ready(json!(1)));
    assert_eq!(harness.fetcher.calls(), 2);
}

#[tokio::test]
async fn detach_suppresses_binding_update_but_store_is_written() {
    let harness = Harness::new();
    let binding = harness.binding();
    let mut updates = binding.subscribe();

    let gate = harness.fetcher.gate("/a");
    let observation = binding.observe("/a");
    updates.borrow_and_update();

    binding.detach();
    gate.send(ok(json!({"id": 9}))).expect("send reply");
    assert_eq!(observation.settled().await, Some(Settlement::Discarded));

    assert!(binding.snapshot().loading);
    assert!(!updates.has_changed().expect("sender alive"));
    assert_eq!(harness.store.get("/a"), Some(json!({"id": 9})));
}

#[tokio::test]
async fn dropping_binding_mid_flight_is_safe() {
    let harness = Harness::new();
    let binding = harness.binding();
    let mut updates = binding.subscribe();

    let gate = harness.fetcher.gate("/a");
    let observation = binding.observe("/a");
    updates.borrow_and_update();
    drop(binding);

    gate.send(ok(json!("late"))).expect("send reply");
    assert_eq!(observation.settled().await, Some(Settlement::Discarded));

    // The sender lives until the attempt finishes, then the channel closes
    // without ever publishing the late value.
    assert!(updates.borrow().loading);
    assert_eq!(harness.store.get("/a"), Some(json!("late")));
}

#[tokio::test]
async fn last_settled_write_wins_even_if_issued_first() {
    // Known ordering hazard: the older request overwrites the newer value.
    let harness = Harness::new();
    let early = harness.binding_with(WritePolicy::LastSettled);
    let late = harness.binding_with(WritePolicy::LastSettled);

    let early_gate = harness.fetcher.gate("/k");
    let late_gate = harness.fetcher.gate("/k");

    let early_attempt = early.observe("/k");
    harness.fetcher.wait_for_calls(1).await;
    let late_attempt = late.observe("/k");
    harness.fetcher.wait_for_calls(2).await;

    late_gate.send(ok(json!("t2"))).expect("send t2");
    late_attempt.settled().await;
    early_gate.send(ok(json!("t1"))).expect("send t1");
    early_attempt.settled().await;

    assert_eq!(harness.store.get("/k"), Some(json!("t1")));
}

#[tokio::test]
async fn newest_issued_keeps_later_request() {
    let harness = Harness::new();
    let early = harness.binding_with(WritePolicy::NewestIssued);
    let late = harness.binding_with(WritePolicy::NewestIssued);

    let early_gate = harness.fetcher.gate("/k");
    let late_gate = harness.fetcher.gate("/k");

    let early_attempt = early.observe("/k");
    harness.fetcher.wait_for_calls(1).await;
    let late_attempt = late.observe("/k");
    harness.fetcher.wait_for_calls(2).await;

    late_gate.send(ok(json!("t2"))).expect("send t2");
    late_attempt.settled().await;
    early_gate.send(ok(json!("t1"))).expect("send t1");
    early_attempt.settled().await;

    assert_eq!(harness.store.get("/k"), Some(json!("t2")));
    // Each binding still shows the outcome of its own request.
    assert_eq!(early.snapshot(), ready(json!("t1")));
    assert_eq!(late.snapshot(), ready(json!("t2")));
}
