//! Sequential batch fetch over one shared cache.
//!
//! Each key gets its own binding, observed to settlement before the next key
//! starts, so a repeated key is always served from the cache.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::cache::{CacheConfig, CacheStore};
use crate::config::Settings;
use crate::fetch::{
    Decoder, FetchConfig, FetchCoordinator, Fetcher, HttpFetcher, JsonDecoder, Observation,
    Snapshot,
};
use crate::infra::error::InfraError;

/// Final state of one key's binding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyReport {
    pub key: String,
    pub cache_hit: bool,
    #[serde(flatten)]
    pub snapshot: Snapshot<Value>,
}

impl KeyReport {
    pub fn failed(&self) -> bool {
        self.snapshot.error.is_some()
    }
}

pub struct BatchFetcher {
    store: Arc<CacheStore<Value>>,
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder<Value>>,
    cache: CacheConfig,
}

impl BatchFetcher {
    pub fn new(
        store: Arc<CacheStore<Value>>,
        fetcher: Arc<dyn Fetcher>,
        cache: CacheConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            decoder: Arc::new(JsonDecoder::<Value>::new()),
            cache,
        }
    }

    /// Build an HTTP-backed batch with a fresh, empty store.
    pub fn from_settings(settings: &Settings) -> Result<Self, InfraError> {
        let fetcher = HttpFetcher::new(&FetchConfig::from(&settings.fetch))?;
        Ok(Self::new(
            Arc::new(CacheStore::new()),
            Arc::new(fetcher),
            CacheConfig::from(&settings.cache),
        ))
    }

    pub fn store(&self) -> &Arc<CacheStore<Value>> {
        &self.store
    }

    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    pub async fn run(&self, keys: &[String]) -> Vec<KeyReport> {
        let mut reports = Vec::with_capacity(keys.len());

        for key in keys {
            let binding = FetchCoordinator::new(
                Arc::clone(&self.store),
                Arc::clone(&self.fetcher),
                Arc::clone(&self.decoder),
                &self.cache,
            );
            let observation = binding.observe(key.as_str());
            let cache_hit = matches!(observation, Observation::Hit);
            observation.settled().await;

            reports.push(KeyReport {
                key: key.clone(),
                cache_hit,
                snapshot: binding.snapshot(),
            });
        }

        let failed = reports.iter().filter(|report| report.failed()).count();
        let hits = reports.iter().filter(|report| report.cache_hit).count();
        info!(
            total = reports.len(),
            failed,
            cache_hits = hits,
            cached_keys = self.store.len(),
            "Batch fetch finished"
        );
        reports
    }
}
