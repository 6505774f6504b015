//! Fetch-with-cache engine.
//!
//! A [`FetchCoordinator`] binds one consumer to a request key. It reads the
//! shared [`CacheStore`](crate::cache::CacheStore) first and only goes to the
//! network through its [`Fetcher`] on a miss:
//!
//! ```ignore
//! let store = Arc::new(CacheStore::new());
//! let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&FetchConfig::default())?);
//! let binding = FetchCoordinator::new(
//!     store,
//!     fetcher,
//!     Arc::new(JsonDecoder::<Value>::new()),
//!     &CacheConfig::default(),
//! );
//!
//! binding.observe("https://example.com/items/1").settled().await;
//! let Snapshot { data, loading, error } = binding.snapshot();
//! ```

mod binding;
mod config;
mod coordinator;
mod error;
mod source;

pub use binding::{RequestState, Snapshot};
pub use config::FetchConfig;
pub use coordinator::{FetchCoordinator, Observation, Settlement};
pub use error::{FailureKind, FailureReport, FetchError};
pub use source::{Decoder, FnDecoder, Fetcher, HttpFetcher, JsonDecoder, decode_with};
