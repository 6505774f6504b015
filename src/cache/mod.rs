//! fetchbind cache layer
//!
//! A single process-wide store maps request keys to the last successfully
//! decoded response. Every fetch coordinator shares it through an `Arc`.
//!
//! ## Configuration
//!
//! Write ordering is controlled via `fetchbind.toml`:
//!
//! ```toml
//! [cache]
//! write_policy = "last_settled" # or "newest_issued"
//! ```

mod config;
mod keys;
pub(crate) mod lock;
mod store;

pub use config::{CacheConfig, WritePolicy};
pub use keys::RequestKey;
pub use store::{CacheStore, Sequence, WriteOutcome};
