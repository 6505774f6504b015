//! fetchbind: bind consumers to network resources through a shared request cache.
//!
//! The [`fetch`] module holds the coordinator that drives each binding through
//! its loading, ready, and failed states; [`cache`] holds the process-wide
//! store every coordinator shares.

pub mod application;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod infra;
