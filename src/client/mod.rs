//! Routing Client Module
//!
//! - **`router`**: write dispatch with re-resolution and retries, fan-out
//!   queries with per-partition timeouts.
//! - **`cache`**: advisory, monotonic PK -> partitions cache.

pub mod cache;
pub mod router;
