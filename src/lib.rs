//! Autoscaling Key-Sharded Storage Library
//!
//! Stores entities under partition keys and spreads each key over as many
//! storage units as it needs, creating new units when a unit fills up.
//!
//! ## Architecture Modules
//! - **`unit`**: Storage units and the autoscaling controller embedded in them.
//! - **`index`**: The index service, the single source of truth for which units
//!   serve a partition key.
//! - **`client`**: The routing client. Resolves keys through the index, sends
//!   writes to the current write target and fans reads out to every unit.
//! - **`cluster`**: In-process wiring (`LocalCluster`), the HTTP router of a
//!   node and the HTTP clients that talk to one.
//! - **`api`**: Traits every cross-component call goes through.

pub mod api;
pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod index;
pub mod protocol;
pub mod types;
pub mod unit;

pub use client::router::{PartitionOutcome, RoutingClient};
pub use cluster::local::LocalCluster;
pub use config::{RedirectPolicy, RouterConfig, ScalingConfig};
pub use error::{Result, StoreError};
pub use types::{PartitionAddress, PartitionKey, SortKey};
