//! Route synchronization against a hierarchical, versioned key-value store
//!
//! This library provides:
//! - The store collaborator interface and its node model
//! - Flattening of a store subtree into a route set
//! - DataClient: snapshot loads, incremental updates and mutations
//! - RouteTable: the consumer-side table the updates are applied to

pub mod client;
pub mod config;
pub mod error;
pub mod flatten;
pub mod memory;
pub mod registry;
pub mod store;

pub use client::{DataClient, RouteUpdate, ROUTES_PATH};
pub use config::{BackoffPolicy, SyncConfig};
pub use error::{CoreError, Result};
pub use flatten::{flatten, RouteSet};
pub use memory::MemoryStore;
pub use registry::RouteTable;
pub use store::{RemoteNode, RouteStore, StoreError, TreeSnapshot, WatchAction, WatchEvent};
