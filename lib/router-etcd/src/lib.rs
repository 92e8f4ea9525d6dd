//! etcd v2 backend for route synchronization
//!
//! Route definitions are stored under individual keys below
//! `<storage root>/routes`, one key per route id, e.g.
//! `/v2/keys/skipper/routes/hello`.

pub mod store;
pub mod wire;

pub use store::{EtcdStore, EMPTY_WATCH_DELAY};

use router_core::{DataClient, Result, SyncConfig};

/// Create a data client for the etcd cluster reachable at `endpoints`,
/// reading the routes stored under `<storage_root>/routes`
pub fn connect(endpoints: Vec<String>, storage_root: &str) -> Result<DataClient<EtcdStore>> {
    let store = EtcdStore::new(endpoints)?;
    Ok(DataClient::new(store, storage_root))
}

/// Create a data client from a validated configuration
pub fn connect_with(config: &SyncConfig) -> Result<DataClient<EtcdStore>> {
    config.validate()?;
    let store = EtcdStore::with_timeout(config.endpoints.clone(), config.request_timeout)?;
    Ok(DataClient::new(store, &config.storage_root))
}
