//! Route table fed by the data client

use crate::RouteUpdate;
use chrono::{DateTime, Utc};
use router_api::Route;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// RouteTable holds the current set of routes, keyed by id
#[derive(Clone, Default)]
pub struct RouteTable {
    inner: Arc<RwLock<TableState>>,
}

#[derive(Default)]
struct TableState {
    routes: HashMap<String, Route>,
    last_synced: Option<DateTime<Utc>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table with a snapshot
    pub async fn replace_all(&self, routes: Vec<Route>) {
        let mut state = self.inner.write().await;
        state.routes = routes.into_iter().map(|r| (r.id.clone(), r)).collect();
        state.last_synced = Some(Utc::now());
        debug!("Route table replaced, {} routes", state.routes.len());
    }

    /// Apply an incremental update
    pub async fn apply(&self, update: RouteUpdate) {
        let mut state = self.inner.write().await;
        match update {
            RouteUpdate::Upserted(routes) => {
                for route in routes {
                    debug!("Upserting route: {}", route.id);
                    state.routes.insert(route.id.clone(), route);
                }
            }
            RouteUpdate::Deleted(ids) => {
                for id in ids {
                    debug!("Removing route: {}", id);
                    state.routes.remove(&id);
                }
            }
        }
        state.last_synced = Some(Utc::now());
    }

    pub async fn get(&self, id: &str) -> Option<Route> {
        let state = self.inner.read().await;
        state.routes.get(id).cloned()
    }

    /// All routes, sorted by id
    pub async fn list(&self) -> Vec<Route> {
        let state = self.inner.read().await;
        let mut routes: Vec<Route> = state.routes.values().cloned().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        routes
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.routes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// When the table was last replaced or updated
    pub async fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_synced
    }
}
