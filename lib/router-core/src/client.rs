//! Data client keeping a route view in sync with the remote store

use crate::flatten::{flatten, RouteSet};
use crate::store::{RouteStore, StoreError};
use crate::{CoreError, Result};
use router_api::Route;
use tracing::{debug, info};

/// Directory under the storage root holding one key per route
pub const ROUTES_PATH: &str = "/routes";

/// Outcome of a single incremental update
#[derive(Clone, Debug, PartialEq)]
pub enum RouteUpdate {
    /// Routes created or modified by the change
    Upserted(Vec<Route>),
    /// Ids of the routes removed by the change
    Deleted(Vec<String>),
}

impl RouteUpdate {
    /// Split into `(upserted routes, deleted ids)`
    pub fn into_parts(self) -> (Vec<Route>, Vec<String>) {
        match self {
            RouteUpdate::Upserted(routes) => (routes, Vec::new()),
            RouteUpdate::Deleted(ids) => (Vec::new(), ids),
        }
    }
}

/// DataClient loads the route definitions stored under `<storage root>/routes`
/// and follows their changes.
///
/// The client tracks the highest store index it has incorporated (the
/// watermark) and only ever requests changes newer than that. Loading
/// requires `&mut self`: the watermark is not shared between loads.
pub struct DataClient<S> {
    routes_root: String,
    store: S,
    watermark: u64,
}

impl<S: RouteStore> DataClient<S> {
    /// Create a client for the routes stored under `storage_root`,
    /// e.g. `/skipper` for routes at `/skipper/routes/<id>`
    pub fn new(store: S, storage_root: &str) -> Self {
        let routes_root = format!("{}{}", storage_root.trim_end_matches('/'), ROUTES_PATH);
        Self {
            routes_root,
            store,
            watermark: 0,
        }
    }

    pub fn routes_root(&self) -> &str {
        &self.routes_root
    }

    /// Highest store index incorporated so far, 0 before the first load
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load every route currently stored.
    ///
    /// A single malformed definition fails the whole load and leaves the
    /// watermark untouched.
    pub async fn load_all(&mut self) -> Result<Vec<Route>> {
        let snapshot = self.store.read_tree(&self.routes_root).await?;

        let (data, highest) = flatten(&snapshot.node, &self.routes_root, 0);
        let routes = parse_routes(&data)?;

        self.advance(highest.max(snapshot.store_index));
        info!(
            "Loaded {} routes from {} at index {}",
            routes.len(),
            self.routes_root,
            self.watermark
        );
        Ok(routes)
    }

    /// Wait for the next change after the watermark and return it.
    ///
    /// Blocks until the store reports a change. On any error the watermark
    /// is left as it was, so calling again requests the same change.
    pub async fn load_update(&mut self) -> Result<RouteUpdate> {
        let event = self
            .store
            .watch(&self.routes_root, self.watermark + 1)
            .await?;

        debug!(
            "Received {} of {} at index {}",
            event.action,
            event.node.key(),
            event.store_index
        );

        let (data, highest) = flatten(&event.node, &self.routes_root, self.watermark);
        let update = if event.action.is_deletion() {
            RouteUpdate::Deleted(data.into_keys().collect())
        } else {
            RouteUpdate::Upserted(parse_routes(&data)?)
        };

        self.advance(highest.max(event.store_index));
        Ok(update)
    }

    /// Create or overwrite the route stored under the route's id
    pub async fn upsert(&self, route: &Route) -> Result<()> {
        if route.id.is_empty() {
            return Err(CoreError::MissingRouteId);
        }

        let key = self.route_key(&route.id);
        self.store.set(&key, &route.to_string()).await?;
        debug!("Upserted route {}", key);
        Ok(())
    }

    /// Delete the route with the given id. Deleting a missing route succeeds.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(CoreError::MissingRouteId);
        }

        let key = self.route_key(id);
        match self.store.delete(&key).await {
            Ok(()) => {
                debug!("Deleted route {}", key);
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => {
                debug!("Route {} already absent", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn route_key(&self, id: &str) -> String {
        format!("{}/{}", self.routes_root, id)
    }

    fn advance(&mut self, index: u64) {
        if index > self.watermark {
            self.watermark = index;
        }
    }
}

/// Parse a route set as a single `;`-separated document
fn parse_routes(data: &RouteSet) -> Result<Vec<Route>> {
    let doc = data.values().map(String::as_str).collect::<Vec<_>>().join(";");
    debug!("Parsing route document: {}", doc);
    Ok(router_api::parse_batch(&doc)?)
}
