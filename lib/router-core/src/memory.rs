//! In-memory store
//!
//! Behaves like a single etcd v2 member: one global index bumped by every
//! write, parent directories created implicitly, and a bounded history of
//! changes that watches are served from.

use crate::flatten::parent_path;
use crate::store::{RemoteNode, RouteStore, StoreError, TreeSnapshot, WatchAction, WatchEvent};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// Number of changes kept for watches, same as etcd v2
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

const NOT_A_FILE: u32 = 102;
const NOT_A_DIR: u32 = 104;

#[derive(Clone, Debug)]
struct Entry {
    /// `None` for directories
    value: Option<String>,
    modified_index: u64,
}

#[derive(Default)]
struct State {
    index: u64,
    entries: BTreeMap<String, Entry>,
    history: VecDeque<WatchEvent>,
    /// Highest index dropped from the history
    cleared_through: u64,
}

pub struct MemoryStore {
    state: Mutex<State>,
    changed: Notify,
    history_limit: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            changed: Notify::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Current global index
    pub async fn index(&self) -> u64 {
        self.state.lock().await.index
    }

    /// Value of the leaf at `key`, if any
    pub async fn value(&self, key: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .entries
            .get(&normalize(key))
            .and_then(|entry| entry.value.clone())
    }

    /// Recursively delete the directory or leaf at `key`
    pub async fn delete_tree(&self, key: &str) -> Result<(), StoreError> {
        let key = normalize(key);
        let mut state = self.state.lock().await;
        if !state.entries.contains_key(&key) {
            return Err(StoreError::NotFound { key });
        }

        state.index += 1;
        let index = state.index;

        let node = match build_node(&state.entries, &key) {
            Some(RemoteNode::Directory { nodes, .. }) => RemoteNode::directory(key.clone(), nodes, index),
            _ => RemoteNode::leaf(key.clone(), "", index),
        };

        let prefix = format!("{}/", key);
        state
            .entries
            .retain(|k, _| k != &key && !k.starts_with(&prefix));

        self.record(&mut state, WatchAction::Delete, node);
        Ok(())
    }

    fn record(&self, state: &mut State, action: WatchAction, node: RemoteNode) {
        debug!("Recorded {} of {} at index {}", action, node.key(), state.index);
        state.history.push_back(WatchEvent {
            action,
            node,
            store_index: state.index,
        });

        while state.history.len() > self.history_limit {
            if let Some(dropped) = state.history.pop_front() {
                state.cleared_through = dropped.node.modified_index();
            }
        }

        self.changed.notify_waiters();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn read_tree(&self, key: &str) -> Result<TreeSnapshot, StoreError> {
        let key = normalize(key);
        let state = self.state.lock().await;
        let node = build_node(&state.entries, &key).ok_or(StoreError::NotFound { key })?;

        Ok(TreeSnapshot {
            node,
            store_index: state.index,
        })
    }

    async fn watch(&self, key: &str, wait_index: u64) -> Result<WatchEvent, StoreError> {
        let key = normalize(key);
        let prefix = format!("{}/", key);

        loop {
            // registered before checking so a write in between is not missed
            let notified = self.changed.notified();

            {
                let state = self.state.lock().await;
                if wait_index <= state.cleared_through {
                    return Err(StoreError::IndexCleared {
                        index: state.cleared_through,
                    });
                }

                // deleting an ancestor removes the watched key too
                let found = state.history.iter().find(|event| {
                    let event_key = event.node.key();
                    let ancestor_deleted = event.action.is_deletion()
                        && (event_key == "/" || key.starts_with(&format!("{}/", event_key)));
                    event.node.modified_index() >= wait_index
                        && (event_key == key
                            || event_key.starts_with(&prefix)
                            || key == "/"
                            || ancestor_deleted)
                });
                if let Some(event) = found {
                    return Ok(event.clone());
                }
            }

            notified.await;
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = normalize(key);
        let mut state = self.state.lock().await;
        if let Some(Entry { value: None, .. }) = state.entries.get(&key) {
            return Err(StoreError::Rejected {
                code: NOT_A_FILE,
                message: format!("Not a file: {}", key),
            });
        }

        let mut missing = Vec::new();
        let mut parent = parent_path(&key).to_string();
        while parent != "/" && !parent.is_empty() {
            match state.entries.get(&parent).map(|e| e.value.is_none()) {
                Some(true) => break,
                Some(false) => {
                    return Err(StoreError::Rejected {
                        code: NOT_A_DIR,
                        message: format!("Not a directory: {}", parent),
                    })
                }
                None => {
                    let next = parent_path(&parent).to_string();
                    missing.push(parent);
                    parent = next;
                }
            }
        }

        state.index += 1;
        let index = state.index;

        for dir in missing {
            state.entries.insert(
                dir,
                Entry {
                    value: None,
                    modified_index: index,
                },
            );
        }

        state.entries.insert(
            key.clone(),
            Entry {
                value: Some(value.to_string()),
                modified_index: index,
            },
        );

        self.record(&mut state, WatchAction::Set, RemoteNode::leaf(key, value, index));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = normalize(key);
        let mut state = self.state.lock().await;
        match state.entries.get(&key) {
            None => return Err(StoreError::NotFound { key }),
            Some(Entry { value: None, .. }) => {
                return Err(StoreError::Rejected {
                    code: NOT_A_FILE,
                    message: format!("Not a file: {}", key),
                })
            }
            Some(_) => {}
        }

        state.index += 1;
        let index = state.index;
        state.entries.remove(&key);

        self.record(&mut state, WatchAction::Delete, RemoteNode::leaf(key, "", index));
        Ok(())
    }
}

fn normalize(key: &str) -> String {
    let trimmed = key.trim_matches('/');
    format!("/{}", trimmed)
}

/// Build the snapshot of `key` and everything below it
fn build_node(entries: &BTreeMap<String, Entry>, key: &str) -> Option<RemoteNode> {
    let (value, modified_index) = if key == "/" {
        (None, 0)
    } else {
        let entry = entries.get(key)?;
        (entry.value.clone(), entry.modified_index)
    };

    if let Some(value) = value {
        return Some(RemoteNode::leaf(key, value, modified_index));
    }

    let prefix = if key == "/" { "/".to_string() } else { format!("{}/", key) };
    let nodes = entries
        .range(prefix.clone()..)
        .take_while(|(k, _)| k.starts_with(&prefix))
        .filter(|(k, _)| parent_path(k) == key)
        .filter_map(|(k, _)| build_node(entries, k))
        .collect();

    Some(RemoteNode::directory(key, nodes, modified_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_set_creates_parent_directories() {
        let store = MemoryStore::new();
        store.set("/skipper/routes/a", "x").await.unwrap();

        let snapshot = store.read_tree("/skipper").await.unwrap();
        assert_eq!(
            snapshot.node,
            RemoteNode::directory(
                "/skipper",
                vec![RemoteNode::directory(
                    "/skipper/routes",
                    vec![RemoteNode::leaf("/skipper/routes/a", "x", 1)],
                    1
                )],
                1
            )
        );
        assert_eq!(snapshot.store_index, 1);
    }

    #[tokio::test]
    async fn test_read_tree_lists_direct_children_only_once() {
        let store = MemoryStore::new();
        store.set("/r/a", "1").await.unwrap();
        store.set("/r/b/c", "2").await.unwrap();
        store.set("/rx/d", "3").await.unwrap();

        let snapshot = store.read_tree("/r").await.unwrap();
        match snapshot.node {
            RemoteNode::Directory { nodes, .. } => {
                let keys: Vec<_> = nodes.iter().map(|n| n.key().to_string()).collect();
                assert_eq!(keys, vec!["/r/a", "/r/b"]);
            }
            other => panic!("expected directory, got {:?}", other),
        }
        assert_eq!(snapshot.store_index, 3);
    }

    #[tokio::test]
    async fn test_read_missing_key() {
        let store = MemoryStore::new();
        assert_eq!(
            store.read_tree("/nothing").await,
            Err(StoreError::NotFound {
                key: "/nothing".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let store = MemoryStore::new();
        store.set("/r/a", "1").await.unwrap();

        assert!(matches!(
            store.delete("/r").await,
            Err(StoreError::Rejected { code: NOT_A_FILE, .. })
        ));
        assert!(matches!(store.delete("/r/zzz").await, Err(StoreError::NotFound { .. })));

        store.delete("/r/a").await.unwrap();
        assert_eq!(store.value("/r/a").await, None);
        assert_eq!(store.index().await, 2);
    }

    #[tokio::test]
    async fn test_set_on_directory_is_rejected() {
        let store = MemoryStore::new();
        store.set("/r/a", "1").await.unwrap();
        assert!(matches!(
            store.set("/r", "x").await,
            Err(StoreError::Rejected { code: NOT_A_FILE, .. })
        ));
        assert_eq!(store.index().await, 1);
    }

    #[tokio::test]
    async fn test_watch_replays_history_under_prefix() {
        let store = MemoryStore::new();
        store.set("/r/a", "1").await.unwrap();
        store.set("/other/x", "2").await.unwrap();
        store.set("/r/b", "3").await.unwrap();

        let event = store.watch("/r", 2).await.unwrap();
        assert_eq!(event.action, WatchAction::Set);
        assert_eq!(event.node, RemoteNode::leaf("/r/b", "3", 3));
        assert_eq!(event.store_index, 3);
    }

    #[tokio::test]
    async fn test_watch_waits_for_future_change() {
        let store = Arc::new(MemoryStore::new());
        let watcher = {
            let store = store.clone();
            tokio::spawn(async move { store.watch("/r", 1).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.set("/r/a", "1").await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.node.key(), "/r/a");
    }

    #[tokio::test]
    async fn test_watch_index_cleared() {
        let store = MemoryStore::with_history_limit(2);
        for i in 0..4 {
            store.set("/r/a", &i.to_string()).await.unwrap();
        }

        assert_eq!(
            store.watch("/r", 2).await,
            Err(StoreError::IndexCleared { index: 2 })
        );
        assert_eq!(store.watch("/r", 3).await.unwrap().node.modified_index(), 3);
    }

    #[tokio::test]
    async fn test_set_below_leaf_is_rejected() {
        let store = MemoryStore::new();
        store.set("/r/a", "1").await.unwrap();
        assert!(matches!(
            store.set("/r/a/b", "x").await,
            Err(StoreError::Rejected { code: NOT_A_DIR, .. })
        ));
        assert_eq!(store.index().await, 1);
    }

    #[tokio::test]
    async fn test_ancestor_deletion_wakes_watcher() {
        let store = Arc::new(MemoryStore::new());
        store.set("/skipper/routes/a", "1").await.unwrap();
        store.set("/skipperx/b", "2").await.unwrap();

        let watcher = {
            let store = store.clone();
            tokio::spawn(async move { store.watch("/skipper/routes", 3).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.delete_tree("/skipperx").await.unwrap();
        store.delete_tree("/skipper").await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.action, WatchAction::Delete);
        assert_eq!(event.node.key(), "/skipper");
        assert_eq!(event.store_index, 4);
    }

    #[tokio::test]
    async fn test_delete_tree_reports_subtree() {
        let store = MemoryStore::new();
        store.set("/r/a", "1").await.unwrap();
        store.set("/r/b", "2").await.unwrap();
        store.delete_tree("/r").await.unwrap();

        let event = store.watch("/r", 3).await.unwrap();
        assert_eq!(event.action, WatchAction::Delete);
        assert_eq!(
            event.node,
            RemoteNode::directory(
                "/r",
                vec![RemoteNode::leaf("/r/a", "1", 1), RemoteNode::leaf("/r/b", "2", 2)],
                3
            )
        );
        assert!(store.read_tree("/r").await.is_err());
    }
}
