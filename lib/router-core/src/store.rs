//! Remote store interface
//!
//! The store is a tree of versioned nodes. Every write is assigned a
//! monotonically increasing index, and each node carries the index of
//! the write that last modified it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Snapshot of a store node, returned by value on every call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteNode {
    Leaf {
        key: String,
        value: String,
        modified_index: u64,
    },
    Directory {
        key: String,
        nodes: Vec<RemoteNode>,
        modified_index: u64,
    },
}

impl RemoteNode {
    pub fn leaf(key: impl Into<String>, value: impl Into<String>, modified_index: u64) -> Self {
        RemoteNode::Leaf {
            key: key.into(),
            value: value.into(),
            modified_index,
        }
    }

    pub fn directory(key: impl Into<String>, nodes: Vec<RemoteNode>, modified_index: u64) -> Self {
        RemoteNode::Directory {
            key: key.into(),
            nodes,
            modified_index,
        }
    }

    /// Full hierarchical path of the node
    pub fn key(&self) -> &str {
        match self {
            RemoteNode::Leaf { key, .. } | RemoteNode::Directory { key, .. } => key,
        }
    }

    /// Index of the write that last modified the node
    pub fn modified_index(&self) -> u64 {
        match self {
            RemoteNode::Leaf { modified_index, .. }
            | RemoteNode::Directory { modified_index, .. } => *modified_index,
        }
    }
}

/// Result of a recursive, consistent read
#[derive(Clone, Debug, PartialEq)]
pub struct TreeSnapshot {
    pub node: RemoteNode,
    /// Global store index at response time
    pub store_index: u64,
}

/// Kind of change reported by a watch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchAction {
    Get,
    Set,
    Create,
    Update,
    CompareAndSwap,
    Delete,
    CompareAndDelete,
    Expire,
    Other(String),
}

impl WatchAction {
    /// Whether the change removed the affected node(s)
    pub fn is_deletion(&self) -> bool {
        matches!(
            self,
            WatchAction::Delete | WatchAction::CompareAndDelete | WatchAction::Expire
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            WatchAction::Get => "get",
            WatchAction::Set => "set",
            WatchAction::Create => "create",
            WatchAction::Update => "update",
            WatchAction::CompareAndSwap => "compareAndSwap",
            WatchAction::Delete => "delete",
            WatchAction::CompareAndDelete => "compareAndDelete",
            WatchAction::Expire => "expire",
            WatchAction::Other(action) => action,
        }
    }
}

impl From<&str> for WatchAction {
    fn from(action: &str) -> Self {
        match action {
            "get" => WatchAction::Get,
            "set" => WatchAction::Set,
            "create" => WatchAction::Create,
            "update" => WatchAction::Update,
            "compareAndSwap" => WatchAction::CompareAndSwap,
            "delete" => WatchAction::Delete,
            "compareAndDelete" => WatchAction::CompareAndDelete,
            "expire" => WatchAction::Expire,
            other => WatchAction::Other(other.to_string()),
        }
    }
}

impl fmt::Display for WatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change delivered by a watch
#[derive(Clone, Debug, PartialEq)]
pub struct WatchEvent {
    pub action: WatchAction,
    /// The affected node, or subtree for recursive changes
    pub node: RemoteNode,
    /// Global store index at response time
    pub store_index: u64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Key not found: {key}")]
    NotFound { key: String },

    #[error("Watch index cleared, history starts after {index}")]
    IndexCleared { index: u64 },

    #[error("Store rejected request ({code}): {message}")]
    Rejected { code: u32, message: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected store response: {0}")]
    Protocol(String),
}

/// Operations consumed from the remote store
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Recursive, consistent read of the subtree at `key`
    async fn read_tree(&self, key: &str) -> Result<TreeSnapshot, StoreError>;

    /// Block until a change with index `>= wait_index` happens at or
    /// under `key`, and return it
    async fn watch(&self, key: &str, wait_index: u64) -> Result<WatchEvent, StoreError>;

    /// Unconditionally write `value` at `key`
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Non-recursive delete of the leaf at `key`
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: RouteStore + ?Sized> RouteStore for Arc<T> {
    async fn read_tree(&self, key: &str) -> Result<TreeSnapshot, StoreError> {
        (**self).read_tree(key).await
    }

    async fn watch(&self, key: &str, wait_index: u64) -> Result<WatchEvent, StoreError> {
        (**self).watch(key, wait_index).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}
