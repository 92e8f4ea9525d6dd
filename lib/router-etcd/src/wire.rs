//! JSON bodies of the etcd v2 keys API

use router_core::{RemoteNode, StoreError};
use serde::Deserialize;

/// etcd error code for a missing key
pub const KEY_NOT_FOUND: u32 = 100;
/// etcd error code for a watch index older than the retained history
pub const EVENT_INDEX_CLEARED: u32 = 401;

/// Successful response, e.g. `{"action":"get","node":{...}}`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdResponse {
    pub action: String,
    #[serde(default)]
    pub node: Option<EtcdNode>,
    #[serde(default)]
    pub prev_node: Option<EtcdNode>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdNode {
    /// Absent for the root node
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub dir: bool,
    #[serde(default)]
    pub nodes: Vec<EtcdNode>,
    #[serde(default)]
    pub modified_index: u64,
    #[serde(default)]
    pub created_index: u64,
}

impl From<EtcdNode> for RemoteNode {
    fn from(node: EtcdNode) -> Self {
        let key = node.key.unwrap_or_else(|| "/".to_string());
        if node.dir {
            RemoteNode::directory(
                key,
                node.nodes.into_iter().map(RemoteNode::from).collect(),
                node.modified_index,
            )
        } else {
            RemoteNode::leaf(key, node.value.unwrap_or_default(), node.modified_index)
        }
    }
}

/// Error body, e.g. `{"errorCode":100,"message":"Key not found","cause":"/x","index":7}`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdError {
    pub error_code: u32,
    pub message: String,
    #[serde(default)]
    pub cause: String,
    #[serde(default)]
    pub index: u64,
}

impl From<EtcdError> for StoreError {
    fn from(e: EtcdError) -> Self {
        match e.error_code {
            KEY_NOT_FOUND => StoreError::NotFound { key: e.cause },
            EVENT_INDEX_CLEARED => StoreError::IndexCleared { index: e.index },
            code => StoreError::Rejected {
                code,
                message: if e.cause.is_empty() {
                    e.message
                } else {
                    format!("{} ({})", e.message, e.cause)
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_directory() {
        let body = r#"{
            "action": "get",
            "node": {
                "key": "/skipper/routes",
                "dir": true,
                "nodes": [
                    {"key": "/skipper/routes/a", "value": "Path(\"/a\") -> <shunt>", "modifiedIndex": 5, "createdIndex": 5},
                    {"key": "/skipper/routes/sub", "dir": true, "modifiedIndex": 6, "createdIndex": 6}
                ],
                "modifiedIndex": 3,
                "createdIndex": 3
            }
        }"#;
        let response: EtcdResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.action, "get");

        let node = RemoteNode::from(response.node.unwrap());
        assert_eq!(
            node,
            RemoteNode::directory(
                "/skipper/routes",
                vec![
                    RemoteNode::leaf("/skipper/routes/a", r#"Path("/a") -> <shunt>"#, 5),
                    RemoteNode::directory("/skipper/routes/sub", vec![], 6),
                ],
                3
            )
        );
    }

    #[test]
    fn test_decode_delete_event() {
        let body = r#"{
            "action": "delete",
            "node": {"key": "/skipper/routes/a", "modifiedIndex": 9, "createdIndex": 5},
            "prevNode": {"key": "/skipper/routes/a", "value": "* -> <shunt>", "modifiedIndex": 5, "createdIndex": 5}
        }"#;
        let response: EtcdResponse = serde_json::from_str(body).unwrap();
        assert!(response.prev_node.is_some());
        assert_eq!(
            RemoteNode::from(response.node.unwrap()),
            RemoteNode::leaf("/skipper/routes/a", "", 9)
        );
    }

    #[test]
    fn test_root_node_without_key() {
        let node: EtcdNode = serde_json::from_str(r#"{"dir": true}"#).unwrap();
        assert_eq!(RemoteNode::from(node), RemoteNode::directory("/", vec![], 0));
    }

    #[test]
    fn test_error_mapping() {
        let not_found: EtcdError = serde_json::from_str(
            r#"{"errorCode":100,"message":"Key not found","cause":"/skipper/routes/x","index":7}"#,
        )
        .unwrap();
        assert_eq!(
            StoreError::from(not_found),
            StoreError::NotFound {
                key: "/skipper/routes/x".to_string()
            }
        );

        let cleared: EtcdError = serde_json::from_str(
            r#"{"errorCode":401,"message":"The event in requested index is outdated and cleared","cause":"the requested history has been cleared [1008/8]","index":2007}"#,
        )
        .unwrap();
        assert_eq!(StoreError::from(cleared), StoreError::IndexCleared { index: 2007 });

        let not_file: EtcdError =
            serde_json::from_str(r#"{"errorCode":102,"message":"Not a file","cause":"/skipper/routes/sub"}"#)
                .unwrap();
        assert_eq!(
            StoreError::from(not_file),
            StoreError::Rejected {
                code: 102,
                message: "Not a file (/skipper/routes/sub)".to_string()
            }
        );
    }
}
