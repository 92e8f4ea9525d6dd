//! Flattening of store subtrees into route sets

use crate::store::RemoteNode;
use std::collections::BTreeMap;

/// Route id → route text (`"<id>: <stored value>"`)
pub type RouteSet = BTreeMap<String, String>;

/// Walk `node` and collect the direct children of `routes_root` as route
/// texts, together with the highest modified index seen during the walk.
///
/// The returned watermark is never lower than `watermark`. Only the routes
/// root is descended into; nodes whose parent is not the routes root are
/// ignored.
pub fn flatten(node: &RemoteNode, routes_root: &str, watermark: u64) -> (RouteSet, u64) {
    let mut highest = watermark.max(node.modified_index());
    let mut routes = RouteSet::new();

    if let RemoteNode::Directory { key, nodes, .. } = node {
        if key == routes_root {
            for child in nodes {
                let (child_routes, child_highest) = flatten(child, routes_root, highest);
                // ids are unique under the root, last one wins otherwise
                routes.extend(child_routes);
                highest = child_highest;
            }
            return (routes, highest);
        }
    }

    if parent_path(node.key()) != routes_root {
        return (routes, highest);
    }

    let id = base_name(node.key());
    let value = match node {
        RemoteNode::Leaf { value, .. } => value.as_str(),
        RemoteNode::Directory { .. } => "",
    };
    routes.insert(id.to_string(), format!("{}: {}", id, value));

    (routes, highest)
}

/// Last segment of a slash separated key
pub(crate) fn base_name(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(i) => &trimmed[i + 1..],
        None => trimmed,
    }
}

/// Key with its last segment removed
pub(crate) fn parent_path(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(i) => &trimmed[..i],
        None => "",
    }
}
