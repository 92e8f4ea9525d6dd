//! HTTP client for the etcd v2 keys API

use crate::wire::{EtcdError, EtcdResponse};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use router_core::{
    CoreError, RemoteNode, RouteStore, StoreError, TreeSnapshot, WatchAction, WatchEvent,
};
use std::time::Duration;
use tracing::{debug, warn};

const ETCD_INDEX_HEADER: &str = "X-Etcd-Index";

/// Pause before re-polling after a watch returned without a change
pub const EMPTY_WATCH_DELAY: Duration = Duration::from_millis(100);

/// EtcdStore talks to an etcd cluster, trying the endpoints in order until
/// one of them can be reached
pub struct EtcdStore {
    endpoints: Vec<String>,
    http: Client,
    request_timeout: Duration,
}

/// Decoded reply: the body, if any, and the store index header
struct Reply {
    body: Option<EtcdResponse>,
    etcd_index: u64,
}

impl EtcdStore {
    /// Create a store client with a 5s request timeout
    pub fn new(endpoints: Vec<String>) -> router_core::Result<Self> {
        Self::with_timeout(endpoints, Duration::from_secs(5))
    }

    /// Create a store client. The timeout applies to connecting and to every
    /// request except watches, which wait until a change arrives.
    pub fn with_timeout(endpoints: Vec<String>, request_timeout: Duration) -> router_core::Result<Self> {
        if endpoints.is_empty() {
            return Err(CoreError::InvalidConfiguration(
                "at least one etcd endpoint is required".to_string(),
            ));
        }

        let http = Client::builder()
            .connect_timeout(request_timeout)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .build()
            .map_err(|e| CoreError::InvalidConfiguration(format!("HTTP client: {}", e)))?;

        let endpoints = endpoints
            .into_iter()
            .map(|e| e.trim_end_matches('/').to_string())
            .collect();

        Ok(Self {
            endpoints,
            http,
            request_timeout,
        })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    fn keys_url(endpoint: &str, key: &str) -> String {
        if key.starts_with('/') {
            format!("{}/v2/keys{}", endpoint, key)
        } else {
            format!("{}/v2/keys/{}", endpoint, key)
        }
    }

    /// Send a keys API request, failing over to the next endpoint when one
    /// cannot be reached
    async fn request(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, &str)],
        form: Option<&[(&str, &str)]>,
        timeout: Option<Duration>,
    ) -> Result<Reply, StoreError> {
        let mut last_error = None;

        for endpoint in &self.endpoints {
            let url = Self::keys_url(endpoint, key);
            let mut builder = self.http.request(method.clone(), &url).query(query);
            if let Some(form) = form {
                builder = builder.form(form);
            }
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }

            debug!("{} {}", method, url);
            match builder.send().await {
                Ok(response) => return Self::decode(response).await,
                Err(e) if e.is_connect() => {
                    warn!("etcd endpoint {} unreachable: {}", endpoint, e);
                    last_error = Some(e);
                }
                Err(e) if e.is_timeout() => {
                    return Err(StoreError::Unavailable(format!("request to {} timed out", endpoint)))
                }
                Err(e) => return Err(StoreError::Unavailable(e.to_string())),
            }
        }

        Err(StoreError::Unavailable(match last_error {
            Some(e) => format!("no etcd endpoint reachable: {}", e),
            None => "no etcd endpoint configured".to_string(),
        }))
    }

    async fn decode(response: reqwest::Response) -> Result<Reply, StoreError> {
        let status = response.status();
        let etcd_index = response
            .headers()
            .get(ETCD_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Unavailable(format!("reading response: {}", e)))?;

        if status.is_success() {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(Reply {
                    body: None,
                    etcd_index,
                });
            }

            let body = serde_json::from_slice::<EtcdResponse>(&bytes)
                .map_err(|e| StoreError::Protocol(format!("invalid response body: {}", e)))?;
            return Ok(Reply {
                body: Some(body),
                etcd_index,
            });
        }

        match serde_json::from_slice::<EtcdError>(&bytes) {
            Ok(error) => Err(error.into()),
            Err(_) if status == StatusCode::NOT_FOUND => Err(StoreError::NotFound {
                key: String::new(),
            }),
            Err(_) => Err(StoreError::Protocol(format!(
                "HTTP {}: {}",
                status,
                String::from_utf8_lossy(&bytes)
            ))),
        }
    }

    fn node_of(body: Option<EtcdResponse>) -> Result<(String, RemoteNode), StoreError> {
        let body = body.ok_or_else(|| StoreError::Protocol("empty response body".to_string()))?;
        let node = body
            .node
            .ok_or_else(|| StoreError::Protocol(format!("{} response without node", body.action)))?;
        Ok((body.action, node.into()))
    }
}

#[async_trait]
impl RouteStore for EtcdStore {
    async fn read_tree(&self, key: &str) -> Result<TreeSnapshot, StoreError> {
        let reply = self
            .request(
                Method::GET,
                key,
                &[("recursive", "true"), ("sorted", "true"), ("quorum", "true")],
                None,
                Some(self.request_timeout),
            )
            .await?;

        let (_, node) = Self::node_of(reply.body)?;
        Ok(TreeSnapshot {
            node,
            store_index: reply.etcd_index,
        })
    }

    async fn watch(&self, key: &str, wait_index: u64) -> Result<WatchEvent, StoreError> {
        let wait_index_param = wait_index.to_string();
        let query = [
            ("wait", "true"),
            ("waitIndex", wait_index_param.as_str()),
            ("recursive", "true"),
        ];

        loop {
            let reply = self.request(Method::GET, key, &query, None, None).await?;

            // the server closes idle long-polls with an empty body
            if reply.body.is_none() {
                debug!("Watch on {} returned without a change, re-polling", key);
                tokio::time::sleep(EMPTY_WATCH_DELAY).await;
                continue;
            }

            let (action, node) = Self::node_of(reply.body)?;
            // X-Etcd-Index on a watch reply is the index at watch start, which
            // can be ahead of changes not yet delivered
            let store_index = node.modified_index();
            return Ok(WatchEvent {
                action: WatchAction::from(action.as_str()),
                node,
                store_index,
            });
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let form = [("value", value)];
        self.request(
            Method::PUT,
            key,
            &[],
            Some(&form[..]),
            Some(self.request_timeout),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.request(
            Method::DELETE,
            key,
            &[("recursive", "false"), ("dir", "false")],
            None,
            Some(self.request_timeout),
        )
        .await?;
        Ok(())
    }
}
