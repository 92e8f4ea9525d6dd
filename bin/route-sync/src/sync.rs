//! Synchronization loop: one snapshot, then incremental updates

use router_core::{BackoffPolicy, CoreError, DataClient, RouteStore, RouteTable, StoreError};
use tracing::{debug, error, info, warn};

/// Keep `table` in sync with the store until the task is cancelled.
///
/// Failed loads leave the client's watermark untouched. A cleared watch index
/// falls back to a snapshot right away. A change that fails to parse would be
/// replayed on every retry, so it also falls back to a snapshot, after the
/// backoff: the snapshot keeps failing until the stored value is fixed.
pub async fn run<S: RouteStore>(
    mut client: DataClient<S>,
    table: RouteTable,
    backoff: BackoffPolicy,
) {
    let mut needs_snapshot = true;
    let mut failures: u32 = 0;

    loop {
        let result = if needs_snapshot {
            snapshot(&mut client, &table).await
        } else {
            update(&mut client, &table).await
        };

        match result {
            Ok(()) => {
                needs_snapshot = false;
                failures = 0;
            }
            Err(CoreError::Store(StoreError::IndexCleared { index })) => {
                warn!(
                    "Watch history cleared (store at {}, watermark {}), reloading all routes",
                    index,
                    client.watermark()
                );
                needs_snapshot = true;
            }
            Err(e) => {
                if matches!(e, CoreError::Parse(_)) {
                    needs_snapshot = true;
                }
                failures = failures.saturating_add(1);
                let delay = backoff.delay(failures);
                error!(
                    "Route sync failed ({} consecutive): {}; retrying in {:?}",
                    failures, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn snapshot<S: RouteStore>(client: &mut DataClient<S>, table: &RouteTable) -> Result<(), CoreError> {
    let routes = client.load_all().await?;
    table.replace_all(routes).await;
    info!(
        "Route table loaded: {} routes at index {}",
        table.len().await,
        client.watermark()
    );
    Ok(())
}

async fn update<S: RouteStore>(client: &mut DataClient<S>, table: &RouteTable) -> Result<(), CoreError> {
    let update = client.load_update().await?;
    debug!("Applying update at index {}: {:?}", client.watermark(), update);
    table.apply(update).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    async fn wait_for_len(table: &RouteTable, len: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while table.len().await != len {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("route table did not reach expected size");
    }

    #[tokio::test]
    async fn test_loop_follows_changes() {
        let store = Arc::new(MemoryStore::new());
        store.set("/skipper/routes/a", r#"Path("/a") -> <shunt>"#).await.unwrap();
        store.set("/skipper/routes/b", r#"Path("/b") -> <shunt>"#).await.unwrap();

        let table = RouteTable::new();
        let client = DataClient::new(store.clone(), "/skipper");
        let task = tokio::spawn(run(client, table.clone(), BackoffPolicy::default()));

        wait_for_len(&table, 2).await;

        store.set("/skipper/routes/c", "* -> <shunt>").await.unwrap();
        wait_for_len(&table, 3).await;

        store.delete("/skipper/routes/a").await.unwrap();
        wait_for_len(&table, 2).await;
        assert!(table.get("a").await.is_none());
        assert!(table.get("c").await.is_some());

        task.abort();
    }

    #[tokio::test]
    async fn test_loop_retries_bad_snapshot() {
        let store = Arc::new(MemoryStore::new());
        store.set("/skipper/routes/bad", "not a route").await.unwrap();

        let table = RouteTable::new();
        let client = DataClient::new(store.clone(), "/skipper");
        let backoff = BackoffPolicy {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(20),
        };
        let task = tokio::spawn(run(client, table.clone(), backoff));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(table.is_empty().await);

        store.set("/skipper/routes/bad", "* -> <shunt>").await.unwrap();
        wait_for_len(&table, 1).await;

        task.abort();
    }

    #[tokio::test]
    async fn test_loop_resumes_after_bad_update_is_fixed() {
        let store = Arc::new(MemoryStore::new());
        store.set("/skipper/routes/a", "* -> <shunt>").await.unwrap();

        let table = RouteTable::new();
        let client = DataClient::new(store.clone(), "/skipper");
        let backoff = BackoffPolicy {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(20),
        };
        let task = tokio::spawn(run(client, table.clone(), backoff));
        wait_for_len(&table, 1).await;

        store.set("/skipper/routes/b", "Path(").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(table.len().await, 1);

        store.set("/skipper/routes/b", "* -> <shunt>").await.unwrap();
        store.set("/skipper/routes/c", "* -> <shunt>").await.unwrap();
        wait_for_len(&table, 3).await;
        assert!(table.get("b").await.is_some());

        // the loop keeps following changes after recovering
        store.delete("/skipper/routes/a").await.unwrap();
        wait_for_len(&table, 2).await;

        task.abort();
    }

    #[tokio::test]
    async fn test_loop_recovers_stale_client() {
        let store = Arc::new(MemoryStore::with_history_limit(1));
        store.set("/skipper/routes/a", "* -> <shunt>").await.unwrap();

        let table = RouteTable::new();
        let mut client = DataClient::new(store.clone(), "/skipper");
        client.load_all().await.unwrap();

        // two changes while nobody watches: the first one falls out of history
        store.set("/skipper/routes/b", "* -> <shunt>").await.unwrap();
        store.set("/skipper/routes/c", "* -> <shunt>").await.unwrap();

        let err = client.load_update().await.unwrap_err();
        assert!(matches!(err, CoreError::Store(StoreError::IndexCleared { .. })));

        let task = tokio::spawn(run(client, table.clone(), BackoffPolicy::default()));
        wait_for_len(&table, 3).await;

        task.abort();
    }
}
