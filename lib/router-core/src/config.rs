//! Synchronization settings

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection and retry settings for a synchronizing client
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Store endpoints, tried in order
    pub endpoints: Vec<String>,
    /// Store path under which the `/routes` directory lives
    pub storage_root: String,
    /// Timeout for reads and writes (the watch long-poll has none)
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// Backoff between failed sync attempts
    pub backoff: BackoffPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
            storage_root: "/skipper".to_string(),
            request_timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(CoreError::InvalidConfiguration(
                "at least one store endpoint is required".to_string(),
            ));
        }

        if let Some(bad) = self
            .endpoints
            .iter()
            .find(|e| !(e.starts_with("http://") || e.starts_with("https://")))
        {
            return Err(CoreError::InvalidConfiguration(format!(
                "endpoint must be an http(s) URL: {}",
                bad
            )));
        }

        if !self.storage_root.is_empty() && !self.storage_root.starts_with('/') {
            return Err(CoreError::InvalidConfiguration(format!(
                "storage root must be absolute: {}",
                self.storage_root
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(CoreError::InvalidConfiguration(
                "request timeout must be positive".to_string(),
            ));
        }

        if self.backoff.initial > self.backoff.max {
            return Err(CoreError::InvalidConfiguration(
                "initial backoff exceeds maximum backoff".to_string(),
            ));
        }

        Ok(())
    }
}

/// Exponential backoff between retries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    #[serde(with = "duration_ms")]
    pub initial: Duration,
    #[serde(with = "duration_ms")]
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the retry following `failures` consecutive failures
    pub fn delay(&self, failures: u32) -> Duration {
        let base = self.initial.as_millis() as u64;
        let exponential = 2u64.saturating_pow(failures.saturating_sub(1));
        let delay_ms = base
            .saturating_mul(exponential)
            .min(self.max.as_millis() as u64);
        Duration::from_millis(delay_ms)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
