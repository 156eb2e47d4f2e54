//! Object storage seam for uploaded media and best-effort removal of orphans.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const COMPENSATION_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum AssetStoreError {
    #[error("asset url `{0}` is not served by this store")]
    ForeignUrl(String),
    #[error("asset `{0}` does not exist")]
    Missing(String),
    #[error("object store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores `data` under `name` and returns its public URL.
    async fn upload(
        &self,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, AssetStoreError>;

    /// Removes the object behind `url`. Removing a missing object succeeds.
    async fn delete(&self, url: &str) -> Result<(), AssetStoreError>;
}

/// Deletes assets that no report references any more.
///
/// Work runs on a detached task bounded by a timeout; the caller never waits
/// and failures are only logged.
#[derive(Clone)]
pub struct AssetJanitor {
    store: Arc<dyn AssetStore>,
    timeout: Duration,
}

impl AssetJanitor {
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self {
            store,
            timeout: COMPENSATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Schedules deletion of `urls`. The handle is returned for callers that
    /// want to observe completion; dropping it leaves the task running.
    pub fn dispatch(&self, reason: &'static str, urls: Vec<String>) -> Option<JoinHandle<()>> {
        if urls.is_empty() {
            return None;
        }

        let store = self.store.clone();
        let timeout = self.timeout;
        Some(tokio::spawn(async move {
            let total = urls.len();
            match tokio::time::timeout(timeout, remove_all(store.as_ref(), &urls)).await {
                Ok(0) => debug!(
                    target = "civic_reports::assets",
                    reason,
                    removed = total,
                    "orphaned assets removed"
                ),
                Ok(failed) => warn!(
                    target = "civic_reports::assets",
                    reason,
                    failed,
                    total,
                    "some orphaned assets could not be removed"
                ),
                Err(_) => warn!(
                    target = "civic_reports::assets",
                    reason,
                    total,
                    timeout_secs = timeout.as_secs(),
                    "asset cleanup timed out"
                ),
            }
        }))
    }
}

async fn remove_all(store: &dyn AssetStore, urls: &[String]) -> usize {
    let mut failed = 0;
    for url in urls {
        match store.delete(url).await {
            Ok(()) => counter!("civic_reports_assets_compensated_total").increment(1),
            Err(err) => {
                failed += 1;
                warn!(
                    target = "civic_reports::assets",
                    url = %url,
                    error = %err,
                    "failed to delete asset"
                );
            }
        }
    }
    failed
}
