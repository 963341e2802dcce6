//! Stuck-merge reaper.
//!
//! A process that dies during the concatenate phase leaves its fragment
//! claimed forever. With a lease configured, claims older than the lease
//! are reset so the client can retry the merge.

use crate::error::UploadResult;
use mosaic_metadata::MetadataStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Releases merge claims older than a lease.
#[derive(Clone)]
pub struct MergeReaper {
    metadata: Arc<dyn MetadataStore>,
    lease: Duration,
}

impl MergeReaper {
    pub fn new(metadata: Arc<dyn MetadataStore>, lease: Duration) -> Self {
        Self { metadata, lease }
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Release every claim older than the lease. Returns the released ids.
    pub async fn run_once(&self) -> UploadResult<Vec<i64>> {
        let lease_secs = i64::try_from(self.lease.as_secs()).unwrap_or(i64::MAX);
        let older_than = mosaic_core::unix_now().saturating_sub(lease_secs);

        let released = self.metadata.release_stale_merges(older_than).await?;
        for fragment_id in &released {
            tracing::warn!(
                fragment_id,
                lease_secs,
                "Released abandoned merge claim"
            );
        }
        Ok(released)
    }

    /// Run `run_once` every `interval` on the current runtime.
    ///
    /// `on_release` is called with the ids released by each pass that
    /// released at least one claim.
    pub fn spawn<F>(self, interval: Duration, on_release: F) -> JoinHandle<()>
    where
        F: Fn(&[i64]) + Send + 'static,
    {
        tracing::info!(
            lease_secs = self.lease.as_secs(),
            interval_secs = interval.as_secs(),
            "Starting merge reaper"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.run_once().await {
                    Ok(released) if !released.is_empty() => on_release(&released),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Merge reaper pass failed"),
                }
            }
        })
    }
}
