//! Backoff wrapper for any server client
//!
//! Transient errors (5xx, timeouts, connection failures) are retried with
//! the run's `ExponentialBackoff`; everything else is returned at once.

use crate::error::{IngestError, Result};
use crate::models::{
    Album, AlbumInfo, Asset, AssetFilter, AssetPatch, AssetStatistics, JobCommand, ServerAsset,
    ServerJob, ServerUser, Tag, UploadResponse,
};
use crate::services::server_client::{AssetCallback, ServerClient};
use async_trait::async_trait;
use photosync_common::ExponentialBackoff;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub struct RetryingClient<C: ServerClient + ?Sized> {
    inner: Arc<C>,
    policy: ExponentialBackoff,
    cancel: CancellationToken,
}

impl<C: ServerClient + ?Sized> RetryingClient<C> {
    /// Wrap a client
    ///
    /// # Arguments
    /// * `inner` - Client doing the actual calls
    /// * `policy` - Backoff policy for transient errors
    /// * `cancel` - Token interrupting the waits between attempts
    pub fn new(inner: Arc<C>, policy: ExponentialBackoff, cancel: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            cancel,
        }
    }

    async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.policy
            .retry(&self.cancel, op, IngestError::is_transient)
            .await
    }
}

#[async_trait]
impl<C: ServerClient + ?Sized> ServerClient for RetryingClient<C> {
    async fn get_my_user(&self) -> Result<ServerUser> {
        self.call(|| self.inner.get_my_user()).await
    }

    async fn get_asset_statistics(&self) -> Result<AssetStatistics> {
        self.call(|| self.inner.get_asset_statistics()).await
    }

    /// The callback can't be shared between attempts, so the listing is
    /// retried by hand. Assets delivered before a failure are delivered again.
    async fn get_all_assets(&self, filter: &AssetFilter, callback: AssetCallback<'_>) -> Result<()> {
        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            match self.inner.get_all_assets(filter, &mut *callback).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.next_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Asset listing failed, retrying"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(IngestError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_asset_info(&self, id: &str) -> Result<ServerAsset> {
        self.call(|| self.inner.get_asset_info(id)).await
    }

    async fn upload_asset(&self, asset: &Asset) -> Result<UploadResponse> {
        self.call(|| self.inner.upload_asset(asset)).await
    }

    async fn update_asset(&self, id: &str, patch: &AssetPatch) -> Result<()> {
        self.call(|| self.inner.update_asset(id, patch)).await
    }

    async fn copy_asset(&self, from_id: &str, to_id: &str) -> Result<()> {
        self.call(|| self.inner.copy_asset(from_id, to_id)).await
    }

    async fn delete_assets(&self, ids: &[String], permanent: bool) -> Result<()> {
        self.call(|| self.inner.delete_assets(ids, permanent)).await
    }

    async fn get_all_albums(&self) -> Result<Vec<Album>> {
        self.call(|| self.inner.get_all_albums()).await
    }

    async fn get_album_info(&self, id: &str) -> Result<AlbumInfo> {
        self.call(|| self.inner.get_album_info(id)).await
    }

    async fn create_album(&self, title: &str, description: &str, asset_ids: &[String]) -> Result<Album> {
        self.call(|| self.inner.create_album(title, description, asset_ids))
            .await
    }

    async fn add_assets_to_album(&self, album_id: &str, asset_ids: &[String]) -> Result<()> {
        self.call(|| self.inner.add_assets_to_album(album_id, asset_ids))
            .await
    }

    async fn upsert_tags(&self, values: &[String]) -> Result<Vec<Tag>> {
        self.call(|| self.inner.upsert_tags(values)).await
    }

    async fn bulk_tag_assets(&self, tag_ids: &[String], asset_ids: &[String]) -> Result<()> {
        self.call(|| self.inner.bulk_tag_assets(tag_ids, asset_ids))
            .await
    }

    async fn create_stack(&self, asset_ids: &[String]) -> Result<()> {
        self.call(|| self.inner.create_stack(asset_ids)).await
    }

    async fn get_jobs(&self) -> Result<Vec<ServerJob>> {
        self.call(|| self.inner.get_jobs()).await
    }

    async fn send_job_command(&self, name: &str, command: JobCommand) -> Result<()> {
        self.call(|| self.inner.send_job_command(name, command))
            .await
    }
}
