//! Photo-server capability set
//!
//! The coordinator talks to the server only through [`ServerClient`].
//! Implementations: [`HttpServerClient`](super::http_client::HttpServerClient)
//! for the REST API, [`RetryingClient`](super::retrying_client::RetryingClient)
//! adding the backoff policy, and [`DryRunClient`] turning every mutating call
//! into a logged no-op.

use crate::error::Result;
use crate::models::{
    Album, AlbumInfo, Asset, AssetFilter, AssetPatch, AssetStatistics, JobCommand, ServerAsset,
    ServerJob, ServerUser, Tag, UploadResponse, UploadStatus,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Callback receiving server assets one at a time; an error aborts the listing
pub type AssetCallback<'a> = &'a mut (dyn FnMut(ServerAsset) -> Result<()> + Send);

#[async_trait]
pub trait ServerClient: Send + Sync {
    async fn get_my_user(&self) -> Result<ServerUser>;

    async fn get_asset_statistics(&self) -> Result<AssetStatistics>;

    /// Stream every asset matching `filter` into `callback`
    async fn get_all_assets(&self, filter: &AssetFilter, callback: AssetCallback<'_>) -> Result<()>;

    async fn get_asset_info(&self, id: &str) -> Result<ServerAsset>;

    async fn upload_asset(&self, asset: &Asset) -> Result<UploadResponse>;

    /// Partial update of an asset
    async fn update_asset(&self, id: &str, patch: &AssetPatch) -> Result<()>;

    /// Copy albums, tags, stack, favorite flag and sidecar from one asset to another
    async fn copy_asset(&self, from_id: &str, to_id: &str) -> Result<()>;

    async fn delete_assets(&self, ids: &[String], permanent: bool) -> Result<()>;

    async fn get_all_albums(&self) -> Result<Vec<Album>>;

    async fn get_album_info(&self, id: &str) -> Result<AlbumInfo>;

    async fn create_album(&self, title: &str, description: &str, asset_ids: &[String]) -> Result<Album>;

    async fn add_assets_to_album(&self, album_id: &str, asset_ids: &[String]) -> Result<()>;

    /// Create missing tags and return all of them with their ids
    async fn upsert_tags(&self, values: &[String]) -> Result<Vec<Tag>>;

    async fn bulk_tag_assets(&self, tag_ids: &[String], asset_ids: &[String]) -> Result<()>;

    /// Stack assets, the first id is the cover
    async fn create_stack(&self, asset_ids: &[String]) -> Result<()>;

    async fn get_jobs(&self) -> Result<Vec<ServerJob>>;

    async fn send_job_command(&self, name: &str, command: JobCommand) -> Result<()>;
}

/// Client that reads from the server but only logs writes
///
/// Uploads, albums and tags receive synthetic ids so the rest of the run
/// proceeds as if the server had accepted them.
pub struct DryRunClient<C: ServerClient + ?Sized> {
    inner: Arc<C>,
}

impl<C: ServerClient + ?Sized> DryRunClient<C> {
    pub fn new(inner: Arc<C>) -> Self {
        Self { inner }
    }
}

fn synthetic_id() -> String {
    format!("dry-run-{}", Uuid::new_v4())
}

#[async_trait]
impl<C: ServerClient + ?Sized> ServerClient for DryRunClient<C> {
    async fn get_my_user(&self) -> Result<ServerUser> {
        self.inner.get_my_user().await
    }

    async fn get_asset_statistics(&self) -> Result<AssetStatistics> {
        self.inner.get_asset_statistics().await
    }

    async fn get_all_assets(&self, filter: &AssetFilter, callback: AssetCallback<'_>) -> Result<()> {
        self.inner.get_all_assets(filter, callback).await
    }

    async fn get_asset_info(&self, id: &str) -> Result<ServerAsset> {
        self.inner.get_asset_info(id).await
    }

    async fn upload_asset(&self, asset: &Asset) -> Result<UploadResponse> {
        info!(file = %asset.file, "Dry run: upload");
        Ok(UploadResponse {
            id: synthetic_id(),
            status: UploadStatus::Created,
        })
    }

    async fn update_asset(&self, id: &str, _patch: &AssetPatch) -> Result<()> {
        info!(id = %id, "Dry run: update asset");
        Ok(())
    }

    async fn copy_asset(&self, from_id: &str, to_id: &str) -> Result<()> {
        info!(from = %from_id, to = %to_id, "Dry run: copy asset");
        Ok(())
    }

    async fn delete_assets(&self, ids: &[String], permanent: bool) -> Result<()> {
        info!(count = ids.len(), permanent, "Dry run: delete assets");
        Ok(())
    }

    async fn get_all_albums(&self) -> Result<Vec<Album>> {
        self.inner.get_all_albums().await
    }

    async fn get_album_info(&self, id: &str) -> Result<AlbumInfo> {
        self.inner.get_album_info(id).await
    }

    async fn create_album(&self, title: &str, description: &str, asset_ids: &[String]) -> Result<Album> {
        info!(album = %title, count = asset_ids.len(), "Dry run: create album");
        Ok(Album {
            id: synthetic_id(),
            title: title.to_string(),
            description: description.to_string(),
            ..Default::default()
        })
    }

    async fn add_assets_to_album(&self, album_id: &str, asset_ids: &[String]) -> Result<()> {
        info!(album = %album_id, count = asset_ids.len(), "Dry run: add to album");
        Ok(())
    }

    async fn upsert_tags(&self, values: &[String]) -> Result<Vec<Tag>> {
        info!(tags = ?values, "Dry run: upsert tags");
        Ok(values
            .iter()
            .map(|v| Tag {
                id: synthetic_id(),
                ..Tag::new(v.as_str())
            })
            .collect())
    }

    async fn bulk_tag_assets(&self, tag_ids: &[String], asset_ids: &[String]) -> Result<()> {
        info!(tags = tag_ids.len(), assets = asset_ids.len(), "Dry run: tag assets");
        Ok(())
    }

    async fn create_stack(&self, asset_ids: &[String]) -> Result<()> {
        info!(count = asset_ids.len(), "Dry run: stack");
        Ok(())
    }

    async fn get_jobs(&self) -> Result<Vec<ServerJob>> {
        self.inner.get_jobs().await
    }

    async fn send_job_command(&self, name: &str, command: JobCommand) -> Result<()> {
        info!(job = %name, command = ?command, "Dry run: job command");
        Ok(())
    }
}
