//! PRELUDE phase: warm the server caches and start the source

use super::UploadCoordinator;
use crate::error::{IngestError, Result};
use crate::models::{AlbumInfo, AssetFilter, JobCommand, ServerAsset};
use crate::services::asset_source::{AssetSource, GroupStream};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Server jobs slowing down large uploads
pub const PAUSABLE_JOBS: &[&str] = &[
    "thumbnailGeneration",
    "metadataExtraction",
    "videoConversion",
    "faceDetection",
    "smartSearch",
];

/// Album member lists fetched in parallel
const ALBUM_INFO_CONCURRENCY: usize = 4;

impl UploadCoordinator {
    /// Index the server, load the albums and start browsing the source
    ///
    /// The source is started first so local discovery overlaps the server
    /// listing; the groups wait in its channel until the caches are warm.
    pub(super) async fn prelude(
        &self,
        cancel: &CancellationToken,
        source: Arc<dyn AssetSource>,
    ) -> Result<GroupStream> {
        let groups = source.browse(cancel.clone());

        let (indexed, albums) = tokio::try_join!(
            self.load_server_assets(cancel),
            self.load_server_albums(cancel)
        )?;

        let mut memberships = 0;
        for info in albums {
            for id in &info.member_ids {
                self.index.add_album_membership(id, &info.album).await;
            }
            memberships += info.member_ids.len();
            let title = info.album.title.clone();
            self.albums
                .new_collection(&title, info.album, info.member_ids)
                .await;
        }

        info!(
            assets = indexed,
            memberships = memberships,
            "Server state loaded"
        );
        Ok(groups)
    }

    /// Stream every server asset of the current user into the index
    async fn load_server_assets(&self, cancel: &CancellationToken) -> Result<u64> {
        let user = self.client.get_my_user().await?;
        let statistics = self.client.get_asset_statistics().await?;
        self.progress.total.store(statistics.total, Ordering::Relaxed);
        info!(
            user = %user.email,
            total = statistics.total,
            "Reading server assets"
        );

        let filter = AssetFilter {
            with_deleted: Some(false),
            ..Default::default()
        };
        let mut batch: Vec<ServerAsset> = Vec::new();
        let mut callback = |sa: ServerAsset| -> Result<()> {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            self.progress.received.fetch_add(1, Ordering::Relaxed);
            if !sa.owner_id.is_empty() && !user.id.is_empty() && sa.owner_id != user.id {
                return Ok(());
            }
            if sa.library_id.as_deref().is_some_and(|l| !l.is_empty()) {
                return Ok(());
            }
            batch.push(sa);
            Ok(())
        };
        self.client.get_all_assets(&filter, &mut callback).await?;

        let mut indexed = 0;
        for sa in batch {
            if sa.trashed {
                continue;
            }
            if self.index.add_remote(sa).await.is_none() {
                indexed += 1;
            }
        }
        Ok(indexed)
    }

    /// Fetch every album with its member ids
    ///
    /// An album whose members can't be read is skipped with a warning.
    async fn load_server_albums(&self, cancel: &CancellationToken) -> Result<Vec<AlbumInfo>> {
        let albums = self.client.get_all_albums().await?;
        debug!(count = albums.len(), "Reading server albums");

        let infos: Vec<Option<AlbumInfo>> = stream::iter(albums)
            .map(|album| async move {
                if cancel.is_cancelled() {
                    return Err(IngestError::Cancelled);
                }
                match self.client.get_album_info(&album.id).await {
                    Ok(mut info) => {
                        if info.album.id.is_empty() {
                            info.album = album;
                        }
                        Ok(Some(info))
                    }
                    Err(IngestError::Cancelled) => Err(IngestError::Cancelled),
                    Err(e) => {
                        warn!(
                            album = %album.title,
                            id = %album.id,
                            error = %e,
                            "Can't read album members, skipping it"
                        );
                        Ok(None)
                    }
                }
            })
            .buffer_unordered(ALBUM_INFO_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(infos.into_iter().flatten().collect())
    }

    /// Pause the server jobs that are still running
    pub(super) async fn pause_jobs(&self) -> Result<()> {
        let jobs = self.client.get_jobs().await?;
        for job in jobs {
            if !PAUSABLE_JOBS.contains(&job.name.as_str()) || job.is_paused {
                continue;
            }
            self.client
                .send_job_command(&job.name, JobCommand::Pause)
                .await?;
            info!(job = %job.name, "Server job paused");
            self.lock_paused_jobs().push(job.name);
        }
        Ok(())
    }

    pub(super) fn lock_paused_jobs(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        match self.paused_jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
