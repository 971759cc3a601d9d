//! Per-asset decisions and their server-side actions

use super::UploadCoordinator;
use crate::error::{ErrorKind, IngestError, Result};
use crate::models::{AdviceCode, Advice, Asset, AssetPatch, ServerAsset, UploadStatus};
use photosync_common::EventCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl UploadCoordinator {
    /// Decide and act on one asset, then close it
    pub(super) async fn handle_asset(&self, cancel: &CancellationToken, asset: &mut Asset) -> Result<()> {
        let result = self.act_on_advice(cancel, asset).await;
        asset.close();
        result
    }

    async fn act_on_advice(&self, cancel: &CancellationToken, asset: &mut Asset) -> Result<()> {
        let mut advice = self.index.should_upload(asset).await;
        if self.options.overwrite && advice.code != AdviceCode::AlreadyProcessed {
            advice = Advice::force_upload(advice.server_asset.take());
        }
        debug!(file = %asset.file, advice = %advice.code, "{}", advice.message);

        match advice.code {
            AdviceCode::NotOnServer => {
                if self.upload_asset(cancel, asset).await? == UploadStatus::Created {
                    self.manage_albums(asset).await;
                    self.manage_tags(asset).await?;
                }
            }

            AdviceCode::SmallerOnServer => {
                let old = self.matched(&advice, asset)?;
                self.upgrade(cancel, asset, &old).await?;
            }

            AdviceCode::SameOnServer => {
                let sa = self.matched(&advice, asset)?;
                asset.id = sa.id.clone();
                for album in sa.albums {
                    asset.add_album(album);
                }
                self.recorder.record(
                    EventCode::DiscardedServerDuplicate,
                    Some(&asset.file),
                    &[("reason", &advice.message)],
                );
                self.index.mark_processed(&asset.file, &asset.id).await;
                self.manage_albums(asset).await;
            }

            AdviceCode::BetterOnServer => {
                let sa = self.matched(&advice, asset)?;
                asset.id = sa.id;
                self.recorder.record(
                    EventCode::DiscardedServerDuplicate,
                    Some(&asset.file),
                    &[("reason", &advice.message)],
                );
                self.index.mark_processed(&asset.file, &asset.id).await;
                self.manage_albums(asset).await;
            }

            AdviceCode::AlreadyProcessed => {
                if let Some(sa) = advice.server_asset {
                    asset.id = sa.id;
                }
                self.recorder.record(
                    EventCode::DiscardedLocalDuplicate,
                    Some(&asset.file),
                    &[("reason", &advice.message)],
                );
                self.manage_albums(asset).await;
            }

            AdviceCode::ForceUpload => match advice.server_asset {
                Some(old) => self.upgrade(cancel, asset, &old).await?,
                None => {
                    if self.upload_asset(cancel, asset).await? == UploadStatus::Created {
                        self.manage_albums(asset).await;
                        self.manage_tags(asset).await?;
                    }
                }
            },
        }
        Ok(())
    }

    fn matched(&self, advice: &Advice, asset: &Asset) -> Result<ServerAsset> {
        advice.server_asset.clone().ok_or_else(|| {
            IngestError::Invariant(format!(
                "advice {} for {} carries no server asset",
                advice.code, asset.file
            ))
        })
    }

    /// Replace `old` by the local asset, keeping its albums
    async fn upgrade(&self, cancel: &CancellationToken, asset: &mut Asset, old: &ServerAsset) -> Result<()> {
        for album in old.albums.iter().cloned() {
            asset.add_album(album);
        }
        if self.replace_asset(cancel, asset, old).await? == UploadStatus::Created {
            self.recorder.record(
                EventCode::ProcessedUploadUpgraded,
                Some(&asset.file),
                &[("replaced", &old.id)],
            );
            self.manage_albums(asset).await;
            self.manage_tags(asset).await?;
        }
        Ok(())
    }

    fn add_run_tags(&self, asset: &mut Asset) {
        if let Some(tag) = &self.options.session_tag {
            asset.add_tag(tag);
        }
        for tag in &self.options.tags {
            asset.add_tag(tag);
        }
    }

    /// Upload a new asset
    ///
    /// # Returns
    /// The server's answer; the asset id is set in both cases
    pub(super) async fn upload_asset(&self, cancel: &CancellationToken, asset: &mut Asset) -> Result<UploadStatus> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        self.add_run_tags(asset);

        let response = match self.client.upload_asset(asset).await {
            Ok(response) => response,
            Err(e) => {
                self.record_failure(asset, EventCode::ErrorUploadFailed, &e);
                return Err(e);
            }
        };
        if response.id.is_empty() {
            return Err(IngestError::Invariant(format!(
                "server returned no id for {}",
                asset.file
            )));
        }
        asset.id = response.id;

        if response.status == UploadStatus::Duplicate {
            let code = if self.index.is_uploaded(&asset.id).await {
                EventCode::DiscardedLocalDuplicate
            } else {
                EventCode::DiscardedServerDuplicate
            };
            self.recorder.record(
                code,
                Some(&asset.file),
                &[("reason", "the server already has this file"), ("id", &asset.id)],
            );
            self.index.mark_processed(&asset.file, &asset.id).await;
            return Ok(UploadStatus::Duplicate);
        }

        self.recorder
            .record(EventCode::ProcessedUploaded, Some(&asset.file), &[("id", &asset.id)]);

        if let Some(md) = asset.from_application.clone() {
            asset.use_metadata(&md);
            self.patch_metadata(asset).await?;
        }

        self.index.add_local(asset).await?;
        Ok(UploadStatus::Created)
    }

    /// Copy the server-authoritative metadata onto the uploaded asset
    async fn patch_metadata(&self, asset: &Asset) -> Result<()> {
        let patch = AssetPatch {
            description: (!asset.description.is_empty()).then(|| asset.description.clone()),
            latitude: asset.latitude,
            longitude: asset.longitude,
            rating: (asset.rating > 0).then_some(asset.rating),
            date_time_original: asset.capture_date,
            ..Default::default()
        };
        if patch.is_empty() {
            return Ok(());
        }
        match self.client.update_asset(&asset.id, &patch).await {
            Ok(()) => {
                self.recorder
                    .record(EventCode::ProcessedMetadataUpdated, Some(&asset.file), &[]);
                Ok(())
            }
            Err(e) => {
                self.record_failure(asset, EventCode::ErrorServerError, &e);
                Err(e)
            }
        }
    }

    /// Upload the asset, move the server metadata of `old` onto it, delete `old`
    ///
    /// No rollback happens when a step fails; the next run sees the
    /// intermediate state through the index.
    pub(super) async fn replace_asset(
        &self,
        cancel: &CancellationToken,
        asset: &mut Asset,
        old: &ServerAsset,
    ) -> Result<UploadStatus> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        self.add_run_tags(asset);

        let response = match self.client.upload_asset(asset).await {
            Ok(response) => response,
            Err(e) => {
                self.record_failure(asset, EventCode::ErrorUploadFailed, &e);
                return Err(e);
            }
        };
        if response.id.is_empty() {
            return Err(IngestError::Invariant(format!(
                "server returned no id for {}",
                asset.file
            )));
        }
        asset.id = response.id;

        if response.status == UploadStatus::Duplicate {
            self.recorder.record(
                EventCode::DiscardedServerDuplicate,
                Some(&asset.file),
                &[("reason", "the server already has this file"), ("id", &asset.id)],
            );
            self.index.mark_processed(&asset.file, &asset.id).await;
            return Ok(UploadStatus::Duplicate);
        }

        if let Err(e) = self.client.copy_asset(&old.id, &asset.id).await {
            self.record_failure(asset, EventCode::ErrorServerError, &e);
            return Err(e);
        }

        if cancel.is_cancelled() {
            info!(old = %old.id, new = %asset.id, "Deletion of the replaced asset postponed");
            self.lock_delete_queue().push(old.id.clone());
        } else if let Err(e) = self
            .client
            .delete_assets(std::slice::from_ref(&old.id), true)
            .await
        {
            self.record_failure(asset, EventCode::ErrorServerError, &e);
            return Err(e);
        }

        self.index.replace(asset, &old.id).await?;
        Ok(UploadStatus::Created)
    }

    /// Add the asset to each of its albums
    pub(super) async fn manage_albums(&self, asset: &Asset) {
        if asset.id.is_empty() {
            return;
        }
        for album in &asset.albums {
            match self.albums.add(&album.title, album.clone(), &asset.id).await {
                Ok(true) => {
                    self.recorder.record(
                        EventCode::ProcessedAlbumAdded,
                        Some(&asset.file),
                        &[("album", &album.title)],
                    );
                    self.index.add_album_membership(&asset.id, album).await;
                }
                Ok(false) => {}
                Err(e) => {
                    self.recorder.record(
                        EventCode::ErrorServerError,
                        Some(&asset.file),
                        &[("album", &album.title), ("error", &e.to_string())],
                    );
                }
            }
        }
    }

    /// Queue the asset for each of its tags
    pub(super) async fn manage_tags(&self, asset: &Asset) -> Result<()> {
        if asset.id.is_empty() {
            return Ok(());
        }
        for tag in &asset.tags {
            self.tagger.add(&tag.value, &asset.id).await?;
            self.recorder
                .record(EventCode::ProcessedTagged, Some(&asset.file), &[("tag", &tag.value)]);
        }
        Ok(())
    }

    /// Record a failed server call with the code matching its kind
    fn record_failure(&self, asset: &Asset, server_code: EventCode, err: &IngestError) {
        let code = match err.kind() {
            ErrorKind::Cancelled => return,
            ErrorKind::SourceAccess => EventCode::ErrorFileAccess,
            ErrorKind::Transient => EventCode::ErrorServerError,
            ErrorKind::Permanent | ErrorKind::SidecarParse | ErrorKind::Invariant => server_code,
        };
        warn!(file = %asset.file, error = %err, "Server call failed");
        self.recorder
            .record(code, Some(&asset.file), &[("error", &err.to_string())]);
    }

    pub(super) fn lock_delete_queue(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        match self.delete_queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
