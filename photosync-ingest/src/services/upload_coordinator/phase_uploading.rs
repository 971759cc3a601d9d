//! UPLOADING phase: bounded worker pool over the group stream

use super::UploadCoordinator;
use crate::error::{IngestError, Result};
use crate::models::{Group, Grouping};
use crate::services::asset_source::GroupStream;
use crate::services::group_filters::REASON_BANNED;
use futures::stream::{FuturesUnordered, StreamExt};
use photosync_common::EventCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

impl UploadCoordinator {
    /// Drain the group stream with at most `concurrency` groups in flight
    ///
    /// # Returns
    /// The error that stopped the run, if any
    pub(super) async fn upload_loop(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        mut groups: GroupStream,
    ) -> Option<IngestError> {
        let workers = self.options.concurrency;
        let mut tasks: FuturesUnordered<JoinHandle<Result<()>>> = FuturesUnordered::new();
        let mut ticker = interval(PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut source_open = true;
        let mut fatal: Option<IngestError> = None;

        info!(workers = workers, "Uploading");

        loop {
            if !source_open && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled(), if source_open => {
                    info!("Upload cancelled, finishing the groups in flight");
                    source_open = false;
                }

                Some(joined) = tasks.next(), if !tasks.is_empty() => {
                    let result = joined.unwrap_or_else(|e: tokio::task::JoinError| {
                        Err(IngestError::Invariant(format!("group task failed: {}", e)))
                    });
                    if let Err(e) = result {
                        if let Some(cause) = self.classify(e) {
                            warn!(error = %cause, "Stopping the run");
                            if fatal.is_none() {
                                fatal = Some(cause);
                            }
                            cancel.cancel();
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.log_progress().await;
                }

                item = groups.recv(), if source_open && tasks.len() < workers => {
                    match item {
                        Some(Ok(group)) => {
                            let this = self.clone();
                            let token = cancel.clone();
                            tasks.push(tokio::spawn(async move {
                                this.handle_group(&token, group).await
                            }));
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Source failed");
                            if let Some(cause) = self.classify(e) {
                                if fatal.is_none() {
                                    fatal = Some(cause);
                                }
                                cancel.cancel();
                                source_open = false;
                            }
                        }
                        None => {
                            debug!("Source exhausted");
                            source_open = false;
                        }
                    }
                }
            }
        }

        self.discard_unread(&mut groups);
        self.log_progress().await;
        fatal
    }

    /// Close the assets of groups left in the channel after a stop
    fn discard_unread(&self, groups: &mut GroupStream) {
        groups.close();
        let mut left = 0;
        while let Ok(item) = groups.try_recv() {
            if let Ok(mut group) = item {
                for asset in group.assets.iter_mut() {
                    asset.close();
                }
                left += 1;
            }
        }
        if left > 0 {
            debug!(groups = left, "Groups left unprocessed");
        }
    }

    async fn log_progress(&self) {
        info!(
            server_assets = self.progress.received.load(Ordering::Relaxed),
            server_total = self.progress.total.load(Ordering::Relaxed),
            indexed = self.index.len().await,
            assets = self.recorder.total_assets(),
            uploaded = self.recorder.count(EventCode::ProcessedUploaded),
            errors = self.recorder.error_count(),
            "Progress"
        );
    }

    /// Filter a group, handle its assets one after the other, then stack it
    async fn handle_group(&self, cancel: &CancellationToken, group: Group) -> Result<()> {
        let mut group = self.options.filters.apply(group);
        for album in &group.albums {
            for asset in group.assets.iter_mut() {
                asset.add_album(album.clone());
            }
        }

        for mut removed in group.removed.drain(..) {
            let code = if removed.reason == REASON_BANNED {
                EventCode::DiscardedBanned
            } else {
                EventCode::DiscardedFiltered
            };
            self.recorder
                .record(code, Some(&removed.asset.file), &[("reason", &removed.reason)]);
            removed.asset.close();
        }

        let mut errors = Vec::new();
        for i in 0..group.assets.len() {
            if cancel.is_cancelled() {
                errors.push(IngestError::Cancelled);
                break;
            }
            if let Err(e) = self.handle_asset(cancel, &mut group.assets[i]).await {
                errors.push(e);
            }
        }
        for asset in group.assets.iter_mut() {
            asset.close();
        }

        if errors.is_empty() && group.assets.len() > 1 && group.grouping != Grouping::None {
            self.stack_group(&group).await;
        }

        match IngestError::join(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stack the uploaded members of a group, cover first
    async fn stack_group(&self, group: &Group) {
        let cover = group.cover_index;
        let mut members: Vec<usize> = Vec::with_capacity(group.assets.len());
        if group.assets.get(cover).is_some_and(|a| !a.id.is_empty()) {
            members.push(cover);
        }
        members.extend(
            (0..group.assets.len()).filter(|&i| i != cover && !group.assets[i].id.is_empty()),
        );
        if members.len() < 2 {
            return;
        }

        let mut ids: Vec<String> = Vec::with_capacity(members.len());
        for &i in &members {
            let id = &group.assets[i].id;
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        if ids.len() < 2 {
            return;
        }

        match self.client.create_stack(&ids).await {
            Ok(()) => {
                for &i in &members {
                    let asset = &group.assets[i];
                    self.recorder.record(
                        EventCode::ProcessedStacked,
                        Some(&asset.file),
                        &[("grouping", &group.grouping.to_string())],
                    );
                }
            }
            Err(e) => {
                warn!(
                    cover = %group.assets[members[0]].file,
                    error = %e,
                    "Can't stack the group"
                );
            }
        }
    }
}
