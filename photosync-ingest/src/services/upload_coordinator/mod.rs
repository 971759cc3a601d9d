//! Upload coordinator
//!
//! Drives one run from a group stream to the server.
//!
//! # Phases
//! PRELUDE → UPLOADING → FINISHING
//!
//! - **PRELUDE** (`phase_prelude.rs`): index the server assets, load the
//!   albums and their members, and start the source, all concurrently
//! - **UPLOADING** (`phase_uploading.rs`): bounded worker pool over the
//!   groups, each group filtered, its assets handled one after the other
//!   (`asset_actions.rs`), then stacked
//! - **FINISHING** (`phase_finishing.rs`): flush albums and tags, resume
//!   paused server jobs, delete queued server assets, log the report
//!
//! The index, the album cache, the tagger and the recorder live as long as
//! the coordinator; nothing is shared between runs.

mod asset_actions;
mod phase_finishing;
mod phase_prelude;
mod phase_uploading;

use crate::error::{ErrorKind, IngestError, Result};
use crate::models::Album;
use crate::services::asset_source::AssetSource;
use crate::services::bulk_tagger::{BulkTagger, DEFAULT_TAG_BATCH};
use crate::services::collection_cache::{CollectionCache, SaveFn, DEFAULT_MAX_BATCH};
use crate::services::group_filters::GroupFilters;
use crate::services::server_client::ServerClient;
use crate::services::server_index::ServerIndex;
use chrono::{DateTime, Local};
use futures::FutureExt;
use photosync_common::EventRecorder;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Largest worker count
pub const MAX_CONCURRENCY: usize = 20;

/// How many counted errors a run tolerates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorTolerance {
    /// Stop at the first error
    Stop,
    #[default]
    Continue,
    /// Stop once more than this many errors occurred
    After(usize),
}

impl FromStr for ErrorTolerance {
    type Err = photosync_common::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stop" => Ok(ErrorTolerance::Stop),
            "" | "continue" => Ok(ErrorTolerance::Continue),
            other => other.parse().map(ErrorTolerance::After).map_err(|_| {
                photosync_common::Error::InvalidInput(format!(
                    "invalid error tolerance {:?}, expected stop, continue or a number",
                    s
                ))
            }),
        }
    }
}

impl fmt::Display for ErrorTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorTolerance::Stop => f.write_str("stop"),
            ErrorTolerance::Continue => f.write_str("continue"),
            ErrorTolerance::After(n) => write!(f, "{}", n),
        }
    }
}

/// Run settings
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Groups handled in parallel, clamped to [1, 20]
    pub concurrency: usize,
    /// Replace server assets whatever the advice
    pub overwrite: bool,
    pub pause_server_jobs: bool,
    /// Tags added to every uploaded asset
    pub tags: Vec<String>,
    /// Tag identifying this run, see [`session_tag`]
    pub session_tag: Option<String>,
    pub filters: GroupFilters,
    pub on_errors: ErrorTolerance,
    pub album_batch: usize,
    pub tag_batch: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            overwrite: false,
            pause_server_jobs: false,
            tags: Vec::new(),
            session_tag: None,
            filters: GroupFilters::default(),
            on_errors: ErrorTolerance::Continue,
            album_batch: DEFAULT_MAX_BATCH,
            tag_batch: DEFAULT_TAG_BATCH,
        }
    }
}

/// Hardware thread count, clamped to the worker limits
pub fn default_concurrency() -> usize {
    num_cpus::get().clamp(1, MAX_CONCURRENCY)
}

/// Session tag for a run started at `start`
pub fn session_tag(start: DateTime<Local>) -> String {
    format!("photosync/{}", start.format("%Y-%m-%d %H:%M:%S"))
}

/// Save callback of the album cache: create the album, or add to it
async fn save_album(client: Arc<dyn ServerClient>, mut album: Album, ids: Vec<String>) -> Result<Album> {
    if ids.is_empty() {
        return Ok(album);
    }
    if album.id.is_empty() {
        let created = client
            .create_album(&album.title, &album.description, &ids)
            .await?;
        info!(album = %album.title, assets = ids.len(), "Album created");
        album.id = created.id;
    } else {
        client.add_assets_to_album(&album.id, &ids).await?;
        info!(album = %album.title, assets = ids.len(), "Album updated");
    }
    Ok(album)
}

/// Server asset reading progress
#[derive(Debug, Default)]
struct ServerProgress {
    received: AtomicU64,
    total: AtomicU64,
}

pub struct UploadCoordinator {
    client: Arc<dyn ServerClient>,
    recorder: Arc<EventRecorder>,
    index: Arc<ServerIndex>,
    albums: Arc<CollectionCache<Album>>,
    tagger: BulkTagger,
    options: UploadOptions,
    /// Replaced server assets whose deletion was interrupted
    delete_queue: Mutex<Vec<String>>,
    /// Server jobs paused by this run
    paused_jobs: Mutex<Vec<String>>,
    error_count: AtomicUsize,
    progress: ServerProgress,
}

impl UploadCoordinator {
    /// Create a coordinator
    ///
    /// # Arguments
    /// * `client` - Server client, usually wrapped in a `RetryingClient`
    /// * `recorder` - Receives every decision of the run
    /// * `options` - Run settings
    pub fn new(client: Arc<dyn ServerClient>, recorder: Arc<EventRecorder>, mut options: UploadOptions) -> Self {
        options.concurrency = options.concurrency.clamp(1, MAX_CONCURRENCY);

        let save_client = client.clone();
        let save: SaveFn<Album> = Arc::new(move |album: Album, ids: Vec<String>| {
            save_album(save_client.clone(), album, ids).boxed()
        });
        let albums = Arc::new(CollectionCache::new(options.album_batch, save));
        let tagger = BulkTagger::new(client.clone(), recorder.clone(), options.tag_batch);

        Self {
            client,
            recorder,
            index: Arc::new(ServerIndex::new()),
            albums,
            tagger,
            options,
            delete_queue: Mutex::new(Vec::new()),
            paused_jobs: Mutex::new(Vec::new()),
            error_count: AtomicUsize::new(0),
            progress: ServerProgress::default(),
        }
    }

    pub fn index(&self) -> &Arc<ServerIndex> {
        &self.index
    }

    pub fn recorder(&self) -> &Arc<EventRecorder> {
        &self.recorder
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Run the whole ingestion
    ///
    /// # Arguments
    /// * `cancel` - Run token; cancelling it stops the run after the groups in flight
    /// * `source` - Producer of the groups
    ///
    /// # Returns
    /// The fatal cause when the run was aborted, `IngestError::Cancelled`
    /// when it was interrupted, `Ok` otherwise. Per-asset errors are only
    /// recorded.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken, source: Arc<dyn AssetSource>) -> Result<()> {
        let run_cancel = cancel.child_token();
        info!(
            concurrency = self.options.concurrency,
            overwrite = self.options.overwrite,
            on_errors = %self.options.on_errors,
            "Upload run starting"
        );

        let mut fatal = None;
        if self.options.pause_server_jobs {
            if let Err(e) = self.pause_jobs().await {
                warn!(error = %e, "Can't pause server jobs, an administrator key may be needed");
                fatal = Some(e);
            }
        }

        if fatal.is_none() {
            match self.prelude(&run_cancel, source).await {
                Ok(groups) => {
                    fatal = self.upload_loop(&run_cancel, groups).await;
                }
                Err(e) => {
                    run_cancel.cancel();
                    fatal = Some(e);
                }
            }
        }

        let finished = self.finish().await;

        if let Some(cause) = fatal {
            if cause.kind() != ErrorKind::Cancelled || !cancel.is_cancelled() {
                return Err(cause);
            }
        }
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        finished
    }

    /// Decide whether an error stops the run
    ///
    /// # Returns
    /// The error when it is fatal, `None` when the run continues
    fn classify(&self, err: IngestError) -> Option<IngestError> {
        match err.kind() {
            ErrorKind::Cancelled | ErrorKind::Invariant => Some(err),
            ErrorKind::SourceAccess | ErrorKind::SidecarParse => None,
            ErrorKind::Transient | ErrorKind::Permanent => {
                let count = self.error_count.fetch_add(1, Ordering::SeqCst) + 1;
                match self.options.on_errors {
                    ErrorTolerance::Stop => Some(err),
                    ErrorTolerance::Continue => None,
                    ErrorTolerance::After(limit) if count > limit => Some(err),
                    ErrorTolerance::After(_) => None,
                }
            }
        }
    }
}
