//! In-memory index of the assets known to the server
//!
//! Loaded once at the start of a run and kept current with the uploads of
//! the run. All writes go through one lock, so a worker's `should_upload`
//! sees every asset another worker added before it.

use crate::error::{IngestError, Result};
use crate::models::{device_asset_id, Advice, Album, Asset, ServerAsset};
use chrono::{DateTime, Duration, Utc};
use photosync_common::FileRef;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// Capture dates closer than this are the same moment
const DATE_TOLERANCE_MINUTES: i64 = 5;

#[derive(Debug, Default)]
struct IndexState {
    by_id: HashMap<String, ServerAsset>,
    by_basename: HashMap<String, Vec<String>>,
    by_device_asset_id: HashMap<String, String>,
    /// Ids created during this run
    uploaded: HashSet<String>,
    /// Files already handled during this run
    processed: HashMap<FileRef, String>,
    count: i64,
}

impl IndexState {
    fn insert(&mut self, sa: ServerAsset) {
        let dev_id = device_asset_id(&sa.original_file_name, sa.file_size);
        self.by_device_asset_id.insert(dev_id, sa.id.clone());
        let ids = self
            .by_basename
            .entry(sa.original_file_name.clone())
            .or_default();
        if !ids.contains(&sa.id) {
            ids.push(sa.id.clone());
        }
        self.by_id.insert(sa.id.clone(), sa);
        self.count += 1;
    }

    fn remove(&mut self, id: &str) -> Option<ServerAsset> {
        let sa = self.by_id.remove(id)?;
        let dev_id = device_asset_id(&sa.original_file_name, sa.file_size);
        if self.by_device_asset_id.get(&dev_id).map(String::as_str) == Some(id) {
            self.by_device_asset_id.remove(&dev_id);
        }
        if let Some(ids) = self.by_basename.get_mut(&sa.original_file_name) {
            ids.retain(|i| i != id);
            if ids.is_empty() {
                self.by_basename.remove(&sa.original_file_name);
            }
        }
        self.count -= 1;
        Some(sa)
    }
}

/// Server-side view of a freshly uploaded asset
fn server_view(asset: &Asset) -> ServerAsset {
    ServerAsset {
        id: asset.id.clone(),
        device_asset_id: asset.device_asset_id(),
        original_file_name: asset.original_file_name.clone(),
        capture_date: asset.date_for_comparison(),
        file_size: asset.file_size,
        checksum: asset.checksum.clone().unwrap_or_default(),
        trashed: asset.trashed,
        archived: asset.archived,
        albums: asset.albums.clone(),
        ..Default::default()
    }
}

/// Compare a local date with a server date
///
/// Dates less than five minutes apart are equal. A missing date only
/// equals another missing date.
pub fn compare_date(local: Option<DateTime<Utc>>, server: Option<DateTime<Utc>>) -> Ordering {
    match (local, server) {
        (Some(l), Some(s)) => {
            let diff = l - s;
            let tolerance = Duration::minutes(DATE_TOLERANCE_MINUTES);
            if diff <= -tolerance {
                Ordering::Less
            } else if diff >= tolerance {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}

#[derive(Debug, Default)]
pub struct ServerIndex {
    state: RwLock<IndexState>,
}

impl ServerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an asset listed by the server
    ///
    /// # Returns
    /// The entry already indexed under the same id, in which case nothing changes
    pub async fn add_remote(&self, sa: ServerAsset) -> Option<ServerAsset> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.by_id.get(&sa.id) {
            return Some(existing.clone());
        }
        state.insert(sa);
        None
    }

    /// Insert an asset uploaded during this run
    pub async fn add_local(&self, asset: &Asset) -> Result<()> {
        if asset.id.is_empty() {
            return Err(IngestError::Invariant(format!(
                "uploaded asset {} has no id",
                asset.file
            )));
        }
        let mut state = self.state.write().await;
        state.remove(&asset.id);
        state.insert(server_view(asset));
        state.uploaded.insert(asset.id.clone());
        state.processed.insert(asset.file.clone(), asset.id.clone());
        Ok(())
    }

    /// Swap a replaced server asset for its successor
    pub async fn replace(&self, new_asset: &Asset, old_id: &str) -> Result<()> {
        if new_asset.id.is_empty() {
            return Err(IngestError::Invariant(format!(
                "replacement for {} has no id",
                old_id
            )));
        }
        let mut state = self.state.write().await;
        let mut view = server_view(new_asset);
        if let Some(old) = state.remove(old_id) {
            for album in old.albums {
                if !view.albums.iter().any(|a| a.title == album.title) {
                    view.albums.push(album);
                }
            }
        }
        debug!(old = %old_id, new = %new_asset.id, "Server asset replaced");
        state.insert(view);
        state.uploaded.insert(new_asset.id.clone());
        state
            .processed
            .insert(new_asset.file.clone(), new_asset.id.clone());
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> Option<ServerAsset> {
        self.state.read().await.by_id.get(id).cloned()
    }

    /// Id of the server asset with this device asset id
    pub async fn get_by_device_asset_id(&self, dev_id: &str) -> Option<String> {
        self.state.read().await.by_device_asset_id.get(dev_id).cloned()
    }

    /// Whether the id was created during this run
    pub async fn is_uploaded(&self, id: &str) -> bool {
        self.state.read().await.uploaded.contains(id)
    }

    /// Remember that a file was handled, whatever the outcome
    pub async fn mark_processed(&self, file: &FileRef, id: &str) {
        self.state
            .write()
            .await
            .processed
            .insert(file.clone(), id.to_string());
    }

    /// Attach an album to a server asset
    pub async fn add_album_membership(&self, id: &str, album: &Album) {
        let mut state = self.state.write().await;
        if let Some(sa) = state.by_id.get_mut(id) {
            if !sa.albums.iter().any(|a| a.title == album.title) {
                sa.albums.push(album.clone());
            }
        }
    }

    pub async fn len(&self) -> i64 {
        self.state.read().await.count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn uploaded_count(&self) -> usize {
        self.state.read().await.uploaded.len()
    }

    /// Decide what to do with a local asset
    ///
    /// A file handled earlier in the run is `AlreadyProcessed`. A device
    /// asset id hit is `SameOnServer`. Otherwise the first server asset with
    /// the same base name and a capture date within five minutes decides by
    /// size: same, smaller (replace it) or better (keep it).
    pub async fn should_upload(&self, asset: &Asset) -> Advice {
        let state = self.state.read().await;

        if let Some(id) = state.processed.get(&asset.file) {
            return Advice::already_processed(state.by_id.get(id));
        }

        if let Some(sa) = state
            .by_device_asset_id
            .get(&asset.device_asset_id())
            .and_then(|id| state.by_id.get(id))
        {
            return Advice::same_on_server(sa);
        }

        let local_date = asset.date_for_comparison();
        for sa in state
            .by_basename
            .get(&asset.original_file_name)
            .into_iter()
            .flatten()
            .filter_map(|id| state.by_id.get(id))
        {
            if compare_date(local_date, sa.capture_date) != Ordering::Equal {
                continue;
            }
            return match asset.file_size.cmp(&sa.file_size) {
                Ordering::Equal => Advice::same_on_server(sa),
                Ordering::Greater => Advice::smaller_on_server(sa),
                Ordering::Less => Advice::better_on_server(sa),
            };
        }

        Advice::not_on_server()
    }
}
