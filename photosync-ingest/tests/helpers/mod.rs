//! Test helpers: in-memory photo server and asset sources
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use photosync_common::{EventRecorder, FileRef};
use photosync_ingest::error::{IngestError, Result};
use photosync_ingest::models::{
    Album, AlbumInfo, Asset, AssetFilter, AssetPatch, AssetStatistics, BodySource, Group,
    JobCommand, MemoryBody, ServerAsset, ServerJob, ServerUser, Tag, UploadResponse, UploadStatus,
};
use photosync_ingest::services::asset_source::{AssetSource, GroupStream, GROUP_BUFFER};
use photosync_ingest::services::server_client::AssetCallback;
use photosync_ingest::services::{
    FilenameClock, NameAnalyser, ServerClient, SupportedMedia, UploadCoordinator, UploadOptions,
};
use std::collections::{BTreeSet, HashMap};
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Server call, as recorded by [`FakeServer`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Upload(String),
    Update(String),
    Copy(String, String),
    Delete(Vec<String>, bool),
    CreateAlbum(String, Vec<String>),
    AddToAlbum(String, Vec<String>),
    UpsertTags(Vec<String>),
    BulkTag(Vec<String>, Vec<String>),
    Stack(Vec<String>),
    Job(String, JobCommand),
}

#[derive(Default)]
struct FakeState {
    next_asset: u64,
    next_album: u64,
    next_tag: u64,
    assets: Vec<ServerAsset>,
    albums: Vec<(Album, Vec<String>)>,
    tags: HashMap<String, String>,
    jobs: Vec<ServerJob>,
    calls: Vec<Call>,
}

type UploadHook = Box<dyn Fn(usize) + Send + Sync>;

/// In-memory photo server assigning ids `srv-1`, `srv-2`, ...
///
/// An upload is a duplicate when an asset with the same name and size exists.
#[derive(Default)]
pub struct FakeServer {
    state: Mutex<FakeState>,
    uploads: AtomicUsize,
    failing_name: Option<(String, u16)>,
    failing_album: Option<String>,
    on_upload: Option<UploadHook>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Seed an asset; an empty id gets the next `srv-N`
    pub fn with_asset(self, mut sa: ServerAsset) -> Self {
        {
            let mut state = self.lock();
            state.next_asset += 1;
            if sa.id.is_empty() {
                sa.id = format!("srv-{}", state.next_asset);
            }
            state.assets.push(sa);
        }
        self
    }

    pub fn with_album(self, title: &str, members: &[&str]) -> Self {
        {
            let mut state = self.lock();
            state.next_album += 1;
            let album = Album {
                id: format!("album-{}", state.next_album),
                ..Album::new(title)
            };
            let ids = members.iter().map(|m| m.to_string()).collect();
            state.albums.push((album, ids));
        }
        self
    }

    pub fn with_jobs(self, jobs: Vec<ServerJob>) -> Self {
        self.lock().jobs = jobs;
        self
    }

    /// Reject uploads of names containing `fragment` with `status`
    pub fn failing_uploads(mut self, fragment: &str, status: u16) -> Self {
        self.failing_name = Some((fragment.to_string(), status));
        self
    }

    /// Answer 404 when the members of album `id` are requested
    pub fn failing_album_info(mut self, id: &str) -> Self {
        self.failing_album = Some(id.to_string());
        self
    }

    /// Call `hook` with the running upload count after each upload
    pub fn on_upload(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_upload = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn asset_ids(&self) -> Vec<String> {
        self.lock().assets.iter().map(|a| a.id.clone()).collect()
    }

    pub fn asset_names(&self) -> BTreeSet<String> {
        self.lock()
            .assets
            .iter()
            .map(|a| a.original_file_name.clone())
            .collect()
    }

    /// File names of an album's members
    pub fn album_member_names(&self, title: &str) -> BTreeSet<String> {
        let state = self.lock();
        let names: HashMap<&str, &str> = state
            .assets
            .iter()
            .map(|a| (a.id.as_str(), a.original_file_name.as_str()))
            .collect();
        state
            .albums
            .iter()
            .filter(|(album, _)| album.title == title)
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| names.get(id.as_str()).map(|n| n.to_string()))
            .collect()
    }

    /// Ids sent to album calls, in order
    pub fn album_call_ids(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateAlbum(_, ids) | Call::AddToAlbum(_, ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    /// (tag value, asset name) pairs sent to bulk-tag calls
    pub fn tagged_names(&self) -> BTreeSet<(String, String)> {
        let calls = self.calls();
        let state = self.lock();
        let values: HashMap<&str, &str> = state
            .tags
            .iter()
            .map(|(value, id)| (id.as_str(), value.as_str()))
            .collect();
        let mut pairs = BTreeSet::new();
        for call in calls {
            if let Call::BulkTag(tag_ids, asset_ids) = call {
                for tag_id in &tag_ids {
                    for asset_id in &asset_ids {
                        let name = state
                            .assets
                            .iter()
                            .find(|a| &a.id == asset_id)
                            .map(|a| a.original_file_name.clone())
                            .unwrap_or_default();
                        let value = values.get(tag_id.as_str()).copied().unwrap_or_default();
                        pairs.insert((value.to_string(), name));
                    }
                }
            }
        }
        pairs
    }

    /// Stacks as sets of member names
    pub fn stacks_by_name(&self) -> BTreeSet<Vec<String>> {
        let calls = self.calls();
        let state = self.lock();
        calls
            .into_iter()
            .filter_map(|c| match c {
                Call::Stack(ids) => Some(ids),
                _ => None,
            })
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.assets.iter().find(|a| &a.id == id))
                    .map(|a| a.original_file_name.clone())
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl ServerClient for FakeServer {
    async fn get_my_user(&self) -> Result<ServerUser> {
        Ok(ServerUser {
            id: "user-1".into(),
            email: "demo@example.com".into(),
            name: "Demo".into(),
        })
    }

    async fn get_asset_statistics(&self) -> Result<AssetStatistics> {
        let total = self.lock().assets.len() as u64;
        Ok(AssetStatistics {
            images: total,
            videos: 0,
            total,
        })
    }

    async fn get_all_assets(&self, _filter: &AssetFilter, callback: AssetCallback<'_>) -> Result<()> {
        let assets = self.lock().assets.clone();
        for sa in assets {
            callback(sa)?;
        }
        Ok(())
    }

    async fn get_asset_info(&self, id: &str) -> Result<ServerAsset> {
        self.lock()
            .assets
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| IngestError::Server {
                status: 404,
                message: format!("no asset {}", id),
            })
    }

    async fn upload_asset(&self, asset: &Asset) -> Result<UploadResponse> {
        if let Some((fragment, status)) = &self.failing_name {
            if asset.original_file_name.contains(fragment.as_str()) {
                return Err(IngestError::Server {
                    status: *status,
                    message: "rejected".into(),
                });
            }
        }

        let response = {
            let mut state = self.lock();
            state.calls.push(Call::Upload(asset.original_file_name.clone()));
            let existing = state
                .assets
                .iter()
                .find(|a| {
                    a.original_file_name == asset.original_file_name
                        && a.file_size == asset.file_size
                })
                .map(|a| a.id.clone());
            match existing {
                Some(id) => UploadResponse {
                    id,
                    status: UploadStatus::Duplicate,
                },
                None => {
                    state.next_asset += 1;
                    let id = format!("srv-{}", state.next_asset);
                    state.assets.push(ServerAsset {
                        id: id.clone(),
                        device_asset_id: asset.device_asset_id(),
                        original_file_name: asset.original_file_name.clone(),
                        capture_date: asset.capture_date,
                        file_size: asset.file_size,
                        ..Default::default()
                    });
                    UploadResponse {
                        id,
                        status: UploadStatus::Created,
                    }
                }
            }
        };

        let count = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.on_upload {
            hook(count);
        }
        Ok(response)
    }

    async fn update_asset(&self, id: &str, _patch: &AssetPatch) -> Result<()> {
        self.lock().calls.push(Call::Update(id.to_string()));
        Ok(())
    }

    async fn copy_asset(&self, from_id: &str, to_id: &str) -> Result<()> {
        self.lock()
            .calls
            .push(Call::Copy(from_id.to_string(), to_id.to_string()));
        Ok(())
    }

    async fn delete_assets(&self, ids: &[String], permanent: bool) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Delete(ids.to_vec(), permanent));
        state.assets.retain(|a| !ids.contains(&a.id));
        Ok(())
    }

    async fn get_all_albums(&self) -> Result<Vec<Album>> {
        Ok(self.lock().albums.iter().map(|(a, _)| a.clone()).collect())
    }

    async fn get_album_info(&self, id: &str) -> Result<AlbumInfo> {
        if self.failing_album.as_deref() == Some(id) {
            return Err(IngestError::Server {
                status: 404,
                message: format!("album {} unavailable", id),
            });
        }
        self.lock()
            .albums
            .iter()
            .find(|(a, _)| a.id == id)
            .map(|(album, ids)| AlbumInfo {
                album: album.clone(),
                member_ids: ids.clone(),
            })
            .ok_or_else(|| IngestError::Server {
                status: 404,
                message: format!("no album {}", id),
            })
    }

    async fn create_album(&self, title: &str, description: &str, asset_ids: &[String]) -> Result<Album> {
        let mut state = self.lock();
        state
            .calls
            .push(Call::CreateAlbum(title.to_string(), asset_ids.to_vec()));
        state.next_album += 1;
        let album = Album {
            id: format!("album-{}", state.next_album),
            description: description.to_string(),
            ..Album::new(title)
        };
        state.albums.push((album.clone(), asset_ids.to_vec()));
        Ok(album)
    }

    async fn add_assets_to_album(&self, album_id: &str, asset_ids: &[String]) -> Result<()> {
        let mut state = self.lock();
        state
            .calls
            .push(Call::AddToAlbum(album_id.to_string(), asset_ids.to_vec()));
        match state.albums.iter_mut().find(|(a, _)| a.id == album_id) {
            Some((_, ids)) => {
                ids.extend(asset_ids.iter().cloned());
                Ok(())
            }
            None => Err(IngestError::Server {
                status: 404,
                message: format!("no album {}", album_id),
            }),
        }
    }

    async fn upsert_tags(&self, values: &[String]) -> Result<Vec<Tag>> {
        let mut state = self.lock();
        state.calls.push(Call::UpsertTags(values.to_vec()));
        let mut tags = Vec::new();
        for value in values {
            let id = match state.tags.get(value) {
                Some(id) => id.clone(),
                None => {
                    state.next_tag += 1;
                    let id = format!("tag-{}", state.next_tag);
                    state.tags.insert(value.clone(), id.clone());
                    id
                }
            };
            tags.push(Tag {
                id,
                ..Tag::new(value.as_str())
            });
        }
        Ok(tags)
    }

    async fn bulk_tag_assets(&self, tag_ids: &[String], asset_ids: &[String]) -> Result<()> {
        self.lock()
            .calls
            .push(Call::BulkTag(tag_ids.to_vec(), asset_ids.to_vec()));
        Ok(())
    }

    async fn create_stack(&self, asset_ids: &[String]) -> Result<()> {
        self.lock().calls.push(Call::Stack(asset_ids.to_vec()));
        Ok(())
    }

    async fn get_jobs(&self) -> Result<Vec<ServerJob>> {
        Ok(self.lock().jobs.clone())
    }

    async fn send_job_command(&self, name: &str, command: JobCommand) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Job(name.to_string(), command));
        if let Some(job) = state.jobs.iter_mut().find(|j| j.name == name) {
            job.is_paused = command == JobCommand::Pause;
        }
        Ok(())
    }
}

/// Source replaying a fixed list of groups
pub struct MemorySource {
    groups: Mutex<Vec<Group>>,
}

impl MemorySource {
    pub fn new(groups: Vec<Group>) -> Arc<Self> {
        Arc::new(Self {
            groups: Mutex::new(groups),
        })
    }
}

impl AssetSource for MemorySource {
    fn browse(self: Arc<Self>, cancel: CancellationToken) -> GroupStream {
        let (tx, rx) = mpsc::channel(GROUP_BUFFER);
        let groups = std::mem::take(&mut *self.groups.lock().unwrap());
        tokio::spawn(async move {
            for group in groups {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(Ok(group)) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }
}

/// Source producing single-asset groups until cancelled
pub struct EndlessSource {
    album: Option<String>,
}

impl EndlessSource {
    pub fn new(album: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            album: album.map(str::to_string),
        })
    }
}

impl AssetSource for EndlessSource {
    fn browse(self: Arc<Self>, cancel: CancellationToken) -> GroupStream {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            let mut n = 0u64;
            loop {
                n += 1;
                let mut asset = asset(&format!("IMG_{:05}.jpg", n), 1000 + n as i64, None);
                if let Some(title) = &self.album {
                    asset.add_album(Album::new(title.as_str()));
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(Ok(Group::single(asset))) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }
}

/// Body counting its releases
#[derive(Debug, Clone, Default)]
pub struct TrackedBody {
    pub released: Arc<AtomicUsize>,
}

impl BodySource for TrackedBody {
    fn local_path(&self) -> Option<PathBuf> {
        None
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::Cursor::new(vec![0u8; 8])))
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn analyser() -> NameAnalyser {
    NameAnalyser::new(FilenameClock::new(Some(chrono_tz::UTC)), SupportedMedia::default())
}

/// In-memory asset with its name analysed
pub fn asset(name: &str, size: i64, captured: Option<DateTime<Utc>>) -> Asset {
    asset_with_body(name, size, captured, Arc::new(MemoryBody::new(vec![0u8; 16])))
}

pub fn asset_with_body(
    name: &str,
    size: i64,
    captured: Option<DateTime<Utc>>,
    body: Arc<dyn BodySource>,
) -> Asset {
    let mut asset = Asset::new(FileRef::new("memory", name), body, size);
    asset.name_info = analyser().analyse(name);
    asset.capture_date = captured;
    asset
}

pub fn july_7th() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 7, 13, 31, 46).unwrap()
}

/// Coordinator over `server` with a fresh recorder
pub fn coordinator(server: &Arc<FakeServer>, options: UploadOptions) -> Arc<UploadCoordinator> {
    let client: Arc<dyn ServerClient> = server.clone();
    Arc::new(UploadCoordinator::new(
        client,
        Arc::new(EventRecorder::default()),
        options,
    ))
}

pub fn options(concurrency: usize) -> UploadOptions {
    UploadOptions {
        concurrency,
        ..Default::default()
    }
}
