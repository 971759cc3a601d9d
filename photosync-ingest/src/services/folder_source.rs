//! Local folder source
//!
//! Walks one or more roots, classifies every file, attaches XMP and JSON
//! sidecars, and runs each directory through the grouper pipeline.

use crate::error::{IngestError, Result};
use crate::models::{Album, Asset, Group, LocalFile};
use crate::services::asset_source::{AssetSource, GroupStream, GROUP_BUFFER};
use crate::services::banned_names::BannedNames;
use crate::services::group_filters::{FileTypeInclusion, REASON_BANNED, REASON_EXTENSION};
use crate::services::grouper::{GrouperPipeline, STAGE_BUFFER};
use crate::services::media_types::{extension, MediaClass};
use crate::services::name_analyser::NameAnalyser;
use crate::services::sidecar_reader::{read_sidecar_file, SidecarRecord};
use chrono::{DateTime, Utc};
use photosync_common::{EventCode, EventRecorder, FileRef};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// How folder names become albums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FolderAlbum {
    #[default]
    None,
    /// Name of the containing folder
    Folder,
    /// Path of the containing folder relative to the root
    Path,
}

impl FromStr for FolderAlbum {
    type Err = photosync_common::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "" | "NONE" => Ok(FolderAlbum::None),
            "FOLDER" => Ok(FolderAlbum::Folder),
            "PATH" => Ok(FolderAlbum::Path),
            _ => Err(photosync_common::Error::InvalidInput(format!(
                "invalid folder-as-album value {:?}",
                s
            ))),
        }
    }
}

/// Folder source settings
#[derive(Debug, Clone)]
pub struct FolderOptions {
    pub roots: Vec<PathBuf>,
    pub recursive: bool,
    pub banned: BannedNames,
    pub file_types: FileTypeInclusion,
    /// Tags added to every asset
    pub tags: Vec<String>,
    /// Add the relative folder path as a tag
    pub folder_as_tags: bool,
    pub folder_as_album: FolderAlbum,
    /// Album receiving every asset
    pub into_album: Option<String>,
    pub epson_fastfoto: bool,
}

impl Default for FolderOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            recursive: true,
            banned: BannedNames::defaults(),
            file_types: FileTypeInclusion::default(),
            tags: Vec::new(),
            folder_as_tags: false,
            folder_as_album: FolderAlbum::None,
            into_album: None,
            epson_fastfoto: false,
        }
    }
}

/// Files of one directory, relative names and absolute paths
type DirectoryListing = BTreeMap<PathBuf, Vec<PathBuf>>;

/// Source reading local folders
pub struct FolderSource {
    options: FolderOptions,
    analyser: NameAnalyser,
    recorder: Arc<EventRecorder>,
}

impl FolderSource {
    pub fn new(options: FolderOptions, analyser: NameAnalyser, recorder: Arc<EventRecorder>) -> Self {
        Self {
            options,
            analyser,
            recorder,
        }
    }

    async fn walk(&self, cancel: &CancellationToken, tx: &mpsc::Sender<Result<Group>>) -> Result<()> {
        for root in &self.options.roots {
            if !root.is_dir() {
                return Err(IngestError::Source(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }
            info!(root = %root.display(), "Scanning folder");

            let listing = {
                let root = root.clone();
                let recursive = self.options.recursive;
                let recorder = self.recorder.clone();
                tokio::task::spawn_blocking(move || list_directories(&root, recursive, &recorder))
                    .await
                    .map_err(|e| IngestError::Source(format!("scan task failed: {}", e)))?
            };

            for (dir, files) in listing {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                if !self.process_directory(cancel, root, &dir, files, tx).await {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Discover, enrich and group the files of one directory
    ///
    /// # Returns
    /// `false` when the consumer is gone and the walk should stop
    async fn process_directory(
        &self,
        cancel: &CancellationToken,
        root: &Path,
        dir: &Path,
        files: Vec<PathBuf>,
        tx: &mpsc::Sender<Result<Group>>,
    ) -> bool {
        let fs_name = root.display().to_string();
        let media = self.analyser.media();
        let mut sidecars: HashMap<String, PathBuf> = HashMap::new();
        let mut assets: Vec<Asset> = Vec::new();

        for path in files {
            let name = relative_name(root, &path);
            let file = FileRef::new(fs_name.clone(), name.clone());
            let base = crate::models::base_name(&name).to_string();
            let ext = extension(&base);

            if self.options.banned.is_match(&name) {
                self.recorder
                    .record(EventCode::DiscoveredDiscarded, Some(&file), &[("reason", REASON_BANNED)]);
                continue;
            }
            if media.is_useless(&base) {
                self.recorder
                    .record(EventCode::DiscoveredDiscarded, Some(&file), &[("reason", "useless file")]);
                continue;
            }
            match media.class_of(&ext) {
                None | Some(MediaClass::Useless) => {
                    self.recorder.record(EventCode::DiscoveredUnsupported, Some(&file), &[]);
                }
                Some(MediaClass::Sidecar) => {
                    self.recorder.record(EventCode::DiscoveredSidecar, Some(&file), &[]);
                    sidecars.insert(base.to_lowercase(), path);
                }
                Some(class) => {
                    if !self.options.file_types.allows(&ext) {
                        self.recorder.record(
                            EventCode::DiscoveredDiscarded,
                            Some(&file),
                            &[("reason", REASON_EXTENSION)],
                        );
                        continue;
                    }
                    let code = if class == MediaClass::Video {
                        EventCode::DiscoveredVideo
                    } else {
                        EventCode::DiscoveredImage
                    };
                    match std::fs::metadata(&path) {
                        Ok(meta) => {
                            self.recorder.record(code, Some(&file), &[]);
                            let mut asset =
                                Asset::new(file, Arc::new(LocalFile::new(&path)), meta.len() as i64);
                            asset.file_date = meta.modified().ok().map(DateTime::<Utc>::from);
                            asset.name_info = self.analyser.analyse(&name);
                            assets.push(asset);
                        }
                        Err(e) => {
                            self.recorder.record(
                                EventCode::ErrorFileAccess,
                                Some(&file),
                                &[("error", &e.to_string())],
                            );
                        }
                    }
                }
            }
        }

        let rel_dir = relative_name(root, dir);
        for asset in &mut assets {
            self.attach_sidecar(asset, &sidecars);
            asset.merge_layers();
            if asset.capture_date.is_none() {
                self.recorder
                    .record(EventCode::ProcessedMissingMetadata, Some(&asset.file), &[("reason", "no capture date")]);
            }
            self.apply_folder_options(asset, &rel_dir);
        }

        assets.sort_by(|a, b| {
            a.name_info
                .radical
                .cmp(&b.name_info.radical)
                .then(a.capture_date.cmp(&b.capture_date))
                .then(a.original_file_name.cmp(&b.original_file_name))
        });
        debug!(dir = %rel_dir, count = assets.len(), "Directory scanned");

        let (assets_tx, assets_rx) = mpsc::channel(STAGE_BUFFER);
        let mut groups = GrouperPipeline::standard(self.options.epson_fastfoto).run(cancel.clone(), assets_rx);
        tokio::spawn(async move {
            for asset in assets {
                if assets_tx.send(asset).await.is_err() {
                    break;
                }
            }
        });

        while let Some(group) = groups.recv().await {
            if tx.send(Ok(group)).await.is_err() {
                return false;
            }
        }
        true
    }

    fn attach_sidecar(&self, asset: &mut Asset, sidecars: &HashMap<String, PathBuf>) {
        let base = asset.original_file_name.to_lowercase();
        let stem = match base.rfind('.') {
            Some(i) if i > 0 => base[..i].to_string(),
            _ => base.clone(),
        };
        let candidates = [
            format!("{}.xmp", base),
            format!("{}.xmp", stem),
            format!("{}.json", base),
        ];
        let Some(path) = candidates.iter().find_map(|c| sidecars.get(c)) else {
            return;
        };

        let sidecar_file = FileRef::new(asset.file.fs.clone(), path.display().to_string());
        match read_sidecar_file(path, &sidecar_file) {
            Ok(SidecarRecord::Asset(md)) => {
                self.recorder.record(
                    EventCode::ProcessedAssociatedMetadata,
                    Some(&asset.file),
                    &[("sidecar", &sidecar_file.name)],
                );
                asset.from_sidecar = Some(md);
            }
            Ok(SidecarRecord::Album(_)) => {}
            Err(e) => {
                warn!(file = %asset.file, error = %e, "Sidecar ignored");
                self.recorder.record(
                    EventCode::ErrorIncomplete,
                    Some(&asset.file),
                    &[("error", &e.to_string())],
                );
            }
        }
    }

    fn apply_folder_options(&self, asset: &mut Asset, rel_dir: &str) {
        for tag in &self.options.tags {
            asset.add_tag(tag);
        }
        if self.options.folder_as_tags && !rel_dir.is_empty() {
            asset.add_tag(rel_dir);
        }
        if let Some(album) = &self.options.into_album {
            asset.add_album(Album::new(album.clone()));
        }
        match self.options.folder_as_album {
            FolderAlbum::None => {}
            FolderAlbum::Folder => {
                if let Some(folder) = rel_dir.rsplit('/').next().filter(|f| !f.is_empty()) {
                    asset.add_album(Album::new(folder));
                }
            }
            FolderAlbum::Path => {
                if !rel_dir.is_empty() {
                    asset.add_album(Album::new(rel_dir));
                }
            }
        }
    }
}

impl AssetSource for FolderSource {
    fn browse(self: Arc<Self>, cancel: CancellationToken) -> GroupStream {
        let (tx, rx) = mpsc::channel(GROUP_BUFFER);
        tokio::spawn(async move {
            if let Err(e) = self.walk(&cancel, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        rx
    }
}

/// Slash-delimited path relative to the root
fn relative_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Group the files under `root` by containing directory
fn list_directories(root: &Path, recursive: bool, recorder: &EventRecorder) -> DirectoryListing {
    let mut listing = DirectoryListing::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    for entry in walker {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    continue;
                }
                let dir = entry
                    .path()
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                listing.entry(dir).or_default().push(entry.into_path());
            }
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| relative_name(root, p))
                    .unwrap_or_default();
                warn!(path = %path, error = %e, "Error accessing entry");
                recorder.record(
                    EventCode::ErrorFileAccess,
                    Some(&FileRef::new(root.display().to_string(), path)),
                    &[("error", &e.to_string())],
                );
            }
        }
    }
    listing
}
