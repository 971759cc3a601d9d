//! Asset model and lazy file access
//!
//! An asset's bytes are reached through a [`BodySource`]. The first call to
//! [`Asset::cache_path`] or [`Asset::open`] resolves a [`CacheReader`]: local
//! files are used in place, anything else is copied into a temporary file
//! that lives until [`Asset::close`].

use crate::error::{IngestError, Result};
use crate::models::{Album, Metadata, NameInfo, Tag};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use photosync_common::FileRef;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempPath;

/// Where an asset's bytes come from
pub trait BodySource: Send + Sync + fmt::Debug {
    /// Path on the local filesystem, when the bytes already live there
    fn local_path(&self) -> Option<PathBuf>;

    /// Open a reader over the bytes
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;

    /// Called once when the asset is closed
    fn release(&self) {}
}

/// Body backed by a file on disk
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BodySource for LocalFile {
    fn local_path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// Body held in memory (archives entries, generated content)
#[derive(Debug, Clone)]
pub struct MemoryBody {
    bytes: Arc<Vec<u8>>,
}

impl MemoryBody {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(bytes),
        }
    }
}

impl BodySource for MemoryBody {
    fn local_path(&self) -> Option<PathBuf> {
        None
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(io::Cursor::new(self.bytes.as_ref().clone())))
    }
}

/// Positionable access to an asset's bytes
#[derive(Debug)]
pub struct CacheReader {
    path: PathBuf,
    /// Temporary copy, removed on drop
    temp: Option<TempPath>,
}

impl CacheReader {
    fn materialise(body: &dyn BodySource) -> io::Result<Self> {
        if let Some(path) = body.local_path() {
            return Ok(Self { path, temp: None });
        }

        let mut temp = tempfile::Builder::new().prefix("photosync-").tempfile()?;
        let mut reader = body.open()?;
        io::copy(&mut reader, temp.as_file_mut())?;
        let temp = temp.into_temp_path();
        Ok(Self {
            path: temp.to_path_buf(),
            temp: Some(temp),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the bytes were copied into a temporary file
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

/// A media file with its derived and merged metadata
pub struct Asset {
    /// Server id, empty until uploaded or matched
    pub id: String,
    pub file: FileRef,
    pub body: Arc<dyn BodySource>,
    pub file_size: i64,
    /// Modification time of the file
    pub file_date: Option<DateTime<Utc>>,
    pub checksum: Option<String>,
    pub original_file_name: String,
    pub capture_date: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: String,
    pub rating: u8,
    pub trashed: bool,
    pub archived: bool,
    pub favorite: bool,
    pub from_partner: bool,
    pub albums: Vec<Album>,
    pub tags: Vec<Tag>,
    pub name_info: NameInfo,
    pub from_sidecar: Option<Metadata>,
    pub from_source_file: Option<Metadata>,
    pub from_application: Option<Metadata>,
    cache: OnceCell<CacheReader>,
    closed: bool,
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("file_size", &self.file_size)
            .field("capture_date", &self.capture_date)
            .field("radical", &self.name_info.radical)
            .finish()
    }
}

impl Asset {
    /// Create an asset for a file
    ///
    /// # Arguments
    /// * `file` - Filesystem and logical name
    /// * `body` - Access to the bytes
    /// * `file_size` - Size in bytes
    pub fn new(file: FileRef, body: Arc<dyn BodySource>, file_size: i64) -> Self {
        let original_file_name = base_name(&file.name).to_string();
        Self {
            id: String::new(),
            file,
            body,
            file_size,
            file_date: None,
            checksum: None,
            original_file_name,
            capture_date: None,
            latitude: None,
            longitude: None,
            description: String::new(),
            rating: 0,
            trashed: false,
            archived: false,
            favorite: false,
            from_partner: false,
            albums: Vec::new(),
            tags: Vec::new(),
            name_info: NameInfo::default(),
            from_sidecar: None,
            from_source_file: None,
            from_application: None,
            cache: OnceCell::new(),
            closed: false,
        }
    }

    /// `basename-size`, the fast-path duplicate key
    pub fn device_asset_id(&self) -> String {
        device_asset_id(&self.original_file_name, self.file_size)
    }

    /// Capture date, falling back to the file date
    pub fn date_for_comparison(&self) -> Option<DateTime<Utc>> {
        self.capture_date.or(self.file_date)
    }

    /// Merge one metadata layer into the asset
    ///
    /// Non-zero fields are copied, albums and tags are merged by union and
    /// the flags are overwritten.
    pub fn use_metadata(&mut self, md: &Metadata) {
        if md.date_taken.is_some() {
            self.capture_date = md.date_taken;
        }
        if md.latitude.is_some() {
            self.latitude = md.latitude;
        }
        if md.longitude.is_some() {
            self.longitude = md.longitude;
        }
        if !md.description.is_empty() {
            self.description = md.description.clone();
        }
        if md.rating > 0 {
            self.rating = md.rating.min(5);
        }
        for album in &md.albums {
            self.add_album(album.clone());
        }
        for tag in &md.tags {
            self.add_tag(&tag.value);
        }
        self.trashed = md.trashed;
        self.archived = md.archived;
        self.favorite = md.favorited;
        self.from_partner = md.from_partner;
    }

    /// Apply every metadata layer, lowest precedence first
    pub fn merge_layers(&mut self) {
        if self.capture_date.is_none() {
            self.capture_date = self.name_info.taken;
        }
        let layers = [
            self.from_source_file.take(),
            self.from_sidecar.take(),
            self.from_application.take(),
        ];
        for md in layers.iter().flatten() {
            self.use_metadata(md);
        }
        let [source_file, sidecar, application] = layers;
        self.from_source_file = source_file;
        self.from_sidecar = sidecar;
        self.from_application = application;
    }

    pub fn add_album(&mut self, album: Album) {
        if album.title.is_empty() || self.albums.iter().any(|a| a.title == album.title) {
            return;
        }
        self.albums.push(album);
    }

    pub fn add_tag(&mut self, value: &str) {
        let tag = Tag::new(value);
        if tag.value.is_empty() || self.tags.iter().any(|t| t.value == tag.value) {
            return;
        }
        self.tags.push(tag);
    }

    /// Path to the asset's bytes, materialising a temporary copy on first call
    pub fn cache_path(&self) -> Result<PathBuf> {
        if self.closed {
            return Err(IngestError::Invariant(format!(
                "asset {} used after close",
                self.file
            )));
        }
        let reader = self
            .cache
            .get_or_try_init(|| CacheReader::materialise(self.body.as_ref()))
            .map_err(|e| IngestError::FileAccess {
                file: self.file.to_string(),
                message: e.to_string(),
            })?;
        Ok(reader.path().to_path_buf())
    }

    /// Open a positionable read handle
    pub fn open(&self) -> Result<File> {
        let path = self.cache_path()?;
        File::open(&path).map_err(|e| IngestError::FileAccess {
            file: self.file.to_string(),
            message: e.to_string(),
        })
    }

    /// Release the cached copy and the underlying source. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        drop(self.cache.take());
        self.body.release();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Device asset id for a name and size
pub fn device_asset_id(name: &str, size: i64) -> String {
    format!("{}-{}", base_name(name), size)
}

/// Last path component of a slash-delimited name
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}
