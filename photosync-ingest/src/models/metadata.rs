//! Metadata records, albums and tags

use chrono::{DateTime, Utc};
use photosync_common::FileRef;
use serde::{Deserialize, Serialize};

/// Album, identified by its title until the server assigns an id
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Album {
    /// Server id, empty until the album is first saved
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Album {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Hierarchical tag. `value` is the full slash-delimited path, `name` its leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tag {
    #[serde(default)]
    pub id: String,
    pub value: String,
    pub name: String,
}

impl Tag {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into().trim_matches('/').to_string();
        let name = value.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            id: String::new(),
            value,
            name,
        }
    }
}

/// Metadata layer read from a sidecar, a takeout record, the file itself or the server
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// File the record was read from
    pub file: Option<FileRef>,
    /// Original file name announced by the record
    pub file_name: String,
    pub date_taken: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: String,
    /// 0 to 5
    pub rating: u8,
    pub albums: Vec<Album>,
    pub tags: Vec<Tag>,
    pub trashed: bool,
    pub archived: bool,
    pub favorited: bool,
    pub from_partner: bool,
    pub from_shared_album: bool,
}

impl Metadata {
    /// Whether the record carries anything worth merging
    pub fn is_set(&self) -> bool {
        self.date_taken.is_some()
            || self.latitude.is_some()
            || self.longitude.is_some()
            || !self.description.is_empty()
            || self.rating > 0
            || !self.albums.is_empty()
            || !self.tags.is_empty()
            || self.trashed
            || self.archived
            || self.favorited
            || self.from_partner
    }

    /// Add a tag by value, skipping values already present
    pub fn add_tag(&mut self, value: &str) {
        let tag = Tag::new(value);
        if tag.value.is_empty() || self.tags.iter().any(|t| t.value == tag.value) {
            return;
        }
        self.tags.push(tag);
    }

    /// Add an album by title, skipping titles already present
    pub fn add_album(&mut self, album: Album) {
        if album.title.is_empty() || self.albums.iter().any(|a| a.title == album.title) {
            return;
        }
        self.albums.push(album);
    }
}
