//! Photo-server records

use crate::models::Album;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Asset as known by the server
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAsset {
    pub id: String,
    #[serde(default)]
    pub device_asset_id: String,
    #[serde(default)]
    pub original_file_name: String,
    #[serde(default, rename = "fileCreatedAt")]
    pub capture_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_size: i64,
    #[serde(default)]
    pub checksum: String,
    #[serde(default, rename = "isTrashed")]
    pub trashed: bool,
    #[serde(default, rename = "isArchived")]
    pub archived: bool,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub library_id: Option<String>,
    /// Albums the asset belongs to, filled from album member lists
    #[serde(skip)]
    pub albums: Vec<Album>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AssetStatistics {
    #[serde(default)]
    pub images: u64,
    #[serde(default)]
    pub videos: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Created,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    pub status: UploadStatus,
}

/// Partial update of a server asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time_original: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

impl AssetPatch {
    pub fn is_empty(&self) -> bool {
        *self == AssetPatch::default()
    }
}

/// Album with its member ids
#[derive(Debug, Clone, Default)]
pub struct AlbumInfo {
    pub album: Album,
    pub member_ids: Vec<String>,
}

/// Server background job state
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerJob {
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobCommand {
    Pause,
    Resume,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Restriction applied when listing server assets
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taken_before: Option<DateTime<Utc>>,
}
