//! Facts derived from a file name alone

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media type implied by the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Sidecar,
    /// Unknown extension or a file with no value for the server
    #[default]
    Other,
}

/// Series a file belongs to, as announced by its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SeriesKind {
    #[default]
    None,
    Burst,
    Edited,
    Portrait,
    Night,
    Motion,
    LongExposure,
}

/// Structured view of a base name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NameInfo {
    /// Base name as analysed
    pub base: String,
    /// Stem shared by every member of a series
    pub radical: String,
    /// Lowercase extension, dot included (empty when the name has none)
    pub ext: String,
    pub media: MediaKind,
    pub kind: SeriesKind,
    /// Position in the series, 0 when unknown
    pub index: u32,
    /// Capture time announced by the name
    pub taken: Option<DateTime<Utc>>,
    pub is_cover: bool,
    /// Edited variant of another file (`-edited`, `-modified` suffixes)
    pub is_modified: bool,
}
