//! Supported media table
//!
//! Maps lowercase extensions (dot included) to the class of file they hold.

use crate::models::MediaKind;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// What an extension holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaClass {
    Image,
    Video,
    Sidecar,
    /// Known, but of no value for the server
    Useless,
}

const VIDEOS: &[&str] = &[
    ".3gp", ".avi", ".flv", ".insv", ".m2ts", ".m4v", ".mkv", ".mov", ".mp4", ".mpg", ".mts",
    ".webm", ".wmv",
];

const IMAGES: &[&str] = &[
    ".3fr", ".ari", ".arw", ".avif", ".bmp", ".cap", ".cin", ".cr2", ".cr3", ".crw", ".dcr",
    ".dng", ".erf", ".fff", ".gif", ".heic", ".heif", ".hif", ".iiq", ".insp", ".jpe", ".jpeg",
    ".jpg", ".jxl", ".k25", ".kdc", ".mrw", ".nef", ".orf", ".ori", ".pef", ".png", ".psd",
    ".raf", ".raw", ".rw2", ".rwl", ".sr2", ".srf", ".srw", ".tif", ".tiff", ".webp", ".x3f",
];

const RAWS: &[&str] = &[
    ".3fr", ".ari", ".arw", ".cap", ".cin", ".cr2", ".cr3", ".crw", ".dcr", ".dng", ".erf",
    ".fff", ".iiq", ".k25", ".kdc", ".mrw", ".nef", ".nrw", ".orf", ".ori", ".pef", ".psd",
    ".raf", ".raw", ".rw2", ".rwl", ".sr2", ".srf", ".srw", ".x3f",
];

static RAW_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| RAWS.iter().copied().collect());

/// Extension → media class table
#[derive(Debug, Clone)]
pub struct SupportedMedia {
    table: HashMap<String, MediaClass>,
}

impl Default for SupportedMedia {
    fn default() -> Self {
        let mut table = HashMap::new();
        for ext in VIDEOS {
            table.insert(ext.to_string(), MediaClass::Video);
        }
        for ext in IMAGES {
            table.insert(ext.to_string(), MediaClass::Image);
        }
        table.insert(".xmp".to_string(), MediaClass::Sidecar);
        table.insert(".json".to_string(), MediaClass::Sidecar);
        table.insert(".mp".to_string(), MediaClass::Useless);
        Self { table }
    }
}

impl SupportedMedia {
    /// Class of an extension, `None` when unknown
    pub fn class_of(&self, ext: &str) -> Option<MediaClass> {
        let mut ext = ext.to_lowercase();
        if ext.starts_with(".mp~") {
            ext = ".mp".to_string();
        }
        self.table.get(&ext).copied()
    }

    /// Media kind carried in `NameInfo`
    pub fn kind_of(&self, ext: &str) -> MediaKind {
        match self.class_of(ext) {
            Some(MediaClass::Image) => MediaKind::Image,
            Some(MediaClass::Video) => MediaKind::Video,
            Some(MediaClass::Sidecar) => MediaKind::Sidecar,
            Some(MediaClass::Useless) | None => MediaKind::Other,
        }
    }

    pub fn is_media(&self, ext: &str) -> bool {
        matches!(
            self.class_of(ext),
            Some(MediaClass::Image) | Some(MediaClass::Video)
        )
    }

    /// Known file of no value (`.mp` parts, `MVIMG` movie parts)
    pub fn is_useless(&self, name: &str) -> bool {
        let ext = extension(name);
        let class = self.class_of(&ext);
        if class == Some(MediaClass::Useless) {
            return true;
        }
        (ext.is_empty() || class == Some(MediaClass::Video))
            && name.to_uppercase().starts_with("MVIMG")
    }
}

/// Whether the extension denotes a RAW image
pub fn is_raw(ext: &str) -> bool {
    RAW_SET.contains(ext.to_lowercase().as_str())
}

pub fn is_jpeg(ext: &str) -> bool {
    matches!(ext.to_lowercase().as_str(), ".jpg" | ".jpeg" | ".jpe")
}

pub fn is_heic(ext: &str) -> bool {
    matches!(ext.to_lowercase().as_str(), ".heic" | ".heif" | ".hif")
}

/// Lowercase extension of a name, dot included, empty when missing
pub fn extension(name: &str) -> String {
    let base = crate::models::base_name(name);
    match base.rfind('.') {
        Some(i) if i > 0 => base[i..].to_lowercase(),
        _ => String::new(),
    }
}
