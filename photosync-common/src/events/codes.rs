//! Event code taxonomy
//!
//! Every decision taken while ingesting an asset is reported with exactly one
//! of these codes. Codes are grouped by the stage that emits them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the run that owns a code, used to lay out the final report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSection {
    /// File discovery and pre-filtering
    InputAnalysis,
    /// Upload decisions and server-side effects
    Uploading,
}

/// Fixed event taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCode {
    DiscoveredImage,
    DiscoveredVideo,
    DiscoveredSidecar,
    DiscoveredUnsupported,
    DiscoveredDiscarded,

    DiscardedLocalDuplicate,
    DiscardedServerDuplicate,
    DiscardedFiltered,
    DiscardedBanned,

    ProcessedAssociatedMetadata,
    ProcessedMissingMetadata,
    ProcessedUploaded,
    ProcessedUploadUpgraded,
    ProcessedMetadataUpdated,
    ProcessedAlbumAdded,
    ProcessedTagged,
    ProcessedStacked,

    ErrorServerError,
    ErrorUploadFailed,
    ErrorFileAccess,
    ErrorIncomplete,
}

impl EventCode {
    /// Number of codes, sizes the recorder's counter table
    pub const COUNT: usize = 21;

    /// All codes in report order
    pub const ALL: [EventCode; Self::COUNT] = [
        EventCode::DiscoveredImage,
        EventCode::DiscoveredVideo,
        EventCode::DiscoveredSidecar,
        EventCode::DiscoveredUnsupported,
        EventCode::DiscoveredDiscarded,
        EventCode::DiscardedLocalDuplicate,
        EventCode::DiscardedServerDuplicate,
        EventCode::DiscardedFiltered,
        EventCode::DiscardedBanned,
        EventCode::ProcessedAssociatedMetadata,
        EventCode::ProcessedMissingMetadata,
        EventCode::ProcessedUploaded,
        EventCode::ProcessedUploadUpgraded,
        EventCode::ProcessedMetadataUpdated,
        EventCode::ProcessedAlbumAdded,
        EventCode::ProcessedTagged,
        EventCode::ProcessedStacked,
        EventCode::ErrorServerError,
        EventCode::ErrorUploadFailed,
        EventCode::ErrorFileAccess,
        EventCode::ErrorIncomplete,
    ];

    /// Position of the code in [`EventCode::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human label used in logs and in the report
    pub fn label(self) -> &'static str {
        match self {
            EventCode::DiscoveredImage => "discovered image file",
            EventCode::DiscoveredVideo => "discovered video file",
            EventCode::DiscoveredSidecar => "discovered sidecar file",
            EventCode::DiscoveredUnsupported => "discovered unsupported file",
            EventCode::DiscoveredDiscarded => "discarded during discovery",
            EventCode::DiscardedLocalDuplicate => "local duplicate",
            EventCode::DiscardedServerDuplicate => "server has same asset",
            EventCode::DiscardedFiltered => "discarded by filter",
            EventCode::DiscardedBanned => "banned file",
            EventCode::ProcessedAssociatedMetadata => "associated metadata file",
            EventCode::ProcessedMissingMetadata => "missing metadata file",
            EventCode::ProcessedUploaded => "uploaded",
            EventCode::ProcessedUploadUpgraded => "server asset upgraded",
            EventCode::ProcessedMetadataUpdated => "metadata updated",
            EventCode::ProcessedAlbumAdded => "added to an album",
            EventCode::ProcessedTagged => "tagged",
            EventCode::ProcessedStacked => "stacked",
            EventCode::ErrorServerError => "server error",
            EventCode::ErrorUploadFailed => "upload failed",
            EventCode::ErrorFileAccess => "file access error",
            EventCode::ErrorIncomplete => "incomplete metadata",
        }
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            EventCode::ErrorServerError
                | EventCode::ErrorUploadFailed
                | EventCode::ErrorFileAccess
                | EventCode::ErrorIncomplete
        )
    }

    pub fn is_discard(self) -> bool {
        matches!(
            self,
            EventCode::DiscoveredDiscarded
                | EventCode::DiscardedLocalDuplicate
                | EventCode::DiscardedServerDuplicate
                | EventCode::DiscardedFiltered
                | EventCode::DiscardedBanned
        )
    }

    pub fn section(self) -> EventSection {
        match self {
            EventCode::DiscoveredImage
            | EventCode::DiscoveredVideo
            | EventCode::DiscoveredSidecar
            | EventCode::DiscoveredUnsupported
            | EventCode::DiscoveredDiscarded
            | EventCode::DiscardedBanned
            | EventCode::ProcessedAssociatedMetadata
            | EventCode::ProcessedMissingMetadata
            | EventCode::ErrorFileAccess
            | EventCode::ErrorIncomplete => EventSection::InputAnalysis,
            _ => EventSection::Uploading,
        }
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_in_declaration_order() {
        for (i, code) in EventCode::ALL.iter().enumerate() {
            assert_eq!(code.index(), i, "{:?} out of order", code);
        }
    }

    #[test]
    fn test_error_codes() {
        let errors: Vec<_> = EventCode::ALL.iter().filter(|c| c.is_error()).collect();
        assert_eq!(errors.len(), 4);
        assert!(!EventCode::ProcessedUploaded.is_error());
    }

    #[test]
    fn test_serializes_snake_case() {
        let json = serde_json::to_string(&EventCode::DiscardedServerDuplicate).unwrap();
        assert_eq!(json, "\"discarded_server_duplicate\"");
    }
}
