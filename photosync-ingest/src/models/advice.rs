//! Upload decisions

use crate::models::ServerAsset;
use photosync_common::human_size::format_bytes;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceCode {
    NotOnServer,
    SameOnServer,
    /// The server copy is smaller, replace it
    SmallerOnServer,
    /// The server copy is larger, keep it
    BetterOnServer,
    /// The same file was already handled during this run
    AlreadyProcessed,
    ForceUpload,
}

impl fmt::Display for AdviceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Decision returned by `ServerIndex::should_upload`
#[derive(Debug, Clone)]
pub struct Advice {
    pub code: AdviceCode,
    /// Matching server asset, if any
    pub server_asset: Option<ServerAsset>,
    pub message: String,
}

fn server_date(sa: &ServerAsset) -> String {
    sa.capture_date
        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

impl Advice {
    pub fn not_on_server() -> Self {
        Self {
            code: AdviceCode::NotOnServer,
            server_asset: None,
            message: "This a new asset, upload it.".to_string(),
        }
    }

    pub fn same_on_server(sa: &ServerAsset) -> Self {
        Self {
            code: AdviceCode::SameOnServer,
            message: format!(
                "An asset with the same name:{:?}, date:{:?} and size:{} exists on the server. No need to upload.",
                sa.original_file_name,
                server_date(sa),
                format_bytes(sa.file_size)
            ),
            server_asset: Some(sa.clone()),
        }
    }

    pub fn smaller_on_server(sa: &ServerAsset) -> Self {
        Self {
            code: AdviceCode::SmallerOnServer,
            message: format!(
                "An asset with the same name:{:?} and date:{:?} but with smaller size:{} exists on the server. Replace it.",
                sa.original_file_name,
                server_date(sa),
                format_bytes(sa.file_size)
            ),
            server_asset: Some(sa.clone()),
        }
    }

    pub fn better_on_server(sa: &ServerAsset) -> Self {
        Self {
            code: AdviceCode::BetterOnServer,
            message: format!(
                "An asset with the same name:{:?} and date:{:?} but with bigger size:{} exists on the server. No need to upload.",
                sa.original_file_name,
                server_date(sa),
                format_bytes(sa.file_size)
            ),
            server_asset: Some(sa.clone()),
        }
    }

    pub fn already_processed(sa: Option<&ServerAsset>) -> Self {
        Self {
            code: AdviceCode::AlreadyProcessed,
            server_asset: sa.cloned(),
            message: "The file was already processed during this run.".to_string(),
        }
    }

    /// Force an upload, keeping the matching server asset so it gets replaced
    pub fn force_upload(sa: Option<ServerAsset>) -> Self {
        Self {
            code: AdviceCode::ForceUpload,
            server_asset: sa,
            message: "Upload forced by the overwrite option.".to_string(),
        }
    }
}
