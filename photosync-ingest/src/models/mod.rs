//! Data models for the ingestion pipeline

pub mod advice;
pub mod asset;
pub mod group;
pub mod metadata;
pub mod name_info;
pub mod server;

pub use advice::{Advice, AdviceCode};
pub use asset::{base_name, device_asset_id, Asset, BodySource, CacheReader, LocalFile, MemoryBody};
pub use group::{Group, Grouping, RemovedAsset};
pub use metadata::{Album, Metadata, Tag};
pub use name_info::{MediaKind, NameInfo, SeriesKind};
pub use server::{
    AlbumInfo, AssetFilter, AssetPatch, AssetStatistics, JobCommand, ServerAsset, ServerJob,
    ServerUser, UploadResponse, UploadStatus,
};
