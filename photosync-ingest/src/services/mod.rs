//! Ingestion services
//!
//! From the bottom up: name analysis and media classification, sidecar
//! reading, grouping and group filters, asset sources, the server client
//! layers, and the upload coordinator driving a run.

pub mod asset_source;
pub mod banned_names;
pub mod bulk_tagger;
pub mod collection_cache;
pub mod date_range;
pub mod filename_clock;
pub mod folder_source;
pub mod group_filters;
pub mod grouper;
pub mod http_client;
pub mod media_types;
pub mod name_analyser;
pub mod retrying_client;
pub mod server_client;
pub mod server_index;
pub mod sidecar_reader;
pub mod upload_coordinator;

pub use asset_source::{AssetSource, GroupStream};
pub use bulk_tagger::BulkTagger;
pub use collection_cache::CollectionCache;
pub use filename_clock::FilenameClock;
pub use folder_source::{FolderOptions, FolderSource};
pub use group_filters::GroupFilters;
pub use grouper::GrouperPipeline;
pub use http_client::HttpServerClient;
pub use media_types::SupportedMedia;
pub use name_analyser::NameAnalyser;
pub use retrying_client::RetryingClient;
pub use server_client::{DryRunClient, ServerClient};
pub use server_index::ServerIndex;
pub use upload_coordinator::{ErrorTolerance, UploadCoordinator, UploadOptions};
