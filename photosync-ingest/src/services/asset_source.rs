//! Asset sources
//!
//! A source discovers assets, groups them and streams the groups. Each
//! item of the stream is either a group or a fatal source error; per-file
//! problems are recorded by the source itself and never reach the stream.

use crate::error::IngestError;
use crate::models::Group;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Items produced by a source
pub type GroupStream = mpsc::Receiver<Result<Group, IngestError>>;

/// Channel capacity for group streams
pub const GROUP_BUFFER: usize = 64;

/// Producer of asset groups
pub trait AssetSource: Send + Sync + 'static {
    /// Start discovery in the background and return the group stream
    ///
    /// The stream ends when discovery is complete or the token is cancelled.
    /// It is finite and can be consumed once.
    fn browse(self: Arc<Self>, cancel: CancellationToken) -> GroupStream;
}
