//! Asset grouping
//!
//! A grouper turns a stream of assets, sorted by radical, into groups of
//! related assets. Assets it cannot group leave through `out_assets` so
//! the next stage gets a chance; whatever survives the last stage becomes a
//! singleton group.
//!
//! ```text
//! assets ─▶ [EpsonFastFoto] ─▶ [Series] ─▶ singletons
//!                 │                │            │
//!                 └────────────────┴────────────┴──▶ groups
//! ```

mod epson;
mod series;

pub use epson::EpsonFastFotoGrouper;
pub use series::SeriesGrouper;

use crate::models::{Asset, Group};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Channel capacity between stages
pub const STAGE_BUFFER: usize = 100;

/// One grouping stage
#[async_trait]
pub trait Grouper: Send {
    /// Consume `input` until it closes or the token is cancelled
    ///
    /// On cancellation the in-flight group is flushed without waiting.
    async fn group(
        &mut self,
        cancel: CancellationToken,
        input: mpsc::Receiver<Asset>,
        out_assets: mpsc::Sender<Asset>,
        out_groups: mpsc::Sender<Group>,
    );
}

/// Chain of grouping stages
pub struct GrouperPipeline {
    stages: Vec<Box<dyn Grouper>>,
}

impl GrouperPipeline {
    pub fn new(stages: Vec<Box<dyn Grouper>>) -> Self {
        Self { stages }
    }

    /// Series grouping, preceded by Epson FastFoto grouping when enabled
    pub fn standard(epson_fastfoto: bool) -> Self {
        let mut stages: Vec<Box<dyn Grouper>> = Vec::new();
        if epson_fastfoto {
            stages.push(Box::new(EpsonFastFotoGrouper::default()));
        }
        stages.push(Box::new(SeriesGrouper::default()));
        Self::new(stages)
    }

    /// Spawn the stages and return the group stream
    pub fn run(self, cancel: CancellationToken, input: mpsc::Receiver<Asset>) -> mpsc::Receiver<Group> {
        let (groups_tx, groups_rx) = mpsc::channel(STAGE_BUFFER);
        let mut input = input;

        for mut stage in self.stages {
            let (assets_tx, assets_rx) = mpsc::channel(STAGE_BUFFER);
            let cancel = cancel.clone();
            let groups_tx = groups_tx.clone();
            tokio::spawn(async move {
                stage.group(cancel, input, assets_tx, groups_tx).await;
            });
            input = assets_rx;
        }

        tokio::spawn(async move {
            while let Some(asset) = input.recv().await {
                debug!(file = %asset.file, "Single asset");
                if groups_tx.send(Group::single(asset)).await.is_err() {
                    break;
                }
            }
        });

        groups_rx
    }
}

/// Receive the next asset, `None` when the input closed or the run was cancelled
pub(crate) async fn next_asset(
    cancel: &CancellationToken,
    input: &mut mpsc::Receiver<Asset>,
) -> Option<Asset> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        asset = input.recv() => asset,
    }
}

/// Hand a group over without waiting; a full channel drops and closes it
pub(crate) fn offer_group(out: &mpsc::Sender<Group>, group: Group) -> bool {
    match out.try_send(group) {
        Ok(()) => true,
        Err(e) => {
            let mut group = e.into_inner();
            warn!(
                grouping = %group.grouping,
                count = group.assets.len(),
                first = ?group.assets.first().map(|a| a.file.to_string()),
                "Group dropped on cancellation"
            );
            for asset in group.assets.iter_mut() {
                asset.close();
            }
            false
        }
    }
}

/// Hand an asset over without waiting; a full channel drops and closes it
pub(crate) fn offer_asset(out: &mpsc::Sender<Asset>, asset: Asset) -> bool {
    match out.try_send(asset) {
        Ok(()) => true,
        Err(e) => {
            let mut asset = e.into_inner();
            warn!(file = %asset.file, "Asset dropped on cancellation");
            asset.close();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BodySource, Grouping, MemoryBody};
    use crate::services::name_analyser::NameAnalyser;
    use photosync_common::FileRef;
    use std::io::{self, Read};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn asset(name: &str) -> Asset {
        let mut a = Asset::new(
            FileRef::new("t", name),
            Arc::new(MemoryBody::new(vec![])),
            10,
        );
        a.name_info = NameAnalyser::default().analyse(name);
        a
    }

    async fn run_names(pipeline: GrouperPipeline, names: &[&str]) -> Vec<Group> {
        let (tx, rx) = mpsc::channel(16);
        let mut out = pipeline.run(CancellationToken::new(), rx);
        for name in names {
            tx.send(asset(name)).await.unwrap();
        }
        drop(tx);
        let mut groups = Vec::new();
        while let Some(g) = out.recv().await {
            groups.push(g);
        }
        groups
    }

    #[tokio::test]
    async fn test_every_group_is_valid() {
        let groups = run_names(
            GrouperPipeline::standard(true),
            &[
                "00001IMG_00001_BURST20171111030039.jpg",
                "00002IMG_00002_BURST20171111030039_COVER.jpg",
                "IMG_0002.jpg",
                "photo_0001.jpg",
                "photo_0001_a.jpg",
                "photo_0001_b.jpg",
                "IMG_1234.HEIC",
                "IMG_1234.MOV",
            ],
        )
        .await;

        assert!(groups.iter().all(|g| g.validate().is_ok()));
        let total: usize = groups.iter().map(|g| g.assets.len()).sum();
        assert_eq!(total, 8);

        let mut kinds: Vec<Grouping> = groups.iter().map(|g| g.grouping).collect();
        kinds.sort_by_key(|k| format!("{}", k));
        assert!(kinds.contains(&Grouping::Burst));
        assert!(kinds.contains(&Grouping::LivePhoto));
        assert!(kinds.contains(&Grouping::Other));
        assert!(kinds.contains(&Grouping::None));
    }

    #[derive(Debug, Default)]
    struct CountingBody {
        released: AtomicUsize,
    }

    impl BodySource for CountingBody {
        fn local_path(&self) -> Option<PathBuf> {
            None
        }

        fn open(&self) -> io::Result<Box<dyn Read + Send>> {
            Ok(Box::new(io::empty()))
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_offers_to_full_channel_close_the_dropped_assets() {
        let body = Arc::new(CountingBody::default());
        let counted = |name: &str| {
            let mut a = Asset::new(FileRef::new("t", name), body.clone(), 10);
            a.name_info = NameAnalyser::default().analyse(name);
            a
        };

        let (groups_tx, mut groups_rx) = mpsc::channel(1);
        let (assets_tx, mut assets_rx) = mpsc::channel(1);
        assert!(offer_group(&groups_tx, Group::single(counted("IMG_0001.jpg"))));
        let burst = Group::new(
            Grouping::Burst,
            vec![
                counted("00001IMG_00001_BURST20171111030039.jpg"),
                counted("00002IMG_00002_BURST20171111030039.jpg"),
            ],
        );
        assert!(!offer_group(&groups_tx, burst));
        assert!(offer_asset(&assets_tx, counted("IMG_0002.jpg")));
        assert!(!offer_asset(&assets_tx, counted("IMG_0003.jpg")));

        assert_eq!(body.released.load(Ordering::SeqCst), 3);
        assert_eq!(groups_rx.try_recv().unwrap().assets[0].original_file_name, "IMG_0001.jpg");
        assert_eq!(assets_rx.try_recv().unwrap().original_file_name, "IMG_0002.jpg");
    }

    #[tokio::test]
    async fn test_cancel_closes_stream() {
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let mut out = GrouperPipeline::standard(false).run(cancel.clone(), rx);
        tx.send(asset("00001IMG_00001_BURST20171111030039.jpg")).await.unwrap();
        tx.send(asset("00002IMG_00002_BURST20171111030039.jpg")).await.unwrap();
        tokio::task::yield_now().await;
        cancel.cancel();

        let mut seen = 0;
        while let Some(g) = out.recv().await {
            assert!(g.validate().is_ok());
            seen += g.assets.len();
        }
        assert!(seen <= 2);
        drop(tx);
    }
}
