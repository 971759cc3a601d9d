//! Series grouping: bursts, live photos, RAW+JPEG, HEIC+JPEG and edits
//!
//! Assets arrive sorted by radical. A run of assets sharing a radical is
//! classified when the radical changes.

use super::{next_asset, offer_asset, offer_group, Grouper};
use crate::models::{Asset, Group, Grouping, MediaKind, SeriesKind};
use crate::services::media_types::{is_heic, is_jpeg, is_raw};
use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Largest capture time gap inside a RAW+JPEG or HEIC+JPEG pair
const PAIR_MAX_GAP_MS: i64 = 500;

#[derive(Debug, Default)]
pub struct SeriesGrouper {
    radical: String,
    run: Vec<Asset>,
}

/// Cover of a burst: the announced cover, else index 1, else the first
fn burst_cover(run: &[Asset]) -> usize {
    run.iter()
        .position(|a| a.name_info.is_cover)
        .or_else(|| run.iter().position(|a| a.name_info.index == 1))
        .unwrap_or(0)
}

fn dates_close(a: &Asset, b: &Asset) -> bool {
    let da = a.capture_date.or(a.name_info.taken);
    let db = b.capture_date.or(b.name_info.taken);
    match (da, db) {
        (Some(da), Some(db)) => (da - db).abs() <= Duration::milliseconds(PAIR_MAX_GAP_MS),
        _ => true,
    }
}

/// Decide what a run of same-radical assets is
fn classify(run: Vec<Asset>) -> (Option<Group>, Vec<Asset>) {
    if run.len() < 2 {
        return (None, run);
    }

    if run.iter().any(|a| a.name_info.kind == SeriesKind::Burst) {
        let cover = burst_cover(&run);
        return (Some(Group::new(Grouping::Burst, run).with_cover(cover)), Vec::new());
    }

    if run.len() == 2 {
        let (a, b) = (&run[0].name_info, &run[1].name_info);
        match (a.media, b.media) {
            (MediaKind::Image, MediaKind::Video) => {
                return (Some(Group::new(Grouping::LivePhoto, run).with_cover(0)), Vec::new());
            }
            (MediaKind::Video, MediaKind::Image) => {
                return (Some(Group::new(Grouping::LivePhoto, run).with_cover(1)), Vec::new());
            }
            (MediaKind::Image, MediaKind::Image) if dates_close(&run[0], &run[1]) => {
                let jpeg = if is_jpeg(&a.ext) {
                    Some(0)
                } else if is_jpeg(&b.ext) {
                    Some(1)
                } else {
                    None
                };
                if let Some(cover) = jpeg {
                    let other = &run[1 - cover].name_info.ext;
                    if is_raw(other) {
                        return (Some(Group::new(Grouping::RawJpg, run).with_cover(cover)), Vec::new());
                    }
                    if is_heic(other) {
                        return (Some(Group::new(Grouping::HeicJpg, run).with_cover(cover)), Vec::new());
                    }
                }
            }
            _ => {}
        }
    }

    let modified = run.iter().filter(|a| a.name_info.is_modified).count();
    if modified > 0 && modified < run.len() {
        let cover = run
            .iter()
            .position(|a| !a.name_info.is_modified)
            .unwrap_or(0);
        return (Some(Group::new(Grouping::Edited, run).with_cover(cover)), Vec::new());
    }

    (None, run)
}

impl SeriesGrouper {
    async fn flush(
        &mut self,
        out_assets: &mpsc::Sender<Asset>,
        out_groups: &mpsc::Sender<Group>,
    ) -> bool {
        let (group, assets) = classify(std::mem::take(&mut self.run));
        if let Some(group) = group {
            debug!(radical = %self.radical, grouping = %group.grouping, count = group.assets.len(), "Series group");
            if out_groups.send(group).await.is_err() {
                return false;
            }
        }
        for asset in assets {
            if out_assets.send(asset).await.is_err() {
                return false;
            }
        }
        true
    }

    fn flush_now(&mut self, out_assets: &mpsc::Sender<Asset>, out_groups: &mpsc::Sender<Group>) {
        let (group, assets) = classify(std::mem::take(&mut self.run));
        if let Some(group) = group {
            offer_group(out_groups, group);
        }
        for asset in assets {
            offer_asset(out_assets, asset);
        }
    }
}

#[async_trait]
impl Grouper for SeriesGrouper {
    async fn group(
        &mut self,
        cancel: CancellationToken,
        mut input: mpsc::Receiver<Asset>,
        out_assets: mpsc::Sender<Asset>,
        out_groups: mpsc::Sender<Group>,
    ) {
        loop {
            let Some(asset) = next_asset(&cancel, &mut input).await else {
                break;
            };
            if !self.run.is_empty() && asset.name_info.radical != self.radical {
                if !self.flush(&out_assets, &out_groups).await {
                    return;
                }
            }
            self.radical = asset.name_info.radical.clone();
            self.run.push(asset);
        }

        if cancel.is_cancelled() {
            self.flush_now(&out_assets, &out_groups);
        } else {
            self.flush(&out_assets, &out_groups).await;
        }
    }
}
