//! Epson FastFoto scans
//!
//! A FastFoto scan yields `NAME.jpg` (the enhanced picture), `NAME_a.jpg`
//! (the original scan) and `NAME_b.jpg` (the back of the print). The three
//! form one group with the `_a` variant as cover.

use super::{next_asset, offer_asset, offer_group, Grouper};
use crate::models::{Asset, Group, Grouping};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

static EPSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*_\d+)(_[ab])?(\.(?:jpe?g|tiff?))$").unwrap());

#[derive(Debug, Default)]
pub struct EpsonFastFotoGrouper {
    stem: String,
    members: Vec<Asset>,
}

/// Stem and variant letter of a FastFoto file name
fn parse(name: &str) -> Option<(String, Option<char>)> {
    let caps = EPSON_RE.captures(name)?;
    let variant = caps
        .get(2)
        .and_then(|m| m.as_str().chars().nth(1))
        .map(|c| c.to_ascii_lowercase());
    Some((caps[1].to_string(), variant))
}

impl EpsonFastFotoGrouper {
    /// Emit the open set: a group when variants are present, plain assets otherwise
    fn take_open(&mut self) -> (Option<Group>, Vec<Asset>) {
        self.stem.clear();
        let members = std::mem::take(&mut self.members);
        let variants: Vec<Option<char>> = members
            .iter()
            .map(|a| parse(&a.original_file_name).and_then(|(_, v)| v))
            .collect();

        if members.len() < 2 || variants.iter().all(|v| v.is_none()) {
            return (None, members);
        }
        let cover = variants.iter().position(|v| *v == Some('a')).unwrap_or(0);
        (Some(Group::new(Grouping::Other, members).with_cover(cover)), Vec::new())
    }

    async fn flush(
        &mut self,
        out_assets: &mpsc::Sender<Asset>,
        out_groups: &mpsc::Sender<Group>,
    ) -> bool {
        let (group, assets) = self.take_open();
        if let Some(group) = group {
            debug!(count = group.assets.len(), "Epson FastFoto group");
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
        let (group, assets) = self.take_open();
        if let Some(group) = group {
            offer_group(out_groups, group);
        }
        for asset in assets {
            offer_asset(out_assets, asset);
        }
    }
}

#[async_trait]
impl Grouper for EpsonFastFotoGrouper {
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

            match parse(&asset.original_file_name) {
                Some((stem, _)) if stem == self.stem => self.members.push(asset),
                Some((stem, _)) => {
                    if !self.flush(&out_assets, &out_groups).await {
                        return;
                    }
                    self.stem = stem;
                    self.members.push(asset);
                }
                None => {
                    if !self.flush(&out_assets, &out_groups).await {
                        return;
                    }
                    if out_assets.send(asset).await.is_err() {
                        return;
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            self.flush_now(&out_assets, &out_groups);
        } else {
            self.flush(&out_assets, &out_groups).await;
        }
    }
}
