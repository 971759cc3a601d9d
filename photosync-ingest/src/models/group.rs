//! Groups of related assets

use crate::error::{IngestError, Result};
use crate::models::{Album, Asset};
use std::fmt;

/// Relationship between the assets of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grouping {
    /// Single asset, the group is transparent
    #[default]
    None,
    Burst,
    RawJpg,
    HeicJpg,
    LivePhoto,
    Edited,
    Other,
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grouping::None => "none",
            Grouping::Burst => "burst",
            Grouping::RawJpg => "raw/jpg",
            Grouping::HeicJpg => "heic/jpg",
            Grouping::LivePhoto => "live photo",
            Grouping::Edited => "edited",
            Grouping::Other => "other",
        };
        f.write_str(s)
    }
}

/// Asset culled by a filter
#[derive(Debug)]
pub struct RemovedAsset {
    pub asset: Asset,
    pub reason: String,
}

/// Bundle of related assets with a designated cover
#[derive(Debug, Default)]
pub struct Group {
    pub assets: Vec<Asset>,
    /// Albums applied to every member
    pub albums: Vec<Album>,
    pub grouping: Grouping,
    pub cover_index: usize,
    pub removed: Vec<RemovedAsset>,
}

impl Group {
    pub fn new(grouping: Grouping, assets: Vec<Asset>) -> Self {
        Self {
            assets,
            grouping,
            ..Default::default()
        }
    }

    /// Transparent group around one asset
    pub fn single(asset: Asset) -> Self {
        Self::new(Grouping::None, vec![asset])
    }

    pub fn with_cover(mut self, cover_index: usize) -> Self {
        self.cover_index = cover_index;
        self
    }

    /// Check the group invariants
    pub fn validate(&self) -> Result<()> {
        if self.assets.is_empty() {
            return Err(IngestError::Invariant("group has no asset".to_string()));
        }
        if self.cover_index >= self.assets.len() {
            return Err(IngestError::Invariant(format!(
                "cover index {} out of range for {} assets",
                self.cover_index,
                self.assets.len()
            )));
        }
        Ok(())
    }

    pub fn cover(&self) -> Option<&Asset> {
        self.assets.get(self.cover_index)
    }

    /// Move an asset to the removed list
    ///
    /// The cover index follows the cover; when the cover itself goes, the
    /// first remaining asset becomes the cover. A group left with fewer
    /// than two assets reverts to `Grouping::None`.
    pub fn remove_asset(&mut self, index: usize, reason: impl Into<String>) {
        if index >= self.assets.len() {
            return;
        }
        let asset = self.assets.remove(index);
        self.removed.push(RemovedAsset {
            asset,
            reason: reason.into(),
        });

        if index < self.cover_index {
            self.cover_index -= 1;
        } else if index == self.cover_index {
            self.cover_index = 0;
        }
        if self.cover_index >= self.assets.len() {
            self.cover_index = 0;
        }
        if self.assets.len() < 2 {
            self.grouping = Grouping::None;
        }
    }

    /// Remove every asset matching the predicate
    pub fn remove_where<F>(&mut self, reason: &str, mut pred: F)
    where
        F: FnMut(&Asset) -> bool,
    {
        let mut i = 0;
        while i < self.assets.len() {
            if pred(&self.assets[i]) {
                self.remove_asset(i, reason);
            } else {
                i += 1;
            }
        }
    }

    /// Set the cover to the first asset matching the predicate
    pub fn set_cover_where<F>(&mut self, pred: F) -> bool
    where
        F: Fn(&Asset) -> bool,
    {
        match self.assets.iter().position(pred) {
            Some(i) => {
                self.cover_index = i;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemoryBody;
    use photosync_common::FileRef;
    use std::sync::Arc;

    fn asset(name: &str) -> Asset {
        Asset::new(
            FileRef::new("t", name),
            Arc::new(MemoryBody::new(vec![])),
            1,
        )
    }

    #[test]
    fn test_validate() {
        assert!(Group::default().validate().is_err());
        assert!(Group::single(asset("a.jpg")).validate().is_ok());
        let g = Group::new(Grouping::Burst, vec![asset("a.jpg")]).with_cover(1);
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_remove_before_cover_shifts_index() {
        let mut g = Group::new(
            Grouping::Burst,
            vec![asset("a.jpg"), asset("b.jpg"), asset("c.jpg")],
        )
        .with_cover(2);
        g.remove_asset(0, "gone");
        assert_eq!(g.cover_index, 1);
        assert_eq!(g.cover().unwrap().original_file_name, "c.jpg");
        assert_eq!(g.grouping, Grouping::Burst);
        assert_eq!(g.removed[0].reason, "gone");
    }

    #[test]
    fn test_removing_down_to_one_degroups() {
        let mut g = Group::new(Grouping::RawJpg, vec![asset("a.dng"), asset("a.jpg")]).with_cover(1);
        g.remove_where("raw", |a| a.original_file_name.ends_with(".dng"));
        assert_eq!(g.assets.len(), 1);
        assert_eq!(g.cover_index, 0);
        assert_eq!(g.grouping, Grouping::None);
        assert!(g.validate().is_ok());
    }
}
