//! Per-group policies
//!
//! Filters run in a fixed order: banned names, file type inclusion, date
//! range, then the burst, RAW/JPEG and HEIC/JPEG policies. Culled assets
//! move to `Group::removed` with a reason; a group left with fewer than two
//! assets reverts to `Grouping::None`.

use crate::models::{Group, Grouping};
use crate::services::banned_names::BannedNames;
use crate::services::date_range::DateRange;
use crate::services::media_types::{is_heic, is_jpeg, is_raw};
use photosync_common::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub const REASON_BANNED: &str = "banned file";
pub const REASON_EXTENSION: &str = "extension not included";
pub const REASON_DATE_RANGE: &str = "asset outside date range";

/// What to do with burst groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BurstPolicy {
    /// Upload every member, no stack
    #[default]
    NoStack,
    Stack,
    StackKeepRaw,
    StackKeepJpeg,
}

impl FromStr for BurstPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "" | "nostack" => Ok(BurstPolicy::NoStack),
            "stack" => Ok(BurstPolicy::Stack),
            "stackkeepraw" => Ok(BurstPolicy::StackKeepRaw),
            "stackkeepjpeg" => Ok(BurstPolicy::StackKeepJpeg),
            _ => Err(Error::InvalidInput(format!("invalid burst policy {:?}", s))),
        }
    }
}

impl fmt::Display for BurstPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BurstPolicy::NoStack => "NoStack",
            BurstPolicy::Stack => "Stack",
            BurstPolicy::StackKeepRaw => "StackKeepRaw",
            BurstPolicy::StackKeepJpeg => "StackKeepJPEG",
        })
    }
}

/// What to do with RAW+JPEG pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawJpgPolicy {
    #[default]
    NoStack,
    KeepRaw,
    KeepJpg,
    StackCoverRaw,
    StackCoverJpg,
}

impl FromStr for RawJpgPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "" | "nostack" => Ok(RawJpgPolicy::NoStack),
            "keepraw" => Ok(RawJpgPolicy::KeepRaw),
            "keepjpg" => Ok(RawJpgPolicy::KeepJpg),
            "stackcoverraw" => Ok(RawJpgPolicy::StackCoverRaw),
            "stackcoverjpg" => Ok(RawJpgPolicy::StackCoverJpg),
            _ => Err(Error::InvalidInput(format!("invalid RAW/JPEG policy {:?}", s))),
        }
    }
}

impl fmt::Display for RawJpgPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RawJpgPolicy::NoStack => "NoStack",
            RawJpgPolicy::KeepRaw => "KeepRaw",
            RawJpgPolicy::KeepJpg => "KeepJPG",
            RawJpgPolicy::StackCoverRaw => "StackCoverRaw",
            RawJpgPolicy::StackCoverJpg => "StackCoverJPG",
        })
    }
}

/// What to do with HEIC+JPEG pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeicJpgPolicy {
    #[default]
    NoStack,
    KeepHeic,
    KeepJpg,
    StackCoverHeic,
    StackCoverJpg,
}

impl FromStr for HeicJpgPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "" | "nostack" => Ok(HeicJpgPolicy::NoStack),
            "keepheic" => Ok(HeicJpgPolicy::KeepHeic),
            "keepjpg" => Ok(HeicJpgPolicy::KeepJpg),
            "stackcoverheic" => Ok(HeicJpgPolicy::StackCoverHeic),
            "stackcoverjpg" => Ok(HeicJpgPolicy::StackCoverJpg),
            _ => Err(Error::InvalidInput(format!("invalid HEIC/JPEG policy {:?}", s))),
        }
    }
}

impl fmt::Display for HeicJpgPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HeicJpgPolicy::NoStack => "NoStack",
            HeicJpgPolicy::KeepHeic => "KeepHeic",
            HeicJpgPolicy::KeepJpg => "KeepJPG",
            HeicJpgPolicy::StackCoverHeic => "StackCoverHeic",
            HeicJpgPolicy::StackCoverJpg => "StackCoverJPG",
        })
    }
}

/// Extensions to keep and to drop. An empty include set keeps everything.
#[derive(Debug, Clone, Default)]
pub struct FileTypeInclusion {
    pub include: HashSet<String>,
    pub exclude: HashSet<String>,
}

impl FileTypeInclusion {
    /// Build from comma-separated lists, with or without the leading dot
    pub fn from_lists(include: &str, exclude: &str) -> Self {
        Self {
            include: parse_extensions(include),
            exclude: parse_extensions(exclude),
        }
    }

    pub fn allows(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        if self.exclude.contains(&ext) {
            return false;
        }
        self.include.is_empty() || self.include.contains(&ext)
    }
}

fn parse_extensions(list: &str) -> HashSet<String> {
    list.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .map(|e| if e.starts_with('.') { e } else { format!(".{}", e) })
        .collect()
}

/// The composed filter chain
#[derive(Debug, Clone, Default)]
pub struct GroupFilters {
    pub banned: BannedNames,
    pub file_types: FileTypeInclusion,
    pub date_range: DateRange,
    pub burst: BurstPolicy,
    pub raw_jpg: RawJpgPolicy,
    pub heic_jpg: HeicJpgPolicy,
}

impl GroupFilters {
    /// Run every filter over the group
    pub fn apply(&self, mut group: Group) -> Group {
        if !self.banned.is_empty() {
            let banned = &self.banned;
            group.remove_where(REASON_BANNED, |a| banned.is_match(&a.file.name));
        }
        group.remove_where(REASON_EXTENSION, |a| !self.file_types.allows(&a.name_info.ext));
        if self.date_range.is_set() {
            let range = self.date_range;
            group.remove_where(REASON_DATE_RANGE, |a| !range.contains(a.capture_date));
        }
        self.apply_burst(&mut group);
        self.apply_raw_jpg(&mut group);
        self.apply_heic_jpg(&mut group);
        group
    }

    fn apply_burst(&self, group: &mut Group) {
        if group.grouping != Grouping::Burst {
            return;
        }
        match self.burst {
            BurstPolicy::NoStack => group.grouping = Grouping::None,
            BurstPolicy::Stack => {}
            BurstPolicy::StackKeepRaw => {
                keep_only(group, "Keep only RAW files in burst", |ext| is_raw(ext))
            }
            BurstPolicy::StackKeepJpeg => {
                keep_only(group, "Keep only JPEG files in burst", |ext| is_jpeg(ext))
            }
        }
    }

    fn apply_raw_jpg(&self, group: &mut Group) {
        if group.grouping != Grouping::RawJpg {
            return;
        }
        match self.raw_jpg {
            RawJpgPolicy::NoStack => group.grouping = Grouping::None,
            RawJpgPolicy::KeepRaw => keep_only(group, "Keep only RAW files in RAW/JPEG group", |ext| {
                is_raw(ext)
            }),
            RawJpgPolicy::KeepJpg => keep_only(group, "Keep only JPEG files in RAW/JPEG group", |ext| {
                is_jpeg(ext)
            }),
            RawJpgPolicy::StackCoverRaw => {
                group.set_cover_where(|a| is_raw(&a.name_info.ext));
            }
            RawJpgPolicy::StackCoverJpg => {
                group.set_cover_where(|a| is_jpeg(&a.name_info.ext));
            }
        }
    }

    fn apply_heic_jpg(&self, group: &mut Group) {
        if group.grouping != Grouping::HeicJpg {
            return;
        }
        match self.heic_jpg {
            HeicJpgPolicy::NoStack => group.grouping = Grouping::None,
            HeicJpgPolicy::KeepHeic => keep_only(group, "Keep only HEIC files in HEIC/JPEG group", |ext| {
                is_heic(ext)
            }),
            HeicJpgPolicy::KeepJpg => keep_only(group, "Keep only JPEG files in HEIC/JPEG group", |ext| {
                is_jpeg(ext)
            }),
            HeicJpgPolicy::StackCoverHeic => {
                group.set_cover_where(|a| is_heic(&a.name_info.ext));
            }
            HeicJpgPolicy::StackCoverJpg => {
                group.set_cover_where(|a| is_jpeg(&a.name_info.ext));
            }
        }
    }
}

/// Drop the members whose extension fails `keep`, unless none would remain
fn keep_only<F>(group: &mut Group, reason: &str, keep: F)
where
    F: Fn(&str) -> bool,
{
    if !group.assets.iter().any(|a| keep(&a.name_info.ext)) {
        return;
    }
    group.remove_where(reason, |a| !keep(&a.name_info.ext));
    if group.assets.len() < 2 {
        group.grouping = Grouping::None;
    }
}
