//! File name analysis
//!
//! Phone cameras encode series membership in their file names. Each vendor
//! matcher below recognises one naming scheme; the first that matches wins.
//! Names no matcher recognises get a generic analysis: stem as radical,
//! date guessed by [`FilenameClock`], and edited variants detected by their
//! `-edited` style suffix.

use crate::models::{base_name, NameInfo, SeriesKind};
use crate::services::filename_clock::FilenameClock;
use crate::services::media_types::{extension, SupportedMedia};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static PIXEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(PXL_\d{8}_\d{9})((.*)?(\d{2}))?(.*)?(\..*)$").unwrap());
static SAMSUNG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{8}_\d{6})_(\d{3})(\..+)$").unwrap());
static NEXUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\D+_\d+_(BURST\d+)(\D+)?(\..+)$").unwrap());
static HUAWEI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(IMG_\d{8}_\d{6})_BURST(\d{3})(?:_(\w+))?(\..+)$").unwrap());
static SONY_XPERIA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^DSC_(\d+)_BURST(\d+)(\D+)?(\..+)$").unwrap());
static EDITED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+?)[-_ ](edited|modified|modifié|bearbeitet)(\(\d+\))?$").unwrap()
});

type Matcher = fn(&NameAnalyser, &str) -> Option<NameInfo>;

/// Turns base names into [`NameInfo`]
#[derive(Debug, Clone, Default)]
pub struct NameAnalyser {
    clock: FilenameClock,
    media: SupportedMedia,
}

impl NameAnalyser {
    pub fn new(clock: FilenameClock, media: SupportedMedia) -> Self {
        Self { clock, media }
    }

    pub fn media(&self) -> &SupportedMedia {
        &self.media
    }

    /// Analyse a name; a full path is accepted, only the fallback date
    /// lookup looks past the base name.
    pub fn analyse(&self, name: &str) -> NameInfo {
        let base = base_name(name);
        let matchers: [Matcher; 5] = [
            Self::pixel,
            Self::samsung,
            Self::nexus,
            Self::huawei,
            Self::sony_xperia,
        ];
        for matcher in matchers {
            if let Some(info) = matcher(self, base) {
                return info;
            }
        }
        self.fallback(name, base)
    }

    fn fallback(&self, name: &str, base: &str) -> NameInfo {
        let ext = extension(base);
        let stem = match base.rfind('.') {
            Some(i) if i > 0 => &base[..i],
            _ => base,
        };
        let mut info = NameInfo {
            base: base.to_string(),
            radical: stem.to_string(),
            media: self.media.kind_of(&ext),
            ext,
            taken: self.clock.take_time_from_path(name),
            ..Default::default()
        };
        if let Some(caps) = EDITED_RE.captures(stem) {
            info.radical = caps[1].to_string();
            info.is_modified = true;
            info.kind = SeriesKind::Edited;
        }
        info
    }

    fn pixel(&self, name: &str) -> Option<NameInfo> {
        let caps = PIXEL_RE.captures(name)?;
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();
        let ext = group(6);
        let radical = group(1);
        let tail = &name[radical.len()..];
        let kind = if tail.contains("PORTRAIT") {
            SeriesKind::Portrait
        } else if tail.contains("NIGHT") {
            SeriesKind::Night
        } else if tail.contains("LONG_EXPOSURE") {
            SeriesKind::LongExposure
        } else if tail.contains("MOTION") {
            SeriesKind::Motion
        } else {
            SeriesKind::None
        };
        Some(NameInfo {
            base: name.to_string(),
            radical: radical.to_string(),
            ext: ext.to_lowercase(),
            media: self.media.kind_of(ext),
            kind,
            index: group(4).parse().unwrap_or(0),
            taken: parse_utc(&radical[4..19], "%Y%m%d_%H%M%S"),
            is_cover: group(5).ends_with("COVER"),
            is_modified: false,
        })
    }

    fn samsung(&self, name: &str) -> Option<NameInfo> {
        let caps = SAMSUNG_RE.captures(name)?;
        let index: u32 = caps[2].parse().unwrap_or(0);
        Some(NameInfo {
            base: name.to_string(),
            radical: caps[1].to_string(),
            ext: caps[3].to_lowercase(),
            media: self.media.kind_of(&caps[3]),
            kind: SeriesKind::Burst,
            index,
            taken: self.parse_local(&caps[1], "%Y%m%d_%H%M%S"),
            is_cover: index == 1,
            is_modified: false,
        })
    }

    fn nexus(&self, name: &str) -> Option<NameInfo> {
        let caps = NEXUS_RE.captures(name)?;
        let radical = caps[2].to_string();
        let ts = radical.trim_start_matches("BURST");
        let taken = match ts.len() {
            14 => self.parse_local(ts, "%Y%m%d%H%M%S"),
            13 => ts
                .parse::<i64>()
                .ok()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            17 => self.parse_local(&format!("{}.{}", &ts[..14], &ts[14..]), "%Y%m%d%H%M%S%.3f"),
            _ => None,
        };
        let tail = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        Some(NameInfo {
            base: name.to_string(),
            ext: caps[4].to_lowercase(),
            media: self.media.kind_of(&caps[4]),
            kind: SeriesKind::Burst,
            index: caps[1].parse().unwrap_or(0),
            taken,
            is_cover: tail.contains("COVER"),
            is_modified: false,
            radical,
        })
    }

    fn huawei(&self, name: &str) -> Option<NameInfo> {
        let caps = HUAWEI_RE.captures(name)?;
        let radical = caps[1].to_string();
        let tail = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        Some(NameInfo {
            base: name.to_string(),
            ext: caps[4].to_lowercase(),
            media: self.media.kind_of(&caps[4]),
            kind: SeriesKind::Burst,
            index: caps[2].parse().unwrap_or(0),
            taken: self.parse_local(&radical[4..19], "%Y%m%d_%H%M%S"),
            is_cover: tail.ends_with("COVER"),
            is_modified: false,
            radical,
        })
    }

    fn sony_xperia(&self, name: &str) -> Option<NameInfo> {
        let caps = SONY_XPERIA_RE.captures(name)?;
        let ts = &caps[2];
        let taken = if ts.len() > 14 {
            self.parse_local(&format!("{}.{}", &ts[..14], &ts[14..]), "%Y%m%d%H%M%S%.f")
        } else {
            self.parse_local(ts, "%Y%m%d%H%M%S")
        };
        let tail = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        Some(NameInfo {
            base: name.to_string(),
            radical: format!("BURST{}", ts),
            ext: caps[4].to_lowercase(),
            media: self.media.kind_of(&caps[4]),
            kind: SeriesKind::Burst,
            index: caps[1].parse().unwrap_or(0),
            taken,
            is_cover: tail.contains("COVER"),
            is_modified: false,
        })
    }

    fn parse_local(&self, s: &str, fmt: &str) -> Option<DateTime<Utc>> {
        let naive = NaiveDateTime::parse_from_str(s, fmt).ok()?;
        self.clock.localize(naive)
    }
}

fn parse_utc(s: &str, fmt: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, fmt)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
