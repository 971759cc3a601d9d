//! Sidecar metadata readers
//!
//! Two formats are understood:
//! - XMP packets (`photo.jpg.xmp`, `photo.xmp`) as written by darktable,
//!   digiKam and Lightroom. Properties may be written as attributes of
//!   `rdf:Description` or as child elements.
//! - Google Takeout JSON records (`photo.jpg.json`). A record wrapped in
//!   `albumData` describes an album rather than an asset.
//!
//! Readers are pure: bytes in, [`Metadata`] out.

use crate::error::{IngestError, Result};
use crate::models::{Album, Metadata};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use photosync_common::FileRef;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// What a JSON sidecar describes
#[derive(Debug, Clone, PartialEq)]
pub enum SidecarRecord {
    Asset(Metadata),
    Album(Album),
}

/// Read a sidecar, picking the format from the file extension
///
/// # Arguments
/// * `path` - Sidecar location on disk
/// * `file` - Reference recorded in the resulting metadata
pub fn read_sidecar_file(path: &Path, file: &FileRef) -> Result<SidecarRecord> {
    let handle = std::fs::File::open(path).map_err(|e| IngestError::FileAccess {
        file: file.to_string(),
        message: e.to_string(),
    })?;
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xmp" => read_xmp(handle, file).map(SidecarRecord::Asset),
        "json" => read_json(handle, file),
        _ => Err(sidecar_error(file, format!("unknown sidecar type {:?}", ext))),
    }
}

fn sidecar_error(file: &FileRef, message: impl Into<String>) -> IngestError {
    IngestError::Sidecar {
        file: file.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------- XMP

/// Parse an XMP packet
pub fn read_xmp<R: Read>(mut reader: R, file: &FileRef) -> Result<Metadata> {
    let mut xml = String::new();
    reader
        .read_to_string(&mut xml)
        .map_err(|e| sidecar_error(file, e.to_string()))?;

    if !xml.contains("xmpmeta") && !xml.contains("rdf:RDF") {
        return Err(sidecar_error(file, "not an XMP packet"));
    }

    let mut md = Metadata {
        file: Some(file.clone()),
        ..Default::default()
    };

    if let Some(value) = property(&xml, "exif:DateTimeOriginal")? {
        md.date_taken = Some(
            parse_xmp_date(&value)
                .ok_or_else(|| sidecar_error(file, format!("invalid date {:?}", value)))?,
        );
    }
    if let Some(value) = property(&xml, "exif:GPSLatitude")? {
        md.latitude = Some(
            parse_gps(&value)
                .ok_or_else(|| sidecar_error(file, format!("invalid latitude {:?}", value)))?,
        );
    }
    if let Some(value) = property(&xml, "exif:GPSLongitude")? {
        md.longitude = Some(
            parse_gps(&value)
                .ok_or_else(|| sidecar_error(file, format!("invalid longitude {:?}", value)))?,
        );
    }
    if let Some(value) = property(&xml, "xmp:Rating")? {
        let rating: i32 = value
            .trim()
            .parse()
            .map_err(|_| sidecar_error(file, format!("invalid rating {:?}", value)))?;
        md.rating = rating.clamp(0, 5) as u8;
    }
    if let Some(description) = list_items(&xml, "dc:description")?.into_iter().next() {
        md.description = description;
    }
    for tag in list_items(&xml, "digiKam:TagsList")? {
        md.add_tag(&tag);
    }
    Ok(md)
}

const XMP_PROPERTIES: &[&str] = &[
    "exif:DateTimeOriginal",
    "exif:GPSLatitude",
    "exif:GPSLongitude",
    "xmp:Rating",
];

const XMP_LISTS: &[&str] = &["dc:description", "digiKam:TagsList"];

/// Attribute and element patterns per simple property
static PROPERTY_PATTERNS: Lazy<HashMap<&'static str, (Regex, Regex)>> = Lazy::new(|| {
    XMP_PROPERTIES
        .iter()
        .map(|name| {
            let escaped = regex::escape(name);
            let attribute = Regex::new(&format!(r#"\s{}\s*=\s*"([^"]*)""#, escaped)).unwrap();
            let element =
                Regex::new(&format!(r"(?s)<{0}(?:\s[^>]*)?>([^<]*)</{0}>", escaped)).unwrap();
            (*name, (attribute, element))
        })
        .collect()
});

static LIST_PATTERNS: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    XMP_LISTS
        .iter()
        .map(|name| {
            let escaped = regex::escape(name);
            let container =
                Regex::new(&format!(r"(?s)<{0}(?:\s[^>]*)?>(.*?)</{0}>", escaped)).unwrap();
            (*name, container)
        })
        .collect()
});

static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<rdf:li(?:\s[^>]*)?>(.*?)</rdf:li>").unwrap());

fn unknown_property(name: &str) -> IngestError {
    IngestError::Invariant(format!("no XMP pattern for {}", name))
}

/// Simple property, attribute form first then element form
fn property(xml: &str, name: &str) -> Result<Option<String>> {
    let (attribute, element) = PROPERTY_PATTERNS
        .get(name)
        .ok_or_else(|| unknown_property(name))?;
    if let Some(caps) = attribute.captures(xml) {
        return Ok(Some(unescape(&caps[1])));
    }
    Ok(element.captures(xml).map(|caps| unescape(caps[1].trim())))
}

/// `rdf:li` items of an `rdf:Alt`, `rdf:Bag` or `rdf:Seq` property
fn list_items(xml: &str, name: &str) -> Result<Vec<String>> {
    let container = LIST_PATTERNS.get(name).ok_or_else(|| unknown_property(name))?;
    let mut items = Vec::new();
    if let Some(caps) = container.captures(xml) {
        for li in LIST_ITEM.captures_iter(&caps[1]) {
            let value = unescape(li[1].trim());
            if !value.is_empty() {
                items.push(value);
            }
        }
    }
    Ok(items)
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// `2023-10-10T01:11:00-04:00`, `2023-10-10T01:11:00` (UTC) or `2023:10:10 01:11:00`
fn parse_xmp_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(value) {
        return Some(d.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y:%m:%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// `DDD,MM.mmmmk` where k is N, S, E or W
fn parse_gps(value: &str) -> Option<f64> {
    let value = value.trim();
    let (degrees, rest) = value.split_once(',')?;
    let degrees: f64 = degrees.trim().parse().ok()?;
    let direction = rest.chars().last()?;
    let minutes: f64 = rest[..rest.len() - direction.len_utf8()].trim().parse().ok()?;
    let decimal = degrees + minutes / 60.0;
    match direction.to_ascii_uppercase() {
        'N' | 'E' => Some(decimal),
        'S' | 'W' => Some(-decimal),
        _ => None,
    }
}

// ---------------------------------------------------------------- JSON

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TakeoutRecord {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    photo_taken_time: Option<TakeoutTime>,
    geo_data_exif: Option<TakeoutGeo>,
    geo_data: Option<TakeoutGeo>,
    #[serde(default)]
    trashed: bool,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    favorited: bool,
    #[serde(default)]
    people: Vec<TakeoutPerson>,
    #[serde(default)]
    google_photos_origin: TakeoutOrigin,
}

#[derive(Debug, Default, Deserialize)]
struct TakeoutTime {
    #[serde(default)]
    timestamp: String,
}

#[derive(Debug, Default, Deserialize)]
struct TakeoutGeo {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

#[derive(Debug, Default, Deserialize)]
struct TakeoutPerson {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TakeoutOrigin {
    /// Presence markers, the objects themselves are empty
    from_partner_sharing: Option<serde_json::Value>,
    from_shared_album: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumWrapper {
    album_data: Option<TakeoutRecord>,
}

/// Parse a Takeout JSON record
pub fn read_json<R: Read>(reader: R, file: &FileRef) -> Result<SidecarRecord> {
    let value: serde_json::Value =
        serde_json::from_reader(reader).map_err(|e| sidecar_error(file, e.to_string()))?;

    if let Ok(AlbumWrapper {
        album_data: Some(album),
    }) = serde_json::from_value::<AlbumWrapper>(value.clone())
    {
        return Ok(SidecarRecord::Album(Album {
            title: album.title,
            description: album.description,
            latitude: album.geo_data.as_ref().map(|g| g.latitude).filter(|l| *l != 0.0),
            longitude: album.geo_data.as_ref().map(|g| g.longitude).filter(|l| *l != 0.0),
            ..Default::default()
        }));
    }

    let record: TakeoutRecord =
        serde_json::from_value(value).map_err(|e| sidecar_error(file, e.to_string()))?;

    let mut md = Metadata {
        file: Some(file.clone()),
        file_name: record.title.clone(),
        description: record.description.clone(),
        trashed: record.trashed,
        archived: record.archived,
        favorited: record.favorited,
        from_partner: record.google_photos_origin.from_partner_sharing.is_some(),
        from_shared_album: record.google_photos_origin.from_shared_album.is_some(),
        ..Default::default()
    };

    let geo = match (&record.geo_data_exif, &record.geo_data) {
        (Some(exif), Some(fallback)) if exif.latitude == 0.0 && exif.longitude == 0.0 => {
            Some(fallback)
        }
        (Some(exif), _) => Some(exif),
        (None, other) => other.as_ref(),
    };
    if let Some(geo) = geo.filter(|g| g.latitude != 0.0 || g.longitude != 0.0) {
        md.latitude = Some(geo.latitude);
        md.longitude = Some(geo.longitude);
    }

    if let Some(ts) = record.photo_taken_time.as_ref().map(|t| t.timestamp.as_str()) {
        if !ts.is_empty() && ts != "0" {
            let secs: i64 = ts
                .parse()
                .map_err(|_| sidecar_error(file, format!("invalid timestamp {:?}", ts)))?;
            md.date_taken = Utc.timestamp_opt(secs, 0).single();
        }
    }

    for person in &record.people {
        if !person.name.is_empty() {
            md.add_tag(&format!("People/{}", person.name));
        }
    }

    Ok(SidecarRecord::Asset(md))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTRIBUTE_XMP: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about=""
    exif:DateTimeOriginal="2023-10-10T01:11:00-04:00"
    exif:GPSLatitude="16,33.10142S"
    exif:GPSLongitude="62,40.48971W"
    xmp:Rating="3">
   <dc:description>
    <rdf:Alt>
     <rdf:li xml:lang="x-default">C'est une &lt;grotte&gt;</rdf:li>
    </rdf:Alt>
   </dc:description>
   <digiKam:TagsList>
    <rdf:Seq>
     <rdf:li>Places/Bolivia</rdf:li>
     <rdf:li>People/Ann</rdf:li>
    </rdf:Seq>
   </digiKam:TagsList>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>"#;

    const ELEMENT_XMP: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF>
  <rdf:Description>
   <exif:DateTimeOriginal>2024-07-07T13:31:46</exif:DateTimeOriginal>
   <xmp:Rating>5</xmp:Rating>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>"#;

    fn file() -> FileRef {
        FileRef::new("disk", "image01.jpg.xmp")
    }

    #[test]
    fn test_xmp_attribute_form() {
        let md = read_xmp(ATTRIBUTE_XMP.as_bytes(), &file()).unwrap();
        assert_eq!(
            md.date_taken,
            Some(Utc.with_ymd_and_hms(2023, 10, 10, 5, 11, 0).unwrap())
        );
        assert!((md.latitude.unwrap() + 16.5516903).abs() < 1e-6);
        assert!((md.longitude.unwrap() + 62.6748285).abs() < 1e-6);
        assert_eq!(md.rating, 3);
        assert_eq!(md.description, "C'est une <grotte>");
        let tags: Vec<&str> = md.tags.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(tags, vec!["Places/Bolivia", "People/Ann"]);
        assert_eq!(md.tags[1].name, "Ann");
    }

    #[test]
    fn test_xmp_element_form() {
        let md = read_xmp(ELEMENT_XMP.as_bytes(), &file()).unwrap();
        assert_eq!(
            md.date_taken,
            Some(Utc.with_ymd_and_hms(2024, 7, 7, 13, 31, 46).unwrap())
        );
        assert_eq!(md.rating, 5);
        assert!(md.tags.is_empty());
    }

    #[test]
    fn test_xmp_malformed() {
        let err = read_xmp("just text".as_bytes(), &file()).unwrap_err();
        assert!(matches!(err, IngestError::Sidecar { .. }));

        let bad_date = ELEMENT_XMP.replace("2024-07-07T13:31:46", "yesterday");
        let err = read_xmp(bad_date.as_bytes(), &file()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SidecarParse);
    }

    #[test]
    fn test_xmp_patterns_are_shared() {
        assert_eq!(PROPERTY_PATTERNS.len(), XMP_PROPERTIES.len());
        assert_eq!(LIST_PATTERNS.len(), XMP_LISTS.len());

        let first = read_xmp(ELEMENT_XMP.as_bytes(), &file()).unwrap();
        let second = read_xmp(ELEMENT_XMP.as_bytes(), &file()).unwrap();
        assert_eq!(first, second);

        assert!(matches!(
            property(ELEMENT_XMP, "exif:Make"),
            Err(IngestError::Invariant(_))
        ));
        assert!(list_items(ELEMENT_XMP, "dc:subject").is_err());
    }

    #[test]
    fn test_takeout_asset_record() {
        let json = r#"{
            "title": "IMG_0001.jpg",
            "description": "beach",
            "photoTakenTime": {"timestamp": "1720359106", "formatted": "7 juil. 2024"},
            "geoDataExif": {"latitude": 0.0, "longitude": 0.0},
            "geoData": {"latitude": 48.85, "longitude": 2.35},
            "favorited": true,
            "people": [{"name": "Ann"}],
            "googlePhotosOrigin": {"fromPartnerSharing": {}}
        }"#;
        let SidecarRecord::Asset(md) = read_json(json.as_bytes(), &file()).unwrap() else {
            panic!("expected an asset record");
        };
        assert_eq!(md.file_name, "IMG_0001.jpg");
        assert_eq!(
            md.date_taken,
            Some(Utc.with_ymd_and_hms(2024, 7, 7, 13, 31, 46).unwrap())
        );
        assert_eq!(md.latitude, Some(48.85));
        assert!(md.favorited);
        assert!(md.from_partner);
        assert!(!md.from_shared_album);
        assert_eq!(md.tags[0].value, "People/Ann");
    }

    #[test]
    fn test_takeout_album_record() {
        let json = r#"{"albumData": {"title": "Trip", "description": "summer"}}"#;
        let record = read_json(json.as_bytes(), &file()).unwrap();
        assert_eq!(
            record,
            SidecarRecord::Album(Album {
                title: "Trip".into(),
                description: "summer".into(),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_takeout_malformed() {
        let err = read_json("{not json".as_bytes(), &file()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::SidecarParse);
    }

    #[test]
    fn test_sidecar_file_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.jpg.xmp");
        std::fs::write(&path, ELEMENT_XMP).unwrap();
        let record = read_sidecar_file(&path, &file()).unwrap();
        assert!(matches!(record, SidecarRecord::Asset(md) if md.rating == 5));
    }
}
