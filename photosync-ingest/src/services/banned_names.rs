//! Banned file name patterns
//!
//! Patterns are shell-like globs compiled to case-insensitive regexes:
//! - `*` and `?` never cross a `/`
//! - a leading `/` anchors the pattern at the start of a path component
//! - `[...]` classes match either case of their letters
//! - `\` escapes the next character

use photosync_common::{Error, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Default patterns for NAS thumbnails and OS droppings
pub const DEFAULT_BANNED: &[&str] = &[
    "@eaDir/",
    "@__thumb/",
    "SYNOFILE_THUMB_*.*",
    "Lightroom Catalog/",
    "thumbnails/",
    ".DS_Store",
    "._*.*",
    ".photostructure/",
];

/// List of compiled ban patterns
#[derive(Debug, Clone, Default)]
pub struct BannedNames {
    patterns: Vec<String>,
    regexes: Vec<Regex>,
}

impl BannedNames {
    /// Compile a list of patterns
    ///
    /// # Returns
    /// `Error::InvalidInput` for an unbalanced `[` or a pattern that does not compile
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = Self::default();
        for pattern in patterns {
            list.push(pattern.as_ref())?;
        }
        Ok(list)
    }

    pub fn defaults() -> Self {
        let mut list = Self::default();
        for pattern in DEFAULT_BANNED {
            if let Ok(re) = pattern_to_regex(pattern) {
                list.patterns.push(pattern.to_string());
                list.regexes.push(re);
            }
        }
        list
    }

    /// Add one pattern, empty patterns are ignored
    pub fn push(&mut self, pattern: &str) -> Result<()> {
        if pattern.is_empty() {
            return Ok(());
        }
        let re = pattern_to_regex(pattern)?;
        self.patterns.push(pattern.to_string());
        self.regexes.push(re);
        Ok(())
    }

    /// Whether a slash-delimited path matches any pattern
    pub fn is_match(&self, path: &str) -> bool {
        let path = path.replace('\\', "/");
        self.regexes.iter().any(|re| re.is_match(&path))
    }

    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl FromStr for BannedNames {
    type Err = Error;

    /// Comma-separated list
    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.split(',').map(str::trim))
    }
}

impl fmt::Display for BannedNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quoted: Vec<String> = self.patterns.iter().map(|p| format!("'{}'", p)).collect();
        f.write_str(&quoted.join(", "))
    }
}

fn pattern_to_regex(pattern: &str) -> Result<Regex> {
    let invalid = || Error::InvalidInput(format!("invalid file name pattern: {}", pattern));
    let mut re = String::from("(?i)");
    let mut chars = pattern.chars().peekable();
    let mut first = true;

    while let Some(c) = chars.next() {
        match c {
            '/' if first => re.push_str("(^|/)"),
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '\\' => {
                let escaped = chars.next().ok_or_else(invalid)?;
                re.push_str(&regex::escape(&escaped.to_string()));
            }
            '[' => {
                re.push('[');
                let mut closed = false;
                for b in chars.by_ref() {
                    if b == ']' {
                        re.push(']');
                        closed = true;
                        break;
                    }
                    let lower: String = b.to_lowercase().collect();
                    let upper: String = b.to_uppercase().collect();
                    re.push_str(&lower);
                    if lower != upper {
                        re.push_str(&upper);
                    }
                }
                if !closed {
                    return Err(invalid());
                }
            }
            _ => re.push_str(&regex::escape(&c.to_string())),
        }
        first = false;
    }

    Regex::new(&re).map_err(|_| invalid())
}
