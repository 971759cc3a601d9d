//! Event recording for photosync runs
//!
//! Provides the event taxonomy and the `EventRecorder`, a counter table plus a
//! broadcast channel that observers (progress UI, log sinks, tests) subscribe to.

mod codes;

pub use codes::{EventCode, EventSection};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Reference to a file inside a named file system (folder root, zip, server)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileRef {
    /// File system name, empty for the local disk
    pub fs: String,
    /// Logical name within the file system
    pub name: String,
}

impl FileRef {
    pub fn new(fs: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            fs: fs.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fs.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.fs, self.name)
        }
    }
}

/// One recorded decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEvent {
    pub code: EventCode,
    pub file: Option<FileRef>,
    pub details: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

/// Counter table and event fan-out shared by every stage of a run
///
/// Counters are lock-free and readable while the run is in progress.
/// Subscribers receive every event recorded after they subscribed.
pub struct EventRecorder {
    counts: Vec<AtomicU64>,
    tx: broadcast::Sender<IngestEvent>,
}

impl EventRecorder {
    /// Creates a recorder whose broadcast channel buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            counts: (0..EventCode::COUNT).map(|_| AtomicU64::new(0)).collect(),
            tx,
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.tx.subscribe()
    }

    /// Record an event: bump its counter, mirror it to the log, and publish it
    ///
    /// # Arguments
    /// * `code` - Event code
    /// * `file` - File the event is about, if any
    /// * `details` - Key/value pairs attached to the event (`reason`, `error`, ...)
    pub fn record(&self, code: EventCode, file: Option<&FileRef>, details: &[(&str, &str)]) {
        self.counts[code.index()].fetch_add(1, Ordering::Relaxed);

        let file_name = file.map(|f| f.to_string()).unwrap_or_default();
        let rendered = details
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        let has_error = details.iter().any(|(k, _)| *k == "error");

        if code.is_error() || has_error {
            tracing::error!(event = %code, file = %file_name, details = %rendered, "Ingest event");
        } else if code.is_discard() {
            tracing::debug!(event = %code, file = %file_name, details = %rendered, "Ingest event");
        } else {
            tracing::info!(event = %code, file = %file_name, details = %rendered, "Ingest event");
        }

        let _ = self.tx.send(IngestEvent {
            code,
            file: file.cloned(),
            details: details
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            timestamp: Utc::now(),
        });
    }

    /// Current value of one counter
    pub fn count(&self, code: EventCode) -> u64 {
        self.counts[code.index()].load(Ordering::Relaxed)
    }

    /// Snapshot of every counter, in report order
    pub fn counts(&self) -> Vec<(EventCode, u64)> {
        EventCode::ALL.iter().map(|c| (*c, self.count(*c))).collect()
    }

    /// Number of media files discovered so far
    pub fn total_assets(&self) -> u64 {
        self.count(EventCode::DiscoveredImage) + self.count(EventCode::DiscoveredVideo)
    }

    /// Sum of all error counters
    pub fn error_count(&self) -> u64 {
        EventCode::ALL
            .iter()
            .filter(|c| c.is_error())
            .map(|c| self.count(*c))
            .sum()
    }

    /// Whether any error event was recorded
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// End-of-run report with an input analysis and an uploading section
    ///
    /// Zero counters are omitted, except error counters which are always listed.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (title, section) in [
            ("Input analysis", EventSection::InputAnalysis),
            ("Uploading", EventSection::Uploading),
        ] {
            out.push_str(title);
            out.push_str(":\n");
            out.push_str(&"-".repeat(40));
            out.push('\n');
            for code in EventCode::ALL.iter().filter(|c| c.section() == section) {
                let value = self.count(*code);
                if value > 0 || code.is_error() {
                    out.push_str(&format!("{:<32}: {:>7}\n", code.label(), value));
                }
            }
            out.push('\n');
        }
        out
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new(1000)
    }
}
