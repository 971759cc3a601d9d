//! Batched asset tagging
//!
//! Adds are serialised through one consumer task behind a channel. The
//! consumer upserts each tag value once, caches its id, and hands every full
//! batch of asset ids to a background bulk-tag call. `close` flushes the
//! remaining batches and waits for all background calls.

use crate::error::{IngestError, Result};
use crate::services::server_client::ServerClient;
use photosync_common::{EventCode, EventRecorder};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

/// Asset ids per bulk-tag call
pub const DEFAULT_TAG_BATCH: usize = 100;

const TAGGER_BUFFER: usize = 1000;

struct TagRequest {
    value: String,
    asset_id: String,
}

struct TaggerWorker {
    client: Arc<dyn ServerClient>,
    recorder: Arc<EventRecorder>,
    batch: usize,
    tag_ids: HashMap<String, String>,
    seen: HashMap<String, HashSet<String>>,
    pending: HashMap<String, Vec<String>>,
    calls: JoinSet<()>,
}

impl TaggerWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<TagRequest>) {
        while let Some(request) = rx.recv().await {
            self.add(request).await;
        }

        let mut values: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(v, _)| v.clone())
            .collect();
        values.sort();
        for value in values {
            self.flush(&value).await;
        }

        while let Some(result) = self.calls.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Tagging task failed");
            }
        }
    }

    async fn add(&mut self, request: TagRequest) {
        let novel = self
            .seen
            .entry(request.value.clone())
            .or_default()
            .insert(request.asset_id.clone());
        if !novel {
            return;
        }
        let pending = self.pending.entry(request.value.clone()).or_default();
        pending.push(request.asset_id);
        if pending.len() >= self.batch {
            self.flush(&request.value).await;
        }
    }

    async fn tag_id(&mut self, value: &str) -> Result<String> {
        if let Some(id) = self.tag_ids.get(value) {
            return Ok(id.clone());
        }
        let tags = self.client.upsert_tags(&[value.to_string()]).await?;
        let tag = tags
            .into_iter()
            .find(|t| t.value == value)
            .ok_or_else(|| IngestError::Server {
                status: 0,
                message: format!("tag {:?} missing from upsert answer", value),
            })?;
        debug!(tag = %value, id = %tag.id, "Tag ready");
        self.tag_ids.insert(value.to_string(), tag.id.clone());
        Ok(tag.id)
    }

    /// Submit the pending ids of one tag in the background
    ///
    /// When the tag can't be created the ids stay pending for the next flush.
    async fn flush(&mut self, value: &str) {
        let tag_id = match self.tag_id(value).await {
            Ok(id) => id,
            Err(e) => {
                self.recorder.record(
                    EventCode::ErrorServerError,
                    None,
                    &[("tag", value), ("error", &e.to_string())],
                );
                return;
            }
        };
        let ids = match self.pending.get_mut(value) {
            Some(ids) if !ids.is_empty() => std::mem::take(ids),
            _ => return,
        };

        let client = self.client.clone();
        let recorder = self.recorder.clone();
        let value = value.to_string();
        self.calls.spawn(async move {
            debug!(tag = %value, count = ids.len(), "Tagging assets");
            if let Err(e) = client.bulk_tag_assets(&[tag_id], &ids).await {
                recorder.record(
                    EventCode::ErrorServerError,
                    None,
                    &[("tag", &value), ("error", &e.to_string())],
                );
            }
        });
    }
}

/// Handle on the tagging consumer
pub struct BulkTagger {
    tx: Mutex<Option<mpsc::Sender<TagRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BulkTagger {
    /// Start the consumer task
    ///
    /// # Arguments
    /// * `client` - Server client used for upserts and bulk tagging
    /// * `recorder` - Receives the errors of background calls
    /// * `batch` - Asset ids per bulk-tag call
    pub fn new(client: Arc<dyn ServerClient>, recorder: Arc<EventRecorder>, batch: usize) -> Self {
        let (tx, rx) = mpsc::channel(TAGGER_BUFFER);
        let worker = TaggerWorker {
            client,
            recorder,
            batch: batch.max(1),
            tag_ids: HashMap::new(),
            seen: HashMap::new(),
            pending: HashMap::new(),
            calls: JoinSet::new(),
        };
        let handle = tokio::spawn(worker.run(rx));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<TagRequest>> {
        match self.tx.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Queue `asset_id` for tagging with `value`
    pub async fn add(&self, value: &str, asset_id: &str) -> Result<()> {
        let tx = self
            .sender()
            .ok_or_else(|| IngestError::Invariant("tagger used after close".to_string()))?;
        tx.send(TagRequest {
            value: value.to_string(),
            asset_id: asset_id.to_string(),
        })
        .await
        .map_err(|_| IngestError::Invariant("tagger stopped".to_string()))
    }

    /// Flush everything and wait for the background calls. Idempotent.
    pub async fn close(&self) {
        let tx = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(tx);
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Tagger task failed");
            }
        }
    }
}
