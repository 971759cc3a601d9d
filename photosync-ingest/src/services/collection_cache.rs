//! Write-back cache for collection memberships
//!
//! Each key (an album title) holds its collection, every id ever seen for
//! it, and the ids waiting to be saved. Adds for one key are serialised by
//! that key's lock; different keys proceed in parallel.

use crate::error::{IngestError, Result};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Default number of pending ids that triggers a save
pub const DEFAULT_MAX_BATCH: usize = 50;

/// Persist a collection with new member ids, returning the saved collection
pub type SaveFn<C> = Arc<dyn Fn(C, Vec<String>) -> BoxFuture<'static, Result<C>> + Send + Sync>;

struct Entry<C> {
    collection: C,
    seen: HashSet<String>,
    pending: Vec<String>,
}

pub struct CollectionCache<C> {
    entries: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Entry<C>>>>>,
    save: SaveFn<C>,
    max_batch: usize,
}

impl<C: Clone + Send + 'static> CollectionCache<C> {
    /// Create a cache
    ///
    /// # Arguments
    /// * `max_batch` - Pending ids that trigger a save (at least 1)
    /// * `save` - Callback persisting a collection and its new ids
    pub fn new(max_batch: usize, save: SaveFn<C>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            save,
            max_batch: max_batch.max(1),
        }
    }

    fn entry(&self, key: &str, collection: C) -> Arc<tokio::sync::Mutex<Entry<C>>> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(tokio::sync::Mutex::new(Entry {
                    collection,
                    seen: HashSet::new(),
                    pending: Vec::new(),
                }))
            })
            .clone()
    }

    fn snapshot(&self) -> Vec<(String, Arc<tokio::sync::Mutex<Entry<C>>>)> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut list: Vec<_> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    /// Register a collection already on the server with its members
    ///
    /// The ids are marked as seen and never sent again.
    pub async fn new_collection<I>(&self, key: &str, collection: C, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let entry = self.entry(key, collection.clone());
        let mut entry = entry.lock().await;
        entry.collection = collection;
        entry.seen.extend(ids);
    }

    /// Add an id to a collection
    ///
    /// # Returns
    /// `true` when the id is new for this key. A save failure is returned as
    /// an error; the ids stay pending and the next save retries them.
    pub async fn add(&self, key: &str, collection: C, id: &str) -> Result<bool> {
        let entry = self.entry(key, collection);
        let mut entry = entry.lock().await;
        if !entry.seen.insert(id.to_string()) {
            return Ok(false);
        }
        entry.pending.push(id.to_string());
        if entry.pending.len() >= self.max_batch {
            self.flush(key, &mut entry).await?;
        }
        Ok(true)
    }

    async fn flush(&self, key: &str, entry: &mut Entry<C>) -> Result<()> {
        if entry.pending.is_empty() {
            return Ok(());
        }
        let ids = entry.pending.clone();
        debug!(collection = %key, count = ids.len(), "Saving collection");
        let saved = (self.save)(entry.collection.clone(), ids).await?;
        entry.collection = saved;
        entry.pending.clear();
        Ok(())
    }

    pub async fn get_collection(&self, key: &str) -> Option<C> {
        let entry = {
            let entries = match self.entries.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            entries.get(key).cloned()
        }?;
        let entry = entry.lock().await;
        Some(entry.collection.clone())
    }

    /// Ids waiting to be saved, all keys together
    pub async fn pending_count(&self) -> usize {
        let mut total = 0;
        for (_, entry) in self.snapshot() {
            total += entry.lock().await.pending.len();
        }
        total
    }

    /// Save every collection with pending ids
    ///
    /// All keys are attempted; the failures are joined.
    pub async fn close(&self) -> Result<()> {
        let mut errors = Vec::new();
        for (key, entry) in self.snapshot() {
            let mut entry = entry.lock().await;
            if let Err(e) = self.flush(&key, &mut entry).await {
                warn!(collection = %key, error = %e, "Collection save failed");
                errors.push(e);
            }
        }
        match IngestError::join(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
