//! Tag batching against the in-memory server

mod helpers;

use helpers::{Call, FakeServer};
use photosync_common::EventRecorder;
use photosync_ingest::services::{BulkTagger, ServerClient};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;

fn tagger(server: &Arc<FakeServer>, batch: usize) -> Arc<BulkTagger> {
    let client: Arc<dyn ServerClient> = server.clone();
    Arc::new(BulkTagger::new(
        client,
        Arc::new(EventRecorder::default()),
        batch,
    ))
}

/// Asset ids sent per tag id
fn coverage(server: &FakeServer) -> BTreeMap<String, Vec<String>> {
    let mut by_tag: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for call in server.calls() {
        if let Call::BulkTag(tag_ids, asset_ids) = call {
            for tag_id in tag_ids {
                by_tag.entry(tag_id).or_default().extend(asset_ids.iter().cloned());
            }
        }
    }
    by_tag
}

#[tokio::test]
async fn test_every_kth_asset_tagged() {
    let server = Arc::new(FakeServer::new());
    let tagger = tagger(&server, 64);

    let mut tasks = JoinSet::new();
    for worker in 0..4u32 {
        let tagger = tagger.clone();
        tasks.spawn(async move {
            for i in (1..=1000u32).filter(|i| i % 4 == worker) {
                for k in 1..=5u32 {
                    if i % k == 0 {
                        tagger
                            .add(&format!("tag{}", k), &format!("asset-{}", i))
                            .await
                            .unwrap();
                    }
                }
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }
    tagger.close().await;

    let upserts: Vec<Vec<String>> = server
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::UpsertTags(values) => Some(values),
            _ => None,
        })
        .collect();
    assert_eq!(upserts.len(), 5);
    let values: HashSet<String> = upserts.into_iter().flatten().collect();
    assert_eq!(values.len(), 5);

    let by_tag = coverage(&server);
    let mut sizes: Vec<usize> = by_tag.values().map(Vec::len).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![200, 250, 333, 500, 1000]);
    for ids in by_tag.values() {
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }
}

#[tokio::test]
async fn test_repeated_adds_are_sent_once() {
    let server = Arc::new(FakeServer::new());
    let tagger = tagger(&server, 2);

    for _ in 0..3 {
        tagger.add("holiday", "asset-1").await.unwrap();
        tagger.add("holiday", "asset-2").await.unwrap();
        tagger.add("holiday", "asset-3").await.unwrap();
    }
    tagger.close().await;

    let ids: Vec<String> = coverage(&server).into_values().flatten().collect();
    assert_eq!(ids.len(), 3);
    let bulk_calls = server
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::BulkTag(..)))
        .count();
    assert_eq!(bulk_calls, 2);
}

#[tokio::test]
async fn test_add_after_close_fails() {
    let server = Arc::new(FakeServer::new());
    let tagger = tagger(&server, 10);
    tagger.close().await;
    tagger.close().await;

    assert!(tagger.add("holiday", "asset-1").await.is_err());
    assert!(server.calls().is_empty());
}
