//! End-to-end upload scenarios against the in-memory server

mod helpers;

use helpers::{asset, coordinator, july_7th, options, Call, EndlessSource, FakeServer, MemorySource};
use photosync_common::EventCode;
use photosync_ingest::models::{Album, Group, Grouping, ServerAsset};
use photosync_ingest::services::folder_source::{FolderOptions, FolderSource};
use photosync_ingest::services::group_filters::{BurstPolicy, GroupFilters};
use photosync_ingest::services::UploadOptions;
use photosync_ingest::IngestError;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn server_copy_of_img_0001(size: i64) -> ServerAsset {
    ServerAsset {
        id: "srv-1".into(),
        original_file_name: "IMG_0001.jpg".into(),
        file_size: size,
        capture_date: Some(july_7th()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_new_asset_is_uploaded() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("IMG_0001.jpg"), vec![0xFFu8; 120645]).unwrap();
    std::fs::write(
        dir.path().join("IMG_0001.jpg.xmp"),
        r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF>
  <rdf:Description>
   <exif:DateTimeOriginal>2024-07-07T13:31:46Z</exif:DateTimeOriginal>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>"#,
    )
    .unwrap();

    let server = Arc::new(FakeServer::new());
    let coord = coordinator(&server, options(2));
    let source = Arc::new(FolderSource::new(
        FolderOptions {
            roots: vec![dir.path().to_path_buf()],
            ..Default::default()
        },
        helpers::analyser(),
        coord.recorder().clone(),
    ));

    coord.clone().run(CancellationToken::new(), source).await.unwrap();

    assert_eq!(server.calls(), vec![Call::Upload("IMG_0001.jpg".into())]);
    let indexed = coord.index().get_by_id("srv-1").await.unwrap();
    assert_eq!(indexed.file_size, 120645);
    assert_eq!(indexed.capture_date, Some(july_7th()));

    let recorder = coord.recorder();
    assert_eq!(recorder.count(EventCode::DiscoveredImage), 1);
    assert_eq!(recorder.count(EventCode::DiscoveredSidecar), 1);
    assert_eq!(recorder.count(EventCode::ProcessedAssociatedMetadata), 1);
    assert_eq!(recorder.count(EventCode::ProcessedUploaded), 1);
    assert_eq!(recorder.count(EventCode::ErrorServerError), 0);
}

#[tokio::test]
async fn test_exact_duplicate_is_not_uploaded() {
    let server = Arc::new(FakeServer::new().with_asset(server_copy_of_img_0001(120645)));
    let coord = coordinator(&server, options(2));
    let source = MemorySource::new(vec![Group::single(asset(
        "IMG_0001.jpg",
        120645,
        Some(july_7th()),
    ))]);

    coord.clone().run(CancellationToken::new(), source).await.unwrap();

    assert_eq!(server.upload_count(), 0);
    let recorder = coord.recorder();
    assert_eq!(recorder.count(EventCode::ProcessedUploaded), 0);
    assert_eq!(recorder.count(EventCode::DiscardedServerDuplicate), 1);
}

#[tokio::test]
async fn test_smaller_server_copy_is_upgraded() {
    let server = Arc::new(FakeServer::new().with_asset(server_copy_of_img_0001(500_000)));
    let coord = coordinator(&server, options(2));
    let local_date = july_7th() + chrono::Duration::minutes(2);
    let source = MemorySource::new(vec![Group::single(asset(
        "IMG_0001.jpg",
        2_000_000,
        Some(local_date),
    ))]);

    coord.clone().run(CancellationToken::new(), source).await.unwrap();

    assert_eq!(
        server.calls(),
        vec![
            Call::Upload("IMG_0001.jpg".into()),
            Call::Copy("srv-1".into(), "srv-2".into()),
            Call::Delete(vec!["srv-1".into()], true),
        ]
    );
    assert_eq!(
        coord
            .index()
            .get_by_device_asset_id("IMG_0001.jpg-2000000")
            .await
            .as_deref(),
        Some("srv-2")
    );
    assert!(coord.index().get_by_id("srv-1").await.is_none());
    assert_eq!(coord.recorder().count(EventCode::ProcessedUploadUpgraded), 1);
}

#[tokio::test]
async fn test_burst_keeps_jpegs_and_stacks_them() {
    let server = Arc::new(FakeServer::new());
    let upload = UploadOptions {
        filters: GroupFilters {
            burst: BurstPolicy::StackKeepJpeg,
            ..Default::default()
        },
        ..options(2)
    };
    let coord = coordinator(&server, upload);
    let taken = Some(july_7th());
    let burst = Group::new(
        Grouping::Burst,
        vec![
            asset("00001IMG_00001_BURST20171111030039_COVER.jpg", 3000, taken),
            asset("00002IMG_00002_BURST20171111030039.jpg", 3100, taken),
            asset("00003IMG_00003_BURST20171111030039.dng", 9000, taken),
        ],
    );

    coord
        .clone()
        .run(CancellationToken::new(), MemorySource::new(vec![burst]))
        .await
        .unwrap();

    let stacks: Vec<Vec<String>> = server
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Stack(ids) => Some(ids),
            _ => None,
        })
        .collect();
    assert_eq!(stacks, vec![vec!["srv-1".to_string(), "srv-2".to_string()]]);

    let recorder = coord.recorder();
    assert_eq!(recorder.count(EventCode::ProcessedUploaded), 2);
    assert_eq!(recorder.count(EventCode::DiscardedFiltered), 1);
    assert_eq!(recorder.count(EventCode::ProcessedStacked), 2);
    assert!(!server.asset_names().contains("00003IMG_00003_BURST20171111030039.dng"));
}

#[tokio::test]
async fn test_album_memberships_across_parallel_groups() {
    let server = Arc::new(FakeServer::new());
    let upload = UploadOptions {
        album_batch: 3,
        ..options(4)
    };
    let coord = coordinator(&server, upload);
    let groups = (1..=10)
        .map(|i| {
            let mut a = asset(&format!("IMG_{:04}.jpg", i), 1000 + i, Some(july_7th()));
            a.add_album(Album::new("Trip"));
            Group::single(a)
        })
        .collect();

    coord
        .clone()
        .run(CancellationToken::new(), MemorySource::new(groups))
        .await
        .unwrap();

    let calls = server.calls();
    let album_calls: Vec<&Call> = calls
        .iter()
        .filter(|c| matches!(c, Call::CreateAlbum(..) | Call::AddToAlbum(..)))
        .collect();
    assert_eq!(album_calls.len(), 4);
    assert!(matches!(album_calls[0], Call::CreateAlbum(title, ids) if title == "Trip" && ids.len() == 3));
    let sizes: Vec<usize> = album_calls[1..]
        .iter()
        .map(|c| match c {
            Call::AddToAlbum(_, ids) => ids.len(),
            other => panic!("unexpected album call {:?}", other),
        })
        .collect();
    assert_eq!(sizes, vec![3, 3, 1]);

    let mut sent: Vec<String> = server.album_call_ids().into_iter().flatten().collect();
    let total = sent.len();
    sent.sort();
    sent.dedup();
    assert_eq!(sent.len(), total);
    assert_eq!(total, 10);
    assert_eq!(coord.recorder().count(EventCode::ProcessedAlbumAdded), 10);
}

#[tokio::test]
async fn test_cancellation_mid_run() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let server = Arc::new(FakeServer::new().on_upload(move |count| {
        if count == 5 {
            trigger.cancel();
        }
    }));
    let coord = coordinator(&server, options(1));

    let result = coord
        .clone()
        .run(cancel, EndlessSource::new(Some("Trip")))
        .await;

    assert!(matches!(result, Err(IngestError::Cancelled)));
    assert_eq!(server.upload_count(), 5);
    assert_eq!(coord.recorder().count(EventCode::ProcessedUploaded), 5);

    let album_ids: Vec<String> = server.album_call_ids().into_iter().flatten().collect();
    assert_eq!(album_ids.len(), 5);
    assert_eq!(server.album_member_names("Trip").len(), 5);
}
