use midilib_config::FileManagerConfig;
use midilib_core::{EventBus, FileError};
use midilib_files::{commands, FileService, MemoryBackend, ScanSource, UploadRequest};
use midilib_types::{FileDescriptor, FileEvent, Message, MidiEvent, MidiPayload, MidiTrack};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_test::{assert_err, assert_ok};

const A: &str = "/midi/moonlight.mid";
const B: &str = "/midi/clair_de_lune.midi";
const C: &str = "/midi/take_five.mid";

fn payload() -> MidiPayload {
    MidiPayload::new(1, 480).with_track(MidiTrack {
        name: Some("Piano".to_string()),
        channel: Some(0),
        events: vec![MidiEvent::note_on(0, 60, 100), MidiEvent::note_on(480, 64, 90)],
    })
}

fn payload_size() -> u64 {
    serde_json::to_vec(&payload()).unwrap().len() as u64
}

async fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .insert(
            FileDescriptor::new(A, "Moonlight.mid", A, 1024).with_tag("piano"),
            payload(),
        )
        .await;
    backend
        .insert(
            FileDescriptor::new(B, "Clair de Lune.midi", B, 2048)
                .with_tag("Piano")
                .with_tag("impressionist"),
            payload(),
        )
        .await;
    backend
        .insert(FileDescriptor::new(C, "Take Five.mid", C, 512), payload())
        .await;
    backend
}

fn service(
    config: FileManagerConfig,
    backend: &Arc<MemoryBackend>,
) -> (Arc<FileService>, broadcast::Receiver<Message>) {
    let bus = Arc::new(EventBus::default());
    let rx = bus.subscribe();
    let service = FileService::new(config, backend.clone(), bus).unwrap();
    (Arc::new(service), rx)
}

fn drain(rx: &mut broadcast::Receiver<Message>) -> Vec<FileEvent> {
    let mut events = Vec::new();
    while let Ok(message) = rx.try_recv() {
        events.push(message.event);
    }
    events
}

fn ids(files: &[FileDescriptor]) -> HashSet<String> {
    files.iter().map(|f| f.id.clone()).collect()
}

#[tokio::test]
async fn test_scan_populates_indices() {
    let backend = seeded_backend().await;
    let (service, mut rx) = service(FileManagerConfig::default(), &backend);

    let outcome = service.scan(false).await.unwrap();

    assert_eq!(outcome.source, ScanSource::Backend);
    assert_eq!(outcome.files.len(), 3);
    assert_eq!(ids(&service.search("").await), ids(&outcome.files));
    assert!(service.last_scan_at().await.is_some());

    let events = drain(&mut rx);
    assert_eq!(events[0], FileEvent::ScanStarted);
    assert!(matches!(&events[1], FileEvent::ScanCompleted { files, .. } if files.len() == 3));
}

#[tokio::test]
async fn test_search_is_case_insensitive() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();

    let hits = ids(&service.search("PIANO").await);
    let expected: HashSet<String> = [A, B].iter().map(|s| s.to_string()).collect();
    assert_eq!(hits, expected);
    assert!(service.search("rachmaninoff").await.is_empty());
}

#[tokio::test]
async fn test_fresh_metadata_skips_backend() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);

    service.scan(false).await.unwrap();
    let second = service.scan(false).await.unwrap();

    assert_eq!(second.source, ScanSource::Cache);
    assert_eq!(second.files.len(), 3);
    assert_eq!(backend.call_count(commands::LIST), 1);

    let forced = service.scan(true).await.unwrap();
    assert_eq!(forced.source, ScanSource::Backend);
    assert_eq!(backend.call_count(commands::LIST), 2);
}

#[tokio::test]
async fn test_expired_metadata_rescans() {
    let backend = seeded_backend().await;
    let mut config = FileManagerConfig::default();
    config.cache.metadata_expiration_ms = 20;
    let (service, _rx) = service(config, &backend);

    service.scan(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let outcome = service.scan(false).await.unwrap();

    assert_eq!(outcome.source, ScanSource::Backend);
    assert_eq!(backend.call_count(commands::LIST), 2);
}

#[tokio::test]
async fn test_concurrent_scans_issue_one_backend_call() {
    let backend = Arc::new(MemoryBackend::new().with_latency(Duration::from_millis(100)));
    backend
        .insert(FileDescriptor::new(A, "Moonlight.mid", A, 1024), payload())
        .await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);

    let (first, second) = tokio::join!(service.scan(true), service.scan(true));
    let mut sources = vec![first.unwrap().source, second.unwrap().source];
    sources.sort_by_key(|s| *s == ScanSource::InFlight);

    assert_eq!(sources, vec![ScanSource::Backend, ScanSource::InFlight]);
    assert_eq!(backend.call_count(commands::LIST), 1);
    assert!(!service.is_scan_in_flight());
}

#[tokio::test]
async fn test_offline_scan_returns_last_known_list() {
    let backend = seeded_backend().await;
    let (service, mut rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();
    drain(&mut rx);

    backend.set_offline(true);
    let outcome = service.scan(true).await.unwrap();

    assert_eq!(outcome.source, ScanSource::Offline);
    assert_eq!(outcome.files.len(), 3);
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, FileEvent::ScanFailed { offline: true, .. })));
}

#[tokio::test]
async fn test_failed_scan_keeps_index() {
    let backend = seeded_backend().await;
    let (service, mut rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();
    drain(&mut rx);

    backend.fail_command(commands::LIST);
    let err = service.scan(true).await.unwrap_err();

    assert!(matches!(err, FileError::Backend { .. }));
    assert_eq!(service.files().await.len(), 3);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, FileEvent::ScanFailed { offline: false, .. })));
}

#[tokio::test]
async fn test_load_miss_then_hit() {
    let backend = seeded_backend().await;
    let (service, mut rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();
    drain(&mut rx);

    let first = service.load(A).await.unwrap();
    assert!(!first.from_cache);
    assert!(first.cached);
    assert_eq!(*first.payload, payload());

    let second = service.load(A).await.unwrap();
    assert!(second.from_cache);
    assert!(Arc::ptr_eq(&first.payload, &second.payload));
    assert_eq!(backend.call_count(commands::READ), 1);

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            FileEvent::FileLoaded { id: A.to_string(), from_cache: false },
            FileEvent::FileLoaded { id: A.to_string(), from_cache: true },
        ]
    );

    let stats = service.cache_stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entries, 1);
}

#[tokio::test]
async fn test_load_unknown_file_is_not_found() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();

    let err = assert_err!(service.load("/midi/missing.mid").await);

    assert!(matches!(err, FileError::NotFound(_)));
    assert_eq!(backend.call_count(commands::READ), 0);
}

#[tokio::test]
async fn test_offline_load_serves_cache_only() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();
    service.load(A).await.unwrap();

    backend.set_offline(true);

    assert!(service.load(A).await.unwrap().from_cache);
    let err = service.load(B).await.unwrap_err();
    assert!(err.is_offline());
}

#[tokio::test]
async fn test_cache_budget_evicts_least_recently_used() {
    let backend = seeded_backend().await;
    let size = payload_size();
    let mut config = FileManagerConfig::default();
    config.cache.max_cache_bytes = size * 2 + size / 2;
    let (service, _rx) = service(config, &backend);
    service.scan(false).await.unwrap();

    service.load(A).await.unwrap();
    service.load(B).await.unwrap();
    service.load(A).await.unwrap();
    service.load(C).await.unwrap();

    assert!(service.is_cached(A).await);
    assert!(!service.is_cached(B).await);
    assert!(service.is_cached(C).await);

    let stats = service.cache_stats().await;
    assert!(stats.current_bytes <= stats.max_bytes);
    assert_eq!(stats.evictions, 1);
}

#[tokio::test]
async fn test_oversized_payload_is_returned_but_not_cached() {
    let backend = seeded_backend().await;
    let mut config = FileManagerConfig::default();
    config.cache.max_cache_bytes = payload_size() - 1;
    let (service, _rx) = service(config, &backend);
    service.scan(false).await.unwrap();

    let loaded = service.load(A).await.unwrap();

    assert!(!loaded.cached);
    assert_eq!(*loaded.payload, payload());
    assert!(service.cached_payload(A).await.is_none());
    assert_eq!(service.cache_stats().await.rejections, 1);
}

#[tokio::test]
async fn test_upload_rejects_disallowed_extension() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);

    let err = service
        .upload(UploadRequest::new("song.txt", b"hello".to_vec()))
        .await
        .unwrap_err();

    assert!(matches!(err, FileError::Validation(_)));
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_upload_rejects_empty_and_oversized() {
    let backend = seeded_backend().await;
    let mut config = FileManagerConfig::default();
    config.upload.max_file_size = 8;
    let (service, _rx) = service(config, &backend);

    let empty = service
        .upload(UploadRequest::new("empty.mid", Vec::new()))
        .await
        .unwrap_err();
    let oversized = service
        .upload(UploadRequest::new("big.mid", vec![0u8; 9]))
        .await
        .unwrap_err();
    let nested = service
        .upload(UploadRequest::new("../escape.mid", b"MThd".to_vec()))
        .await
        .unwrap_err();

    assert!(matches!(empty, FileError::Validation(_)));
    assert!(matches!(oversized, FileError::Validation(_)));
    assert!(matches!(nested, FileError::Validation(_)));
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_upload_refreshes_file_list() {
    let backend = seeded_backend().await;
    let (service, mut rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();
    drain(&mut rx);

    let content = serde_json::to_vec(&payload()).unwrap();
    let descriptor = service
        .upload(UploadRequest::new("NEW SONG.MID", content))
        .await
        .unwrap();

    assert_eq!(descriptor.id, "/midi/NEW SONG.MID");
    assert_eq!(service.files().await.len(), 4);
    assert_eq!(backend.call_count(commands::WRITE), 1);
    assert_eq!(backend.call_count(commands::LIST), 2);

    let events = drain(&mut rx);
    assert!(matches!(&events[0], FileEvent::FileUploadComplete { descriptor } if descriptor.name == "NEW SONG.MID"));
    assert!(events
        .iter()
        .any(|e| matches!(e, FileEvent::ScanCompleted { files, .. } if files.len() == 4)));

    let loaded = service.load(&descriptor.id).await.unwrap();
    assert_eq!(*loaded.payload, payload());
}

#[tokio::test]
async fn test_upload_succeeds_even_if_refresh_fails() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);
    backend.fail_command(commands::LIST);

    assert_ok!(
        service
            .upload(UploadRequest::new("late.midi", b"MThd".to_vec()))
            .await
    );
    assert_eq!(backend.call_count(commands::LIST), 1);
}

#[tokio::test]
async fn test_upload_overwrite_replaces_cached_payload() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();

    let before = service.load(A).await.unwrap();
    assert_eq!(before.payload.header.ticks_per_beat, 480);
    assert!(service.is_cached(A).await);

    let content = serde_json::to_vec(&MidiPayload::new(0, 96)).unwrap();
    let descriptor = assert_ok!(
        service
            .upload(UploadRequest::new("moonlight.mid", content))
            .await
    );
    assert_eq!(descriptor.id, A);
    assert!(!service.is_cached(A).await);

    let after = service.load(A).await.unwrap();
    assert!(!after.from_cache);
    assert_eq!(after.payload.header.ticks_per_beat, 96);
    assert_eq!(backend.call_count(commands::READ), 2);
}

#[tokio::test]
async fn test_delete_clears_all_structures() {
    let backend = seeded_backend().await;
    let (service, mut rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();
    service.load(A).await.unwrap();
    drain(&mut rx);

    assert!(service.delete(A).await.unwrap());

    assert!(!ids(&service.files().await).contains(A));
    assert!(!ids(&service.search("moonlight").await).contains(A));
    assert!(!service.is_cached(A).await);
    assert_eq!(backend.file_count().await, 2);
    assert_eq!(
        drain(&mut rx),
        vec![FileEvent::FileDeleted { id: A.to_string() }]
    );
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let backend = seeded_backend().await;
    let (service, mut rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();
    drain(&mut rx);

    assert!(!assert_ok!(service.delete("/midi/never-existed.mid").await));
    assert!(assert_ok!(service.delete(B).await));
    assert!(!assert_ok!(service.delete(B).await));

    assert_eq!(backend.call_count(commands::DELETE), 1);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_concurrent_deletes_remove_once() {
    let backend = Arc::new(MemoryBackend::new().with_latency(Duration::from_millis(50)));
    backend
        .insert(FileDescriptor::new(A, "Moonlight.mid", A, 1024), payload())
        .await;
    let (service, mut rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();
    drain(&mut rx);

    let (first, second) = tokio::join!(service.delete(A), service.delete(A));
    let mut results = vec![first.unwrap(), second.unwrap()];
    results.sort();

    assert_eq!(results, vec![false, true]);
    assert!(service.files().await.is_empty());
    assert_eq!(
        drain(&mut rx),
        vec![FileEvent::FileDeleted { id: A.to_string() }]
    );
}

#[tokio::test]
async fn test_delete_of_file_gone_on_backend_succeeds() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();

    backend.remove_silently(C).await;

    assert!(service.delete(C).await.unwrap());
    assert!(!ids(&service.files().await).contains(C));
}

#[tokio::test]
async fn test_failed_delete_keeps_file() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();
    service.load(A).await.unwrap();

    backend.fail_command(commands::DELETE);
    let err = service.delete(A).await.unwrap_err();

    assert!(matches!(err, FileError::Backend { .. }));
    assert!(ids(&service.files().await).contains(A));
    assert!(service.is_cached(A).await);
}

#[tokio::test]
async fn test_rescan_purges_cache_of_vanished_files() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);
    service.scan(false).await.unwrap();
    service.load(A).await.unwrap();
    service.load(B).await.unwrap();

    backend.remove_silently(A).await;
    service.scan(true).await.unwrap();

    assert!(!service.is_cached(A).await);
    assert!(service.is_cached(B).await);
}

#[tokio::test]
async fn test_get_info_prefers_index() {
    let backend = seeded_backend().await;
    let (service, _rx) = service(FileManagerConfig::default(), &backend);

    let info = service.get_info(A).await.unwrap();
    assert_eq!(info.name, "Moonlight.mid");
    assert_eq!(backend.call_count(commands::GET_INFO), 1);
    assert!(service.files().await.is_empty());

    service.scan(false).await.unwrap();
    service.get_info(A).await.unwrap();
    assert_eq!(backend.call_count(commands::GET_INFO), 1);

    let err = service.get_info("/midi/missing.mid").await.unwrap_err();
    assert!(matches!(err, FileError::NotFound(_)));
}

#[tokio::test]
async fn test_periodic_sweep_removes_expired_entries() {
    let backend = seeded_backend().await;
    let mut config = FileManagerConfig::default();
    config.cache.ttl_ms = 50;
    config.cache.sweep_interval_ms = 20;
    let (service, mut rx) = service(config, &backend);
    service.scan(false).await.unwrap();
    service.start().await;

    service.load(A).await.unwrap();
    assert!(service.is_cached(A).await);

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!service.is_cached(A).await);
    assert_eq!(service.cache_stats().await.expirations, 1);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, FileEvent::CacheSwept { removed: 1 })));

    service.dispose().await;
}

#[tokio::test]
async fn test_auto_refresh_rescans() {
    let backend = seeded_backend().await;
    let mut config = FileManagerConfig::default();
    config.refresh.auto_refresh_ms = Some(30);
    config.cache.metadata_expiration_ms = 1;
    let (service, _rx) = service(config, &backend);

    service.start().await;
    assert_eq!(service.running_tasks().await, 2);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(backend.call_count(commands::LIST) >= 2);
    assert_eq!(service.files().await.len(), 3);

    service.dispose().await;
}

#[tokio::test]
async fn test_dispose_stops_tasks_and_clears_catalog() {
    let backend = seeded_backend().await;
    let mut config = FileManagerConfig::default();
    config.refresh.auto_refresh_ms = Some(20);
    config.cache.metadata_expiration_ms = 1;
    let (service, _rx) = service(config, &backend);
    service.scan(false).await.unwrap();
    service.load(A).await.unwrap();

    service.start().await;
    // 重复启动不会叠加任务
    service.start().await;
    assert_eq!(service.running_tasks().await, 2);

    service.dispose().await;

    assert_eq!(service.running_tasks().await, 0);
    assert!(service.files().await.is_empty());
    assert_eq!(service.cache_stats().await.entries, 0);

    let calls = backend.call_count(commands::LIST);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.call_count(commands::LIST), calls);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let backend = seeded_backend().await;
    let mut config = FileManagerConfig::default();
    config.cache.max_cache_bytes = 0;

    let result = FileService::new(config, backend, Arc::new(EventBus::default()));

    assert!(matches!(result, Err(FileError::Config(_))));
}

#[tokio::test]
async fn test_events_without_subscribers_are_fine() {
    let backend = seeded_backend().await;
    let service = FileService::new(
        FileManagerConfig::default(),
        backend.clone(),
        Arc::new(EventBus::default()),
    )
    .unwrap();

    service.scan(false).await.unwrap();
    service.load(A).await.unwrap();
    assert!(service.delete(A).await.unwrap());
}
