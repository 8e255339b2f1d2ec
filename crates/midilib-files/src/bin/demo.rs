use anyhow::Result;
use midilib_config::ConfigLoader;
use midilib_core::{init_logging, EventBus};
use midilib_files::{FileService, MemoryBackend, UploadRequest};
use midilib_types::{FileDescriptor, MidiEvent, MidiPayload, MidiTrack};
use std::sync::Arc;
use tracing::info;

fn sample(notes: &[u8]) -> MidiPayload {
    let events = notes
        .iter()
        .enumerate()
        .map(|(i, note)| MidiEvent::note_on(i as u64 * 480, *note, 100))
        .collect();

    MidiPayload::new(1, 480).with_track(MidiTrack {
        name: Some("Piano".to_string()),
        channel: Some(0),
        events,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::new("config").load()?;
    init_logging(&config.logging.level, config.logging.json)?;

    info!("Starting midilib demo");

    let root = config.backend.root_path.trim_end_matches('/').to_string();
    let backend = Arc::new(MemoryBackend::new());
    for (name, notes) in [("scale.mid", &[60u8, 62, 64, 65][..]), ("chord.midi", &[60, 64, 67][..])] {
        let id = format!("{}/{}", root, name);
        backend
            .insert(FileDescriptor::new(id.clone(), name, id, 0).with_tag("demo"), sample(notes))
            .await;
    }

    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(message) = events.recv().await {
            info!(topic = %message.topic, "Event");
        }
    });

    let service = Arc::new(FileService::new(config, backend, bus)?);
    service.start().await;

    let scan = service.scan(false).await?;
    info!(files = scan.files.len(), source = ?scan.source, "Library scanned");

    for file in service.search("demo").await {
        let loaded = service.load(&file.id).await?;
        info!(file_id = %file.id, events = loaded.payload.event_count(), "Loaded");
    }

    let content = serde_json::to_vec(&sample(&[48, 55, 60]))?;
    let uploaded = service.upload(UploadRequest::new("bass.mid", content)).await?;
    info!(file_id = %uploaded.id, size = uploaded.size, "Uploaded");

    service.delete(&uploaded.id).await?;

    let stats = service.cache_stats().await;
    info!(
        entries = stats.entries,
        bytes = stats.current_bytes,
        hit_rate = stats.hit_rate(),
        "Cache stats"
    );

    service.dispose().await;
    info!("Demo finished");
    Ok(())
}
