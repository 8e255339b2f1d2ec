use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use midilib_core::{BackendError, BackendResult};
use midilib_types::{FileDescriptor, MidiPayload};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::{commands, BackendClient, ContentEncoding};

/// 内存后端
///
/// 进程内保存文件，用于测试和演示：
/// - 可切换离线状态
/// - 可让指定命令失败
/// - 按命令统计调用次数
pub struct MemoryBackend {
    files: RwLock<BTreeMap<String, StoredFile>>,
    offline: AtomicBool,
    failing: std::sync::RwLock<HashSet<String>>,
    latency: Option<Duration>,
    stats: Arc<MemoryBackendStats>,
}

struct StoredFile {
    descriptor: FileDescriptor,
    /// 内容不是合法的 MIDI-JSON 时为 None
    payload: Option<MidiPayload>,
    raw: Bytes,
}

#[derive(Default)]
struct MemoryBackendStats {
    list_count: AtomicU64,
    read_count: AtomicU64,
    write_count: AtomicU64,
    delete_count: AtomicU64,
    info_count: AtomicU64,
    bytes_written: AtomicU64,
}

impl MemoryBackendStats {
    fn counter(&self, command: &str) -> Option<&AtomicU64> {
        match command {
            commands::LIST => Some(&self.list_count),
            commands::READ => Some(&self.read_count),
            commands::WRITE => Some(&self.write_count),
            commands::DELETE => Some(&self.delete_count),
            commands::GET_INFO => Some(&self.info_count),
            _ => None,
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
            offline: AtomicBool::new(false),
            failing: std::sync::RwLock::new(HashSet::new()),
            latency: None,
            stats: Arc::new(MemoryBackendStats::default()),
        }
    }

    /// 每次调用前等待一段时间，模拟网络延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 直接放入文件（不计入调用统计）
    pub async fn insert(&self, descriptor: FileDescriptor, payload: MidiPayload) {
        let raw = serde_json::to_vec(&payload).map(Bytes::from).unwrap_or_default();
        self.files.write().await.insert(
            descriptor.id.clone(),
            StoredFile {
                descriptor,
                payload: Some(payload),
                raw,
            },
        );
    }

    /// 绕过客户端直接删除，模拟其他端的修改
    pub async fn remove_silently(&self, id: &str) -> bool {
        self.files.write().await.remove(id).is_some()
    }

    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }

    /// 写入时收到的原始内容
    pub async fn raw_content(&self, id: &str) -> Option<Bytes> {
        self.files.read().await.get(id).map(|f| f.raw.clone())
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// 让指定命令返回失败
    pub fn fail_command(&self, command: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(command.to_string());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing.write() {
            failing.clear();
        }
    }

    /// 某个命令被调用的次数（包括失败和离线的调用）
    pub fn call_count(&self, command: &str) -> u64 {
        self.stats
            .counter(command)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        [
            commands::LIST,
            commands::READ,
            commands::WRITE,
            commands::DELETE,
            commands::GET_INFO,
        ]
        .iter()
        .map(|command| self.call_count(command))
        .sum()
    }

    pub fn bytes_written(&self) -> u64 {
        self.stats.bytes_written.load(Ordering::Relaxed)
    }

    /// 统计调用，并按当前设置模拟延迟、离线和失败
    async fn enter(&self, command: &str) -> BackendResult<()> {
        if let Some(counter) = self.stats.counter(command) {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.is_offline() {
            return Err(BackendError::Offline(format!("{}: memory backend offline", command)));
        }

        let injected = self
            .failing
            .read()
            .map(|failing| failing.contains(command))
            .unwrap_or(false);
        if injected {
            return Err(BackendError::failure(command, "injected failure"));
        }

        Ok(())
    }
}

#[async_trait]
impl BackendClient for MemoryBackend {
    async fn list(&self, path: &str) -> BackendResult<Vec<FileDescriptor>> {
        self.enter(commands::LIST).await?;

        let prefix = path.trim_end_matches('/');
        let files = self.files.read().await;
        Ok(files
            .values()
            .filter(|f| prefix.is_empty() || f.descriptor.path.starts_with(prefix))
            .map(|f| f.descriptor.clone())
            .collect())
    }

    async fn read(&self, id: &str) -> BackendResult<MidiPayload> {
        self.enter(commands::READ).await?;

        let files = self.files.read().await;
        let file = files
            .get(id)
            .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
        file.payload
            .clone()
            .ok_or_else(|| BackendError::failure(commands::READ, format!("{} is not valid MIDI-JSON", id)))
    }

    async fn write(
        &self,
        id: &str,
        content: Bytes,
        encoding: ContentEncoding,
    ) -> BackendResult<FileDescriptor> {
        self.enter(commands::WRITE).await?;

        if encoding == ContentEncoding::Utf8 && std::str::from_utf8(&content).is_err() {
            return Err(BackendError::failure(commands::WRITE, "content is not valid UTF-8"));
        }
        let raw = content;

        let payload: Option<MidiPayload> = serde_json::from_slice(&raw).ok();
        let name = id.rsplit('/').next().unwrap_or(id);

        let mut descriptor = FileDescriptor::new(id, name, id, raw.len() as u64);
        descriptor.modified_at = Some(Utc::now());
        if let Some(payload) = &payload {
            descriptor.duration = payload.duration;
            descriptor.track_count = Some(payload.tracks.len() as u32);
        }

        self.stats
            .bytes_written
            .fetch_add(raw.len() as u64, Ordering::Relaxed);
        debug!(file_id = %id, size = raw.len(), parsed = payload.is_some(), "Memory backend write");

        self.files.write().await.insert(
            id.to_string(),
            StoredFile {
                descriptor: descriptor.clone(),
                payload,
                raw,
            },
        );

        Ok(descriptor)
    }

    async fn delete(&self, id: &str) -> BackendResult<()> {
        self.enter(commands::DELETE).await?;

        match self.files.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(BackendError::NotFound(id.to_string())),
        }
    }

    async fn get_info(&self, id: &str) -> BackendResult<FileDescriptor> {
        self.enter(commands::GET_INFO).await?;

        self.files
            .read()
            .await
            .get(id)
            .map(|f| f.descriptor.clone())
            .ok_or_else(|| BackendError::NotFound(id.to_string()))
    }

    fn backend_type(&self) -> &str {
        "memory"
    }
}
