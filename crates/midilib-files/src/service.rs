use bytes::Bytes;
use chrono::{DateTime, Utc};
use midilib_cache::{CacheStats, FileCatalog, PutOutcome};
use midilib_config::{ConfigLoader, FileManagerConfig};
use midilib_core::{spawn_periodic, BackendError, FileError, Result, SharedEventBus, TaskHandle};
use midilib_types::{file_extension, FileDescriptor, FileEvent, MidiPayload};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::backend::{BackendClient, ContentEncoding};

/// 扫描结果的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    /// 从后端获取的新列表
    Backend,
    /// 元数据仍在有效期内，未访问后端
    Cache,
    /// 已有扫描在进行，返回当前列表
    InFlight,
    /// 后端离线，返回最后一次已知的列表
    Offline,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub files: Vec<FileDescriptor>,
    pub source: ScanSource,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub id: String,
    pub payload: Arc<MidiPayload>,
    /// 是否命中缓存
    pub from_cache: bool,
    /// 负载当前是否在缓存中（超出预算的负载不会被缓存）
    pub cached: bool,
}

/// 上传请求
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub content: Bytes,
    pub encoding: ContentEncoding,
}

impl UploadRequest {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            encoding: ContentEncoding::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: ContentEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// 扫描进行中标记，离开作用域时复位
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 文件管理服务
///
/// 负责扫描、加载、上传、删除，以及缓存清理和自动刷新两个后台任务。
/// 目录（缓存 + 两个索引）的每次修改都在一次写锁内完成，
/// 后端调用期间不持有锁。
pub struct FileService {
    config: FileManagerConfig,
    backend: Arc<dyn BackendClient>,
    catalog: RwLock<FileCatalog<MidiPayload>>,
    bus: SharedEventBus,
    scan_in_flight: AtomicBool,
    /// 最后一次成功扫描完成的时间
    last_scan: RwLock<Option<Instant>>,
    tasks: Mutex<Vec<TaskHandle>>,
}

impl FileService {
    pub fn new(
        config: FileManagerConfig,
        backend: Arc<dyn BackendClient>,
        bus: SharedEventBus,
    ) -> Result<Self> {
        ConfigLoader::validate(&config).map_err(|e| FileError::Config(e.to_string()))?;

        info!(
            backend = backend.backend_type(),
            max_cache_bytes = config.cache.max_cache_bytes,
            policy = ?config.cache.eviction_policy,
            "File service created"
        );

        let catalog = FileCatalog::new(config.cache.max_cache_bytes, config.cache.eviction_policy);

        Ok(Self {
            config,
            backend,
            catalog: RwLock::new(catalog),
            bus,
            scan_in_flight: AtomicBool::new(false),
            last_scan: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &FileManagerConfig {
        &self.config
    }

    pub fn backend_type(&self) -> &str {
        self.backend.backend_type()
    }

    /// 刷新文件列表
    ///
    /// 已有扫描在进行时直接返回当前列表；非强制刷新且元数据未过期时不访问后端
    pub async fn scan(&self, force_refresh: bool) -> Result<ScanOutcome> {
        let started = Instant::now();

        if self
            .scan_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Scan already in flight, returning current list");
            return Ok(self.current_outcome(ScanSource::InFlight, started).await);
        }
        let _guard = ScanGuard(&self.scan_in_flight);

        if !force_refresh && self.is_metadata_fresh().await {
            debug!("Metadata still fresh, skipping backend scan");
            return Ok(self.current_outcome(ScanSource::Cache, started).await);
        }

        self.bus.emit(FileEvent::ScanStarted);
        let root = self.config.backend.root_path.as_str();
        debug!(root = %root, force = force_refresh, "Scanning backend");

        match self.backend.list(root).await {
            Ok(descriptors) => {
                let (files, purged) = {
                    let mut catalog = self.catalog.write().await;
                    let purged = catalog.apply_scan(descriptors);
                    (catalog.files(), purged.len())
                };
                *self.last_scan.write().await = Some(Instant::now());

                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    files = files.len(),
                    purged = purged,
                    duration_ms = duration_ms,
                    "Scan completed"
                );
                self.bus.emit(FileEvent::ScanCompleted {
                    files: files.clone(),
                    duration_ms,
                });

                Ok(ScanOutcome {
                    files,
                    source: ScanSource::Backend,
                    duration_ms,
                })
            }
            Err(err) if err.is_offline() => {
                warn!(error = %err, "Backend offline, keeping last known file list");
                self.bus.emit(FileEvent::ScanFailed {
                    error: err.to_string(),
                    offline: true,
                });
                Ok(self.current_outcome(ScanSource::Offline, started).await)
            }
            Err(err) => {
                error!(error = %err, "Scan failed");
                self.bus.emit(FileEvent::ScanFailed {
                    error: err.to_string(),
                    offline: false,
                });
                Err(err.into())
            }
        }
    }

    /// 加载文件内容，优先使用缓存
    pub async fn load(&self, id: &str) -> Result<LoadedFile> {
        {
            // 命中时会更新访问时间，需要写锁
            let mut catalog = self.catalog.write().await;
            if !catalog.contains(id) {
                return Err(FileError::not_found(id));
            }
            if let Some(payload) = catalog.get_payload(id) {
                drop(catalog);
                debug!(file_id = %id, "Cache hit");
                self.bus.emit(FileEvent::FileLoaded {
                    id: id.to_string(),
                    from_cache: true,
                });
                return Ok(LoadedFile {
                    id: id.to_string(),
                    payload,
                    from_cache: true,
                    cached: true,
                });
            }
        }

        debug!(file_id = %id, "Cache miss, reading from backend");
        let payload = self.backend.read(id).await.map_err(|err| {
            warn!(file_id = %id, error = %err, "Failed to read file");
            FileError::from(err)
        })?;
        let payload = Arc::new(payload);

        let outcome = self
            .catalog
            .write()
            .await
            .put_payload(id, payload.clone());
        match &outcome {
            PutOutcome::Inserted { size_bytes, evicted } => {
                debug!(
                    file_id = %id,
                    size = size_bytes,
                    evicted = evicted.len(),
                    "File cached"
                );
            }
            PutOutcome::Rejected(reason) => {
                debug!(file_id = %id, reason = ?reason, "File not cached");
            }
        }

        self.bus.emit(FileEvent::FileLoaded {
            id: id.to_string(),
            from_cache: false,
        });

        Ok(LoadedFile {
            id: id.to_string(),
            payload,
            from_cache: false,
            cached: outcome.is_cached(),
        })
    }

    /// 上传文件；校验在任何后端调用之前完成，成功后强制刷新列表
    pub async fn upload(&self, request: UploadRequest) -> Result<FileDescriptor> {
        self.validate_upload(&request)?;

        let id = self.file_id(&request.name);
        let size = request.content.len();
        info!(file_id = %id, size = size, "Uploading file");

        let descriptor = self
            .backend
            .write(&id, request.content, request.encoding)
            .await
            .map_err(|err| {
                error!(file_id = %id, error = %err, "Upload failed");
                FileError::from(err)
            })?;

        // 同名上传会覆盖后端文件，旧内容不能再从缓存返回
        if self.catalog.write().await.invalidate_payload(&id) {
            debug!(file_id = %id, "Dropped cached payload of overwritten file");
        }

        self.bus.emit(FileEvent::FileUploadComplete {
            descriptor: descriptor.clone(),
        });

        if let Err(err) = self.scan(true).await {
            warn!(file_id = %id, error = %err, "Refresh after upload failed");
        }

        Ok(descriptor)
    }

    /// 删除文件；不在索引中的文件直接返回 `Ok(false)`
    pub async fn delete(&self, id: &str) -> Result<bool> {
        if !self.catalog.read().await.contains(id) {
            debug!(file_id = %id, "Delete of unknown file ignored");
            return Ok(false);
        }

        match self.backend.delete(id).await {
            Ok(()) => {}
            Err(BackendError::NotFound(_)) => {
                debug!(file_id = %id, "File already gone on backend");
            }
            Err(err) => {
                error!(file_id = %id, error = %err, "Delete failed");
                return Err(err.into());
            }
        }

        // 并发删除同一文件时只有一个调用真正移除
        if self.catalog.write().await.remove_file(id).is_none() {
            debug!(file_id = %id, "File already removed by another delete");
            return Ok(false);
        }
        info!(file_id = %id, "File deleted");
        self.bus.emit(FileEvent::FileDeleted { id: id.to_string() });

        Ok(true)
    }

    /// 文件描述：先查元数据索引，再查后端（结果不写入索引）
    pub async fn get_info(&self, id: &str) -> Result<FileDescriptor> {
        if let Some(descriptor) = self.catalog.read().await.descriptor(id).cloned() {
            return Ok(descriptor);
        }
        Ok(self.backend.get_info(id).await?)
    }

    /// 清理过期缓存，返回清理数量
    pub async fn sweep_expired(&self) -> usize {
        let ttl = self.config.cache.ttl();
        let removed = self.catalog.write().await.evict_expired(ttl).len();

        if removed > 0 {
            debug!(removed = removed, "Cache sweep removed expired entries");
            self.bus.emit(FileEvent::CacheSwept { removed });
        }
        removed
    }

    pub async fn files(&self) -> Vec<FileDescriptor> {
        self.catalog.read().await.files()
    }

    pub async fn search(&self, query: &str) -> Vec<FileDescriptor> {
        self.catalog.read().await.search(query)
    }

    /// 查看缓存内容，不影响访问顺序
    pub async fn cached_payload(&self, id: &str) -> Option<Arc<MidiPayload>> {
        self.catalog.read().await.peek_payload(id)
    }

    pub async fn is_cached(&self, id: &str) -> bool {
        self.catalog.read().await.content().contains(id)
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.catalog.read().await.cache_stats()
    }

    pub async fn last_scan_at(&self) -> Option<DateTime<Utc>> {
        self.catalog.read().await.metadata().updated_at()
    }

    pub fn is_scan_in_flight(&self) -> bool {
        self.scan_in_flight.load(Ordering::SeqCst)
    }

    /// 启动后台任务：缓存清理，以及配置了的话自动刷新
    ///
    /// 重复调用会先停止之前的任务
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.shutdown().await;
        }

        let service = Arc::downgrade(self);
        tasks.push(spawn_periodic(
            "cache-sweep",
            self.config.cache.sweep_interval(),
            move || {
                let service = service.clone();
                async move {
                    if let Some(service) = service.upgrade() {
                        service.sweep_expired().await;
                    }
                }
            },
        ));

        if let Some(period) = self.config.refresh.auto_refresh_interval() {
            let service = Arc::downgrade(self);
            tasks.push(spawn_periodic("auto-refresh", period, move || {
                let service = service.clone();
                async move {
                    if let Some(service) = service.upgrade() {
                        if let Err(err) = service.scan(false).await {
                            warn!(error = %err, "Auto refresh failed");
                        }
                    }
                }
            }));
        }

        info!(tasks = tasks.len(), "File service started");
    }

    pub async fn running_tasks(&self) -> usize {
        self.tasks
            .lock()
            .await
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// 停止后台任务并清空目录
    pub async fn dispose(&self) {
        let tasks: Vec<TaskHandle> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            task.shutdown().await;
        }

        self.catalog.write().await.clear();
        *self.last_scan.write().await = None;
        info!("File service disposed");
    }

    async fn is_metadata_fresh(&self) -> bool {
        let expiration = self.config.cache.metadata_expiration();
        self.last_scan
            .read()
            .await
            .map(|at| at.elapsed() < expiration)
            .unwrap_or(false)
    }

    async fn current_outcome(&self, source: ScanSource, started: Instant) -> ScanOutcome {
        ScanOutcome {
            files: self.catalog.read().await.files(),
            source,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn validate_upload(&self, request: &UploadRequest) -> Result<()> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(FileError::validation("file name is empty"));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(FileError::validation(format!(
                "file name must not contain path separators: {}",
                name
            )));
        }
        if request.content.is_empty() {
            return Err(FileError::validation(format!("file is empty: {}", name)));
        }

        let max = self.config.upload.max_file_size;
        if request.content.len() as u64 > max {
            return Err(FileError::validation(format!(
                "file {} is {} bytes, limit is {} bytes",
                name,
                request.content.len(),
                max
            )));
        }

        match file_extension(name) {
            Some(ext) if self.config.upload.is_allowed_extension(&ext) => Ok(()),
            _ => Err(FileError::validation(format!(
                "unsupported file type: {} (allowed: {})",
                name,
                self.config.upload.allowed_extensions.join(", ")
            ))),
        }
    }

    fn file_id(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.config.backend.root_path.trim_end_matches('/'),
            name.trim()
        )
    }
}
