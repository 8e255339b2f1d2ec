use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::descriptor::FileDescriptor;

/// 文件管理事件（供控制器/视图订阅，仅通知，不等待响应）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FileEvent {
    ScanStarted,
    ScanCompleted {
        files: Vec<FileDescriptor>,
        duration_ms: u64,
    },
    ScanFailed {
        error: String,
        /// 后端不可用（离线），界面可据此抑制错误提示
        offline: bool,
    },
    FileLoaded {
        id: String,
        from_cache: bool,
    },
    FileUploadComplete {
        descriptor: FileDescriptor,
    },
    FileDeleted {
        id: String,
    },
    CacheSwept {
        removed: usize,
    },
}

impl FileEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            FileEvent::ScanStarted => "scan-started",
            FileEvent::ScanCompleted { .. } => "scan-completed",
            FileEvent::ScanFailed { .. } => "scan-failed",
            FileEvent::FileLoaded { .. } => "file-loaded",
            FileEvent::FileUploadComplete { .. } => "file-upload-complete",
            FileEvent::FileDeleted { .. } => "file-deleted",
            FileEvent::CacheSwept { .. } => "cache-swept",
        }
    }
}

/// 事件信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub event: FileEvent,
    pub timestamp: i64,
}

impl Message {
    pub fn new(event: FileEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: event.topic().to_string(),
            event,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
