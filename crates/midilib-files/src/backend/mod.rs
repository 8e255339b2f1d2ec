use async_trait::async_trait;
use bytes::Bytes;
use midilib_core::BackendResult;
use midilib_types::{FileDescriptor, MidiPayload};
use serde::{Deserialize, Serialize};

pub mod command;
pub mod memory;

pub use command::{CommandBackend, CommandResponse, CommandTransport};
pub use memory::MemoryBackend;

/// 后端命令名
pub mod commands {
    pub const LIST: &str = "files.list";
    pub const READ: &str = "files.read";
    pub const WRITE: &str = "files.write";
    pub const DELETE: &str = "files.delete";
    pub const GET_INFO: &str = "files.getInfo";
}

/// 文件后端抽象 trait
///
/// 每个方法返回 `BackendError::Offline` / `NotFound` / `Failure`，
/// 调用方按变体区分离线和真正的错误
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// 列出路径下的文件（权威列表）
    async fn list(&self, path: &str) -> BackendResult<Vec<FileDescriptor>>;

    /// 读取并解析文件内容
    async fn read(&self, id: &str) -> BackendResult<MidiPayload>;

    /// 写入文件，返回新文件的描述
    async fn write(
        &self,
        id: &str,
        content: Bytes,
        encoding: ContentEncoding,
    ) -> BackendResult<FileDescriptor>;

    /// 删除文件
    async fn delete(&self, id: &str) -> BackendResult<()>;

    /// 获取单个文件描述
    async fn get_info(&self, id: &str) -> BackendResult<FileDescriptor>;

    /// 获取后端类型
    fn backend_type(&self) -> &str;
}

/// 写入内容在传输中的编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Base64,
    Utf8,
}

impl ContentEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Base64 => "base64",
            ContentEncoding::Utf8 => "utf8",
        }
    }
}
