use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use midilib_core::{BackendError, BackendResult};
use midilib_types::{FileDescriptor, MidiPayload};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{commands, BackendClient, ContentEncoding};

/// 命令响应 `{success, data | error}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// 错误码，`NOT_FOUND` 表示文件不存在
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl CommandResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: None,
        }
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self {
            code: Some(NOT_FOUND_CODE.to_string()),
            ..Self::err(error)
        }
    }
}

const NOT_FOUND_CODE: &str = "NOT_FOUND";

/// 请求/响应式命令传输（WebSocket、HTTP 等由外部实现）
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// 发送命令；没有连接时返回 `BackendError::Offline`
    async fn invoke(&self, command: &str, params: Value) -> BackendResult<CommandResponse>;

    /// 当前是否已连接
    fn is_connected(&self) -> bool {
        true
    }
}

/// 基于命令传输的后端
pub struct CommandBackend<T> {
    transport: T,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListData {
    Wrapped { files: Vec<FileDescriptor> },
    Plain(Vec<FileDescriptor>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReadData {
    Wrapped { midi: MidiPayload },
    Plain(MidiPayload),
}

impl<T: CommandTransport> CommandBackend<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 发送命令并检查 `success`，返回 `data`
    async fn call(&self, command: &str, id: Option<&str>, params: Value) -> BackendResult<Value> {
        if !self.transport.is_connected() {
            return Err(BackendError::Offline(format!("{}: transport not connected", command)));
        }

        debug!(command = command, "Invoking backend command");
        let response = self.transport.invoke(command, params).await?;

        if !response.success {
            let reason = response
                .error
                .unwrap_or_else(|| "unknown backend error".to_string());
            if response.code.as_deref() == Some(NOT_FOUND_CODE) {
                return Err(BackendError::NotFound(id.unwrap_or(command).to_string()));
            }
            warn!(command = command, error = %reason, "Backend command failed");
            return Err(BackendError::failure(command, reason));
        }

        Ok(response.data.unwrap_or(Value::Null))
    }

    async fn call_typed<R: DeserializeOwned>(
        &self,
        command: &str,
        id: Option<&str>,
        params: Value,
    ) -> BackendResult<R> {
        let data = self.call(command, id, params).await?;
        serde_json::from_value(data)
            .map_err(|e| BackendError::failure(command, format!("invalid response data: {}", e)))
    }
}

#[async_trait]
impl<T: CommandTransport> BackendClient for CommandBackend<T> {
    async fn list(&self, path: &str) -> BackendResult<Vec<FileDescriptor>> {
        let data: ListData = self
            .call_typed(commands::LIST, None, json!({ "path": path }))
            .await?;

        Ok(match data {
            ListData::Wrapped { files } => files,
            ListData::Plain(files) => files,
        })
    }

    async fn read(&self, id: &str) -> BackendResult<MidiPayload> {
        let data: ReadData = self
            .call_typed(commands::READ, Some(id), json!({ "id": id }))
            .await?;

        Ok(match data {
            ReadData::Wrapped { midi } => midi,
            ReadData::Plain(midi) => midi,
        })
    }

    async fn write(
        &self,
        id: &str,
        content: Bytes,
        encoding: ContentEncoding,
    ) -> BackendResult<FileDescriptor> {
        let encoded = match encoding {
            ContentEncoding::Base64 => STANDARD.encode(&content),
            ContentEncoding::Utf8 => String::from_utf8(content.to_vec()).map_err(|_| {
                BackendError::failure(commands::WRITE, "content is not valid UTF-8")
            })?,
        };

        let data = self
            .call(
                commands::WRITE,
                Some(id),
                json!({
                    "id": id,
                    "content": encoded,
                    "encoding": encoding.as_str(),
                }),
            )
            .await?;

        // 部分后端写入成功后不返回描述，需要再查询一次
        if data.is_null() {
            return self.get_info(id).await;
        }

        serde_json::from_value(data).map_err(|e| {
            BackendError::failure(commands::WRITE, format!("invalid response data: {}", e))
        })
    }

    async fn delete(&self, id: &str) -> BackendResult<()> {
        self.call(commands::DELETE, Some(id), json!({ "id": id }))
            .await
            .map(|_| ())
    }

    async fn get_info(&self, id: &str) -> BackendResult<FileDescriptor> {
        self.call_typed(commands::GET_INFO, Some(id), json!({ "id": id }))
            .await
    }

    fn backend_type(&self) -> &str {
        "command"
    }
}
