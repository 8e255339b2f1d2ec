use thiserror::Error;

/// 后端调用错误
///
/// 离线与真正的失败是不同的变体，调用方用模式匹配区分
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// 没有可用的传输连接
    #[error("Backend offline: {0}")]
    Offline(String),

    /// 后端报告文件不存在
    #[error("Not found on backend: {0}")]
    NotFound(String),

    /// 后端返回失败
    #[error("Backend command {command} failed: {reason}")]
    Failure { command: String, reason: String },
}

impl BackendError {
    pub fn failure(command: impl Into<String>, reason: impl Into<String>) -> Self {
        BackendError::Failure {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, BackendError::Offline(_))
    }
}

/// 后端调用结果
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// 文件管理错误类型
#[derive(Error, Debug)]
pub enum FileError {
    /// 后端不可用（离线）
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// 上传校验失败（在任何网络调用之前）
    #[error("Validation error: {0}")]
    Validation(String),

    /// 文件不在元数据索引中
    #[error("File not found: {0}")]
    NotFound(String),

    /// 后端失败
    #[error("Backend command {command} failed: {reason}")]
    Backend { command: String, reason: String },

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, FileError>;

impl FileError {
    pub fn validation(msg: impl Into<String>) -> Self {
        FileError::Validation(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        FileError::NotFound(id.into())
    }

    /// 是否为离线错误（界面可以据此抑制错误提示，继续显示缓存数据）
    pub fn is_offline(&self) -> bool {
        matches!(self, FileError::BackendUnavailable(_))
    }
}

impl From<BackendError> for FileError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Offline(reason) => FileError::BackendUnavailable(reason),
            BackendError::NotFound(id) => FileError::NotFound(id),
            BackendError::Failure { command, reason } => FileError::Backend { command, reason },
        }
    }
}

impl From<anyhow::Error> for FileError {
    fn from(err: anyhow::Error) -> Self {
        FileError::Internal(err.to_string())
    }
}
