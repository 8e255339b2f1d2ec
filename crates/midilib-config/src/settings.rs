use midilib_types::EvictionPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 文件管理全局配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FileManagerConfig {
    pub cache: CacheConfig,
    pub upload: UploadConfig,
    pub refresh: RefreshConfig,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
}

/// 缓存配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// 内容缓存字节上限
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: u64,

    /// 文件列表缓存有效期（毫秒），期间非强制扫描直接返回缓存列表
    #[serde(default = "default_metadata_expiration_ms")]
    pub metadata_expiration_ms: u64,

    /// 内容条目存活时间（毫秒）
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// 过期清理间隔（毫秒）
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
}

/// 上传配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// 单个文件大小上限（字节）
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// 允许的扩展名（小写，带点）
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

/// 自动刷新配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RefreshConfig {
    /// 自动刷新间隔（毫秒），为空时不启用
    #[serde(default)]
    pub auto_refresh_ms: Option<u64>,
}

/// 后端配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// 扫描的根路径
    #[serde(default = "default_root_path")]
    pub root_path: String,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_max_cache_bytes() -> u64 {
    25 * 1024 * 1024
}

fn default_metadata_expiration_ms() -> u64 {
    60_000
}

fn default_ttl_ms() -> u64 {
    300_000
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec![".mid".to_string(), ".midi".to_string()]
}

fn default_root_path() -> String {
    "/midi".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_bytes: default_max_cache_bytes(),
            metadata_expiration_ms: default_metadata_expiration_ms(),
            ttl_ms: default_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn metadata_expiration(&self) -> Duration {
        Duration::from_millis(self.metadata_expiration_ms)
    }
}

impl UploadConfig {
    /// 扩展名是否允许（大小写不敏感）
    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }
}

impl RefreshConfig {
    pub fn auto_refresh_interval(&self) -> Option<Duration> {
        self.auto_refresh_ms.map(Duration::from_millis)
    }
}
