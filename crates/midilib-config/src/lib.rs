pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{
    BackendConfig, CacheConfig, FileManagerConfig, LoggingConfig, RefreshConfig, UploadConfig,
};
