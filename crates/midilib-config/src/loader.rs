use anyhow::{anyhow, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

use crate::FileManagerConfig;

/// 配置加载器
///
/// 读取 `midilib.toml`，再用 `MIDILIB__SECTION__KEY` 环境变量覆盖
pub struct ConfigLoader {
    config_path: PathBuf,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_path: config_dir.as_ref().join("midilib.toml"),
            env_prefix: Some("MIDILIB".to_string()),
        }
    }

    /// 指定配置文件路径
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            env_prefix: Some("MIDILIB".to_string()),
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// 加载配置，文件不存在时使用默认值
    pub fn load(&self) -> Result<FileManagerConfig> {
        let mut builder = Config::builder();

        if self.config_path.exists() {
            builder = builder.add_source(File::new(
                self.config_path
                    .to_str()
                    .ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ));
        }

        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("upload.allowed_extensions"),
            );
        }

        let config: FileManagerConfig = builder.build()?.try_deserialize()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// 直接解析 TOML 文本（不读取环境变量）
    pub fn parse_str(content: &str) -> Result<FileManagerConfig> {
        let config: FileManagerConfig = toml::from_str(content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(config: &FileManagerConfig) -> Result<()> {
        if config.cache.max_cache_bytes == 0 {
            return Err(anyhow!("cache.max_cache_bytes must be greater than 0"));
        }

        if config.cache.ttl_ms == 0 {
            return Err(anyhow!("cache.ttl_ms must be greater than 0"));
        }

        if config.cache.sweep_interval_ms == 0 {
            return Err(anyhow!("cache.sweep_interval_ms must be greater than 0"));
        }

        if config.refresh.auto_refresh_ms == Some(0) {
            return Err(anyhow!("refresh.auto_refresh_ms must be greater than 0"));
        }

        if config.upload.max_file_size == 0 {
            return Err(anyhow!("upload.max_file_size must be greater than 0"));
        }

        if config.upload.allowed_extensions.is_empty() {
            return Err(anyhow!("upload.allowed_extensions must not be empty"));
        }

        if let Some(ext) = config
            .upload
            .allowed_extensions
            .iter()
            .find(|ext| !ext.starts_with('.') || ext.len() < 2)
        {
            return Err(anyhow!(
                "upload.allowed_extensions entry {:?} must start with '.'",
                ext
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midilib_types::EvictionPolicy;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_default_config() {
        let temp_dir = tempdir().unwrap();
        let loader = ConfigLoader::new(temp_dir.path()).without_env();

        let config = loader.load().unwrap();
        assert_eq!(config.cache.max_cache_bytes, 25 * 1024 * 1024);
        assert_eq!(config.backend.root_path, "/midi");
    }

    #[test]
    fn test_load_config_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_content = r#"
[cache]
max_cache_bytes = 4096
metadata_expiration_ms = 1000
ttl_ms = 2000
sweep_interval_ms = 500
eviction_policy = "insertion"

[upload]
max_file_size = 2048
allowed_extensions = [".mid", ".kar"]

[refresh]
auto_refresh_ms = 30000

[logging]
level = "debug"
json = true
"#;

        fs::write(temp_dir.path().join("midilib.toml"), config_content).unwrap();

        let loader = ConfigLoader::new(temp_dir.path()).without_env();
        let config = loader.load().unwrap();

        assert_eq!(config.cache.max_cache_bytes, 4096);
        assert_eq!(config.cache.eviction_policy, EvictionPolicy::InsertionOrder);
        assert_eq!(config.upload.allowed_extensions, vec![".mid", ".kar"]);
        assert_eq!(config.refresh.auto_refresh_ms, Some(30000));
        assert!(config.logging.json);
        assert_eq!(config.backend.root_path, "/midi");
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("midilib.toml"),
            "[cache]\nttl_ms = 2000\n",
        )
        .unwrap();

        std::env::set_var("MIDILIB_LOADER_TEST__CACHE__TTL_MS", "9000");

        let loader = ConfigLoader::new(temp_dir.path()).with_env_prefix("MIDILIB_LOADER_TEST");
        let config = loader.load().unwrap();

        std::env::remove_var("MIDILIB_LOADER_TEST__CACHE__TTL_MS");
        assert_eq!(config.cache.ttl_ms, 9000);
    }

    #[test]
    fn test_validate_config() {
        let mut config = FileManagerConfig::default();
        assert!(ConfigLoader::validate(&config).is_ok());

        config.upload.allowed_extensions = vec!["mid".to_string()];
        assert!(ConfigLoader::validate(&config).is_err());

        config.upload.allowed_extensions = vec![];
        assert!(ConfigLoader::validate(&config).is_err());

        let mut config = FileManagerConfig::default();
        config.cache.max_cache_bytes = 0;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_parse_str() {
        let config = ConfigLoader::parse_str("[backend]\nroot_path = \"/songs\"\n").unwrap();
        assert_eq!(config.backend.root_path, "/songs");
        assert_eq!(config.upload.max_file_size, 10 * 1024 * 1024);

        assert!(ConfigLoader::parse_str("[cache]\nttl_ms = 0\n").is_err());
        assert!(ConfigLoader::parse_str("[cache\n").is_err());
    }

    #[test]
    fn test_invalid_file_rejected() {
        let temp_dir = tempdir().unwrap();
        fs::write(
            temp_dir.path().join("midilib.toml"),
            "[upload]\nmax_file_size = 0\n",
        )
        .unwrap();

        let loader = ConfigLoader::new(temp_dir.path()).without_env();
        assert!(loader.load().is_err());
    }
}
