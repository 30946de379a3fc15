//! Application configuration module / 应用配置模块
//!
//! Loaded from config.json in the working directory (or the file named by
//! `STORAGE_WRITER_CONFIG`). A default file is written on first run.
//! 首次运行时创建默认配置文件

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::storage::{Capability, ProtocolPreference, WriteOptions};

/// Environment variable overriding the config file path / 配置文件路径环境变量
pub const CONFIG_ENV: &str = "STORAGE_WRITER_CONFIG";

/// Application configuration / 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend configuration / 后端配置
    #[serde(default)]
    pub backend: BackendConfig,
    /// Writer configuration / 写入配置
    #[serde(default)]
    pub writer: WriterConfig,
    /// Log configuration / 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// Backend selection / 后端选择
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Local {
        root: String,
        #[serde(default = "default_true")]
        append: bool,
        #[serde(default = "default_true")]
        multipart: bool,
    },
    Memory {
        #[serde(default = "default_true")]
        append: bool,
        #[serde(default = "default_true")]
        multipart: bool,
    },
}

impl BackendConfig {
    /// Capabilities the backend should declare / 后端声明的能力
    pub fn capability(&self) -> Capability {
        match self {
            BackendConfig::Local { append, multipart, .. } | BackendConfig::Memory { append, multipart } => {
                Capability {
                    can_append: *append,
                    can_multipart_upload: *multipart,
                }
            }
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local {
            root: "data".to_string(),
            append: true,
            multipart: true,
        }
    }
}

/// Writer configuration / 写入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default)]
    pub protocol: ProtocolPreference,
    /// Bytes read from the source per write call / 每次写入读取的字节数
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolPreference::Auto,
            chunk_size: default_chunk_size(),
            content_type: None,
        }
    }
}

impl WriterConfig {
    pub fn write_options(&self) -> WriteOptions {
        WriteOptions {
            protocol: self.protocol,
            content_type: self.content_type.clone(),
        }
    }
}

/// Log configuration / 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// tracing EnvFilter directive, RUST_LOG takes precedence / 日志过滤规则
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { filter: default_log_filter() }
    }
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> u64 {
    8 * 1024 * 1024
}

fn default_log_filter() -> String {
    "storage_writer=info".to_string()
}

impl AppConfig {
    /// Check values serde cannot / 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.writer.chunk_size == 0 {
            return Err(anyhow!("writer.chunk_size must be greater than 0"));
        }
        if let BackendConfig::Local { root, .. } = &self.backend {
            if root.trim().is_empty() {
                return Err(anyhow!("backend.root must not be empty"));
            }
        }
        Ok(())
    }
}

/// Get the config file path / 获取配置文件路径
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config.json")
}

/// Where the loaded configuration came from / 配置来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from an existing file / 读取已有文件
    Loaded,
    /// Default written on first run / 首次运行写入默认配置
    Created,
}

/// Load configuration from file, or create default if not exists / 加载配置文件，不存在则创建默认配置
///
/// Runs before logging is set up, so the caller reports the returned source.
pub fn load_config(config_path: &Path) -> Result<(AppConfig, ConfigSource)> {
    let (config, source) = if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", config_path))?;
        (config, ConfigSource::Loaded)
    } else {
        let config = AppConfig::default();
        save_config(config_path, &config)?;
        (config, ConfigSource::Created)
    };

    config.validate()?;
    Ok((config, source))
}

/// Save configuration to file / 保存配置到文件
pub fn save_config(config_path: &Path, config: &AppConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write config file {:?}", config_path))?;
    Ok(())
}
