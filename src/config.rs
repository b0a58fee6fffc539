//! Client configuration module / 客户端配置模块
//!
//! Loaded from environment variables (with `.env` support) or a JSON file.
//! Immutable once the client is built / 构建客户端后不可变

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StorageError};
use crate::utils::endpoint_url;

/// Backend driver kind / 驱动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// S3-compatible HTTP service / S3兼容服务
    S3,
    /// Buckets as directories on the local filesystem / 本地文件系统
    Local,
}

impl Default for DriverKind {
    fn default() -> Self {
        DriverKind::S3
    }
}

impl std::str::FromStr for DriverKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" | "minio" => Ok(DriverKind::S3),
            "local" => Ok(DriverKind::Local),
            other => Err(StorageError::Config(format!("unknown driver: {}", other))),
        }
    }
}

/// Client configuration / 客户端配置
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub driver: DriverKind,
    /// Service address as `host:port` / 服务地址
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Use HTTPS / 启用TLS
    #[serde(default)]
    pub use_ssl: bool,
    #[serde(default = "default_region")]
    pub region: String,
    /// Path-style addressing, MinIO needs this / 路径风格寻址
    #[serde(default = "default_path_style")]
    pub path_style: bool,
    /// Root directory of the local driver / 本地驱动根目录
    #[serde(default)]
    pub local_root: String,
    /// Per-operation deadline in seconds, 0 disables it / 单次操作超时
    #[serde(default)]
    pub timeout_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_path_style() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            endpoint: "localhost:9000".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            use_ssl: false,
            region: default_region(),
            path_style: default_path_style(),
            local_root: String::new(),
            timeout_secs: 0,
        }
    }
}

// Secrets never reach the logs / 日志中隐藏密钥
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("driver", &self.driver)
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("region", &self.region)
            .field("path_style", &self.path_style)
            .field("local_root", &self.local_root)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str, use_ssl: bool) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            use_ssl,
            ..Self::default()
        }
    }

    /// Load from environment variables, reading `.env` first if present / 从环境变量加载
    pub fn from_env() -> Result<Self> {
        if dotenvy::dotenv().is_err() {
            tracing::debug!("No .env file found, using system environment variables");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup; unparsable booleans fall back to defaults / 从变量表构建
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |name: &str, default: bool| {
            lookup(name)
                .and_then(|v| parse_bool(&v))
                .unwrap_or(default)
        };

        let driver = match lookup("OBJSTORE_DRIVER") {
            Some(v) if !v.trim().is_empty() => v.parse()?,
            _ => DriverKind::default(),
        };
        let timeout_secs = match lookup("OBJSTORE_TIMEOUT_SECS") {
            Some(v) if !v.trim().is_empty() => v.trim().parse().map_err(|e| {
                StorageError::Config(format!("OBJSTORE_TIMEOUT_SECS is not a number: {}", e))
            })?,
            _ => 0,
        };

        Ok(Self {
            driver,
            endpoint: lookup("MINIO_ENDPOINT").unwrap_or(defaults.endpoint),
            access_key: lookup("MINIO_ACCESS_KEY").unwrap_or_default(),
            secret_key: lookup("MINIO_SECRET_KEY").unwrap_or_default(),
            use_ssl: flag("MINIO_USE_SSL", false),
            region: lookup("MINIO_REGION")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.region),
            path_style: flag("MINIO_PATH_STYLE", defaults.path_style),
            local_root: lookup("OBJSTORE_LOCAL_ROOT").unwrap_or_default(),
            timeout_secs,
        })
    }

    /// Load from a JSON config file / 从JSON配置文件加载
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config: ClientConfig = serde_json::from_str(&content).map_err(|e| {
            StorageError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Validate before building a client / 构建前校验
    pub fn validate(&self) -> Result<()> {
        endpoint_url(&self.endpoint, self.use_ssl)?;
        match self.driver {
            DriverKind::S3 => {
                if self.access_key.is_empty() || self.secret_key.is_empty() {
                    return Err(StorageError::Config(
                        "access key and secret key are required for the s3 driver".to_string(),
                    ));
                }
            }
            DriverKind::Local => {
                if self.local_root.trim().is_empty() {
                    return Err(StorageError::Config(
                        "local_root is required for the local driver".to_string(),
                    ));
                }
                // 预签名URL使用 secret_key 签名
                if self.secret_key.is_empty() {
                    return Err(StorageError::Config(
                        "secret key is required to sign local presigned URLs".to_string(),
                    ));
                }
            }
        }
        if self.region.trim().is_empty() {
            return Err(StorageError::Config("region is empty".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn local_root_path(&self) -> PathBuf {
        PathBuf::from(&self.local_root)
    }
}

/// Lenient boolean parsing in the style of `strconv.ParseBool` / 宽松布尔解析
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
