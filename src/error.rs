//! Error contract shared by the client and all drivers / 统一错误类型

use thiserror::Error;

/// Storage operation error / 存储操作错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// Local file, bucket or object does not exist / 资源不存在
    #[error("not found: {0}")]
    NotFound(String),

    /// Bucket creation hit an existing bucket / 存储桶已存在
    #[error("bucket already exists: {0}")]
    AlreadyExists(String),

    /// Rejected client-side before any remote call / 参数非法
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed endpoint or credentials at construction time / 配置错误
    #[error("configuration error: {0}")]
    Config(String),

    /// Network, authentication or protocol failure / 传输错误
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn transport(what: impl std::fmt::Display) -> Self {
        Self::Transport(what.to_string())
    }

    pub fn invalid(what: impl std::fmt::Display) -> Self {
        Self::InvalidArgument(what.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Map a local IO error, keeping "not found" distinguishable / 转换本地IO错误
    pub fn from_io(err: std::io::Error, context: impl std::fmt::Display) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(context.to_string()),
            _ => Self::Transport(format!("{}: {}", context, err)),
        }
    }
}
