use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;

use crate::config::{ClientConfig, DriverKind};
use crate::error::Result;

/// Boxed streaming reader returned by drivers / 流式读取器
pub type ObjectReader = Box<dyn AsyncRead + Unpin + Send>;

/// Listing descriptor / 列举条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    /// Common prefix ("directory") in a non-recursive listing / 非递归列举中的公共前缀
    pub is_prefix: bool,
}

/// Object metadata from a HEAD request / 对象元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStat {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of a completed upload / 上传结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadInfo {
    pub bucket: String,
    pub key: String,
    /// Bytes written / 写入字节数
    pub size: u64,
    /// Opaque object identifier / 对象标识
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

/// One page of a listing / 列举分页
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    /// Token for the next page, None when the listing is complete / 下一页令牌
    pub next_token: Option<String>,
}

/// Storage driver interface (single request per call, no retries) / 存储驱动接口
///
/// Keys and bucket names arrive already validated and normalized by the client.
#[async_trait]
pub trait ObjectDriver: Send + Sync {
    /// Driver name / 驱动名称
    fn name(&self) -> &str;

    /// Create a bucket; `AlreadyExists` when the driver can tell / 创建存储桶
    async fn make_bucket(&self, bucket: &str, region: &str) -> Result<()>;

    /// Query bucket existence / 检查存储桶是否存在
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Stream `reader` into (bucket, key) / 流式上传对象
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        content_type: &str,
    ) -> Result<UploadInfo>;

    /// Open the remote object for streaming; `NotFound` if absent / 打开对象读取流
    async fn open_reader(&self, bucket: &str, key: &str) -> Result<ObjectReader>;

    /// HEAD the object; `NotFound` if absent / 获取对象元数据
    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat>;

    /// Fetch one page of keys under `prefix` / 列举一页对象
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
        continuation: Option<String>,
    ) -> Result<ListPage>;

    /// Sign a time-limited GET URL; may not check existence / 生成预签名下载URL
    async fn presign_get(&self, bucket: &str, key: &str, expires: Duration) -> Result<String>;
}

/// Build the driver selected by the configuration / 根据配置创建驱动
pub fn create_driver(config: &ClientConfig) -> Result<Arc<dyn ObjectDriver>> {
    config.validate()?;
    let driver: Arc<dyn ObjectDriver> = match config.driver {
        DriverKind::S3 => Arc::new(crate::drivers::s3::S3Driver::new(config)?),
        DriverKind::Local => Arc::new(crate::drivers::local::LocalDriver::new(config)?),
    };
    tracing::debug!("Storage driver created: {}", driver.name());
    Ok(driver)
}
