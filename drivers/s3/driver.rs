//! S3驱动核心实现
//!
//! - 每次调用只发一个请求（或一个流），不重试
//! - 状态码由驱动自行判断（未启用 fail-on-err）
//! - 预签名URL在本地签名，不访问网络

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{BucketConfiguration, Region};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use crate::config::ClientConfig;
use crate::error::{Result, StorageError};
use crate::storage::{ListPage, ObjectDriver, ObjectInfo, ObjectReader, ObjectStat, UploadInfo};
use crate::utils::{endpoint_base, endpoint_url, parse_timestamp};

/// ListObjectsV2 page size (S3 maximum) / 每页最大键数
const LIST_PAGE_SIZE: usize = 1000;

/// S3驱动
pub struct S3Driver {
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3Driver {
    /// 创建新的S3驱动实例
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let endpoint = endpoint_url(&config.endpoint, config.use_ssl)?;

        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Config(format!("创建S3凭证失败: {}", e)))?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: endpoint_base(&endpoint),
        };

        Ok(Self {
            region,
            credentials,
            path_style: config.path_style,
        })
    }

    /// Bucket handle for one call; no network traffic / 构建Bucket客户端
    fn bucket(&self, name: &str) -> Result<Box<Bucket>> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| StorageError::Config(format!("创建S3 Bucket失败: {}", e)))?;
        Ok(if self.path_style { bucket.with_path_style() } else { bucket })
    }
}

/// Map a non-success status to the error taxonomy / 状态码转换为错误
fn status_error(code: u16, what: &str) -> StorageError {
    match code {
        404 => StorageError::not_found(what),
        409 => StorageError::AlreadyExists(what.to_string()),
        _ => StorageError::transport(format!("{}: HTTP {}", what, code)),
    }
}

fn s3_error(err: S3Error, what: &str) -> StorageError {
    match err {
        // rust-s3 自行检查状态码的路径（如流式上传）
        S3Error::HttpFailWithBody(code, _) => status_error(code, what),
        other => StorageError::transport(format!("{}: {}", what, other)),
    }
}

fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

#[async_trait]
impl ObjectDriver for S3Driver {
    fn name(&self) -> &str {
        "s3"
    }

    async fn make_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        let region = match &self.region {
            Region::Custom { endpoint, .. } => Region::Custom {
                region: region.to_string(),
                endpoint: endpoint.clone(),
            },
            other => other.clone(),
        };

        let create = if self.path_style {
            Bucket::create_with_path_style(bucket, region, self.credentials.clone(), BucketConfiguration::default()).await
        } else {
            Bucket::create(bucket, region, self.credentials.clone(), BucketConfiguration::default()).await
        };
        let response = create.map_err(|e| s3_error(e, &format!("创建存储桶失败 {}", bucket)))?;

        tracing::debug!("S3 CreateBucket: bucket={}, code={}", bucket, response.response_code);
        if !is_success(response.response_code) {
            return Err(status_error(response.response_code, bucket));
        }
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        // HEAD /<bucket>/，只需要该桶的权限（Bucket::exists 走的是 ListBuckets）
        let (_, code) = self
            .bucket(bucket)?
            .head_object("/")
            .await
            .map_err(|e| s3_error(e, &format!("检查存储桶失败 {}", bucket)))?;

        tracing::debug!("S3 HeadBucket: bucket={}, code={}", bucket, code);
        match code {
            code if is_success(code) => Ok(true),
            404 => Ok(false),
            code => Err(status_error(code, bucket)),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        content_type: &str,
    ) -> Result<UploadInfo> {
        let handle = self.bucket(bucket)?;
        let location = format!("{}/{}", bucket, key);

        // 小文件单次PUT，大文件由rust-s3分片上传，均为流式读取
        let mut reader = reader;
        let response = handle
            .put_object_stream_with_content_type(&mut reader, key, content_type)
            .await
            .map_err(|e| s3_error(e, &format!("上传对象失败 {}", location)))?;

        let code = response.status_code();
        if !is_success(code) {
            return Err(status_error(code, &location));
        }
        let size = response.uploaded_bytes() as u64;
        tracing::debug!("S3 PutObject: {} ({} bytes)", location, size);

        // ETag 需要再发一次 HEAD；失败不影响上传结果
        let etag = match handle.head_object(key).await {
            Ok((head, code)) if is_success(code) => head.e_tag,
            Ok((_, code)) => {
                tracing::warn!("S3 HeadObject after upload returned {}: {}", code, location);
                None
            }
            Err(e) => {
                tracing::warn!("S3 HeadObject after upload failed: {}: {}", location, e);
                None
            }
        };

        Ok(UploadInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            etag,
            version_id: None,
        })
    }

    async fn open_reader(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        let location = format!("{}/{}", bucket, key);
        let response = self
            .bucket(bucket)?
            .get_object_stream(key)
            .await
            .map_err(|e| s3_error(e, &format!("获取对象失败 {}", location)))?;

        if !is_success(response.status_code) {
            return Err(status_error(response.status_code, &location));
        }

        // 字节流转换为 AsyncRead，按块读取
        let stream = response
            .bytes
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat> {
        let location = format!("{}/{}", bucket, key);
        let (head, code) = self
            .bucket(bucket)?
            .head_object(key)
            .await
            .map_err(|e| s3_error(e, &format!("获取对象信息失败 {}", location)))?;

        if !is_success(code) {
            return Err(status_error(code, &location));
        }

        Ok(ObjectStat {
            key: key.to_string(),
            size: head.content_length.unwrap_or(0).max(0) as u64,
            content_type: head.content_type,
            etag: head.e_tag,
            last_modified: head.last_modified.as_deref().and_then(parse_timestamp),
        })
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let delimiter = if recursive { None } else { Some("/".to_string()) };
        let (result, code) = self
            .bucket(bucket)?
            .list_page(prefix.to_string(), delimiter, continuation, None, Some(LIST_PAGE_SIZE))
            .await
            .map_err(|e| s3_error(e, &format!("列出S3对象失败 {}", bucket)))?;

        if !is_success(code) {
            return Err(status_error(code, bucket));
        }

        let mut objects = Vec::with_capacity(result.contents.len());
        for obj in result.contents {
            objects.push(ObjectInfo {
                last_modified: parse_timestamp(&obj.last_modified),
                size: obj.size as u64,
                etag: obj.e_tag,
                key: obj.key,
                is_prefix: false,
            });
        }
        // 处理目录（公共前缀）
        for cp in result.common_prefixes.unwrap_or_default() {
            objects.push(ObjectInfo {
                key: cp.prefix,
                size: 0,
                last_modified: None,
                etag: None,
                is_prefix: true,
            });
        }

        let next_token = if result.is_truncated {
            result.next_continuation_token
        } else {
            None
        };
        tracing::debug!(
            "S3 ListObjectsV2: bucket={}, prefix={}, entries={}, more={}",
            bucket,
            prefix,
            objects.len(),
            next_token.is_some()
        );
        Ok(ListPage { objects, next_token })
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires: Duration) -> Result<String> {
        let secs = u32::try_from(expires.as_secs())
            .map_err(|_| StorageError::invalid(format!("expiry too large: {:?}", expires)))?;

        self.bucket(bucket)?
            .presign_get(key, secs, None)
            .await
            .map_err(|e| s3_error(e, &format!("生成预签名URL失败 {}/{}", bucket, key)))
    }
}
