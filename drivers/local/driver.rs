use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use super::presign::UrlSigner;
use crate::config::ClientConfig;
use crate::error::{Result, StorageError};
use crate::storage::{ListPage, ObjectDriver, ObjectInfo, ObjectReader, ObjectStat, UploadInfo};
use crate::utils::{endpoint_base, endpoint_url, guess_content_type};

/// Sidecar metadata lives outside bucket directories / 元数据目录
const META_DIR: &str = ".meta";
/// Uploads land here first, then get renamed into place / 上传临时目录
const TMP_DIR: &str = ".tmp";
const LIST_PAGE_SIZE: usize = 1000;
const COPY_BUF_SIZE: usize = 64 * 1024;
/// Unfinished listings kept between pages / 缓存的分页游标数
const MAX_CURSORS: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    content_type: String,
    etag: String,
    version_id: String,
}

/// Identifies the remainder of a listing after `token` / 分页游标
#[derive(Debug, Clone, PartialEq, Eq)]
struct CursorKey {
    bucket: String,
    prefix: String,
    recursive: bool,
    token: String,
}

/// Filesystem driver: `<root>/<bucket>/<key>` / 本地文件系统驱动
pub struct LocalDriver {
    root: PathBuf,
    signer: UrlSigner,
    // 每次列举只遍历一次目录，后续页面从这里取
    cursors: Mutex<VecDeque<(CursorKey, Vec<ObjectInfo>)>>,
}

impl LocalDriver {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let url = endpoint_url(&config.endpoint, config.use_ssl)?;
        let root = config.local_root_path();
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::Config(format!("无法创建本地根目录 {:?}: {}", root, e)))?;
        Self::with_root(root, &endpoint_base(&url), &config.secret_key)
    }

    pub fn with_root(root: PathBuf, base_url: &str, secret: &str) -> Result<Self> {
        Ok(Self {
            root,
            signer: UrlSigner::new(base_url, secret)?,
            cursors: Mutex::new(VecDeque::new()),
        })
    }

    /// Get root directory / 获取根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check a presigned URL against the current time / 校验预签名URL
    pub fn verify_presigned(&self, url: &str) -> bool {
        self.signer.verify(url, Utc::now())
    }

    pub fn verify_presigned_at(&self, url: &str, now: DateTime<Utc>) -> bool {
        self.signer.verify(url, now)
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    /// Map a key to a path; empty segments cannot be represented on disk / 对象键转路径
    fn key_path(base: &Path, key: &str) -> Result<PathBuf> {
        let mut path = base.to_path_buf();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StorageError::invalid(format!("本地驱动不支持的对象键: {}", key)));
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        Self::key_path(&self.bucket_dir(bucket), key)
    }

    fn meta_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = Self::key_path(&self.root.join(META_DIR).join(bucket), key)?;
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".json");
        path.set_file_name(name);
        Ok(path)
    }

    async fn require_bucket(&self, bucket: &str) -> Result<PathBuf> {
        let dir = self.bucket_dir(bucket);
        match tokio::fs::metadata(&dir).await {
            Ok(m) if m.is_dir() => Ok(dir),
            Ok(_) => Err(StorageError::not_found(format!("bucket {}", bucket))),
            Err(e) => Err(StorageError::from_io(e, format!("bucket {}", bucket))),
        }
    }

    fn take_cursor(&self, key: &CursorKey) -> Option<Vec<ObjectInfo>> {
        let mut cursors = self.cursors.lock().unwrap_or_else(|p| p.into_inner());
        let idx = cursors.iter().position(|(k, _)| k == key)?;
        cursors.remove(idx).map(|(_, rest)| rest)
    }

    fn store_cursor(&self, key: CursorKey, rest: Vec<ObjectInfo>) {
        let mut cursors = self.cursors.lock().unwrap_or_else(|p| p.into_inner());
        if cursors.len() >= MAX_CURSORS {
            cursors.pop_front();
        }
        cursors.push_back((key, rest));
    }

    /// Sorted entries under `prefix`, walking only the prefix's directory / 收集前缀下的条目
    async fn collect_entries(
        &self,
        bucket: &str,
        dir: PathBuf,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<ObjectInfo>> {
        // "a/b/c" 只需遍历 <bucket>/a/b
        let parent = match prefix.rfind('/') {
            Some(idx) => &prefix[..=idx],
            None => "",
        };
        let start = match parent.trim_end_matches('/') {
            "" => dir,
            sub => match Self::key_path(&dir, sub) {
                Ok(path) => path,
                // 磁盘上不可能存在这样的键
                Err(_) => return Ok(Vec::new()),
            },
        };

        let files = tokio::task::spawn_blocking(move || {
            if start.is_dir() {
                walk_files(&start)
            } else {
                Ok(Vec::new())
            }
        })
        .await
        .map_err(|e| StorageError::transport(format!("列举任务失败: {}", e)))?
        .map_err(|e| StorageError::from_io(e, format!("bucket {}", bucket)))?;

        // 按键排序，与S3的字典序一致
        let mut entries: BTreeMap<String, ObjectInfo> = BTreeMap::new();
        for (rel, metadata) in files {
            let key = format!("{}{}", parent, rel);
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            if !recursive {
                if let Some(idx) = rest.find('/') {
                    let common = format!("{}{}", prefix, &rest[..=idx]);
                    entries.entry(common.clone()).or_insert(ObjectInfo {
                        key: common,
                        size: 0,
                        last_modified: None,
                        etag: None,
                        is_prefix: true,
                    });
                    continue;
                }
            }
            entries.insert(
                key.clone(),
                ObjectInfo {
                    size: metadata.len(),
                    last_modified: modified_time(&metadata),
                    etag: None,
                    key,
                    is_prefix: false,
                },
            );
        }
        Ok(entries.into_values().collect())
    }

    async fn read_meta(&self, bucket: &str, key: &str) -> Option<ObjectMeta> {
        let path = self.meta_path(bucket, key).ok()?;
        let content = tokio::fs::read(&path).await.ok()?;
        serde_json::from_slice(&content).ok()
    }

    /// Copy the reader into `tmp`, hashing on the way / 写入临时文件并计算哈希
    async fn write_temp(
        tmp: &Path,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> std::io::Result<(u64, String)> {
        let mut file = tokio::fs::File::create(tmp).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut size = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n]).await?;
            size += n as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok((size, hex::encode(hasher.finalize())))
    }
}

/// Walk `dir` collecting (relative key, metadata) for every regular file / 递归遍历文件
fn walk_files(dir: &Path) -> std::io::Result<Vec<(String, std::fs::Metadata)>> {
    let mut files = Vec::new();
    let mut stack = vec![(dir.to_path_buf(), String::new())];
    while let Some((path, rel)) = stack.pop() {
        for entry in std::fs::read_dir(&path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let key = if rel.is_empty() { name } else { format!("{}/{}", rel, name) };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push((entry.path(), key));
            } else if file_type.is_file() {
                files.push((key, entry.metadata()?));
            }
        }
    }
    Ok(files)
}

fn modified_time(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl ObjectDriver for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    async fn make_bucket(&self, bucket: &str, _region: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::from_io(e, format!("root {:?}", self.root)))?;

        match tokio::fs::create_dir(self.bucket_dir(bucket)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(bucket.to_string()))
            }
            Err(e) => Err(StorageError::from_io(e, format!("bucket {}", bucket))),
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match tokio::fs::metadata(self.bucket_dir(bucket)).await {
            Ok(m) => Ok(m.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::from_io(e, format!("bucket {}", bucket))),
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        content_type: &str,
    ) -> Result<UploadInfo> {
        self.require_bucket(bucket).await?;
        let target = self.object_path(bucket, key)?;
        let meta_path = self.meta_path(bucket, key)?;

        let tmp_dir = self.root.join(TMP_DIR);
        tokio::fs::create_dir_all(&tmp_dir)
            .await
            .map_err(|e| StorageError::from_io(e, format!("{:?}", tmp_dir)))?;
        let tmp = tmp_dir.join(format!("{}.part", uuid::Uuid::new_v4()));

        let (size, etag) = match Self::write_temp(&tmp, reader).await {
            Ok(done) => done,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(StorageError::transport(format!("写入对象失败 {}/{}: {}", bucket, key, e)));
            }
        };

        // 确保父目录存在后再原子替换
        let placed = async {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::rename(&tmp, &target).await
        }
        .await;
        if let Err(e) = placed {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::transport(format!("写入对象失败 {}/{}: {}", bucket, key, e)));
        }

        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            etag: etag.clone(),
            version_id: uuid::Uuid::new_v4().to_string(),
        };
        let meta_json = serde_json::to_vec(&meta)
            .map_err(|e| StorageError::transport(format!("序列化元数据失败: {}", e)))?;
        let written = async {
            if let Some(parent) = meta_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&meta_path, meta_json).await
        }
        .await;
        if let Err(e) = written {
            tracing::warn!("写入对象元数据失败 {}/{}: {}", bucket, key, e);
        }

        tracing::debug!("Local PutObject: {}/{} ({} bytes)", bucket, key, size);
        Ok(UploadInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            etag: Some(etag),
            version_id: Some(meta.version_id),
        })
    }

    async fn open_reader(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        self.require_bucket(bucket).await?;
        let path = self.object_path(bucket, key)?;
        let location = format!("{}/{}", bucket, key);

        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| StorageError::from_io(e, &location))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| StorageError::from_io(e, &location))?;
        if !metadata.is_file() {
            return Err(StorageError::not_found(location));
        }
        Ok(Box::new(file))
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat> {
        self.require_bucket(bucket).await?;
        let path = self.object_path(bucket, key)?;
        let location = format!("{}/{}", bucket, key);

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StorageError::from_io(e, &location))?;
        if !metadata.is_file() {
            return Err(StorageError::not_found(location));
        }

        let meta = self.read_meta(bucket, key).await;
        Ok(ObjectStat {
            key: key.to_string(),
            size: metadata.len(),
            content_type: Some(
                meta.as_ref()
                    .map(|m| m.content_type.clone())
                    .unwrap_or_else(|| guess_content_type(key)),
            ),
            etag: meta.map(|m| m.etag),
            last_modified: modified_time(&metadata),
        })
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let dir = self.require_bucket(bucket).await?;

        let cached = continuation.as_ref().and_then(|token| {
            self.take_cursor(&CursorKey {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                recursive,
                token: token.clone(),
            })
        });
        let mut objects = match cached {
            Some(rest) => rest,
            None => {
                let mut all = self.collect_entries(bucket, dir, prefix, recursive).await?;
                // 游标失效时按键继续
                if let Some(token) = &continuation {
                    let skip = all.partition_point(|o| o.key.as_str() <= token.as_str());
                    all.drain(..skip);
                }
                all
            }
        };

        let rest = if objects.len() > LIST_PAGE_SIZE {
            objects.split_off(LIST_PAGE_SIZE)
        } else {
            Vec::new()
        };
        let next_token = if rest.is_empty() {
            None
        } else {
            objects.last().map(|o| o.key.clone())
        };
        if let Some(token) = &next_token {
            self.store_cursor(
                CursorKey {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                    recursive,
                    token: token.clone(),
                },
                rest,
            );
        }

        tracing::debug!(
            "Local ListObjects: bucket={}, prefix={}, entries={}, more={}",
            bucket,
            prefix,
            objects.len(),
            next_token.is_some()
        );
        Ok(ListPage { objects, next_token })
    }

    async fn presign_get(&self, bucket: &str, key: &str, expires: Duration) -> Result<String> {
        let ttl = chrono::Duration::from_std(expires)
            .map_err(|e| StorageError::invalid(format!("expiry out of range: {}", e)))?;
        self.signer.sign(bucket, key, Utc::now() + ttl)
    }
}
