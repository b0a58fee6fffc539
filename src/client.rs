//! Object storage client facade / 对象存储客户端
//!
//! Every operation validates its arguments, makes one driver call (one request or
//! stream) and returns a typed [`StorageError`]. No retries, no cached bucket state.

use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::ClientConfig;
use crate::error::{Result, StorageError};
use crate::storage::{create_driver, ObjectDriver, ObjectInfo, ObjectStat, UploadInfo};
use crate::utils::{guess_content_type, normalize_key, normalize_prefix, validate_bucket_name, MAX_PRESIGN_SECS};

const DEFAULT_REGION: &str = "us-east-1";

/// Thin facade over an [`ObjectDriver`]; cheap to clone and share across tasks / 客户端
#[derive(Clone)]
pub struct ObjectStoreClient {
    driver: Arc<dyn ObjectDriver>,
    region: String,
    timeout: Option<Duration>,
}

/// Wrap a driver call in the optional per-operation deadline / 超时控制
async fn with_deadline<T, F>(timeout: Option<Duration>, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StorageError::transport(format!("{} timed out after {:?}", what, limit)))?,
        None => fut.await,
    }
}

/// Removes the temporary download file unless disarmed / 临时文件守卫
struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove temporary file {:?}: {}", path, e);
                }
            }
        }
    }
}

/// `<dir>/.<name>.<uuid>.part` next to the destination / 目标文件旁的临时路径
fn temp_sibling(dest: &Path) -> Result<PathBuf> {
    let name = dest
        .file_name()
        .ok_or_else(|| StorageError::invalid(format!("destination has no file name: {:?}", dest)))?;
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(dir.join(format!(".{}.{}.part", name.to_string_lossy(), uuid::Uuid::new_v4())))
}

/// Pagination state of a listing stream / 列举状态
struct ListState {
    driver: Arc<dyn ObjectDriver>,
    timeout: Option<Duration>,
    bucket: String,
    prefix: String,
    recursive: bool,
    token: Option<String>,
    buffer: VecDeque<ObjectInfo>,
    finished: bool,
}

impl ObjectStoreClient {
    /// Build the configured driver; fails with `Config` on bad settings / 创建客户端
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let driver = create_driver(config)?;
        Ok(Self {
            driver,
            region: config.region.clone(),
            timeout: config.timeout(),
        })
    }

    pub fn with_driver(driver: Arc<dyn ObjectDriver>) -> Self {
        Self {
            driver,
            region: DEFAULT_REGION.to_string(),
            timeout: None,
        }
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    /// Create a bucket; an existing bucket is `AlreadyExists` / 创建存储桶
    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        validate_bucket_name(bucket)?;
        let created = with_deadline(
            self.timeout,
            "create bucket",
            self.driver.make_bucket(bucket, &self.region),
        )
        .await;

        let create_err = match created {
            Ok(()) => {
                tracing::info!("Bucket created: {} ({})", bucket, self.region);
                return Ok(());
            }
            Err(e) => e,
        };

        // 创建失败后再查一次，区分"已存在"与"被拒绝"
        match with_deadline(self.timeout, "bucket exists", self.driver.bucket_exists(bucket)).await {
            Ok(true) => {
                tracing::debug!("Bucket already exists: {}", bucket);
                Err(StorageError::AlreadyExists(bucket.to_string()))
            }
            Ok(false) => Err(create_err),
            Err(check_err) => {
                tracing::debug!("Existence re-check failed for {}: {}", bucket, check_err);
                Err(create_err)
            }
        }
    }

    /// Idempotent provisioning: Ok(true) if created, Ok(false) if it was there / 确保存储桶存在
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<bool> {
        match self.create_bucket(bucket).await {
            Ok(()) => Ok(true),
            Err(StorageError::AlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        validate_bucket_name(bucket)?;
        with_deadline(self.timeout, "bucket exists", self.driver.bucket_exists(bucket)).await
    }

    /// Upload a local file, streamed / 上传本地文件
    ///
    /// A missing `local_path` is `NotFound` and the driver is never contacted.
    /// An empty `content_type` is guessed from the key.
    pub async fn put_object(
        &self,
        local_path: impl AsRef<Path>,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<UploadInfo> {
        validate_bucket_name(bucket)?;
        let key = normalize_key(key)?;
        let path = local_path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::from_io(e, path.display()))?;
        if metadata.is_dir() {
            return Err(StorageError::invalid(format!("{} is a directory", path.display())));
        }
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| StorageError::from_io(e, path.display()))?;

        let content_type = if content_type.trim().is_empty() {
            guess_content_type(&key)
        } else {
            content_type.to_string()
        };

        let info = with_deadline(
            self.timeout,
            "put object",
            self.driver.put_object(bucket, &key, &mut file, &content_type),
        )
        .await?;

        if info.size != metadata.len() {
            tracing::warn!(
                "Upload size differs from file size for {}: {} != {}",
                path.display(),
                info.size,
                metadata.len()
            );
            return Err(StorageError::transport(format!(
                "short upload {}/{}: sent {} of {} bytes",
                bucket,
                key,
                info.size,
                metadata.len()
            )));
        }
        tracing::info!("Uploaded {} to {}/{} ({} bytes)", path.display(), bucket, key, info.size);
        Ok(info)
    }

    /// Download an object to `dest`, overwriting it; returns bytes written / 下载对象
    ///
    /// Data goes to a temporary sibling first and is renamed over `dest` on success.
    pub async fn get_object(&self, bucket: &str, key: &str, dest: impl AsRef<Path>) -> Result<u64> {
        validate_bucket_name(bucket)?;
        let key = normalize_key(key)?;
        let dest = dest.as_ref();
        let location = format!("{}/{}", bucket, key);

        let transfer = async {
            let mut reader = self.driver.open_reader(bucket, &key).await?;

            let mut guard = TempFileGuard::new(temp_sibling(dest)?);
            let mut file = tokio::fs::File::create(guard.path())
                .await
                .map_err(|e| StorageError::from_io(e, dest.display()))?;

            let copied = async {
                let n = tokio::io::copy(&mut reader, &mut file).await?;
                file.flush().await?;
                file.sync_all().await?;
                Ok::<u64, std::io::Error>(n)
            }
            .await;
            // 释放远端流与本地句柄后再重命名
            drop(file);
            drop(reader);

            let bytes = copied.map_err(|e| {
                StorageError::transport(format!("download {} failed: {}", location, e))
            })?;
            tokio::fs::rename(guard.path(), dest)
                .await
                .map_err(|e| StorageError::from_io(e, dest.display()))?;
            guard.disarm();
            Ok::<u64, StorageError>(bytes)
        };

        let bytes = with_deadline(self.timeout, "get object", transfer).await?;
        tracing::info!("Downloaded {} to {} ({} bytes)", location, dest.display(), bytes);
        Ok(bytes)
    }

    /// Lazy listing of objects under `prefix` / 惰性列举对象
    ///
    /// Pages are requested as the stream is polled. A failed page is yielded once and
    /// ends the stream; the stream cannot be restarted.
    pub fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> BoxStream<'static, Result<ObjectInfo>> {
        if let Err(e) = validate_bucket_name(bucket) {
            return stream::once(async move { Err(e) }).boxed();
        }

        let state = ListState {
            driver: self.driver.clone(),
            timeout: self.timeout,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(prefix),
            recursive,
            token: None,
            buffer: VecDeque::new(),
            finished: false,
        };

        stream::unfold(state, |mut st| async move {
            loop {
                if let Some(obj) = st.buffer.pop_front() {
                    return Some((Ok(obj), st));
                }
                if st.finished {
                    return None;
                }

                let page = with_deadline(
                    st.timeout,
                    "list objects",
                    st.driver.list_page(&st.bucket, &st.prefix, st.recursive, st.token.take()),
                )
                .await;
                match page {
                    Ok(page) => {
                        st.finished = page.next_token.is_none();
                        st.token = page.next_token;
                        st.buffer.extend(page.objects);
                    }
                    Err(e) => {
                        tracing::warn!("Listing {} aborted: {}", st.bucket, e);
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
            }
        })
        .boxed()
    }

    /// Object metadata; `NotFound` if absent / 获取对象元数据
    pub async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat> {
        validate_bucket_name(bucket)?;
        let key = normalize_key(key)?;
        with_deadline(self.timeout, "stat object", self.driver.stat_object(bucket, &key)).await
    }

    /// Ok(false) for a missing key; a missing bucket stays an error / 检查对象是否存在
    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.stat_object(bucket, key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(what)) => {
                // HEAD 的 404 无法区分 NoSuchKey 与 NoSuchBucket
                if self.bucket_exists(bucket).await? {
                    Ok(false)
                } else {
                    Err(StorageError::NotFound(what))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Presigned GET URL valid for `ttl` (1s ..= 7 days) / 生成预签名下载URL
    pub async fn presigned_get_url(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String> {
        validate_bucket_name(bucket)?;
        let key = normalize_key(key)?;
        if ttl.as_secs() < 1 || ttl.as_secs() > MAX_PRESIGN_SECS {
            return Err(StorageError::invalid(format!(
                "expiry must be between 1 second and {} seconds, got {:?}",
                MAX_PRESIGN_SECS, ttl
            )));
        }

        let url = with_deadline(self.timeout, "presign", self.driver.presign_get(bucket, &key, ttl)).await?;
        tracing::debug!("Presigned GET for {}/{} valid {:?}", bucket, key, ttl);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::local::LocalDriver;
    use crate::storage::{ListPage, ObjectReader};
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::io::AsyncRead;

    struct Fixture {
        _dir: TempDir,
        scratch: PathBuf,
        local: Arc<LocalDriver>,
        client: ObjectStoreClient,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        let local = Arc::new(LocalDriver::with_root(
            dir.path().join("store"),
            "http://localhost:9000",
            "secret",
        )
        .unwrap());
        let client = ObjectStoreClient::with_driver(local.clone());
        Fixture { _dir: dir, scratch, local, client }
    }

    fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    /// Scripted driver for failure paths / 用于失败路径的脚本驱动
    #[derive(Default)]
    struct ScriptedDriver {
        calls: AtomicUsize,
        bucket_present: bool,
        pages: Mutex<VecDeque<Result<ListPage>>>,
        delay: Option<Duration>,
        broken_stream: bool,
        uploaded_size: Option<u64>,
    }

    impl ScriptedDriver {
        async fn enter(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn info(key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size: 1,
            last_modified: None,
            etag: None,
            is_prefix: false,
        }
    }

    #[async_trait]
    impl ObjectDriver for ScriptedDriver {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn make_bucket(&self, _bucket: &str, _region: &str) -> Result<()> {
            self.enter().await;
            Err(StorageError::transport("HTTP 403"))
        }

        async fn bucket_exists(&self, _bucket: &str) -> Result<bool> {
            self.enter().await;
            Ok(self.bucket_present)
        }

        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            _reader: &mut (dyn AsyncRead + Unpin + Send),
            _content_type: &str,
        ) -> Result<UploadInfo> {
            self.enter().await;
            match self.uploaded_size {
                Some(size) => Ok(UploadInfo {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    size,
                    etag: None,
                    version_id: None,
                }),
                None => Err(StorageError::transport("HTTP 500")),
            }
        }

        async fn open_reader(&self, _bucket: &str, _key: &str) -> Result<ObjectReader> {
            self.enter().await;
            if self.broken_stream {
                let chunks: Vec<std::io::Result<&'static [u8]>> = vec![
                    Ok(&b"partial"[..]),
                    Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
                ];
                return Ok(Box::new(tokio_util::io::StreamReader::new(stream::iter(chunks))));
            }
            Ok(Box::new(Cursor::new(b"payload".to_vec())))
        }

        async fn stat_object(&self, bucket: &str, key: &str) -> Result<ObjectStat> {
            self.enter().await;
            Err(StorageError::not_found(format!("{}/{}", bucket, key)))
        }

        async fn list_page(
            &self,
            _bucket: &str,
            _prefix: &str,
            _recursive: bool,
            _continuation: Option<String>,
        ) -> Result<ListPage> {
            self.enter().await;
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ListPage::default()))
        }

        async fn presign_get(&self, _bucket: &str, _key: &str, _expires: Duration) -> Result<String> {
            self.enter().await;
            Ok("http://example/signed".to_string())
        }
    }

    #[tokio::test]
    async fn test_create_bucket_twice_reports_already_exists() {
        let fx = fixture();
        fx.client.create_bucket("palm-attendance").await.unwrap();

        let err = fx.client.create_bucket("palm-attendance").await.unwrap_err();
        assert!(err.is_already_exists());
        assert!(fx.client.bucket_exists("palm-attendance").await.unwrap());

        assert!(!fx.client.ensure_bucket("palm-attendance").await.unwrap());
        assert!(fx.client.ensure_bucket("fresh-bucket").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_create_keeps_original_error() {
        let driver = Arc::new(ScriptedDriver::default());
        let client = ObjectStoreClient::with_driver(driver.clone());

        match client.create_bucket("denied-bucket").await {
            Err(StorageError::Transport(msg)) => assert!(msg.contains("403")),
            other => panic!("unexpected result: {:?}", other),
        }
        // create + existence re-check
        assert_eq!(driver.calls(), 2);

        let present = Arc::new(ScriptedDriver {
            bucket_present: true,
            ..Default::default()
        });
        let client = ObjectStoreClient::with_driver(present);
        assert!(client.create_bucket("taken-bucket").await.unwrap_err().is_already_exists());
    }

    #[tokio::test]
    async fn test_invalid_bucket_name_skips_driver() {
        let driver = Arc::new(ScriptedDriver::default());
        let client = ObjectStoreClient::with_driver(driver.clone());

        assert!(matches!(
            client.create_bucket("Bad_Name").await,
            Err(StorageError::InvalidArgument(_))
        ));
        let first = client.list_objects("x", "", true).next().await.unwrap();
        assert!(matches!(first, Err(StorageError::InvalidArgument(_))));
        assert_eq!(driver.calls(), 0);
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let fx = fixture();
        fx.client.create_bucket("docs").await.unwrap();

        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let src = write_file(&fx.scratch, "template.xlsx", &data);

        let info = fx
            .client
            .put_object(&src, "docs", "/temp/template.xlsx", "")
            .await
            .unwrap();
        assert_eq!(info.key, "temp/template.xlsx");
        assert_eq!(info.size, data.len() as u64);
        assert!(info.etag.is_some());

        let stat = fx.client.stat_object("docs", "temp/template.xlsx").await.unwrap();
        assert_eq!(
            stat.content_type.as_deref(),
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        );

        let dest = fx.scratch.join("download.xlsx");
        std::fs::write(&dest, b"stale content that must be replaced").unwrap();
        let bytes = fx.client.get_object("docs", "temp/template.xlsx", &dest).await.unwrap();
        assert_eq!(bytes, data.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[tokio::test]
    async fn test_put_missing_file_never_contacts_driver() {
        let driver = Arc::new(ScriptedDriver::default());
        let client = ObjectStoreClient::with_driver(driver.clone());
        let dir = tempfile::tempdir().unwrap();

        let err = client
            .put_object(dir.path().join("nope.bin"), "docs", "nope.bin", "application/octet-stream")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(driver.calls(), 0);

        let err = client
            .put_object(dir.path(), "docs", "dir.bin", "")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        assert_eq!(driver.calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_is_transport() {
        let driver = Arc::new(ScriptedDriver::default());
        let client = ObjectStoreClient::with_driver(driver.clone());
        let dir = tempfile::tempdir().unwrap();
        let src = write_file(dir.path(), "a.txt", b"hello");

        let err = client.put_object(&src, "docs", "a.txt", "text/plain").await.unwrap_err();
        assert!(matches!(err, StorageError::Transport(_)));
        assert_eq!(driver.calls(), 1);
    }

    #[tokio::test]
    async fn test_short_upload_is_transport() {
        let driver = Arc::new(ScriptedDriver {
            uploaded_size: Some(3),
            ..Default::default()
        });
        let client = ObjectStoreClient::with_driver(driver.clone());
        let dir = tempfile::tempdir().unwrap();
        let src = write_file(dir.path(), "a.txt", b"hello");

        match client.put_object(&src, "docs", "a.txt", "text/plain").await {
            Err(StorageError::Transport(msg)) => assert!(msg.contains("3 of 5")),
            other => panic!("unexpected result: {:?}", other),
        }

        let exact = Arc::new(ScriptedDriver {
            uploaded_size: Some(5),
            ..Default::default()
        });
        let client = ObjectStoreClient::with_driver(exact);
        assert_eq!(client.put_object(&src, "docs", "a.txt", "").await.unwrap().size, 5);
    }

    #[tokio::test]
    async fn test_get_missing_object_leaves_no_file() {
        let fx = fixture();
        fx.client.create_bucket("docs").await.unwrap();

        let dest = fx.scratch.join("out.bin");
        let err = fx.client.get_object("docs", "missing.bin", &dest).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(&fx.scratch).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_broken_download_keeps_destination() {
        let driver = Arc::new(ScriptedDriver {
            broken_stream: true,
            ..Default::default()
        });
        let client = ObjectStoreClient::with_driver(driver);
        let dir = tempfile::tempdir().unwrap();
        let dest = write_file(dir.path(), "report.xlsx", b"previous");

        let err = client.get_object("docs", "report.xlsx", &dest).await.unwrap_err();
        assert!(matches!(err, StorageError::Transport(_)));
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
        // 临时文件已删除
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_object_exists() {
        let fx = fixture();
        fx.client.create_bucket("docs").await.unwrap();

        assert!(!fx.client.object_exists("docs", "public/a.xlsx").await.unwrap());

        let src = write_file(&fx.scratch, "a.xlsx", b"sheet");
        fx.client.put_object(&src, "docs", "public/a.xlsx", "").await.unwrap();
        assert!(fx.client.object_exists("docs", "public/a.xlsx").await.unwrap());
        assert!(fx.client.object_exists("docs", "/public/a.xlsx").await.unwrap());
        assert!(!fx.client.object_exists("docs", "public/a").await.unwrap());

        // 存储桶不存在时返回错误而不是 false
        let err = fx.client.object_exists("ghost-bucket", "a.xlsx").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_returns_exactly_prefixed_keys() {
        let fx = fixture();
        fx.client.create_bucket("docs").await.unwrap();
        let src = write_file(&fx.scratch, "f.txt", b"x");
        for key in [
            "public/excel_template/template_berkas_organisasi.xlsx",
            "public/excel_template/template_berkas_organisasi_v2.xlsx",
            "public/excel_template/other.xlsx",
            "public/images/logo.png",
            "private/template_berkas_organisasi.xlsx",
        ] {
            fx.client.put_object(&src, "docs", key, "").await.unwrap();
        }

        let listed: Vec<ObjectInfo> = fx
            .client
            .list_objects("docs", "public/excel_template/template_berkas_organisasi", true)
            .try_collect()
            .await
            .unwrap();
        let mut keys: Vec<_> = listed.into_iter().map(|o| o.key).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "public/excel_template/template_berkas_organisasi.xlsx",
                "public/excel_template/template_berkas_organisasi_v2.xlsx",
            ]
        );

        let flat: Vec<ObjectInfo> = fx.client.list_objects("docs", "public/", false).try_collect().await.unwrap();
        assert!(flat.iter().all(|o| o.is_prefix));
        assert_eq!(flat.len(), 2);
    }

    #[tokio::test]
    async fn test_list_stops_after_page_error() {
        let pages = VecDeque::from(vec![
            Ok(ListPage {
                objects: vec![info("a"), info("b")],
                next_token: Some("b".to_string()),
            }),
            Err(StorageError::transport("connection reset")),
            Ok(ListPage {
                objects: vec![info("c")],
                next_token: None,
            }),
        ]);
        let driver = Arc::new(ScriptedDriver {
            pages: Mutex::new(pages),
            ..Default::default()
        });
        let client = ObjectStoreClient::with_driver(driver.clone());

        let results: Vec<Result<ObjectInfo>> = client.list_objects("docs", "", true).collect().await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().key, "a");
        assert_eq!(results[1].as_ref().unwrap().key, "b");
        assert!(matches!(results[2], Err(StorageError::Transport(_))));
        assert_eq!(driver.calls(), 2);
    }

    #[tokio::test]
    async fn test_list_is_lazy() {
        let pages = VecDeque::from(vec![
            Ok(ListPage {
                objects: vec![info("a")],
                next_token: Some("a".to_string()),
            }),
            Ok(ListPage {
                objects: vec![info("b")],
                next_token: None,
            }),
        ]);
        let driver = Arc::new(ScriptedDriver {
            pages: Mutex::new(pages),
            ..Default::default()
        });
        let client = ObjectStoreClient::with_driver(driver.clone());

        let mut listing = client.list_objects("docs", "", true);
        assert_eq!(driver.calls(), 0);
        assert_eq!(listing.next().await.unwrap().unwrap().key, "a");
        assert_eq!(driver.calls(), 1);
        assert_eq!(listing.next().await.unwrap().unwrap().key, "b");
        assert!(listing.next().await.is_none());
        assert_eq!(driver.calls(), 2);
    }

    #[tokio::test]
    async fn test_presigned_url_expires() {
        let fx = fixture();
        fx.client.create_bucket("docs").await.unwrap();

        let url = fx
            .client
            .presigned_get_url("docs", "public/a.xlsx", Duration::from_secs(180))
            .await
            .unwrap();
        let now = chrono::Utc::now();
        assert!(fx.local.verify_presigned_at(&url, now));
        assert!(!fx.local.verify_presigned_at(&url, now + chrono::Duration::seconds(181)));
    }

    #[tokio::test]
    async fn test_presign_rejects_bad_expiry() {
        let driver = Arc::new(ScriptedDriver::default());
        let client = ObjectStoreClient::with_driver(driver.clone());

        for ttl in [Duration::from_millis(500), Duration::from_secs(MAX_PRESIGN_SECS + 1)] {
            let err = client.presigned_get_url("docs", "a.txt", ttl).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidArgument(_)));
        }
        assert_eq!(driver.calls(), 0);
        assert!(client
            .presigned_get_url("docs", "a.txt", Duration::from_secs(MAX_PRESIGN_SECS))
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_surfaces_transport_error() {
        let driver = Arc::new(ScriptedDriver {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let client = ObjectStoreClient::with_driver(driver).with_timeout(Duration::from_secs(5));

        match client.bucket_exists("slow-bucket").await {
            Err(StorageError::Transport(msg)) => assert!(msg.contains("timed out")),
            other => panic!("unexpected result: {:?}", other),
        }

        let first = client.list_objects("slow-bucket", "", true).next().await.unwrap();
        assert!(matches!(first, Err(StorageError::Transport(_))));
    }

    #[test]
    fn test_client_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::default();
        config.driver = crate::config::DriverKind::Local;
        config.local_root = dir.path().join("root").to_string_lossy().to_string();
        config.secret_key = "sk".to_string();
        config.timeout_secs = 10;

        let client = ObjectStoreClient::new(&config).unwrap();
        assert_eq!(client.driver_name(), "local");

        config.endpoint = "not a host".to_string();
        assert!(matches!(ObjectStoreClient::new(&config), Err(StorageError::Config(_))));

        // 本地驱动没有密钥时无法签发预签名URL
        config.endpoint = "localhost:9000".to_string();
        config.secret_key.clear();
        assert!(matches!(ObjectStoreClient::new(&config), Err(StorageError::Config(_))));
    }
}
