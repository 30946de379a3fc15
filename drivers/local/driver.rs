use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::storage::{
    Appender, Capability, Multiparter, Object, Part, PartReceipt, StorageDriver, WriteOptions,
};

/// Staging directory for multipart uploads, relative to root / 分片暂存目录
const MULTIPART_DIR: &str = ".multipart";

#[derive(Clone)]
pub struct LocalDriver {
    root: PathBuf,
    capability: Capability,
}

impl LocalDriver {
    /// Create root if missing and canonicalize it / 初始化根目录
    pub fn open(root: &str, capability: Capability) -> Result<Self> {
        let root = PathBuf::from(root);
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }
        let canonical_root = root.canonicalize()?;

        tracing::info!("Local driver initialized, root: {:?}, capability: {:?}", canonical_root, capability);
        Ok(Self { root: canonical_root, capability })
    }

    /// Get root directory / 获取根目录
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Normalize path to prevent directory traversal attacks / 规范化路径
    fn normalize_path(&self, path: &str) -> Result<PathBuf> {
        let path = path.trim_start_matches('/').replace('\\', "/");

        let normalized: Vec<&str> = path.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
        for component in &normalized {
            if *component == ".." {
                return Err(anyhow!("Access path exceeds root directory scope"));
            }
        }
        if normalized.first() == Some(&MULTIPART_DIR) {
            return Err(anyhow!("Path is reserved for multipart staging: {}", path));
        }
        if normalized.is_empty() {
            return Err(anyhow!("Path does not name a file"));
        }

        Ok(self.root.join(normalized.join("/")))
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(MULTIPART_DIR).join(upload_id)
    }

    fn part_path(&self, upload_id: &str, index: u32) -> PathBuf {
        self.staging_dir(upload_id).join(format!("{:08}", index))
    }

    async fn ensure_parent(path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Appender for LocalDriver {
    async fn create_append(&self, path: &str, _options: &WriteOptions) -> Result<Object> {
        let full_path = self.normalize_path(path)?;
        Self::ensure_parent(&full_path).await?;
        tokio::fs::File::create(&full_path).await?;
        Ok(Object::new(path))
    }

    async fn write_append(
        &self,
        object: &mut Object,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
    ) -> Result<u64> {
        let full_path = self.normalize_path(&object.path)?;
        let mut file = OpenOptions::new().append(true).open(&full_path).await?;

        let current = file.metadata().await?.len();
        if current != object.append_offset {
            return Err(anyhow!(
                "append position mismatch: file has {} bytes, writer is at {}",
                current,
                object.append_offset
            ));
        }

        let copied = tokio::io::copy(&mut reader.take(size), &mut file).await;
        let result: Result<u64> = match copied {
            Ok(written) if written == size => file.flush().await.map(|_| written).map_err(Into::into),
            Ok(written) => Err(anyhow!("short read: expected {} bytes, got {}", size, written)),
            Err(e) => Err(anyhow!("append copy failed: {}", e)),
        };

        let written = match result {
            Ok(written) => written,
            Err(e) => {
                // 失败时回滚到追加前的长度
                file.set_len(object.append_offset).await?;
                return Err(e);
            }
        };

        object.append_offset += written;
        Ok(written)
    }
}

#[async_trait]
impl Multiparter for LocalDriver {
    async fn create_multipart(&self, path: &str, _options: &WriteOptions) -> Result<Object> {
        self.normalize_path(path)?;
        let upload_id = uuid::Uuid::new_v4().to_string();
        tokio::fs::create_dir_all(self.staging_dir(&upload_id)).await?;
        Ok(Object::new(path).with_upload_id(upload_id))
    }

    async fn write_multipart(
        &self,
        object: &Object,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
        index: u32,
    ) -> Result<PartReceipt> {
        let upload_id = object.multipart_id()?;
        let staging = self.staging_dir(upload_id);
        if !staging.exists() {
            return Err(anyhow!("multipart upload not found: {}", upload_id));
        }

        let part_path = self.part_path(upload_id, index);
        let mut file = tokio::fs::File::create(&part_path).await?;
        let copied = tokio::io::copy(&mut reader.take(size), &mut file).await;
        let result: Result<u64> = match copied {
            Ok(written) if written == size => file.flush().await.map(|_| written).map_err(Into::into),
            Ok(written) => Err(anyhow!("short read: expected {} bytes, got {}", size, written)),
            Err(e) => Err(anyhow!("part copy failed: {}", e)),
        };
        drop(file);

        match result {
            Ok(written) => Ok(PartReceipt::new(written)),
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                Err(e)
            }
        }
    }

    async fn complete_multipart(&self, object: &Object, parts: &[Part]) -> Result<()> {
        let upload_id = object.multipart_id()?;
        let full_path = self.normalize_path(&object.path)?;
        let staging = self.staging_dir(upload_id);

        // 先在暂存目录中拼接，完成后再移动到目标位置
        let assembled_path = staging.join("assembled");
        let mut assembled = tokio::fs::File::create(&assembled_path).await?;
        for part in parts {
            let part_path = self.part_path(upload_id, part.index);
            let mut part_file = tokio::fs::File::open(&part_path)
                .await
                .map_err(|e| anyhow!("part {} unavailable: {}", part.index, e))?;
            let len = part_file.metadata().await?.len();
            if len != part.size {
                return Err(anyhow!(
                    "part {} size mismatch: stored {}, listed {}",
                    part.index,
                    len,
                    part.size
                ));
            }
            tokio::io::copy(&mut part_file, &mut assembled).await?;
        }
        assembled.flush().await?;
        drop(assembled);

        Self::ensure_parent(&full_path).await?;
        tokio::fs::rename(&assembled_path, &full_path).await?;
        tokio::fs::remove_dir_all(&staging).await?;

        tracing::debug!("Local multipart completed: {:?}, parts={}", full_path, parts.len());
        Ok(())
    }
}

impl StorageDriver for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    fn capabilities(&self) -> Capability {
        self.capability
    }

    fn appender(&self) -> Option<Arc<dyn Appender>> {
        if !self.capability.can_append {
            return None;
        }
        Some(Arc::new(self.clone()))
    }

    fn multiparter(&self) -> Option<Arc<dyn Multiparter>> {
        if !self.capability.can_multipart_upload {
            return None;
        }
        Some(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DriverBox, Protocol, ProtocolPreference};
    use crate::writer::{ObjectWriter, Writer};

    fn driver(dir: &tempfile::TempDir) -> LocalDriver {
        LocalDriver::open(dir.path().to_str().unwrap(), Capability::both()).unwrap()
    }

    #[test]
    fn test_normalize_path() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(&dir);

        assert_eq!(driver.normalize_path("/a/./b").unwrap(), driver.root().join("a/b"));
        assert!(driver.normalize_path("/a/../../etc/passwd").is_err());
        assert!(driver.normalize_path("/.multipart/x").is_err());
        assert!(driver.normalize_path("/").is_err());
    }

    #[tokio::test]
    async fn test_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle: DriverBox = Arc::new(driver(&dir));

        let mut writer = Writer::new(&handle, "/log/a.txt", &WriteOptions::default()).await.unwrap();
        assert_eq!(writer.protocol(), Protocol::Append);
        writer.write(b"ab").await.unwrap();
        writer.write(b"cd").await.unwrap();
        writer.finalize().await.unwrap();

        let content = std::fs::read(dir.path().join("log/a.txt")).unwrap();
        assert_eq!(content, b"abcd");
    }

    #[tokio::test]
    async fn test_append_short_read_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(&dir);

        let mut object = driver.create_append("/a.txt", &WriteOptions::default()).await.unwrap();
        let mut ok: &[u8] = b"xy";
        driver.write_append(&mut object, &mut ok, 2).await.unwrap();

        let mut short: &[u8] = b"z";
        assert!(driver.write_append(&mut object, &mut short, 4).await.is_err());
        assert_eq!(object.append_offset, 2);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"xy");
    }

    /// Yields `data` once, then fails every read
    struct FailingReader {
        data: Option<Vec<u8>>,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            match self.data.take() {
                Some(data) => {
                    buf.put_slice(&data);
                    std::task::Poll::Ready(Ok(()))
                }
                None => std::task::Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "source went away",
                ))),
            }
        }
    }

    #[tokio::test]
    async fn test_append_reader_error_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(&dir);

        let mut object = driver.create_append("/a.txt", &WriteOptions::default()).await.unwrap();
        let mut ok: &[u8] = b"xy";
        driver.write_append(&mut object, &mut ok, 2).await.unwrap();

        let mut failing = FailingReader { data: Some(b"zz".to_vec()) };
        assert!(driver.write_append(&mut object, &mut failing, 4).await.is_err());
        assert_eq!(object.append_offset, 2);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"xy");

        let mut retry: &[u8] = b"cd";
        assert_eq!(driver.write_append(&mut object, &mut retry, 2).await.unwrap(), 2);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"xycd");
    }

    #[tokio::test]
    async fn test_multipart_reader_error_discards_part() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(&dir);

        let object = driver.create_multipart("/x.bin", &WriteOptions::default()).await.unwrap();
        let mut failing = FailingReader { data: Some(b"zz".to_vec()) };
        assert!(driver.write_multipart(&object, &mut failing, 4, 0).await.is_err());

        let upload_id = object.multipart_id().unwrap();
        assert!(!driver.part_path(upload_id, 0).exists());
    }

    #[tokio::test]
    async fn test_multipart_assembles_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let handle: DriverBox = Arc::new(driver(&dir));
        let options = WriteOptions::default().with_protocol(ProtocolPreference::Multipart);

        let mut writer = Writer::new(&handle, "/big/file.bin", &options).await.unwrap();
        writer.write(&[1u8; 1024]).await.unwrap();
        writer.write(&[2u8; 2048]).await.unwrap();
        assert!(!dir.path().join("big/file.bin").exists());
        writer.finalize().await.unwrap();

        let content = std::fs::read(dir.path().join("big/file.bin")).unwrap();
        assert_eq!(content.len(), 3072);
        assert!(content[..1024].iter().all(|b| *b == 1));
        assert!(content[1024..].iter().all(|b| *b == 2));

        let staging: Vec<_> = std::fs::read_dir(dir.path().join(MULTIPART_DIR)).unwrap().collect();
        assert!(staging.is_empty());
    }

    #[tokio::test]
    async fn test_multipart_complete_rejects_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let driver = driver(&dir);

        let object = driver.create_multipart("/x.bin", &WriteOptions::default()).await.unwrap();
        let mut data: &[u8] = b"12345";
        driver.write_multipart(&object, &mut data, 5, 0).await.unwrap();

        let parts = vec![Part { index: 0, size: 4, etag: None }];
        assert!(driver.complete_multipart(&object, &parts).await.is_err());
        assert!(!dir.path().join("x.bin").exists());
    }

    #[tokio::test]
    async fn test_append_disabled_by_capability() {
        let dir = tempfile::tempdir().unwrap();
        let driver = LocalDriver::open(dir.path().to_str().unwrap(), Capability::multipart_only()).unwrap();
        assert!(driver.appender().is_none());
        assert!(driver.multiparter().is_some());
    }
}
