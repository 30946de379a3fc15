use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncRead;

use super::error::{Result, WriterError};
use super::ObjectWriter;
use crate::storage::{Appender, Object, Protocol, StorageDriver, WriteOptions};

/// Append writer / 追加写入器
///
/// Every write extends the tail of one remote object, in call order.
pub struct AppendWriter {
    appender: Arc<dyn Appender>,
    object: Object,
}

impl AppendWriter {
    /// Create the remote object for appending.
    ///
    /// Returns [`WriterError::AppenderNotImplemented`] without any remote call
    /// if the driver does not support append.
    pub async fn new(driver: &dyn StorageDriver, path: &str, options: &WriteOptions) -> Result<Self> {
        let appender = driver
            .appender()
            .filter(|_| driver.capabilities().can_append)
            .ok_or_else(|| WriterError::AppenderNotImplemented {
                driver: driver.name().to_string(),
            })?;

        let object = appender
            .create_append(path, options)
            .await
            .map_err(|source| WriterError::BeginWrite { protocol: Protocol::Append, source })?;

        tracing::debug!("create_append: driver={}, path={}", driver.name(), path);
        Ok(Self { appender, object })
    }

    /// Remote object being appended to / 当前写入的对象
    pub fn object(&self) -> &Object {
        &self.object
    }
}

#[async_trait]
impl ObjectWriter for AppendWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<u64> {
        let mut reader = buf;
        self.write_from(&mut reader, buf.len() as u64).await
    }

    async fn write_from<R>(&mut self, reader: &mut R, size: u64) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let n = self
            .appender
            .write_append(&mut self.object, reader, size)
            .await
            .map_err(|source| WriterError::ChunkWrite { protocol: Protocol::Append, source })?;
        tracing::debug!("write_append: path={}, size={}, written={}", self.object.path, size, n);
        Ok(n)
    }

    /// Append has nothing to complete remotely / 追加写入无需远端完成调用
    async fn finalize(self) -> Result<()> {
        tracing::debug!("append finalized: path={}", self.object.path);
        Ok(())
    }
}
