use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncRead;

use super::error::{Result, WriterError};
use super::ObjectWriter;
use crate::storage::{Multiparter, Object, Part, Protocol, StorageDriver, WriteOptions};

/// Multipart writer / 分片写入器
///
/// Each write uploads one part. Parts are numbered from 0 in call order and the
/// index only advances once the backend accepted the part, so a failed write
/// can be retried at the same index. `finalize` hands the recorded parts to the
/// backend in index order.
pub struct MultipartWriter {
    multiparter: Arc<dyn Multiparter>,
    object: Object,
    parts: Vec<Part>,
    next_index: u32,
}

impl MultipartWriter {
    /// Start a multipart upload for `path`.
    ///
    /// Returns [`WriterError::MultiparterNotImplemented`] without any remote call
    /// if the driver does not support multipart upload.
    pub async fn new(driver: &dyn StorageDriver, path: &str, options: &WriteOptions) -> Result<Self> {
        let multiparter = driver
            .multiparter()
            .filter(|_| driver.capabilities().can_multipart_upload)
            .ok_or_else(|| WriterError::MultiparterNotImplemented {
                driver: driver.name().to_string(),
            })?;

        let object = multiparter
            .create_multipart(path, options)
            .await
            .map_err(|source| WriterError::BeginWrite { protocol: Protocol::Multipart, source })?;

        tracing::debug!(
            "create_multipart: driver={}, path={}, upload_id={:?}",
            driver.name(),
            path,
            object.upload_id
        );

        Ok(Self {
            multiparter,
            object,
            parts: Vec::new(),
            next_index: 0,
        })
    }

    /// Parts recorded so far, in index order / 已记录的分片
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Index the next write will use / 下一个分片序号
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn object(&self) -> &Object {
        &self.object
    }
}

#[async_trait]
impl ObjectWriter for MultipartWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<u64> {
        let mut reader = buf;
        self.write_from(&mut reader, buf.len() as u64).await
    }

    async fn write_from<R>(&mut self, reader: &mut R, size: u64) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let index = self.next_index;
        let next_index = index.checked_add(1).ok_or_else(|| WriterError::ChunkWrite {
            protocol: Protocol::Multipart,
            source: anyhow::anyhow!("part index {} is the last one available", index),
        })?;

        let receipt = self
            .multiparter
            .write_multipart(&self.object, reader, size, index)
            .await
            .map_err(|source| {
                tracing::warn!("write_multipart failed: path={}, index={}", self.object.path, index);
                WriterError::ChunkWrite { protocol: Protocol::Multipart, source }
            })?;

        self.parts.push(Part {
            index,
            size: receipt.size,
            etag: receipt.etag,
        });
        self.next_index = next_index;

        tracing::debug!("write_multipart: path={}, index={}, size={}", self.object.path, index, receipt.size);
        Ok(receipt.size)
    }

    async fn finalize(self) -> Result<()> {
        self.multiparter
            .complete_multipart(&self.object, &self.parts)
            .await
            .map_err(|source| WriterError::Finalize { protocol: Protocol::Multipart, source })?;

        tracing::debug!("complete_multipart: path={}, parts={}", self.object.path, self.parts.len());
        Ok(())
    }
}
