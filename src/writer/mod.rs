//! Unified object writer / 统一写入器
//!
//! Picks the upload protocol once from the driver's capabilities and forwards every
//! call to it. No buffering happens here: one write is one remote call.
//!
//! Writers are not safe for concurrent use; all methods take `&mut self` and
//! `finalize` consumes the writer.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::storage::{DriverBox, Protocol, ProtocolPreference, WriteOptions};

pub mod append;
pub mod error;
pub mod multipart;

#[cfg(test)]
pub(crate) mod mock;

pub use append::AppendWriter;
pub use error::{Result, WriterError};
pub use multipart::MultipartWriter;

/// Write contract shared by all writers / 写入器通用接口
#[async_trait]
pub trait ObjectWriter: Send + Sized {
    /// Write the whole buffer with one remote call / 写入整个缓冲区
    async fn write(&mut self, buf: &[u8]) -> Result<u64>;

    /// Write `size` bytes read from `reader` with one remote call / 从读取器写入指定长度
    async fn write_from<R>(&mut self, reader: &mut R, size: u64) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send;

    /// Complete the object. Terminal / 完成写入（终态）
    async fn finalize(self) -> Result<()>;
}

/// Writer bound to one protocol for its whole lifetime / 绑定单一协议的写入器
pub enum Writer {
    Append(AppendWriter),
    Multipart(MultipartWriter),
}

impl Writer {
    /// Open a writer for `path` on `driver`.
    ///
    /// With [`ProtocolPreference::Auto`] append is preferred over multipart; a driver
    /// declaring neither yields [`WriterError::UnsupportedProtocol`] and no remote call
    /// is made. Exactly one begin call is issued otherwise.
    pub async fn new(driver: &DriverBox, path: &str, options: &WriteOptions) -> Result<Self> {
        let capability = driver.capabilities();

        let protocol = match options.protocol {
            ProtocolPreference::Append => Protocol::Append,
            ProtocolPreference::Multipart => Protocol::Multipart,
            ProtocolPreference::Auto if capability.can_append => Protocol::Append,
            ProtocolPreference::Auto if capability.can_multipart_upload => Protocol::Multipart,
            ProtocolPreference::Auto => {
                tracing::warn!("No supported write protocol: driver={}, path={}", driver.name(), path);
                return Err(WriterError::UnsupportedProtocol {
                    driver: driver.name().to_string(),
                });
            }
        };

        let writer = match protocol {
            Protocol::Append => Writer::Append(AppendWriter::new(driver.as_ref(), path, options).await?),
            Protocol::Multipart => {
                Writer::Multipart(MultipartWriter::new(driver.as_ref(), path, options).await?)
            }
        };

        tracing::info!("Writer opened: driver={}, path={}, protocol={}", driver.name(), path, protocol);
        Ok(writer)
    }

    /// Protocol this writer is bound to / 当前使用的协议
    pub fn protocol(&self) -> Protocol {
        match self {
            Writer::Append(_) => Protocol::Append,
            Writer::Multipart(_) => Protocol::Multipart,
        }
    }
}

#[async_trait]
impl ObjectWriter for Writer {
    async fn write(&mut self, buf: &[u8]) -> Result<u64> {
        match self {
            Writer::Append(w) => w.write(buf).await,
            Writer::Multipart(w) => w.write(buf).await,
        }
    }

    async fn write_from<R>(&mut self, reader: &mut R, size: u64) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        match self {
            Writer::Append(w) => w.write_from(reader, size).await,
            Writer::Multipart(w) => w.write_from(reader, size).await,
        }
    }

    async fn finalize(self) -> Result<()> {
        let protocol = self.protocol();
        let result = match self {
            Writer::Append(w) => w.finalize().await,
            Writer::Multipart(w) => w.finalize().await,
        };
        match &result {
            Ok(()) => tracing::info!("Writer finalized: protocol={}", protocol),
            Err(e) => tracing::warn!("Writer finalize failed: {}", e),
        }
        result
    }
}
