use thiserror::Error;

use crate::storage::Protocol;

/// Writer error / 写入器错误
///
/// Every variant names the remote operation that failed; backend errors are kept as the source.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("driver {driver} supports neither append nor multipart write")]
    UnsupportedProtocol { driver: String },

    #[error("driver {driver}: appender not implemented")]
    AppenderNotImplemented { driver: String },

    #[error("driver {driver}: multiparter not implemented")]
    MultiparterNotImplemented { driver: String },

    #[error("begin_write ({protocol}): {source}")]
    BeginWrite {
        protocol: Protocol,
        #[source]
        source: anyhow::Error,
    },

    #[error("write_chunk ({protocol}): {source}")]
    ChunkWrite {
        protocol: Protocol,
        #[source]
        source: anyhow::Error,
    },

    #[error("finalize ({protocol}): {source}")]
    Finalize {
        protocol: Protocol,
        #[source]
        source: anyhow::Error,
    },
}

impl WriterError {
    /// Name of the failed operation / 失败的操作名
    pub fn operation(&self) -> &'static str {
        match self {
            WriterError::UnsupportedProtocol { .. }
            | WriterError::AppenderNotImplemented { .. }
            | WriterError::MultiparterNotImplemented { .. } => "create",
            WriterError::BeginWrite { .. } => "begin_write",
            WriterError::ChunkWrite { .. } => "write_chunk",
            WriterError::Finalize { .. } => "finalize",
        }
    }
}

pub type Result<T> = std::result::Result<T, WriterError>;
