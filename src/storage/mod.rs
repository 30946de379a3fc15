//! Backend collaborator interface / 后端协作者接口
//!
//! Drivers only provide primitives (create / write / complete); the writer module
//! decides which protocol to drive and in what order.
//! 驱动只提供原语，写入流程由 writer 模块控制

use async_trait::async_trait;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Shared backend handle / 共享的后端句柄
pub type DriverBox = Arc<dyn StorageDriver>;

/// Driver capability declaration / 驱动能力声明
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Support append write / 支持追加写入
    pub can_append: bool,
    /// Support multipart upload / 支持分片上传
    pub can_multipart_upload: bool,
}

impl Capability {
    pub fn append_only() -> Self {
        Self { can_append: true, can_multipart_upload: false }
    }

    pub fn multipart_only() -> Self {
        Self { can_append: false, can_multipart_upload: true }
    }

    pub fn both() -> Self {
        Self { can_append: true, can_multipart_upload: true }
    }
}

/// Upload protocol / 上传协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Append,
    Multipart,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Append => f.write_str("append"),
            Protocol::Multipart => f.write_str("multipart"),
        }
    }
}

/// Protocol preference used when opening a writer / 打开写入器时的协议选择
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolPreference {
    /// Append if available, else multipart / 优先追加，其次分片
    #[default]
    Auto,
    Append,
    Multipart,
}

/// Options forwarded to the backend's begin call / 传递给后端创建调用的选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    #[serde(default)]
    pub protocol: ProtocolPreference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl WriteOptions {
    pub fn with_protocol(mut self, protocol: ProtocolPreference) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or("application/octet-stream")
    }
}

/// In-progress remote object returned by a begin call / 正在写入的远端对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// Destination path / 目标路径
    pub path: String,
    /// Multipart upload id, None for append objects / 分片上传ID
    pub upload_id: Option<String>,
    /// Tail position maintained by the backend / 由后端维护的追加位置
    pub append_offset: u64,
}

impl Object {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            upload_id: None,
            append_offset: 0,
        }
    }

    pub fn with_upload_id(mut self, upload_id: String) -> Self {
        self.upload_id = Some(upload_id);
        self
    }

    /// Upload id of a multipart object / 获取分片上传ID
    pub fn multipart_id(&self) -> Result<&str> {
        self.upload_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("object {} has no multipart upload id", self.path))
    }
}

/// One uploaded chunk of a multipart object / 已上传的分片记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub index: u32,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// What the backend reports for a single part write / 单个分片写入的返回
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReceipt {
    /// Bytes accepted by the backend / 后端接收的字节数
    pub size: u64,
    /// Integrity tag, if the backend produces one / 完整性标签（可选）
    pub etag: Option<String>,
}

impl PartReceipt {
    pub fn new(size: u64) -> Self {
        Self { size, etag: None }
    }

    pub fn with_etag(mut self, etag: String) -> Self {
        self.etag = Some(etag);
        self
    }
}

/// Append protocol primitives / 追加写入原语
#[async_trait]
pub trait Appender: Send + Sync {
    /// Create an object ready for appending / 创建可追加对象
    async fn create_append(&self, path: &str, options: &WriteOptions) -> Result<Object>;

    /// Append exactly `size` bytes read from `reader` to the tail of `object`,
    /// returning the number of bytes the backend accepted.
    async fn write_append(
        &self,
        object: &mut Object,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
    ) -> Result<u64>;
}

/// Multipart protocol primitives / 分片上传原语
#[async_trait]
pub trait Multiparter: Send + Sync {
    /// Start a multipart upload / 初始化分片上传
    async fn create_multipart(&self, path: &str, options: &WriteOptions) -> Result<Object>;

    /// Upload `size` bytes from `reader` as the part numbered `index` / 上传单个分片
    async fn write_multipart(
        &self,
        object: &Object,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
        index: u32,
    ) -> Result<PartReceipt>;

    /// Assemble the object from `parts`, given in index order / 完成分片上传
    async fn complete_multipart(&self, object: &Object, parts: &[Part]) -> Result<()>;
}

/// Storage driver interface / 存储驱动接口
pub trait StorageDriver: Send + Sync {
    /// Driver name / 驱动名称
    fn name(&self) -> &str;

    /// Declared capabilities / 驱动能力
    fn capabilities(&self) -> Capability;

    /// Append primitives, if implemented / 追加写入原语
    fn appender(&self) -> Option<Arc<dyn Appender>> {
        None
    }

    /// Multipart primitives, if implemented / 分片上传原语
    fn multiparter(&self) -> Option<Arc<dyn Multiparter>> {
        None
    }
}
