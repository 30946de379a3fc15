use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::storage::{
    Appender, Capability, Multiparter, Object, Part, PartReceipt, StorageDriver, WriteOptions,
};

/// 进行中的分片上传
struct Upload {
    path: String,
    content_type: String,
    parts: BTreeMap<u32, Bytes>,
}

/// Shared object store behind the memory driver / 内存驱动的共享存储
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    uploads: Mutex<HashMap<String, Upload>>,
}

struct StoredObject {
    data: BytesMut,
    content_type: String,
}

impl MemoryStore {
    /// Read exactly `size` bytes, failing on a short reader / 读取指定长度，不足则报错
    async fn read_exact_len(reader: &mut (dyn AsyncRead + Unpin + Send), size: u64) -> Result<Bytes> {
        let mut data = Vec::with_capacity(size.min(16 * 1024 * 1024) as usize);
        reader.take(size).read_to_end(&mut data).await?;
        if data.len() as u64 != size {
            return Err(anyhow!("short read: expected {} bytes, got {}", size, data.len()));
        }
        Ok(Bytes::from(data))
    }
}

#[async_trait]
impl Appender for MemoryStore {
    async fn create_append(&self, path: &str, options: &WriteOptions) -> Result<Object> {
        let mut objects = self.objects.lock();
        objects.insert(
            path.to_string(),
            StoredObject {
                data: BytesMut::new(),
                content_type: options.content_type().to_string(),
            },
        );
        Ok(Object::new(path))
    }

    async fn write_append(
        &self,
        object: &mut Object,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
    ) -> Result<u64> {
        let data = Self::read_exact_len(reader, size).await?;

        let mut objects = self.objects.lock();
        let stored = objects
            .get_mut(&object.path)
            .ok_or_else(|| anyhow!("append object not found: {}", object.path))?;

        // 追加位置必须与对象当前长度一致
        if stored.data.len() as u64 != object.append_offset {
            return Err(anyhow!(
                "append position mismatch: object has {} bytes, writer is at {}",
                stored.data.len(),
                object.append_offset
            ));
        }

        stored.data.extend_from_slice(&data);
        object.append_offset += data.len() as u64;
        Ok(data.len() as u64)
    }
}

#[async_trait]
impl Multiparter for MemoryStore {
    async fn create_multipart(&self, path: &str, options: &WriteOptions) -> Result<Object> {
        let upload_id = uuid::Uuid::new_v4().to_string();
        self.uploads.lock().insert(
            upload_id.clone(),
            Upload {
                path: path.to_string(),
                content_type: options.content_type().to_string(),
                parts: BTreeMap::new(),
            },
        );
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
        let data = Self::read_exact_len(reader, size).await?;
        let etag = format!("{:x}", md5::compute(&data));

        let mut uploads = self.uploads.lock();
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| anyhow!("multipart upload not found: {}", upload_id))?;
        let written = data.len() as u64;
        upload.parts.insert(index, data);

        Ok(PartReceipt::new(written).with_etag(etag))
    }

    async fn complete_multipart(&self, object: &Object, parts: &[Part]) -> Result<()> {
        let upload_id = object.multipart_id()?;

        let mut uploads = self.uploads.lock();
        let upload = uploads
            .get(upload_id)
            .ok_or_else(|| anyhow!("multipart upload not found: {}", upload_id))?;

        let mut assembled = BytesMut::new();
        for part in parts {
            let data = upload
                .parts
                .get(&part.index)
                .ok_or_else(|| anyhow!("part {} was never uploaded", part.index))?;
            if data.len() as u64 != part.size {
                return Err(anyhow!(
                    "part {} size mismatch: stored {}, listed {}",
                    part.index,
                    data.len(),
                    part.size
                ));
            }
            if let Some(etag) = &part.etag {
                let actual = format!("{:x}", md5::compute(data));
                if &actual != etag {
                    return Err(anyhow!("part {} etag mismatch", part.index));
                }
            }
            assembled.extend_from_slice(data);
        }

        let content_type = upload.content_type.clone();
        let path = upload.path.clone();
        uploads.remove(upload_id);
        drop(uploads);

        self.objects.lock().insert(
            path,
            StoredObject {
                data: assembled,
                content_type,
            },
        );
        Ok(())
    }
}

/// Memory driver / 内存驱动
#[derive(Clone)]
pub struct MemoryDriver {
    capability: Capability,
    store: Arc<MemoryStore>,
}

impl MemoryDriver {
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            store: Arc::new(MemoryStore::default()),
        }
    }

    /// Content of a completed object / 获取对象内容
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.store
            .objects
            .lock()
            .get(path)
            .map(|o| o.data.clone().freeze())
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.store.objects.lock().get(path).map(|o| o.content_type.clone())
    }

    /// Paths of all stored objects, sorted / 所有对象路径
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.store.objects.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Multipart uploads not yet completed / 未完成的分片上传数
    pub fn pending_uploads(&self) -> usize {
        self.store.uploads.lock().len()
    }
}

impl StorageDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> Capability {
        self.capability
    }

    fn appender(&self) -> Option<Arc<dyn Appender>> {
        if !self.capability.can_append {
            return None;
        }
        Some(self.store.clone())
    }

    fn multiparter(&self) -> Option<Arc<dyn Multiparter>> {
        if !self.capability.can_multipart_upload {
            return None;
        }
        Some(self.store.clone())
    }
}
