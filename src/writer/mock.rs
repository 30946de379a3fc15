//! Recording backend for writer tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::storage::{
    Appender, Capability, DriverBox, Multiparter, Object, Part, PartReceipt, StorageDriver,
    WriteOptions,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateAppend(String),
    WriteAppend { path: String, data: Vec<u8> },
    CreateMultipart(String),
    WriteMultipart { path: String, index: u32, size: u64 },
    CompleteMultipart { path: String, parts: Vec<Part> },
}

#[derive(Default)]
pub struct Recorder {
    calls: Mutex<Vec<Call>>,
    fail_create: AtomicBool,
    fail_next_write: AtomicBool,
    fail_complete: AtomicBool,
    with_etag: AtomicBool,
}

impl Recorder {
    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(anyhow!("injected {} failure", what));
        }
        Ok(())
    }

    async fn drain(reader: &mut (dyn AsyncRead + Unpin + Send), size: u64) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        reader.take(size).read_to_end(&mut data).await?;
        Ok(data)
    }
}

#[async_trait]
impl Appender for Recorder {
    async fn create_append(&self, path: &str, _options: &WriteOptions) -> Result<Object> {
        self.record(Call::CreateAppend(path.to_string()));
        self.check(&self.fail_create, "create")?;
        Ok(Object::new(path))
    }

    async fn write_append(
        &self,
        object: &mut Object,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
    ) -> Result<u64> {
        let data = Self::drain(reader, size).await?;
        let n = data.len() as u64;
        self.record(Call::WriteAppend { path: object.path.clone(), data });
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("injected write failure"));
        }
        object.append_offset += n;
        Ok(n)
    }
}

#[async_trait]
impl Multiparter for Recorder {
    async fn create_multipart(&self, path: &str, _options: &WriteOptions) -> Result<Object> {
        self.record(Call::CreateMultipart(path.to_string()));
        self.check(&self.fail_create, "create")?;
        Ok(Object::new(path).with_upload_id("upload-1".to_string()))
    }

    async fn write_multipart(
        &self,
        object: &Object,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        size: u64,
        index: u32,
    ) -> Result<PartReceipt> {
        let data = Self::drain(reader, size).await?;
        let n = data.len() as u64;
        self.record(Call::WriteMultipart { path: object.path.clone(), index, size });
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("injected write failure"));
        }
        let receipt = PartReceipt::new(n);
        if self.with_etag.load(Ordering::SeqCst) {
            return Ok(receipt.with_etag(format!("etag-{}", index)));
        }
        Ok(receipt)
    }

    async fn complete_multipart(&self, object: &Object, parts: &[Part]) -> Result<()> {
        self.record(Call::CompleteMultipart {
            path: object.path.clone(),
            parts: parts.to_vec(),
        });
        self.check(&self.fail_complete, "complete")
    }
}

pub struct RecordingDriver {
    capability: Capability,
    recorder: Arc<Recorder>,
}

impl RecordingDriver {
    pub fn new(capability: Capability) -> Arc<Self> {
        Arc::new(Self {
            capability,
            recorder: Arc::new(Recorder::default()),
        })
    }

    pub fn handle(self: &Arc<Self>) -> DriverBox {
        self.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.recorder.calls.lock().clone()
    }

    pub fn fail_create(&self) {
        self.recorder.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_write(&self) {
        self.recorder.fail_next_write.store(true, Ordering::SeqCst);
    }

    pub fn fail_complete(&self) {
        self.recorder.fail_complete.store(true, Ordering::SeqCst);
    }

    pub fn with_etag(&self) {
        self.recorder.with_etag.store(true, Ordering::SeqCst);
    }
}

impl StorageDriver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    fn capabilities(&self) -> Capability {
        self.capability
    }

    fn appender(&self) -> Option<Arc<dyn Appender>> {
        if !self.capability.can_append {
            return None;
        }
        Some(self.recorder.clone())
    }

    fn multiparter(&self) -> Option<Arc<dyn Multiparter>> {
        if !self.capability.can_multipart_upload {
            return None;
        }
        Some(self.recorder.clone())
    }
}
