pub mod config;
pub mod storage;
pub mod writer;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use storage::{Capability, DriverBox, StorageDriver, WriteOptions};
pub use writer::{ObjectWriter, Writer, WriterError};
