//! In-process memory driver / 内存驱动
//!
//! Keeps objects in a shared map. Capabilities are configurable so that any
//! combination of append / multipart can be exercised without a remote service.

mod driver;

pub use driver::{MemoryDriver, MemoryStore};
