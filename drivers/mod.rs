// Driver package / 驱动包
pub mod local;
pub mod memory;

use anyhow::Result;
use std::sync::Arc;

use crate::config::BackendConfig;
use crate::storage::DriverBox;

/// Build the configured backend / 根据配置创建驱动
pub fn build(config: &BackendConfig) -> Result<DriverBox> {
    let driver: DriverBox = match config {
        BackendConfig::Local { root, .. } => {
            Arc::new(local::LocalDriver::open(root, config.capability())?)
        }
        BackendConfig::Memory { .. } => Arc::new(memory::MemoryDriver::new(config.capability())),
    };
    tracing::info!("Driver created: {} ({:?})", driver.name(), driver.capabilities());
    Ok(driver)
}
