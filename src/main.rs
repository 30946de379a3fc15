use anyhow::{anyhow, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storage_writer::config;
use storage_writer::drivers;
use storage_writer::writer::{ObjectWriter, Writer};

const USAGE: &str = "usage: storage-writer <source-file> <destination-path>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config::get_config_path();
    let (app_config, config_source) = config::load_config(&config_path)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| app_config.log.filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("storage-writer {} (built {})", env!("CARGO_PKG_VERSION"), env!("BUILD_TIME"));
    match config_source {
        config::ConfigSource::Loaded => tracing::info!("Loaded configuration from {:?}", config_path),
        config::ConfigSource::Created => {
            tracing::info!("Created default configuration at {:?}", config_path)
        }
    }

    let mut args = std::env::args().skip(1);
    let (source, destination) = match (args.next(), args.next()) {
        (Some(source), Some(destination)) => (source, destination),
        _ => return Err(anyhow!(USAGE)),
    };

    let driver = drivers::build(&app_config.backend)?;

    let mut file = tokio::fs::File::open(&source)
        .await
        .with_context(|| format!("Failed to open source file {}", source))?;
    let total = file.metadata().await?.len();

    let options = app_config.writer.write_options();
    let mut writer = Writer::new(&driver, &destination, &options).await?;
    tracing::info!(
        "Uploading {} ({} bytes) to {} via {}",
        source,
        total,
        destination,
        writer.protocol()
    );

    // One write call per chunk_size bytes read from the source / 每次读取chunk_size字节写入一次
    let mut remaining = total;
    while remaining > 0 {
        let size = remaining.min(app_config.writer.chunk_size);
        let n = writer.write_from(&mut file, size).await?;
        if n == 0 {
            return Err(anyhow!("backend accepted no bytes with {} remaining", remaining));
        }
        remaining = remaining.saturating_sub(n);
        tracing::debug!("Progress: {}/{} bytes", total - remaining, total);
    }

    writer.finalize().await?;
    tracing::info!("Upload completed: {} -> {} ({} bytes)", source, destination, total);
    Ok(())
}
