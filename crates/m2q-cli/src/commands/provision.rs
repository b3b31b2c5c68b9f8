//! Provision command - ensure sink resources exist ahead of first traffic.
//!
//! Safe to run repeatedly and concurrently with running exporters; creation
//! is idempotent and "already exists" is success.

use anyhow::Result;
use m2q_core::Config;
use tracing::info;

pub async fn run(config: Config) -> Result<()> {
    config.validate()?;

    let connector = m2q_core::sink::create_connector(&config).await?;
    connector.ensure_resources().await?;

    info!(sink = %connector.kind(), "Sink resources provisioned");
    println!("Sink resources are ready");
    Ok(())
}
