//! Export command - deliver raw change events read as JSON Lines.
//!
//! Stands in for the change stream watcher in operational and smoke-test
//! use: events are exported in input order and the run stops at the first
//! failure, since nothing past an undelivered event may be considered
//! processed.

use anyhow::{Context, Result};
use m2q_core::{Config, Exporter};
use serde_json::Value;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::info;

pub async fn run(config: Config, input: Option<PathBuf>) -> Result<()> {
    config.validate()?;

    let connector = m2q_core::sink::create_connector(&config).await?;
    let exporter = Exporter::new(connector);

    let reader: Box<dyn BufRead> = match &input {
        Some(path) => Box::new(BufReader::new(
            std::fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut exported = 0usize;
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let raw: Value = serde_json::from_str(&line)
            .with_context(|| format!("Invalid JSON on line {}", line_number + 1))?;

        exporter
            .export(&raw)
            .await
            .with_context(|| format!("Failed to export event on line {}", line_number + 1))?;
        exported += 1;
    }

    info!(events = exported, "Export complete");
    Ok(())
}
