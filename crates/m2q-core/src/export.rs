//! Export orchestration.
//!
//! One call per raw change stream event: decode into the canonical record,
//! ensure sink resources, encode, deliver. Each failure is wrapped with its
//! pipeline stage so the caller can tell malformed input apart from a
//! transient transport problem and decide whether to advance its resume
//! position.

use crate::error::{ExportStage, StageError};
use crate::event::EventRecord;
use crate::sink::SinkConnector;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Exports raw change stream events to the configured sink.
///
/// Holds no cross-call state beyond the connector; records are built per
/// event and discarded after one delivery attempt.
pub struct Exporter {
    connector: Arc<dyn SinkConnector>,
}

impl Exporter {
    /// Create an exporter over the given connector.
    pub fn new(connector: Arc<dyn SinkConnector>) -> Self {
        Self { connector }
    }

    /// Export one raw change stream event.
    ///
    /// On a deliver-stage failure the caller must not advance its resume
    /// position for this event; doing so would silently lose it.
    pub async fn export(&self, raw: &Value) -> Result<(), StageError> {
        let record = EventRecord::from_raw(raw)
            .map_err(|e| StageError::new(ExportStage::Decode, e))?;

        // Idempotent and cheap once provisioned, so safe to call every time.
        self.connector
            .ensure_resources()
            .await
            .map_err(|e| StageError::new(ExportStage::Provision, e))?;

        let fields = record
            .encode()
            .map_err(|e| StageError::new(ExportStage::Encode, e))?;

        self.connector
            .deliver(&record.partition_key, &fields)
            .await
            .map_err(|e| StageError::new(ExportStage::Deliver, e))?;

        debug!(
            operation = %record.operation,
            partition_key = %record.partition_key,
            sink = %self.connector.kind(),
            "Event exported"
        );

        Ok(())
    }
}
