//! M2Q Core - MongoDB change stream to message queue exporter
//!
//! This library provides the core functionality for exporting change stream
//! events from MongoDB to a message queue backend:
//!
//! - Canonical, immutable event representation with a typed decode step
//! - Deterministic encoder producing a stable `|`-delimited wire payload
//! - Sink-agnostic delivery contract with Kinesis and Pub/Sub connectors
//! - Idempotent resource provisioning, safe under concurrent first use

pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod sink;

// Re-export commonly used types
pub use config::{Config, SinkKind, SinkTarget};
pub use error::{DeliveryError, EncodeError, EventError, ProvisioningError};
pub use error::{Error, ExportStage, Result, StageError};
pub use event::{EventRecord, OperationType, WireFields};
pub use export::Exporter;
pub use sink::SinkConnector;
