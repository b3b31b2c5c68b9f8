//! Canonical change stream event representation and wire encoding.
//!
//! A raw change stream document is loosely typed; `EventRecord::from_raw`
//! turns it into a checked, immutable record, and `EventRecord::encode`
//! produces the fixed-order wire fields that connectors frame and deliver.

mod encoder;
mod record;

pub use encoder::{format_cluster_time, WireFields, WIRE_FIELD_COUNT};
pub use record::{EventRecord, OperationType};
