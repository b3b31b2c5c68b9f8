//! Typed decoding of raw change stream documents.

use crate::error::EventError;
use serde_json::Value;

/// Change stream operation type.
///
/// The named variants cover the document-level operations the exporter
/// normalizes; anything else (collection drops, renames, ...) is carried as
/// `Other` with its raw string preserved so the wire payload stays lossless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationType {
    Insert,
    Update,
    Delete,
    Replace,
    Invalidate,
    Other(String),
}

impl OperationType {
    /// Parse a raw operation type string. Never fails; unknown operations
    /// map to `Other`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "insert" => OperationType::Insert,
            "update" => OperationType::Update,
            "delete" => OperationType::Delete,
            "replace" => OperationType::Replace,
            "invalidate" => OperationType::Invalidate,
            other => OperationType::Other(other.to_string()),
        }
    }

    /// The operation string as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            OperationType::Insert => "insert",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::Replace => "replace",
            OperationType::Invalidate => "invalidate",
            OperationType::Other(raw) => raw,
        }
    }

    /// Whether this operation targets a single document and therefore must
    /// carry a `documentKey`.
    fn requires_document_key(&self) -> bool {
        matches!(
            self,
            OperationType::Insert
                | OperationType::Update
                | OperationType::Delete
                | OperationType::Replace
        )
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical representation of one change stream event.
///
/// Constructed per incoming raw event, immutable, and discarded after one
/// delivery attempt. Durability of "what has been processed" belongs to the
/// watcher's resume token, never to this record.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Opaque resume-position value (the raw `_id` document)
    pub id: Value,
    /// The `_data` string inside `_id`, used verbatim as the partition key
    pub partition_key: String,
    /// Operation type
    pub operation: OperationType,
    /// Logical timestamp, seconds since epoch
    pub cluster_time: u64,
    /// Full document (absent for deletes and invalidates)
    pub full_document: Option<Value>,
    /// Database/collection identity
    pub namespace: Value,
    /// Key identifying the affected document (absent for invalidates)
    pub document_key: Option<Value>,
    /// Update description (present only for update operations)
    pub update_description: Option<Value>,
}

impl EventRecord {
    /// Decode a raw change stream document into a canonical record.
    ///
    /// Every required field is extracted with a type check; a missing or
    /// mistyped field yields an `EventError` rather than a panic, since the
    /// input shape is not statically guaranteed.
    pub fn from_raw(raw: &Value) -> Result<Self, EventError> {
        let doc = raw.as_object().ok_or(EventError::NotADocument)?;

        let id = doc
            .get("_id")
            .ok_or(EventError::MissingField { field: "_id" })?;
        let partition_key = id
            .as_object()
            .ok_or(EventError::InvalidType {
                field: "_id",
                expected: "document",
            })?
            .get("_data")
            .ok_or(EventError::MissingField { field: "_id._data" })?
            .as_str()
            .ok_or(EventError::InvalidType {
                field: "_id._data",
                expected: "string",
            })?
            .to_string();

        let operation = OperationType::parse(
            doc.get("operationType")
                .ok_or(EventError::MissingField {
                    field: "operationType",
                })?
                .as_str()
                .ok_or(EventError::InvalidType {
                    field: "operationType",
                    expected: "string",
                })?,
        );

        let cluster_time = decode_cluster_time(doc.get("clusterTime").ok_or(
            EventError::MissingField {
                field: "clusterTime",
            },
        )?)?;

        let namespace = doc.get("ns").ok_or(EventError::MissingField { field: "ns" })?;
        if !namespace.is_object() {
            return Err(EventError::InvalidType {
                field: "ns",
                expected: "document",
            });
        }

        let document_key = optional_field(doc.get("documentKey"));
        if document_key.is_none() && operation.requires_document_key() {
            return Err(EventError::MissingField {
                field: "documentKey",
            });
        }

        Ok(EventRecord {
            id: id.clone(),
            partition_key,
            operation,
            cluster_time,
            full_document: optional_field(doc.get("fullDocument")),
            namespace: namespace.clone(),
            document_key,
            update_description: optional_field(doc.get("updateDescription")),
        })
    }
}

/// An absent field and an explicit JSON null both count as "not present".
fn optional_field(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.clone()),
    }
}

/// Decode the cluster time into epoch seconds.
///
/// Accepted shapes, in order of what drivers actually emit:
/// - a plain non-negative integer of seconds
/// - a `{t, i}` timestamp document
/// - canonical extended JSON `{"$timestamp": {t, i}}`
fn decode_cluster_time(value: &Value) -> Result<u64, EventError> {
    if let Some(seconds) = value.as_u64() {
        return Ok(seconds);
    }

    if let Some(doc) = value.as_object() {
        let inner = match doc.get("$timestamp") {
            Some(ts) => ts.as_object().ok_or(EventError::InvalidType {
                field: "clusterTime",
                expected: "timestamp",
            })?,
            None => doc,
        };
        if let Some(seconds) = inner.get("t").and_then(Value::as_u64) {
            return Ok(seconds);
        }
    }

    Err(EventError::InvalidType {
        field: "clusterTime",
        expected: "timestamp",
    })
}
