//! Error types for the m2q core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! The export pipeline additionally wraps every failure with the stage it
//! occurred in (`StageError`), so callers can tell a malformed-input problem
//! apart from a transient transport problem.

use thiserror::Error;

/// Result type alias for m2q operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for m2q.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed change stream event
    #[error("Malformed event: {0}")]
    Event(#[from] EventError),

    /// Wire encoding error
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// Sink resource provisioning error
    #[error("Provisioning error: {0}")]
    Provisioning(#[from] ProvisioningError),

    /// Sink delivery error
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding a raw change stream document.
///
/// The raw document's shape is not statically guaranteed, so every required
/// field extraction is a checked operation that produces one of these
/// variants instead of panicking.
#[derive(Error, Debug)]
pub enum EventError {
    /// Raw event is not a key-value document
    #[error("Event is not a document")]
    NotADocument,

    /// A required field is absent
    #[error("Required field missing: {field}")]
    MissingField { field: &'static str },

    /// A field is present but has the wrong shape
    #[error("Field {field} has unexpected type, expected {expected}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },
}

/// Errors raised while encoding an event record into wire fields.
#[derive(Error, Debug)]
pub enum EncodeError {
    /// JSON serialization of a structured field failed
    #[error("Failed to serialize field {field}: {message}")]
    Serialization { field: &'static str, message: String },

    /// Cluster time is outside the representable range
    #[error("Cluster time {seconds} is out of range")]
    TimestampRange { seconds: u64 },
}

/// Errors raised while provisioning sink resources.
#[derive(Error, Debug)]
pub enum ProvisioningError {
    /// Resource already exists.
    ///
    /// Backend API implementations return this from create calls; connectors
    /// treat it as success (idempotent-create tolerance), so it never
    /// surfaces from `ensure_resources`.
    #[error("{resource} already exists")]
    AlreadyExists { resource: String },

    /// Existence check failed
    #[error("Failed to check {resource} existence: {message}")]
    ExistenceCheck { resource: String, message: String },

    /// Resource creation failed
    #[error("Failed to create {resource}: {message}")]
    CreateFailed { resource: String, message: String },

    /// Provisioning call exceeded its deadline
    #[error("Provisioning of {resource} timed out")]
    Timeout { resource: String },
}

/// Errors raised while delivering a wire payload.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Put into the partitioned stream failed
    #[error("Failed to put record into stream {stream}: {message}")]
    Put { stream: String, message: String },

    /// Publish to the topic failed
    #[error("Failed to publish message to topic {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Delivery call exceeded its deadline
    #[error("Delivery to {target} timed out")]
    Timeout { target: String },
}

/// Pipeline stage in which an export failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    /// Decoding the raw event into an `EventRecord`
    Decode,
    /// Ensuring sink resources exist
    Provision,
    /// Encoding the record into wire fields
    Encode,
    /// Delivering the wire payload
    Deliver,
}

impl std::fmt::Display for ExportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExportStage::Decode => "decode",
            ExportStage::Provision => "provision",
            ExportStage::Encode => "encode",
            ExportStage::Deliver => "deliver",
        };
        f.write_str(name)
    }
}

/// An export failure wrapped with the stage it occurred in.
#[derive(Error, Debug)]
#[error("Export failed at {stage} stage: {source}")]
pub struct StageError {
    /// The pipeline stage that failed
    pub stage: ExportStage,
    /// The underlying error
    #[source]
    pub source: Error,
}

impl StageError {
    /// Wrap an error with its pipeline stage.
    pub fn new(stage: ExportStage, source: impl Into<Error>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// Whether the failure happened during delivery.
    ///
    /// On a delivery failure the caller must not advance its resume position
    /// for the event, otherwise the event is silently lost.
    pub fn is_delivery(&self) -> bool {
        self.stage == ExportStage::Deliver
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
