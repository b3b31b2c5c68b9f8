//! Configuration structures for m2q.
//!
//! Configuration is loaded from TOML files and can be overridden via CLI flags.
//! The sink target is resolved once at startup and stays immutable for the
//! process lifetime.

use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Source MongoDB identity
    pub mongodb: MongoDbConfig,

    /// Export destination selection
    pub export: ExportConfig,

    /// Kinesis sink configuration (required when destination is kinesis)
    pub kinesis: Option<KinesisConfig>,

    /// Pub/Sub sink configuration (required when destination is pubsub)
    pub pubsub: Option<PubsubConfig>,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Source MongoDB identity.
///
/// The watcher owns the actual change stream connection; the export core
/// only needs the database/collection names, which double as the Pub/Sub
/// topic and subscription identifiers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MongoDbConfig {
    /// Database being watched
    pub database: String,

    /// Collection being watched
    pub collection: String,
}

/// Export destination configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Which sink backend to deliver to
    pub destination: SinkKind,

    /// Per-call deadline for remote sink operations, in seconds
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

/// Sink backend kind.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// AWS Kinesis Data Streams (partitioned stream)
    Kinesis,
    /// Google Cloud Pub/Sub (topic/subscription)
    Pubsub,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Kinesis => f.write_str("kinesis"),
            SinkKind::Pubsub => f.write_str("pubsub"),
        }
    }
}

/// Kinesis sink configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KinesisConfig {
    /// Stream to put records into (assumed pre-provisioned)
    pub stream_name: String,

    /// AWS region
    pub aws_region: Option<String>,

    /// AWS access key ID (default credential chain when absent)
    pub aws_access_key_id: Option<String>,

    /// AWS secret access key
    pub aws_secret_access_key: Option<String>,

    /// Endpoint override (for LocalStack or other Kinesis-compatible endpoints)
    pub endpoint: Option<String>,
}

/// Pub/Sub sink configuration.
///
/// Topic and subscription names come from the MongoDB database/collection,
/// and the subscription parameters are fixed, so only the project needs
/// configuring.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PubsubConfig {
    /// GCP project ID (application default credentials when absent)
    pub project_id: Option<String>,
}

/// Monitoring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON logs (default)
    #[default]
    Json,
    /// Human-readable text logs
    Text,
}

/// Resolved sink target, immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// Partitioned stream backend
    Stream {
        /// Stream name
        stream_name: String,
    },
    /// Topic/subscription backend
    Topic {
        /// Topic identifier (the configured database name)
        topic_id: String,
        /// Subscription identifier (the configured collection name)
        subscription_id: String,
    },
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.mongodb.database.is_empty() {
            return Err(crate::Error::Config("MongoDB database is required".into()));
        }

        if self.mongodb.collection.is_empty() {
            return Err(crate::Error::Config(
                "MongoDB collection is required".into(),
            ));
        }

        match self.export.destination {
            SinkKind::Kinesis => match &self.kinesis {
                Some(kinesis) if !kinesis.stream_name.is_empty() => {}
                Some(_) => {
                    return Err(crate::Error::Config(
                        "Kinesis stream name is required".into(),
                    ));
                }
                None => {
                    return Err(crate::Error::Config(
                        "Destination is kinesis but [kinesis] section is missing".into(),
                    ));
                }
            },
            SinkKind::Pubsub => {
                if self.pubsub.is_none() {
                    return Err(crate::Error::Config(
                        "Destination is pubsub but [pubsub] section is missing".into(),
                    ));
                }
            }
        }

        if self.export.request_timeout_seconds == 0 {
            return Err(crate::Error::Config(
                "Request timeout must be at least 1 second".into(),
            ));
        }

        Ok(())
    }

    /// Resolve the sink target from the validated configuration.
    pub fn sink_target(&self) -> crate::Result<SinkTarget> {
        match self.export.destination {
            SinkKind::Kinesis => {
                let kinesis = self.kinesis.as_ref().ok_or_else(|| {
                    crate::Error::Config("Kinesis configuration is missing".into())
                })?;
                Ok(SinkTarget::Stream {
                    stream_name: kinesis.stream_name.clone(),
                })
            }
            SinkKind::Pubsub => Ok(SinkTarget::Topic {
                topic_id: self.mongodb.database.clone(),
                subscription_id: self.mongodb.collection.clone(),
            }),
        }
    }

    /// Per-call deadline for remote sink operations.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.export.request_timeout_seconds)
    }
}
