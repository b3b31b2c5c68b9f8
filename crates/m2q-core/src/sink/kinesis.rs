//! Kinesis stream connector.
//!
//! Delivers one record per call to a pre-provisioned Kinesis data stream.
//! The wire payload is the `|`-joined fields with a trailing line feed, and
//! the put is keyed by the event's resume-position value so records for the
//! same cursor land on the same shard.

use crate::config::{Config, SinkKind};
use crate::error::{DeliveryError, ProvisioningError};
use crate::event::WireFields;
use crate::sink::SinkConnector;
use async_trait::async_trait;
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::Client as KinesisClient;
use std::time::Duration;
use tracing::{debug, info};

/// Raw stream backend API.
///
/// Thin seam over the Kinesis client so connector behavior is testable
/// against an in-memory implementation.
#[async_trait]
pub trait StreamApi: Send + Sync {
    /// Put a single record, keyed by `partition_key`. Must not return until
    /// the backend acknowledges the record.
    async fn put_record(
        &self,
        stream_name: &str,
        partition_key: &str,
        data: Vec<u8>,
    ) -> Result<(), DeliveryError>;
}

/// Kinesis-backed implementation of [`StreamApi`].
pub struct KinesisStreamApi {
    client: KinesisClient,
}

impl KinesisStreamApi {
    /// Create an API wrapper from AWS configuration.
    pub async fn new(config: &Config) -> crate::Result<Self> {
        let kinesis = config
            .kinesis
            .as_ref()
            .ok_or_else(|| crate::Error::Config("Kinesis configuration is missing".into()))?;

        let sdk_config = build_aws_config(kinesis).await;
        let client = match &kinesis.endpoint {
            Some(endpoint) => {
                debug!(endpoint = %endpoint, "Using Kinesis endpoint override");
                let builder = aws_sdk_kinesis::config::Builder::from(&sdk_config)
                    .endpoint_url(endpoint.clone());
                KinesisClient::from_conf(builder.build())
            }
            None => KinesisClient::new(&sdk_config),
        };

        info!(
            region = kinesis.aws_region.as_deref().unwrap_or("default"),
            stream = %kinesis.stream_name,
            "Kinesis client initialized"
        );

        Ok(Self { client })
    }
}

/// Build AWS configuration with explicit credentials when configured,
/// otherwise the default credential chain (env vars, IAM role, etc.).
async fn build_aws_config(kinesis: &crate::config::KinesisConfig) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

    if let Some(region) = &kinesis.aws_region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }

    if let (Some(access_key), Some(secret_key)) =
        (&kinesis.aws_access_key_id, &kinesis.aws_secret_access_key)
    {
        debug!("Using explicit AWS credentials");
        let credentials = aws_credential_types::Credentials::new(
            access_key,
            secret_key,
            None, // session token
            None, // expiry
            "m2q-explicit-credentials",
        );
        loader = loader.credentials_provider(credentials);
    } else {
        debug!("Using default AWS credential chain");
    }

    loader.load().await
}

#[async_trait]
impl StreamApi for KinesisStreamApi {
    async fn put_record(
        &self,
        stream_name: &str,
        partition_key: &str,
        data: Vec<u8>,
    ) -> Result<(), DeliveryError> {
        self.client
            .put_record()
            .stream_name(stream_name)
            .partition_key(partition_key)
            .data(Blob::new(data))
            .send()
            .await
            .map_err(|e| DeliveryError::Put {
                stream: stream_name.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}

/// Connector for the partitioned-stream backend.
pub struct StreamConnector {
    api: Box<dyn StreamApi>,
    stream_name: String,
    timeout: Duration,
}

impl StreamConnector {
    /// Connect to Kinesis using the configured credentials.
    pub async fn connect(
        config: &Config,
        stream_name: String,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let api = KinesisStreamApi::new(config).await?;
        Ok(Self::with_api(Box::new(api), stream_name, timeout))
    }

    /// Build a connector over an arbitrary stream API (used by tests).
    pub fn with_api(api: Box<dyn StreamApi>, stream_name: String, timeout: Duration) -> Self {
        Self {
            api,
            stream_name,
            timeout,
        }
    }
}

#[async_trait]
impl SinkConnector for StreamConnector {
    /// The stream is assumed pre-provisioned; nothing to create.
    async fn ensure_resources(&self) -> Result<(), ProvisioningError> {
        debug!(stream = %self.stream_name, "Stream assumed pre-provisioned");
        Ok(())
    }

    async fn deliver(
        &self,
        partition_key: &str,
        fields: &WireFields,
    ) -> Result<(), DeliveryError> {
        // Stream framing is per-line: joined fields plus a trailing line feed.
        let payload = format!("{}\n", fields.joined());

        tokio::time::timeout(
            self.timeout,
            self.api
                .put_record(&self.stream_name, partition_key, payload.into_bytes()),
        )
        .await
        .map_err(|_| DeliveryError::Timeout {
            target: format!("stream {}", self.stream_name),
        })??;

        debug!(
            stream = %self.stream_name,
            partition_key = %partition_key,
            "Record put into stream"
        );
        Ok(())
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Kinesis
    }
}
