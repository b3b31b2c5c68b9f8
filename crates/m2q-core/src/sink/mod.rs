//! Sink connectors.
//!
//! A sink connector owns one delivery destination and exposes exactly two
//! capabilities: idempotent resource provisioning and single-record delivery.
//! The concrete connector is selected once at startup from the resolved
//! [`SinkTarget`](crate::config::SinkTarget); nothing inspects the connector
//! type at runtime afterwards.

mod kinesis;
mod pubsub;

pub use kinesis::{KinesisStreamApi, StreamApi, StreamConnector};
pub use pubsub::{PubsubTopicApi, TopicApi, TopicConnector};

use crate::config::{Config, SinkKind, SinkTarget};
use crate::error::{DeliveryError, ProvisioningError};
use crate::event::WireFields;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// The sink-agnostic delivery contract.
///
/// Implementations are shared behind `Arc` and must be safe to call from
/// concurrent export invocations; in particular `ensure_resources` must be
/// correct under concurrent first-time invocation without any external lock.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    /// Ensure the remote resources this connector delivers to exist.
    ///
    /// Called before every delivery, so it must be cheap when resources are
    /// already provisioned, and idempotent otherwise. A "resource already
    /// exists" race with a concurrent caller is success, not an error.
    async fn ensure_resources(&self) -> Result<(), ProvisioningError>;

    /// Deliver one encoded event.
    ///
    /// Blocks until the backend acknowledges the write; returning `Ok` means
    /// the record is accepted server-side, so the caller may advance its
    /// resume position.
    async fn deliver(
        &self,
        partition_key: &str,
        fields: &WireFields,
    ) -> Result<(), DeliveryError>;

    /// The backend kind this connector delivers to.
    fn kind(&self) -> SinkKind;
}

/// Create the connector selected by the configuration.
pub async fn create_connector(config: &Config) -> crate::Result<Arc<dyn SinkConnector>> {
    let target = config.sink_target()?;
    let timeout = config.request_timeout();

    let connector: Arc<dyn SinkConnector> = match target {
        SinkTarget::Stream { stream_name } => {
            info!(stream = %stream_name, "Using Kinesis stream sink");
            Arc::new(StreamConnector::connect(config, stream_name, timeout).await?)
        }
        SinkTarget::Topic {
            topic_id,
            subscription_id,
        } => {
            info!(topic = %topic_id, subscription = %subscription_id, "Using Pub/Sub sink");
            Arc::new(TopicConnector::connect(config, topic_id, subscription_id, timeout).await?)
        }
    };

    Ok(connector)
}
