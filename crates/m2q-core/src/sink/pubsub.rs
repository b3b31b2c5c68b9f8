//! Pub/Sub topic connector.
//!
//! Delivers one message per call to a Google Cloud Pub/Sub topic, creating
//! the topic and its subscription on first use. Provisioning is idempotent:
//! check-then-create is not atomic, so a concurrent first caller may win the
//! create race, and the loser treats "already exists" as success.
//!
//! Subscription parameters are fixed (60 s ack deadline, 24 h retention) and
//! never teardown: connectors never delete resources.

use crate::config::{Config, SinkKind};
use crate::error::{DeliveryError, ProvisioningError};
use crate::event::WireFields;
use crate::sink::SinkConnector;
use async_trait::async_trait;
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::{Client as PubsubClient, ClientConfig};
use google_cloud_pubsub::subscription::SubscriptionConfig;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Fixed acknowledgment deadline for created subscriptions.
const ACK_DEADLINE: Duration = Duration::from_secs(60);

/// Fixed message retention for created subscriptions.
const RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Raw topic/subscription backend API.
///
/// Thin seam over the Pub/Sub client so provisioning and delivery behavior
/// are testable against an in-memory implementation. Create calls report
/// `ProvisioningError::AlreadyExists` when they lose a create race; the
/// connector maps that to success.
#[async_trait]
pub trait TopicApi: Send + Sync {
    /// Check whether the topic exists.
    async fn topic_exists(&self, topic_id: &str) -> Result<bool, ProvisioningError>;

    /// Create the topic.
    async fn create_topic(&self, topic_id: &str) -> Result<(), ProvisioningError>;

    /// Check whether the subscription exists.
    async fn subscription_exists(&self, subscription_id: &str)
        -> Result<bool, ProvisioningError>;

    /// Create the subscription bound to the topic.
    async fn create_subscription(
        &self,
        topic_id: &str,
        subscription_id: &str,
        ack_deadline: Duration,
        retention: Duration,
    ) -> Result<(), ProvisioningError>;

    /// Publish a single message and wait for the server acknowledgment.
    async fn publish(&self, topic_id: &str, data: Vec<u8>) -> Result<(), DeliveryError>;
}

/// Pub/Sub-backed implementation of [`TopicApi`].
pub struct PubsubTopicApi {
    client: PubsubClient,
}

impl PubsubTopicApi {
    /// Create an API wrapper using application default credentials.
    pub async fn new(config: &Config) -> crate::Result<Self> {
        let pubsub = config
            .pubsub
            .as_ref()
            .ok_or_else(|| crate::Error::Config("Pub/Sub configuration is missing".into()))?;

        let mut client_config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| crate::Error::Config(format!("Pub/Sub auth failed: {}", e)))?;
        if let Some(project_id) = &pubsub.project_id {
            client_config.project_id = Some(project_id.clone());
        }

        let client = PubsubClient::new(client_config)
            .await
            .map_err(|e| crate::Error::Config(format!("Pub/Sub client failed: {}", e)))?;

        info!(
            project = pubsub.project_id.as_deref().unwrap_or("default"),
            "Pub/Sub client initialized"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl TopicApi for PubsubTopicApi {
    async fn topic_exists(&self, topic_id: &str) -> Result<bool, ProvisioningError> {
        self.client
            .topic(topic_id)
            .exists(None)
            .await
            .map_err(|e| ProvisioningError::ExistenceCheck {
                resource: format!("topic {}", topic_id),
                message: e.to_string(),
            })
    }

    async fn create_topic(&self, topic_id: &str) -> Result<(), ProvisioningError> {
        match self.client.topic(topic_id).create(None, None).await {
            Ok(()) => Ok(()),
            Err(status) => {
                let message = status.to_string();
                if message.contains("AlreadyExists") {
                    Err(ProvisioningError::AlreadyExists {
                        resource: format!("topic {}", topic_id),
                    })
                } else {
                    Err(ProvisioningError::CreateFailed {
                        resource: format!("topic {}", topic_id),
                        message,
                    })
                }
            }
        }
    }

    async fn subscription_exists(
        &self,
        subscription_id: &str,
    ) -> Result<bool, ProvisioningError> {
        self.client
            .subscription(subscription_id)
            .exists(None)
            .await
            .map_err(|e| ProvisioningError::ExistenceCheck {
                resource: format!("subscription {}", subscription_id),
                message: e.to_string(),
            })
    }

    async fn create_subscription(
        &self,
        topic_id: &str,
        subscription_id: &str,
        ack_deadline: Duration,
        retention: Duration,
    ) -> Result<(), ProvisioningError> {
        let topic = self.client.topic(topic_id);
        let subscription_config = SubscriptionConfig {
            ack_deadline_seconds: ack_deadline.as_secs() as i32,
            message_retention_duration: Some(retention),
            ..Default::default()
        };

        match self
            .client
            .subscription(subscription_id)
            .create(topic.fully_qualified_name(), subscription_config, None)
            .await
        {
            Ok(()) => Ok(()),
            Err(status) => {
                let message = status.to_string();
                if message.contains("AlreadyExists") {
                    Err(ProvisioningError::AlreadyExists {
                        resource: format!("subscription {}", subscription_id),
                    })
                } else {
                    Err(ProvisioningError::CreateFailed {
                        resource: format!("subscription {}", subscription_id),
                        message,
                    })
                }
            }
        }
    }

    async fn publish(&self, topic_id: &str, data: Vec<u8>) -> Result<(), DeliveryError> {
        let topic = self.client.topic(topic_id);
        let mut publisher = topic.new_publisher(None);

        let message = PubsubMessage {
            data: data.into(),
            ..Default::default()
        };

        // The awaiter resolves once the server assigns a message ID, which
        // gives the same acknowledged-delivery guarantee as the stream put.
        let awaiter = publisher.publish(message).await;
        let result = awaiter.get().await;
        publisher.shutdown().await;

        result.map(|_| ()).map_err(|status| DeliveryError::Publish {
            topic: topic_id.to_string(),
            message: status.to_string(),
        })
    }
}

/// Provisioning progress. Only ever advances; there is no teardown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ProvisioningState {
    Unset = 0,
    TopicEnsured = 1,
    SubscriptionEnsured = 2,
}

/// Connector for the topic/subscription backend.
pub struct TopicConnector {
    api: Box<dyn TopicApi>,
    topic_id: String,
    subscription_id: String,
    timeout: Duration,
    /// Monotonic provisioning state. No mutex: concurrent first callers may
    /// both run the ensure sequence, which the idempotent-create tolerance
    /// makes safe.
    state: AtomicU8,
}

impl TopicConnector {
    /// Connect to Pub/Sub using application default credentials.
    pub async fn connect(
        config: &Config,
        topic_id: String,
        subscription_id: String,
        timeout: Duration,
    ) -> crate::Result<Self> {
        let api = PubsubTopicApi::new(config).await?;
        Ok(Self::with_api(
            Box::new(api),
            topic_id,
            subscription_id,
            timeout,
        ))
    }

    /// Build a connector over an arbitrary topic API (used by tests).
    pub fn with_api(
        api: Box<dyn TopicApi>,
        topic_id: String,
        subscription_id: String,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            topic_id,
            subscription_id,
            timeout,
            state: AtomicU8::new(ProvisioningState::Unset as u8),
        }
    }

    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn advance_state(&self, state: ProvisioningState) {
        // fetch_max keeps the state monotonic under concurrent ensures.
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    async fn ensure_topic(&self) -> Result<(), ProvisioningError> {
        let exists = tokio::time::timeout(self.timeout, self.api.topic_exists(&self.topic_id))
            .await
            .map_err(|_| ProvisioningError::Timeout {
                resource: format!("topic {}", self.topic_id),
            })??;

        if !exists {
            info!(topic = %self.topic_id, "Topic does not exist, creating");
            match tokio::time::timeout(self.timeout, self.api.create_topic(&self.topic_id))
                .await
                .map_err(|_| ProvisioningError::Timeout {
                    resource: format!("topic {}", self.topic_id),
                })?
            {
                Ok(()) => info!(topic = %self.topic_id, "Created topic"),
                Err(ProvisioningError::AlreadyExists { .. }) => {
                    // Lost the create race to a concurrent caller.
                    debug!(topic = %self.topic_id, "Topic already exists");
                }
                Err(e) => return Err(e),
            }
        }

        self.advance_state(ProvisioningState::TopicEnsured);
        Ok(())
    }

    async fn ensure_subscription(&self) -> Result<(), ProvisioningError> {
        let exists = tokio::time::timeout(
            self.timeout,
            self.api.subscription_exists(&self.subscription_id),
        )
        .await
        .map_err(|_| ProvisioningError::Timeout {
            resource: format!("subscription {}", self.subscription_id),
        })??;

        if !exists {
            info!(subscription = %self.subscription_id, "Subscription does not exist, creating");
            match tokio::time::timeout(
                self.timeout,
                self.api.create_subscription(
                    &self.topic_id,
                    &self.subscription_id,
                    ACK_DEADLINE,
                    RETENTION,
                ),
            )
            .await
            .map_err(|_| ProvisioningError::Timeout {
                resource: format!("subscription {}", self.subscription_id),
            })?
            {
                Ok(()) => info!(subscription = %self.subscription_id, "Created subscription"),
                Err(ProvisioningError::AlreadyExists { .. }) => {
                    debug!(subscription = %self.subscription_id, "Subscription already exists");
                }
                Err(e) => return Err(e),
            }
        }

        self.advance_state(ProvisioningState::SubscriptionEnsured);
        Ok(())
    }
}

#[async_trait]
impl SinkConnector for TopicConnector {
    async fn ensure_resources(&self) -> Result<(), ProvisioningError> {
        // Fast path once fully provisioned; called before every deliver.
        if self.state() >= ProvisioningState::SubscriptionEnsured as u8 {
            return Ok(());
        }

        if self.state() < ProvisioningState::TopicEnsured as u8 {
            self.ensure_topic().await?;
        }

        // A cancellation between topic and subscription creation leaves the
        // topic in place; the next call resumes from the existence checks.
        self.ensure_subscription().await
    }

    async fn deliver(
        &self,
        _partition_key: &str,
        fields: &WireFields,
    ) -> Result<(), DeliveryError> {
        // Message framing is per-call, so no trailing terminator.
        let payload = fields.joined();

        tokio::time::timeout(
            self.timeout,
            self.api.publish(&self.topic_id, payload.into_bytes()),
        )
        .await
        .map_err(|_| DeliveryError::Timeout {
            target: format!("topic {}", self.topic_id),
        })??;

        debug!(topic = %self.topic_id, "Message published");
        Ok(())
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Pubsub
    }
}
