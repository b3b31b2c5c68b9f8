//! Integration tests for m2q-core.
//!
//! These run the full export pipeline against in-memory sink backends; no
//! cloud credentials or network access required.

use async_trait::async_trait;
use m2q_core::error::{DeliveryError, ProvisioningError};
use m2q_core::sink::{SinkConnector, StreamApi, StreamConnector, TopicApi, TopicConnector};
use m2q_core::{EventRecord, Exporter, ExportStage};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory partitioned stream.
#[derive(Default)]
struct MemoryStream {
    records: Mutex<Vec<(String, Vec<u8>)>>,
    fail: Mutex<bool>,
}

struct MemoryStreamApi(Arc<MemoryStream>);

#[async_trait]
impl StreamApi for MemoryStreamApi {
    async fn put_record(
        &self,
        stream_name: &str,
        partition_key: &str,
        data: Vec<u8>,
    ) -> Result<(), DeliveryError> {
        if *self.0.fail.lock().unwrap() {
            return Err(DeliveryError::Put {
                stream: stream_name.to_string(),
                message: "simulated outage".into(),
            });
        }
        self.0
            .records
            .lock()
            .unwrap()
            .push((partition_key.to_string(), data));
        Ok(())
    }
}

/// In-memory topic/subscription backend.
#[derive(Default)]
struct MemoryBroker {
    topics: Mutex<HashSet<String>>,
    subscriptions: Mutex<HashSet<String>>,
    messages: Mutex<Vec<Vec<u8>>>,
}

struct MemoryBrokerApi(Arc<MemoryBroker>);

#[async_trait]
impl TopicApi for MemoryBrokerApi {
    async fn topic_exists(&self, topic_id: &str) -> Result<bool, ProvisioningError> {
        Ok(self.0.topics.lock().unwrap().contains(topic_id))
    }

    async fn create_topic(&self, topic_id: &str) -> Result<(), ProvisioningError> {
        tokio::task::yield_now().await;
        if !self.0.topics.lock().unwrap().insert(topic_id.to_string()) {
            return Err(ProvisioningError::AlreadyExists {
                resource: format!("topic {}", topic_id),
            });
        }
        Ok(())
    }

    async fn subscription_exists(
        &self,
        subscription_id: &str,
    ) -> Result<bool, ProvisioningError> {
        Ok(self
            .0
            .subscriptions
            .lock()
            .unwrap()
            .contains(subscription_id))
    }

    async fn create_subscription(
        &self,
        _topic_id: &str,
        subscription_id: &str,
        _ack_deadline: Duration,
        _retention: Duration,
    ) -> Result<(), ProvisioningError> {
        tokio::task::yield_now().await;
        if !self
            .0
            .subscriptions
            .lock()
            .unwrap()
            .insert(subscription_id.to_string())
        {
            return Err(ProvisioningError::AlreadyExists {
                resource: format!("subscription {}", subscription_id),
            });
        }
        Ok(())
    }

    async fn publish(&self, _topic_id: &str, data: Vec<u8>) -> Result<(), DeliveryError> {
        self.0.messages.lock().unwrap().push(data);
        Ok(())
    }
}

fn raw_event(position: &str) -> Value {
    json!({
        "_id": {"_data": position},
        "operationType": "insert",
        "clusterTime": 1700000000u64,
        "fullDocument": {"a": 1},
        "ns": {"db": "d", "coll": "c"},
        "documentKey": {"_id": 1}
    })
}

mod stream_pipeline {
    use super::*;

    #[tokio::test]
    async fn test_end_to_end_stream_export() {
        let stream = Arc::new(MemoryStream::default());
        let connector = StreamConnector::with_api(
            Box::new(MemoryStreamApi(stream.clone())),
            "changes".into(),
            Duration::from_secs(5),
        );
        let exporter = Exporter::new(Arc::new(connector));

        exporter.export(&raw_event("abc")).await.unwrap();

        let records = stream.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "abc");
        assert_eq!(
            String::from_utf8(records[0].1.clone()).unwrap(),
            "{\"_data\":\"abc\"}|insert|2023-11-14 22:13:20|{\"a\":1}|{\"db\":\"d\",\"coll\":\"c\"}|{\"_id\":1}|null\n"
        );
    }

    #[tokio::test]
    async fn test_transport_outage_surfaces_as_deliver_stage_error() {
        let stream = Arc::new(MemoryStream::default());
        *stream.fail.lock().unwrap() = true;

        let connector = StreamConnector::with_api(
            Box::new(MemoryStreamApi(stream.clone())),
            "changes".into(),
            Duration::from_secs(5),
        );
        let exporter = Exporter::new(Arc::new(connector));

        let err = exporter.export(&raw_event("abc")).await.unwrap_err();
        assert_eq!(err.stage, ExportStage::Deliver);
        assert!(err.is_delivery());
        assert!(stream.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_order_is_preserved() {
        let stream = Arc::new(MemoryStream::default());
        let connector = StreamConnector::with_api(
            Box::new(MemoryStreamApi(stream.clone())),
            "changes".into(),
            Duration::from_secs(5),
        );
        let exporter = Exporter::new(Arc::new(connector));

        for position in ["p1", "p2", "p3"] {
            exporter.export(&raw_event(position)).await.unwrap();
        }

        let keys: Vec<String> = stream
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        assert_eq!(keys, vec!["p1", "p2", "p3"]);
    }
}

mod topic_pipeline {
    use super::*;

    #[tokio::test]
    async fn test_end_to_end_topic_export() {
        let broker = Arc::new(MemoryBroker::default());
        let connector = TopicConnector::with_api(
            Box::new(MemoryBrokerApi(broker.clone())),
            "d".into(),
            "c".into(),
            Duration::from_secs(5),
        );
        let exporter = Exporter::new(Arc::new(connector));

        exporter.export(&raw_event("abc")).await.unwrap();

        assert!(broker.topics.lock().unwrap().contains("d"));
        assert!(broker.subscriptions.lock().unwrap().contains("c"));

        let messages = broker.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        let payload = String::from_utf8(messages[0].clone()).unwrap();
        assert!(!payload.ends_with('\n'));
        assert_eq!(payload.split('|').count(), 7);
    }

    /// N concurrent first-time ensures against a fresh backend must end with
    /// exactly one topic and one subscription, and no caller may see an
    /// "already exists" race as an error.
    #[tokio::test]
    async fn test_concurrent_first_use_provisioning() {
        let broker = Arc::new(MemoryBroker::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            // Separate connector per task: fresh provisioning state, shared
            // backend, no in-process lock in common.
            let connector = Arc::new(TopicConnector::with_api(
                Box::new(MemoryBrokerApi(broker.clone())),
                "d".into(),
                "c".into(),
                Duration::from_secs(5),
            ));
            handles.push(tokio::spawn(async move {
                connector.ensure_resources().await
            }));
        }

        for handle in handles {
            handle.await.unwrap().expect("ensure_resources failed");
        }

        assert_eq!(broker.topics.lock().unwrap().len(), 1);
        assert_eq!(broker.subscriptions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_exports_through_shared_connector() {
        let broker = Arc::new(MemoryBroker::default());
        let connector: Arc<dyn SinkConnector> = Arc::new(TopicConnector::with_api(
            Box::new(MemoryBrokerApi(broker.clone())),
            "d".into(),
            "c".into(),
            Duration::from_secs(5),
        ));

        let mut handles = Vec::new();
        for i in 0..8 {
            let exporter = Exporter::new(connector.clone());
            handles.push(tokio::spawn(async move {
                exporter.export(&raw_event(&format!("p{}", i))).await
            }));
        }

        for handle in handles {
            handle.await.unwrap().expect("export failed");
        }

        assert_eq!(broker.topics.lock().unwrap().len(), 1);
        assert_eq!(broker.messages.lock().unwrap().len(), 8);
    }
}

mod decode_encode {
    use super::*;

    #[tokio::test]
    async fn test_structured_fields_survive_round_trip() {
        let raw = json!({
            "_id": {"_data": "abc"},
            "operationType": "update",
            "clusterTime": {"t": 1700000000u64, "i": 3},
            "fullDocument": {"a": 1, "nested": {"b": [1, 2, 3]}},
            "ns": {"db": "d", "coll": "c"},
            "documentKey": {"_id": "k1"},
            "updateDescription": {"updatedFields": {"a": 1}, "removedFields": ["x"]}
        });

        let record = EventRecord::from_raw(&raw).unwrap();
        let fields = record.encode().unwrap();

        for (index, key) in [(0, "_id"), (3, "fullDocument"), (4, "ns"), (5, "documentKey"), (6, "updateDescription")] {
            let reparsed: Value = serde_json::from_str(&fields.fields()[index]).unwrap();
            assert_eq!(reparsed, raw[key], "field {} did not round-trip", key);
        }
    }

    #[tokio::test]
    async fn test_invalidate_event_decodes_with_null_markers() {
        let raw = json!({
            "_id": {"_data": "zzz"},
            "operationType": "invalidate",
            "clusterTime": 1700000000u64,
            "ns": {"db": "d", "coll": "c"}
        });

        let record = EventRecord::from_raw(&raw).unwrap();
        let fields = record.encode().unwrap();
        assert_eq!(fields.fields()[3], "null");
        assert_eq!(fields.fields()[5], "null");
        assert_eq!(fields.fields()[6], "null");
    }
}
