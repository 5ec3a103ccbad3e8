//! Bus listener: pulls records off the Kafka topics and dispatches them to
//! the router through a bounded worker pool, replying to the sender's topic
//! when the envelope names one.

use crate::router::MessageRouter;
use std::sync::Arc;
use tickflow_bus::{BusRecord, KafkaBus};
use tickflow_types::Response;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

pub struct BusListener {
    kafka: Arc<KafkaBus>,
    router: Arc<MessageRouter>,
    /// Identifies this instance on reply envelopes.
    source_id: String,
}

impl BusListener {
    pub fn new(kafka: Arc<KafkaBus>, router: Arc<MessageRouter>, source_id: String) -> Self {
        Self {
            kafka,
            router,
            source_id,
        }
    }

    /// Subscribe and start the dispatch pool. Records are handed off the
    /// poll loop immediately; the pool bounds concurrent handler runs.
    pub fn start(
        &self,
        topics: Vec<String>,
        pool_size: usize,
        queue_depth: usize,
    ) -> tickflow_bus::Result<()> {
        let records = self.kafka.subscribe(&topics, queue_depth)?;
        let records = Arc::new(Mutex::new(records));

        for worker in 0..pool_size {
            let records = Arc::clone(&records);
            let router = Arc::clone(&self.router);
            let kafka = Arc::clone(&self.kafka);
            let source_id = self.source_id.clone();
            tokio::spawn(async move {
                loop {
                    let record = {
                        let mut rx = records.lock().await;
                        rx.recv().await
                    };
                    let Some(record) = record else { break };
                    handle_record(&router, &kafka, &source_id, record).await;
                }
                debug!(worker, "dispatch worker stopped");
            });
        }
        Ok(())
    }
}

async fn handle_record(
    router: &MessageRouter,
    kafka: &KafkaBus,
    source_id: &str,
    record: BusRecord,
) {
    let envelope = match tickflow_codec::decode(&record.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!(topic = %record.topic, error = %e, "undecodable envelope dropped");
            return;
        }
    };

    let reply_topic = envelope.source_id.clone();
    let uri = envelope.uri.clone();
    let response = router.route(&envelope).await;

    // Reply to the sender's topic with the inbound key, preserving
    // partition affinity for the conversation.
    if let Some(reply_topic) = reply_topic {
        send_response(
            kafka,
            source_id,
            &reply_topic,
            record.key.as_deref(),
            uri.as_deref().unwrap_or(""),
            &response,
        );
    }
}

fn send_response(
    kafka: &KafkaBus,
    source_id: &str,
    reply_topic: &str,
    key: Option<&str>,
    uri: &str,
    response: &Response,
) {
    let payload = match serde_json::to_value(response) {
        Ok(value) => value,
        Err(e) => {
            error!(reply_topic, error = %e, "response serialization failed");
            return;
        }
    };
    match tickflow_codec::encode(source_id, uri, payload) {
        Ok(bytes) => kafka.publish(reply_topic, key, &bytes),
        Err(e) => error!(reply_topic, error = %e, "reply envelope encoding failed"),
    }
}
