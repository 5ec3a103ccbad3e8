//! Kafka transport: best-effort producer plus a pull-loop consumer.

use crate::{BusRecord, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const SEND_TIMEOUT_MS: &str = "5000";
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Producer/consumer pair over one broker set.
///
/// Publishing is fire-and-forget: delivery failures are logged, never
/// returned. Consumption is a single poll loop per subscription that feeds a
/// bounded channel; offsets auto-commit on an interval, so processing is
/// at-least-once and handlers must tolerate duplicates.
pub struct KafkaBus {
    brokers: String,
    client_id: String,
    group_id: String,
    producer: FutureProducer,
    running: Arc<AtomicBool>,
}

impl KafkaBus {
    pub fn connect(brokers: &str, client_id: &str, group_id: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", client_id)
            .set("message.timeout.ms", SEND_TIMEOUT_MS)
            .create()?;

        info!(brokers, client_id, "kafka producer connected");

        Ok(Self {
            brokers: brokers.to_string(),
            client_id: client_id.to_string(),
            group_id: group_id.to_string(),
            producer,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Fire-and-forget publish. Delivery acknowledgment is logged; failures
    /// never propagate to the caller.
    pub fn publish(&self, topic: &str, key: Option<&str>, payload: &[u8]) {
        let mut record = FutureRecord::<str, [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        match self.producer.send_result(record) {
            Ok(delivery) => {
                let topic = topic.to_string();
                tokio::spawn(async move {
                    match delivery.await {
                        Ok(Ok((partition, offset))) => {
                            debug!(topic, partition, offset, "kafka delivery acknowledged");
                        }
                        Ok(Err((e, _))) => error!(topic, error = %e, "kafka delivery failed"),
                        Err(_) => warn!(topic, "kafka delivery channel dropped"),
                    }
                });
            }
            Err((e, _)) => error!(topic, error = %e, "kafka enqueue failed"),
        }
    }

    /// Subscribe to `topics` and stream records through a bounded channel.
    ///
    /// The poll loop runs on its own task and stops when the bus is closed
    /// or the receiver is dropped. Restarting a subscription means calling
    /// this again on a fresh bus.
    pub fn subscribe(&self, topics: &[String], queue_depth: usize) -> Result<mpsc::Receiver<BusRecord>> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            .set("auto.offset.reset", "earliest")
            .create()?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs)?;
        info!(group_id = %self.group_id, ?topics, "kafka consumer subscribed");

        let (tx, rx) = mpsc::channel(queue_depth);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                match consumer.recv().await {
                    Ok(message) => {
                        let record = BusRecord {
                            topic: message.topic().to_string(),
                            key: message
                                .key()
                                .map(|k| String::from_utf8_lossy(k).into_owned()),
                            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                        };
                        if tx.send(record).await.is_err() {
                            debug!("kafka record receiver dropped, stopping poll loop");
                            break;
                        }
                    }
                    Err(e) => {
                        // Transient broker errors; the client rebalances and
                        // reconnects underneath us.
                        error!(error = %e, "kafka consumer error");
                    }
                }
            }
            info!("kafka poll loop stopped");
        });

        Ok(rx)
    }

    /// Stop consuming and flush pending sends.
    pub fn close(&self) {
        info!("kafka bus shutting down");
        self.running.store(false, Ordering::Relaxed);
        if let Err(e) = self.producer.flush(Timeout::After(FLUSH_TIMEOUT)) {
            error!(error = %e, "kafka producer flush failed");
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl Drop for KafkaBus {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}
