//! Fixed worker pool that republishes canonical tick events.
//!
//! The feed poll loop hands ticks off through a bounded channel so a slow
//! broker never stalls it; each worker wraps the tick in a fresh envelope
//! and publishes to the Kafka log and the MQTT side-broadcast topic
//! independently, both best-effort.

use std::sync::Arc;
use tickflow_bus::{KafkaBus, MqttBus};
use tickflow_types::TickEvent;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

pub struct TickPublisher {
    pub source_id: String,
    pub uri: String,
    pub kafka_topic: String,
    pub mqtt_topic: String,
    pub kafka: Arc<KafkaBus>,
    pub mqtt: Arc<MqttBus>,
}

impl TickPublisher {
    async fn publish(&self, tick: TickEvent) {
        let payload = match serde_json::to_value(&tick) {
            Ok(value) => value,
            Err(e) => {
                error!(stock_id = %tick.stock_id, error = %e, "tick serialization failed");
                return;
            }
        };
        let bytes = match tickflow_codec::encode(&self.source_id, &self.uri, payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(stock_id = %tick.stock_id, error = %e, "envelope encoding failed");
                return;
            }
        };

        // Two legs, no ordering between them; a failure on one never
        // suppresses the other.
        self.kafka
            .publish(&self.kafka_topic, Some(&tick.stock_id), &bytes);
        self.mqtt.publish(&self.mqtt_topic, &bytes).await;
    }
}

/// Spawn `pool_size` workers draining the shared tick channel. Workers exit
/// when the sender side is dropped.
pub fn spawn_tick_workers(
    pool_size: usize,
    ticks: mpsc::Receiver<TickEvent>,
    publisher: Arc<TickPublisher>,
) {
    let ticks = Arc::new(Mutex::new(ticks));
    for worker in 0..pool_size {
        let ticks = Arc::clone(&ticks);
        let publisher = Arc::clone(&publisher);
        tokio::spawn(async move {
            loop {
                let tick = {
                    let mut rx = ticks.lock().await;
                    rx.recv().await
                };
                match tick {
                    Some(tick) => publisher.publish(tick).await,
                    None => break,
                }
            }
            debug!(worker, "tick worker stopped");
        });
    }
}
