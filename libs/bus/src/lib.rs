//! Bus transport wrappers.
//!
//! Two transports back the pipeline: a partitioned Kafka log for
//! inter-service messaging and an MQTT broker for tick feeds and side
//! broadcasts. Both wrappers expose the same narrow surface (best-effort
//! publish, a record stream, a scoped shutdown) and keep every
//! transport failure out of the caller's result path: publish errors are
//! logged, subscription errors surface as events for the owner's reconnect
//! policy.

mod error;
mod kafka;
mod mqtt;

pub use error::{BusError, Result};
pub use kafka::KafkaBus;
pub use mqtt::{MqttBus, MqttEvent};

/// One record pulled off a subscription.
#[derive(Debug, Clone)]
pub struct BusRecord {
    pub topic: String,
    /// Partition key; present on Kafka records only.
    pub key: Option<String>,
    pub payload: Vec<u8>,
}
