use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("mqtt client error: {0}")]
    MqttClient(#[from] rumqttc::ClientError),

    #[error("invalid broker url: {0}")]
    InvalidBrokerUrl(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
