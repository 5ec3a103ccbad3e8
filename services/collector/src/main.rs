//! Feed connector binary: vendor ticks in, canonical envelopes out.

mod auth;
mod error;
mod feed;
mod workers;

use anyhow::Result;
use feed::{ConfigSymbols, FeedConnector};
use std::sync::Arc;
use tickflow_bus::{KafkaBus, MqttBus};
use tickflow_config::Config;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use workers::{spawn_tick_workers, TickPublisher};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load()?;
    config.log_summary();

    let kafka = Arc::new(KafkaBus::connect(
        &config.kafka.brokers,
        &config.cluster_id,
        &config.kafka.group_id,
    )?);

    // Side-broadcast session. Nothing is subscribed on it, but its event
    // stream must be drained to keep the session polled.
    let (side_mqtt, mut side_events) = MqttBus::connect(
        &config.mqtt.url,
        &format!("{}-broadcast", config.cluster_id),
        &config.mqtt.username,
        &config.mqtt.password,
        config.workers.queue_depth,
    )?;
    let side_mqtt = Arc::new(side_mqtt);
    tokio::spawn(async move {
        while let Some(event) = side_events.recv().await {
            if let tickflow_bus::MqttEvent::ConnectionLost(reason) = event {
                warn!(reason, "broadcast session dropped, transport retrying");
            }
        }
    });

    let (tick_tx, tick_rx) = mpsc::channel(config.workers.queue_depth);
    spawn_tick_workers(
        config.workers.pool_size,
        tick_rx,
        Arc::new(TickPublisher {
            source_id: config.cluster_id.clone(),
            uri: config.routes.stock.update_match_price.clone(),
            kafka_topic: config.kafka.topic.market_data.clone(),
            mqtt_topic: config.mqtt.market_data_topic.clone(),
            kafka: Arc::clone(&kafka),
            mqtt: Arc::clone(&side_mqtt),
        }),
    );

    let connector = FeedConnector::new(
        config.cluster_id.clone(),
        config.data_feed.clone(),
        Arc::new(ConfigSymbols(config.data_feed.symbols.clone())),
        config.workers.queue_depth,
        tick_tx,
    )?;

    info!("collector started");
    tokio::select! {
        _ = connector.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    side_mqtt.close().await;
    kafka.close();
    Ok(())
}
