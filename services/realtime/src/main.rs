//! Realtime service binary: consumes the bus, routes domain operations, and
//! runs the daily valuation batch.

mod cache;
mod consumer;
mod error;
mod lock;
mod router;
mod schedule;
mod services;
mod store;

use anyhow::Result;
use cache::{EntityCache, NoopCache, RedisCache};
use consumer::BusListener;
use lock::LockManager;
use router::MessageRouter;
use services::{AhpConfigService, StockService, SubscriptionService, UserService};
use std::sync::Arc;
use store::{MemoryAhpConfigStore, MemoryStockStore, MemorySubscriptionStore, MemoryUserStore};
use tickflow_bus::KafkaBus;
use tickflow_config::Config;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

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

    let cache: Arc<dyn EntityCache> = match RedisCache::connect(&config.cache.url).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!(url = %config.cache.url, error = %e, "cache unavailable, continuing without");
            Arc::new(NoopCache)
        }
    };

    let locks = Arc::new(LockManager::new());
    let stocks = Arc::new(MemoryStockStore::new());
    let users = Arc::new(MemoryUserStore::new());

    let stock_service = Arc::new(StockService::new(
        stocks.clone(),
        users.clone(),
        locks.clone(),
        cache.clone(),
        config.valuation.clone(),
    ));
    let user_service = Arc::new(UserService::new(
        users,
        stocks,
        locks.clone(),
        cache.clone(),
    ));
    let subscription_service = Arc::new(SubscriptionService::new(
        Arc::new(MemorySubscriptionStore::new()),
        locks.clone(),
        cache.clone(),
    ));
    let ahp_service = Arc::new(AhpConfigService::new(
        Arc::new(MemoryAhpConfigStore::new()),
        locks,
        cache,
    ));

    let router = Arc::new(MessageRouter::new(
        config.routes.clone(),
        stock_service.clone(),
        user_service,
        subscription_service,
        ahp_service,
    ));

    let listener = BusListener::new(kafka.clone(), router, config.cluster_id.clone());
    listener.start(
        vec![
            config.kafka.topic.market_data.clone(),
            config.kafka.topic.market_rest.clone(),
            config.kafka.topic.market_webhooks.clone(),
        ],
        config.workers.pool_size,
        config.workers.queue_depth,
    )?;

    // Daily full recalculation of current ratios.
    let batch_service = stock_service;
    let batch_hour = config.valuation.batch_hour;
    let batch_minute = config.valuation.batch_minute;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(schedule::duration_until(batch_hour, batch_minute)).await;
            batch_service.recalculate_all().await;
        }
    });

    info!("realtime service started");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    kafka.close();
    Ok(())
}
