//! Entity cache boundary.
//!
//! Entities are mirrored into a shared cache as hash fields keyed by entity
//! class name and id so read-side services see updates without hitting the
//! store. Cache writes are best-effort: a failure is logged and the domain
//! operation still succeeds.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, error, info};

/// Hash names, one per entity class.
pub mod entity {
    pub const STOCK: &str = "STOCK";
    pub const STOCK_YEAR_DATA: &str = "STOCKYEARDATA";
    pub const USER: &str = "USER";
    pub const SUBSCRIPTION: &str = "SUBSCRIPTION";
    pub const AHP_CONFIG: &str = "AHPCONFIG";
}

#[async_trait]
pub trait EntityCache: Send + Sync {
    async fn put(&self, entity: &str, id: &str, value: &serde_json::Value);
    async fn delete(&self, entity: &str, id: &str);
}

pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(url, "redis cache connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl EntityCache for RedisCache {
    async fn put(&self, entity: &str, id: &str, value: &serde_json::Value) {
        let mut conn = self.conn.clone();
        match conn.hset::<_, _, _, ()>(entity, id, value.to_string()).await {
            Ok(()) => debug!(entity, id, "cache updated"),
            Err(e) => error!(entity, id, error = %e, "cache put failed"),
        }
    }

    async fn delete(&self, entity: &str, id: &str) {
        let mut conn = self.conn.clone();
        if let Err(e) = conn.hdel::<_, _, ()>(entity, id).await {
            error!(entity, id, error = %e, "cache delete failed");
        }
    }
}

/// Cache that does nothing; wiring for deployments without a cache and for
/// tests that only exercise domain logic.
#[derive(Default)]
pub struct NoopCache;

#[async_trait]
impl EntityCache for NoopCache {
    async fn put(&self, _entity: &str, _id: &str, _value: &serde_json::Value) {}
    async fn delete(&self, _entity: &str, _id: &str) {}
}
