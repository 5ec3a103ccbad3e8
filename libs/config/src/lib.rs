//! Centralized configuration for Tickflow services.
//!
//! Loads a TOML file (path from `TICKFLOW_CONFIG`, default `config.toml`),
//! falls back to defaults when absent, then applies environment overrides
//! for the values that differ per deployment.

use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Identifier of this cluster/service instance; becomes the envelope
    /// `source_id` and the bus client id.
    pub cluster_id: String,
    pub kafka: KafkaConfig,
    pub mqtt: MqttConfig,
    pub data_feed: DataFeedConfig,
    pub cache: CacheConfig,
    pub routes: RouteTable,
    pub workers: WorkerConfig,
    pub valuation: ValuationConfig,
}

/// Entity cache shared with read-side services.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: String,
    pub group_id: String,
    pub topic: KafkaTopics,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaTopics {
    pub market_data: String,
    pub market_rest: String,
    pub market_webhooks: String,
}

/// Side-broadcast channel for canonical tick events.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub market_data_topic: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataFeedConfig {
    /// Credential endpoint: username/password -> token.
    pub token_url: String,
    /// Identity endpoint: token -> subscriber (investor) id.
    pub investor_url: String,
    /// Vendor tick broker.
    pub broker_url: String,
    pub username: String,
    pub password: String,
    /// Topic prefix; the security id is appended per subscription.
    pub tick_topic_prefix: String,
    /// Stocks to subscribe to when no external symbol source is wired in.
    pub symbols: Vec<String>,
    /// Daily pre-market teardown/reinit time, local to the market offset.
    pub reset_hour: u32,
    pub reset_minute: u32,
}

/// The routed URI table. Semantics are fixed; the strings are deployment
/// configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteTable {
    pub user: UserRoutes,
    pub stock: StockRoutes,
    pub stock_year_data: StockYearDataRoutes,
    pub subscription: SubscriptionRoutes,
    pub ahp_config: AhpConfigRoutes,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UserRoutes {
    pub prefix: String,
    pub create: String,
    pub update: String,
    pub delete: String,
    pub update_password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StockRoutes {
    pub prefix: String,
    pub create: String,
    pub update: String,
    pub delete: String,
    pub update_industry_ratios: String,
    pub update_year_data: String,
    pub update_match_price: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StockYearDataRoutes {
    pub prefix: String,
    pub update: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionRoutes {
    pub prefix: String,
    pub create: String,
    pub update: String,
    pub delete: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AhpConfigRoutes {
    pub prefix: String,
    pub create: String,
    pub update: String,
}

/// Bounded fan-out for tick and bus-record dispatch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub pool_size: usize,
    pub queue_depth: usize,
}

/// Engine-external valuation policy: projection horizon and the conservative
/// default multiples used when a stock has no sector averages.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValuationConfig {
    pub projection_years: u32,
    pub default_pe: Decimal,
    pub default_pb: Decimal,
    pub default_pcf: Decimal,
    pub default_ps: Decimal,
    /// Daily full-recalculation time, market-local.
    pub batch_hour: u32,
    pub batch_minute: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster_id: "tickflow-local".to_string(),
            kafka: KafkaConfig::default(),
            mqtt: MqttConfig::default(),
            data_feed: DataFeedConfig::default(),
            cache: CacheConfig::default(),
            routes: RouteTable::default(),
            workers: WorkerConfig::default(),
            valuation: ValuationConfig::default(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "tickflow".to_string(),
            topic: KafkaTopics::default(),
        }
    }
}

impl Default for KafkaTopics {
    fn default() -> Self {
        Self {
            market_data: "market-data".to_string(),
            market_rest: "market-rest".to_string(),
            market_webhooks: "market-webhooks".to_string(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            url: "mqtt://localhost:1883".to_string(),
            username: String::new(),
            password: String::new(),
            market_data_topic: "tickflow/market-data".to_string(),
        }
    }
}

impl Default for DataFeedConfig {
    fn default() -> Self {
        Self {
            token_url: "https://feed.example.com/auth/token".to_string(),
            investor_url: "https://feed.example.com/auth/investor".to_string(),
            broker_url: "wss://feed.example.com/wss".to_string(),
            username: String::new(),
            password: String::new(),
            tick_topic_prefix: "plaintext/quotes/krx/mdds/tick/v1/roundlot/symbol/".to_string(),
            symbols: Vec::new(),
            reset_hour: 8,
            reset_minute: 45,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            user: UserRoutes::default(),
            stock: StockRoutes::default(),
            stock_year_data: StockYearDataRoutes::default(),
            subscription: SubscriptionRoutes::default(),
            ahp_config: AhpConfigRoutes::default(),
        }
    }
}

impl Default for UserRoutes {
    fn default() -> Self {
        Self {
            prefix: "/user".to_string(),
            create: "/user/create".to_string(),
            update: "/user/update".to_string(),
            delete: "/user/delete".to_string(),
            update_password: "/user/updatePassword".to_string(),
        }
    }
}

impl Default for StockRoutes {
    fn default() -> Self {
        Self {
            prefix: "/stock".to_string(),
            create: "/stock/create".to_string(),
            update: "/stock/update".to_string(),
            delete: "/stock/delete".to_string(),
            update_industry_ratios: "/stock/updateIndustryRatios".to_string(),
            update_year_data: "/stock/updateYearData".to_string(),
            update_match_price: "/stock/updateMatchPrice".to_string(),
        }
    }
}

impl Default for StockYearDataRoutes {
    fn default() -> Self {
        Self {
            prefix: "/stockYearData".to_string(),
            update: "/stockYearData/update".to_string(),
        }
    }
}

impl Default for SubscriptionRoutes {
    fn default() -> Self {
        Self {
            prefix: "/subscription".to_string(),
            create: "/subscription/create".to_string(),
            update: "/subscription/update".to_string(),
            delete: "/subscription/delete".to_string(),
        }
    }
}

impl Default for AhpConfigRoutes {
    fn default() -> Self {
        Self {
            prefix: "/ahpConfig".to_string(),
            create: "/ahpConfig/create".to_string(),
            update: "/ahpConfig/update".to_string(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            queue_depth: 1024,
        }
    }
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            projection_years: 5,
            default_pe: Decimal::new(150, 1),  // 15.0
            default_pb: Decimal::new(20, 1),   // 2.0
            default_pcf: Decimal::new(120, 1), // 12.0
            default_ps: Decimal::new(15, 1),   // 1.5
            batch_hour: 15,
            batch_minute: 0,
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("TICKFLOW_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents)?
        } else {
            Self::default()
        };

        config.override_from_env();
        Ok(config)
    }

    fn override_from_env(&mut self) {
        if let Ok(cluster_id) = std::env::var("TICKFLOW_CLUSTER_ID") {
            self.cluster_id = cluster_id;
        }
        if let Ok(brokers) = std::env::var("TICKFLOW_KAFKA_BROKERS") {
            self.kafka.brokers = brokers;
        }
        if let Ok(group_id) = std::env::var("TICKFLOW_KAFKA_GROUP_ID") {
            self.kafka.group_id = group_id;
        }
        if let Ok(url) = std::env::var("TICKFLOW_MQTT_URL") {
            self.mqtt.url = url;
        }
        if let Ok(url) = std::env::var("TICKFLOW_CACHE_URL") {
            self.cache.url = url;
        }
        if let Ok(username) = std::env::var("TICKFLOW_FEED_USERNAME") {
            self.data_feed.username = username;
        }
        if let Ok(password) = std::env::var("TICKFLOW_FEED_PASSWORD") {
            self.data_feed.password = password;
        }
    }

    /// Log the effective configuration at startup. Secrets are redacted.
    pub fn log_summary(&self) {
        info!("===== Tickflow configuration =====");
        info!(cluster_id = %self.cluster_id, "instance");
        info!(
            brokers = %self.kafka.brokers,
            group_id = %self.kafka.group_id,
            market_data = %self.kafka.topic.market_data,
            "kafka"
        );
        info!(url = %self.mqtt.url, topic = %self.mqtt.market_data_topic, "mqtt");
        info!(url = %self.cache.url, "cache");
        info!(
            token_url = %self.data_feed.token_url,
            investor_url = %self.data_feed.investor_url,
            broker_url = %self.data_feed.broker_url,
            symbols = self.data_feed.symbols.len(),
            "data feed"
        );
        info!(
            pool_size = self.workers.pool_size,
            queue_depth = self.workers.queue_depth,
            "workers"
        );
        info!("==================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn defaults_match_the_documented_fallback_multiples() {
        let config = ValuationConfig::default();
        assert_eq!(config.default_pe, dec!(15.0));
        assert_eq!(config.default_pb, dec!(2.0));
        assert_eq!(config.default_pcf, dec!(12.0));
        assert_eq!(config.default_ps, dec!(1.5));
        assert_eq!(config.projection_years, 5);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
cluster_id = "realtime-2"

[kafka]
brokers = "kafka-1:9092,kafka-2:9092"
"#
        )
        .unwrap();

        let contents = std::fs::read_to_string(file.path()).unwrap();
        let config: Config = toml::from_str(&contents).unwrap();

        assert_eq!(config.cluster_id, "realtime-2");
        assert_eq!(config.kafka.brokers, "kafka-1:9092,kafka-2:9092");
        // Untouched sections fall back to defaults.
        assert_eq!(config.routes.stock.prefix, "/stock");
        assert_eq!(config.workers.pool_size, 8);
    }

    #[test]
    fn year_data_route_is_more_specific_than_stock_route() {
        let routes = RouteTable::default();
        assert!(routes
            .stock
            .update_year_data
            .starts_with(&routes.stock.prefix));
        assert_ne!(routes.stock_year_data.prefix, routes.stock.prefix);
    }
}
