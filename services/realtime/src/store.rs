//! Store boundary for domain entities.
//!
//! The durable store is a collaborator, not part of this service; these
//! traits capture exactly what the domain services need (get/save/delete by
//! id, the sector query, the full id scan) and the in-memory implementations
//! back both the default wiring and the tests.

use dashmap::DashMap;
use tickflow_types::{AhpConfig, Stock, Subscription, User};

pub trait StockStore: Send + Sync {
    fn get(&self, stock_id: &str) -> Option<Stock>;
    fn save(&self, stock: Stock);
    fn delete(&self, stock_id: &str) -> bool;
    /// Ids of every stock in `sector`.
    fn find_by_sector(&self, sector: &str) -> Vec<String>;
    fn all_ids(&self) -> Vec<String>;
}

pub trait UserStore: Send + Sync {
    fn get(&self, user_id: &str) -> Option<User>;
    fn save(&self, user: User);
    fn delete(&self, user_id: &str) -> bool;
    fn exists_by_username(&self, username: &str) -> bool;
    fn exists_by_email(&self, email: &str) -> bool;
}

pub trait SubscriptionStore: Send + Sync {
    fn get(&self, subscription_id: &str) -> Option<Subscription>;
    fn save(&self, subscription: Subscription);
    fn delete(&self, subscription_id: &str) -> bool;
}

pub trait AhpConfigStore: Send + Sync {
    fn get(&self, ahp_config_id: &str) -> Option<AhpConfig>;
    fn save(&self, config: AhpConfig);
}

#[derive(Default)]
pub struct MemoryStockStore {
    stocks: DashMap<String, Stock>,
}

impl MemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StockStore for MemoryStockStore {
    fn get(&self, stock_id: &str) -> Option<Stock> {
        self.stocks.get(stock_id).map(|entry| entry.clone())
    }

    fn save(&self, stock: Stock) {
        self.stocks.insert(stock.stock_id.clone(), stock);
    }

    fn delete(&self, stock_id: &str) -> bool {
        self.stocks.remove(stock_id).is_some()
    }

    fn find_by_sector(&self, sector: &str) -> Vec<String> {
        self.stocks
            .iter()
            .filter(|entry| entry.sector.as_deref() == Some(sector))
            .map(|entry| entry.stock_id.clone())
            .collect()
    }

    fn all_ids(&self) -> Vec<String> {
        self.stocks.iter().map(|entry| entry.stock_id.clone()).collect()
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn get(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|entry| entry.clone())
    }

    fn save(&self, user: User) {
        self.users.insert(user.user_id.clone(), user);
    }

    fn delete(&self, user_id: &str) -> bool {
        self.users.remove(user_id).is_some()
    }

    fn exists_by_username(&self, username: &str) -> bool {
        self.users
            .iter()
            .any(|entry| entry.username.as_deref() == Some(username))
    }

    fn exists_by_email(&self, email: &str) -> bool {
        self.users
            .iter()
            .any(|entry| entry.email.as_deref() == Some(email))
    }
}

#[derive(Default)]
pub struct MemorySubscriptionStore {
    subscriptions: DashMap<String, Subscription>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn ids(&self) -> Vec<String> {
        self.subscriptions
            .iter()
            .map(|entry| entry.subscription_id.clone())
            .collect()
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn get(&self, subscription_id: &str) -> Option<Subscription> {
        self.subscriptions
            .get(subscription_id)
            .map(|entry| entry.clone())
    }

    fn save(&self, subscription: Subscription) {
        self.subscriptions
            .insert(subscription.subscription_id.clone(), subscription);
    }

    fn delete(&self, subscription_id: &str) -> bool {
        self.subscriptions.remove(subscription_id).is_some()
    }
}

#[derive(Default)]
pub struct MemoryAhpConfigStore {
    configs: DashMap<String, AhpConfig>,
}

impl MemoryAhpConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AhpConfigStore for MemoryAhpConfigStore {
    fn get(&self, ahp_config_id: &str) -> Option<AhpConfig> {
        self.configs.get(ahp_config_id).map(|entry| entry.clone())
    }

    fn save(&self, config: AhpConfig) {
        self.configs.insert(config.ahp_config_id.clone(), config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_query_matches_exactly() {
        let store = MemoryStockStore::new();
        let mut banking = Stock::new("VCB");
        banking.sector = Some("banking".to_string());
        let mut retail = Stock::new("MWG");
        retail.sector = Some("retail".to_string());
        store.save(banking);
        store.save(retail);

        assert_eq!(store.find_by_sector("banking"), vec!["VCB".to_string()]);
        assert!(store.find_by_sector("energy").is_empty());
    }

    #[test]
    fn user_uniqueness_checks_cover_username_and_email() {
        let store = MemoryUserStore::new();
        let mut user = User::new("u1");
        user.username = Some("alice".to_string());
        user.email = Some("alice@example.com".to_string());
        store.save(user);

        assert!(store.exists_by_username("alice"));
        assert!(store.exists_by_email("alice@example.com"));
        assert!(!store.exists_by_username("bob"));
    }
}
