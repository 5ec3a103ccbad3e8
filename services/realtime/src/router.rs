//! URI-based message router.
//!
//! Dispatch is longest-meaningful-prefix: the year-data prefix is tested
//! before the stock prefix because the former's path begins with the
//! latter's. CRUD endpoints are exact matches against configured URIs;
//! parameterized endpoints parse the trailing path segment as an integer
//! year. Every failure becomes a response envelope; nothing escapes to the
//! transport layer.

use crate::error::{RealtimeError, Result};
use crate::services::{AhpConfigService, StockService, SubscriptionService, UserService};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tickflow_codec::Envelope;
use tickflow_config::RouteTable;
use tickflow_types::{
    response::codes, AhpConfigRequest, Response, StockRequest, SubscriptionRequest, UserRequest,
    YearDataRequest,
};
use tracing::{error, info, warn};

pub struct MessageRouter {
    routes: RouteTable,
    stocks: Arc<StockService>,
    users: Arc<UserService>,
    subscriptions: Arc<SubscriptionService>,
    ahp: Arc<AhpConfigService>,
}

impl MessageRouter {
    pub fn new(
        routes: RouteTable,
        stocks: Arc<StockService>,
        users: Arc<UserService>,
        subscriptions: Arc<SubscriptionService>,
        ahp: Arc<AhpConfigService>,
    ) -> Self {
        Self {
            routes,
            stocks,
            users,
            subscriptions,
            ahp,
        }
    }

    pub async fn route(&self, envelope: &Envelope) -> Response {
        let Some(uri) = envelope.uri.as_deref() else {
            error!("envelope without uri cannot be routed");
            return Response::error(codes::BAD_REQUEST, "Message or URI is null");
        };
        info!(uri, event_id = %envelope.event_id, "routing message");

        let outcome = self.dispatch(uri, &envelope.payload).await;
        outcome.unwrap_or_else(|e| {
            error!(uri, error = %e, "handler failed");
            e.into_response()
        })
    }

    async fn dispatch(&self, uri: &str, payload: &serde_json::Value) -> Result<Response> {
        // The year-data prefix is a superset victim of /stock; check it first.
        if uri.starts_with(&self.routes.stock_year_data.prefix) {
            self.dispatch_year_data(uri, payload).await
        } else if uri.starts_with(&self.routes.user.prefix) {
            self.dispatch_user(uri, payload).await
        } else if uri.starts_with(&self.routes.stock.prefix) {
            self.dispatch_stock(uri, payload).await
        } else if uri.starts_with(&self.routes.subscription.prefix) {
            self.dispatch_subscription(uri, payload).await
        } else if uri.starts_with(&self.routes.ahp_config.prefix) {
            self.dispatch_ahp(uri, payload).await
        } else {
            warn!(uri, "unknown uri pattern");
            Err(RealtimeError::NotFound(format!(
                "Unknown URI pattern: {uri}"
            )))
        }
    }

    async fn dispatch_year_data(&self, uri: &str, payload: &serde_json::Value) -> Result<Response> {
        let routes = &self.routes.stock_year_data;
        if uri.starts_with(&routes.update) {
            let year = year_segment(uri, &routes.update)?;
            let request: YearDataRequest = parse(payload)?;
            let stock_id = request
                .stock_id
                .clone()
                .ok_or_else(|| RealtimeError::BadRequest("stockId is required".to_string()))?;
            self.stocks.update_year_data(&stock_id, year, &request).await
        } else {
            Err(RealtimeError::NotFound(format!(
                "Unknown stock year data URI: {uri}"
            )))
        }
    }

    async fn dispatch_user(&self, uri: &str, payload: &serde_json::Value) -> Result<Response> {
        let routes = &self.routes.user;
        let request: UserRequest = parse(payload)?;
        if uri == routes.create {
            self.users.create(&request).await
        } else if uri == routes.update {
            self.users.update(&request).await
        } else if uri.starts_with(&routes.delete) {
            self.users.delete(&request).await
        } else if uri.starts_with(&routes.update_password) {
            self.users.update_password(&request).await
        } else {
            Err(RealtimeError::NotFound(format!("Unknown user URI: {uri}")))
        }
    }

    async fn dispatch_stock(&self, uri: &str, payload: &serde_json::Value) -> Result<Response> {
        let routes = &self.routes.stock;
        let request: StockRequest = parse(payload)?;
        if uri == routes.create {
            self.stocks.create(&request).await
        } else if uri == routes.update {
            self.stocks.update(&request).await
        } else if uri == routes.delete {
            self.stocks.delete(&request).await
        } else if uri == routes.update_industry_ratios {
            self.stocks.update_industry_ratios(&request).await
        } else if uri.starts_with(&format!("{}/", routes.update_year_data)) {
            let year = year_segment(uri, &routes.update_year_data)?;
            let stock_id = request
                .stock_id
                .clone()
                .ok_or_else(|| RealtimeError::BadRequest("stockId is required".to_string()))?;
            let nested = request.stock_year_data.clone().ok_or_else(|| {
                RealtimeError::BadRequest("stockYearData is required".to_string())
            })?;
            let year_request: YearDataRequest = parse(&nested)?;
            self.stocks
                .update_year_data(&stock_id, year, &year_request)
                .await
        } else if uri.starts_with(&routes.update_match_price) {
            self.stocks.update_match_price(&request).await
        } else {
            Err(RealtimeError::NotFound(format!("Unknown stock URI: {uri}")))
        }
    }

    async fn dispatch_subscription(
        &self,
        uri: &str,
        payload: &serde_json::Value,
    ) -> Result<Response> {
        let routes = &self.routes.subscription;
        let request: SubscriptionRequest = parse(payload)?;
        if uri == routes.create {
            self.subscriptions.create(&request).await
        } else if uri == routes.update {
            self.subscriptions.update(&request).await
        } else if uri.starts_with(&routes.delete) {
            self.subscriptions.delete(&request).await
        } else {
            Err(RealtimeError::NotFound(format!(
                "Unknown subscription URI: {uri}"
            )))
        }
    }

    async fn dispatch_ahp(&self, uri: &str, payload: &serde_json::Value) -> Result<Response> {
        let routes = &self.routes.ahp_config;
        let request: AhpConfigRequest = parse(payload)?;
        if uri == routes.create {
            self.ahp.create(&request).await
        } else if uri == routes.update {
            self.ahp.update(&request).await
        } else {
            Err(RealtimeError::NotFound(format!(
                "Unknown AHP config URI: {uri}"
            )))
        }
    }
}

/// Deserialize a routed payload. A shape mismatch is an internal error (500)
/// with the serde message carried for diagnostics.
fn parse<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T> {
    serde_json::from_value(payload.clone()).map_err(RealtimeError::from)
}

/// Parse the trailing `/{year}` of a parameterized uri.
fn year_segment(uri: &str, base: &str) -> Result<i32> {
    let segment = uri
        .strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or("");
    if segment.is_empty() || segment.contains('/') {
        return Err(RealtimeError::BadRequest(format!(
            "Invalid URI format, expected {base}/{{year}}: {uri}"
        )));
    }
    segment.parse().map_err(|_| {
        RealtimeError::BadRequest(format!("Invalid year path segment in URI: {uri}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::MemoryCache;
    use crate::cache::EntityCache;
    use crate::lock::LockManager;
    use crate::store::{
        MemoryAhpConfigStore, MemoryStockStore, MemorySubscriptionStore, MemoryUserStore,
        StockStore,
    };
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use tickflow_types::Stock;

    struct Fixture {
        stocks: Arc<MemoryStockStore>,
        router: MessageRouter,
    }

    fn fixture() -> Fixture {
        let stocks = Arc::new(MemoryStockStore::new());
        let users = Arc::new(MemoryUserStore::new());
        let locks = Arc::new(LockManager::new());
        let cache: Arc<dyn EntityCache> = Arc::new(MemoryCache::default());
        let valuation = tickflow_config::ValuationConfig::default();

        let stock_service = Arc::new(StockService::new(
            stocks.clone(),
            users.clone(),
            locks.clone(),
            cache.clone(),
            valuation,
        ));
        let user_service = Arc::new(UserService::new(
            users,
            stocks.clone(),
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

        Fixture {
            stocks,
            router: MessageRouter::new(
                RouteTable::default(),
                stock_service,
                user_service,
                subscription_service,
                ahp_service,
            ),
        }
    }

    fn envelope(uri: &str, payload: Value) -> Envelope {
        Envelope::new("test-source", uri, payload)
    }

    #[tokio::test]
    async fn null_uri_is_a_400() {
        let f = fixture();
        let mut message = envelope("/x", Value::Null);
        message.uri = None;

        let response = f.router.route(&message).await;
        assert!(!response.success);
        assert_eq!(response.error_code, codes::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_domain_is_a_404() {
        let f = fixture();
        let response = f.router.route(&envelope("/unknown/path", Value::Null)).await;
        assert_eq!(response.error_code, codes::NOT_FOUND);
    }

    #[tokio::test]
    async fn year_data_route_wins_over_the_stock_prefix() {
        let f = fixture();
        f.stocks.save(Stock::new("VCB"));

        let response = f
            .router
            .route(&envelope(
                "/stockYearData/update/2023",
                json!({"stockId": "VCB", "netIncome": "120", "sharesOutstanding": 100}),
            ))
            .await;

        assert!(response.success, "{response:?}");
        let stock = f.stocks.get("VCB").unwrap();
        assert_eq!(stock.year_data[&2023].net_income, Some(dec!(120)));
    }

    #[tokio::test]
    async fn non_integer_year_segment_is_a_400() {
        let f = fixture();
        let response = f
            .router
            .route(&envelope(
                "/stockYearData/update/twenty23",
                json!({"stockId": "VCB"}),
            ))
            .await;
        assert_eq!(response.error_code, codes::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_year_segment_is_a_400() {
        let f = fixture();
        let response = f
            .router
            .route(&envelope("/stock/updateYearData/", json!({"stockId": "VCB"})))
            .await;
        assert_eq!(response.error_code, codes::BAD_REQUEST);
    }

    #[tokio::test]
    async fn nested_year_data_travels_through_the_stock_route() {
        let f = fixture();
        f.stocks.save(Stock::new("VCB"));

        let response = f
            .router
            .route(&envelope(
                "/stock/updateYearData/2023",
                json!({
                    "stockId": "VCB",
                    "stockYearData": {"revenue": "500", "sharesOutstanding": 100}
                }),
            ))
            .await;

        assert!(response.success, "{response:?}");
        let stock = f.stocks.get("VCB").unwrap();
        assert_eq!(stock.year_data[&2023].revenue, Some(dec!(500)));
    }

    #[tokio::test]
    async fn handler_not_found_becomes_a_404_response() {
        let f = fixture();
        let response = f
            .router
            .route(&envelope("/stock/update", json!({"stockId": "GHOST"})))
            .await;
        assert_eq!(response.error_code, codes::NOT_FOUND);
        assert!(response
            .error_message
            .as_deref()
            .unwrap()
            .contains("GHOST"));
    }

    #[tokio::test]
    async fn malformed_payload_becomes_a_500_response() {
        let f = fixture();
        let response = f
            .router
            .route(&envelope("/stock/update", json!([1, 2, 3])))
            .await;
        assert_eq!(response.error_code, codes::INTERNAL);
        assert!(response.error_message.is_some());
    }

    #[tokio::test]
    async fn match_price_route_reports_success() {
        let f = fixture();
        f.stocks.save(Stock::new("VCB"));

        let response = f
            .router
            .route(&envelope(
                "/stock/updateMatchPrice",
                json!({"stockId": "VCB", "matchPrice": "86.4"}),
            ))
            .await;

        assert!(response.success);
        assert_eq!(f.stocks.get("VCB").unwrap().match_price, Some(dec!(86.4)));
    }

    #[tokio::test]
    async fn unknown_action_within_a_domain_is_a_404() {
        let f = fixture();
        let response = f
            .router
            .route(&envelope("/ahpConfig/destroy", json!({})))
            .await;
        assert_eq!(response.error_code, codes::NOT_FOUND);
    }
}
