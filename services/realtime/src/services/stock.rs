//! Stock domain: CRUD, price ticks, fundamental updates, and the valuation
//! recomputation paths.

use crate::cache::{entity, EntityCache};
use crate::error::{RealtimeError, Result};
use crate::lock::LockManager;
use crate::store::{StockStore, UserStore};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use std::sync::Arc;
use tickflow_config::ValuationConfig;
use tickflow_types::{Response, Stock, StockRequest, YearData, YearDataRequest};
use tickflow_valuation::IndustryMultiples;
use tracing::{error, info, warn};

/// Vendor quotes arrive in thousands; current-ratio refresh scales them back.
const PRICE_SCALE: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

pub struct StockService {
    stocks: Arc<dyn StockStore>,
    users: Arc<dyn UserStore>,
    locks: Arc<LockManager>,
    cache: Arc<dyn EntityCache>,
    valuation: ValuationConfig,
}

impl StockService {
    pub fn new(
        stocks: Arc<dyn StockStore>,
        users: Arc<dyn UserStore>,
        locks: Arc<LockManager>,
        cache: Arc<dyn EntityCache>,
        valuation: ValuationConfig,
    ) -> Self {
        Self {
            stocks,
            users,
            locks,
            cache,
            valuation,
        }
    }

    pub async fn create(&self, request: &StockRequest) -> Result<Response> {
        let stock_id = required_id(request)?;
        let _guard = self.locks.acquire(&stock_id).await;

        let mut stock = Stock::new(&stock_id);
        stock.stock_name = request.stock_name.clone();
        stock.sector = request.sector.clone();
        self.persist(stock).await;
        Ok(Response::ok())
    }

    pub async fn update(&self, request: &StockRequest) -> Result<Response> {
        let stock_id = required_id(request)?;
        let _guard = self.locks.acquire(&stock_id).await;

        let mut stock = self.get_or_not_found(&stock_id)?;
        stock.stock_name = request.stock_name.clone();
        stock.sector = request.sector.clone();
        self.persist(stock).await;
        Ok(Response::ok())
    }

    /// Delete the stock and clear the favorites back-references on the user
    /// side, so no user keeps pointing at a dead id.
    pub async fn delete(&self, request: &StockRequest) -> Result<Response> {
        let stock_id = required_id(request)?;
        let _guard = self.locks.acquire(&stock_id).await;

        let stock = self.get_or_not_found(&stock_id)?;
        for user_id in &stock.favored_by {
            if let Some(mut user) = self.users.get(user_id) {
                user.favorite_stocks.remove(&stock_id);
                self.users.save(user);
            }
        }
        self.stocks.delete(&stock_id);
        self.cache.delete(entity::STOCK, &stock_id).await;
        Ok(Response::ok())
    }

    /// Fan the sector-average multiples out to every stock in the sector,
    /// each under its own lock.
    pub async fn update_industry_ratios(&self, request: &StockRequest) -> Result<Response> {
        let sector = request
            .sector
            .clone()
            .ok_or_else(|| RealtimeError::BadRequest("sector is required".to_string()))?;

        for stock_id in self.stocks.find_by_sector(&sector) {
            let _guard = self.locks.acquire(&stock_id).await;
            let Some(mut stock) = self.stocks.get(&stock_id) else {
                continue;
            };
            if let Some(pe) = request.industry_pe_ratio {
                stock.industry_pe_ratio = Some(pe);
            }
            if let Some(pb) = request.industry_pb_ratio {
                stock.industry_pb_ratio = Some(pb);
            }
            if let Some(pcf) = request.industry_pcf_ratio {
                stock.industry_pcf_ratio = Some(pcf);
            }
            if let Some(ps) = request.industry_ps_ratio {
                stock.industry_ps_ratio = Some(ps);
            }
            self.persist(stock).await;
        }
        Ok(Response::ok())
    }

    /// Price-only update. Valuations are refreshed by explicit fundamental
    /// updates and the daily batch, never per tick.
    pub async fn update_match_price(&self, request: &StockRequest) -> Result<Response> {
        let stock_id = required_id(request)?;
        let match_price = request
            .match_price
            .ok_or_else(|| RealtimeError::BadRequest("matchPrice is required".to_string()))?;

        let _guard = self.locks.acquire(&stock_id).await;
        let Some(mut stock) = self.stocks.get(&stock_id) else {
            // Ticks for untracked symbols are feed noise, not a client error.
            warn!(stock_id, "tick for unknown stock dropped");
            return Ok(Response::ok());
        };
        stock.match_price = Some(match_price);
        self.persist(stock).await;
        Ok(Response::ok())
    }

    /// Merge the non-null raw fields into year `year` and recompute that
    /// year's derived block in full, all behind the stock+year lock. The
    /// cache write happens inside the lock so no stale derived block can
    /// overtake a newer one.
    pub async fn update_year_data(
        &self,
        stock_id: &str,
        year: i32,
        request: &YearDataRequest,
    ) -> Result<Response> {
        // Lock order: plain stock key first, then stock+year. The plain key
        // serializes against price ticks and ratio refreshes, which save the
        // whole record; skipping it here could lose one of the two writes.
        let _stock_guard = self.locks.acquire(stock_id).await;
        let _guard = self.locks.acquire(&format!("{stock_id}{year}")).await;

        let mut stock = self.get_or_not_found(stock_id)?;
        request.merge_into(stock.year_data.entry(year).or_default());
        self.recompute_year(&mut stock, year);

        let year_json = stock
            .year_data
            .get(&year)
            .and_then(|data| serde_json::to_value(data).ok());
        self.stocks.save(stock);
        if let Some(value) = year_json {
            self.cache
                .put(entity::STOCK_YEAR_DATA, stock_id, &value)
                .await;
        }
        Ok(Response::ok())
    }

    /// Refresh the stock's current PE/PB/PCF/PS ratios from the latest year
    /// data and the live match price.
    pub async fn recalculate_for_stock(&self, stock_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(stock_id).await;

        let mut stock = self.get_or_not_found(stock_id)?;
        let Some(match_price) = stock.match_price else {
            warn!(stock_id, "no match price, skipping ratio refresh");
            return Ok(());
        };
        let Some(latest_year) = stock.latest_year() else {
            warn!(stock_id, "no year data, skipping ratio refresh");
            return Ok(());
        };
        let Some(latest) = stock.year_data.get(&latest_year).cloned() else {
            return Ok(());
        };
        let Some(shares) = positive_shares(&latest) else {
            warn!(stock_id, year = latest_year, "no positive shares outstanding, skipping ratio refresh");
            return Ok(());
        };

        let price = match_price * PRICE_SCALE;
        let tangible_book = match (latest.total_equity, latest.intangibles) {
            (Some(equity), Some(intangibles)) => Some(equity - intangibles),
            _ => None,
        };

        stock.pe_ratio = current_ratio(stock_id, "PE", price, latest.net_income, shares);
        stock.pb_ratio = current_ratio(stock_id, "PB", price, tangible_book, shares);
        stock.pcf_ratio = current_ratio(stock_id, "PCF", price, latest.operating_cash_flow, shares);
        stock.ps_ratio = current_ratio(stock_id, "PS", price, latest.revenue, shares);

        self.persist(stock).await;
        Ok(())
    }

    /// Daily batch: refresh current ratios for every stock on record.
    pub async fn recalculate_all(&self) -> (usize, usize) {
        info!("starting valuation recalculation for all stocks");
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        for stock_id in self.stocks.all_ids() {
            match self.recalculate_for_stock(&stock_id).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    error!(stock_id, error = %e, "ratio refresh failed");
                    failed += 1;
                }
            }
        }
        info!(succeeded, failed, "completed valuation recalculation");
        (succeeded, failed)
    }

    /// Recompute year `year`'s derived block as a unit. Skipped entirely,
    /// leaving previous values, when the minimum-data gate fails.
    fn recompute_year(&self, stock: &mut Stock, year: i32) {
        let Some(current) = stock.year_data.get(&year).cloned() else {
            return;
        };
        if positive_shares(&current).is_none() {
            warn!(
                stock_id = %stock.stock_id,
                year,
                "insufficient data for valuation, keeping previous derived values"
            );
            return;
        }

        let history: Vec<YearData> = stock
            .year_data
            .range(..year)
            .map(|(_, data)| data.clone())
            .collect();
        let history_refs: Vec<&YearData> = history.iter().collect();
        let multiples = self.resolve_multiples(stock);

        let outputs = tickflow_valuation::calculate_all(
            &current,
            history_refs.last().copied(),
            &history_refs,
            &multiples,
            self.valuation.projection_years,
        );
        if let Some(target) = stock.year_data.get_mut(&year) {
            outputs.apply_to(target);
        }
    }

    /// Sector averages from the stock, configured defaults for anything
    /// missing. Resolution is policy here, not in the engine.
    fn resolve_multiples(&self, stock: &Stock) -> IndustryMultiples {
        IndustryMultiples {
            pe: stock.industry_pe_ratio.or(Some(self.valuation.default_pe)),
            pb: stock.industry_pb_ratio.or(Some(self.valuation.default_pb)),
            pcf: stock
                .industry_pcf_ratio
                .or(Some(self.valuation.default_pcf)),
            ps: stock.industry_ps_ratio.or(Some(self.valuation.default_ps)),
        }
    }

    fn get_or_not_found(&self, stock_id: &str) -> Result<Stock> {
        self.stocks
            .get(stock_id)
            .ok_or_else(|| RealtimeError::NotFound(format!("Stock not found: {stock_id}")))
    }

    async fn persist(&self, stock: Stock) {
        let summary = stock_summary(&stock);
        let stock_id = stock.stock_id.clone();
        self.stocks.save(stock);
        self.cache.put(entity::STOCK, &stock_id, &summary).await;
    }
}

fn required_id(request: &StockRequest) -> Result<String> {
    request
        .stock_id
        .clone()
        .ok_or_else(|| RealtimeError::BadRequest("stockId is required".to_string()))
}

fn positive_shares(data: &YearData) -> Option<Decimal> {
    data.shares_outstanding
        .filter(|shares| *shares > 0)
        .map(Decimal::from)
}

/// One current ratio: price over the 4dp per-share metric, 4dp. A missing
/// metric or a zero per-share figure makes this ratio unavailable only.
fn current_ratio(
    stock_id: &str,
    name: &str,
    price: Decimal,
    metric: Option<Decimal>,
    shares: Decimal,
) -> Option<Decimal> {
    let Some(metric) = metric else {
        warn!(stock_id, ratio = name, "missing input for current ratio");
        return None;
    };
    let per_share = round4(metric / shares);
    if per_share.is_zero() {
        warn!(stock_id, ratio = name, "zero per-share metric for current ratio");
        return None;
    }
    Some(round4(price / per_share))
}

fn round4(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Cached projection of the stock: identity, price, and ratios, without the
/// year-data map.
fn stock_summary(stock: &Stock) -> serde_json::Value {
    json!({
        "stockId": stock.stock_id,
        "stockName": stock.stock_name,
        "sector": stock.sector,
        "matchPrice": stock.match_price,
        "peRatio": stock.pe_ratio,
        "pbRatio": stock.pb_ratio,
        "pcfRatio": stock.pcf_ratio,
        "psRatio": stock.ps_ratio,
        "industryPeRatio": stock.industry_pe_ratio,
        "industryPbRatio": stock.industry_pb_ratio,
        "industryPcfRatio": stock.industry_pcf_ratio,
        "industryPsRatio": stock.industry_ps_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::MemoryCache;
    use crate::store::{MemoryStockStore, MemoryUserStore};
    use rust_decimal_macros::dec;
    use tickflow_types::User;

    struct Fixture {
        stocks: Arc<MemoryStockStore>,
        users: Arc<MemoryUserStore>,
        cache: Arc<MemoryCache>,
        service: StockService,
    }

    fn fixture() -> Fixture {
        let stocks = Arc::new(MemoryStockStore::new());
        let users = Arc::new(MemoryUserStore::new());
        let cache = Arc::new(MemoryCache::default());
        let service = StockService::new(
            stocks.clone(),
            users.clone(),
            Arc::new(LockManager::new()),
            cache.clone(),
            ValuationConfig::default(),
        );
        Fixture {
            stocks,
            users,
            cache,
            service,
        }
    }

    fn full_year_request() -> YearDataRequest {
        YearDataRequest {
            net_income: Some(dec!(120)),
            total_equity: Some(dec!(1100)),
            intangibles: Some(dec!(100)),
            operating_cash_flow: Some(dec!(200)),
            free_cash_flow: Some(dec!(100)),
            revenue: Some(dec!(500)),
            dividend_per_share: Some(dec!(1.00)),
            shares_outstanding: Some(100),
            price_end_year: Some(dec!(20)),
            cost_of_equity: Some(dec!(0.10)),
            wacc: Some(dec!(0.10)),
            dividend_growth_rate: Some(dec!(0.03)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_requires_stock_id() {
        let f = fixture();
        let err = f.service.create(&StockRequest::default()).await.unwrap_err();
        assert_eq!(err.code(), 400);
    }

    #[tokio::test]
    async fn year_data_update_recomputes_the_derived_block() {
        let f = fixture();
        f.service
            .create(&StockRequest {
                stock_id: Some("VCB".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let response = f
            .service
            .update_year_data("VCB", 2023, &full_year_request())
            .await
            .unwrap();
        assert!(response.success);

        let year = f.stocks.get("VCB").unwrap().year_data[&2023].clone();
        assert_eq!(year.ddm, Some(dec!(14.71)));
        assert!(year.dcf.is_some());
        assert!(year.ri.is_some());
        assert!(year.pe.is_some());
        assert!(year.composite.is_some());
        // Year data mirrored into the cache inside the lock.
        assert!(f.cache.get(entity::STOCK_YEAR_DATA, "VCB").is_some());
    }

    #[tokio::test]
    async fn gate_failure_merges_raw_fields_but_keeps_derived_values() {
        let f = fixture();
        f.service
            .create(&StockRequest {
                stock_id: Some("VCB".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        f.service
            .update_year_data("VCB", 2023, &full_year_request())
            .await
            .unwrap();
        let before = f.stocks.get("VCB").unwrap().year_data[&2023].clone();

        // Shares drop to zero: the gate fails, raw merge still applies.
        let request = YearDataRequest {
            net_income: Some(dec!(999)),
            shares_outstanding: Some(0),
            ..Default::default()
        };
        f.service
            .update_year_data("VCB", 2023, &request)
            .await
            .unwrap();

        let after = f.stocks.get("VCB").unwrap().year_data[&2023].clone();
        assert_eq!(after.net_income, Some(dec!(999)));
        assert_eq!(after.shares_outstanding, Some(0));
        assert_eq!(after.ddm, before.ddm);
        assert_eq!(after.composite, before.composite);
    }

    #[tokio::test]
    async fn match_price_update_touches_price_only() {
        let f = fixture();
        f.service
            .create(&StockRequest {
                stock_id: Some("VCB".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        f.service
            .update_year_data("VCB", 2023, &full_year_request())
            .await
            .unwrap();
        let derived_before = f.stocks.get("VCB").unwrap().year_data[&2023].clone();

        f.service
            .update_match_price(&StockRequest {
                stock_id: Some("VCB".to_string()),
                match_price: Some(dec!(86.4)),
                ..Default::default()
            })
            .await
            .unwrap();

        let stock = f.stocks.get("VCB").unwrap();
        assert_eq!(stock.match_price, Some(dec!(86.4)));
        assert_eq!(stock.year_data[&2023], derived_before);
    }

    #[tokio::test]
    async fn year_data_update_waits_for_the_stock_lock() {
        let stocks = Arc::new(MemoryStockStore::new());
        let locks = Arc::new(LockManager::new());
        let service = Arc::new(StockService::new(
            stocks.clone(),
            Arc::new(MemoryUserStore::new()),
            locks.clone(),
            Arc::new(MemoryCache::default()),
            ValuationConfig::default(),
        ));
        service
            .create(&StockRequest {
                stock_id: Some("VCB".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        // Hold the plain stock key, as a concurrent price tick would.
        let guard = locks.acquire("VCB").await;
        let update = {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .update_year_data("VCB", 2023, &full_year_request())
                    .await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!update.is_finished());

        drop(guard);
        let response = update.await.unwrap().unwrap();
        assert!(response.success);
    }

    #[tokio::test]
    async fn tick_for_unknown_stock_is_dropped_not_failed() {
        let f = fixture();
        let response = f
            .service
            .update_match_price(&StockRequest {
                stock_id: Some("NOPE".to_string()),
                match_price: Some(dec!(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(response.success);
    }

    #[tokio::test]
    async fn delete_clears_favorites_back_references() {
        let f = fixture();
        let mut stock = Stock::new("VCB");
        stock.favored_by.insert("u1".to_string());
        f.stocks.save(stock);
        let mut user = User::new("u1");
        user.favorite_stocks.insert("VCB".to_string());
        f.users.save(user);

        f.service
            .delete(&StockRequest {
                stock_id: Some("VCB".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(f.stocks.get("VCB").is_none());
        assert!(f.users.get("u1").unwrap().favorite_stocks.is_empty());
    }

    #[tokio::test]
    async fn industry_ratios_fan_out_across_the_sector() {
        let f = fixture();
        for id in ["VCB", "ACB"] {
            let mut stock = Stock::new(id);
            stock.sector = Some("banking".to_string());
            f.stocks.save(stock);
        }
        let mut other = Stock::new("MWG");
        other.sector = Some("retail".to_string());
        f.stocks.save(other);

        f.service
            .update_industry_ratios(&StockRequest {
                sector: Some("banking".to_string()),
                industry_pe_ratio: Some(dec!(11.5)),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(f.stocks.get("VCB").unwrap().industry_pe_ratio, Some(dec!(11.5)));
        assert_eq!(f.stocks.get("ACB").unwrap().industry_pe_ratio, Some(dec!(11.5)));
        assert_eq!(f.stocks.get("MWG").unwrap().industry_pe_ratio, None);
    }

    #[tokio::test]
    async fn ratio_refresh_scales_price_by_a_thousand() {
        let f = fixture();
        let mut stock = Stock::new("VCB");
        stock.match_price = Some(dec!(20));
        stock.year_data.insert(
            2023,
            YearData {
                net_income: Some(dec!(2000)),
                total_equity: Some(dec!(10100)),
                intangibles: Some(dec!(100)),
                operating_cash_flow: Some(dec!(4000)),
                revenue: Some(dec!(8000)),
                shares_outstanding: Some(100),
                ..Default::default()
            },
        );
        f.stocks.save(stock);

        f.service.recalculate_for_stock("VCB").await.unwrap();

        let stock = f.stocks.get("VCB").unwrap();
        // price 20 * 1000 = 20000; eps 20 -> PE 1000
        assert_eq!(stock.pe_ratio, Some(dec!(1000)));
        // tangible book/share 100 -> PB 200
        assert_eq!(stock.pb_ratio, Some(dec!(200)));
        assert_eq!(stock.pcf_ratio, Some(dec!(500)));
        assert_eq!(stock.ps_ratio, Some(dec!(250)));
    }

    #[tokio::test]
    async fn ratio_refresh_degrades_per_ratio() {
        let f = fixture();
        let mut stock = Stock::new("VCB");
        stock.match_price = Some(dec!(20));
        stock.year_data.insert(
            2023,
            YearData {
                net_income: None,
                revenue: Some(dec!(8000)),
                shares_outstanding: Some(100),
                ..Default::default()
            },
        );
        f.stocks.save(stock);

        f.service.recalculate_for_stock("VCB").await.unwrap();

        let stock = f.stocks.get("VCB").unwrap();
        assert_eq!(stock.pe_ratio, None);
        assert_eq!(stock.pb_ratio, None);
        assert_eq!(stock.ps_ratio, Some(dec!(250)));
    }

    #[tokio::test]
    async fn batch_counts_successes_and_failures() {
        let f = fixture();
        let mut stock = Stock::new("VCB");
        stock.match_price = Some(dec!(20));
        f.stocks.save(stock);

        let (succeeded, failed) = f.service.recalculate_all().await;
        assert_eq!(succeeded, 1);
        assert_eq!(failed, 0);
    }
}
