//! Securities model: the per-stock entity and its per-year fundamental data.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One fiscal year of fundamental inputs and the derived valuation block.
///
/// Raw inputs are written by year-data updates; the derived block is only
/// ever rewritten as a whole by a recomputation pass, never patched field by
/// field, so readers always observe an internally consistent set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearData {
    // Raw fundamental inputs
    pub net_income: Option<Decimal>,
    pub total_equity: Option<Decimal>,
    pub intangibles: Option<Decimal>,
    pub operating_cash_flow: Option<Decimal>,
    pub free_cash_flow: Option<Decimal>,
    pub revenue: Option<Decimal>,
    pub dividend_per_share: Option<Decimal>,
    pub shares_outstanding: Option<i64>,
    pub price_end_year: Option<Decimal>,
    pub cost_of_equity: Option<Decimal>,
    pub wacc: Option<Decimal>,
    pub dividend_growth_rate: Option<Decimal>,

    // Derived valuation outputs
    pub ddm: Option<Decimal>,
    pub dcf: Option<Decimal>,
    pub ri: Option<Decimal>,
    pub pe: Option<Decimal>,
    pub pbv: Option<Decimal>,
    pub pcf: Option<Decimal>,
    pub ps: Option<Decimal>,
    pub composite: Option<Decimal>,
}

/// A listed security keyed by its exchange identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub stock_id: String,
    pub stock_name: Option<String>,
    pub sector: Option<String>,
    /// Last traded price from the tick feed.
    pub match_price: Option<Decimal>,

    // Current relative-valuation ratios, refreshed from the latest year data
    // and the live match price.
    pub pe_ratio: Option<Decimal>,
    pub pb_ratio: Option<Decimal>,
    pub pcf_ratio: Option<Decimal>,
    pub ps_ratio: Option<Decimal>,

    // Sector-average multiples used as fallbacks for relative valuation.
    pub industry_pe_ratio: Option<Decimal>,
    pub industry_pb_ratio: Option<Decimal>,
    pub industry_pcf_ratio: Option<Decimal>,
    pub industry_ps_ratio: Option<Decimal>,

    /// Fundamental data keyed by fiscal year, ascending.
    #[serde(default)]
    pub year_data: BTreeMap<i32, YearData>,

    /// Ids of users that favor this stock. Kept as a flat id set; the user
    /// side holds the mirror collection and both are updated explicitly.
    #[serde(default)]
    pub favored_by: HashSet<String>,
}

impl Stock {
    pub fn new(stock_id: impl Into<String>) -> Self {
        Self {
            stock_id: stock_id.into(),
            ..Default::default()
        }
    }

    /// Years strictly before `year`, ascending. The historical context for a
    /// recomputation of `year`'s derived block.
    pub fn history_before(&self, year: i32) -> Vec<&YearData> {
        self.year_data
            .range(..year)
            .map(|(_, data)| data)
            .collect()
    }

    /// The latest fiscal year on record, if any.
    pub fn latest_year(&self) -> Option<i32> {
        self.year_data.keys().next_back().copied()
    }
}

/// Router payload for the stock domain.
///
/// `stock_year_data` is only populated on the `/stock/updateYearData/{year}`
/// route, where the year-data body travels nested inside the stock request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockRequest {
    pub stock_id: Option<String>,
    pub stock_name: Option<String>,
    pub sector: Option<String>,
    pub match_price: Option<Decimal>,
    pub industry_pe_ratio: Option<Decimal>,
    pub industry_pb_ratio: Option<Decimal>,
    pub industry_pcf_ratio: Option<Decimal>,
    pub industry_ps_ratio: Option<Decimal>,
    pub stock_year_data: Option<serde_json::Value>,
}

/// Router payload for year-data updates. Only raw inputs are accepted; the
/// derived block is recomputed server-side and never taken from the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearDataRequest {
    pub stock_id: Option<String>,
    pub net_income: Option<Decimal>,
    pub total_equity: Option<Decimal>,
    pub intangibles: Option<Decimal>,
    pub operating_cash_flow: Option<Decimal>,
    pub free_cash_flow: Option<Decimal>,
    pub revenue: Option<Decimal>,
    pub dividend_per_share: Option<Decimal>,
    pub shares_outstanding: Option<i64>,
    pub price_end_year: Option<Decimal>,
    pub cost_of_equity: Option<Decimal>,
    pub wacc: Option<Decimal>,
    pub dividend_growth_rate: Option<Decimal>,
}

impl YearDataRequest {
    /// Merge the non-null request fields into `target`, leaving everything
    /// else (including the derived block) untouched.
    pub fn merge_into(&self, target: &mut YearData) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &self.$field {
                    target.$field = Some(value.clone());
                })*
            };
        }
        merge!(
            net_income,
            total_equity,
            intangibles,
            operating_cash_flow,
            free_cash_flow,
            revenue,
            dividend_per_share,
            shares_outstanding,
            price_end_year,
            cost_of_equity,
            wacc,
            dividend_growth_rate,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn history_excludes_target_year_and_sorts_ascending() {
        let mut stock = Stock::new("ACB");
        for year in [2023, 2020, 2022] {
            stock.year_data.insert(
                year,
                YearData {
                    revenue: Some(Decimal::from(year)),
                    ..Default::default()
                },
            );
        }

        let history: Vec<Decimal> = stock
            .history_before(2023)
            .iter()
            .filter_map(|d| d.revenue)
            .collect();
        assert_eq!(history, vec![dec!(2020), dec!(2022)]);
    }

    #[test]
    fn merge_keeps_existing_fields_and_derived_block() {
        let mut target = YearData {
            net_income: Some(dec!(100)),
            revenue: Some(dec!(500)),
            ddm: Some(dec!(12.34)),
            ..Default::default()
        };
        let request = YearDataRequest {
            net_income: Some(dec!(150)),
            shares_outstanding: Some(1_000),
            ..Default::default()
        };

        request.merge_into(&mut target);

        assert_eq!(target.net_income, Some(dec!(150)));
        assert_eq!(target.revenue, Some(dec!(500)));
        assert_eq!(target.shares_outstanding, Some(1_000));
        assert_eq!(target.ddm, Some(dec!(12.34)));
    }
}
