//! Canonical tick event republished by the feed connector.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickEvent {
    pub stock_id: String,
    pub match_price: Decimal,
}

impl TickEvent {
    pub fn new(stock_id: impl Into<String>, match_price: Decimal) -> Self {
        Self {
            stock_id: stock_id.into(),
            match_price,
        }
    }
}
