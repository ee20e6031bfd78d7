//! Domain Models
//!
//! Validated input records and the immutable plan output. Range checks run
//! once at construction; the engine never re-checks them ad hoc.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Validation failure while constructing an input record.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{record} {symbol}: shares must be positive (got {shares})")]
    NonPositiveShares {
        record: &'static str,
        symbol: String,
        shares: f64,
    },
    #[error("tax lot {symbol}: cost basis per share must be non-negative (got {cost_basis})")]
    NegativeCostBasis { symbol: String, cost_basis: f64 },
    #[error("market price for {symbol} must be positive (got {price})")]
    NonPositivePrice { symbol: String, price: f64 },
}

/// One purchased block of a security still held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLot {
    pub symbol: String,
    pub shares: f64,
    pub buy_date: NaiveDate,
    pub cost_basis_per_share: f64,
}

impl TaxLot {
    pub fn new(
        symbol: String,
        shares: f64,
        buy_date: NaiveDate,
        cost_basis_per_share: f64,
    ) -> Result<Self, ModelError> {
        if shares <= 0.0 {
            return Err(ModelError::NonPositiveShares {
                record: "tax lot",
                symbol,
                shares,
            });
        }
        if cost_basis_per_share < 0.0 {
            return Err(ModelError::NegativeCostBasis {
                symbol,
                cost_basis: cost_basis_per_share,
            });
        }
        Ok(Self {
            symbol,
            shares,
            buy_date,
            cost_basis_per_share,
        })
    }
}

/// A purchase made recently enough to matter for the 30-day window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentBuy {
    pub symbol: String,
    pub shares: f64,
    pub date: NaiveDate,
}

impl RecentBuy {
    pub fn new(symbol: String, shares: f64, date: NaiveDate) -> Result<Self, ModelError> {
        if shares <= 0.0 {
            return Err(ModelError::NonPositiveShares {
                record: "recent buy",
                symbol,
                shares,
            });
        }
        Ok(Self {
            symbol,
            shares,
            date,
        })
    }
}

/// A price snapshot. One as-of date applies to every price in the map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub asof: NaiveDate,
    pub prices: HashMap<String, f64>,
}

impl MarketData {
    pub fn new(asof: NaiveDate, prices: HashMap<String, f64>) -> Result<Self, ModelError> {
        for (symbol, &price) in &prices {
            if price <= 0.0 {
                return Err(ModelError::NonPositivePrice {
                    symbol: symbol.clone(),
                    price,
                });
            }
        }
        Ok(Self { asof, prices })
    }

    /// Price for a symbol, or `None` if not quoted in this snapshot.
    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }
}

/// One per-lot harvesting decision.
///
/// Blocked items carry a human-readable `block_reason` and no replacement;
/// non-blocked items always name a replacement purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestItem {
    pub symbol: String,
    pub lot_index: usize,
    pub shares_to_sell: f64,
    pub sale_price: f64,
    /// Realized loss in dollars, always >= 0.
    pub loss_dollars: f64,
    pub replacement_symbol: Option<String>,
    pub replacement_shares: Option<f64>,
    pub replacement_price: Option<f64>,
    pub sale_date: NaiveDate,
    /// Earliest date at which re-buying the sold cluster is wash-sale safe.
    pub reentry_date_ok_after: NaiveDate,
    pub wash_sale_blocked: bool,
    pub block_reason: Option<String>,
    pub notes: Option<String>,
}

/// The full result of one planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestPlan {
    pub asof: NaiveDate,
    pub items: Vec<HarvestItem>,
    /// Sum of `loss_dollars` over non-blocked items, rounded per item first.
    pub total_harvestable_loss: f64,
    /// Sum of (sale proceeds - replacement cost) over non-blocked items.
    pub simulated_cash_delta: f64,
    pub policy_version: String,
}
