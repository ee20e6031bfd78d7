//! Wash-Sale Navigator
//!
//! The decision engine: walks the tax lots in input order, filters by loss
//! thresholds, applies the wash-sale blocking test, selects a replacement
//! purchase, and assembles a validated [`HarvestPlan`].

use crate::models::{HarvestItem, HarvestPlan, MarketData, RecentBuy, TaxLot};
use crate::policy::ReplacementPolicy;
use chrono::{Duration, NaiveDate};
use thiserror::Error;

/// Wash-sale lookback window in days, inclusive.
const WASH_SALE_WINDOW_DAYS: i64 = 30;

/// Days from sale to safe re-entry: one day past the 30-day window.
const REENTRY_MARGIN_DAYS: i64 = 31;

/// Prices at or below this floor are treated as unusable quotes.
const MIN_USABLE_PRICE: f64 = 0.01;

/// An engine invariant violation caught by the post-assembly validator.
///
/// This is a logic defect, not a data condition: the computed plan is
/// discarded and the caller receives no partial result.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(
        "replacement {replacement} for {symbol} (lot {lot_index}) is substantially identical"
    )]
    ReplacementIdentical {
        symbol: String,
        replacement: String,
        lot_index: usize,
    },
    #[error("re-entry date for {symbol} (lot {lot_index}) violates the 31-day rule")]
    ReentryTooSoon { symbol: String, lot_index: usize },
}

/// Decision engine for one planning run.
pub struct WashSaleNavigator {
    policy: ReplacementPolicy,
    min_loss_dollars: f64,
    min_loss_pct: f64,
}

impl WashSaleNavigator {
    /// Create a navigator with the default thresholds ($200, 5%).
    pub fn new(policy: ReplacementPolicy) -> Self {
        Self::with_thresholds(policy, 200.0, 0.05)
    }

    pub fn with_thresholds(
        policy: ReplacementPolicy,
        min_loss_dollars: f64,
        min_loss_pct: f64,
    ) -> Self {
        Self {
            policy,
            min_loss_dollars,
            min_loss_pct,
        }
    }

    /// Wash-sale test: the first recent buy (input order) inside the lot's
    /// cluster and within the 30-day window blocks the lot. Later matches are
    /// not examined.
    fn blocking_buy(
        &self,
        symbol: &str,
        sale_date: NaiveDate,
        buys: &[RecentBuy],
    ) -> Option<String> {
        let cluster = self.policy.cluster_for(symbol);
        for rb in buys {
            if cluster.contains(&rb.symbol) {
                let days = (sale_date - rb.date).num_days();
                if (0..=WASH_SALE_WINDOW_DAYS).contains(&days) {
                    return Some(format!(
                        "Recent buy on {} for {} triggers 30-day window",
                        rb.date, rb.symbol
                    ));
                }
            }
        }
        None
    }

    /// First ranked alternative with a usable market price. Returns
    /// (symbol, shares, price); shares are unrounded here.
    fn pick_replacement(
        &self,
        symbol: &str,
        proceeds: f64,
        market: &MarketData,
    ) -> Option<(String, f64, f64)> {
        for alt in self.policy.safe_alternatives(symbol) {
            if let Some(px) = market.price(&alt) {
                if px > MIN_USABLE_PRICE {
                    return Some((alt, proceeds / px, px));
                }
            }
        }
        None
    }

    /// Build a harvesting plan for one portfolio snapshot.
    ///
    /// Lots with no quoted price or with losses below either threshold are
    /// skipped silently. Wash-sale hits and failed replacement selection are
    /// reported in-band as blocked items. A validator failure is fatal.
    pub fn build_plan(
        &self,
        lots: &[TaxLot],
        market: &MarketData,
        buys: &[RecentBuy],
    ) -> Result<HarvestPlan, PlanError> {
        let mut items: Vec<HarvestItem> = Vec::new();
        let mut total_loss = 0.0;
        let mut cash_delta = 0.0;
        let today = market.asof;

        for (idx, lot) in lots.iter().enumerate() {
            let px = match market.price(&lot.symbol) {
                Some(px) => px,
                None => {
                    tracing::debug!(symbol = %lot.symbol, lot_index = idx, "no price in snapshot, skipping lot");
                    continue;
                }
            };

            let loss_total = (lot.cost_basis_per_share - px).max(0.0) * lot.shares;
            let loss_pct = if lot.cost_basis_per_share > 0.0 {
                (lot.cost_basis_per_share - px) / lot.cost_basis_per_share.max(1e-9)
            } else {
                0.0
            };

            if loss_total < self.min_loss_dollars || loss_pct < self.min_loss_pct {
                continue;
            }

            let mut block_reason = self.blocking_buy(&lot.symbol, today, buys);
            let proceeds = lot.shares * px;

            let mut repl_symbol = None;
            let mut repl_shares = None;
            let mut repl_price = None;

            if block_reason.is_none() {
                match self.pick_replacement(&lot.symbol, proceeds, market) {
                    Some((alt, qty, alt_px)) => {
                        repl_symbol = Some(alt);
                        repl_shares = Some(round_shares(qty));
                        repl_price = Some(alt_px);
                    }
                    None => {
                        block_reason =
                            Some("No safe replacement with known price".to_string());
                    }
                }
            }

            let blocked = block_reason.is_some();
            if blocked {
                tracing::debug!(
                    symbol = %lot.symbol,
                    lot_index = idx,
                    reason = block_reason.as_deref().unwrap_or(""),
                    "lot blocked"
                );
            }

            let item = HarvestItem {
                symbol: lot.symbol.clone(),
                lot_index: idx,
                shares_to_sell: round_shares(lot.shares),
                sale_price: px,
                loss_dollars: round_dollars(loss_total),
                replacement_symbol: repl_symbol,
                replacement_shares: repl_shares,
                replacement_price: repl_price,
                sale_date: today,
                reentry_date_ok_after: today + Duration::days(REENTRY_MARGIN_DAYS),
                wash_sale_blocked: blocked,
                block_reason,
                notes: None,
            };

            if !item.wash_sale_blocked {
                total_loss += item.loss_dollars;
                let repl_cost = item.replacement_shares.unwrap_or(0.0)
                    * item.replacement_price.unwrap_or(0.0);
                cash_delta += proceeds - repl_cost;
            }

            items.push(item);
        }

        let plan = HarvestPlan {
            asof: today,
            items,
            total_harvestable_loss: round_dollars(total_loss),
            simulated_cash_delta: round_dollars(cash_delta),
            policy_version: self.policy.version.clone(),
        };

        self.validate(&plan)?;
        Ok(plan)
    }

    /// Post-assembly invariant check over non-blocked items.
    fn validate(&self, plan: &HarvestPlan) -> Result<(), PlanError> {
        for item in &plan.items {
            if item.wash_sale_blocked {
                continue;
            }
            if let Some(repl) = &item.replacement_symbol {
                if self.policy.cluster_for(&item.symbol).contains(repl) {
                    return Err(PlanError::ReplacementIdentical {
                        symbol: item.symbol.clone(),
                        replacement: repl.clone(),
                        lot_index: item.lot_index,
                    });
                }
            }
            if (item.reentry_date_ok_after - item.sale_date).num_days() < REENTRY_MARGIN_DAYS {
                return Err(PlanError::ReentryTooSoon {
                    symbol: item.symbol.clone(),
                    lot_index: item.lot_index,
                });
            }
        }
        Ok(())
    }
}

/// Round a dollar amount to cents.
fn round_dollars(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Round a share count to 6 decimal places.
fn round_shares(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}
