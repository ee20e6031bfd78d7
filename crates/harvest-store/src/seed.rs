//! Demo Seeder
//!
//! Loads a deterministic-ish demo data set keyed off today's date: six lots
//! with mixed P/L, two recent buys (one blocks the SPY cluster), a price
//! snapshot, and the demo policy.

use crate::db::HarvestStore;
use anyhow::Result;
use chrono::{Duration, Utc};
use harvest_core::{demo_policy, RecentBuy, TaxLot};
use serde::Serialize;
use std::collections::HashMap;

/// Row counts reported after seeding.
#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub lots: usize,
    pub recent_buys: usize,
    pub market_symbols: usize,
    pub clusters: usize,
    pub alternatives: usize,
}

pub async fn seed_demo(store: &HarvestStore) -> Result<SeedSummary> {
    store.clear_all().await?;

    let today = Utc::now().date_naive();

    let lots = vec![
        TaxLot::new("SPY".to_string(), 50.0, today - Duration::days(120), 520.00)?,
        TaxLot::new("QQQ".to_string(), 30.0, today - Duration::days(90), 480.00)?,
        TaxLot::new("AAPL".to_string(), 40.0, today - Duration::days(400), 195.00)?,
        TaxLot::new("TSLA".to_string(), 20.0, today - Duration::days(70), 270.00)?,
        TaxLot::new("NVDA".to_string(), 10.0, today - Duration::days(50), 130.00)?,
        TaxLot::new("VTI".to_string(), 60.0, today - Duration::days(200), 260.00)?,
    ];
    store.insert_lots(&lots).await?;

    // The VOO buy lands inside the 30-day window and blocks the SPY cluster.
    let buys = vec![
        RecentBuy::new("VOO".to_string(), 5.0, today - Duration::days(15))?,
        RecentBuy::new("AAPL".to_string(), 5.0, today - Duration::days(15))?,
    ];
    store.insert_recent_buys(&buys).await?;

    let prices: HashMap<String, f64> = [
        ("SPY", 500.00),
        ("IVV", 500.10),
        ("VOO", 499.90),
        ("VTI", 250.00),
        ("ITOT", 248.50),
        ("SCHB", 249.75),
        ("SCHX", 52.00),
        ("VTV", 160.00),
        ("SCHF", 36.00),
        ("QQQ", 455.00),
        ("QQQM", 354.00),
        ("SCHG", 77.00),
        ("XLK", 225.00),
        ("IYW", 120.00),
        ("AAPL", 178.00),
        ("VGT", 540.00),
        ("TSLA", 245.00),
        ("XLY", 180.00),
        ("CARZ", 52.00),
        ("DRIV", 28.00),
        ("NVDA", 115.00),
        ("SOXX", 210.00),
        ("SMH", 195.00),
    ]
    .into_iter()
    .map(|(s, p)| (s.to_string(), p))
    .collect();
    store.upsert_prices(today, &prices).await?;

    let policy = demo_policy();
    store.set_policy(&policy).await?;

    let clusters = policy
        .prohibited_equivalents
        .iter()
        .map(|c| c.len())
        .sum();
    let alternatives = policy
        .recommended_alternatives
        .iter()
        .map(|e| e.alternatives.len())
        .sum();

    tracing::info!(lots = lots.len(), market_symbols = prices.len(), "demo data seeded");

    Ok(SeedSummary {
        lots: lots.len(),
        recent_buys: buys.len(),
        market_symbols: prices.len(),
        clusters,
        alternatives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::WashSaleNavigator;

    #[tokio::test]
    async fn test_seed_counts() {
        let store = HarvestStore::new("sqlite::memory:").await.unwrap();
        let summary = seed_demo(&store).await.unwrap();

        assert_eq!(summary.lots, 6);
        assert_eq!(summary.recent_buys, 2);
        assert_eq!(summary.market_symbols, 23);
        assert_eq!(summary.clusters, 8);
        assert_eq!(summary.alternatives, 31);
    }

    #[tokio::test]
    async fn test_seeded_state_builds_a_plan() {
        let store = HarvestStore::new("sqlite::memory:").await.unwrap();
        seed_demo(&store).await.unwrap();

        let lots = store.fetch_lots().await.unwrap();
        let buys = store.fetch_recent_buys().await.unwrap();
        let market = store.fetch_market().await.unwrap();
        let policy = store.fetch_policy().await.unwrap().unwrap();

        // The seeded SPY lot is a 3.85% drawdown; lower the percentage floor
        // so it enters the plan and exercises the wash-sale block.
        let nav = WashSaleNavigator::with_thresholds(policy, 200.0, 0.01);
        let plan = nav.build_plan(&lots, &market, &buys).unwrap();

        assert!(!plan.items.is_empty());
        // The recent VOO buy blocks the SPY lot.
        let spy = plan.items.iter().find(|i| i.symbol == "SPY").unwrap();
        assert!(spy.wash_sale_blocked);
        assert!(spy.block_reason.as_deref().unwrap().contains("VOO"));
        // Every non-blocked item carries a safe replacement.
        for item in plan.items.iter().filter(|i| !i.wash_sale_blocked) {
            assert!(item.replacement_symbol.is_some());
            assert!((item.reentry_date_ok_after - item.sale_date).num_days() >= 31);
        }
    }
}
