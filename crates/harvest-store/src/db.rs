use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use harvest_core::{HarvestItem, HarvestPlan, MarketData, RecentBuy, ReplacementPolicy, TaxLot};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Row};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS lots (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  symbol TEXT NOT NULL,
  shares REAL NOT NULL,
  buy_date TEXT NOT NULL,
  cost_basis_per_share REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS recent_buys (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  symbol TEXT NOT NULL,
  shares REAL NOT NULL,
  date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS market_prices (
  symbol TEXT PRIMARY KEY,
  price REAL NOT NULL,
  asof TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS policy_clusters (
  cluster_id INTEGER NOT NULL,
  symbol TEXT NOT NULL,
  PRIMARY KEY (cluster_id, symbol)
);

CREATE TABLE IF NOT EXISTS policy_alternatives (
  symbol TEXT NOT NULL,
  rank INTEGER NOT NULL,
  alt_symbol TEXT NOT NULL,
  PRIMARY KEY (symbol, alt_symbol)
);

CREATE TABLE IF NOT EXISTS policy_meta (
  version TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plans (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  asof TEXT NOT NULL,
  total_loss REAL NOT NULL,
  cash_delta REAL NOT NULL,
  policy_version TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS plan_items (
  plan_id INTEGER NOT NULL,
  item_index INTEGER NOT NULL,
  data_json TEXT NOT NULL,
  PRIMARY KEY (plan_id, item_index),
  FOREIGN KEY (plan_id) REFERENCES plans(id) ON DELETE CASCADE
);
"#;

/// Stored header row of a saved plan.
#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub id: i64,
    pub asof: String,
    pub total_loss: f64,
    pub cash_delta: f64,
    pub policy_version: String,
    pub created_at: String,
}

/// SQLite-backed storage for planning inputs and saved plans.
#[derive(Clone)]
pub struct HarvestStore {
    pool: SqlitePool,
}

impl HarvestStore {
    /// Open (creating if missing) and initialize the schema.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Single connection: in-memory databases are per-connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;

        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete all stored rows, plans first to respect the foreign key.
    pub async fn clear_all(&self) -> Result<()> {
        for table in [
            "plan_items",
            "plans",
            "policy_alternatives",
            "policy_clusters",
            "policy_meta",
            "market_prices",
            "recent_buys",
            "lots",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    // ---- Inputs ----

    pub async fn insert_lots(&self, lots: &[TaxLot]) -> Result<()> {
        for lot in lots {
            sqlx::query(
                "INSERT INTO lots (symbol, shares, buy_date, cost_basis_per_share) VALUES (?, ?, ?, ?)",
            )
            .bind(&lot.symbol)
            .bind(lot.shares)
            .bind(lot.buy_date.to_string())
            .bind(lot.cost_basis_per_share)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn insert_recent_buys(&self, buys: &[RecentBuy]) -> Result<()> {
        for rb in buys {
            sqlx::query("INSERT INTO recent_buys (symbol, shares, date) VALUES (?, ?, ?)")
                .bind(&rb.symbol)
                .bind(rb.shares)
                .bind(rb.date.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn upsert_prices(&self, asof: NaiveDate, prices: &HashMap<String, f64>) -> Result<()> {
        for (symbol, price) in prices {
            sqlx::query(
                "INSERT INTO market_prices (symbol, price, asof) VALUES (?, ?, ?) \
                 ON CONFLICT(symbol) DO UPDATE SET price = excluded.price, asof = excluded.asof",
            )
            .bind(symbol)
            .bind(price)
            .bind(asof.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn set_policy(&self, policy: &ReplacementPolicy) -> Result<()> {
        sqlx::query("DELETE FROM policy_clusters")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM policy_alternatives")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM policy_meta")
            .execute(&self.pool)
            .await?;

        for (cluster_id, cluster) in policy.prohibited_equivalents.iter().enumerate() {
            for symbol in cluster {
                sqlx::query("INSERT INTO policy_clusters (cluster_id, symbol) VALUES (?, ?)")
                    .bind(cluster_id as i64)
                    .bind(symbol)
                    .execute(&self.pool)
                    .await?;
            }
        }

        for entry in &policy.recommended_alternatives {
            for (rank, alt) in entry.alternatives.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO policy_alternatives (symbol, rank, alt_symbol) VALUES (?, ?, ?)",
                )
                .bind(&entry.symbol)
                .bind(rank as i64)
                .bind(alt)
                .execute(&self.pool)
                .await?;
            }
        }

        sqlx::query("INSERT INTO policy_meta (version) VALUES (?)")
            .bind(&policy.version)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---- Reads ----

    pub async fn fetch_lots(&self) -> Result<Vec<TaxLot>> {
        let rows = sqlx::query(
            "SELECT symbol, shares, buy_date, cost_basis_per_share FROM lots ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let buy_date: NaiveDate = row
                    .get::<String, _>("buy_date")
                    .parse()
                    .context("invalid buy_date in lots table")?;
                TaxLot::new(
                    row.get("symbol"),
                    row.get("shares"),
                    buy_date,
                    row.get("cost_basis_per_share"),
                )
                .context("invalid lot row")
            })
            .collect()
    }

    pub async fn fetch_recent_buys(&self) -> Result<Vec<RecentBuy>> {
        let rows = sqlx::query("SELECT symbol, shares, date FROM recent_buys ORDER BY date DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let date: NaiveDate = row
                    .get::<String, _>("date")
                    .parse()
                    .context("invalid date in recent_buys table")?;
                RecentBuy::new(row.get("symbol"), row.get("shares"), date)
                    .context("invalid recent buy row")
            })
            .collect()
    }

    /// Price snapshot. Falls back to today's date when no prices are stored.
    pub async fn fetch_market(&self) -> Result<MarketData> {
        let rows = sqlx::query("SELECT symbol, price, asof FROM market_prices")
            .fetch_all(&self.pool)
            .await?;

        let asof = match rows.first() {
            Some(row) => row
                .get::<String, _>("asof")
                .parse()
                .context("invalid asof in market_prices table")?,
            None => Utc::now().date_naive(),
        };

        let prices: HashMap<String, f64> = rows
            .into_iter()
            .map(|row| (row.get("symbol"), row.get("price")))
            .collect();

        MarketData::new(asof, prices).context("invalid market snapshot")
    }

    /// Stored policy, or `None` when no policy rows exist (callers fall back
    /// to the demo policy).
    pub async fn fetch_policy(&self) -> Result<Option<ReplacementPolicy>> {
        let cluster_rows =
            sqlx::query("SELECT cluster_id, symbol FROM policy_clusters ORDER BY cluster_id, symbol")
                .fetch_all(&self.pool)
                .await?;

        let alt_rows =
            sqlx::query("SELECT symbol, alt_symbol FROM policy_alternatives ORDER BY symbol, rank")
                .fetch_all(&self.pool)
                .await?;

        if cluster_rows.is_empty() && alt_rows.is_empty() {
            return Ok(None);
        }

        let mut clusters_map: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for row in cluster_rows {
            clusters_map
                .entry(row.get("cluster_id"))
                .or_default()
                .push(row.get("symbol"));
        }

        let mut alternatives: Vec<(String, Vec<String>)> = Vec::new();
        for row in alt_rows {
            let symbol: String = row.get("symbol");
            let alt: String = row.get("alt_symbol");
            match alternatives.last_mut() {
                Some((s, alts)) if *s == symbol => alts.push(alt),
                _ => alternatives.push((symbol, vec![alt])),
            }
        }

        let version = sqlx::query("SELECT version FROM policy_meta LIMIT 1")
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.get("version"))
            .unwrap_or_else(|| "db-1".to_string());

        Ok(Some(ReplacementPolicy::new(
            clusters_map.into_values().collect(),
            alternatives,
            version,
        )))
    }

    // ---- Plans ----

    /// Persist a plan header plus its items as JSON blobs. Returns the id.
    pub async fn insert_plan(&self, plan: &HarvestPlan) -> Result<i64> {
        let created_at = Utc::now().to_rfc3339();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO plans (asof, total_loss, cash_delta, policy_version, created_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(plan.asof.to_string())
        .bind(plan.total_harvestable_loss)
        .bind(plan.simulated_cash_delta)
        .bind(&plan.policy_version)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        for (index, item) in plan.items.iter().enumerate() {
            sqlx::query("INSERT INTO plan_items (plan_id, item_index, data_json) VALUES (?, ?, ?)")
                .bind(id)
                .bind(index as i64)
                .bind(serde_json::to_string(item)?)
                .execute(&self.pool)
                .await?;
        }

        tracing::info!(plan_id = id, items = plan.items.len(), "plan saved");
        Ok(id)
    }

    pub async fn fetch_latest_plan(&self) -> Result<Option<(i64, HarvestPlan)>> {
        let row = sqlx::query_as::<_, PlanRow>(
            "SELECT id, asof, total_loss, cash_delta, policy_version, created_at \
             FROM plans ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let id = row.id;
                Ok(Some((id, self.load_plan(row).await?)))
            }
            None => Ok(None),
        }
    }

    pub async fn fetch_plan(&self, id: i64) -> Result<Option<(i64, HarvestPlan)>> {
        let row = sqlx::query_as::<_, PlanRow>(
            "SELECT id, asof, total_loss, cash_delta, policy_version, created_at \
             FROM plans WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some((id, self.load_plan(row).await?))),
            None => Ok(None),
        }
    }

    async fn load_plan(&self, row: PlanRow) -> Result<HarvestPlan> {
        let item_rows = sqlx::query(
            "SELECT data_json FROM plan_items WHERE plan_id = ? ORDER BY item_index",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let items: Vec<HarvestItem> = item_rows
            .into_iter()
            .map(|r| {
                serde_json::from_str(&r.get::<String, _>("data_json"))
                    .context("corrupt plan item JSON")
            })
            .collect::<Result<_>>()?;

        Ok(HarvestPlan {
            asof: row.asof.parse().context("invalid asof in plans table")?,
            items,
            total_harvestable_loss: row.total_loss,
            simulated_cash_delta: row.cash_delta,
            policy_version: row.policy_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::demo_policy;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn memory_store() -> HarvestStore {
        HarvestStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_lots_round_trip() {
        let store = memory_store().await;
        let lots = vec![
            TaxLot::new("SPY".to_string(), 50.0, date(2024, 2, 1), 520.0).unwrap(),
            TaxLot::new("AAPL".to_string(), 40.0, date(2023, 5, 1), 195.0).unwrap(),
        ];
        store.insert_lots(&lots).await.unwrap();

        let back = store.fetch_lots().await.unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].symbol, "SPY");
        assert_eq!(back[1].buy_date, date(2023, 5, 1));
        assert_eq!(back[1].cost_basis_per_share, 195.0);
    }

    #[tokio::test]
    async fn test_market_round_trip_and_empty_default() {
        let store = memory_store().await;

        let empty = store.fetch_market().await.unwrap();
        assert!(empty.prices.is_empty());
        assert_eq!(empty.asof, Utc::now().date_naive());

        let mut prices = HashMap::new();
        prices.insert("SPY".to_string(), 500.0);
        prices.insert("VTI".to_string(), 250.0);
        store.upsert_prices(date(2024, 6, 15), &prices).await.unwrap();

        // Upsert replaces the price and as-of for an existing symbol.
        let mut update = HashMap::new();
        update.insert("SPY".to_string(), 501.5);
        store.upsert_prices(date(2024, 6, 16), &update).await.unwrap();

        let market = store.fetch_market().await.unwrap();
        assert_eq!(market.price("SPY"), Some(501.5));
        assert_eq!(market.price("VTI"), Some(250.0));
    }

    #[tokio::test]
    async fn test_policy_round_trip_preserves_ranking() {
        let store = memory_store().await;
        assert!(store.fetch_policy().await.unwrap().is_none());

        store.set_policy(&demo_policy()).await.unwrap();
        let policy = store.fetch_policy().await.unwrap().unwrap();

        assert_eq!(policy.version, "demo-1");
        assert_eq!(policy.cluster_for("SPY").len(), 3);
        // Ranked order survives storage: XLK before VGT for AAPL.
        assert_eq!(policy.safe_alternatives("AAPL"), vec!["XLK", "VGT"]);
    }

    #[tokio::test]
    async fn test_plan_round_trip() {
        let store = memory_store().await;

        let plan = HarvestPlan {
            asof: date(2024, 6, 15),
            items: vec![HarvestItem {
                symbol: "AAPL".to_string(),
                lot_index: 0,
                shares_to_sell: 40.0,
                sale_price: 178.0,
                loss_dollars: 680.0,
                replacement_symbol: Some("XLK".to_string()),
                replacement_shares: Some(31.644444),
                replacement_price: Some(225.0),
                sale_date: date(2024, 6, 15),
                reentry_date_ok_after: date(2024, 7, 16),
                wash_sale_blocked: false,
                block_reason: None,
                notes: None,
            }],
            total_harvestable_loss: 680.0,
            simulated_cash_delta: 0.0,
            policy_version: "demo-1".to_string(),
        };

        assert!(store.fetch_latest_plan().await.unwrap().is_none());

        let id = store.insert_plan(&plan).await.unwrap();
        let (latest_id, back) = store.fetch_latest_plan().await.unwrap().unwrap();
        assert_eq!(latest_id, id);
        assert_eq!(back.asof, plan.asof);
        assert_eq!(back.items.len(), 1);
        assert_eq!(back.items[0].replacement_symbol.as_deref(), Some("XLK"));
        assert_eq!(back.policy_version, "demo-1");

        let (by_id, _) = store.fetch_plan(id).await.unwrap().unwrap();
        assert_eq!(by_id, id);
        assert!(store.fetch_plan(id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let store = memory_store().await;
        store
            .insert_lots(&[TaxLot::new("SPY".to_string(), 1.0, date(2024, 1, 1), 500.0).unwrap()])
            .await
            .unwrap();
        store.set_policy(&demo_policy()).await.unwrap();

        store.clear_all().await.unwrap();
        assert!(store.fetch_lots().await.unwrap().is_empty());
        assert!(store.fetch_policy().await.unwrap().is_none());
    }
}
