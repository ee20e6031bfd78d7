//! Tax-Loss Harvesting Navigator
//!
//! Decides which lossmaking tax lots can be sold to realize a deductible
//! loss without tripping the wash-sale rule, and proposes a replacement
//! purchase that keeps market exposure. The engine is a pure, synchronous
//! computation over immutable input snapshots.

pub mod explain;
pub mod models;
pub mod navigator;
pub mod policy;

pub use explain::{render_plan, ExplainPlan, FallbackRenderer};
pub use models::{HarvestItem, HarvestPlan, MarketData, ModelError, RecentBuy, TaxLot};
pub use navigator::{PlanError, WashSaleNavigator};
pub use policy::{demo_policy, AlternativesEntry, ReplacementPolicy};
