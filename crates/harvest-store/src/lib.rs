//! Harvest Store
//!
//! SQLite persistence for planning inputs (lots, recent buys, market prices,
//! the replacement policy) and for saved harvest plans.

pub mod db;
pub mod seed;

pub use db::{HarvestStore, PlanRow};
pub use seed::{seed_demo, SeedSummary};
