//! Plan Explanation
//!
//! Renders a [`HarvestPlan`] into human-readable text. A richer generator
//! (e.g. an LLM-backed one) can plug in through [`ExplainPlan`]; the
//! deterministic fallback renderer succeeds for any valid plan.

use crate::models::HarvestPlan;

/// A collaborator that turns a plan into prose. Implementations may fail;
/// callers fall back to [`render_plan`] when they do.
pub trait ExplainPlan {
    fn explain(&self, plan: &HarvestPlan) -> anyhow::Result<String>;
}

/// The deterministic renderer, exposed as an [`ExplainPlan`] impl for use
/// where a trait object is expected.
pub struct FallbackRenderer;

impl ExplainPlan for FallbackRenderer {
    fn explain(&self, plan: &HarvestPlan) -> anyhow::Result<String> {
        Ok(render_plan(plan))
    }
}

/// Deterministic plan rendering: one headline, optional cash-drift line,
/// one line per item, closing disclaimer. Never fails.
pub fn render_plan(plan: &HarvestPlan) -> String {
    let mut lines = vec![format!(
        "As of {}, estimated harvestable loss = ${:.2}.",
        plan.asof, plan.total_harvestable_loss
    )];

    if plan.simulated_cash_delta.abs() > 0.01 {
        lines.push(format!(
            "Approx. cash drift from replacements: ${:.2}.",
            plan.simulated_cash_delta
        ));
    }

    for it in &plan.items {
        if it.wash_sale_blocked {
            lines.push(format!(
                "BLOCKED {}[lot {}] - {}",
                it.symbol,
                it.lot_index,
                it.block_reason.as_deref().unwrap_or("wash-sale rule")
            ));
        } else {
            lines.push(format!(
                "SELL {}[lot {}] to harvest ${:.2}; BUY {} (~{:.4} sh). Re-enter after {}.",
                it.symbol,
                it.lot_index,
                it.loss_dollars,
                it.replacement_symbol.as_deref().unwrap_or("(none)"),
                it.replacement_shares.unwrap_or(0.0),
                it.reentry_date_ok_after
            ));
        }
    }

    lines.push("(Demo only, not tax advice.)".to_string());
    lines.join("\n")
}
