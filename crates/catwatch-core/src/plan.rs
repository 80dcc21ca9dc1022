//! Subscription plan catalog.
//!
//! Plans are configured once at startup and then looked up by id. The same
//! ids exist as plans on the payment gateway.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Form field prefix used by per-plan submit buttons.
pub const SUBMIT_PREFIX: &str = "submit_";

/// Billing interval for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    /// Billed every day.
    Day,
    /// Billed every week.
    Week,
    /// Billed every month.
    Month,
    /// Billed every year.
    Year,
}

/// A subscription plan as configured locally and on the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier, shared with the gateway.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Price per interval in cents.
    pub amount: i64,
    /// Lowercase currency code.
    pub currency: String,
    /// Billing interval.
    pub interval: Interval,
    /// Number of intervals between bills.
    #[serde(default = "default_interval_count")]
    pub interval_count: u32,
    /// Free trial length.
    #[serde(default)]
    pub trial_period_days: Option<u32>,
    /// Text shown on the card statement.
    #[serde(default)]
    pub statement_descriptor: Option<String>,
}

fn default_interval_count() -> u32 {
    1
}

/// Typed plan lookup keyed by plan id.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    plans: HashMap<String, Plan>,
}

impl PlanCatalog {
    /// Build a catalog from a list of plans. Later duplicates replace earlier ones.
    #[must_use]
    pub fn new(plans: impl IntoIterator<Item = Plan>) -> Self {
        Self {
            plans: plans.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Look up a plan by id.
    #[must_use]
    pub fn get(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.get(plan_id)
    }

    /// Whether `plan_id` is a configured plan.
    #[must_use]
    pub fn contains(&self, plan_id: &str) -> bool {
        self.plans.contains_key(plan_id)
    }

    /// All plans ordered by price.
    #[must_use]
    pub fn list(&self) -> Vec<&Plan> {
        let mut plans: Vec<_> = self.plans.values().collect();
        plans.sort_by(|a, b| a.amount.cmp(&b.amount).then_with(|| a.id.cmp(&b.id)));
        plans
    }

    /// Number of configured plans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether no plans are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Pick the plan from form keys shaped like `submit_<planId>`.
    ///
    /// Each plan has its own submit button, so at most one such key is
    /// expected. The first key naming a configured plan wins.
    #[must_use]
    pub fn resolve_submitted_plan<'a, I>(&self, keys: I) -> Option<&Plan>
    where
        I: IntoIterator<Item = &'a str>,
    {
        keys.into_iter()
            .filter_map(|key| key.strip_prefix(SUBMIT_PREFIX))
            .find_map(|plan_id| self.get(plan_id))
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            amount: 0,
            currency: "usd".into(),
            interval: Interval::Month,
            interval_count: 1,
            trial_period_days: None,
            statement_descriptor: None,
        }
    }
}

/// The stock bronze / gold / platinum monthly catalog.
#[must_use]
pub fn default_plans() -> Vec<Plan> {
    [("bronze", "Bronze", 100), ("gold", "Gold", 500), ("platinum", "Platinum", 1000)]
        .into_iter()
        .map(|(id, name, amount)| Plan {
            id: id.into(),
            name: name.into(),
            amount,
            trial_period_days: Some(14),
            statement_descriptor: Some(format!("{} MONTHLY", name.to_uppercase())),
            ..Plan::default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PlanCatalog {
        PlanCatalog::new(default_plans())
    }

    #[test]
    fn lookup_by_id() {
        let catalog = catalog();
        assert_eq!(catalog.get("gold").map(|p| p.amount), Some(500));
        assert!(catalog.get("diamond").is_none());
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn list_is_ordered_by_price() {
        let ids: Vec<_> = catalog().list().iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, ["bronze", "gold", "platinum"]);
    }

    #[test]
    fn submitted_plan_is_resolved_from_button_key() {
        let catalog = catalog();
        let keys = ["coupon_code", "submit_gold"];
        assert_eq!(
            catalog.resolve_submitted_plan(keys).map(|p| p.id.as_str()),
            Some("gold")
        );
    }

    #[test]
    fn first_configured_submit_key_wins() {
        let catalog = catalog();
        let keys = ["submit_diamond", "submit_bronze", "submit_platinum"];
        assert_eq!(
            catalog.resolve_submitted_plan(keys).map(|p| p.id.as_str()),
            Some("bronze")
        );
    }

    #[test]
    fn no_submit_key_resolves_nothing() {
        assert!(catalog().resolve_submitted_plan(["gold", "name"]).is_none());
    }

    #[test]
    fn plan_file_shape_deserializes() {
        let json = r#"[{"id":"silver","name":"Silver","amount":250,"currency":"usd","interval":"month"}]"#;
        let plans: Vec<Plan> = serde_json::from_str(json).unwrap();
        assert_eq!(plans[0].interval_count, 1);
        assert_eq!(plans[0].trial_period_days, None);
    }
}
