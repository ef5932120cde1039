//! # Commission Calculator
//!
//! Turns an attributed order into a commission amount.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. agent active?                      no  → AgentNotEligible           │
//! │                                                                         │
//! │  2. volume tiers configured?           pick first tier (ascending min)  │
//! │        [min, max)  None = unbounded    whose range holds the subtotal   │
//! │                                                                         │
//! │  3. effective rate = (tier rate | agent base rate)                      │
//! │                      + team boost                                       │
//! │                      + agent tier bonus          (capped at 100%)       │
//! │                                                                         │
//! │  4. base commission = subtotal × effective rate                         │
//! │                                                                         │
//! │  5. + subtotal × bonus rate   for every product in the order with an    │
//! │     + subtotal × bonus rate   active product / category bonus entry     │
//! │       (bonuses stack, each one is a breakdown line)                     │
//! │                                                                         │
//! │  6. total = base + Σ bonuses                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The commission base is the order subtotal: shipping and discounts are
//! carried on [`OrderContext`] for the record but never enter the math.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

use crate::agent::Agent;
use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::rate::CommissionRate;
use crate::team::Team;
use crate::validation::{validate_agent_id, validate_non_negative_amount, validate_order_id, validate_positive_amount};

// =============================================================================
// Inputs
// =============================================================================

/// Order data supplied by the order service at completion time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderContext {
    pub order_id: String,
    pub agent_id: i64,
    pub customer_ref: Option<String>,
    /// Commission base.
    pub subtotal: Money,
    pub order_total: Money,
    pub shipping: Money,
    pub discount: Money,
    pub product_ids: Vec<String>,
    pub category_ids: Vec<String>,
}

impl OrderContext {
    pub fn new(order_id: impl Into<String>, agent_id: i64, subtotal: Money) -> Self {
        OrderContext {
            order_id: order_id.into(),
            agent_id,
            subtotal,
            order_total: subtotal,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<String, ValidationError> {
        validate_agent_id(self.agent_id)?;
        let order_id = validate_order_id(&self.order_id)?;
        validate_positive_amount("subtotal", self.subtotal)?;
        Ok(order_id)
    }
}

/// An order-subtotal band with its own rate. `max_amount: None` has no
/// upper limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VolumeTier {
    pub name: String,
    pub min_amount: Money,
    pub max_amount: Option<Money>,
    pub rate: CommissionRate,
}

impl VolumeTier {
    pub fn new(name: impl Into<String>, min_amount: Money, max_amount: Option<Money>, rate: CommissionRate) -> Self {
        VolumeTier {
            name: name.into(),
            min_amount,
            max_amount,
            rate,
        }
    }

    /// Half-open: `min <= amount < max`.
    pub fn contains(&self, amount: Money) -> bool {
        amount >= self.min_amount && self.max_amount.map_or(true, |max| amount < max)
    }

    /// The tier name, or its range when unnamed.
    pub fn label(&self) -> String {
        if !self.name.trim().is_empty() {
            return self.name.clone();
        }
        match self.max_amount {
            Some(max) => format!("{}-{}", self.min_amount, max),
            None => format!("{}+", self.min_amount),
        }
    }
}

/// Checks a tier table for configuration mistakes: negative bounds, empty
/// ranges and overlaps. Storage runs this before saving a table.
pub fn validate_tiers(tiers: &[VolumeTier]) -> Result<(), ValidationError> {
    for tier in tiers {
        validate_non_negative_amount("min_amount", tier.min_amount)?;
        if let Some(max) = tier.max_amount {
            if max <= tier.min_amount {
                return Err(ValidationError::InvalidFormat {
                    field: "max_amount".to_string(),
                    reason: format!("tier {} ends before it starts", tier.label()),
                });
            }
        }
    }

    let mut sorted: Vec<&VolumeTier> = tiers.iter().collect();
    sorted.sort_by_key(|t| t.min_amount);

    for pair in sorted.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        let overlaps = match lower.max_amount {
            None => true,
            Some(max) => max > upper.min_amount,
        };
        if overlaps {
            return Err(ValidationError::OverlappingTiers {
                first: lower.label(),
                second: upper.label(),
            });
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BonusKind {
    Product,
    Category,
}

impl BonusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BonusKind::Product => "product",
            BonusKind::Category => "category",
        }
    }
}

/// A bonus-rate entry for one product or category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BonusRate {
    pub item_id: String,
    pub item_name: String,
    pub rate: CommissionRate,
    pub is_active: bool,
}

impl BonusRate {
    /// The item id is stored trimmed, the form order ids are matched in.
    pub fn new(item_id: impl Into<String>, item_name: impl Into<String>, rate: CommissionRate) -> Self {
        BonusRate {
            item_id: item_id.into().trim().to_string(),
            item_name: item_name.into(),
            rate,
            is_active: true,
        }
    }
}

/// Everything the calculator reads about the agent's configuration.
#[derive(Debug, Clone, Copy)]
pub struct CalculatorInput<'a> {
    pub agent: &'a Agent,
    pub team: Option<&'a Team>,
    pub volume_tiers: &'a [VolumeTier],
    pub product_bonuses: &'a [BonusRate],
    pub category_bonuses: &'a [BonusRate],
}

impl<'a> CalculatorInput<'a> {
    pub fn new(agent: &'a Agent) -> Self {
        CalculatorInput {
            agent,
            team: None,
            volume_tiers: &[],
            product_bonuses: &[],
            category_bonuses: &[],
        }
    }
}

// =============================================================================
// Output
// =============================================================================

/// One bonus line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BreakdownItem {
    pub item_type: BonusKind,
    pub item_id: String,
    pub item_name: String,
    pub rate: CommissionRate,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionCalculation {
    pub order_id: String,
    pub agent_id: i64,
    /// Effective rate used for the base commission.
    pub commission_rate: CommissionRate,
    /// Subtotal × effective rate, before bonuses.
    pub base_amount: Money,
    /// Base plus every bonus line.
    pub commission_amount: Money,
    /// The subtotal the rates were applied to.
    pub based_on_amount: Money,
    pub tier_applied: Option<String>,
    pub breakdown: Vec<BreakdownItem>,
}

impl CommissionCalculation {
    pub fn bonus_total(&self) -> Money {
        self.breakdown.iter().map(|b| b.amount).sum()
    }
}

// =============================================================================
// Calculation
// =============================================================================

/// Computes the commission for `order`.
///
/// ## Errors
/// - `Validation` for a missing agent/order id, a non-positive subtotal, or
///   an order attributed to a different agent than `input.agent`
/// - `AgentNotEligible` when the agent is not active
pub fn calculate(order: &OrderContext, input: CalculatorInput<'_>) -> CoreResult<CommissionCalculation> {
    let order_id = order.validate()?;
    let agent = input.agent;

    if order.agent_id != agent.id() {
        return Err(ValidationError::InvalidFormat {
            field: "agent_id".to_string(),
            reason: format!("order {} is attributed to agent {}, not {}", order_id, order.agent_id, agent.id()),
        }
        .into());
    }

    agent.ensure_can_earn()?;

    let subtotal = order.subtotal;
    let matched_tier = select_tier(input.volume_tiers, subtotal);

    let base_rate = matched_tier.map_or(agent.commission_rate(), |t| t.rate);
    let team_boost = input
        .team
        .filter(|team| agent.team_id() == Some(team.id))
        .map_or(CommissionRate::ZERO, Team::effective_boost);
    let effective_rate = base_rate
        .add(team_boost)
        .add_percentage(agent.tier().bonus_percentage());

    let base_amount = subtotal.apply_rate(effective_rate);

    let mut breakdown = bonus_lines(BonusKind::Product, &order.product_ids, input.product_bonuses, subtotal);
    breakdown.extend(bonus_lines(
        BonusKind::Category,
        &order.category_ids,
        input.category_bonuses,
        subtotal,
    ));

    let bonus_total: Money = breakdown.iter().map(|b| b.amount).sum();

    Ok(CommissionCalculation {
        order_id,
        agent_id: agent.id(),
        commission_rate: effective_rate,
        base_amount,
        commission_amount: base_amount + bonus_total,
        based_on_amount: subtotal,
        tier_applied: matched_tier.map(VolumeTier::label),
        breakdown,
    })
}

/// First tier in ascending `min_amount` order whose range holds `amount`.
pub fn select_tier(tiers: &[VolumeTier], amount: Money) -> Option<&VolumeTier> {
    let mut ordered: Vec<&VolumeTier> = tiers.iter().collect();
    ordered.sort_by_key(|t| t.min_amount);
    ordered.into_iter().find(|t| t.contains(amount))
}

fn bonus_lines(kind: BonusKind, ids: &[String], table: &[BonusRate], subtotal: Money) -> Vec<BreakdownItem> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| seen.insert(*id))
        .filter_map(|id| table.iter().find(|b| b.is_active && b.item_id.trim() == id))
        .map(|bonus| BreakdownItem {
            item_type: kind,
            item_id: bonus.item_id.clone(),
            item_name: bonus.item_name.clone(),
            rate: bonus.rate,
            amount: subtotal.apply_rate(bonus.rate),
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
