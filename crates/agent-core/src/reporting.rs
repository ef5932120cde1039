//! # Reporting
//!
//! Read-only rollups over an agent's commission records. Each commission is
//! one attributed order, so order counts and sales come from the same rows
//! as the commission sums.
//!
//! The rollups work on [`CommissionBucket`]s: per-month, per-status totals.
//! Storage aggregates them in SQL (`GROUP BY month, status`); in-memory
//! callers group [`CommissionFact`]s with [`CommissionBucket::from_facts`].
//! All windows are computed against an explicit `now`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use ts_rs::TS;

use crate::commission::Commission;
use crate::money::Money;
use crate::payout::PayoutPeriod;
use crate::status::CommissionStatus;
use crate::MONTHLY_PERFORMANCE_WINDOW;

/// The slice of a commission row that reporting needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionFact {
    pub order_total: Money,
    pub amount: Money,
    pub status: CommissionStatus,
    pub customer_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Commission> for CommissionFact {
    fn from(c: &Commission) -> Self {
        CommissionFact {
            order_total: c.order_total(),
            amount: c.amount(),
            status: c.status(),
            customer_ref: c.customer_ref().map(str::to_string),
            created_at: c.created_at(),
        }
    }
}

/// Number of distinct customer references among `facts`.
pub fn distinct_customers(facts: &[CommissionFact]) -> i64 {
    facts
        .iter()
        .filter_map(|f| f.customer_ref.as_deref())
        .collect::<HashSet<_>>()
        .len() as i64
}

/// Totals of one agent's commissions created in `period` with `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionBucket {
    pub period: PayoutPeriod,
    pub status: CommissionStatus,
    pub orders: i64,
    pub sales: Money,
    pub commission: Money,
}

impl CommissionBucket {
    /// Groups facts by month and status, ordered by month.
    pub fn from_facts(facts: &[CommissionFact]) -> Vec<CommissionBucket> {
        let mut grouped: BTreeMap<(PayoutPeriod, u8), CommissionBucket> = BTreeMap::new();
        for fact in facts {
            let period = PayoutPeriod::current(fact.created_at);
            let bucket = grouped
                .entry((period, status_order(fact.status)))
                .or_insert(CommissionBucket {
                    period,
                    status: fact.status,
                    orders: 0,
                    sales: Money::zero(),
                    commission: Money::zero(),
                });
            bucket.orders += 1;
            bucket.sales += fact.order_total;
            bucket.commission += fact.amount;
        }
        grouped.into_values().collect()
    }
}

fn status_order(status: CommissionStatus) -> u8 {
    match status {
        CommissionStatus::Pending => 0,
        CommissionStatus::Approved => 1,
        CommissionStatus::Paid => 2,
        CommissionStatus::Cancelled => 3,
    }
}

/// Commission sums by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionBreakdown {
    pub pending: Money,
    pub approved: Money,
    pub paid: Money,
}

impl CommissionBreakdown {
    fn add(&mut self, bucket: &CommissionBucket) {
        match bucket.status {
            CommissionStatus::Pending => self.pending += bucket.commission,
            CommissionStatus::Approved => self.approved += bucket.commission,
            CommissionStatus::Paid => self.paid += bucket.commission,
            CommissionStatus::Cancelled => {}
        }
    }

    /// Pending plus approved.
    pub fn unpaid(&self) -> Money {
        self.pending + self.approved
    }
}

// =============================================================================
// Dashboard
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Dashboard {
    pub agent_id: i64,
    pub total_orders: i64,
    pub total_sales: Money,
    pub monthly_orders: i64,
    pub monthly_sales: Money,
    pub total_customers: i64,
    /// Every commission amount regardless of status.
    pub total_commission: Money,
    pub monthly_commission: Money,
    pub commission_breakdown: CommissionBreakdown,
    /// `total_sales / total_orders`, zero when there are no orders.
    pub average_order_value: Money,
}

impl Dashboard {
    pub fn build(agent_id: i64, buckets: &[CommissionBucket], total_customers: i64, now: DateTime<Utc>) -> Self {
        let this_month = PayoutPeriod::current(now);
        let mut dashboard = Dashboard {
            agent_id,
            total_orders: 0,
            total_sales: Money::zero(),
            monthly_orders: 0,
            monthly_sales: Money::zero(),
            total_customers,
            total_commission: Money::zero(),
            monthly_commission: Money::zero(),
            commission_breakdown: CommissionBreakdown::default(),
            average_order_value: Money::zero(),
        };

        for bucket in buckets {
            dashboard.total_orders += bucket.orders;
            dashboard.total_sales += bucket.sales;
            dashboard.total_commission += bucket.commission;
            dashboard.commission_breakdown.add(bucket);

            if bucket.period == this_month {
                dashboard.monthly_orders += bucket.orders;
                dashboard.monthly_sales += bucket.sales;
                dashboard.monthly_commission += bucket.commission;
            }
        }

        dashboard.average_order_value = dashboard.total_sales.average_over(dashboard.total_orders);
        dashboard
    }
}

// =============================================================================
// Monthly Performance
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MonthlyPerformance {
    /// `YYYY-MM`
    pub month: String,
    pub orders: i64,
    pub sales: Money,
    pub commission: Money,
    pub pending: Money,
    pub approved: Money,
    pub paid: Money,
    pub average_order_value: Money,
}

impl MonthlyPerformance {
    fn empty(period: PayoutPeriod) -> Self {
        MonthlyPerformance {
            month: period.to_string(),
            orders: 0,
            sales: Money::zero(),
            commission: Money::zero(),
            pending: Money::zero(),
            approved: Money::zero(),
            paid: Money::zero(),
            average_order_value: Money::zero(),
        }
    }
}

/// The trailing 12 calendar months ending at `now`'s month, oldest first.
/// Months without activity are present with zeros; buckets outside the
/// window are ignored.
pub fn monthly_performance(buckets: &[CommissionBucket], now: DateTime<Utc>) -> Vec<MonthlyPerformance> {
    let periods = trailing_periods(now, MONTHLY_PERFORMANCE_WINDOW);
    let mut series: Vec<MonthlyPerformance> = periods.iter().copied().map(MonthlyPerformance::empty).collect();

    for bucket in buckets {
        let Some(slot) = periods.iter().position(|p| *p == bucket.period) else {
            continue;
        };
        let entry = &mut series[slot];
        entry.orders += bucket.orders;
        entry.sales += bucket.sales;
        entry.commission += bucket.commission;
        match bucket.status {
            CommissionStatus::Pending => entry.pending += bucket.commission,
            CommissionStatus::Approved => entry.approved += bucket.commission,
            CommissionStatus::Paid => entry.paid += bucket.commission,
            CommissionStatus::Cancelled => {}
        }
    }

    for entry in &mut series {
        entry.average_order_value = entry.sales.average_over(entry.orders);
    }
    series
}

/// `count` consecutive months ending at the month containing `now`, oldest first.
pub fn trailing_periods(now: DateTime<Utc>, count: usize) -> Vec<PayoutPeriod> {
    let mut periods = Vec::with_capacity(count);
    let mut period = PayoutPeriod::current(now);
    for _ in 0..count {
        periods.push(period);
        period = period.previous();
    }
    periods.reverse();
    periods
}

// =============================================================================
// Stats
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AgentStats {
    pub agent_id: i64,
    pub total_commissions: i64,
    pub total_commission_amount: Money,
    pub pending_count: i64,
    pub pending_amount: Money,
    pub this_month_amount: Money,
    pub total_payouts: i64,
}

impl AgentStats {
    pub fn build(agent_id: i64, buckets: &[CommissionBucket], total_payouts: i64, now: DateTime<Utc>) -> Self {
        let this_month = PayoutPeriod::current(now);
        let pending = || buckets.iter().filter(|b| b.status == CommissionStatus::Pending);

        AgentStats {
            agent_id,
            total_commissions: buckets.iter().map(|b| b.orders).sum(),
            total_commission_amount: buckets.iter().map(|b| b.commission).sum(),
            pending_count: pending().map(|b| b.orders).sum(),
            pending_amount: pending().map(|b| b.commission).sum(),
            this_month_amount: buckets
                .iter()
                .filter(|b| b.period == this_month)
                .map(|b| b.commission)
                .sum(),
            total_payouts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionStats {
    pub agent_id: i64,
    pub total_pending: Money,
    pub total_approved: Money,
    pub total_paid: Money,
    /// Paid out so far.
    pub total_earned: Money,
    pub total_unpaid: Money,
    pub total_count: i64,
}

impl CommissionStats {
    pub fn build(agent_id: i64, buckets: &[CommissionBucket]) -> Self {
        let mut breakdown = CommissionBreakdown::default();
        buckets.iter().for_each(|b| breakdown.add(b));

        CommissionStats {
            agent_id,
            total_pending: breakdown.pending,
            total_approved: breakdown.approved,
            total_paid: breakdown.paid,
            total_earned: breakdown.paid,
            total_unpaid: breakdown.unpaid(),
            total_count: buckets.iter().map(|b| b.orders).sum(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn fact(total: i64, amount: i64, status: CommissionStatus, customer: Option<&str>, when: DateTime<Utc>) -> CommissionFact {
        CommissionFact {
            order_total: Money::from_major_minor(total, 0),
            amount: Money::from_major_minor(amount, 0),
            status,
            customer_ref: customer.map(str::to_string),
            created_at: when,
        }
    }

    fn sample() -> Vec<CommissionFact> {
        vec![
            fact(1000, 50, CommissionStatus::Pending, Some("C1"), at(2026, 3, 2)),
            fact(2000, 100, CommissionStatus::Approved, Some("C2"), at(2026, 3, 10)),
            fact(500, 25, CommissionStatus::Paid, Some("C1"), at(2026, 1, 20)),
            fact(300, 15, CommissionStatus::Cancelled, None, at(2025, 2, 1)),
        ]
    }

    fn buckets() -> Vec<CommissionBucket> {
        CommissionBucket::from_facts(&sample())
    }

    #[test]
    fn test_buckets_group_by_month_and_status() {
        let mut facts = sample();
        facts.push(fact(100, 5, CommissionStatus::Pending, Some("C3"), at(2026, 3, 20)));
        let grouped = CommissionBucket::from_facts(&facts);

        assert_eq!(grouped.len(), 4);
        assert_eq!(grouped[0].period.to_string(), "2025-02");
        let march_pending = grouped
            .iter()
            .find(|b| b.period.to_string() == "2026-03" && b.status == CommissionStatus::Pending)
            .unwrap();
        assert_eq!(march_pending.orders, 2);
        assert_eq!(march_pending.sales, Money::from_major_minor(1100, 0));
        assert_eq!(march_pending.commission, Money::from_major_minor(55, 0));
        assert_eq!(distinct_customers(&facts), 3);
    }

    #[test]
    fn test_dashboard_rollup() {
        let dash = Dashboard::build(7, &buckets(), distinct_customers(&sample()), at(2026, 3, 15));

        assert_eq!(dash.total_orders, 4);
        assert_eq!(dash.total_sales, Money::from_major_minor(3800, 0));
        assert_eq!(dash.monthly_orders, 2);
        assert_eq!(dash.monthly_sales, Money::from_major_minor(3000, 0));
        assert_eq!(dash.monthly_commission, Money::from_major_minor(150, 0));
        assert_eq!(dash.total_customers, 2);
        assert_eq!(dash.total_commission, Money::from_major_minor(190, 0));
        assert_eq!(dash.commission_breakdown.pending, Money::from_major_minor(50, 0));
        assert_eq!(dash.commission_breakdown.approved, Money::from_major_minor(100, 0));
        assert_eq!(dash.commission_breakdown.paid, Money::from_major_minor(25, 0));
        assert_eq!(dash.average_order_value, Money::from_major_minor(950, 0));
    }

    #[test]
    fn test_dashboard_without_orders_has_zero_average() {
        let dash = Dashboard::build(7, &[], 0, at(2026, 3, 15));
        assert_eq!(dash.total_orders, 0);
        assert!(dash.average_order_value.is_zero());
        assert_eq!(dash.total_customers, 0);
    }

    #[test]
    fn test_monthly_series_is_twelve_months_oldest_first() {
        let series = monthly_performance(&buckets(), at(2026, 3, 15));

        assert_eq!(series.len(), 12);
        assert_eq!(series.first().map(|m| m.month.as_str()), Some("2025-04"));
        assert_eq!(series.last().map(|m| m.month.as_str()), Some("2026-03"));
        assert!(series.windows(2).all(|w| w[0].month < w[1].month));

        let march = &series[11];
        assert_eq!(march.orders, 2);
        assert_eq!(march.sales, Money::from_major_minor(3000, 0));
        assert_eq!(march.pending, Money::from_major_minor(50, 0));
        assert_eq!(march.approved, Money::from_major_minor(100, 0));
        assert_eq!(march.average_order_value, Money::from_major_minor(1500, 0));

        let january = &series[9];
        assert_eq!(january.month, "2026-01");
        assert_eq!(january.paid, Money::from_major_minor(25, 0));

        // February had no activity and is reported as zeros.
        let february = &series[10];
        assert_eq!(february.orders, 0);
        assert!(february.average_order_value.is_zero());

        // The 2025-02 row is outside the window.
        assert_eq!(series.iter().map(|m| m.orders).sum::<i64>(), 3);
    }

    #[test]
    fn test_monthly_series_crosses_year_boundary() {
        let series = monthly_performance(&[], at(2026, 1, 1));
        assert_eq!(series.len(), 12);
        assert_eq!(series[0].month, "2025-02");
        assert_eq!(series[11].month, "2026-01");
    }

    #[test]
    fn test_agent_stats() {
        let stats = AgentStats::build(7, &buckets(), 3, at(2026, 3, 15));
        assert_eq!(stats.total_commissions, 4);
        assert_eq!(stats.total_commission_amount, Money::from_major_minor(190, 0));
        assert_eq!(stats.pending_count, 1);
        assert_eq!(stats.pending_amount, Money::from_major_minor(50, 0));
        assert_eq!(stats.this_month_amount, Money::from_major_minor(150, 0));
        assert_eq!(stats.total_payouts, 3);
    }

    #[test]
    fn test_commission_stats() {
        let stats = CommissionStats::build(7, &buckets());
        assert_eq!(stats.total_unpaid, Money::from_major_minor(150, 0));
        assert_eq!(stats.total_earned, Money::from_major_minor(25, 0));
        assert_eq!(stats.total_count, 4);
    }
}
