//! # Commission Ledger
//!
//! Every state-changing operation on agents, commissions and payouts. Each
//! one runs in a single SQLite transaction that re-reads the rows it
//! touches, applies the agent-core transition, writes the rows back and
//! appends the resulting event to the outbox.
//!
//! ## Commission and Payout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  order completed ──► record_commission ──► commission (pending)        │
//! │                                                │                        │
//! │                              approve_commission│  credits total_earned  │
//! │                                                ▼                        │
//! │                                     commission (approved, unclaimed)    │
//! │                                                │                        │
//! │                                   create_payout│  claim: payout_id = P  │
//! │                                                ▼                        │
//! │  payout P: pending ──process──► processing ──complete──► completed     │
//! │               ▲                     │                  (members paid)   │
//! │               │ retry (re-claim)    │ fail (release)                    │
//! │               └──────── failed ◄────┘                                   │
//! │                                                                         │
//! │  pending ──cancel_payout──► cancelled (release)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A commission is held by at most one payout: claims are guarded updates
//! (`WHERE payout_id IS NULL`), and a lost claim aborts the whole
//! transaction with [`DbError::Conflict`]. Ledger transactions start with
//! `BEGIN IMMEDIATE`, so concurrent payout runs for one agent serialize: the
//! first takes every approved commission and the rest find none
//! ([`CoreError::NoCommissions`]). Lock contention that outlasts the busy
//! timeout also surfaces as `Conflict`.

use agent_core::{
    calculate, Agent, AgentEvent, CalculatorInput, Commission, CommissionCalculation, CommissionRate, CoreError,
    CoreResult, NewAgent, NewCommission, OrderContext, Payout, PayoutPeriod,
};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{agent, bonus, commission, outbox, payout, team, tier};

/// Transactional operations over the commission ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    pub fn new(pool: SqlitePool) -> Self {
        Ledger { pool }
    }

    /// Takes the write lock up front. A deferred `BEGIN` would read a
    /// snapshot first and fail on upgrade if another ledger transaction
    /// committed in between; `IMMEDIATE` makes concurrent writers queue on
    /// the busy timeout instead, so each one sees the previous one's claims.
    async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    // =========================================================================
    // Agents
    // =========================================================================

    /// Registers an agent and assigns its code.
    pub async fn register_agent(
        &self,
        new: NewAgent,
        default_rate: CommissionRate,
        now: DateTime<Utc>,
    ) -> DbResult<Agent> {
        let agent = Agent::register(new, default_rate, now)?;

        let mut tx = self.begin().await?;
        if let Some(team_id) = agent.team_id() {
            team::fetch(&mut tx, team_id)
                .await?
                .ok_or(CoreError::TeamNotFound(team_id))?;
        }
        let agent = agent::insert(&mut tx, agent).await?;
        outbox::append(&mut tx, &agent.registered_event(), now).await?;
        tx.commit().await?;

        info!(id = agent.id(), code = %agent.code(), "Agent registered");
        Ok(agent)
    }

    pub async fn activate_agent(&self, agent_id: i64, now: DateTime<Utc>) -> DbResult<Agent> {
        self.change_agent(agent_id, now, |agent| agent.activate(now)).await
    }

    pub async fn suspend_agent(&self, agent_id: i64, now: DateTime<Utc>) -> DbResult<Agent> {
        self.change_agent(agent_id, now, |agent| agent.suspend(now)).await
    }

    /// Soft delete.
    pub async fn deactivate_agent(&self, agent_id: i64, now: DateTime<Utc>) -> DbResult<Agent> {
        self.change_agent(agent_id, now, |agent| agent.deactivate(now)).await
    }

    pub async fn promote_agent(&self, agent_id: i64, now: DateTime<Utc>) -> DbResult<Agent> {
        self.change_agent(agent_id, now, |agent| agent.promote_tier(now)).await
    }

    /// Moves the agent into `team_id`, or out of any team with `None`.
    pub async fn set_agent_team(&self, agent_id: i64, team_id: Option<i64>, now: DateTime<Utc>) -> DbResult<Agent> {
        let mut tx = self.begin().await?;
        let mut agent = agent::fetch_required(&mut tx, agent_id).await?;

        match team_id {
            Some(team_id) => {
                team::fetch(&mut tx, team_id)
                    .await?
                    .ok_or(CoreError::TeamNotFound(team_id))?;
                agent.assign_to_team(team_id, now)?;
            }
            None => agent.remove_from_team(now),
        }

        agent::save(&mut tx, &agent).await?;
        tx.commit().await?;

        debug!(agent_id, team_id = ?team_id, "Agent team changed");
        Ok(agent)
    }

    async fn change_agent<F>(&self, agent_id: i64, now: DateTime<Utc>, change: F) -> DbResult<Agent>
    where
        F: FnOnce(&mut Agent) -> CoreResult<AgentEvent>,
    {
        let mut tx = self.begin().await?;
        let mut agent = agent::fetch_required(&mut tx, agent_id).await?;

        let event = change(&mut agent)?;
        agent::save(&mut tx, &agent).await?;
        outbox::append(&mut tx, &event, now).await?;
        tx.commit().await?;

        info!(agent_id, event = event.event_type(), "Agent updated");
        Ok(agent)
    }

    // =========================================================================
    // Commissions
    // =========================================================================

    /// Runs the calculator against the agent's stored configuration without
    /// writing anything.
    pub async fn calculate_commission(&self, order: &OrderContext) -> DbResult<CommissionCalculation> {
        let mut conn = self.pool.acquire().await?;
        calculate_on(&mut conn, order).await
    }

    /// Calculates and stores a pending commission for a completed order.
    /// One commission per order id; a repeat is a `UniqueViolation`.
    pub async fn record_commission(&self, order: &OrderContext, now: DateTime<Utc>) -> DbResult<Commission> {
        let mut tx = self.begin().await?;

        let calc = calculate_on(&mut tx, order).await?;
        let mut new = NewCommission::from_calculation(&calc, order.customer_ref.clone());
        if order.order_total.is_positive() {
            new.order_total = order.order_total;
        }

        let commission = commission::insert(&mut tx, Commission::create(new, now)?).await?;
        outbox::append(&mut tx, &commission.created_event(), now).await?;
        tx.commit().await?;

        info!(
            id = commission.id(),
            agent_id = commission.agent_id(),
            order_id = %commission.order_id(),
            amount = %commission.amount(),
            "Commission recorded"
        );
        Ok(commission)
    }

    /// pending → approved, crediting the agent's `total_earned`.
    pub async fn approve_commission(&self, commission_id: i64, now: DateTime<Utc>) -> DbResult<Commission> {
        let mut tx = self.begin().await?;
        let mut commission = commission::fetch_required(&mut tx, commission_id).await?;
        let mut agent = agent::fetch_required(&mut tx, commission.agent_id()).await?;

        let event = commission.approve(now)?;
        let credited = agent.credit_earnings(&event, now)?;

        commission::save(&mut tx, &commission).await?;
        agent::save(&mut tx, &agent).await?;
        outbox::append(&mut tx, &event, now).await?;
        tx.commit().await?;

        info!(
            id = commission_id,
            agent_id = agent.id(),
            credited = %credited,
            total_earned = %agent.total_earned(),
            "Commission approved"
        );
        Ok(commission)
    }

    /// approved → paid, outside of any payout.
    pub async fn mark_commission_paid(&self, commission_id: i64, now: DateTime<Utc>) -> DbResult<Commission> {
        let mut tx = self.begin().await?;
        let mut commission = commission::fetch_required(&mut tx, commission_id).await?;
        ensure_unclaimed(&commission)?;

        let event = commission.mark_as_paid(now)?;
        commission::save(&mut tx, &commission).await?;
        outbox::append(&mut tx, &event, now).await?;
        tx.commit().await?;

        info!(id = commission_id, "Commission marked paid");
        Ok(commission)
    }

    pub async fn cancel_commission(
        &self,
        commission_id: i64,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> DbResult<Commission> {
        let mut tx = self.begin().await?;
        let mut commission = commission::fetch_required(&mut tx, commission_id).await?;
        ensure_unclaimed(&commission)?;

        let event = commission.cancel(reason, now)?;
        commission::save(&mut tx, &commission).await?;
        outbox::append(&mut tx, &event, now).await?;
        tx.commit().await?;

        info!(id = commission_id, reason = ?commission.cancel_reason(), "Commission cancelled");
        Ok(commission)
    }

    // =========================================================================
    // Payouts
    // =========================================================================

    /// Batches the agent's approved, unclaimed commissions created inside
    /// `period` into a pending payout and claims them.
    ///
    /// ## Errors
    /// - `AgentNotEligible` when the agent cannot receive payouts
    /// - `NoCommissions` when nothing qualifies
    /// - `Conflict` when a commission was claimed concurrently
    pub async fn create_payout(&self, agent_id: i64, period: PayoutPeriod, now: DateTime<Utc>) -> DbResult<Payout> {
        let mut tx = self.begin().await?;

        let agent = agent::fetch_required(&mut tx, agent_id).await?;
        if !agent.status().can_receive_payout() {
            return Err(CoreError::AgentNotEligible {
                agent_id,
                status: agent.status(),
            }
            .into());
        }

        let eligible: Vec<Commission> = commission::list_claimable(&mut tx, agent_id)
            .await?
            .into_iter()
            .filter(|c| period.contains(c.created_at()))
            .collect();
        debug!(agent_id, %period, eligible = eligible.len(), "Selected commissions for payout");

        let payout = Payout::from_commissions(agent_id, period, &eligible, now)?;
        let payout = payout::insert(&mut tx, payout).await?;

        for c in &eligible {
            if !commission::claim(&mut tx, c.id(), payout.id(), now).await? {
                warn!(commission_id = c.id(), agent_id, "Commission claimed concurrently");
                return Err(DbError::Conflict(format!(
                    "commission {} is no longer available for payout",
                    c.id()
                )));
            }
        }

        outbox::append(&mut tx, &payout.created_event(), now).await?;
        tx.commit().await?;

        info!(
            id = payout.id(),
            agent_id,
            %period,
            items = payout.item_count(),
            amount = %payout.amount(),
            "Payout created"
        );
        Ok(payout)
    }

    /// pending → processing.
    pub async fn process_payout(&self, payout_id: i64, now: DateTime<Utc>) -> DbResult<Payout> {
        let mut tx = self.begin().await?;
        let mut payout = payout::fetch_required(&mut tx, payout_id).await?;

        let event = payout.process(now)?;
        payout::save(&mut tx, &payout).await?;
        outbox::append(&mut tx, &event, now).await?;
        tx.commit().await?;

        info!(id = payout_id, "Payout processing");
        Ok(payout)
    }

    /// processing → completed. Every member commission becomes paid in the
    /// same transaction.
    pub async fn complete_payout(&self, payout_id: i64, now: DateTime<Utc>) -> DbResult<Payout> {
        let mut tx = self.begin().await?;
        let mut payout = payout::fetch_required(&mut tx, payout_id).await?;

        let event = payout.complete(now)?;

        for commission_id in payout.commission_ids() {
            let mut member = commission::fetch_required(&mut tx, commission_id).await?;
            if member.payout_id() != Some(payout_id) {
                return Err(DbError::Conflict(format!(
                    "commission {} is not held by payout {}",
                    commission_id, payout_id
                )));
            }
            let paid = member.mark_as_paid(now)?;
            commission::save(&mut tx, &member).await?;
            outbox::append(&mut tx, &paid, now).await?;
        }

        payout::save(&mut tx, &payout).await?;
        outbox::append(&mut tx, &event, now).await?;
        tx.commit().await?;

        info!(id = payout_id, amount = %payout.amount(), "Payout completed");
        Ok(payout)
    }

    /// processing → failed. The member commissions are released and can be
    /// picked up by a later payout.
    pub async fn fail_payout(&self, payout_id: i64, reason: &str, now: DateTime<Utc>) -> DbResult<Payout> {
        let mut tx = self.begin().await?;
        let mut payout = payout::fetch_required(&mut tx, payout_id).await?;

        let event = payout.fail(reason, now)?;
        payout::save(&mut tx, &payout).await?;
        let released = commission::release(&mut tx, payout_id, now).await?;
        outbox::append(&mut tx, &event, now).await?;
        tx.commit().await?;

        warn!(id = payout_id, reason = %reason, released, "Payout failed");
        Ok(payout)
    }

    /// failed → pending. Re-claims every item; fails with `Conflict` if one
    /// was paid, cancelled or claimed by another payout in the meantime.
    pub async fn retry_payout(&self, payout_id: i64, now: DateTime<Utc>) -> DbResult<Payout> {
        let mut tx = self.begin().await?;
        let mut payout = payout::fetch_required(&mut tx, payout_id).await?;

        let event = payout.retry(now)?;

        for commission_id in payout.commission_ids() {
            if !commission::claim(&mut tx, commission_id, payout_id, now).await? {
                warn!(id = payout_id, commission_id, "Payout retry lost a commission");
                return Err(DbError::Conflict(format!(
                    "commission {} is no longer available for payout {}",
                    commission_id, payout_id
                )));
            }
        }

        payout::save(&mut tx, &payout).await?;
        outbox::append(&mut tx, &event, now).await?;
        tx.commit().await?;

        info!(id = payout_id, "Payout retried");
        Ok(payout)
    }

    /// pending → cancelled. Releases the member commissions.
    pub async fn cancel_payout(&self, payout_id: i64, now: DateTime<Utc>) -> DbResult<Payout> {
        let mut tx = self.begin().await?;
        let mut payout = payout::fetch_required(&mut tx, payout_id).await?;

        let event = payout.cancel(now)?;
        payout::save(&mut tx, &payout).await?;
        let released = commission::release(&mut tx, payout_id, now).await?;
        outbox::append(&mut tx, &event, now).await?;
        tx.commit().await?;

        info!(id = payout_id, released, "Payout cancelled");
        Ok(payout)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn calculate_on(conn: &mut SqliteConnection, order: &OrderContext) -> DbResult<CommissionCalculation> {
    order.validate().map_err(CoreError::from)?;

    let agent = agent::fetch_required(conn, order.agent_id).await?;
    let team = match agent.team_id() {
        Some(team_id) => team::fetch(conn, team_id).await?,
        None => None,
    };
    let tiers = tier::list(conn, agent.id()).await?;
    let products = bonus::product_bonuses_for(conn, &order.product_ids).await?;
    let categories = bonus::category_bonuses_for(conn, agent.id(), &order.category_ids).await?;

    let input = CalculatorInput {
        agent: &agent,
        team: team.as_ref(),
        volume_tiers: &tiers,
        product_bonuses: &products,
        category_bonuses: &categories,
    };
    let calc = calculate(order, input)?;

    debug!(
        order_id = %calc.order_id,
        agent_id = calc.agent_id,
        rate = %calc.commission_rate,
        amount = %calc.commission_amount,
        tier = ?calc.tier_applied,
        bonuses = calc.breakdown.len(),
        "Commission calculated"
    );
    Ok(calc)
}

fn ensure_unclaimed(commission: &Commission) -> DbResult<()> {
    match commission.payout_id() {
        Some(payout_id) if !commission.status().is_terminal() => Err(DbError::Conflict(format!(
            "commission {} is held by payout {}",
            commission.id(),
            payout_id
        ))),
        _ => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use agent_core::{
        AgentStatus, AgentTier, BonusRate, CommissionStatus, ErrorKind, Money, PayoutStatus, Team, VolumeTier,
    };

    fn pct(v: f64) -> CommissionRate {
        CommissionRate::new(v).unwrap()
    }

    fn rm(major: i64) -> Money {
        Money::from_major_minor(major, 0)
    }

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn register(db: &Database, email: &str, rate: f64) -> Agent {
        db.ledger()
            .register_agent(
                NewAgent {
                    name: "Agent".to_string(),
                    email: email.to_string(),
                    commission_rate: Some(pct(rate)),
                    ..Default::default()
                },
                CommissionRate::DEFAULT,
                Utc::now(),
            )
            .await
            .unwrap()
    }

    /// Records an order whose commission at `rate` comes out to `commission`.
    async fn approved_commission(db: &Database, agent_id: i64, order_id: &str, commission: i64) -> Commission {
        let now = Utc::now();
        // 10% agents: subtotal = 10 × commission
        let order = OrderContext::new(order_id, agent_id, rm(commission * 10));
        let c = db.ledger().record_commission(&order, now).await.unwrap();
        db.ledger().approve_commission(c.id(), now).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_agent_writes_event() {
        let db = setup().await;
        let agent = register(&db, "reg@example.com", 5.0).await;

        assert_eq!(agent.code(), format!("AGT{:04}", agent.id()));
        let events = db.outbox().for_aggregate("agent", agent.id()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "agent.registered");
    }

    #[tokio::test]
    async fn test_record_commission_base_rate() {
        let db = setup().await;
        let agent = register(&db, "s1@example.com", 5.0).await;

        let order = OrderContext::new("ORD-1", agent.id(), rm(1_000));
        let preview = db.ledger().calculate_commission(&order).await.unwrap();
        assert_eq!(preview.commission_amount, rm(50));

        let c = db.ledger().record_commission(&order, Utc::now()).await.unwrap();
        assert_eq!(c.amount(), rm(50));
        assert_eq!(c.status(), CommissionStatus::Pending);

        let err = db.ledger().record_commission(&order, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_record_commission_uses_stored_configuration() {
        let db = setup().await;
        let now = Utc::now();
        let agent = register(&db, "cfg@example.com", 5.0).await;

        let team = db.teams().insert(Team::new("TEAM-1", "North", Some(pct(2.0)), now).unwrap()).await.unwrap();
        db.ledger().set_agent_team(agent.id(), Some(team.id), now).await.unwrap();

        db.tiers()
            .replace_for_agent(
                agent.id(),
                &[
                    VolumeTier::new("T1", rm(0), Some(rm(1_000)), pct(5.0)),
                    VolumeTier::new("T2", rm(1_000), Some(rm(5_000)), pct(7.5)),
                    VolumeTier::new("T3", rm(5_000), None, pct(10.0)),
                ],
            )
            .await
            .unwrap();
        db.bonuses().upsert_product(&BonusRate::new("P-1", "Serum", pct(1.0)), now).await.unwrap();
        db.bonuses().upsert_category(&BonusRate::new("C-1", "Skin", pct(0.5)), now).await.unwrap();

        let order = OrderContext {
            product_ids: vec!["P-1".to_string(), "P-2".to_string()],
            category_ids: vec!["C-1".to_string()],
            customer_ref: Some("CUST-9".to_string()),
            ..OrderContext::new("ORD-T", agent.id(), rm(3_500))
        };
        let c = db.ledger().record_commission(&order, now).await.unwrap();

        // (7.5% + 2% team) × 3500 = 332.50, + 1% × 3500 = 35, + 0.5% × 3500 = 17.50
        assert_eq!(c.rate(), pct(9.5));
        assert_eq!(c.amount(), Money::from_major_minor(385, 0));
        assert_eq!(c.tier_applied(), Some("T2"));
        assert_eq!(c.breakdown().len(), 2);
        assert_eq!(c.customer_ref(), Some("CUST-9"));

        let stored = db.commissions().get(c.id()).await.unwrap();
        assert_eq!(stored.breakdown(), c.breakdown());
    }

    #[tokio::test]
    async fn test_inactive_agent_cannot_earn() {
        let db = setup().await;
        let agent = register(&db, "sus@example.com", 5.0).await;
        db.ledger().suspend_agent(agent.id(), Utc::now()).await.unwrap();

        let order = OrderContext::new("ORD-S", agent.id(), rm(100));
        let err = db.ledger().record_commission(&order, Utc::now()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotEligible));
        assert!(db.commissions().get_by_order_id("ORD-S").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commission_lifecycle_credits_agent() {
        let db = setup().await;
        let now = Utc::now();
        let agent = register(&db, "life@example.com", 5.0).await;

        let c = db
            .ledger()
            .record_commission(&OrderContext::new("ORD-L", agent.id(), rm(1_000)), now)
            .await
            .unwrap();
        assert_eq!(db.agents().get(agent.id()).await.unwrap().total_earned(), Money::zero());

        db.ledger().approve_commission(c.id(), now).await.unwrap();
        assert_eq!(db.agents().get(agent.id()).await.unwrap().total_earned(), rm(50));

        let err = db.ledger().approve_commission(c.id(), now).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::StateTransition));

        let paid = db.ledger().mark_commission_paid(c.id(), now).await.unwrap();
        assert_eq!(paid.status(), CommissionStatus::Paid);
        assert_eq!(db.agents().get(agent.id()).await.unwrap().total_earned(), rm(50));

        let err = db.ledger().cancel_commission(c.id(), None, now).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::AlreadyTerminal { .. })));

        let types: Vec<String> = db
            .outbox()
            .for_aggregate("commission", c.id())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(types, vec!["commission.created", "commission.approved", "commission.paid"]);
    }

    #[tokio::test]
    async fn test_payout_from_three_commissions() {
        let db = setup().await;
        let now = Utc::now();
        let agent = register(&db, "pay@example.com", 10.0).await;

        let mut ids = Vec::new();
        for (order, amount) in [("ORD-1", 50), ("ORD-2", 75), ("ORD-3", 25)] {
            ids.push(approved_commission(&db, agent.id(), order, amount).await.id());
        }

        let payout = db.ledger().create_payout(agent.id(), PayoutPeriod::current(now), now).await.unwrap();
        assert_eq!(payout.amount(), rm(150));
        assert_eq!(payout.item_count(), 3);
        assert_eq!(db.commissions().list_claimed_by(payout.id()).await.unwrap().len(), 3);

        // Claimed commissions cannot be settled on their own.
        let err = db.ledger().mark_commission_paid(ids[0], now).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));

        db.ledger().process_payout(payout.id(), now).await.unwrap();
        let done = db.ledger().complete_payout(payout.id(), now).await.unwrap();
        assert_eq!(done.status(), PayoutStatus::Completed);
        assert!(done.paid_at().is_some());

        for id in ids {
            let c = db.commissions().get(id).await.unwrap();
            assert_eq!(c.status(), CommissionStatus::Paid);
            assert_eq!(c.payout_id(), Some(payout.id()));
        }
    }

    #[tokio::test]
    async fn test_no_double_inclusion() {
        let db = setup().await;
        let now = Utc::now();
        let agent = register(&db, "dbl@example.com", 10.0).await;
        approved_commission(&db, agent.id(), "ORD-D", 40).await;

        let period = PayoutPeriod::current(now);
        db.ledger().create_payout(agent.id(), period, now).await.unwrap();

        let err = db.ledger().create_payout(agent.id(), period, now).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::NoCommissions { .. })));
    }

    #[tokio::test]
    async fn test_payout_period_and_pending_filtering() {
        let db = setup().await;
        let now = Utc::now();
        let agent = register(&db, "per@example.com", 10.0).await;
        // Pending commissions never qualify.
        db.ledger()
            .record_commission(&OrderContext::new("ORD-P", agent.id(), rm(100)), now)
            .await
            .unwrap();
        approved_commission(&db, agent.id(), "ORD-A", 10).await;

        let err = db
            .ledger()
            .create_payout(agent.id(), PayoutPeriod::current(now).previous(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::NoCommissions { .. })));

        let payout = db.ledger().create_payout(agent.id(), PayoutPeriod::current(now), now).await.unwrap();
        assert_eq!(payout.item_count(), 1);
        assert_eq!(payout.amount(), rm(10));
    }

    #[tokio::test]
    async fn test_fail_releases_and_retry_reclaims() {
        let db = setup().await;
        let now = Utc::now();
        let agent = register(&db, "retry@example.com", 10.0).await;
        let c = approved_commission(&db, agent.id(), "ORD-R", 30).await;
        let period = PayoutPeriod::current(now);

        let payout = db.ledger().create_payout(agent.id(), period, now).await.unwrap();
        db.ledger().process_payout(payout.id(), now).await.unwrap();
        let failed = db.ledger().fail_payout(payout.id(), "bank rejected", now).await.unwrap();
        assert_eq!(failed.failure_reason(), Some("bank rejected"));
        assert_eq!(db.commissions().get(c.id()).await.unwrap().payout_id(), None);

        let retried = db.ledger().retry_payout(payout.id(), now).await.unwrap();
        assert_eq!(retried.status(), PayoutStatus::Pending);
        assert_eq!(db.commissions().get(c.id()).await.unwrap().payout_id(), Some(payout.id()));

        // Failing again and letting a fresh payout take the commission makes
        // the old one unretryable.
        db.ledger().process_payout(payout.id(), now).await.unwrap();
        db.ledger().fail_payout(payout.id(), "timeout", now).await.unwrap();
        let fresh = db.ledger().create_payout(agent.id(), period, now).await.unwrap();
        assert_eq!(fresh.commission_ids(), vec![c.id()]);

        let err = db.ledger().retry_payout(payout.id(), now).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        assert_eq!(db.payouts().get(payout.id()).await.unwrap().status(), PayoutStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_payout_releases_commissions() {
        let db = setup().await;
        let now = Utc::now();
        let agent = register(&db, "cxl@example.com", 10.0).await;
        let c = approved_commission(&db, agent.id(), "ORD-C", 20).await;

        let payout = db.ledger().create_payout(agent.id(), PayoutPeriod::current(now), now).await.unwrap();
        db.ledger().cancel_payout(payout.id(), now).await.unwrap();
        assert_eq!(db.commissions().get(c.id()).await.unwrap().payout_id(), None);

        let err = db.ledger().cancel_payout(payout.id(), now).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::AlreadyTerminal { .. })));

        // Released commissions can be cancelled directly again.
        let cancelled = db
            .ledger()
            .cancel_commission(c.id(), Some("returned".to_string()), now)
            .await
            .unwrap();
        assert_eq!(cancelled.cancel_reason(), Some("returned"));
    }

    #[tokio::test]
    async fn test_payout_requires_active_agent() {
        let db = setup().await;
        let now = Utc::now();
        let agent = register(&db, "inact@example.com", 10.0).await;
        approved_commission(&db, agent.id(), "ORD-I", 10).await;
        db.ledger().deactivate_agent(agent.id(), now).await.unwrap();

        let err = db
            .ledger()
            .create_payout(agent.id(), PayoutPeriod::current(now), now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::AgentNotEligible { status: AgentStatus::Inactive, .. })
        ));
    }

    #[tokio::test]
    async fn test_promote_agent() {
        let db = setup().await;
        let agent = register(&db, "promo@example.com", 5.0).await;

        let promoted = db.ledger().promote_agent(agent.id(), Utc::now()).await.unwrap();
        assert_eq!(promoted.tier(), AgentTier::Silver);
        assert_eq!(db.agents().get(agent.id()).await.unwrap().tier(), AgentTier::Silver);

        let err = db.ledger().promote_agent(999, Utc::now()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_recorded_amount_survives_rate_and_tier_changes() {
        let db = setup().await;
        let now = Utc::now();
        let agent = register(&db, "freeze@example.com", 5.0).await;

        let c = db
            .ledger()
            .record_commission(&OrderContext::new("ORD-F1", agent.id(), rm(1_000)), now)
            .await
            .unwrap();
        assert_eq!(c.amount(), rm(50));

        db.ledger().promote_agent(agent.id(), now).await.unwrap();
        let mut changed = db.agents().get(agent.id()).await.unwrap();
        changed.set_commission_rate(pct(12.0), now);
        db.agents().update(&changed).await.unwrap();

        let stored = db.commissions().get(c.id()).await.unwrap();
        assert_eq!(stored.amount(), rm(50));
        assert_eq!(stored.rate(), pct(5.0));

        // New orders pick up the new configuration: 12% + 1% silver bonus.
        let next = db
            .ledger()
            .record_commission(&OrderContext::new("ORD-F2", agent.id(), rm(1_000)), now)
            .await
            .unwrap();
        assert_eq!(next.rate(), pct(13.0));
        assert_eq!(next.amount(), rm(130));

        let approved = db.ledger().approve_commission(c.id(), now).await.unwrap();
        assert_eq!(approved.amount(), rm(50));
        assert_eq!(db.agents().get(agent.id()).await.unwrap().total_earned(), rm(50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payouts_never_share_a_commission() {
        let path = std::env::temp_dir().join(format!("agent-ledger-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(8)).await.unwrap();
        let now = Utc::now();
        let agent = register(&db, "race@example.com", 10.0).await;
        for n in 0..20 {
            approved_commission(&db, agent.id(), &format!("ORD-RACE-{:02}", n), 10).await;
        }

        let period = PayoutPeriod::current(now);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = db.ledger();
                let agent_id = agent.id();
                tokio::spawn(async move { ledger.create_payout(agent_id, period, now).await })
            })
            .collect();

        let mut created = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(payout) => created.push(payout),
                Err(DbError::Domain(CoreError::NoCommissions { .. })) | Err(DbError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].item_count(), 20);
        assert_eq!(created[0].amount(), rm(200));

        let (items, distinct): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT commission_id) FROM payout_items")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!((items, distinct), (20, 20));

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
