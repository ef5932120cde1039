//! # agent-core: Pure Commission Logic
//!
//! The rules that turn an attributed order into a commission, move
//! commissions and payouts through their lifecycles, and roll them up into
//! reports. Nothing in here touches a database, a socket or a file.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   order service ──► OrderContext                                        │
//! │                          │                                              │
//! │  ┌───────────────────────▼─────────────────────────────────────────┐   │
//! │  │               ★ agent-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐ │   │
//! │  │   │ calculator │  │ commission │  │   payout   │  │ reporting│ │   │
//! │  │   │ tiers      │  │ state      │  │ state      │  │ dashboard│ │   │
//! │  │   │ bonuses    │  │ machine    │  │ machine    │  │ monthly  │ │   │
//! │  │   └────────────┘  └────────────┘  └────────────┘  └──────────┘ │   │
//! │  │   ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐ │   │
//! │  │   │   agent    │  │    team    │  │ money/rate │  │  status  │ │   │
//! │  │   └────────────┘  └────────────┘  └────────────┘  └──────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └───────────────────────┬─────────────────────────────────────────┘   │
//! │                          │                                              │
//! │  ┌───────────────────────▼─────────────────────────────────────────┐   │
//! │  │                agent-db (Persistence Layer)                      │   │
//! │  │        SQLite, migrations, repositories, ledger transactions     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **Integer Money**: amounts are minor units (`i64`), rates are basis points
//! 2. **Closed Status Enums**: statuses are parsed at the boundary, never strings inside
//! 3. **Events Are Return Values**: every mutation hands back the event it produced
//! 4. **Explicit Time**: operations take `now`, so tests are deterministic
//!
//! ## Example Usage
//!
//! ```rust
//! use agent_core::{calculate, Agent, CalculatorInput, CommissionRate, Money, NewAgent, OrderContext};
//! use chrono::Utc;
//!
//! let new = NewAgent {
//!     name: "Aina".to_string(),
//!     email: "aina@example.com".to_string(),
//!     commission_rate: Some(CommissionRate::new(5.0).unwrap()),
//!     ..Default::default()
//! };
//! let agent = Agent::register(new, CommissionRate::DEFAULT, Utc::now()).unwrap().with_id(1);
//!
//! let order = OrderContext::new("ORD-1001", 1, Money::from_major_minor(1000, 0));
//! let calc = calculate(&order, CalculatorInput::new(&agent)).unwrap();
//!
//! assert_eq!(calc.commission_amount, Money::from_major_minor(50, 0));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod calculator;
pub mod commission;
pub mod error;
pub mod money;
pub mod payout;
pub mod rate;
pub mod reporting;
pub mod status;
pub mod team;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use agent::{default_agent_code, Agent, AgentEvent, AgentParts, NewAgent};
pub use calculator::{
    calculate, select_tier, validate_tiers, BonusKind, BonusRate, BreakdownItem, CalculatorInput,
    CommissionCalculation, OrderContext, VolumeTier,
};
pub use commission::{Commission, CommissionEvent, CommissionParts, NewCommission};
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use payout::{Payout, PayoutEvent, PayoutItem, PayoutParts, PayoutPeriod};
pub use rate::{AgentTier, CommissionRate};
pub use reporting::{
    distinct_customers, monthly_performance, AgentStats, CommissionBreakdown, CommissionBucket, CommissionFact,
    CommissionStats, Dashboard, MonthlyPerformance,
};
pub use status::{AgentStatus, CommissionStatus, PayoutStatus};
pub use team::Team;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Rate given to agents registered without one, in percent.
pub const DEFAULT_COMMISSION_RATE: f64 = 10.0;

/// Length of the monthly performance series.
pub const MONTHLY_PERFORMANCE_WINDOW: usize = 12;
