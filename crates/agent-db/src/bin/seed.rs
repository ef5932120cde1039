//! # Seed Data Generator
//!
//! Populates the database with agents and commissions for development.
//!
//! ## Usage
//! ```bash
//! # Register 20 agents (default)
//! cargo run -p agent-db --bin seed
//!
//! # Register a custom number of agents
//! cargo run -p agent-db --bin seed -- --agents 100
//!
//! # Specify database path (overrides agent.toml / AGENT_DB_PATH)
//! cargo run -p agent-db --bin seed -- --db ./data/agent.db
//! ```
//!
//! ## Generated Data
//! - One team, "North Region", with a 1% boost
//! - Agents spread across the four tiers, every third one on the team
//! - Two volume tiers for the first agent
//! - Product and category bonus tables
//! - A handful of orders per agent; most commissions approved

use agent_core::{
    AgentStatus, AgentTier, BonusRate, CommissionRate, Money, NewAgent, OrderContext, Team, VolumeTier,
};
use agent_db::telemetry::init_tracing;
use agent_db::{Database, ServiceConfig};
use chrono::Utc;
use std::env;
use tracing::{info, warn};

/// Product catalogue for bonus rows and generated orders: (id, name, bonus bps)
const PRODUCTS: &[(&str, &str, u32)] = &[
    ("SKU-SERUM-30", "Glow Serum 30ml", 200),
    ("SKU-TONER-100", "Balancing Toner 100ml", 0),
    ("SKU-MASK-5", "Clay Mask 5-pack", 150),
    ("SKU-SPF-50", "Daily SPF 50", 0),
];

/// Category bonus rows: (id, name, bonus bps)
const CATEGORIES: &[(&str, &str, u32)] = &[("CAT-SKINCARE", "Skincare", 100), ("CAT-SUNCARE", "Suncare", 50)];

const FIRST_NAMES: &[&str] = &["Aina", "Farid", "Mei Ling", "Ravi", "Siti", "Daniel", "Nurul", "Kumar"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut agents: usize = 20;
    let mut db_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--agents" | "-a" => {
                if i + 1 < args.len() {
                    agents = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Agent Commission Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -a, --agents <N>   Number of agents to register (default: 20)");
                println!("  -d, --db <PATH>    Database file path (default: from agent.toml)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = ServiceConfig::load_or_default(None);
    if let Some(path) = db_path {
        config.database.path = path.into();
    }
    init_tracing(&config.logging);

    let default_rate = config.commission.default_commission_rate()?;

    println!("Agent Commission Seed Data Generator");
    println!("====================================");
    println!("Database: {}", config.database.path.display());
    println!("Agents:   {}", agents);
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.agents().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} agents", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();

    // Team
    let team = Team::new("NORTH", "North Region", Some(CommissionRate::from_bps(100)?), now)?;
    let team = db.teams().insert(team).await?;
    println!("✓ Created team {}", team.code);

    // Bonus tables
    for (id, name, bps) in PRODUCTS.iter().filter(|(_, _, bps)| *bps > 0) {
        db.bonuses()
            .upsert_product(&BonusRate::new(*id, *name, CommissionRate::from_bps(*bps)?), now)
            .await?;
    }
    for (id, name, bps) in CATEGORIES {
        db.bonuses()
            .upsert_category(&BonusRate::new(*id, *name, CommissionRate::from_bps(*bps)?), now)
            .await?;
    }
    println!("✓ Configured product and category bonuses");

    // Agents and their orders
    let start = std::time::Instant::now();
    let mut registered = 0;
    let mut commissions = 0;

    for n in 0..agents {
        let first = FIRST_NAMES[n % FIRST_NAMES.len()];
        let new = NewAgent {
            name: format!("{} {:03}", first, n + 1),
            email: format!("{}.{:03}@example.com", first.to_lowercase().replace(' ', ""), n + 1),
            phone: Some(format!("+6012{:07}", n)),
            tier: Some(AgentTier::ALL[n % AgentTier::ALL.len()]),
            status: Some(AgentStatus::Active),
            team_id: (n % 3 == 0).then_some(team.id),
            ..Default::default()
        };

        let agent = match db.ledger().register_agent(new, default_rate, now).await {
            Ok(agent) => agent,
            Err(e) => {
                warn!(error = %e, index = n, "Failed to register agent");
                continue;
            }
        };
        registered += 1;

        if n == 0 {
            db.tiers()
                .replace_for_agent(
                    agent.id(),
                    &[
                        VolumeTier::new("Starter", Money::zero(), Some(Money::from_major_minor(1_000, 0)), default_rate),
                        VolumeTier::new("Volume", Money::from_major_minor(1_000, 0), None, CommissionRate::from_bps(1_200)?),
                    ],
                )
                .await?;
        }

        for k in 0..(3 + n % 4) {
            let (product_id, _, _) = PRODUCTS[(n + k) % PRODUCTS.len()];
            let (category_id, _, _) = CATEGORIES[k % CATEGORIES.len()];
            let subtotal = Money::from_cents(5_000 + ((n * 37 + k * 113) % 200) as i64 * 1_000);

            let order = OrderContext {
                customer_ref: Some(format!("CUST-{:04}", (n * 7 + k) % 50)),
                order_total: subtotal,
                product_ids: vec![product_id.to_string()],
                category_ids: vec![category_id.to_string()],
                ..OrderContext::new(format!("ORD-{:04}-{:02}", n + 1, k + 1), agent.id(), subtotal)
            };

            let commission = db.ledger().record_commission(&order, now).await?;
            commissions += 1;

            // Leave the latest order of each agent pending
            if k > 0 {
                db.ledger().approve_commission(commission.id(), now).await?;
            }
        }
    }

    let elapsed = start.elapsed();
    info!(registered, commissions, ?elapsed, "Seed complete");

    println!();
    println!("✓ Registered {} agents in {:?}", registered, elapsed);
    println!("✓ Recorded {} commissions", commissions);
    println!("  Outbox entries pending: {}", db.outbox().count_pending().await?);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}
