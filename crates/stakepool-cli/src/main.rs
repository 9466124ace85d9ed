//! Stakepool CLI
//!
//! Command-line interface for inspecting reward schedules, replaying
//! staking scenarios and reading stored pool snapshots.

mod scenario;
mod settings;

use anyhow::Context;
use clap::{Parser, Subcommand};
use settings::{AppConfig, LoggingConfig};
use stakepool_core::prelude::*;
use stakepool_economics::{RewardSchedule, SchedulePhase};
use stakepool_storage::{JsonFileStore, PoolStore};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "stakepool")]
#[command(version)]
#[command(about = "Time-weighted, penalty-adjusted LP staking pools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STAKEPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print reward and penalty ratios over the pool lifetime
    Schedule {
        /// Days between rows
        #[arg(long, default_value = "7")]
        step_days: i64,

        /// Pool start (unix seconds); overrides the configured start
        #[arg(long)]
        start: Option<Timestamp>,
    },

    /// Replay a scripted scenario on in-memory tokens
    Simulate {
        /// Scenario file (TOML)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Pool start (unix seconds); defaults to the scenario's start or now
        #[arg(long)]
        start: Option<Timestamp>,

        /// Commit the final ledger state to this store directory
        #[arg(long)]
        store: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show pools held in a store directory
    Inspect {
        /// Store directory
        #[arg(long)]
        store: PathBuf,

        /// Pool to print; lists stored pools when omitted
        pool: Option<String>,
    },
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_ansi(logging.color)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// `(day, timestamp)` rows from the window start through the first expired row
fn schedule_rows(schedule: &RewardSchedule, step_days: i64) -> anyhow::Result<Vec<(i64, Timestamp)>> {
    anyhow::ensure!(step_days > 0, "--step-days must be positive");
    let start = schedule.staking_window_start;
    let mut rows = Vec::new();
    let mut day: i64 = 0;
    loop {
        let now = day
            .checked_mul(DAY_SECS)
            .and_then(|secs| start.checked_add(secs))
            .with_context(|| format!("day {day} after {start} is out of range"))?;
        rows.push((day, now));
        if schedule.phase(now) == SchedulePhase::Expired {
            return Ok(rows);
        }
        day = day
            .checked_add(step_days)
            .with_context(|| format!("day {day} plus {step_days} is out of range"))?;
    }
}

fn print_schedule(schedule: &RewardSchedule, step_days: i64) -> anyhow::Result<()> {
    let rows = schedule_rows(schedule, step_days)?;
    let start = schedule.staking_window_start;
    println!("staking window: {} .. {}", start, schedule.staking_window_end);
    println!("penalty window: {} .. {}", schedule.staking_window_end, schedule.penalty_window_end);
    println!("expiration:     {}", schedule.pool_expiration);
    println!();
    println!("{:>5}  {:<10} {:>22} {:>22} {:>10}", "day", "phase", "reward", "penalty", "payout");

    for (day, now) in rows {
        let ratios = schedule.ratios(now);
        let payout = ratios.reward.as_f64() * ratios.penalty.complement().as_f64();
        println!(
            "{:>5}  {:<10} {:>22} {:>22} {:>9.4}%",
            day,
            schedule.phase(now).name(),
            ratios.reward.to_string(),
            ratios.penalty.to_string(),
            payout * 100.0
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app = AppConfig::load(cli.config.as_deref())?;
    init_logging(&app.logging, cli.verbose);

    match cli.command {
        Commands::Schedule { step_days, start } => {
            let start = start
                .or(app.pool.start)
                .unwrap_or_else(|| SystemClock.now());
            let schedule = app.pool.schedule(start)?;
            tracing::debug!(pool = %app.pool.id, start = schedule.staking_window_start, "schedule computed");
            print_schedule(&schedule, step_days)?;
        }

        Commands::Simulate {
            scenario: path,
            start,
            store,
            json,
        } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let parsed = scenario::Scenario::from_toml(&text)?;
            let start = start
                .or(parsed.pool.start)
                .unwrap_or_else(|| SystemClock.now());

            tracing::info!(scenario = %path.display(), actions = parsed.actions.len(), "replaying scenario");
            let report = scenario::run(&parsed, start)?;

            if let (Some(dir), Some(snapshot)) = (store, report.snapshot.as_ref()) {
                let store = JsonFileStore::open(&dir)?;
                store.commit(&report.pool, snapshot)?;
                tracing::info!(pool = %report.pool, dir = %dir.display(), "snapshot stored");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
            anyhow::ensure!(report.conserved, "ledger invariants violated");
        }

        Commands::Inspect { store, pool } => {
            let store = JsonFileStore::open(&store)?;
            match pool {
                None => {
                    for id in store.ids()? {
                        println!("{id}");
                    }
                }
                Some(id) => {
                    let id = PoolId::new(id);
                    let snapshot = store
                        .load(&id)?
                        .ok_or_else(|| StakingError::PoolNotFound(id.clone()))?;
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                }
            }
        }
    }

    Ok(())
}
