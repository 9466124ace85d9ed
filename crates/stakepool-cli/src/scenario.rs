//! Scripted pool simulations
//!
//! A scenario names its participants, their starting LP balances and a
//! list of timed actions. Actions are replayed in file order against
//! in-memory tokens through a [`SharedPool`] driven by a manual clock.
//!
//! ```toml
//! [pool]
//! total_reward_pool = "1000"
//! expiration_days = 200
//!
//! [[participants]]
//! name = "alice"
//! address = "0xa1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1a1"
//! balance = "250"
//!
//! [[actions]]
//! day = 0
//! action = "stake"
//! participant = "alice"
//! amount = "250"
//!
//! [[actions]]
//! day = 60
//! action = "unstake"
//! participant = "alice"
//! ```

use crate::settings::PoolSettings;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use stakepool_core::prelude::*;
use stakepool_economics::{FungibleAsset, InMemoryToken, LedgerSnapshot, PoolRegistry, SharedPool};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Base-unit amount accepting TOML strings
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAmount(#[serde(with = "stakepool_core::amount_serde")] pub Amount);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub address: Address,
    /// Starting LP balance
    pub balance: TokenAmount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    Stake {
        participant: String,
        amount: TokenAmount,
    },
    StakeFor {
        sponsor: String,
        beneficiary: String,
        amount: TokenAmount,
    },
    /// Withdraws the whole stake when `amount` is omitted
    Unstake {
        participant: String,
        #[serde(default)]
        amount: Option<TokenAmount>,
    },
    WithdrawLeftover,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    /// Days after initialization
    pub day: i64,
    /// Extra seconds on top of `day`
    #[serde(default)]
    pub offset_secs: i64,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    pub fn at(&self, start: Timestamp) -> anyhow::Result<Timestamp> {
        self.day
            .checked_mul(DAY_SECS)
            .and_then(|secs| start.checked_add(secs))
            .and_then(|t| t.checked_add(self.offset_secs))
            .with_context(|| format!("action on day {} is out of range", self.day))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub pool: PoolSettings,
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Scenario {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let scenario: Self = toml::from_str(text).context("invalid scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut names = BTreeMap::new();
        for p in &self.participants {
            if names.insert(p.name.as_str(), p.address).is_some() {
                bail!("participant {:?} declared twice", p.name);
            }
        }
        for action in &self.actions {
            let referenced: Vec<&String> = match &action.kind {
                ActionKind::Stake { participant, .. } | ActionKind::Unstake { participant, .. } => {
                    vec![participant]
                }
                ActionKind::StakeFor {
                    sponsor, beneficiary, ..
                } => vec![sponsor, beneficiary],
                ActionKind::WithdrawLeftover => Vec::new(),
            };
            for name in referenced {
                if !names.contains_key(name.as_str()) {
                    bail!("action on day {} references unknown participant {name:?}", action.day);
                }
            }
        }
        Ok(())
    }

    fn address_of(&self, name: &str) -> anyhow::Result<Address> {
        self.participants
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.address)
            .with_context(|| format!("unknown participant {name:?}"))
    }
}

/// Outcome of one replayed action
#[derive(Clone, Debug, Serialize)]
pub struct StepOutcome {
    pub timestamp: Timestamp,
    pub description: String,
    /// Reward paid by an unstake or amount swept by a withdrawal
    pub paid: Option<Amount>,
    /// Error code and message when the pool rejected the action
    pub rejected: Option<(u32, String)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ParticipantSummary {
    pub name: String,
    pub address: Address,
    pub staked: Amount,
    pub lp_balance: Amount,
    pub reward_paid: Amount,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulationReport {
    pub pool: PoolId,
    pub start: Timestamp,
    pub steps: Vec<StepOutcome>,
    pub participants: Vec<ParticipantSummary>,
    pub total_reward_pool: Amount,
    pub total_reward_paid: Amount,
    pub leftover_withdrawn: Amount,
    pub remaining_reward_pool: Amount,
    /// Ledger invariants held after the last action
    pub conserved: bool,
    #[serde(skip)]
    pub snapshot: Option<LedgerSnapshot>,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pool {} started at {}", self.pool, self.start)?;
        writeln!(f)?;
        for step in &self.steps {
            write!(f, "  t+{:>9}s  {}", step.timestamp - self.start, step.description)?;
            if let Some(paid) = step.paid {
                write!(f, " -> {paid}")?;
            }
            if let Some((code, message)) = &step.rejected {
                write!(f, " REJECTED [{code}] {message}")?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;
        writeln!(f, "{:<12} {:>28} {:>28} {:>28}", "participant", "staked", "lp balance", "reward paid")?;
        for p in &self.participants {
            writeln!(
                f,
                "{:<12} {:>28} {:>28} {:>28}",
                p.name, p.staked, p.lp_balance, p.reward_paid
            )?;
        }
        writeln!(f)?;
        writeln!(f, "reward pool:   {}", self.total_reward_pool)?;
        writeln!(f, "paid:          {}", self.total_reward_paid)?;
        writeln!(f, "swept:         {}", self.leftover_withdrawn)?;
        writeln!(f, "remaining:     {}", self.remaining_reward_pool)?;
        write!(
            f,
            "conservation:  {}",
            if self.conserved { "ok" } else { "VIOLATED" }
        )
    }
}

/// Replay `scenario` starting at `start`
pub fn run(scenario: &Scenario, start: Timestamp) -> anyhow::Result<SimulationReport> {
    let settings = &scenario.pool;
    let config = settings.configuration(start);

    let lp = InMemoryToken::shared(config.staking_token, "LP");
    let reward = InMemoryToken::shared(config.reward_token, "REWARD");
    reward.mint(config.owner, config.total_reward_pool)?;
    reward.approve(config.owner, config.ledger_address, config.total_reward_pool);
    for p in &scenario.participants {
        lp.mint(p.address, p.balance.0)?;
        lp.approve(p.address, config.ledger_address, Amount::MAX);
    }

    let clock = Arc::new(ManualClock::new(start));
    let registry = PoolRegistry::new(clock.clone());
    let pool = registry.create_pool(settings.pool_id(), config.clone(), lp.clone(), reward.clone())?;
    pool.initialize(config.owner)?;

    let mut steps = Vec::with_capacity(scenario.actions.len());
    for action in &scenario.actions {
        let timestamp = action.at(start)?;
        clock.set(timestamp);
        steps.push(apply(scenario, &pool, action, timestamp)?);
    }

    let conserved = pool.with_ledger(|l| l.check_invariants()).is_ok();
    let snapshot = pool.snapshot();
    let participants = scenario
        .participants
        .iter()
        .map(|p| ParticipantSummary {
            name: p.name.clone(),
            address: p.address,
            staked: pool.total_staked_for(p.address),
            lp_balance: lp.balance_of(p.address),
            reward_paid: snapshot
                .accounts
                .get(&p.address)
                .map(|a| a.cumulative_reward_paid)
                .unwrap_or(0),
        })
        .collect();

    Ok(SimulationReport {
        pool: pool.id().clone(),
        start,
        steps,
        participants,
        total_reward_pool: config.total_reward_pool,
        total_reward_paid: pool.with_ledger(|l| l.total_reward_paid()),
        leftover_withdrawn: snapshot.leftover_withdrawn,
        remaining_reward_pool: snapshot.remaining_reward_pool,
        conserved,
        snapshot: Some(snapshot),
    })
}

fn apply(
    scenario: &Scenario,
    pool: &SharedPool,
    action: &Action,
    timestamp: Timestamp,
) -> anyhow::Result<StepOutcome> {
    let (description, result) = match &action.kind {
        ActionKind::Stake { participant, amount } => {
            let who = scenario.address_of(participant)?;
            (
                format!("{participant} stakes {}", amount.0),
                pool.stake(who, amount.0).map(|_| None),
            )
        }
        ActionKind::StakeFor {
            sponsor,
            beneficiary,
            amount,
        } => {
            let from = scenario.address_of(sponsor)?;
            let to = scenario.address_of(beneficiary)?;
            (
                format!("{sponsor} stakes {} for {beneficiary}", amount.0),
                pool.stake_for(from, to, amount.0).map(|_| None),
            )
        }
        ActionKind::Unstake { participant, amount } => {
            let who = scenario.address_of(participant)?;
            let amount = match amount {
                Some(a) => a.0,
                None => pool.total_staked_for(who),
            };
            (
                format!("{participant} unstakes {amount}"),
                pool.unstake(who, amount).map(|r| Some(r.reward)),
            )
        }
        ActionKind::WithdrawLeftover => (
            "owner withdraws leftover".to_string(),
            pool.withdraw_leftover().map(Some),
        ),
    };

    let (paid, rejected) = match result {
        Ok(paid) => (paid, None),
        Err(e) => {
            tracing::warn!(error = %e, code = e.code(), "{description} rejected");
            (None, Some((e.code(), e.to_string())))
        }
    };
    Ok(StepOutcome {
        timestamp,
        description,
        paid,
        rejected,
    })
}
