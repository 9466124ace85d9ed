//! Ledger events
//!
//! Each committed mutation appends one event, numbered per pool.

use crate::schedule::{RewardRatios, RewardSchedule};
use serde::{Deserialize, Serialize};
use stakepool_core::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEventKind {
    Initialized {
        schedule: RewardSchedule,
        funded: Amount,
    },
    Staked {
        sponsor: Address,
        beneficiary: Address,
        amount: Amount,
        total_staked: Amount,
    },
    Unstaked {
        participant: Address,
        amount: Amount,
        reward: Amount,
        ratios: RewardRatios,
        total_staked: Amount,
    },
    LeftoverWithdrawn {
        to: Address,
        amount: Amount,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Position in the pool's event log, starting at 0
    pub sequence: u64,
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub kind: LedgerEventKind,
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self.kind {
            LedgerEventKind::Initialized { .. } => "initialized",
            LedgerEventKind::Staked { .. } => "staked",
            LedgerEventKind::Unstaked { .. } => "unstaked",
            LedgerEventKind::LeftoverWithdrawn { .. } => "leftover_withdrawn",
        }
    }
}
