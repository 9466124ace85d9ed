//! # Stakepool Storage
//!
//! Durable images of staking ledgers.
//!
//! ## Record Layout
//!
//! - one `PoolRecord` per pool - configuration, schedule and aggregates
//! - one `ParticipantRecord` per (pool, participant) pair
//!
//! A commit replaces the pool record and all of its participant records in
//! a single step, so a reader never observes a pool record paired with
//! participant records from a different commit.

use serde::{Deserialize, Serialize};
use stakepool_core::prelude::*;
use stakepool_economics::{LedgerSnapshot, ParticipantAccount, PoolConfiguration, RewardSchedule};

pub use file_db::JsonFileStore;
pub use memory_db::MemoryStore;

/// Backend able to persist ledger snapshots
pub trait PoolStore: Send + Sync {
    /// Replace everything stored for `id` with `snapshot`
    fn commit(&self, id: &PoolId, snapshot: &LedgerSnapshot) -> Result<()>;

    /// Last committed snapshot, if any
    fn load(&self, id: &PoolId) -> Result<Option<LedgerSnapshot>>;

    /// Identifiers of every stored pool, sorted
    fn ids(&self) -> Result<Vec<PoolId>>;
}

/// Pool-level portion of a snapshot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub config: PoolConfiguration,
    pub schedule: Option<RewardSchedule>,
    pub total_staked: Amount,
    pub remaining_reward_pool: Amount,
    pub leftover_withdrawn: Amount,
    pub next_sequence: u64,
}

/// One participant's account within a pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub participant: Address,
    pub account: ParticipantAccount,
}

/// Split a snapshot into its pool record and participant records
pub fn split(snapshot: &LedgerSnapshot) -> (PoolRecord, Vec<ParticipantRecord>) {
    let pool = PoolRecord {
        config: snapshot.config.clone(),
        schedule: snapshot.schedule,
        total_staked: snapshot.total_staked,
        remaining_reward_pool: snapshot.remaining_reward_pool,
        leftover_withdrawn: snapshot.leftover_withdrawn,
        next_sequence: snapshot.next_sequence,
    };
    let participants = snapshot
        .accounts
        .iter()
        .map(|(participant, account)| ParticipantRecord {
            participant: *participant,
            account: account.clone(),
        })
        .collect();
    (pool, participants)
}

/// Reassemble a snapshot from its records
pub fn join(pool: PoolRecord, participants: impl IntoIterator<Item = ParticipantRecord>) -> LedgerSnapshot {
    LedgerSnapshot {
        config: pool.config,
        schedule: pool.schedule,
        accounts: participants
            .into_iter()
            .map(|r| (r.participant, r.account))
            .collect(),
        total_staked: pool.total_staked,
        remaining_reward_pool: pool.remaining_reward_pool,
        leftover_withdrawn: pool.leftover_withdrawn,
        next_sequence: pool.next_sequence,
    }
}

pub mod memory_db {
    //! In-process store, one table per record kind

    use super::*;
    use parking_lot::RwLock;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Default)]
    struct Tables {
        pools: HashMap<PoolId, PoolRecord>,
        participants: BTreeMap<(PoolId, Address), ParticipantAccount>,
    }

    /// Store backed by process memory
    #[derive(Default)]
    pub struct MemoryStore {
        tables: RwLock<Tables>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of participant records held for `id`
        pub fn participant_count(&self, id: &PoolId) -> usize {
            self.tables
                .read()
                .participants
                .keys()
                .filter(|(pool, _)| pool == id)
                .count()
        }
    }

    impl PoolStore for MemoryStore {
        fn commit(&self, id: &PoolId, snapshot: &LedgerSnapshot) -> Result<()> {
            let (pool, participants) = split(snapshot);
            let mut tables = self.tables.write();

            tables.participants.retain(|(pool_id, _), _| pool_id != id);
            for record in participants {
                tables
                    .participants
                    .insert((id.clone(), record.participant), record.account);
            }
            tables.pools.insert(id.clone(), pool);
            tracing::debug!(pool = %id, accounts = snapshot.accounts.len(), "snapshot committed");
            Ok(())
        }

        fn load(&self, id: &PoolId) -> Result<Option<LedgerSnapshot>> {
            let tables = self.tables.read();
            let Some(pool) = tables.pools.get(id) else {
                return Ok(None);
            };
            let participants = tables
                .participants
                .iter()
                .filter(|((pool_id, _), _)| pool_id == id)
                .map(|((_, participant), account)| ParticipantRecord {
                    participant: *participant,
                    account: account.clone(),
                });
            Ok(Some(join(pool.clone(), participants)))
        }

        fn ids(&self) -> Result<Vec<PoolId>> {
            let mut ids: Vec<_> = self.tables.read().pools.keys().cloned().collect();
            ids.sort();
            Ok(ids)
        }
    }
}

pub mod file_db {
    //! One JSON document per pool, replaced atomically via rename

    use super::*;
    use std::fs;
    use std::path::{Path, PathBuf};

    const EXTENSION: &str = "json";

    #[derive(Serialize, Deserialize)]
    struct Document {
        pool: PoolRecord,
        participants: Vec<ParticipantRecord>,
    }

    fn storage_err(context: &str, e: impl std::fmt::Display) -> StakingError {
        StakingError::Storage(format!("{context}: {e}"))
    }

    /// Store writing `<dir>/<pool-id>.json`
    pub struct JsonFileStore {
        dir: PathBuf,
    }

    impl JsonFileStore {
        /// Open (creating if needed) a store rooted at `dir`
        pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
            let dir = dir.into();
            fs::create_dir_all(&dir).map_err(|e| storage_err(&format!("create {}", dir.display()), e))?;
            Ok(Self { dir })
        }

        pub fn dir(&self) -> &Path {
            &self.dir
        }

        fn path_for(&self, id: &PoolId) -> Result<PathBuf> {
            let name = id.as_str();
            let valid = !name.is_empty()
                && !name.starts_with('.')
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
            if !valid {
                return Err(StakingError::Storage(format!("pool id {name:?} is not a valid file name")));
            }
            Ok(self.dir.join(format!("{name}.{EXTENSION}")))
        }
    }

    impl PoolStore for JsonFileStore {
        fn commit(&self, id: &PoolId, snapshot: &LedgerSnapshot) -> Result<()> {
            let path = self.path_for(id)?;
            let (pool, participants) = split(snapshot);
            let bytes = serde_json::to_vec_pretty(&Document { pool, participants })
                .map_err(|e| storage_err("encode snapshot", e))?;

            let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
            fs::write(&tmp, bytes).map_err(|e| storage_err(&format!("write {}", tmp.display()), e))?;
            fs::rename(&tmp, &path).map_err(|e| storage_err(&format!("rename to {}", path.display()), e))?;
            tracing::debug!(pool = %id, path = %path.display(), "snapshot committed");
            Ok(())
        }

        fn load(&self, id: &PoolId) -> Result<Option<LedgerSnapshot>> {
            let path = self.path_for(id)?;
            if !path.exists() {
                return Ok(None);
            }
            let bytes = fs::read(&path).map_err(|e| storage_err(&format!("read {}", path.display()), e))?;
            let doc: Document = serde_json::from_slice(&bytes)
                .map_err(|e| storage_err(&format!("decode {}", path.display()), e))?;
            Ok(Some(join(doc.pool, doc.participants)))
        }

        fn ids(&self) -> Result<Vec<PoolId>> {
            let entries = fs::read_dir(&self.dir).map_err(|e| storage_err(&format!("list {}", self.dir.display()), e))?;
            let mut ids = Vec::new();
            for entry in entries {
                let path = entry.map_err(|e| storage_err("list entry", e))?.path();
                if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(PoolId::from(stem));
                }
            }
            ids.sort();
            Ok(ids)
        }
    }
}
