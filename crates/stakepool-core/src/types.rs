//! Core type definitions shared by every stakepool crate.
//!
//! Token quantities are base units of an 18-decimal token held in `u128`,
//! timestamps are unix seconds, and identities are 20-byte EVM addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use alloy_primitives::Address;

/// Quantity of a fungible token in base units
pub type Amount = u128;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Decimal places of the staking and reward tokens
pub const DECIMALS: u8 = 18;

/// One whole token in base units
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000; // 10^18

/// Seconds per day
pub const DAY_SECS: i64 = 24 * 3600;

/// Length of the staking window: stake is accepted for 7 days after start
pub const STAKING_PERIOD_SECS: i64 = 7 * DAY_SECS;

/// Offset from the end of the staking window to the end of the penalty window
pub const PENALTY_PERIOD_SECS: i64 = 120 * DAY_SECS;

/// Span over which the penalty decays linearly from 100% to 0%
pub const PENALTY_DECAY_SECS: i64 = PENALTY_PERIOD_SECS - STAKING_PERIOD_SECS; // 113 days

/// Convert whole days to seconds
pub const fn days(n: i64) -> i64 {
    n * DAY_SECS
}

/// Convert whole tokens to base units
pub const fn tokens(n: u128) -> Amount {
    n * ONE_TOKEN
}

/// PoolId - Human-readable handle of a staking pool within a registry
///
/// Pools are deployed per liquidity pair, e.g. `BTCDOM-long` / `BTCDOM-short`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(String);

impl PoolId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PoolId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PoolId({})", self.0)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serde adapter for [`Amount`] that writes decimal strings and reads
/// either strings or integers.
///
/// TOML integers are limited to `i64`, far below a realistic 18-decimal
/// reward pool, so configuration files carry amounts as strings.
pub mod amount_serde {
    use super::Amount;
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        struct AmountVisitor;

        impl<'de> de::Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(v as Amount)
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(v)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                Amount::try_from(v).map_err(|_| E::custom("amount must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.replace('_', "")
                    .parse::<Amount>()
                    .map_err(|e| E::custom(format!("invalid amount {v:?}: {e}")))
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
