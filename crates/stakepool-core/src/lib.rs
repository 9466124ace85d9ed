//! # Stakepool Core
//!
//! Shared building blocks for time-weighted LP staking pools:
//! - `Amount` / `Timestamp` / `Address` - base units, unix seconds, EVM identities
//! - `Ratio` - WAD fixed-point ratio in `[0, 1]`, truncating division
//! - `Clock` - time source sampled once per pool operation
//! - `StakingError` - the error taxonomy every pool operation reports
//!
//! ## Pool Timeline
//!
//! ```text
//!  start        start+7d                  start+120d  start+127d   expiration
//!    │ staking     │  quadratic reward ramp ──────────────────────────► │ 100%
//!    │  window     │  penalty 100% → 0% (113d) │ 0%                     │
//!    ├─────────────┼───────────────────────────┼──────────┼─────────────┤
//!                                                   penalty window end
//! ```

pub mod clock;
pub mod error;
pub mod fixed;
pub mod types;

pub use clock::*;
pub use error::*;
pub use fixed::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::error::{Result, StakingError, TransferError};
    pub use crate::fixed::{Ratio, WAD};
    pub use crate::types::*;
}
