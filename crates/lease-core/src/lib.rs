//! Core reconciliation logic for the liquidity lease agent.
//!
//! Drives orders from the marketplace through acceptance, channel opening and
//! optional expiry cleanup against the local node, and reports how each step
//! ended.

pub mod builder;
pub mod engine;
pub mod fee;
pub mod handlers;
pub mod outcome;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{BuilderError, LeaseBuilder, LeaseFactories};
pub use engine::{EngineError, LeaseEngine};
pub use fee::{clamp_or_reject, FeeDecision, FeeMode, FeePolicy};
pub use outcome::{RoundReport, WorkflowOutcome};
