//! Bounded query repair.
//!
//! After each execution attempt the controller decides whether to hand the
//! error back to the query generator or give up. Only execution failures
//! count; an empty result set is a success.

use serde::Serialize;

/// Where the query loop stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairPhase {
    /// First attempt, or an attempt after a repair.
    #[default]
    Executing,
    /// Regenerating with the last error as feedback.
    Repairing,
    /// Out of repairs; the last error is kept.
    Exhausted,
}

/// Outcome of evaluating an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairDecision {
    /// The attempt succeeded.
    Done,
    /// Regenerate; carries the repair count after incrementing.
    Retry(u32),
    /// Limit reached; proceed without rows.
    GiveUp,
}

/// Decides between retrying and giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairController {
    limit: u32,
}

impl RepairController {
    /// Creates a controller allowing `limit` repairs.
    #[must_use]
    pub const fn new(limit: u32) -> Self {
        Self { limit }
    }

    /// Evaluates an attempt given the repairs made so far.
    #[must_use]
    pub const fn decide(&self, succeeded: bool, repair_count: u32) -> RepairDecision {
        if succeeded {
            RepairDecision::Done
        } else if repair_count < self.limit {
            RepairDecision::Retry(repair_count + 1)
        } else {
            RepairDecision::GiveUp
        }
    }

    /// Phase implied by a decision.
    #[must_use]
    pub const fn phase(decision: RepairDecision) -> RepairPhase {
        match decision {
            RepairDecision::Done => RepairPhase::Executing,
            RepairDecision::Retry(_) => RepairPhase::Repairing,
            RepairDecision::GiveUp => RepairPhase::Exhausted,
        }
    }
}
