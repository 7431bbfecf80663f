//! Results of sub-workflows and rounds.

use std::fmt;

/// How a single sub-workflow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
	/// There was nothing to do.
	Idle,
	/// Every step succeeded.
	Completed,
	/// Stopped early; the order was left as is and is retried next round.
	AbortedRetryable(String),
	/// Stopped early and the order was rejected on the marketplace.
	AbortedDisposed(String),
	/// The node and the marketplace may now disagree; an operator must look.
	AttentionRequired(String),
}

impl fmt::Display for WorkflowOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			WorkflowOutcome::Idle => write!(f, "idle"),
			WorkflowOutcome::Completed => write!(f, "completed"),
			WorkflowOutcome::AbortedRetryable(reason) => write!(f, "aborted (retry): {}", reason),
			WorkflowOutcome::AbortedDisposed(reason) => write!(f, "aborted (rejected): {}", reason),
			WorkflowOutcome::AttentionRequired(reason) => {
				write!(f, "attention required: {}", reason)
			},
		}
	}
}

/// Outcomes of one reconciliation round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport {
	pub approval: WorkflowOutcome,
	pub channel_open: WorkflowOutcome,
	/// `None` when expiry cleanup is disabled.
	pub expiry: Option<WorkflowOutcome>,
}

impl RoundReport {
	/// True if no sub-workflow had anything to do.
	pub fn is_idle(&self) -> bool {
		self.approval == WorkflowOutcome::Idle
			&& self.channel_open == WorkflowOutcome::Idle
			&& self
				.expiry
				.as_ref()
				.is_none_or(|o| *o == WorkflowOutcome::Idle)
	}
}
