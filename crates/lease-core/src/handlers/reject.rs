//! Single decision point for disposing of orders that cannot be fulfilled.

use crate::outcome::WorkflowOutcome;
use lease_marketplace::MarketplaceService;
use lease_types::{truncate_id, Order};
use std::sync::Arc;

/// Decides whether a failed acceptance also rejects the order.
pub struct RejectPolicy {
	enabled: bool,
	marketplace: Arc<MarketplaceService>,
}

impl RejectPolicy {
	pub fn new(enabled: bool, marketplace: Arc<MarketplaceService>) -> Self {
		Self {
			enabled,
			marketplace,
		}
	}

	/// Ends an acceptance attempt that failed for `reason`.
	///
	/// When enabled the order is rejected on the marketplace. A failed
	/// rejection leaves the order in place for the next round.
	pub async fn dispose(&self, order: &Order, reason: String) -> WorkflowOutcome {
		if !self.enabled {
			tracing::warn!(order_id = %truncate_id(&order.id), %reason, "Order left pending");
			return WorkflowOutcome::AbortedRetryable(reason);
		}

		match self.marketplace.reject_order(&order.id).await {
			Ok(()) => {
				tracing::warn!(order_id = %truncate_id(&order.id), %reason, "Order rejected");
				WorkflowOutcome::AbortedDisposed(reason)
			},
			Err(e) => {
				tracing::warn!(
					order_id = %truncate_id(&order.id),
					%reason,
					error = %e,
					"Failed to reject order"
				);
				WorkflowOutcome::AbortedRetryable(format!("{}; reject failed: {}", reason, e))
			},
		}
	}
}
