//! Cleanup of channels backing finished leases.

use crate::fee::FeePolicy;
use crate::outcome::WorkflowOutcome;
use lease_marketplace::MarketplaceService;
use lease_node::NodeService;
use lease_types::{truncate_id, Order};
use std::sync::Arc;
use tracing::instrument;

/// Closes the channel of the most recently finished order if it is still open.
pub struct ExpiryHandler {
	node: Arc<NodeService>,
	marketplace: Arc<MarketplaceService>,
	fees: FeePolicy,
}

impl ExpiryHandler {
	pub fn new(
		node: Arc<NodeService>,
		marketplace: Arc<MarketplaceService>,
		fees: FeePolicy,
	) -> Self {
		Self {
			node,
			marketplace,
			fees,
		}
	}

	/// Fetches the latest finished order and closes its channel if still open.
	pub async fn run(&self) -> WorkflowOutcome {
		match self.marketplace.finished_order().await {
			Ok(Some(order)) => self.handle(&order).await,
			Ok(None) => WorkflowOutcome::Idle,
			Err(e) => {
				tracing::warn!(error = %e, "Failed to fetch finished orders");
				WorkflowOutcome::AbortedRetryable(e.to_string())
			},
		}
	}

	/// Closes the order's channel at the fee floor. Orders without a channel
	/// point or whose channel is already gone are idle.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	pub async fn handle(&self, order: &Order) -> WorkflowOutcome {
		let Some(channel_point) = &order.channel_point else {
			return WorkflowOutcome::Idle;
		};

		match self.node.is_channel_open(channel_point).await {
			Ok(true) => {},
			Ok(false) => {
				tracing::debug!(%channel_point, "Lease channel already closed");
				return WorkflowOutcome::Idle;
			},
			Err(e) => {
				tracing::warn!(%channel_point, error = %e, "Failed to list channels");
				return WorkflowOutcome::AbortedRetryable(format!("list channels: {}", e));
			},
		}

		match self.node.close_channel(self.fees.floor(), channel_point).await {
			Ok(closing_txid) => {
				tracing::info!(
					%channel_point,
					closing_txid = %truncate_id(&closing_txid),
					"Closed expired lease channel"
				);
				WorkflowOutcome::Completed
			},
			Err(e) => {
				tracing::warn!(
					%channel_point,
					error = %e,
					"Failed to close expired lease channel"
				);
				WorkflowOutcome::AbortedRetryable(format!("close channel: {}", e))
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::*;
	use lease_config::FeeConfig;

	fn handler(node: FakeNode, marketplace: FakeMarketplace) -> (ExpiryHandler, CallLog<NodeCall>) {
		let (node, node_calls) = node.into_service();
		let (marketplace, _market_calls) = marketplace.into_service();
		let fees = FeePolicy::new(FeeConfig {
			min_fee: 2,
			max_fee: 10,
		});
		(ExpiryHandler::new(node, marketplace, fees), node_calls)
	}

	#[tokio::test]
	async fn test_open_channel_closed_at_floor() {
		let marketplace = FakeMarketplace {
			finished: Some(finished_order()),
			..Default::default()
		};
		let (handler, node_calls) = handler(FakeNode::default(), marketplace);

		assert_eq!(handler.run().await, WorkflowOutcome::Completed);
		assert_eq!(
			*node_calls.lock().unwrap(),
			vec![
				NodeCall::IsChannelOpen(expired_point()),
				NodeCall::CloseChannel {
					fee_rate: 2,
					channel_point: expired_point(),
				},
			]
		);
	}

	#[tokio::test]
	async fn test_closed_channel_left_alone() {
		let node = FakeNode {
			channel_open: false,
			..Default::default()
		};
		let marketplace = FakeMarketplace {
			finished: Some(finished_order()),
			..Default::default()
		};
		let (handler, node_calls) = handler(node, marketplace);

		assert_eq!(handler.run().await, WorkflowOutcome::Idle);
		assert!(!node_calls.lock().unwrap().iter().any(|c| c.is_mutation()));
	}

	#[tokio::test]
	async fn test_no_finished_order_is_idle() {
		let (handler, node_calls) = handler(FakeNode::default(), FakeMarketplace::default());
		assert_eq!(handler.run().await, WorkflowOutcome::Idle);
		assert!(node_calls.lock().unwrap().is_empty());
	}
}
