//! Channel opening for accepted and paid orders.

use crate::fee::{FeeDecision, FeeMode, FeePolicy};
use crate::outcome::WorkflowOutcome;
use lease_marketplace::MarketplaceService;
use lease_node::NodeService;
use lease_types::{truncate_id, Order, OrderBucket};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Handler for orders awaiting a channel open.
///
/// Opening failures are left for the next round. A channel that was opened
/// but could not be reported is an inconsistency the agent cannot repair on
/// its own, and is surfaced as such.
pub struct ChannelOpenHandler {
	node: Arc<NodeService>,
	marketplace: Arc<MarketplaceService>,
	fees: FeePolicy,
	notify_delay: Duration,
}

impl ChannelOpenHandler {
	pub fn new(
		node: Arc<NodeService>,
		marketplace: Arc<MarketplaceService>,
		fees: FeePolicy,
		notify_delay: Duration,
	) -> Self {
		Self {
			node,
			marketplace,
			fees,
			notify_delay,
		}
	}

	/// Fetches the next order awaiting a channel and opens it.
	pub async fn run(&self) -> WorkflowOutcome {
		let bucket = OrderBucket::AwaitingChannelOpen;
		match self.marketplace.order(bucket).await {
			Ok(Some(order)) => self.handle(&order).await,
			Ok(None) => WorkflowOutcome::Idle,
			Err(e) => {
				tracing::warn!(error = %e, %bucket, "Failed to fetch orders");
				WorkflowOutcome::AbortedRetryable(e.to_string())
			},
		}
	}

	/// Opens the channel for one paid order and reports its funding output.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	pub async fn handle(&self, order: &Order) -> WorkflowOutcome {
		let fee_rate = match self.fees.decide(order.fee_rate, FeeMode::ChannelOpen) {
			FeeDecision::Proceed(rate) => rate,
			FeeDecision::AboveCeiling { rate, max } => {
				tracing::warn!(rate, max, "Fee rate above ceiling, not opening");
				return WorkflowOutcome::AbortedRetryable(format!(
					"fee rate {} above ceiling {}",
					rate, max
				));
			},
		};

		tracing::info!(
			peer = %truncate_id(&order.peer),
			size = order.channel_size,
			fee_rate,
			"Opening channel"
		);

		let channel_point = match self
			.node
			.open_channel(order.channel_size, fee_rate, &order.peer)
			.await
		{
			Ok(channel_point) => channel_point,
			Err(e) => {
				tracing::warn!(error = %e, "Channel open failed");
				return WorkflowOutcome::AbortedRetryable(format!("open channel: {}", e));
			},
		};

		tokio::time::sleep(self.notify_delay).await;

		match self
			.marketplace
			.notify_channel_point(&order.id, &channel_point)
			.await
		{
			Ok(()) => {
				tracing::info!(%channel_point, "Channel point reported");
				WorkflowOutcome::Completed
			},
			Err(e) => {
				tracing::error!(
					%channel_point,
					error = %e,
					"Channel opened but the marketplace was not told; report it manually"
				);
				WorkflowOutcome::AttentionRequired(format!(
					"channel {} opened but not reported: {}",
					channel_point, e
				))
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::*;
	use lease_config::FeeConfig;

	fn handler(
		node: FakeNode,
		marketplace: FakeMarketplace,
	) -> (ChannelOpenHandler, CallLog<NodeCall>, CallLog<MarketCall>) {
		let (node, node_calls) = node.into_service();
		let (marketplace, market_calls) = marketplace.into_service();
		let handler = ChannelOpenHandler::new(
			node,
			marketplace,
			FeePolicy::new(FeeConfig {
				min_fee: 2,
				max_fee: 10,
			}),
			Duration::from_secs(5),
		);
		(handler, node_calls, market_calls)
	}

	#[tokio::test(start_paused = true)]
	async fn test_opens_and_reports_channel() {
		let (handler, node_calls, market_calls) =
			handler(FakeNode::default(), FakeMarketplace::default());

		let started = tokio::time::Instant::now();
		let outcome = handler.handle(&channel_open_order(5)).await;

		assert_eq!(outcome, WorkflowOutcome::Completed);
		assert!(started.elapsed() >= Duration::from_secs(5));
		assert_eq!(
			*node_calls.lock().unwrap(),
			vec![NodeCall::OpenChannel {
				amount: 1_000_000,
				fee_rate: 5,
				peer: peer(),
			}]
		);
		assert_eq!(
			*market_calls.lock().unwrap(),
			vec![MarketCall::Notify {
				order_id: "O2".into(),
				channel_point: funding_point(),
			}]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_low_fee_raised_to_floor() {
		let (handler, node_calls, _market_calls) =
			handler(FakeNode::default(), FakeMarketplace::default());

		handler.handle(&channel_open_order(1)).await;

		assert!(matches!(
			node_calls.lock().unwrap()[0],
			NodeCall::OpenChannel { fee_rate: 2, .. }
		));
	}

	#[tokio::test]
	async fn test_fee_above_ceiling_opens_nothing() {
		let (handler, node_calls, market_calls) =
			handler(FakeNode::default(), FakeMarketplace::default());

		let outcome = handler.handle(&channel_open_order(11)).await;

		assert!(matches!(outcome, WorkflowOutcome::AbortedRetryable(_)));
		assert!(node_calls.lock().unwrap().is_empty());
		assert!(market_calls.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_open_failure_is_retryable() {
		let node = FakeNode {
			open_fails: true,
			..Default::default()
		};
		let (handler, _node_calls, market_calls) = handler(node, FakeMarketplace::default());

		assert!(matches!(
			handler.handle(&channel_open_order(5)).await,
			WorkflowOutcome::AbortedRetryable(_)
		));
		assert!(market_calls.lock().unwrap().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_notify_failure_requires_attention() {
		let marketplace = FakeMarketplace {
			notify_fails: true,
			..Default::default()
		};
		let (handler, _node_calls, _market_calls) = handler(FakeNode::default(), marketplace);

		assert!(matches!(
			handler.handle(&channel_open_order(5)).await,
			WorkflowOutcome::AttentionRequired(_)
		));
	}
}
