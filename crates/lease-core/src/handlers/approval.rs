//! Acceptance of pending lease requests.
//!
//! Takes one order awaiting seller approval, checks that the node can serve
//! it, and accepts it by handing the marketplace an invoice. Once the fee
//! check has passed, every failure goes through the reject policy.

use crate::fee::{FeeDecision, FeeMode, FeePolicy};
use crate::handlers::RejectPolicy;
use crate::outcome::WorkflowOutcome;
use lease_marketplace::MarketplaceService;
use lease_node::NodeService;
use lease_types::{truncate_id, Order, OrderBucket};
use std::sync::Arc;
use tracing::instrument;

/// Handler for orders awaiting seller approval.
pub struct ApprovalHandler {
	node: Arc<NodeService>,
	marketplace: Arc<MarketplaceService>,
	fees: FeePolicy,
	reject: RejectPolicy,
	invoice_expiry_seconds: u64,
}

impl ApprovalHandler {
	pub fn new(
		node: Arc<NodeService>,
		marketplace: Arc<MarketplaceService>,
		fees: FeePolicy,
		reject: RejectPolicy,
		invoice_expiry_seconds: u64,
	) -> Self {
		Self {
			node,
			marketplace,
			fees,
			reject,
			invoice_expiry_seconds,
		}
	}

	/// Fetches the next order awaiting approval and tries to accept it.
	pub async fn run(&self) -> WorkflowOutcome {
		let bucket = OrderBucket::AwaitingSellerApproval;
		match self.marketplace.order(bucket).await {
			Ok(Some(order)) => self.handle(&order).await,
			Ok(None) => WorkflowOutcome::Idle,
			Err(e) => {
				tracing::warn!(error = %e, %bucket, "Failed to fetch orders");
				WorkflowOutcome::AbortedRetryable(e.to_string())
			},
		}
	}

	/// Runs the acceptance steps for one order.
	///
	/// A fee above the ceiling leaves the order untouched. Any later failure
	/// is handed to the reject policy.
	#[instrument(skip_all, fields(order_id = %truncate_id(&order.id)))]
	pub async fn handle(&self, order: &Order) -> WorkflowOutcome {
		tracing::info!(
			peer = %truncate_id(&order.peer),
			size = order.channel_size,
			fee_rate = order.fee_rate,
			"Lease request received"
		);

		if let FeeDecision::AboveCeiling { rate, max } =
			self.fees.decide(order.fee_rate, FeeMode::Approval)
		{
			tracing::warn!(rate, max, "Fee rate above ceiling, not accepting");
			return WorkflowOutcome::AbortedRetryable(format!(
				"fee rate {} above ceiling {}",
				rate, max
			));
		}

		let address = match self.marketplace.peer_address(&order.peer).await {
			Ok(address) => address,
			Err(e) => return self.reject.dispose(order, format!("peer address: {}", e)).await,
		};

		if let Err(e) = self.node.connect(&order.peer, &address).await {
			return self
				.reject
				.dispose(order, format!("connect to {}: {}", address, e))
				.await;
		}

		match self.node.available_funds().await {
			Ok(funds) if funds >= order.channel_size => {},
			Ok(funds) => {
				return self
					.reject
					.dispose(
						order,
						format!("insufficient funds: {} < {}", funds, order.channel_size),
					)
					.await
			},
			Err(e) => return self.reject.dispose(order, format!("wallet balance: {}", e)).await,
		}

		let payment_request = match self
			.node
			.create_invoice(order.invoice_amount, self.invoice_expiry_seconds, &order.id)
			.await
		{
			Ok(payment_request) => payment_request,
			Err(e) => return self.reject.dispose(order, format!("create invoice: {}", e)).await,
		};

		if let Err(e) = self
			.marketplace
			.accept_order(&order.id, &payment_request)
			.await
		{
			return self.reject.dispose(order, format!("accept order: {}", e)).await;
		}

		tracing::info!(amount = order.invoice_amount, "Order accepted");
		WorkflowOutcome::Completed
	}
}
