//! Marketplace order types.
//!
//! Orders are owned by the marketplace. The agent only ever holds a copy that
//! was fetched during the current round, and every lifecycle change happens
//! through a marketplace mutation rather than by editing these values.

use crate::ChannelPoint;
use std::fmt;

/// Lifecycle status of an order, as reported by the marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
	/// A buyer asked for liquidity and the seller has not answered yet.
	WaitingForSellerApproval,
	/// The buyer paid and the seller must open the channel.
	WaitingForChannelOpen,
	/// The lease ran to completion.
	Finished,
	/// Any other marketplace status; carried through but never acted upon.
	Other(String),
}

impl OrderStatus {
	/// Returns the marketplace's wire name for this status.
	pub fn as_str(&self) -> &str {
		match self {
			OrderStatus::WaitingForSellerApproval => "WAITING_FOR_SELLER_APPROVAL",
			OrderStatus::WaitingForChannelOpen => "WAITING_FOR_CHANNEL_OPEN",
			OrderStatus::Finished => "CHANNEL_MONITORING_FINISHED",
			OrderStatus::Other(s) => s.as_str(),
		}
	}
}

impl From<&str> for OrderStatus {
	fn from(s: &str) -> Self {
		match s {
			"WAITING_FOR_SELLER_APPROVAL" => OrderStatus::WaitingForSellerApproval,
			"WAITING_FOR_CHANNEL_OPEN" => OrderStatus::WaitingForChannelOpen,
			"CHANNEL_MONITORING_FINISHED" => OrderStatus::Finished,
			other => OrderStatus::Other(other.to_string()),
		}
	}
}

/// A lifecycle partition of orders that the agent polls independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderBucket {
	/// Orders waiting for the seller to accept or reject them.
	AwaitingSellerApproval,
	/// Accepted and paid orders waiting for the channel to be opened.
	AwaitingChannelOpen,
}

impl OrderBucket {
	/// Status an order must carry to belong to this bucket.
	pub fn status(&self) -> OrderStatus {
		match self {
			OrderBucket::AwaitingSellerApproval => OrderStatus::WaitingForSellerApproval,
			OrderBucket::AwaitingChannelOpen => OrderStatus::WaitingForChannelOpen,
		}
	}
}

impl fmt::Display for OrderBucket {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderBucket::AwaitingSellerApproval => f.write_str("awaiting seller approval"),
			OrderBucket::AwaitingChannelOpen => f.write_str("awaiting channel open"),
		}
	}
}

/// One liquidity-lease order as seen in the current round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
	/// Marketplace-assigned identifier, stable for the order's lifetime.
	pub id: String,
	/// Public identity key of the buyer's node.
	pub peer: String,
	/// Requested channel capacity in sats.
	pub channel_size: u64,
	/// Amount in sats the seller invoices the buyer for.
	pub invoice_amount: u64,
	/// On-chain fee rate in sat/vbyte currently suggested by the marketplace.
	pub fee_rate: u64,
	/// Marketplace lifecycle status.
	pub status: OrderStatus,
	/// Funding output of the channel opened for this order, once known.
	pub channel_point: Option<ChannelPoint>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_wire_names_roundtrip() {
		for status in [
			OrderStatus::WaitingForSellerApproval,
			OrderStatus::WaitingForChannelOpen,
			OrderStatus::Finished,
		] {
			assert_eq!(OrderStatus::from(status.as_str()), status);
		}
	}

	#[test]
	fn test_unknown_status_is_opaque() {
		let status = OrderStatus::from("BUYER_REJECTED");
		assert_eq!(status, OrderStatus::Other("BUYER_REJECTED".to_string()));
		assert_eq!(status.as_str(), "BUYER_REJECTED");
	}

	#[test]
	fn test_bucket_status() {
		assert_eq!(
			OrderBucket::AwaitingSellerApproval.status().as_str(),
			"WAITING_FOR_SELLER_APPROVAL"
		);
		assert_eq!(
			OrderBucket::AwaitingChannelOpen.status(),
			OrderStatus::WaitingForChannelOpen
		);
	}

	#[test]
	fn test_bucket_display_is_readable() {
		assert_eq!(
			OrderBucket::AwaitingChannelOpen.to_string(),
			"awaiting channel open"
		);
	}
}
