//! Marketplace client module for the liquidity lease agent.
//!
//! The marketplace is the system of record for orders. This module hides its
//! API behind the `MarketplaceInterface` trait and adds the one piece of
//! policy the agent layers on top of raw queries: choosing which advertised
//! address of a peer to dial.

use async_trait::async_trait;
use lease_types::{truncate_id, ChannelPoint, Order, OrderBucket};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod amboss;
}

static IPV4_ADDRESS: Lazy<Regex> = Lazy::new(|| {
	Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}:[0-9]+$").expect("valid IPv4 address pattern")
});
static IPV6_ADDRESS: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^\[[0-9a-fA-F:.]+\]:[0-9]+$").expect("valid IPv6 address pattern"));
static ONION_ADDRESS: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"^[a-z0-9]+\.onion:[0-9]+$").expect("valid onion address pattern"));

/// Errors that can occur while talking to the marketplace.
#[derive(Debug, Error)]
pub enum MarketplaceError {
	/// Transport failure, including per-call timeouts.
	#[error("Network error: {0}")]
	Network(String),
	/// The API answered with errors.
	#[error("API error: {0}")]
	Api(String),
	/// The API answered with data that could not be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// The peer advertises no address the node can dial.
	#[error("No reachable address for {0}")]
	NoReachableAddress(String),
	/// The API token could not be loaded.
	#[error("Credential error: {0}")]
	Credentials(String),
}

/// Trait defining the marketplace operations the agent uses.
#[async_trait]
pub trait MarketplaceInterface: Send + Sync {
	/// Returns the alias the marketplace knows this node by.
	async fn get_alias(&self, pubkey: &str) -> Result<String, MarketplaceError>;

	/// Returns every address the marketplace lists for a node, in its order.
	async fn get_node_addresses(&self, pubkey: &str) -> Result<Vec<String>, MarketplaceError>;

	/// Returns one order in the given bucket, if any.
	async fn get_order(&self, bucket: OrderBucket) -> Result<Option<Order>, MarketplaceError>;

	/// Returns the most recently finished order that has a channel point.
	async fn get_finished_order(&self) -> Result<Option<Order>, MarketplaceError>;

	/// Accepts an order by submitting the payment request for its invoice.
	async fn accept_order(&self, order_id: &str, payment_request: &str)
		-> Result<(), MarketplaceError>;

	/// Rejects an order.
	async fn reject_order(&self, order_id: &str) -> Result<(), MarketplaceError>;

	/// Reports the funding output of the channel opened for an order.
	async fn notify_channel_point(
		&self,
		order_id: &str,
		channel_point: &ChannelPoint,
	) -> Result<(), MarketplaceError>;
}

/// Picks the address to dial from a node's advertised list.
///
/// The first clear-net `host:port` wins. Without one, the last onion address
/// is used.
pub fn select_address(addresses: &[String]) -> Option<&str> {
	let mut onion = None;
	for address in addresses {
		if IPV4_ADDRESS.is_match(address) || IPV6_ADDRESS.is_match(address) {
			return Some(address);
		}
		if ONION_ADDRESS.is_match(address) {
			onion = Some(address.as_str());
		}
	}
	onion
}

/// Service that fronts a marketplace implementation.
pub struct MarketplaceService {
	implementation: Box<dyn MarketplaceInterface>,
}

impl MarketplaceService {
	/// Creates a new MarketplaceService around the given implementation.
	pub fn new(implementation: Box<dyn MarketplaceInterface>) -> Self {
		Self { implementation }
	}

	/// Returns the alias the marketplace has on record for a node.
	pub async fn alias(&self, pubkey: &str) -> Result<String, MarketplaceError> {
		self.implementation.get_alias(pubkey).await
	}

	/// Resolves the address to dial for a peer, preferring clear-net.
	pub async fn peer_address(&self, pubkey: &str) -> Result<String, MarketplaceError> {
		let addresses = self.implementation.get_node_addresses(pubkey).await?;
		match select_address(&addresses) {
			Some(address) => Ok(address.to_string()),
			None => {
				tracing::debug!(
					peer = %truncate_id(pubkey),
					advertised = addresses.len(),
					"No usable peer address"
				);
				Err(MarketplaceError::NoReachableAddress(pubkey.to_string()))
			},
		}
	}

	/// Returns one order from the bucket, if any, with the current fee rate.
	pub async fn order(&self, bucket: OrderBucket) -> Result<Option<Order>, MarketplaceError> {
		self.implementation.get_order(bucket).await
	}

	/// Returns the most recently finished order that names a channel point.
	pub async fn finished_order(&self) -> Result<Option<Order>, MarketplaceError> {
		self.implementation.get_finished_order().await
	}

	/// Accepts an order by handing over the invoice the buyer must pay.
	pub async fn accept_order(
		&self,
		order_id: &str,
		payment_request: &str,
	) -> Result<(), MarketplaceError> {
		self.implementation
			.accept_order(order_id, payment_request)
			.await
	}

	/// Rejects an order awaiting seller approval.
	pub async fn reject_order(&self, order_id: &str) -> Result<(), MarketplaceError> {
		self.implementation.reject_order(order_id).await
	}

	/// Reports the funding output of the channel opened for an order.
	pub async fn notify_channel_point(
		&self,
		order_id: &str,
		channel_point: &ChannelPoint,
	) -> Result<(), MarketplaceError> {
		self.implementation
			.notify_channel_point(order_id, channel_point)
			.await
	}
}
