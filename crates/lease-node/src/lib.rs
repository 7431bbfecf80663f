//! Node client module for the liquidity lease agent.
//!
//! This module abstracts the local payment-network node behind the
//! `NodeInterface` trait: identity, wallet balance, peer connections,
//! invoices, and channel open/close. `NodeService` wraps an implementation and
//! owns the two behaviours every caller relies on, namely that reconnecting to
//! a connected peer is not an error and that a channel-open stream is reduced
//! to its first meaningful update.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use lease_types::{truncate_id, ChannelPoint, NodeIdentity};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod lnd;
}

/// Errors that can occur while talking to the node.
#[derive(Debug, Error)]
pub enum NodeError {
	/// Transport failure, including per-call timeouts.
	#[error("Network error: {0}")]
	Network(String),
	/// The node answered with an error.
	#[error("Node RPC error: {0}")]
	Rpc(String),
	/// The peer is already connected.
	#[error("Peer already connected")]
	AlreadyConnected,
	/// The node answered with something that could not be interpreted.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// A streaming call ended before producing the expected update.
	#[error("Update stream closed: {0}")]
	StreamClosed(String),
	/// Macaroon or TLS material could not be loaded.
	#[error("Credential error: {0}")]
	Credentials(String),
}

/// One update from a channel-open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenStatusUpdate {
	/// The funding transaction was broadcast.
	Pending(ChannelPoint),
	/// The channel reached its confirmation depth.
	Open(ChannelPoint),
	/// Any other update kind (e.g. PSBT funding steps).
	Other,
}

/// Stream of channel-open updates as produced by the node.
pub type OpenStatusStream = BoxStream<'static, Result<OpenStatusUpdate, NodeError>>;

/// Trait defining the operations the agent needs from a node.
#[async_trait]
pub trait NodeInterface: Send + Sync {
	/// Returns the node's public key and alias.
	async fn get_identity(&self) -> Result<NodeIdentity, NodeError>;

	/// Returns the confirmed on-chain wallet balance in sats.
	async fn available_funds(&self) -> Result<u64, NodeError>;

	/// Connects to a peer at `address`.
	///
	/// Implementations report an existing connection as
	/// `NodeError::AlreadyConnected`.
	async fn connect(&self, pubkey: &str, address: &str) -> Result<(), NodeError>;

	/// Creates an invoice and returns its payment request.
	async fn create_invoice(
		&self,
		amount: u64,
		expiry_seconds: u64,
		memo: &str,
	) -> Result<String, NodeError>;

	/// Starts opening a channel and returns the node's update stream.
	async fn open_channel(
		&self,
		amount: u64,
		fee_rate: u64,
		peer_pubkey: &str,
	) -> Result<OpenStatusStream, NodeError>;

	/// Returns true if the node still lists the channel.
	async fn is_channel_open(&self, channel_point: &ChannelPoint) -> Result<bool, NodeError>;

	/// Cooperatively closes a channel and returns the closing transaction id.
	async fn close_channel(
		&self,
		fee_rate: u64,
		channel_point: &ChannelPoint,
	) -> Result<String, NodeError>;
}

/// Service that fronts a node implementation.
pub struct NodeService {
	implementation: Box<dyn NodeInterface>,
}

impl NodeService {
	/// Creates a new NodeService around the given implementation.
	pub fn new(implementation: Box<dyn NodeInterface>) -> Self {
		Self { implementation }
	}

	/// Returns the node's public key and alias.
	pub async fn identity(&self) -> Result<NodeIdentity, NodeError> {
		self.implementation.get_identity().await
	}

	/// Returns the confirmed on-chain balance in sats.
	pub async fn available_funds(&self) -> Result<u64, NodeError> {
		self.implementation.available_funds().await
	}

	/// Connects to a peer, treating an existing connection as success.
	pub async fn connect(&self, pubkey: &str, address: &str) -> Result<(), NodeError> {
		match self.implementation.connect(pubkey, address).await {
			Err(NodeError::AlreadyConnected) => {
				tracing::debug!(peer = %truncate_id(pubkey), "Peer already connected");
				Ok(())
			},
			other => other,
		}
	}

	/// Creates an invoice and returns its payment request.
	pub async fn create_invoice(
		&self,
		amount: u64,
		expiry_seconds: u64,
		memo: &str,
	) -> Result<String, NodeError> {
		self.implementation
			.create_invoice(amount, expiry_seconds, memo)
			.await
	}

	/// Opens a channel and resolves to its channel point.
	///
	/// Consumes the update stream only until the first pending or open
	/// update; the rest of the stream is dropped. Updates of other kinds are
	/// skipped. A stream that ends first is an error.
	pub async fn open_channel(
		&self,
		amount: u64,
		fee_rate: u64,
		peer_pubkey: &str,
	) -> Result<ChannelPoint, NodeError> {
		let mut updates = self
			.implementation
			.open_channel(amount, fee_rate, peer_pubkey)
			.await?;

		while let Some(update) = updates.next().await {
			match update? {
				OpenStatusUpdate::Pending(channel_point) => {
					tracing::info!(%channel_point, "Channel funding broadcast");
					return Ok(channel_point);
				},
				OpenStatusUpdate::Open(channel_point) => {
					tracing::info!(%channel_point, "Channel open");
					return Ok(channel_point);
				},
				OpenStatusUpdate::Other => continue,
			}
		}

		Err(NodeError::StreamClosed(
			"channel open stream ended before a pending or open update".into(),
		))
	}

	/// Returns true if the node lists a channel with this funding output.
	pub async fn is_channel_open(&self, channel_point: &ChannelPoint) -> Result<bool, NodeError> {
		self.implementation.is_channel_open(channel_point).await
	}

	/// Cooperatively closes a channel and returns the closing txid.
	pub async fn close_channel(
		&self,
		fee_rate: u64,
		channel_point: &ChannelPoint,
	) -> Result<String, NodeError> {
		self.implementation
			.close_channel(fee_rate, channel_point)
			.await
	}
}
