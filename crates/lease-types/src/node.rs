//! Node identity types.

/// Public identity of a payment-network node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
	/// Hex-encoded public identity key.
	pub pubkey: String,
	/// Human-readable alias announced to the network.
	pub alias: String,
}
