//! Channel point identifiers.
//!
//! A channel point names the funding transaction output that backs a payment
//! channel and is written `<txid>:<output_index>`. Nodes keep transaction ids
//! in internal byte order, while every display and wire-level string form uses
//! the reversed order, so conversion from raw bytes always reverses first.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while parsing a channel point.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelPointError {
	#[error("Channel point must have the form <txid>:<index>, got '{0}'")]
	Format(String),
	#[error("Invalid funding transaction id '{0}'")]
	Txid(String),
	#[error("Invalid output index '{0}'")]
	OutputIndex(String),
}

/// Identifier of a funding output backing a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelPoint {
	/// Funding transaction id in display (reversed) byte order, lowercase hex.
	pub txid: String,
	/// Index of the funding output within the transaction.
	pub output_index: u32,
}

impl ChannelPoint {
	/// Builds a channel point from a txid that is already in display order.
	pub fn new(txid: impl Into<String>, output_index: u32) -> Result<Self, ChannelPointError> {
		let txid = txid.into().to_lowercase();
		if txid.len() != 64 || !txid.bytes().all(|b| b.is_ascii_hexdigit()) {
			return Err(ChannelPointError::Txid(txid));
		}
		Ok(Self { txid, output_index })
	}

	/// Builds a channel point from a txid in the node's internal byte order.
	pub fn from_funding_bytes(
		txid_bytes: &[u8],
		output_index: u32,
	) -> Result<Self, ChannelPointError> {
		if txid_bytes.len() != 32 {
			return Err(ChannelPointError::Txid(hex::encode(txid_bytes)));
		}
		let mut reversed = txid_bytes.to_vec();
		reversed.reverse();
		Ok(Self {
			txid: hex::encode(reversed),
			output_index,
		})
	}
}

impl fmt::Display for ChannelPoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.txid, self.output_index)
	}
}

impl FromStr for ChannelPoint {
	type Err = ChannelPointError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut parts = s.split(':');
		let (Some(txid), Some(index), None) = (parts.next(), parts.next(), parts.next()) else {
			return Err(ChannelPointError::Format(s.to_string()));
		};
		let output_index = index
			.parse::<u32>()
			.map_err(|_| ChannelPointError::OutputIndex(index.to_string()))?;
		Self::new(txid, output_index)
	}
}
