//! Builder for constructing lease engines from configuration.
//!
//! The node and marketplace implementations are supplied as factory
//! functions so the binary decides which backends exist while the builder
//! owns how they are wired into services.

use crate::engine::LeaseEngine;
use lease_config::{Config, MarketplaceConfig, NodeConfig};
use lease_marketplace::{MarketplaceError, MarketplaceInterface, MarketplaceService};
use lease_node::{NodeError, NodeInterface, NodeService};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Node client error: {0}")]
	Node(#[from] NodeError),
	#[error("Marketplace client error: {0}")]
	Marketplace(#[from] MarketplaceError),
}

/// Factory functions for the two external clients.
pub struct LeaseFactories<NF, MF> {
	pub node_factory: NF,
	pub marketplace_factory: MF,
}

/// Builder for a LeaseEngine.
pub struct LeaseBuilder {
	config: Config,
}

impl LeaseBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Creates both clients and assembles the engine.
	pub fn build<NF, MF>(
		self,
		factories: LeaseFactories<NF, MF>,
	) -> Result<LeaseEngine, BuilderError>
	where
		NF: FnOnce(&NodeConfig) -> Result<Box<dyn NodeInterface>, NodeError>,
		MF: FnOnce(&MarketplaceConfig) -> Result<Box<dyn MarketplaceInterface>, MarketplaceError>,
	{
		let node = (factories.node_factory)(&self.config.node)?;
		tracing::debug!(address = %self.config.node.address, "Node client ready");

		let marketplace = (factories.marketplace_factory)(&self.config.marketplace)?;
		tracing::debug!(endpoint = %self.config.marketplace.endpoint, "Marketplace client ready");

		Ok(LeaseEngine::new(
			self.config,
			Arc::new(NodeService::new(node)),
			Arc::new(MarketplaceService::new(marketplace)),
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::test_config;

	fn failing_node(_: &NodeConfig) -> Result<Box<dyn NodeInterface>, NodeError> {
		Err(NodeError::Credentials("missing macaroon".into()))
	}

	fn unreachable_marketplace(
		_: &MarketplaceConfig,
	) -> Result<Box<dyn MarketplaceInterface>, MarketplaceError> {
		panic!("marketplace must not be built after a node failure")
	}

	#[test]
	fn test_node_factory_failure_is_reported() {
		let result = LeaseBuilder::new(test_config(false, false)).build(LeaseFactories {
			node_factory: failing_node,
			marketplace_factory: unreachable_marketplace,
		});
		assert!(matches!(result, Err(BuilderError::Node(NodeError::Credentials(_)))));
	}
}
