//! Reconciliation engine for the lease agent.
//!
//! The engine polls the marketplace and the node in fixed rounds. Each round
//! runs the approval, channel-open and (optionally) expiry sub-workflows one
//! after the other; a failure in one never prevents the next from running.
//! Nothing is carried from one round to the next except the configuration.

use crate::fee::FeePolicy;
use crate::handlers::{ApprovalHandler, ChannelOpenHandler, ExpiryHandler, RejectPolicy};
use crate::outcome::{RoundReport, WorkflowOutcome};
use lease_config::Config;
use lease_marketplace::{MarketplaceError, MarketplaceService};
use lease_node::{NodeError, NodeService};
use lease_types::{truncate_id, NodeIdentity, OrderBucket};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Errors that stop the agent before any order is touched.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Marketplace knows node as {marketplace_alias:?}, node reports {node_alias:?}")]
	IdentityMismatch {
		node_alias: String,
		marketplace_alias: String,
	},
	#[error("Node error: {0}")]
	Node(#[from] NodeError),
	#[error("Marketplace error: {0}")]
	Marketplace(#[from] MarketplaceError),
}

/// Main engine driving reconciliation rounds.
pub struct LeaseEngine {
	config: Config,
	node: Arc<NodeService>,
	marketplace: Arc<MarketplaceService>,
	approval: ApprovalHandler,
	channel_open: ChannelOpenHandler,
	expiry: ExpiryHandler,
}

impl LeaseEngine {
	pub fn new(
		config: Config,
		node: Arc<NodeService>,
		marketplace: Arc<MarketplaceService>,
	) -> Self {
		let fees = FeePolicy::new(config.fees);
		let reject = RejectPolicy::new(config.lease.reject_on_failure, marketplace.clone());

		let approval = ApprovalHandler::new(
			node.clone(),
			marketplace.clone(),
			fees,
			reject,
			config.lease.invoice_expiry_seconds,
		);
		let channel_open = ChannelOpenHandler::new(
			node.clone(),
			marketplace.clone(),
			fees,
			config.lease.notify_delay(),
		);
		let expiry = ExpiryHandler::new(node.clone(), marketplace.clone(), fees);

		Self {
			config,
			node,
			marketplace,
			approval,
			channel_open,
			expiry,
		}
	}

	/// Verifies that both systems are reachable and agree on who we are.
	///
	/// The marketplace must know the node under the alias the node reports,
	/// and an order query must succeed so that a bad API token fails here
	/// rather than in the first round.
	pub async fn startup_check(&self) -> Result<NodeIdentity, EngineError> {
		let identity = self.node.identity().await?;
		let marketplace_alias = self.marketplace.alias(&identity.pubkey).await?;

		if marketplace_alias != identity.alias {
			return Err(EngineError::IdentityMismatch {
				node_alias: identity.alias,
				marketplace_alias,
			});
		}

		self.marketplace
			.order(OrderBucket::AwaitingSellerApproval)
			.await?;

		tracing::info!(
			pubkey = %truncate_id(&identity.pubkey),
			alias = %identity.alias,
			"Node and marketplace identities match"
		);
		Ok(identity)
	}

	/// Runs one reconciliation round.
	pub async fn run_round(&self) -> RoundReport {
		let approval = self.approval.run().await;
		let channel_open = self.channel_open.run().await;
		let expiry = if self.config.lease.close_expired {
			Some(self.expiry.run().await)
		} else {
			None
		};

		let report = RoundReport {
			approval,
			channel_open,
			expiry,
		};
		log_report(&report);
		report
	}

	/// Runs rounds until Ctrl-C, or exactly once when no period is set.
	pub async fn run(&self) {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::warn!(error = %e, "Failed to listen for shutdown signal");
				std::future::pending::<()>().await;
			}
		})
		.await
	}

	/// Runs rounds until `shutdown` resolves, or exactly once when no period
	/// is set.
	///
	/// Shutdown is observed both during a round and while waiting for the
	/// next one. An interrupted round issues no further calls.
	pub async fn run_until<F>(&self, shutdown: F)
	where
		F: Future<Output = ()>,
	{
		let Some(period) = self.config.lease.period() else {
			self.run_round().await;
			return;
		};

		tracing::info!(period_seconds = period.as_secs(), "Starting reconciliation loop");
		tokio::pin!(shutdown);
		loop {
			tokio::select! {
				_ = async {
					self.run_round().await;
					tokio::time::sleep(period).await;
				} => {}

				// Shutdown signal
				_ = &mut shutdown => {
					tracing::info!("Shutdown signal received");
					break;
				}
			}
		}
	}
}

fn log_report(report: &RoundReport) {
	if report.is_idle() {
		tracing::debug!("Round finished with nothing to do");
		return;
	}

	let outcomes = [
		("approval", Some(&report.approval)),
		("channel_open", Some(&report.channel_open)),
		("expiry", report.expiry.as_ref()),
	];
	for (workflow, outcome) in outcomes {
		match outcome {
			Some(WorkflowOutcome::Idle) | None => {},
			Some(outcome) => tracing::info!(workflow, %outcome, "Round outcome"),
		}
	}
}
