//! Main entry point for the liquidity lease agent.
//!
//! Connects a local LND node to the Amboss marketplace and fulfills
//! liquidity-lease orders addressed to it until interrupted.

use clap::Parser;
use lease_config::{Config, ConfigError, FeeConfig, LeaseConfig, MarketplaceConfig, NodeConfig};
use lease_core::{LeaseBuilder, LeaseFactories};
use lease_marketplace::implementations::amboss::create_marketplace;
use lease_node::implementations::lnd::create_node;
use std::path::PathBuf;

/// Command-line arguments for the lease agent.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to a TOML configuration file; takes precedence over the flags below
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// The exposed LND REST api, <host>:<port>
	#[arg(long, default_value = "localhost:8080")]
	addr: String,

	/// Path to admin.macaroon
	#[arg(long, default_value = "~/.lnd/data/chain/bitcoin/mainnet/admin.macaroon")]
	macaroonpath: PathBuf,

	/// Path to tls.cert
	#[arg(long, default_value = "~/.lnd/tls.cert")]
	tlspath: PathBuf,

	/// Path to a file holding the Amboss API token in plain text
	#[arg(long, default_value = "~/api.key")]
	tokenpath: PathBuf,

	/// Amboss GraphQL endpoint
	#[arg(long, default_value = "https://api.amboss.space/graphql")]
	endpoint: String,

	/// Minimum channel-open fee rate in sat/vbyte
	#[arg(long, default_value_t = 2)]
	minfee: u64,

	/// Maximum fee rate in sat/vbyte to accept or open at
	#[arg(long, default_value_t = 10)]
	maxfee: u64,

	/// Seconds between rounds; zero or negative runs a single round
	#[arg(long, default_value_t = 60, allow_negative_numbers = true)]
	period: i64,

	/// Reject orders that cannot be fulfilled
	#[arg(long)]
	reject: bool,

	/// Close channels of finished leases
	#[arg(long)]
	close_expired: bool,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

impl Args {
	/// Builds the configuration described by the individual flags.
	fn to_config(&self) -> Result<Config, ConfigError> {
		let node = NodeConfig {
			address: self.addr.clone(),
			macaroon_path: self.macaroonpath.clone(),
			tls_cert_path: self.tlspath.clone(),
			timeout_seconds: 50,
		};
		let marketplace = MarketplaceConfig {
			endpoint: self.endpoint.clone(),
			token_path: self.tokenpath.clone(),
			timeout_seconds: 50,
		};
		let lease = LeaseConfig {
			period_seconds: self.period,
			reject_on_failure: self.reject,
			close_expired: self.close_expired,
			..LeaseConfig::default()
		};

		Config {
			node,
			marketplace,
			fees: FeeConfig {
				min_fee: self.minfee,
				max_fee: self.maxfee,
			},
			lease,
		}
		.finalize()
	}
}

async fn load_config(args: &Args) -> Result<Config, ConfigError> {
	match &args.config {
		Some(path) => Config::from_file(path).await,
		None => args.to_config(),
	}
}

/// Main entry point for the lease agent.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file or flags
/// 4. Builds the engine and checks both systems agree on the node identity
/// 5. Runs reconciliation rounds until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started lease agent");

	let config = load_config(&args).await?;
	tracing::info!(
		node = %config.node.address,
		min_fee = config.fees.min_fee,
		max_fee = config.fees.max_fee,
		reject_on_failure = config.lease.reject_on_failure,
		close_expired = config.lease.close_expired,
		"Loaded configuration"
	);

	let engine = LeaseBuilder::new(config).build(LeaseFactories {
		node_factory: create_node,
		marketplace_factory: create_marketplace,
	})?;

	engine.startup_check().await?;
	engine.run().await;

	tracing::info!("Stopped lease agent");
	Ok(())
}
