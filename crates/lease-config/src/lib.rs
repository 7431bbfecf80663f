//! Configuration module for the liquidity lease agent.
//!
//! This module provides the single immutable configuration value that the
//! engine and the clients are built from. It supports loading from TOML files
//! with `${VAR}` / `${VAR:-default}` environment substitution, and validates
//! the economic guardrails before anything talks to the node or marketplace.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the lease agent.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Connection to the local node.
	pub node: NodeConfig,
	/// Connection to the liquidity marketplace.
	pub marketplace: MarketplaceConfig,
	/// Fee rate guardrails in sat/vbyte.
	#[serde(default)]
	pub fees: FeeConfig,
	/// Reconciliation loop behaviour.
	#[serde(default)]
	pub lease: LeaseConfig,
}

/// Connection parameters for the node's REST interface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
	/// `host:port` of the node REST endpoint, or a full `https://` URL.
	#[serde(default = "default_node_address")]
	pub address: String,
	/// Path to the admin macaroon.
	pub macaroon_path: PathBuf,
	/// Path to the node's TLS certificate (PEM).
	pub tls_cert_path: PathBuf,
	/// Per-call timeout in seconds.
	#[serde(default = "default_timeout_seconds")]
	pub timeout_seconds: u64,
}

/// Connection parameters for the marketplace API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketplaceConfig {
	/// GraphQL endpoint URL.
	#[serde(default = "default_marketplace_endpoint")]
	pub endpoint: String,
	/// Path to a file holding the API token in plain text.
	pub token_path: PathBuf,
	/// Per-call timeout in seconds.
	#[serde(default = "default_timeout_seconds")]
	pub timeout_seconds: u64,
}

/// Fee rate bounds applied to marketplace suggestions.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct FeeConfig {
	/// Floor applied when opening channels.
	#[serde(default = "default_min_fee")]
	pub min_fee: u64,
	/// Ceiling above which no order is accepted or opened.
	#[serde(default = "default_max_fee")]
	pub max_fee: u64,
}

impl Default for FeeConfig {
	fn default() -> Self {
		Self {
			min_fee: default_min_fee(),
			max_fee: default_max_fee(),
		}
	}
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LeaseConfig {
	/// Delay between rounds in seconds. Zero or negative runs a single round.
	#[serde(default = "default_period_seconds")]
	pub period_seconds: i64,
	/// Actively reject orders that cannot be fulfilled.
	#[serde(default)]
	pub reject_on_failure: bool,
	/// Close channels that back finished orders.
	#[serde(default)]
	pub close_expired: bool,
	/// Validity window of the invoices handed to the marketplace.
	#[serde(default = "default_invoice_expiry_seconds")]
	pub invoice_expiry_seconds: u64,
	/// Delay between opening a channel and reporting it to the marketplace.
	#[serde(default = "default_notify_delay_seconds")]
	pub notify_delay_seconds: u64,
}

impl Default for LeaseConfig {
	fn default() -> Self {
		Self {
			period_seconds: default_period_seconds(),
			reject_on_failure: false,
			close_expired: false,
			invoice_expiry_seconds: default_invoice_expiry_seconds(),
			notify_delay_seconds: default_notify_delay_seconds(),
		}
	}
}

impl LeaseConfig {
	/// Returns the inter-round delay, or `None` when only one round should run.
	pub fn period(&self) -> Option<Duration> {
		if self.period_seconds <= 0 {
			None
		} else {
			Some(Duration::from_secs(self.period_seconds as u64))
		}
	}

	/// Returns the delay before a channel point is reported.
	pub fn notify_delay(&self) -> Duration {
		Duration::from_secs(self.notify_delay_seconds)
	}
}

fn default_node_address() -> String {
	"localhost:8080".to_string()
}

fn default_marketplace_endpoint() -> String {
	"https://api.amboss.space/graphql".to_string()
}

/// Matches the per-call deadline the node RPC client has always used.
fn default_timeout_seconds() -> u64 {
	50
}

fn default_min_fee() -> u64 {
	2
}

fn default_max_fee() -> u64 {
	10
}

fn default_period_seconds() -> i64 {
	60
}

fn default_invoice_expiry_seconds() -> u64 {
	3600
}

fn default_notify_delay_seconds() -> u64 {
	5
}

/// Substitutes `${NAME}` and `${NAME:-fallback}` references with environment values.
///
/// A reference without a fallback whose variable is unset is an error naming
/// the first such variable.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_CONFIG_BYTES: usize = 64 * 1024;
	if input.len() > MAX_CONFIG_BYTES {
		return Err(ConfigError::Validation(format!(
			"Configuration is {} bytes, limit is {}",
			input.len(),
			MAX_CONFIG_BYTES
		)));
	}

	let pattern = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut unset: Option<String> = None;
	let resolved = pattern.replace_all(input, |caps: &Captures<'_>| {
		let name = &caps[1];
		match (std::env::var(name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(fallback)) => fallback.as_str().to_string(),
			(Err(_), None) => {
				unset.get_or_insert_with(|| name.to_string());
				String::new()
			},
		}
	});

	match unset {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			name
		))),
		None => Ok(resolved.into_owned()),
	}
}

/// Expands a leading `~/` to the current user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
	expand_home_in(path, std::env::var_os("HOME").as_deref())
}

fn expand_home_in(path: &Path, home: Option<&OsStr>) -> PathBuf {
	match (path.strip_prefix("~"), home) {
		(Ok(rest), Some(home)) => Path::new(home).join(rest),
		_ => path.to_path_buf(),
	}
}

impl Config {
	/// Loads configuration from a TOML file, resolving environment variables.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		content.parse()
	}

	/// Expands home-relative credential paths and validates the result.
	///
	/// Every constructor funnels through here, so a `Config` that reached the
	/// engine has always passed validation.
	pub fn finalize(mut self) -> Result<Self, ConfigError> {
		self.node.macaroon_path = expand_home(&self.node.macaroon_path);
		self.node.tls_cert_path = expand_home(&self.node.tls_cert_path);
		self.marketplace.token_path = expand_home(&self.marketplace.token_path);
		self.validate()?;
		Ok(self)
	}

	/// Validates the configuration to ensure all required fields are properly set.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.node.address.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Node address cannot be empty".into(),
			));
		}
		validate_timeout("node", self.node.timeout_seconds)?;

		if self.marketplace.endpoint.trim().is_empty() {
			return Err(ConfigError::Validation(
				"Marketplace endpoint cannot be empty".into(),
			));
		}
		validate_timeout("marketplace", self.marketplace.timeout_seconds)?;

		if self.fees.max_fee == 0 {
			return Err(ConfigError::Validation(
				"max_fee must be at least 1 sat/vbyte".into(),
			));
		}
		if self.fees.min_fee > self.fees.max_fee {
			return Err(ConfigError::Validation(format!(
				"min_fee ({}) cannot exceed max_fee ({})",
				self.fees.min_fee, self.fees.max_fee
			)));
		}

		if self.lease.invoice_expiry_seconds == 0 {
			return Err(ConfigError::Validation(
				"invoice_expiry_seconds must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

fn validate_timeout(section: &str, timeout_seconds: u64) -> Result<(), ConfigError> {
	if timeout_seconds == 0 || timeout_seconds > 300 {
		return Err(ConfigError::Validation(format!(
			"{} timeout_seconds must be between 1 and 300, got {}",
			section, timeout_seconds
		)));
	}
	Ok(())
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is finalized
/// (paths expanded, values validated) after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.finalize()
	}
}
