//! Amboss Magma implementation of the marketplace interface.
//!
//! Talks GraphQL over HTTPS. The order listing carries every order of the
//! seller's offers, so bucket queries filter client-side on the status field.

use crate::{MarketplaceError, MarketplaceInterface};
use async_trait::async_trait;
use lease_config::MarketplaceConfig;
use lease_types::{ChannelPoint, Order, OrderBucket, OrderStatus, SecretString};
use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

const NODE_QUERY: &str = "query GetNode($pubkey: String!) { getNode(pubkey: $pubkey) { graph_info { node { alias addresses { addr } } } } }";

const ORDERS_QUERY: &str =
	"query { getOfferOrders { list { account id size status } } getMempoolFees { hourFee } }";

const FINISHED_ORDERS_QUERY: &str = "query { getOfferOrders { list { account id size status channel_point created_at } } getMempoolFees { hourFee } }";

const ACCEPT_MUTATION: &str = "mutation SellerAcceptOrder($sellerAcceptOrderId: String!, $request: String!) { sellerAcceptOrder(id: $sellerAcceptOrderId, request: $request) }";

const REJECT_MUTATION: &str = "mutation SellerRejectOrder($sellerRejectOrderId: String!) { sellerRejectOrder(id: $sellerRejectOrderId) }";

const ADD_TRANSACTION_MUTATION: &str = "mutation SellerAddTransaction($sellerAddTransactionId: String!, $transaction: String!) { sellerAddTransaction(id: $sellerAddTransactionId, transaction: $transaction) }";

/// GraphQL client for the Amboss API.
pub struct AmbossClient {
	client: reqwest::Client,
	endpoint: String,
	token: SecretString,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
	query: &'a str,
	variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
	data: Option<T>,
	#[serde(default)]
	errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
	message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeData {
	get_node: Option<NodeEntry>,
}

#[derive(Debug, Deserialize)]
struct NodeEntry {
	graph_info: Option<GraphInfo>,
}

#[derive(Debug, Deserialize)]
struct GraphInfo {
	node: Option<NodeInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeInfo {
	#[serde(default)]
	alias: String,
	#[serde(default)]
	addresses: Vec<NodeAddress>,
}

#[derive(Debug, Deserialize)]
struct NodeAddress {
	addr: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrdersData {
	get_offer_orders: OfferOrders,
	get_mempool_fees: MempoolFees,
}

#[derive(Debug, Deserialize)]
struct OfferOrders {
	#[serde(default)]
	list: Vec<OfferOrder>,
}

#[derive(Debug, Clone, Deserialize)]
struct OfferOrder {
	account: String,
	id: String,
	size: String,
	status: String,
	#[serde(default)]
	channel_point: Option<String>,
	#[serde(default)]
	created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MempoolFees {
	hour_fee: f64,
}

/// Converts the suggested fee to whole sat/vbyte, truncating toward zero.
fn fee_rate(hour_fee: f64) -> u64 {
	if hour_fee.is_finite() && hour_fee > 0.0 {
		hour_fee.trunc() as u64
	} else {
		0
	}
}

fn to_order(entry: &OfferOrder, fee_rate: u64) -> Result<Order, MarketplaceError> {
	let size: u64 = entry.size.parse().map_err(|_| {
		MarketplaceError::InvalidResponse(format!(
			"order {} has non-numeric size {:?}",
			entry.id, entry.size
		))
	})?;

	let channel_point = entry
		.channel_point
		.as_deref()
		.filter(|s| !s.is_empty())
		.and_then(|s| match s.parse::<ChannelPoint>() {
			Ok(cp) => Some(cp),
			Err(e) => {
				tracing::warn!(
					order_id = %entry.id,
					error = %e,
					"Ignoring malformed channel point"
				);
				None
			},
		});

	Ok(Order {
		id: entry.id.clone(),
		peer: entry.account.clone(),
		channel_size: size,
		invoice_amount: size,
		fee_rate,
		status: OrderStatus::from(entry.status.as_str()),
		channel_point,
	})
}

/// Picks the first listed order in `bucket`.
fn first_in_bucket(
	list: &[OfferOrder],
	bucket: OrderBucket,
	fee_rate: u64,
) -> Result<Option<Order>, MarketplaceError> {
	let wanted = bucket.status();
	list.iter()
		.find(|entry| OrderStatus::from(entry.status.as_str()) == wanted)
		.map(|entry| to_order(entry, fee_rate))
		.transpose()
}

/// Picks the most recently created finished order that carries a channel point.
fn latest_finished(list: &[OfferOrder], fee_rate: u64) -> Result<Option<Order>, MarketplaceError> {
	let mut latest: Option<(&OfferOrder, Order)> = None;
	for entry in list {
		if OrderStatus::from(entry.status.as_str()) != OrderStatus::Finished {
			continue;
		}
		let order = to_order(entry, fee_rate)?;
		if order.channel_point.is_none() {
			continue;
		}
		let newer = match &latest {
			Some((current, _)) => entry.created_at > current.created_at,
			None => true,
		};
		if newer {
			latest = Some((entry, order));
		}
	}
	Ok(latest.map(|(_, order)| order))
}

impl AmbossClient {
	/// Creates a client for `endpoint`. An empty token sends no authorization.
	pub fn new(
		endpoint: impl Into<String>,
		token: SecretString,
		timeout: Duration,
	) -> Result<Self, MarketplaceError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| MarketplaceError::Network(e.to_string()))?;

		Ok(Self {
			client,
			endpoint: endpoint.into(),
			token,
		})
	}

	/// Builds the POST carrying `{query, variables}`. The bearer header is
	/// left out when no token is configured.
	fn graphql_request(&self, query: &str, variables: Value) -> reqwest::RequestBuilder {
		let request = self
			.client
			.post(&self.endpoint)
			.json(&GraphQlRequest { query, variables });
		if self.token.is_empty() {
			request
		} else {
			request.bearer_auth(self.token.expose_secret())
		}
	}

	async fn execute<T: DeserializeOwned>(
		&self,
		query: &str,
		variables: Value,
	) -> Result<T, MarketplaceError> {
		let response = self
			.graphql_request(query, variables)
			.send()
			.await
			.map_err(|e| MarketplaceError::Network(e.to_string()))?;

		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| MarketplaceError::Network(e.to_string()))?;

		parse_response(status.as_u16(), &body)
	}

	async fn offer_orders(&self, query: &str) -> Result<(Vec<OfferOrder>, u64), MarketplaceError> {
		let data: OrdersData = self.execute(query, json!({})).await?;
		Ok((
			data.get_offer_orders.list,
			fee_rate(data.get_mempool_fees.hour_fee),
		))
	}

	async fn node_info(&self, pubkey: &str) -> Result<NodeInfo, MarketplaceError> {
		let data: NodeData = self
			.execute(NODE_QUERY, json!({ "pubkey": pubkey }))
			.await?;
		Ok(data
			.get_node
			.and_then(|n| n.graph_info)
			.and_then(|g| g.node)
			.unwrap_or_default())
	}

	async fn mutate(&self, mutation: &str, variables: Value) -> Result<(), MarketplaceError> {
		let _: Value = self.execute(mutation, variables).await?;
		Ok(())
	}
}

/// Interprets a GraphQL HTTP response body.
fn parse_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, MarketplaceError> {
	let response: GraphQlResponse<T> = match serde_json::from_str(body) {
		Ok(response) => response,
		Err(e) if (200..300).contains(&status) => {
			return Err(MarketplaceError::InvalidResponse(e.to_string()))
		},
		Err(_) => {
			return Err(MarketplaceError::Api(format!(
				"HTTP {}: {}",
				status,
				body.trim()
			)))
		},
	};

	if !response.errors.is_empty() {
		let messages: Vec<_> = response.errors.into_iter().map(|e| e.message).collect();
		return Err(MarketplaceError::Api(messages.join("; ")));
	}

	response
		.data
		.ok_or_else(|| MarketplaceError::InvalidResponse("response without data".into()))
}

#[async_trait]
impl MarketplaceInterface for AmbossClient {
	async fn get_alias(&self, pubkey: &str) -> Result<String, MarketplaceError> {
		Ok(self.node_info(pubkey).await?.alias)
	}

	async fn get_node_addresses(&self, pubkey: &str) -> Result<Vec<String>, MarketplaceError> {
		Ok(self
			.node_info(pubkey)
			.await?
			.addresses
			.into_iter()
			.map(|a| a.addr)
			.collect())
	}

	async fn get_order(&self, bucket: OrderBucket) -> Result<Option<Order>, MarketplaceError> {
		let (mut list, fee_rate) = self.offer_orders(ORDERS_QUERY).await?;
		// Shuffled so an order that keeps failing cannot starve the others.
		list.shuffle(&mut rand::rng());
		first_in_bucket(&list, bucket, fee_rate)
	}

	async fn get_finished_order(&self) -> Result<Option<Order>, MarketplaceError> {
		let (list, fee_rate) = self.offer_orders(FINISHED_ORDERS_QUERY).await?;
		latest_finished(&list, fee_rate)
	}

	async fn accept_order(
		&self,
		order_id: &str,
		payment_request: &str,
	) -> Result<(), MarketplaceError> {
		self.mutate(
			ACCEPT_MUTATION,
			json!({ "sellerAcceptOrderId": order_id, "request": payment_request }),
		)
		.await
	}

	async fn reject_order(&self, order_id: &str) -> Result<(), MarketplaceError> {
		self.mutate(REJECT_MUTATION, json!({ "sellerRejectOrderId": order_id }))
			.await
	}

	async fn notify_channel_point(
		&self,
		order_id: &str,
		channel_point: &ChannelPoint,
	) -> Result<(), MarketplaceError> {
		self.mutate(
			ADD_TRANSACTION_MUTATION,
			json!({
				"sellerAddTransactionId": order_id,
				"transaction": channel_point.to_string(),
			}),
		)
		.await
	}
}

/// Factory function to create an Amboss client from configuration.
pub fn create_marketplace(
	config: &MarketplaceConfig,
) -> Result<Box<dyn MarketplaceInterface>, MarketplaceError> {
	Ok(Box::new(AmbossClient::new(
		config.endpoint.clone(),
		load_token(&config.token_path)?,
		Duration::from_secs(config.timeout_seconds),
	)?))
}

/// Reads the API token file, dropping surrounding whitespace.
fn load_token(path: &Path) -> Result<SecretString, MarketplaceError> {
	let token = std::fs::read_to_string(path).map_err(|e| {
		MarketplaceError::Credentials(format!(
			"Failed to load API token {}: {}",
			path.display(),
			e
		))
	})?;
	Ok(SecretString::from(token.trim()))
}
