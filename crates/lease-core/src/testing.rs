//! Recording doubles of the node and the marketplace.
//!
//! Each double is configured through public fields, then turned into the
//! service the handlers consume together with a shared log of every call it
//! received.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use lease_config::{Config, FeeConfig, LeaseConfig, MarketplaceConfig, NodeConfig};
use lease_marketplace::{MarketplaceError, MarketplaceInterface, MarketplaceService};
use lease_node::{NodeError, NodeInterface, NodeService, OpenStatusStream, OpenStatusUpdate};
use lease_types::{ChannelPoint, NodeIdentity, Order, OrderBucket, OrderStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type CallLog<T> = Arc<Mutex<Vec<T>>>;

pub const PAYMENT_REQUEST: &str = "lnbc10m1fake";
pub const CLOSING_TXID: &str = "closing-txid";

pub fn peer() -> String {
	format!("02{}", "aa".repeat(32))
}

pub fn funding_point() -> ChannelPoint {
	ChannelPoint::new("ef".repeat(32), 1).unwrap()
}

pub fn expired_point() -> ChannelPoint {
	ChannelPoint::new("cd".repeat(32), 0).unwrap()
}

fn order(id: &str, fee_rate: u64, status: OrderStatus) -> Order {
	Order {
		id: id.into(),
		peer: peer(),
		channel_size: 1_000_000,
		invoice_amount: 1_000_000,
		fee_rate,
		status,
		channel_point: None,
	}
}

pub fn approval_order(fee_rate: u64) -> Order {
	order("O1", fee_rate, OrderStatus::WaitingForSellerApproval)
}

pub fn channel_open_order(fee_rate: u64) -> Order {
	order("O2", fee_rate, OrderStatus::WaitingForChannelOpen)
}

pub fn finished_order() -> Order {
	Order {
		channel_point: Some(expired_point()),
		..order("O3", 4, OrderStatus::Finished)
	}
}

pub fn test_config(reject_on_failure: bool, close_expired: bool) -> Config {
	Config {
		node: NodeConfig {
			address: "localhost:8080".into(),
			macaroon_path: "admin.macaroon".into(),
			tls_cert_path: "tls.cert".into(),
			timeout_seconds: 50,
		},
		marketplace: MarketplaceConfig {
			endpoint: "https://api.amboss.space/graphql".into(),
			token_path: "api.key".into(),
			timeout_seconds: 50,
		},
		fees: FeeConfig {
			min_fee: 2,
			max_fee: 10,
		},
		lease: LeaseConfig {
			period_seconds: 0,
			reject_on_failure,
			close_expired,
			invoice_expiry_seconds: 3600,
			notify_delay_seconds: 0,
		},
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCall {
	Identity,
	AvailableFunds,
	Connect {
		pubkey: String,
		address: String,
	},
	CreateInvoice {
		amount: u64,
		expiry_seconds: u64,
		memo: String,
	},
	OpenChannel {
		amount: u64,
		fee_rate: u64,
		peer: String,
	},
	IsChannelOpen(ChannelPoint),
	CloseChannel {
		fee_rate: u64,
		channel_point: ChannelPoint,
	},
}

impl NodeCall {
	pub fn is_mutation(&self) -> bool {
		matches!(
			self,
			NodeCall::Connect { .. }
				| NodeCall::CreateInvoice { .. }
				| NodeCall::OpenChannel { .. }
				| NodeCall::CloseChannel { .. }
		)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectBehavior {
	#[default]
	Succeed,
	AlreadyConnected,
	Fail,
}

#[derive(Debug, Clone)]
pub struct FakeNode {
	pub alias: String,
	pub funds: u64,
	pub connect: ConnectBehavior,
	pub identity_fails: bool,
	pub invoice_fails: bool,
	pub open_fails: bool,
	pub channel_open: bool,
}

impl Default for FakeNode {
	fn default() -> Self {
		Self {
			alias: "seller".into(),
			funds: 10_000_000,
			connect: ConnectBehavior::Succeed,
			identity_fails: false,
			invoice_fails: false,
			open_fails: false,
			channel_open: true,
		}
	}
}

impl FakeNode {
	pub fn into_service(self) -> (Arc<NodeService>, CallLog<NodeCall>) {
		let calls = CallLog::default();
		let node = RecordingNode {
			fake: self,
			calls: calls.clone(),
		};
		(Arc::new(NodeService::new(Box::new(node))), calls)
	}
}

struct RecordingNode {
	fake: FakeNode,
	calls: CallLog<NodeCall>,
}

impl RecordingNode {
	fn record(&self, call: NodeCall) {
		self.calls.lock().unwrap().push(call);
	}
}

#[async_trait]
impl NodeInterface for RecordingNode {
	async fn get_identity(&self) -> Result<NodeIdentity, NodeError> {
		self.record(NodeCall::Identity);
		if self.fake.identity_fails {
			return Err(NodeError::Network("connection refused".into()));
		}
		Ok(NodeIdentity {
			pubkey: format!("03{}", "bb".repeat(32)),
			alias: self.fake.alias.clone(),
		})
	}

	async fn available_funds(&self) -> Result<u64, NodeError> {
		self.record(NodeCall::AvailableFunds);
		Ok(self.fake.funds)
	}

	async fn connect(&self, pubkey: &str, address: &str) -> Result<(), NodeError> {
		self.record(NodeCall::Connect {
			pubkey: pubkey.into(),
			address: address.into(),
		});
		match self.fake.connect {
			ConnectBehavior::Succeed => Ok(()),
			ConnectBehavior::AlreadyConnected => Err(NodeError::AlreadyConnected),
			ConnectBehavior::Fail => Err(NodeError::Rpc("dial tcp: i/o timeout".into())),
		}
	}

	async fn create_invoice(
		&self,
		amount: u64,
		expiry_seconds: u64,
		memo: &str,
	) -> Result<String, NodeError> {
		self.record(NodeCall::CreateInvoice {
			amount,
			expiry_seconds,
			memo: memo.into(),
		});
		if self.fake.invoice_fails {
			return Err(NodeError::Rpc("invoice database unavailable".into()));
		}
		Ok(PAYMENT_REQUEST.into())
	}

	async fn open_channel(
		&self,
		amount: u64,
		fee_rate: u64,
		peer_pubkey: &str,
	) -> Result<OpenStatusStream, NodeError> {
		self.record(NodeCall::OpenChannel {
			amount,
			fee_rate,
			peer: peer_pubkey.into(),
		});
		if self.fake.open_fails {
			return Err(NodeError::Rpc("not enough witness outputs".into()));
		}
		Ok(stream::iter(vec![
			Ok(OpenStatusUpdate::Other),
			Ok(OpenStatusUpdate::Pending(funding_point())),
		])
		.boxed())
	}

	async fn is_channel_open(&self, channel_point: &ChannelPoint) -> Result<bool, NodeError> {
		self.record(NodeCall::IsChannelOpen(channel_point.clone()));
		Ok(self.fake.channel_open)
	}

	async fn close_channel(
		&self,
		fee_rate: u64,
		channel_point: &ChannelPoint,
	) -> Result<String, NodeError> {
		self.record(NodeCall::CloseChannel {
			fee_rate,
			channel_point: channel_point.clone(),
		});
		Ok(CLOSING_TXID.into())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketCall {
	Alias(String),
	NodeAddresses(String),
	GetOrder(OrderBucket),
	FinishedOrder,
	Accept {
		order_id: String,
		payment_request: String,
	},
	Reject(String),
	Notify {
		order_id: String,
		channel_point: ChannelPoint,
	},
}

impl MarketCall {
	pub fn is_mutation(&self) -> bool {
		matches!(
			self,
			MarketCall::Accept { .. } | MarketCall::Reject(_) | MarketCall::Notify { .. }
		)
	}
}

#[derive(Debug, Clone)]
pub struct FakeMarketplace {
	pub alias: String,
	pub addresses: Vec<String>,
	pub addresses_fail: bool,
	pub approval: Option<Order>,
	pub channel_open: Option<Order>,
	pub finished: Option<Order>,
	pub orders_fail: bool,
	pub accept_fails: bool,
	pub reject_fails: bool,
	pub notify_fails: bool,
	pub order_delay: Duration,
}

impl Default for FakeMarketplace {
	fn default() -> Self {
		Self {
			alias: "seller".into(),
			addresses: vec!["abcdef.onion:9735".into(), "1.2.3.4:9735".into()],
			addresses_fail: false,
			approval: None,
			channel_open: None,
			finished: None,
			orders_fail: false,
			accept_fails: false,
			reject_fails: false,
			notify_fails: false,
			order_delay: Duration::ZERO,
		}
	}
}

impl FakeMarketplace {
	pub fn into_service(self) -> (Arc<MarketplaceService>, CallLog<MarketCall>) {
		let calls = CallLog::default();
		let marketplace = RecordingMarketplace {
			fake: self,
			calls: calls.clone(),
		};
		(Arc::new(MarketplaceService::new(Box::new(marketplace))), calls)
	}
}

struct RecordingMarketplace {
	fake: FakeMarketplace,
	calls: CallLog<MarketCall>,
}

impl RecordingMarketplace {
	fn record(&self, call: MarketCall) {
		self.calls.lock().unwrap().push(call);
	}

	fn fail(&self, flag: bool) -> Result<(), MarketplaceError> {
		if flag {
			Err(MarketplaceError::Api("Internal server error".into()))
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl MarketplaceInterface for RecordingMarketplace {
	async fn get_alias(&self, pubkey: &str) -> Result<String, MarketplaceError> {
		self.record(MarketCall::Alias(pubkey.into()));
		Ok(self.fake.alias.clone())
	}

	async fn get_node_addresses(&self, pubkey: &str) -> Result<Vec<String>, MarketplaceError> {
		self.record(MarketCall::NodeAddresses(pubkey.into()));
		self.fail(self.fake.addresses_fail)?;
		Ok(self.fake.addresses.clone())
	}

	async fn get_order(&self, bucket: OrderBucket) -> Result<Option<Order>, MarketplaceError> {
		self.record(MarketCall::GetOrder(bucket));
		if !self.fake.order_delay.is_zero() {
			tokio::time::sleep(self.fake.order_delay).await;
		}
		self.fail(self.fake.orders_fail)?;
		Ok(match bucket {
			OrderBucket::AwaitingSellerApproval => self.fake.approval.clone(),
			OrderBucket::AwaitingChannelOpen => self.fake.channel_open.clone(),
		})
	}

	async fn get_finished_order(&self) -> Result<Option<Order>, MarketplaceError> {
		self.record(MarketCall::FinishedOrder);
		self.fail(self.fake.orders_fail)?;
		Ok(self.fake.finished.clone())
	}

	async fn accept_order(
		&self,
		order_id: &str,
		payment_request: &str,
	) -> Result<(), MarketplaceError> {
		self.record(MarketCall::Accept {
			order_id: order_id.into(),
			payment_request: payment_request.into(),
		});
		self.fail(self.fake.accept_fails)
	}

	async fn reject_order(&self, order_id: &str) -> Result<(), MarketplaceError> {
		self.record(MarketCall::Reject(order_id.into()));
		self.fail(self.fake.reject_fails)
	}

	async fn notify_channel_point(
		&self,
		order_id: &str,
		channel_point: &ChannelPoint,
	) -> Result<(), MarketplaceError> {
		self.record(MarketCall::Notify {
			order_id: order_id.into(),
			channel_point: channel_point.clone(),
		});
		self.fail(self.fake.notify_fails)
	}
}
