//! LND implementation of the node interface over its REST gateway.
//!
//! Every request carries the hex-encoded admin macaroon in the
//! `Grpc-Metadata-macaroon` header and is sent over TLS pinned to the node's
//! own certificate. Streaming calls (channel open and close) return
//! newline-delimited JSON envelopes of the form `{"result": ...}` or
//! `{"error": ...}`.

use crate::{NodeError, NodeInterface, OpenStatusStream, OpenStatusUpdate};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt};
use lease_config::NodeConfig;
use lease_types::{ChannelPoint, NodeIdentity, SecretString};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Header LND's gateway maps onto gRPC macaroon metadata.
const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// Substring LND uses when a peer connection already exists.
const ALREADY_CONNECTED: &str = "already connected";

/// Node client for LND's REST interface.
pub struct LndRestNode {
	client: reqwest::Client,
	base_url: String,
	macaroon: SecretString,
}

impl LndRestNode {
	/// Creates a client for `address` trusting the given PEM certificate.
	pub fn new(
		address: &str,
		macaroon: SecretString,
		tls_cert_pem: &[u8],
		timeout: Duration,
	) -> Result<Self, NodeError> {
		let certificate = reqwest::Certificate::from_pem(tls_cert_pem)
			.map_err(|e| NodeError::Credentials(format!("Invalid TLS certificate: {}", e)))?;

		let client = reqwest::Client::builder()
			.add_root_certificate(certificate)
			.timeout(timeout)
			.build()
			.map_err(|e| NodeError::Network(e.to_string()))?;

		Ok(Self {
			client,
			base_url: base_url(address),
			macaroon,
		})
	}

	fn request(&self, method: Method, path: &str) -> RequestBuilder {
		self.client
			.request(method, format!("{}{}", self.base_url, path))
			.header(MACAROON_HEADER, self.macaroon.expose_secret())
	}

	async fn send(&self, request: RequestBuilder) -> Result<Response, NodeError> {
		let response = request
			.send()
			.await
			.map_err(|e| NodeError::Network(e.to_string()))?;

		if response.status().is_success() {
			return Ok(response);
		}

		let status = response.status().as_u16();
		let body = response.text().await.unwrap_or_default();
		Err(rest_error(status, &body))
	}

	async fn send_json<T: DeserializeOwned>(
		&self,
		request: RequestBuilder,
	) -> Result<T, NodeError> {
		self.send(request)
			.await?
			.json::<T>()
			.await
			.map_err(|e| NodeError::InvalidResponse(e.to_string()))
	}
}

/// Builds the REST base URL from a `host:port` or a full URL.
fn base_url(address: &str) -> String {
	let address = address.trim().trim_end_matches('/');
	if address.contains("://") {
		address.to_string()
	} else {
		format!("https://{}", address)
	}
}

#[derive(Debug, Deserialize)]
struct RestError {
	#[serde(default)]
	message: String,
}

/// Maps a non-success response body to a node error.
fn rest_error(status: u16, body: &str) -> NodeError {
	let message = serde_json::from_str::<RestError>(body)
		.map(|e| e.message)
		.unwrap_or_else(|_| body.trim().to_string());

	if message.contains(ALREADY_CONNECTED) {
		NodeError::AlreadyConnected
	} else {
		NodeError::Rpc(format!("HTTP {}: {}", status, message))
	}
}

/// Accepts int64 fields encoded either as JSON strings or numbers.
fn de_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Int64 {
		Text(String),
		Number(u64),
	}

	match Int64::deserialize(deserializer)? {
		Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
		Int64::Number(n) => Ok(n),
	}
}

#[derive(Debug, Deserialize)]
struct GetInfoResponse {
	identity_pubkey: String,
	#[serde(default)]
	alias: String,
}

#[derive(Debug, Deserialize)]
struct WalletBalanceResponse {
	#[serde(default, deserialize_with = "de_u64")]
	confirmed_balance: u64,
}

#[derive(Debug, Serialize)]
struct LightningAddress<'a> {
	pubkey: &'a str,
	host: &'a str,
}

#[derive(Debug, Serialize)]
struct ConnectPeerRequest<'a> {
	addr: LightningAddress<'a>,
	perm: bool,
}

#[derive(Debug, Serialize)]
struct AddInvoiceRequest<'a> {
	memo: &'a str,
	value: String,
	expiry: String,
}

#[derive(Debug, Deserialize)]
struct AddInvoiceResponse {
	payment_request: String,
}

#[derive(Debug, Serialize)]
struct OpenChannelRequest {
	node_pubkey: String,
	local_funding_amount: String,
	sat_per_vbyte: String,
}

#[derive(Debug, Deserialize)]
struct StreamEnvelope<T> {
	result: Option<T>,
	error: Option<RestError>,
}

#[derive(Debug, Deserialize)]
struct PendingUpdate {
	txid: String,
	#[serde(default)]
	output_index: u32,
}

#[derive(Debug, Deserialize)]
struct ChannelPointJson {
	funding_txid_bytes: Option<String>,
	funding_txid_str: Option<String>,
	#[serde(default)]
	output_index: u32,
}

#[derive(Debug, Deserialize)]
struct ChannelOpenUpdate {
	channel_point: ChannelPointJson,
}

#[derive(Debug, Deserialize)]
struct OpenStatusJson {
	chan_pending: Option<PendingUpdate>,
	chan_open: Option<ChannelOpenUpdate>,
}

#[derive(Debug, Deserialize)]
struct CloseStatusJson {
	close_pending: Option<PendingUpdate>,
}

#[derive(Debug, Deserialize)]
struct ChannelJson {
	channel_point: String,
}

#[derive(Debug, Deserialize)]
struct ListChannelsResponse {
	#[serde(default)]
	channels: Vec<ChannelJson>,
}

fn decode_txid(txid_b64: &str, output_index: u32) -> Result<ChannelPoint, NodeError> {
	let bytes = STANDARD
		.decode(txid_b64)
		.map_err(|e| NodeError::InvalidResponse(format!("Invalid txid encoding: {}", e)))?;
	ChannelPoint::from_funding_bytes(&bytes, output_index)
		.map_err(|e| NodeError::InvalidResponse(e.to_string()))
}

/// Parses one envelope line of a streaming call.
fn parse_envelope<T: DeserializeOwned>(line: &[u8]) -> Result<T, NodeError> {
	let envelope: StreamEnvelope<T> = serde_json::from_slice(line)
		.map_err(|e| NodeError::InvalidResponse(format!("Invalid stream update: {}", e)))?;

	match (envelope.result, envelope.error) {
		(_, Some(error)) => Err(NodeError::Rpc(error.message)),
		(Some(result), None) => Ok(result),
		(None, None) => Err(NodeError::InvalidResponse("Empty stream update".into())),
	}
}

fn parse_open_update(line: &[u8]) -> Result<OpenStatusUpdate, NodeError> {
	let update: OpenStatusJson = parse_envelope(line)?;

	if let Some(pending) = update.chan_pending {
		return decode_txid(&pending.txid, pending.output_index).map(OpenStatusUpdate::Pending);
	}

	if let Some(open) = update.chan_open {
		let point = open.channel_point;
		let channel_point = match (point.funding_txid_str, point.funding_txid_bytes) {
			(Some(txid), _) if !txid.is_empty() => ChannelPoint::new(txid, point.output_index)
				.map_err(|e| NodeError::InvalidResponse(e.to_string()))?,
			(_, Some(txid_b64)) => decode_txid(&txid_b64, point.output_index)?,
			_ => {
				return Err(NodeError::InvalidResponse(
					"Channel open update without funding txid".into(),
				))
			},
		};
		return Ok(OpenStatusUpdate::Open(channel_point));
	}

	Ok(OpenStatusUpdate::Other)
}

/// Returns the closing txid if the line is a close-pending update.
fn parse_close_update(line: &[u8]) -> Result<Option<String>, NodeError> {
	let update: CloseStatusJson = parse_envelope(line)?;
	update
		.close_pending
		.map(|pending| decode_txid(&pending.txid, pending.output_index).map(|cp| cp.txid))
		.transpose()
}

/// Splits a chunked body into newline-terminated records.
#[derive(Debug, Default)]
struct LineBuffer {
	buffer: Vec<u8>,
}

impl LineBuffer {
	fn push(&mut self, chunk: &[u8]) {
		self.buffer.extend_from_slice(chunk);
	}

	/// Pops the next complete non-blank line.
	fn next_line(&mut self) -> Option<Vec<u8>> {
		while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
			let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
			line.pop();
			if !is_blank(&line) {
				return Some(line);
			}
		}
		None
	}

	/// Returns whatever is left once the body has ended.
	fn finish(&mut self) -> Option<Vec<u8>> {
		let rest = std::mem::take(&mut self.buffer);
		(!is_blank(&rest)).then_some(rest)
	}
}

fn is_blank(line: &[u8]) -> bool {
	line.iter().all(|b| b.is_ascii_whitespace())
}

/// Turns a streaming response into a stream of raw JSON lines.
fn json_lines(response: Response) -> stream::BoxStream<'static, Result<Vec<u8>, NodeError>> {
	stream::unfold(
		Some((response, LineBuffer::default())),
		|state| async move {
			let Some((mut response, mut lines)) = state else {
				return None;
			};
			loop {
				if let Some(line) = lines.next_line() {
					return Some((Ok(line), Some((response, lines))));
				}
				match response.chunk().await {
					Ok(Some(chunk)) => lines.push(&chunk),
					Ok(None) => return lines.finish().map(|line| (Ok(line), None)),
					Err(e) => return Some((Err(NodeError::Network(e.to_string())), None)),
				}
			}
		},
	)
	.boxed()
}

#[async_trait]
impl NodeInterface for LndRestNode {
	async fn get_identity(&self) -> Result<NodeIdentity, NodeError> {
		let info: GetInfoResponse = self.send_json(self.request(Method::GET, "/v1/getinfo")).await?;
		Ok(NodeIdentity {
			pubkey: info.identity_pubkey,
			alias: info.alias,
		})
	}

	async fn available_funds(&self) -> Result<u64, NodeError> {
		let balance: WalletBalanceResponse = self
			.send_json(self.request(Method::GET, "/v1/balance/blockchain"))
			.await?;
		Ok(balance.confirmed_balance)
	}

	async fn connect(&self, pubkey: &str, address: &str) -> Result<(), NodeError> {
		let body = ConnectPeerRequest {
			addr: LightningAddress {
				pubkey,
				host: address,
			},
			perm: false,
		};
		self.send(self.request(Method::POST, "/v1/peers").json(&body))
			.await
			.map(|_| ())
	}

	async fn create_invoice(
		&self,
		amount: u64,
		expiry_seconds: u64,
		memo: &str,
	) -> Result<String, NodeError> {
		let body = AddInvoiceRequest {
			memo,
			value: amount.to_string(),
			expiry: expiry_seconds.to_string(),
		};
		let invoice: AddInvoiceResponse = self
			.send_json(self.request(Method::POST, "/v1/invoices").json(&body))
			.await?;
		Ok(invoice.payment_request)
	}

	async fn open_channel(
		&self,
		amount: u64,
		fee_rate: u64,
		peer_pubkey: &str,
	) -> Result<OpenStatusStream, NodeError> {
		let pubkey_bytes = hex::decode(peer_pubkey)
			.map_err(|e| NodeError::InvalidResponse(format!("Invalid peer pubkey: {}", e)))?;
		let body = OpenChannelRequest {
			node_pubkey: STANDARD.encode(pubkey_bytes),
			local_funding_amount: amount.to_string(),
			sat_per_vbyte: fee_rate.to_string(),
		};

		let response = self
			.send(self.request(Method::POST, "/v1/channels/stream").json(&body))
			.await?;

		Ok(json_lines(response)
			.map(|line| line.and_then(|line| parse_open_update(&line)))
			.boxed())
	}

	async fn is_channel_open(&self, channel_point: &ChannelPoint) -> Result<bool, NodeError> {
		let list: ListChannelsResponse = self
			.send_json(self.request(Method::GET, "/v1/channels"))
			.await?;
		let wanted = channel_point.to_string();
		Ok(list.channels.iter().any(|c| c.channel_point == wanted))
	}

	async fn close_channel(
		&self,
		fee_rate: u64,
		channel_point: &ChannelPoint,
	) -> Result<String, NodeError> {
		let path = format!(
			"/v1/channels/{}/{}?sat_per_vbyte={}",
			channel_point.txid, channel_point.output_index, fee_rate
		);
		let response = self.send(self.request(Method::DELETE, &path)).await?;

		let mut lines = json_lines(response);
		while let Some(line) = lines.next().await {
			if let Some(closing_txid) = parse_close_update(&line?)? {
				return Ok(closing_txid);
			}
		}

		Err(NodeError::StreamClosed(
			"channel close stream ended before a pending update".into(),
		))
	}
}

/// Factory function to create an LND node client from configuration.
///
/// Reads the macaroon (binary, sent hex-encoded) and the TLS certificate
/// from the configured paths.
pub fn create_node(config: &NodeConfig) -> Result<Box<dyn NodeInterface>, NodeError> {
	let macaroon = std::fs::read(&config.macaroon_path).map_err(|e| {
		NodeError::Credentials(format!(
			"Failed to load macaroon {}: {}",
			config.macaroon_path.display(),
			e
		))
	})?;
	let tls_cert = std::fs::read(&config.tls_cert_path).map_err(|e| {
		NodeError::Credentials(format!(
			"Failed to load cert {}: {}",
			config.tls_cert_path.display(),
			e
		))
	})?;

	Ok(Box::new(LndRestNode::new(
		&config.address,
		SecretString::from_bytes_hex(&macaroon),
		&tls_cert,
		Duration::from_secs(config.timeout_seconds),
	)?))
}
