//! Common types for the liquidity lease agent.
//!
//! This crate defines the data model shared by the node client, the marketplace
//! client and the reconciliation engine, so that every component speaks about
//! orders, channel points and credentials in the same terms.

/// Channel point identifiers for funding outputs.
pub mod channel;
/// Node identity as reported by the local node.
pub mod node;
/// Marketplace orders, their lifecycle status and query buckets.
pub mod order;
/// Credential wrapper that never prints its contents.
pub mod secret_string;
/// Formatting helpers.
pub mod utils;

pub use channel::{ChannelPoint, ChannelPointError};
pub use node::NodeIdentity;
pub use order::{Order, OrderBucket, OrderStatus};
pub use secret_string::SecretString;
pub use utils::truncate_id;
