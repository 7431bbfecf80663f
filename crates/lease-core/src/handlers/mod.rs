//! Sub-workflow handlers for the reconciliation round.

pub mod approval;
pub mod channel_open;
pub mod expiry;
pub mod reject;

pub use approval::ApprovalHandler;
pub use channel_open::ChannelOpenHandler;
pub use expiry::ExpiryHandler;
pub use reject::RejectPolicy;
