//! Fee rate guardrails.

use lease_config::FeeConfig;

/// Which sub-workflow a fee decision is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeMode {
	/// Accepting an order. Only the ceiling applies.
	Approval,
	/// Opening a channel. The ceiling applies and low rates are raised to the floor.
	ChannelOpen,
}

/// Result of checking a suggested fee rate against the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeDecision {
	/// Continue with this effective rate in sat/vbyte.
	Proceed(u64),
	/// The suggested rate exceeds the ceiling; nothing may be mutated.
	AboveCeiling { rate: u64, max: u64 },
}

/// Applies the fee ceiling, and for channel opens the floor, to `rate`.
pub fn clamp_or_reject(rate: u64, min: u64, max: u64, mode: FeeMode) -> FeeDecision {
	if rate > max {
		return FeeDecision::AboveCeiling { rate, max };
	}
	match mode {
		FeeMode::Approval => FeeDecision::Proceed(rate),
		FeeMode::ChannelOpen => FeeDecision::Proceed(rate.max(min)),
	}
}

/// Fee bounds taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct FeePolicy {
	bounds: FeeConfig,
}

impl FeePolicy {
	/// Creates a policy from the configured floor and ceiling.
	pub fn new(bounds: FeeConfig) -> Self {
		Self { bounds }
	}

	/// Applies the configured bounds to a suggested rate.
	pub fn decide(&self, rate: u64, mode: FeeMode) -> FeeDecision {
		clamp_or_reject(rate, self.bounds.min_fee, self.bounds.max_fee, mode)
	}

	/// Rate used for cooperative closes.
	pub fn floor(&self) -> u64 {
		self.bounds.min_fee
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_above_ceiling_rejected_in_both_modes() {
		for mode in [FeeMode::Approval, FeeMode::ChannelOpen] {
			for rate in [11, 15, 1_000] {
				assert_eq!(
					clamp_or_reject(rate, 2, 10, mode),
					FeeDecision::AboveCeiling { rate, max: 10 }
				);
			}
		}
	}

	#[test]
	fn test_channel_open_floors_at_min() {
		for rate in 0..2 {
			assert_eq!(
				clamp_or_reject(rate, 2, 10, FeeMode::ChannelOpen),
				FeeDecision::Proceed(2)
			);
		}
		assert_eq!(
			clamp_or_reject(7, 2, 10, FeeMode::ChannelOpen),
			FeeDecision::Proceed(7)
		);
	}

	#[test]
	fn test_approval_has_no_floor() {
		assert_eq!(
			clamp_or_reject(1, 2, 10, FeeMode::Approval),
			FeeDecision::Proceed(1)
		);
		assert_eq!(
			clamp_or_reject(10, 2, 10, FeeMode::Approval),
			FeeDecision::Proceed(10)
		);
	}

	#[test]
	fn test_policy_uses_config_bounds() {
		let policy = FeePolicy::new(FeeConfig {
			min_fee: 3,
			max_fee: 4,
		});
		assert_eq!(policy.decide(1, FeeMode::ChannelOpen), FeeDecision::Proceed(3));
		assert_eq!(
			policy.decide(5, FeeMode::Approval),
			FeeDecision::AboveCeiling { rate: 5, max: 4 }
		);
		assert_eq!(policy.floor(), 3);
	}
}
