//! Delay between webhook attempts.

use mint_config::{BackoffKind, WebhookConfig};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
	/// Same delay after every failure.
	Fixed(Duration),
	/// `base * 2^(n-1)` after the n-th failure, capped at `max`.
	Exponential { base: Duration, max: Duration },
}

impl RetryPolicy {
	/// Delay after `failures` consecutive failed attempts (1-based).
	pub fn delay(&self, failures: u32) -> Duration {
		match *self {
			RetryPolicy::Fixed(delay) => delay,
			RetryPolicy::Exponential { base, max } => {
				let factor = 2u32.saturating_pow(failures.saturating_sub(1));
				base.saturating_mul(factor).min(max)
			},
		}
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		RetryPolicy::Fixed(Duration::from_secs(10))
	}
}

impl From<&WebhookConfig> for RetryPolicy {
	fn from(config: &WebhookConfig) -> Self {
		match config.backoff {
			BackoffKind::Fixed => RetryPolicy::Fixed(config.retry_delay()),
			BackoffKind::Exponential => RetryPolicy::Exponential {
				base: config.retry_delay(),
				max: config.max_retry_delay(),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fixed_delay() {
		let policy = RetryPolicy::default();
		assert_eq!(policy.delay(1), Duration::from_secs(10));
		assert_eq!(policy.delay(17), Duration::from_secs(10));
	}

	#[test]
	fn test_exponential_is_capped() {
		let policy = RetryPolicy::Exponential {
			base: Duration::from_secs(10),
			max: Duration::from_secs(60),
		};
		assert_eq!(policy.delay(1), Duration::from_secs(10));
		assert_eq!(policy.delay(2), Duration::from_secs(20));
		assert_eq!(policy.delay(3), Duration::from_secs(40));
		assert_eq!(policy.delay(4), Duration::from_secs(60));
		assert_eq!(policy.delay(40), Duration::from_secs(60));
	}
}
