//! Storage namespaces used by the pipeline.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Pending webhook jobs, keyed by process id.
	WebhookRetry,
	/// Terminal dispatch records, keyed by process id.
	WebhookOutcome,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::WebhookRetry => "webhook_retry",
			StorageKey::WebhookOutcome => "webhook_outcome",
		}
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[Self::WebhookRetry, Self::WebhookOutcome].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"webhook_retry" => Ok(Self::WebhookRetry),
			"webhook_outcome" => Ok(Self::WebhookOutcome),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
