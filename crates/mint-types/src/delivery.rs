//! Transaction submission and status types.
//!
//! A submitted transaction is identified by its [`TransactionHash`]; the
//! resolver turns raw provider receipts into exactly one [`StatusResult`].

use crate::utils::{with_0x_prefix, without_0x_prefix};
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Blockchain transaction hash.
///
/// Stored as raw bytes and rendered as a `0x`-prefixed lowercase hex string on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionHash(pub Vec<u8>);

impl TransactionHash {
	/// Hex representation with `0x` prefix.
	pub fn to_hex(&self) -> String {
		with_0x_prefix(&hex::encode(&self.0))
	}
}

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

impl FromStr for TransactionHash {
	type Err = hex::FromHexError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		hex::decode(without_0x_prefix(s.trim())).map(TransactionHash)
	}
}

impl Serialize for TransactionHash {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_hex())
	}
}

impl<'de> Deserialize<'de> for TransactionHash {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// Handle returned by a successful submission.
///
/// Immutable once created; consumed by the status resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHandle {
	pub tx_hash: TransactionHash,
	/// Unix timestamp in milliseconds.
	pub submitted_at: u64,
}

/// Unsigned transaction request handed to a signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
	/// Chain the transaction targets.
	pub chain_id: u64,
	/// Target contract.
	pub to: Address,
	/// ABI-encoded call data.
	#[serde(default)]
	pub data: Bytes,
	/// Native value in wei.
	#[serde(default)]
	pub value: U256,
}

/// Which signing path the active account uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerKind {
	/// Custodial signer held by the application; sends directly.
	Embedded,
	/// Externally-connected wallet; every send needs on-device confirmation.
	External,
}

impl fmt::Display for SignerKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SignerKind::Embedded => f.write_str("embedded"),
			SignerKind::External => f.write_str("external"),
		}
	}
}

/// Describes the account that should sign a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerDescriptor {
	pub kind: SignerKind,
	/// Account address when already known to the caller.
	#[serde(default)]
	pub address: Option<Address>,
}

impl SignerDescriptor {
	pub fn embedded() -> Self {
		Self {
			kind: SignerKind::Embedded,
			address: None,
		}
	}

	pub fn external() -> Self {
		Self {
			kind: SignerKind::External,
			address: None,
		}
	}
}

/// Receipt as reported by a status provider, before classification.
///
/// Both the hosted indexer and the raw RPC fallback are normalized into this
/// shape. An absent `receipt_status` means the transaction is not confirmed
/// yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReceipt {
	pub receipt_status: Option<String>,
	pub block_number: Option<u64>,
	pub gas_used: Option<u64>,
	pub gas_price: Option<u128>,
}

impl ProviderReceipt {
	/// A response that carries no receipt yet.
	pub fn pending() -> Self {
		Self::default()
	}
}

/// Terminal status of a transaction.
///
/// Produced once per hash and never mutated. `Unknown` is never equivalent to
/// `Confirmed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusResult {
	Confirmed {
		block_number: u64,
		gas_used: u64,
		effective_gas_price: u128,
	},
	Reverted {
		reason: Option<String>,
	},
	/// Timed out, or every provider was unavailable.
	Unknown,
}

impl StatusResult {
	pub fn is_confirmed(&self) -> bool {
		matches!(self, StatusResult::Confirmed { .. })
	}
}
