//! Common types for the mint confirmation pipeline.
//!
//! Shared data model used by the submitter, the status resolver and the
//! retryable webhook dispatcher, together with the configuration validation
//! framework and small formatting helpers.

/// Transaction submission and receipt types.
pub mod delivery;
/// Webhook job, payload and terminal outcome types.
pub mod dispatch;
/// Pipeline events and the broadcast event bus.
pub mod events;
/// Registry trait for named implementations.
pub mod registry;
/// Redacting wrapper for secrets such as keys and API tokens.
pub mod secret_string;
/// Storage namespaces.
pub mod storage;
/// Formatting and time helpers.
pub mod utils;
/// Configuration validation types.
pub mod validation;

pub use delivery::*;
pub use dispatch::*;
pub use events::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{current_timestamp_millis, truncate_id, with_0x_prefix, without_0x_prefix};
pub use validation::*;

pub use alloy_primitives::{Address, Bytes, U256};
