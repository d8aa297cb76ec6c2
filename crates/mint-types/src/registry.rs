//! Registry trait for self-registering implementations.

/// A pluggable backend exposes a `Registry` naming itself and its factory.
pub trait ImplementationRegistry {
	/// Name used under `implementations.<name>` in the configuration.
	const NAME: &'static str;

	/// Factory signature defined by the owning crate.
	type Factory;

	fn factory() -> Self::Factory;
}
