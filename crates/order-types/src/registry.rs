//! Registry trait for self-registering backend implementations.

/// Base trait for implementation registries.
///
/// Every pluggable backend module exposes a `Registry` struct implementing
/// this trait, tying the name used under `[storage.implementations.<name>]`
/// (or `[cache.implementations.<name>]`) to its factory function.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// for example "memory" or "file".
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds the implementation from its TOML table.
	fn factory() -> Self::Factory;
}
