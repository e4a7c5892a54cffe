//! Configuration loading for taskwatch.
//!
//! Resolves a [`SyncConfig`] from an explicit file, inline JSON, a default
//! file location or built-in defaults, applies environment overrides and
//! validates the result before any connection is attempted.

#![allow(missing_docs)]

pub mod error;
pub mod loader;
pub mod util;
pub mod validation;

pub use error::ConfigLoadError;
pub use loader::{ConfigLoad, ConfigLoader, SyncConfigSource};
pub use taskwatch_core::SyncConfig;
pub use validation::validate;

/// Load from the process environment and default file locations.
pub fn load_from_env() -> Result<ConfigLoad, ConfigLoadError> {
    ConfigLoader::new().load()
}
