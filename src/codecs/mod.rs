//! Built-in codec pairs, one per property kind.

pub mod aggregate;
pub mod container;
pub mod delegate;
pub mod scalar;

use lualink_core::MarshalError;
use lualink_registry::CodecRegistry;

/// Install the default codec pair for every supported kind. Called once at
/// startup, before any marshalling.
pub fn install_defaults(registry: &mut CodecRegistry) -> Result<(), MarshalError> {
    scalar::install(registry)?;
    container::install(registry)?;
    aggregate::install(registry)?;
    delegate::install(registry)?;
    Ok(())
}
