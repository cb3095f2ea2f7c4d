//! Kind-indexed codec table.

use rustc_hash::FxHashMap;
use tracing::debug;

use lualink_core::property::{Property, PropertyKind};
use lualink_core::runtime::{PushOpts, Runtime};
use lualink_core::script::StackSlot;
use lualink_core::value::NativeValue;
use lualink_core::MarshalError;

/// Converts a native cell into script values on the stack, returning how
/// many stack values were pushed. Codecs for nested kinds recurse through
/// the registry they receive.
pub type PushFn = fn(
    &CodecRegistry,
    &mut Runtime,
    &Property,
    &NativeValue,
    PushOpts,
) -> Result<usize, MarshalError>;

/// Reads the script value at `slot` into a native cell.
pub type FetchFn = fn(
    &CodecRegistry,
    &mut Runtime,
    &Property,
    &mut NativeValue,
    StackSlot,
) -> Result<(), MarshalError>;

/// A push/fetch pair registered for one kind.
#[derive(Clone, Copy)]
pub struct CodecEntry {
    pub push: PushFn,
    pub fetch: FetchFn,
}

/// Write-once table mapping each property kind to its codec pair.
#[derive(Default)]
pub struct CodecRegistry {
    entries: FxHashMap<PropertyKind, CodecEntry>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the codec pair for a kind. Each kind may be registered at
    /// most once; a second registration is rejected so a later module cannot
    /// silently shadow an installed codec.
    pub fn register(
        &mut self,
        kind: PropertyKind,
        push: PushFn,
        fetch: FetchFn,
    ) -> Result<(), MarshalError> {
        if self.entries.contains_key(&kind) {
            return Err(MarshalError::DuplicateCodec { kind });
        }
        debug!(?kind, "registering codec");
        self.entries.insert(kind, CodecEntry { push, fetch });
        Ok(())
    }

    pub fn lookup_pusher(&self, kind: PropertyKind) -> Option<PushFn> {
        self.entries.get(&kind).map(|entry| entry.push)
    }

    pub fn lookup_fetcher(&self, kind: PropertyKind) -> Option<FetchFn> {
        self.entries.get(&kind).map(|entry| entry.fetch)
    }

    pub fn contains(&self, kind: PropertyKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_stub(
        _: &CodecRegistry,
        _: &mut Runtime,
        _: &Property,
        _: &NativeValue,
        _: PushOpts,
    ) -> Result<usize, MarshalError> {
        Ok(1)
    }

    fn fetch_stub(
        _: &CodecRegistry,
        _: &mut Runtime,
        _: &Property,
        _: &mut NativeValue,
        _: StackSlot,
    ) -> Result<(), MarshalError> {
        Ok(())
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = CodecRegistry::new();
        registry
            .register(PropertyKind::Int32, push_stub, fetch_stub)
            .unwrap();

        assert!(registry.contains(PropertyKind::Int32));
        assert!(registry.lookup_pusher(PropertyKind::Int32).is_some());
        assert!(registry.lookup_fetcher(PropertyKind::Str).is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = CodecRegistry::new();
        registry
            .register(PropertyKind::Bool, push_stub, fetch_stub)
            .unwrap();

        let err = registry
            .register(PropertyKind::Bool, push_stub, fetch_stub)
            .unwrap_err();
        assert_eq!(
            err,
            MarshalError::DuplicateCodec {
                kind: PropertyKind::Bool
            }
        );
    }
}
