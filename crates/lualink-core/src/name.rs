//! Deterministic hash-based identity for reflected names.
//!
//! This module provides [`NameHash`], a 64-bit hash identifying properties,
//! functions, and classes, and [`Name`], a cheap-to-clone interned name that
//! carries its hash alongside the text. Hashes are computed deterministically
//! from names, so the same name always resolves to the same identity without
//! any registration-order dependency.
//!
//! # Hash Computation
//!
//! Uses XXHash64 with domain-specific mixing constants so that a property
//! named `foo` and a function named `foo` get distinct hashes.

use std::fmt;
use std::sync::Arc;

use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Domain marker for plain identifier hashes.
    pub const IDENT: u64 = 0x1a095090689d4647;

    /// Domain marker for function signature hashes.
    pub const FUNCTION: u64 = 0x5ea77ffbcdf5f302;

    /// Separator constant mixed between signature components.
    pub const SEP: u64 = 0x4bc94d6bd06053ad;
}

/// A deterministic 64-bit hash identifying a name.
///
/// The same input always produces the same hash, so lookups never depend on
/// the order things were registered in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NameHash(pub u64);

impl NameHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: NameHash = NameHash(0);

    /// Create a hash from an identifier.
    pub fn from_name(name: &str) -> Self {
        NameHash(xxh64(name.as_bytes(), hash_constants::IDENT))
    }

    /// Create a hash for a function signature from its name and the kind
    /// tags of its parameters.
    pub fn from_signature(name: &str, param_tags: &[u8]) -> Self {
        let mut hash = xxh64(name.as_bytes(), hash_constants::FUNCTION);
        for (position, tag) in param_tags.iter().enumerate() {
            hash = hash
                .wrapping_mul(hash_constants::SEP)
                .wrapping_add(((position as u64) << 8) | u64::from(*tag));
        }
        NameHash(hash)
    }

    /// Check whether this is the empty hash.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameHash({:#018x})", self.0)
    }
}

impl fmt::Display for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// An interned-style name: shared text plus its precomputed hash.
///
/// Equality and hashing go through the hash, so `Name` is cheap to use as a
/// map key. Cloning only bumps a reference count.
#[derive(Clone)]
pub struct Name {
    text: Arc<str>,
    hash: NameHash,
}

impl Name {
    /// Create a name from a string.
    pub fn new(text: &str) -> Self {
        Self {
            text: Arc::from(text),
            hash: NameHash::from_name(text),
        }
    }

    /// The empty name.
    pub fn none() -> Self {
        Self {
            text: Arc::from(""),
            hash: NameHash::EMPTY,
        }
    }

    /// Get the name text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Get the precomputed hash.
    pub fn hash(&self) -> NameHash {
        self.hash
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Name {}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.0.hash(state);
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Name::new(text)
    }
}

impl From<String> for Name {
    fn from(text: String) -> Self {
        Name::new(&text)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", self.text)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_hash() {
        assert_eq!(NameHash::from_name("health"), NameHash::from_name("health"));
        assert_ne!(NameHash::from_name("health"), NameHash::from_name("armor"));
    }

    #[test]
    fn signature_hash_depends_on_params() {
        let a = NameHash::from_signature("foo", &[1, 2]);
        let b = NameHash::from_signature("foo", &[2, 1]);
        assert_ne!(a, b);
    }

    #[test]
    fn name_equality_and_display() {
        let a = Name::new("Position");
        let b = Name::new("Position");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "Position");
        assert!(Name::none().hash().is_empty());
    }
}
