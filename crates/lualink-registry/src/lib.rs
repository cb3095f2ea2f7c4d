//! Codec registry: per-kind dispatch of push and fetch conversions.
//!
//! The engine never switches on [`PropertyKind`](lualink_core::PropertyKind)
//! itself. One codec pair is
//! registered per kind, and supporting a new kind means registering another
//! pair, not growing a match inside the marshaller.

pub mod registry;

pub use registry::{CodecEntry, CodecRegistry, FetchFn, PushFn};
