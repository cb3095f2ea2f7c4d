//! Core data model for reflected-value marshalling.
//!
//! This crate defines both sides of the boundary: the script-side value and
//! stack model ([`script`]), the native-side reflection descriptors
//! ([`property`]) and value cells ([`value`]), and the stores that tie them
//! together ([`heap`], [`delegate`], [`runtime`]). The codecs that actually
//! move values across the boundary live in the `lualink` crate.

pub mod containers;
pub mod delegate;
pub mod error;
pub mod heap;
pub mod name;
pub mod native_fn;
pub mod property;
pub mod runtime;
pub mod script;
pub mod value;

pub use containers::{ArrayValue, MapValue, SetValue};
pub use delegate::{DelegateBinding, DelegateId, DelegateSlot, DelegateStore, SparseCell};
pub use error::MarshalError;
pub use heap::{ObjectHandle, ObjectHeap, ReflectedObject};
pub use name::{Name, NameHash};
pub use native_fn::{CallArgs, NativeFn};
pub use property::{
    ClassDef, ClassRef, EnumDef, FunctionDef, FunctionFlags, NativeEntry, Property, PropertyFlags,
    PropertyKind, PropertyType, StructDef,
};
pub use runtime::{AdapterCtor, FetchPolicy, PushOpts, Runtime};
pub use script::{
    AdapterId, AdapterTarget, ClosureEntry, ClosureId, DelegateAdapter, ScriptKey, ScriptStack,
    ScriptValue, StackSlot, Table, TableId,
};
pub use value::{NativeValue, StructValue};
