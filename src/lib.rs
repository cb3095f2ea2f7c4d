//! Marshalling engine between a dynamic scripting runtime's stack and a
//! reflection-described native object model.
//!
//! Values cross the boundary through per-kind codec pairs dispatched by a
//! [`CodecRegistry`]: *push* converts a native cell into script values,
//! *fetch* reads a script value into a native cell. The [`call`] module
//! marshals whole function invocations on top of that, including the
//! script-override trampoline dance. Build a registry with [`initialize`]
//! and thread it explicitly into every operation; there is no global state.
//!
//! ```
//! use lualink::{initialize, push_property, fetch_property};
//! use lualink::{NativeValue, Property, PropertyType, PushOpts, Runtime};
//!
//! let registry = initialize().unwrap();
//! let mut rt = Runtime::new();
//! let health = Property::new("Health", PropertyType::Int32);
//!
//! let pushed = push_property(&registry, &mut rt, &health, &NativeValue::Int(75), PushOpts::default());
//! assert_eq!(pushed, 1);
//!
//! let mut cell = NativeValue::Zeroed;
//! assert!(fetch_property(&registry, &mut rt, &health, &mut cell, -1));
//! assert_eq!(cell, NativeValue::Int(75));
//! ```

pub mod call;
pub mod codecs;
pub mod marshal;

pub use call::{call_function, fire_delegate, process_event, process_internal, CallFrame, TrampolineGuard};
pub use marshal::{fetch_property, push_property};

pub use lualink_core::{
    ArrayValue, CallArgs, ClassDef, ClassRef, DelegateBinding, DelegateId, DelegateStore, EnumDef,
    FetchPolicy, FunctionDef, FunctionFlags, MapValue, MarshalError, Name, NameHash, NativeEntry,
    NativeFn, NativeValue, ObjectHandle, ObjectHeap, Property, PropertyFlags, PropertyKind,
    PropertyType, PushOpts, Runtime, ScriptKey, ScriptStack, ScriptValue, SetValue, SparseCell,
    StackSlot, StructDef, StructValue,
};
pub use lualink_registry::CodecRegistry;

/// Build a registry with the default codecs installed. Call once during
/// startup and keep the handle; registration is write-once per kind.
pub fn initialize() -> Result<CodecRegistry, MarshalError> {
    let mut registry = CodecRegistry::new();
    codecs::install_defaults(&mut registry)?;
    Ok(registry)
}
