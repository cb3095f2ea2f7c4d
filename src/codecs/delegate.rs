//! Delegate codecs: single-bind, multicast-inline, and multicast-sparse.
//!
//! Push wraps the native slot and its call signature into a script-callable
//! adapter; the adapter's concrete representation comes from the runtime's
//! injected constructor, not from the codec. Fetch adapts a script closure
//! into a binding: single-bind slots are overwritten, multicast slots get
//! an append-unique. Which multicast representation exists is a build-time
//! choice: the `legacy-multicast` feature selects the older inline-only
//! kind, otherwise the inline and sparse pair is registered.

use std::sync::Arc;

use lualink_core::delegate::{DelegateBinding, DelegateSlot};
use lualink_core::property::{FunctionDef, Property, PropertyKind, PropertyType};
use lualink_core::runtime::{PushOpts, Runtime};
use lualink_core::script::{AdapterTarget, DelegateAdapter, ScriptValue, StackSlot};
use lualink_core::value::NativeValue;
use lualink_core::MarshalError;
use lualink_registry::CodecRegistry;

pub fn install(registry: &mut CodecRegistry) -> Result<(), MarshalError> {
    registry.register(PropertyKind::Delegate, push_single, fetch_single)?;
    #[cfg(feature = "legacy-multicast")]
    registry.register(PropertyKind::Multicast, push_multicast, fetch_multicast)?;
    #[cfg(not(feature = "legacy-multicast"))]
    {
        registry.register(PropertyKind::MulticastInline, push_multicast, fetch_multicast)?;
        registry.register(PropertyKind::MulticastSparse, push_sparse, fetch_sparse)?;
    }
    Ok(())
}

fn mismatch(property: &Property, expected: &'static str, actual: &'static str) -> MarshalError {
    MarshalError::TypeMismatch {
        property: property.name.clone(),
        expected,
        actual,
    }
}

fn signature_of(property: &Property) -> Result<&Arc<FunctionDef>, MarshalError> {
    match &property.ty {
        PropertyType::Delegate { signature }
        | PropertyType::Multicast { signature }
        | PropertyType::MulticastInline { signature }
        | PropertyType::MulticastSparse { signature } => Ok(signature),
        _ => Err(MarshalError::ResolutionFailure {
            property: property.name.clone(),
        }),
    }
}

fn push_adapter(
    rt: &mut Runtime,
    target: AdapterTarget,
    signature: &Arc<FunctionDef>,
) -> usize {
    let adapter = DelegateAdapter {
        target,
        signature: signature.signature_hash(),
    };
    let id = (rt.adapter_ctor)(&mut rt.stack, adapter);
    rt.stack.push(ScriptValue::Adapter(id));
    1
}

fn closure_binding(
    rt: &Runtime,
    property: &Property,
    signature: &Arc<FunctionDef>,
    slot: StackSlot,
) -> Result<Option<DelegateBinding>, MarshalError> {
    match rt.stack.value_at(slot)? {
        ScriptValue::Closure(closure) => Ok(Some(DelegateBinding {
            closure: *closure,
            signature: signature.signature_hash(),
        })),
        ScriptValue::Nil => Ok(None),
        other => Err(mismatch(property, "function", other.kind_name())),
    }
}

fn push_single(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    _opts: PushOpts,
) -> Result<usize, MarshalError> {
    let signature = signature_of(property)?;
    match cell {
        NativeValue::Delegate(id) => {
            Ok(push_adapter(rt, AdapterTarget::Slot(*id), signature))
        }
        NativeValue::Zeroed => {
            rt.stack.push_nil();
            Ok(1)
        }
        other => Err(mismatch(property, "delegate", other.type_name())),
    }
}

fn fetch_single(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let signature = signature_of(property)?;
    let binding = closure_binding(rt, property, signature, slot)?;

    if matches!(cell, NativeValue::Zeroed) {
        *cell = NativeValue::Delegate(rt.delegates.allocate_single());
    }
    let NativeValue::Delegate(id) = cell else {
        return Err(mismatch(property, "delegate", cell.type_name()));
    };
    match binding {
        // overwrite semantics for single-bind
        Some(binding) => {
            rt.delegates.bind(*id, binding);
        }
        None => {
            if let Some(DelegateSlot::Single(current)) = rt.delegates.slot_mut(*id) {
                *current = None;
            }
        }
    }
    Ok(())
}

fn push_multicast(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    _opts: PushOpts,
) -> Result<usize, MarshalError> {
    let signature = signature_of(property)?;
    match cell {
        NativeValue::Multicast(id) => {
            Ok(push_adapter(rt, AdapterTarget::Slot(*id), signature))
        }
        NativeValue::Zeroed => {
            rt.stack.push_nil();
            Ok(1)
        }
        other => Err(mismatch(property, "multicast delegate", other.type_name())),
    }
}

fn fetch_multicast(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let signature = signature_of(property)?;
    let binding = closure_binding(rt, property, signature, slot)?;

    if matches!(cell, NativeValue::Zeroed) {
        *cell = NativeValue::Multicast(rt.delegates.allocate_multicast());
    }
    let NativeValue::Multicast(id) = cell else {
        return Err(mismatch(property, "multicast delegate", cell.type_name()));
    };
    match binding {
        // duplicates are not re-added
        Some(binding) => {
            rt.delegates.add_unique(*id, binding);
        }
        None => {
            if let Some(DelegateSlot::Multicast(bindings)) = rt.delegates.slot_mut(*id) {
                bindings.clear();
            }
        }
    }
    Ok(())
}

#[cfg(not(feature = "legacy-multicast"))]
fn push_sparse(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    _opts: PushOpts,
) -> Result<usize, MarshalError> {
    let signature = signature_of(property)?;
    match cell {
        NativeValue::Sparse(sparse) => Ok(push_adapter(
            rt,
            AdapterTarget::Sparse(sparse.clone()),
            signature,
        )),
        NativeValue::Zeroed => {
            rt.stack.push_nil();
            Ok(1)
        }
        other => Err(mismatch(property, "sparse delegate", other.type_name())),
    }
}

#[cfg(not(feature = "legacy-multicast"))]
fn fetch_sparse(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    use lualink_core::delegate::SparseCell;

    let signature = signature_of(property)?;
    let binding = closure_binding(rt, property, signature, slot)?;

    if matches!(cell, NativeValue::Zeroed) {
        *cell = NativeValue::Sparse(SparseCell {
            owner: None,
            property: property.name.hash(),
        });
    }
    let NativeValue::Sparse(sparse) = cell else {
        return Err(mismatch(property, "sparse delegate", cell.type_name()));
    };
    match binding {
        Some(binding) => {
            rt.delegates.sparse_add_unique(sparse, binding);
        }
        None => {
            let existing = rt.delegates.sparse_bindings(sparse).to_vec();
            for binding in existing {
                rt.delegates.sparse_remove(sparse, binding);
            }
        }
    }
    Ok(())
}
