//! Aggregate codecs: enums, structs, and class/object references.

use std::sync::Arc;

use lualink_core::property::{Property, PropertyKind, PropertyType};
use lualink_core::runtime::{FetchPolicy, PushOpts, Runtime};
use lualink_core::script::{ScriptKey, ScriptValue, StackSlot};
use lualink_core::value::{NativeValue, StructValue};
use lualink_core::MarshalError;
use lualink_registry::CodecRegistry;

use crate::marshal::{fetch_property, push_property};

pub fn install(registry: &mut CodecRegistry) -> Result<(), MarshalError> {
    registry.register(PropertyKind::Enum, push_enum, fetch_enum)?;
    registry.register(PropertyKind::Struct, push_struct, fetch_struct)?;
    registry.register(PropertyKind::Class, push_class, fetch_class)?;
    registry.register(PropertyKind::Object, push_object, fetch_object)?;
    Ok(())
}

fn mismatch(property: &Property, expected: &'static str, actual: &'static str) -> MarshalError {
    MarshalError::TypeMismatch {
        property: property.name.clone(),
        expected,
        actual,
    }
}

/// Enums marshal as their underlying integer, never as a symbolic name.
fn push_enum(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    _opts: PushOpts,
) -> Result<usize, MarshalError> {
    let value = cell
        .as_int()
        .ok_or_else(|| mismatch(property, "int", cell.type_name()))?;
    rt.stack.push(ScriptValue::Integer(value));
    Ok(1)
}

/// The fetched integer is written straight into the underlying storage; no
/// check against the enum's declared value set is performed.
fn fetch_enum(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let PropertyType::Enum { underlying, .. } = &property.ty else {
        return Err(mismatch(property, "enum", cell.type_name()));
    };
    match registry.lookup_fetcher(underlying.kind()) {
        Some(fetcher) => fetcher(registry, rt, underlying, cell, slot),
        None => Err(MarshalError::UnknownKind {
            property: property.name.clone(),
            kind: underlying.kind(),
        }),
    }
}

fn push_struct(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    opts: PushOpts,
) -> Result<usize, MarshalError> {
    let sv = match cell {
        NativeValue::Struct(sv) => sv,
        // unresolved layout or unconstructed cell degrades to nil
        _ => {
            return Err(MarshalError::ResolutionFailure {
                property: property.name.clone(),
            });
        }
    };

    rt.stack.push_new_table();
    for (field, field_cell) in sv.layout.fields.iter().zip(sv.fields.iter()) {
        rt.stack
            .push(ScriptValue::Str(field.name.as_str().to_owned()));
        push_property(registry, rt, field, field_cell, opts);
        rt.stack.set_pair(-3)?;
    }
    Ok(1)
}

fn fetch_struct(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let PropertyType::Struct { layout } = &property.ty else {
        return Err(mismatch(property, "struct", cell.type_name()));
    };
    let Some(layout) = layout else {
        return Err(MarshalError::ResolutionFailure {
            property: property.name.clone(),
        });
    };
    let table_id = match rt.stack.value_at(slot)? {
        ScriptValue::Table(id) => *id,
        other => return Err(mismatch(property, "table", other.kind_name())),
    };

    let mut sv = match std::mem::replace(cell, NativeValue::Zeroed) {
        NativeValue::Struct(sv) => sv,
        NativeValue::Zeroed => StructValue::initialize(Arc::clone(layout), &mut rt.delegates),
        other => {
            *cell = other;
            return Err(mismatch(property, "struct", cell.type_name()));
        }
    };

    let fields = Arc::clone(&sv.layout);
    for (field, field_cell) in fields.fields.iter().zip(sv.fields.iter_mut()) {
        let entry = rt
            .stack
            .table(table_id)
            .and_then(|table| table.get(&ScriptKey::Str(field.name.as_str().to_owned())))
            .cloned();
        // missing keys leave the field at its current value
        let Some(value) = entry else { continue };
        rt.stack.push(value);
        fetch_property(registry, rt, field, field_cell, -1);
        rt.stack.pop(1);
    }

    *cell = NativeValue::Struct(sv);
    Ok(())
}

fn push_class(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    _opts: PushOpts,
) -> Result<usize, MarshalError> {
    match cell {
        NativeValue::Class(Some(class)) => {
            rt.stack.push(ScriptValue::Class(class.clone()));
        }
        NativeValue::Class(None) | NativeValue::Zeroed => rt.stack.push_nil(),
        other => return Err(mismatch(property, "class", other.type_name())),
    }
    Ok(1)
}

fn fetch_class(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let class = match rt.stack.value_at(slot)? {
        ScriptValue::Class(class) => Some(class.clone()),
        ScriptValue::Nil => None,
        other if rt.policy == FetchPolicy::Strict => {
            return Err(mismatch(property, "class", other.kind_name()));
        }
        _ => None,
    };
    *cell = NativeValue::Class(class);
    Ok(())
}

/// A null reference pushes nil, not an error.
fn push_object(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    _opts: PushOpts,
) -> Result<usize, MarshalError> {
    match cell {
        NativeValue::Object(Some(handle)) => {
            rt.stack.push(ScriptValue::Object(*handle));
        }
        NativeValue::Object(None) | NativeValue::Zeroed => rt.stack.push_nil(),
        other => return Err(mismatch(property, "object", other.type_name())),
    }
    Ok(1)
}

fn fetch_object(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let handle = match rt.stack.value_at(slot)? {
        ScriptValue::Object(handle) => Some(*handle),
        ScriptValue::Nil => None,
        other if rt.policy == FetchPolicy::Strict => {
            return Err(mismatch(property, "object", other.kind_name()));
        }
        _ => None,
    };

    // the cell owns a counted reference; swap counts before overwriting
    if let Some(handle) = handle {
        rt.heap.add_ref(handle);
    }
    if let NativeValue::Object(Some(old)) = cell {
        rt.heap.release(*old);
    }
    *cell = NativeValue::Object(handle);
    Ok(())
}
