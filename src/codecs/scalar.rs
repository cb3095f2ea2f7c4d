//! Scalar codecs: integers of every width, floats, booleans, and the three
//! text representations.
//!
//! Fetches are permissive by default: the script runtime's own coercion
//! rules apply (numeric strings parse, any value has a truthiness) and a
//! value that cannot coerce yields the kind's zero value. `FetchPolicy::
//! Strict` turns those mismatches into errors instead.

use lualink_core::name::Name;
use lualink_core::property::{Property, PropertyKind};
use lualink_core::runtime::{FetchPolicy, PushOpts, Runtime};
use lualink_core::script::{ScriptValue, StackSlot};
use lualink_core::value::NativeValue;
use lualink_core::MarshalError;
use lualink_registry::CodecRegistry;

pub fn install(registry: &mut CodecRegistry) -> Result<(), MarshalError> {
    for kind in [
        PropertyKind::Int8,
        PropertyKind::Int16,
        PropertyKind::Int32,
        PropertyKind::Int64,
        PropertyKind::UInt8,
        PropertyKind::UInt16,
        PropertyKind::UInt32,
        PropertyKind::UInt64,
    ] {
        registry.register(kind, push_int, fetch_int)?;
    }
    registry.register(PropertyKind::Float, push_number, fetch_number)?;
    registry.register(PropertyKind::Double, push_number, fetch_number)?;
    registry.register(PropertyKind::Bool, push_bool, fetch_bool)?;
    registry.register(PropertyKind::Str, push_str, fetch_str)?;
    registry.register(PropertyKind::Text, push_str, fetch_str)?;
    registry.register(PropertyKind::Name, push_name, fetch_name)?;
    Ok(())
}

fn mismatch(property: &Property, expected: &'static str, actual: &'static str) -> MarshalError {
    MarshalError::TypeMismatch {
        property: property.name.clone(),
        expected,
        actual,
    }
}

/// Truncate to the declared storage width, the way writing through a
/// narrower typed accessor would.
fn wrap_int(kind: PropertyKind, value: i64) -> i64 {
    match kind {
        PropertyKind::Int8 => value as i8 as i64,
        PropertyKind::Int16 => value as i16 as i64,
        PropertyKind::Int32 => value as i32 as i64,
        PropertyKind::UInt8 => value as u8 as i64,
        PropertyKind::UInt16 => value as u16 as i64,
        PropertyKind::UInt32 => value as u32 as i64,
        _ => value,
    }
}

pub(crate) fn push_int(
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

pub(crate) fn fetch_int(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let value = rt.stack.value_at(slot)?;
    let raw = match (value.to_integer(), rt.policy) {
        (Some(v), _) => v,
        (None, FetchPolicy::Permissive) => 0,
        (None, FetchPolicy::Strict) => {
            return Err(mismatch(property, "number", value.kind_name()));
        }
    };
    *cell = NativeValue::Int(wrap_int(property.kind(), raw));
    Ok(())
}

fn push_number(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    _opts: PushOpts,
) -> Result<usize, MarshalError> {
    let value = cell
        .as_number()
        .ok_or_else(|| mismatch(property, "number", cell.type_name()))?;
    rt.stack.push(ScriptValue::Number(value));
    Ok(1)
}

fn fetch_number(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let value = rt.stack.value_at(slot)?;
    let raw = match (value.to_number(), rt.policy) {
        (Some(v), _) => v,
        (None, FetchPolicy::Permissive) => 0.0,
        (None, FetchPolicy::Strict) => {
            return Err(mismatch(property, "number", value.kind_name()));
        }
    };
    // single-width floats round-trip through f32
    let stored = if property.kind() == PropertyKind::Float {
        raw as f32 as f64
    } else {
        raw
    };
    *cell = NativeValue::Number(stored);
    Ok(())
}

fn push_bool(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    _opts: PushOpts,
) -> Result<usize, MarshalError> {
    let value = cell
        .as_bool()
        .ok_or_else(|| mismatch(property, "bool", cell.type_name()))?;
    rt.stack.push(ScriptValue::Bool(value));
    Ok(1)
}

fn fetch_bool(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let value = rt.stack.value_at(slot)?;
    if rt.policy == FetchPolicy::Strict && !matches!(value, ScriptValue::Bool(_)) {
        return Err(mismatch(property, "boolean", value.kind_name()));
    }
    *cell = NativeValue::Bool(value.to_bool());
    Ok(())
}

fn push_str(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    _opts: PushOpts,
) -> Result<usize, MarshalError> {
    let value = match cell {
        NativeValue::Str(s) | NativeValue::Text(s) => s.clone(),
        NativeValue::Zeroed => String::new(),
        other => return Err(mismatch(property, "string", other.type_name())),
    };
    rt.stack.push(ScriptValue::Str(value));
    Ok(1)
}

fn fetch_str(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let value = rt.stack.value_at(slot)?;
    let raw = match (value.to_str(), rt.policy) {
        (Some(s), _) => s,
        (None, FetchPolicy::Permissive) => String::new(),
        (None, FetchPolicy::Strict) => {
            return Err(mismatch(property, "string", value.kind_name()));
        }
    };
    *cell = if property.kind() == PropertyKind::Text {
        NativeValue::Text(raw)
    } else {
        NativeValue::Str(raw)
    };
    Ok(())
}

fn push_name(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    _opts: PushOpts,
) -> Result<usize, MarshalError> {
    let value = match cell {
        NativeValue::Name(name) => name.as_str().to_owned(),
        NativeValue::Zeroed => String::new(),
        other => return Err(mismatch(property, "name", other.type_name())),
    };
    rt.stack.push(ScriptValue::Str(value));
    Ok(1)
}

fn fetch_name(
    _registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let value = rt.stack.value_at(slot)?;
    let raw = match (value.to_str(), rt.policy) {
        (Some(s), _) => s,
        (None, FetchPolicy::Permissive) => String::new(),
        (None, FetchPolicy::Strict) => {
            return Err(mismatch(property, "string", value.kind_name()));
        }
    };
    *cell = if raw.is_empty() {
        NativeValue::Name(Name::none())
    } else {
        NativeValue::Name(Name::from(raw))
    };
    Ok(())
}
