//! Container codecs: ordered sequences, sets, and maps.
//!
//! Pushes emit a fresh table: sequences and sets at 1-based consecutive
//! positions, maps keyed by their pushed keys. Fetches iterate the source
//! table in its insertion order, grow the destination on demand, and end by
//! truncating (sequences) or rehashing (sets and maps) so the destination
//! holds exactly what the table held. Elements recurse through the registry,
//! so nesting depth is bounded only by the data.

use lualink_core::containers::{ArrayValue, MapValue, SetValue};
use lualink_core::property::{Property, PropertyKind, PropertyType};
use lualink_core::runtime::{PushOpts, Runtime};
use lualink_core::script::{ScriptKey, ScriptValue, StackSlot, TableId};
use lualink_core::value::NativeValue;
use lualink_core::MarshalError;
use lualink_registry::CodecRegistry;

use crate::marshal::{fetch_property, push_property};

pub fn install(registry: &mut CodecRegistry) -> Result<(), MarshalError> {
    registry.register(PropertyKind::Array, push_array, fetch_array)?;
    registry.register(PropertyKind::Set, push_set, fetch_set)?;
    registry.register(PropertyKind::Map, push_map, fetch_map)?;
    Ok(())
}

fn mismatch(property: &Property, expected: &'static str, actual: &'static str) -> MarshalError {
    MarshalError::TypeMismatch {
        property: property.name.clone(),
        expected,
        actual,
    }
}

/// Resolve the table a fetch reads from, cloning out its values so the
/// stack can be reused for element recursion.
fn source_table(
    rt: &Runtime,
    property: &Property,
    slot: StackSlot,
) -> Result<TableId, MarshalError> {
    match rt.stack.value_at(slot)? {
        ScriptValue::Table(id) => Ok(*id),
        other => Err(mismatch(property, "table", other.kind_name())),
    }
}

fn table_values(rt: &Runtime, id: TableId) -> Vec<ScriptValue> {
    rt.stack.table(id).map_or_else(Vec::new, |table| {
        table.entries().iter().map(|(_, v)| v.clone()).collect()
    })
}

fn table_pairs(rt: &Runtime, id: TableId) -> Vec<(ScriptKey, ScriptValue)> {
    rt.stack
        .table(id)
        .map_or_else(Vec::new, |table| table.entries().to_vec())
}

fn push_sequence(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    element: &Property,
    cells: &[NativeValue],
    opts: PushOpts,
) -> Result<usize, MarshalError> {
    rt.stack.push_new_table();
    for (i, cell) in cells.iter().enumerate() {
        push_property(registry, rt, element, cell, opts);
        rt.stack.set_index(-2, i as i64 + 1)?;
    }
    Ok(1)
}

fn push_array(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    opts: PushOpts,
) -> Result<usize, MarshalError> {
    let PropertyType::Array { element } = &property.ty else {
        return Err(mismatch(property, "array", cell.type_name()));
    };
    match cell {
        NativeValue::Array(arr) => push_sequence(registry, rt, element, arr.elements(), opts),
        NativeValue::Zeroed => push_sequence(registry, rt, element, &[], opts),
        other => Err(mismatch(property, "array", other.type_name())),
    }
}

fn fetch_array(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let PropertyType::Array { element } = &property.ty else {
        return Err(mismatch(property, "array", cell.type_name()));
    };
    let values = table_values(rt, source_table(rt, property, slot)?);

    let mut arr = match std::mem::replace(cell, NativeValue::Zeroed) {
        NativeValue::Array(arr) => arr,
        NativeValue::Zeroed => ArrayValue::new(),
        other => {
            *cell = other;
            return Err(mismatch(property, "array", cell.type_name()));
        }
    };

    let mut consumed = 0;
    for value in values {
        // grow on demand; the element constructor runs only for new slots
        if arr.num() <= consumed {
            arr.add_value(element, &mut rt.delegates);
        }
        rt.stack.push(value);
        if let Some(element_cell) = arr.element_mut(consumed) {
            fetch_property(registry, rt, element, element_cell, -1);
        }
        rt.stack.pop(1);
        consumed += 1;
    }
    arr.truncate(consumed, element, &mut rt.heap, &mut rt.delegates);

    *cell = NativeValue::Array(arr);
    Ok(())
}

fn push_set(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    opts: PushOpts,
) -> Result<usize, MarshalError> {
    let PropertyType::Set { element } = &property.ty else {
        return Err(mismatch(property, "set", cell.type_name()));
    };
    match cell {
        NativeValue::Set(set) => push_sequence(registry, rt, element, set.elements(), opts),
        NativeValue::Zeroed => push_sequence(registry, rt, element, &[], opts),
        other => Err(mismatch(property, "set", other.type_name())),
    }
}

fn fetch_set(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let PropertyType::Set { element } = &property.ty else {
        return Err(mismatch(property, "set", cell.type_name()));
    };
    let values = table_values(rt, source_table(rt, property, slot)?);

    let mut old = match std::mem::replace(cell, NativeValue::Zeroed) {
        NativeValue::Set(set) => set,
        NativeValue::Zeroed => SetValue::new(),
        other => {
            *cell = other;
            return Err(mismatch(property, "set", cell.type_name()));
        }
    };
    for element_cell in old.elements_mut() {
        element.destroy_value(element_cell, &mut rt.heap, &mut rt.delegates);
    }

    // bulk insert in the lookup-invalid state, then rehash exactly once
    let mut set = SetValue::new();
    for value in values {
        let index = set.add_default_invalid(element, &mut rt.delegates);
        rt.stack.push(value);
        if let Some(element_cell) = set.element_mut(index) {
            fetch_property(registry, rt, element, element_cell, -1);
        }
        rt.stack.pop(1);
    }
    set.rehash(element, &mut rt.heap, &mut rt.delegates);

    *cell = NativeValue::Set(set);
    Ok(())
}

fn push_map(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    opts: PushOpts,
) -> Result<usize, MarshalError> {
    let PropertyType::Map { key, value } = &property.ty else {
        return Err(mismatch(property, "map", cell.type_name()));
    };
    let pairs = match cell {
        NativeValue::Map(map) => map.pairs(),
        NativeValue::Zeroed => &[],
        other => return Err(mismatch(property, "map", other.type_name())),
    };

    rt.stack.push_new_table();
    for (key_cell, value_cell) in pairs {
        push_property(registry, rt, key, key_cell, opts);
        push_property(registry, rt, value, value_cell, opts);
        rt.stack.set_pair(-3)?;
    }
    Ok(1)
}

fn fetch_map(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> Result<(), MarshalError> {
    let PropertyType::Map { key, value } = &property.ty else {
        return Err(mismatch(property, "map", cell.type_name()));
    };
    let pairs = table_pairs(rt, source_table(rt, property, slot)?);

    let mut old = match std::mem::replace(cell, NativeValue::Zeroed) {
        NativeValue::Map(map) => map,
        NativeValue::Zeroed => MapValue::new(),
        other => {
            *cell = other;
            return Err(mismatch(property, "map", cell.type_name()));
        }
    };
    for (key_cell, value_cell) in old.pairs_mut() {
        key.destroy_value(key_cell, &mut rt.heap, &mut rt.delegates);
        value.destroy_value(value_cell, &mut rt.heap, &mut rt.delegates);
    }

    // value fetched before key; rehash once after all pairs are in
    let mut map = MapValue::new();
    for (script_key, script_value) in pairs {
        let index = map.add_default_invalid(key, value, &mut rt.delegates);
        rt.stack.push(script_value);
        if let Some((_, value_cell)) = map.pair_mut(index) {
            fetch_property(registry, rt, value, value_cell, -1);
        }
        rt.stack.pop(1);
        rt.stack.push(script_key.to_value());
        if let Some((key_cell, _)) = map.pair_mut(index) {
            fetch_property(registry, rt, key, key_cell, -1);
        }
        rt.stack.pop(1);
    }
    map.rehash(key, value, &mut rt.heap, &mut rt.delegates);

    *cell = NativeValue::Map(map);
    Ok(())
}
