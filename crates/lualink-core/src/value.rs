//! Type-erased native value cells.
//!
//! [`NativeValue`] is the storage the engine reads and writes through when a
//! descriptor names an address: one cell per field, parameter, or container
//! element. Cells follow an explicit lifecycle: `Zeroed` (allocated but not
//! constructed), a live per-kind payload, and `Destroyed` after the owning
//! frame or container has run the value's destructor. All integer widths
//! collapse to `Int(i64)` and both float widths to `Number(f64)`; the
//! descriptor governs wrapping at fetch time.

use std::fmt;
use std::sync::Arc;

use tracing::warn;
use xxhash_rust::xxh64::xxh64;

use crate::containers::{ArrayValue, MapValue, SetValue};
use crate::delegate::{DelegateId, DelegateStore, SparseCell};
use crate::heap::{ObjectHandle, ObjectHeap};
use crate::name::Name;
use crate::property::{Property, PropertyType, StructDef};

/// One native value, paired at every use site with the [`Property`] that
/// describes its type.
#[derive(Clone)]
pub enum NativeValue {
    /// Zero-initialized storage; a constructor has not run. Valid as-is for
    /// trivially-zero kinds (reads as 0 / false / null).
    Zeroed,
    /// The destructor already ran; any further access is a bug.
    Destroyed,
    Int(i64),
    Number(f64),
    Bool(bool),
    Str(String),
    /// Localizable text; marshalled through its display string.
    Text(String),
    Name(Name),
    Struct(StructValue),
    Class(Option<crate::property::ClassRef>),
    Object(Option<ObjectHandle>),
    Array(ArrayValue),
    Set(SetValue),
    Map(MapValue),
    /// Single-bind callback slot, stored out-of-cell in the delegate store.
    Delegate(DelegateId),
    /// Inline multicast callback slot.
    Multicast(DelegateId),
    /// Sparse multicast marker; storage lives keyed by owning object.
    Sparse(SparseCell),
}

/// A struct instance: shared layout plus one cell per field.
#[derive(Clone)]
pub struct StructValue {
    pub layout: Arc<StructDef>,
    pub fields: Vec<NativeValue>,
}

impl StructValue {
    /// Construct an instance with every field default-initialized.
    pub fn initialize(layout: Arc<StructDef>, delegates: &mut DelegateStore) -> Self {
        let fields = layout
            .fields
            .iter()
            .map(|field| field.initialize_value(delegates))
            .collect();
        Self { layout, fields }
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Debug for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructValue")
            .field("layout", &self.layout.name)
            .field("fields", &self.fields)
            .finish()
    }
}

impl NativeValue {
    /// Human-readable name of the cell's current payload.
    pub fn type_name(&self) -> &'static str {
        match self {
            NativeValue::Zeroed => "zeroed",
            NativeValue::Destroyed => "destroyed",
            NativeValue::Int(_) => "int",
            NativeValue::Number(_) => "number",
            NativeValue::Bool(_) => "bool",
            NativeValue::Str(_) => "string",
            NativeValue::Text(_) => "text",
            NativeValue::Name(_) => "name",
            NativeValue::Struct(_) => "struct",
            NativeValue::Class(_) => "class",
            NativeValue::Object(_) => "object",
            NativeValue::Array(_) => "array",
            NativeValue::Set(_) => "set",
            NativeValue::Map(_) => "map",
            NativeValue::Delegate(_) => "delegate",
            NativeValue::Multicast(_) => "multicast",
            NativeValue::Sparse(_) => "sparse",
        }
    }

    /// Read the cell as an integer. `Zeroed` reads as 0.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            NativeValue::Int(v) => Some(*v),
            NativeValue::Zeroed => Some(0),
            _ => None,
        }
    }

    /// Read the cell as a float. `Zeroed` reads as 0.0.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            NativeValue::Number(v) => Some(*v),
            NativeValue::Zeroed => Some(0.0),
            _ => None,
        }
    }

    /// Read the cell as a boolean. `Zeroed` reads as false.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Bool(v) => Some(*v),
            NativeValue::Zeroed => Some(false),
            _ => None,
        }
    }

    /// A 64-bit hash of the value's logical content. Used by sets and maps
    /// to rebuild their lookup index after bulk insertion.
    pub fn content_hash(&self) -> u64 {
        let mut bytes = Vec::new();
        self.encode(&mut bytes);
        xxh64(&bytes, 0)
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            NativeValue::Zeroed => out.push(0),
            NativeValue::Destroyed => out.push(1),
            NativeValue::Int(v) => {
                out.push(2);
                out.extend_from_slice(&v.to_le_bytes());
            }
            NativeValue::Number(v) => {
                out.push(3);
                out.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            NativeValue::Bool(v) => {
                out.push(4);
                out.push(u8::from(*v));
            }
            NativeValue::Str(s) | NativeValue::Text(s) => {
                out.push(5);
                out.extend_from_slice(s.as_bytes());
            }
            NativeValue::Name(n) => {
                out.push(6);
                out.extend_from_slice(&n.hash().0.to_le_bytes());
            }
            NativeValue::Struct(sv) => {
                out.push(7);
                for field in &sv.fields {
                    field.encode(out);
                }
            }
            NativeValue::Class(c) => {
                out.push(8);
                let ptr = c.as_ref().map_or(0usize, |r| Arc::as_ptr(&r.0) as usize);
                out.extend_from_slice(&ptr.to_le_bytes());
            }
            NativeValue::Object(o) => {
                out.push(9);
                if let Some(handle) = o {
                    out.extend_from_slice(&handle.index.to_le_bytes());
                    out.extend_from_slice(&handle.generation.to_le_bytes());
                }
            }
            NativeValue::Array(arr) => {
                out.push(10);
                for element in arr.elements() {
                    element.encode(out);
                }
            }
            NativeValue::Set(set) => {
                out.push(11);
                for element in set.elements() {
                    element.encode(out);
                }
            }
            NativeValue::Map(map) => {
                out.push(12);
                for (key, value) in map.pairs() {
                    key.encode(out);
                    value.encode(out);
                }
            }
            NativeValue::Delegate(id) | NativeValue::Multicast(id) => {
                out.push(13);
                out.extend_from_slice(&id.index.to_le_bytes());
                out.extend_from_slice(&id.generation.to_le_bytes());
            }
            NativeValue::Sparse(cell) => {
                out.push(14);
                out.extend_from_slice(&cell.property.0.to_le_bytes());
            }
        }
    }
}

impl PartialEq for NativeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NativeValue::Zeroed, NativeValue::Zeroed) => true,
            (NativeValue::Destroyed, NativeValue::Destroyed) => true,
            (NativeValue::Int(a), NativeValue::Int(b)) => a == b,
            (NativeValue::Number(a), NativeValue::Number(b)) => a == b,
            (NativeValue::Bool(a), NativeValue::Bool(b)) => a == b,
            (NativeValue::Str(a), NativeValue::Str(b)) => a == b,
            (NativeValue::Text(a), NativeValue::Text(b)) => a == b,
            (NativeValue::Name(a), NativeValue::Name(b)) => a == b,
            (NativeValue::Struct(a), NativeValue::Struct(b)) => a == b,
            (NativeValue::Class(a), NativeValue::Class(b)) => a == b,
            (NativeValue::Object(a), NativeValue::Object(b)) => a == b,
            (NativeValue::Array(a), NativeValue::Array(b)) => a == b,
            (NativeValue::Set(a), NativeValue::Set(b)) => a == b,
            (NativeValue::Map(a), NativeValue::Map(b)) => a == b,
            (NativeValue::Delegate(a), NativeValue::Delegate(b)) => a == b,
            (NativeValue::Multicast(a), NativeValue::Multicast(b)) => a == b,
            (NativeValue::Sparse(a), NativeValue::Sparse(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Zeroed => write!(f, "Zeroed"),
            NativeValue::Destroyed => write!(f, "Destroyed"),
            NativeValue::Int(v) => write!(f, "Int({v})"),
            NativeValue::Number(v) => write!(f, "Number({v})"),
            NativeValue::Bool(v) => write!(f, "Bool({v})"),
            NativeValue::Str(s) => write!(f, "Str({s:?})"),
            NativeValue::Text(s) => write!(f, "Text({s:?})"),
            NativeValue::Name(n) => write!(f, "Name({n})"),
            NativeValue::Struct(sv) => sv.fmt(f),
            NativeValue::Class(c) => write!(f, "Class({c:?})"),
            NativeValue::Object(o) => write!(f, "Object({o:?})"),
            NativeValue::Array(a) => write!(f, "Array(len={})", a.num()),
            NativeValue::Set(s) => write!(f, "Set(len={})", s.num()),
            NativeValue::Map(m) => write!(f, "Map(len={})", m.num()),
            NativeValue::Delegate(id) => write!(f, "Delegate({id:?})"),
            NativeValue::Multicast(id) => write!(f, "Multicast({id:?})"),
            NativeValue::Sparse(cell) => write!(f, "Sparse({cell:?})"),
        }
    }
}

impl Default for NativeValue {
    fn default() -> Self {
        NativeValue::Zeroed
    }
}

impl Property {
    /// Run this property's constructor, producing a default value for its
    /// kind. Delegate kinds allocate their callback slot in the store.
    pub fn initialize_value(&self, delegates: &mut DelegateStore) -> NativeValue {
        match &self.ty {
            PropertyType::Int8
            | PropertyType::Int16
            | PropertyType::Int32
            | PropertyType::Int64
            | PropertyType::UInt8
            | PropertyType::UInt16
            | PropertyType::UInt32
            | PropertyType::UInt64 => NativeValue::Int(0),
            PropertyType::Float | PropertyType::Double => NativeValue::Number(0.0),
            PropertyType::Bool => NativeValue::Bool(false),
            PropertyType::Str => NativeValue::Str(String::new()),
            PropertyType::Text => NativeValue::Text(String::new()),
            PropertyType::Name => NativeValue::Name(Name::none()),
            PropertyType::Enum { .. } => NativeValue::Int(0),
            PropertyType::Struct { layout } => match layout {
                Some(def) => {
                    NativeValue::Struct(StructValue::initialize(Arc::clone(def), delegates))
                }
                // Unresolvable layout: leave the cell unconstructed; the
                // struct codec degrades to nil when it sees this.
                None => NativeValue::Zeroed,
            },
            PropertyType::Class => NativeValue::Class(None),
            PropertyType::Object => NativeValue::Object(None),
            PropertyType::Array { .. } => NativeValue::Array(ArrayValue::new()),
            PropertyType::Set { .. } => NativeValue::Set(SetValue::new()),
            PropertyType::Map { .. } => NativeValue::Map(MapValue::new()),
            PropertyType::Delegate { .. } => NativeValue::Delegate(delegates.allocate_single()),
            PropertyType::Multicast { .. } | PropertyType::MulticastInline { .. } => {
                NativeValue::Multicast(delegates.allocate_multicast())
            }
            PropertyType::MulticastSparse { .. } => NativeValue::Sparse(SparseCell {
                owner: None,
                property: self.name.hash(),
            }),
        }
    }

    /// Run this property's destructor on a cell, releasing whatever host
    /// resources the value owns and leaving the cell `Destroyed`.
    ///
    /// Destroying an already-destroyed cell is logged and ignored; the call
    /// frame guarantees each parameter is destructed exactly once.
    pub fn destroy_value(
        &self,
        cell: &mut NativeValue,
        heap: &mut ObjectHeap,
        delegates: &mut DelegateStore,
    ) {
        let old = std::mem::replace(cell, NativeValue::Destroyed);
        match old {
            NativeValue::Destroyed => {
                warn!(property = %self.name, "value destroyed twice");
            }
            NativeValue::Object(Some(handle)) => {
                heap.release(handle);
            }
            NativeValue::Delegate(id) | NativeValue::Multicast(id) => {
                delegates.free(id);
            }
            NativeValue::Struct(mut sv) => {
                for (field, field_cell) in sv.layout.fields.iter().zip(sv.fields.iter_mut()) {
                    field.destroy_value(field_cell, heap, delegates);
                }
            }
            NativeValue::Array(mut arr) => {
                if let PropertyType::Array { element } = &self.ty {
                    for element_cell in arr.elements_mut() {
                        element.destroy_value(element_cell, heap, delegates);
                    }
                }
            }
            NativeValue::Set(mut set) => {
                if let PropertyType::Set { element } = &self.ty {
                    for element_cell in set.elements_mut() {
                        element.destroy_value(element_cell, heap, delegates);
                    }
                }
            }
            NativeValue::Map(mut map) => {
                if let PropertyType::Map { key, value } = &self.ty {
                    for (key_cell, value_cell) in map.pairs_mut() {
                        key.destroy_value(key_cell, heap, delegates);
                        value.destroy_value(value_cell, heap, delegates);
                    }
                }
            }
            // Scalars, strings, null handles, sparse markers: nothing to
            // release beyond the cell itself.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{ClassDef, ClassRef};

    #[test]
    fn zeroed_reads_as_defaults() {
        assert_eq!(NativeValue::Zeroed.as_int(), Some(0));
        assert_eq!(NativeValue::Zeroed.as_number(), Some(0.0));
        assert_eq!(NativeValue::Zeroed.as_bool(), Some(false));
        assert_eq!(NativeValue::Int(7).as_bool(), None);
    }

    #[test]
    fn content_hash_tracks_content() {
        let a = NativeValue::Str("alpha".into());
        let b = NativeValue::Str("alpha".into());
        let c = NativeValue::Str("beta".into());
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn initialize_matches_kind() {
        let mut delegates = DelegateStore::new();
        let p = Property::new("n", PropertyType::Int32);
        assert_eq!(p.initialize_value(&mut delegates), NativeValue::Int(0));

        let s = Property::new("s", PropertyType::Str);
        assert_eq!(s.initialize_value(&mut delegates), NativeValue::Str(String::new()));
    }

    #[test]
    fn destroy_releases_object_reference() {
        let mut heap = ObjectHeap::new();
        let mut delegates = DelegateStore::new();
        let class = ClassRef::new(ClassDef::new("Thing", vec![]));
        let handle = heap.allocate_instance(class, &mut delegates);
        heap.add_ref(handle);
        assert_eq!(heap.ref_count(handle), Some(2));

        let prop = Property::new("obj", PropertyType::Object);
        let mut cell = NativeValue::Object(Some(handle));
        prop.destroy_value(&mut cell, &mut heap, &mut delegates);

        assert_eq!(cell, NativeValue::Destroyed);
        assert_eq!(heap.ref_count(handle), Some(1));
    }

    #[test]
    fn destroy_frees_delegate_slot() {
        let mut heap = ObjectHeap::new();
        let mut delegates = DelegateStore::new();
        let sig = std::sync::Arc::new(crate::property::FunctionDef::new(
            "OnFire",
            vec![],
            crate::property::NativeEntry::Internal,
        ));
        let prop = Property::new("hook", PropertyType::Delegate { signature: sig });
        let mut cell = prop.initialize_value(&mut delegates);
        assert_eq!(delegates.live_slots(), 1);

        prop.destroy_value(&mut cell, &mut heap, &mut delegates);
        assert_eq!(delegates.live_slots(), 0);
    }
}
