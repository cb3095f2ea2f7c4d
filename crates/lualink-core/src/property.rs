//! Reflected property and function descriptors.
//!
//! A [`Property`] describes one typed, addressable field: its kind tag, its
//! parameter flags, and (for containers and aggregates) the nested
//! descriptors of its element, key/value, or struct layout. Descriptors are
//! owned by the reflection side and borrowed read-only by the engine.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::name::{Name, NameHash};
use crate::native_fn::NativeFn;

/// Kind tag dispatched on by the codec registry.
///
/// One codec pair is registered per kind; new kinds extend the registry
/// rather than a switch inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PropertyKind {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    Str,
    Text,
    Name,
    Enum,
    Struct,
    Class,
    Object,
    Array,
    Set,
    Map,
    Delegate,
    /// Legacy multicast representation (pre-inline hosts).
    Multicast,
    MulticastInline,
    MulticastSparse,
}

impl PropertyKind {
    /// Whether a value of this kind is trivially zero-constructible: an
    /// all-zero cell is a valid value and no constructor needs to run.
    pub fn is_trivially_zero(self) -> bool {
        matches!(
            self,
            PropertyKind::Int8
                | PropertyKind::Int16
                | PropertyKind::Int32
                | PropertyKind::Int64
                | PropertyKind::UInt8
                | PropertyKind::UInt16
                | PropertyKind::UInt32
                | PropertyKind::UInt64
                | PropertyKind::Float
                | PropertyKind::Double
                | PropertyKind::Bool
                | PropertyKind::Enum
                | PropertyKind::Class
                | PropertyKind::Object
                | PropertyKind::Name
        )
    }
}

bitflags! {
    /// Parameter and storage flags carried by a property descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropertyFlags: u32 {
        /// The property is a function parameter.
        const PARM = 1 << 0;
        /// The parameter is written back to the caller after the call.
        const OUT_PARM = 1 << 1;
        /// The parameter holds the function's return value.
        const RETURN_PARM = 1 << 2;
        /// The parameter may not be mutated by the callee.
        const CONST_PARM = 1 << 3;
        /// The parameter is passed by reference (out params that are also
        /// inputs carry this together with `OUT_PARM`).
        const REFERENCE_PARM = 1 << 4;
        /// Zero-initialized storage is a valid value; no constructor runs.
        const ZERO_CONSTRUCT = 1 << 5;
    }
}

bitflags! {
    /// Flags carried by a function descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FunctionFlags: u32 {
        /// The function dispatches through its native entry point.
        const NATIVE = 1 << 0;
        /// The function may be overridden from the scripting side.
        const SCRIPT_EVENT = 1 << 1;
    }
}

/// Kind-specific payload of a property descriptor.
#[derive(Debug, Clone)]
pub enum PropertyType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Bool,
    Str,
    Text,
    Name,
    /// Enum stored in an underlying numeric property.
    Enum {
        underlying: Box<Property>,
        def: Option<Arc<EnumDef>>,
    },
    /// Nested struct; `None` models a layout the reflection side could not
    /// resolve.
    Struct { layout: Option<Arc<StructDef>> },
    /// Reference to a type descriptor (not an instance).
    Class,
    /// Reference to a live object instance.
    Object,
    Array { element: Box<Property> },
    Set { element: Box<Property> },
    Map {
        key: Box<Property>,
        value: Box<Property>,
    },
    Delegate { signature: Arc<FunctionDef> },
    Multicast { signature: Arc<FunctionDef> },
    MulticastInline { signature: Arc<FunctionDef> },
    MulticastSparse { signature: Arc<FunctionDef> },
}

/// One typed, addressable field in the reflected object model.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: Name,
    pub flags: PropertyFlags,
    pub ty: PropertyType,
}

impl Property {
    /// Create a descriptor with empty flags.
    pub fn new(name: impl Into<Name>, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            flags: PropertyFlags::empty(),
            ty,
        }
    }

    /// Builder-style flag assignment.
    pub fn with_flags(mut self, flags: PropertyFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The kind tag used for registry dispatch.
    pub fn kind(&self) -> PropertyKind {
        match &self.ty {
            PropertyType::Int8 => PropertyKind::Int8,
            PropertyType::Int16 => PropertyKind::Int16,
            PropertyType::Int32 => PropertyKind::Int32,
            PropertyType::Int64 => PropertyKind::Int64,
            PropertyType::UInt8 => PropertyKind::UInt8,
            PropertyType::UInt16 => PropertyKind::UInt16,
            PropertyType::UInt32 => PropertyKind::UInt32,
            PropertyType::UInt64 => PropertyKind::UInt64,
            PropertyType::Float => PropertyKind::Float,
            PropertyType::Double => PropertyKind::Double,
            PropertyType::Bool => PropertyKind::Bool,
            PropertyType::Str => PropertyKind::Str,
            PropertyType::Text => PropertyKind::Text,
            PropertyType::Name => PropertyKind::Name,
            PropertyType::Enum { .. } => PropertyKind::Enum,
            PropertyType::Struct { .. } => PropertyKind::Struct,
            PropertyType::Class => PropertyKind::Class,
            PropertyType::Object => PropertyKind::Object,
            PropertyType::Array { .. } => PropertyKind::Array,
            PropertyType::Set { .. } => PropertyKind::Set,
            PropertyType::Map { .. } => PropertyKind::Map,
            PropertyType::Delegate { .. } => PropertyKind::Delegate,
            PropertyType::Multicast { .. } => PropertyKind::Multicast,
            PropertyType::MulticastInline { .. } => PropertyKind::MulticastInline,
            PropertyType::MulticastSparse { .. } => PropertyKind::MulticastSparse,
        }
    }

    /// Whether this parameter holds the return value.
    pub fn is_return_parm(&self) -> bool {
        self.flags.contains(PropertyFlags::RETURN_PARM)
    }

    /// Whether this parameter is fetched from the script stack: everything
    /// except the return slot and pure outputs. An out-param that is also
    /// passed by reference counts as an input.
    pub fn is_input_parm(&self) -> bool {
        if self.is_return_parm() {
            return false;
        }
        !self.flags.contains(PropertyFlags::OUT_PARM)
            || self.flags.contains(PropertyFlags::REFERENCE_PARM)
    }

    /// Whether this parameter is pushed back to the caller after the call.
    pub fn is_out_result(&self) -> bool {
        !self.is_return_parm()
            && self.flags.contains(PropertyFlags::OUT_PARM)
            && !self.flags.contains(PropertyFlags::CONST_PARM)
    }
}

/// Reflected layout of a struct: an ordered list of field descriptors.
#[derive(Debug)]
pub struct StructDef {
    pub name: Name,
    pub fields: Vec<Property>,
}

impl StructDef {
    pub fn new(name: impl Into<Name>, fields: Vec<Property>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Find a field descriptor by name.
    pub fn field(&self, name: &Name) -> Option<(usize, &Property)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, field)| &field.name == name)
    }
}

/// Reflected enum: named values over an underlying integer.
#[derive(Debug)]
pub struct EnumDef {
    pub name: Name,
    pub entries: Vec<(Name, i64)>,
}

impl EnumDef {
    pub fn new(name: impl Into<Name>, entries: Vec<(Name, i64)>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    /// Find the symbolic name for a value, if it is one of the declared
    /// entries. Marshalling never requires this; it exists for diagnostics.
    pub fn value_name(&self, value: i64) -> Option<&Name> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name)
    }
}

/// Reflected class: named object layout.
#[derive(Debug)]
pub struct ClassDef {
    pub name: Name,
    pub fields: Vec<Property>,
}

impl ClassDef {
    pub fn new(name: impl Into<Name>, fields: Vec<Property>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// Shared reference to a class descriptor. Equality is identity of the
/// underlying descriptor, not structural.
#[derive(Clone)]
pub struct ClassRef(pub Arc<ClassDef>);

impl ClassRef {
    pub fn new(def: ClassDef) -> Self {
        ClassRef(Arc::new(def))
    }

    pub fn name(&self) -> &Name {
        &self.0.name
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ClassRef {}

impl std::hash::Hash for ClassRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({})", self.0.name)
    }
}

impl std::ops::Deref for ClassRef {
    type Target = ClassDef;

    fn deref(&self) -> &ClassDef {
        &self.0
    }
}

/// Native entry point of a reflected function.
#[derive(Clone)]
pub enum NativeEntry {
    /// Dispatch to a scripting-side override if the object has one.
    Trampoline,
    /// A concrete native implementation.
    Fn(NativeFn),
    /// The non-override processing path (the function's default body).
    Internal,
}

impl PartialEq for NativeEntry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NativeEntry::Trampoline, NativeEntry::Trampoline) => true,
            (NativeEntry::Internal, NativeEntry::Internal) => true,
            (NativeEntry::Fn(a), NativeEntry::Fn(b)) => a.id == b.id,
            _ => false,
        }
    }
}

impl fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeEntry::Trampoline => write!(f, "Trampoline"),
            NativeEntry::Fn(func) => write!(f, "Fn({})", func.id),
            NativeEntry::Internal => write!(f, "Internal"),
        }
    }
}

/// Reflected function: ordered parameter descriptors plus dispatch state.
///
/// `flags` and `entry` use interior mutability because the call marshaller
/// temporarily swaps them around a call to bypass the override trampoline.
/// The engine is single-threaded; nothing here is shared across threads.
#[derive(Debug)]
pub struct FunctionDef {
    pub name: Name,
    /// All parameters in declaration order, including the return slot
    /// (flagged `RETURN_PARM`) and out-params.
    pub params: Vec<Property>,
    pub flags: Cell<FunctionFlags>,
    pub entry: RefCell<NativeEntry>,
    /// Body run by the non-override processing path.
    pub default_impl: Option<NativeFn>,
}

impl FunctionDef {
    pub fn new(name: impl Into<Name>, params: Vec<Property>, entry: NativeEntry) -> Self {
        let flags = match entry {
            NativeEntry::Internal => FunctionFlags::empty(),
            _ => FunctionFlags::NATIVE,
        };
        Self {
            name: name.into(),
            params,
            flags: Cell::new(flags),
            entry: RefCell::new(entry),
            default_impl: None,
        }
    }

    /// Builder-style default-body assignment.
    pub fn with_default_impl(mut self, body: NativeFn) -> Self {
        self.default_impl = Some(body);
        self
    }

    /// Builder-style flag assignment.
    pub fn with_flags(self, flags: FunctionFlags) -> Self {
        self.flags.set(flags);
        self
    }

    /// Deterministic signature hash over the name and parameter kinds.
    /// Used to pair scripting closures with delegate slots.
    pub fn signature_hash(&self) -> NameHash {
        let tags: Vec<u8> = self.params.iter().map(|p| p.kind().into()).collect();
        NameHash::from_signature(self.name.as_str(), &tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_prop(name: &str) -> Property {
        Property::new(name, PropertyType::Int32)
    }

    #[test]
    fn kind_tags_match_payloads() {
        assert_eq!(int_prop("a").kind(), PropertyKind::Int32);
        let arr = Property::new("xs", PropertyType::Array {
            element: Box::new(int_prop("e")),
        });
        assert_eq!(arr.kind(), PropertyKind::Array);
    }

    #[test]
    fn parameter_classification() {
        let ret = int_prop("ret")
            .with_flags(PropertyFlags::PARM | PropertyFlags::RETURN_PARM);
        assert!(ret.is_return_parm());
        assert!(!ret.is_input_parm());

        let pure_out = int_prop("out").with_flags(PropertyFlags::PARM | PropertyFlags::OUT_PARM);
        assert!(!pure_out.is_input_parm());
        assert!(pure_out.is_out_result());

        let in_out = int_prop("io").with_flags(
            PropertyFlags::PARM | PropertyFlags::OUT_PARM | PropertyFlags::REFERENCE_PARM,
        );
        assert!(in_out.is_input_parm());
        assert!(in_out.is_out_result());

        let const_out = int_prop("co").with_flags(
            PropertyFlags::PARM | PropertyFlags::OUT_PARM | PropertyFlags::CONST_PARM,
        );
        assert!(!const_out.is_out_result());
    }

    #[test]
    fn signature_hash_distinguishes_param_kinds() {
        let f1 = FunctionDef::new("OnHit", vec![int_prop("damage")], NativeEntry::Internal);
        let f2 = FunctionDef::new(
            "OnHit",
            vec![Property::new("damage", PropertyType::Float)],
            NativeEntry::Internal,
        );
        assert_ne!(f1.signature_hash(), f2.signature_hash());
    }

    #[test]
    fn class_ref_equality_is_identity() {
        let a = ClassRef::new(ClassDef::new("Actor", vec![]));
        let b = ClassRef::new(ClassDef::new("Actor", vec![]));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
