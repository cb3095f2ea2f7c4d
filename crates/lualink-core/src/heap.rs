//! Reflected object storage.
//!
//! Objects are reference counted and addressed through generational handles,
//! so a handle held by script after the object died reads as stale instead
//! of aliasing a recycled slot.

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::delegate::DelegateStore;
use crate::name::{Name, NameHash};
use crate::property::{ClassRef, Property};
use crate::script::ClosureId;
use crate::value::NativeValue;

/// Generational handle to a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub index: u32,
    pub generation: u32,
}

/// A reflected object instance: its class, its field cells, and any
/// script-side function overrides installed on it.
#[derive(Debug)]
pub struct ReflectedObject {
    class: ClassRef,
    fields: Vec<NativeValue>,
    overrides: FxHashMap<NameHash, ClosureId>,
    ref_count: u32,
}

impl ReflectedObject {
    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn field(&self, name: &Name) -> Option<&NativeValue> {
        let (index, _) = self.field_property(name)?;
        self.fields.get(index)
    }

    pub fn field_mut(&mut self, name: &Name) -> Option<&mut NativeValue> {
        let index = self
            .class
            .fields
            .iter()
            .position(|field| &field.name == name)?;
        self.fields.get_mut(index)
    }

    /// Field descriptor and slot index for a named field.
    pub fn field_property(&self, name: &Name) -> Option<(usize, &Property)> {
        self.class
            .fields
            .iter()
            .enumerate()
            .find(|(_, field)| &field.name == name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&Property, &NativeValue)> {
        self.class.fields.iter().zip(self.fields.iter())
    }

    /// Install a script override for a function on this object.
    pub fn set_override(&mut self, function: NameHash, closure: ClosureId) {
        self.overrides.insert(function, closure);
    }

    pub fn override_for(&self, function: NameHash) -> Option<ClosureId> {
        self.overrides.get(&function).copied()
    }
}

#[derive(Debug)]
struct HeapEntry {
    generation: u32,
    object: Option<ReflectedObject>,
}

/// Arena of reflected objects with free-slot recycling.
#[derive(Debug, Default)]
pub struct ObjectHeap {
    entries: Vec<HeapEntry>,
    free: Vec<u32>,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an instance of `class` with every field default-constructed,
    /// at reference count 1.
    pub fn allocate_instance(
        &mut self,
        class: ClassRef,
        delegates: &mut DelegateStore,
    ) -> ObjectHandle {
        let fields = class
            .fields
            .iter()
            .map(|field| field.initialize_value(delegates))
            .collect();
        let object = ReflectedObject {
            class,
            fields,
            overrides: FxHashMap::default(),
            ref_count: 1,
        };

        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.generation = entry.generation.wrapping_add(1);
            entry.object = Some(object);
            return ObjectHandle {
                index,
                generation: entry.generation,
            };
        }
        let index = self.entries.len() as u32;
        self.entries.push(HeapEntry {
            generation: 0,
            object: Some(object),
        });
        ObjectHandle {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&ReflectedObject> {
        self.entries
            .get(handle.index as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.object.as_ref())
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut ReflectedObject> {
        self.entries
            .get_mut(handle.index as usize)
            .filter(|entry| entry.generation == handle.generation)
            .and_then(|entry| entry.object.as_mut())
    }

    /// Take a share of the object. Stale handles are reported and ignored.
    pub fn add_ref(&mut self, handle: ObjectHandle) {
        match self.get_mut(handle) {
            Some(object) => object.ref_count += 1,
            None => warn!(index = handle.index, "add_ref on stale object handle"),
        }
    }

    /// Drop a share of the object, destroying it when the count reaches
    /// zero. Stale handles are reported and ignored.
    pub fn release(&mut self, handle: ObjectHandle) {
        let Some(entry) = self
            .entries
            .get_mut(handle.index as usize)
            .filter(|entry| entry.generation == handle.generation)
        else {
            warn!(index = handle.index, "release on stale object handle");
            return;
        };
        let Some(object) = entry.object.as_mut() else {
            warn!(index = handle.index, "release on stale object handle");
            return;
        };
        object.ref_count -= 1;
        if object.ref_count == 0 {
            entry.object = None;
            self.free.push(handle.index);
        }
    }

    /// Current reference count, or `None` for a stale handle.
    pub fn ref_count(&self, handle: ObjectHandle) -> Option<usize> {
        self.get(handle).map(|object| object.ref_count as usize)
    }

    /// Script override looked up on the object, if any.
    pub fn override_for(&self, handle: ObjectHandle, function: NameHash) -> Option<ClosureId> {
        self.get(handle)?.override_for(function)
    }

    pub fn live_objects(&self) -> usize {
        self.entries.iter().filter(|e| e.object.is_some()).count()
    }
}
