//! Delegate slot storage.
//!
//! Delegate-typed cells do not hold their bindings inline. Each cell carries
//! a [`DelegateId`] into a generational arena owned by the runtime, so a
//! binding survives the cell being cloned and can be observed after the cell
//! is handed back to script. Sparse delegates are not backed by slots at all:
//! they live in a side table keyed by owner and property name, matching
//! their on-object storage.

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::heap::ObjectHandle;
use crate::name::NameHash;
use crate::script::ClosureId;

/// Generational handle to a delegate slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegateId {
    pub index: u32,
    pub generation: u32,
}

/// A script closure bound to a delegate, stamped with the signature it was
/// bound against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegateBinding {
    pub closure: ClosureId,
    pub signature: NameHash,
}

/// Payload of a live delegate slot.
#[derive(Debug, Clone, PartialEq)]
pub enum DelegateSlot {
    /// At most one binding. Binding again replaces the previous one.
    Single(Option<DelegateBinding>),
    /// Any number of distinct bindings, in bind order.
    Multicast(Vec<DelegateBinding>),
}

/// Sparse delegate identity: who owns it and which property it is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SparseCell {
    pub owner: Option<ObjectHandle>,
    pub property: NameHash,
}

#[derive(Debug)]
struct SlotEntry {
    generation: u32,
    slot: Option<DelegateSlot>,
}

/// Arena of delegate slots plus the sparse side table.
#[derive(Debug, Default)]
pub struct DelegateStore {
    entries: Vec<SlotEntry>,
    free: Vec<u32>,
    sparse: FxHashMap<SparseCell, Vec<DelegateBinding>>,
}

impl DelegateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, slot: DelegateSlot) -> DelegateId {
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.generation = entry.generation.wrapping_add(1);
            entry.slot = Some(slot);
            return DelegateId {
                index,
                generation: entry.generation,
            };
        }
        let index = self.entries.len() as u32;
        self.entries.push(SlotEntry {
            generation: 0,
            slot: Some(slot),
        });
        DelegateId {
            index,
            generation: 0,
        }
    }

    /// Allocate an empty single-binding slot.
    pub fn allocate_single(&mut self) -> DelegateId {
        self.allocate(DelegateSlot::Single(None))
    }

    /// Allocate an empty multicast slot.
    pub fn allocate_multicast(&mut self) -> DelegateId {
        self.allocate(DelegateSlot::Multicast(Vec::new()))
    }

    /// Release a slot. Freeing a stale or already-freed id is reported and
    /// otherwise ignored.
    pub fn free(&mut self, id: DelegateId) {
        match self.entries.get_mut(id.index as usize) {
            Some(entry) if entry.generation == id.generation && entry.slot.is_some() => {
                entry.slot = None;
                self.free.push(id.index);
            }
            _ => warn!(index = id.index, "freeing stale delegate slot"),
        }
    }

    pub fn slot(&self, id: DelegateId) -> Option<&DelegateSlot> {
        self.entries
            .get(id.index as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.slot.as_ref())
    }

    pub fn slot_mut(&mut self, id: DelegateId) -> Option<&mut DelegateSlot> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.slot.as_mut())
    }

    /// Bind a single-binding slot, replacing any previous binding. Returns
    /// false if the id is stale or refers to a multicast slot.
    pub fn bind(&mut self, id: DelegateId, binding: DelegateBinding) -> bool {
        match self.slot_mut(id) {
            Some(DelegateSlot::Single(current)) => {
                *current = Some(binding);
                true
            }
            _ => false,
        }
    }

    /// Add a binding to a multicast slot unless an equal binding is already
    /// present. Returns true if the binding was added.
    pub fn add_unique(&mut self, id: DelegateId, binding: DelegateBinding) -> bool {
        match self.slot_mut(id) {
            Some(DelegateSlot::Multicast(bindings)) => {
                if bindings.contains(&binding) {
                    return false;
                }
                bindings.push(binding);
                true
            }
            _ => false,
        }
    }

    /// Remove a binding from a slot. Returns true if something was removed.
    pub fn remove(&mut self, id: DelegateId, binding: DelegateBinding) -> bool {
        match self.slot_mut(id) {
            Some(DelegateSlot::Single(current)) => {
                if *current == Some(binding) {
                    *current = None;
                    return true;
                }
                false
            }
            Some(DelegateSlot::Multicast(bindings)) => {
                let before = bindings.len();
                bindings.retain(|b| *b != binding);
                bindings.len() != before
            }
            None => false,
        }
    }

    /// Bindings currently held by a slot, in bind order.
    pub fn bindings_of(&self, id: DelegateId) -> Vec<DelegateBinding> {
        match self.slot(id) {
            Some(DelegateSlot::Single(Some(binding))) => vec![*binding],
            Some(DelegateSlot::Multicast(bindings)) => bindings.clone(),
            _ => Vec::new(),
        }
    }

    /// Number of live (allocated and not freed) slots.
    pub fn live_slots(&self) -> usize {
        self.entries.iter().filter(|e| e.slot.is_some()).count()
    }

    // ------------------------------------------------------------------
    // Sparse side table
    // ------------------------------------------------------------------

    /// Add a binding to a sparse delegate unless an equal one exists.
    pub fn sparse_add_unique(&mut self, cell: &SparseCell, binding: DelegateBinding) -> bool {
        let bindings = self.sparse.entry(cell.clone()).or_default();
        if bindings.contains(&binding) {
            return false;
        }
        bindings.push(binding);
        true
    }

    /// Remove a binding from a sparse delegate.
    pub fn sparse_remove(&mut self, cell: &SparseCell, binding: DelegateBinding) -> bool {
        match self.sparse.get_mut(cell) {
            Some(bindings) => {
                let before = bindings.len();
                bindings.retain(|b| *b != binding);
                bindings.len() != before
            }
            None => false,
        }
    }

    pub fn sparse_bindings(&self, cell: &SparseCell) -> &[DelegateBinding] {
        self.sparse.get(cell).map_or(&[], Vec::as_slice)
    }
}
