//! Container values with reflection-helper access.
//!
//! Sets and maps follow a bulk-insert protocol: during a fetch, entries are
//! added in a lookup-invalid state with [`SetValue::add_default_invalid`] /
//! [`MapValue::add_default_invalid`], and the container only becomes valid
//! for lookups after a single [`rehash`](SetValue::rehash) at the end.
//! Rehashing once after the loop instead of per element keeps bulk fetch
//! linear. Rehash also deduplicates per element equality, so a fetch of a
//! table with duplicate values yields a set holding only distinct values.

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::delegate::DelegateStore;
use crate::heap::ObjectHeap;
use crate::property::Property;
use crate::value::NativeValue;

/// Ordered, growable sequence of cells.
#[derive(Clone, Default)]
pub struct ArrayValue {
    elements: Vec<NativeValue>,
}

impl ArrayValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num(&self) -> usize {
        self.elements.len()
    }

    pub fn element(&self, index: usize) -> Option<&NativeValue> {
        self.elements.get(index)
    }

    pub fn element_mut(&mut self, index: usize) -> Option<&mut NativeValue> {
        self.elements.get_mut(index)
    }

    pub fn elements(&self) -> &[NativeValue] {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut [NativeValue] {
        &mut self.elements
    }

    /// Grow by one default-constructed element, returning its index.
    pub fn add_value(&mut self, element: &Property, delegates: &mut DelegateStore) -> usize {
        self.elements.push(element.initialize_value(delegates));
        self.elements.len() - 1
    }

    /// Shrink to exactly `count` elements, running the element destructor on
    /// everything removed.
    pub fn truncate(
        &mut self,
        count: usize,
        element: &Property,
        heap: &mut ObjectHeap,
        delegates: &mut DelegateStore,
    ) {
        while self.elements.len() > count {
            let mut removed = match self.elements.pop() {
                Some(cell) => cell,
                None => break,
            };
            element.destroy_value(&mut removed, heap, delegates);
        }
    }
}

impl From<Vec<NativeValue>> for ArrayValue {
    fn from(elements: Vec<NativeValue>) -> Self {
        Self { elements }
    }
}

impl PartialEq for ArrayValue {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

/// Hash set of cells with deferred index building.
#[derive(Clone, Default)]
pub struct SetValue {
    elements: Vec<NativeValue>,
    index: FxHashMap<u64, Vec<usize>>,
    lookup_valid: bool,
}

impl SetValue {
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            index: FxHashMap::default(),
            lookup_valid: true,
        }
    }

    pub fn num(&self) -> usize {
        self.elements.len()
    }

    pub fn elements(&self) -> &[NativeValue] {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut [NativeValue] {
        &mut self.elements
    }

    pub fn element_mut(&mut self, index: usize) -> Option<&mut NativeValue> {
        self.elements.get_mut(index)
    }

    /// Append a default-constructed element in a lookup-invalid state,
    /// returning its index. The caller must [`rehash`](Self::rehash) once
    /// after the bulk insertion completes.
    pub fn add_default_invalid(
        &mut self,
        element: &Property,
        delegates: &mut DelegateStore,
    ) -> usize {
        self.elements.push(element.initialize_value(delegates));
        self.lookup_valid = false;
        self.elements.len() - 1
    }

    /// Rebuild the lookup index after bulk insertion, deduplicating per
    /// element equality. Removed duplicates are properly destructed.
    pub fn rehash(
        &mut self,
        element: &Property,
        heap: &mut ObjectHeap,
        delegates: &mut DelegateStore,
    ) {
        let mut kept: Vec<NativeValue> = Vec::with_capacity(self.elements.len());
        let mut index: FxHashMap<u64, Vec<usize>> = FxHashMap::default();

        for mut cell in self.elements.drain(..) {
            let hash = cell.content_hash();
            let duplicate = index
                .get(&hash)
                .is_some_and(|slots| slots.iter().any(|&i| kept[i] == cell));
            if duplicate {
                element.destroy_value(&mut cell, heap, delegates);
                continue;
            }
            index.entry(hash).or_default().push(kept.len());
            kept.push(cell);
        }

        self.elements = kept;
        self.index = index;
        self.lookup_valid = true;
    }

    /// Membership test. Only meaningful after a rehash; a lookup against an
    /// un-rehashed set is reported and answered with `false`.
    pub fn contains(&self, value: &NativeValue) -> bool {
        if !self.lookup_valid {
            warn!("set lookup before rehash");
            return false;
        }
        self.index
            .get(&value.content_hash())
            .is_some_and(|slots| slots.iter().any(|&i| self.elements[i] == *value))
    }

    pub fn is_lookup_valid(&self) -> bool {
        self.lookup_valid
    }
}

impl From<Vec<NativeValue>> for SetValue {
    fn from(elements: Vec<NativeValue>) -> Self {
        Self {
            elements,
            index: FxHashMap::default(),
            lookup_valid: false,
        }
    }
}

impl PartialEq for SetValue {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

/// Hash map of cell pairs with deferred index building.
#[derive(Clone, Default)]
pub struct MapValue {
    pairs: Vec<(NativeValue, NativeValue)>,
    index: FxHashMap<u64, Vec<usize>>,
    lookup_valid: bool,
}

impl MapValue {
    pub fn new() -> Self {
        Self {
            pairs: Vec::new(),
            index: FxHashMap::default(),
            lookup_valid: true,
        }
    }

    pub fn num(&self) -> usize {
        self.pairs.len()
    }

    pub fn pairs(&self) -> &[(NativeValue, NativeValue)] {
        &self.pairs
    }

    pub fn pairs_mut(&mut self) -> impl Iterator<Item = (&mut NativeValue, &mut NativeValue)> {
        self.pairs.iter_mut().map(|(k, v)| (k, v))
    }

    pub fn pair_mut(&mut self, index: usize) -> Option<(&mut NativeValue, &mut NativeValue)> {
        self.pairs.get_mut(index).map(|(k, v)| (k, v))
    }

    /// Append a default-constructed pair in a lookup-invalid state,
    /// returning its index.
    pub fn add_default_invalid(
        &mut self,
        key: &Property,
        value: &Property,
        delegates: &mut DelegateStore,
    ) -> usize {
        self.pairs.push((
            key.initialize_value(delegates),
            value.initialize_value(delegates),
        ));
        self.lookup_valid = false;
        self.pairs.len() - 1
    }

    /// Rebuild the key index after bulk insertion. Pairs with a key already
    /// present keep the first occurrence; dropped pairs are destructed.
    pub fn rehash(
        &mut self,
        key: &Property,
        value: &Property,
        heap: &mut ObjectHeap,
        delegates: &mut DelegateStore,
    ) {
        let mut kept: Vec<(NativeValue, NativeValue)> = Vec::with_capacity(self.pairs.len());
        let mut index: FxHashMap<u64, Vec<usize>> = FxHashMap::default();

        for (mut key_cell, mut value_cell) in self.pairs.drain(..) {
            let hash = key_cell.content_hash();
            let duplicate = index
                .get(&hash)
                .is_some_and(|slots| slots.iter().any(|&i| kept[i].0 == key_cell));
            if duplicate {
                key.destroy_value(&mut key_cell, heap, delegates);
                value.destroy_value(&mut value_cell, heap, delegates);
                continue;
            }
            index.entry(hash).or_default().push(kept.len());
            kept.push((key_cell, value_cell));
        }

        self.pairs = kept;
        self.index = index;
        self.lookup_valid = true;
    }

    /// Look up a value by key. Only meaningful after a rehash.
    pub fn get(&self, key: &NativeValue) -> Option<&NativeValue> {
        if !self.lookup_valid {
            warn!("map lookup before rehash");
            return None;
        }
        self.index.get(&key.content_hash()).and_then(|slots| {
            slots
                .iter()
                .find(|&&i| self.pairs[i].0 == *key)
                .map(|&i| &self.pairs[i].1)
        })
    }

    pub fn is_lookup_valid(&self) -> bool {
        self.lookup_valid
    }
}

impl From<Vec<(NativeValue, NativeValue)>> for MapValue {
    fn from(pairs: Vec<(NativeValue, NativeValue)>) -> Self {
        Self {
            pairs,
            index: FxHashMap::default(),
            lookup_valid: false,
        }
    }
}

impl PartialEq for MapValue {
    fn eq(&self, other: &Self) -> bool {
        self.pairs == other.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyType;

    fn int_prop() -> Property {
        Property::new("element", PropertyType::Int32)
    }

    #[test]
    fn array_grow_and_truncate() {
        let mut heap = ObjectHeap::new();
        let mut delegates = DelegateStore::new();
        let prop = int_prop();

        let mut arr = ArrayValue::new();
        for _ in 0..5 {
            arr.add_value(&prop, &mut delegates);
        }
        assert_eq!(arr.num(), 5);

        arr.truncate(2, &prop, &mut heap, &mut delegates);
        assert_eq!(arr.num(), 2);
    }

    #[test]
    fn set_rehash_deduplicates() {
        let mut heap = ObjectHeap::new();
        let mut delegates = DelegateStore::new();
        let prop = int_prop();

        let mut set = SetValue::new();
        for v in [1i64, 2, 1, 2, 3] {
            let i = set.add_default_invalid(&prop, &mut delegates);
            *set.element_mut(i).unwrap() = NativeValue::Int(v);
        }
        assert!(!set.is_lookup_valid());
        assert!(!set.contains(&NativeValue::Int(1)));

        set.rehash(&prop, &mut heap, &mut delegates);
        assert_eq!(set.num(), 3);
        assert!(set.contains(&NativeValue::Int(1)));
        assert!(set.contains(&NativeValue::Int(3)));
        assert!(!set.contains(&NativeValue::Int(4)));
    }

    #[test]
    fn map_rehash_keeps_first_key() {
        let mut heap = ObjectHeap::new();
        let mut delegates = DelegateStore::new();
        let key_prop = Property::new("key", PropertyType::Str);
        let value_prop = int_prop();

        let mut map = MapValue::new();
        for (k, v) in [("a", 1i64), ("b", 2), ("a", 9)] {
            let i = map.add_default_invalid(&key_prop, &value_prop, &mut delegates);
            let (key_cell, value_cell) = map.pair_mut(i).unwrap();
            *key_cell = NativeValue::Str(k.into());
            *value_cell = NativeValue::Int(v);
        }

        map.rehash(&key_prop, &value_prop, &mut heap, &mut delegates);
        assert_eq!(map.num(), 2);
        assert_eq!(
            map.get(&NativeValue::Str("a".into())),
            Some(&NativeValue::Int(1))
        );
    }
}
