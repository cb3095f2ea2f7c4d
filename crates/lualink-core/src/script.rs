//! Script-side value model.
//!
//! [`ScriptStack`] mirrors a scripting VM's data stack: slots are 1-based
//! from the bottom, negative slots count from the top. Tables, closures and
//! delegate adapters live in arenas owned by the stack so stack values stay
//! small and copyable.

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use crate::delegate::{DelegateId, SparseCell};
use crate::error::MarshalError;
use crate::heap::ObjectHandle;
use crate::name::{Name, NameHash};
use crate::native_fn::NativeFn;
use crate::property::ClassRef;

/// 1-based stack slot; negative values address from the top.
pub type StackSlot = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClosureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterId(pub u32);

/// A value as the scripting side sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Str(String),
    Table(TableId),
    Closure(ClosureId),
    Object(ObjectHandle),
    /// Opaque handle to a type descriptor (not an instance).
    Class(ClassRef),
    Adapter(AdapterId),
}

impl ScriptValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Integer(_) | ScriptValue::Number(_) => "number",
            ScriptValue::Str(_) => "string",
            ScriptValue::Table(_) => "table",
            ScriptValue::Closure(_) => "function",
            ScriptValue::Object(_) => "object",
            ScriptValue::Class(_) => "class",
            ScriptValue::Adapter(_) => "delegate",
        }
    }

    /// Integer coercion: numbers convert, numeric strings parse, everything
    /// else fails.
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            ScriptValue::Integer(v) => Some(*v),
            ScriptValue::Number(v) => Some(*v as i64),
            ScriptValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn to_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Integer(v) => Some(*v as f64),
            ScriptValue::Number(v) => Some(*v),
            ScriptValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Truthiness: only nil and false are false.
    pub fn to_bool(&self) -> bool {
        !matches!(self, ScriptValue::Nil | ScriptValue::Bool(false))
    }

    /// String coercion: numbers format, everything non-string else fails.
    pub fn to_str(&self) -> Option<String> {
        match self {
            ScriptValue::Str(s) => Some(s.clone()),
            ScriptValue::Integer(v) => Some(v.to_string()),
            ScriptValue::Number(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

/// Table key. Number keys are total-ordered so the key is hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScriptKey {
    Bool(bool),
    Integer(i64),
    Number(OrderedFloat<f64>),
    Str(String),
    Object(ObjectHandle),
}

impl ScriptKey {
    /// Keys are a subset of values; nil and other non-keyable values fail.
    pub fn from_value(value: &ScriptValue) -> Option<ScriptKey> {
        match value {
            ScriptValue::Bool(v) => Some(ScriptKey::Bool(*v)),
            ScriptValue::Integer(v) => Some(ScriptKey::Integer(*v)),
            ScriptValue::Number(v) => Some(ScriptKey::Number(OrderedFloat(*v))),
            ScriptValue::Str(s) => Some(ScriptKey::Str(s.clone())),
            ScriptValue::Object(h) => Some(ScriptKey::Object(*h)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> ScriptValue {
        match self {
            ScriptKey::Bool(v) => ScriptValue::Bool(*v),
            ScriptKey::Integer(v) => ScriptValue::Integer(*v),
            ScriptKey::Number(v) => ScriptValue::Number(v.0),
            ScriptKey::Str(s) => ScriptValue::Str(s.clone()),
            ScriptKey::Object(h) => ScriptValue::Object(*h),
        }
    }
}

/// Insertion-ordered table with hashed key lookup.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<(ScriptKey, ScriptValue)>,
    index: FxHashMap<ScriptKey, usize>,
}

impl Table {
    pub fn set(&mut self, key: ScriptKey, value: ScriptValue) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &ScriptKey) -> Option<&ScriptValue> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[(ScriptKey, ScriptValue)] {
        &self.entries
    }

    /// Sequence length: count of consecutive integer keys starting at 1.
    pub fn seq_len(&self) -> usize {
        let mut len = 0;
        while self.get(&ScriptKey::Integer(len as i64 + 1)).is_some() {
            len += 1;
        }
        len
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }
}

/// A registered script function. Test doubles carry a native stand-in body.
#[derive(Debug, Clone)]
pub struct ClosureEntry {
    pub name: Name,
    pub body: Option<NativeFn>,
}

/// What a pushed delegate adapter points back at.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterTarget {
    Slot(DelegateId),
    Sparse(SparseCell),
}

/// Script-visible stand-in for a native delegate: holds enough identity to
/// route bind and fire calls back to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateAdapter {
    pub target: AdapterTarget,
    pub signature: NameHash,
}

/// The scripting VM's data stack plus its object arenas.
#[derive(Debug, Default)]
pub struct ScriptStack {
    values: Vec<ScriptValue>,
    tables: Vec<Table>,
    closures: Vec<ClosureEntry>,
    adapters: Vec<DelegateAdapter>,
}

impl ScriptStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(&self) -> usize {
        self.values.len()
    }

    /// Resolve a possibly-negative slot to a 0-based vector index.
    fn resolve(&self, slot: StackSlot) -> Result<usize, MarshalError> {
        let depth = self.values.len();
        let index = if slot > 0 {
            slot as i64 - 1
        } else if slot < 0 {
            depth as i64 + slot as i64
        } else {
            -1
        };
        if index < 0 || index as usize >= depth {
            return Err(MarshalError::SlotOutOfBounds { slot, depth });
        }
        Ok(index as usize)
    }

    pub fn value_at(&self, slot: StackSlot) -> Result<&ScriptValue, MarshalError> {
        let index = self.resolve(slot)?;
        Ok(&self.values[index])
    }

    pub fn push(&mut self, value: ScriptValue) {
        self.values.push(value);
    }

    pub fn push_nil(&mut self) {
        self.values.push(ScriptValue::Nil);
    }

    pub fn pop(&mut self, count: usize) {
        let keep = self.values.len().saturating_sub(count);
        self.values.truncate(keep);
    }

    /// Pop and return the top value.
    pub fn pop_value(&mut self) -> Option<ScriptValue> {
        self.values.pop()
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Create a table and push a reference to it.
    pub fn push_new_table(&mut self) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(Table::default());
        self.values.push(ScriptValue::Table(id));
        id
    }

    /// Create a table without pushing it.
    pub fn create_table(&mut self) -> TableId {
        let id = TableId(self.tables.len() as u32);
        self.tables.push(Table::default());
        id
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.0 as usize)
    }

    pub fn table_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(id.0 as usize)
    }

    /// Pop the top value and store it at integer position `pos` of the table
    /// at `table_slot`.
    pub fn set_index(&mut self, table_slot: StackSlot, pos: i64) -> Result<(), MarshalError> {
        let id = match self.value_at(table_slot)? {
            ScriptValue::Table(id) => *id,
            other => {
                return Err(MarshalError::TypeMismatch {
                    property: Name::from("table"),
                    expected: "table",
                    actual: other.kind_name(),
                });
            }
        };
        let value = self.pop_value().unwrap_or(ScriptValue::Nil);
        if let Some(table) = self.tables.get_mut(id.0 as usize) {
            table.set(ScriptKey::Integer(pos), value);
        }
        Ok(())
    }

    /// Pop value then key from the top and store the pair in the table at
    /// `table_slot`. Non-keyable keys drop the pair.
    pub fn set_pair(&mut self, table_slot: StackSlot) -> Result<(), MarshalError> {
        let id = match self.value_at(table_slot)? {
            ScriptValue::Table(id) => *id,
            other => {
                return Err(MarshalError::TypeMismatch {
                    property: Name::from("table"),
                    expected: "table",
                    actual: other.kind_name(),
                });
            }
        };
        let value = self.pop_value().unwrap_or(ScriptValue::Nil);
        let key = self.pop_value().unwrap_or(ScriptValue::Nil);
        if let (Some(key), Some(table)) =
            (ScriptKey::from_value(&key), self.tables.get_mut(id.0 as usize))
        {
            table.set(key, value);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Closures and adapters
    // ------------------------------------------------------------------

    pub fn register_closure(&mut self, name: impl Into<Name>, body: Option<NativeFn>) -> ClosureId {
        let id = ClosureId(self.closures.len() as u32);
        self.closures.push(ClosureEntry {
            name: name.into(),
            body,
        });
        id
    }

    pub fn closure(&self, id: ClosureId) -> Option<&ClosureEntry> {
        self.closures.get(id.0 as usize)
    }

    pub fn register_adapter(&mut self, adapter: DelegateAdapter) -> AdapterId {
        let id = AdapterId(self.adapters.len() as u32);
        self.adapters.push(adapter);
        id
    }

    pub fn adapter(&self, id: AdapterId) -> Option<&DelegateAdapter> {
        self.adapters.get(id.0 as usize)
    }
}
