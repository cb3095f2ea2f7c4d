//! Native function storage and callable trait.

use std::fmt;
use std::rc::Rc;

use crate::delegate::DelegateStore;
use crate::error::MarshalError;
use crate::heap::ObjectHeap;
use crate::name::NameHash;
use crate::value::NativeValue;

/// Arguments handed to a native function body: the call frame's parameter
/// cells plus the host stores a body may need to touch.
pub struct CallArgs<'a> {
    /// One cell per parameter descriptor, in declaration order (the return
    /// slot included).
    pub cells: &'a mut [NativeValue],
    pub heap: &'a mut ObjectHeap,
    pub delegates: &'a mut DelegateStore,
}

/// Trait for callable native function bodies.
pub trait NativeCallable {
    fn call(&self, args: &mut CallArgs<'_>) -> Result<(), MarshalError>;
}

impl<F> NativeCallable for F
where
    F: Fn(&mut CallArgs<'_>) -> Result<(), MarshalError>,
{
    fn call(&self, args: &mut CallArgs<'_>) -> Result<(), MarshalError> {
        (self)(args)
    }
}

/// Type-erased native function.
///
/// Wraps any callable implementing [`NativeCallable`] so bodies of different
/// shapes can be stored uniformly in function descriptors and closures. Each
/// `NativeFn` carries a hash id assigned at creation.
pub struct NativeFn {
    pub id: NameHash,
    inner: Rc<dyn NativeCallable>,
}

impl NativeFn {
    /// Create a native function with a specific id.
    pub fn new<F>(id: NameHash, body: F) -> Self
    where
        F: NativeCallable + 'static,
    {
        Self {
            id,
            inner: Rc::new(body),
        }
    }

    /// Create a native function, deriving the id from a name.
    pub fn named<F>(name: &str, body: F) -> Self
    where
        F: NativeCallable + 'static,
    {
        Self::new(NameHash::from_name(name), body)
    }

    /// Call this function with the given arguments.
    pub fn call(&self, args: &mut CallArgs<'_>) -> Result<(), MarshalError> {
        self.inner.call(args)
    }
}

impl Clone for NativeFn {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").field("id", &self.id).finish_non_exhaustive()
    }
}
