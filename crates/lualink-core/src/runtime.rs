//! Marshalling runtime: the script stack plus the native-side stores that
//! codecs and the call marshaller operate on together.

use crate::delegate::DelegateStore;
use crate::heap::ObjectHeap;
use crate::script::{AdapterId, DelegateAdapter, ScriptStack};

/// How fetches treat script values of the wrong shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Coerce where the script language would (numeric strings parse, any
    /// value has a truthiness) and fall back to the zero value otherwise.
    #[default]
    Permissive,
    /// Reject shape mismatches with a type error.
    Strict,
}

/// Per-push options.
#[derive(Debug, Clone, Copy, Default)]
pub struct PushOpts {
    /// Deep-copy aggregate contents instead of sharing handles where both
    /// are representable.
    pub copy: bool,
}

/// Wraps a native delegate slot into a script-callable adapter. Injected so
/// hosts can substitute their own adapter representation.
pub type AdapterCtor = fn(&mut ScriptStack, DelegateAdapter) -> AdapterId;

fn default_adapter_ctor(stack: &mut ScriptStack, adapter: DelegateAdapter) -> AdapterId {
    stack.register_adapter(adapter)
}

/// Everything marshalling reads and writes: the script stack and the
/// native-side object and delegate stores.
#[derive(Debug)]
pub struct Runtime {
    pub stack: ScriptStack,
    pub heap: ObjectHeap,
    pub delegates: DelegateStore,
    pub policy: FetchPolicy,
    pub adapter_ctor: AdapterCtor,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            stack: ScriptStack::new(),
            heap: ObjectHeap::new(),
            delegates: DelegateStore::new(),
            policy: FetchPolicy::default(),
            adapter_ctor: default_adapter_ctor,
        }
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: FetchPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }
}
