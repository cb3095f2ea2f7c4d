//! Call marshalling: one script call into a reflected function.
//!
//! A call is a single pass with no state carried between invocations:
//! allocate the frame, fetch inputs from consecutive stack slots, run the
//! native entry, push the return value and out-params, destruct the frame.
//! Conversion failures are per-parameter; the frame's lifecycle bookkeeping
//! runs regardless.

use tracing::{error, warn};

use lualink_core::heap::ObjectHandle;
use lualink_core::native_fn::{CallArgs, NativeFn};
use lualink_core::property::{FunctionDef, FunctionFlags, NativeEntry};
use lualink_core::runtime::{PushOpts, Runtime};
use lualink_core::script::StackSlot;
use lualink_core::value::NativeValue;
use lualink_core::MarshalError;
use lualink_registry::CodecRegistry;

use crate::marshal::{fetch_property, push_property};

/// One cell per parameter descriptor, alive for exactly one invocation.
pub struct CallFrame {
    cells: Vec<NativeValue>,
}

impl CallFrame {
    /// Allocate the frame zero-initialized, then run the constructor of
    /// every parameter that is not trivially zero-constructible.
    pub fn allocate(func: &FunctionDef, rt: &mut Runtime) -> Self {
        let cells = func
            .params
            .iter()
            .map(|param| {
                if param.flags.contains(lualink_core::PropertyFlags::ZERO_CONSTRUCT)
                    || param.kind().is_trivially_zero()
                {
                    NativeValue::Zeroed
                } else {
                    param.initialize_value(&mut rt.delegates)
                }
            })
            .collect();
        Self { cells }
    }

    pub fn cells(&self) -> &[NativeValue] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [NativeValue] {
        &mut self.cells
    }

    /// Run every parameter's destructor. Consumes the frame so a cell can
    /// never be destructed twice through it.
    pub fn destroy(mut self, func: &FunctionDef, rt: &mut Runtime) {
        for (param, cell) in func.params.iter().zip(self.cells.iter_mut()) {
            param.destroy_value(cell, &mut rt.heap, &mut rt.delegates);
        }
    }
}

/// Scoped bypass of the override trampoline.
///
/// Captures the function's dispatch flag and entry pointer, installs the
/// non-override processing path, and restores the originals on drop so the
/// function is bit-for-bit back to its pre-call state on every exit path.
pub struct TrampolineGuard<'a> {
    func: &'a FunctionDef,
    flags: FunctionFlags,
    entry: NativeEntry,
}

impl<'a> TrampolineGuard<'a> {
    pub fn bypass(func: &'a FunctionDef) -> Self {
        let flags = func.flags.get();
        let entry = func.entry.replace(NativeEntry::Internal);
        func.flags.set(flags.difference(FunctionFlags::NATIVE));
        Self { func, flags, entry }
    }
}

impl Drop for TrampolineGuard<'_> {
    fn drop(&mut self) {
        self.func.flags.set(self.flags);
        self.func.entry.replace(self.entry.clone());
    }
}

fn run_body(
    rt: &mut Runtime,
    body: &NativeFn,
    cells: &mut [NativeValue],
) -> Result<(), MarshalError> {
    let mut args = CallArgs {
        cells,
        heap: &mut rt.heap,
        delegates: &mut rt.delegates,
    };
    body.call(&mut args)
}

/// The non-override processing path: the function's default body.
pub fn process_internal(
    rt: &mut Runtime,
    func: &FunctionDef,
    cells: &mut [NativeValue],
) -> Result<(), MarshalError> {
    match &func.default_impl {
        Some(body) => run_body(rt, body, cells),
        None => Ok(()),
    }
}

/// Event dispatch: route through a script override when the function's
/// entry is the trampoline marker and the target object carries one,
/// otherwise fall through to the native entry or default body.
pub fn process_event(
    rt: &mut Runtime,
    func: &FunctionDef,
    target: Option<ObjectHandle>,
    cells: &mut [NativeValue],
) -> Result<(), MarshalError> {
    let entry = func.entry.borrow().clone();
    if func.flags.get().contains(FunctionFlags::NATIVE) {
        match entry {
            NativeEntry::Trampoline => {
                if let Some(handle) = target {
                    if let Some(closure) = rt.heap.override_for(handle, func.name.hash()) {
                        if let Some(body) =
                            rt.stack.closure(closure).and_then(|c| c.body.clone())
                        {
                            return run_body(rt, &body, cells);
                        }
                    }
                }
                return process_internal(rt, func, cells);
            }
            NativeEntry::Fn(body) => return run_body(rt, &body, cells),
            NativeEntry::Internal => {}
        }
    }
    process_internal(rt, func, cells)
}

/// Marshal one script call into `func`, reading arguments from consecutive
/// stack slots starting at `first_slot`. Returns the number of script
/// values pushed (return value first, then out-params in declaration
/// order). Best-effort per parameter: a failed fetch leaves that parameter
/// at its constructed value and the call proceeds.
///
/// `parent_default` requests the native default body even when the target
/// carries a script override for this function.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn call_function(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    func: &FunctionDef,
    target: Option<ObjectHandle>,
    first_slot: StackSlot,
    parent_default: bool,
) -> usize {
    let mut frame = CallFrame::allocate(func, rt);

    // inputs come from consecutive slots; the slot counter advances once
    // per consumed input only
    let mut slot = first_slot;
    for (param, cell) in func.params.iter().zip(frame.cells_mut().iter_mut()) {
        if param.is_return_parm() || !param.is_input_parm() {
            continue;
        }
        fetch_property(registry, rt, param, cell, slot);
        slot += 1;
    }

    // the trampoline is stripped only when the target has no override for
    // this function or the caller asked for the parent default; otherwise
    // dispatch goes through the override
    let has_override = target
        .and_then(|handle| rt.heap.override_for(handle, func.name.hash()))
        .is_some();
    let is_trampoline = matches!(*func.entry.borrow(), NativeEntry::Trampoline);
    let result = {
        let _guard = (is_trampoline && (!has_override || parent_default))
            .then(|| TrampolineGuard::bypass(func));
        process_event(rt, func, target, frame.cells_mut())
    };
    if let Err(err) = &result {
        error!(function = %func.name, %err, "native call failed");
    }

    let mut pushed = 0;
    if result.is_ok() {
        for (param, cell) in func.params.iter().zip(frame.cells().iter()) {
            if param.is_return_parm() {
                pushed += push_property(registry, rt, param, cell, PushOpts::default());
            }
        }
        for (param, cell) in func.params.iter().zip(frame.cells().iter()) {
            if param.is_out_result() {
                pushed += push_property(registry, rt, param, cell, PushOpts::default());
            }
        }
    }

    frame.destroy(func, rt);
    pushed
}

/// Invoke every closure bound to a delegate cell, in bind order, against
/// the given parameter cells. Returns how many bindings ran. Bindings whose
/// recorded signature does not match `signature` are skipped and reported.
pub fn fire_delegate(
    rt: &mut Runtime,
    signature: &FunctionDef,
    cell: &NativeValue,
    cells: &mut [NativeValue],
) -> usize {
    let bindings = match cell {
        NativeValue::Delegate(id) | NativeValue::Multicast(id) => rt.delegates.bindings_of(*id),
        NativeValue::Sparse(sparse) => rt.delegates.sparse_bindings(sparse).to_vec(),
        _ => Vec::new(),
    };

    let expected = signature.signature_hash();
    let mut invoked = 0;
    for binding in bindings {
        if binding.signature != expected {
            warn!(
                function = %signature.name,
                "skipping delegate binding with mismatched signature"
            );
            continue;
        }
        let Some(body) = rt.stack.closure(binding.closure).and_then(|c| c.body.clone()) else {
            continue;
        };
        if let Err(err) = run_body(rt, &body, cells) {
            error!(function = %signature.name, %err, "delegate target failed");
            continue;
        }
        invoked += 1;
    }
    invoked
}
