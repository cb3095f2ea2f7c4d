//! Degrading push/fetch boundary.
//!
//! These free functions are the only way code outside a codec converts a
//! property. They dispatch through the registry and absorb failures: a push
//! that cannot proceed still leaves exactly one value (nil) on the stack,
//! and a fetch that cannot proceed reports `false` and leaves the cell at
//! its current value. Neither unwinds past the property being converted.

use tracing::error;

use lualink_core::property::Property;
use lualink_core::runtime::{PushOpts, Runtime};
use lualink_core::script::StackSlot;
use lualink_core::value::NativeValue;
use lualink_registry::CodecRegistry;

/// Convert a native cell into script values, returning how many values were
/// pushed. An unregistered kind or a failing codec degrades to a single nil.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn push_property(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &NativeValue,
    opts: PushOpts,
) -> usize {
    let Some(pusher) = registry.lookup_pusher(property.kind()) else {
        error!(property = %property.name, kind = ?property.kind(), "no pusher registered");
        rt.stack.push_nil();
        return 1;
    };
    match pusher(registry, rt, property, cell, opts) {
        Ok(pushed) => pushed,
        Err(err) => {
            error!(property = %property.name, %err, "push failed");
            rt.stack.push_nil();
            1
        }
    }
}

/// Read the script value at `slot` into a native cell. Returns whether the
/// fetch succeeded; on failure the cell keeps its current value and the
/// stack depth is unchanged either way.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn fetch_property(
    registry: &CodecRegistry,
    rt: &mut Runtime,
    property: &Property,
    cell: &mut NativeValue,
    slot: StackSlot,
) -> bool {
    let Some(fetcher) = registry.lookup_fetcher(property.kind()) else {
        error!(property = %property.name, kind = ?property.kind(), "no fetcher registered");
        return false;
    };
    match fetcher(registry, rt, property, cell, slot) {
        Ok(()) => true,
        Err(err) => {
            error!(property = %property.name, %err, "fetch failed");
            false
        }
    }
}
