//! Error types for the marshalling engine.
//!
//! None of these abort marshalling as a whole: the push/fetch boundary
//! degrades to a nil value or a `false` result and logs the failure, so a
//! bad parameter never unwinds past the current property or call.

use thiserror::Error;

use crate::name::{Name, NameHash};
use crate::property::PropertyKind;

/// Errors raised while converting values between the script stack and the
/// reflected object model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    /// No codec is registered for a property's kind tag.
    #[error("no codec registered for property '{property}' of kind {kind:?}")]
    UnknownKind { property: Name, kind: PropertyKind },

    /// The script value's shape does not match the expected kind.
    #[error("type mismatch for property '{property}': expected {expected}, got {actual}")]
    TypeMismatch {
        property: Name,
        expected: &'static str,
        actual: &'static str,
    },

    /// A referenced native type could not be resolved at conversion time.
    #[error("cannot resolve native type for property '{property}'")]
    ResolutionFailure { property: Name },

    /// A stack slot index was outside the current stack.
    #[error("stack slot {slot} is out of bounds (depth {depth})")]
    SlotOutOfBounds { slot: i32, depth: usize },

    /// A codec was registered twice for the same kind.
    #[error("codec for kind {kind:?} is already registered")]
    DuplicateCodec { kind: PropertyKind },

    /// An object or delegate handle was stale or pointed at freed storage.
    #[error("stale handle for property '{property}'")]
    StaleHandle { property: Name },

    /// A script closure was bound against a delegate with a different
    /// signature.
    #[error("delegate signature mismatch: expected {expected}, got {actual}")]
    SignatureMismatch { expected: NameHash, actual: NameHash },

    /// A native function body reported a failure.
    #[error("native call '{function}' failed: {detail}")]
    NativeCall { function: Name, detail: String },
}
