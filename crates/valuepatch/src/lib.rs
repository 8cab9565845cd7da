//! Structural diff, patch, and merge over typed, heterogeneous in-memory
//! values: any Rust type that implements [`Patchable`] can be diffed against
//! another value of its own type, the resulting [`Patch`] can be applied or
//! reversed, guarded by a [`Condition`], and independently produced patches
//! against a shared ancestor can be merged into one.

// C1: type descriptors and the sum-type registry.
pub mod registry;
pub use registry::{FieldDescriptor, FieldFlags, SumTypeCodec, TypeDescriptor};

// The reflection substitute every participating type implements.
pub mod value;
pub use value::{
    Bytes, Kind, MapEntries, MapEntriesMut, Patchable, Scalar, ScalarKey, SeqItems, SeqItemsMut,
    StructFields, StructFieldsMut,
};

// Component-local error types.
pub mod error;
pub use error::{ApplyError, Error, Result};

// C2: RFC 6901 paths.
pub mod path;
pub use path::{Path, Token};

// C3: semantic equality.
pub mod equal;
pub use equal::equal;

// C7: the condition tree and its expression parser.
pub mod condition;
pub use condition::Condition;

// The flat RFC-6902-shaped operation projection.
pub mod operation;
pub use operation::{Operation, OperationKind};

// C5: the typed patch tree.
pub mod patch;
pub use patch::{Meta, Patch, PatchBuilder, PointerOp, SliceOp, SumTransition};

// C8: sibling operation ordering within one apply pass.
pub mod depend;
pub use depend::order_for_apply;

// C4: the diff engine.
pub mod diff;
pub use diff::diff;

// C6: the apply/reverse engine.
pub mod apply;
pub use apply::{apply, apply_with_options, unapply, ApplyOptions};

// C9: N-way merge.
pub mod merge;
pub use merge::{merge, Conflict, MergeOptions, Resolver};

// HLC timestamps used to order concurrent writes during merge.
pub mod hlc;
pub use hlc::{Hlc, HlcNode};

// C10: JSON and binary wire adapters, plus sequential replay of a decoded
// operation list.
pub mod wire;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn diff_apply_and_reverse_round_trip_a_scalar() {
        let old: i64 = 1;
        let new: i64 = 2;
        let patch = diff(&old, &new);

        let mut target: Box<dyn Patchable> = Box::new(old);
        apply(&mut target, &patch).unwrap();
        assert!(equal(target.as_ref(), &new));

        unapply(&mut target, &patch).unwrap();
        assert!(equal(target.as_ref(), &old));
    }
}
