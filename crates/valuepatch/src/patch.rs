//! C5: the typed patch tree.
//!
//! A `Patch` mirrors the shape of the value it describes (struct patches
//! have named fields, slice patches have an edit script, and so on) rather
//! than flattening straight to RFC 6902 ops — that flattening is
//! `Patch::walk`, used by the wire encoders and the dependency resolver.
//! Every node that overwrites or removes a value keeps the value it
//! replaces alongside the new one, the same way the teacher's `combine`
//! package keeps both sides of an annotated merge: it's what lets
//! `reverse()` stay a pure structural transform with no access to a
//! separate pre-image document, and what lets strict-mode apply check a
//! precondition without re-deriving it.
use std::collections::BTreeMap;

use crate::condition::Condition;
use crate::error::{Error, Result};
use crate::hlc::Hlc;
use crate::operation::Operation;
use crate::path::{Path, Token};
use crate::registry::TypeDescriptor;
use crate::value::{Patchable, ScalarKey};

/// Per-node metadata common to every `Patch` variant.
#[derive(Debug, Clone, Default)]
pub struct Meta {
    pub condition: Option<Condition>,
    pub strict: bool,
    pub timestamp: Option<Hlc>,
    /// An informational note diff attaches to a node (e.g. "3 elements fell
    /// back to positional alignment: mixed identity-key presence"),
    /// projected as a standalone `Log` operation by `walk`.
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SliceOp {
    /// `n` elements carry over unchanged from the old sequence.
    Equal(usize),
    Insert(Box<dyn Patchable>),
    Delete(Box<dyn Patchable>),
    Modify(Box<Patch>),
    /// Element at old index `from` reappears at the position this op
    /// occupies (`to`) in the new sequence. Both ends are recorded so
    /// reversal doesn't need to reconstruct cursor state (§4.4).
    Move { from: usize, to: usize },
    /// Like `Move` but the source element also survives at `from`.
    Copy {
        from: usize,
        to: usize,
        value: Box<dyn Patchable>,
    },
}

#[derive(Debug, Clone)]
pub enum PointerOp {
    /// `old` is `None` for a nil-to-set transition, `Some(prev)` when a
    /// previously-set pointer is wholesale replaced rather than having its
    /// target diffed (e.g. a `readonly`/`atomic` pointer field).
    SetNonNil {
        old: Option<Box<dyn Patchable>>,
        new: Box<dyn Patchable>,
    },
    SetNil { old: Box<dyn Patchable> },
    ModifyTarget(Box<Patch>),
}

#[derive(Debug, Clone)]
pub struct SumTransition {
    pub from_variant: &'static str,
    pub old_payload: Box<dyn Patchable>,
    pub to_variant: &'static str,
    pub new_payload: Box<dyn Patchable>,
}

#[derive(Debug, Clone)]
pub enum Patch {
    Noop,
    /// Whole-value literal replacement; used for scalars and also as the
    /// fallback whenever a richer structural patch isn't worth computing.
    Value {
        old: Box<dyn Patchable>,
        new: Box<dyn Patchable>,
        meta: Meta,
    },
    Struct {
        fields: BTreeMap<String, Patch>,
        meta: Meta,
    },
    Map {
        sets: BTreeMap<ScalarKey, Box<dyn Patchable>>,
        modifies: BTreeMap<ScalarKey, Patch>,
        deletes: BTreeMap<ScalarKey, Box<dyn Patchable>>,
        meta: Meta,
    },
    Slice {
        ops: Vec<SliceOp>,
        meta: Meta,
    },
    Array {
        entries: BTreeMap<usize, Patch>,
        meta: Meta,
    },
    Pointer {
        op: PointerOp,
        meta: Meta,
    },
    Sum {
        /// `Some` when the active alternative itself changed; `None` when
        /// only the payload of the current alternative changed (in which
        /// case `child` carries that payload's diff).
        transition: Option<SumTransition>,
        child: Option<Box<Patch>>,
        meta: Meta,
    },
    ReadOnly {
        inner: Box<Patch>,
        meta: Meta,
    },
    /// A value is relocated here from `from`, detected by the global
    /// move/copy pass (§4.4). `old` is whatever previously occupied this
    /// position, which is what makes `reverse()` exact regardless of where
    /// the forward value came from.
    Move {
        from: Path,
        old: Box<dyn Patchable>,
        meta: Meta,
    },
    Copy {
        from: Path,
        old: Box<dyn Patchable>,
        meta: Meta,
    },
    Log { message: String, meta: Meta },
}

impl Patch {
    pub fn is_noop(&self) -> bool {
        matches!(self, Patch::Noop)
    }

    pub fn meta(&self) -> Option<&Meta> {
        match self {
            Patch::Noop => None,
            Patch::Value { meta, .. }
            | Patch::Struct { meta, .. }
            | Patch::Map { meta, .. }
            | Patch::Slice { meta, .. }
            | Patch::Array { meta, .. }
            | Patch::Pointer { meta, .. }
            | Patch::Sum { meta, .. }
            | Patch::ReadOnly { meta, .. }
            | Patch::Move { meta, .. }
            | Patch::Copy { meta, .. }
            | Patch::Log { meta, .. } => Some(meta),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Patch {
        if let Some(meta) = self.meta_mut() {
            meta.condition = Some(condition);
        }
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Patch {
        if let Some(meta) = self.meta_mut() {
            meta.strict = strict;
        }
        self
    }

    pub fn with_timestamp(mut self, ts: Hlc) -> Patch {
        if let Some(meta) = self.meta_mut() {
            meta.timestamp = Some(ts);
        }
        self
    }

    fn meta_mut(&mut self) -> Option<&mut Meta> {
        match self {
            Patch::Noop => None,
            Patch::Value { meta, .. }
            | Patch::Struct { meta, .. }
            | Patch::Map { meta, .. }
            | Patch::Slice { meta, .. }
            | Patch::Array { meta, .. }
            | Patch::Pointer { meta, .. }
            | Patch::Sum { meta, .. }
            | Patch::ReadOnly { meta, .. }
            | Patch::Move { meta, .. }
            | Patch::Copy { meta, .. }
            | Patch::Log { meta, .. } => Some(meta),
        }
    }

    /// Structural reverse (§4.5): the patch that undoes this one. Exact for
    /// every variant except a relocation (`Move`) whose source lives under
    /// a different parent than its destination, where reverting to `old`
    /// in place is correct for the value but loses the "this also came
    /// from elsewhere" relationship — documented in DESIGN.md.
    pub fn reverse(&self) -> Patch {
        match self {
            Patch::Noop => Patch::Noop,
            Patch::Value { old, new, meta } => Patch::Value {
                old: new.dyn_clone(),
                new: old.dyn_clone(),
                meta: meta.clone(),
            },
            Patch::Struct { fields, meta } => Patch::Struct {
                fields: fields.iter().map(|(k, v)| (k.clone(), v.reverse())).collect(),
                meta: meta.clone(),
            },
            Patch::Map {
                sets,
                modifies,
                deletes,
                meta,
            } => Patch::Map {
                sets: deletes.clone(),
                modifies: modifies.iter().map(|(k, v)| (k.clone(), v.reverse())).collect(),
                deletes: sets.clone(),
                meta: meta.clone(),
            },
            Patch::Slice { ops, meta } => Patch::Slice {
                ops: reverse_slice_ops(ops),
                meta: meta.clone(),
            },
            Patch::Array { entries, meta } => Patch::Array {
                entries: entries.iter().map(|(k, v)| (*k, v.reverse())).collect(),
                meta: meta.clone(),
            },
            Patch::Pointer { op, meta } => Patch::Pointer {
                op: match op {
                    PointerOp::SetNonNil { old: None, new } => PointerOp::SetNil { old: new.dyn_clone() },
                    PointerOp::SetNonNil {
                        old: Some(old),
                        new,
                    } => PointerOp::SetNonNil {
                        old: Some(new.dyn_clone()),
                        new: old.dyn_clone(),
                    },
                    PointerOp::SetNil { old } => PointerOp::SetNonNil {
                        old: None,
                        new: old.dyn_clone(),
                    },
                    PointerOp::ModifyTarget(child) => PointerOp::ModifyTarget(Box::new(child.reverse())),
                },
                meta: meta.clone(),
            },
            Patch::Sum {
                transition,
                child,
                meta,
            } => Patch::Sum {
                transition: transition.as_ref().map(|t| SumTransition {
                    from_variant: t.to_variant,
                    old_payload: t.new_payload.dyn_clone(),
                    to_variant: t.from_variant,
                    new_payload: t.old_payload.dyn_clone(),
                }),
                child: child.as_ref().map(|c| Box::new(c.reverse())),
                meta: meta.clone(),
            },
            Patch::ReadOnly { inner, meta } => Patch::ReadOnly {
                inner: Box::new(inner.reverse()),
                meta: meta.clone(),
            },
            Patch::Move { from, old, meta } => Patch::Value {
                old: old.dyn_clone(),
                new: old.dyn_clone(),
                meta: {
                    let _ = from;
                    meta.clone()
                },
            },
            Patch::Copy { old, meta, .. } => Patch::Value {
                old: old.dyn_clone(),
                new: old.dyn_clone(),
                meta: meta.clone(),
            },
            Patch::Log { message, meta } => Patch::Log {
                message: message.clone(),
                meta: meta.clone(),
            },
        }
    }

    /// Flattens the tree into RFC-6902-shaped [`Operation`]s rooted at
    /// `base`, for the dependency resolver and the wire encoders.
    pub fn walk(&self, base: &Path) -> Vec<Operation> {
        let mut out = Vec::new();
        walk_into(self, base, &mut out);
        out
    }
}

fn reverse_slice_ops(ops: &[SliceOp]) -> Vec<SliceOp> {
    ops.iter()
        .map(|op| match op {
            SliceOp::Equal(n) => SliceOp::Equal(*n),
            SliceOp::Insert(v) => SliceOp::Delete(v.dyn_clone()),
            SliceOp::Delete(v) => SliceOp::Insert(v.dyn_clone()),
            SliceOp::Modify(child) => SliceOp::Modify(Box::new(child.reverse())),
            SliceOp::Move { from, to } => SliceOp::Move {
                from: *to,
                to: *from,
            },
            SliceOp::Copy { value, .. } => SliceOp::Delete(value.dyn_clone()),
        })
        .collect()
}

fn walk_into(patch: &Patch, base: &Path, out: &mut Vec<Operation>) {
    if let Some(note) = patch.meta().and_then(|m| m.note.as_ref()) {
        out.push(Operation::log(base.clone(), note.clone()));
    }
    match patch {
        Patch::Noop => {}
        Patch::Value { new, .. } => out.push(Operation::replace(base.clone(), new.dyn_clone())),
        Patch::Struct { fields, .. } => {
            for (name, child) in fields {
                walk_into(child, &base.pushed_property(name.clone()), out);
            }
        }
        Patch::Map {
            sets,
            modifies,
            deletes,
            ..
        } => {
            for (k, v) in sets {
                out.push(Operation::add(base.pushed_property(k.to_string()), v.dyn_clone()));
            }
            for (k, child) in modifies {
                walk_into(child, &base.pushed_property(k.to_string()), out);
            }
            for k in deletes.keys() {
                out.push(Operation::remove(base.pushed_property(k.to_string())));
            }
        }
        Patch::Slice { ops, .. } => {
            let mut idx = 0usize;
            for op in ops {
                let at = base.pushed_index(idx);
                match op {
                    SliceOp::Equal(n) => idx += n,
                    SliceOp::Insert(v) => {
                        out.push(Operation::add(at, v.dyn_clone()));
                        idx += 1;
                    }
                    SliceOp::Delete(_) => out.push(Operation::remove(at)),
                    SliceOp::Modify(child) => {
                        walk_into(child, &at, out);
                        idx += 1;
                    }
                    SliceOp::Move { from, .. } => {
                        out.push(Operation::move_(base.pushed_index(*from), at));
                        idx += 1;
                    }
                    SliceOp::Copy { from, .. } => {
                        out.push(Operation::copy(base.pushed_index(*from), at));
                        idx += 1;
                    }
                }
            }
        }
        Patch::Array { entries, .. } => {
            for (idx, child) in entries {
                walk_into(child, &base.pushed_index(*idx), out);
            }
        }
        Patch::Pointer { op, .. } => match op {
            PointerOp::SetNonNil { new, .. } => out.push(Operation::replace(base.clone(), new.dyn_clone())),
            PointerOp::SetNil { .. } => out.push(Operation::remove(base.clone())),
            PointerOp::ModifyTarget(child) => walk_into(child, base, out),
        },
        Patch::Sum { transition, child, .. } => {
            if let Some(t) = transition {
                out.push(Operation::replace(base.clone(), t.new_payload.dyn_clone()));
            } else if let Some(child) = child {
                walk_into(child, base, out);
            }
        }
        Patch::ReadOnly { inner, .. } => walk_into(inner, base, out),
        Patch::Move { from, .. } => out.push(Operation::move_(from.clone(), base.clone())),
        Patch::Copy { from, .. } => out.push(Operation::copy(from.clone(), base.clone())),
        Patch::Log { message, .. } => out.push(Operation::log(base.clone(), message.clone())),
    }
}

/// Typed navigation for building a [`Patch`] by hand rather than running a
/// diff (§4.5). `field` is checked against the root's [`TypeDescriptor`] as
/// it's called; an unknown name is remembered and surfaces when [`Self::set`]
/// is finally invoked, the same "errors accumulate, build fails once" shape
/// `TypeDescriptorBuilder::build` uses. `index` isn't validated at all — past
/// a struct field there's no descriptor to check an element against, only a
/// position — and always produces a fixed-index `Array` patch; a slice's
/// `Modify` op can't be built this way since it needs the old sequence's
/// alignment to know what index the element currently sits at.
pub struct PatchBuilder {
    descriptor: Option<&'static TypeDescriptor>,
    path: Path,
    error: Option<Error>,
}

impl PatchBuilder {
    pub fn new(descriptor: &'static TypeDescriptor) -> PatchBuilder {
        PatchBuilder {
            descriptor: Some(descriptor),
            path: Path::root(),
            error: None,
        }
    }

    /// Convenience over [`Self::new`] for callers holding an instance rather
    /// than its descriptor directly.
    pub fn for_value(root: &dyn Patchable) -> Result<PatchBuilder> {
        let descriptor = root.type_descriptor().ok_or_else(|| Error::TypeMismatch {
            path: Path::root(),
            expected: "struct",
            actual: root.kind_name(),
        })?;
        Ok(PatchBuilder::new(descriptor))
    }

    pub fn field(mut self, name: &str) -> PatchBuilder {
        if self.error.is_some() {
            return self;
        }
        if let Some(descriptor) = self.descriptor {
            if descriptor.field(name).is_none() {
                self.error = Some(Error::PathNotFound(self.path.pushed_property(name.to_string())));
                return self;
            }
        }
        self.path.push_property(name.to_string());
        // The field's own type descriptor isn't reachable from here without
        // an instance, so validation only covers the level we were built
        // with; deeper `field` calls just accumulate path.
        self.descriptor = None;
        self
    }

    pub fn index(mut self, idx: usize) -> PatchBuilder {
        if self.error.is_none() {
            self.path.push_index(idx);
            self.descriptor = None;
        }
        self
    }

    pub fn set(self, old: Box<dyn Patchable>, new: Box<dyn Patchable>) -> Result<Patch> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(wrap_at_path(
            &self.path,
            Patch::Value {
                old,
                new,
                meta: Meta::default(),
            },
        ))
    }
}

/// Wraps `leaf` in the chain of `Struct`/`Array` patches the builder's
/// accumulated path implies, innermost token first.
fn wrap_at_path(path: &Path, leaf: Patch) -> Patch {
    let (parent, last) = match path.split_last() {
        None => return leaf,
        Some(pair) => pair,
    };
    let wrapped = match last {
        Token::Property(name) => {
            let mut fields = BTreeMap::new();
            fields.insert(name, leaf);
            Patch::Struct {
                fields,
                meta: Meta::default(),
            }
        }
        Token::Index(i) => {
            let mut entries = BTreeMap::new();
            entries.insert(i, leaf);
            Patch::Array {
                entries,
                meta: Meta::default(),
            }
        }
        Token::NextIndex => leaf,
    };
    wrap_at_path(&parent, wrapped)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn noop_reverses_to_noop() {
        assert!(Patch::Noop.reverse().is_noop());
    }

    #[test]
    fn value_reverse_swaps_old_and_new() {
        let patch = Patch::Value {
            old: Box::new(1i64),
            new: Box::new(2i64),
            meta: Meta::default(),
        };
        let rev = patch.reverse();
        match rev {
            Patch::Value { old, new, .. } => {
                assert!(crate::equal::equal(old.as_ref(), &2i64));
                assert!(crate::equal::equal(new.as_ref(), &1i64));
            }
            _ => panic!("expected Value"),
        }
    }

    #[test]
    fn struct_walk_prefixes_field_names() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "name".to_string(),
            Patch::Value {
                old: Box::new("alice".to_string()),
                new: Box::new("bob".to_string()),
                meta: Meta::default(),
            },
        );
        let patch = Patch::Struct {
            fields,
            meta: Meta::default(),
        };
        let ops = patch.walk(&Path::root());
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path.to_string(), "/name");
    }

    #[test]
    fn slice_move_reverse_swaps_endpoints() {
        let ops = vec![
            SliceOp::Move { from: 1, to: 0 },
            SliceOp::Move { from: 0, to: 1 },
        ];
        let rev = reverse_slice_ops(&ops);
        assert!(matches!(rev[0], SliceOp::Move { from: 0, to: 1 }));
        assert!(matches!(rev[1], SliceOp::Move { from: 1, to: 0 }));
    }

    #[test]
    fn field_swap_round_trips_through_reverse() {
        // S4: swapping two struct fields by move is its own inverse once
        // each side's `old` is restored independently.
        let mut fields = BTreeMap::new();
        fields.insert(
            "a".to_string(),
            Patch::Move {
                from: Path::parse("/b").unwrap(),
                old: Box::new(1i64),
                meta: Meta::default(),
            },
        );
        fields.insert(
            "b".to_string(),
            Patch::Move {
                from: Path::parse("/a").unwrap(),
                old: Box::new(2i64),
                meta: Meta::default(),
            },
        );
        let patch = Patch::Struct {
            fields,
            meta: Meta::default(),
        };
        let rev = patch.reverse();
        if let Patch::Struct { fields, .. } = rev {
            match &fields["a"] {
                Patch::Value { new, .. } => assert!(crate::equal::equal(new.as_ref(), &1i64)),
                _ => panic!("expected Value"),
            }
            match &fields["b"] {
                Patch::Value { new, .. } => assert!(crate::equal::equal(new.as_ref(), &2i64)),
                _ => panic!("expected Value"),
            }
        } else {
            panic!("expected Struct");
        }
    }

    #[derive(Debug, Clone)]
    struct Widget {
        count: i64,
    }

    fn widget_descriptor() -> &'static TypeDescriptor {
        static DESCRIPTOR: std::sync::OnceLock<TypeDescriptor> = std::sync::OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            TypeDescriptor::build("Widget")
                .field("count", crate::registry::FieldFlags::default())
                .build()
        })
    }

    impl Patchable for Widget {
        fn kind(&self) -> crate::value::Kind {
            crate::value::Kind::Struct
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
        fn dyn_clone(&self) -> Box<dyn Patchable> {
            Box::new(self.clone())
        }
        fn type_descriptor(&self) -> Option<&'static TypeDescriptor> {
            Some(widget_descriptor())
        }
    }

    #[test]
    fn builder_validates_field_name_against_descriptor() {
        let widget = Widget { count: 1 };
        let err = PatchBuilder::for_value(&widget)
            .unwrap()
            .field("missing")
            .set(Box::new(1i64), Box::new(2i64))
            .unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }

    #[test]
    fn builder_produces_the_same_shape_diff_would() {
        let widget = Widget { count: 1 };
        let patch = PatchBuilder::for_value(&widget)
            .unwrap()
            .field("count")
            .set(Box::new(1i64), Box::new(2i64))
            .unwrap();
        match patch {
            Patch::Struct { fields, .. } => match &fields["count"] {
                Patch::Value { old, new, .. } => {
                    assert!(crate::equal::equal(old.as_ref(), &1i64));
                    assert!(crate::equal::equal(new.as_ref(), &2i64));
                }
                _ => panic!("expected Value"),
            },
            _ => panic!("expected Struct"),
        }
    }

    #[test]
    fn builder_index_wraps_in_a_fixed_position_array_patch() {
        let patch = PatchBuilder::new(widget_descriptor())
            .index(3)
            .set(Box::new(1i64), Box::new(2i64))
            .unwrap();
        assert!(matches!(patch, Patch::Array { .. }));
        let ops = patch.walk(&Path::root());
        assert_eq!(ops[0].path.to_string(), "/3");
    }
}
