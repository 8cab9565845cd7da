//! C4: the diff engine. Dispatches on [`Kind`], descending structurally and
//! falling back to a whole-value `Patch::Value` the moment either side is a
//! type-tagged atomic leaf (scalar, `atomic`-flagged field, or differing
//! sum-type variant).
mod myers;

use std::collections::BTreeMap;

use crate::equal::equal;
use crate::patch::{Meta, Patch, PointerOp, SliceOp, SumTransition};
use crate::path::Path;
use crate::value::{Kind, Patchable};

/// Computes the patch that turns `old` into `new`. Returns `Patch::Noop`
/// when the values are already equal under [`equal`].
pub fn diff(old: &dyn Patchable, new: &dyn Patchable) -> Patch {
    let mut patch = diff_inner(old, new);
    detect_global_relocations(&mut patch);
    patch
}

fn diff_inner(old: &dyn Patchable, new: &dyn Patchable) -> Patch {
    if old.kind() != new.kind() {
        return Patch::Value {
            old: old.dyn_clone(),
            new: new.dyn_clone(),
            meta: Meta::default(),
        };
    }
    match old.kind() {
        Kind::Null
        | Kind::Bool
        | Kind::Int
        | Kind::UInt
        | Kind::Float
        | Kind::String
        | Kind::Bytes => diff_scalar(old, new),
        Kind::Pointer => diff_pointer(old, new),
        Kind::Sum => diff_sum(old, new),
        Kind::Struct => diff_struct(old, new),
        Kind::Seq => diff_seq(old, new),
        Kind::Array => diff_array(old, new),
        Kind::Map => diff_map(old, new),
    }
}

fn diff_scalar(old: &dyn Patchable, new: &dyn Patchable) -> Patch {
    if equal(old, new) {
        return Patch::Noop;
    }
    Patch::Value {
        old: old.dyn_clone(),
        new: new.dyn_clone(),
        meta: Meta::default(),
    }
}

fn diff_pointer(old: &dyn Patchable, new: &dyn Patchable) -> Patch {
    match (old.pointer_target(), new.pointer_target()) {
        (Some(None), Some(None)) => Patch::Noop,
        (Some(None), Some(Some(n))) => Patch::Pointer {
            op: crate::patch::PointerOp::SetNonNil {
                old: None,
                new: n.dyn_clone(),
            },
            meta: Meta::default(),
        },
        (Some(Some(o)), Some(None)) => Patch::Pointer {
            op: crate::patch::PointerOp::SetNil { old: o.dyn_clone() },
            meta: Meta::default(),
        },
        (Some(Some(o)), Some(Some(n))) => {
            let child = diff_inner(o, n);
            if child.is_noop() {
                Patch::Noop
            } else {
                Patch::Pointer {
                    op: crate::patch::PointerOp::ModifyTarget(Box::new(child)),
                    meta: Meta::default(),
                }
            }
        }
        _ => Patch::Noop,
    }
}

fn diff_sum(old: &dyn Patchable, new: &dyn Patchable) -> Patch {
    let (Some((ov, op)), Some((nv, np))) = (old.sum_variant(), new.sum_variant()) else {
        return Patch::Noop;
    };
    if ov != nv {
        return Patch::Sum {
            transition: Some(SumTransition {
                from_variant: ov,
                old_payload: op.dyn_clone(),
                to_variant: nv,
                new_payload: np.dyn_clone(),
            }),
            child: None,
            meta: Meta::default(),
        };
    }
    let child = diff_inner(op, np);
    if child.is_noop() {
        Patch::Noop
    } else {
        Patch::Sum {
            transition: None,
            child: Some(Box::new(child)),
            meta: Meta::default(),
        }
    }
}

fn diff_struct(old: &dyn Patchable, new: &dyn Patchable) -> Patch {
    let (Some(fo), Some(fn_)) = (old.struct_fields(), new.struct_fields()) else {
        return Patch::Noop;
    };
    let descriptor = old.type_descriptor();
    let mut fields = BTreeMap::new();
    for name in fo.field_names() {
        let flags = descriptor.and_then(|d| d.field(name)).map(|f| f.flags).unwrap_or_default();
        if flags.ignore {
            continue;
        }
        let (Some(ov), Some(nv)) = (fo.get(name), fn_.get(name)) else {
            continue;
        };
        let child = if flags.atomic {
            diff_scalar_or_whole(ov, nv)
        } else {
            diff_inner(ov, nv)
        };
        if child.is_noop() {
            continue;
        }
        let child = if flags.readonly {
            Patch::ReadOnly {
                inner: Box::new(child),
                meta: Meta::default(),
            }
        } else {
            child
        };
        fields.insert((*name).to_string(), child);
    }
    if fields.is_empty() {
        return Patch::Noop;
    }
    Patch::Struct {
        fields,
        meta: Meta::default(),
    }
}

fn diff_scalar_or_whole(old: &dyn Patchable, new: &dyn Patchable) -> Patch {
    if equal(old, new) {
        Patch::Noop
    } else {
        Patch::Value {
            old: old.dyn_clone(),
            new: new.dyn_clone(),
            meta: Meta::default(),
        }
    }
}

fn diff_seq(old: &dyn Patchable, new: &dyn Patchable) -> Patch {
    let (Some(so), Some(sn)) = (old.seq_items(), new.seq_items()) else {
        return Patch::Noop;
    };
    let alignment = myers::align(so, sn, |o, n| {
        let child = diff_inner(o, n);
        if child.is_noop() {
            None
        } else {
            Some(child)
        }
    });
    if alignment.ops.iter().all(|op| matches!(op, SliceOp::Equal(_))) {
        return Patch::Noop;
    }
    let mut meta = Meta::default();
    if alignment.positional_fallback_count > 0 {
        meta.note = Some(format!(
            "{} element(s) fell back to positional alignment: mixed identity-key presence",
            alignment.positional_fallback_count
        ));
    }
    Patch::Slice {
        ops: alignment.ops,
        meta,
    }
}

fn diff_array(old: &dyn Patchable, new: &dyn Patchable) -> Patch {
    let (Some(so), Some(sn)) = (old.seq_items(), new.seq_items()) else {
        return Patch::Noop;
    };
    let mut entries = BTreeMap::new();
    for i in 0..so.len().min(sn.len()) {
        let (Some(o), Some(n)) = (so.get(i), sn.get(i)) else {
            continue;
        };
        let child = diff_inner(o, n);
        if !child.is_noop() {
            entries.insert(i, child);
        }
    }
    if entries.is_empty() {
        Patch::Noop
    } else {
        Patch::Array {
            entries,
            meta: Meta::default(),
        }
    }
}

fn diff_map(old: &dyn Patchable, new: &dyn Patchable) -> Patch {
    let (Some(mo), Some(mn)) = (old.map_entries(), new.map_entries()) else {
        return Patch::Noop;
    };
    let mut sets = BTreeMap::new();
    let mut modifies = BTreeMap::new();
    let mut deletes = BTreeMap::new();
    for key in mn.keys() {
        match mo.get(&key) {
            None => {
                sets.insert(key.clone(), mn.get(&key).unwrap().dyn_clone());
            }
            Some(ov) => {
                let nv = mn.get(&key).unwrap();
                let child = diff_inner(ov, nv);
                if !child.is_noop() {
                    modifies.insert(key.clone(), child);
                }
            }
        }
    }
    for key in mo.keys() {
        if mn.get(&key).is_none() {
            deletes.insert(key.clone(), mo.get(&key).unwrap().dyn_clone());
        }
    }
    if sets.is_empty() && modifies.is_empty() && deletes.is_empty() {
        Patch::Noop
    } else {
        Patch::Map {
            sets,
            modifies,
            deletes,
            meta: Meta::default(),
        }
    }
}

/// A value that disappears from the tree at `path` — the old side of a
/// `Value` patch, a deleted map entry, or a deleted slice element — and so
/// is eligible to become the source of a `Move` rewritten in elsewhere by
/// [`detect_global_relocations`].
struct Source {
    path: Path,
    value: Box<dyn Patchable>,
}

/// §4.4's global move pass: after the structural diff is built, scan the
/// whole tree for values that vanish from one position and reappear
/// unchanged at another, and rewrite the destination from `Value` to
/// `Move`. This supersedes the old struct-only sibling check (it subsumes
/// it, plus map-modify and slice-modify destinations, and any path
/// combination of the three) — see DESIGN.md for why a brand-new map key
/// or slice insert slot stays a plain `Insert`/`sets` entry rather than a
/// `Move`: `Map::sets` and `SliceOp::Insert` hold a raw value with no
/// `Patch` wrapper to rewrite, since a freshly created slot has no prior
/// occupant to diff against in the first place. Cross-container `Copy`
/// (a value that *also* survives, unchanged, somewhere with no patch node
/// at all) is scoped out for the same reason: finding it means walking the
/// full old/new trees rather than just the sparse diff, which the same-slice
/// case in `myers::align_by_equality` already covers within a slice.
fn detect_global_relocations(patch: &mut Patch) {
    let mut sources = Vec::new();
    collect_sources(patch, &Path::root(), &mut sources);
    let mut claimed = vec![false; sources.len()];
    rewrite_destinations(patch, &Path::root(), &sources, &mut claimed);
}

fn collect_sources(patch: &Patch, here: &Path, out: &mut Vec<Source>) {
    match patch {
        Patch::Value { old, .. } => out.push(Source {
            path: here.clone(),
            value: old.dyn_clone(),
        }),
        Patch::Struct { fields, .. } => {
            for (name, child) in fields {
                collect_sources(child, &here.pushed_property(name.clone()), out);
            }
        }
        Patch::Map { modifies, deletes, .. } => {
            for (k, child) in modifies {
                collect_sources(child, &here.pushed_property(k.to_string()), out);
            }
            for (k, v) in deletes {
                out.push(Source {
                    path: here.pushed_property(k.to_string()),
                    value: v.dyn_clone(),
                });
            }
        }
        Patch::Array { entries, .. } => {
            for (i, child) in entries {
                collect_sources(child, &here.pushed_index(*i), out);
            }
        }
        Patch::Slice { ops, .. } => collect_slice_sources(ops, here, out),
        Patch::Sum { child: Some(c), .. } => collect_sources(c, here, out),
        Patch::Pointer {
            op: PointerOp::ModifyTarget(child),
            ..
        } => collect_sources(child, here, out),
        Patch::ReadOnly { inner, .. } => collect_sources(inner, here, out),
        _ => {}
    }
}

/// Walks a slice's ops tracking the *old*-array cursor (not the new-array
/// position), since a source's path must resolve against the pre-image the
/// destination's `Move` will read from. Same-slice `Move` sources are
/// skipped exactly like `apply_slice` skips them: they already left via
/// their own in-slice relocation, so they're not available to a
/// cross-container match too.
fn collect_slice_sources(ops: &[SliceOp], base: &Path, out: &mut Vec<Source>) {
    let moved_out: Vec<usize> = ops
        .iter()
        .filter_map(|op| match op {
            SliceOp::Move { from, .. } => Some(*from),
            _ => None,
        })
        .collect();
    let mut old_cursor = 0usize;
    for op in ops {
        match op {
            SliceOp::Equal(n) => {
                for _ in 0..*n {
                    while moved_out.contains(&old_cursor) {
                        old_cursor += 1;
                    }
                    old_cursor += 1;
                }
            }
            SliceOp::Insert(_) | SliceOp::Move { .. } | SliceOp::Copy { .. } => {}
            SliceOp::Delete(v) => {
                while moved_out.contains(&old_cursor) {
                    old_cursor += 1;
                }
                out.push(Source {
                    path: base.pushed_index(old_cursor),
                    value: v.dyn_clone(),
                });
                old_cursor += 1;
            }
            SliceOp::Modify(child) => {
                while moved_out.contains(&old_cursor) {
                    old_cursor += 1;
                }
                collect_sources(child, &base.pushed_index(old_cursor), out);
                old_cursor += 1;
            }
        }
    }
}

fn rewrite_destinations(patch: &mut Patch, here: &Path, sources: &[Source], claimed: &mut [bool]) {
    match patch {
        Patch::Value { old, new, meta } => {
            let found = sources
                .iter()
                .enumerate()
                .find(|(i, s)| !claimed[*i] && &s.path != here && equal(s.value.as_ref(), new.as_ref()));
            if let Some((i, s)) = found {
                claimed[i] = true;
                *patch = Patch::Move {
                    from: s.path.clone(),
                    old: old.dyn_clone(),
                    meta: meta.clone(),
                };
            }
        }
        Patch::Struct { fields, .. } => {
            for (name, child) in fields.iter_mut() {
                rewrite_destinations(child, &here.pushed_property(name.clone()), sources, claimed);
            }
        }
        Patch::Map { modifies, .. } => {
            for (k, child) in modifies.iter_mut() {
                rewrite_destinations(child, &here.pushed_property(k.to_string()), sources, claimed);
            }
        }
        Patch::Array { entries, .. } => {
            for (i, child) in entries.iter_mut() {
                rewrite_destinations(child, &here.pushed_index(*i), sources, claimed);
            }
        }
        Patch::Slice { ops, .. } => {
            let mut new_idx = 0usize;
            for op in ops.iter_mut() {
                match op {
                    SliceOp::Equal(n) => new_idx += *n,
                    SliceOp::Insert(_) | SliceOp::Move { .. } | SliceOp::Copy { .. } => new_idx += 1,
                    SliceOp::Delete(_) => {}
                    SliceOp::Modify(child) => {
                        rewrite_destinations(child, &here.pushed_index(new_idx), sources, claimed);
                        new_idx += 1;
                    }
                }
            }
        }
        Patch::Sum { child: Some(c), .. } => rewrite_destinations(c, here, sources, claimed),
        Patch::Pointer {
            op: PointerOp::ModifyTarget(child),
            ..
        } => rewrite_destinations(child, here, sources, claimed),
        Patch::ReadOnly { inner, .. } => rewrite_destinations(inner, here, sources, claimed),
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn equal_scalars_diff_to_noop() {
        assert!(diff(&5i64, &5i64).is_noop());
    }

    #[test]
    fn changed_scalar_diffs_to_value() {
        let patch = diff(&5i64, &6i64);
        let ops = patch.walk(&Path::root());
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn seq_insertion_produces_insert_op() {
        let old: Vec<i64> = vec![1, 2];
        let new: Vec<i64> = vec![1, 2, 3];
        let patch = diff(&old, &new);
        let ops = patch.walk(&Path::root());
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path.to_string(), "/2");
    }

    #[test]
    fn map_insertion_and_removal_are_tracked_separately() {
        use std::collections::BTreeMap;
        let mut old: BTreeMap<String, String> = BTreeMap::new();
        old.insert("a".to_string(), "x".to_string());
        let mut new: BTreeMap<String, String> = BTreeMap::new();
        new.insert("b".to_string(), "x".to_string());
        let patch = diff(&old, &new);
        match patch {
            Patch::Map { sets, deletes, .. } => {
                assert_eq!(sets.len(), 1);
                assert_eq!(deletes.len(), 1);
            }
            _ => panic!("expected Map"),
        }
    }

    #[test]
    fn swapped_values_between_two_existing_map_keys_become_moves() {
        use std::collections::BTreeMap;
        let mut old: BTreeMap<String, String> = BTreeMap::new();
        old.insert("a".to_string(), "x".to_string());
        old.insert("b".to_string(), "y".to_string());
        let mut new: BTreeMap<String, String> = BTreeMap::new();
        new.insert("a".to_string(), "y".to_string());
        new.insert("b".to_string(), "x".to_string());

        let patch = diff(&old, &new);
        match patch {
            Patch::Map { modifies, sets, deletes, .. } => {
                assert!(sets.is_empty());
                assert!(deletes.is_empty());
                assert_eq!(modifies.len(), 2);
                assert!(modifies.values().all(|p| matches!(p, Patch::Move { .. })));
            }
            _ => panic!("expected Map"),
        }
    }
}
