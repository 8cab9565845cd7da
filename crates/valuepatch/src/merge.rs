//! C9: N-way merge of independently produced patches into one.
//!
//! Each input patch is flattened the same way [`crate::patch::Patch::walk`]
//! does for the wire encoders, except this flattening also threads each
//! node's HLC timestamp down to its emitted operations (`walk` itself has no
//! use for timestamps, so it doesn't carry them — merge is the one consumer
//! that needs them for last-writer-wins resolution).
use std::collections::HashMap;

use crate::equal::equal;
use crate::hlc::Hlc;
use crate::operation::{Operation, OperationKind};
use crate::patch::{Patch, PointerOp, SliceOp};
use crate::path::Path;
use crate::value::{Kind, Patchable};

/// Mirrors the teacher's `combine::Spec` builder pattern (§1.1): small,
/// explicit config instead of a hidden global.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub tree_conflict_detection: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            tree_conflict_detection: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub path: Path,
    pub reason: String,
}

/// Called with `(path, current_winner, challenger)` when two concurrent ops
/// at the same path have no HLC timestamp to order them by. Returns whichever
/// op should win.
pub type Resolver<'a> = dyn Fn(&Path, &Operation, &Operation) -> Operation + 'a;

#[derive(Debug, Clone)]
struct TimedOp {
    source: usize,
    timestamp: Option<Hlc>,
    op: Operation,
}

/// Merges `patches` in input order, returning the combined operation set and
/// any conflicts detected along the way. The returned operations are usable
/// as-is (last-writer-wins already applied) even when conflicts is non-empty.
pub fn merge(patches: &[Patch], options: &MergeOptions, resolver: Option<&Resolver>) -> (Vec<Operation>, Vec<Conflict>) {
    let mut all = Vec::new();
    for (source, patch) in patches.iter().enumerate() {
        flatten_timed(patch, &Path::root(), None, source, &mut all);
    }

    let mut order: Vec<Path> = Vec::new();
    for t in &all {
        if !order.contains(&t.op.path) {
            order.push(t.op.path.clone());
        }
    }

    let mut by_path: HashMap<Path, Vec<TimedOp>> = HashMap::new();
    for t in all.iter().cloned() {
        by_path.entry(t.op.path.clone()).or_default().push(t);
    }

    let mut conflicts = Vec::new();
    let mut chosen: HashMap<Path, Operation> = HashMap::new();
    for path in &order {
        let group = by_path.remove(path).unwrap_or_default();
        let mut winner = group[0].clone();
        for challenger in group.into_iter().skip(1) {
            if ops_conflict(&winner.op, &challenger.op) {
                conflicts.push(Conflict {
                    path: path.clone(),
                    reason: "concurrent, non-identical modification".to_string(),
                });
            }
            winner = resolve_pair(path, winner, challenger, resolver);
        }
        chosen.insert(path.clone(), winner.op);
    }

    if options.tree_conflict_detection {
        detect_tree_conflicts(&all, &mut conflicts);
    }

    let output = order.into_iter().filter_map(|p| chosen.remove(&p)).collect();
    (output, conflicts)
}

fn resolve_pair(path: &Path, a: TimedOp, b: TimedOp, resolver: Option<&Resolver>) -> TimedOp {
    match (&a.timestamp, &b.timestamp) {
        (Some(ta), Some(tb)) => {
            if tb > ta {
                b
            } else {
                a
            }
        }
        _ => {
            if let Some(resolver) = resolver {
                let op = resolver(path, &a.op, &b.op);
                TimedOp {
                    source: a.source.max(b.source),
                    timestamp: a.timestamp.clone().max(b.timestamp.clone()),
                    op,
                }
            } else if b.source >= a.source {
                b
            } else {
                a
            }
        }
    }
}

fn ops_conflict(a: &Operation, b: &Operation) -> bool {
    if std::mem::discriminant(&a.kind) != std::mem::discriminant(&b.kind) {
        return true;
    }
    let value_differs = match (&a.value, &b.value) {
        (Some(av), Some(bv)) => !equal(av.as_ref(), bv.as_ref()),
        (None, None) => false,
        _ => true,
    };
    value_differs || a.from != b.from
}

/// §4.9's tree-conflict rule: a remove (or a replace with nil/empty-sum) at
/// P conflicts with any concurrent op strictly under `P/`. The removal still
/// wins at P; this only records the conflict for the caller to inspect.
fn detect_tree_conflicts(all: &[TimedOp], conflicts: &mut Vec<Conflict>) {
    for candidate in all {
        if !is_subtree_removal(&candidate.op) {
            continue;
        }
        for other in all {
            if is_under(&candidate.op.path, &other.op.path) {
                conflicts.push(Conflict {
                    path: other.op.path.clone(),
                    reason: format!("{} was removed at {}", other.op.path, candidate.op.path),
                });
            }
        }
    }
}

fn is_subtree_removal(op: &Operation) -> bool {
    match op.kind {
        OperationKind::Remove => true,
        OperationKind::Replace => op.value.as_deref().is_some_and(is_nil_or_empty),
        _ => false,
    }
}

fn is_nil_or_empty(v: &dyn Patchable) -> bool {
    match v.kind() {
        Kind::Null => true,
        Kind::Pointer => matches!(v.pointer_target(), Some(None)),
        _ => false,
    }
}

fn is_under(parent: &Path, candidate: &Path) -> bool {
    let p: Vec<_> = parent.tokens().collect();
    let c: Vec<_> = candidate.tokens().collect();
    c.len() > p.len() && p.iter().zip(c.iter()).all(|(a, b)| a == b)
}

fn flatten_timed(patch: &Patch, base: &Path, inherited_ts: Option<Hlc>, source: usize, out: &mut Vec<TimedOp>) {
    let ts = patch.meta().and_then(|m| m.timestamp.clone()).or(inherited_ts);
    if let Some(note) = patch.meta().and_then(|m| m.note.as_ref()) {
        out.push(TimedOp {
            source,
            timestamp: ts.clone(),
            op: Operation::log(base.clone(), note.clone()),
        });
    }
    match patch {
        Patch::Noop => {}
        Patch::Value { new, .. } => out.push(TimedOp {
            source,
            timestamp: ts,
            op: Operation::replace(base.clone(), new.dyn_clone()),
        }),
        Patch::Struct { fields, .. } => {
            for (name, child) in fields {
                flatten_timed(child, &base.pushed_property(name.clone()), ts.clone(), source, out);
            }
        }
        Patch::Map {
            sets,
            modifies,
            deletes,
            ..
        } => {
            for (k, v) in sets {
                out.push(TimedOp {
                    source,
                    timestamp: ts.clone(),
                    op: Operation::add(base.pushed_property(k.to_string()), v.dyn_clone()),
                });
            }
            for (k, child) in modifies {
                flatten_timed(child, &base.pushed_property(k.to_string()), ts.clone(), source, out);
            }
            for k in deletes.keys() {
                out.push(TimedOp {
                    source,
                    timestamp: ts.clone(),
                    op: Operation::remove(base.pushed_property(k.to_string())),
                });
            }
        }
        Patch::Slice { ops, .. } => {
            let mut idx = 0usize;
            for op in ops {
                let at = base.pushed_index(idx);
                match op {
                    SliceOp::Equal(n) => idx += n,
                    SliceOp::Insert(v) => {
                        out.push(TimedOp {
                            source,
                            timestamp: ts.clone(),
                            op: Operation::add(at, v.dyn_clone()),
                        });
                        idx += 1;
                    }
                    SliceOp::Delete(_) => {
                        out.push(TimedOp {
                            source,
                            timestamp: ts.clone(),
                            op: Operation::remove(at),
                        });
                    }
                    SliceOp::Modify(child) => {
                        flatten_timed(child, &at, ts.clone(), source, out);
                        idx += 1;
                    }
                    SliceOp::Move { from, .. } => {
                        out.push(TimedOp {
                            source,
                            timestamp: ts.clone(),
                            op: Operation::move_(base.pushed_index(*from), at),
                        });
                        idx += 1;
                    }
                    SliceOp::Copy { from, .. } => {
                        out.push(TimedOp {
                            source,
                            timestamp: ts.clone(),
                            op: Operation::copy(base.pushed_index(*from), at),
                        });
                        idx += 1;
                    }
                }
            }
        }
        Patch::Array { entries, .. } => {
            for (idx, child) in entries {
                flatten_timed(child, &base.pushed_index(*idx), ts.clone(), source, out);
            }
        }
        Patch::Pointer { op, .. } => match op {
            PointerOp::SetNonNil { new, .. } => out.push(TimedOp {
                source,
                timestamp: ts,
                op: Operation::replace(base.clone(), new.dyn_clone()),
            }),
            PointerOp::SetNil { .. } => out.push(TimedOp {
                source,
                timestamp: ts,
                op: Operation::remove(base.clone()),
            }),
            PointerOp::ModifyTarget(child) => flatten_timed(child, base, ts, source, out),
        },
        Patch::Sum { transition, child, .. } => {
            if let Some(t) = transition {
                out.push(TimedOp {
                    source,
                    timestamp: ts,
                    op: Operation::replace(base.clone(), t.new_payload.dyn_clone()),
                });
            } else if let Some(child) = child {
                flatten_timed(child, base, ts, source, out);
            }
        }
        Patch::ReadOnly { inner, .. } => flatten_timed(inner, base, ts, source, out),
        Patch::Move { from, .. } => out.push(TimedOp {
            source,
            timestamp: ts,
            op: Operation::move_(from.clone(), base.clone()),
        }),
        Patch::Copy { from, .. } => out.push(TimedOp {
            source,
            timestamp: ts,
            op: Operation::copy(from.clone(), base.clone()),
        }),
        Patch::Log { message, .. } => out.push(TimedOp {
            source,
            timestamp: ts,
            op: Operation::log(base.clone(), message.clone()),
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::patch::Meta;

    fn replace_at(path: &str, old: i64, new: i64, ts: Option<Hlc>) -> Patch {
        Patch::Value {
            old: Box::new(old),
            new: Box::new(new),
            meta: Meta {
                timestamp: ts,
                ..Meta::default()
            },
        }
        .pipe_into_struct(path)
    }

    // Helper extension so the fixture above reads as "a value patch rooted
    // at this single-segment path" without hand-building a Struct each time.
    trait PipeIntoStruct {
        fn pipe_into_struct(self, name: &str) -> Patch;
    }
    impl PipeIntoStruct for Patch {
        fn pipe_into_struct(self, name: &str) -> Patch {
            let mut fields = std::collections::BTreeMap::new();
            fields.insert(name.trim_start_matches('/').to_string(), self);
            Patch::Struct {
                fields,
                meta: Meta::default(),
            }
        }
    }

    #[test]
    fn higher_hlc_wins_without_a_resolver() {
        let early = Hlc::new(1, 0, "n1");
        let late = Hlc::new(2, 0, "n1");
        let p1 = replace_at("/x", 1, 2, Some(early));
        let p2 = replace_at("/x", 1, 3, Some(late));
        let (ops, conflicts) = merge(&[p1, p2], &MergeOptions::default(), None);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(ops.len(), 1);
        assert!(equal(ops[0].value.as_ref().unwrap().as_ref(), &3i64));
    }

    #[test]
    fn non_conflicting_paths_pass_through_untouched() {
        let p1 = replace_at("/x", 1, 2, None);
        let p2 = replace_at("/y", 1, 2, None);
        let (ops, conflicts) = merge(&[p1, p2], &MergeOptions::default(), None);
        assert!(conflicts.is_empty());
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn a_remove_conflicts_with_a_concurrent_child_modification() {
        // A map-level delete of "u" models the removal; struct patches have
        // no delete vocabulary of their own (see DESIGN.md).
        let mut deletes = std::collections::BTreeMap::new();
        deletes.insert(crate::value::ScalarKey::from("u"), Box::new(1i64) as Box<dyn Patchable>);
        let remove_u = Patch::Map {
            sets: Default::default(),
            modifies: Default::default(),
            deletes,
            meta: Meta::default(),
        };

        let mut modifies = std::collections::BTreeMap::new();
        modifies.insert(
            crate::value::ScalarKey::from("u"),
            Patch::Struct {
                fields: {
                    let mut f = std::collections::BTreeMap::new();
                    f.insert(
                        "name".to_string(),
                        Patch::Value {
                            old: Box::new("A".to_string()),
                            new: Box::new("B".to_string()),
                            meta: Meta::default(),
                        },
                    );
                    f
                },
                meta: Meta::default(),
            },
        );
        let modify_name = Patch::Map {
            sets: Default::default(),
            modifies,
            deletes: Default::default(),
            meta: Meta::default(),
        };

        let (_ops, conflicts) = merge(&[remove_u, modify_name], &MergeOptions::default(), None);
        assert!(conflicts.iter().any(|c| c.path.to_string() == "/u/name"));
    }
}
