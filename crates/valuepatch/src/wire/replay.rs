//! Sequential replay of a flattened [`Operation`] list against a live value
//! — the path a decoded wire patch takes when there's no typed `Patch` tree
//! to hand to [`crate::apply::apply`]. Unlike the tree-apply engine, this
//! mutates the document as it goes, so a `Move`/`Copy` source must execute
//! before its dependent write; [`crate::depend::order_for_apply`] (C8)
//! provides that ordering and breaks the rare true cycle.
use crate::depend::order_for_apply;
use crate::equal::equal;
use crate::error::{ApplyError, Error, Result};
use crate::operation::{Operation, OperationKind};
use crate::path::{resolve, resolve_parent, Path, Token};
use crate::value::{Patchable, ScalarKey};

pub fn apply_operations(target: &mut Box<dyn Patchable>, ops: Vec<Operation>) -> std::result::Result<(), ApplyError> {
    let pre_image = target.dyn_clone();
    let ordered = order_for_apply(ops, pre_image.as_ref()).map_err(ApplyError::single)?;
    let mut errors = Vec::new();
    for op in ordered {
        if let Err(e) = apply_one(target.as_mut(), &op) {
            errors.push(e);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApplyError(errors))
    }
}

fn apply_one(target: &mut dyn Patchable, op: &Operation) -> Result<()> {
    match op.kind {
        OperationKind::Log => {
            tracing::info!(target: "valuepatch::wire::replay", path = %op.path, "{}", op.message.as_deref().unwrap_or_default());
            Ok(())
        }
        OperationKind::Test => {
            let current = resolve(target, &op.path)?;
            let expected = op
                .value
                .as_deref()
                .ok_or_else(|| Error::Encoding("test op missing value".to_string()))?;
            if !equal(current, expected) {
                return Err(Error::PreconditionMismatch {
                    path: op.path.clone(),
                    expected: format!("{expected:?}"),
                    actual: format!("{current:?}"),
                });
            }
            Ok(())
        }
        OperationKind::Remove => {
            let (parent, token) = resolve_parent(target, &op.path)?;
            remove_at(parent, &token, &op.path)
        }
        OperationKind::Add | OperationKind::Replace => {
            let value = op
                .value
                .as_ref()
                .ok_or_else(|| Error::Encoding("add/replace op missing value".to_string()))?
                .dyn_clone();
            let (parent, token) = resolve_parent(target, &op.path)?;
            set_at(parent, &token, value, matches!(op.kind, OperationKind::Add), &op.path)
        }
        OperationKind::Move => {
            let from = op
                .from
                .as_ref()
                .ok_or_else(|| Error::Encoding("move op missing from".to_string()))?;
            let value = resolve(target, from)?.dyn_clone();
            let (src_parent, src_token) = resolve_parent(target, from)?;
            remove_at(src_parent, &src_token, from)?;
            let (parent, token) = resolve_parent(target, &op.path)?;
            set_at(parent, &token, value, true, &op.path)
        }
        OperationKind::Copy => {
            let from = op
                .from
                .as_ref()
                .ok_or_else(|| Error::Encoding("copy op missing from".to_string()))?;
            let value = resolve(target, from)?.dyn_clone();
            let (parent, token) = resolve_parent(target, &op.path)?;
            set_at(parent, &token, value, true, &op.path)
        }
    }
}

fn remove_at(parent: &mut dyn Patchable, token: &Token, path: &Path) -> Result<()> {
    match token {
        Token::Property(name) => {
            if let Some(map) = parent.map_entries_mut() {
                map.remove(&ScalarKey::String(name.clone()));
                return Ok(());
            }
            Err(Error::TypeMismatch {
                path: path.clone(),
                expected: "map",
                actual: parent.kind_name(),
            })
        }
        Token::Index(idx) => {
            if let Some(seq) = parent.seq_items_mut() {
                seq.remove(*idx)?;
                return Ok(());
            }
            if let Some(map) = parent.map_entries_mut() {
                map.remove(&ScalarKey::String(idx.to_string()));
                return Ok(());
            }
            Err(Error::TypeMismatch {
                path: path.clone(),
                expected: "seq",
                actual: parent.kind_name(),
            })
        }
        Token::NextIndex => Err(Error::PathNotFound(path.clone())),
    }
}

fn set_at(
    parent: &mut dyn Patchable,
    token: &Token,
    value: Box<dyn Patchable>,
    insert_if_seq: bool,
    path: &Path,
) -> Result<()> {
    match token {
        Token::Property(name) => {
            if let Some(fields) = parent.struct_fields_mut() {
                return fields.replace(name, value);
            }
            if let Some(map) = parent.map_entries_mut() {
                map.set(ScalarKey::String(name.clone()), value);
                return Ok(());
            }
            Err(Error::TypeMismatch {
                path: path.clone(),
                expected: "struct or map",
                actual: parent.kind_name(),
            })
        }
        Token::Index(idx) => {
            if let Some(seq) = parent.seq_items_mut() {
                if insert_if_seq {
                    seq.insert(*idx, value)
                } else {
                    seq.set(*idx, value)
                }
            } else if let Some(map) = parent.map_entries_mut() {
                map.set(ScalarKey::String(idx.to_string()), value);
                Ok(())
            } else {
                Err(Error::TypeMismatch {
                    path: path.clone(),
                    expected: "seq or map",
                    actual: parent.kind_name(),
                })
            }
        }
        Token::NextIndex => {
            if let Some(seq) = parent.seq_items_mut() {
                let at = seq.len();
                seq.insert(at, value)
            } else {
                Err(Error::TypeMismatch {
                    path: path.clone(),
                    expected: "seq",
                    actual: parent.kind_name(),
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::SeqItemsMut;

    #[test]
    fn replays_an_add_and_a_remove_in_document_order() {
        let mut target: Box<dyn Patchable> = Box::new(vec![1i64, 2, 3]);
        let ops = vec![
            Operation::add(Path::parse("/1").unwrap(), Box::new(99i64)),
            Operation::remove(Path::parse("/0").unwrap()),
        ];
        apply_operations(&mut target, ops).unwrap();
        let seq = target.seq_items().unwrap();
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn a_move_reads_its_source_before_a_conflicting_write_even_when_listed_after_it() {
        let mut target: Box<dyn Patchable> = Box::new(vec![10i64, 20]);
        // Listed in document order (replace, then move), but the move reads
        // index 0 and the replace overwrites it: the mover must run first so
        // it carries the original value (10), not the replacement (999).
        let ops = vec![
            Operation::replace(Path::parse("/0").unwrap(), Box::new(999i64)),
            Operation::move_(Path::parse("/0").unwrap(), Path::parse("/1").unwrap()),
        ];
        apply_operations(&mut target, ops).unwrap();
        let seq = target.seq_items_mut().unwrap();
        assert_eq!(seq.get(0).unwrap().scalar().unwrap(), crate::value::Scalar::Int(999));
        assert_eq!(seq.get(1).unwrap().scalar().unwrap(), crate::value::Scalar::Int(10));
    }
}
