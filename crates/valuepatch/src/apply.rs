//! C6: applies a [`Patch`] in place.
//!
//! The whole tree is executed against a single frozen snapshot of the
//! pre-apply document (`pre_image`): every `Condition`, every strict-mode
//! precondition, and every `Move`/`Copy` source reads from that snapshot
//! rather than from the document as it's being mutated. That is what makes
//! a field-swap (`a := old.b`, `b := old.a`) correct regardless of which
//! field apply happens to visit first — §4.8's dependency resolver is
//! needed once operations are flattened to a sequentially-applied list (the
//! RFC 6902 wire projection, or replaying a patch against a system with no
//! native tree-apply), not here.
use crate::equal::equal;
use crate::error::{ApplyError, Error};
use crate::patch::{Patch, PointerOp, SliceOp};
use crate::path::Path;
use crate::value::Patchable;

/// Mirrors the teacher's `combine::Spec` builder: small, explicit config
/// instead of a hidden global. `force_strict` lets a caller run a dry-run
/// precondition check even over patches that weren't built with `with_strict`.
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    pub force_strict: bool,
}

/// Applies `patch` to `*target` in place. Accumulates every operation
/// failure rather than stopping at the first one; `target` is left in
/// whatever state the successful operations produced.
pub fn apply(target: &mut Box<dyn Patchable>, patch: &Patch) -> Result<(), ApplyError> {
    apply_with_options(target, patch, &ApplyOptions::default())
}

pub fn apply_with_options(
    target: &mut Box<dyn Patchable>,
    patch: &Patch,
    options: &ApplyOptions,
) -> Result<(), ApplyError> {
    let pre_image = target.dyn_clone();
    let mut errors = Vec::new();
    let current = std::mem::replace(target, pre_image.dyn_clone());
    *target = apply_owned(current, patch, &Path::root(), pre_image.as_ref(), options, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApplyError(errors))
    }
}

/// Convenience: applies `patch.reverse()`.
pub fn unapply(target: &mut Box<dyn Patchable>, patch: &Patch) -> Result<(), ApplyError> {
    apply(target, &patch.reverse())
}

fn apply_owned(
    current: Box<dyn Patchable>,
    patch: &Patch,
    path: &Path,
    pre_image: &dyn Patchable,
    options: &ApplyOptions,
    errors: &mut Vec<Error>,
) -> Box<dyn Patchable> {
    let Some(meta) = patch.meta() else {
        return current; // Noop
    };
    let strict = meta.strict || options.force_strict;
    if let Some(condition) = &meta.condition {
        match condition.evaluate(pre_image) {
            Ok(true) => {}
            Ok(false) => {
                errors.push(Error::ConditionNotMet);
                return current;
            }
            Err(e) => {
                errors.push(e);
                return current;
            }
        }
    }

    match patch {
        Patch::Noop => current,
        Patch::Value { old, new, .. } => {
            if strict && !equal(current.as_ref(), old.as_ref()) {
                errors.push(precondition_mismatch(path, old.as_ref(), current.as_ref()));
                return current;
            }
            new.dyn_clone()
        }
        Patch::Struct { fields, .. } => apply_struct(current, fields, path, pre_image, options, errors),
        Patch::Map {
            sets,
            modifies,
            deletes,
            ..
        } => apply_map(current, sets, modifies, deletes, path, pre_image, options, errors),
        Patch::Array { entries, .. } => apply_array(current, entries, path, pre_image, options, errors),
        Patch::Slice { ops, .. } => apply_slice(current, ops, path, pre_image, options, errors),
        Patch::Pointer { op, .. } => apply_pointer(current, op, strict, path, pre_image, options, errors),
        Patch::Sum { transition, child, .. } => apply_sum(current, transition, child, path, pre_image, options, errors),
        Patch::ReadOnly { .. } => {
            errors.push(Error::ReadOnlyViolation(path.clone()));
            current
        }
        Patch::Move { from, old, .. } => apply_relocation(current, from, old.as_ref(), strict, path, pre_image, errors),
        Patch::Copy { from, old, .. } => apply_relocation(current, from, old.as_ref(), strict, path, pre_image, errors),
        Patch::Log { message, .. } => {
            tracing::info!(target: "valuepatch::apply", path = %path, "{message}");
            current
        }
    }
}

fn precondition_mismatch(path: &Path, expected: &dyn Patchable, actual: &dyn Patchable) -> Error {
    Error::PreconditionMismatch {
        path: path.clone(),
        expected: format!("{expected:?}"),
        actual: format!("{actual:?}"),
    }
}

fn apply_relocation(
    current: Box<dyn Patchable>,
    from: &Path,
    old: &dyn Patchable,
    strict: bool,
    path: &Path,
    pre_image: &dyn Patchable,
    errors: &mut Vec<Error>,
) -> Box<dyn Patchable> {
    if strict && !equal(current.as_ref(), old) {
        errors.push(precondition_mismatch(path, old, current.as_ref()));
        return current;
    }
    match crate::path::resolve(pre_image, from) {
        Ok(value) => value.dyn_clone(),
        Err(e) => {
            errors.push(e);
            current
        }
    }
}

fn apply_struct(
    mut current: Box<dyn Patchable>,
    fields: &std::collections::BTreeMap<String, Patch>,
    path: &Path,
    pre_image: &dyn Patchable,
    options: &ApplyOptions,
    errors: &mut Vec<Error>,
) -> Box<dyn Patchable> {
    for (name, child) in fields {
        let Some(existing) = current
            .struct_fields()
            .and_then(|sf| sf.get(name))
            .map(|v| v.dyn_clone())
        else {
            errors.push(Error::PathNotFound(path.pushed_property(name.clone())));
            continue;
        };
        let updated = apply_owned(existing, child, &path.pushed_property(name.clone()), pre_image, options, errors);
        if let Some(sfm) = current.struct_fields_mut() {
            if let Err(e) = sfm.replace(name, updated) {
                errors.push(e);
            }
        }
    }
    current
}

fn apply_map(
    mut current: Box<dyn Patchable>,
    sets: &std::collections::BTreeMap<crate::value::ScalarKey, Box<dyn Patchable>>,
    modifies: &std::collections::BTreeMap<crate::value::ScalarKey, Patch>,
    deletes: &std::collections::BTreeMap<crate::value::ScalarKey, Box<dyn Patchable>>,
    path: &Path,
    pre_image: &dyn Patchable,
    options: &ApplyOptions,
    errors: &mut Vec<Error>,
) -> Box<dyn Patchable> {
    for (key, child) in modifies {
        let existing = current.map_entries().and_then(|m| m.get(key)).map(|v| v.dyn_clone());
        let Some(existing) = existing else {
            errors.push(Error::PathNotFound(path.pushed_property(key.to_string())));
            continue;
        };
        let updated = apply_owned(existing, child, &path.pushed_property(key.to_string()), pre_image, options, errors);
        if let Some(mem) = current.map_entries_mut() {
            mem.set(key.clone(), updated);
        }
    }
    if let Some(mem) = current.map_entries_mut() {
        for (key, value) in sets {
            mem.set(key.clone(), value.dyn_clone());
        }
        for key in deletes.keys() {
            mem.remove(key);
        }
    }
    current
}

fn apply_array(
    mut current: Box<dyn Patchable>,
    entries: &std::collections::BTreeMap<usize, Patch>,
    path: &Path,
    pre_image: &dyn Patchable,
    options: &ApplyOptions,
    errors: &mut Vec<Error>,
) -> Box<dyn Patchable> {
    for (idx, child) in entries {
        let existing = current.seq_items().and_then(|s| s.get(*idx)).map(|v| v.dyn_clone());
        let Some(existing) = existing else {
            errors.push(Error::PathNotFound(path.pushed_index(*idx)));
            continue;
        };
        let updated = apply_owned(existing, child, &path.pushed_index(*idx), pre_image, options, errors);
        if let Some(sm) = current.seq_items_mut() {
            if let Err(e) = sm.set(*idx, updated) {
                errors.push(e);
            }
        }
    }
    current
}

fn apply_slice(
    mut current: Box<dyn Patchable>,
    ops: &[SliceOp],
    path: &Path,
    pre_image: &dyn Patchable,
    options: &ApplyOptions,
    errors: &mut Vec<Error>,
) -> Box<dyn Patchable> {
    let Some(items) = current.seq_items() else {
        errors.push(Error::TypeMismatch {
            path: path.clone(),
            expected: "seq",
            actual: current.kind_name(),
        });
        return current;
    };
    let snapshot: Vec<Box<dyn Patchable>> = (0..items.len()).map(|i| items.get(i).unwrap().dyn_clone()).collect();

    // A `Move` source never gets its own Equal/Delete/Modify op (the diff
    // side leaves it out entirely, since its reappearance is carried by the
    // Move itself), so the old_cursor walk below has to skip those indices
    // rather than assume every snapshot slot is visited in order.
    let mut moved_out = vec![false; snapshot.len()];
    for op in ops {
        if let SliceOp::Move { from, .. } = op {
            moved_out[*from] = true;
        }
    }
    let advance_past_moved = |cursor: &mut usize| {
        while *cursor < moved_out.len() && moved_out[*cursor] {
            *cursor += 1;
        }
    };

    let mut new_elements: Vec<Box<dyn Patchable>> = Vec::new();
    let mut old_cursor = 0usize;
    let mut new_idx = 0usize;
    for op in ops {
        match op {
            SliceOp::Equal(n) => {
                for _ in 0..*n {
                    advance_past_moved(&mut old_cursor);
                    new_elements.push(snapshot[old_cursor].dyn_clone());
                    old_cursor += 1;
                    new_idx += 1;
                }
            }
            SliceOp::Insert(v) => {
                new_elements.push(v.dyn_clone());
                new_idx += 1;
            }
            SliceOp::Delete(_) => {
                advance_past_moved(&mut old_cursor);
                old_cursor += 1;
            }
            SliceOp::Modify(child) => {
                advance_past_moved(&mut old_cursor);
                let base = snapshot[old_cursor].dyn_clone();
                let updated = apply_owned(base, child, &path.pushed_index(new_idx), pre_image, options, errors);
                new_elements.push(updated);
                old_cursor += 1;
                new_idx += 1;
            }
            SliceOp::Move { from, .. } => {
                new_elements.push(snapshot[*from].dyn_clone());
                new_idx += 1;
            }
            SliceOp::Copy { value, .. } => {
                new_elements.push(value.dyn_clone());
                new_idx += 1;
            }
        }
    }

    if let Some(sm) = current.seq_items_mut() {
        for i in (0..snapshot.len()).rev() {
            let _ = sm.remove(i);
        }
        for (i, value) in new_elements.into_iter().enumerate() {
            if let Err(e) = sm.insert(i, value) {
                errors.push(e);
            }
        }
    }
    current
}

fn apply_pointer(
    mut current: Box<dyn Patchable>,
    op: &PointerOp,
    strict: bool,
    path: &Path,
    pre_image: &dyn Patchable,
    options: &ApplyOptions,
    errors: &mut Vec<Error>,
) -> Box<dyn Patchable> {
    match op {
        PointerOp::SetNonNil { old, new } => {
            if strict {
                let current_target = current.pointer_target().flatten();
                let matches = match (old, current_target) {
                    (None, None) => true,
                    (Some(expected), Some(actual)) => equal(expected.as_ref(), actual),
                    _ => false,
                };
                if !matches {
                    errors.push(Error::PreconditionMismatch {
                        path: path.clone(),
                        expected: format!("{old:?}"),
                        actual: "differing pointer target".to_string(),
                    });
                    return current;
                }
            }
            if let Err(e) = current.pointer_set(Some(new.dyn_clone())) {
                errors.push(e);
            }
            current
        }
        PointerOp::SetNil { old } => {
            if strict {
                match current.pointer_target().flatten() {
                    Some(actual) if equal(old.as_ref(), actual) => {}
                    _ => {
                        errors.push(Error::PreconditionMismatch {
                            path: path.clone(),
                            expected: format!("{old:?}"),
                            actual: "differing pointer target".to_string(),
                        });
                        return current;
                    }
                }
            }
            if let Err(e) = current.pointer_set(None) {
                errors.push(e);
            }
            current
        }
        PointerOp::ModifyTarget(child) => {
            let existing = current.pointer_target().flatten().map(|v| v.dyn_clone());
            let Some(existing) = existing else {
                errors.push(Error::PathNotFound(path.clone()));
                return current;
            };
            let updated = apply_owned(existing, child, path, pre_image, options, errors);
            if let Err(e) = current.pointer_set(Some(updated)) {
                errors.push(e);
            }
            current
        }
    }
}

fn apply_sum(
    mut current: Box<dyn Patchable>,
    transition: &Option<crate::patch::SumTransition>,
    child: &Option<Box<Patch>>,
    path: &Path,
    pre_image: &dyn Patchable,
    options: &ApplyOptions,
    errors: &mut Vec<Error>,
) -> Box<dyn Patchable> {
    if let Some(t) = transition {
        if let Err(e) = current.sum_set(t.to_variant, t.new_payload.dyn_clone()) {
            errors.push(e);
        }
        return current;
    }
    let Some(child) = child else { return current };
    let Some((variant, payload)) = current.sum_variant() else {
        errors.push(Error::TypeMismatch {
            path: path.clone(),
            expected: "sum",
            actual: current.kind_name(),
        });
        return current;
    };
    let existing = payload.dyn_clone();
    let updated = apply_owned(existing, child, path, pre_image, options, errors);
    if let Err(e) = current.sum_set(variant, updated) {
        errors.push(e);
    }
    current
}
