//! Keyed slice alignment.
//!
//! A plain Myers/LCS diff aligns by position; it sees a reordered element
//! as a delete-then-insert pair. This alignment instead matches elements by
//! identity key first (falling back to whole-value equality when no key is
//! available at all), so a relocated element becomes a single `Move`
//! instead of two ops. The longest-common-subsequence core is still the
//! same dynamic-programming shape as textbook Myers, just keyed rather than
//! positional.
use crate::equal::equal;
use crate::patch::SliceOp;
use crate::value::{Patchable, ScalarKey};

/// Per-element key used to align a slice. `None` means "no stable identity
/// for this element", triggering a whole-value-equality match instead.
#[derive(Clone, PartialEq, Eq)]
enum Key {
    Identity(ScalarKey),
    None,
}

fn element_key(v: &dyn Patchable) -> Key {
    let Some(descriptor) = v.type_descriptor() else {
        return Key::None;
    };
    let Some(field_name) = descriptor.identity_key else {
        return Key::None;
    };
    let Some(fields) = v.struct_fields() else {
        return Key::None;
    };
    let Some(child) = fields.get(field_name) else {
        return Key::None;
    };
    match child.scalar() {
        Some(crate::value::Scalar::Str(s)) => Key::Identity(ScalarKey::String(s.to_string())),
        Some(crate::value::Scalar::Int(i)) => Key::Identity(ScalarKey::Int(i)),
        Some(crate::value::Scalar::UInt(u)) => Key::Identity(ScalarKey::Int(u as i128)),
        _ => Key::None,
    }
}

pub struct Alignment {
    pub ops: Vec<SliceOp>,
    /// Count of elements that fell back to positional matching because the
    /// slice mixes keyed and unkeyed elements (§4.4's resolved open
    /// question: mixed identity-key presence degrades to positional
    /// alignment rather than silently partial-keying).
    pub positional_fallback_count: usize,
}

pub fn align<F>(old: &dyn crate::value::SeqItems, new: &dyn crate::value::SeqItems, diff_elem: F) -> Alignment
where
    F: Fn(&dyn Patchable, &dyn Patchable) -> Option<crate::patch::Patch>,
{
    let old_keys: Vec<Key> = (0..old.len()).map(|i| element_key(old.get(i).unwrap())).collect();
    let new_keys: Vec<Key> = (0..new.len()).map(|i| element_key(new.get(i).unwrap())).collect();

    let any_keyed = old_keys.iter().chain(new_keys.iter()).any(|k| !matches!(k, Key::None));
    let all_keyed = old_keys.iter().chain(new_keys.iter()).all(|k| !matches!(k, Key::None));
    let mixed = any_keyed && !all_keyed;

    if mixed {
        return align_positional(old, new, &diff_elem, old_keys.len().min(new_keys.len()));
    }

    if all_keyed {
        align_by_key(old, new, &old_keys, &new_keys, &diff_elem)
    } else {
        align_by_equality(old, new, &diff_elem)
    }
}

fn align_positional<F>(
    old: &dyn crate::value::SeqItems,
    new: &dyn crate::value::SeqItems,
    diff_elem: &F,
    fallback_count: usize,
) -> Alignment
where
    F: Fn(&dyn Patchable, &dyn Patchable) -> Option<crate::patch::Patch>,
{
    let mut ops = Vec::new();
    let common = old.len().min(new.len());
    let mut run = 0usize;
    for i in 0..common {
        let (o, n) = (old.get(i).unwrap(), new.get(i).unwrap());
        match diff_elem(o, n) {
            None => run += 1,
            Some(child) => {
                if run > 0 {
                    ops.push(SliceOp::Equal(run));
                    run = 0;
                }
                ops.push(SliceOp::Modify(Box::new(child)));
            }
        }
    }
    if run > 0 {
        ops.push(SliceOp::Equal(run));
    }
    for i in common..old.len() {
        ops.push(SliceOp::Delete(old.get(i).unwrap().dyn_clone()));
    }
    for i in common..new.len() {
        ops.push(SliceOp::Insert(new.get(i).unwrap().dyn_clone()));
    }
    Alignment {
        ops,
        positional_fallback_count: fallback_count,
    }
}

fn align_by_key<F>(
    old: &dyn crate::value::SeqItems,
    new: &dyn crate::value::SeqItems,
    old_keys: &[Key],
    new_keys: &[Key],
    diff_elem: &F,
) -> Alignment
where
    F: Fn(&dyn Patchable, &dyn Patchable) -> Option<crate::patch::Patch>,
{
    // LCS over keys, dynamic-programming table, same recurrence as
    // textbook Myers/Hunt-McIlroy.
    let (n, m) = (old_keys.len(), new_keys.len());
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if old_keys[i] == new_keys[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let mut old_matched = vec![false; n];
    let mut pairs = Vec::new(); // (old_idx, new_idx), in new order
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old_keys[i] == new_keys[j] {
            pairs.push((i, j));
            old_matched[i] = true;
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }

    let mut ops = Vec::with_capacity(m);
    let mut new_idx = 0usize;
    let mut run = 0usize;
    let mut pair_cursor = 0usize;
    while new_idx < m {
        if pair_cursor < pairs.len() && pairs[pair_cursor].1 == new_idx {
            let (oi, _) = pairs[pair_cursor];
            pair_cursor += 1;
            let (o, n) = (old.get(oi).unwrap(), new.get(new_idx).unwrap());
            match diff_elem(o, n) {
                None => run += 1,
                Some(child) => {
                    flush_run(&mut ops, &mut run);
                    ops.push(SliceOp::Modify(Box::new(child)));
                }
            }
            new_idx += 1;
            continue;
        }
        flush_run(&mut ops, &mut run);
        // Not part of the LCS: either a brand new element, or one whose key
        // exists elsewhere in old (a relocation).
        let n = new.get(new_idx).unwrap();
        let key = &new_keys[new_idx];
        let source = old_keys
            .iter()
            .enumerate()
            .find(|(oi, k)| !old_matched[*oi] && *k == key);
        match source {
            Some((oi, _)) => {
                old_matched[oi] = true;
                let o = old.get(oi).unwrap();
                if equal(o, n) {
                    ops.push(SliceOp::Move { from: oi, to: new_idx });
                } else {
                    ops.push(SliceOp::Delete(o.dyn_clone()));
                    ops.push(SliceOp::Insert(n.dyn_clone()));
                }
            }
            None => ops.push(SliceOp::Insert(n.dyn_clone())),
        }
        new_idx += 1;
    }
    flush_run(&mut ops, &mut run);

    for (oi, matched) in old_matched.iter().enumerate() {
        if !matched {
            ops.push(SliceOp::Delete(old.get(oi).unwrap().dyn_clone()));
        }
    }

    Alignment {
        ops,
        positional_fallback_count: 0,
    }
}

fn flush_run(ops: &mut Vec<SliceOp>, run: &mut usize) {
    if *run > 0 {
        ops.push(SliceOp::Equal(*run));
        *run = 0;
    }
}

/// LCS by whole-value equality, same recurrence as [`align_by_key`]. Elements
/// outside the LCS aren't automatically Delete/Insert pairs though: before
/// falling back to either, we look for an equal value elsewhere in the slice
/// and turn the pair into a `Move` (source not otherwise kept) or `Copy`
/// (source also survives via the LCS), per §4.4's relocation rule applied
/// within a single unkeyed slice.
fn align_by_equality<F>(
    old: &dyn crate::value::SeqItems,
    new: &dyn crate::value::SeqItems,
    diff_elem: &F,
) -> Alignment
where
    F: Fn(&dyn Patchable, &dyn Patchable) -> Option<crate::patch::Patch>,
{
    let (n, m) = (old.len(), new.len());
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if equal(old.get(i).unwrap(), new.get(j).unwrap()) {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    let mut pairs = Vec::new(); // (old_idx, new_idx), increasing in both
    let mut in_pair = vec![false; n];
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if equal(old.get(i).unwrap(), new.get(j).unwrap()) {
            pairs.push((i, j));
            in_pair[i] = true;
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }

    // Classify every new_idx outside the LCS as Move, Copy, or Insert before
    // doing the ordered emission pass, so the merge below never has to guess
    // which old indices are "really" deleted vs. just relocated.
    enum NewSlot {
        Paired(usize),
        Move(usize),
        Copy(usize),
        Insert,
    }
    let mut moved_away = vec![false; n];
    let mut slots = Vec::with_capacity(m);
    let mut pair_cursor = 0usize;
    for nj in 0..m {
        if pair_cursor < pairs.len() && pairs[pair_cursor].1 == nj {
            slots.push(NewSlot::Paired(pairs[pair_cursor].0));
            pair_cursor += 1;
            continue;
        }
        let n_val = new.get(nj).unwrap();
        let spare = (0..n).find(|&oi| !in_pair[oi] && !moved_away[oi] && equal(old.get(oi).unwrap(), n_val));
        if let Some(oi) = spare {
            moved_away[oi] = true;
            slots.push(NewSlot::Move(oi));
            continue;
        }
        // Only an in-LCS occurrence genuinely "survives": a spare moved-away
        // index is consumed by its own Move and has no value left to copy.
        let survivor = (0..n).find(|&oi| in_pair[oi] && equal(old.get(oi).unwrap(), n_val));
        match survivor {
            Some(oi) => slots.push(NewSlot::Copy(oi)),
            None => slots.push(NewSlot::Insert),
        }
    }

    // A moved-away index gets no op of its own here: its reappearance is
    // carried entirely by the Move op at the destination, and apply_slice's
    // old_cursor walk skips any index consumed by a Move/Copy source.
    let mut ops = Vec::with_capacity(m);
    let mut old_cursor = 0usize;
    let mut run = 0usize;
    for (nj, slot) in slots.into_iter().enumerate() {
        match slot {
            NewSlot::Paired(oi) => {
                while old_cursor < oi {
                    if !moved_away[old_cursor] {
                        flush_run(&mut ops, &mut run);
                        ops.push(SliceOp::Delete(old.get(old_cursor).unwrap().dyn_clone()));
                    }
                    old_cursor += 1;
                }
                run += 1;
                old_cursor += 1;
            }
            NewSlot::Move(oi) => {
                flush_run(&mut ops, &mut run);
                ops.push(SliceOp::Move { from: oi, to: nj });
            }
            NewSlot::Copy(oi) => {
                flush_run(&mut ops, &mut run);
                let value = old.get(oi).unwrap().dyn_clone();
                ops.push(SliceOp::Copy { from: oi, to: nj, value });
            }
            NewSlot::Insert => {
                flush_run(&mut ops, &mut run);
                ops.push(SliceOp::Insert(new.get(nj).unwrap().dyn_clone()));
            }
        }
    }
    flush_run(&mut ops, &mut run);
    while old_cursor < n {
        if !moved_away[old_cursor] {
            ops.push(SliceOp::Delete(old.get(old_cursor).unwrap().dyn_clone()));
        }
        old_cursor += 1;
    }

    let _ = diff_elem; // unkeyed elements are never Modify'd: equal() already decided Equal vs Insert/Delete/Move
    Alignment {
        ops,
        positional_fallback_count: 0,
    }
}
