//! C3: tag-aware deep equality.
//!
//! Built the same way the teacher's `doc::compare` builds its ordering: one
//! recursive walk dispatched on [`Kind`], with `ignore` fields skipped and
//! `atomic` fields compared as an opaque whole rather than descended into.
//! Cycles are broken by remembering the address pairs already on the stack,
//! mirroring a cycle-safe deep-equal over an arbitrary object graph.
use std::collections::HashSet;

use crate::value::{Kind, Patchable};

fn addr(v: &dyn Patchable) -> usize {
    v as *const dyn Patchable as *const u8 as usize
}

/// Deep, tag-aware equality of two values of possibly different static
/// Rust types (equality across a sum type's alternatives is always `false`
/// unless both sides picked the same alternative).
pub fn equal(a: &dyn Patchable, b: &dyn Patchable) -> bool {
    let mut visited = HashSet::new();
    equal_inner(a, b, &mut visited)
}

fn equal_inner(a: &dyn Patchable, b: &dyn Patchable, visited: &mut HashSet<(usize, usize)>) -> bool {
    let pair = (addr(a), addr(b));
    if !visited.insert(pair) {
        // Already comparing this exact pair further up the stack: treat the
        // cycle as consistent rather than looping forever.
        return true;
    }
    let result = equal_uncycled(a, b, visited);
    visited.remove(&pair);
    result
}

fn equal_uncycled(a: &dyn Patchable, b: &dyn Patchable, visited: &mut HashSet<(usize, usize)>) -> bool {
    if a.kind() != b.kind() {
        return false;
    }
    match a.kind() {
        Kind::Null
        | Kind::Bool
        | Kind::Int
        | Kind::UInt
        | Kind::Float
        | Kind::String
        | Kind::Bytes => match (a.scalar(), b.scalar()) {
            (Some(x), Some(y)) => x.scalar_eq(&y),
            _ => false,
        },
        Kind::Pointer => match (a.pointer_target(), b.pointer_target()) {
            (Some(None), Some(None)) => true,
            (Some(Some(x)), Some(Some(y))) => equal_inner(x, y, visited),
            _ => false,
        },
        Kind::Sum => match (a.sum_variant(), b.sum_variant()) {
            (Some((va, pa)), Some((vb, pb))) => va == vb && equal_inner(pa, pb, visited),
            _ => false,
        },
        Kind::Struct => equal_struct(a, b, visited),
        Kind::Seq | Kind::Array => equal_seq(a, b, visited),
        Kind::Map => equal_map(a, b, visited),
    }
}

fn equal_struct(a: &dyn Patchable, b: &dyn Patchable, visited: &mut HashSet<(usize, usize)>) -> bool {
    let (Some(fa), Some(fb)) = (a.struct_fields(), b.struct_fields()) else {
        return false;
    };
    let descriptor = a.type_descriptor();
    for name in fa.field_names() {
        let flags = descriptor
            .and_then(|d| d.field(name))
            .map(|f| f.flags)
            .unwrap_or_default();
        if flags.ignore {
            continue;
        }
        let (Some(x), Some(y)) = (fa.get(name), fb.get(name)) else {
            return false;
        };
        // Identity-key and atomic fields still participate in equality as a
        // whole value; only diff treats them specially by not descending.
        if !equal_inner(x, y, visited) {
            return false;
        }
    }
    true
}

fn equal_seq(a: &dyn Patchable, b: &dyn Patchable, visited: &mut HashSet<(usize, usize)>) -> bool {
    let (Some(sa), Some(sb)) = (a.seq_items(), b.seq_items()) else {
        return false;
    };
    if sa.len() != sb.len() {
        return false;
    }
    for i in 0..sa.len() {
        let (Some(x), Some(y)) = (sa.get(i), sb.get(i)) else {
            return false;
        };
        if !equal_inner(x, y, visited) {
            return false;
        }
    }
    true
}

fn equal_map(a: &dyn Patchable, b: &dyn Patchable, visited: &mut HashSet<(usize, usize)>) -> bool {
    let (Some(ma), Some(mb)) = (a.map_entries(), b.map_entries()) else {
        return false;
    };
    if ma.len() != mb.len() {
        return false;
    }
    for key in ma.keys() {
        let (Some(x), Some(y)) = (ma.get(&key), mb.get(&key)) else {
            return false;
        };
        if !equal_inner(x, y, visited) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scalars_compare_by_value() {
        assert!(equal(&1i64, &1i64));
        assert!(!equal(&1i64, &2i64));
        assert!(!equal(&1i64, &1.0f64));
    }

    #[test]
    fn vecs_compare_elementwise() {
        let a: Vec<i64> = vec![1, 2, 3];
        let b: Vec<i64> = vec![1, 2, 3];
        let c: Vec<i64> = vec![1, 2];
        assert!(equal(&a, &b));
        assert!(!equal(&a, &c));
    }

    #[test]
    fn pointers_compare_by_target() {
        let a: Option<Box<i64>> = Some(Box::new(5));
        let b: Option<Box<i64>> = Some(Box::new(5));
        let n: Option<Box<i64>> = None;
        assert!(equal(&a, &b));
        assert!(!equal(&a, &n));
        assert!(equal(&n, &Option::<Box<i64>>::None));
    }
}
