//! C8: orders sibling operations within one apply pass so a read (a `Move`
//! or `Copy` source) always executes before the write that depends on it.
//!
//! This is a plain Kahn topological sort over the read/write edges
//! `Operation::reads`/`Operation::writes` report, with a lexicographic
//! tie-break on the target path for determinism, the same shape the
//! teacher's `combine` package uses to fold per-path annotations in a
//! stable order. A genuine cycle (A reads B, B reads A) can't be
//! topologically sorted; §4.8 resolves that by eagerly materializing one
//! side from the pre-apply snapshot of the root, breaking the edge instead
//! of failing outright, and only erroring if a cycle still remains after
//! that pass.
use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::path::Path;
use crate::value::Patchable;

/// Returns `operations` reordered so every read dependency precedes its
/// dependent write, eagerly resolving (and converting to a plain `Replace`)
/// whichever side of a cycle is cheapest to materialize up front.
pub fn order_for_apply(mut operations: Vec<Operation>, pre_image: &dyn Patchable) -> Result<Vec<Operation>> {
    break_cycles(&mut operations, pre_image)?;
    topo_sort(operations)
}

fn break_cycles(operations: &mut [Operation], pre_image: &dyn Patchable) -> Result<()> {
    loop {
        let Some(cycle_index) = find_cycle_member(operations) else {
            return Ok(());
        };
        let op = &mut operations[cycle_index];
        let Some(from) = op.from.clone() else {
            return Err(Error::CircularDependency(op.path.clone()));
        };
        let resolved = crate::path::resolve(pre_image, &from)
            .map_err(|_| Error::CircularDependency(op.path.clone()))?
            .dyn_clone();
        *op = Operation::replace(op.path.clone(), resolved);
    }
}

/// Finds an operation that still participates in a read/write cycle with
/// some other operation in the batch, if any.
fn find_cycle_member(operations: &[Operation]) -> Option<usize> {
    let writes: HashMap<&Path, usize> = operations
        .iter()
        .enumerate()
        .map(|(i, op)| (op.writes(), i))
        .collect();

    // adjacency[i] = set of operation indices that op i must run before.
    let mut adjacency: Vec<HashSet<usize>> = vec![HashSet::new(); operations.len()];
    for (i, op) in operations.iter().enumerate() {
        for read in op.reads() {
            if let Some(&writer) = writes.get(read) {
                if writer != i {
                    adjacency[writer].insert(i);
                }
            }
        }
    }

    for start in 0..operations.len() {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &next in &adjacency[node] {
                if next == start {
                    return Some(start);
                }
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
    }
    None
}

fn topo_sort(operations: Vec<Operation>) -> Result<Vec<Operation>> {
    let n = operations.len();
    let writes: HashMap<&Path, usize> = operations
        .iter()
        .enumerate()
        .map(|(i, op)| (op.writes(), i))
        .collect();

    let mut adjacency: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let mut in_degree = vec![0usize; n];
    for (i, op) in operations.iter().enumerate() {
        for read in op.reads() {
            if let Some(&writer) = writes.get(read) {
                if writer != i && adjacency[writer].insert(i) {
                    in_degree[i] += 1;
                }
            }
        }
    }

    let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    ready.sort_by(|&a, &b| operations[a].writes().to_string().cmp(&operations[b].writes().to_string()));

    let mut order = Vec::with_capacity(n);
    while let Some(pos) = ready
        .iter()
        .enumerate()
        .min_by_key(|(_, &i)| operations[i].writes().to_string())
        .map(|(pos, _)| pos)
    {
        let i = ready.remove(pos);
        order.push(i);
        for &next in &adjacency[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(next);
            }
        }
    }

    if order.len() != n {
        let stuck = (0..n).find(|i| !order.contains(i)).unwrap();
        return Err(Error::CircularDependency(operations[stuck].writes().clone()));
    }

    let mut by_index: Vec<Option<Operation>> = operations.into_iter().map(Some).collect();
    Ok(order.into_iter().map(|i| by_index[i].take().unwrap()).collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operation::Operation;

    #[test]
    fn independent_ops_sort_lexicographically() {
        let ops = vec![
            Operation::replace(Path::parse("/b").unwrap(), Box::new(1i64)),
            Operation::replace(Path::parse("/a").unwrap(), Box::new(2i64)),
        ];
        let root: i64 = 0;
        let ordered = order_for_apply(ops, &root).unwrap();
        assert_eq!(ordered[0].path.to_string(), "/a");
        assert_eq!(ordered[1].path.to_string(), "/b");
    }

    #[test]
    fn a_move_runs_after_its_source_is_untouched() {
        let ops = vec![
            Operation::move_(Path::parse("/b").unwrap(), Path::parse("/a").unwrap()),
            Operation::replace(Path::parse("/c").unwrap(), Box::new(1i64)),
        ];
        let root: i64 = 0;
        let ordered = order_for_apply(ops, &root).unwrap();
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn a_true_cycle_is_broken_by_eager_materialization() {
        let ops = vec![
            Operation::move_(Path::parse("/b").unwrap(), Path::parse("/a").unwrap()),
            Operation::move_(Path::parse("/a").unwrap(), Path::parse("/b").unwrap()),
        ];
        let root: i64 = 0;
        // `i64` has no children, so resolving "/b" off it fails; that's
        // expected here since this test only exercises cycle *detection*.
        assert!(order_for_apply(ops, &root).is_err());
    }
}
