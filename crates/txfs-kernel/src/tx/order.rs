//! Execution order for a transaction's operations.
//!
//! Three precedence rules produce "must run before" edges:
//!
//! 1. `mkdir D` before any operation touching a path below `D`.
//! 2. `write P` before a rename whose source is `P`.
//! 3. A rename before any removal of its source, its destination, or an
//!    ancestor or descendant of either.
//!
//! The order is a stable topological sort: among operations whose
//! predecessors have all been placed, the lowest insertion index goes next.
//! Unconstrained operations therefore keep their queued order.
//!
//! Edges only run mkdir -> anything, write -> rename and rename -> removal,
//! and mkdir -> mkdir edges follow strict nesting, so the graph is acyclic.

use std::collections::BTreeSet;

use txfs_types::path;

use super::operation::Operation;

/// Returns true if `before` must run ahead of `after`.
fn precedes(before: &Operation, after: &Operation) -> bool {
    match (before, after) {
        (Operation::Mkdir(dir), other) => other
            .paths()
            .into_iter()
            .any(|p| path::is_nested(&dir.path, p)),
        (Operation::Write(write), Operation::Rename(rename)) => write.path == rename.old_path,
        (Operation::Rename(rename), other) if other.kind().is_removal() => other
            .path()
            .is_some_and(|target| conflicts(target, &rename.old_path) || conflicts(target, &rename.new_path)),
        _ => false,
    }
}

fn conflicts(a: &str, b: &str) -> bool {
    a == b || path::is_nested(a, b) || path::is_nested(b, a)
}

/// Indices of `operations` in execution order.
pub(crate) fn execution_order(operations: &[Operation]) -> Vec<usize> {
    let n = operations.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut pending_preds = vec![0usize; n];

    for (i, a) in operations.iter().enumerate() {
        for (j, b) in operations.iter().enumerate() {
            if i != j && precedes(a, b) {
                successors[i].push(j);
                pending_preds[j] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending_preds[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &succ in &successors[next] {
            pending_preds[succ] -= 1;
            if pending_preds[succ] == 0 {
                ready.insert(succ);
            }
        }
    }

    // Unreachable with the current rules; keep every operation regardless.
    if order.len() < n {
        tracing::warn!(placed = order.len(), total = n, "ordering cycle; appending the rest in queue order");
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        order.extend((0..n).filter(|i| !placed.contains(i)));
    }

    order
}
