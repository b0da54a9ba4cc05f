//! Structural validation for declared dependency graphs.
//!
//! The versioned resolver proves satisfiability while it walks; this module
//! covers the other callers that declare plain id-to-id edges up front (the
//! task scheduler, most notably) and need the graph rejected at construction
//! rather than discovered stuck at runtime.

use kanflow_core::{KanflowError, KanflowResult};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Verify that every edge points at a declared node and that the graph is
/// acyclic.
///
/// `edges` maps each declared node to its dependencies; `label` renders a
/// node for error messages. An edge to an undeclared node fails with
/// [`KanflowError::NotFound`]; a cycle fails with
/// [`KanflowError::CircularDependency`] carrying the closing chain.
pub fn verify_graph<N, F>(edges: &HashMap<N, Vec<N>>, label: F) -> KanflowResult<()>
where
    N: Eq + Hash + Copy,
    F: Fn(N) -> String,
{
    let mut done: HashSet<N> = HashSet::new();
    for &node in edges.keys() {
        walk(node, edges, &label, &mut Vec::new(), &mut done)?;
    }
    Ok(())
}

fn walk<N, F>(
    node: N,
    edges: &HashMap<N, Vec<N>>,
    label: &F,
    stack: &mut Vec<N>,
    done: &mut HashSet<N>,
) -> KanflowResult<()>
where
    N: Eq + Hash + Copy,
    F: Fn(N) -> String,
{
    if done.contains(&node) {
        return Ok(());
    }
    if let Some(start) = stack.iter().position(|n| *n == node) {
        let mut chain: Vec<String> = stack[start..].iter().map(|n| label(*n)).collect();
        chain.push(label(node));
        return Err(KanflowError::CircularDependency {
            chain: chain.join(" -> "),
        });
    }
    let Some(targets) = edges.get(&node) else {
        return Err(KanflowError::NotFound(format!(
            "dependency {}",
            label(node)
        )));
    };
    stack.push(node);
    for &target in targets {
        walk(target, edges, label, stack, done)?;
    }
    stack.pop();
    done.insert(node);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use kanflow_core::codes;

    fn graph(pairs: &[(&'static str, &[&'static str])]) -> HashMap<&'static str, Vec<&'static str>> {
        pairs.iter().map(|(n, deps)| (*n, deps.to_vec())).collect()
    }

    #[test]
    fn test_diamond_is_accepted() {
        let edges = graph(&[("w", &[]), ("y", &["w"]), ("z", &["w"]), ("x", &["y", "z"])]);
        assert!(verify_graph(&edges, str::to_string).is_ok());
    }

    #[test]
    fn test_cycle_is_rejected_with_chain() {
        let edges = graph(&[("a", &[]), ("b", &["c"]), ("c", &["b"])]);
        let err = verify_graph(&edges, str::to_string).unwrap_err();
        assert_eq!(err.code(), codes::CIRCULAR_DEPENDENCY);
        let chain = err.to_string();
        assert!(chain.contains("b") && chain.contains("c"));
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let edges = graph(&[("a", &["a"])]);
        let err = verify_graph(&edges, str::to_string).unwrap_err();
        assert_eq!(err.code(), codes::CIRCULAR_DEPENDENCY);
        assert!(err.to_string().contains("a -> a"));
    }

    #[test]
    fn test_undeclared_target_is_rejected() {
        let edges = graph(&[("a", &["ghost"])]);
        let err = verify_graph(&edges, str::to_string).unwrap_err();
        assert_eq!(err.code(), codes::NOT_FOUND);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_empty_graph_is_accepted() {
        let edges: HashMap<&str, Vec<&str>> = HashMap::new();
        assert!(verify_graph(&edges, str::to_string).is_ok());
    }
}
