//! K-shortest paths: a Yen's-like deviation algorithm over uniform
//! edge weights. Shortest path via BFS; further candidates by excluding an
//! edge or prefix node of the current best and re-running constrained BFS.

use std::collections::{BTreeSet, VecDeque};

use crate::graph::FkGraph;
use crate::hub::HubCappingContext;

type EdgeKey = (String, String);

fn bfs_shortest_path(
    graph: &FkGraph,
    hub_ctx: &HubCappingContext<'_>,
    source: &str,
    target: &str,
    removed_edges: &BTreeSet<EdgeKey>,
    removed_nodes: &BTreeSet<String>,
) -> Option<Vec<String>> {
    if source == target {
        return Some(vec![source.to_string()]);
    }

    let mut visited: BTreeSet<String> = BTreeSet::new();
    visited.insert(source.to_string());
    let mut queue: VecDeque<Vec<String>> = VecDeque::new();
    queue.push_back(vec![source.to_string()]);

    while let Some(path) = queue.pop_front() {
        let last = path.last().expect("path always non-empty").clone();
        for neighbor in hub_ctx.neighbors(graph, &last) {
            if removed_nodes.contains(&neighbor) || visited.contains(&neighbor) {
                continue;
            }
            let forward = (last.clone(), neighbor.clone());
            let backward = (neighbor.clone(), last.clone());
            if removed_edges.contains(&forward) || removed_edges.contains(&backward) {
                continue;
            }

            let mut next_path = path.clone();
            next_path.push(neighbor.clone());
            if neighbor == target {
                return Some(next_path);
            }
            visited.insert(neighbor.clone());
            queue.push_back(next_path);
        }
    }
    None
}

/// Up to `k` distinct simple paths from `source` to `target`, shortest
/// first, rejecting any path that revisits a node (including the source).
#[must_use]
pub fn k_shortest_paths(
    graph: &FkGraph,
    hub_ctx: &HubCappingContext<'_>,
    source: &str,
    target: &str,
    k: usize,
) -> Vec<Vec<String>> {
    let mut found: Vec<Vec<String>> = Vec::new();

    let Some(first) = bfs_shortest_path(graph, hub_ctx, source, target, &BTreeSet::new(), &BTreeSet::new())
    else {
        return found;
    };
    found.push(first);

    while found.len() < k {
        let prev = found.last().expect("non-empty").clone();
        let mut best_candidate: Option<Vec<String>> = None;

        for i in 0..prev.len().saturating_sub(1) {
            let spur_node = &prev[i];

            let mut removed_edges: BTreeSet<EdgeKey> = BTreeSet::new();
            for p in &found {
                if p.len() > i + 1 && p[..=i] == prev[..=i] {
                    removed_edges.insert((p[i].clone(), p[i + 1].clone()));
                }
            }
            let removed_nodes: BTreeSet<String> = prev[..i].iter().cloned().collect();

            let Some(spur_path) =
                bfs_shortest_path(graph, hub_ctx, spur_node, target, &removed_edges, &removed_nodes)
            else {
                continue;
            };

            let mut candidate = prev[..i].to_vec();
            candidate.extend(spur_path);

            if found.contains(&candidate) {
                continue;
            }

            best_candidate = match best_candidate {
                None => Some(candidate),
                Some(current_best) if candidate.len() < current_best.len()
                    || (candidate.len() == current_best.len() && candidate < current_best) =>
                {
                    Some(candidate)
                }
                other => other,
            };
        }

        match best_candidate {
            Some(candidate) => found.push(candidate),
            None => break,
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgrounder_core::FkEdge;
    use std::collections::BTreeSet as BSet;

    fn diamond_graph() -> FkGraph {
        let mut edges = BSet::new();
        edges.insert(FkEdge::new("a", "b_id", "b", "id"));
        edges.insert(FkEdge::new("a", "c_id", "c", "id"));
        edges.insert(FkEdge::new("b", "d_id", "d", "id"));
        edges.insert(FkEdge::new("c", "d_id", "d", "id"));
        FkGraph::build(
            ["a", "b", "c", "d"].into_iter().map(str::to_string),
            &edges,
        )
    }

    #[test]
    fn shortest_path_is_two_hops_in_a_diamond() {
        let graph = diamond_graph();
        let relevant = BSet::new();
        let ctx = HubCappingContext::new(BSet::new(), &relevant, 100, 100);
        let paths = k_shortest_paths(&graph, &ctx, "a", "d", 1);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 3);
    }

    #[test]
    fn k_shortest_finds_both_diamond_routes() {
        let graph = diamond_graph();
        let relevant = BSet::new();
        let ctx = HubCappingContext::new(BSet::new(), &relevant, 100, 100);
        let paths = k_shortest_paths(&graph, &ctx, "a", "d", 2);
        assert_eq!(paths.len(), 2);
        let via_b = paths.iter().any(|p| p.contains(&"b".to_string()));
        let via_c = paths.iter().any(|p| p.contains(&"c".to_string()));
        assert!(via_b && via_c);
    }

    #[test]
    fn unreachable_target_returns_empty() {
        let mut edges = BSet::new();
        edges.insert(FkEdge::new("a", "b_id", "b", "id"));
        let graph = FkGraph::build(["a", "b", "c"].into_iter().map(str::to_string), &edges);
        let relevant = BSet::new();
        let ctx = HubCappingContext::new(BSet::new(), &relevant, 100, 100);
        assert!(k_shortest_paths(&graph, &ctx, "a", "c", 3).is_empty());
    }

    #[test]
    fn no_path_revisits_a_node() {
        let graph = diamond_graph();
        let relevant = BSet::new();
        let ctx = HubCappingContext::new(BSet::new(), &relevant, 100, 100);
        for path in k_shortest_paths(&graph, &ctx, "a", "d", 5) {
            let unique: BSet<&String> = path.iter().collect();
            assert_eq!(unique.len(), path.len());
        }
    }
}
