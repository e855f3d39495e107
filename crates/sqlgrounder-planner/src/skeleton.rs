//! Steiner-like join skeletons: union one path per required table
//! pair into a candidate subgraph, score it, and emit a BFS join-order SQL
//! fragment. Combinatorial blow-up is capped by generating only the primary
//! (all-shortest-paths) skeleton plus, per pair, one alternate when its
//! second-shortest path uses a different set of intermediate tables.

use std::collections::{BTreeMap, BTreeSet};

use sqlgrounder_core::{JoinCondition, JoinSkeleton, JoinType, SchemaLinkBundle};

use crate::graph::FkGraph;
use crate::hub::HubCappingContext;
use crate::paths::k_shortest_paths;

/// Paths considered per required pair before picking a primary + alternate.
const PATHS_PER_PAIR: usize = 2;

struct PairRoute {
    path: Vec<String>,
}

fn intermediates(path: &[String], required: &BTreeSet<String>) -> BTreeSet<String> {
    path.iter().filter(|t| !required.contains(*t)).cloned().collect()
}

/// Edges (as undirected pairs) along a vertex path.
fn path_edges(path: &[String]) -> BTreeSet<(String, String)> {
    path.windows(2)
        .map(|w| if w[0] <= w[1] { (w[0].clone(), w[1].clone()) } else { (w[1].clone(), w[0].clone()) })
        .collect()
}

fn join_condition_for(graph: &FkGraph, from: &str, to: &str) -> Option<JoinCondition> {
    let edge = graph.edge_between(from, to)?;
    if edge.from_table == from {
        Some(JoinCondition {
            from_table: from.to_string(),
            from_column: edge.from_column.clone(),
            to_table: to.to_string(),
            to_column: edge.to_column.clone(),
            join_type: JoinType::Inner,
        })
    } else {
        Some(JoinCondition {
            from_table: from.to_string(),
            from_column: edge.to_column.clone(),
            to_table: to.to_string(),
            to_column: edge.from_column.clone(),
            join_type: JoinType::Inner,
        })
    }
}

fn sql_fragment(root: &str, joins: &[JoinCondition]) -> String {
    let mut fragment = root.to_string();
    for join in joins {
        fragment.push('\n');
        fragment.push_str(&format!(
            "JOIN {} ON {}.{} = {}.{}",
            join.to_table, join.from_table, join.from_column, join.to_table, join.to_column
        ));
    }
    fragment
}

/// Build the edge union, join order (BFS from the first required table),
/// and scored `JoinSkeleton` for one candidate set of per-pair paths.
fn materialize_skeleton(
    graph: &FkGraph,
    required: &BTreeSet<String>,
    edge_union: &BTreeSet<(String, String)>,
    linked_tables: &BTreeSet<String>,
    linked_columns: Option<&BTreeSet<String>>,
    root: &str,
) -> Option<JoinSkeleton> {
    let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (a, b) in edge_union {
        adjacency.entry(a.clone()).or_default().insert(b.clone());
        adjacency.entry(b.clone()).or_default().insert(a.clone());
    }
    for t in required {
        adjacency.entry(t.clone()).or_default();
    }

    let mut all_tables: BTreeSet<String> = required.clone();
    for (a, b) in edge_union {
        all_tables.insert(a.clone());
        all_tables.insert(b.clone());
    }

    let mut joins = Vec::new();
    let mut visited: BTreeSet<String> = BTreeSet::new();
    visited.insert(root.to_string());
    let mut queue: std::collections::VecDeque<String> = std::collections::VecDeque::new();
    queue.push_back(root.to_string());

    while let Some(current) = queue.pop_front() {
        let Some(neighbors) = adjacency.get(&current) else { continue };
        for neighbor in neighbors {
            if visited.contains(neighbor) {
                continue;
            }
            visited.insert(neighbor.clone());
            if let Some(join) = join_condition_for(graph, &current, neighbor) {
                joins.push(join);
            }
            queue.push_back(neighbor.clone());
        }
    }

    if visited.len() != all_tables.len() {
        // The union of per-pair paths did not end up connected (shouldn't
        // happen if every pair had a path from the same root's component).
        return None;
    }

    let hop_count = joins.len();
    let intermediates_set: BTreeSet<&String> = all_tables.iter().filter(|t| !required.contains(*t)).collect();
    let semantic_alignment = if intermediates_set.is_empty() {
        1.0
    } else {
        let aligned = intermediates_set.iter().filter(|t| linked_tables.contains(t.as_str())).count();
        aligned as f64 / intermediates_set.len() as f64
    };

    let column_coverage = match linked_columns {
        None => 0.0,
        Some(cols) => {
            if joins.is_empty() {
                1.0
            } else {
                let total = joins.len() * 2;
                let matched = joins
                    .iter()
                    .filter(|j| cols.contains(&j.from_column))
                    .count()
                    + joins.iter().filter(|j| cols.contains(&j.to_column)).count();
                matched as f64 / total as f64
            }
        }
    };

    let combined = hop_count as f64 - 0.5 * semantic_alignment - 0.3 * column_coverage;

    let mut sorted_tables: Vec<String> = all_tables.into_iter().collect();
    sorted_tables.sort();

    Some(JoinSkeleton {
        tables: sorted_tables,
        sql_fragment: sql_fragment(root, &joins),
        joins,
        score: combined,
        score_details: sqlgrounder_core::ScoreDetails {
            hop_count,
            semantic_alignment,
            column_coverage,
            combined,
        },
    })
}

/// Build up to `top_k` scored join skeletons connecting every required
/// table, ascending by `combined` score (lower is better). `hub_ctx` gates
/// neighbor fan-out during pathfinding.
#[must_use]
pub fn build_skeletons(
    graph: &FkGraph,
    required: &BTreeSet<String>,
    hub_ctx: &HubCappingContext<'_>,
    bundle: Option<&SchemaLinkBundle>,
    top_k: usize,
) -> Vec<JoinSkeleton> {
    let mut required_sorted: Vec<String> = required.iter().cloned().collect();
    required_sorted.sort();

    if required_sorted.len() <= 1 {
        return required_sorted
            .first()
            .map(|only| JoinSkeleton {
                tables: vec![only.clone()],
                joins: Vec::new(),
                score: -0.8,
                sql_fragment: only.clone(),
                score_details: sqlgrounder_core::ScoreDetails {
                    hop_count: 0,
                    semantic_alignment: 1.0,
                    column_coverage: 1.0,
                    combined: -0.8,
                },
            })
            .into_iter()
            .collect();
    }

    let linked_tables: BTreeSet<String> = bundle
        .map(|b| b.linked_tables.iter().map(|t| t.table.clone()).collect())
        .unwrap_or_default();
    let linked_columns: Option<BTreeSet<String>> = bundle.map(|b| {
        b.linked_columns.values().flatten().map(|c| c.column.clone()).collect()
    });

    let mut pair_routes: BTreeMap<(String, String), Vec<PairRoute>> = BTreeMap::new();
    for i in 0..required_sorted.len() {
        for j in (i + 1)..required_sorted.len() {
            let (from, to) = (&required_sorted[i], &required_sorted[j]);
            let paths = k_shortest_paths(graph, hub_ctx, from, to, PATHS_PER_PAIR);
            if paths.is_empty() {
                // No connecting subgraph for this pair: the whole required
                // set cannot be spanned by one skeleton.
                return Vec::new();
            }
            pair_routes.insert(
                (from.clone(), to.clone()),
                paths.into_iter().map(|path| PairRoute { path }).collect(),
            );
        }
    }

    let pair_keys: Vec<(String, String)> = pair_routes.keys().cloned().collect();

    let primary_union: BTreeSet<(String, String)> = pair_keys
        .iter()
        .flat_map(|key| path_edges(&pair_routes[key][0].path))
        .collect();

    let mut candidate_unions: Vec<BTreeSet<(String, String)>> = vec![primary_union.clone()];

    for key in &pair_keys {
        let routes = &pair_routes[key];
        let Some(alt) = routes.get(1) else { continue };
        let primary_intermediates = intermediates(&routes[0].path, required);
        let alt_intermediates = intermediates(&alt.path, required);
        if alt_intermediates == primary_intermediates {
            continue;
        }

        let mut union: BTreeSet<(String, String)> = BTreeSet::new();
        for k in &pair_keys {
            if k == key {
                union.extend(path_edges(&alt.path));
            } else {
                union.extend(path_edges(&pair_routes[k][0].path));
            }
        }
        if !candidate_unions.contains(&union) {
            candidate_unions.push(union);
        }
    }

    let root = required_sorted[0].clone();
    let mut skeletons: Vec<JoinSkeleton> = candidate_unions
        .into_iter()
        .filter_map(|union| {
            materialize_skeleton(graph, required, &union, &linked_tables, linked_columns.as_ref(), &root)
        })
        .collect();

    skeletons.sort_by(|a, b| {
        a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.tables.cmp(&b.tables))
    });
    skeletons.truncate(top_k);
    skeletons
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
        FkGraph::build(["a", "b", "c", "d"].into_iter().map(str::to_string), &edges)
    }

    #[test]
    fn single_required_table_has_no_joins() {
        let graph = diamond_graph();
        let relevant = BSet::new();
        let ctx = HubCappingContext::new(BSet::new(), &relevant, 100, 100);
        let mut required = BSet::new();
        required.insert("a".to_string());
        let skeletons = build_skeletons(&graph, &required, &ctx, None, 3);
        assert_eq!(skeletons.len(), 1);
        assert!(skeletons[0].joins.is_empty());
    }

    #[test]
    fn diamond_produces_a_two_hop_primary_skeleton() {
        let graph = diamond_graph();
        let relevant = BSet::new();
        let ctx = HubCappingContext::new(BSet::new(), &relevant, 100, 100);
        let mut required = BSet::new();
        required.insert("a".to_string());
        required.insert("d".to_string());
        let skeletons = build_skeletons(&graph, &required, &ctx, None, 3);
        assert!(!skeletons.is_empty());
        assert_eq!(skeletons[0].score_details.hop_count, 2);
    }

    #[test]
    fn diamond_alternate_skeleton_substitutes_the_whole_path_not_just_one_pair() {
        let graph = diamond_graph();
        let relevant = BSet::new();
        let ctx = HubCappingContext::new(BSet::new(), &relevant, 100, 100);
        let mut required = BSet::new();
        required.insert("a".to_string());
        required.insert("d".to_string());
        let skeletons = build_skeletons(&graph, &required, &ctx, None, 3);
        assert_eq!(skeletons.len(), 2);
        for skeleton in &skeletons {
            assert_eq!(skeleton.score_details.hop_count, 2);
        }
        let mut table_sets: Vec<Vec<String>> = skeletons.iter().map(|s| s.tables.clone()).collect();
        table_sets.sort();
        assert_eq!(
            table_sets,
            vec![vec!["a".to_string(), "b".to_string(), "d".to_string()], vec!["a".to_string(), "c".to_string(), "d".to_string()]]
        );
    }

    #[test]
    fn unreachable_pair_yields_no_skeletons() {
        let mut edges = BSet::new();
        edges.insert(FkEdge::new("a", "b_id", "b", "id"));
        let graph = FkGraph::build(["a", "b", "c"].into_iter().map(str::to_string), &edges);
        let relevant = BSet::new();
        let ctx = HubCappingContext::new(BSet::new(), &relevant, 100, 100);
        let mut required = BSet::new();
        required.insert("a".to_string());
        required.insert("c".to_string());
        assert!(build_skeletons(&graph, &required, &ctx, None, 3).is_empty());
    }
}
