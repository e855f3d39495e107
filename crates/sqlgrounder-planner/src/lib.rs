//! Join planner (S5): the algorithmic heart of the pipeline. Builds the FK
//! graph, determines required tables, enumerates K-shortest-path join
//! skeletons with dynamic hub capping, and detects cross-module bridges.

pub mod cache;
pub mod graph;
pub mod hub;
pub mod paths;
pub mod skeleton;

use std::collections::BTreeSet;

use tracing::debug;

use sqlgrounder_core::{GraphStats, JoinPlan, Module, SchemaContextPacket, SchemaLinkBundle};

use crate::graph::FkGraph;
use crate::hub::HubCappingContext;

/// Hub-degree threshold shared with the FK expander.
pub const HUB_DEGREE_THRESHOLD: u32 = 8;

/// Default top-K skeletons returned when the caller does not override it.
pub const DEFAULT_TOP_K: usize = 3;

/// Build a [`JoinPlan`] for one packet, optionally guided by a schema link
/// bundle. `default_hub_cap` comes from `Config::hub_fk_cap`; `relevant_cap`
/// is a planner-local widening of that cap for hubs that are themselves
/// required (see DESIGN.md).
#[must_use]
pub fn plan(
    packet: &SchemaContextPacket,
    bundle: Option<&SchemaLinkBundle>,
    default_hub_cap: usize,
    relevant_cap: usize,
    top_k: usize,
) -> JoinPlan {
    let all_table_names: Vec<String> = packet.tables.iter().map(|t| t.table_name.clone()).collect();
    let graph = FkGraph::build(all_table_names.clone(), &packet.fk_edges);

    // Warm the process-wide module-subgraph cache. Cross-module pathfinding
    // here runs over the full graph; per-module subgraphs exist for callers
    // that plan within one module and want to skip cross-module fan-out.
    let _ = cache::module_subgraphs(&packet.tables, &packet.fk_edges);

    let required: BTreeSet<String> = match bundle {
        Some(b) => {
            let relevant_names: BTreeSet<String> =
                b.linked_tables.iter().filter(|t| t.relevance > 0.0).map(|t| t.table.clone()).collect();
            relevant_names.into_iter().filter(|t| graph.contains(t)).collect()
        }
        None => all_table_names.iter().filter(|t| graph.contains(t)).cloned().collect(),
    };

    let hubs: BTreeSet<String> = packet
        .tables
        .iter()
        .filter(|t| t.is_hub || t.fk_degree > HUB_DEGREE_THRESHOLD)
        .map(|t| t.table_name.clone())
        .collect();
    let hub_ctx = HubCappingContext::new(hubs, &required, default_hub_cap, relevant_cap);

    let skeletons = if required.is_empty() {
        Vec::new()
    } else {
        skeleton::build_skeletons(&graph, &required, &hub_ctx, bundle, top_k.max(1))
    };

    let graph_stats = GraphStats { nodes: graph.adjacency.len(), edges: graph.edge_count() };

    let modules_used: BTreeSet<String> = packet
        .tables
        .iter()
        .filter(|t| required.contains(&t.table_name))
        .filter_map(|t| t.module.as_ref().map(|Module(m)| m.clone()))
        .collect();

    let cross_module_detected = match bundle {
        Some(_) => modules_used.len() >= 2,
        None => packet.modules.len() >= 2,
    };

    let bridge_tables = if cross_module_detected {
        find_bridge_tables(&graph, packet, &required, &hub_ctx, &modules_used)
    } else {
        Vec::new()
    };

    debug!(
        required_tables = required.len(),
        skeletons = skeletons.len(),
        cross_module_detected,
        bridge_tables = bridge_tables.len(),
        "join planning complete"
    );

    JoinPlan { skeletons, graph_stats, cross_module_detected, bridge_tables, modules_used }
}

fn table_module<'a>(packet: &'a SchemaContextPacket, table_name: &str) -> Option<&'a str> {
    packet
        .tables
        .iter()
        .find(|t| t.table_name == table_name)
        .and_then(|t| t.module.as_ref())
        .map(|Module(m)| m.as_str())
}

fn touches_module(packet: &SchemaContextPacket, table_name: &str, module: &str) -> bool {
    packet.fk_edges.iter().any(|e| {
        let other = if e.from_table == table_name {
            Some(e.to_table.as_str())
        } else if e.to_table == table_name {
            Some(e.from_table.as_str())
        } else {
            None
        };
        other.is_some_and(|o| table_module(packet, o) == Some(module))
    })
}

/// Tables on a shortest path between two required tables of different
/// modules that themselves touch an FK edge into each module.
fn find_bridge_tables(
    graph: &FkGraph,
    packet: &SchemaContextPacket,
    required: &BTreeSet<String>,
    hub_ctx: &HubCappingContext<'_>,
    modules_used: &BTreeSet<String>,
) -> Vec<String> {
    if modules_used.len() < 2 {
        return Vec::new();
    }

    let required_sorted: Vec<String> = required.iter().cloned().collect();
    let mut bridges: BTreeSet<String> = BTreeSet::new();

    for i in 0..required_sorted.len() {
        for j in (i + 1)..required_sorted.len() {
            let (a, b) = (&required_sorted[i], &required_sorted[j]);
            let (Some(mod_a), Some(mod_b)) = (table_module(packet, a), table_module(packet, b)) else {
                continue;
            };
            if mod_a == mod_b {
                continue;
            }

            let paths = paths::k_shortest_paths(graph, hub_ctx, a, b, 1);
            let Some(path) = paths.into_iter().next() else { continue };

            for intermediate in path.iter().filter(|t| !required.contains(*t)) {
                if touches_module(packet, intermediate, mod_a) && touches_module(packet, intermediate, mod_b) {
                    bridges.insert(intermediate.clone());
                }
            }
        }
    }

    bridges.into_iter().collect()
}
