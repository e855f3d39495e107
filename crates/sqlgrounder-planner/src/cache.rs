//! Module-subgraph cache: process-wide, read-mostly, keyed by a
//! stable hash of the sorted edge 4-tuples. Uses the same `OnceLock`/
//! `RwLock`-backed single-writer registry shape as the connection pool.

use std::collections::BTreeMap;
use std::sync::{LazyLock, RwLock};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use sqlgrounder_core::{FkEdge, Module, TableEntry};

use crate::graph::FkGraph;

/// One module's FK subgraph: that module's tables plus every edge with at
/// least one endpoint in the module (so cross-module edges appear in both
/// subgraphs that share an endpoint).
#[derive(Debug, Clone)]
pub struct ModuleSubgraphSet {
    pub by_module: BTreeMap<String, FkGraph>,
}

static MODULE_SUBGRAPH_CACHE: LazyLock<RwLock<BTreeMap<String, Arc<ModuleSubgraphSet>>>> =
    LazyLock::new(|| RwLock::new(BTreeMap::new()));

/// Stable hash of the sorted edge 4-tuples, used as the cache key. Two
/// packets with the same FK-edge set (even from different `query_id`s)
/// share the same cached subgraphs.
#[must_use]
pub fn stable_edge_key(edges: &std::collections::BTreeSet<FkEdge>) -> String {
    let mut hasher = Sha256::new();
    for edge in edges {
        hasher.update(edge.from_table.as_bytes());
        hasher.update([0u8]);
        hasher.update(edge.from_column.as_bytes());
        hasher.update([0u8]);
        hasher.update(edge.to_table.as_bytes());
        hasher.update([0u8]);
        hasher.update(edge.to_column.as_bytes());
        hasher.update([1u8]);
    }
    hex::encode(hasher.finalize())
}

fn build_module_subgraphs(
    tables: &[TableEntry],
    edges: &std::collections::BTreeSet<FkEdge>,
) -> ModuleSubgraphSet {
    let mut members: BTreeMap<String, std::collections::BTreeSet<String>> = BTreeMap::new();
    for table in tables {
        if let Some(Module(name)) = &table.module {
            members.entry(name.clone()).or_default().insert(table.table_name.clone());
        }
    }

    let mut by_module = BTreeMap::new();
    for (module, member_tables) in &members {
        let module_edges: std::collections::BTreeSet<FkEdge> = edges
            .iter()
            .filter(|e| member_tables.contains(&e.from_table) || member_tables.contains(&e.to_table))
            .cloned()
            .collect();

        let mut graph_tables = member_tables.clone();
        for e in &module_edges {
            graph_tables.insert(e.from_table.clone());
            graph_tables.insert(e.to_table.clone());
        }

        by_module.insert(module.clone(), FkGraph::build(graph_tables, &module_edges));
    }

    ModuleSubgraphSet { by_module }
}

/// Build (or return the cached) module-subgraph set for this edge set. On a
/// cache miss race, both callers build, but only the first insert wins; both
/// return the winner's `Arc`.
#[must_use]
pub fn module_subgraphs(
    tables: &[TableEntry],
    edges: &std::collections::BTreeSet<FkEdge>,
) -> Arc<ModuleSubgraphSet> {
    let key = stable_edge_key(edges);

    if let Some(hit) = MODULE_SUBGRAPH_CACHE.read().expect("cache lock poisoned").get(&key) {
        return hit.clone();
    }

    let built = Arc::new(build_module_subgraphs(tables, edges));
    let mut guard = MODULE_SUBGRAPH_CACHE.write().expect("cache lock poisoned");
    guard.entry(key.clone()).or_insert_with(|| built.clone());
    guard.get(&key).expect("just inserted").clone()
}
