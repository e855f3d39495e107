//! FK graph construction: undirected adjacency for pathfinding plus a
//! directed-edge lookup for join-condition emission, deduplicated by the
//! `(from_table, from_column, to_table, to_column)` 4-tuple.

use std::collections::{BTreeMap, BTreeSet};

use sqlgrounder_core::FkEdge;

fn sorted_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// An FK graph restricted to one set of tables: undirected adjacency for
/// pathfinding, plus the original directed edge for each undirected pair so
/// join conditions can be emitted with the correct column on each side.
#[derive(Debug, Clone, Default)]
pub struct FkGraph {
    pub adjacency: BTreeMap<String, BTreeSet<String>>,
    pub edge_lookup: BTreeMap<(String, String), Vec<FkEdge>>,
}

impl FkGraph {
    /// Build a graph over exactly `tables`, using only `edges` whose both
    /// endpoints are present. Cycles are not rejected: pathfinding handles
    /// them directly (invariant e).
    #[must_use]
    pub fn build<I>(tables: I, edges: &BTreeSet<FkEdge>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let table_set: BTreeSet<String> = tables.into_iter().collect();
        let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for t in &table_set {
            adjacency.entry(t.clone()).or_default();
        }

        let mut edge_lookup: BTreeMap<(String, String), Vec<FkEdge>> = BTreeMap::new();
        for edge in edges {
            if !table_set.contains(&edge.from_table) || !table_set.contains(&edge.to_table) {
                continue;
            }
            if edge.from_table == edge.to_table {
                // Self-referencing FK: not useful for pathfinding between
                // distinct tables, but still a legal edge to keep in adjacency
                // for degree purposes. Skip the undirected adjacency entry
                // since it would self-loop.
                continue;
            }
            adjacency.entry(edge.from_table.clone()).or_default().insert(edge.to_table.clone());
            adjacency.entry(edge.to_table.clone()).or_default().insert(edge.from_table.clone());

            let key = sorted_pair(&edge.from_table, &edge.to_table);
            let bucket = edge_lookup.entry(key).or_default();
            if !bucket.contains(edge) {
                bucket.push(edge.clone());
            }
        }

        Self { adjacency, edge_lookup }
    }

    #[must_use]
    pub fn degree(&self, table: &str) -> usize {
        self.adjacency.get(table).map_or(0, BTreeSet::len)
    }

    /// All distinct FK relationships between `a` and `b`, regardless of
    /// direction. Empty if the pair has no edge.
    #[must_use]
    pub fn edges_between(&self, a: &str, b: &str) -> &[FkEdge] {
        self.edge_lookup.get(&sorted_pair(a, b)).map_or(&[], Vec::as_slice)
    }

    /// One FK relationship between `a` and `b`, for callers that only need a
    /// representative join condition rather than every distinct relationship.
    #[must_use]
    pub fn edge_between(&self, a: &str, b: &str) -> Option<&FkEdge> {
        self.edges_between(a, b).first()
    }

    /// Total distinct `(from_table, from_column, to_table, to_column)`
    /// relationships retained across all table pairs.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_lookup.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn contains(&self, table: &str) -> bool {
        self.adjacency.contains_key(table)
    }
}
