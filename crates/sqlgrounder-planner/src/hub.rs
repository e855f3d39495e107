//! Dynamic hub capping: when a path traversal reaches a hub table,
//! its neighbor fan-out is capped during pathfinding so one highly-connected
//! table (e.g. `employees`) doesn't make every skeleton route through it.

use std::collections::BTreeSet;

use crate::graph::FkGraph;

/// Hub identification and capping parameters for one planning run.
pub struct HubCappingContext<'a> {
    pub hubs: BTreeSet<String>,
    pub relevant: &'a BTreeSet<String>,
    pub default_cap: usize,
    pub relevant_cap: usize,
}

impl<'a> HubCappingContext<'a> {
    #[must_use]
    pub fn new(hubs: BTreeSet<String>, relevant: &'a BTreeSet<String>, default_cap: usize, relevant_cap: usize) -> Self {
        Self { hubs, relevant, default_cap, relevant_cap }
    }

    /// Effective neighbor list for `node` during traversal: uncapped unless
    /// `node` is a hub, in which case neighbors are capped to `relevant_cap`
    /// (if the hub itself is in the relevant set) or `default_cap`,
    /// prioritizing relevant-set neighbors, tie-broken alphabetically.
    #[must_use]
    pub fn neighbors(&self, graph: &FkGraph, node: &str) -> Vec<String> {
        let Some(all) = graph.adjacency.get(node) else {
            return Vec::new();
        };

        if !self.hubs.contains(node) {
            return all.iter().cloned().collect();
        }

        let cap = if self.relevant.contains(node) { self.relevant_cap } else { self.default_cap };
        let mut sorted: Vec<String> = all.iter().cloned().collect();
        sorted.sort_by(|a, b| {
            let a_relevant = self.relevant.contains(a);
            let b_relevant = self.relevant.contains(b);
            b_relevant.cmp(&a_relevant).then_with(|| a.cmp(b))
        });
        sorted.truncate(cap);
        sorted
    }
}
