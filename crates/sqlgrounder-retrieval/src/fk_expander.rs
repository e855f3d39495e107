//! S3 — bounded foreign-key neighborhood expansion with hub capping.

use std::collections::BTreeSet;

use asupersync::Cx;
use sqlgrounder_core::{Config, FkEdge, TableEntry, TableSource};
use sqlgrounder_db::{DbResult, SchemaStore};

use crate::blocking::block_on;

const HUB_DEGREE_THRESHOLD: u32 = 8;
const FK_EXPANSION_SIMILARITY_DECAY: f64 = 0.8;

/// Direct FK neighbor of a seed table, with enough metadata to apply the
/// hub-capping rule before it is fetched in full.
struct Neighbor {
    table_name: String,
    fk_degree: u32,
    is_hub: bool,
}

fn neighbors_of(seed: &str, edges: &[FkEdge], already_present: &BTreeSet<String>) -> Vec<String> {
    let mut found = BTreeSet::new();
    for edge in edges {
        if edge.from_table == seed && !already_present.contains(&edge.to_table) {
            found.insert(edge.to_table.clone());
        }
        if edge.to_table == seed && !already_present.contains(&edge.from_table) {
            found.insert(edge.from_table.clone());
        }
    }
    found.into_iter().collect()
}

/// Expand `retrieved` with bounded FK neighbors.
///
/// Seeds are taken from `retrieved` in descending `similarity` order, up to
/// `config.fk_expansion_limit`. Growth stops globally once the table count
/// reaches `config.max_tables`. Neighbor metadata (gloss, `m_schema`,
/// `fk_degree`) is fetched in one batch per seed via
/// [`SchemaStore::tables_by_name`].
pub fn expand_fk_neighborhood<S: SchemaStore>(
    store: &S,
    cx: &Cx,
    retrieved: Vec<TableEntry>,
    config: &Config,
) -> DbResult<(Vec<TableEntry>, Vec<String>)> {
    let mut present: BTreeSet<String> = retrieved.iter().map(|t| t.table_name.clone()).collect();
    let mut result = retrieved.clone();
    let mut hub_tables_capped: Vec<String> = Vec::new();

    if result.len() >= config.max_tables {
        return Ok((result, hub_tables_capped));
    }

    let mut seeds: Vec<&TableEntry> = retrieved.iter().collect();
    seeds.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
    seeds.truncate(config.fk_expansion_limit);

    for seed in seeds {
        if result.len() >= config.max_tables {
            break;
        }

        let edges = block_on(store.fk_edges_for_tables(cx, std::slice::from_ref(&seed.table_name)))?;
        let neighbor_names = neighbors_of(&seed.table_name, &edges, &present);
        if neighbor_names.is_empty() {
            continue;
        }

        let neighbor_rows = block_on(store.tables_by_name(cx, &neighbor_names))?;
        let mut neighbors: Vec<Neighbor> = neighbor_rows
            .iter()
            .map(|row| Neighbor {
                table_name: row.table_name.clone(),
                fk_degree: row.fk_degree,
                is_hub: row.is_hub,
            })
            .collect();

        let seed_is_hub = seed.is_hub || seed.fk_degree > HUB_DEGREE_THRESHOLD;
        if seed_is_hub && neighbors.len() > config.hub_fk_cap {
            neighbors.sort_by(|a, b| {
                a.is_hub
                    .cmp(&b.is_hub)
                    .then_with(|| a.fk_degree.cmp(&b.fk_degree))
                    .then_with(|| a.table_name.cmp(&b.table_name))
            });
            neighbors.truncate(config.hub_fk_cap);
            hub_tables_capped.push(seed.table_name.clone());
        }

        for neighbor in neighbors {
            if result.len() >= config.max_tables {
                break;
            }
            if present.contains(&neighbor.table_name) {
                continue;
            }
            let Some(row) = neighbor_rows.iter().find(|r| r.table_name == neighbor.table_name) else {
                continue;
            };
            present.insert(neighbor.table_name.clone());
            result.push(TableEntry {
                table_name: row.table_name.clone(),
                table_schema: row.table_schema.clone().unwrap_or_default(),
                module: row.module.clone().map(sqlgrounder_core::Module::new),
                gloss: row.gloss.clone(),
                m_schema: row.m_schema.clone(),
                similarity: seed.similarity * FK_EXPANSION_SIMILARITY_DECAY,
                source: TableSource::FkExpansion,
                is_hub: row.is_hub,
                columns: Vec::new(),
                fk_degree: row.fk_degree,
            });
        }
    }

    Ok((result, hub_tables_capped))
}
