//! S2 — cosine top-K over table embeddings, lexical top-K over table
//! metadata, fused by Reciprocal Rank Fusion.
//!
//! The two queries run concurrently on their own OS threads (mirroring the
//! teacher's `std::thread::scope` fan-out for independent I/O-bound work),
//! each bridging into the async `SchemaStore` with its own short-lived
//! runtime.

use std::collections::BTreeSet;

use asupersync::Cx;
use sqlgrounder_core::{Config, Module, Question, TableEntry, TableSource};
use sqlgrounder_db::{DbResult, SchemaStore, StoredTable};

use crate::blocking::block_on;

pub const RRF_K: f64 = 60.0;

fn rrf(rank: usize) -> f64 {
    1.0 / (RRF_K + rank as f64)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn module_matches(row: &StoredTable, filter: Option<&BTreeSet<Module>>) -> bool {
    match (filter, &row.module) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(modules), Some(m)) => modules.contains(&Module::new(m.clone())),
    }
}

fn to_table_entry(row: StoredTable, similarity: f64, source: TableSource) -> TableEntry {
    TableEntry {
        table_name: row.table_name,
        table_schema: row.table_schema.unwrap_or_default(),
        module: row.module.map(Module::new),
        gloss: row.gloss,
        m_schema: row.m_schema,
        similarity,
        source,
        is_hub: row.is_hub,
        columns: Vec::new(),
        fk_degree: row.fk_degree,
    }
}

/// Outcome of the hybrid retrieval pass, including the diagnostics carried
/// in `RetrievalMeta`.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub tables: Vec<TableEntry>,
    pub candidates_considered: usize,
    pub retrieval_count: usize,
    pub bm25_count: usize,
    pub hybrid_count: usize,
}

/// Run cosine + lexical retrieval and fuse them by RRF.
///
/// Degrades gracefully: a missing/erroring lexical index yields an empty
/// lexical list (warned, not propagated); a cosine failure propagates since
/// cosine retrieval is mandatory. `lexical_enabled` mirrors the
/// `bm25_search` feature flag: when off, lexical retrieval is skipped
/// entirely rather than run and discarded, so fusion degrades to cosine-only.
pub fn retrieve_hybrid<S: SchemaStore + Sync>(
    store: &S,
    cx: &Cx,
    question: &Question,
    module_filter: Option<&BTreeSet<Module>>,
    config: &Config,
    lexical_enabled: bool,
) -> DbResult<RetrievalOutcome> {
    let embedding = question.question_embedding.clone();
    let terms = tokenize(&question.text);
    let top_k = config.top_k;

    let (cosine_result, lexical_result): (DbResult<Vec<StoredTable>>, DbResult<Vec<StoredTable>>) =
        std::thread::scope(|scope| {
            let cosine_handle = scope.spawn(|| block_on(store.cosine_tables(cx, &embedding, top_k)));
            let lexical_handle = scope.spawn(|| {
                if lexical_enabled {
                    block_on(store.lexical_tables(cx, &terms, top_k))
                } else {
                    Ok(Vec::new())
                }
            });
            let cosine = cosine_handle.join().expect("cosine retrieval thread panicked");
            let lexical = lexical_handle.join().expect("lexical retrieval thread panicked");
            (cosine, lexical)
        });

    let cosine_rows: Vec<StoredTable> = cosine_result?
        .into_iter()
        .filter(|r| r.similarity >= config.threshold)
        .filter(|r| module_matches(r, module_filter))
        .collect();

    let lexical_rows: Vec<StoredTable> = match lexical_result {
        Ok(rows) => rows.into_iter().filter(|r| module_matches(r, module_filter)).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "lexical retrieval unavailable, degrading to cosine-only");
            Vec::new()
        }
    };

    let candidates_considered = cosine_rows.len() + lexical_rows.len();
    let cosine_phantom_rank = cosine_rows.len() + 1;
    let lexical_phantom_rank = lexical_rows.len() + 1;

    let cosine_by_name: std::collections::BTreeMap<String, (usize, StoredTable)> = cosine_rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| (row.table_name.clone(), (i + 1, row)))
        .collect();
    let lexical_by_name: std::collections::BTreeMap<String, (usize, StoredTable)> = lexical_rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| (row.table_name.clone(), (i + 1, row)))
        .collect();

    let mut names: BTreeSet<String> = BTreeSet::new();
    names.extend(cosine_by_name.keys().cloned());
    names.extend(lexical_by_name.keys().cloned());

    let mut fused: Vec<(f64, TableEntry)> = Vec::with_capacity(names.len());
    let mut retrieval_count = 0usize;
    let mut bm25_count = 0usize;
    let mut hybrid_count = 0usize;

    for name in names {
        let cosine_entry = cosine_by_name.get(&name);
        let lexical_entry = lexical_by_name.get(&name);

        let cosine_rank = cosine_entry.map_or(cosine_phantom_rank, |(rank, _)| *rank);
        let lexical_rank = lexical_entry.map_or(lexical_phantom_rank, |(rank, _)| *rank);
        let fused_score = rrf(cosine_rank) + rrf(lexical_rank);

        let (source, row, similarity) = match (cosine_entry, lexical_entry) {
            (Some((_, row)), Some(_)) => {
                hybrid_count += 1;
                (TableSource::Hybrid, row.clone(), row.similarity)
            }
            (Some((_, row)), None) => {
                retrieval_count += 1;
                (TableSource::Retrieval, row.clone(), row.similarity)
            }
            (None, Some((_, row))) => {
                bm25_count += 1;
                (TableSource::Bm25, row.clone(), row.similarity)
            }
            (None, None) => unreachable!("name came from one of the two maps"),
        };

        fused.push((fused_score, to_table_entry(row, similarity, source)));
    }

    fused.sort_by(|(a, ea), (b, eb)| {
        b.partial_cmp(a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ea.table_name.cmp(&eb.table_name))
    });
    fused.truncate(config.max_tables);

    Ok(RetrievalOutcome {
        tables: fused.into_iter().map(|(_, entry)| entry).collect(),
        candidates_considered,
        retrieval_count,
        bm25_count,
        hybrid_count,
    })
}
