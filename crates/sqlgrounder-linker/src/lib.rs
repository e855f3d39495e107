//! Schema linker (S4): ground the question's keyphrases against the
//! retrieved packet's column glosses, producing tables/columns the question
//! actually touches plus a handful of advisory warnings for prompt assembly.
//!
//! This stage never calls the store or the sidecar: everything here is a
//! pure function of the packet already assembled by retrieval and FK
//! expansion, run for every request regardless of latency budget.

pub mod confusable;
pub mod gloss;
pub mod keyphrase;
pub mod match_scoring;
pub mod redirects;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use sqlgrounder_core::{
    JoinHint, LinkedColumn, LinkedTable, Question, SchemaContextPacket, SchemaLinkBundle,
    TypeHint, ValueHint,
};

/// Table relevance is included in the bundle once it clears this floor.
pub const TABLE_RELEVANCE_FLOOR: f64 = 0.1;

const VALUE_HINT_TYPE_HINTS: &[TypeHint] = &[
    TypeHint::NameLabel,
    TypeHint::Text,
    TypeHint::StatusEnum,
    TypeHint::TypeCategory,
    TypeHint::Code,
];

struct ColumnMatch {
    score: f64,
    concept: String,
}

/// Link a question against a retrieved schema context packet.
#[must_use]
pub fn link(question: &Question, packet: &SchemaContextPacket) -> SchemaLinkBundle {
    let keyphrases = keyphrase::extract_keyphrases(&question.text);
    let question_lower = question.text.to_lowercase();

    let unquoted_phrases: Vec<&keyphrase::Keyphrase> =
        keyphrases.iter().filter(|p| !p.is_quoted_value && !p.is_number).collect();

    let mut linked_tables = Vec::new();
    let mut linked_columns: BTreeMap<String, Vec<LinkedColumn>> = BTreeMap::new();
    let mut matched_unigrams: BTreeSet<String> = BTreeSet::new();

    for table in &packet.tables {
        let mut best_per_column: BTreeMap<&str, ColumnMatch> = BTreeMap::new();

        for phrase in &unquoted_phrases {
            let lower = phrase.text.to_lowercase();
            for column in &table.columns {
                let score = match_scoring::score_keyphrase_column(&lower, column);
                if score < match_scoring::MATCH_THRESHOLD {
                    continue;
                }
                if phrase.is_unigram_candidate() {
                    matched_unigrams.insert(lower.clone());
                }
                let slot = best_per_column
                    .entry(column.column_name.as_str())
                    .or_insert(ColumnMatch { score: 0.0, concept: String::new() });
                if score > slot.score {
                    slot.score = score;
                    slot.concept = phrase.text.clone();
                }
            }
        }

        let match_count = best_per_column.len();
        let max_column_score =
            best_per_column.values().map(|m| m.score).fold(0.0f64, f64::max);
        let relevance =
            0.3 * match_count as f64 + 0.4 * max_column_score + 0.3 * table.similarity;

        if relevance < TABLE_RELEVANCE_FLOOR {
            continue;
        }

        linked_tables.push(LinkedTable {
            table: table.table_name.clone(),
            relevance,
            reason: format!(
                "{match_count} column(s) matched, max column score {max_column_score:.2}, retrieval similarity {:.2}",
                table.similarity
            ),
        });

        if !best_per_column.is_empty() {
            let columns = best_per_column
                .into_iter()
                .map(|(column, m)| LinkedColumn { column: column.to_string(), relevance: m.score, concept: m.concept })
                .collect();
            linked_columns.insert(table.table_name.clone(), columns);
        }
    }

    let value_hints = build_value_hints(&keyphrases, packet);
    let join_hints = packet
        .fk_edges
        .iter()
        .map(|edge| JoinHint {
            from: edge.from_table.clone(),
            to: edge.to_table.clone(),
            via: format!("{}.{} = {}.{}", edge.from_table, edge.from_column, edge.to_table, edge.to_column),
        })
        .collect();

    let unsupported_concepts = unquoted_phrases
        .iter()
        .filter(|p| p.is_unigram_candidate())
        .map(|p| p.text.to_lowercase())
        .filter(|text| !matched_unigrams.contains(text))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let fk_edges: Vec<_> = packet.fk_edges.iter().cloned().collect();
    let column_redirects = redirects::column_redirects(&packet.tables, &fk_edges);
    let table_names: Vec<&str> = packet.tables.iter().map(|t| t.table_name.as_str()).collect();
    let confusable_tables = confusable::confusable_warnings(&table_names, &question_lower);

    debug!(
        linked_tables = linked_tables.len(),
        linked_columns = linked_columns.len(),
        value_hints = value_hints.len(),
        "schema linking complete"
    );

    let bundle = SchemaLinkBundle {
        linked_tables,
        linked_columns,
        join_hints,
        value_hints,
        unsupported_concepts,
        column_redirects,
        confusable_tables,
    };
    debug_assert!(bundle.check_invariants().is_ok());
    bundle
}

fn build_value_hints(keyphrases: &[keyphrase::Keyphrase], packet: &SchemaContextPacket) -> Vec<ValueHint> {
    let mut hints = Vec::new();
    for phrase in keyphrases.iter().filter(|p| p.is_quoted_value) {
        for table in &packet.tables {
            for column in &table.columns {
                if !VALUE_HINT_TYPE_HINTS.contains(&column.type_hint) {
                    continue;
                }
                hints.push(ValueHint {
                    value: phrase.text.clone(),
                    likely_column: column.column_name.clone(),
                    likely_table: table.table_name.clone(),
                });
            }
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgrounder_core::{ColumnGloss, FkEdge, Module, RetrievalMeta, TableEntry, TableSource};

    fn column(name: &str, hint: TypeHint) -> ColumnGloss {
        gloss::generate_gloss(name, if hint == TypeHint::DateTimestamp { "timestamp" } else { "text" }, false, false, None)
    }

    fn table(name: &str, similarity: f64, columns: Vec<ColumnGloss>) -> TableEntry {
        TableEntry {
            table_name: name.to_string(),
            table_schema: "public".to_string(),
            module: Some(Module("hr".to_string())),
            gloss: String::new(),
            m_schema: String::new(),
            similarity,
            source: TableSource::Hybrid,
            is_hub: false,
            columns,
            fk_degree: 0,
        }
    }

    fn packet(tables: Vec<TableEntry>, question_text: &str) -> SchemaContextPacket {
        SchemaContextPacket {
            query_id: "q1".to_string(),
            database_id: "db1".to_string(),
            question: Question { text: question_text.to_string(), question_embedding: vec![] },
            tables,
            fk_edges: BTreeSet::new(),
            modules: BTreeSet::new(),
            retrieval_meta: RetrievalMeta::default(),
        }
    }

    #[test]
    fn links_table_with_matching_column() {
        let employees = table("employees", 0.8, vec![column("salary", TypeHint::Monetary), column("name", TypeHint::NameLabel)]);
        let p = packet(vec![employees], "what is the average employee salary");
        let bundle = link(&p.question, &p);
        assert!(bundle.linked_tables.iter().any(|t| t.table == "employees"));
        assert!(bundle.linked_columns.contains_key("employees"));
    }

    #[test]
    fn low_relevance_table_is_excluded() {
        let unrelated = table("shipments", 0.0, vec![column("tracking_code", TypeHint::Code)]);
        let p = packet(vec![unrelated], "how many employees were hired last year");
        let bundle = link(&p.question, &p);
        assert!(bundle.linked_tables.is_empty());
    }

    #[test]
    fn value_hint_links_quoted_literal_to_status_column() {
        let orders = table("orders", 0.5, vec![gloss::generate_gloss("status", "text", false, false, None)]);
        let p = packet(vec![orders], "find orders with status 'shipped'");
        let bundle = link(&p.question, &p);
        assert!(bundle.value_hints.iter().any(|h| h.value == "shipped" && h.likely_column == "status"));
    }

    #[test]
    fn value_hint_is_emitted_for_every_qualifying_column_across_tables() {
        let orders = table(
            "orders",
            0.5,
            vec![
                gloss::generate_gloss("status", "text", false, false, None),
                gloss::generate_gloss("shipping_label", "text", false, false, None),
            ],
        );
        let shipments = table("shipments", 0.3, vec![gloss::generate_gloss("state", "text", false, false, None)]);
        let p = packet(vec![orders, shipments], "find orders with status 'shipped'");
        let bundle = link(&p.question, &p);
        let matches: Vec<_> = bundle.value_hints.iter().filter(|h| h.value == "shipped").collect();
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().any(|h| h.likely_table == "orders" && h.likely_column == "status"));
        assert!(matches.iter().any(|h| h.likely_table == "orders" && h.likely_column == "shipping_label"));
        assert!(matches.iter().any(|h| h.likely_table == "shipments" && h.likely_column == "state"));
    }

    #[test]
    fn join_hints_project_fk_edges_directly() {
        let mut p = packet(vec![table("order_items", 0.2, vec![])], "orders");
        p.fk_edges.insert(FkEdge::new("order_items", "order_id", "orders", "id"));
        let bundle = link(&p.question, &p);
        assert_eq!(bundle.join_hints.len(), 1);
        assert_eq!(bundle.join_hints[0].via, "order_items.order_id = orders.id");
    }

    #[test]
    fn unmatched_unigram_is_flagged_unsupported() {
        let employees = table("employees", 0.1, vec![column("salary", TypeHint::Monetary)]);
        let p = packet(vec![employees], "what is the zzgarble for employees");
        let bundle = link(&p.question, &p);
        assert!(bundle.unsupported_concepts.contains(&"zzgarble".to_string()));
    }
}
