//! Schema adherence (signal 1): how much of the candidate's table/column
//! vocabulary actually exists in the retrieved packet.

use std::collections::BTreeSet;

use sqlgrounder_core::{SchemaContextPacket, SchemaLinkBundle};

use crate::sql_extract::{extract_alias_map, extract_column_refs, extract_table_refs};

#[derive(Debug, Clone, Copy)]
pub struct SchemaAdherence {
    pub table_score: f64,
    pub column_score: f64,
    pub combined: f64,
}

fn known_tables(packet: &SchemaContextPacket, bundle: Option<&SchemaLinkBundle>) -> BTreeSet<String> {
    let mut known: BTreeSet<String> = packet.tables.iter().map(|t| t.table_name.to_lowercase()).collect();
    if let Some(b) = bundle {
        known.extend(b.linked_tables.iter().map(|t| t.table.to_lowercase()));
    }
    known
}

/// Columns parsed out of each table's `m_schema` text (`table (col: type …)`)
/// plus the linker's `linkedColumns`, merged into one bare-name set (for
/// unqualified matching) and a per-table set (for qualified matching).
fn known_columns(
    packet: &SchemaContextPacket,
    bundle: Option<&SchemaLinkBundle>,
) -> (BTreeSet<String>, std::collections::BTreeMap<String, BTreeSet<String>>) {
    let mut bare: BTreeSet<String> = BTreeSet::new();
    let mut per_table: std::collections::BTreeMap<String, BTreeSet<String>> = std::collections::BTreeMap::new();

    for table in &packet.tables {
        let cols: BTreeSet<String> = table.columns.iter().map(|c| c.column_name.to_lowercase()).collect();
        bare.extend(cols.iter().cloned());
        per_table.entry(table.table_name.to_lowercase()).or_default().extend(cols);
    }

    if let Some(b) = bundle {
        for (table, cols) in &b.linked_columns {
            let entry = per_table.entry(table.to_lowercase()).or_default();
            for c in cols {
                let name = c.column.to_lowercase();
                bare.insert(name.clone());
                entry.insert(name);
            }
        }
    }

    (bare, per_table)
}

#[must_use]
pub fn score(sql: &str, packet: &SchemaContextPacket, bundle: Option<&SchemaLinkBundle>) -> SchemaAdherence {
    let known_tables = known_tables(packet, bundle);
    let (bare_columns, per_table_columns) = known_columns(packet, bundle);

    let alias_map = extract_alias_map(sql);
    let table_refs = extract_table_refs(sql);
    let (qualified_cols, unqualified_cols) = extract_column_refs(sql, &alias_map);

    let table_total = table_refs.len();
    let table_found = table_refs.iter().filter(|t| known_tables.contains(t.as_str())).count();
    let table_score = if table_total == 0 { 1.0 } else { table_found as f64 / table_total as f64 };

    let mut column_total = 0usize;
    let mut column_found = 0usize;

    for (qualifier, column) in &qualified_cols {
        column_total += 1;
        let resolved_table = alias_map.get(qualifier).cloned().unwrap_or_else(|| qualifier.clone());
        let is_known = per_table_columns
            .get(&resolved_table)
            .is_some_and(|cols| cols.contains(column))
            || bare_columns.contains(column);
        if is_known {
            column_found += 1;
        }
    }

    for column in &unqualified_cols {
        column_total += 1;
        if bare_columns.contains(column) {
            column_found += 1;
        }
    }

    let column_score = if column_total == 0 { 1.0 } else { column_found as f64 / column_total as f64 };
    let combined = 0.4 * table_score + 0.6 * column_score;

    SchemaAdherence { table_score, column_score, combined }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgrounder_core::{ColumnGloss, Module, RetrievalMeta, TableEntry, TableSource, TypeHint, Question};
    use std::collections::BTreeSet as Set;

    fn column(name: &str) -> ColumnGloss {
        ColumnGloss {
            column_name: name.to_string(),
            description: String::new(),
            synonyms: Set::new(),
            type_hint: TypeHint::Text,
            is_pk: false,
            is_fk: false,
            fk_target: None,
            data_type: "text".to_string(),
        }
    }

    fn packet() -> SchemaContextPacket {
        SchemaContextPacket {
            query_id: "q1".to_string(),
            database_id: "db1".to_string(),
            question: Question { text: "employee salaries".to_string(), question_embedding: vec![] },
            tables: vec![TableEntry {
                table_name: "employees".to_string(),
                table_schema: "public".to_string(),
                module: Some(Module("hr".to_string())),
                gloss: String::new(),
                m_schema: String::new(),
                similarity: 0.8,
                source: TableSource::Hybrid,
                is_hub: false,
                columns: vec![column("id"), column("name"), column("salary")],
                fk_degree: 0,
            }],
            fk_edges: Set::new(),
            modules: Set::new(),
            retrieval_meta: RetrievalMeta::default(),
        }
    }

    #[test]
    fn known_table_and_column_score_perfectly() {
        let p = packet();
        let a = score("SELECT e.salary FROM employees e", &p, None);
        assert_eq!(a.table_score, 1.0);
        assert_eq!(a.column_score, 1.0);
    }

    #[test]
    fn unknown_table_penalizes_table_score() {
        let p = packet();
        let a = score("SELECT * FROM ghost_table", &p, None);
        assert_eq!(a.table_score, 0.0);
    }

    #[test]
    fn no_table_references_defaults_to_perfect_score() {
        let p = packet();
        let a = score("SELECT 1", &p, None);
        assert_eq!(a.table_score, 1.0);
    }
}
