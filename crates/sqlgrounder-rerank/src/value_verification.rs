//! Value verification (signal 4, optional, off by default): confirm
//! literals extracted from a generated candidate actually occur in the
//! source database before crediting the candidate for them. Only run
//! against the top-2 post-bonus candidates; fans out per value-check to the
//! pool the same way hybrid retrieval fans out cosine/lexical queries.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use sqlmodel_core::Connection;

use sqlgrounder_core::SchemaContextPacket;
use sqlgrounder_db::value_exists;

use crate::keywords::is_keyword;
use crate::sql_extract::extract_alias_map;

/// One `col = 'v'` or `col IN (...)` literal resolved to a concrete table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckableValue {
    pub table: String,
    pub column: String,
    pub value: String,
}

static EQUALITY_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:([A-Za-z_][\w]*)\.)?([A-Za-z_][\w]*)\s*=\s*'([^']*)'").expect("valid regex")
});

static IN_LITERAL_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:([A-Za-z_][\w]*)\.)?([A-Za-z_][\w]*)\s+IN\s*\(([^)]*)\)").expect("valid regex")
});

static LITERAL_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'([^']*)'").expect("valid regex"));

fn resolve_table(
    qualifier: Option<&str>,
    column: &str,
    alias_map: &std::collections::BTreeMap<String, String>,
    packet: &SchemaContextPacket,
    known_tables: &BTreeSet<String>,
) -> Option<String> {
    if let Some(q) = qualifier {
        let lower = q.to_lowercase();
        let table = alias_map.get(&lower).cloned().unwrap_or(lower);
        return known_tables.contains(&table).then_some(table);
    }
    let matches: Vec<&str> = packet
        .tables
        .iter()
        .filter(|t| t.columns.iter().any(|c| c.column_name.eq_ignore_ascii_case(column)))
        .map(|t| t.table_name.as_str())
        .collect();
    if matches.len() == 1 { Some(matches[0].to_lowercase()) } else { None }
}

/// Extract `col = 'v'` and `col IN ('v1', …)` literals from a candidate
/// whose table is resolvable and present in the packet. `LIKE` comparisons
/// are never matched since they use a different operator than `=`/`IN`.
#[must_use]
pub fn extract_checkable_values(sql: &str, packet: &SchemaContextPacket) -> Vec<CheckableValue> {
    let alias_map = extract_alias_map(sql);
    let known_tables: BTreeSet<String> = packet.tables.iter().map(|t| t.table_name.to_lowercase()).collect();

    let mut out = Vec::new();

    for cap in EQUALITY_LITERAL.captures_iter(sql) {
        let qualifier = cap.get(1).map(|m| m.as_str());
        let column = &cap[2];
        if is_keyword(column) {
            continue;
        }
        if let Some(table) = resolve_table(qualifier, column, &alias_map, packet, &known_tables) {
            out.push(CheckableValue { table, column: column.to_lowercase(), value: cap[3].to_string() });
        }
    }

    for cap in IN_LITERAL_LIST.captures_iter(sql) {
        let qualifier = cap.get(1).map(|m| m.as_str());
        let column = &cap[2];
        if is_keyword(column) {
            continue;
        }
        let Some(table) = resolve_table(qualifier, column, &alias_map, packet, &known_tables) else { continue };
        for item in LITERAL_ITEM.captures_iter(&cap[3]) {
            out.push(CheckableValue { table: table.clone(), column: column.to_lowercase(), value: item[1].to_string() });
        }
    }

    out
}

/// Verified fraction of `checkable`, fanned out concurrently to the pool.
/// `1.0` when there is nothing to check; errors count as unverified, never
/// as a penalty beyond reducing the numerator (mirrors `value_exists`'s own
/// error-as-absent contract).
#[must_use]
pub fn verify<C: Connection + Sync>(conn: &C, checkable: &[CheckableValue], timeout_ms: u64) -> f64 {
    if checkable.is_empty() {
        return 1.0;
    }

    let results: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = checkable
            .iter()
            .map(|c| {
                scope.spawn(|| crate::blocking::block_on(value_exists(conn, &c.table, &c.column, &c.value, timeout_ms)))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("value verification thread panicked").unwrap_or(false))
            .collect()
    });

    let verified = results.iter().filter(|v| **v).count();
    verified as f64 / checkable.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgrounder_core::{ColumnGloss, Module, Question, RetrievalMeta, TableEntry, TableSource, TypeHint};
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
            question: Question { text: "orders with status shipped".to_string(), question_embedding: vec![] },
            tables: vec![TableEntry {
                table_name: "orders".to_string(),
                table_schema: "public".to_string(),
                module: Some(Module("sales".to_string())),
                gloss: String::new(),
                m_schema: String::new(),
                similarity: 0.8,
                source: TableSource::Hybrid,
                is_hub: false,
                columns: vec![column("id"), column("status")],
                fk_degree: 0,
            }],
            fk_edges: Set::new(),
            modules: Set::new(),
            retrieval_meta: RetrievalMeta::default(),
        }
    }

    #[test]
    fn extracts_qualified_equality_literal() {
        let p = packet();
        let values = extract_checkable_values("SELECT * FROM orders o WHERE o.status = 'shipped'", &p);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].table, "orders");
        assert_eq!(values[0].value, "shipped");
    }

    #[test]
    fn extracts_in_list_literals() {
        let p = packet();
        let values =
            extract_checkable_values("SELECT * FROM orders WHERE status IN ('shipped', 'pending')", &p);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn unresolvable_table_is_skipped() {
        let p = packet();
        let values = extract_checkable_values("SELECT * FROM orders WHERE ghost_col = 'x'", &p);
        assert!(values.is_empty());
    }

    #[test]
    fn like_comparisons_are_never_matched() {
        let p = packet();
        let values = extract_checkable_values("SELECT * FROM orders WHERE status LIKE 'ship%'", &p);
        assert!(values.is_empty());
    }
}
