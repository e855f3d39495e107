//! Column redirects: flag FK child tables that are
//! missing an "important" column their parent carries, so prompt assembly
//! can suggest joining up to fetch it instead of guessing a phantom column.

use std::collections::BTreeMap;

use regex::Regex;
use std::sync::LazyLock;

use sqlgrounder_core::{ColumnRedirect, FkEdge, TableEntry};

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(date|_at)$").expect("valid regex"));
static EMPLOYEE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(employee_id|emp_id|worker_id)$").expect("valid regex"));
static STATUS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(status|status_code)$").expect("valid regex"));

fn categorize(column_name: &str) -> Option<&'static str> {
    if DATE_PATTERN.is_match(column_name) {
        Some("date")
    } else if EMPLOYEE_PATTERN.is_match(column_name) {
        Some("employee")
    } else if STATUS_PATTERN.is_match(column_name) {
        Some("status")
    } else {
        None
    }
}

/// For each FK edge child→parent, if the parent carries an "important"
/// column (matched by category) that the child lacks, emit a redirect.
#[must_use]
pub fn column_redirects(tables: &[TableEntry], fk_edges: &[FkEdge]) -> Vec<ColumnRedirect> {
    let by_name: BTreeMap<&str, &TableEntry> =
        tables.iter().map(|t| (t.table_name.as_str(), t)).collect();

    let mut redirects = Vec::new();
    for edge in fk_edges {
        let (Some(child), Some(parent)) =
            (by_name.get(edge.from_table.as_str()), by_name.get(edge.to_table.as_str()))
        else {
            continue;
        };

        let child_columns: std::collections::BTreeSet<&str> =
            child.columns.iter().map(|c| c.column_name.as_str()).collect();

        for parent_column in &parent.columns {
            let Some(category) = categorize(&parent_column.column_name) else {
                continue;
            };
            let already_has_category =
                child_columns.iter().any(|c| categorize(c) == Some(category));
            if already_has_category {
                continue;
            }
            redirects.push(ColumnRedirect {
                child_table: child.table_name.clone(),
                parent_table: parent.table_name.clone(),
                column: parent_column.column_name.clone(),
                category: category.to_string(),
                join_key: edge.from_column.clone(),
            });
        }
    }
    redirects
}
