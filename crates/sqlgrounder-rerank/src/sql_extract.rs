//! Shared regex-driven reference extraction for the reranker's structural
//! signals. Deliberately not a real parser — every extractor here only ever
//! feeds an additive bonus, so a few false positives/negatives on exotic SQL
//! shapes are an acceptable trade for simplicity (see `keywords.rs`).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::keywords::is_keyword;

/// Blank out `'...'` and `"..."` literal bodies (doubled-quote escapes
/// preserved as content, not terminators) so downstream scans never mistake
/// literal text for identifiers. Length-preserving so later regex spans
/// still line up with the original string if ever needed.
#[must_use]
pub fn strip_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;
    while let Some(c) = chars.next() {
        if in_single {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push(' ');
                    out.push(' ');
                } else {
                    in_single = false;
                    out.push(' ');
                }
            } else {
                out.push(' ');
            }
            continue;
        }
        if in_double {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    out.push(' ');
                    out.push(' ');
                } else {
                    in_double = false;
                    out.push(' ');
                }
            } else {
                out.push(' ');
            }
            continue;
        }
        match c {
            '\'' => {
                in_single = true;
                out.push(' ');
            }
            '"' => {
                in_double = true;
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_schema_prefix(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_lowercase()
}

static FROM_JOIN_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][\w.]*)").expect("valid regex"));

static FROM_JOIN_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][\w.]*)\s+(?:AS\s+)?([A-Za-z_][\w]*)\b")
        .expect("valid regex")
});

/// FROM/JOIN table references: schema-prefix stripped, lowercased, deduplicated.
#[must_use]
pub fn extract_table_refs(sql: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for cap in FROM_JOIN_TABLE.captures_iter(sql) {
        let name = strip_schema_prefix(&cap[1]);
        if !seen.contains(&name) {
            seen.push(name);
        }
    }
    seen
}

/// alias -> table map built from `FROM t alias` / `JOIN t AS alias`. A
/// second token that is itself a SQL keyword (e.g. `FROM orders WHERE ...`)
/// is never treated as an alias.
#[must_use]
pub fn extract_alias_map(sql: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for cap in FROM_JOIN_ALIAS.captures_iter(sql) {
        let table = strip_schema_prefix(&cap[1]);
        let alias = cap[2].to_string();
        if is_keyword(&alias) {
            continue;
        }
        map.insert(alias.to_lowercase(), table);
    }
    map
}

static QUALIFIED_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_][\w]*)\.([A-Za-z_][\w]*)\b").expect("valid regex"));

/// Unqualified column candidate: a bare identifier following one of
/// SELECT/WHERE/ON/HAVING/BY/',' that is not a keyword, not a known alias
/// (i.e. not itself a table qualifier), and not a function call (no `(`
/// immediately after).
static UNQUALIFIED_AFTER_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bSELECT\b|\bWHERE\b|\bON\b|\bHAVING\b|\bBY\b|,)\s+([A-Za-z_][\w]*)\s*([(]?)")
        .expect("valid regex")
});

/// Qualified (`alias.col`) and unqualified column references, after
/// stripping string literals. `known_qualifiers` excludes a `.`-prefix that
/// is actually a table/alias self-reference from being miscounted as a
/// column (it still is one: `alias.col` pairs are always treated as column
/// refs regardless of whether `alias` resolves).
#[must_use]
pub fn extract_column_refs(sql: &str, alias_map: &BTreeMap<String, String>) -> (Vec<(String, String)>, Vec<String>) {
    let stripped = strip_string_literals(sql);

    let mut qualified = Vec::new();
    for cap in QUALIFIED_COLUMN.captures_iter(&stripped) {
        let qualifier = cap[1].to_lowercase();
        let column = cap[2].to_lowercase();
        if is_keyword(&qualifier) || is_keyword(&column) {
            continue;
        }
        qualified.push((qualifier, column));
    }

    let known_aliases: std::collections::BTreeSet<&str> =
        alias_map.keys().map(String::as_str).collect();
    let mut unqualified = Vec::new();
    for cap in UNQUALIFIED_AFTER_CLAUSE.captures_iter(&stripped) {
        let candidate = cap[1].to_lowercase();
        let followed_by_paren = &cap[2] == "(";
        if followed_by_paren || is_keyword(&candidate) || known_aliases.contains(candidate.as_str()) {
            continue;
        }
        unqualified.push(candidate);
    }
    (qualified, unqualified)
}

static ON_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\bON\s+(.+?)(?:\bJOIN\b|\bWHERE\b|\bGROUP\s+BY\b|\bORDER\s+BY\b|\bHAVING\b|\bLIMIT\b|;|$)")
        .expect("valid regex")
});

static EQUALITY_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Za-z_][\w]*)\.([A-Za-z_][\w]*)\s*=\s*([A-Za-z_][\w]*)\.([A-Za-z_][\w]*)\b")
        .expect("valid regex")
});

/// One `a.c = b.c` equality extracted from an `ON` clause, resolved through
/// the alias map back to table names where possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedJoin {
    pub table_a: String,
    pub column_a: String,
    pub table_b: String,
    pub column_b: String,
}

impl ExtractedJoin {
    /// Two joins are equal if their table/column pair sets match, regardless
    /// of which side is `a` and which is `b`.
    #[must_use]
    pub fn matches(&self, other: &ExtractedJoin) -> bool {
        let mine = [(&self.table_a, &self.column_a), (&self.table_b, &self.column_b)];
        let theirs = [(&other.table_a, &other.column_a), (&other.table_b, &other.column_b)];
        (mine[0] == theirs[0] && mine[1] == theirs[1]) || (mine[0] == theirs[1] && mine[1] == theirs[0])
    }
}

fn resolve(token: &str, alias_map: &BTreeMap<String, String>) -> String {
    let lower = token.to_lowercase();
    alias_map.get(&lower).cloned().unwrap_or(lower)
}

/// `JOIN … ON a.c = b.c` conditions, AND-compound `ON` clauses split into
/// multiple conditions.
#[must_use]
pub fn extract_join_conditions(sql: &str, alias_map: &BTreeMap<String, String>) -> Vec<ExtractedJoin> {
    let mut out = Vec::new();
    for on_cap in ON_CLAUSE.captures_iter(sql) {
        let clause = &on_cap[1];
        for part in Regex::new(r"(?i)\bAND\b").expect("valid regex").split(clause) {
            if let Some(pair_cap) = EQUALITY_PAIR.captures(part) {
                out.push(ExtractedJoin {
                    table_a: resolve(&pair_cap[1], alias_map),
                    column_a: pair_cap[2].to_lowercase(),
                    table_b: resolve(&pair_cap[3], alias_map),
                    column_b: pair_cap[4].to_lowercase(),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_from_table() {
        let refs = extract_table_refs("SELECT * FROM public.employees WHERE id = 1");
        assert_eq!(refs, vec!["employees".to_string()]);
    }

    #[test]
    fn builds_alias_map_and_excludes_keyword_alias() {
        let map = extract_alias_map("SELECT * FROM employees e JOIN departments WHERE e.dept_id = 1");
        assert_eq!(map.get("e"), Some(&"employees".to_string()));
        assert!(!map.contains_key("where"));
    }

    #[test]
    fn extracts_qualified_columns() {
        let map = extract_alias_map("SELECT e.name FROM employees e");
        let (qualified, _) = extract_column_refs("SELECT e.name FROM employees e WHERE e.salary > 1000", &map);
        assert!(qualified.contains(&("e".to_string(), "name".to_string())));
        assert!(qualified.contains(&("e".to_string(), "salary".to_string())));
    }

    #[test]
    fn extracts_join_conditions_with_and_compound_on() {
        let map = extract_alias_map(
            "SELECT * FROM budgets b JOIN expenses x ON b.project_id = x.project_id AND b.dept_id = x.dept_id",
        );
        let joins = extract_join_conditions(
            "SELECT * FROM budgets b JOIN expenses x ON b.project_id = x.project_id AND b.dept_id = x.dept_id",
            &map,
        );
        assert_eq!(joins.len(), 2);
        assert_eq!(joins[0].table_a, "budgets");
        assert_eq!(joins[0].table_b, "expenses");
    }

    #[test]
    fn join_match_is_order_independent() {
        let a = ExtractedJoin {
            table_a: "budgets".to_string(),
            column_a: "project_id".to_string(),
            table_b: "projects".to_string(),
            column_b: "id".to_string(),
        };
        let b = ExtractedJoin {
            table_a: "projects".to_string(),
            column_a: "id".to_string(),
            table_b: "budgets".to_string(),
            column_b: "project_id".to_string(),
        };
        assert!(a.matches(&b));
    }
}
