//! SQL keyword/clause vocabulary shared by the reranker's structural-signal
//! extractors. Deliberately looser than the validator's tokenizer: these
//! signals only ever add a bonus, never reject, so regex-level heuristics
//! are an acceptable trade for simplicity.

pub const SQL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "OUTER", "ON", "AND", "OR",
    "NOT", "GROUP", "BY", "ORDER", "HAVING", "LIMIT", "OFFSET", "AS", "DISTINCT", "COUNT", "SUM",
    "AVG", "MIN", "MAX", "IN", "LIKE", "IS", "NULL", "BETWEEN", "EXISTS", "UNION", "ALL", "ASC",
    "DESC", "FETCH", "NEXT", "FIRST", "ROWS", "ONLY", "WITH", "CASE", "WHEN", "THEN", "ELSE",
    "END", "TRUE", "FALSE",
];

#[must_use]
pub fn is_keyword(word: &str) -> bool {
    SQL_KEYWORDS.contains(&word.to_ascii_uppercase().as_str())
}
