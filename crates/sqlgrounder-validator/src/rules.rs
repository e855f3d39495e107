//! The eight validation rules, applied in order.

use std::collections::BTreeSet;

use sqlgrounder_core::{IssueSeverity, ValidatorIssue};

use crate::tokenizer::{Token, TokenKind, TokenOrigin};

fn issue(code: &'static str, message: impl Into<String>, severity: IssueSeverity) -> ValidatorIssue {
    ValidatorIssue {
        code,
        message: message.into(),
        severity,
    }
}

fn normal_words(tokens: &[Token]) -> impl Iterator<Item = (usize, &str)> {
    tokens.iter().enumerate().filter_map(|(i, t)| match &t.kind {
        TokenKind::Word(w) if t.is_normal() => Some((i, w.as_str())),
        _ => None,
    })
}

/// Rule 1: the first NORMAL token must be `SELECT`.
pub fn rule_select_first(tokens: &[Token], issues: &mut Vec<ValidatorIssue>) {
    let first_normal = tokens.iter().find(|t| t.is_normal());
    let ok = matches!(
        first_normal.map(|t| &t.kind),
        Some(TokenKind::Word(w)) if w.eq_ignore_ascii_case("select")
    );
    if !ok {
        issues.push(issue(
            "NO_SELECT",
            "statement must begin with SELECT",
            IssueSeverity::FailFast,
        ));
    }
}

/// Rule 2: at most one NORMAL semicolon, and if present it must be followed
/// only by whitespace/comments (i.e. no further NORMAL tokens after it).
pub fn rule_statement_count(tokens: &[Token], issues: &mut Vec<ValidatorIssue>) {
    let semicolons: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_normal() && matches!(t.kind, TokenKind::Semicolon))
        .map(|(i, _)| i)
        .collect();

    if semicolons.len() > 1 {
        issues.push(issue(
            "MULTIPLE_STATEMENTS",
            format!("found {} statement-terminating semicolons, expected at most one", semicolons.len()),
            IssueSeverity::FailFast,
        ));
        return;
    }

    if let Some(&pos) = semicolons.first() {
        let trailing_normal = tokens[pos + 1..].iter().any(Token::is_normal);
        if trailing_normal {
            issues.push(issue(
                "MULTIPLE_STATEMENTS",
                "content follows the terminating semicolon",
                IssueSeverity::FailFast,
            ));
        }
    }
}

/// Rule 3: if there is no trailing semicolon, append one. Returns whether the
/// string was changed.
pub fn rule_autofix_semicolon(working: &mut String, tokens: &[Token]) -> bool {
    let has_semicolon = tokens
        .iter()
        .any(|t| t.is_normal() && matches!(t.kind, TokenKind::Semicolon));
    if has_semicolon {
        return false;
    }
    let trimmed_end = working.trim_end();
    *working = format!("{trimmed_end};");
    true
}

const DDL_KEYWORDS: &[&str] = &["DROP", "CREATE", "ALTER", "TRUNCATE", "RENAME"];
const DML_WRITE_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE"];
const DCL_KEYWORDS: &[&str] = &["GRANT", "REVOKE"];
const TCL_KEYWORDS: &[&str] = &["BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT"];
const OTHER_DANGEROUS_KEYWORDS: &[&str] = &["COPY", "EXECUTE", "PREPARE"];

/// Rule 4: whole-word, case-insensitive dangerous-keyword scan over NORMAL
/// tokens only.
pub fn rule_dangerous_keywords(tokens: &[Token], issues: &mut Vec<ValidatorIssue>) {
    for (_, word) in normal_words(tokens) {
        let upper = word.to_ascii_uppercase();
        let hit = DDL_KEYWORDS
            .iter()
            .chain(DML_WRITE_KEYWORDS)
            .chain(DCL_KEYWORDS)
            .chain(TCL_KEYWORDS)
            .chain(OTHER_DANGEROUS_KEYWORDS)
            .find(|&&kw| kw == upper);
        if let Some(kw) = hit {
            issues.push(issue(
                "DANGEROUS_KEYWORD",
                format!("disallowed keyword `{kw}`"),
                IssueSeverity::FailFast,
            ));
        }
    }
}

const DANGEROUS_FUNCTION_PREFIXES: &[&str] = &[
    "pg_read_file",
    "pg_ls_dir",
    "lo_export",
    "lo_import",
    "pg_sleep",
    "pg_terminate_backend",
    "pg_cancel_backend",
    "dblink",
    "pg_reload_conf",
];

/// Rule 5: an identifier immediately followed by `(` in NORMAL territory,
/// matched against the dangerous-function list (prefix match so `dblink_connect`
/// etc. are caught by the `dblink` entry).
pub fn rule_dangerous_functions(tokens: &[Token], issues: &mut Vec<ValidatorIssue>) {
    let words: Vec<(usize, &str)> = normal_words(tokens).collect();
    for (idx, word) in words {
        let Some(next) = tokens.get(idx + 1) else { continue };
        if !(next.is_normal() && matches!(next.kind, TokenKind::LParen)) {
            continue;
        }
        let lower = word.to_ascii_lowercase();
        if DANGEROUS_FUNCTION_PREFIXES
            .iter()
            .any(|prefix| lower.starts_with(prefix))
        {
            issues.push(issue(
                "DANGEROUS_FUNCTION",
                format!("disallowed function call `{word}(`"),
                IssueSeverity::FailFast,
            ));
        }
    }
}

/// One name extracted from a `FROM`/`JOIN` clause, already lowercased with
/// any schema prefix stripped.
fn extract_table_names(tokens: &[Token]) -> Vec<String> {
    let mut names = Vec::new();
    let mut i = 0usize;
    while i < tokens.len() {
        let is_from_or_join = tokens[i].is_normal()
            && matches!(&tokens[i].kind, TokenKind::Word(w) if w.eq_ignore_ascii_case("from") || w.eq_ignore_ascii_case("join"));
        if !is_from_or_join {
            i += 1;
            continue;
        }
        // Walk `schema.table` or `"quoted"` starting at i + 1.
        let mut j = i + 1;
        let mut parts: Vec<String> = Vec::new();
        loop {
            let Some(tok) = tokens.get(j) else { break };
            match &tok.kind {
                TokenKind::Word(w) if tok.is_normal() => {
                    parts.push(w.to_ascii_lowercase());
                    j += 1;
                }
                TokenKind::QuotedIdent(s) => {
                    parts.push(s.to_ascii_lowercase());
                    j += 1;
                }
                TokenKind::Dot if tok.is_normal() => {
                    j += 1;
                }
                _ => break,
            }
            // Stop after consuming one `ident(.ident)?` group; a further
            // dot would be a third identifier segment, which SQL table refs
            // never have (schema.table is the deepest).
            if !matches!(tokens.get(j).map(|t| &t.kind), Some(TokenKind::Dot)) {
                break;
            }
        }
        if let Some(last) = parts.pop() {
            names.push(last);
        }
        i += 1;
    }
    names
}

/// Rule 6: every name extracted by [`extract_table_names`] must be present
/// in `allowed` (already lowercased, unqualified).
pub fn rule_table_allowlist(tokens: &[Token], allowed: &BTreeSet<String>, issues: &mut Vec<ValidatorIssue>) {
    let mut seen = BTreeSet::new();
    for name in extract_table_names(tokens) {
        if seen.insert(name.clone()) && !allowed.contains(&name) {
            issues.push(issue(
                "UNKNOWN_TABLE",
                format!("table `{name}` is not in the grounded schema context"),
                IssueSeverity::Error,
            ));
        }
    }
}

fn has_limit_or_fetch(tokens: &[Token]) -> bool {
    for (i, word) in normal_words(tokens) {
        if word.eq_ignore_ascii_case("limit") {
            return true;
        }
        if word.eq_ignore_ascii_case("fetch") {
            let rest: Vec<&str> = tokens[i + 1..]
                .iter()
                .filter(|t| t.is_normal())
                .filter_map(|t| match &t.kind {
                    TokenKind::Word(w) => Some(w.as_str()),
                    _ => None,
                })
                .take(2)
                .collect();
            if rest.first().is_some_and(|w| w.eq_ignore_ascii_case("first"))
                || rest.first().is_some_and(|w| w.eq_ignore_ascii_case("next"))
            {
                return true;
            }
        }
    }
    false
}

/// Rule 7: if `require_limit` and no `LIMIT`/`FETCH FIRST|NEXT` is present,
/// append `LIMIT max_limit` before the terminating semicolon. Returns
/// whether the string was changed.
pub fn rule_autofix_limit(working: &mut String, tokens: &[Token], max_limit: u64) -> bool {
    if has_limit_or_fetch(tokens) {
        return false;
    }
    let trimmed = working.trim_end();
    let without_semi = trimmed.strip_suffix(';').unwrap_or(trimmed);
    *working = format!("{without_semi} LIMIT {max_limit};");
    true
}

/// Rule 8 (non-fatal warning): JOIN count exceeds `max_joins`.
pub fn rule_max_joins_warning(tokens: &[Token], max_joins: usize, issues: &mut Vec<ValidatorIssue>) {
    let join_count = normal_words(tokens)
        .filter(|(_, w)| w.eq_ignore_ascii_case("join"))
        .count();
    if join_count > max_joins {
        issues.push(issue(
            "TOO_MANY_JOINS",
            format!("{join_count} joins exceeds the configured maximum of {max_joins}"),
            IssueSeverity::Warning,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    #[test]
    fn extracts_schema_qualified_and_quoted_table_names() {
        let tokens = tokenize(r#"SELECT * FROM public.employees JOIN "Departments" d ON 1=1"#);
        let names = extract_table_names(&tokens);
        assert_eq!(names, vec!["employees".to_string(), "departments".to_string()]);
    }

    #[test]
    fn fetch_first_counts_as_limit() {
        let tokens = tokenize("SELECT 1 FROM t FETCH FIRST 10 ROWS ONLY");
        assert!(has_limit_or_fetch(&tokens));
    }

    #[test]
    fn dblink_prefix_catches_variants() {
        let tokens = tokenize("SELECT dblink_connect('x')");
        let mut issues = Vec::new();
        rule_dangerous_functions(&tokens, &mut issues);
        assert!(issues.iter().any(|i| i.code == "DANGEROUS_FUNCTION"));
    }

    #[test]
    fn too_many_joins_warns_not_fails() {
        let sql = "SELECT 1 FROM a JOIN b ON 1=1 JOIN c ON 1=1 JOIN d ON 1=1 JOIN e ON 1=1 JOIN f ON 1=1 JOIN g ON 1=1";
        let tokens = tokenize(sql);
        let mut issues = Vec::new();
        rule_max_joins_warning(&tokens, 5, &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, IssueSeverity::Warning);
    }
}
