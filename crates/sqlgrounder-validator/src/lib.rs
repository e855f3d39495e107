//! S6 — a tokenizer-driven static SQL gate applied to each generated
//! candidate before reranking.
//!
//! The validator never raises: every issue it finds is recorded on the
//! candidate's [`LintResult`] rather than propagated as an error.
//! Fail-fast issues eject the candidate from consideration; the request
//! itself only fails if every candidate is rejected.

#![forbid(unsafe_code)]

mod compress;
mod rules;
mod tokenizer;

pub use compress::compress_issues;
pub use tokenizer::{tokenize, NormalSpan, Token, TokenKind};

use sqlgrounder_core::{IssueSeverity, LintResult, ValidatorIssue};
use std::collections::BTreeSet;

/// Configuration the validator needs beyond `sqlgrounder_core::ValidatorConfig`:
/// the table allowlist the candidate's `FROM`/`JOIN` references are checked
/// against.
#[derive(Debug, Clone)]
pub struct ValidatorContext<'a> {
    pub allowed_tables: &'a BTreeSet<String>,
    pub max_limit: u64,
    pub max_joins: usize,
    pub require_limit: bool,
}

/// Run every validation rule in order against `sql`, returning the populated
/// [`LintResult`]. `auto_fixed_sql` is `Some` whenever any auto-fix rule
/// (trailing semicolon, `LIMIT` injection) actually changed the text.
#[must_use]
pub fn validate(sql: &str, ctx: &ValidatorContext<'_>) -> LintResult {
    let tokens = tokenize(sql);
    let mut issues: Vec<ValidatorIssue> = Vec::new();
    let mut working = sql.to_string();
    let mut fixed = false;

    rules::rule_select_first(&tokens, &mut issues);
    rules::rule_statement_count(&tokens, &mut issues);

    if rules::rule_autofix_semicolon(&mut working, &tokens) {
        fixed = true;
    }

    rules::rule_dangerous_keywords(&tokens, &mut issues);
    rules::rule_dangerous_functions(&tokens, &mut issues);
    rules::rule_table_allowlist(&tokens, ctx.allowed_tables, &mut issues);

    if ctx.require_limit {
        let working_tokens = tokenize(&working);
        if rules::rule_autofix_limit(&mut working, &working_tokens, ctx.max_limit) {
            fixed = true;
        }
    }

    // Re-tokenize once more in case the LIMIT autofix shifted offsets; the
    // join-count warning only reads the (stable) keyword count so it is safe
    // to run against the original token stream.
    rules::rule_max_joins_warning(&tokens, ctx.max_joins, &mut issues);

    let executable_safely = !issues
        .iter()
        .any(|i| i.severity == IssueSeverity::FailFast);
    let valid = !issues
        .iter()
        .any(|i| matches!(i.severity, IssueSeverity::Error | IssueSeverity::FailFast));

    let compressed_instructions = compress_issues(&issues);

    LintResult {
        issues,
        executable_safely,
        valid,
        auto_fixed_sql: if fixed { Some(working) } else { None },
        compressed_instructions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(allowed: &[&str]) -> ValidatorContext<'_> {
        // leaked for test convenience: BTreeSet must outlive the context
        Box::leak(Box::new(ValidatorContext {
            allowed_tables: Box::leak(Box::new(
                allowed.iter().map(|s| (*s).to_string()).collect::<BTreeSet<_>>(),
            )),
            max_limit: 1000,
            max_joins: 5,
            require_limit: true,
        }))
    }

    #[test]
    fn dangerous_keyword_inside_string_literal_is_invisible() {
        let sql = "SELECT 'DROP TABLE t' FROM employees LIMIT 10;";
        let result = validate(sql, ctx(&["employees"]));
        assert!(result.valid);
        assert!(!result.issues.iter().any(|i| i.code == "DANGEROUS_KEYWORD"));
    }

    #[test]
    fn multiple_statements_is_invalid() {
        let sql = "SELECT 1; SELECT 2;";
        let result = validate(sql, ctx(&[]));
        assert!(!result.valid);
        assert!(result.issues.iter().any(|i| i.code == "MULTIPLE_STATEMENTS"));
    }

    #[test]
    fn missing_limit_is_autofixed() {
        let sql = "SELECT name FROM employees";
        let result = validate(sql, ctx(&["employees"]));
        let fixed = result.auto_fixed_sql.expect("expected an autofix");
        assert!(fixed.trim_end().ends_with("LIMIT 1000;"));
    }

    #[test]
    fn non_select_start_fails() {
        let sql = "UPDATE employees SET salary = 1";
        let result = validate(sql, ctx(&["employees"]));
        assert!(!result.executable_safely);
        assert!(result.issues.iter().any(|i| i.code == "NO_SELECT"));
    }

    #[test]
    fn unknown_table_is_rewrite_error_not_fail_fast() {
        let sql = "SELECT 1 FROM secret_table LIMIT 5;";
        let result = validate(sql, ctx(&["employees"]));
        assert!(!result.valid);
        assert!(result.executable_safely);
        assert!(result.issues.iter().any(|i| i.code == "UNKNOWN_TABLE"));
    }
}
