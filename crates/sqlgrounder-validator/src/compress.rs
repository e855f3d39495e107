//! Issue compression: map each validator issue code to a short
//! imperative repair instruction, deduplicated while preserving first-seen
//! order, for the sidecar's `/repair_sql` prompt.

use std::collections::BTreeSet;

use sqlgrounder_core::ValidatorIssue;

fn instruction_for(code: &str) -> &'static str {
    match code {
        "NO_SELECT" => "Rewrite as a single SELECT statement.",
        "MULTIPLE_STATEMENTS" => "Emit exactly one statement, with nothing after its terminating semicolon.",
        "DANGEROUS_KEYWORD" => "Remove any DDL/DML-write/DCL/TCL keywords; only read-only SELECTs are allowed.",
        "DANGEROUS_FUNCTION" => "Remove the call to the disallowed administrative function.",
        "UNKNOWN_TABLE" => "Reference only tables present in the grounded schema context.",
        "TOO_MANY_JOINS" => "Reduce the number of JOINs or confirm they are all necessary.",
        _ => "Revise the SQL to resolve the reported issue.",
    }
}

/// Deduplicate (by code, preserving first-seen order) and translate each
/// issue into one short imperative instruction.
#[must_use]
pub fn compress_issues(issues: &[ValidatorIssue]) -> Vec<String> {
    let mut seen_codes: BTreeSet<&'static str> = BTreeSet::new();
    let mut out = Vec::new();
    for issue in issues {
        if seen_codes.insert(issue.code) {
            out.push(instruction_for(issue.code).to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgrounder_core::IssueSeverity;

    #[test]
    fn dedups_repeated_codes_preserving_order() {
        let issues = vec![
            ValidatorIssue { code: "UNKNOWN_TABLE", message: "a".into(), severity: IssueSeverity::Error },
            ValidatorIssue { code: "NO_SELECT", message: "b".into(), severity: IssueSeverity::FailFast },
            ValidatorIssue { code: "UNKNOWN_TABLE", message: "c".into(), severity: IssueSeverity::Error },
        ];
        let compressed = compress_issues(&issues);
        assert_eq!(compressed.len(), 2);
        assert!(compressed[0].contains("tables present"));
    }
}
