//! Column match scoring: score one keyphrase against one column
//! gloss across three orthogonal signals and keep the best.

use sqlgrounder_core::ColumnGloss;

/// Matches ≥ this score are kept as a grounding.
pub const MATCH_THRESHOLD: f64 = 0.5;

fn tiered_match(phrase: &str, candidate: &str, prefix_min_len: usize, substring_min_len: Option<usize>) -> Option<f64> {
    if phrase == candidate {
        return Some(1.0);
    }
    if phrase.len() >= prefix_min_len && candidate.starts_with(phrase) {
        return Some(0.8);
    }
    if let Some(min_len) = substring_min_len {
        if phrase.len() >= min_len && candidate.contains(phrase) {
            return Some(0.7);
        }
    }
    None
}

fn column_tokens(column_name: &str) -> impl Iterator<Item = String> + '_ {
    column_name.split('_').filter(|t| !t.is_empty()).map(str::to_lowercase)
}

/// Score `phrase` (already lowercased, neither quoted nor numeric) against
/// one column's gloss:
/// (a) gloss-synonym exact=1.0, prefix(len≥3)=0.8, substring(len≥4)=0.7;
/// (b) snake-case column-token exact=1.0, prefix(len≥3)=0.8;
/// (c) typeHint substring(len≥3)=0.5.
#[must_use]
pub fn score_keyphrase_column(phrase: &str, gloss: &ColumnGloss) -> f64 {
    let mut best = 0.0f64;

    for synonym in &gloss.synonyms {
        if let Some(score) = tiered_match(phrase, synonym, 3, Some(4)) {
            best = best.max(score);
        }
    }

    for token in column_tokens(&gloss.column_name) {
        if let Some(score) = tiered_match(phrase, &token, 3, None) {
            best = best.max(score);
        }
    }

    let hint_str = gloss.type_hint.to_string().to_lowercase();
    if phrase.len() >= 3 && hint_str.contains(phrase) {
        best = best.max(0.5);
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgrounder_core::TypeHint;
    use std::collections::BTreeSet;

    fn gloss(column_name: &str, type_hint: TypeHint, synonyms: &[&str]) -> ColumnGloss {
        ColumnGloss {
            column_name: column_name.to_string(),
            description: String::new(),
            synonyms: synonyms.iter().map(|s| (*s).to_string()).collect::<BTreeSet<_>>(),
            type_hint,
            is_pk: false,
            is_fk: false,
            fk_target: None,
            data_type: "text".to_string(),
        }
    }

    #[test]
    fn exact_synonym_match_scores_one() {
        let g = gloss("emp_name", TypeHint::NameLabel, &["employee", "name", "emp_name", "emp"]);
        assert!((score_keyphrase_column("employee", &g) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn prefix_match_scores_point_eight() {
        let g = gloss("department_id", TypeHint::Identifier, &["department", "dept", "department_id"]);
        assert!((score_keyphrase_column("depart", &g) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn typehint_substring_scores_point_five() {
        let g = gloss("created_at", TypeHint::DateTimestamp, &["created", "at", "created_at"]);
        assert!((score_keyphrase_column("date", &g) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn below_threshold_scores_zero() {
        let g = gloss("region_code", TypeHint::Code, &["region", "code", "region_code"]);
        assert!(score_keyphrase_column("zzz", &g) < MATCH_THRESHOLD);
    }
}
