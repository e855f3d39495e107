//! Join match (signal 2): how well the candidate's `ON` conditions line up
//! with a planned join skeleton.

use sqlgrounder_core::JoinSkeleton;

use crate::sql_extract::{extract_alias_map, extract_join_conditions, ExtractedJoin};

#[must_use]
pub fn score(sql: &str, skeletons: &[JoinSkeleton]) -> f64 {
    let alias_map = extract_alias_map(sql);
    let extracted = extract_join_conditions(sql, &alias_map);

    let plan_requires_joins = skeletons.iter().any(|s| !s.joins.is_empty());

    if skeletons.is_empty() {
        return 1.0;
    }
    if plan_requires_joins && extracted.is_empty() {
        return 0.0;
    }

    let mut best = 0.0f64;
    for skeleton in skeletons {
        if skeleton.joins.is_empty() {
            continue;
        }
        let skeleton_joins: Vec<ExtractedJoin> = skeleton
            .joins
            .iter()
            .map(|j| ExtractedJoin {
                table_a: j.from_table.to_lowercase(),
                column_a: j.from_column.to_lowercase(),
                table_b: j.to_table.to_lowercase(),
                column_b: j.to_column.to_lowercase(),
            })
            .collect();

        let matched = extracted.iter().filter(|e| skeleton_joins.iter().any(|s| e.matches(s))).count();
        let denom = extracted.len().max(skeleton_joins.len()).max(1);
        let candidate_score = matched as f64 / denom as f64;
        if candidate_score > best {
            best = candidate_score;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgrounder_core::{JoinCondition, JoinType, ScoreDetails};

    fn skeleton(joins: Vec<JoinCondition>) -> JoinSkeleton {
        JoinSkeleton {
            tables: vec![],
            joins,
            score: 0.0,
            sql_fragment: String::new(),
            score_details: ScoreDetails { hop_count: 0, semantic_alignment: 0.0, column_coverage: 0.0, combined: 0.0 },
        }
    }

    fn cond(from_t: &str, from_c: &str, to_t: &str, to_c: &str) -> JoinCondition {
        JoinCondition {
            from_table: from_t.to_string(),
            from_column: from_c.to_string(),
            to_table: to_t.to_string(),
            to_column: to_c.to_string(),
            join_type: JoinType::Inner,
        }
    }

    #[test]
    fn no_plan_scores_perfectly() {
        assert_eq!(score("SELECT * FROM employees", &[]), 1.0);
    }

    #[test]
    fn plan_requires_join_but_candidate_has_none() {
        let skeletons = vec![skeleton(vec![cond("budgets", "project_id", "projects", "id")])];
        assert_eq!(score("SELECT * FROM budgets", &skeletons), 0.0);
    }

    #[test]
    fn exact_join_match_scores_perfectly() {
        let skeletons = vec![skeleton(vec![cond("budgets", "project_id", "projects", "id")])];
        let sql = "SELECT * FROM budgets b JOIN projects p ON b.project_id = p.id";
        assert_eq!(score(sql, &skeletons), 1.0);
    }

    #[test]
    fn mismatched_join_scores_zero() {
        let skeletons = vec![skeleton(vec![cond("budgets", "project_id", "projects", "id")])];
        let sql = "SELECT * FROM budgets b JOIN departments d ON b.department_id = d.id";
        assert_eq!(score(sql, &skeletons), 0.0);
    }
}
