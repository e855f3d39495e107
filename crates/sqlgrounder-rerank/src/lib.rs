//! Candidate reranker (S7): orthogonal structural signals as additive
//! bonuses on top of whatever score the generation sidecar already assigned
//! a candidate. The reranker never rejects a candidate — every signal here
//! only nudges the final ordering.

#![forbid(unsafe_code)]

pub(crate) mod blocking;
pub(crate) mod keywords;

pub mod join_match;
pub mod result_shape;
pub mod schema_adherence;
pub mod sql_extract;
pub mod value_verification;

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use sqlgrounder_core::{JoinPlan, RerankerWeights, SchemaContextPacket, SchemaLinkBundle, SqlCandidate};

pub use schema_adherence::SchemaAdherence;
pub use value_verification::CheckableValue;

/// How many top-scoring candidates (by pre-value-verification bonus) are
/// eligible for the optional value-verification round trip.
pub const VALUE_VERIFICATION_TOP_N: usize = 2;

/// Object-safe bridge to the source database for signal 4. Implemented for
/// any `sqlmodel_core::Connection + Sync` below, so the reranker itself
/// never needs to name the concrete driver type — it only depends on this
/// crate-local trait, which keeps `rerank` usable from a plain unit test
/// without a real database connection.
pub trait ValueStore: Send + Sync {
    fn verify_values(&self, checkable: &[CheckableValue], timeout_ms: u64) -> f64;
}

impl<C> ValueStore for C
where
    C: sqlmodel_core::Connection + Sync,
{
    fn verify_values(&self, checkable: &[CheckableValue], timeout_ms: u64) -> f64 {
        value_verification::verify(self, checkable, timeout_ms)
    }
}

/// Everything the reranker needs beyond the candidate list itself:
/// `{question, schemaLinkBundle, joinPlan, schemaContext, pool?}`. `pool` is
/// optional: when absent (or when the
/// `value_verification` feature flag is off), signal 4 defaults to neutral
/// (`1.0`) for every candidate rather than running any queries.
pub struct RerankerContext<'a> {
    pub question: &'a str,
    pub schema_link_bundle: Option<&'a SchemaLinkBundle>,
    pub join_plan: Option<&'a JoinPlan>,
    pub schema_context: &'a SchemaContextPacket,
    pub pool: Option<&'a dyn ValueStore>,
    pub weights: RerankerWeights,
    pub value_verification_enabled: bool,
    pub value_verification_timeout_ms: u64,
}

/// Per-candidate diagnostic detail, returned alongside the reordered
/// candidates so prompt assembly / logging can explain a ranking decision.
#[derive(Debug, Clone, Copy)]
pub struct RerankDetail {
    pub original_index: usize,
    pub schema_adherence: SchemaAdherence,
    pub join_match: f64,
    pub result_shape: f64,
    pub value_verification: f64,
    pub bonus: f64,
}

/// The reranker's output: the reordered candidates plus one [`RerankDetail`]
/// per candidate, in the same final order as `candidates`.
pub struct RerankOutcome {
    pub candidates: Vec<SqlCandidate>,
    pub details: Vec<RerankDetail>,
}

/// Run a fallible signal; on panic (or any unexpected failure), the signal
/// is treated as neutral (`1.0`) and the pipeline continues — the reranker
/// never aborts the request over a single bonus signal.
fn best_effort<F: FnOnce() -> f64>(signal_name: &'static str, f: F) -> f64 {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(score) => score,
        Err(_) => {
            warn!(signal = signal_name, "reranker signal failed, treating as neutral");
            1.0
        }
    }
}

fn best_effort_adherence(
    sql: &str,
    packet: &SchemaContextPacket,
    bundle: Option<&SchemaLinkBundle>,
) -> SchemaAdherence {
    match catch_unwind(AssertUnwindSafe(|| schema_adherence::score(sql, packet, bundle))) {
        Ok(a) => a,
        Err(_) => {
            warn!(signal = "schema_adherence", "reranker signal failed, treating as neutral");
            SchemaAdherence { table_score: 1.0, column_score: 1.0, combined: 1.0 }
        }
    }
}

/// Reorder `candidates` by additive structural-signal bonuses. Never
/// rejects a candidate: the returned `candidates` is always a permutation
/// of the input.
#[must_use]
pub fn rerank(candidates: Vec<SqlCandidate>, ctx: &RerankerContext<'_>) -> RerankOutcome {
    let skeletons: &[sqlgrounder_core::JoinSkeleton] =
        ctx.join_plan.map(|p| p.skeletons.as_slice()).unwrap_or(&[]);

    let mut scored: Vec<(SqlCandidate, RerankDetail)> = candidates
        .into_iter()
        .map(|mut candidate| {
            let adherence = best_effort_adherence(&candidate.sql, ctx.schema_context, ctx.schema_link_bundle);
            let join = best_effort("join_match", || join_match::score(&candidate.sql, skeletons));
            let shape = best_effort("result_shape", || result_shape::score(ctx.question, &candidate.sql));

            let bonus_without_value = adherence.combined * ctx.weights.schema_adherence
                + join * ctx.weights.join_match
                + shape * ctx.weights.result_shape;

            candidate.score_breakdown.schema_adherence = adherence.combined;
            candidate.score_breakdown.join_match = join;
            candidate.score_breakdown.result_shape = shape;
            candidate.score_breakdown.value_verification = 1.0;

            let detail = RerankDetail {
                original_index: candidate.index,
                schema_adherence: adherence,
                join_match: join,
                result_shape: shape,
                value_verification: 1.0,
                bonus: bonus_without_value,
            };
            (candidate, detail)
        })
        .collect();

    // Value verification only ever touches the top-2 by pre-value bonus;
    // everyone else keeps the neutral 1.0 assigned above.
    if ctx.value_verification_enabled {
        if let Some(store) = ctx.pool {
            let mut ranked_indices: Vec<usize> = (0..scored.len()).collect();
            ranked_indices.sort_by(|&a, &b| {
                let sa = scored[a].0.score + scored[a].1.bonus;
                let sb = scored[b].0.score + scored[b].1.bonus;
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
            });

            for &idx in ranked_indices.iter().take(VALUE_VERIFICATION_TOP_N) {
                let checkable =
                    value_verification::extract_checkable_values(&scored[idx].0.sql, ctx.schema_context);
                let verified = best_effort("value_verification", || {
                    store.verify_values(&checkable, ctx.value_verification_timeout_ms)
                });
                scored[idx].0.score_breakdown.value_verification = verified;
                scored[idx].1.value_verification = verified;
                scored[idx].1.bonus += verified * ctx.weights.value_verification;
            }
        }
    }

    for (candidate, detail) in &mut scored {
        candidate.score += detail.bonus;
    }

    scored.sort_by(|a, b| {
        let score_cmp = b.0.score.partial_cmp(&a.0.score).unwrap_or(std::cmp::Ordering::Equal);
        if score_cmp != std::cmp::Ordering::Equal {
            return score_cmp;
        }
        let rejected_cmp = a.0.rejected.cmp(&b.0.rejected);
        if rejected_cmp != std::cmp::Ordering::Equal {
            return rejected_cmp;
        }
        let explain_cmp = b.0.explain_passed.cmp(&a.0.explain_passed);
        if explain_cmp != std::cmp::Ordering::Equal {
            return explain_cmp;
        }
        a.0.index.cmp(&b.0.index)
    });

    let (candidates, details): (Vec<_>, Vec<_>) = scored.into_iter().unzip();
    RerankOutcome { candidates, details }
}
