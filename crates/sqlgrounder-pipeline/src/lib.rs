//! Orchestration for the schema-grounding pipeline: module routing through
//! candidate reranking, plus the external generation sidecar call in between,
//! wired into one [`answer_question`] entry point.
//!
//! # Stage order
//! 1. Module Router (S1) — [`sqlgrounder_retrieval::module_router`]
//! 2. Hybrid Retriever (S2) — [`sqlgrounder_retrieval::hybrid_retriever`]
//! 3. FK Expander (S3) — [`sqlgrounder_retrieval::fk_expander`]
//! 4. Schema Linker (S4) — [`sqlgrounder_linker`]
//! 5. Join Planner (S5) — [`sqlgrounder_planner`]
//! 6. Generation sidecar — [`sqlgrounder_db::SidecarClient::generate_sql`]
//! 7. SQL Validator (S6) — [`sqlgrounder_validator`]
//! 8. Candidate Reranker (S7) — [`sqlgrounder_rerank`]
//!
//! Every stage records latency and error/degradation counts against
//! [`sqlgrounder_core::global_metrics`]. Error handling follows the policy
//! each stage crate already documents: optional signals degrade and warn,
//! mandatory calls propagate as a recoverable [`CoreError`], the validator
//! never raises, and the reranker is always best-effort.

#![forbid(unsafe_code)]

pub mod keywords;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use tracing::{debug, warn};

use asupersync::Cx;
use sqlgrounder_core::{
    Config, CoreError, CoreResult, JoinPlan, Module, Question, SchemaContextPacket,
    SchemaLinkBundle, SqlCandidate, TableEntry,
};
use sqlgrounder_db::{DbError, SchemaStore, SidecarClient};

/// Everything `answer_question` needs beyond the question itself.
pub struct PipelineContext<'a, S: SchemaStore> {
    pub store: &'a S,
    pub sidecar: &'a SidecarClient,
    pub config: &'a Config,
    /// Object-safe bridge to the source database for reranker signal 4.
    /// `None` runs the pipeline with value verification forced neutral,
    /// regardless of the `value_verification` feature flag.
    pub value_store: Option<&'a dyn sqlgrounder_rerank::ValueStore>,
}

/// The fully assembled result of running one question through every stage.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub query_id: String,
    pub schema_context: SchemaContextPacket,
    pub schema_link_bundle: Option<SchemaLinkBundle>,
    pub join_plan: Option<JoinPlan>,
    /// Final candidates, best first, after validation and reranking.
    pub candidates: Vec<SqlCandidate>,
}

fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros().min(u128::from(u64::MAX))).unwrap_or(u64::MAX)
}

/// Run the full pipeline for one natural-language question against one
/// database's schema. `query_id` identifies this request for tracing and the
/// sidecar's prompt-assembly context; it is not generated here since callers
/// (the CLI, a future service front end) own their own request-id scheme.
///
/// # Errors
/// Returns a [`CoreError`] whenever a mandatory stage fails irrecoverably:
/// empty question text, an unreachable rag store during retrieval, or a
/// generation sidecar that returns zero usable candidates. Optional stages
/// (module routing, lexical search, schema linking, join planning, value
/// verification) degrade to a reduced pipeline and only ever warn.
pub async fn answer_question<S: SchemaStore>(
    ctx: &PipelineContext<'_, S>,
    query_id: &str,
    database_id: &str,
    question: Question,
) -> CoreResult<AnswerOutcome> {
    if question.text.trim().is_empty() {
        return Err(CoreError::invalid_input("question text must not be empty"));
    }

    let metrics = sqlgrounder_core::global_metrics();
    let overall_start = Instant::now();
    let cx = Cx::for_request();

    let schema_context = assemble_schema_context(ctx, &cx, query_id, database_id, &question)?;

    let schema_link_bundle = if ctx.config.feature_flags.schema_linker {
        let start = Instant::now();
        let bundle = sqlgrounder_linker::link(&question, &schema_context);
        metrics.pipeline.schema_linker.record_call(elapsed_us(start), false);
        Some(bundle)
    } else {
        metrics.pipeline.schema_linker.record_degraded();
        None
    };

    let join_plan = if ctx.config.feature_flags.join_planner {
        let start = Instant::now();
        let plan = sqlgrounder_planner::plan(
            &schema_context,
            schema_link_bundle.as_ref(),
            ctx.config.hub_fk_cap,
            ctx.config.hub_fk_cap.saturating_mul(2),
            sqlgrounder_planner::DEFAULT_TOP_K,
        );
        metrics.pipeline.join_planner.record_call(elapsed_us(start), false);
        Some(plan)
    } else {
        metrics.pipeline.join_planner.record_degraded();
        None
    };

    let generated = generate_candidates(
        ctx,
        query_id,
        &question,
        &schema_context,
        schema_link_bundle.as_ref(),
        join_plan.as_ref(),
    )
    .await?;

    let validated = validate_candidates(ctx, &schema_context, generated);

    let surviving: Vec<SqlCandidate> = validated.into_iter().filter(|c| !c.rejected).collect();
    if surviving.is_empty() {
        metrics.pipeline.questions_with_no_candidate.inc();
        return Err(CoreError::validation_failed(
            "every generated candidate was rejected by the static validator",
        ));
    }

    let reranked = if ctx.config.feature_flags.reranker {
        let start = Instant::now();
        let rerank_ctx = sqlgrounder_rerank::RerankerContext {
            question: &question.text,
            schema_link_bundle: schema_link_bundle.as_ref(),
            join_plan: join_plan.as_ref(),
            schema_context: &schema_context,
            pool: if ctx.config.feature_flags.value_verification { ctx.value_store } else { None },
            weights: ctx.config.reranker_weights,
            value_verification_enabled: ctx.config.feature_flags.value_verification,
            value_verification_timeout_ms: ctx.config.timeouts.value_verification_ms,
        };
        let outcome = sqlgrounder_rerank::rerank(surviving, &rerank_ctx);
        metrics.pipeline.candidate_reranker.record_call(elapsed_us(start), false);
        outcome.candidates
    } else {
        metrics.pipeline.candidate_reranker.record_degraded();
        surviving
    };

    metrics.pipeline.question_latency_us.record(elapsed_us(overall_start));
    debug!(query_id, database_id, candidates = reranked.len(), "question answered");

    Ok(AnswerOutcome {
        query_id: query_id.to_string(),
        schema_context,
        schema_link_bundle,
        join_plan,
        candidates: reranked,
    })
}

/// Run S1 (optionally) through S3-plus-gloss-lookup, assembling one
/// [`SchemaContextPacket`]. Synchronous: the retrieval crate's stage
/// functions already bridge into the async store themselves.
fn assemble_schema_context<S: SchemaStore>(
    ctx: &PipelineContext<'_, S>,
    cx: &Cx,
    query_id: &str,
    database_id: &str,
    question: &Question,
) -> CoreResult<SchemaContextPacket> {
    let metrics = sqlgrounder_core::global_metrics();

    let module_filter: Option<BTreeSet<Module>> = if ctx.config.feature_flags.module_router {
        let start = Instant::now();
        let keyword_table: BTreeMap<Module, Vec<String>> = keywords::default_keyword_table();
        let outcome = sqlgrounder_retrieval::route_modules(
            ctx.store,
            cx,
            question,
            &keyword_table,
            ctx.config.max_modules,
        );
        metrics.pipeline.module_router.record_call(elapsed_us(start), false);
        if outcome.modules.is_empty() {
            None
        } else {
            Some(outcome.modules.into_iter().map(|m| m.module).collect())
        }
    } else {
        metrics.pipeline.module_router.record_degraded();
        None
    };

    let start = Instant::now();
    let retrieval = sqlgrounder_retrieval::retrieve_hybrid(
        ctx.store,
        cx,
        question,
        module_filter.as_ref(),
        ctx.config,
        ctx.config.feature_flags.bm25_search,
    )
    .map_err(|e: DbError| {
        metrics.pipeline.hybrid_retriever.record_call(elapsed_us(start), true);
        CoreError::from(e).with_context("query_id", query_id)
    })?;
    metrics.pipeline.hybrid_retriever.record_call(elapsed_us(start), false);

    let start = Instant::now();
    let (mut tables, hub_tables_capped) =
        sqlgrounder_retrieval::expand_fk_neighborhood(ctx.store, cx, retrieval.tables, ctx.config)
            .map_err(|e: DbError| {
                metrics.pipeline.fk_expander.record_call(elapsed_us(start), true);
                CoreError::from(e).with_context("query_id", query_id)
            })?;
    metrics.pipeline.fk_expander.record_call(elapsed_us(start), false);

    if ctx.config.feature_flags.glosses {
        attach_column_glosses(ctx.store, cx, &mut tables);
    }

    let table_names: Vec<String> = tables.iter().map(|t| t.table_name.clone()).collect();
    let fk_edges: BTreeSet<_> =
        block_on_fk_edges(ctx.store, cx, &table_names).into_iter().collect();
    let modules: BTreeSet<Module> = tables.iter().filter_map(|t| t.module.clone()).collect();

    let retrieval_meta = sqlgrounder_core::RetrievalMeta {
        candidates_considered: retrieval.candidates_considered,
        threshold_used: ctx.config.threshold,
        retrieval_count: retrieval.retrieval_count,
        fk_expansion_count: tables.len().saturating_sub(retrieval.retrieval_count),
        bm25_count: retrieval.bm25_count,
        hybrid_count: retrieval.hybrid_count,
        hub_tables_capped,
    };

    let packet = SchemaContextPacket {
        query_id: query_id.to_string(),
        database_id: database_id.to_string(),
        question: question.clone(),
        tables,
        fk_edges,
        modules,
        retrieval_meta,
    };

    if let Err(msg) = packet.check_invariants() {
        warn!(query_id, error = %msg, "schema context packet failed its own invariant check");
    }

    Ok(packet)
}

fn attach_column_glosses<S: SchemaStore>(store: &S, cx: &Cx, tables: &mut [TableEntry]) {
    for table in tables.iter_mut() {
        if !table.columns.is_empty() {
            continue;
        }
        match block_on_columns(store, cx, &table.table_name) {
            Ok(columns) => table.columns = columns,
            Err(e) => {
                warn!(table = table.table_name, error = %e, "column gloss lookup failed, table carries no columns");
            }
        }
    }
}

// The retrieval crate keeps its sync-to-async bridge private; the pipeline
// needs the same two queries for gloss attachment and FK-edge collection
// once the final table set is known, so it runs its own short-lived runtime
// the same way, per DESIGN.md.
fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    let rt = asupersync::runtime::RuntimeBuilder::current_thread()
        .build()
        .expect("failed to build current-thread runtime");
    rt.block_on(fut)
}

fn block_on_columns<S: SchemaStore>(
    store: &S,
    cx: &Cx,
    table_name: &str,
) -> sqlgrounder_db::DbResult<Vec<sqlgrounder_core::ColumnGloss>> {
    block_on(store.columns_for_table(cx, table_name))
}

fn block_on_fk_edges<S: SchemaStore>(
    store: &S,
    cx: &Cx,
    table_names: &[String],
) -> Vec<sqlgrounder_core::FkEdge> {
    match block_on(store.fk_edges_for_tables(cx, table_names)) {
        Ok(edges) => edges,
        Err(e) => {
            warn!(error = %e, "fk edge lookup for final table set failed, packet carries no joins");
            Vec::new()
        }
    }
}

/// Call the generation sidecar once. The sidecar itself owns repair/retry
/// against its own LLM calls; this boundary only surfaces its final answer
/// or propagates its failure as a recoverable [`CoreError`].
async fn generate_candidates<S: SchemaStore>(
    ctx: &PipelineContext<'_, S>,
    query_id: &str,
    question: &Question,
    schema_context: &SchemaContextPacket,
    bundle: Option<&SchemaLinkBundle>,
    join_plan: Option<&JoinPlan>,
) -> CoreResult<Vec<SqlCandidate>> {
    let start = Instant::now();

    let request = serde_json::json!({
        "question": question.text,
        "schema_context": schema_context,
        "linked_bundle": bundle,
        "join_plan": join_plan,
    });

    let response = ctx
        .sidecar
        .generate_sql(&request)
        .await
        .map_err(|e| CoreError::from(e).with_context("query_id", query_id))?;

    if response.sql_candidates.is_empty() {
        return Err(CoreError::generation_failed(
            "generation sidecar returned zero candidates",
        ));
    }

    debug!(
        query_id,
        elapsed_us = elapsed_us(start),
        candidates = response.sql_candidates.len(),
        "sidecar generation complete"
    );

    Ok(response
        .sql_candidates
        .into_iter()
        .map(|c| SqlCandidate {
            sql: c.sql,
            index: c.index,
            score: c.score,
            score_breakdown: sqlgrounder_core::ScoreBreakdown::default(),
            structural_valid: true,
            lint_result: None,
            explain_passed: true,
            rejected: false,
            rejection_reason: None,
        })
        .collect())
}

/// Run S6 against every candidate. Never fails the request: a candidate that
/// fails fast is marked `rejected` and dropped from consideration rather than
/// aborting `answer_question`.
fn validate_candidates<S: SchemaStore>(
    ctx: &PipelineContext<'_, S>,
    schema_context: &SchemaContextPacket,
    candidates: Vec<SqlCandidate>,
) -> Vec<SqlCandidate> {
    let metrics = sqlgrounder_core::global_metrics();
    let allowed_tables: BTreeSet<String> =
        schema_context.tables.iter().map(|t| t.table_name.clone()).collect();
    let validator_ctx = sqlgrounder_validator::ValidatorContext {
        allowed_tables: &allowed_tables,
        max_limit: ctx.config.validator.max_limit,
        max_joins: ctx.config.validator.max_joins,
        require_limit: ctx.config.validator.require_limit,
    };

    candidates
        .into_iter()
        .map(|mut candidate| {
            let start = Instant::now();
            let sql = candidate.sql.clone();
            let lint = sqlgrounder_validator::validate(&sql, &validator_ctx);
            metrics.pipeline.sql_validator.record_call(elapsed_us(start), !lint.valid);

            if let Some(fixed) = &lint.auto_fixed_sql {
                candidate.sql = fixed.clone();
            }
            candidate.structural_valid = lint.valid;
            candidate.rejected = !lint.executable_safely;
            if candidate.rejected {
                candidate.rejection_reason = lint
                    .issues
                    .iter()
                    .find(|i| i.severity == sqlgrounder_core::IssueSeverity::FailFast)
                    .map(|i| i.message.clone());
            }
            candidate.lint_result = Some(lint);
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgrounder_core::{ColumnGloss, FkEdge, RetrievalMeta, TableSource};
    use sqlgrounder_db::{DbResult, StoredModule, StoredTable};
    use std::future::Future;

    fn packet() -> SchemaContextPacket {
        SchemaContextPacket {
            query_id: "q1".to_string(),
            database_id: "db1".to_string(),
            question: Question { text: "how many employees are there".to_string(), question_embedding: vec![] },
            tables: vec![TableEntry {
                table_name: "employees".to_string(),
                table_schema: "public".to_string(),
                module: Some(Module("hr".to_string())),
                gloss: String::new(),
                m_schema: String::new(),
                similarity: 0.9,
                source: TableSource::Hybrid,
                is_hub: false,
                columns: vec![ColumnGloss {
                    column_name: "id".to_string(),
                    description: String::new(),
                    synonyms: BTreeSet::new(),
                    type_hint: sqlgrounder_core::TypeHint::Identifier,
                    is_pk: true,
                    is_fk: false,
                    fk_target: None,
                    data_type: "bigint".to_string(),
                }],
                fk_degree: 0,
            }],
            fk_edges: BTreeSet::new(),
            modules: BTreeSet::new(),
            retrieval_meta: RetrievalMeta::default(),
        }
    }

    struct StubStore;

    impl SchemaStore for StubStore {
        fn cosine_tables(
            &self,
            _cx: &Cx,
            _embedding: &[f32],
            _limit: usize,
        ) -> impl Future<Output = DbResult<Vec<StoredTable>>> + Send {
            async {
                Ok(vec![StoredTable {
                    table_name: "employees".to_string(),
                    table_schema: Some("public".to_string()),
                    module: Some("hr".to_string()),
                    gloss: "employee roster".to_string(),
                    m_schema: String::new(),
                    fk_degree: 0,
                    is_hub: false,
                    similarity: 0.9,
                }])
            }
        }

        fn lexical_tables(
            &self,
            _cx: &Cx,
            _terms: &[String],
            _limit: usize,
        ) -> impl Future<Output = DbResult<Vec<StoredTable>>> + Send {
            async { Ok(Vec::new()) }
        }

        fn cosine_modules(
            &self,
            _cx: &Cx,
            _embedding: &[f32],
            _limit: usize,
        ) -> impl Future<Output = DbResult<Vec<StoredModule>>> + Send {
            async { Ok(Vec::new()) }
        }

        fn columns_for_table(
            &self,
            _cx: &Cx,
            _table_name: &str,
        ) -> impl Future<Output = DbResult<Vec<ColumnGloss>>> + Send {
            async { Ok(Vec::new()) }
        }

        fn tables_by_name(
            &self,
            _cx: &Cx,
            _table_names: &[String],
        ) -> impl Future<Output = DbResult<Vec<StoredTable>>> + Send {
            async { Ok(Vec::new()) }
        }

        fn fk_edges_for_tables(
            &self,
            _cx: &Cx,
            _table_names: &[String],
        ) -> impl Future<Output = DbResult<Vec<FkEdge>>> + Send {
            async { Ok(Vec::new()) }
        }

        fn all_fk_edges(&self, _cx: &Cx) -> impl Future<Output = DbResult<Vec<FkEdge>>> + Send {
            async { Ok(Vec::new()) }
        }
    }

    #[test]
    fn empty_question_text_is_rejected_before_any_stage_runs() {
        let config = Config::default();
        let sidecar = SidecarClient::new("http://127.0.0.1:1");
        let store = StubStore;
        let ctx = PipelineContext { store: &store, sidecar: &sidecar, config: &config, value_store: None };
        let rt = asupersync::runtime::RuntimeBuilder::current_thread().build().unwrap();
        let result = rt.block_on(answer_question(
            &ctx,
            "q1",
            "db1",
            Question { text: "   ".to_string(), question_embedding: vec![] },
        ));
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
    }

    #[test]
    fn validate_candidates_rejects_fail_fast_and_keeps_others() {
        let config = Config::default();
        let sidecar = SidecarClient::new("http://127.0.0.1:1");
        let store = StubStore;
        let ctx = PipelineContext { store: &store, sidecar: &sidecar, config: &config, value_store: None };
        let p = packet();
        let candidates = vec![
            SqlCandidate {
                sql: "SELECT COUNT(*) FROM employees LIMIT 10;".to_string(),
                index: 0,
                score: 1.0,
                score_breakdown: sqlgrounder_core::ScoreBreakdown::default(),
                structural_valid: true,
                lint_result: None,
                explain_passed: true,
                rejected: false,
                rejection_reason: None,
            },
            SqlCandidate {
                sql: "DROP TABLE employees".to_string(),
                index: 1,
                score: 1.0,
                score_breakdown: sqlgrounder_core::ScoreBreakdown::default(),
                structural_valid: true,
                lint_result: None,
                explain_passed: true,
                rejected: false,
                rejection_reason: None,
            },
        ];
        let validated = validate_candidates(&ctx, &p, candidates);
        assert!(!validated[0].rejected);
        assert!(validated[1].rejected);
    }
}
