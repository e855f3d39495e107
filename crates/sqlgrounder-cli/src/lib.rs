//! CLI front end for the schema-grounding pipeline (`sqlgrounder` binary).
//!
//! Commands:
//! - `ask` — run a natural-language question through the full pipeline
//!   (S1 module routing through S7 candidate reranking) against a rag
//!   store and a generation sidecar, and print the winning SQL.
//! - `validate` — run the S6 static SQL gate against one statement without
//!   the rest of the pipeline, useful for iterating on a hand-written
//!   candidate or a sidecar's `/repair_sql` output.
//! - `health` — probe the generation sidecar's `/health` endpoint.
//! - `config` — print the effective configuration (env overrides applied
//!   over the compiled-in defaults).
//!
//! Every command's failure path prints the `{error_kind, recoverable,
//! hint}` surface rather than a raw backend message.

#![forbid(unsafe_code)]

pub mod output;

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Args, Parser, Subcommand};
use sha2::{Digest, Sha256};

use sqlgrounder_core::{Config, CoreError, Question};
use sqlgrounder_db::{DbError, SidecarClient, SourcePool, SourcePoolConfig, SqlSchemaStore, DB_CIRCUIT};
use sqlmodel_sqlite::SqliteConnection;

use output::{json_or_table, CliTable};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("{0}")]
    Db(#[from] DbError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "sqlgrounder",
    version,
    about = "Turns a natural-language question into a grounded SQL SELECT"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Emit machine-readable JSON instead of a formatted table.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a question through the full grounding pipeline and print the
    /// winning SQL candidate.
    Ask(AskArgs),
    /// Run the static SQL validator (S6) against one statement, independent
    /// of retrieval, linking, or planning.
    Validate(ValidateArgs),
    /// Probe the generation sidecar's health endpoint.
    Health(HealthArgs),
    /// Print the effective configuration (environment overrides applied
    /// over compiled-in defaults).
    Config,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// The natural-language question.
    question: String,

    /// Which database's schema to ground against.
    #[arg(long = "database-id")]
    database_id: String,

    /// Rag-store connection string. Accepts `sqlite:///path/to/file.db` or
    /// a bare filesystem path; `sqlite:///:memory:` opens an in-memory
    /// database. Falls back to `SQLGROUNDER_DATABASE_URL` / the compiled
    /// default when omitted.
    #[arg(long = "database-url")]
    database_url: Option<String>,

    /// Generation sidecar base URL, e.g. `http://127.0.0.1:8900`. Falls
    /// back to `SQLGROUNDER_SIDECAR_URL` / the compiled default.
    #[arg(long = "sidecar-url")]
    sidecar_url: Option<String>,

    /// Embedding model name passed through to the sidecar's `/embed`.
    #[arg(long = "embed-model", default_value = "default")]
    embed_model: String,

    /// Print only the top candidate's SQL, nothing else.
    #[arg(long = "sql-only")]
    sql_only: bool,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// The SQL statement to validate.
    #[arg(long)]
    sql: String,

    /// A table the statement is allowed to reference; repeat for more than
    /// one. With none given, any `FROM`/`JOIN` table reference fails the
    /// allowlist rule.
    #[arg(long = "table")]
    tables: Vec<String>,

    #[arg(long = "max-limit", default_value_t = 1000)]
    max_limit: u64,

    #[arg(long = "max-joins", default_value_t = 5)]
    max_joins: usize,

    #[arg(long = "require-limit", default_value_t = true)]
    require_limit: bool,
}

#[derive(Args, Debug)]
struct HealthArgs {
    #[arg(long = "sidecar-url")]
    sidecar_url: Option<String>,
}

/// Entry point for `main`; returns the process exit code.
#[must_use]
pub fn run() -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Ask(args) => cmd_ask(args, cli.json),
        Command::Validate(args) => cmd_validate(args, cli.json),
        Command::Health(args) => cmd_health(args, cli.json),
        Command::Config => cmd_config(cli.json),
    };

    match result {
        Ok(()) => 0,
        Err(CliError::InvalidArgument(msg)) => {
            eprintln!("invalid argument: {msg}");
            2
        }
        Err(CliError::Core(e)) => {
            print_core_error(&e, cli.json);
            1
        }
        Err(CliError::Db(e)) => {
            print_core_error(&CoreError::from(e), cli.json);
            1
        }
    }
}

fn print_core_error(err: &CoreError, json: bool) {
    let payload = serde_json::json!({
        "error_kind": err.kind(),
        "recoverable": err.is_recoverable(),
        "hint": err.hint(),
    });
    if json {
        println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
    } else {
        eprintln!("error ({}): {}", err.kind(), err.hint());
        if err.is_recoverable() {
            eprintln!("this looks transient; retrying may help");
        }
    }
}

// ── ask ──────────────────────────────────────────────────────────────────

fn cmd_ask(args: &AskArgs, json: bool) -> Result<(), CliError> {
    let mut config = Config::from_env();
    if let Some(url) = &args.database_url {
        config.database_url = url.clone();
    }
    if let Some(url) = &args.sidecar_url {
        config.sidecar_base_url = url.clone();
    }

    let rt = asupersync::runtime::RuntimeBuilder::current_thread()
        .build()
        .map_err(|e| CliError::InvalidArgument(format!("failed to start runtime: {e}")))?;

    rt.block_on(run_ask(args, &config, json))
}

async fn run_ask(args: &AskArgs, config: &Config, json: bool) -> Result<(), CliError> {
    let cx = asupersync::Cx::for_request();

    let database_url = config.database_url.clone();
    let pool_config = SourcePoolConfig::new(database_url.clone());
    let pool: SourcePool<SqliteConnection> = SourcePool::new(
        &pool_config,
        "rag_store",
        &DB_CIRCUIT,
        move || {
            let path = sqlite_path_from_url(&database_url);
            async move {
                match SqliteConnection::open_file(&path) {
                    Ok(conn) => asupersync::Outcome::Ok(conn),
                    Err(e) => asupersync::Outcome::Err(e),
                }
            }
        },
    );

    let conn = pool.acquire(&cx).await?;
    let store = SqlSchemaStore::new(&*conn);
    let sidecar = SidecarClient::new(config.sidecar_base_url.clone());

    let embed = sidecar
        .embed(&args.question, &args.embed_model)
        .await
        .map_err(CoreError::from)?;

    let question = Question { text: args.question.clone(), question_embedding: embed.embedding };
    let query_id = new_query_id(&args.question, &args.database_id);

    let ctx = sqlgrounder_pipeline::PipelineContext {
        store: &store,
        sidecar: &sidecar,
        config,
        value_store: None,
    };

    let outcome =
        sqlgrounder_pipeline::answer_question(&ctx, &query_id, &args.database_id, question).await?;

    if args.sql_only {
        if let Some(best) = outcome.candidates.first() {
            println!("{}", best.sql);
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&AskReport::from(&outcome)).unwrap_or_default());
        return Ok(());
    }

    print_ask_report(&outcome);
    Ok(())
}

#[derive(serde::Serialize)]
struct AskReport {
    query_id: String,
    database_id: String,
    tables: Vec<String>,
    modules: Vec<String>,
    candidates: usize,
    best_sql: Option<String>,
    best_score: Option<f64>,
}

impl From<&sqlgrounder_pipeline::AnswerOutcome> for AskReport {
    fn from(outcome: &sqlgrounder_pipeline::AnswerOutcome) -> Self {
        Self {
            query_id: outcome.query_id.clone(),
            database_id: outcome.schema_context.database_id.clone(),
            tables: outcome.schema_context.tables.iter().map(|t| t.table_name.clone()).collect(),
            modules: outcome.schema_context.modules.iter().map(ToString::to_string).collect(),
            candidates: outcome.candidates.len(),
            best_sql: outcome.candidates.first().map(|c| c.sql.clone()),
            best_score: outcome.candidates.first().map(|c| c.score),
        }
    }
}

fn print_ask_report(outcome: &sqlgrounder_pipeline::AnswerOutcome) {
    let packet = &outcome.schema_context;
    println!("query_id:     {}", outcome.query_id);
    println!("database_id:  {}", packet.database_id);
    println!(
        "tables:       {} ({} from retrieval, {} from fk expansion, {} hybrid, {} bm25-only)",
        packet.tables.len(),
        packet.retrieval_meta.retrieval_count,
        packet.retrieval_meta.fk_expansion_count,
        packet.retrieval_meta.hybrid_count,
        packet.retrieval_meta.bm25_count,
    );
    if !packet.retrieval_meta.hub_tables_capped.is_empty() {
        println!("hub tables capped: {}", packet.retrieval_meta.hub_tables_capped.join(", "));
    }
    if let Some(plan) = &outcome.join_plan {
        println!(
            "join plan:    {} skeleton(s) over {} tables / {} edges{}",
            plan.skeletons.len(),
            plan.graph_stats.nodes,
            plan.graph_stats.edges,
            if plan.cross_module_detected { ", cross-module" } else { "" },
        );
    }
    println!();

    let mut table = CliTable::new(vec!["#", "SCORE", "VALID", "REJECTED", "SQL"]);
    for candidate in &outcome.candidates {
        table.add_row(vec![
            candidate.index.to_string(),
            format!("{:.2}", candidate.score),
            candidate.structural_valid.to_string(),
            candidate.rejected.to_string(),
            truncate(&candidate.sql, 80),
        ]);
    }
    table.render();

    if let Some(best) = outcome.candidates.first() {
        println!();
        println!("-- best candidate --");
        println!("{}", best.sql);
    }
}

fn truncate(s: &str, max: usize) -> String {
    let collapsed: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() <= max {
        collapsed
    } else {
        format!("{}…", &collapsed[..max])
    }
}

/// `sqlite:///path`, `sqlite:///:memory:`, or a bare path.
fn sqlite_path_from_url(database_url: &str) -> String {
    for prefix in ["sqlite:///", "sqlite://"] {
        if let Some(rest) = database_url.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    database_url.to_string()
}

fn new_query_id(question: &str, database_id: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(question.as_bytes());
    hasher.update([0u8]);
    hasher.update(database_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(nanos.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

// ── validate ─────────────────────────────────────────────────────────────

fn cmd_validate(args: &ValidateArgs, json: bool) -> Result<(), CliError> {
    let allowed_tables: BTreeSet<String> = args.tables.iter().map(|t| t.to_lowercase()).collect();
    let ctx = sqlgrounder_validator::ValidatorContext {
        allowed_tables: &allowed_tables,
        max_limit: args.max_limit,
        max_joins: args.max_joins,
        require_limit: args.require_limit,
    };
    let lint = sqlgrounder_validator::validate(&args.sql, &ctx);

    json_or_table(json, &lint, || {
        println!("valid:              {}", lint.valid);
        println!("executable_safely:  {}", lint.executable_safely);
        if let Some(fixed) = &lint.auto_fixed_sql {
            println!("auto_fixed_sql:     {fixed}");
        }
        if lint.issues.is_empty() {
            println!("issues:             none");
        } else {
            let mut table = CliTable::new(vec!["SEVERITY", "CODE", "MESSAGE"]);
            for issue in &lint.issues {
                table.add_row(vec![
                    format!("{:?}", issue.severity),
                    issue.code.to_string(),
                    issue.message.clone(),
                ]);
            }
            table.render();
        }
    });
    Ok(())
}

// ── health ───────────────────────────────────────────────────────────────

fn cmd_health(args: &HealthArgs, json: bool) -> Result<(), CliError> {
    let config = Config::from_env();
    let sidecar_url = args.sidecar_url.clone().unwrap_or(config.sidecar_base_url);

    let rt = asupersync::runtime::RuntimeBuilder::current_thread()
        .build()
        .map_err(|e| CliError::InvalidArgument(format!("failed to start runtime: {e}")))?;

    let client = SidecarClient::new(sidecar_url.clone());
    let result = rt.block_on(client.health());

    match result {
        Ok(()) => {
            if json {
                println!("{}", serde_json::json!({ "sidecar_url": sidecar_url, "healthy": true }));
            } else {
                println!("{sidecar_url}: healthy");
            }
            Ok(())
        }
        Err(e) => Err(CliError::from(e)),
    }
}

// ── config ───────────────────────────────────────────────────────────────

fn cmd_config(json: bool) -> Result<(), CliError> {
    let config = Config::from_env();
    let flags = &config.feature_flags;

    if json {
        let payload = serde_json::json!({
            "top_k": config.top_k,
            "threshold": config.threshold,
            "fk_expansion_limit": config.fk_expansion_limit,
            "hub_fk_cap": config.hub_fk_cap,
            "max_tables": config.max_tables,
            "max_modules": config.max_modules,
            "feature_flags": {
                "module_router": flags.module_router,
                "bm25_search": flags.bm25_search,
                "schema_linker": flags.schema_linker,
                "glosses": flags.glosses,
                "join_planner": flags.join_planner,
                "reranker": flags.reranker,
                "value_verification": flags.value_verification,
            },
            "reranker_weights": {
                "schema_adherence": config.reranker_weights.schema_adherence,
                "join_match": config.reranker_weights.join_match,
                "result_shape": config.reranker_weights.result_shape,
                "value_verification": config.reranker_weights.value_verification,
            },
            "validator": {
                "max_limit": config.validator.max_limit,
                "max_joins": config.validator.max_joins,
                "require_limit": config.validator.require_limit,
            },
            "sidecar_base_url": config.sidecar_base_url,
            "database_url": config.database_url,
        });
        println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
        return Ok(());
    }

    let mut table = CliTable::new(vec!["KEY", "VALUE"]);
    table.add_row(vec!["top_k".into(), config.top_k.to_string()]);
    table.add_row(vec!["threshold".into(), config.threshold.to_string()]);
    table.add_row(vec!["fk_expansion_limit".into(), config.fk_expansion_limit.to_string()]);
    table.add_row(vec!["hub_fk_cap".into(), config.hub_fk_cap.to_string()]);
    table.add_row(vec!["max_tables".into(), config.max_tables.to_string()]);
    table.add_row(vec!["max_modules".into(), config.max_modules.to_string()]);
    table.add_row(vec!["module_router".into(), flags.module_router.to_string()]);
    table.add_row(vec!["bm25_search".into(), flags.bm25_search.to_string()]);
    table.add_row(vec!["schema_linker".into(), flags.schema_linker.to_string()]);
    table.add_row(vec!["glosses".into(), flags.glosses.to_string()]);
    table.add_row(vec!["join_planner".into(), flags.join_planner.to_string()]);
    table.add_row(vec!["reranker".into(), flags.reranker.to_string()]);
    table.add_row(vec!["value_verification".into(), flags.value_verification.to_string()]);
    table.add_row(vec!["validator.max_limit".into(), config.validator.max_limit.to_string()]);
    table.add_row(vec!["validator.max_joins".into(), config.validator.max_joins.to_string()]);
    table.add_row(vec!["validator.require_limit".into(), config.validator.require_limit.to_string()]);
    table.add_row(vec!["sidecar_base_url".into(), config.sidecar_base_url.clone()]);
    table.add_row(vec!["database_url".into(), config.database_url.clone()]);
    table.render();
    Ok(())
}
