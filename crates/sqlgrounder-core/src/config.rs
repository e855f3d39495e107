//! Configuration management for the schema-grounding pipeline.
//!
//! Configuration is loaded from environment variables with a project
//! `.env` fallback, in that precedence order. Numeric/string knobs use a
//! lenient boolean parser (`1/0/true/false/t/f/yes/no`, case-insensitive)
//! where a boolean knob isn't a feature flag. The seven pipeline feature
//! flags use a stricter, case-sensitive `"true"`/`"false"` parser, per the
//! external-interfaces contract — an explicit-but-malformed override falls
//! back to the compiled-in default rather than being coerced.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Where a config value was sourced from. Useful for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    ProcessEnv,
    ProjectDotenv,
    Default,
}

/// The seven pipeline feature flags, each independently toggleable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub module_router: bool,
    pub bm25_search: bool,
    pub schema_linker: bool,
    pub glosses: bool,
    pub join_planner: bool,
    pub reranker: bool,
    pub value_verification: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            module_router: true,
            bm25_search: true,
            schema_linker: true,
            glosses: true,
            join_planner: true,
            reranker: true,
            // Off by default: requires round trips against the source database.
            value_verification: false,
        }
    }
}

/// Additive bonus weights applied by the candidate reranker (S7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankerWeights {
    pub schema_adherence: f64,
    pub join_match: f64,
    pub result_shape: f64,
    pub value_verification: f64,
}

impl Default for RerankerWeights {
    fn default() -> Self {
        Self {
            schema_adherence: 15.0,
            join_match: 20.0,
            result_shape: 10.0,
            value_verification: 10.0,
        }
    }
}

/// Static SQL validator (S6) configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub max_limit: u64,
    pub max_joins: usize,
    pub require_limit: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_limit: 1000,
            max_joins: 5,
            require_limit: true,
        }
    }
}

/// Deadlines for external suspension points. Each is a default;
/// individual calls may receive a tighter deadline from the request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub embedding_ms: u64,
    pub vector_query_ms: u64,
    pub text_query_ms: u64,
    pub value_verification_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            embedding_ms: 30_000,
            vector_query_ms: 5_000,
            text_query_ms: 5_000,
            value_verification_ms: 1_000,
        }
    }
}

/// Main configuration struct for the schema-grounding pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Max results kept by the hybrid retriever (S2) before FK expansion.
    pub top_k: usize,
    /// Cosine-similarity floor for retrieval (S2).
    pub threshold: f64,
    /// Max seed tables expanded by descending similarity (S3).
    pub fk_expansion_limit: usize,
    /// Max neighbors kept per capped hub table (S3, S5).
    pub hub_fk_cap: usize,
    /// Hard cap on the number of tables in a `SchemaContextPacket`.
    pub max_tables: usize,
    /// Max modules the router (S1) may select.
    pub max_modules: usize,
    pub feature_flags: FeatureFlags,
    pub reranker_weights: RerankerWeights,
    pub validator: ValidatorConfig,
    pub timeouts: Timeouts,
    /// Generation sidecar base URL (e.g. `http://127.0.0.1:8900`).
    pub sidecar_base_url: String,
    /// Source-database / rag-store connection string.
    pub database_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            top_k: 40,
            threshold: 0.25,
            fk_expansion_limit: 10,
            hub_fk_cap: 5,
            max_tables: 40,
            max_modules: 3,
            feature_flags: FeatureFlags::default(),
            reranker_weights: RerankerWeights::default(),
            validator: ValidatorConfig::default(),
            timeouts: Timeouts::default(),
            sidecar_base_url: "http://127.0.0.1:8900".to_string(),
            database_url: "postgres://localhost/erp".to_string(),
        }
    }
}

impl Config {
    /// Build configuration from the environment, falling back to defaults
    /// for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            top_k: env_usize("SQLGROUNDER_TOP_K", defaults.top_k),
            threshold: env_f64("SQLGROUNDER_THRESHOLD", defaults.threshold),
            fk_expansion_limit: env_usize(
                "SQLGROUNDER_FK_EXPANSION_LIMIT",
                defaults.fk_expansion_limit,
            ),
            hub_fk_cap: env_usize("SQLGROUNDER_HUB_FK_CAP", defaults.hub_fk_cap),
            max_tables: env_usize("SQLGROUNDER_MAX_TABLES", defaults.max_tables),
            max_modules: env_usize("SQLGROUNDER_MAX_MODULES", defaults.max_modules),
            feature_flags: FeatureFlags {
                module_router: feature_flag_env(
                    "SQLGROUNDER_FEATURE_MODULE_ROUTER",
                    defaults.feature_flags.module_router,
                ),
                bm25_search: feature_flag_env(
                    "SQLGROUNDER_FEATURE_BM25_SEARCH",
                    defaults.feature_flags.bm25_search,
                ),
                schema_linker: feature_flag_env(
                    "SQLGROUNDER_FEATURE_SCHEMA_LINKER",
                    defaults.feature_flags.schema_linker,
                ),
                glosses: feature_flag_env(
                    "SQLGROUNDER_FEATURE_GLOSSES",
                    defaults.feature_flags.glosses,
                ),
                join_planner: feature_flag_env(
                    "SQLGROUNDER_FEATURE_JOIN_PLANNER",
                    defaults.feature_flags.join_planner,
                ),
                reranker: feature_flag_env(
                    "SQLGROUNDER_FEATURE_RERANKER",
                    defaults.feature_flags.reranker,
                ),
                value_verification: feature_flag_env(
                    "SQLGROUNDER_FEATURE_VALUE_VERIFICATION",
                    defaults.feature_flags.value_verification,
                ),
            },
            reranker_weights: RerankerWeights {
                schema_adherence: env_f64(
                    "SQLGROUNDER_WEIGHT_SCHEMA_ADHERENCE",
                    defaults.reranker_weights.schema_adherence,
                ),
                join_match: env_f64(
                    "SQLGROUNDER_WEIGHT_JOIN_MATCH",
                    defaults.reranker_weights.join_match,
                ),
                result_shape: env_f64(
                    "SQLGROUNDER_WEIGHT_RESULT_SHAPE",
                    defaults.reranker_weights.result_shape,
                ),
                value_verification: env_f64(
                    "SQLGROUNDER_WEIGHT_VALUE_VERIFICATION",
                    defaults.reranker_weights.value_verification,
                ),
            },
            validator: ValidatorConfig {
                max_limit: env_u64("SQLGROUNDER_VALIDATOR_MAX_LIMIT", defaults.validator.max_limit),
                max_joins: env_usize(
                    "SQLGROUNDER_VALIDATOR_MAX_JOINS",
                    defaults.validator.max_joins,
                ),
                require_limit: env_bool(
                    "SQLGROUNDER_VALIDATOR_REQUIRE_LIMIT",
                    defaults.validator.require_limit,
                ),
            },
            timeouts: Timeouts {
                embedding_ms: env_u64("SQLGROUNDER_TIMEOUT_EMBEDDING_MS", defaults.timeouts.embedding_ms),
                vector_query_ms: env_u64(
                    "SQLGROUNDER_TIMEOUT_VECTOR_QUERY_MS",
                    defaults.timeouts.vector_query_ms,
                ),
                text_query_ms: env_u64(
                    "SQLGROUNDER_TIMEOUT_TEXT_QUERY_MS",
                    defaults.timeouts.text_query_ms,
                ),
                value_verification_ms: env_u64(
                    "SQLGROUNDER_TIMEOUT_VALUE_VERIFICATION_MS",
                    defaults.timeouts.value_verification_ms,
                ),
            },
            sidecar_base_url: env_value("SQLGROUNDER_SIDECAR_URL")
                .unwrap_or(defaults.sidecar_base_url),
            database_url: env_value("SQLGROUNDER_DATABASE_URL").unwrap_or(defaults.database_url),
        }
    }
}

// =============================================================================
// Environment variable helpers
// =============================================================================

static DOTENV_VALUES: OnceLock<HashMap<String, String>> = OnceLock::new();

#[cfg(test)]
thread_local! {
    static TEST_ENV_OVERRIDES: std::cell::RefCell<HashMap<String, String>> =
        std::cell::RefCell::new(HashMap::new());
}

#[cfg(test)]
fn test_env_override_value(key: &str) -> Option<String> {
    TEST_ENV_OVERRIDES.with(|cell| cell.borrow().get(key).cloned())
}

#[cfg(test)]
pub fn set_test_env_override(key: &str, value: &str) {
    TEST_ENV_OVERRIDES.with(|cell| cell.borrow_mut().insert(key.to_string(), value.to_string()));
}

#[cfg(test)]
pub fn clear_test_env_overrides() {
    TEST_ENV_OVERRIDES.with(|cell| cell.borrow_mut().clear());
}

fn dotenv_values() -> &'static HashMap<String, String> {
    DOTENV_VALUES.get_or_init(|| load_dotenv_file(Path::new(".env")))
}

/// Read a value from the project `.env` file (if present).
#[must_use]
pub fn dotenv_value(key: &str) -> Option<String> {
    dotenv_values().get(key).cloned()
}

/// Read a value with precedence: process env → project `.env`.
#[must_use]
pub fn env_value(key: &str) -> Option<String> {
    #[cfg(test)]
    if let Some(v) = test_env_override_value(key) {
        return Some(v);
    }
    env::var(key).ok().or_else(|| dotenv_value(key))
}

/// Detect which tier a config key resolved from, for diagnostics.
#[must_use]
pub fn detect_source(key: &str) -> ConfigSource {
    if env::var(key).is_ok() {
        return ConfigSource::ProcessEnv;
    }
    if dotenv_value(key).is_some() {
        return ConfigSource::ProjectDotenv;
    }
    ConfigSource::Default
}

fn load_dotenv_file(path: &Path) -> HashMap<String, String> {
    let Ok(contents) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    parse_dotenv_contents(&contents)
}

fn parse_dotenv_contents(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        if let Some((key, value)) = trimmed.split_once('=') {
            let key = key.trim().to_string();
            let mut value = value.trim().to_string();
            if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
                || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
            {
                value = value[1..value.len() - 1].to_string();
            }
            map.insert(key, value);
        }
    }
    map
}

/// Lenient boolean parse for ordinary config knobs: accepts
/// `1/0/true/false/t/f/yes/no`, case-insensitively.
fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => true,
        "0" | "false" | "f" | "no" | "n" => false,
        _ => default,
    }
}

/// Strict boolean parse for the seven pipeline feature flags: only the
/// exact, case-sensitive tokens `"true"`/`"false"` are accepted. Anything
/// else (including `"True"`, `"1"`, whitespace-padded values) falls back to
/// the compiled-in default rather than being coerced, per the external
/// interfaces contract's explicit case-sensitivity requirement.
fn parse_strict_bool(value: &str, default: bool) -> bool {
    match value {
        "true" => true,
        "false" => false,
        _ => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| parse_bool(&v, default))
}

/// Resolve one feature flag: explicit env value wins (if a valid strict
/// boolean), otherwise the compiled-in default.
fn feature_flag_env(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| parse_strict_bool(&v, default))
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_value(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env_value(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_value(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.top_k, 40);
        assert!((c.threshold - 0.25).abs() < f64::EPSILON);
        assert_eq!(c.max_modules, 3);
        assert_eq!(c.validator.max_limit, 1000);
        assert_eq!(c.validator.max_joins, 5);
        assert!(c.validator.require_limit);
        assert!((c.reranker_weights.join_match - 20.0).abs() < f64::EPSILON);
        assert!(!c.feature_flags.value_verification);
    }

    #[test]
    #[serial]
    fn feature_flag_parsing_is_case_sensitive() {
        clear_test_env_overrides();
        set_test_env_override("SQLGROUNDER_FEATURE_RERANKER", "False");
        // "False" (capitalized) is not a valid strict token, so the default
        // (true) is retained rather than being coerced.
        assert!(feature_flag_env("SQLGROUNDER_FEATURE_RERANKER", true));
        set_test_env_override("SQLGROUNDER_FEATURE_RERANKER", "false");
        assert!(!feature_flag_env("SQLGROUNDER_FEATURE_RERANKER", true));
        clear_test_env_overrides();
    }

    #[test]
    #[serial]
    fn ordinary_bool_knobs_remain_lenient() {
        clear_test_env_overrides();
        set_test_env_override("SQLGROUNDER_VALIDATOR_REQUIRE_LIMIT", "YES");
        assert!(env_bool("SQLGROUNDER_VALIDATOR_REQUIRE_LIMIT", false));
        clear_test_env_overrides();
    }

    #[test]
    fn dotenv_parsing_strips_quotes_and_export_prefix() {
        let parsed = parse_dotenv_contents(
            "export SQLGROUNDER_TOP_K=50\n# comment\nSQLGROUNDER_SIDECAR_URL=\"http://x\"\n",
        );
        assert_eq!(parsed.get("SQLGROUNDER_TOP_K").unwrap(), "50");
        assert_eq!(parsed.get("SQLGROUNDER_SIDECAR_URL").unwrap(), "http://x");
    }
}
