//! Data model shared by every stage of the schema-grounding pipeline.
//!
//! These types are the value objects passed from stage to stage (`S1`
//! Module Router through `S7` Candidate Reranker). They are intentionally
//! immutable in spirit: every stage takes the prior stage's output by value
//! or shared reference and produces a new value rather than mutating in
//! place. The only shared mutable state in the pipeline lives outside these
//! types, in the planner's module-subgraph cache.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// =============================================================================
// Question
// =============================================================================

/// A natural-language question plus its dense embedding.
///
/// # Constraints
/// - `question_embedding` dimensionality is not fixed by this crate; the
///   embedding store and the generation sidecar must agree out of band
///   (typically 768).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub question_embedding: Vec<f32>,
}

// =============================================================================
// Module
// =============================================================================

/// A domain module tag, e.g. "finance", "hr", "inventory".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Module(pub String);

impl Module {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// TableSource — closed sum type, not a string
// =============================================================================

/// Where a `TableEntry` came from. Closed tag set; represented as an enum
/// rather than a free-form string so downstream matching is exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    /// Matched by cosine similarity only.
    Retrieval,
    /// Added via bounded FK-neighborhood expansion.
    FkExpansion,
    /// Matched by the lexical/full-text index only.
    Bm25,
    /// Matched by both cosine and lexical search, RRF-combined.
    Hybrid,
}

// =============================================================================
// TypeHint
// =============================================================================

/// Coarse semantic category inferred for a column from its name and SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeHint {
    Identifier,
    DateTimestamp,
    Monetary,
    Quantity,
    NameLabel,
    StatusEnum,
    TypeCategory,
    Code,
    Percentage,
    Text,
    Boolean,
    General,
}

impl std::fmt::Display for TypeHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Identifier => "identifier",
            Self::DateTimestamp => "date/timestamp",
            Self::Monetary => "monetary",
            Self::Quantity => "quantity",
            Self::NameLabel => "name/label",
            Self::StatusEnum => "status_enum",
            Self::TypeCategory => "type/category",
            Self::Code => "code",
            Self::Percentage => "percentage",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

// =============================================================================
// ColumnGloss
// =============================================================================

/// A human-readable description, synonym set, and type category for one
/// column, derived statically from its name and declared SQL type.
///
/// # Constraints
/// - `synonyms` always includes the lowercased column name itself.
/// - `fk_target` is `Some` iff `is_fk` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnGloss {
    pub column_name: String,
    pub description: String,
    pub synonyms: BTreeSet<String>,
    pub type_hint: TypeHint,
    pub is_pk: bool,
    pub is_fk: bool,
    pub fk_target: Option<FkTarget>,
    pub data_type: String,
}

/// The table/column a foreign key points at.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FkTarget {
    pub table: String,
    pub column: String,
}

// =============================================================================
// TableEntry
// =============================================================================

/// One table carried in a `SchemaContextPacket`.
///
/// `m_schema` is the compact textual encoding described in the glossary:
/// `table_name (col: type [PK] [FK→ref_table], …)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub table_name: String,
    pub table_schema: String,
    pub module: Option<Module>,
    pub gloss: String,
    pub m_schema: String,
    pub similarity: f64,
    pub source: TableSource,
    pub is_hub: bool,
    /// Per-column glosses, keyed by column name. Carries the schema linker's
    /// gloss generation output from S4 without a second lookup against the
    /// external store.
    pub columns: Vec<ColumnGloss>,
    /// FK fan-out degree, used by the hub-detection rule (`degree > 8`).
    pub fk_degree: u32,
}

impl TableEntry {
    #[must_use]
    pub fn is_hub_by_degree(&self, hub_threshold: u32) -> bool {
        self.is_hub || self.fk_degree > hub_threshold
    }
}

// =============================================================================
// FkEdge
// =============================================================================

/// A directed foreign-key edge `(from_table, from_column) → (to_table, to_column)`.
///
/// Deduplicated by the full 4-tuple when building a `SchemaContextPacket` or a
/// join-planning graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FkEdge {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

impl FkEdge {
    #[must_use]
    pub fn new(
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
        }
    }
}

// =============================================================================
// RetrievalMeta
// =============================================================================

/// Counts and diagnostics attached to a `SchemaContextPacket` for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalMeta {
    pub candidates_considered: usize,
    pub threshold_used: f64,
    pub retrieval_count: usize,
    pub fk_expansion_count: usize,
    pub bm25_count: usize,
    pub hybrid_count: usize,
    pub hub_tables_capped: Vec<String>,
}

// =============================================================================
// SchemaContextPacket
// =============================================================================

/// The packet handed from retrieval/linking/planning to the generation sidecar.
///
/// # Invariants
/// (a) every `TableEntry.table_name` is unique within `tables`;
/// (b) every endpoint of `fk_edges` names a table present in `tables`;
/// (c) cycles in the FK graph induced by `fk_edges` are legal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaContextPacket {
    pub query_id: String,
    pub database_id: String,
    pub question: Question,
    pub tables: Vec<TableEntry>,
    pub fk_edges: BTreeSet<FkEdge>,
    pub modules: BTreeSet<Module>,
    pub retrieval_meta: RetrievalMeta,
}

impl SchemaContextPacket {
    /// Validate invariants (a) and (b). Returns the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        for t in &self.tables {
            if !seen.insert(t.table_name.as_str()) {
                return Err(format!("duplicate table name in packet: {}", t.table_name));
            }
        }
        for edge in &self.fk_edges {
            if !seen.contains(edge.from_table.as_str()) {
                return Err(format!(
                    "fk_edges endpoint {} not present in packet tables",
                    edge.from_table
                ));
            }
            if !seen.contains(edge.to_table.as_str()) {
                return Err(format!(
                    "fk_edges endpoint {} not present in packet tables",
                    edge.to_table
                ));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn table_names(&self) -> BTreeSet<&str> {
        self.tables.iter().map(|t| t.table_name.as_str()).collect()
    }
}

// =============================================================================
// SchemaLinkBundle
// =============================================================================

/// A table linked to the question, with its computed relevance and a short
/// human-readable reason (e.g. "matched 'employee name'").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedTable {
    pub table: String,
    pub relevance: f64,
    pub reason: String,
}

/// A column linked within one table, with the keyphrase concept that matched it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedColumn {
    pub column: String,
    pub relevance: f64,
    pub concept: String,
}

/// An FK edge projected into prompt-friendly join-hint form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinHint {
    pub from: String,
    pub to: String,
    pub via: String,
}

/// A quoted-literal keyphrase paired with a plausible column it might filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueHint {
    pub value: String,
    pub likely_column: String,
    pub likely_table: String,
}

/// Advisory warning: the child table lacks an "important" column (date,
/// employee reference, status) that its FK parent has.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRedirect {
    pub child_table: String,
    pub parent_table: String,
    pub column: String,
    pub category: String,
    pub join_key: String,
}

/// Advisory warning: a linked table is easily confused with another and the
/// question contains one of its trigger keywords.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusableTableWarning {
    pub table: String,
    pub confuses_with: String,
    pub trigger_keyword: String,
    pub hint: String,
}

/// The schema-linking output: grounded tables, columns, join/value hints, and
/// the concepts the linker could not ground.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaLinkBundle {
    pub linked_tables: Vec<LinkedTable>,
    pub linked_columns: BTreeMap<String, Vec<LinkedColumn>>,
    pub join_hints: Vec<JoinHint>,
    pub value_hints: Vec<ValueHint>,
    pub unsupported_concepts: Vec<String>,
    pub column_redirects: Vec<ColumnRedirect>,
    pub confusable_tables: Vec<ConfusableTableWarning>,
}

impl SchemaLinkBundle {
    /// Invariant (c): every `linked_columns` key names a table present in
    /// `linked_tables`.
    pub fn check_invariants(&self) -> Result<(), String> {
        let table_names: BTreeSet<&str> =
            self.linked_tables.iter().map(|t| t.table.as_str()).collect();
        for key in self.linked_columns.keys() {
            if !table_names.contains(key.as_str()) {
                return Err(format!(
                    "linkedColumns key {key} not present in linkedTables"
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// JoinPlan
// =============================================================================

/// `INNER` or `LEFT` join type for one join condition in a skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
}

/// One emitted `ON a.c = b.c` join condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinCondition {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub join_type: JoinType,
}

/// Scoring components for one `JoinSkeleton`. Lower `combined` is better.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreDetails {
    pub hop_count: usize,
    pub semantic_alignment: f64,
    pub column_coverage: f64,
    pub combined: f64,
}

/// A connected subgraph of tables-and-joins proposed as the JOIN portion of
/// the final SQL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSkeleton {
    pub tables: Vec<String>,
    pub joins: Vec<JoinCondition>,
    pub score: f64,
    pub sql_fragment: String,
    pub score_details: ScoreDetails,
}

/// Aggregate statistics about the FK graph a `JoinPlan` was computed over.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
}

/// The Join Planner's (S5) output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinPlan {
    pub skeletons: Vec<JoinSkeleton>,
    pub graph_stats: GraphStats,
    pub cross_module_detected: bool,
    pub bridge_tables: Vec<String>,
    pub modules_used: BTreeSet<String>,
}

// =============================================================================
// SQLCandidate
// =============================================================================

/// A single generated SQL candidate flowing through validation and reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlCandidate {
    pub sql: String,
    pub index: usize,
    pub score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub structural_valid: bool,
    pub lint_result: Option<LintResult>,
    pub explain_passed: bool,
    pub rejected: bool,
    pub rejection_reason: Option<String>,
}

/// The additive bonus contributions a candidate received from the reranker.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub schema_adherence: f64,
    pub join_match: f64,
    pub result_shape: f64,
    pub value_verification: f64,
}

/// Severity of one validator issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
    /// Ejects the candidate outright; see `executableSafely`.
    FailFast,
}

/// One issue surfaced by the SQL validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorIssue {
    pub code: &'static str,
    pub message: String,
    pub severity: IssueSeverity,
}

/// The SQL validator's (S6) output for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LintResult {
    pub issues: Vec<ValidatorIssue>,
    pub executable_safely: bool,
    pub valid: bool,
    pub auto_fixed_sql: Option<String>,
    pub compressed_instructions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table(name: &str) -> TableEntry {
        TableEntry {
            table_name: name.to_string(),
            table_schema: "public".to_string(),
            module: None,
            gloss: String::new(),
            m_schema: String::new(),
            similarity: 0.5,
            source: TableSource::Retrieval,
            is_hub: false,
            columns: Vec::new(),
            fk_degree: 0,
        }
    }

    fn sample_packet(tables: Vec<TableEntry>, edges: BTreeSet<FkEdge>) -> SchemaContextPacket {
        SchemaContextPacket {
            query_id: "q1".to_string(),
            database_id: "db1".to_string(),
            question: Question {
                text: "how many employees".to_string(),
                question_embedding: vec![0.1, 0.2],
            },
            tables,
            fk_edges: edges,
            modules: BTreeSet::new(),
            retrieval_meta: RetrievalMeta::default(),
        }
    }

    #[test]
    fn packet_invariants_hold_for_consistent_packet() {
        let packet = sample_packet(
            vec![sample_table("employees"), sample_table("departments")],
            BTreeSet::from([FkEdge::new(
                "employees",
                "department_id",
                "departments",
                "id",
            )]),
        );
        assert!(packet.check_invariants().is_ok());
    }

    #[test]
    fn packet_invariants_reject_duplicate_table_names() {
        let packet = sample_packet(
            vec![sample_table("employees"), sample_table("employees")],
            BTreeSet::new(),
        );
        assert!(packet.check_invariants().is_err());
    }

    #[test]
    fn packet_invariants_reject_dangling_fk_endpoint() {
        let packet = sample_packet(
            vec![sample_table("employees")],
            BTreeSet::from([FkEdge::new(
                "employees",
                "department_id",
                "departments",
                "id",
            )]),
        );
        assert!(packet.check_invariants().is_err());
    }

    #[test]
    fn link_bundle_invariants_reject_orphan_column_key() {
        let mut bundle = SchemaLinkBundle::default();
        bundle
            .linked_columns
            .insert("ghost_table".to_string(), Vec::new());
        assert!(bundle.check_invariants().is_err());
    }

    #[test]
    fn hub_detection_honors_explicit_flag_and_degree_threshold() {
        let mut t = sample_table("orders");
        t.fk_degree = 3;
        assert!(!t.is_hub_by_degree(8));
        t.is_hub = true;
        assert!(t.is_hub_by_degree(8));
        t.is_hub = false;
        t.fk_degree = 9;
        assert!(t.is_hub_by_degree(8));
    }
}
