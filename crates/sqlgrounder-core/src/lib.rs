//! Core types, configuration, and error handling for the schema-grounding pipeline.
//!
//! This crate provides:
//! - Data models shared across every pipeline stage (`models`)
//! - Configuration management (`Config`, environment parsing) (`config`)
//! - Common error kinds (`error`)
//! - Lightweight per-stage counters (`metrics`)

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use metrics::global_metrics;
pub use models::{
    ColumnGloss, ColumnRedirect, ConfusableTableWarning, FkEdge, FkTarget, GraphStats,
    IssueSeverity, JoinCondition, JoinHint, JoinPlan, JoinSkeleton, JoinType, LintResult,
    LinkedColumn, LinkedTable, Module, Question, RetrievalMeta, SchemaContextPacket,
    SchemaLinkBundle, ScoreBreakdown, ScoreDetails, SqlCandidate, TableEntry, TableSource,
    TypeHint, ValidatorIssue, ValueHint,
};
