//! The rag schema/vector store: the relational tables that back table and
//! module retrieval (S1/S2) and FK-edge lookup (S3).
//!
//! Layout (per `rag.*`):
//! - `rag.schema_tables(table_name, table_schema, module, gloss, m_schema, fk_degree, is_hub)`
//! - `rag.schema_columns(table_name, column_name, description, synonyms, type_hint, is_pk, is_fk, fk_table, fk_column, data_type)`
//! - `rag.schema_embeddings(table_name, embedding)` — cosine-searchable table embeddings
//! - `rag.schema_fks(from_table, from_column, to_table, to_column)`
//! - `rag.module_embeddings(module, embedding)` — module centroid embeddings for S1
//!
//! This module speaks only in terms of `sqlmodel_core::Connection` so it has
//! no opinion on which concrete driver backs the store.

use crate::error::{DbError, DbResult};
use asupersync::{Cx, Outcome};
use sqlmodel_core::{Connection, Row as SqlRow, Value};
use sqlmodel_query::raw_query;
use sqlgrounder_core::{ColumnGloss, FkEdge, FkTarget, TypeHint};
use std::future::Future;

/// A table row retrieved from `rag.schema_tables` joined against its embedding.
#[derive(Debug, Clone)]
pub struct StoredTable {
    pub table_name: String,
    pub table_schema: Option<String>,
    pub module: Option<String>,
    pub gloss: String,
    pub m_schema: String,
    pub fk_degree: u32,
    pub is_hub: bool,
    pub similarity: f64,
}

/// A module centroid row retrieved from `rag.module_embeddings`.
#[derive(Debug, Clone)]
pub struct StoredModule {
    pub module: String,
    pub similarity: f64,
}

/// Queries against the rag schema/vector store, independent of the backing
/// SQL driver. One implementation is provided: [`SqlSchemaStore`], which
/// issues raw SQL over any `Connection`.
pub trait SchemaStore: Send + Sync {
    /// Cosine-nearest tables to `embedding`, ordered by similarity desc.
    fn cosine_tables(
        &self,
        cx: &Cx,
        embedding: &[f32],
        limit: usize,
    ) -> impl Future<Output = DbResult<Vec<StoredTable>>> + Send;

    /// Lexical (BM25-style) match against table/column glosses for `terms`.
    fn lexical_tables(
        &self,
        cx: &Cx,
        terms: &[String],
        limit: usize,
    ) -> impl Future<Output = DbResult<Vec<StoredTable>>> + Send;

    /// Module centroids nearest `embedding`.
    fn cosine_modules(
        &self,
        cx: &Cx,
        embedding: &[f32],
        limit: usize,
    ) -> impl Future<Output = DbResult<Vec<StoredModule>>> + Send;

    /// Column glosses for one table.
    fn columns_for_table(
        &self,
        cx: &Cx,
        table_name: &str,
    ) -> impl Future<Output = DbResult<Vec<ColumnGloss>>> + Send;

    /// Table metadata (module, gloss, `m_schema`, `fk_degree`, `is_hub`) for
    /// known names, with no embedding lookup. Used by FK expansion (S3) to
    /// describe neighbor tables discovered only through an edge, which never
    /// went through cosine/lexical retrieval themselves. `similarity` on the
    /// returned rows is always `0.0`; callers assign their own.
    fn tables_by_name(
        &self,
        cx: &Cx,
        table_names: &[String],
    ) -> impl Future<Output = DbResult<Vec<StoredTable>>> + Send;

    /// All FK edges touching any of `table_names`.
    fn fk_edges_for_tables(
        &self,
        cx: &Cx,
        table_names: &[String],
    ) -> impl Future<Output = DbResult<Vec<FkEdge>>> + Send;

    /// The full FK edge set for a database, used to build the module
    /// subgraph cache.
    fn all_fk_edges(&self, cx: &Cx) -> impl Future<Output = DbResult<Vec<FkEdge>>> + Send;
}

/// A [`SchemaStore`] backed by a single pooled SQL connection.
pub struct SqlSchemaStore<'conn, C> {
    conn: &'conn C,
}

impl<'conn, C> SqlSchemaStore<'conn, C>
where
    C: Connection,
{
    #[must_use]
    pub const fn new(conn: &'conn C) -> Self {
        Self { conn }
    }
}

fn map_rows_outcome(out: Outcome<Vec<SqlRow>, sqlmodel_core::Error>) -> DbResult<Vec<SqlRow>> {
    match out {
        Outcome::Ok(rows) => Ok(rows),
        Outcome::Err(e) => Err(DbError::Driver(e.to_string())),
        Outcome::Cancelled(_) => Err(DbError::Timeout {
            operation: "rag store query",
            elapsed_ms: 0,
        }),
        Outcome::Panicked(_) => Err(DbError::Internal("rag store query panicked".to_string())),
    }
}

fn get_text(row: &SqlRow, idx: usize) -> Option<String> {
    row.get(idx).and_then(|v| match v {
        Value::Text(s) => Some(s.clone()),
        _ => None,
    })
}

fn get_f64(row: &SqlRow, idx: usize) -> f64 {
    row.get(idx)
        .and_then(|v| match v {
            Value::Real(n) => Some(*n),
            Value::Int(n) => Some(f64::from(*n)),
            Value::BigInt(n) => Some(precision_loss_f64(*n)),
            _ => None,
        })
        .unwrap_or(0.0)
}

const fn precision_loss_f64(n: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let v = n as f64;
    v
}

fn get_u32(row: &SqlRow, idx: usize) -> u32 {
    row.get(idx)
        .and_then(|v| match v {
            Value::Int(n) => u32::try_from(*n).ok(),
            Value::BigInt(n) => u32::try_from(*n).ok(),
            _ => None,
        })
        .unwrap_or(0)
}

fn get_bool(row: &SqlRow, idx: usize) -> bool {
    row.get(idx).is_some_and(|v| match v {
        Value::Bool(b) => *b,
        Value::Int(n) => *n != 0,
        Value::BigInt(n) => *n != 0,
        _ => false,
    })
}

fn decode_stored_table(row: &SqlRow) -> StoredTable {
    StoredTable {
        table_name: get_text(row, 0).unwrap_or_default(),
        table_schema: get_text(row, 1),
        module: get_text(row, 2),
        gloss: get_text(row, 3).unwrap_or_default(),
        m_schema: get_text(row, 4).unwrap_or_default(),
        fk_degree: get_u32(row, 5),
        is_hub: get_bool(row, 6),
        similarity: get_f64(row, 7),
    }
}

fn embedding_literal(embedding: &[f32]) -> Value {
    let json = serde_json::Value::from(embedding.iter().copied().collect::<Vec<f32>>());
    Value::Text(json.to_string())
}

const COSINE_TABLES_SQL: &str = "\
    SELECT t.table_name, t.table_schema, t.module, t.gloss, t.m_schema, t.fk_degree, t.is_hub, \
           1.0 - (e.embedding <=> $1) AS similarity \
    FROM rag.schema_tables t \
    JOIN rag.schema_embeddings e ON e.table_name = t.table_name \
    ORDER BY similarity DESC \
    LIMIT $2";

const LEXICAL_TABLES_SQL: &str = "\
    SELECT t.table_name, t.table_schema, t.module, t.gloss, t.m_schema, t.fk_degree, t.is_hub, \
           ts_rank(t.gloss_tsv, plainto_tsquery($1)) AS similarity \
    FROM rag.schema_tables t \
    WHERE t.gloss_tsv @@ plainto_tsquery($1) \
    ORDER BY similarity DESC \
    LIMIT $2";

const COSINE_MODULES_SQL: &str = "\
    SELECT m.module, 1.0 - (m.embedding <=> $1) AS similarity \
    FROM rag.module_embeddings m \
    ORDER BY similarity DESC \
    LIMIT $2";

const COLUMNS_FOR_TABLE_SQL: &str = "\
    SELECT column_name, description, synonyms, type_hint, is_pk, is_fk, fk_table, fk_column, data_type \
    FROM rag.schema_columns \
    WHERE table_name = $1";

const FK_EDGES_FOR_TABLES_SQL: &str = "\
    SELECT from_table, from_column, to_table, to_column \
    FROM rag.schema_fks \
    WHERE from_table = ANY($1) OR to_table = ANY($1)";

const ALL_FK_EDGES_SQL: &str = "SELECT from_table, from_column, to_table, to_column FROM rag.schema_fks";

const TABLES_BY_NAME_SQL: &str = "\
    SELECT table_name, table_schema, module, gloss, m_schema, fk_degree, is_hub, 0.0 AS similarity \
    FROM rag.schema_tables \
    WHERE table_name = ANY($1)";

impl<C> SchemaStore for SqlSchemaStore<'_, C>
where
    C: Connection + Sync,
{
    async fn cosine_tables(&self, cx: &Cx, embedding: &[f32], limit: usize) -> DbResult<Vec<StoredTable>> {
        let params = [embedding_literal(embedding), Value::BigInt(cap_limit(limit))];
        let rows = map_rows_outcome(raw_query(cx, self.conn, COSINE_TABLES_SQL, &params).await)?;
        Ok(rows.iter().map(decode_stored_table).collect())
    }

    async fn lexical_tables(&self, cx: &Cx, terms: &[String], limit: usize) -> DbResult<Vec<StoredTable>> {
        let query_text = terms.join(" ");
        let params = [Value::Text(query_text), Value::BigInt(cap_limit(limit))];
        let rows = map_rows_outcome(raw_query(cx, self.conn, LEXICAL_TABLES_SQL, &params).await)?;
        Ok(rows.iter().map(decode_stored_table).collect())
    }

    async fn cosine_modules(&self, cx: &Cx, embedding: &[f32], limit: usize) -> DbResult<Vec<StoredModule>> {
        let params = [embedding_literal(embedding), Value::BigInt(cap_limit(limit))];
        let rows = map_rows_outcome(raw_query(cx, self.conn, COSINE_MODULES_SQL, &params).await)?;
        Ok(rows
            .iter()
            .map(|row| StoredModule {
                module: get_text(row, 0).unwrap_or_default(),
                similarity: get_f64(row, 1),
            })
            .collect())
    }

    async fn columns_for_table(&self, cx: &Cx, table_name: &str) -> DbResult<Vec<ColumnGloss>> {
        let params = [Value::Text(table_name.to_string())];
        let rows =
            map_rows_outcome(raw_query(cx, self.conn, COLUMNS_FOR_TABLE_SQL, &params).await)?;
        rows.iter().map(decode_column_gloss).collect()
    }

    async fn fk_edges_for_tables(&self, cx: &Cx, table_names: &[String]) -> DbResult<Vec<FkEdge>> {
        let array_literal = serde_json::Value::from(table_names.to_vec());
        let params = [Value::Text(array_literal.to_string())];
        let rows =
            map_rows_outcome(raw_query(cx, self.conn, FK_EDGES_FOR_TABLES_SQL, &params).await)?;
        Ok(rows.iter().map(decode_fk_edge).collect())
    }

    async fn all_fk_edges(&self, cx: &Cx) -> DbResult<Vec<FkEdge>> {
        let rows = map_rows_outcome(raw_query(cx, self.conn, ALL_FK_EDGES_SQL, &[]).await)?;
        Ok(rows.iter().map(decode_fk_edge).collect())
    }

    async fn tables_by_name(&self, cx: &Cx, table_names: &[String]) -> DbResult<Vec<StoredTable>> {
        let array_literal = serde_json::Value::from(table_names.to_vec());
        let params = [Value::Text(array_literal.to_string())];
        let rows = map_rows_outcome(raw_query(cx, self.conn, TABLES_BY_NAME_SQL, &params).await)?;
        Ok(rows.iter().map(decode_stored_table).collect())
    }
}

fn cap_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn decode_fk_edge(row: &SqlRow) -> FkEdge {
    FkEdge::new(
        get_text(row, 0).unwrap_or_default(),
        get_text(row, 1).unwrap_or_default(),
        get_text(row, 2).unwrap_or_default(),
        get_text(row, 3).unwrap_or_default(),
    )
}

fn decode_column_gloss(row: &SqlRow) -> DbResult<ColumnGloss> {
    let column_name =
        get_text(row, 0).ok_or_else(|| DbError::Internal("missing column_name".to_string()))?;
    let description = get_text(row, 1).unwrap_or_default();
    let synonyms: std::collections::BTreeSet<String> = get_text(row, 2)
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    let type_hint = get_text(row, 3)
        .and_then(|s| parse_type_hint(&s))
        .unwrap_or(TypeHint::General);
    let is_pk = get_bool(row, 4);
    let is_fk = get_bool(row, 5);
    let fk_target = if is_fk {
        match (get_text(row, 6), get_text(row, 7)) {
            (Some(table), Some(column)) => Some(FkTarget { table, column }),
            _ => None,
        }
    } else {
        None
    };
    let data_type = get_text(row, 8).unwrap_or_default();

    Ok(ColumnGloss {
        column_name,
        description,
        synonyms,
        type_hint,
        is_pk,
        is_fk,
        fk_target,
        data_type,
    })
}

fn parse_type_hint(s: &str) -> Option<TypeHint> {
    Some(match s {
        "identifier" => TypeHint::Identifier,
        "date_timestamp" => TypeHint::DateTimestamp,
        "monetary" => TypeHint::Monetary,
        "quantity" => TypeHint::Quantity,
        "name_label" => TypeHint::NameLabel,
        "status_enum" => TypeHint::StatusEnum,
        "type_category" => TypeHint::TypeCategory,
        "code" => TypeHint::Code,
        "percentage" => TypeHint::Percentage,
        "text" => TypeHint::Text,
        "boolean" => TypeHint::Boolean,
        "general" => TypeHint::General,
        _ => return None,
    })
}
