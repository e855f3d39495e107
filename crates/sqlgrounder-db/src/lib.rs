//! External-collaborator clients for the schema-grounding pipeline.
//!
//! This crate owns every boundary the core pipeline (S1-S7) talks across:
//! - [`pool`] — a generic connection pool over the source ERP database and
//!   the rag schema/vector store.
//! - [`store`] — typed queries against the rag schema/vector store: cosine/
//!   lexical table retrieval, module centroids, column glosses, FK edges.
//! - [`sidecar`] — an HTTP/JSON client for the generation sidecar
//!   (`/generate_sql`, `/repair_sql`, `/embed`, `/embed_batch`, `/health`,
//!   `/invalidate_cache`).
//! - [`retry`] — exponential backoff and the circuit breakers that gate both
//!   collaborators.
//! - [`value_check`] — the reranker's optional value-verification round trip
//!   against the source database.
//!
//! None of these own persisted state themselves; they are thin,
//! cancellation-aware clients.

#![forbid(unsafe_code)]

pub mod error;
pub mod pool;
pub mod retry;
pub mod sidecar;
pub mod store;
pub mod value_check;

pub use error::{DbError, DbResult};
pub use pool::{
    DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_MAX_LIFETIME_MS, DEFAULT_MAX_OVERFLOW, DEFAULT_POOL_SIZE,
    SourcePool, SourcePoolConfig, auto_pool_size,
};
pub use retry::{CircuitBreaker, CircuitState, DB_CIRCUIT, RetryConfig, SIDECAR_CIRCUIT, retry_sync};
pub use sidecar::{EmbedBatchResponse, EmbedResponse, GeneratedCandidate, GenerationResponse, SidecarClient};
pub use store::{SchemaStore, SqlSchemaStore, StoredModule, StoredTable};
pub use value_check::value_exists;
