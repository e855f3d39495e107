//! Error types for the external-collaborator layer: the source-database
//! connection pool, the rag schema/vector store, and the generation sidecar.

use thiserror::Error;

/// Result type alias for database/sidecar operations.
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Error types surfaced by this crate.
#[derive(Error, Debug)]
pub enum DbError {
    /// Driver-level error from the underlying SQL engine.
    #[error("SQL driver error: {0}")]
    Driver(String),

    /// Connection pool error (acquire failure, config error).
    #[error("pool error: {0}")]
    Pool(String),

    /// Connection pool exhausted (all connections in use, checkout timed out).
    #[error("connection pool exhausted: {message}")]
    PoolExhausted {
        message: String,
        pool_size: usize,
        max_overflow: usize,
    },

    /// Resource is temporarily busy (lock contention).
    #[error("resource temporarily busy: {0}")]
    ResourceBusy(String),

    /// Circuit breaker is open — the collaborator is experiencing sustained failures.
    #[error("circuit breaker open: {message}")]
    CircuitBreakerOpen {
        message: String,
        failures: u32,
        reset_after_secs: f64,
    },

    /// Record not found in the rag schema store.
    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    /// Invalid argument passed to a query builder.
    #[error("invalid {field}: {message}")]
    InvalidArgument {
        field: &'static str,
        message: String,
    },

    /// The sidecar responded with a non-2xx status.
    #[error("sidecar returned status {status}: {body}")]
    SidecarStatus { status: u16, body: String },

    /// Transport-level failure talking to an external collaborator (DNS, TCP, TLS).
    #[error("transport error reaching {collaborator}: {message}")]
    Transport {
        collaborator: &'static str,
        message: String,
    },

    /// A call exceeded its deadline.
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: &'static str, elapsed_ms: u64 },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DbError {
    #[must_use]
    pub fn not_found(entity: &'static str, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            identifier: identifier.into(),
        }
    }

    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    /// Whether this error indicates a retryable lock/busy/transient condition.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Driver(msg) | Self::Pool(msg) | Self::ResourceBusy(msg) => is_lock_error(msg),
            Self::PoolExhausted { .. } | Self::Transport { .. } | Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Whether the caller can usefully retry (mirrors `sqlgrounder_core::CoreError::is_recoverable`).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. }
                | Self::ResourceBusy(_)
                | Self::CircuitBreakerOpen { .. }
                | Self::Pool(_)
                | Self::Transport { .. }
                | Self::Timeout { .. }
                | Self::SidecarStatus { status: 500..=599, .. }
        )
    }
}

/// Check whether an error message indicates a lock/busy condition worth retrying.
#[must_use]
pub fn is_lock_error(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("locked")
        || lower.contains("busy")
        || lower.contains("deadlock")
        || lower.contains("could not serialize access")
}

/// Check whether an error message indicates pool exhaustion.
#[must_use]
pub fn is_pool_exhausted_error(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    (lower.contains("pool") && (lower.contains("timeout") || lower.contains("exhausted")))
        || lower.contains("too many connections")
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<DbError> for sqlgrounder_core::CoreError {
    fn from(e: DbError) -> Self {
        match &e {
            DbError::Timeout { operation, .. } => {
                sqlgrounder_core::CoreError::timeout((*operation).to_string())
            }
            DbError::CircuitBreakerOpen { .. }
            | DbError::Transport { .. }
            | DbError::PoolExhausted { .. }
            | DbError::Pool(_) => sqlgrounder_core::CoreError::unavailable(
                "generation sidecar or source database",
                e.to_string(),
            ),
            DbError::NotFound { entity, identifier } => {
                sqlgrounder_core::CoreError::not_found(entity, identifier.clone())
            }
            DbError::SidecarStatus { status, .. } if (500..600).contains(status) => {
                sqlgrounder_core::CoreError::generation_failed(e.to_string())
            }
            _ => sqlgrounder_core::CoreError::Internal(e.to_string()),
        }
    }
}
