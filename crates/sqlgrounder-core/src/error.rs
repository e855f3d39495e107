//! Error kinds for the schema-grounding pipeline.
//!
//! The closed kind set below mirrors the pipeline's error-handling policy:
//! optional signals degrade and warn, mandatory calls propagate as
//! recoverable, validator issues never raise, and the reranker is always
//! best-effort. Every variant carries a `recoverable` flag and a small
//! structured context map so the CLI surface can render `{error_kind,
//! recoverable, hint}` without leaking raw backend messages.

use std::collections::BTreeMap;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Main error type for the schema-grounding pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    // ==========================================================================
    // Timeout / Cancellation
    // ==========================================================================
    /// A call exceeded its deadline (embedding, vector/text query, value
    /// verification, generation sidecar).
    #[error("operation timed out: {operation}")]
    Timeout {
        operation: String,
        context: BTreeMap<String, String>,
    },

    /// The caller's context was cancelled; the stage released its resources
    /// and is surfacing a distinct error rather than a timeout.
    #[error("operation cancelled: {operation}")]
    Cancelled {
        operation: String,
        context: BTreeMap<String, String>,
    },

    // ==========================================================================
    // Collaborator Availability
    // ==========================================================================
    /// The generation sidecar or the connection pool could not be reached.
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: &'static str,
        message: String,
        context: BTreeMap<String, String>,
    },

    // ==========================================================================
    // Resource Not Found
    // ==========================================================================
    /// A row expected in the external schema store was missing.
    #[error("{entity} not found: {identifier}")]
    NotFound {
        entity: &'static str,
        identifier: String,
    },

    // ==========================================================================
    // Input Validation
    // ==========================================================================
    /// The incoming question was malformed (empty text, wrong embedding
    /// dimensionality, missing `database_id`).
    #[error("invalid input: {message}")]
    InvalidInput {
        message: String,
        context: BTreeMap<String, String>,
    },

    // ==========================================================================
    // SQL Gate
    // ==========================================================================
    /// Every generated candidate was rejected by the static validator.
    #[error("no candidate passed validation: {reason}")]
    ValidationFailed {
        reason: String,
        context: BTreeMap<String, String>,
    },

    /// The generation sidecar returned zero candidates or a malformed response.
    #[error("generation failed: {message}")]
    GenerationFailed {
        message: String,
        context: BTreeMap<String, String>,
    },

    // ==========================================================================
    // Internal
    // ==========================================================================
    /// Anything else: programming errors, invariant violations, serialization
    /// failures that should never surface to a caller unmodified.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
            context: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
            context: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn unavailable(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn not_found(entity: &'static str, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            identifier: identifier.into(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn validation_failed(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
            context: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a structured context entry, for errors that carry one.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let ctx = match &mut self {
            Self::Timeout { context, .. }
            | Self::Cancelled { context, .. }
            | Self::Unavailable { context, .. }
            | Self::InvalidInput { context, .. }
            | Self::ValidationFailed { context, .. }
            | Self::GenerationFailed { context, .. } => Some(context),
            Self::NotFound { .. } | Self::Internal(_) => None,
        };
        if let Some(ctx) = ctx {
            ctx.insert(key.into(), value.into());
        }
        self
    }

    /// The closed error-kind tag surfaced on the user-visible `{error_kind,
    /// recoverable, hint}` failure shape.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Unavailable { .. } => "unavailable",
            Self::NotFound { .. } => "not_found",
            Self::InvalidInput { .. } => "invalid_input",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the caller can usefully retry. Per the error-handling policy:
    /// timeouts, unavailability, and generation failures are recoverable;
    /// malformed input, missing schema rows, and internal errors are not.
    /// Cancellation is inherently not retryable by the same context.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Unavailable { .. } | Self::GenerationFailed { .. }
        )
    }

    /// A short, user-safe hint — never a raw backend message.
    #[must_use]
    pub fn hint(&self) -> String {
        match self {
            Self::Timeout { operation, .. } => {
                format!("the {operation} step took too long; try again")
            }
            Self::Cancelled { .. } => "the request was cancelled".to_string(),
            Self::Unavailable { collaborator, .. } => {
                format!("{collaborator} is temporarily unavailable; try again shortly")
            }
            Self::NotFound { entity, .. } => format!("{entity} could not be located"),
            Self::InvalidInput { .. } => "the question could not be understood".to_string(),
            Self::ValidationFailed { .. } => {
                "no safe SQL candidate could be produced for this question".to_string()
            }
            Self::GenerationFailed { .. } => {
                "SQL generation failed; try rephrasing the question".to_string()
            }
            Self::Internal(_) => "an internal error occurred".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds_match_policy() {
        assert!(CoreError::timeout("embed").is_recoverable());
        assert!(CoreError::unavailable("sidecar", "down").is_recoverable());
        assert!(CoreError::generation_failed("no candidates").is_recoverable());
        assert!(!CoreError::invalid_input("empty question").is_recoverable());
        assert!(!CoreError::not_found("table", "ghost").is_recoverable());
        assert!(!CoreError::cancelled("embed").is_recoverable());
    }

    #[test]
    fn hint_never_echoes_raw_message() {
        let err = CoreError::unavailable("sidecar", "connection refused by 10.0.0.5:9443");
        assert!(!err.hint().contains("10.0.0.5"));
    }

    #[test]
    fn with_context_attaches_to_contextual_variants_only() {
        let err = CoreError::timeout("embed").with_context("database_id", "db1");
        if let CoreError::Timeout { context, .. } = &err {
            assert_eq!(context.get("database_id"), Some(&"db1".to_string()));
        } else {
            panic!("expected Timeout variant");
        }
    }
}
