//! HTTP client for the generation sidecar.
//!
//! The sidecar is an external collaborator: it owns the prompt templates,
//! the LLM calls, and the embedding model. This client only knows its wire
//! contract — five JSON endpoints plus a health probe — and the
//! circuit-breaker discipline that gates calls while the sidecar is down.

use crate::error::{DbError, DbResult};
use crate::retry::{CircuitState, SIDECAR_CIRCUIT};
use asupersync::http::h1::{HttpClient, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::sync::OnceLock;
use std::time::Duration;

static HTTP_CLIENT: OnceLock<HttpClient> = OnceLock::new();

fn http_client() -> &'static HttpClient {
    HTTP_CLIENT.get_or_init(HttpClient::new)
}

/// One SQL candidate as returned by `/generate_sql` or `/repair_sql`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedCandidate {
    pub sql: String,
    pub index: usize,
    pub score: f64,
    #[serde(default)]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub sql_candidates: Vec<GeneratedCandidate>,
    #[serde(default)]
    pub trace: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub embedding: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedBatchResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub count: usize,
}

/// Thin client over the sidecar's HTTP/JSON surface (contract only — the
/// sidecar's internal prompt assembly and model choice are out of scope).
pub struct SidecarClient {
    base_url: String,
}

impl SidecarClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// `POST /generate_sql` with `{question, schema_context, linked_bundle, join_plan}`.
    pub async fn generate_sql(&self, request: &Json) -> DbResult<GenerationResponse> {
        self.post_json("/generate_sql", request).await
    }

    /// `POST /repair_sql` with `{sql, errors, schema_context}`.
    pub async fn repair_sql(&self, request: &Json) -> DbResult<GenerationResponse> {
        self.post_json("/repair_sql", request).await
    }

    /// `POST /embed` with `{text, model}`.
    pub async fn embed(&self, text: &str, model: &str) -> DbResult<EmbedResponse> {
        let body = serde_json::json!({ "text": text, "model": model });
        self.post_json("/embed", &body).await
    }

    /// `POST /embed_batch` with `{texts, model}`.
    pub async fn embed_batch(&self, texts: &[String], model: &str) -> DbResult<EmbedBatchResponse> {
        let body = serde_json::json!({ "texts": texts, "model": model });
        self.post_json("/embed_batch", &body).await
    }

    /// `GET /health`. Closes the circuit on success; callers are not required
    /// to invoke this themselves — every other call closes the circuit on a
    /// 2xx response too — but a dedicated health poll lets the pipeline probe
    /// recovery without spending a real generation/embedding call.
    pub async fn health(&self) -> DbResult<()> {
        if SIDECAR_CIRCUIT.state() == CircuitState::Open {
            return Err(DbError::CircuitBreakerOpen {
                message: "sidecar circuit is open".to_string(),
                failures: SIDECAR_CIRCUIT.failure_count(),
                reset_after_secs: SIDECAR_CIRCUIT.remaining_open_secs(),
            });
        }

        let url = format!("{}/health", self.base_url);
        let client = http_client();
        let result = client
            .request(Method::Get, &url, Vec::new(), Vec::new())
            .await;

        match result {
            Ok(resp) if resp.status == 200 => {
                SIDECAR_CIRCUIT.record_success();
                Ok(())
            }
            Ok(resp) => {
                SIDECAR_CIRCUIT.record_failure();
                Err(DbError::SidecarStatus {
                    status: resp.status,
                    body: String::from_utf8_lossy(&resp.body).to_string(),
                })
            }
            Err(e) => {
                SIDECAR_CIRCUIT.record_failure();
                Err(DbError::Transport {
                    collaborator: "generation sidecar",
                    message: e.to_string(),
                })
            }
        }
    }

    /// `POST /invalidate_cache` with `{database_id}`. Fire-and-forget: a
    /// failure here never propagates, it only logs.
    pub async fn invalidate_cache(&self, database_id: &str) {
        let body = serde_json::json!({ "database_id": database_id });
        if let Err(e) = self.post_json::<Json>("/invalidate_cache", &body).await {
            tracing::warn!(error = %e, database_id, "sidecar cache invalidation failed, ignoring");
        }
    }

    async fn post_json<R>(&self, path: &str, body: &Json) -> DbResult<R>
    where
        R: for<'de> Deserialize<'de>,
    {
        if SIDECAR_CIRCUIT.state() == CircuitState::Open {
            return Err(DbError::CircuitBreakerOpen {
                message: format!("sidecar circuit is open, skipping {path}"),
                failures: SIDECAR_CIRCUIT.failure_count(),
                reset_after_secs: SIDECAR_CIRCUIT.remaining_open_secs(),
            });
        }

        let url = format!("{}{}", self.base_url, path);
        let body_bytes = serde_json::to_vec(body)?;
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];

        let client = http_client();
        let start = std::time::Instant::now();
        let response = client
            .request(Method::Post, &url, headers, body_bytes)
            .await
            .map_err(|e| {
                SIDECAR_CIRCUIT.record_failure();
                DbError::Transport {
                    collaborator: "generation sidecar",
                    message: e.to_string(),
                }
            })?;

        if response.status >= 500 {
            SIDECAR_CIRCUIT.record_failure();
        } else {
            SIDECAR_CIRCUIT.record_success();
        }

        if !(200..300).contains(&response.status) {
            let body_text = String::from_utf8_lossy(&response.body).to_string();
            return Err(DbError::SidecarStatus {
                status: response.status,
                body: body_text,
            });
        }

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(path, elapsed_ms, "sidecar call completed");

        serde_json::from_slice(&response.body).map_err(|e| DbError::Serialization(e.to_string()))
    }
}

/// Bound for how long a single sidecar round trip may take before the
/// caller treats it as timed out, per the embedding/query timeout knobs in
/// [`sqlgrounder_core::Config::timeouts`].
#[must_use]
pub const fn default_call_timeout() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_response_round_trips_through_json() {
        let json = serde_json::json!({
            "sql_candidates": [
                {"sql": "SELECT 1", "index": 0, "score": 0.9, "rationale": "trivial"}
            ],
            "trace": {"stage": "generate"}
        });
        let parsed: GenerationResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.sql_candidates.len(), 1);
        assert_eq!(parsed.sql_candidates[0].sql, "SELECT 1");
    }

    #[test]
    fn embed_response_parses_dimensions() {
        let json = serde_json::json!({
            "embedding": [0.1, 0.2, 0.3],
            "model": "text-embed-1",
            "dimensions": 3
        });
        let parsed: EmbedResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.dimensions, 3);
        assert_eq!(parsed.embedding.len(), 3);
    }
}
