//! Value verification (reranker signal 4): confirm a literal extracted from a
//! generated candidate actually occurs in the source database before the
//! reranker credits the candidate for it. Off by default (`value_verification`
//! feature flag) and only ever run against the top-2 post-bonus candidates.

use asupersync::{Budget, Cx, Outcome, Time};
use sqlmodel_core::{Connection, Value};
use sqlmodel_query::raw_query;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::DbResult;

fn deadline_from_now(timeout_ms: u64) -> Time {
    let now_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0);
    Time::from_nanos(now_nanos.saturating_add(timeout_ms.saturating_mul(1_000_000)))
}

/// `SELECT 1 FROM {table} WHERE {column} = $1 LIMIT 1`, true iff a row comes
/// back. Errors (not just "no row") count as unverified but are not
/// penalized.
pub async fn value_exists<C: Connection>(
    conn: &C,
    table: &str,
    column: &str,
    value: &str,
    timeout_ms: u64,
) -> DbResult<bool> {
    let cx = Cx::for_request_with_budget(Budget::new().with_deadline(deadline_from_now(timeout_ms)));
    let sql = format!("SELECT 1 FROM {table} WHERE {column} = $1 LIMIT 1");
    let params = [Value::Text(value.to_string())];

    match raw_query(&cx, conn, &sql, &params).await {
        Outcome::Ok(rows) => Ok(!rows.is_empty()),
        Outcome::Err(_) | Outcome::Cancelled(_) | Outcome::Panicked(_) => Ok(false),
    }
}
