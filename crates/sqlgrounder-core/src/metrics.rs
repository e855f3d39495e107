//! Lock-free metrics primitives + a small global metrics surface.
//!
//! Design goals:
//! - Hot-path recording: O(1), no allocations, no locks.
//! - Snapshotting: lock-free loads + derived quantiles (approx) for histograms.
//!
//! This is intentionally lightweight (std-only) so all crates can record metrics.

#![forbid(unsafe_code)]

use serde::Serialize;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Counter {
    v: AtomicU64,
}

impl Counter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            v: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc(&self) {
        self.v.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, delta: u64) {
        self.v.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> u64 {
        self.v.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store(&self, value: u64) {
        self.v.store(value, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
pub struct GaugeI64 {
    v: AtomicI64,
}

impl GaugeI64 {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            v: AtomicI64::new(0),
        }
    }

    #[inline]
    pub fn add(&self, delta: i64) {
        self.v.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn set(&self, value: i64) {
        self.v.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> i64 {
        self.v.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct GaugeU64 {
    v: AtomicU64,
}

impl GaugeU64 {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            v: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn add(&self, delta: u64) {
        self.v.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn set(&self, value: u64) {
        self.v.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> u64 {
        self.v.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn fetch_max(&self, value: u64) {
        let mut cur = self.v.load(Ordering::Relaxed);
        while value > cur {
            match self
                .v
                .compare_exchange_weak(cur, value, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(next) => cur = next,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Histogram (fixed-bucket log2)
// ---------------------------------------------------------------------------

const LOG2_BUCKETS: usize = 64;

#[derive(Debug)]
pub struct Log2Histogram {
    buckets: [AtomicU64; LOG2_BUCKETS],
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicU64,
    max: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
}

impl Default for Log2Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Log2Histogram {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            min: AtomicU64::new(u64::MAX),
            max: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.min.fetch_min(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
        let idx = bucket_index(value);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        // count is written LAST with Release so that an Acquire load on count
        // in snapshot() establishes a happens-before edge for all prior writes.
        self.count.fetch_add(1, Ordering::Release);
    }

    /// Reset all counters to their initial state.
    pub fn reset(&self) {
        for bucket in &self.buckets {
            bucket.store(0, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Relaxed);
        self.sum.store(0, Ordering::Relaxed);
        self.min.store(u64::MAX, Ordering::Relaxed);
        self.max.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> HistogramSnapshot {
        // Acquire on count pairs with Release in record(), ensuring all prior
        // writes (sum, min, max, buckets) are visible.
        let count = self.count.load(Ordering::Acquire);
        if count == 0 {
            return HistogramSnapshot {
                count: 0,
                sum: 0,
                min: 0,
                max: 0,
                p50: 0,
                p95: 0,
                p99: 0,
            };
        }

        let buckets: [u64; LOG2_BUCKETS] =
            std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed));

        let raw_min = self.min.load(Ordering::Relaxed);
        let max = self.max.load(Ordering::Relaxed);
        // Clamp min <= max to maintain invariant even under concurrent races.
        let min = raw_min.min(max);
        let p50 = estimate_quantile_frac(&buckets, count, 1, 2, max);
        let p95 = estimate_quantile_frac(&buckets, count, 19, 20, max);
        let p99 = estimate_quantile_frac(&buckets, count, 99, 100, max);

        HistogramSnapshot {
            count,
            sum: self.sum.load(Ordering::Relaxed),
            min,
            max,
            p50,
            p95,
            p99,
        }
    }
}

#[inline]
const fn bucket_index(value: u64) -> usize {
    if value == 0 {
        return 0;
    }
    let lz = value.leading_zeros() as usize;
    // floor(log2(value)) in range 0..=63
    63usize.saturating_sub(lz)
}

const fn bucket_upper_bound(idx: usize) -> u64 {
    if idx >= 63 {
        return u64::MAX;
    }
    (1u64 << (idx + 1)).saturating_sub(1)
}

fn estimate_quantile_frac(
    buckets: &[u64; LOG2_BUCKETS],
    count: u64,
    numerator: u64,
    denominator: u64,
    observed_max: u64,
) -> u64 {
    debug_assert!(denominator > 0);
    // Nearest-rank method: smallest value x such that F(x) >= q.
    // rank is 1-indexed, clamp to [1, count]
    let numerator = numerator.min(denominator);
    let mut rank = count
        .saturating_mul(numerator)
        .saturating_add(denominator.saturating_sub(1))
        / denominator;
    rank = rank.clamp(1, count);

    let mut cumulative = 0u64;
    for (idx, c) in buckets.iter().copied().enumerate() {
        cumulative = cumulative.saturating_add(c);
        if cumulative >= rank {
            return bucket_upper_bound(idx).min(observed_max);
        }
    }
    // Should not happen unless counts race snapshot; return max as conservative fallback.
    observed_max
}

// ---------------------------------------------------------------------------
// Global metrics surface (minimal; expanded by dedicated beads).
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct HttpMetrics {
    pub requests_total: Counter,
    pub requests_inflight: GaugeI64,
    pub requests_2xx: Counter,
    pub requests_4xx: Counter,
    pub requests_5xx: Counter,
    pub latency_us: Log2Histogram,
    /// Total requests rejected by the rate limiter (HTTP 429).
    pub rate_limit_rejected_total: Counter,
    /// Total requests checked by the rate limiter (allowed + rejected).
    pub rate_limit_checked_total: Counter,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HttpMetricsSnapshot {
    pub requests_total: u64,
    pub requests_inflight: i64,
    pub requests_2xx: u64,
    pub requests_4xx: u64,
    pub requests_5xx: u64,
    pub latency_us: HistogramSnapshot,
    pub rate_limit_rejected_total: u64,
    pub rate_limit_checked_total: u64,
}

impl Default for HttpMetrics {
    fn default() -> Self {
        Self {
            requests_total: Counter::new(),
            requests_inflight: GaugeI64::new(),
            requests_2xx: Counter::new(),
            requests_4xx: Counter::new(),
            requests_5xx: Counter::new(),
            latency_us: Log2Histogram::new(),
            rate_limit_rejected_total: Counter::new(),
            rate_limit_checked_total: Counter::new(),
        }
    }
}

impl HttpMetrics {
    #[inline]
    pub fn record_response(&self, status: u16, latency_us: u64) {
        self.requests_total.inc();
        match status {
            200..=299 => self.requests_2xx.inc(),
            400..=499 => self.requests_4xx.inc(),
            500..=599 => self.requests_5xx.inc(),
            _ => {}
        }
        self.latency_us.record(latency_us);
    }

    /// Record a rate limit check result.
    #[inline]
    pub fn record_rate_limit_check(&self, allowed: bool) {
        self.rate_limit_checked_total.inc();
        if !allowed {
            self.rate_limit_rejected_total.inc();
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            requests_total: self.requests_total.load(),
            requests_inflight: self.requests_inflight.load(),
            requests_2xx: self.requests_2xx.load(),
            requests_4xx: self.requests_4xx.load(),
            requests_5xx: self.requests_5xx.load(),
            latency_us: self.latency_us.snapshot(),
            rate_limit_rejected_total: self.rate_limit_rejected_total.load(),
            rate_limit_checked_total: self.rate_limit_checked_total.load(),
        }
    }
}

/// Per-stage call/error/latency counters for one pipeline stage (S1-S7).
#[derive(Debug, Default)]
pub struct StageMetrics {
    pub calls_total: Counter,
    pub errors_total: Counter,
    pub degraded_total: Counter,
    pub latency_us: Log2Histogram,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StageMetricsSnapshot {
    pub calls_total: u64,
    pub errors_total: u64,
    pub degraded_total: u64,
    pub latency_us: HistogramSnapshot,
}

impl StageMetrics {
    #[inline]
    pub fn record_call(&self, latency_us: u64, is_error: bool) {
        self.calls_total.inc();
        if is_error {
            self.errors_total.inc();
        }
        self.latency_us.record(latency_us);
    }

    /// Record a stage that degraded gracefully (missing optional signal:
    /// lexical index, module embeddings, glosses table) rather than erroring.
    #[inline]
    pub fn record_degraded(&self) {
        self.degraded_total.inc();
    }

    #[must_use]
    pub fn snapshot(&self) -> StageMetricsSnapshot {
        StageMetricsSnapshot {
            calls_total: self.calls_total.load(),
            errors_total: self.errors_total.load(),
            degraded_total: self.degraded_total.load(),
            latency_us: self.latency_us.snapshot(),
        }
    }
}

/// One `StageMetrics` instance per pipeline stage, S1 through S7.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// S1 Module Router.
    pub module_router: StageMetrics,
    /// S2 Hybrid Retriever.
    pub hybrid_retriever: StageMetrics,
    /// S3 FK Expander.
    pub fk_expander: StageMetrics,
    /// S4 Schema Linker.
    pub schema_linker: StageMetrics,
    /// S5 Join Planner.
    pub join_planner: StageMetrics,
    /// S6 SQL Validator.
    pub sql_validator: StageMetrics,
    /// S7 Candidate Reranker.
    pub candidate_reranker: StageMetrics,
    /// End-to-end question latency, S1 through S7 inclusive.
    pub question_latency_us: Log2Histogram,
    /// Questions that completed with zero surviving SQL candidates.
    pub questions_with_no_candidate: Counter,
    /// Hits against the join planner's process-wide module-subgraph cache.
    pub module_subgraph_cache_hits: Counter,
    pub module_subgraph_cache_misses: Counter,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineMetricsSnapshot {
    pub module_router: StageMetricsSnapshot,
    pub hybrid_retriever: StageMetricsSnapshot,
    pub fk_expander: StageMetricsSnapshot,
    pub schema_linker: StageMetricsSnapshot,
    pub join_planner: StageMetricsSnapshot,
    pub sql_validator: StageMetricsSnapshot,
    pub candidate_reranker: StageMetricsSnapshot,
    pub question_latency_us: HistogramSnapshot,
    pub questions_with_no_candidate: u64,
    pub module_subgraph_cache_hits: u64,
    pub module_subgraph_cache_misses: u64,
}

impl PipelineMetrics {
    #[must_use]
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            module_router: self.module_router.snapshot(),
            hybrid_retriever: self.hybrid_retriever.snapshot(),
            fk_expander: self.fk_expander.snapshot(),
            schema_linker: self.schema_linker.snapshot(),
            join_planner: self.join_planner.snapshot(),
            sql_validator: self.sql_validator.snapshot(),
            candidate_reranker: self.candidate_reranker.snapshot(),
            question_latency_us: self.question_latency_us.snapshot(),
            questions_with_no_candidate: self.questions_with_no_candidate.load(),
            module_subgraph_cache_hits: self.module_subgraph_cache_hits.load(),
            module_subgraph_cache_misses: self.module_subgraph_cache_misses.load(),
        }
    }
}

#[derive(Debug)]
pub struct DbMetrics {
    pub pool_acquires_total: Counter,
    pub pool_acquire_latency_us: Log2Histogram,
    pub pool_acquire_errors_total: Counter,
    pub pool_total_connections: GaugeU64,
    pub pool_idle_connections: GaugeU64,
    pub pool_active_connections: GaugeU64,
    pub pool_pending_requests: GaugeU64,
    pub pool_peak_active_connections: GaugeU64,
    pub pool_over_80_since_us: GaugeU64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DbMetricsSnapshot {
    pub pool_acquires_total: u64,
    pub pool_acquire_errors_total: u64,
    pub pool_acquire_latency_us: HistogramSnapshot,
    pub pool_total_connections: u64,
    pub pool_idle_connections: u64,
    pub pool_active_connections: u64,
    pub pool_pending_requests: u64,
    pub pool_peak_active_connections: u64,
    pub pool_utilization_pct: u64,
    pub pool_over_80_since_us: u64,
}

impl Default for DbMetrics {
    fn default() -> Self {
        Self {
            pool_acquires_total: Counter::new(),
            pool_acquire_latency_us: Log2Histogram::new(),
            pool_acquire_errors_total: Counter::new(),
            pool_total_connections: GaugeU64::new(),
            pool_idle_connections: GaugeU64::new(),
            pool_active_connections: GaugeU64::new(),
            pool_pending_requests: GaugeU64::new(),
            pool_peak_active_connections: GaugeU64::new(),
            pool_over_80_since_us: GaugeU64::new(),
        }
    }
}

impl DbMetrics {
    #[must_use]
    pub fn snapshot(&self) -> DbMetricsSnapshot {
        let pool_total_connections = self.pool_total_connections.load();
        let pool_active_connections = self.pool_active_connections.load();
        let pool_utilization_pct = if pool_total_connections == 0 {
            0
        } else {
            pool_active_connections
                .saturating_mul(100)
                .saturating_div(pool_total_connections)
        };

        DbMetricsSnapshot {
            pool_acquires_total: self.pool_acquires_total.load(),
            pool_acquire_errors_total: self.pool_acquire_errors_total.load(),
            pool_acquire_latency_us: self.pool_acquire_latency_us.snapshot(),
            pool_total_connections,
            pool_idle_connections: self.pool_idle_connections.load(),
            pool_active_connections,
            pool_pending_requests: self.pool_pending_requests.load(),
            pool_peak_active_connections: self.pool_peak_active_connections.load(),
            pool_utilization_pct,
            pool_over_80_since_us: self.pool_over_80_since_us.load(),
        }
    }
}

#[derive(Debug, Default)]
pub struct GlobalMetrics {
    pub http: HttpMetrics,
    pub pipeline: PipelineMetrics,
    pub db: DbMetrics,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GlobalMetricsSnapshot {
    pub http: HttpMetricsSnapshot,
    pub pipeline: PipelineMetricsSnapshot,
    pub db: DbMetricsSnapshot,
}

impl GlobalMetrics {
    #[must_use]
    pub fn snapshot(&self) -> GlobalMetricsSnapshot {
        GlobalMetricsSnapshot {
            http: self.http.snapshot(),
            pipeline: self.pipeline.snapshot(),
            db: self.db.snapshot(),
        }
    }
}

static GLOBAL_METRICS: LazyLock<GlobalMetrics> = LazyLock::new(GlobalMetrics::default);

#[must_use]
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log2_bucket_indexing_smoke() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(1), 0);
        assert_eq!(bucket_index(2), 1);
        assert_eq!(bucket_index(3), 1);
        assert_eq!(bucket_index(4), 2);
        assert_eq!(bucket_index(7), 2);
        assert_eq!(bucket_index(8), 3);
    }

    #[test]
    fn histogram_snapshot_empty_is_zeros() {
        let h = Log2Histogram::new();
        let snap = h.snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.min, 0);
        assert_eq!(snap.p99, 0);
    }

    #[test]
    fn histogram_quantiles_are_monotonic() {
        let h = Log2Histogram::new();
        for v in [1u64, 2, 3, 4, 10, 100, 1000, 10_000] {
            h.record(v);
        }
        let snap = h.snapshot();
        assert!(snap.p50 <= snap.p95);
        assert!(snap.p95 <= snap.p99);
        assert!(snap.max >= snap.p99);
    }

    #[test]
    fn histogram_min_max_clamped_invariant() {
        use std::sync::Arc;
        use std::thread;

        let h = Arc::new(Log2Histogram::new());

        let h1 = Arc::clone(&h);
        let t1 = thread::spawn(move || {
            h1.record(1000);
        });
        let h2 = Arc::clone(&h);
        let t2 = thread::spawn(move || {
            h2.record(1);
        });
        t1.join().unwrap();
        t2.join().unwrap();

        let snap = h.snapshot();
        assert!(
            snap.min <= snap.max,
            "Invariant violated: min={} > max={}",
            snap.min,
            snap.max
        );
        assert_eq!(snap.count, 2);
    }

    #[test]
    fn stage_metrics_records_calls_errors_and_degradations() {
        let m = StageMetrics::default();
        m.record_call(100, false);
        m.record_call(200, true);
        m.record_degraded();

        let snap = m.snapshot();
        assert_eq!(snap.calls_total, 2);
        assert_eq!(snap.errors_total, 1);
        assert_eq!(snap.degraded_total, 1);
        assert_eq!(snap.latency_us.count, 2);
    }

    #[test]
    fn pipeline_metrics_snapshot_covers_all_seven_stages() {
        let m = PipelineMetrics::default();
        m.module_router.record_call(10, false);
        m.join_planner.record_call(50, false);
        m.questions_with_no_candidate.inc();
        m.module_subgraph_cache_hits.add(3);
        m.module_subgraph_cache_misses.inc();

        let snap = m.snapshot();
        assert_eq!(snap.module_router.calls_total, 1);
        assert_eq!(snap.join_planner.calls_total, 1);
        assert_eq!(snap.questions_with_no_candidate, 1);
        assert_eq!(snap.module_subgraph_cache_hits, 3);
        assert_eq!(snap.module_subgraph_cache_misses, 1);
    }

    #[test]
    fn global_metrics_is_process_wide_singleton() {
        let a = global_metrics();
        let b = global_metrics();
        a.pipeline.module_router.calls_total.inc();
        assert_eq!(
            b.pipeline.module_router.calls_total.load(),
            a.pipeline.module_router.calls_total.load()
        );
    }

    #[test]
    fn histogram_snapshot_benchmark_concurrent_recording() {
        use std::sync::Arc;

        const NUM_WRITERS: usize = 8;
        const RECORDS_PER_WRITER: usize = 5_000;

        let h = Arc::new(Log2Histogram::new());

        std::thread::scope(|s| {
            for tid in 0..NUM_WRITERS {
                let hist = Arc::clone(&h);
                s.spawn(move || {
                    for i in 0..RECORDS_PER_WRITER {
                        hist.record((tid as u64 * 1000) + (i as u64 % 10_000));
                    }
                });
            }
        });

        let total_records = (NUM_WRITERS * RECORDS_PER_WRITER) as u64;
        let snap = h.snapshot();
        assert_eq!(snap.count, total_records, "all records should be visible");
        assert!(snap.min <= snap.max);
        assert!(snap.p50 <= snap.p95);
        assert!(snap.p95 <= snap.p99);
    }
}
