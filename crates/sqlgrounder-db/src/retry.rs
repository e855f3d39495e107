//! Exponential backoff + circuit breaker for external-collaborator calls.
//!
//! Used by the source-database pool (lock/busy retries) and by the
//! generation-sidecar client: a circuit-breaker flag skips calls while in
//! open state, opened on TCP/DNS failure, closed by next successful
//! `/health`.
//!
//! # Backoff Schedule (defaults)
//!
//! | Attempt | Delay (base) | With ±25% jitter |
//! |---------|-------------|------------------|
//! | 0       | 50ms        | 37–63ms          |
//! | 1       | 100ms       | 75–125ms         |
//! | 2       | 200ms       | 150–250ms        |
//! | 3       | 400ms       | 300–500ms        |
//! | 4       | 800ms       | 600–1000ms       |
//! | 5       | 1600ms      | 1200–2000ms      |
//! | 6       | 3200ms      | 2400–4000ms      |

use crate::error::{DbError, DbResult};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation — all calls pass through.
    Closed,
    /// Failing fast — calls are rejected immediately.
    Open,
    /// Testing recovery — one probe call is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Thread-safe circuit breaker. One instance guards the source-database
/// pool; a second guards the generation sidecar's "is-healthy" flag.
pub struct CircuitBreaker {
    failures: AtomicU32,
    /// Monotonic microseconds when the circuit should close (0 = not open).
    open_until_us: AtomicU64,
    threshold: u32,
    reset_duration: Duration,
    epoch: Instant,
}

impl CircuitBreaker {
    /// Default: 5 consecutive failures before opening, 30s before half-open.
    #[must_use]
    pub fn new() -> Self {
        Self::with_params(5, Duration::from_secs(30))
    }

    #[must_use]
    pub fn with_params(threshold: u32, reset_duration: Duration) -> Self {
        Self {
            failures: AtomicU32::new(0),
            open_until_us: AtomicU64::new(0),
            threshold,
            reset_duration,
            epoch: Instant::now(),
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        let open_until = self.open_until_us.load(Ordering::Acquire);
        let now_us = self.now_us();

        if open_until > 0 && now_us < open_until {
            return CircuitState::Open;
        }
        if self.failures.load(Ordering::Acquire) >= self.threshold {
            return CircuitState::HalfOpen;
        }
        CircuitState::Closed
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Seconds remaining until `Open` transitions to `HalfOpen`. 0.0 if not open.
    #[must_use]
    pub fn remaining_open_secs(&self) -> f64 {
        let open_until = self.open_until_us.load(Ordering::Acquire);
        if open_until == 0 {
            return 0.0;
        }
        let now_us = self.now_us();
        if now_us >= open_until {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let secs = (open_until - now_us) as f64 / 1_000_000.0;
        secs
    }

    /// `Ok(())` if the circuit is closed or half-open (probe allowed), else
    /// `Err(CircuitBreakerOpen)`.
    pub fn check(&self) -> DbResult<()> {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => Err(DbError::CircuitBreakerOpen {
                message: format!(
                    "circuit open after {} consecutive failures, resets in {:.1}s",
                    self.failures.load(Ordering::Acquire),
                    self.remaining_open_secs(),
                ),
                failures: self.failures.load(Ordering::Acquire),
                reset_after_secs: self.remaining_open_secs(),
            }),
        }
    }

    /// Record success — closes the circuit.
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        self.open_until_us.store(0, Ordering::Release);
    }

    /// Record failure — may open the circuit.
    pub fn record_failure(&self) {
        let prev = self.failures.fetch_add(1, Ordering::AcqRel);
        let new_count = prev + 1;
        if new_count >= self.threshold {
            let reset_us = micros_from_duration(self.reset_duration);
            let open_until = self.now_us() + reset_us;
            self.open_until_us.store(open_until, Ordering::Release);
        }
    }

    pub fn reset(&self) {
        self.failures.store(0, Ordering::Release);
        self.open_until_us.store(0, Ordering::Release);
    }

    fn now_us(&self) -> u64 {
        micros_from_duration(self.epoch.elapsed())
    }
}

#[allow(clippy::cast_lossless, clippy::cast_possible_truncation)]
const fn micros_from_duration(d: Duration) -> u64 {
    let us = d.as_micros();
    if us > u64::MAX as u128 {
        u64::MAX
    } else {
        us as u64
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Circuit breaker for the source-database connection pool.
pub static DB_CIRCUIT: std::sync::LazyLock<CircuitBreaker> =
    std::sync::LazyLock::new(CircuitBreaker::new);

/// Circuit breaker for the generation sidecar's "is-healthy" flag.
/// Opened on TCP/DNS failure, closed by the next successful `GET /health`.
pub static SIDECAR_CIRCUIT: std::sync::LazyLock<CircuitBreaker> =
    std::sync::LazyLock::new(CircuitBreaker::new);

// ---------------------------------------------------------------------------
// Retry configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub use_circuit_breaker: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 7,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(8),
            use_circuit_breaker: true,
        }
    }
}

impl RetryConfig {
    /// `min(base_delay * 2^attempt, max_delay)` with ±25% jitter.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        #[allow(clippy::cast_possible_wrap)]
        let exponent = attempt as i32;
        let raw = base_ms.mul_add(2.0_f64.powi(exponent), 0.0).min(max_ms);

        let jitter = jitter_factor();
        let jittered = raw.mul_add(0.25 * jitter, raw);
        let clamped = jittered.max(10.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ms = clamped.max(0.0) as u64;
        Duration::from_millis(ms)
    }
}

/// LCG jitter in `[-1.0, 1.0]`; not cryptographic, only breaks synchronization.
fn jitter_factor() -> f64 {
    static SEED: AtomicU64 = AtomicU64::new(0);

    let prev = SEED.load(Ordering::Relaxed);
    if prev == 0 {
        let init = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(12345, |d| {
                let ns = d.as_nanos();
                if ns > u128::from(u64::MAX) {
                    u64::MAX
                } else {
                    #[allow(clippy::cast_possible_truncation)]
                    let v = ns as u64;
                    v
                }
            });
        SEED.compare_exchange(0, init, Ordering::Relaxed, Ordering::Relaxed)
            .ok();
    }

    let a: u64 = 6_364_136_223_846_793_005;
    let c: u64 = 1_442_695_040_888_963_407;
    let old = SEED.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
        Some(x.wrapping_mul(a).wrapping_add(c))
    });
    let val = old.unwrap_or(42);

    #[allow(clippy::cast_precision_loss)]
    let mapped = (val as f64 / u64::MAX as f64).mul_add(2.0, -1.0);
    mapped
}

/// Execute `op` with exponential backoff retries, consulting `breaker`
/// before every attempt. Synchronous; suitable for non-async call sites
/// (CLI wiring, tests). The async stages use `breaker.check()` inline
/// around their `Cx`-aware calls instead of this helper.
///
/// # Errors
/// Returns the last error if retries are exhausted or the circuit is open.
pub fn retry_sync<T, F>(config: &RetryConfig, breaker: &CircuitBreaker, mut op: F) -> DbResult<T>
where
    F: FnMut() -> DbResult<T>,
{
    let cb = if config.use_circuit_breaker {
        Some(breaker)
    } else {
        None
    };

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if let Some(cb) = cb {
            cb.check()?;
        }

        match op() {
            Ok(val) => {
                if let Some(cb) = cb {
                    if attempt > 0 {
                        cb.record_success();
                    }
                }
                return Ok(val);
            }
            Err(e) => {
                if !e.is_retryable() || attempt == config.max_retries {
                    if let Some(cb) = cb {
                        if e.is_retryable() {
                            cb.record_failure();
                        }
                    }
                    return Err(e);
                }
                if let Some(cb) = cb {
                    cb.record_failure();
                }
                last_err = Some(e);
                std::thread::sleep(self_delay(config, attempt));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| DbError::Internal("retry loop exhausted".to_string())))
}

fn self_delay(config: &RetryConfig, attempt: u32) -> Duration {
    config.delay_for_attempt(attempt)
}

// ---------------------------------------------------------------------------
// Health status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize)]
pub struct CollaboratorHealthStatus {
    pub circuit_state: String,
    pub circuit_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

#[must_use]
pub fn health_status(cb: &CircuitBreaker) -> CollaboratorHealthStatus {
    let state = cb.state();
    let failures = cb.failure_count();

    let recommendation = if state == CircuitState::Open {
        Some(
            "circuit is open; sustained failures detected — reduce concurrent load or wait for \
             the reset window to elapse"
                .to_string(),
        )
    } else {
        None
    };

    CollaboratorHealthStatus {
        circuit_state: state.to_string(),
        circuit_failures: failures,
        recommendation,
    }
}
