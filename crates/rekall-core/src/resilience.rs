//! Circuit breakers for foreign calls
//!
//! Protects against cascading failures when an LLM backend or other
//! external dependency is unresponsive. Three states:
//!
//!   CLOSED    -- calls pass through normally; failures are counted
//!   OPEN      -- calls are rejected immediately with `BreakerError::Open`
//!   HALF_OPEN -- exactly one probe is allowed; success closes, failure reopens
//!
//! The OPEN -> HALF_OPEN transition is lazy: it is computed when state is
//! next read, not by a timer. The guarded call runs outside the breaker's
//! lock; only O(1) bookkeeping happens inside it.

use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E>
where
    E: std::fmt::Debug + std::fmt::Display,
{
    /// Call was short-circuited by an open breaker
    #[error("Circuit breaker '{name}' is OPEN ({failures} consecutive failures)")]
    Open {
        /// Breaker name
        name: String,
        /// Consecutive failures recorded when it opened
        failures: u32,
    },
    /// The guarded call itself failed (failure was recorded)
    #[error("{0}")]
    Inner(E),
}

// ============================================================================
// BREAKER
// ============================================================================

/// Breaker state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls pass through
    Closed,
    /// Calls rejected until the recovery timeout elapses
    Open,
    /// One probe call allowed
    HalfOpen,
}

impl BreakerState {
    /// String form persisted to the state table.
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Breaker tunables.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// How long to stay open before allowing a probe
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Point-in-time view of one breaker, for diagnostics and persistence.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerStatus {
    /// Breaker name
    pub name: String,
    /// Current state (after the lazy recovery check)
    pub state: BreakerState,
    /// Consecutive failure count
    pub failure_count: u32,
}

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

enum Admission {
    Admitted,
    Rejected(u32),
}

/// Circuit breaker state machine for one named call site.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker with the given name and tunables.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Breaker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, accounting for the recovery timeout.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.refresh_state(&mut inner);
        inner.state
    }

    /// Consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().expect("breaker lock poisoned").failure_count
    }

    /// Whether the breaker currently rejects calls.
    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }

    /// Execute `f` through the breaker.
    ///
    /// CLOSED and the single HALF_OPEN probe run `f`; success resets the
    /// breaker, failure records and may open it. OPEN rejects immediately
    /// without invoking `f`.
    pub fn call<T, E, F>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        E: std::fmt::Debug + std::fmt::Display,
        F: FnOnce() -> Result<T, E>,
    {
        match self.begin_call() {
            Admission::Rejected(failures) => Err(BreakerError::Open {
                name: self.name.clone(),
                failures,
            }),
            Admission::Admitted => match f() {
                Ok(value) => {
                    self.record_success();
                    Ok(value)
                }
                Err(e) => {
                    self.record_failure();
                    Err(BreakerError::Inner(e))
                }
            },
        }
    }

    /// Manually record a failure (increments counter, may open breaker).
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        let was_probe = inner.probe_in_flight || inner.state == BreakerState::HalfOpen;
        inner.probe_in_flight = false;
        if was_probe || inner.failure_count >= self.config.failure_threshold {
            if inner.state != BreakerState::Open {
                inner.opened_at = Some(Instant::now());
            }
            inner.state = BreakerState::Open;
        }
    }

    /// Manually record a success (resets failure counter, closes breaker).
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.failure_count = 0;
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Force the breaker back to CLOSED with zero failures.
    pub fn reset(&self) {
        self.record_success();
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.last_failure = None;
    }

    /// Snapshot for diagnostics.
    pub fn status(&self) -> BreakerStatus {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.refresh_state(&mut inner);
        BreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
        }
    }

    // ------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------

    /// Apply the lazy OPEN -> HALF_OPEN transition.
    fn refresh_state(&self, inner: &mut BreakerInner) {
        if inner.state == BreakerState::Open {
            if let Some(last) = inner.last_failure {
                if last.elapsed() >= self.config.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = false;
                }
            }
        }
    }

    fn begin_call(&self) -> Admission {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        self.refresh_state(&mut inner);
        match inner.state {
            BreakerState::Closed => Admission::Admitted,
            BreakerState::Open => Admission::Rejected(inner.failure_count),
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Rejected(inner.failure_count)
                } else {
                    inner.probe_in_flight = true;
                    Admission::Admitted
                }
            }
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Named breaker registry. The first caller for a name wins its
/// configuration; subsequent callers get the same instance.
pub struct BreakerRegistry {
    default_config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create a registry whose breakers default to `config`.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            default_config: config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the breaker for `name` with the registry default
    /// configuration.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_with(name, self.default_config.clone())
    }

    /// Get or create the breaker for `name`. `config` only applies when
    /// this call creates the breaker.
    pub fn get_with(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("registry lock poisoned");
        Arc::clone(
            breakers
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config))),
        )
    }

    /// Snapshot every registered breaker.
    pub fn snapshot(&self) -> Vec<BreakerStatus> {
        let breakers = self.breakers.lock().expect("registry lock poisoned");
        let mut statuses: Vec<BreakerStatus> = breakers.values().map(|b| b.status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Names of breakers currently OPEN.
    pub fn open_breakers(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|s| s.state == BreakerState::Open)
            .map(|s| s.name)
            .collect()
    }

    /// Mirror the current breaker states into the `circuit_breaker_state`
    /// table for out-of-process diagnostics.
    pub fn persist_state(&self, conn: &Connection) -> rusqlite::Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        for status in self.snapshot() {
            conn.execute(
                "INSERT OR REPLACE INTO circuit_breaker_state
                 (name, state, failure_count, opened_at, updated_at)
                 VALUES (?1, ?2, ?3, NULL, ?4)",
                rusqlite::params![
                    status.name,
                    status.state.as_str(),
                    status.failure_count,
                    now
                ],
            )?;
        }
        Ok(())
    }

    /// Clear every registered breaker (mainly for tests).
    pub fn reset_all(&self) {
        self.breakers.lock().expect("registry lock poisoned").clear();
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
