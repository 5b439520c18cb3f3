//! External adapter contracts
//!
//! The engine exposes capabilities to adapters, not end-user surfaces:
//! notification transport and LLM backends live outside the crate and
//! plug in through these traits. Every LLM call site goes through a
//! named circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use crate::resilience::{BreakerError, CircuitBreaker};

/// Best-effort notification transport (Pushover, email, ...).
pub trait Notifier: Send + Sync {
    /// Send a notification. Returns whether the transport accepted it.
    fn send(&self, title: &str, body: &str) -> bool;
}

/// Fallback notifier that writes to stdout. Used when no transport is
/// configured or the configured one fails.
#[derive(Debug, Clone, Default)]
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn send(&self, title: &str, body: &str) -> bool {
        println!("[{title}]\n{body}");
        true
    }
}

/// LLM call failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("LLM call failed: {0}")]
pub struct LlmError(pub String);

/// A prompt-in, text-out LLM backend. The caller provides the timeout;
/// the breaker adds no timeout of its own.
pub trait LlmClient: Send + Sync {
    /// Ask the model and return its raw text reply.
    fn ask(&self, prompt: &str, timeout: Duration) -> Result<String, LlmError>;
}

/// An [`LlmClient`] wrapped by a named circuit breaker. All outbound LLM
/// calls go through one of these.
pub struct GuardedLlm {
    client: Arc<dyn LlmClient>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedLlm {
    /// Wrap `client` with `breaker`.
    pub fn new(client: Arc<dyn LlmClient>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { client, breaker }
    }

    /// Ask through the breaker: rejected immediately when it is open,
    /// failures recorded otherwise.
    pub fn ask(&self, prompt: &str, timeout: Duration) -> Result<String, BreakerError<LlmError>> {
        self.breaker.call(|| self.client.ask(prompt, timeout))
    }

    /// The breaker guarding this client.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

// ============================================================================
// TESTS
// ============================================================================
