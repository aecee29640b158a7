//! Per-provider circuit breaker.
//!
//! Keeps a repeatedly failing provider out of the failover rotation for a
//! while instead of burning rate-limit budget on it. Three states:
//!
//! - **Closed**: requests flow normally.
//! - **Open**: the provider is skipped during routing.
//! - **HalfOpen**: after the recovery timeout, trial requests are let
//!   through; enough successes close the circuit, one failure reopens it.
//!
//! State is in-memory only and resets on restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

/// Circuit state for routing decisions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    trial_successes: u32,
    last_failure: Option<Instant>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            trial_successes: 0,
            last_failure: None,
        }
    }
}

/// Circuit breaker tuning.
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit blocks before allowing trial requests.
    pub recovery_timeout: Duration,
    /// Trial successes required to close a half-open circuit.
    pub trial_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            trial_success_threshold: 2,
        }
    }
}

/// Thread-safe per-provider circuit breaker.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        // Recover from poison: stale breaker state beats a panic.
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether the provider may be called right now. Transitions an expired
    /// Open circuit to HalfOpen as a side effect.
    pub fn is_allowed(&self, provider: &str) -> bool {
        let mut circuits = self.lock();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = circuit
                    .last_failure
                    .is_some_and(|at| at.elapsed() >= self.config.recovery_timeout);
                if expired {
                    info!("Circuit for '{}' moving Open -> HalfOpen", provider);
                    circuit.state = CircuitState::HalfOpen;
                    circuit.trial_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, provider: &str) {
        let mut circuits = self.lock();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                circuit.trial_successes += 1;
                if circuit.trial_successes >= self.config.trial_success_threshold {
                    info!("Circuit for '{}' closing after recovery", provider);
                    *circuit = Circuit::new();
                }
            }
            CircuitState::Open => {
                debug!("Ignoring success for '{}' while circuit open", provider);
            }
        }
    }

    pub fn record_failure(&self, provider: &str) {
        let mut circuits = self.lock();
        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        circuit.consecutive_failures += 1;
        circuit.last_failure = Some(Instant::now());

        match circuit.state {
            CircuitState::Closed => {
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    info!(
                        "Circuit for '{}' opening after {} consecutive failures",
                        provider, circuit.consecutive_failures
                    );
                    circuit.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                info!("Circuit for '{}' reopening after trial failure", provider);
                circuit.state = CircuitState::Open;
                circuit.trial_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        self.lock()
            .get(provider)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Force a circuit back to Closed.
    pub fn reset(&self, provider: &str) {
        if let Some(circuit) = self.lock().get_mut(provider) {
            *circuit = Circuit::new();
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: Duration::from_millis(10),
            trial_success_threshold: 2,
        })
    }

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::new();
        assert!(cb.is_allowed("P"));
        assert_eq!(cb.state("P"), CircuitState::Closed);
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker(3);
        cb.record_failure("P");
        cb.record_failure("P");
        assert!(cb.is_allowed("P"));
        cb.record_failure("P");
        assert!(!cb.is_allowed("P"));
        assert_eq!(cb.state("P"), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = breaker(3);
        cb.record_failure("P");
        cb.record_failure("P");
        cb.record_success("P");
        cb.record_failure("P");
        cb.record_failure("P");
        assert_eq!(cb.state("P"), CircuitState::Closed);
    }

    #[test]
    fn test_recovers_through_half_open() {
        let cb = breaker(1);
        cb.record_failure("P");
        assert!(!cb.is_allowed("P"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.is_allowed("P"));
        assert_eq!(cb.state("P"), CircuitState::HalfOpen);

        cb.record_success("P");
        assert_eq!(cb.state("P"), CircuitState::HalfOpen);
        cb.record_success("P");
        assert_eq!(cb.state("P"), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1);
        cb.record_failure("P");
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.is_allowed("P"));

        cb.record_failure("P");
        assert_eq!(cb.state("P"), CircuitState::Open);
    }

    #[test]
    fn test_providers_are_isolated() {
        let cb = breaker(1);
        cb.record_failure("A");
        assert!(!cb.is_allowed("A"));
        assert!(cb.is_allowed("B"));
    }

    #[test]
    fn test_manual_reset() {
        let cb = breaker(1);
        cb.record_failure("P");
        assert_eq!(cb.state("P"), CircuitState::Open);
        cb.reset("P");
        assert_eq!(cb.state("P"), CircuitState::Closed);
        assert!(cb.is_allowed("P"));
    }
}
