//! Lock-free circuit breaker, adapted from the teacher's atomics-first design
//! (state in an `AtomicU8`, counters in `AtomicU32`) to guard upstream calls
//! made by the reverse proxy and the persistence adapter.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Closed,
            1 => Self::Open,
            _ => Self::HalfOpen,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in `Closed` before tripping to `Open`.
    pub failure_threshold: u32,
    /// Consecutive successes in `HalfOpen` before closing again.
    pub success_threshold: u32,
    /// How long to stay `Open` before probing with a `HalfOpen` trial.
    pub open_duration: Duration,
    /// Concurrent trial calls allowed while `HalfOpen`.
    pub half_open_permits: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(30),
            half_open_permits: 1,
        }
    }
}

/// Per-upstream circuit breaker. Cheap to clone (internally `Arc`-backed state).
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    opened_at_ms: AtomicU64,
    half_open_permits: Arc<Semaphore>,
    started_at: Instant,
}

pub struct Permit {
    breaker_half_open: bool,
    _inner: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let permits = config.half_open_permits.max(1);
        Self {
            config,
            state: AtomicU8::new(CircuitState::Closed.as_u8()),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            half_open_permits: Arc::new(Semaphore::new(permits)),
            started_at: Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Acquire permission to attempt a call. `None` means fail fast without
    /// calling the upstream at all.
    pub fn try_acquire(&self) -> Option<Permit> {
        match self.state() {
            CircuitState::Closed => Some(Permit { breaker_half_open: false, _inner: None }),
            CircuitState::Open => {
                let opened_at = self.opened_at_ms.load(Ordering::Acquire);
                if self.now_ms().saturating_sub(opened_at)
                    >= self.config.open_duration.as_millis() as u64
                {
                    // Transition attempt to HalfOpen; whoever wins the CAS probes.
                    if self
                        .state
                        .compare_exchange(
                            CircuitState::Open.as_u8(),
                            CircuitState::HalfOpen.as_u8(),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.consecutive_successes.store(0, Ordering::Release);
                    }
                    self.try_acquire_half_open()
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => self.try_acquire_half_open(),
        }
    }

    fn try_acquire_half_open(&self) -> Option<Permit> {
        self.half_open_permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|p| Permit { breaker_half_open: true, _inner: Some(p) })
    }

    pub fn record_success(&self, permit: Permit) {
        self.consecutive_failures.store(0, Ordering::Release);
        if permit.breaker_half_open {
            let successes = self.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;
            if successes >= self.config.success_threshold {
                self.state.store(CircuitState::Closed.as_u8(), Ordering::Release);
                self.consecutive_successes.store(0, Ordering::Release);
            }
        }
    }

    pub fn record_failure(&self, permit: Permit) {
        self.consecutive_successes.store(0, Ordering::Release);
        if permit.breaker_half_open {
            self.trip();
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.config.failure_threshold {
            self.trip();
        }
    }

    fn trip(&self) {
        self.state.store(CircuitState::Open.as_u8(), Ordering::Release);
        self.opened_at_ms.store(self.now_ms(), Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }
}
