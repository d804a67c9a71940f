//! Health Prober (spec §4.E): TCP/HTTP probes, EWMA latency, hysteresis state
//! machine.
//!
//! Per-worker state is tracked atomics-first, the same discipline as
//! `fleetlb_reliability::circuit_breaker` (state in an `AtomicU8`, counters in
//! `AtomicU32`), adapted here to the spec's `unknown -> healthy -> unhealthy`
//! machine. EWMA latency needs a float update with no cheap CAS, so it lives
//! behind a `parking_lot`-free `std::sync::Mutex<f64>` instead.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use fleetlb_types::model::{now_ms, HealthSnapshot, HealthStatus};
use fleetlb_types::ports::ProbeOutcome;

const EWMA_ALPHA: f64 = 0.3;

fn status_to_u8(s: HealthStatus) -> u8 {
    match s {
        HealthStatus::Unknown => 0,
        HealthStatus::Healthy => 1,
        HealthStatus::Unhealthy => 2,
    }
}

fn status_from_u8(v: u8) -> HealthStatus {
    match v {
        1 => HealthStatus::Healthy,
        2 => HealthStatus::Unhealthy,
        _ => HealthStatus::Unknown,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthThresholds {
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self { healthy_threshold: 2, unhealthy_threshold: 3 }
    }
}

/// Outcome of folding one probe result into a worker's health cell: whether
/// the terminal status changed, and if so, to what (spec §4.E: "a status
/// change ... is logged exactly once").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub changed: bool,
    pub new_status: HealthStatus,
}

/// Lock-free per-worker health state.
#[derive(Debug)]
pub struct HealthCell {
    status: AtomicU8,
    consecutive_success: AtomicU32,
    consecutive_failure: AtomicU32,
    last_probe_ms: AtomicU64,
    ewma_latency_ms: Mutex<f64>,
    bootstrapped: AtomicU8,
}

impl Default for HealthCell {
    fn default() -> Self {
        Self {
            status: AtomicU8::new(status_to_u8(HealthStatus::Unknown)),
            consecutive_success: AtomicU32::new(0),
            consecutive_failure: AtomicU32::new(0),
            last_probe_ms: AtomicU64::new(0),
            ewma_latency_ms: Mutex::new(0.0),
            bootstrapped: AtomicU8::new(0),
        }
    }
}

impl HealthCell {
    pub fn status(&self) -> HealthStatus {
        status_from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: self.status(),
            ewma_latency_ms: *self.ewma_latency_ms.lock().unwrap(),
            consecutive_success: self.consecutive_success.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            last_probe_ms: self.last_probe_ms.load(Ordering::Relaxed),
        }
    }

    fn update_ewma(&self, sample_ms: f64) {
        let mut ewma = self.ewma_latency_ms.lock().unwrap();
        if self.bootstrapped.swap(1, Ordering::AcqRel) == 0 {
            *ewma = sample_ms;
        } else {
            *ewma = EWMA_ALPHA * sample_ms + (1.0 - EWMA_ALPHA) * *ewma;
        }
    }

    /// Folds one probe result into the state machine, returning whether the
    /// terminal status changed (spec §4.E state machine).
    pub fn record(
        &self,
        outcome: ProbeOutcome,
        latency: Duration,
        thresholds: HealthThresholds,
    ) -> Transition {
        self.last_probe_ms.store(now_ms(), Ordering::Release);
        self.update_ewma(latency.as_secs_f64() * 1000.0);

        let previous = self.status();
        let new_status = match outcome {
            ProbeOutcome::Success => {
                self.consecutive_failure.store(0, Ordering::Release);
                let successes = self.consecutive_success.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= thresholds.healthy_threshold {
                    HealthStatus::Healthy
                } else {
                    previous
                }
            }
            ProbeOutcome::Failure => {
                self.consecutive_success.store(0, Ordering::Release);
                let failures = self.consecutive_failure.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= thresholds.unhealthy_threshold {
                    HealthStatus::Unhealthy
                } else {
                    previous
                }
            }
        };

        if new_status != previous {
            self.status.store(status_to_u8(new_status), Ordering::Release);
            Transition { changed: true, new_status }
        } else {
            Transition { changed: false, new_status }
        }
    }
}
