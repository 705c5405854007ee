//! When to re-list modem storage.
//!
//! [`FetchSignal`] is the one cross-task input of the bridge: any task may
//! raise it without blocking and repeated raises coalesce. [`FetchGate`] holds
//! the timing state and decides, once per loop iteration, whether `AT+CMGL`
//! may go out now.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::trace;
use tokio::time::{Duration, Instant};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(300);

/// Coalescing "please fetch" flag.
#[derive(Debug, Clone, Default)]
pub struct FetchSignal {
    raised: Arc<AtomicBool>,
}

impl FetchSignal {
    pub fn new() -> Self { Self::default() }

    pub fn raise(&self) { self.raised.store(true, Ordering::Release); }

    /// Consume the flag, returning whether it was set.
    pub fn take(&self) -> bool { self.raised.swap(false, Ordering::AcqRel) }
}

/// Inputs the gate cannot know by itself.
#[derive(Debug, Clone, Copy)]
pub struct FetchConditions {
    pub deletions_settled: bool,
    pub transport_connected: bool,
}

/// Each guard that has to pass before a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchGuard {
    TriggerPending,
    DebounceElapsed,
    DeletionsSettled,
    TransportConnected,
    CooldownElapsed,
}

#[derive(Debug)]
pub struct FetchGate {
    debounce: Duration,
    cooldown: Duration,
    interval: Option<Duration>,
    /// Time the currently pending trigger was first seen
    triggered_at: Option<Instant>,
    last_fetch: Option<Instant>,
    last_periodic: Instant,
}

impl FetchGate {
    /// `interval` of zero disables the periodic fetch.
    pub fn new(debounce: Duration, cooldown: Duration, interval: Duration, now: Instant) -> Self {
        Self {
            debounce,
            cooldown,
            interval: (!interval.is_zero()).then_some(interval),
            triggered_at: None,
            last_fetch: None,
            last_periodic: now,
        }
    }

    /// Fold a raised signal and the periodic timer into the pending trigger.
    pub fn observe(&mut self, signal: &FetchSignal, now: Instant) {
        if let Some(interval) = self.interval {
            if now.saturating_duration_since(self.last_periodic) >= interval {
                self.last_periodic = now;
                signal.raise();
            }
        }
        if signal.take() && self.triggered_at.is_none() {
            self.triggered_at = Some(now);
        }
    }

    pub fn is_pending(&self) -> bool { self.triggered_at.is_some() }

    /// First guard that blocks a fetch right now, if any.
    pub fn blocking_guard(&self, cond: FetchConditions, now: Instant) -> Option<FetchGuard> {
        let Some(triggered_at) = self.triggered_at else {
            return Some(FetchGuard::TriggerPending);
        };
        if now.saturating_duration_since(triggered_at) < self.debounce {
            return Some(FetchGuard::DebounceElapsed);
        }
        if !cond.deletions_settled {
            return Some(FetchGuard::DeletionsSettled);
        }
        if !cond.transport_connected {
            return Some(FetchGuard::TransportConnected);
        }
        if self
            .last_fetch
            .is_some_and(|last| now.saturating_duration_since(last) < self.cooldown)
        {
            return Some(FetchGuard::CooldownElapsed);
        }
        None
    }

    /// Check every guard; on success the trigger is consumed and the cooldown restarts.
    pub fn try_fetch(&mut self, cond: FetchConditions, now: Instant) -> bool {
        if let Some(guard) = self.blocking_guard(cond, now) {
            if guard != FetchGuard::TriggerPending {
                trace!("Fetch held back by {:?}", guard);
            }
            return false;
        }
        self.triggered_at = None;
        self.last_fetch = Some(now);
        true
    }
}
