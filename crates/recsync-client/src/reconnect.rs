//! Reconnection Policy: bounded attempts with capped exponential backoff.
//!
//! The policy owns its single-shot timer. When the timer expires it sends the
//! epoch it was armed under; [`ReconnectPolicy::fire`] only accepts the
//! current epoch, so a due signal already queued when the timer was cancelled
//! is discarded.

use std::time::Duration;

use recsync_core::backoff::calculate_backoff_delay;
use recsync_core::{ReconnectPhase, ReconnectState, SyncConfig};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What to do about a connection fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultDecision {
    /// Retry after `delay`; `attempt` is 1-based within the outage.
    Retry { attempt: u32, delay: Duration },
    /// Budget spent. No further automatic retries.
    Exhausted { attempts: u32 },
}

pub struct ReconnectPolicy {
    attempts: u32,
    max_attempts: u32,
    base_delay_ms: u64,
    cap_delay_ms: u64,
    next_delay_ms: u64,
    phase: ReconnectPhase,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

impl ReconnectPolicy {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            attempts: 0,
            max_attempts: config.max_reconnect_attempts,
            base_delay_ms: config.base_delay_ms,
            cap_delay_ms: config.cap_delay_ms,
            next_delay_ms: 0,
            phase: ReconnectPhase::Idle,
            epoch: 0,
            timer: None,
        }
    }

    pub fn state(&self) -> ReconnectState {
        ReconnectState {
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            next_delay_ms: self.next_delay_ms,
            phase: self.phase,
        }
    }

    pub fn phase(&self) -> ReconnectPhase {
        self.phase
    }

    pub fn is_exhausted(&self) -> bool {
        self.phase == ReconnectPhase::Exhausted
    }

    /// Decide on a fault. Does not arm the timer; see [`Self::schedule`].
    pub fn on_fault(&mut self) -> FaultDecision {
        self.cancel();
        if self.is_exhausted() || self.attempts >= self.max_attempts {
            self.phase = ReconnectPhase::Exhausted;
            self.next_delay_ms = 0;
            warn!(attempts = self.attempts, "reconnection budget exhausted");
            return FaultDecision::Exhausted {
                attempts: self.attempts,
            };
        }

        self.attempts += 1;
        let delay_ms = calculate_backoff_delay(self.attempts, self.base_delay_ms, self.cap_delay_ms);
        self.next_delay_ms = delay_ms;
        FaultDecision::Retry {
            attempt: self.attempts,
            delay: Duration::from_millis(delay_ms),
        }
    }

    /// Arm the one-shot timer. On expiry the current epoch is sent on `due`.
    pub fn schedule(&mut self, delay: Duration, due: mpsc::UnboundedSender<u64>) {
        self.cancel();
        self.epoch += 1;
        self.phase = ReconnectPhase::Scheduled;
        let epoch = self.epoch;
        debug!(epoch, delay_ms = delay.as_millis() as u64, "reconnect timer armed");
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = due.send(epoch);
        }));
    }

    /// Timer expiry. Returns `true` if the reconnect should happen now.
    pub fn fire(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.phase != ReconnectPhase::Scheduled {
            debug!(epoch, current = self.epoch, "stale reconnect timer ignored");
            return false;
        }
        self.timer = None;
        self.phase = ReconnectPhase::Idle;
        true
    }

    /// A connection opened: the outage is over.
    pub fn on_connected(&mut self) {
        self.cancel();
        self.attempts = 0;
        self.next_delay_ms = 0;
        self.phase = ReconnectPhase::Idle;
    }

    /// Cancel a pending timer. Takes effect immediately: the timer task is
    /// aborted and any due signal it already sent becomes stale.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.epoch += 1;
        if self.phase == ReconnectPhase::Scheduled {
            self.phase = ReconnectPhase::Idle;
        }
    }

    /// Back to a fresh policy, as after a manual restart.
    pub fn reset(&mut self) {
        self.cancel();
        self.attempts = 0;
        self.next_delay_ms = 0;
        self.phase = ReconnectPhase::Idle;
    }
}

impl Drop for ReconnectPolicy {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
