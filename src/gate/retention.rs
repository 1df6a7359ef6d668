//! Request retention: the per-request gate state machine.
//!
//! ```text
//! PASSTHROUGH ──────────────────────────────► RESOLVED(Forward)
//!      │ enabled
//!      ▼
//!  DECIDING ── bypass ──────────────────────► RESOLVED(Forward)
//!      │ deny, timeout == 0 ────────────────► RESOLVED(MaintenanceResponse)
//!      │ deny, timeout > 0
//!      ▼
//!  HOLDING ── disabled observed ────────────► RESOLVED(Forward)
//!          ── deadline / cancellation ──────► RESOLVED(MaintenanceResponse)
//! ```
//!
//! A held request waits on whichever fires first: the cancellation token,
//! the deadline, a toggle notification, or the periodic poll. The poll
//! interval bounds release latency even if a notification is missed.
//! Releasing does not re-run the access decision: once maintenance is off,
//! every held request is forwarded.
//!
//! If the request future is dropped while held (client disconnect), the
//! [`HeldRequest`] guard still records the exit.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::decision::{AccessDecision, AccessPolicy, RequestFacts};
use super::state::MaintenanceState;
use crate::metrics;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Passthrough,
    Deciding,
    Holding,
    Resolved(Resolution),
}

/// Terminal result of [`RetentionGate::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Forward,
    MaintenanceResponse,
}

/// How a hold ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldExit {
    /// Maintenance was disabled while held.
    Released,
    TimedOut,
    Cancelled,
}

impl HoldExit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Released => "released",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }

    fn resolution(self) -> Resolution {
        match self {
            Self::Released => Resolution::Forward,
            Self::TimedOut | Self::Cancelled => Resolution::MaintenanceResponse,
        }
    }
}

/// Guard for one request in the HOLDING phase.
///
/// Counts itself in the held-request gauge for as long as it lives and
/// records the hold duration on drop. A guard dropped without an exit
/// (the request future was dropped) is recorded as `abandoned`.
#[derive(Debug)]
pub struct HeldRequest {
    started: Instant,
    exit: Option<HoldExit>,
    held: Arc<AtomicUsize>,
}

impl HeldRequest {
    fn enter(held: &Arc<AtomicUsize>) -> Self {
        held.fetch_add(1, Ordering::Relaxed);
        metrics::increment_held_requests();
        Self {
            started: Instant::now(),
            exit: None,
            held: Arc::clone(held),
        }
    }

    fn finish(mut self, exit: HoldExit) -> HoldExit {
        self.exit = Some(exit);
        exit
    }
}

impl Drop for HeldRequest {
    fn drop(&mut self) {
        self.held.fetch_sub(1, Ordering::Relaxed);
        metrics::decrement_held_requests();

        let label = self.exit.map_or("abandoned", HoldExit::as_str);
        let elapsed = self.started.elapsed();
        metrics::record_hold_duration(label, elapsed.as_secs_f64());
        debug!(exit = label, held_secs = elapsed.as_secs_f64(), "Hold ended");
    }
}

/// Decides, per request, between forwarding and the maintenance response,
/// holding denied requests open while retention is configured.
#[derive(Debug)]
pub struct RetentionGate {
    state: Arc<MaintenanceState>,
    policy: AccessPolicy,
    poll_interval: Duration,
    held: Arc<AtomicUsize>,
}

impl RetentionGate {
    pub fn new(state: Arc<MaintenanceState>, policy: AccessPolicy, poll_interval: Duration) -> Self {
        let poll_interval = if poll_interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            poll_interval
        };

        Self {
            state,
            policy,
            poll_interval,
            held: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> &Arc<MaintenanceState> {
        &self.state
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Number of requests currently held.
    pub fn held_requests(&self) -> usize {
        self.held.load(Ordering::Relaxed)
    }

    /// Run one request through the gate.
    ///
    /// `cancel` is the host's cancellation signal (server shutdown). It
    /// releases held requests into the maintenance response.
    pub async fn evaluate(&self, request: &RequestFacts<'_>, cancel: &CancellationToken) -> Resolution {
        let snapshot = self.state.snapshot();

        if !snapshot.enabled {
            trace!(phase = ?GatePhase::Passthrough, "Maintenance disabled");
            metrics::record_gate_outcome("passthrough");
            return Resolution::Forward;
        }

        trace!(phase = ?GatePhase::Deciding, path = request.path);
        if let AccessDecision::Bypass(reason) = self.policy.decide(request).await {
            metrics::record_gate_outcome(reason.as_str());
            return Resolution::Forward;
        }

        if !snapshot.retains() {
            metrics::record_gate_outcome("maintenance");
            return Resolution::MaintenanceResponse;
        }

        let timeout = Duration::from_secs(snapshot.retention_timeout_secs);
        trace!(phase = ?GatePhase::Holding, timeout_secs = snapshot.retention_timeout_secs);
        let exit = self.hold(timeout, cancel).await;
        let resolution = exit.resolution();

        trace!(phase = ?GatePhase::Resolved(resolution), exit = exit.as_str());
        metrics::record_gate_outcome(match resolution {
            Resolution::Forward => "released",
            Resolution::MaintenanceResponse => "maintenance",
        });
        resolution
    }

    async fn hold(&self, timeout: Duration, cancel: &CancellationToken) -> HoldExit {
        let held = HeldRequest::enter(&self.held);

        let deadline = sleep(timeout);
        tokio::pin!(deadline);

        let mut poll = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            // Register for the next toggle before reading, so a toggle
            // between the read and the select is not lost.
            let changed = self.state.changed();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if !self.state.is_enabled() {
                break HoldExit::Released;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break HoldExit::Cancelled,
                () = &mut deadline => break HoldExit::TimedOut,
                () = &mut changed => {}
                _ = poll.tick() => {}
            }
        };

        held.finish(exit)
    }
}
