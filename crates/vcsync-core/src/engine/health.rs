//! Scheduling-loop health
//!
//! Tracks whether the next iteration must run a full reconciliation and
//! whether the external sessions must be torn down first.

use chrono::{DateTime, Utc};

/// Where the loop stands with respect to convergence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncHealth {
    /// No full reconciliation has succeeded yet
    Startup,
    /// Converged; change events are applied incrementally
    Healthy,
    /// Something was missed; the next iteration runs a full pass
    ResyncPending,
    /// Sessions are gone; reconnect, then run a full pass
    Reconnecting,
}

/// Health state plus the bookkeeping around it
#[derive(Debug, Clone)]
pub struct HealthTracker {
    state: SyncHealth,
    startup: bool,
    consecutive_failures: u32,
    last_full_sync: Option<DateTime<Utc>>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self {
            state: SyncHealth::Startup,
            startup: true,
            consecutive_failures: 0,
            last_full_sync: None,
        }
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncHealth {
        self.state
    }

    /// True until the first full reconciliation succeeds, across reconnects
    pub fn is_startup(&self) -> bool {
        self.startup
    }

    pub fn needs_full_sync(&self) -> bool {
        self.state != SyncHealth::Healthy
    }

    pub fn needs_reconnect(&self) -> bool {
        self.state == SyncHealth::Reconnecting
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_full_sync(&self) -> Option<DateTime<Utc>> {
        self.last_full_sync
    }

    /// An event could not be applied
    pub fn request_resync(&mut self) {
        if self.state == SyncHealth::Healthy {
            self.state = SyncHealth::ResyncPending;
        }
    }

    /// A transport failure was detected
    pub fn connectivity_fault(&mut self) {
        self.state = SyncHealth::Reconnecting;
    }

    /// Both sessions are established again
    pub fn reconnected(&mut self) {
        if self.state == SyncHealth::Reconnecting {
            self.state = if self.startup {
                SyncHealth::Startup
            } else {
                SyncHealth::ResyncPending
            };
        }
    }

    /// A full pass completed; returns whether it was the first one
    pub fn reconcile_succeeded(&mut self) -> bool {
        let first = self.startup;
        self.state = SyncHealth::Healthy;
        self.startup = false;
        self.consecutive_failures = 0;
        self.last_full_sync = Some(Utc::now());
        first
    }

    /// A full pass failed; the pending state is kept
    pub fn reconcile_failed(&mut self, connectivity: bool) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if connectivity {
            self.connectivity_fault();
        }
    }
}
