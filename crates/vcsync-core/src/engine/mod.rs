//! Scheduling loop
//!
//! The SyncEngine owns the reconciliation state and is the only writer to it.
//! One loop alternates between three phases:
//!
//! ```text
//!            ┌──────────────┐
//!      ┌────►│ leader check │── lost ──► Err(LeadershipLost)
//!      │     └──────┬───────┘
//!      │            ▼
//!      │     ┌──────────────┐
//!      │     │   connect    │── not ready ──► sleep(retry) ─┐
//!      │     └──────┬───────┘                               │
//!      │            ▼                                       │
//!      │     ┌──────────────┐                               │
//!      │     │ full pass    │  (startup, resync, periodic)  │
//!      │     └──────┬───────┘                               │
//!      │            ▼                                       │
//!      │     ┌──────────────┐                               │
//!      └─────┤ event wait   │◄──────────────────────────────┘
//!            └──────────────┘
//! ```
//!
//! Event application and full reconciliation never overlap. The dataplane
//! keepalive runs on its own task and only reads the store.

pub mod health;
pub mod watchdog;

pub use health::{HealthTracker, SyncHealth};

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::classifier::{EventClassifier, EventOutcome, SUBSCRIBED_EVENTS};
use crate::config::{EngineConfig, OperatingMode, SyncConfig, SyncStrategy};
use crate::diff::{MergeOptions, MergeReport, reconcile};
use crate::error::{Error, Result};
use crate::lifecycle::SyncContext;
use crate::model::{MachineMap, NetworkMap};
use crate::notifier::DataplaneNotifier;
use crate::snapshot::{SnapshotBuilder, network_snapshot};
use crate::state::{AgentRegistry, ReconciliationStore};
use crate::traits::{
    AgentConnector, ChangeEvent, ControllerClient, EventStream, LeaderElector, ManagementPlane,
};

/// Events emitted by the SyncEngine for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Loop started
    Started { mode: OperatingMode },

    /// Session to an external system established
    Connected { system: String },

    /// Session could not be established; retried next iteration
    ConnectFailed { system: String, error: String },

    /// Full reconciliation started
    ReconcileStarted { startup: bool },

    /// Full reconciliation finished
    ReconcileCompleted {
        networks: MergeReport,
        machines: MergeReport,
        /// Ports re-sent to agents after the first pass
        replayed: usize,
        finished_at: DateTime<Utc>,
    },

    /// Full reconciliation failed; it is retried on the next iteration
    ReconcileFailed { error: String, reconnect: bool },

    /// Change event applied
    EventApplied { event_type: String, outcome: EventOutcome },

    /// Change event could not be applied
    EventFailed { event_type: String, error: String },

    /// A full pass was scheduled
    ResyncRequested { reason: String },

    /// Another instance leads; the process must restart
    LeadershipLost,

    /// Loop stopped
    Stopped { reason: String },
}

/// What a full reconciliation did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub networks: MergeReport,
    pub machines: MergeReport,
    /// Stale cache entries dropped after the pass
    pub pruned: usize,
}

/// External collaborators the engine drives
#[derive(Clone)]
pub struct SyncComponents {
    pub management: Arc<dyn ManagementPlane>,
    pub controller: Arc<dyn ControllerClient>,
    pub connector: Arc<dyn AgentConnector>,
    pub leader: Arc<dyn LeaderElector>,
    /// Host → agent mapping, usually loaded from the mapping file
    pub agents: AgentRegistry,
}

/// Per-run loop state; owned by the running loop only
struct LoopState {
    health: HealthTracker,
    controller_ready: bool,
    management_ready: bool,
    events: Option<EventStream>,
}

impl LoopState {
    fn new() -> Self {
        Self {
            health: HealthTracker::new(),
            controller_ready: false,
            management_ready: false,
            events: None,
        }
    }

    fn ready(&self) -> bool {
        self.controller_ready && self.management_ready
    }

    /// Drop both sessions so the next connect phase starts from scratch
    fn teardown(&mut self) {
        self.controller_ready = false;
        self.management_ready = false;
        self.events = None;
    }
}

/// Aborts the keepalive task when the loop exits, however it exits
struct KeepaliveTask(JoinHandle<()>);

impl Drop for KeepaliveTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Start with [`SyncEngine::run()`]
/// 3. Runs until a shutdown signal or loss of leadership
pub struct SyncEngine {
    management: Arc<dyn ManagementPlane>,
    leader: Arc<dyn LeaderElector>,
    ctx: SyncContext,
    agents: AgentRegistry,
    builder: SnapshotBuilder,
    classifier: EventClassifier,
    mode: OperatingMode,
    config: EngineConfig,
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create a new engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields [`SyncEvent`]s
    pub fn new(
        components: SyncComponents,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let store = ReconciliationStore::new();
        let notifier = DataplaneNotifier::new(components.connector);
        let ctx = SyncContext::new(components.controller, notifier, store);
        let builder = SnapshotBuilder::new(components.agents.clone(), config.engine.agent_vm_marker.clone());
        let classifier = EventClassifier::new(
            components.management.clone(),
            components.agents.clone(),
            builder.clone(),
        );

        let engine = Self {
            management: components.management,
            leader: components.leader,
            ctx,
            agents: components.agents,
            builder,
            classifier,
            mode: config.mode,
            config: config.engine,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Cached reconciliation state, for introspection
    pub fn store(&self) -> &ReconciliationStore {
        &self.ctx.store
    }

    /// Host → agent mapping in use
    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Run the loop until SIGINT or loss of leadership
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error::LeadershipLost)`: Another instance leads; restart the process
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the loop with a controlled shutdown signal
    ///
    /// **TESTING ONLY**: the daemon uses [`SyncEngine::run()`], which stops
    /// on OS signals.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.emit_event(SyncEvent::Started { mode: self.mode });
        info!(mode = ?self.mode, strategy = ?self.config.strategy, "Reconciler started");

        let _keepalive = self.spawn_keepalive();
        let mut state = LoopState::new();

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(SyncEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    return Ok(());
                }

                result = self.iteration(&mut state) => {
                    if let Err(e) = result {
                        error!("Scheduling loop stopped: {}", e);
                        self.emit_event(SyncEvent::Stopped { reason: e.to_string() });
                        return Err(e);
                    }
                }
            }
        }
    }

    /// One pass through leader check, connect, full pass and event wait
    ///
    /// Only loss of leadership escapes as an error.
    async fn iteration(&self, state: &mut LoopState) -> Result<()> {
        if !self.leader.is_leader().await {
            warn!("Leadership lost");
            self.emit_event(SyncEvent::LeadershipLost);
            return Err(Error::LeadershipLost);
        }

        self.connect_phase(state).await;
        if !state.ready() {
            tokio::time::sleep(self.config.retry_interval()).await;
            return Ok(());
        }

        let periodic = matches!(self.config.strategy, SyncStrategy::Periodic { .. });
        if periodic || state.health.needs_full_sync() {
            if !self.reconcile_phase(state).await {
                tokio::time::sleep(self.config.retry_interval()).await;
                return Ok(());
            }
        }

        match self.config.strategy {
            SyncStrategy::Periodic { interval_ms } => {
                tokio::time::sleep(std::time::Duration::from_millis(interval_ms)).await;
            }
            SyncStrategy::EventDriven => self.event_phase(state).await,
        }
        Ok(())
    }

    async fn connect_phase(&self, state: &mut LoopState) {
        let bound = self.config.connect_bound();

        if !state.controller_ready {
            let controller = self.ctx.controller.name();
            match watchdog::watch("controller connect", bound, self.ctx.controller.connect()).await {
                Ok(()) => {
                    info!(controller, "Connected to controller");
                    state.controller_ready = true;
                    self.emit_event(SyncEvent::Connected {
                        system: controller.to_string(),
                    });
                }
                Err(e) => {
                    warn!(controller, "Controller connect failed: {}", e);
                    self.emit_event(SyncEvent::ConnectFailed {
                        system: controller.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if !state.management_ready {
            let system = self.management.name();
            let connect = async {
                self.management.connect().await?;
                match self.config.strategy {
                    SyncStrategy::EventDriven => self.management.subscribe(SUBSCRIBED_EVENTS).await.map(Some),
                    SyncStrategy::Periodic { .. } => Ok(None),
                }
            };
            match watchdog::watch("management connect", bound, connect).await {
                Ok(events) => {
                    info!(system, "Connected to management plane");
                    state.management_ready = true;
                    state.events = events;
                    self.emit_event(SyncEvent::Connected {
                        system: system.to_string(),
                    });
                }
                Err(e) => {
                    warn!(system, "Management plane connect failed: {}", e);
                    self.emit_event(SyncEvent::ConnectFailed {
                        system: system.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if state.ready() && state.health.needs_reconnect() {
            state.health.reconnected();
        }
    }

    /// Returns false when the pass failed
    async fn reconcile_phase(&self, state: &mut LoopState) -> bool {
        let startup = state.health.is_startup();
        self.emit_event(SyncEvent::ReconcileStarted { startup });

        self.ctx.notifier.begin_pass().await;
        let read_timeout = self.config.reconcile_read_timeout();
        if read_timeout.is_some() {
            self.management.set_read_timeout(read_timeout);
        }
        let result = watchdog::watch(
            "full reconciliation",
            self.config.reconcile_bound(),
            self.reconcile_full(),
        )
        .await;
        if read_timeout.is_some() {
            self.management.set_read_timeout(None);
        }

        match result {
            Ok(summary) => {
                let replayed = if state.health.reconcile_succeeded() {
                    let replayed = self.ctx.notifier.replay_all(&self.ctx.store).await;
                    info!(ports = replayed, "Startup port replay complete");
                    replayed
                } else {
                    0
                };
                self.emit_event(SyncEvent::ReconcileCompleted {
                    networks: summary.networks,
                    machines: summary.machines,
                    replayed,
                    finished_at: Utc::now(),
                });
                true
            }
            Err(e) => {
                let reconnect = e.is_connectivity_fault();
                state.health.reconcile_failed(reconnect);
                if reconnect {
                    state.teardown();
                }
                error!(
                    reconnect,
                    failures = state.health.consecutive_failures(),
                    "Full reconciliation failed: {}",
                    e
                );
                self.emit_event(SyncEvent::ReconcileFailed {
                    error: e.to_string(),
                    reconnect,
                });
                false
            }
        }
    }

    async fn event_phase(&self, state: &mut LoopState) {
        if !self.ctx.controller.is_alive().await {
            warn!(controller = self.ctx.controller.name(), "Controller not alive");
            self.escalate(state, "controller not alive", true);
            return;
        }

        let Some(events) = state.events.as_mut() else {
            self.escalate(state, "no event subscription", true);
            return;
        };

        let batch = match tokio::time::timeout(self.config.event_wait(), events.next()).await {
            Err(_) => {
                debug!("No change events");
                return;
            }
            Ok(Some(Ok(batch))) => batch,
            Ok(Some(Err(e))) => {
                warn!("Event subscription failed: {}", e);
                self.escalate(state, &format!("event subscription failed: {e}"), true);
                return;
            }
            Ok(None) => {
                warn!("Event subscription ended");
                self.escalate(state, "event subscription ended", true);
                return;
            }
        };

        for event in &batch {
            if let Err(e) = self.handle_event(event).await {
                let reconnect = e.is_connectivity_fault();
                self.escalate(state, &format!("{} failed: {}", event.event_type, e), reconnect);
                if reconnect {
                    break;
                }
            }
        }
    }

    /// Schedule a full pass, and a reconnect before it if asked
    fn escalate(&self, state: &mut LoopState, reason: &str, reconnect: bool) {
        if reconnect {
            state.health.connectivity_fault();
            state.teardown();
        } else {
            state.health.request_resync();
        }
        info!(reconnect, "Resync requested: {}", reason);
        self.emit_event(SyncEvent::ResyncRequested {
            reason: reason.to_string(),
        });
    }

    /// Apply one change event to the reconciliation state
    pub async fn handle_event(&self, event: &ChangeEvent) -> Result<EventOutcome> {
        match self.classifier.apply(event, &self.ctx).await {
            Ok(outcome) => {
                match &outcome {
                    EventOutcome::Ignored(reason) => {
                        debug!(key = event.key, event_type = %event.event_type, "Event ignored: {}", reason)
                    }
                    _ => debug!(key = event.key, event_type = %event.event_type, ?outcome, "Event applied"),
                }
                self.emit_event(SyncEvent::EventApplied {
                    event_type: event.event_type.clone(),
                    outcome: outcome.clone(),
                });
                Ok(outcome)
            }
            Err(e) => {
                error!(key = event.key, event_type = %event.event_type, "Failed to apply event: {}", e);
                self.emit_event(SyncEvent::EventFailed {
                    event_type: event.event_type.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Run a full bidirectional reconciliation, networks before machines
    ///
    /// In management-only mode the previous state is what the controller
    /// holds under the creator tag; otherwise it is the local cache and
    /// nothing is deleted remotely.
    pub async fn reconcile_full(&self) -> Result<ReconcileSummary> {
        let creator = self.config.creator_tag.as_str();
        let options = MergeOptions::full(self.mode.propagates_deletes());

        let new_networks = network_snapshot(self.management.as_ref()).await?;
        let old_networks: NetworkMap = match self.mode {
            OperatingMode::ManagementOnly => self
                .ctx
                .controller
                .list_networks(creator)
                .await?
                .into_iter()
                .map(|n| (n.id, n))
                .collect(),
            OperatingMode::ManagementAsCompute => self.ctx.store.networks().await,
        };
        let networks = reconcile(&old_networks, &new_networks, &(), options, &self.ctx).await;

        // Machines resolve their cards against the networks just reconciled
        let managed = self.ctx.store.networks().await;
        let new_machines = self
            .builder
            .machine_snapshot(self.management.as_ref(), &managed)
            .await?;
        let old_machines: MachineMap = match self.mode {
            OperatingMode::ManagementOnly => self
                .ctx
                .controller
                .list_machines(creator)
                .await?
                .into_iter()
                .map(|m| (m.id, m))
                .collect(),
            OperatingMode::ManagementAsCompute => self.ctx.store.machines().await,
        };
        let machines = reconcile(&old_machines, &new_machines, &(), options, &self.ctx).await;

        let network_ids: HashSet<_> = new_networks.keys().copied().collect();
        let machine_ids: HashSet<_> = new_machines.keys().copied().collect();
        let pruned = self.ctx.store.retain_networks(|id| network_ids.contains(id)).await
            + self.ctx.store.retain_machines(|id| machine_ids.contains(id)).await;

        let (network_count, machine_count) = self.ctx.store.counts().await;
        info!(
            networks = network_count,
            machines = machine_count,
            network_changes = networks.total() - networks.retained,
            machine_changes = machines.total() - machines.retained,
            failed = networks.failed + machines.failed,
            pruned,
            "Full reconciliation complete"
        );

        Ok(ReconcileSummary {
            networks,
            machines,
            pruned,
        })
    }

    fn spawn_keepalive(&self) -> KeepaliveTask {
        let notifier = self.ctx.notifier.clone();
        let agents = self.agents.clone();
        let store = self.ctx.store.clone();
        let interval = self.config.keepalive_interval();
        let bound = self.config.keepalive_bound();

        KeepaliveTask(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = watchdog::watch("keepalive", bound, notifier.keepalive(&agents, &store)).await;
                debug!(
                    probed = report.probed,
                    live = report.live,
                    recovered = report.recovered,
                    "Keepalive pass"
                );
            }
        }))
    }

    /// Emit an engine event
    fn emit_event(&self, event: SyncEvent) {
        // Dropped when full; monitoring must never stall the loop
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_state_teardown_clears_sessions() {
        let mut state = LoopState::new();
        state.controller_ready = true;
        state.management_ready = true;
        assert!(state.ready());

        state.teardown();
        assert!(!state.ready());
        assert!(state.events.is_none());
    }

    #[test]
    fn summary_defaults_to_no_changes() {
        let summary = ReconcileSummary::default();
        assert_eq!(summary.networks.total() + summary.machines.total(), 0);
        assert_eq!(summary.pruned, 0);
    }
}
