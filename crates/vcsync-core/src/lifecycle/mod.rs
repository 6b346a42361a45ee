//! Entity lifecycle contract
//!
//! Every entity kind implements [`Lifecycle`]; the diff driver and the event
//! classifier go through it exclusively, so the store and the controller are
//! only ever mutated here.
//!
//! ## Cascade order
//!
//! ```text
//! create:  network → machine → interface → instance ip → add port
//! delete:  delete port → instance ip → interface → machine / network
//! ```
//!
//! ## Side effects of a matched pair
//!
//! Equal pairs are re-registered in the store and nothing else. A changed
//! interface is upserted and re-plugged (the agent has no "modify"). An
//! unchanged interface under a machine that moved or changed power state is
//! re-plugged without touching the controller.

mod interface;
mod machine;
mod network;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::model::PortHost;
use crate::notifier::DataplaneNotifier;
use crate::state::ReconciliationStore;
use crate::traits::ControllerClient;

/// Collaborators every lifecycle operation works against
#[derive(Clone)]
pub struct SyncContext {
    pub controller: Arc<dyn ControllerClient>,
    pub notifier: DataplaneNotifier,
    pub store: ReconciliationStore,
}

impl SyncContext {
    pub fn new(
        controller: Arc<dyn ControllerClient>,
        notifier: DataplaneNotifier,
        store: ReconciliationStore,
    ) -> Self {
        Self {
            controller,
            notifier,
            store,
        }
    }
}

/// Uniform create/update/sync/delete contract
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Context the parent passes down (e.g. where an interface is plugged)
    type Scope: Send + Sync;

    /// Kind name for logs
    const KIND: &'static str;

    /// Materialize on the controller and register in the store
    async fn create(&self, scope: &Self::Scope, ctx: &SyncContext) -> Result<()>;

    /// Move from `old` to `self`; a no-op when nothing observable changed
    async fn update(&self, old: &Self, scope: &Self::Scope, ctx: &SyncContext) -> Result<()>;

    /// [`update`](Lifecycle::update) during full reconciliation, keeping
    /// fields the fresh snapshot lacks
    async fn sync(&self, old: &Self, scope: &Self::Scope, ctx: &SyncContext) -> Result<()> {
        self.update(old, scope, ctx).await
    }

    /// Remove children first, then the remote object, then the cache entry
    async fn delete(&self, scope: &Self::Scope, ctx: &SyncContext) -> Result<()>;
}

/// Placement context of interface operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceScope {
    /// Where the machine's ports were plugged
    pub old_host: PortHost,
    /// Where they are plugged now
    pub new_host: PortHost,
    /// Re-plug matched interfaces even when their own fields are unchanged
    pub force_replug: bool,
}

impl InterfaceScope {
    /// Machine did not move
    pub fn attached(host: PortHost) -> Self {
        Self {
            old_host: host.clone(),
            new_host: host,
            force_replug: false,
        }
    }
}
