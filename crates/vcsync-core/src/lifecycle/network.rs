use async_trait::async_trait;
use tracing::{info, warn};

use super::{InterfaceScope, Lifecycle, SyncContext};
use crate::error::Result;
use crate::model::Network;
use crate::traits::{ControllerObject, ObjectKind, ObjectRef};

#[async_trait]
impl Lifecycle for Network {
    type Scope = ();

    const KIND: &'static str = "network";

    async fn create(&self, _scope: &(), ctx: &SyncContext) -> Result<()> {
        ctx.controller.upsert(ControllerObject::Network(self)).await?;
        ctx.store.put_network(self.clone()).await;
        info!(network = %self.id, name = %self.name, "Network created");
        Ok(())
    }

    async fn update(&self, old: &Network, _scope: &(), ctx: &SyncContext) -> Result<()> {
        if self != old {
            ctx.controller.upsert(ControllerObject::Network(self)).await?;
            info!(network = %self.id, name = %self.name, "Network updated");
        }
        ctx.store.put_network(self.clone()).await;
        Ok(())
    }

    /// Delete every member interface first; a machine left without
    /// interfaces goes with it.
    async fn delete(&self, _scope: &(), ctx: &SyncContext) -> Result<()> {
        let members = ctx.store.network_members(self.id).await;
        let interfaces = members.len();

        for (machine, iface) in members {
            let scope = InterfaceScope::attached(machine.port_host());
            if let Err(e) = iface.delete(&scope, ctx).await {
                // Still held by the controller; stays cached for the next resync
                warn!(interface = %iface.id, "Cascade delete of interface failed: {}", e);
                continue;
            }

            let mut remaining = machine;
            remaining.interfaces.remove(&iface.id);
            if remaining.interfaces.is_empty() {
                if let Err(e) = remaining.delete(&(), ctx).await {
                    warn!(machine = %remaining.id, "Cascade delete of machine failed: {}", e);
                }
            } else {
                ctx.store.put_machine(remaining).await;
            }
        }

        ctx.controller
            .delete(ObjectRef::new(ObjectKind::Network, self.id))
            .await?;
        ctx.store.remove_network(self.id).await;
        info!(network = %self.id, name = %self.name, interfaces, "Network deleted");
        Ok(())
    }
}
