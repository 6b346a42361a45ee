use async_trait::async_trait;
use tracing::{debug, info};

use super::{InterfaceScope, Lifecycle, SyncContext};
use crate::error::{Error, Result};
use crate::model::{Interface, Network};
use crate::traits::{ControllerObject, ObjectKind, ObjectRef};

impl Interface {
    async fn owning_network(&self, ctx: &SyncContext) -> Result<Network> {
        ctx.store
            .network(self.network_id)
            .await
            .ok_or_else(|| Error::ParentMissing {
                kind: <Interface as Lifecycle>::KIND,
                id: self.id,
                parent: self.network_id,
            })
    }

    /// Upsert the instance address and adopt the one the controller holds
    ///
    /// When the controller assigned a different address, the interface object
    /// is rewritten with it so listings read it back, and the cached machine
    /// is updated. Requires the machine to be cached already.
    async fn bind_address(&self, ctx: &SyncContext) -> Result<Interface> {
        let assigned = ctx.controller.upsert_instance_ip(self).await?;
        if assigned.is_none() || assigned == self.ip {
            return Ok(self.clone());
        }

        let bound = Interface {
            ip: assigned,
            ..self.clone()
        };
        ctx.controller.upsert(ControllerObject::Interface(&bound)).await?;
        ctx.store.set_interface_ip(bound.machine_id, bound.id, bound.ip).await;
        info!(interface = %bound.id, ip = ?bound.ip, "Controller assigned interface address");
        Ok(bound)
    }
}

#[async_trait]
impl Lifecycle for Interface {
    type Scope = InterfaceScope;

    const KIND: &'static str = "interface";

    async fn create(&self, scope: &InterfaceScope, ctx: &SyncContext) -> Result<()> {
        let network = self.owning_network(ctx).await?;

        ctx.controller.upsert(ControllerObject::Interface(self)).await?;
        let bound = if self.manages_address() {
            self.bind_address(ctx).await?
        } else {
            self.clone()
        };
        ctx.notifier.add_port(&bound, &scope.new_host, &network).await;

        debug!(interface = %self.id, machine = %self.machine_id, network = %self.network_id, "Interface created");
        Ok(())
    }

    async fn update(&self, old: &Interface, scope: &InterfaceScope, ctx: &SyncContext) -> Result<()> {
        let changed = self != old;
        if !changed && !scope.force_replug {
            return Ok(());
        }
        let network = self.owning_network(ctx).await?;

        let mut bound = self.clone();
        if changed {
            ctx.controller.upsert(ControllerObject::Interface(self)).await?;
            if self.manages_address() && (self.ip != old.ip || !old.manages_address()) {
                bound = self.bind_address(ctx).await?;
            }
            if old.manages_address() && !self.manages_address() {
                ctx.controller
                    .delete(ObjectRef::new(ObjectKind::InstanceIp, old.address_id()))
                    .await?;
            }
        }

        ctx.notifier.delete_port(old, &scope.old_host).await;
        ctx.notifier.add_port(&bound, &scope.new_host, &network).await;

        debug!(interface = %self.id, changed, "Interface re-plugged");
        Ok(())
    }

    async fn sync(&self, old: &Interface, scope: &InterfaceScope, ctx: &SyncContext) -> Result<()> {
        self.clone().carry_over(old).update(old, scope, ctx).await
    }

    async fn delete(&self, scope: &InterfaceScope, ctx: &SyncContext) -> Result<()> {
        ctx.notifier.delete_port(self, &scope.old_host).await;

        if self.manages_address() {
            ctx.controller
                .delete(ObjectRef::new(ObjectKind::InstanceIp, self.address_id()))
                .await?;
        }
        ctx.controller
            .delete(ObjectRef::new(ObjectKind::Interface, self.id))
            .await?;

        debug!(interface = %self.id, machine = %self.machine_id, "Interface deleted");
        Ok(())
    }
}
