use async_trait::async_trait;
use tracing::{info, warn};

use super::{InterfaceScope, Lifecycle, SyncContext};
use crate::diff::{MergeMode, MergeOptions, reconcile};
use crate::error::Result;
use crate::model::{InterfaceMap, Machine};
use crate::traits::{ControllerObject, ObjectKind, ObjectRef};

impl Machine {
    /// Push the delta `old` → `self` and register `self`
    async fn apply(&self, old: &Machine, mode: MergeMode, ctx: &SyncContext) -> Result<()> {
        if self.controller_fields_differ(old) {
            ctx.controller.upsert(ControllerObject::Machine(self)).await?;
        }

        let scope = InterfaceScope {
            old_host: old.port_host(),
            new_host: self.port_host(),
            force_replug: self.vrouter_affecting(old),
        };
        let options = MergeOptions {
            mode,
            propagate_deletes: true,
        };
        // Cached first: interfaces record controller-assigned addresses in it
        ctx.store.put_machine(self.clone()).await;
        let report = reconcile(&old.interfaces, &self.interfaces, &scope, options, ctx).await;
        if report.failed > 0 {
            warn!(machine = %self.id, failed = report.failed, "Some interfaces failed to reconcile");
        }

        info!(
            machine = %self.id,
            name = %self.name,
            replug = scope.force_replug,
            created = report.created,
            deleted = report.deleted,
            "Machine updated"
        );
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for Machine {
    type Scope = ();

    const KIND: &'static str = "machine";

    async fn create(&self, _scope: &(), ctx: &SyncContext) -> Result<()> {
        ctx.controller.upsert(ControllerObject::Machine(self)).await?;
        ctx.store.put_machine(self.clone()).await;

        let scope = InterfaceScope::attached(self.port_host());
        let report = reconcile(
            &InterfaceMap::new(),
            &self.interfaces,
            &scope,
            MergeOptions::incremental(),
            ctx,
        )
        .await;
        if report.failed > 0 {
            warn!(machine = %self.id, failed = report.failed, "Some interfaces failed to create");
        }

        info!(machine = %self.id, name = %self.name, interfaces = report.created, "Machine created");
        Ok(())
    }

    async fn update(&self, old: &Machine, _scope: &(), ctx: &SyncContext) -> Result<()> {
        if self == old {
            ctx.store.put_machine(self.clone()).await;
            return Ok(());
        }
        self.apply(old, MergeMode::Incremental, ctx).await
    }

    async fn sync(&self, old: &Machine, _scope: &(), ctx: &SyncContext) -> Result<()> {
        let merged = self.clone().carry_over(old);
        if merged == *old {
            ctx.store.put_machine(merged).await;
            return Ok(());
        }
        merged.apply(old, MergeMode::Full, ctx).await
    }

    async fn delete(&self, _scope: &(), ctx: &SyncContext) -> Result<()> {
        let scope = InterfaceScope::attached(self.port_host());
        let report = reconcile(
            &self.interfaces,
            &InterfaceMap::new(),
            &scope,
            MergeOptions::incremental(),
            ctx,
        )
        .await;
        if report.failed > 0 {
            warn!(machine = %self.id, failed = report.failed, "Some interfaces failed to delete");
        }

        ctx.controller
            .delete(ObjectRef::new(ObjectKind::Machine, self.id))
            .await?;
        ctx.store.remove_machine(self.id).await;
        info!(machine = %self.id, name = %self.name, "Machine deleted");
        Ok(())
    }
}
