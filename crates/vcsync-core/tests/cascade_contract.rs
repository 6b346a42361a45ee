//! Architectural Contract Test: Network Removal Cascade
//!
//! Removing a network removes every interface attached to it first, and
//! every machine left without interfaces.
//!
//! Constraints verified:
//! - One interface delete, one address delete and one port delete per member
//! - Machines with no interface left are deleted, others are kept
//! - The network itself is deleted last
//! - An interface the controller failed to delete stays cached until a
//!   later pass removes it
//!
//! If this test fails, removed networks leave orphans on the controller.

mod common;

use common::*;
use std::collections::HashSet;
use uuid::Uuid;
use vcsync_core::OperatingMode;
use vcsync_core::classifier::EventOutcome;
use vcsync_core::traits::{ChangeEvent, ObjectKind, ObjectRef};

async fn three_members_on_pg_a() -> (Harness, vcsync_core::SyncEngine) {
    let harness = Harness::new();
    harness.management.put_network(network("pg-a", 101));
    harness.management.put_network(network("pg-b", 102));
    harness
        .management
        .put_machine(machine(1, "vm-1", "esxi-1", vec![nic("pg-a", 11)]));
    harness.management.put_machine(machine(
        2,
        "vm-2",
        "esxi-1",
        vec![nic("pg-a", 12), nic("pg-b", 13)],
    ));
    harness
        .management
        .put_machine(machine(3, "vm-3", "esxi-2", vec![nic("pg-a", 14)]));

    let (engine, _events) = harness.engine(OperatingMode::ManagementOnly);
    engine.reconcile_full().await.expect("initial pass succeeds");
    harness.controller.clear_calls();
    harness.dataplane.clear_calls();
    (harness, engine)
}

#[tokio::test]
async fn removing_a_network_cascades_to_its_members() {
    let (harness, engine) = three_members_on_pg_a().await;

    harness.management.remove_network("pg-a");
    let event = ChangeEvent::new(10, "DVPortgroupDestroyedEvent").with_network("pg-a");
    let outcome = engine.handle_event(&event).await.expect("event applies");
    assert_eq!(outcome, EventOutcome::Applied);

    let members: HashSet<Uuid> = [1, 2, 3].iter().map(|m| interface_id(*m, "pg-a")).collect();

    let deleted_ifaces: HashSet<Uuid> = harness
        .controller
        .calls_of(ObjectKind::Interface)
        .iter()
        .filter(|c| matches!(c, ControllerCall::Delete(_)))
        .map(|c| c.object().id)
        .collect();
    assert_eq!(deleted_ifaces, members);
    assert_eq!(harness.controller.calls_of(ObjectKind::InstanceIp).len(), 3);

    let deleted_machines: HashSet<Uuid> = harness
        .controller
        .calls_of(ObjectKind::Machine)
        .iter()
        .map(|c| c.object().id)
        .collect();
    assert_eq!(
        deleted_machines,
        [Uuid::from_u128(1), Uuid::from_u128(3)].into_iter().collect()
    );

    assert_eq!(
        harness.controller.calls().last(),
        Some(&ControllerCall::Delete(ObjectRef::new(
            ObjectKind::Network,
            network_id("pg-a")
        )))
    );

    let mut unplugged = harness.dataplane.deleted_on(AGENT_1);
    unplugged.extend(harness.dataplane.deleted_on(AGENT_2));
    assert_eq!(unplugged.into_iter().collect::<HashSet<_>>(), members);
    assert!(harness.dataplane.added_on(AGENT_1).is_empty());
}

#[tokio::test]
async fn cache_reflects_the_cascade() {
    let (harness, engine) = three_members_on_pg_a().await;

    harness.management.remove_network("pg-a");
    let event = ChangeEvent::new(10, "DVPortgroupDestroyedEvent").with_network("pg-a");
    engine.handle_event(&event).await.expect("event applies");

    let store = engine.store();
    assert!(store.network(network_id("pg-a")).await.is_none());
    assert!(store.machine(Uuid::from_u128(1)).await.is_none());
    assert!(store.machine(Uuid::from_u128(3)).await.is_none());

    let survivor = store.machine(Uuid::from_u128(2)).await.expect("vm-2 kept");
    assert_eq!(survivor.interfaces.len(), 1);
    assert!(survivor.interface_on(network_id("pg-b")).is_some());
    assert!(store.network_members(network_id("pg-a")).await.is_empty());
}

#[tokio::test]
async fn removing_an_unknown_network_is_ignored() {
    let (harness, engine) = three_members_on_pg_a().await;

    let event = ChangeEvent::new(10, "DVPortgroupDestroyedEvent").with_network("pg-zzz");
    let outcome = engine.handle_event(&event).await.expect("event applies");

    assert!(matches!(outcome, EventOutcome::Ignored(_)));
    assert!(harness.controller.calls().is_empty());
    assert_eq!(harness.dataplane.port_calls(), 0);
}

#[tokio::test]
async fn failed_interface_delete_stays_cached_for_the_next_pass() {
    let (harness, engine) = three_members_on_pg_a().await;
    let stuck = interface_id(1, "pg-a");
    harness.controller.reject_delete(stuck);

    harness.management.remove_network("pg-a");
    let event = ChangeEvent::new(10, "DVPortgroupDestroyedEvent").with_network("pg-a");
    engine.handle_event(&event).await.expect("event applies");

    let store = engine.store();
    let kept = store.machine(Uuid::from_u128(1)).await.expect("vm-1 still cached");
    assert!(kept.interfaces.contains_key(&stuck));
    assert!(harness
        .controller
        .contains(ObjectRef::new(ObjectKind::Interface, stuck)));
    // The other members went as usual
    assert!(store.machine(Uuid::from_u128(3)).await.is_none());

    harness.controller.clear_rejections();
    engine.reconcile_full().await.expect("resync succeeds");

    assert!(!harness
        .controller
        .contains(ObjectRef::new(ObjectKind::Interface, stuck)));
    assert!(engine.store().machine(Uuid::from_u128(1)).await.is_none());
}
