//! Shareable link tests through the engine surface
//!
//! The codec's parsing rules are unit-tested next to the codec; these
//! cover the full journey: engine state out through `current_link`,
//! back in through `load_from_link`, and instance links resolved
//! against a shared remote.

use std::sync::Arc;

use muster_core::{
    Confirmer, GameSystem, LoopbackPush, MemoryStore, MusterEngine, StaticCatalog,
};

fn engine_on(remote: MemoryStore) -> (MusterEngine<MemoryStore>, LoopbackPush, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().unwrap();
    let push = LoopbackPush::new();
    let engine = MusterEngine::new(
        dir.path(),
        remote,
        Arc::new(StaticCatalog::standard()),
        Arc::new(push.clone()),
        Confirmer::always(true),
    )
    .unwrap();
    push.attach(engine.push_sender());
    (engine, push, dir)
}

// ============================================================================
// Wire Fixtures
// ============================================================================

/// Test the legacy ungrouped format end to end
#[tokio::test]
async fn test_legacy_units_parameter_loads() {
    let (mut engine, _push, _dir) = engine_on(MemoryStore::new());

    let query = "units=Locust%20LCT-1V%2CLocust%20LCT-1V%3A4%3A5";
    let index = engine
        .load_from_link(query, GameSystem::Classic)
        .await
        .unwrap()
        .unwrap();

    let force = engine.force(index).unwrap();
    assert_eq!(force.groups.len(), 1);
    assert!(!force.groups[0].name_locked);
    assert_eq!(force.unit_count(), 2);
    let units: Vec<_> = force.units().collect();
    assert_eq!(units[1].crew[0].gunnery, Some(4));
    assert_eq!(units[1].crew[0].piloting, Some(5));
    // Unnamed link, so the force keeps a default, unlocked name
    assert_eq!(force.name, "New Force");
    assert!(!force.name_locked);
}

/// Test the grouped format with locked group names end to end
#[tokio::test]
async fn test_grouped_units_parameter_loads() {
    let (mut engine, _push, _dir) = engine_on(MemoryStore::new());

    // Decoded units value:
    //   Lance%20Alpha~Locust LCT-1V,Wasp WSP-1|Lance Beta~Stinger STG-3R
    let query =
        "units=Lance%2520Alpha%7ELocust%20LCT-1V%2CWasp%20WSP-1%7CLance%20Beta%7EStinger%20STG-3R";
    let index = engine
        .load_from_link(query, GameSystem::Classic)
        .await
        .unwrap()
        .unwrap();

    let force = engine.force(index).unwrap();
    assert_eq!(force.groups.len(), 2);
    assert_eq!(force.groups[0].name, "Lance Alpha");
    assert!(force.groups[0].name_locked);
    assert_eq!(force.groups[0].units.len(), 2);
    assert_eq!(force.groups[1].name, "Lance Beta");
    assert_eq!(force.groups[1].units[0].name, "Stinger STG-3R");
}

/// Test that a link carrying nothing loadable loads nothing
#[tokio::test]
async fn test_empty_and_junk_queries_load_nothing() {
    let (mut engine, _push, _dir) = engine_on(MemoryStore::new());

    assert!(engine
        .load_from_link("", GameSystem::Classic)
        .await
        .unwrap()
        .is_none());
    assert!(engine
        .load_from_link("?utm_source=chat&units=", GameSystem::Classic)
        .await
        .unwrap()
        .is_none());
    assert!(engine.forces().is_empty());
}

// ============================================================================
// Round Trips
// ============================================================================

/// Test that a built force survives the link round trip
#[tokio::test]
async fn test_link_round_trip_preserves_roster() {
    let (mut sender, _push_a, _dir_a) = engine_on(MemoryStore::new());

    let index = sender.new_force("New Force", GameSystem::Classic);
    sender.add_unit(index, None, "Locust LCT-1V").unwrap();
    let wasp = sender.add_unit(index, None, "Wasp WSP-1").unwrap();
    sender.set_crew_skills(&wasp, 0, Some(2), Some(3)).unwrap();
    let group = sender.force(index).unwrap().groups[0].id.clone();
    sender.rename_group(&group, "Recon Lance").unwrap();
    sender.rename_force(index, "Fox Company").unwrap();

    let link = sender.current_link().unwrap();

    let (mut receiver, _push_b, _dir_b) = engine_on(MemoryStore::new());
    let loaded = receiver
        .load_from_link(&link, GameSystem::Classic)
        .await
        .unwrap()
        .unwrap();

    let original = sender.force(index).unwrap();
    let copy = receiver.force(loaded).unwrap();
    assert_eq!(copy.name, original.name);
    assert!(copy.name_locked);
    assert_eq!(copy.groups.len(), 1);
    assert_eq!(copy.groups[0].name, "Recon Lance");
    assert!(copy.groups[0].name_locked);
    let names: Vec<_> = copy.units().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Locust LCT-1V", "Wasp WSP-1"]);
    assert_eq!(copy.units().nth(1).unwrap().crew[0].gunnery, Some(2));
    assert_eq!(copy.units().nth(1).unwrap().crew[0].piloting, Some(3));

    // Re-encoding the copy gives back the same link
    assert_eq!(receiver.current_link().unwrap(), link);
}

/// Test that default skills stay implicit in the link
#[tokio::test]
async fn test_default_skills_are_not_encoded() {
    let (mut engine, _push, _dir) = engine_on(MemoryStore::new());

    let index = engine.new_force("Plain", GameSystem::Classic);
    engine.add_unit(index, None, "Locust LCT-1V").unwrap();

    let link = engine.current_link().unwrap();
    assert!(!link.contains("%3A"), "no skill separators expected: {link}");
    assert!(!link.contains(':'), "no skill separators expected: {link}");
}

// ============================================================================
// Instance Links
// ============================================================================

/// Test that a saved force's link resolves on another engine
#[tokio::test]
async fn test_instance_link_resolves_on_shared_remote() {
    let remote = MemoryStore::new();
    let (mut sender, _push_a, _dir_a) = engine_on(remote.clone());

    let index = sender.new_force("Fox Company", GameSystem::Classic);
    sender.add_unit(index, None, "Atlas AS7-D").unwrap();
    let instance_id = sender.save_force(index).await.unwrap();
    let link = sender.current_link().unwrap();
    assert!(link.contains("instance="));

    let (mut receiver, push_b, _dir_b) = engine_on(remote);
    let loaded = receiver
        .load_from_link(&link, GameSystem::Classic)
        .await
        .unwrap()
        .unwrap();

    let force = receiver.force(loaded).unwrap();
    assert_eq!(force.instance_id, Some(instance_id.clone()));
    assert_eq!(force.name, "Fox Company");
    assert_eq!(force.units().next().unwrap().name, "Atlas AS7-D");
    assert!(push_b.is_subscribed(&instance_id));
}

/// Test that an unresolvable instance falls back to the units payload
#[tokio::test]
async fn test_dead_instance_falls_back_to_units() {
    let remote = MemoryStore::new();
    let (mut sender, _push_a, _dir_a) = engine_on(remote.clone());

    let index = sender.new_force("Fox Company", GameSystem::Classic);
    sender.add_unit(index, None, "Atlas AS7-D").unwrap();
    let instance_id = sender.save_force(index).await.unwrap();
    let link = sender.current_link().unwrap();

    // The remote copy disappears before the link is opened
    sender.delete_force(index).await.unwrap();
    assert!(remote.snapshot(&instance_id).is_none());

    let (mut receiver, _push_b, _dir_b) = engine_on(remote);
    let loaded = receiver
        .load_from_link(&link, GameSystem::Classic)
        .await
        .unwrap()
        .unwrap();

    let force = receiver.force(loaded).unwrap();
    assert!(force.instance_id.is_none());
    assert_eq!(force.name, "Fox Company");
    assert_eq!(force.units().next().unwrap().name, "Atlas AS7-D");
}
