//! Property-based tests for roster operations
//!
//! Uses proptest to verify invariants of the link codec, the move
//! algorithms, and snapshot replacement.

use std::collections::HashSet;

use proptest::prelude::*;

use muster_core::reorg;
use muster_core::sync::{keep_local_timestamp, replace_in_place};
use muster_core::{
    decode_units, encode_units, CrewMember, Force, GameSystem, StaticCatalog, UnitCatalog,
    UnitGroup,
};

// ============================================================================
// Strategy Generators
// ============================================================================

const CHASSIS: [&str; 10] = [
    "Locust LCT-1V",
    "Wasp WSP-1",
    "Stinger STG-3R",
    "Phoenix Hawk PXH-1",
    "Shadow Hawk SHD-2H",
    "Griffin GRF-1N",
    "Wolverine WVR-6R",
    "Warhammer WHM-6R",
    "Marauder MAD-3R",
    "Atlas AS7-D",
];

/// A unit recipe: catalog name plus optional explicit skills
fn unit_strategy() -> impl Strategy<Value = (&'static str, Option<(u8, u8)>)> {
    (
        prop::sample::select(CHASSIS.as_slice()),
        prop::option::of((0u8..9, 0u8..9)),
    )
}

/// A group recipe: units plus an optional locked name, including
/// characters the codec has to escape
fn group_strategy() -> impl Strategy<Value = (Vec<(&'static str, Option<(u8, u8)>)>, Option<String>)>
{
    (
        prop::collection::vec(unit_strategy(), 1..6),
        prop::option::of(prop::string::string_regex("[a-zA-Z0-9 ~|,:%&=]{1,20}").unwrap()),
    )
}

fn roster_strategy() -> impl Strategy<Value = Vec<(Vec<(&'static str, Option<(u8, u8)>)>, Option<String>)>>
{
    prop::collection::vec(group_strategy(), 1..5)
}

/// Materialize a roster recipe into a force
fn build_force(
    name: &str,
    system: GameSystem,
    roster: &[(Vec<(&'static str, Option<(u8, u8)>)>, Option<String>)],
) -> Force {
    let catalog = StaticCatalog::standard();
    let mut force = Force::new(name, system);
    for (units, locked_name) in roster {
        let mut group = match locked_name {
            Some(n) => UnitGroup::named(n.clone()),
            None => UnitGroup::new("unnamed"),
        };
        for (chassis, skills) in units {
            let mut unit = catalog.resolve_name(chassis, system).unwrap().instantiate();
            if let Some((gunnery, piloting)) = skills {
                unit.crew[0] = CrewMember::with_skills(*gunnery, *piloting);
            }
            group.units.push(unit);
        }
        force.groups.push(group);
    }
    force.refresh_auto_names();
    force
}

/// A move instruction, interpreted against whatever state exists when
/// it runs; out-of-range picks wrap around
#[derive(Debug, Clone)]
struct MoveOp {
    source_force: usize,
    source_group: usize,
    source_unit: usize,
    target_force: usize,
    target_group: usize,
    target_index: usize,
}

fn move_ops_strategy(max_ops: usize) -> impl Strategy<Value = Vec<MoveOp>> {
    prop::collection::vec(
        (0..100usize, 0..100usize, 0..100usize, 0..100usize, 0..100usize, 0..100usize).prop_map(
            |(sf, sg, su, tf, tg, ti)| MoveOp {
                source_force: sf,
                source_group: sg,
                source_unit: su,
                target_force: tf,
                target_group: tg,
                target_index: ti,
            },
        ),
        1..max_ops,
    )
}

fn all_unit_ids(forces: &[Force]) -> Vec<String> {
    forces
        .iter()
        .flat_map(|f| f.units())
        .map(|u| u.id.to_string())
        .collect()
}

// ============================================================================
// Codec Properties
// ============================================================================

proptest! {
    /// Encoding is a fixed point: decode then re-encode changes nothing
    #[test]
    fn encode_decode_encode_is_identity(roster in roster_strategy()) {
        let catalog = StaticCatalog::standard();
        let force = build_force("Prop Force", GameSystem::Classic, &roster);

        let encoded = encode_units(&force);
        let decoded = decode_units(&encoded, GameSystem::Classic, &catalog);

        let mut reassembled = Force::new("Prop Force", GameSystem::Classic);
        reassembled.groups = decoded;
        prop_assert_eq!(encode_units(&reassembled), encoded);
    }

    /// Decoding keeps every unit the encoder emitted, in order
    #[test]
    fn decode_preserves_unit_names_in_order(roster in roster_strategy()) {
        let catalog = StaticCatalog::standard();
        let force = build_force("Prop Force", GameSystem::Classic, &roster);

        let decoded = decode_units(&encode_units(&force), GameSystem::Classic, &catalog);

        let original: Vec<_> = force.units().map(|u| u.name.clone()).collect();
        let roundtripped: Vec<_> = decoded
            .iter()
            .flat_map(|g| g.units.iter())
            .map(|u| u.name.clone())
            .collect();
        prop_assert_eq!(roundtripped, original);
    }

    /// Locked group names survive arbitrary escape-worthy characters
    #[test]
    fn locked_names_survive_escaping(name in "[a-zA-Z0-9 ~|,:%&=]{1,20}") {
        let catalog = StaticCatalog::standard();
        let mut group = UnitGroup::named(name.clone());
        group.units.push(
            catalog
                .resolve_name("Locust LCT-1V", GameSystem::Classic)
                .unwrap()
                .instantiate(),
        );
        let mut force = Force::new("x", GameSystem::Classic);
        force.groups.push(group);

        let decoded = decode_units(&encode_units(&force), GameSystem::Classic, &catalog);
        prop_assert_eq!(decoded.len(), 1);
        prop_assert_eq!(&decoded[0].name, &name);
        prop_assert!(decoded[0].name_locked);
    }
}

// ============================================================================
// Move Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Arbitrary same-system move sequences never lose or duplicate
    /// units
    #[test]
    fn moves_never_lose_or_duplicate_units(
        roster_a in roster_strategy(),
        roster_b in roster_strategy(),
        ops in move_ops_strategy(12),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let catalog = StaticCatalog::standard();
            let confirmer = muster_core::Confirmer::always(true);
            let mut forces = vec![
                build_force("Alpha", GameSystem::Classic, &roster_a),
                build_force("Beta", GameSystem::Classic, &roster_b),
            ];

            let mut expected: Vec<String> = all_unit_ids(&forces);
            expected.sort();

            for op in &ops {
                if forces.is_empty() {
                    break;
                }
                let sf = op.source_force % forces.len();
                if forces[sf].groups.is_empty() {
                    continue;
                }
                let sg = op.source_group % forces[sf].groups.len();
                let source_group = forces[sf].groups[sg].id.clone();
                let source_unit = op.source_unit % forces[sf].groups[sg].len().max(1);

                let tf = op.target_force % forces.len();
                if forces[tf].groups.is_empty() {
                    continue;
                }
                let tg = op.target_group % forces[tf].groups.len();
                let target_group = forces[tf].groups[tg].id.clone();

                reorg::move_unit(
                    &mut forces,
                    &source_group,
                    source_unit,
                    &target_group,
                    op.target_index,
                    &catalog,
                    &confirmer,
                )
                .await;
            }

            let mut remaining = all_unit_ids(&forces);
            remaining.sort();
            prop_assert_eq!(remaining, expected);

            // No id appears twice
            let unique: HashSet<_> = all_unit_ids(&forces).into_iter().collect();
            let total: usize = forces.iter().map(|f| f.unit_count()).sum();
            prop_assert_eq!(unique.len(), total);
            Ok(())
        })?;
    }

    /// Unlocked group names always match their position after moves
    #[test]
    fn auto_names_track_positions(
        roster in roster_strategy(),
        ops in move_ops_strategy(8),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let catalog = StaticCatalog::standard();
            let confirmer = muster_core::Confirmer::always(true);
            let mut forces = vec![build_force("Alpha", GameSystem::Classic, &roster)];

            for op in &ops {
                if forces.is_empty() || forces[0].groups.is_empty() {
                    break;
                }
                let sg = op.source_group % forces[0].groups.len();
                let source_group = forces[0].groups[sg].id.clone();
                let source_unit = op.source_unit % forces[0].groups[sg].len().max(1);
                let tg = op.target_group % forces[0].groups.len();
                let target_group = forces[0].groups[tg].id.clone();

                reorg::move_unit(
                    &mut forces,
                    &source_group,
                    source_unit,
                    &target_group,
                    op.target_index,
                    &catalog,
                    &confirmer,
                )
                .await;
            }

            for force in &forces {
                for (i, group) in force.groups.iter().enumerate() {
                    if !group.name_locked {
                        prop_assert_eq!(
                            &group.name,
                            &muster_core::auto_group_name(group.units.len(), i)
                        );
                    }
                }
            }
            Ok(())
        })?;
    }
}

// ============================================================================
// Replacement Properties
// ============================================================================

proptest! {
    /// The selection cascade always lands inside the new snapshot
    #[test]
    fn replacement_selection_is_always_valid(
        roster_old in roster_strategy(),
        roster_new in roster_strategy(),
        pick in 0..100usize,
    ) {
        let mut force = build_force("Old", GameSystem::Classic, &roster_old);
        let snapshot = build_force("New", GameSystem::Classic, &roster_new);

        let units: Vec<_> = force.units().map(|u| u.id.clone()).collect();
        let selected = units.get(pick % units.len().max(1)).cloned();

        let result = replace_in_place(&mut force, snapshot, selected.as_ref());

        match result {
            Some(id) => prop_assert!(force.contains_unit(&id)),
            None => prop_assert_eq!(force.unit_count(), 0),
        }
        prop_assert_eq!(&force.name, "New");
    }

    /// Keep-local always produces a timestamp the remote cannot tie
    #[test]
    fn keep_local_always_wins_the_clock(minutes in -60i64..60) {
        let mut remote = Force::new("Remote", GameSystem::Classic);
        remote.timestamp = remote.timestamp + chrono::Duration::minutes(minutes);

        let stamped = keep_local_timestamp(&remote);
        prop_assert!(stamped > remote.timestamp);
    }
}
