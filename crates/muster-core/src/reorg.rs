//! Drag-reorganization of units and groups
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  DropTarget: Parsed gesture-layer container ids                 │
//! │  ├── "group-<id>"            → an existing group                │
//! │  ├── "new-group"             → new-group zone of a force        │
//! │  └── "force-groups-<key>"    → a force's group list             │
//! │                                                                 │
//! │  Moves (unit- and group-level)                                  │
//! │  ├── Validate refs, then mutate; bad refs are silent no-ops     │
//! │  ├── Cross-system moves convert through the catalog             │
//! │  ├── Confirmations gate conversion and source-force deletion    │
//! │  └── MoveReport tells the caller what to persist                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every move either completes or leaves the loaded forces exactly as
//! they were. Declined confirmations and failed conversions abort
//! before the first mutation; there is no partial-move state to roll
//! back.
//!
//! The caller owns persistence. A move mutates the in-memory forces
//! synchronously and reports which persisted records changed; saving
//! them (and announcing the change) is the lifecycle controller's job.

use tracing::{debug, warn};

use crate::catalog::UnitCatalog;
use crate::confirm::{ConfirmKind, Confirmer};
use crate::types::{auto_group_name, Force, ForceId, ForceUnit, GroupId, UnitGroup, UnitId};

/// Container id of the new-group drop zone
pub const NEW_GROUP_CONTAINER: &str = "new-group";

/// Prefix of group unit-list container ids
pub const GROUP_CONTAINER_PREFIX: &str = "group-";

/// Prefix of force-level group-list container ids
pub const FORCE_GROUPS_PREFIX: &str = "force-groups-";

/// A drop container id, parsed
///
/// Container ids are the handshake with the gesture layer. They are
/// parsed defensively: anything unrecognized is ignored rather than
/// treated as an error, because the gesture layer may emit ids for
/// containers this engine does not manage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    /// The unit list of an existing group
    Group(GroupId),
    /// The new-group zone of whichever force is being hovered
    NewGroup,
    /// A force's group list, keyed by instance id string or force name
    ForceGroups(String),
}

impl DropTarget {
    /// Parse a container id; None for anything this engine does not own
    pub fn parse(container_id: &str) -> Option<Self> {
        if container_id == NEW_GROUP_CONTAINER {
            return Some(DropTarget::NewGroup);
        }
        if let Some(key) = container_id.strip_prefix(FORCE_GROUPS_PREFIX) {
            if key.is_empty() {
                return None;
            }
            return Some(DropTarget::ForceGroups(key.to_string()));
        }
        if let Some(id) = container_id.strip_prefix(GROUP_CONTAINER_PREFIX) {
            return GroupId::from_string(id).ok().map(DropTarget::Group);
        }
        None
    }
}

/// Resolve a force-groups container key against the loaded forces
///
/// Saved forces key by instance id; transient ones fall back to name.
pub fn resolve_force_key(forces: &[Force], key: &str) -> Option<usize> {
    forces.iter().position(|f| {
        f.instance_id
            .as_ref()
            .is_some_and(|id| id.to_string() == key)
            || f.name == key
    })
}

/// What a move did, and what the caller now needs to persist
#[derive(Debug, Default)]
pub struct MoveReport {
    /// False when the move was a no-op (bad refs, declined, failed)
    pub mutated: bool,
    /// Persisted forces whose content changed; the caller saves these
    pub changed: Vec<ForceId>,
    /// An unsaved force changed; its shareable link is stale
    pub transient_changed: bool,
    /// A persisted source force was emptied and removed
    pub deleted: Option<ForceId>,
    /// Index of the force to select after a source-force deletion
    pub new_current: Option<usize>,
    /// Names of units that could not cross rule systems
    pub failed_conversions: Vec<String>,
    /// Ids retired by conversion; their cached side-state is stale
    pub released_units: Vec<UnitId>,
}

impl MoveReport {
    fn noop() -> Self {
        Self::default()
    }

    fn record(&mut self, force: &Force) {
        self.mutated = true;
        match &force.instance_id {
            Some(id) if !self.changed.contains(id) => self.changed.push(id.clone()),
            Some(_) => {}
            None => self.transient_changed = true,
        }
    }
}

/// Find a group across all loaded forces as (force index, group index)
fn locate_group(forces: &[Force], group: &GroupId) -> Option<(usize, usize)> {
    forces
        .iter()
        .enumerate()
        .find_map(|(fi, f)| f.find_group(group).map(|gi| (fi, gi)))
}

/// Re-key a unit whose id already exists in the destination force
fn ensure_unique_id(force: &Force, unit: &mut ForceUnit) {
    if force.contains_unit(&unit.id) {
        unit.id = UnitId::new();
    }
}

/// Remove the source force if the move emptied it
fn drop_emptied_source(forces: &mut Vec<Force>, sf: usize, tf: usize, report: &mut MoveReport) {
    if forces[sf].unit_count() != 0 {
        return;
    }
    let removed = forces.remove(sf);
    if let Some(id) = &removed.instance_id {
        report.changed.retain(|c| c != id);
    }
    report.deleted = removed.instance_id;
    report.new_current = Some(if tf > sf { tf - 1 } else { tf });
}

/// Move one unit between (or within) groups of the loaded forces
///
/// `source_index` is the unit's position in the source group;
/// `target_index` is where it lands in the target group, clamped to
/// the group's length so out-of-range drops degrade to append.
///
/// Unresolvable refs, read-only forces, and out-of-range source
/// indices are silent no-ops. Cross-force moves may await
/// confirmations through `confirmer`; a declined prompt aborts with
/// nothing mutated.
pub async fn move_unit(
    forces: &mut Vec<Force>,
    source_group: &GroupId,
    source_index: usize,
    target_group: &GroupId,
    target_index: usize,
    catalog: &dyn UnitCatalog,
    confirmer: &Confirmer,
) -> MoveReport {
    let Some((sf, sg)) = locate_group(forces, source_group) else {
        debug!(group = %source_group, "Move source does not resolve, ignoring");
        return MoveReport::noop();
    };
    let Some((tf, tg)) = locate_group(forces, target_group) else {
        debug!(group = %target_group, "Move target does not resolve, ignoring");
        return MoveReport::noop();
    };
    if source_index >= forces[sf].groups[sg].len() {
        debug!(group = %source_group, source_index, "Move source index out of range, ignoring");
        return MoveReport::noop();
    }
    if !forces[tf].owned {
        debug!(force = %forces[tf].name, "Move into read-only force rejected");
        return MoveReport::noop();
    }
    if source_group == target_group && source_index == target_index {
        return MoveReport::noop();
    }

    if sf == tf {
        return move_unit_within_force(&mut forces[sf], sg, source_index, tg, target_index);
    }
    move_unit_across_forces(
        forces,
        (sf, sg),
        source_index,
        (tf, tg),
        target_index,
        catalog,
        confirmer,
    )
    .await
}

fn move_unit_within_force(
    force: &mut Force,
    sg: usize,
    source_index: usize,
    tg: usize,
    target_index: usize,
) -> MoveReport {
    let mut report = MoveReport::noop();

    let unit = force.groups[sg].units.remove(source_index);
    let len = force.groups[tg].units.len();
    force.groups[tg].units.insert(target_index.min(len), unit);
    if sg != tg && force.groups[sg].is_empty() {
        force.groups.remove(sg);
    }

    force.refresh_auto_names();
    force.touch();
    report.record(force);
    report
}

async fn move_unit_across_forces(
    forces: &mut Vec<Force>,
    (sf, sg): (usize, usize),
    source_index: usize,
    (tf, tg): (usize, usize),
    target_index: usize,
    catalog: &dyn UnitCatalog,
    confirmer: &Confirmer,
) -> MoveReport {
    let mut report = MoveReport::noop();

    if !forces[sf].owned {
        debug!(force = %forces[sf].name, "Move out of read-only force rejected");
        return report;
    }

    let source_system = forces[sf].system;
    let target_system = forces[tf].system;
    let unit_name = forces[sf].groups[sg].units[source_index].name.clone();

    if source_system != target_system {
        let message = format!(
            "\"{unit_name}\" will be converted from {source_system} to {target_system}. Continue?"
        );
        if !confirmer
            .confirm(ConfirmKind::CrossSystemMove, message)
            .await
        {
            return report;
        }
    }
    if forces[sf].unit_count() == 1 {
        let message = format!(
            "Moving the last unit out of \"{}\" will delete it. Continue?",
            forces[sf].name
        );
        if !confirmer
            .confirm(ConfirmKind::DeleteSourceForce, message)
            .await
        {
            return report;
        }
    }

    // Conversion runs before anything is removed: a failure must leave
    // the source sequence untouched.
    let mut moved = if source_system != target_system {
        let Some(converted) = catalog.convert(&forces[sf].groups[sg].units[source_index], target_system)
        else {
            warn!(unit = %unit_name, target = %target_system, "Conversion failed, unit stays in place");
            report.failed_conversions.push(unit_name);
            return report;
        };
        let replaced = forces[sf].groups[sg].units.remove(source_index);
        report.released_units.push(replaced.id);
        converted
    } else {
        forces[sf].groups[sg].units.remove(source_index)
    };

    ensure_unique_id(&forces[tf], &mut moved);
    let len = forces[tf].groups[tg].units.len();
    forces[tf].groups[tg].units.insert(target_index.min(len), moved);

    if forces[sf].groups[sg].is_empty() {
        forces[sf].groups.remove(sg);
    }
    forces[sf].refresh_auto_names();
    forces[tf].refresh_auto_names();
    forces[sf].touch();
    forces[tf].touch();
    report.record(&forces[sf]);
    report.record(&forces[tf]);

    drop_emptied_source(forces, sf, tf, &mut report);
    report
}

/// Move one unit into a freshly created group of a force
///
/// Materializes an auto-named group at the end of the target force and
/// moves the unit into it; if the move aborts (declined confirmation,
/// failed conversion), the placeholder group is removed again.
pub async fn move_unit_to_new_group(
    forces: &mut Vec<Force>,
    source_group: &GroupId,
    source_index: usize,
    target_force: usize,
    catalog: &dyn UnitCatalog,
    confirmer: &Confirmer,
) -> MoveReport {
    if target_force >= forces.len() || !forces[target_force].owned {
        return MoveReport::noop();
    }
    let Some((sf, sg)) = locate_group(forces, source_group) else {
        return MoveReport::noop();
    };
    if source_index >= forces[sf].groups[sg].len() {
        return MoveReport::noop();
    }

    let group = UnitGroup::new(auto_group_name(1, forces[target_force].groups.len()));
    let group_id = group.id.clone();
    forces[target_force].groups.push(group);

    let report = move_unit(
        forces,
        source_group,
        source_index,
        &group_id,
        0,
        catalog,
        confirmer,
    )
    .await;

    if !report.mutated {
        if let Some((fi, gi)) = locate_group(forces, &group_id) {
            forces[fi].groups.remove(gi);
        }
    }
    report
}

/// Move or reorder a whole group
///
/// Within one force this is a list reorder. Across forces the same
/// confirmation tiers as unit moves apply, and on a system mismatch
/// each unit converts individually: units that fail stay behind in the
/// source group while the rest transfer.
pub async fn move_group(
    forces: &mut Vec<Force>,
    source_group: &GroupId,
    target_force: usize,
    target_index: usize,
    catalog: &dyn UnitCatalog,
    confirmer: &Confirmer,
) -> MoveReport {
    let mut report = MoveReport::noop();

    let Some((sf, sg)) = locate_group(forces, source_group) else {
        debug!(group = %source_group, "Group move source does not resolve, ignoring");
        return report;
    };
    if target_force >= forces.len() {
        return report;
    }
    if !forces[target_force].owned {
        debug!(force = %forces[target_force].name, "Group move into read-only force rejected");
        return report;
    }

    if sf == target_force {
        if sg == target_index {
            return report;
        }
        let group = forces[sf].groups.remove(sg);
        let len = forces[sf].groups.len();
        forces[sf].groups.insert(target_index.min(len), group);
        forces[sf].refresh_auto_names();
        forces[sf].touch();
        report.record(&forces[sf]);
        return report;
    }

    if !forces[sf].owned {
        debug!(force = %forces[sf].name, "Group move out of read-only force rejected");
        return report;
    }

    let source_system = forces[sf].system;
    let target_system = forces[target_force].system;
    let group_name = forces[sf].groups[sg].name.clone();

    if source_system != target_system {
        let message = format!(
            "Units in \"{group_name}\" will be converted from {source_system} to {target_system}. Continue?"
        );
        if !confirmer
            .confirm(ConfirmKind::CrossSystemMove, message)
            .await
        {
            return report;
        }
    }
    if forces[sf].unit_count() == forces[sf].groups[sg].len() {
        let message = format!(
            "Moving the last units out of \"{}\" will delete it. Continue?",
            forces[sf].name
        );
        if !confirmer
            .confirm(ConfirmKind::DeleteSourceForce, message)
            .await
        {
            return report;
        }
    }

    let insert_at = target_index.min(forces[target_force].groups.len());

    if source_system == target_system {
        let mut group = forces[sf].groups.remove(sg);
        for unit in &mut group.units {
            ensure_unique_id(&forces[target_force], unit);
        }
        forces[target_force].groups.insert(insert_at, group);
    } else {
        let name_locked = forces[sf].groups[sg].name_locked;
        let drained: Vec<ForceUnit> = forces[sf].groups[sg].units.drain(..).collect();
        let mut converted = Vec::new();
        let mut kept = Vec::new();
        for unit in drained {
            match catalog.convert(&unit, target_system) {
                Some(mut new_unit) => {
                    ensure_unique_id(&forces[target_force], &mut new_unit);
                    report.released_units.push(unit.id.clone());
                    converted.push(new_unit);
                }
                None => {
                    warn!(unit = %unit.name, target = %target_system, "Conversion failed, unit stays behind");
                    report.failed_conversions.push(unit.name.clone());
                    kept.push(unit);
                }
            }
        }
        forces[sf].groups[sg].units = kept;
        if converted.is_empty() {
            return report;
        }

        let mut transferred = UnitGroup::new(group_name.clone());
        transferred.name_locked = name_locked;
        transferred.units = converted;
        if forces[sf].groups[sg].is_empty() {
            forces[sf].groups.remove(sg);
        }
        forces[target_force].groups.insert(insert_at, transferred);
    }

    forces[sf].refresh_auto_names();
    forces[target_force].refresh_auto_names();
    forces[sf].touch();
    forces[target_force].touch();
    report.record(&forces[sf]);
    report.record(&forces[target_force]);

    drop_emptied_source(forces, sf, target_force, &mut report);
    report
}
