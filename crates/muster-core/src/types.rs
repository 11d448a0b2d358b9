//! Core types for Muster
//!
//! A force is an ordered list of unit groups, and each group owns its
//! units directly. Ordering is load-bearing at every level: group order
//! and unit order drive display, drop indices, and link encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Default gunnery skill for a crew slot with no explicit value
pub const DEFAULT_GUNNERY: u8 = 4;
/// Default piloting skill for a crew slot with no explicit value
pub const DEFAULT_PILOTING: u8 = 5;

/// Unique identifier for a persisted force
///
/// Minted on first explicit save; a force that has never been saved
/// remotely carries no ForceId.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForceId(pub Ulid);

impl ForceId {
    /// Create a new ForceId with current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Create a ForceId from a ULID
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Get the underlying ULID
    pub fn as_ulid(&self) -> &Ulid {
        &self.0
    }

    /// Parse from string representation, with or without the `force_` prefix
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        let bare = s.strip_prefix("force_").unwrap_or(s);
        Ok(Self(Ulid::from_string(bare)?))
    }
}

impl Default for ForceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ForceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "force_{}", self.0)
    }
}

/// Unique identifier for a unit group within a force
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub Ulid);

impl GroupId {
    /// Create a new GroupId with current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Create a GroupId from a ULID
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Get the underlying ULID
    pub fn as_ulid(&self) -> &Ulid {
        &self.0
    }

    /// Parse from string representation, with or without the `group_` prefix
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        let bare = s.strip_prefix("group_").unwrap_or(s);
        Ok(Self(Ulid::from_string(bare)?))
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group_{}", self.0)
    }
}

/// Unique identifier for a unit instance in a force
///
/// Stable across moves within and between forces; a replacement unit
/// produced by cross-system conversion gets a fresh UnitId.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub Ulid);

impl UnitId {
    /// Create a new UnitId with current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Create a UnitId from a ULID
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Get the underlying ULID
    pub fn as_ulid(&self) -> &Ulid {
        &self.0
    }

    /// Parse from string representation, with or without the `unit_` prefix
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        let bare = s.strip_prefix("unit_").unwrap_or(s);
        Ok(Self(Ulid::from_string(bare)?))
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit_{}", self.0)
    }
}

/// Rule system a force is built under
///
/// Every unit in a force plays under the force's system; moving a unit
/// into a force with a different system converts it via the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameSystem {
    Classic,
    AlphaStrike,
}

impl GameSystem {
    /// Stable string form used in links and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            GameSystem::Classic => "classic",
            GameSystem::AlphaStrike => "alpha-strike",
        }
    }
}

impl std::fmt::Display for GameSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GameSystem {
    type Err = crate::error::MusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classic" | "cbt" => Ok(GameSystem::Classic),
            "alpha-strike" | "alphastrike" | "as" => Ok(GameSystem::AlphaStrike),
            other => Err(crate::error::MusterError::InvalidOperation(format!(
                "unknown game system: {}",
                other
            ))),
        }
    }
}

/// A crew slot on a unit
///
/// `None` skills mean "campaign default" (gunnery 4 / piloting 5)
/// rather than an explicit value; the distinction survives encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewMember {
    /// Gunnery skill, lower is better
    pub gunnery: Option<u8>,
    /// Piloting (or driving) skill, lower is better
    pub piloting: Option<u8>,
}

impl CrewMember {
    /// Crew slot with explicit skills
    pub fn with_skills(gunnery: u8, piloting: u8) -> Self {
        Self {
            gunnery: Some(gunnery),
            piloting: Some(piloting),
        }
    }

    /// Whether either skill deviates from the campaign default
    pub fn has_custom_skills(&self) -> bool {
        self.gunnery.is_some() || self.piloting.is_some()
    }

    /// Skills with defaults substituted for unset values
    pub fn effective_skills(&self) -> (u8, u8) {
        (
            self.gunnery.unwrap_or(DEFAULT_GUNNERY),
            self.piloting.unwrap_or(DEFAULT_PILOTING),
        )
    }
}

/// A unit instance inside a group
///
/// `catalog_id` names the blueprint this unit was instantiated from;
/// `name` is denormalized for display and link encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceUnit {
    /// Unique identifier, stable across moves
    pub id: UnitId,
    /// Catalog blueprint this unit was built from
    pub catalog_id: String,
    /// Display name, e.g. "Locust LCT-1V"
    pub name: String,
    /// Rule system this instance is statted for
    pub system: GameSystem,
    /// Crew slots; length comes from the catalog blueprint
    pub crew: Vec<CrewMember>,
    /// Accumulated damage state, 0 = pristine
    pub damage: u32,
}

impl ForceUnit {
    /// Create a pristine unit with one default crew slot
    pub fn new(catalog_id: impl Into<String>, name: impl Into<String>, system: GameSystem) -> Self {
        Self {
            id: UnitId::new(),
            catalog_id: catalog_id.into(),
            name: name.into(),
            system,
            crew: vec![CrewMember::default()],
            damage: 0,
        }
    }

    /// Whether any crew slot carries explicit skills
    pub fn has_custom_skills(&self) -> bool {
        self.crew.iter().any(|c| c.has_custom_skills())
    }

    /// Effective skills of the primary (first) crew slot
    pub fn primary_skills(&self) -> (u8, u8) {
        self.crew
            .first()
            .map(|c| c.effective_skills())
            .unwrap_or((DEFAULT_GUNNERY, DEFAULT_PILOTING))
    }
}

/// An ordered group of units within a force
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitGroup {
    /// Unique identifier, stable across renames and moves
    pub id: GroupId,
    /// Display name; auto-generated unless locked
    pub name: String,
    /// True once the user has named the group explicitly
    pub name_locked: bool,
    /// Units in display order
    pub units: Vec<ForceUnit>,
}

impl UnitGroup {
    /// Create an empty group with an auto-generated (unlocked) name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            name_locked: false,
            units: Vec::new(),
        }
    }

    /// Create an empty group with a user-chosen (locked) name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            name_locked: true,
            units: Vec::new(),
        }
    }

    /// Rename the group and lock the name against auto-regeneration
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.name_locked = true;
    }

    /// Whether the group holds no units
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of units in the group
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Position of a unit in this group
    pub fn unit_index(&self, id: &UnitId) -> Option<usize> {
        self.units.iter().position(|u| &u.id == id)
    }
}

/// A complete force: metadata plus ordered groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Force {
    /// Display name; auto-generated from contents unless locked
    pub name: String,
    /// True once the user has named the force explicitly
    pub name_locked: bool,
    /// Remote identity; present once the force has been saved
    pub instance_id: Option<ForceId>,
    /// Rule system every unit in this force plays under
    pub system: GameSystem,
    /// Whether the local user owns the persisted record
    pub owned: bool,
    /// Last-modified time, compared during conflict checks
    pub timestamp: DateTime<Utc>,
    /// Groups in display order
    pub groups: Vec<UnitGroup>,
}

impl Force {
    /// Create an empty, unsaved force owned by the local user
    pub fn new(name: impl Into<String>, system: GameSystem) -> Self {
        Self {
            name: name.into(),
            name_locked: false,
            instance_id: None,
            system,
            owned: true,
            timestamp: Utc::now(),
            groups: Vec::new(),
        }
    }

    /// Rename the force and lock the name
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.name_locked = true;
    }

    /// Iterate all units in display order (group order, then unit order)
    pub fn units(&self) -> impl Iterator<Item = &ForceUnit> {
        self.groups.iter().flat_map(|g| g.units.iter())
    }

    /// Total unit count across all groups
    pub fn unit_count(&self) -> usize {
        self.groups.iter().map(|g| g.units.len()).sum()
    }

    /// A force is transient when it has no units and was never saved.
    /// Transient forces are dropped rather than persisted.
    pub fn is_transient(&self) -> bool {
        self.unit_count() == 0 && self.instance_id.is_none()
    }

    /// Position of a group in this force
    pub fn find_group(&self, id: &GroupId) -> Option<usize> {
        self.groups.iter().position(|g| &g.id == id)
    }

    /// Shared borrow of a group by id
    pub fn group(&self, id: &GroupId) -> Option<&UnitGroup> {
        self.groups.iter().find(|g| &g.id == id)
    }

    /// Locate a unit as (group index, unit index)
    pub fn find_unit(&self, id: &UnitId) -> Option<(usize, usize)> {
        for (gi, group) in self.groups.iter().enumerate() {
            if let Some(ui) = group.unit_index(id) {
                return Some((gi, ui));
            }
        }
        None
    }

    /// Whether any group holds the unit
    pub fn contains_unit(&self, id: &UnitId) -> bool {
        self.find_unit(id).is_some()
    }

    /// Stamp the force as modified now
    pub fn touch(&mut self) {
        self.timestamp = Utc::now();
    }

    /// Remove empty groups, except one being hovered as a drop target.
    /// Returns true if anything was removed.
    pub fn prune_empty_groups(&mut self, keep: Option<&GroupId>) -> bool {
        let before = self.groups.len();
        self.groups
            .retain(|g| !g.is_empty() || Some(&g.id) == keep);
        self.groups.len() != before
    }

    /// Regenerate auto-names for groups whose name is not locked
    pub fn refresh_auto_names(&mut self) {
        for (i, group) in self.groups.iter_mut().enumerate() {
            if !group.name_locked {
                group.name = auto_group_name(group.units.len(), i);
            }
        }
    }
}

/// Formation label for a group of `size` units.
/// The sizes match the common tabletop formations regardless of system.
pub fn formation_label(size: usize) -> &'static str {
    match size {
        4 => "Lance",
        5 => "Star",
        6 => "Level II",
        _ => "Group",
    }
}

const GREEK_ORDINALS: [&str; 24] = [
    "Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Zeta", "Eta", "Theta", "Iota", "Kappa",
    "Lambda", "Mu", "Nu", "Xi", "Omicron", "Pi", "Rho", "Sigma", "Tau", "Upsilon", "Phi", "Chi",
    "Psi", "Omega",
];

/// Greek ordinal for a group position, numeric past the table
pub fn greek_ordinal(index: usize) -> String {
    match GREEK_ORDINALS.get(index) {
        Some(name) => (*name).to_string(),
        None => format!("{}", index + 1),
    }
}

/// Auto-generated group name, e.g. "Lance Alpha" or "Star Beta"
pub fn auto_group_name(size: usize, index: usize) -> String {
    format!("{} {}", formation_label(size), greek_ordinal(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, system: GameSystem) -> ForceUnit {
        ForceUnit::new(name.to_ascii_lowercase().replace(' ', "-"), name, system)
    }

    #[test]
    fn test_id_display_prefixes() {
        assert!(format!("{}", ForceId::new()).starts_with("force_"));
        assert!(format!("{}", GroupId::new()).starts_with("group_"));
        assert!(format!("{}", UnitId::new()).starts_with("unit_"));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(UnitId::new(), UnitId::new());
        assert_ne!(GroupId::new(), GroupId::new());
    }

    #[test]
    fn test_id_parse_round_trip() {
        let id = ForceId::new();
        assert_eq!(ForceId::from_string(&id.to_string()).unwrap(), id);
        assert_eq!(ForceId::from_string(&id.0.to_string()).unwrap(), id);

        let gid = GroupId::new();
        assert_eq!(GroupId::from_string(&gid.to_string()).unwrap(), gid);
        assert!(GroupId::from_string("not-a-ulid").is_err());
    }

    #[test]
    fn test_game_system_parse() {
        use std::str::FromStr;
        assert_eq!(GameSystem::from_str("classic").unwrap(), GameSystem::Classic);
        assert_eq!(
            GameSystem::from_str("alpha-strike").unwrap(),
            GameSystem::AlphaStrike
        );
        assert_eq!(GameSystem::from_str("AS").unwrap(), GameSystem::AlphaStrike);
        assert!(GameSystem::from_str("napoleonic").is_err());
    }

    #[test]
    fn test_crew_effective_skills() {
        let default = CrewMember::default();
        assert!(!default.has_custom_skills());
        assert_eq!(default.effective_skills(), (4, 5));

        let veteran = CrewMember::with_skills(3, 4);
        assert!(veteran.has_custom_skills());
        assert_eq!(veteran.effective_skills(), (3, 4));
    }

    #[test]
    fn test_new_force_is_transient() {
        let force = Force::new("Test Force", GameSystem::Classic);
        assert!(force.is_transient());
        assert_eq!(force.unit_count(), 0);
        assert!(!force.name_locked);
        assert!(force.owned);
    }

    #[test]
    fn test_force_with_units_is_not_transient() {
        let mut force = Force::new("Test Force", GameSystem::Classic);
        let mut group = UnitGroup::new("Lance Alpha");
        group.units.push(unit("Locust LCT-1V", GameSystem::Classic));
        force.groups.push(group);
        assert!(!force.is_transient());
    }

    #[test]
    fn test_saved_empty_force_is_not_transient() {
        let mut force = Force::new("Test Force", GameSystem::Classic);
        force.instance_id = Some(ForceId::new());
        assert!(!force.is_transient());
    }

    #[test]
    fn test_find_unit_position() {
        let mut force = Force::new("Test Force", GameSystem::Classic);
        let mut alpha = UnitGroup::new("Lance Alpha");
        alpha.units.push(unit("Locust LCT-1V", GameSystem::Classic));
        let mut beta = UnitGroup::new("Lance Beta");
        let wasp = unit("Wasp WSP-1", GameSystem::Classic);
        let wasp_id = wasp.id.clone();
        beta.units.push(wasp);
        force.groups.push(alpha);
        force.groups.push(beta);

        assert_eq!(force.find_unit(&wasp_id), Some((1, 0)));
        assert!(force.find_unit(&UnitId::new()).is_none());
    }

    #[test]
    fn test_auto_names_follow_size_and_position() {
        let mut force = Force::new("Test Force", GameSystem::Classic);
        let mut first = UnitGroup::new("placeholder");
        for _ in 0..4 {
            first.units.push(unit("Locust LCT-1V", GameSystem::Classic));
        }
        let mut second = UnitGroup::new("placeholder");
        for _ in 0..5 {
            second.units.push(unit("Wasp WSP-1", GameSystem::Classic));
        }
        force.groups.push(first);
        force.groups.push(second);

        force.refresh_auto_names();
        assert_eq!(force.groups[0].name, "Lance Alpha");
        assert_eq!(force.groups[1].name, "Star Beta");
    }

    #[test]
    fn test_locked_names_survive_refresh() {
        let mut force = Force::new("Test Force", GameSystem::Classic);
        let mut group = UnitGroup::named("Death Commandos");
        group.units.push(unit("Locust LCT-1V", GameSystem::Classic));
        force.groups.push(group);

        force.refresh_auto_names();
        assert_eq!(force.groups[0].name, "Death Commandos");
    }

    #[test]
    fn test_prune_keeps_hovered_group() {
        let mut force = Force::new("Test Force", GameSystem::Classic);
        let hovered = UnitGroup::new("Group Alpha");
        let hovered_id = hovered.id.clone();
        force.groups.push(hovered);
        force.groups.push(UnitGroup::new("Group Beta"));

        assert!(force.prune_empty_groups(Some(&hovered_id)));
        assert_eq!(force.groups.len(), 1);
        assert_eq!(force.groups[0].id, hovered_id);

        assert!(force.prune_empty_groups(None));
        assert!(force.groups.is_empty());
    }

    #[test]
    fn test_rename_locks_name() {
        let mut group = UnitGroup::new("Group Alpha");
        assert!(!group.name_locked);
        group.rename("Fox Company");
        assert!(group.name_locked);
        assert_eq!(group.name, "Fox Company");
    }

    #[test]
    fn test_formation_labels() {
        assert_eq!(formation_label(4), "Lance");
        assert_eq!(formation_label(5), "Star");
        assert_eq!(formation_label(6), "Level II");
        assert_eq!(formation_label(3), "Group");
        assert_eq!(formation_label(0), "Group");
    }

    #[test]
    fn test_greek_ordinals_run_out_numerically() {
        assert_eq!(greek_ordinal(0), "Alpha");
        assert_eq!(greek_ordinal(23), "Omega");
        assert_eq!(greek_ordinal(24), "25");
    }
}
