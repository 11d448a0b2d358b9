//! Shareable link codec for Muster
//!
//! A force travels in a link as three parallel query parameters:
//! - `units` — the roster in a compact grouped format
//! - `name` — the force's display name (omitted while the force is empty)
//! - `instance` — the persisted identity (omitted while unsaved)
//!
//! The `units` value joins one segment per non-empty group with `|`.
//! A segment is the group's unit CSV, prefixed with
//! `percentEncode(name)~` when the group's name is explicitly locked;
//! auto-generated names are never emitted. Each unit is its display
//! name, followed by `:gunnery:piloting` per crew member (in crew
//! order) when any crew slot carries explicit skills:
//!
//! ```text
//! Lance%20Alpha~Locust LCT-1V,Wasp WSP-1:3:4|Stinger STG-3R
//! ```
//!
//! Decoding also accepts the legacy ungrouped format, a bare unit CSV
//! with no `|` and no `~`, which loads into a single default group.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::warn;

use crate::catalog::UnitCatalog;
use crate::types::{Force, GameSystem, UnitGroup};

/// Characters escaped in link values: the codec's own delimiters plus
/// query-string structure.
const LINK_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b',')
    .add(b':')
    .add(b'=')
    .add(b'?')
    .add(b'|')
    .add(b'~');

/// The three link parameters a force travels as.
///
/// All fields are optional; an all-empty `LinkParams` means "nothing to
/// share". `instance` is an opaque id string, kept as text because a
/// link may carry ids minted by other builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkParams {
    /// Roster in the grouped units format
    pub units: Option<String>,
    /// Force display name, percent-decoded
    pub name: Option<String>,
    /// Persisted force identity, or absent while unsaved
    pub instance: Option<String>,
}

impl LinkParams {
    /// Snapshot the link parameters for a force.
    ///
    /// `name` is omitted while the force has zero units; `instance` is
    /// omitted while the force is unsaved.
    pub fn for_force(force: &Force) -> Self {
        let units = encode_units(force);
        Self {
            units: (!units.is_empty()).then_some(units),
            name: (force.unit_count() > 0).then(|| force.name.clone()),
            instance: force.instance_id.as_ref().map(|id| id.0.to_string()),
        }
    }

    /// Render as a query string, e.g. `units=...&name=...&instance=...`.
    /// Absent parameters are skipped; an all-empty set renders as `""`.
    pub fn to_query(&self) -> String {
        let mut pairs = Vec::new();
        if let Some(ref units) = self.units {
            pairs.push(format!(
                "units={}",
                utf8_percent_encode(units, LINK_ESCAPE)
            ));
        }
        if let Some(ref name) = self.name {
            pairs.push(format!("name={}", utf8_percent_encode(name, LINK_ESCAPE)));
        }
        if let Some(ref instance) = self.instance {
            pairs.push(format!(
                "instance={}",
                utf8_percent_encode(instance, LINK_ESCAPE)
            ));
        }
        pairs.join("&")
    }

    /// Parse a query string, tolerating a leading `?`, unknown keys,
    /// `+`-encoded spaces, and keys without values.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);
        for pair in query.split('&') {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => continue,
            };
            let value = decode_component(value);
            match key {
                "units" => params.units = Some(value),
                "name" => params.name = Some(value),
                "instance" => params.instance = Some(value),
                _ => {}
            }
        }
        // Empty values carry no information
        params.units = params.units.filter(|v| !v.is_empty());
        params.name = params.name.filter(|v| !v.is_empty());
        params.instance = params.instance.filter(|v| !v.is_empty());
        params
    }

    /// Whether every parameter is absent
    pub fn is_empty(&self) -> bool {
        self.units.is_none() && self.name.is_none() && self.instance.is_none()
    }
}

fn decode_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

/// Encode a force's roster into the grouped units format.
///
/// Empty groups are skipped entirely; a force with no units encodes as
/// the empty string.
pub fn encode_units(force: &Force) -> String {
    let segments: Vec<String> = force
        .groups
        .iter()
        .filter(|g| !g.is_empty())
        .map(encode_group)
        .collect();
    segments.join("|")
}

fn encode_group(group: &UnitGroup) -> String {
    let csv: Vec<String> = group.units.iter().map(encode_unit).collect();
    let csv = csv.join(",");
    if group.name_locked {
        format!("{}~{}", utf8_percent_encode(&group.name, LINK_ESCAPE), csv)
    } else {
        csv
    }
}

fn encode_unit(unit: &crate::types::ForceUnit) -> String {
    if !unit.has_custom_skills() {
        return unit.name.clone();
    }
    let mut out = unit.name.clone();
    for crew in &unit.crew {
        let (gunnery, piloting) = crew.effective_skills();
        out.push_str(&format!(":{}:{}", gunnery, piloting));
    }
    out
}

/// Decode a units string into groups, resolving names via the catalog.
///
/// Tolerant by design: unresolvable unit names are skipped with a
/// warning, surplus or missing skill tokens are ignored, and groups
/// left with zero units after resolution are dropped. Unlocked groups
/// come back with auto-generated names.
pub fn decode_units(encoded: &str, system: GameSystem, catalog: &dyn UnitCatalog) -> Vec<UnitGroup> {
    if encoded.is_empty() {
        return Vec::new();
    }

    let legacy = !encoded.contains('|') && !encoded.contains('~');
    let mut groups: Vec<UnitGroup> = if legacy {
        vec![decode_group(encoded, system, catalog)]
    } else {
        encoded
            .split('|')
            .map(|segment| decode_group(segment, system, catalog))
            .collect()
    };

    groups.retain(|g| !g.is_empty());
    for (i, group) in groups.iter_mut().enumerate() {
        if !group.name_locked {
            group.name = crate::types::auto_group_name(group.units.len(), i);
        }
    }
    groups
}

fn decode_group(segment: &str, system: GameSystem, catalog: &dyn UnitCatalog) -> UnitGroup {
    let (name, csv) = match segment.split_once('~') {
        Some((raw_name, rest)) if !raw_name.is_empty() => {
            (Some(decode_component(raw_name)), rest)
        }
        Some((_, rest)) => (None, rest),
        None => (None, segment),
    };

    let mut group = match name {
        Some(name) => UnitGroup::named(name),
        None => UnitGroup::new(""),
    };

    for token in csv.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some(unit) = decode_unit(token, system, catalog) {
            group.units.push(unit);
        }
    }
    group
}

fn decode_unit(
    token: &str,
    system: GameSystem,
    catalog: &dyn UnitCatalog,
) -> Option<crate::types::ForceUnit> {
    let mut parts = token.split(':');
    let name = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }

    let blueprint = match catalog.resolve_name(name, system) {
        Some(blueprint) => blueprint,
        None => {
            warn!(unit = %name, %system, "Skipping unresolved unit in link");
            return None;
        }
    };
    let mut unit = blueprint.instantiate();

    // Skill tokens pair up (gunnery, piloting) per crew member; surplus
    // tokens and surplus crew slots are both left alone.
    let tokens: Vec<&str> = parts.collect();
    for (crew, pair) in unit.crew.iter_mut().zip(tokens.chunks(2)) {
        crew.gunnery = pair.first().and_then(|t| t.trim().parse().ok());
        crew.piloting = pair.get(1).and_then(|t| t.trim().parse().ok());
    }

    Some(unit)
}

/// Build a force from decoded link parameters.
///
/// Returns `None` when the parameters carry nothing to build from. The
/// `instance` parameter is not consumed here; resolving it against the
/// remote is the lifecycle controller's job.
pub fn force_from_params(
    params: &LinkParams,
    system: GameSystem,
    catalog: &dyn UnitCatalog,
) -> Option<Force> {
    if params.units.is_none() && params.name.is_none() {
        return None;
    }

    let name = params.name.clone().unwrap_or_else(|| "New Force".to_string());
    let mut force = Force::new(name, system);
    force.name_locked = params.name.is_some();
    if let Some(ref units) = params.units {
        force.groups = decode_units(units, system, catalog);
    }
    Some(force)
}
