//! Unit catalog seam
//!
//! Muster does not ship stat blocks. Forces reference units by catalog
//! id and display name, and every lookup goes through [`UnitCatalog`]
//! so a data-file catalog, a network catalog, or a test fixture can sit
//! behind the same calls. A blueprint is keyed by (catalog id, system):
//! the same chassis keeps its catalog id across rule systems, which is
//! what makes cross-system conversion a lookup rather than a rewrite.

use serde::{Deserialize, Serialize};

use crate::types::{CrewMember, ForceUnit, GameSystem, UnitId};

/// A unit blueprint as listed in a catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogUnit {
    /// Chassis identifier, stable across rule systems
    pub catalog_id: String,
    /// Display name, e.g. "Locust LCT-1V"
    pub name: String,
    /// Rule system this blueprint is statted for
    pub system: GameSystem,
    /// Number of crew slots an instance carries
    pub crew_size: usize,
}

impl CatalogUnit {
    /// Blueprint with a single crew slot
    pub fn new(
        catalog_id: impl Into<String>,
        name: impl Into<String>,
        system: GameSystem,
    ) -> Self {
        Self {
            catalog_id: catalog_id.into(),
            name: name.into(),
            system,
            crew_size: 1,
        }
    }

    /// Override the crew complement
    pub fn with_crew_size(mut self, crew_size: usize) -> Self {
        self.crew_size = crew_size;
        self
    }

    /// Instantiate a pristine unit from this blueprint
    pub fn instantiate(&self) -> ForceUnit {
        ForceUnit {
            id: UnitId::new(),
            catalog_id: self.catalog_id.clone(),
            name: self.name.clone(),
            system: self.system,
            crew: vec![CrewMember::default(); self.crew_size.max(1)],
            damage: 0,
        }
    }
}

/// Lookup seam between the engine and unit data
pub trait UnitCatalog: Send + Sync {
    /// Resolve a blueprint by catalog id under the given system
    fn resolve(&self, catalog_id: &str, system: GameSystem) -> Option<CatalogUnit>;

    /// Resolve a blueprint by display name under the given system.
    /// Link decoding uses this, since only names travel in links.
    fn resolve_name(&self, name: &str, system: GameSystem) -> Option<CatalogUnit>;

    /// Rebuild a unit for a different rule system.
    ///
    /// Returns a replacement with a fresh id, crew carried over (resized
    /// to the target blueprint) and damage reset, or `None` when the
    /// catalog has no entry for the unit under `target`. The caller owns
    /// the original and decides its fate on `None`.
    fn convert(&self, unit: &ForceUnit, target: GameSystem) -> Option<ForceUnit> {
        let blueprint = self.resolve_name(&unit.name, target)?;
        let mut replacement = blueprint.instantiate();
        let mut crew = unit.crew.clone();
        crew.resize(blueprint.crew_size.max(1), CrewMember::default());
        replacement.crew = crew;
        Some(replacement)
    }
}

/// In-memory catalog backed by a fixed blueprint list
///
/// Serves the CLI demo roster and tests; production embeddings are
/// expected to bring their own [`UnitCatalog`].
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    units: Vec<CatalogUnit>,
}

impl StaticCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a blueprint
    pub fn with_unit(mut self, unit: CatalogUnit) -> Self {
        self.units.push(unit);
        self
    }

    /// Add the same chassis under both rule systems
    pub fn with_chassis(mut self, catalog_id: &str, name: &str) -> Self {
        self.units
            .push(CatalogUnit::new(catalog_id, name, GameSystem::Classic));
        self.units
            .push(CatalogUnit::new(catalog_id, name, GameSystem::AlphaStrike));
        self
    }

    /// Demo roster of common chassis, each in both systems
    pub fn standard() -> Self {
        Self::new()
            .with_chassis("locust-lct-1v", "Locust LCT-1V")
            .with_chassis("wasp-wsp-1", "Wasp WSP-1")
            .with_chassis("stinger-stg-3r", "Stinger STG-3R")
            .with_chassis("phoenix-hawk-pxh-1", "Phoenix Hawk PXH-1")
            .with_chassis("shadow-hawk-shd-2h", "Shadow Hawk SHD-2H")
            .with_chassis("griffin-grf-1n", "Griffin GRF-1N")
            .with_chassis("wolverine-wvr-6r", "Wolverine WVR-6R")
            .with_chassis("warhammer-whm-6r", "Warhammer WHM-6R")
            .with_chassis("marauder-mad-3r", "Marauder MAD-3R")
            .with_chassis("atlas-as7-d", "Atlas AS7-D")
    }

    /// All blueprints under one system, for listing
    pub fn units_for(&self, system: GameSystem) -> impl Iterator<Item = &CatalogUnit> {
        self.units.iter().filter(move |u| u.system == system)
    }
}

impl UnitCatalog for StaticCatalog {
    fn resolve(&self, catalog_id: &str, system: GameSystem) -> Option<CatalogUnit> {
        self.units
            .iter()
            .find(|u| u.catalog_id == catalog_id && u.system == system)
            .cloned()
    }

    fn resolve_name(&self, name: &str, system: GameSystem) -> Option<CatalogUnit> {
        self.units
            .iter()
            .find(|u| u.name.eq_ignore_ascii_case(name) && u.system == system)
            .cloned()
    }
}
