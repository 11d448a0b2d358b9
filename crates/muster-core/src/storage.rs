//! Local cache using redb.
//!
//! The cache is what an offline start loads: full force snapshots keyed
//! by instance id, per-unit play state kept outside the shared
//! snapshot, and the "current force" pointer. Unsaved forces (no
//! instance id yet) never touch the cache; they live in the shareable
//! link until first save.

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::{MusterError, MusterResult};
use crate::types::{Force, ForceId, UnitId};

// Table definitions
const FORCES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("forces");
const UNIT_STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("unit_state");
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Ephemeral per-unit play state.
///
/// Damage and heat accumulate during a session and stay local; sharing
/// a force link never ships them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitState {
    /// Accumulated damage points
    pub damage: u32,
    /// Current heat level (Classic play)
    pub heat: i32,
}

/// Local persistence layer using redb
#[derive(Clone)]
pub struct LocalCache {
    db: Arc<RwLock<Database>>,
}

impl LocalCache {
    /// Current-force pointer storage key (one per cache)
    const CURRENT_FORCE_KEY: &'static str = "current_force";

    /// Create a cache at the given path.
    ///
    /// Creates the parent directory and all tables as needed.
    pub fn new(path: impl AsRef<Path>) -> MusterResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(FORCES_TABLE)?;
            let _ = write_txn.open_table(UNIT_STATE_TABLE)?;
            let _ = write_txn.open_table(META_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Force Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Save a force snapshot, overwriting any previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns `MusterError::InvalidOperation` if the force has no
    /// instance id; only persisted forces are cached.
    pub fn save_force(&self, force: &Force) -> MusterResult<()> {
        let instance_id = force.instance_id.as_ref().ok_or_else(|| {
            MusterError::InvalidOperation("cannot cache a force with no instance id".to_string())
        })?;

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(FORCES_TABLE)?;
            let data = serde_json::to_vec(force)
                .map_err(|e| MusterError::Serialization(e.to_string()))?;
            let key = instance_id.0.to_string();
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a force snapshot by instance id.
    ///
    /// Returns `None` if the force is not cached.
    pub fn load_force(&self, instance_id: &ForceId) -> MusterResult<Option<Force>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(FORCES_TABLE)?;
        let key = instance_id.0.to_string();

        match table.get(key.as_str())? {
            Some(v) => {
                let force: Force = serde_json::from_slice(v.value())
                    .map_err(|e| MusterError::Serialization(e.to_string()))?;
                Ok(Some(force))
            }
            None => Ok(None),
        }
    }

    /// Load all cached forces.
    pub fn list_forces(&self) -> MusterResult<Vec<Force>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(FORCES_TABLE)?;

        let mut forces = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let force: Force = serde_json::from_slice(value.value())
                .map_err(|e| MusterError::Serialization(e.to_string()))?;
            forces.push(force);
        }
        Ok(forces)
    }

    /// Delete a force snapshot and the play state of its units.
    pub fn delete_force(&self, instance_id: &ForceId) -> MusterResult<()> {
        let unit_keys: Vec<String> = self
            .load_force(instance_id)?
            .map(|force| force.units().map(|u| u.id.0.to_string()).collect())
            .unwrap_or_default();

        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let key = instance_id.0.to_string();
            let mut forces = write_txn.open_table(FORCES_TABLE)?;
            let mut unit_state = write_txn.open_table(UNIT_STATE_TABLE)?;

            forces.remove(key.as_str())?;
            for unit_key in &unit_keys {
                unit_state.remove(unit_key.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Unit State Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Save a unit's play state, overwriting any previous state.
    pub fn save_unit_state(&self, unit_id: &UnitId, state: &UnitState) -> MusterResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(UNIT_STATE_TABLE)?;
            let data = serde_json::to_vec(state)
                .map_err(|e| MusterError::Serialization(e.to_string()))?;
            let key = unit_id.0.to_string();
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a unit's play state.
    ///
    /// Returns `None` if the unit has no recorded state.
    pub fn load_unit_state(&self, unit_id: &UnitId) -> MusterResult<Option<UnitState>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(UNIT_STATE_TABLE)?;
        let key = unit_id.0.to_string();

        match table.get(key.as_str())? {
            Some(v) => {
                let state: UnitState = serde_json::from_slice(v.value())
                    .map_err(|e| MusterError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Drop a unit's play state (the unit left its force).
    pub fn clear_unit_state(&self, unit_id: &UnitId) -> MusterResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(UNIT_STATE_TABLE)?;
            let key = unit_id.0.to_string();
            table.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Current Force Pointer
    // ═══════════════════════════════════════════════════════════════════════

    /// Remember which force was current, or clear the pointer.
    pub fn set_current(&self, instance_id: Option<&ForceId>) -> MusterResult<()> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(META_TABLE)?;
            match instance_id {
                Some(id) => {
                    let value = id.0.to_string();
                    table.insert(Self::CURRENT_FORCE_KEY, value.as_bytes())?;
                }
                None => {
                    table.remove(Self::CURRENT_FORCE_KEY)?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// The force that was current last session, if any.
    pub fn current(&self) -> MusterResult<Option<ForceId>> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(META_TABLE)?;

        match table.get(Self::CURRENT_FORCE_KEY)? {
            Some(v) => {
                let text = String::from_utf8_lossy(v.value()).into_owned();
                Ok(ForceId::from_string(&text).ok())
            }
            None => Ok(None),
        }
    }
}
