//! Main MusterEngine - the primary entry point for force building
//!
//! MusterEngine owns the loaded forces and coordinates LocalCache, the
//! remote store, and the push channel for:
//! - Loading forces from shareable links, the remote store, or the cache
//! - Drag-reorganization of units and groups across loaded forces
//! - Optimistic persistence with background remote saves
//! - Conflict detection and resolution against remote copies
//!
//! # Example
//!
//! ```ignore
//! use muster_core::{Confirmer, MemoryStore, MusterEngine, StaticCatalog};
//!
//! let mut engine = MusterEngine::new(
//!     "~/.muster/data",
//!     MemoryStore::new(),
//!     Arc::new(StaticCatalog::standard()),
//!     Arc::new(LoopbackPush::new()),
//!     Confirmer::always(true),
//! )?;
//!
//! // Build a force
//! let index = engine.new_force("Fox Company", GameSystem::Classic);
//! engine.add_unit(index, None, "Locust LCT-1V")?;
//!
//! // Share it
//! let link = engine.current_link();
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::catalog::UnitCatalog;
use crate::codec::{force_from_params, LinkParams};
use crate::confirm::Confirmer;
use crate::error::{MusterError, MusterResult};
use crate::reorg::{self, DropTarget, MoveReport};
use crate::storage::{LocalCache, UnitState};
use crate::store::{ForceSummary, PushChannel, PushEnvelope, RemotePush, RemoteStore};
use crate::sync::{
    clone_local, keep_local_timestamp, remote_is_newer, replace_in_place, CheckState,
    ConflictResolution, ConflictResolver, PendingConflict, SyncEvent,
};
use crate::types::{
    auto_group_name, Force, ForceId, GameSystem, GroupId, UnitGroup, UnitId,
};

/// Default capacity for event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle controller for loaded forces
///
/// All loaded state lives here: the force list, the current index, the
/// selected unit, and per-force conflict bookkeeping. Mutations run on
/// the owner's task; awaited confirmations park the operation without
/// letting anything else mutate in the meantime.
pub struct MusterEngine<S: RemoteStore> {
    /// Local offline cache
    cache: LocalCache,
    /// Remote snapshot store
    remote: S,
    /// Catalog for unit resolution and cross-system conversion
    catalog: Arc<dyn UnitCatalog>,
    /// Push subscriptions for loaded persisted forces
    push: Arc<dyn PushChannel>,
    /// Confirmation seam for destructive moves
    confirmer: Confirmer,
    /// Loaded forces in display order
    forces: Vec<Force>,
    /// Index of the current force
    current: Option<usize>,
    /// Selected unit, preserved across snapshot replacements
    selected: Option<UnitId>,
    /// Group hovered as a drop target; spared from pruning
    drop_hover: Option<GroupId>,
    /// Per-force conflict-check state and open prompts
    resolver: ConflictResolver,
    /// Event broadcast channel for notifying frontends
    event_tx: broadcast::Sender<SyncEvent>,
    /// Queue of pushed snapshots awaiting application
    push_rx: mpsc::UnboundedReceiver<RemotePush>,
    /// Sender side of the push queue, handed to push channels
    push_tx: mpsc::UnboundedSender<RemotePush>,
}

impl<S: RemoteStore> MusterEngine<S> {
    /// Create a new engine with its cache under the given data directory
    ///
    /// # Errors
    ///
    /// Returns `MusterError::Io` if the directory cannot be created, or
    /// a database error if the cache fails to open.
    pub fn new(
        data_dir: impl AsRef<Path>,
        remote: S,
        catalog: Arc<dyn UnitCatalog>,
        push: Arc<dyn PushChannel>,
        confirmer: Confirmer,
    ) -> MusterResult<Self> {
        let data_dir = data_dir.as_ref();
        info!(?data_dir, "Initializing MusterEngine");

        let cache = LocalCache::new(data_dir.join("muster.redb"))?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let resolver = ConflictResolver::new(event_tx.clone());

        Ok(Self {
            cache,
            remote,
            catalog,
            push,
            confirmer,
            forces: Vec::new(),
            current: None,
            selected: None,
            drop_hover: None,
            resolver,
            event_tx,
            push_rx,
            push_tx,
        })
    }

    /// Sender for the push queue; hand this to the push channel so
    /// delivered snapshots land in [`process_pending_pushes`]
    ///
    /// [`process_pending_pushes`]: MusterEngine::process_pending_pushes
    pub fn push_sender(&self) -> mpsc::UnboundedSender<RemotePush> {
        self.push_tx.clone()
    }

    /// Subscribe to engine events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// The loaded forces in display order
    pub fn forces(&self) -> &[Force] {
        &self.forces
    }

    /// A loaded force by index
    pub fn force(&self, index: usize) -> Option<&Force> {
        self.forces.get(index)
    }

    /// Index of the current force
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// The current force
    pub fn current_force(&self) -> Option<&Force> {
        self.current.and_then(|i| self.forces.get(i))
    }

    /// The selected unit
    pub fn selected_unit(&self) -> Option<&UnitId> {
        self.selected.as_ref()
    }

    /// Select a unit (or clear the selection)
    pub fn select_unit(&mut self, unit: Option<UnitId>) {
        self.selected = unit.filter(|id| self.forces.iter().any(|f| f.contains_unit(id)));
    }

    /// Mark a group as the hovered drop target, sparing it from pruning
    pub fn set_drop_hover(&mut self, group: Option<GroupId>) {
        self.drop_hover = group;
    }

    /// Conflict-check state for a persisted force
    pub fn check_state(&self, instance_id: &ForceId) -> CheckState {
        self.resolver.state(instance_id)
    }

    /// The open conflict prompt for a force, if any
    pub fn pending_conflict(&self, instance_id: &ForceId) -> Option<&PendingConflict> {
        self.resolver.pending(instance_id)
    }

    /// The local cache layer
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    fn find_loaded(&self, instance_id: &ForceId) -> Option<usize> {
        self.forces
            .iter()
            .position(|f| f.instance_id.as_ref() == Some(instance_id))
    }

    fn force_mut(&mut self, index: usize) -> MusterResult<&mut Force> {
        self.forces
            .get_mut(index)
            .ok_or_else(|| MusterError::InvalidOperation(format!("no loaded force at index {index}")))
    }

    fn editable_mut(&mut self, index: usize) -> MusterResult<&mut Force> {
        let force = self.force_mut(index)?;
        if !force.owned {
            return Err(MusterError::InvalidOperation(format!(
                "force \"{}\" is read-only",
                force.name
            )));
        }
        Ok(force)
    }

    // ═══════════════════════════════════════════════════════════
    // Loading
    // ═══════════════════════════════════════════════════════════

    /// Load a force from shareable-link query parameters
    ///
    /// A resolvable `instance` parameter loads the saved snapshot; one
    /// that does not resolve is stripped and the link's `units`/`name`
    /// parameters are decoded instead. Returns the loaded index, or
    /// `None` when the link carries nothing loadable.
    ///
    /// # Errors
    ///
    /// Returns a storage error if caching the loaded force fails.
    pub async fn load_from_link(
        &mut self,
        query: &str,
        system: GameSystem,
    ) -> MusterResult<Option<usize>> {
        let mut params = LinkParams::from_query(query);

        if let Some(raw) = params.instance.clone() {
            match ForceId::from_string(&raw) {
                Ok(instance_id) => {
                    if let Some(remote) = self.fetch_quietly(&instance_id).await {
                        return Ok(Some(self.adopt_force(remote)?));
                    }
                    debug!(instance = %raw, "Link instance does not resolve, stripping");
                    params.instance = None;
                }
                Err(_) => {
                    debug!(instance = %raw, "Link instance is not a valid id, stripping");
                    params.instance = None;
                }
            }
        }

        match force_from_params(&params, system, self.catalog.as_ref()) {
            Some(force) => Ok(Some(self.adopt_force(force)?)),
            None => Ok(None),
        }
    }

    /// Load a persisted force by instance id
    ///
    /// Tries the remote store first and falls back to the local cache
    /// when the remote is unreachable.
    ///
    /// # Errors
    ///
    /// Returns `MusterError::ForceNotFound` if neither store has the
    /// force.
    pub async fn load_force(&mut self, instance_id: &ForceId) -> MusterResult<usize> {
        let force = match self.remote.get_force(instance_id, false).await {
            Ok(Some(force)) => force,
            Ok(None) => self
                .cache
                .load_force(instance_id)?
                .ok_or_else(|| MusterError::ForceNotFound(instance_id.to_string()))?,
            Err(e) => {
                warn!(error = %e, force = %instance_id, "Remote fetch failed, trying cache");
                self.cache
                    .load_force(instance_id)?
                    .ok_or_else(|| MusterError::ForceNotFound(instance_id.to_string()))?
            }
        };
        self.adopt_force(force)
    }

    /// Restore the last current force from the cache, for offline starts
    ///
    /// # Errors
    ///
    /// Returns a storage error if the cache cannot be read.
    pub fn load_cached(&mut self) -> MusterResult<Option<usize>> {
        let Some(instance_id) = self.cache.current()? else {
            return Ok(None);
        };
        let Some(force) = self.cache.load_force(&instance_id)? else {
            return Ok(None);
        };
        Ok(Some(self.adopt_force(force)?))
    }

    /// Create a new, empty, unsaved force and make it current
    pub fn new_force(&mut self, name: impl Into<String>, system: GameSystem) -> usize {
        self.forces.push(Force::new(name, system));
        let index = self.forces.len() - 1;
        self.set_current(Some(index));
        index
    }

    /// Take a loaded force into the list, reusing slots where possible
    ///
    /// A force already loaded under the same instance id is replaced in
    /// place; otherwise a transient current force gives up its slot;
    /// otherwise the force appends. The adopted force becomes current.
    fn adopt_force(&mut self, mut force: Force) -> MusterResult<usize> {
        self.apply_unit_states(&mut force);

        if let Some(instance_id) = force.instance_id.clone() {
            self.cache.save_force(&force)?;
            self.push.subscribe(&instance_id);

            if let Some(index) = self.find_loaded(&instance_id) {
                let selected = self.selection_in(index);
                let selection = replace_in_place(&mut self.forces[index], force, selected.as_ref());
                if self.current == Some(index) {
                    self.selected = selection;
                }
                self.set_current(Some(index));
                return Ok(index);
            }
        }

        let index = match self.current {
            Some(ci) if self.forces[ci].is_transient() => {
                self.forces[ci] = force;
                ci
            }
            _ => {
                self.forces.push(force);
                self.forces.len() - 1
            }
        };
        self.selected = self.forces[index].units().next().map(|u| u.id.clone());
        self.set_current(Some(index));
        Ok(index)
    }

    /// Overlay cached per-unit play state onto a snapshot
    fn apply_unit_states(&self, force: &mut Force) {
        for group in &mut force.groups {
            for unit in &mut group.units {
                if let Ok(Some(state)) = self.cache.load_unit_state(&unit.id) {
                    unit.damage = state.damage;
                }
            }
        }
    }

    fn selection_in(&self, index: usize) -> Option<UnitId> {
        self.selected
            .clone()
            .filter(|sel| self.forces[index].contains_unit(sel))
    }

    /// Make a force current and remember it for the next start
    ///
    /// Out-of-range indices clear the current force. The selection
    /// moves to the new current force's first unit unless the selected
    /// unit already belongs to it.
    pub fn set_current(&mut self, index: Option<usize>) {
        let index = index.filter(|i| *i < self.forces.len());
        self.current = index;

        let current_id = index.and_then(|i| self.forces[i].instance_id.clone());
        if let Err(e) = self.cache.set_current(current_id.as_ref()) {
            warn!(error = %e, "Failed to persist current-force pointer");
        }

        match index {
            Some(i) => {
                let keep = self
                    .selected
                    .as_ref()
                    .is_some_and(|sel| self.forces[i].contains_unit(sel));
                if !keep {
                    self.selected = self.forces[i].units().next().map(|u| u.id.clone());
                }
            }
            None => self.selected = None,
        }
    }

    /// Drop a force from the loaded list without deleting it anywhere
    ///
    /// # Errors
    ///
    /// Returns `MusterError::InvalidOperation` if the index is out of
    /// range.
    pub fn unload_force(&mut self, index: usize) -> MusterResult<()> {
        if index >= self.forces.len() {
            return Err(MusterError::InvalidOperation(format!(
                "no loaded force at index {index}"
            )));
        }
        let force = self.forces.remove(index);
        if let Some(id) = &force.instance_id {
            self.push.unsubscribe(id);
            self.resolver.forget(id);
        }
        self.fix_current_after_removal(index);
        debug!(force = %force.name, "Force unloaded");
        Ok(())
    }

    /// Delete a force from the loaded list, the cache, and the remote
    ///
    /// # Errors
    ///
    /// Returns `MusterError::InvalidOperation` if the index is out of
    /// range, or a storage error if the cache delete fails. Remote
    /// failures are logged, not returned; the next save of the same id
    /// would recreate it, and there is no next save.
    pub async fn delete_force(&mut self, index: usize) -> MusterResult<()> {
        if index >= self.forces.len() {
            return Err(MusterError::InvalidOperation(format!(
                "no loaded force at index {index}"
            )));
        }
        let force = self.forces.remove(index);
        self.fix_current_after_removal(index);

        if let Some(id) = &force.instance_id {
            self.cache.delete_force(id)?;
            if self.cache.current()?.as_ref() == Some(id) {
                self.cache.set_current(None)?;
            }
            if let Err(e) = self.remote.delete_force(id).await {
                warn!(error = %e, force = %id, "Remote delete failed");
                let _ = self.event_tx.send(SyncEvent::RemoteError {
                    instance_id: Some(id.clone()),
                    message: e.to_string(),
                });
            }
            self.push.unsubscribe(id);
            self.resolver.forget(id);
            let _ = self.event_tx.send(SyncEvent::ForceDeleted {
                instance_id: id.clone(),
            });
        }
        info!(force = %force.name, "Force deleted");
        Ok(())
    }

    fn fix_current_after_removal(&mut self, removed: usize) {
        let next = match self.current {
            Some(ci) if ci == removed => None,
            Some(ci) if ci > removed => Some(ci - 1),
            other => other,
        };
        self.set_current(next);
    }

    // ═══════════════════════════════════════════════════════════
    // Saving
    // ═══════════════════════════════════════════════════════════

    /// Persist a force locally and remotely, minting an instance id on
    /// first save
    ///
    /// The local cache write is authoritative; a remote failure is
    /// logged and reported as an event, not returned.
    ///
    /// # Errors
    ///
    /// Returns `MusterError::InvalidOperation` for an out-of-range
    /// index or a read-only force, or a storage error if the cache
    /// write fails.
    pub async fn save_force(&mut self, index: usize) -> MusterResult<ForceId> {
        let force = self.editable_mut(index)?;
        let instance_id = force.instance_id.clone().unwrap_or_else(ForceId::new);
        force.instance_id = Some(instance_id.clone());
        force.touch();
        let snapshot = force.clone();

        self.cache.save_force(&snapshot)?;
        if self.current == Some(index) {
            self.cache.set_current(Some(&instance_id))?;
        }
        if let Err(e) = self.remote.save_force(&snapshot).await {
            warn!(error = %e, force = %snapshot.name, "Remote save failed, cached locally");
            let _ = self.event_tx.send(SyncEvent::RemoteError {
                instance_id: Some(instance_id.clone()),
                message: e.to_string(),
            });
        }
        self.push.subscribe(&instance_id);
        let _ = self.event_tx.send(SyncEvent::ForceChanged {
            instance_id: Some(instance_id.clone()),
        });
        debug!(force = %instance_id, name = %snapshot.name, "Force saved");
        Ok(instance_id)
    }

    /// Cache a snapshot and schedule its remote save in the background
    fn persist_quietly(&self, index: usize) {
        let Some(force) = self.forces.get(index) else {
            return;
        };
        if force.instance_id.is_none() {
            return;
        }
        if let Err(e) = self.cache.save_force(force) {
            warn!(error = %e, force = %force.name, "Cache save failed");
        }
        self.spawn_remote_save(force.clone());
    }

    /// Fire-and-forget remote save; failures are logged and reported
    fn spawn_remote_save(&self, force: Force) {
        let remote = self.remote.clone();
        let events = self.event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = remote.save_force(&force).await {
                warn!(error = %e, force = %force.name, "Background remote save failed");
                let _ = events.send(SyncEvent::RemoteError {
                    instance_id: force.instance_id.clone(),
                    message: e.to_string(),
                });
            }
        });
    }

    fn spawn_remote_delete(&self, instance_id: ForceId) {
        let remote = self.remote.clone();
        let events = self.event_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = remote.delete_force(&instance_id).await {
                warn!(error = %e, force = %instance_id, "Background remote delete failed");
                let _ = events.send(SyncEvent::RemoteError {
                    instance_id: Some(instance_id),
                    message: e.to_string(),
                });
            }
        });
    }

    /// Persist a mutated force and announce the change
    fn after_mutation(&mut self, index: usize) {
        let Some(force) = self.forces.get(index) else {
            return;
        };
        let instance_id = force.instance_id.clone();
        if instance_id.is_some() {
            self.persist_quietly(index);
        }
        let _ = self.event_tx.send(SyncEvent::ForceChanged { instance_id });
    }

    // ═══════════════════════════════════════════════════════════
    // Roster mutations
    // ═══════════════════════════════════════════════════════════

    /// Add a unit from the catalog to a force and select it
    ///
    /// The unit lands in the given group, or the force's last group, or
    /// a fresh auto-named group when the force has none.
    ///
    /// # Errors
    ///
    /// Returns `MusterError::UnitNotFound` if the catalog cannot
    /// resolve the name under the force's rule system, or
    /// `MusterError::GroupNotFound` if the given group is not in the
    /// force.
    pub fn add_unit(
        &mut self,
        index: usize,
        group: Option<&GroupId>,
        name: &str,
    ) -> MusterResult<UnitId> {
        let catalog = Arc::clone(&self.catalog);
        let force = self.editable_mut(index)?;
        let blueprint = catalog
            .resolve_name(name, force.system)
            .ok_or_else(|| MusterError::UnitNotFound(name.to_string()))?;

        let unit = blueprint.instantiate();
        let unit_id = unit.id.clone();
        let gi = match group {
            Some(id) => force
                .find_group(id)
                .ok_or_else(|| MusterError::GroupNotFound(id.to_string()))?,
            None => {
                if force.groups.is_empty() {
                    force.groups.push(UnitGroup::new(auto_group_name(1, 0)));
                }
                force.groups.len() - 1
            }
        };
        force.groups[gi].units.push(unit);
        force.refresh_auto_names();
        force.touch();

        self.selected = Some(unit_id.clone());
        self.after_mutation(index);
        debug!(unit = %unit_id, unit_name = name, "Unit added");
        Ok(unit_id)
    }

    /// Remove a unit from whichever loaded force holds it
    ///
    /// # Errors
    ///
    /// Returns `MusterError::UnitNotFound` if no loaded force holds the
    /// unit, or `MusterError::InvalidOperation` for a read-only force.
    pub fn remove_unit(&mut self, unit_id: &UnitId) -> MusterResult<()> {
        let Some((fi, (gi, ui))) = self
            .forces
            .iter()
            .enumerate()
            .find_map(|(fi, f)| f.find_unit(unit_id).map(|loc| (fi, loc)))
        else {
            return Err(MusterError::UnitNotFound(unit_id.to_string()));
        };

        let keep = self.drop_hover.clone();
        let force = self.editable_mut(fi)?;
        force.groups[gi].units.remove(ui);
        force.prune_empty_groups(keep.as_ref());
        force.refresh_auto_names();
        force.touch();

        if let Err(e) = self.cache.clear_unit_state(unit_id) {
            warn!(error = %e, unit = %unit_id, "Failed to clear cached unit state");
        }
        if self.selected.as_ref() == Some(unit_id) {
            self.selected = self.forces[fi].units().next().map(|u| u.id.clone());
        }
        self.after_mutation(fi);
        debug!(unit = %unit_id, "Unit removed");
        Ok(())
    }

    /// Set one crew member's skills; `None` values fall back to defaults
    ///
    /// # Errors
    ///
    /// Returns `MusterError::UnitNotFound` if no loaded force holds the
    /// unit, or `MusterError::InvalidOperation` for a bad crew index or
    /// a read-only force.
    pub fn set_crew_skills(
        &mut self,
        unit_id: &UnitId,
        crew_index: usize,
        gunnery: Option<u8>,
        piloting: Option<u8>,
    ) -> MusterResult<()> {
        let Some((fi, (gi, ui))) = self
            .forces
            .iter()
            .enumerate()
            .find_map(|(fi, f)| f.find_unit(unit_id).map(|loc| (fi, loc)))
        else {
            return Err(MusterError::UnitNotFound(unit_id.to_string()));
        };

        let force = self.editable_mut(fi)?;
        let unit = &mut force.groups[gi].units[ui];
        let crew = unit.crew.get_mut(crew_index).ok_or_else(|| {
            MusterError::InvalidOperation(format!("unit has no crew member {crew_index}"))
        })?;
        crew.gunnery = gunnery;
        crew.piloting = piloting;
        force.touch();

        self.after_mutation(fi);
        Ok(())
    }

    /// Record per-unit play state (damage, heat)
    ///
    /// Damage lives on the unit and in the cache; heat is cache-only
    /// play state and never travels in snapshots or links.
    ///
    /// # Errors
    ///
    /// Returns `MusterError::UnitNotFound` if no loaded force holds the
    /// unit, or a storage error if the cache write fails.
    pub fn record_unit_state(&mut self, unit_id: &UnitId, damage: u32, heat: i32) -> MusterResult<()> {
        let Some((fi, (gi, ui))) = self
            .forces
            .iter()
            .enumerate()
            .find_map(|(fi, f)| f.find_unit(unit_id).map(|loc| (fi, loc)))
        else {
            return Err(MusterError::UnitNotFound(unit_id.to_string()));
        };

        self.forces[fi].groups[gi].units[ui].damage = damage;
        self.cache
            .save_unit_state(unit_id, &UnitState { damage, heat })?;
        Ok(())
    }

    /// Append a new empty group to a force
    ///
    /// # Errors
    ///
    /// Returns `MusterError::InvalidOperation` for an out-of-range
    /// index or a read-only force.
    pub fn new_group(&mut self, index: usize) -> MusterResult<GroupId> {
        let force = self.editable_mut(index)?;
        let group = UnitGroup::new(auto_group_name(0, force.groups.len()));
        let group_id = group.id.clone();
        force.groups.push(group);
        force.touch();
        self.after_mutation(index);
        Ok(group_id)
    }

    /// Rename a group, locking its name against auto-regeneration
    ///
    /// # Errors
    ///
    /// Returns `MusterError::GroupNotFound` if no loaded force holds
    /// the group.
    pub fn rename_group(&mut self, group_id: &GroupId, name: impl Into<String>) -> MusterResult<()> {
        let Some(fi) = self
            .forces
            .iter()
            .position(|f| f.find_group(group_id).is_some())
        else {
            return Err(MusterError::GroupNotFound(group_id.to_string()));
        };
        let force = self.editable_mut(fi)?;
        if let Some(gi) = force.find_group(group_id) {
            force.groups[gi].rename(name);
            force.touch();
        }
        self.after_mutation(fi);
        Ok(())
    }

    /// Rename a force, locking its name
    ///
    /// # Errors
    ///
    /// Returns `MusterError::InvalidOperation` for an out-of-range
    /// index or a read-only force.
    pub fn rename_force(&mut self, index: usize, name: impl Into<String>) -> MusterResult<()> {
        let force = self.editable_mut(index)?;
        force.rename(name);
        force.touch();
        self.after_mutation(index);
        Ok(())
    }

    /// Remove empty groups from a force, sparing the hovered drop target
    ///
    /// # Errors
    ///
    /// Returns `MusterError::InvalidOperation` for an out-of-range
    /// index or a read-only force.
    pub fn prune_groups(&mut self, index: usize) -> MusterResult<bool> {
        let keep = self.drop_hover.clone();
        let force = self.editable_mut(index)?;
        let pruned = force.prune_empty_groups(keep.as_ref());
        if pruned {
            force.refresh_auto_names();
            force.touch();
            self.after_mutation(index);
        }
        Ok(pruned)
    }

    // ═══════════════════════════════════════════════════════════
    // Drag-drop moves
    // ═══════════════════════════════════════════════════════════

    /// Handle dropping a dragged unit onto a container
    ///
    /// `source_container` and `target_container` are gesture-layer ids
    /// (`group-<id>`, `new-group`); anything that does not parse, or
    /// refers to state that no longer exists, is ignored. The new-group
    /// zone targets the current force.
    pub async fn drop_unit(
        &mut self,
        source_container: &str,
        source_index: usize,
        target_container: &str,
        target_index: usize,
    ) -> MoveReport {
        let Some(DropTarget::Group(source_group)) = DropTarget::parse(source_container) else {
            debug!(container = source_container, "Unrecognized drop source, ignoring");
            return MoveReport::default();
        };

        let report = match DropTarget::parse(target_container) {
            Some(DropTarget::Group(target_group)) => {
                reorg::move_unit(
                    &mut self.forces,
                    &source_group,
                    source_index,
                    &target_group,
                    target_index,
                    self.catalog.as_ref(),
                    &self.confirmer,
                )
                .await
            }
            Some(DropTarget::NewGroup) => match self.current {
                Some(force_index) => {
                    reorg::move_unit_to_new_group(
                        &mut self.forces,
                        &source_group,
                        source_index,
                        force_index,
                        self.catalog.as_ref(),
                        &self.confirmer,
                    )
                    .await
                }
                None => MoveReport::default(),
            },
            _ => {
                debug!(container = target_container, "Unrecognized drop target, ignoring");
                MoveReport::default()
            }
        };

        self.apply_report(&report);
        report
    }

    /// Handle dropping a dragged group onto a force's group list
    ///
    /// The target is a `force-groups-<key>` container id, keyed by
    /// instance id or force name.
    pub async fn drop_group(
        &mut self,
        source_container: &str,
        target_container: &str,
        target_index: usize,
    ) -> MoveReport {
        let Some(DropTarget::Group(source_group)) = DropTarget::parse(source_container) else {
            debug!(container = source_container, "Unrecognized drop source, ignoring");
            return MoveReport::default();
        };
        let Some(DropTarget::ForceGroups(key)) = DropTarget::parse(target_container) else {
            debug!(container = target_container, "Unrecognized drop target, ignoring");
            return MoveReport::default();
        };
        let Some(target_force) = reorg::resolve_force_key(&self.forces, &key) else {
            debug!(key = %key, "Drop target force not loaded, ignoring");
            return MoveReport::default();
        };

        let report = reorg::move_group(
            &mut self.forces,
            &source_group,
            target_force,
            target_index,
            self.catalog.as_ref(),
            &self.confirmer,
        )
        .await;

        self.apply_report(&report);
        report
    }

    /// Move a unit between groups directly, without container ids
    pub async fn move_unit(
        &mut self,
        source_group: &GroupId,
        source_index: usize,
        target_group: &GroupId,
        target_index: usize,
    ) -> MoveReport {
        let report = reorg::move_unit(
            &mut self.forces,
            source_group,
            source_index,
            target_group,
            target_index,
            self.catalog.as_ref(),
            &self.confirmer,
        )
        .await;
        self.apply_report(&report);
        report
    }

    /// Move a unit into a fresh group of a force, without container ids
    pub async fn move_unit_to_new_group(
        &mut self,
        source_group: &GroupId,
        source_index: usize,
        target_force: usize,
    ) -> MoveReport {
        let report = reorg::move_unit_to_new_group(
            &mut self.forces,
            source_group,
            source_index,
            target_force,
            self.catalog.as_ref(),
            &self.confirmer,
        )
        .await;
        self.apply_report(&report);
        report
    }

    /// Carry out what a move reported: persistence, cleanup, events
    fn apply_report(&mut self, report: &MoveReport) {
        for name in &report.failed_conversions {
            let _ = self.event_tx.send(SyncEvent::ConversionFailed {
                unit_name: name.clone(),
            });
        }
        if !report.mutated {
            return;
        }

        if report.transient_changed {
            let _ = self.event_tx.send(SyncEvent::ForceChanged { instance_id: None });
        }
        for id in &report.changed {
            if let Some(index) = self.find_loaded(id) {
                self.persist_quietly(index);
            }
            let _ = self.event_tx.send(SyncEvent::ForceChanged {
                instance_id: Some(id.clone()),
            });
        }
        for unit_id in &report.released_units {
            if let Err(e) = self.cache.clear_unit_state(unit_id) {
                warn!(error = %e, unit = %unit_id, "Stale unit state survived a conversion");
            }
        }
        if let Some(id) = &report.deleted {
            if let Err(e) = self.cache.delete_force(id) {
                warn!(error = %e, force = %id, "Cache delete failed for emptied force");
            }
            self.spawn_remote_delete(id.clone());
            self.push.unsubscribe(id);
            self.resolver.forget(id);
            let _ = self.event_tx.send(SyncEvent::ForceDeleted {
                instance_id: id.clone(),
            });
        }
        if let Some(index) = report.new_current {
            self.set_current(Some(index));
        }
        if let Some(sel) = self.selected.clone() {
            if !self.forces.iter().any(|f| f.contains_unit(&sel)) {
                self.selected = self
                    .current
                    .and_then(|i| self.forces[i].units().next())
                    .map(|u| u.id.clone());
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Sync
    // ═══════════════════════════════════════════════════════════

    /// Run a conflict check for every loaded persisted force
    ///
    /// Call when connectivity returns. Returns how many checks found
    /// something to act on.
    pub async fn on_reconnect(&mut self) -> usize {
        let ids: Vec<ForceId> = self
            .forces
            .iter()
            .filter_map(|f| f.instance_id.clone())
            .collect();
        let mut acted = 0;
        for id in ids {
            if self.check_force(&id).await {
                acted += 1;
            }
        }
        acted
    }

    /// Check one loaded force against its remote copy
    ///
    /// Returns true when the check replaced the force or opened a
    /// conflict. The fetch result is race-checked by instance id on
    /// return; a force unloaded mid-check discards the stale result.
    pub async fn check_force(&mut self, instance_id: &ForceId) -> bool {
        if self.find_loaded(instance_id).is_none() {
            return false;
        }
        if !self.resolver.begin_check(instance_id) {
            debug!(force = %instance_id, "Check already in flight, skipping");
            return false;
        }

        let fetched = self.remote.get_force(instance_id, false).await;

        let Some(index) = self.find_loaded(instance_id) else {
            debug!(force = %instance_id, "Force unloaded during check, discarding result");
            self.resolver.forget(instance_id);
            return false;
        };
        match fetched {
            Ok(Some(remote)) => self.reconcile(index, remote),
            Ok(None) => {
                self.resolver.finish_check(instance_id);
                false
            }
            Err(e) => {
                warn!(error = %e, force = %instance_id, "Conflict check fetch failed");
                self.resolver.finish_check(instance_id);
                let _ = self.event_tx.send(SyncEvent::RemoteError {
                    instance_id: Some(instance_id.clone()),
                    message: e.to_string(),
                });
                false
            }
        }
    }

    /// Drain queued remote pushes and reconcile each with loaded state
    ///
    /// This should be called periodically or before reading force
    /// state. Returns the number of pushes that replaced a force or
    /// opened a conflict.
    pub fn process_pending_pushes(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(push) = self.push_rx.try_recv() {
            let snapshot = match PushEnvelope::decode(&push.payload) {
                Ok(envelope) => envelope.into_force(),
                Err(e) => {
                    warn!(force = %push.instance_id, error = %e, "Discarding malformed push payload");
                    continue;
                }
            };
            if snapshot.instance_id.as_ref() != Some(&push.instance_id) {
                warn!(force = %push.instance_id, "Push payload names a different force, discarding");
                continue;
            }
            let Some(index) = self.find_loaded(&push.instance_id) else {
                debug!(force = %push.instance_id, "Push for a force not loaded, discarding");
                continue;
            };
            if self.resolver.state(&push.instance_id) == CheckState::Checking {
                debug!(force = %push.instance_id, "Check in flight, letting the fetch win");
                continue;
            }
            if self.reconcile(index, snapshot) {
                processed += 1;
            }
        }
        processed
    }

    /// Compare a remote snapshot against a loaded force and act
    ///
    /// Not-newer snapshots are dropped. Newer ones replace read-only
    /// forces outright and open a conflict prompt for owned ones.
    fn reconcile(&mut self, index: usize, remote: Force) -> bool {
        let Some(instance_id) = self.forces[index].instance_id.clone() else {
            return false;
        };
        if !remote_is_newer(&self.forces[index], &remote) {
            self.resolver.finish_check(&instance_id);
            return false;
        }
        if self.forces[index].owned {
            self.resolver.open_conflict(&self.forces[index], remote);
            return true;
        }
        self.apply_remote(index, remote);
        self.resolver.finish_check(&instance_id);
        true
    }

    /// Replace a loaded force with a remote snapshot in place
    ///
    /// The reconciled state is cached unconditionally so an offline
    /// start sees it.
    fn apply_remote(&mut self, index: usize, snapshot: Force) {
        let selected = self.selection_in(index);
        let selection = replace_in_place(&mut self.forces[index], snapshot, selected.as_ref());
        if self.current == Some(index) {
            self.selected = selection;
        }

        let force = &self.forces[index];
        if let Err(e) = self.cache.save_force(force) {
            warn!(error = %e, force = %force.name, "Cache save failed after replacement");
        }
        if let Some(id) = force.instance_id.clone() {
            let _ = self.event_tx.send(SyncEvent::ForceReplaced { instance_id: id });
        }
    }

    /// Apply the user's choice for an open conflict
    ///
    /// # Errors
    ///
    /// Returns `MusterError::InvalidOperation` if no conflict is open
    /// for the force, or `MusterError::ForceNotFound` if it was
    /// unloaded while the prompt sat open.
    pub async fn resolve_conflict(
        &mut self,
        instance_id: &ForceId,
        resolution: ConflictResolution,
    ) -> MusterResult<()> {
        let pending = self.resolver.take_pending(instance_id).ok_or_else(|| {
            MusterError::InvalidOperation(format!("no open conflict for {instance_id}"))
        })?;
        let Some(index) = self.find_loaded(instance_id) else {
            return Err(MusterError::ForceNotFound(instance_id.to_string()));
        };

        match resolution {
            ConflictResolution::LoadRemote => {
                self.apply_remote(index, pending.remote);
                let snapshot = self.forces[index].clone();
                if let Err(e) = self.remote.save_force(&snapshot).await {
                    warn!(error = %e, force = %instance_id, "Remote save failed after load-remote");
                    let _ = self.event_tx.send(SyncEvent::RemoteError {
                        instance_id: Some(instance_id.clone()),
                        message: e.to_string(),
                    });
                }
            }
            ConflictResolution::KeepLocal => {
                self.forces[index].timestamp = keep_local_timestamp(&pending.remote);
                let snapshot = self.forces[index].clone();
                self.cache.save_force(&snapshot)?;
                if let Err(e) = self.remote.save_force(&snapshot).await {
                    warn!(error = %e, force = %instance_id, "Remote overwrite failed after keep-local");
                    let _ = self.event_tx.send(SyncEvent::RemoteError {
                        instance_id: Some(instance_id.clone()),
                        message: e.to_string(),
                    });
                }
            }
            ConflictResolution::CloneLocal => {
                let fork = clone_local(&self.forces[index]);
                self.push.unsubscribe(instance_id);
                // The remote copy stays the truth for the old id, in
                // the cache as well.
                self.cache.save_force(&pending.remote)?;

                self.forces[index] = fork.clone();
                if let Some(new_id) = &fork.instance_id {
                    self.push.subscribe(new_id);
                }
                self.cache.save_force(&fork)?;
                if self.current == Some(index) {
                    self.cache.set_current(fork.instance_id.as_ref())?;
                }
                if let Err(e) = self.remote.save_force(&fork).await {
                    warn!(error = %e, force = %fork.name, "Remote save failed after clone-local");
                    let _ = self.event_tx.send(SyncEvent::RemoteError {
                        instance_id: fork.instance_id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let _ = self.event_tx.send(SyncEvent::ConflictResolved {
            instance_id: instance_id.clone(),
            resolution,
        });
        info!(force = %instance_id, %resolution, "Conflict resolved");
        Ok(())
    }

    /// Close a conflict prompt without resolving; the check re-arms
    pub fn dismiss_conflict(&mut self, instance_id: &ForceId) -> bool {
        self.resolver.dismiss(instance_id)
    }

    async fn fetch_quietly(&self, instance_id: &ForceId) -> Option<Force> {
        match self.remote.get_force(instance_id, false).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, force = %instance_id, "Remote fetch failed");
                None
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Sharing
    // ═══════════════════════════════════════════════════════════

    /// Link parameters for a loaded force
    pub fn link_params(&self, index: usize) -> Option<LinkParams> {
        self.forces.get(index).map(LinkParams::for_force)
    }

    /// Shareable query string for the current force
    pub fn current_link(&self) -> Option<String> {
        let params = self.link_params(self.current?)?;
        (!params.is_empty()).then(|| params.to_query())
    }

    /// List saved forces, preferring the remote store over the cache
    ///
    /// # Errors
    ///
    /// Returns a storage error if the remote is unreachable and the
    /// cache cannot be read either.
    pub async fn list_saved(&self) -> MusterResult<Vec<ForceSummary>> {
        match self.remote.list_forces().await {
            Ok(listing) => Ok(listing),
            Err(e) => {
                warn!(error = %e, "Remote list failed, using local cache");
                let mut cached: Vec<ForceSummary> = self
                    .cache
                    .list_forces()?
                    .iter()
                    .filter_map(ForceSummary::of)
                    .collect();
                cached.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                Ok(cached)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::store::{LoopbackPush, MemoryStore};
    use tempfile::TempDir;

    struct Harness {
        engine: MusterEngine<MemoryStore>,
        remote: MemoryStore,
        push: LoopbackPush,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        harness_with(Confirmer::always(true))
    }

    fn harness_with(confirmer: Confirmer) -> Harness {
        let dir = TempDir::new().unwrap();
        let remote = MemoryStore::new();
        let push = LoopbackPush::new();
        let engine = MusterEngine::new(
            dir.path(),
            remote.clone(),
            Arc::new(StaticCatalog::standard()),
            Arc::new(push.clone()),
            confirmer,
        )
        .unwrap();
        push.attach(engine.push_sender());
        Harness {
            engine,
            remote,
            push,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_new_force_with_units_auto_groups() {
        let mut h = harness();
        let index = h.engine.new_force("Fox Company", GameSystem::Classic);

        h.engine.add_unit(index, None, "Locust LCT-1V").unwrap();
        h.engine.add_unit(index, None, "Wasp WSP-1").unwrap();

        let force = h.engine.force(index).unwrap();
        assert_eq!(force.unit_count(), 2);
        assert_eq!(force.groups.len(), 1);
        assert_eq!(force.groups[0].name, "Group Alpha");
        // The newest unit is selected.
        let last = force.groups[0].units[1].id.clone();
        assert_eq!(h.engine.selected_unit(), Some(&last));
    }

    #[tokio::test]
    async fn test_add_unit_unknown_name_fails() {
        let mut h = harness();
        let index = h.engine.new_force("Fox Company", GameSystem::Classic);
        let err = h.engine.add_unit(index, None, "Imaginary Mech").unwrap_err();
        assert!(matches!(err, MusterError::UnitNotFound(_)));
    }

    #[tokio::test]
    async fn test_save_mints_instance_id_and_subscribes() {
        let mut h = harness();
        let index = h.engine.new_force("Fox Company", GameSystem::Classic);
        h.engine.add_unit(index, None, "Locust LCT-1V").unwrap();

        let instance_id = h.engine.save_force(index).await.unwrap();

        assert_eq!(
            h.engine.force(index).unwrap().instance_id,
            Some(instance_id.clone())
        );
        assert!(h.remote.snapshot(&instance_id).is_some());
        assert!(h.push.is_subscribed(&instance_id));
        assert!(h
            .engine
            .cache()
            .load_force(&instance_id)
            .unwrap()
            .is_some());

        // Saving again keeps the same identity.
        let again = h.engine.save_force(index).await.unwrap();
        assert_eq!(again, instance_id);
    }

    #[tokio::test]
    async fn test_save_offline_still_caches() {
        let mut h = harness();
        let index = h.engine.new_force("Fox Company", GameSystem::Classic);
        h.engine.add_unit(index, None, "Locust LCT-1V").unwrap();
        h.remote.set_offline(true);

        let mut events = h.engine.subscribe_events();
        let instance_id = h.engine.save_force(index).await.unwrap();

        assert!(h.remote.is_empty());
        assert!(h
            .engine
            .cache()
            .load_force(&instance_id)
            .unwrap()
            .is_some());
        let mut saw_remote_error = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SyncEvent::RemoteError { .. }) {
                saw_remote_error = true;
            }
        }
        assert!(saw_remote_error);
    }

    #[tokio::test]
    async fn test_load_from_link_without_instance() {
        let mut h = harness();
        let query = "units=Lance%2520Alpha%7ELocust%20LCT-1V%2CWasp%20WSP-1&name=Fox%20Company";

        let index = h
            .engine
            .load_from_link(query, GameSystem::Classic)
            .await
            .unwrap()
            .unwrap();

        let force = h.engine.force(index).unwrap();
        assert_eq!(force.name, "Fox Company");
        assert!(force.name_locked);
        assert!(force.instance_id.is_none());
        assert_eq!(force.unit_count(), 2);
        assert_eq!(force.groups[0].name, "Lance Alpha");
        assert_eq!(h.engine.current_index(), Some(index));
    }

    #[tokio::test]
    async fn test_load_from_link_resolves_instance() {
        let mut h = harness();
        let mut saved = Force::new("Shared Force", GameSystem::Classic);
        saved.instance_id = Some(ForceId::new());
        let mut group = UnitGroup::new("Group Alpha");
        group.units.push(
            StaticCatalog::standard()
                .resolve_name("Atlas AS7-D", GameSystem::Classic)
                .unwrap()
                .instantiate(),
        );
        saved.groups.push(group);
        h.remote.insert(saved.clone());
        let instance = saved.instance_id.clone().unwrap().0.to_string();

        let query = format!("units=Locust%20LCT-1V&name=Stale&instance={instance}");
        let index = h
            .engine
            .load_from_link(&query, GameSystem::Classic)
            .await
            .unwrap()
            .unwrap();

        // The saved snapshot wins over the link's stale units.
        let force = h.engine.force(index).unwrap();
        assert_eq!(force.name, "Shared Force");
        assert_eq!(force.units().next().unwrap().name, "Atlas AS7-D");
        assert!(h.push.is_subscribed(&saved.instance_id.unwrap()));
    }

    #[tokio::test]
    async fn test_load_from_link_strips_dead_instance() {
        let mut h = harness();
        let ghost = ForceId::new().0.to_string();
        let query = format!("units=Locust%20LCT-1V&name=Fox%20Company&instance={ghost}");

        let index = h
            .engine
            .load_from_link(&query, GameSystem::Classic)
            .await
            .unwrap()
            .unwrap();

        let force = h.engine.force(index).unwrap();
        assert!(force.instance_id.is_none());
        assert_eq!(force.unit_count(), 1);

        // The re-emitted link no longer carries the dead instance.
        let params = h.engine.link_params(index).unwrap();
        assert!(params.instance.is_none());
    }

    #[tokio::test]
    async fn test_link_load_replaces_transient_current() {
        let mut h = harness();
        let scratch = h.engine.new_force("New Force", GameSystem::Classic);
        assert!(h.engine.force(scratch).unwrap().is_transient());

        let index = h
            .engine
            .load_from_link("units=Wasp%20WSP-1", GameSystem::Classic)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(index, scratch);
        assert_eq!(h.engine.forces().len(), 1);
        assert_eq!(h.engine.force(index).unwrap().unit_count(), 1);
    }

    #[tokio::test]
    async fn test_load_force_falls_back_to_cache_offline() {
        let mut h = harness();
        let index = h.engine.new_force("Fox Company", GameSystem::Classic);
        h.engine.add_unit(index, None, "Locust LCT-1V").unwrap();
        let instance_id = h.engine.save_force(index).await.unwrap();
        h.engine.unload_force(index).unwrap();
        assert!(h.engine.forces().is_empty());

        h.remote.set_offline(true);
        let reloaded = h.engine.load_force(&instance_id).await.unwrap();
        assert_eq!(h.engine.force(reloaded).unwrap().name, "Fox Company");
    }

    #[tokio::test]
    async fn test_load_cached_restores_current() {
        let dir = TempDir::new().unwrap();
        let remote = MemoryStore::new();
        let push = LoopbackPush::new();
        let catalog: Arc<dyn UnitCatalog> = Arc::new(StaticCatalog::standard());
        let instance_id;
        {
            let mut engine = MusterEngine::new(
                dir.path(),
                remote.clone(),
                Arc::clone(&catalog),
                Arc::new(push.clone()),
                Confirmer::always(true),
            )
            .unwrap();
            let index = engine.new_force("Fox Company", GameSystem::Classic);
            engine.add_unit(index, None, "Locust LCT-1V").unwrap();
            instance_id = engine.save_force(index).await.unwrap();
        }

        // Fresh engine over the same data dir, remote unreachable.
        remote.set_offline(true);
        let mut engine = MusterEngine::new(
            dir.path(),
            remote.clone(),
            catalog,
            Arc::new(push),
            Confirmer::always(true),
        )
        .unwrap();
        let index = engine.load_cached().unwrap().unwrap();
        let force = engine.force(index).unwrap();
        assert_eq!(force.instance_id, Some(instance_id));
        assert_eq!(force.unit_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_unit_with_container_ids() {
        let mut h = harness();
        let index = h.engine.new_force("Fox Company", GameSystem::Classic);
        h.engine.add_unit(index, None, "Locust LCT-1V").unwrap();
        h.engine.add_unit(index, None, "Wasp WSP-1").unwrap();
        let group_id = h.engine.force(index).unwrap().groups[0].id.clone();
        let container = format!("group-{group_id}");

        let report = h.engine.drop_unit(&container, 0, &container, 1).await;
        assert!(report.mutated);
        assert!(report.transient_changed);

        let names: Vec<_> = h
            .engine
            .force(index)
            .unwrap()
            .units()
            .map(|u| u.name.clone())
            .collect();
        assert_eq!(names, vec!["Wasp WSP-1", "Locust LCT-1V"]);

        let report = h.engine.drop_unit("garbage", 0, &container, 0).await;
        assert!(!report.mutated);
    }

    #[tokio::test]
    async fn test_drop_unit_to_new_group_targets_current() {
        let mut h = harness();
        let index = h.engine.new_force("Fox Company", GameSystem::Classic);
        h.engine.add_unit(index, None, "Locust LCT-1V").unwrap();
        h.engine.add_unit(index, None, "Wasp WSP-1").unwrap();
        let group_id = h.engine.force(index).unwrap().groups[0].id.clone();
        let container = format!("group-{group_id}");

        let report = h.engine.drop_unit(&container, 1, "new-group", 0).await;

        assert!(report.mutated);
        let force = h.engine.force(index).unwrap();
        assert_eq!(force.groups.len(), 2);
        assert_eq!(force.groups[1].units[0].name, "Wasp WSP-1");
    }

    #[tokio::test]
    async fn test_move_persists_changed_forces() {
        let mut h = harness();
        let a = h.engine.new_force("Alpha", GameSystem::Classic);
        h.engine.add_unit(a, None, "Locust LCT-1V").unwrap();
        h.engine.add_unit(a, None, "Wasp WSP-1").unwrap();
        let a_id = h.engine.save_force(a).await.unwrap();
        let b = h.engine.new_force("Beta", GameSystem::Classic);
        h.engine.add_unit(b, None, "Stinger STG-3R").unwrap();
        let b_id = h.engine.save_force(b).await.unwrap();

        let source = h.engine.force(a).unwrap().groups[0].id.clone();
        let target = h.engine.force(b).unwrap().groups[0].id.clone();
        let report = h.engine.move_unit(&source, 0, &target, 0).await;

        assert!(report.mutated);
        assert_eq!(report.changed.len(), 2);
        // The cache sees both new states immediately.
        let cached_a = h.engine.cache().load_force(&a_id).unwrap().unwrap();
        let cached_b = h.engine.cache().load_force(&b_id).unwrap().unwrap();
        assert_eq!(cached_a.unit_count(), 1);
        assert_eq!(cached_b.unit_count(), 2);
    }

    #[tokio::test]
    async fn test_emptying_move_deletes_source_everywhere() {
        let mut h = harness();
        let a = h.engine.new_force("Doomed", GameSystem::Classic);
        h.engine.add_unit(a, None, "Locust LCT-1V").unwrap();
        let doomed_id = h.engine.save_force(a).await.unwrap();
        let b = h.engine.new_force("Survivor", GameSystem::Classic);
        h.engine.add_unit(b, None, "Wasp WSP-1").unwrap();
        h.engine.save_force(b).await.unwrap();

        let source = h.engine.force(0).unwrap().groups[0].id.clone();
        let target = h.engine.force(1).unwrap().groups[0].id.clone();
        let report = h.engine.move_unit(&source, 0, &target, 0).await;

        assert_eq!(report.deleted, Some(doomed_id.clone()));
        assert_eq!(h.engine.forces().len(), 1);
        assert_eq!(h.engine.current_index(), Some(0));
        assert!(h.engine.cache().load_force(&doomed_id).unwrap().is_none());
        assert!(!h.push.is_subscribed(&doomed_id));
    }

    #[tokio::test]
    async fn test_remove_unit_prunes_and_reselects() {
        let mut h = harness();
        let index = h.engine.new_force("Fox Company", GameSystem::Classic);
        let first = h.engine.add_unit(index, None, "Locust LCT-1V").unwrap();
        let group = h.engine.force(index).unwrap().groups[0].id.clone();
        let second = h.engine.add_unit(index, Some(&group), "Wasp WSP-1").unwrap();

        h.engine.select_unit(Some(second.clone()));
        h.engine.remove_unit(&second).unwrap();

        assert_eq!(h.engine.selected_unit(), Some(&first));
        h.engine.remove_unit(&first).unwrap();
        assert_eq!(h.engine.force(index).unwrap().groups.len(), 0);
        assert_eq!(h.engine.selected_unit(), None);
    }
}
