//! Conflict detection state machine and resolution helpers
//!
//! The resolver tracks one [`CheckState`] per loaded force and holds
//! the remote snapshot behind each open conflict prompt. It never
//! touches the network or the database itself; the lifecycle
//! controller drives it and performs the I/O each resolution calls
//! for.
//!
//! Resolution semantics:
//! - **Load remote**: the remote snapshot replaces the local groups in
//!   place, preserving the unit selection where possible.
//! - **Keep local**: the local version is pushed back with a timestamp
//!   guaranteed to be strictly newer than the remote one, so the remote
//!   record loses the race deterministically.
//! - **Clone local**: the local version becomes a brand-new owned force
//!   (fresh instance id, marked name) and the remote record is left
//!   untouched.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::debug;

use super::events::{CheckState, ConflictInfo, SyncEvent};
use crate::error::MusterError;
use crate::types::{Force, ForceId, UnitId};

/// Marker appended to a force name by [`clone_local`]
pub const LOCAL_COPY_SUFFIX: &str = " (local copy)";

/// The three ways out of a conflict prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Discard local edits and adopt the remote snapshot
    LoadRemote,
    /// Overwrite the remote record with the local version
    KeepLocal,
    /// Fork the local version into a new force; leave the remote alone
    CloneLocal,
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictResolution::LoadRemote => write!(f, "load-remote"),
            ConflictResolution::KeepLocal => write!(f, "keep-local"),
            ConflictResolution::CloneLocal => write!(f, "clone-local"),
        }
    }
}

impl FromStr for ConflictResolution {
    type Err = MusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "load-remote" | "remote" => Ok(ConflictResolution::LoadRemote),
            "keep-local" | "local" => Ok(ConflictResolution::KeepLocal),
            "clone-local" | "clone" => Ok(ConflictResolution::CloneLocal),
            other => Err(MusterError::InvalidOperation(format!(
                "Unknown conflict resolution: {other}"
            ))),
        }
    }
}

/// An open conflict prompt and the remote snapshot behind it
#[derive(Debug, Clone)]
pub struct PendingConflict {
    /// What the prompt shows
    pub info: ConflictInfo,
    /// The remote version, held until the user decides
    pub remote: Force,
}

/// Per-force conflict-check bookkeeping
///
/// States default to [`CheckState::Idle`]; forces the resolver has
/// never seen are idle by definition.
pub struct ConflictResolver {
    states: HashMap<ForceId, CheckState>,
    pending: HashMap<ForceId, PendingConflict>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl ConflictResolver {
    pub fn new(event_tx: broadcast::Sender<SyncEvent>) -> Self {
        Self {
            states: HashMap::new(),
            pending: HashMap::new(),
            event_tx,
        }
    }

    /// Get the check state for a force (Idle if never seen)
    pub fn state(&self, instance_id: &ForceId) -> CheckState {
        self.states
            .get(instance_id)
            .copied()
            .unwrap_or(CheckState::Idle)
    }

    /// Get the open conflict for a force, if any
    pub fn pending(&self, instance_id: &ForceId) -> Option<&PendingConflict> {
        self.pending.get(instance_id)
    }

    /// Instance ids of all open conflicts
    pub fn conflicted(&self) -> Vec<ForceId> {
        self.pending.keys().cloned().collect()
    }

    /// Try to start a remote check for a force
    ///
    /// Returns false when a check is already in flight or a prompt is
    /// already open, in which case the caller must not start another
    /// fetch.
    pub fn begin_check(&mut self, instance_id: &ForceId) -> bool {
        match self.state(instance_id) {
            CheckState::Idle => {
                self.states
                    .insert(instance_id.clone(), CheckState::Checking);
                true
            }
            CheckState::Checking | CheckState::Conflicted => false,
        }
    }

    /// Record that a check finished without finding divergence
    pub fn finish_check(&mut self, instance_id: &ForceId) {
        if self.state(instance_id) == CheckState::Checking {
            self.states.insert(instance_id.clone(), CheckState::Idle);
        }
    }

    /// Open a conflict prompt for a force
    ///
    /// A second conflict for the same force replaces the previous
    /// prompt rather than stacking behind it; the newer remote
    /// snapshot wins the slot.
    pub fn open_conflict(&mut self, local: &Force, remote: Force) -> Option<ConflictInfo> {
        let instance_id = local.instance_id.clone()?;

        let info = ConflictInfo {
            instance_id: instance_id.clone(),
            force_name: local.name.clone(),
            local_timestamp: local.timestamp,
            remote_timestamp: remote.timestamp,
        };

        if self.pending.contains_key(&instance_id) {
            debug!(force = %instance_id, "Replacing open conflict prompt with newer snapshot");
        }
        self.states
            .insert(instance_id.clone(), CheckState::Conflicted);
        self.pending.insert(
            instance_id,
            PendingConflict {
                info: info.clone(),
                remote,
            },
        );

        let _ = self.event_tx.send(SyncEvent::ConflictDetected {
            info: info.clone(),
        });
        Some(info)
    }

    /// Take the open conflict for resolution, returning the force to Idle
    pub fn take_pending(&mut self, instance_id: &ForceId) -> Option<PendingConflict> {
        let pending = self.pending.remove(instance_id)?;
        self.states.insert(instance_id.clone(), CheckState::Idle);
        Some(pending)
    }

    /// Close a prompt without resolving
    ///
    /// The force returns to Idle so the next check can detect the same
    /// divergence again. Returns false if no prompt was open.
    pub fn dismiss(&mut self, instance_id: &ForceId) -> bool {
        if self.pending.remove(instance_id).is_none() {
            return false;
        }
        self.states.insert(instance_id.clone(), CheckState::Idle);
        let _ = self.event_tx.send(SyncEvent::ConflictDismissed {
            instance_id: instance_id.clone(),
        });
        true
    }

    /// Drop all bookkeeping for a force (it was unloaded or deleted)
    pub fn forget(&mut self, instance_id: &ForceId) {
        self.states.remove(instance_id);
        self.pending.remove(instance_id);
    }
}

/// True when the remote copy has strictly newer edits than the local one
pub fn remote_is_newer(local: &Force, remote: &Force) -> bool {
    remote.timestamp > local.timestamp
}

/// Apply a remote snapshot onto a loaded force in place
///
/// The force object keeps its identity (and `instance_id`); name,
/// groups, system, and timestamp come from the snapshot. `owned`
/// stays as it is: it records this replica's relationship to the
/// force, not snapshot content, and the owner's pushes must not turn
/// a borrowed copy editable. Returns the unit selection to use
/// afterwards:
///
/// 1. the previously selected unit, if the snapshot still contains it
/// 2. else the unit now at the selected unit's old flattened position
/// 3. else the first unit in the snapshot
/// 4. else nothing
pub fn replace_in_place(
    force: &mut Force,
    snapshot: Force,
    selected: Option<&UnitId>,
) -> Option<UnitId> {
    let old_index = selected.and_then(|sel| force.units().position(|u| &u.id == sel));

    force.name = snapshot.name;
    force.name_locked = snapshot.name_locked;
    force.system = snapshot.system;
    force.timestamp = snapshot.timestamp;
    force.groups = snapshot.groups;

    if let Some(sel) = selected {
        if force.contains_unit(sel) {
            return Some(sel.clone());
        }
    }
    if let Some(index) = old_index {
        if let Some(unit) = force.units().nth(index) {
            return Some(unit.id.clone());
        }
    }
    force.units().next().map(|u| u.id.clone())
}

/// Timestamp for a keep-local push
///
/// Strictly newer than the remote record even when clocks disagree, so
/// the overwrite cannot lose a subsequent newest-wins comparison to
/// the very record it replaced.
pub fn keep_local_timestamp(remote: &Force) -> DateTime<Utc> {
    let floor = remote.timestamp + Duration::milliseconds(1);
    Utc::now().max(floor)
}

/// Fork a local force into a brand-new owned force
///
/// Fresh instance id, marked name, fresh timestamp. Unit and group ids
/// are kept; the fork replaces the original in the loaded list, so
/// they cannot collide.
pub fn clone_local(force: &Force) -> Force {
    let mut fork = force.clone();
    fork.instance_id = Some(ForceId::new());
    fork.name = format!("{}{LOCAL_COPY_SUFFIX}", force.name);
    fork.owned = true;
    fork.timestamp = Utc::now();
    fork
}
