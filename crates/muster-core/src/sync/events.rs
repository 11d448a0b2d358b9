//! Sync event types and conflict-check state tracking
//!
//! Every loaded force carries a check state, and everything the sync
//! layer does is announced on a broadcast channel so frontends can
//! refresh lists, swap dialogs, and flash notifications without
//! polling.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  CheckState: Per-force conflict-check state                     │
//! │  ├── Idle: No check in flight                                   │
//! │  ├── Checking: Remote fetch in flight                           │
//! │  └── Conflicted: Divergence found, waiting on the user          │
//! │                                                                 │
//! │  SyncEvent: Notifications about sync activity                   │
//! │  ├── ForceChanged / ForceReplaced / ForceDeleted                │
//! │  ├── ConflictDetected / ConflictResolved / ConflictDismissed    │
//! │  ├── ConversionFailed: A unit could not cross rule systems      │
//! │  └── RemoteError: A remote call failed (logged, not fatal)      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, Utc};

use super::resolver::ConflictResolution;
use crate::types::ForceId;

/// Conflict-check state of a loaded force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckState {
    /// No check in flight
    #[default]
    Idle,
    /// Remote fetch in flight
    Checking,
    /// Divergence found; a prompt is open
    Conflicted,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckState::Idle => write!(f, "Idle"),
            CheckState::Checking => write!(f, "Checking"),
            CheckState::Conflicted => write!(f, "Conflicted"),
        }
    }
}

/// What a conflict prompt shows the user
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictInfo {
    /// The diverged force
    pub instance_id: ForceId,
    /// Display name at detection time
    pub force_name: String,
    /// Local last-modified time
    pub local_timestamp: DateTime<Utc>,
    /// Remote last-modified time (newer, or there would be no conflict)
    pub remote_timestamp: DateTime<Utc>,
}

/// Events emitted by the sync layer and the lifecycle controller
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A local mutation was applied; the shareable link is stale
    ForceChanged {
        /// The mutated force, if it is persisted
        instance_id: Option<ForceId>,
    },
    /// A remote snapshot was applied onto a loaded force in place
    ForceReplaced {
        /// The replaced force
        instance_id: ForceId,
    },
    /// A persisted force was deleted (drained by a move, or removed)
    ForceDeleted {
        /// The deleted force
        instance_id: ForceId,
    },
    /// Local and remote diverged on an owned force; a prompt opened.
    /// A repeat for the same force replaces the previous prompt.
    ConflictDetected {
        /// Prompt contents
        info: ConflictInfo,
    },
    /// The user chose a resolution and it was applied
    ConflictResolved {
        /// The force the prompt was for
        instance_id: ForceId,
        /// The chosen resolution
        resolution: ConflictResolution,
    },
    /// The prompt was closed without resolving; the check is re-armed
    ConflictDismissed {
        /// The force the prompt was for
        instance_id: ForceId,
    },
    /// A unit could not be converted to the target rule system
    ConversionFailed {
        /// Display name of the unit left behind
        unit_name: String,
    },
    /// A remote call failed; local state stays authoritative
    RemoteError {
        /// The force involved, if known
        instance_id: Option<ForceId>,
        /// Error message
        message: String,
    },
}

impl SyncEvent {
    /// Get the force this event relates to, if any
    pub fn instance_id(&self) -> Option<&ForceId> {
        match self {
            SyncEvent::ForceChanged { instance_id } => instance_id.as_ref(),
            SyncEvent::ForceReplaced { instance_id } => Some(instance_id),
            SyncEvent::ForceDeleted { instance_id } => Some(instance_id),
            SyncEvent::ConflictDetected { info } => Some(&info.instance_id),
            SyncEvent::ConflictResolved { instance_id, .. } => Some(instance_id),
            SyncEvent::ConflictDismissed { instance_id } => Some(instance_id),
            SyncEvent::ConversionFailed { .. } => None,
            SyncEvent::RemoteError { instance_id, .. } => instance_id.as_ref(),
        }
    }
}
