//! Local/remote force synchronization
//!
//! ## Overview
//!
//! The sync module keeps locally loaded forces and their remote
//! records from silently diverging. Saves are optimistic: every local
//! mutation persists to the cache and pushes to the remote store in
//! the background. Divergence is caught when it matters, a prompt
//! asks the user to pick a side, and the chosen side wins cleanly.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ConflictResolver (per-force check bookkeeping)                 │
//! │  ├── Tracks CheckState per loaded force                         │
//! │  ├── Holds the remote snapshot behind each open prompt          │
//! │  └── Emits SyncEvents for frontend updates                      │
//! │                                                                 │
//! │  Resolution helpers (pure, no I/O)                              │
//! │  ├── replace_in_place: adopt remote, preserve selection         │
//! │  ├── keep_local_timestamp: strictly-newer overwrite stamp       │
//! │  └── clone_local: fork into a new owned force                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conflict detection
//!
//! A conflict exists when a remote check finds a record whose
//! timestamp is strictly newer than the loaded copy. Checks run on
//! reconnect and when an incoming push names a loaded force; only
//! owned forces prompt (borrowed forces follow the remote silently).

pub mod events;
pub mod resolver;

pub use events::{CheckState, ConflictInfo, SyncEvent};
pub use resolver::{
    clone_local, keep_local_timestamp, remote_is_newer, replace_in_place, ConflictResolution,
    ConflictResolver, PendingConflict, LOCAL_COPY_SUFFIX,
};
