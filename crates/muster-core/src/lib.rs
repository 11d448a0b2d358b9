//! Muster Core Library
//!
//! Force building with drag-reorganization, shareable links, and
//! local-first persistence.
//!
//! ## Overview
//!
//! Muster is a roster builder for tabletop wargames. Users assemble
//! "forces" (rosters of units organized into groups), rearrange them by
//! drag and drop across groups and even across rule systems, and share
//! them as compact links. Saved forces sync against a remote store with
//! explicit conflict resolution; everything keeps working offline from
//! the local cache.
//!
//! ## Core Principles
//!
//! - **Local-first**: every edit lands in the local cache immediately;
//!   the remote store catches up in the background
//! - **Non-destructive moves**: a move that needs conversion or
//!   confirmation either completes fully or leaves the source untouched
//! - **Links are forces**: any roster round-trips through a query
//!   string small enough to paste in a chat message
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use muster_core::{
//!     Confirmer, GameSystem, LoopbackPush, MemoryStore, MusterEngine, StaticCatalog,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = MusterEngine::new(
//!         "~/.muster/data",
//!         MemoryStore::new(),
//!         Arc::new(StaticCatalog::standard()),
//!         Arc::new(LoopbackPush::new()),
//!         Confirmer::always(true),
//!     )?;
//!
//!     // Build a force
//!     let index = engine.new_force("Fox Company", GameSystem::Classic);
//!     engine.add_unit(index, None, "Locust LCT-1V")?;
//!     engine.add_unit(index, None, "Wasp WSP-1")?;
//!
//!     // Save and share it
//!     engine.save_force(index).await?;
//!     if let Some(link) = engine.current_link() {
//!         println!("share: ?{link}");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod codec;
pub mod confirm;
pub mod engine;
pub mod error;
pub mod reorg;
pub mod scroll;
pub mod storage;
pub mod store;
pub mod sync;
pub mod types;

// Re-exports
pub use catalog::{CatalogUnit, StaticCatalog, UnitCatalog};
pub use codec::{decode_units, encode_units, force_from_params, LinkParams};
pub use confirm::{ConfirmKind, ConfirmPrompt, Confirmer};
pub use engine::MusterEngine;
pub use error::{MusterError, MusterResult};
pub use reorg::{DropTarget, MoveReport};
pub use scroll::{drag_velocity, Autoscroller, AutoscrollParams, EdgeSpan};
pub use storage::{LocalCache, UnitState};
pub use store::{
    ForceSummary, LoopbackPush, MemoryStore, PushChannel, PushEnvelope, RemotePush, RemoteStore,
};
pub use sync::{
    CheckState, ConflictInfo, ConflictResolution, ConflictResolver, PendingConflict, SyncEvent,
    LOCAL_COPY_SUFFIX,
};
pub use types::*;
