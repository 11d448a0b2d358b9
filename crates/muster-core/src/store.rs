//! Remote persistence and push delivery seams
//!
//! The engine talks to its backend through two small traits:
//! [`RemoteStore`] for force snapshots (save / fetch / delete / list)
//! and [`PushChannel`] for per-force snapshot subscriptions. Pushed
//! snapshots travel as postcard-encoded [`PushEnvelope`] bytes inside a
//! [`RemotePush`], queued onto the engine's channel and drained on its
//! schedule. [`MemoryStore`] and [`LoopbackPush`] are the in-process
//! implementations used by tests and the CLI.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{MusterError, MusterResult};
use crate::types::{Force, ForceId, GameSystem};

/// Listing row for a stored force, without the group tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceSummary {
    pub instance_id: ForceId,
    pub name: String,
    pub system: GameSystem,
    pub unit_count: usize,
    pub owned: bool,
    pub timestamp: DateTime<Utc>,
}

impl ForceSummary {
    /// Summary of a persisted force; `None` while unsaved
    pub fn of(force: &Force) -> Option<Self> {
        let instance_id = force.instance_id.clone()?;
        Some(Self {
            instance_id,
            name: force.name.clone(),
            system: force.system,
            unit_count: force.unit_count(),
            owned: force.owned,
            timestamp: force.timestamp,
        })
    }
}

/// Remote snapshot persistence seam.
///
/// All calls are async and may fail; the engine treats save/delete
/// failures as log-and-continue (local state stays authoritative until
/// the next successful check), while fetch failures abort only the
/// check that needed them.
pub trait RemoteStore: Clone + Send + Sync + 'static {
    /// Persist a snapshot, overwriting by instance id
    fn save_force(&self, force: &Force) -> impl Future<Output = MusterResult<()>> + Send;

    /// Fetch a snapshot by instance id. With `owned_only`, a force the
    /// caller does not own comes back as `None` instead.
    fn get_force(
        &self,
        instance_id: &ForceId,
        owned_only: bool,
    ) -> impl Future<Output = MusterResult<Option<Force>>> + Send;

    /// Delete a snapshot by instance id
    fn delete_force(&self, instance_id: &ForceId) -> impl Future<Output = MusterResult<()>> + Send;

    /// List stored snapshots, most recently modified first
    fn list_forces(&self) -> impl Future<Output = MusterResult<Vec<ForceSummary>>> + Send;
}

/// In-process [`RemoteStore`] backed by a shared map.
///
/// `set_offline(true)` makes every call fail with a remote error, which
/// is how tests exercise the log-and-continue paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    forces: Arc<RwLock<HashMap<String, Force>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated connectivity
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.forces.read().len()
    }

    /// Whether the store holds no snapshots
    pub fn is_empty(&self) -> bool {
        self.forces.read().is_empty()
    }

    /// Direct snapshot access for assertions
    pub fn snapshot(&self, instance_id: &ForceId) -> Option<Force> {
        self.forces.read().get(&instance_id.0.to_string()).cloned()
    }

    /// Seed a snapshot without going through the async surface
    pub fn insert(&self, force: Force) {
        if let Some(ref id) = force.instance_id {
            self.forces.write().insert(id.0.to_string(), force);
        }
    }

    fn check_online(&self) -> MusterResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(MusterError::Remote("store offline".to_string()));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    async fn save_force(&self, force: &Force) -> MusterResult<()> {
        self.check_online()?;
        let instance_id = force.instance_id.as_ref().ok_or_else(|| {
            MusterError::InvalidOperation("cannot save a force with no instance id".to_string())
        })?;
        self.forces
            .write()
            .insert(instance_id.0.to_string(), force.clone());
        Ok(())
    }

    async fn get_force(
        &self,
        instance_id: &ForceId,
        owned_only: bool,
    ) -> MusterResult<Option<Force>> {
        self.check_online()?;
        let forces = self.forces.read();
        let force = forces.get(&instance_id.0.to_string());
        Ok(force
            .filter(|f| !owned_only || f.owned)
            .cloned())
    }

    async fn delete_force(&self, instance_id: &ForceId) -> MusterResult<()> {
        self.check_online()?;
        self.forces.write().remove(&instance_id.0.to_string());
        Ok(())
    }

    async fn list_forces(&self) -> MusterResult<Vec<ForceSummary>> {
        self.check_online()?;
        let mut summaries: Vec<ForceSummary> = self
            .forces
            .read()
            .values()
            .filter_map(ForceSummary::of)
            .collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }
}

/// Versioned wire framing for pushed snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PushEnvelope {
    /// Protocol version 1: a full force snapshot
    V1 { force: Force },
}

impl PushEnvelope {
    /// Wrap a snapshot in the current protocol version
    pub fn new(force: Force) -> Self {
        PushEnvelope::V1 { force }
    }

    /// Encode to bytes using postcard
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Decode from bytes using postcard
    pub fn decode(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }

    /// Unwrap the snapshot
    pub fn into_force(self) -> Force {
        match self {
            PushEnvelope::V1 { force } => force,
        }
    }

    /// Protocol version of this envelope
    pub fn version(&self) -> u8 {
        match self {
            PushEnvelope::V1 { .. } => 1,
        }
    }
}

/// A pushed snapshot as queued for the engine
#[derive(Debug, Clone)]
pub struct RemotePush {
    /// Which force the payload claims to update
    pub instance_id: ForceId,
    /// Postcard-encoded [`PushEnvelope`]
    pub payload: Vec<u8>,
}

/// Per-force push subscription seam
pub trait PushChannel: Send + Sync {
    /// Start delivering snapshots for a force
    fn subscribe(&self, instance_id: &ForceId);

    /// Stop delivering snapshots for a force
    fn unsubscribe(&self, instance_id: &ForceId);
}

/// In-process [`PushChannel`] that delivers straight into the engine's
/// push queue. Snapshots for unsubscribed forces are dropped, the same
/// way a real channel would never have dialed them.
#[derive(Clone, Default)]
pub struct LoopbackPush {
    subscribed: Arc<RwLock<HashSet<String>>>,
    sink: Arc<RwLock<Option<UnboundedSender<RemotePush>>>>,
}

impl LoopbackPush {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point deliveries at the engine's push queue
    pub fn attach(&self, sink: UnboundedSender<RemotePush>) {
        *self.sink.write() = Some(sink);
    }

    /// Whether a force currently has a subscription
    pub fn is_subscribed(&self, instance_id: &ForceId) -> bool {
        self.subscribed.read().contains(&instance_id.0.to_string())
    }

    /// Deliver a snapshot as if it arrived from the network.
    ///
    /// Returns whether it was actually queued; unsaved forces and
    /// unsubscribed instance ids are dropped.
    pub fn deliver(&self, force: &Force) -> bool {
        let Some(instance_id) = force.instance_id.clone() else {
            return false;
        };
        if !self.is_subscribed(&instance_id) {
            return false;
        }
        let Ok(payload) = PushEnvelope::new(force.clone()).encode() else {
            return false;
        };
        let sink = self.sink.read();
        match sink.as_ref() {
            Some(tx) => tx
                .send(RemotePush {
                    instance_id,
                    payload,
                })
                .is_ok(),
            None => false,
        }
    }
}

impl PushChannel for LoopbackPush {
    fn subscribe(&self, instance_id: &ForceId) {
        self.subscribed.write().insert(instance_id.0.to_string());
    }

    fn unsubscribe(&self, instance_id: &ForceId) {
        self.subscribed.write().remove(&instance_id.0.to_string());
    }
}
