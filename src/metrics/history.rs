//! Bounded per-entity metric history for trend and sparkline rendering.
//!
//! Each entity (the cluster, a node, a pod) owns a fixed-capacity ring of
//! usage-ratio samples. Nothing is persisted; a session restart starts the
//! rings empty.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

/// Default ring capacity: ~10 minutes at the 5s summary cadence.
pub const DEFAULT_CAPACITY: usize = 120;

/// One history point. Ratios are usage/allocatable clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp_unix: i64,
    pub cpu_ratio: f64,
    pub mem_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Cluster,
    Node(String),
    Pod { namespace: String, name: String },
}

impl EntityKey {
    pub fn pod(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        EntityKey::Pod {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Ring store. The map of entities takes a read/write lock; each ring has
/// its own mutex so pushes to different entities do not contend.
pub struct MetricsHistory {
    capacity: usize,
    rings: RwLock<HashMap<EntityKey, Mutex<VecDeque<MetricSample>>>>,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rings: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, evicting the oldest when the ring is full.
    pub fn push(&self, entity: EntityKey, sample: MetricSample) {
        {
            let rings = self.rings.read().expect("history map lock");
            if let Some(ring) = rings.get(&entity) {
                let mut ring = ring.lock().expect("history ring lock");
                ring.push_back(sample);
                while ring.len() > self.capacity {
                    ring.pop_front();
                }
                return;
            }
        }
        let mut rings = self.rings.write().expect("history map lock");
        let ring = rings
            .entry(entity)
            .or_insert_with(|| Mutex::new(VecDeque::with_capacity(self.capacity)));
        let mut ring = ring.lock().expect("history ring lock");
        ring.push_back(sample);
        while ring.len() > self.capacity {
            ring.pop_front();
        }
    }

    /// Chronological copy of an entity's ring; empty when unseen.
    pub fn snapshot(&self, entity: &EntityKey) -> Vec<MetricSample> {
        let rings = self.rings.read().expect("history map lock");
        match rings.get(entity) {
            Some(ring) => ring
                .lock()
                .expect("history ring lock")
                .iter()
                .copied()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Clear one entity's ring (pod navigation, source switch).
    pub fn reset(&self, entity: &EntityKey) {
        let rings = self.rings.read().expect("history map lock");
        if let Some(ring) = rings.get(entity) {
            ring.lock().expect("history ring lock").clear();
        }
    }

    /// Drop rings for entities no longer present (evicted pods, removed
    /// nodes) so the map does not grow without bound.
    pub fn retain<F: Fn(&EntityKey) -> bool>(&self, keep: F) {
        let mut rings = self.rings.write().expect("history map lock");
        rings.retain(|k, _| keep(k));
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
