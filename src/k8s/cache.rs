//! Watch-backed resource caches.
//!
//! Each resource kind gets a local replica seeded by an initial list and kept
//! current by a watch stream keyed on resourceVersion. A periodic relist
//! reconciles drift: objects missing from the relist produce delete events,
//! unseen ones produce adds, so subscriber handlers must be idempotent.
//! Watch disconnects are retried with jittered backoff; the replica stays
//! readable from last-known state throughout.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    Event, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod,
};
use kube::api::{ListParams, WatchParams};
use kube::core::WatchEvent;
use kube::{Api, ResourceExt};
use log::{debug, info, warn};
use rand::Rng;
use serde::de::DeserializeOwned;
use tokio::sync::watch;

use crate::errors::{Error, Result};
use crate::k8s::auth::AccessGuard;
use crate::k8s::client::K8sClient;

/// How long `start` waits for the critical triple before handing back a
/// partially-populated cache. First-frame latency beats completeness.
pub const CRITICAL_SYNC_TIMEOUT: Duration = Duration::from_secs(2);

const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(30);
/// Server-side watch session cap, seconds. The stream re-opens from the last
/// resourceVersion when it expires.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Identity of a cached object. Cluster-scoped kinds use an empty namespace.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    fn of<K: ResourceExt>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

/// Subscriber callbacks. Invoked inside the kind's event loop, so calls are
/// serialized per kind and must not block.
pub trait CacheEventHandler<K>: Send + Sync {
    fn on_add(&self, _obj: &K) {}
    fn on_update(&self, _old: &K, _new: &K) {}
    fn on_delete(&self, _obj: &K) {}
}

/// One kind's replica: store, subscribers, and sync flag.
pub struct KindCache<K> {
    kind: &'static str,
    api: Api<K>,
    store: Arc<RwLock<HashMap<ObjectKey, Arc<K>>>>,
    handlers: Arc<RwLock<Vec<Arc<dyn CacheEventHandler<K>>>>>,
    synced: Arc<AtomicBool>,
    synced_tx: watch::Sender<bool>,
    list_error: RwLock<Option<String>>,
}

impl<K> KindCache<K>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn new(kind: &'static str, api: Api<K>) -> Arc<Self> {
        let (synced_tx, _) = watch::channel(false);
        Arc::new(Self {
            kind,
            api,
            store: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(Vec::new())),
            synced: Arc::new(AtomicBool::new(false)),
            synced_tx,
            list_error: RwLock::new(None),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// True once the initial list has been applied.
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Consistent snapshot of the replica. Ordering is not guaranteed.
    pub fn list(&self) -> Vec<Arc<K>> {
        self.store
            .read()
            .expect("cache store lock")
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        self.store
            .read()
            .expect("cache store lock")
            .get(&ObjectKey::new(namespace, name))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.store.read().expect("cache store lock").len()
    }

    /// Most recent relist failure, if the replica is currently diverging.
    pub fn current_error(&self) -> Option<String> {
        self.list_error.read().expect("cache error lock").clone()
    }

    /// Refresh cycles call this before reading: a replica whose relist is
    /// failing would paint the UI with stale state.
    pub fn ensure_readable(&self) -> Result<()> {
        match self.current_error() {
            Some(err) => Err(Error::Transient(format!("{} cache: {}", self.kind, err))),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register handlers for every applied event on this kind.
    pub fn subscribe(&self, handler: Arc<dyn CacheEventHandler<K>>) {
        self.handlers
            .write()
            .expect("cache handler lock")
            .push(handler);
    }

    fn mark_synced(&self) {
        if !self.synced.swap(true, Ordering::AcqRel) {
            info!("{} cache synced", self.kind);
        }
        self.synced_tx.send_replace(true);
    }

    fn sync_signal(&self) -> watch::Receiver<bool> {
        self.synced_tx.subscribe()
    }

    fn apply_add(&self, obj: K) {
        let key = ObjectKey::of(&obj);
        let obj = Arc::new(obj);
        self.store
            .write()
            .expect("cache store lock")
            .insert(key, obj.clone());
        for h in self.handlers.read().expect("cache handler lock").iter() {
            h.on_add(&obj);
        }
    }

    fn apply_update(&self, obj: K) {
        let key = ObjectKey::of(&obj);
        let new = Arc::new(obj);
        let old = self
            .store
            .write()
            .expect("cache store lock")
            .insert(key, new.clone());
        match old {
            Some(old) => {
                for h in self.handlers.read().expect("cache handler lock").iter() {
                    h.on_update(&old, &new);
                }
            }
            // A Modified for an unseen object lands as an add.
            None => {
                for h in self.handlers.read().expect("cache handler lock").iter() {
                    h.on_add(&new);
                }
            }
        }
    }

    fn apply_delete(&self, obj: &K) {
        let key = ObjectKey::of(obj);
        let removed = self.store.write().expect("cache store lock").remove(&key);
        if let Some(removed) = removed {
            for h in self.handlers.read().expect("cache handler lock").iter() {
                h.on_delete(&removed);
            }
        }
    }

    /// Full relist reconciled against the replica. Divergence is corrected in
    /// place: new objects become adds, changed resourceVersions updates,
    /// vanished objects deletes. Returns the list resourceVersion.
    async fn relist(&self) -> Result<String> {
        let list = self.api.list(&ListParams::default()).await?;
        let rv = list.metadata.resource_version.clone().unwrap_or_default();

        let mut incoming: HashMap<ObjectKey, K> = HashMap::new();
        for item in list.items {
            incoming.insert(ObjectKey::of(&item), item);
        }

        let stale: Vec<Arc<K>> = {
            let store = self.store.read().expect("cache store lock");
            store
                .iter()
                .filter(|(key, _)| !incoming.contains_key(key))
                .map(|(_, v)| v.clone())
                .collect()
        };
        for gone in stale {
            self.apply_delete(&gone);
        }

        for (key, item) in incoming {
            let existing = self
                .store
                .read()
                .expect("cache store lock")
                .get(&key)
                .cloned();
            match existing {
                None => self.apply_add(item),
                Some(old) if old.resource_version() != item.resource_version() => {
                    self.apply_update(item)
                }
                Some(_) => {}
            }
        }

        debug!("{} relisted at resourceVersion {}", self.kind, rv);
        self.mark_synced();
        Ok(rv)
    }

    /// Consume watch events until the resync deadline, a shutdown signal, or
    /// a stream error. Returns the resourceVersion to resume from, or None
    /// when the caller must relist (410 Gone, desync).
    async fn watch_until(
        &self,
        mut rv: String,
        deadline: tokio::time::Instant,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<String>> {
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Ok(Some(rv));
            }
            let wp = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
            let mut stream = self.api.watch(&wp, &rv).await?.boxed();
            loop {
                let event = tokio::select! {
                    _ = shutdown.changed() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => return Ok(Some(rv)),
                    ev = stream.next() => ev,
                };
                match event {
                    Some(Ok(WatchEvent::Added(obj))) => {
                        if let Some(v) = obj.resource_version() {
                            rv = v;
                        }
                        self.apply_add(obj);
                    }
                    Some(Ok(WatchEvent::Modified(obj))) => {
                        if let Some(v) = obj.resource_version() {
                            rv = v;
                        }
                        self.apply_update(obj);
                    }
                    Some(Ok(WatchEvent::Deleted(obj))) => {
                        if let Some(v) = obj.resource_version() {
                            rv = v;
                        }
                        self.apply_delete(&obj);
                    }
                    Some(Ok(WatchEvent::Bookmark(b))) => {
                        rv = b.metadata.resource_version.clone();
                    }
                    Some(Ok(WatchEvent::Error(e))) => {
                        if e.code == 410 {
                            debug!("{} watch expired (410), relisting", self.kind);
                            return Ok(None);
                        }
                        warn!("{} watch error: {} ({})", self.kind, e.message, e.code);
                        return Ok(None);
                    }
                    Some(Err(e)) => {
                        return Err(Error::Transient(format!(
                            "{} watch stream: {}",
                            self.kind, e
                        )));
                    }
                    // Server closed the session; resume from the last version.
                    None => break,
                }
            }
        }
    }

    /// List-then-watch loop with jittered backoff. Runs until shutdown.
    async fn run(self: Arc<Self>, resync: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = BACKOFF_INITIAL;
        loop {
            if *shutdown.borrow() {
                return;
            }
            let rv = match self.relist().await {
                Ok(rv) => {
                    backoff = BACKOFF_INITIAL;
                    *self.list_error.write().expect("cache error lock") = None;
                    rv
                }
                Err(Error::Cancelled) => return,
                Err(e) => {
                    *self.list_error.write().expect("cache error lock") = Some(e.to_string());
                    warn!("{} list failed: {}; retrying in {:?}", self.kind, e, backoff);
                    if sleep_backoff(&mut backoff, &mut shutdown).await {
                        return;
                    }
                    continue;
                }
            };

            let deadline = tokio::time::Instant::now() + resync;
            let mut version = rv;
            loop {
                match self.watch_until(version, deadline, &mut shutdown).await {
                    Ok(Some(v)) => {
                        if tokio::time::Instant::now() >= deadline {
                            break;
                        }
                        backoff = BACKOFF_INITIAL;
                        version = v;
                    }
                    Ok(None) => break,
                    Err(Error::Cancelled) => return,
                    Err(e) => {
                        warn!(
                            "{} watch failed: {}; retrying in {:?}",
                            self.kind, e, backoff
                        );
                        if sleep_backoff(&mut backoff, &mut shutdown).await {
                            return;
                        }
                        break;
                    }
                }
            }
        }
    }
}

/// Sleep for the current backoff (plus jitter), doubling it up to the cap.
/// Returns true when shutdown fired during the sleep.
async fn sleep_backoff(backoff: &mut Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let jitter = rand::thread_rng().gen_range(0..=backoff.as_millis() as u64 / 4);
    let wait = *backoff + Duration::from_millis(jitter);
    *backoff = (*backoff * 2).min(BACKOFF_MAX);
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(wait) => false,
    }
}

/// The full set of per-kind replicas the data plane maintains.
pub struct ResourceCache {
    pub namespaces: Arc<KindCache<Namespace>>,
    pub nodes: Arc<KindCache<Node>>,
    pub pods: Arc<KindCache<Pod>>,
    pub persistent_volumes: Arc<KindCache<PersistentVolume>>,
    pub persistent_volume_claims: Arc<KindCache<PersistentVolumeClaim>>,
    pub events: Arc<KindCache<Event>>,
    pub deployments: Arc<KindCache<Deployment>>,
    pub daemon_sets: Arc<KindCache<DaemonSet>>,
    pub replica_sets: Arc<KindCache<ReplicaSet>>,
    pub stateful_sets: Arc<KindCache<StatefulSet>>,
    pub jobs: Arc<KindCache<Job>>,
    pub cron_jobs: Arc<KindCache<CronJob>>,
}

impl ResourceCache {
    pub fn new(client: &K8sClient) -> Self {
        Self {
            namespaces: KindCache::new("namespaces", client.namespaces()),
            nodes: KindCache::new("nodes", client.nodes()),
            pods: KindCache::new("pods", client.pods()),
            persistent_volumes: KindCache::new("persistentvolumes", client.persistent_volumes()),
            persistent_volume_claims: KindCache::new(
                "persistentvolumeclaims",
                client.persistent_volume_claims(),
            ),
            events: KindCache::new("events", client.events()),
            deployments: KindCache::new("deployments", client.deployments()),
            daemon_sets: KindCache::new("daemonsets", client.daemon_sets()),
            replica_sets: KindCache::new("replicasets", client.replica_sets()),
            stateful_sets: KindCache::new("statefulsets", client.stateful_sets()),
            jobs: KindCache::new("jobs", client.jobs()),
            cron_jobs: KindCache::new("cronjobs", client.cron_jobs()),
        }
    }

    /// Start every kind's list-watch loop. Returns once the critical triple
    /// (namespaces, nodes, pods) has synced, or after 2s with the remaining
    /// kinds still populating in the background.
    ///
    /// Access reviews gate the critical triple: a denied list fails fast with
    /// the missing resource.
    pub async fn start(
        &self,
        guard: &AccessGuard,
        namespace: Option<&str>,
        resync: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        for resource in ["nodes", "pods", "namespaces"] {
            guard.require(resource, namespace).await?;
        }

        let mut critical = vec![
            self.namespaces.sync_signal(),
            self.nodes.sync_signal(),
            self.pods.sync_signal(),
        ];

        tokio::spawn(self.namespaces.clone().run(resync, shutdown.clone()));
        tokio::spawn(self.nodes.clone().run(resync, shutdown.clone()));
        tokio::spawn(self.pods.clone().run(resync, shutdown.clone()));
        tokio::spawn(self.persistent_volumes.clone().run(resync, shutdown.clone()));
        tokio::spawn(
            self.persistent_volume_claims
                .clone()
                .run(resync, shutdown.clone()),
        );
        tokio::spawn(self.events.clone().run(resync, shutdown.clone()));
        tokio::spawn(self.deployments.clone().run(resync, shutdown.clone()));
        tokio::spawn(self.daemon_sets.clone().run(resync, shutdown.clone()));
        tokio::spawn(self.replica_sets.clone().run(resync, shutdown.clone()));
        tokio::spawn(self.stateful_sets.clone().run(resync, shutdown.clone()));
        tokio::spawn(self.jobs.clone().run(resync, shutdown.clone()));
        tokio::spawn(self.cron_jobs.clone().run(resync, shutdown));

        let wait_all = async {
            for rx in critical.iter_mut() {
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        return;
                    }
                }
            }
        };
        if tokio::time::timeout(CRITICAL_SYNC_TIMEOUT, wait_all)
            .await
            .is_err()
        {
            warn!(
                "critical caches still populating after {:?}: {:?}",
                CRITICAL_SYNC_TIMEOUT,
                self.populating_kinds()
            );
        }
        Ok(())
    }

    /// Kinds whose initial list has not been applied yet.
    pub fn populating_kinds(&self) -> Vec<&'static str> {
        let mut pending = Vec::new();
        if !self.namespaces.is_synced() {
            pending.push(self.namespaces.kind());
        }
        if !self.nodes.is_synced() {
            pending.push(self.nodes.kind());
        }
        if !self.pods.is_synced() {
            pending.push(self.pods.kind());
        }
        if !self.persistent_volumes.is_synced() {
            pending.push(self.persistent_volumes.kind());
        }
        if !self.persistent_volume_claims.is_synced() {
            pending.push(self.persistent_volume_claims.kind());
        }
        if !self.events.is_synced() {
            pending.push(self.events.kind());
        }
        if !self.deployments.is_synced() {
            pending.push(self.deployments.kind());
        }
        if !self.daemon_sets.is_synced() {
            pending.push(self.daemon_sets.kind());
        }
        if !self.replica_sets.is_synced() {
            pending.push(self.replica_sets.kind());
        }
        if !self.stateful_sets.is_synced() {
            pending.push(self.stateful_sets.kind());
        }
        if !self.jobs.is_synced() {
            pending.push(self.jobs.kind());
        }
        if !self.cron_jobs.is_synced() {
            pending.push(self.cron_jobs.kind());
        }
        pending
    }
}
