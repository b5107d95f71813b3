//! Watch/cache layer
//!
//! Mirrors a cluster collection into a [`Store`] and turns every observed
//! change into a typed [`ResourceEvent`]. Changes are found by comparing
//! what the watch stream delivers with what the store already holds:
//!
//! - an object the store has never seen is `Added`
//! - an object whose `resourceVersion` changed is `Updated` (old and new)
//! - an object re-delivered with the same `resourceVersion`, as happens on
//!   every relist, produces nothing
//! - an object removed by the stream, or missing from a completed relist,
//!   is `Deleted`
//!
//! The store is always updated before the event is emitted, so a consumer
//! reading the store while handling an event sees the post-event state.

use std::collections::HashMap;
use std::fmt::Debug;
use std::pin::pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::types::NamespaceClass;

/// A change to one cached object
#[derive(Debug, Clone)]
pub enum ResourceEvent<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    Deleted(Arc<K>),
}

impl<K: Resource> ResourceEvent<K> {
    /// Name of the affected object
    pub fn name(&self) -> String {
        match self {
            ResourceEvent::Added(obj) | ResourceEvent::Deleted(obj) => obj.name_any(),
            ResourceEvent::Updated { new, .. } => new.name_any(),
        }
    }

    /// Short verb for logging
    pub fn action(&self) -> &'static str {
        match self {
            ResourceEvent::Added(_) => "added",
            ResourceEvent::Updated { .. } => "updated",
            ResourceEvent::Deleted(_) => "deleted",
        }
    }
}

/// Event record delivered to the reconciliation loop
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Namespace(ResourceEvent<Namespace>),
    Class(ResourceEvent<NamespaceClass>),
}

impl WatchEvent {
    /// Collection the event belongs to
    pub fn collection(&self) -> &'static str {
        match self {
            WatchEvent::Namespace(_) => "namespace",
            WatchEvent::Class(_) => "class",
        }
    }

    /// Name of the affected object
    pub fn name(&self) -> String {
        match self {
            WatchEvent::Namespace(e) => e.name(),
            WatchEvent::Class(e) => e.name(),
        }
    }

    /// Short verb for logging
    pub fn action(&self) -> &'static str {
        match self {
            WatchEvent::Namespace(e) => e.action(),
            WatchEvent::Class(e) => e.action(),
        }
    }
}

impl From<ResourceEvent<Namespace>> for WatchEvent {
    fn from(event: ResourceEvent<Namespace>) -> Self {
        WatchEvent::Namespace(event)
    }
}

impl From<ResourceEvent<NamespaceClass>> for WatchEvent {
    fn from(event: ResourceEvent<NamespaceClass>) -> Self {
        WatchEvent::Class(event)
    }
}

struct StoreState<K> {
    /// Current objects by name
    objects: HashMap<String, Arc<K>>,
    /// Objects collected by an in-progress relist
    relist: Option<HashMap<String, Arc<K>>>,
}

/// Eventually-consistent mirror of one cluster-scoped collection
pub struct Store<K> {
    state: Arc<RwLock<StoreState<K>>>,
    synced: Arc<watch::Sender<bool>>,
}

impl<K> Clone for Store<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            synced: Arc::clone(&self.synced),
        }
    }
}

impl<K: Resource> Default for Store<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Resource> Store<K> {
    /// Create an empty, unsynced store
    pub fn new() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            state: Arc::new(RwLock::new(StoreState {
                objects: HashMap::new(),
                relist: None,
            })),
            synced: Arc::new(synced),
        }
    }

    /// Get an object by name
    pub fn get(&self, name: &str) -> Option<Arc<K>> {
        read(&self.state).objects.get(name).cloned()
    }

    /// All objects, ordered by name
    pub fn list(&self) -> Vec<Arc<K>> {
        let state = read(&self.state);
        let mut names: Vec<&String> = state.objects.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| state.objects.get(name).cloned())
            .collect()
    }

    /// Number of cached objects
    pub fn len(&self) -> usize {
        read(&self.state).objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the initial list has completed
    pub fn is_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Wait until the initial list has completed
    pub async fn wait_synced(&self) {
        let mut rx = self.synced.subscribe();
        // The sender lives as long as the store, so this only ends when synced
        let _ = rx.wait_for(|synced| *synced).await;
    }

    /// Replace the whole content at once and mark the store synced
    ///
    /// Used by one-shot sweeps that list instead of watching. No events are
    /// produced.
    pub fn replace(&self, objects: impl IntoIterator<Item = K>) {
        let mut state = write(&self.state);
        state.objects = objects
            .into_iter()
            .map(|obj| (obj.name_any(), Arc::new(obj)))
            .collect();
        state.relist = None;
        drop(state);
        self.synced.send_replace(true);
    }

    /// Apply one watcher event, returning the changes it represents
    pub fn apply(&self, event: watcher::Event<K>) -> Vec<ResourceEvent<K>> {
        let mut state = write(&self.state);
        match event {
            watcher::Event::Apply(obj) => {
                let obj = Arc::new(obj);
                let old = state.objects.insert(obj.name_any(), Arc::clone(&obj));
                change(old, obj).into_iter().collect()
            }
            watcher::Event::Delete(obj) => {
                let name = obj.name_any();
                let cached = state.objects.remove(&name);
                vec![ResourceEvent::Deleted(cached.unwrap_or_else(|| Arc::new(obj)))]
            }
            watcher::Event::Init => {
                state.relist = Some(HashMap::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let obj = Arc::new(obj);
                state
                    .relist
                    .get_or_insert_with(HashMap::new)
                    .insert(obj.name_any(), obj);
                Vec::new()
            }
            watcher::Event::InitDone => {
                let fresh = state.relist.take().unwrap_or_default();
                let mut previous = std::mem::take(&mut state.objects);

                let mut names: Vec<&String> = fresh.keys().collect();
                names.sort();
                let mut events: Vec<ResourceEvent<K>> = names
                    .into_iter()
                    .filter_map(|name| {
                        let obj = fresh.get(name)?;
                        change(previous.remove(name), Arc::clone(obj))
                    })
                    .collect();

                let mut gone: Vec<(String, Arc<K>)> = previous.into_iter().collect();
                gone.sort_by(|a, b| a.0.cmp(&b.0));
                events.extend(gone.into_iter().map(|(_, obj)| ResourceEvent::Deleted(obj)));

                state.objects = fresh;
                drop(state);
                self.synced.send_replace(true);
                events
            }
        }
    }
}

/// Classify a (previous, current) pair; same resourceVersion means no change
fn change<K: Resource>(old: Option<Arc<K>>, new: Arc<K>) -> Option<ResourceEvent<K>> {
    match old {
        None => Some(ResourceEvent::Added(new)),
        Some(old) if old.resource_version() == new.resource_version() => None,
        Some(old) => Some(ResourceEvent::Updated { old, new }),
    }
}

/// Feed a store from a watch stream until cancelled
///
/// The stream is recreated every `relist_interval`, which makes the watcher
/// list the collection again; the relist is diffed against the store like
/// any other delivery. Stream errors are retried with backoff and only
/// logged. Returns when cancelled or when the event receiver is gone.
pub async fn run_watch<K>(
    api: Api<K>,
    store: Store<K>,
    events: mpsc::UnboundedSender<WatchEvent>,
    relist_interval: Duration,
    cancel: CancellationToken,
) where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    WatchEvent: From<ResourceEvent<K>>,
{
    let kind = K::kind(&()).to_string();

    loop {
        let stream = watcher(api.clone(), watcher::Config::default()).default_backoff();
        let mut stream = pin!(stream);
        let relist = tokio::time::sleep(relist_interval);
        let mut relist = pin!(relist);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(kind = %kind, "watch cancelled");
                    return;
                }
                _ = &mut relist => {
                    tracing::debug!(kind = %kind, "restarting watch for periodic relist");
                    break;
                }
                item = stream.next() => match item {
                    Some(Ok(event)) => {
                        for change in store.apply(event) {
                            tracing::debug!(kind = %kind, name = %change.name(), action = change.action(), "observed change");
                            if events.send(WatchEvent::from(change)).is_err() {
                                tracing::debug!(kind = %kind, "event receiver closed, stopping watch");
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(kind = %kind, error = %e, "watch stream error, retrying");
                    }
                    None => break,
                },
            }
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
