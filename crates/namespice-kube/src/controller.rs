//! Reconciliation scheduler
//!
//! Ties the caches, compiler, scanner, delta engine and executor together:
//!
//! ```text
//! Initializing ──(both caches synced)──> Synced ──(full sweep)──> SteadyState
//!                                                                   │  events: incremental deltas
//!                                                                   │  timer:  full sweep
//!                                                                   ▼
//!                                                              ShuttingDown
//! ```
//!
//! Incremental reconciliation never reads the cluster: it compiles the
//! desired state before and after the change from cached data and applies
//! the difference. Full sweeps compare desired state with a cluster-wide
//! scan and correct whatever drift the incremental path missed.

use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use namespice_core::{
    ClassPolicy, ControllerConfig, GroupVersionKind, ManagedObject, NamespaceInfo, ObjectDelta,
    compile, compile_all, delta,
};

use crate::cache::{ResourceEvent, Store, WatchEvent, run_watch};
use crate::cluster::ClusterApi;
use crate::error::{KubeError, Result};
use crate::executor::{ExecutionReport, Executor};
use crate::scanner::scan_managed;
use crate::types::{NamespaceClass, namespace_info};

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Waiting for both caches to finish their initial list
    Initializing,
    /// Caches synced, initial sweep running
    Synced,
    /// Reacting to events and timer sweeps
    SteadyState,
    /// Cancelled; finishing in-flight work
    ShuttingDown,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Initializing => write!(f, "initializing"),
            ControllerState::Synced => write!(f, "synced"),
            ControllerState::SteadyState => write!(f, "steady-state"),
            ControllerState::ShuttingDown => write!(f, "shutting-down"),
        }
    }
}

/// The delta of one namespace
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceDelta {
    pub namespace: String,
    pub delta: ObjectDelta,
}

/// Override of one class while building a namespace's policy list
enum Substitute<'a> {
    /// Use this body instead of the cached one
    Body(&'a NamespaceClass),
    /// Leave the class out
    Exclude(&'a str),
}

impl Substitute<'_> {
    fn name(&self) -> String {
        match self {
            Substitute::Body(class) => class.name_any(),
            Substitute::Exclude(name) => name.to_string(),
        }
    }
}

/// Namespace class reconciliation controller
pub struct Controller<C: ?Sized> {
    cluster: Arc<C>,
    config: Arc<ControllerConfig>,
    namespaces: Store<Namespace>,
    classes: Store<NamespaceClass>,
    state: Arc<watch::Sender<ControllerState>>,
}

impl<C: ?Sized> Clone for Controller<C> {
    fn clone(&self) -> Self {
        Self {
            cluster: Arc::clone(&self.cluster),
            config: Arc::clone(&self.config),
            namespaces: self.namespaces.clone(),
            classes: self.classes.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: ClusterApi + ?Sized + 'static> Controller<C> {
    /// Create a controller with empty caches
    pub fn new(cluster: Arc<C>, config: ControllerConfig) -> Self {
        let (state, _) = watch::channel(ControllerState::Initializing);
        Self {
            cluster,
            config: Arc::new(config),
            namespaces: Store::new(),
            classes: Store::new(),
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Namespace cache
    pub fn namespaces(&self) -> &Store<Namespace> {
        &self.namespaces
    }

    /// Class cache
    pub fn classes(&self) -> &Store<NamespaceClass> {
        &self.classes
    }

    /// Current lifecycle state
    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Follow lifecycle state changes
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ControllerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::info!(from = %previous, to = %state, "controller state changed");
        }
    }

    /// Cached namespaces whose annotation lists `class`
    pub fn namespaces_with_class(&self, class: &str) -> Vec<NamespaceInfo> {
        self.namespaces
            .list()
            .iter()
            .map(|ns| namespace_info(ns))
            .filter(|info| info.has_class(&self.config.annotation_key, class))
            .collect()
    }

    /// Policies of a namespace in annotation order
    ///
    /// Unknown class names are skipped. `substitute` replaces or removes one
    /// class, whatever the cache currently holds for it.
    fn policies_of(&self, ns: &NamespaceInfo, substitute: Option<&Substitute<'_>>) -> Vec<ClassPolicy> {
        let replaced = substitute.map(Substitute::name);

        ns.classes(&self.config.annotation_key)
            .into_iter()
            .filter_map(|name| {
                if replaced.as_deref() == Some(name.as_str()) {
                    return match substitute {
                        Some(Substitute::Body(class)) => Some(class.to_policy()),
                        _ => None,
                    };
                }
                self.classes.get(&name).map(|class| class.to_policy())
            })
            .collect()
    }

    fn compile_namespace(&self, ns: &NamespaceInfo, substitute: Option<&Substitute<'_>>) -> Vec<ManagedObject> {
        let policies = self.policies_of(ns, substitute);
        compile(&ns.name, &policies, &self.config.label_key)
    }

    /// Desired state of every cached namespace
    pub fn desired_state(&self) -> Vec<ManagedObject> {
        let entries: Vec<(NamespaceInfo, Vec<ClassPolicy>)> = self
            .namespaces
            .list()
            .iter()
            .map(|ns| {
                let info = namespace_info(ns);
                let policies = self.policies_of(&info, None);
                (info, policies)
            })
            .collect();

        compile_all(
            entries.iter().map(|(ns, policies)| (ns.name.as_str(), policies)),
            &self.config.label_key,
        )
    }

    /// Plan the incremental reconciliation of one event
    ///
    /// Returns one non-empty delta per affected namespace. Namespace
    /// deletions plan nothing: the cluster removes a namespace's content.
    pub fn plan(&self, event: &WatchEvent) -> Vec<NamespaceDelta> {
        let mut plans = Vec::new();

        match event {
            WatchEvent::Namespace(ResourceEvent::Added(ns)) => {
                let info = namespace_info(ns);
                let desired = self.compile_namespace(&info, None);
                plans.push((info.name, delta(&[], &desired)));
            }
            WatchEvent::Namespace(ResourceEvent::Updated { old, new }) => {
                let before = self.compile_namespace(&namespace_info(old), None);
                let info = namespace_info(new);
                let after = self.compile_namespace(&info, None);
                plans.push((info.name, delta(&before, &after)));
            }
            WatchEvent::Namespace(ResourceEvent::Deleted(_)) => {}
            WatchEvent::Class(ResourceEvent::Added(class)) => {
                let name = class.name_any();
                for ns in self.namespaces_with_class(&name) {
                    let before = self.compile_namespace(&ns, Some(&Substitute::Exclude(&name)));
                    let after = self.compile_namespace(&ns, Some(&Substitute::Body(class)));
                    plans.push((ns.name, delta(&before, &after)));
                }
            }
            WatchEvent::Class(ResourceEvent::Updated { old, new }) => {
                for ns in self.namespaces_with_class(&new.name_any()) {
                    let before = self.compile_namespace(&ns, Some(&Substitute::Body(old)));
                    let after = self.compile_namespace(&ns, Some(&Substitute::Body(new)));
                    plans.push((ns.name, delta(&before, &after)));
                }
            }
            WatchEvent::Class(ResourceEvent::Deleted(class)) => {
                let name = class.name_any();
                for ns in self.namespaces_with_class(&name) {
                    let before = self.compile_namespace(&ns, Some(&Substitute::Body(class)));
                    let after = self.compile_namespace(&ns, Some(&Substitute::Exclude(&name)));
                    plans.push((ns.name, delta(&before, &after)));
                }
            }
        }

        plans
            .into_iter()
            .filter(|(_, delta)| !delta.is_empty())
            .map(|(namespace, delta)| NamespaceDelta { namespace, delta })
            .collect()
    }

    /// Apply planned namespace deltas
    pub async fn reconcile(&self, plans: &[NamespaceDelta]) -> ExecutionReport {
        let executor = Executor::new(&*self.cluster, &self.config.label_key);
        let mut report = ExecutionReport::default();
        for plan in plans {
            tracing::debug!(namespace = %plan.namespace, "{}", plan.delta.summary());
            report.merge(executor.execute(&plan.delta).await);
        }
        report
    }

    /// Give desired objects the identity the cluster reports for them
    ///
    /// Templates are stamped with their namespace, but cluster-scoped kinds
    /// are listed without one. Kinds that cannot be resolved are left as
    /// they are; the executor reports them.
    async fn scoped(&self, desired: Vec<ManagedObject>) -> Vec<ManagedObject> {
        let mut cluster_scoped: HashMap<GroupVersionKind, bool> = HashMap::new();
        let mut scoped = Vec::with_capacity(desired.len());

        for object in desired {
            if object.namespace().is_none() {
                scoped.push(object);
                continue;
            }
            let is_cluster_scoped = match cluster_scoped.get(object.gvk()) {
                Some(known) => *known,
                None => {
                    let known = match self.cluster.resolve(object.gvk()).await {
                        Ok(resource) => !resource.namespaced,
                        Err(e) => {
                            tracing::debug!(gvk = %object.gvk(), error = %e, "cannot resolve scope, keeping namespace");
                            false
                        }
                    };
                    cluster_scoped.insert(object.gvk().clone(), known);
                    known
                }
            };
            scoped.push(if is_cluster_scoped {
                object.into_cluster_scoped()
            } else {
                object
            });
        }

        scoped
    }

    /// Compare desired state with a cluster-wide scan of owned objects
    pub async fn plan_sweep(&self) -> ObjectDelta {
        let desired = self.scoped(self.desired_state()).await;
        let scan = scan_managed(
            &*self.cluster,
            self.config.ownership_selector(),
            self.config.scan_concurrency,
        )
        .await;
        if !scan.is_complete() {
            tracing::warn!(
                failed_types = scan.failed_types,
                failed_groups = scan.failed_groups.len(),
                discovery_failed = scan.discovery_failed,
                "scan incomplete, objects of unscanned types are not considered"
            );
        }
        delta(&scan.objects, &desired)
    }

    /// Run one full sweep
    pub async fn full_sweep(&self, dry_run: bool) -> ExecutionReport {
        tracing::info!(
            namespaces = self.namespaces.len(),
            classes = self.classes.len(),
            "starting full sweep"
        );
        let plan = self.plan_sweep().await;
        tracing::info!("sweep plan: {}", plan.summary());

        Executor::new(&*self.cluster, &self.config.label_key)
            .with_dry_run(dry_run)
            .execute(&plan)
            .await
    }

    /// Fill both caches from a single list of each collection
    pub async fn load_snapshot(&self, client: &Client) -> Result<()> {
        let namespaces = Api::<Namespace>::all(client.clone())
            .list(&ListParams::default())
            .await
            .map_err(KubeError::Api)?;
        let classes = Api::<NamespaceClass>::all(client.clone())
            .list(&ListParams::default())
            .await
            .map_err(KubeError::Api)?;

        tracing::debug!(
            namespaces = namespaces.items.len(),
            classes = classes.items.len(),
            "loaded cluster snapshot"
        );
        self.namespaces.replace(namespaces.items);
        self.classes.replace(classes.items);
        Ok(())
    }

    /// Watch both collections and reconcile until cancelled
    pub async fn start(self, client: Client, cancel: CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let relist = self.config.relist_interval;

        let namespace_watch = tokio::spawn(run_watch(
            Api::<Namespace>::all(client.clone()),
            self.namespaces.clone(),
            tx.clone(),
            relist,
            cancel.clone(),
        ));
        let class_watch = tokio::spawn(run_watch(
            Api::<NamespaceClass>::all(client),
            self.classes.clone(),
            tx,
            relist,
            cancel.clone(),
        ));

        self.run(rx, cancel.clone()).await;

        cancel.cancel();
        for watch in [namespace_watch, class_watch] {
            if let Err(e) = watch.await {
                tracing::error!(error = %e, "watch task failed");
            }
        }
    }

    /// Drive the state machine from a stream of cache events
    ///
    /// The caches must be fed by someone else (see [`Controller::start`]).
    /// Returns after cancellation once in-flight work has finished.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<WatchEvent>, cancel: CancellationToken) {
        self.set_state(ControllerState::Initializing);

        let synced = async {
            self.namespaces.wait_synced().await;
            self.classes.wait_synced().await;
        };
        tokio::select! {
            _ = cancel.cancelled() => {
                self.set_state(ControllerState::ShuttingDown);
                return;
            }
            _ = synced => {}
        }

        self.set_state(ControllerState::Synced);
        let report = self.full_sweep(false).await;
        if !report.is_success() {
            tracing::warn!(failed = report.failed.len(), "initial sweep finished with failures");
        }

        // The initial sweep covered everything observed so far
        let mut discarded = 0usize;
        while events.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "dropped events received before the initial sweep");
        }
        self.set_state(ControllerState::SteadyState);

        let period = self.config.sweep_interval;
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut sweep: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("event channel closed");
                        break;
                    };
                    tracing::debug!(
                        collection = event.collection(),
                        name = %event.name(),
                        action = event.action(),
                        "received event"
                    );
                    let plans = self.plan(&event);
                    if plans.is_empty() {
                        continue;
                    }
                    let controller = self.clone();
                    tasks.spawn(async move {
                        controller.reconcile(&plans).await;
                    });
                }
                _ = timer.tick() => {
                    if sweep.as_ref().is_some_and(|handle| !handle.is_finished()) {
                        tracing::warn!("previous sweep still running, skipping this one");
                        continue;
                    }
                    let controller = self.clone();
                    sweep = Some(tokio::spawn(async move {
                        controller.full_sweep(false).await;
                    }));
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "reconcile task failed");
                    }
                }
            }
        }

        self.set_state(ControllerState::ShuttingDown);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "reconcile task failed");
            }
        }
        if let Some(handle) = sweep {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "sweep task failed");
            }
        }
    }
}
