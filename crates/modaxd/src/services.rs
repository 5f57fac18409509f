//! Service lifecycle coordination across activation changes.
//!
//! Per service: `Stopped -> Starting -> Running -> Stopping -> Stopped`.
//! On an activation change, every service of the outgoing version is
//! confirmed stopped before any service of the incoming version is
//! signaled to start. Starts are asynchronous: callers that need
//! confirmation poll the module ready flag with a fixed deadline.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use modax_shared::{ModaxError, ModuleId, ModuleVersion, ServiceState, StartPolicy};

use crate::activation::ActivationRecord;
use crate::supervisor::ServiceSupervisor;

/// Isolation context a service was started in. Bootstrap-phase services
/// share the early-boot context, not the full-system one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    System,
    Bootstrap,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::System => "system",
            Scope::Bootstrap => "bootstrap",
        }
    }
}

#[derive(Default)]
struct CoordinatorState {
    states: HashMap<String, ServiceState>,
    scopes: HashMap<String, Scope>,
    /// Externally polled flags: `{module}_{version}_{service}` ->
    /// running/stopped, plus `{module}_ready` -> "true" (absent otherwise).
    flags: BTreeMap<String, String>,
    /// Service keys of the version currently activating, per module;
    /// drives the ready flag.
    incoming: HashMap<ModuleId, Vec<String>>,
    /// Per-key stop generation. A stop bumps it, so a start still in
    /// flight for the old generation discards its result instead of
    /// resurrecting a service that was already confirmed stopped.
    epochs: HashMap<String, u64>,
}

impl CoordinatorState {
    fn ready_key(module: &ModuleId) -> String {
        format!("{}_ready", module)
    }

    fn epoch(&self, key: &str) -> u64 {
        self.epochs.get(key).copied().unwrap_or(0)
    }

    fn recompute_ready(&mut self, module: &ModuleId) -> bool {
        let pending = self
            .incoming
            .get(module)
            .map(|keys| {
                keys.iter()
                    .any(|k| self.states.get(k) == Some(&ServiceState::Starting))
            })
            .unwrap_or(false);
        if pending {
            false
        } else {
            self.flags.insert(Self::ready_key(module), "true".to_string());
            true
        }
    }
}

/// Drives service state across activation changes and exposes the
/// observable status flags.
#[derive(Clone)]
pub struct ServiceCoordinator {
    supervisor: Arc<dyn ServiceSupervisor>,
    inner: Arc<RwLock<CoordinatorState>>,
    changed_tx: watch::Sender<u64>,
}

impl ServiceCoordinator {
    pub fn new(supervisor: Arc<dyn ServiceSupervisor>) -> Self {
        let (changed_tx, _) = watch::channel(0);
        Self {
            supervisor,
            inner: Arc::new(RwLock::new(CoordinatorState::default())),
            changed_tx,
        }
    }

    fn bump(&self) {
        self.changed_tx.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Stop every service of the outgoing version and wait for
    /// confirmation. Returns only once all of them are `Stopped`.
    pub async fn stop_version(&self, version: &ModuleVersion) {
        let module = version.id().clone();
        for service in &version.manifest.services {
            let key = version.service_key(service);
            {
                let mut state = self.inner.write().await;
                *state.epochs.entry(key.clone()).or_insert(0) += 1;
                state.states.insert(key.clone(), ServiceState::Stopping);
                state.flags.remove(&CoordinatorState::ready_key(&module));
            }
            self.bump();

            let supervisor = self.supervisor.clone();
            let stop_key = key.clone();
            let result =
                tokio::task::spawn_blocking(move || supervisor.stop(&stop_key)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Stop of {} reported: {}", key, e),
                Err(e) => warn!("Stop task for {} panicked: {}", key, e),
            }

            {
                let mut state = self.inner.write().await;
                state.states.insert(key.clone(), ServiceState::Stopped);
                state.flags.insert(key.clone(), "stopped".to_string());
            }
            self.bump();
            debug!("Service {} stopped", key);
        }
    }

    /// Signal start for the incoming version's services and return.
    /// Confirmation is observable through the status flags and the module
    /// ready flag; it is not awaited here.
    pub async fn start_version(
        &self,
        version: &Arc<ModuleVersion>,
        activation_path: &Path,
        scope: Scope,
    ) {
        let module = version.id().clone();
        let mut to_start: Vec<(String, PathBuf, u64)> = Vec::new();

        {
            let mut state = self.inner.write().await;
            state.flags.remove(&CoordinatorState::ready_key(&module));
            let mut keys = Vec::new();

            for service in &version.manifest.services {
                let key = version.service_key(service);
                keys.push(key.clone());

                // A service left running by an earlier pass (bootstrap)
                // keeps running in its original scope.
                if state.states.get(&key) == Some(&ServiceState::Running) {
                    continue;
                }

                state.scopes.insert(key.clone(), scope);
                match service.start_policy {
                    StartPolicy::OnActivation => {
                        state.states.insert(key.clone(), ServiceState::Starting);
                        let epoch = state.epoch(&key);
                        to_start.push((key, activation_path.join(&service.exec), epoch));
                    }
                    StartPolicy::Manual => {
                        state.states.insert(key.clone(), ServiceState::Stopped);
                        state.flags.insert(key, "stopped".to_string());
                    }
                }
            }

            state.incoming.insert(module.clone(), keys);
            state.recompute_ready(&module);
        }
        self.bump();

        for (key, exec, epoch) in to_start {
            let coordinator = self.clone();
            let module = module.clone();
            tokio::spawn(async move {
                {
                    let state = coordinator.inner.read().await;
                    if state.epoch(&key) != epoch {
                        return;
                    }
                }

                let supervisor = coordinator.supervisor.clone();
                let start_key = key.clone();
                let result =
                    tokio::task::spawn_blocking(move || supervisor.start(&start_key, &exec))
                        .await;
                let started = matches!(result, Ok(Ok(())));
                if let Ok(Err(e)) = &result {
                    warn!("Start of {} failed: {}", key, e);
                }

                let mut state = coordinator.inner.write().await;
                if state.epoch(&key) != epoch {
                    // A stop superseded this start while it was in flight.
                    // The stopped state stands; undo the launch if it
                    // already went through.
                    drop(state);
                    if started {
                        let supervisor = coordinator.supervisor.clone();
                        let stop_key = key.clone();
                        let undo =
                            tokio::task::spawn_blocking(move || supervisor.stop(&stop_key))
                                .await;
                        if let Ok(Err(e)) = undo {
                            warn!("Undo of superseded start {} reported: {}", key, e);
                        }
                        debug!("Discarded superseded start of {}", key);
                    }
                    return;
                }
                if started {
                    state.states.insert(key.clone(), ServiceState::Running);
                    state.flags.insert(key.clone(), "running".to_string());
                } else {
                    state.states.insert(key.clone(), ServiceState::Stopped);
                    state.flags.insert(key.clone(), "stopped".to_string());
                }
                let ready = state.recompute_ready(&module);
                drop(state);
                coordinator.bump();
                if ready {
                    info!("Module {} ready", module);
                }
            });
        }
    }

    /// Activation change for one module: confirmed stop of the outgoing
    /// service set, then signaled start of the incoming one.
    pub async fn apply(
        &self,
        outgoing: Option<&Arc<ModuleVersion>>,
        incoming: &ActivationRecord,
        scope: Scope,
    ) {
        if let Some(old) = outgoing {
            self.stop_version(old).await;
        }
        self.start_version(&incoming.version, &incoming.activation_path, scope)
            .await;
    }

    /// Bounded wait for the module ready flag. The deadline is fixed;
    /// elapsing it is a hard failure, not a retry trigger.
    pub async fn wait_ready(
        &self,
        module: &ModuleId,
        timeout: Duration,
    ) -> Result<(), ModaxError> {
        let deadline = Instant::now() + timeout;
        let mut rx = self.changed_tx.subscribe();
        loop {
            if self.is_ready(module).await {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero()
                || tokio::time::timeout(remaining, rx.changed()).await.is_err()
            {
                return Err(ModaxError::ServiceStartTimeout {
                    service: module.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        }
    }

    pub async fn is_ready(&self, module: &ModuleId) -> bool {
        self.inner
            .read()
            .await
            .flags
            .contains_key(&CoordinatorState::ready_key(module))
    }

    /// Snapshot of all observable flags.
    pub async fn flags(&self) -> BTreeMap<String, String> {
        self.inner.read().await.flags.clone()
    }

    pub async fn flag(&self, key: &str) -> Option<String> {
        self.inner.read().await.flags.get(key).cloned()
    }

    pub async fn state_of(&self, key: &str) -> Option<ServiceState> {
        self.inner.read().await.states.get(key).copied()
    }

    pub async fn scope_of(&self, key: &str) -> Option<Scope> {
        self.inner.read().await.scopes.get(key).copied()
    }
}
