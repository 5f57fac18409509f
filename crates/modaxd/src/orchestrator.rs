//! Rebootless update orchestration.
//!
//! An update session runs `Validating -> Committing -> Converging`, or
//! aborts during validation with no state mutated. The activation record
//! swap in `Committing` is a single atomic publish; `Converging` touches
//! exactly the module whose active version changed. Updates for the same
//! module are serialized, updates for different modules run in parallel.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use modax_shared::{
    ActiveModuleInfo, EngineStatus, ModaxError, ModuleId, ModuleManifest, UpdatePhase,
    UpdateReport,
};

use crate::activation::{ActivationRecord, ActivationState};
use crate::config::Config;
use crate::linkerconfig;
use crate::resolver;
use crate::services::{Scope, ServiceCoordinator};
use crate::store::ModuleStore;
use crate::supervisor::ServiceSupervisor;
use crate::viewfs;

pub struct Engine {
    config: Config,
    store: RwLock<ModuleStore>,
    activation: ActivationState,
    coordinator: ServiceCoordinator,
    /// One logical writer per module: a session holds its module's guard
    /// for the whole Committing/Converging stretch.
    guards: StdMutex<HashMap<ModuleId, Arc<Mutex<()>>>>,
    bootstrap_ids: RwLock<Vec<ModuleId>>,
    pending_reboot: RwLock<Vec<ModuleId>>,
    started_at: Instant,
}

impl Engine {
    pub fn new(
        config: Config,
        supervisor: Arc<dyn ServiceSupervisor>,
    ) -> Result<Self, ModaxError> {
        let store = ModuleStore::open(&config)?;
        Ok(Self {
            config,
            store: RwLock::new(store),
            activation: ActivationState::new(),
            coordinator: ServiceCoordinator::new(supervisor),
            guards: StdMutex::new(HashMap::new()),
            bootstrap_ids: RwLock::new(Vec::new()),
            pending_reboot: RwLock::new(Vec::new()),
            started_at: Instant::now(),
        })
    }

    fn guard_for(&self, id: &ModuleId) -> Arc<Mutex<()>> {
        let mut guards = self.guards.lock().expect("guard map lock poisoned");
        guards.entry(id.clone()).or_default().clone()
    }

    fn make_record(&self, id: ModuleId, version: Arc<modax_shared::ModuleVersion>) -> ActivationRecord {
        let activation_path = viewfs::activation_path(&self.config, id.as_str());
        ActivationRecord {
            id,
            version,
            activation_path,
        }
    }

    /// Early-boot pass: activate only the bootstrap-eligible subset,
    /// before the full system is up. Services started here run in the
    /// bootstrap context.
    pub async fn bootstrap(&self) -> Result<(), ModaxError> {
        let resolved = {
            let store = self.store.read().await;
            resolver::resolve_bootstrap(&store)
        };

        let mut ids = Vec::new();
        for (id, version) in resolved {
            let record = self.make_record(id.clone(), version);
            viewfs::materialize(&record, &self.config)?;
            self.activation.publish_record(record.clone()).await;
            self.coordinator
                .start_version(&record.version, &record.activation_path, Scope::Bootstrap)
                .await;
            ids.push(id);
        }

        info!("Bootstrap pass activated {} module(s)", ids.len());
        *self.bootstrap_ids.write().await = ids;
        Ok(())
    }

    /// Full-system activation pass over every known module. Also converges
    /// versions whose update was deferred to this boot.
    pub async fn boot(&self) -> Result<(), ModaxError> {
        let resolved = {
            let store = self.store.read().await;
            resolver::resolve(&store)
        };
        let prior = self.activation.snapshot().await;

        let mut records = BTreeMap::new();
        for (id, version) in resolved {
            let record = self.make_record(id.clone(), version);
            viewfs::materialize(&record, &self.config)?;
            linkerconfig::sync_artifact(&record.version, &self.config.store.linker_config_dir)?;
            records.insert(id, record);
        }

        let published = self.activation.publish(records).await;
        for record in published.records.values() {
            if let Some(old) = prior.get(&record.id) {
                if old.version != record.version {
                    self.coordinator.stop_version(&old.version).await;
                }
            }
            self.coordinator
                .start_version(&record.version, &record.activation_path, Scope::System)
                .await;
        }

        self.pending_reboot.write().await.clear();
        info!(
            "Boot activation published revision {} with {} module(s)",
            published.revision,
            published.len()
        );
        Ok(())
    }

    /// Submit a candidate package for a rebootless update.
    ///
    /// A rejected candidate leaves no trace; a `requires_reboot` candidate
    /// is recorded but its convergence is deferred to the next boot.
    pub async fn submit(&self, package_dir: &Path) -> Result<UpdateReport, ModaxError> {
        let session_id = Uuid::new_v4();
        let started_at = Utc::now();

        // Validating: nothing is mutated before these checks pass.
        let manifest = ModuleManifest::load(package_dir)?;
        let id = manifest.name.clone();
        info!(
            "Update session {}: validating {} v{} from {}",
            session_id,
            id,
            manifest.version_code,
            package_dir.display()
        );

        let guard = self.guard_for(&id);
        let _permit = guard
            .try_lock_owned()
            .map_err(|_| ModaxError::UpdateInProgress(id.to_string()))?;

        {
            let store = self.store.read().await;
            if let Err(e) = store.check_admission(&manifest) {
                warn!("Update session {}: aborted, {}", session_id, e);
                return Err(e);
            }
        }

        let prior = self.activation.snapshot().await;
        let from_version = prior.get(&id).map(|r| r.version.version_code());

        // Committing: durable record, then materialize, then one atomic
        // publish of the new activation record.
        let version = {
            let mut store = self.store.write().await;
            store.record(package_dir, &self.config)?
        };

        if version.manifest.requires_reboot {
            self.pending_reboot.write().await.push(id.clone());
            info!(
                "Update session {}: {} v{} recorded, activation deferred to next boot",
                session_id,
                id,
                version.version_code()
            );
            return Ok(UpdateReport {
                session_id,
                module: id,
                from_version,
                to_version: version.version_code(),
                phase: UpdatePhase::Committing,
                deferred: true,
                started_at,
            });
        }

        let record = self.make_record(id.clone(), version.clone());
        // A failed materialize must not advance the active record.
        viewfs::materialize(&record, &self.config)?;
        self.activation.publish_record(record.clone()).await;

        // Converging: exactly this module; nothing else is touched.
        linkerconfig::sync_artifact(&version, &self.config.store.linker_config_dir)?;
        let outgoing = prior.get(&id).map(|r| r.version.clone());
        self.coordinator
            .apply(outgoing.as_ref(), &record, Scope::System)
            .await;

        info!(
            "Update session {}: {} {} -> v{} converged",
            session_id,
            id,
            from_version
                .map(|v| format!("v{}", v))
                .unwrap_or_else(|| "(new)".to_string()),
            version.version_code()
        );
        Ok(UpdateReport {
            session_id,
            module: id,
            from_version,
            to_version: version.version_code(),
            phase: UpdatePhase::Converging,
            deferred: false,
            started_at,
        })
    }

    /// Per-module active version query.
    pub async fn active_info(&self, id: &ModuleId) -> Option<ActiveModuleInfo> {
        self.activation.snapshot().await.get(id).map(|r| r.info())
    }

    pub async fn list_active(&self) -> Vec<ActiveModuleInfo> {
        self.activation
            .snapshot()
            .await
            .records
            .values()
            .map(|r| r.info())
            .collect()
    }

    /// Modules activated during the bootstrap phase.
    pub async fn bootstrap_modules(&self) -> Vec<String> {
        self.bootstrap_ids
            .read()
            .await
            .iter()
            .map(|id| id.to_string())
            .collect()
    }

    /// Bounded wait for a module's ready flag, using the configured
    /// deadline.
    pub async fn wait_ready(&self, id: &ModuleId) -> Result<(), ModaxError> {
        self.coordinator
            .wait_ready(
                id,
                std::time::Duration::from_millis(self.config.services.ready_timeout_ms),
            )
            .await
    }

    pub fn coordinator(&self) -> &ServiceCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn versions_of(&self, id: &ModuleId) -> Vec<Arc<modax_shared::ModuleVersion>> {
        self.store.read().await.versions_of(id)
    }

    pub async fn status(&self) -> EngineStatus {
        let snapshot = self.activation.snapshot().await;
        EngineStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            platform_version: self.config.platform_version.clone(),
            active_modules: snapshot.len(),
            bootstrap_modules: self.bootstrap_modules().await,
            pending_reboot: self
                .pending_reboot
                .read()
                .await
                .iter()
                .map(|id| id.to_string())
                .collect(),
        }
    }
}
