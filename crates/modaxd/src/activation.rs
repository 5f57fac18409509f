//! Published activation snapshots.
//!
//! The "current activation" state is an immutable snapshot object replaced
//! whole on every change. Readers clone the `Arc` and keep a consistent
//! view for as long as they hold it; there is no torn intermediate state
//! to observe.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use modax_shared::{ActiveModuleInfo, ModuleId, ModuleVersion};

/// The activation decision for one module: exactly one version is active
/// per known identifier at any instant.
#[derive(Debug, Clone)]
pub struct ActivationRecord {
    pub id: ModuleId,
    pub version: Arc<ModuleVersion>,
    /// Stable path where the active content is materialized
    pub activation_path: PathBuf,
}

impl ActivationRecord {
    pub fn info(&self) -> ActiveModuleInfo {
        ActiveModuleInfo {
            name: self.id.clone(),
            version_code: self.version.version_code(),
            path: self.version.content_root.clone(),
            origin: self.version.origin,
        }
    }
}

/// One consistent resolution of the whole module set.
#[derive(Debug, Default)]
pub struct ActivationSet {
    pub revision: u64,
    pub records: BTreeMap<ModuleId, ActivationRecord>,
}

impl ActivationSet {
    pub fn get(&self, id: &ModuleId) -> Option<&ActivationRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Owner of the published snapshot.
pub struct ActivationState {
    current: RwLock<Arc<ActivationSet>>,
}

impl ActivationState {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(ActivationSet::default())),
        }
    }

    /// Consistent point-in-time view of all activation records.
    pub async fn snapshot(&self) -> Arc<ActivationSet> {
        self.current.read().await.clone()
    }

    /// Replace the whole record set in one publish.
    pub async fn publish(
        &self,
        records: BTreeMap<ModuleId, ActivationRecord>,
    ) -> Arc<ActivationSet> {
        let mut current = self.current.write().await;
        let next = Arc::new(ActivationSet {
            revision: current.revision + 1,
            records,
        });
        *current = next.clone();
        next
    }

    /// Publish an update of a single record, leaving every other module's
    /// record untouched.
    pub async fn publish_record(&self, record: ActivationRecord) -> Arc<ActivationSet> {
        let mut current = self.current.write().await;
        let mut records = current.records.clone();
        records.insert(record.id.clone(), record);
        let next = Arc::new(ActivationSet {
            revision: current.revision + 1,
            records,
        });
        *current = next.clone();
        next
    }
}

impl Default for ActivationState {
    fn default() -> Self {
        Self::new()
    }
}
