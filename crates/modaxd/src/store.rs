//! Module store - durable record of every known module version.
//!
//! Preinstalled versions are discovered by scanning the read-only image
//! directories; updated versions live under the writable data area. Both
//! copies of a module may coexist in the store, only one is ever active.
//! Recording is additive: a version is never edited in place.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use modax_shared::{ModaxError, ModuleId, ModuleManifest, ModuleVersion, Origin};

use crate::config::Config;
use crate::viewfs;

pub struct ModuleStore {
    platform_version: String,
    versions: BTreeMap<ModuleId, Vec<Arc<ModuleVersion>>>,
}

impl ModuleStore {
    /// Scan the preinstalled directories and the data area for packages.
    pub fn open(config: &Config) -> Result<Self, ModaxError> {
        let mut store = Self {
            platform_version: config.platform_version.clone(),
            versions: BTreeMap::new(),
        };

        for dir in &config.store.preinstalled_dirs {
            store.scan_dir(dir, Origin::Preinstalled)?;
        }
        store.scan_dir(&config.active_dir(), Origin::Updated)?;

        info!(
            "Module store opened: {} modules, {} versions",
            store.versions.len(),
            store.versions.values().map(|v| v.len()).sum::<usize>()
        );
        Ok(store)
    }

    fn scan_dir(&mut self, dir: &Path, origin: Origin) -> Result<(), ModaxError> {
        if !dir.is_dir() {
            debug!("Skipping missing package dir {}", dir.display());
            return Ok(());
        }

        for entry in fs::read_dir(dir).map_err(|e| scan_error(dir, &e))? {
            let entry = entry.map_err(|e| scan_error(dir, &e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match ModuleManifest::load(&path) {
                Ok(manifest) => {
                    let version = ModuleVersion {
                        manifest,
                        origin,
                        content_root: path,
                    };
                    debug!(
                        "Found {} {} v{}",
                        origin,
                        version.id(),
                        version.version_code()
                    );
                    self.insert(version);
                }
                Err(e) => {
                    // A broken package must not take the whole store down.
                    warn!("Ignoring package at {}: {}", path.display(), e);
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, version: ModuleVersion) {
        let list = self.versions.entry(version.id().clone()).or_default();
        list.push(Arc::new(version));
        list.sort_by_key(|v| (v.origin == Origin::Updated, v.version_code()));
    }

    /// Admission checks for a candidate, without mutating anything.
    /// Rejection here leaves no footprint in the store or on disk.
    pub fn check_admission(&self, manifest: &ModuleManifest) -> Result<(), ModaxError> {
        if let Some(required) = &manifest.required_platform_version {
            if *required != self.platform_version {
                return Err(ModaxError::CompatibilityMismatch {
                    name: manifest.name.to_string(),
                    required: required.clone(),
                    platform: self.platform_version.clone(),
                });
            }
        }
        Ok(())
    }

    /// Record an updated candidate: run admission checks, copy the package
    /// durably into the data area (stage-and-rename, so readers see either
    /// nothing or the whole package), then add it to the known set.
    pub fn record(
        &mut self,
        package_dir: &Path,
        config: &Config,
    ) -> Result<Arc<ModuleVersion>, ModaxError> {
        let manifest = ModuleManifest::load(package_dir)?;
        self.check_admission(&manifest)?;

        // A recorded version is immutable. An updated copy with the same
        // version code may back the live activation; it is never replaced
        // in place.
        if self
            .versions_of(&manifest.name)
            .iter()
            .any(|v| v.origin == Origin::Updated && v.version_code() == manifest.version_code)
        {
            return Err(ModaxError::VersionExists {
                name: manifest.name.to_string(),
                code: manifest.version_code,
            });
        }

        let dir_name = format!("{}@{}", manifest.name, manifest.version_code);
        let staging = config.staging_dir().join(&dir_name);
        let dest = config.active_dir().join(&dir_name);

        fs::create_dir_all(config.staging_dir()).map_err(|e| store_io(&staging, &e))?;
        fs::create_dir_all(config.active_dir()).map_err(|e| store_io(&dest, &e))?;
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| store_io(&staging, &e))?;
        }

        if let Err(e) = viewfs::copy_dir_all(package_dir, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(ModaxError::StoreIo(format!(
                "failed to stage {}: {}",
                dir_name, e
            )));
        }

        // Only a broken leftover from an interrupted session can sit here;
        // anything with a valid manifest was loaded at open and rejected
        // above.
        if dest.exists() {
            fs::remove_dir_all(&dest).map_err(|e| store_io(&dest, &e))?;
        }
        fs::rename(&staging, &dest).map_err(|e| store_io(&dest, &e))?;

        let version = Arc::new(ModuleVersion {
            manifest,
            origin: Origin::Updated,
            content_root: dest,
        });
        let list = self.versions.entry(version.id().clone()).or_default();
        list.push(version.clone());
        list.sort_by_key(|v| (v.origin == Origin::Updated, v.version_code()));

        info!(
            "Recorded {} v{} ({})",
            version.id(),
            version.version_code(),
            version.content_root.display()
        );
        Ok(version)
    }

    pub fn versions_of(&self, id: &ModuleId) -> Vec<Arc<ModuleVersion>> {
        self.versions.get(id).cloned().unwrap_or_default()
    }

    /// Preinstalled copies only, for callers that must ignore updates.
    pub fn preinstalled_of(&self, id: &ModuleId) -> Vec<Arc<ModuleVersion>> {
        self.versions_of(id)
            .into_iter()
            .filter(|v| v.origin == Origin::Preinstalled)
            .collect()
    }

    pub fn ids(&self) -> Vec<ModuleId> {
        self.versions.keys().cloned().collect()
    }

    pub fn all(&self) -> &BTreeMap<ModuleId, Vec<Arc<ModuleVersion>>> {
        &self.versions
    }
}

fn store_io(path: &Path, e: &std::io::Error) -> ModaxError {
    ModaxError::StoreIo(format!("{}: {}", path.display(), e))
}

fn scan_error(dir: &Path, e: &std::io::Error) -> ModaxError {
    ModaxError::StoreIo(format!("scanning {}: {}", dir.display(), e))
}
