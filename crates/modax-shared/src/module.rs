//! Module identity, manifests and versions.
//!
//! A module is an independently updatable unit of platform software. Every
//! version of a module is immutable once recorded: an update always produces
//! a new `ModuleVersion`, never an in-place edit.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ModaxError;
use crate::MANIFEST_FILE;

/// Stable module identifier, reverse-domain by convention
/// (e.g. `com.vendor.module.foo`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Where a module version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Shipped read-only with the platform image
    Preinstalled,
    /// Accepted through a rebootless update, lives in the writable data area
    Updated,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Preinstalled => write!(f, "preinstalled"),
            Origin::Updated => write!(f, "updated"),
        }
    }
}

/// When the coordinator starts a declared service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Started as soon as the declaring version becomes active
    #[default]
    OnActivation,
    /// Only started on an explicit external request
    Manual,
}

/// A service shipped by one specific module version. Services are never
/// shared across versions: the binding is part of the data model, not a
/// naming convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    /// Executable path relative to the activation path
    pub exec: String,
    #[serde(default)]
    pub start_policy: StartPolicy,
}

/// Package metadata, read from `manifest.json` at the content root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    pub name: ModuleId,
    pub version_code: i64,

    /// Platform version this package requires, checked at admission time.
    /// Absent means compatible with any platform.
    #[serde(default)]
    pub required_platform_version: Option<String>,

    /// Version cannot be activated rebootlessly; convergence is deferred
    /// to the next boot.
    #[serde(default)]
    pub requires_reboot: bool,

    /// Eligible for the early-boot bootstrap activation pass.
    #[serde(default)]
    pub bootstrap: bool,

    /// Native libraries the module links against; drives linker
    /// configuration generation.
    #[serde(default)]
    pub required_native_libs: BTreeSet<String>,

    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

impl ModuleManifest {
    /// Read and validate the manifest at a package content root.
    pub fn load(content_root: &Path) -> Result<Self, ModaxError> {
        let path = content_root.join(MANIFEST_FILE);
        let invalid = |reason: String| ModaxError::InvalidManifest {
            path: path.display().to_string(),
            reason,
        };

        let data = std::fs::read_to_string(&path)
            .map_err(|e| invalid(format!("cannot read: {}", e)))?;
        let manifest: ModuleManifest =
            serde_json::from_str(&data).map_err(|e| invalid(e.to_string()))?;

        if manifest.name.is_empty() {
            return Err(invalid("empty module name".to_string()));
        }
        if manifest.version_code < 0 {
            return Err(invalid(format!(
                "negative version code {}",
                manifest.version_code
            )));
        }
        Ok(manifest)
    }
}

/// One immutable version of a module, as recorded in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleVersion {
    pub manifest: ModuleManifest,
    pub origin: Origin,
    /// Where the packaged content lives (read-only image dir for
    /// preinstalled versions, writable data area for updated ones)
    pub content_root: PathBuf,
}

impl ModuleVersion {
    pub fn id(&self) -> &ModuleId {
        &self.manifest.name
    }

    pub fn version_code(&self) -> i64 {
        self.manifest.version_code
    }

    pub fn is_bootstrap(&self) -> bool {
        self.manifest.bootstrap
    }

    /// Directory name used for this version in the writable data area.
    pub fn dir_name(&self) -> String {
        format!("{}@{}", self.manifest.name, self.manifest.version_code)
    }

    /// Status flag key for one of this version's services. The version is
    /// part of the key because a service belongs exclusively to the version
    /// that shipped it.
    pub fn service_key(&self, service: &ServiceDescriptor) -> String {
        format!(
            "{}_{}_{}",
            self.manifest.name, self.manifest.version_code, service.name
        )
    }
}
