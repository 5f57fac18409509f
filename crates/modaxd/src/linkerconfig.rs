//! Linker namespace configuration generation.
//!
//! Each active version's declared native-library requirements are turned
//! into a per-module `ld.config.txt`. Regeneration is idempotent, and a
//! version with no requirements must leave no artifact at all: file-absent
//! vs file-present is externally observable.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use modax_shared::{ModaxError, ModuleVersion};

pub const LINKER_CONFIG_FILE: &str = "ld.config.txt";

/// Namespace the module's default namespace links against.
const PARENT_NAMESPACE: &str = "system";

/// Artifact path for a module, keyed by identifier.
pub fn artifact_path(linker_config_dir: &Path, name: &str) -> PathBuf {
    linker_config_dir.join(name).join(LINKER_CONFIG_FILE)
}

/// Render the configuration text, one directive per required library in
/// stable order. `None` when the version declares no requirements.
pub fn render(version: &ModuleVersion) -> Option<String> {
    let libs = &version.manifest.required_native_libs;
    if libs.is_empty() {
        return None;
    }
    let mut out = String::new();
    for lib in libs {
        // BTreeSet iteration keeps the output byte-stable across runs.
        let _ = writeln!(
            out,
            "namespace.default.link.{}.shared_libs += {}",
            PARENT_NAMESPACE, lib
        );
    }
    Some(out)
}

/// Bring the on-disk artifact in line with the version: write the rendered
/// text, or remove the artifact when nothing is required.
pub fn sync_artifact(
    version: &ModuleVersion,
    linker_config_dir: &Path,
) -> Result<Option<PathBuf>, ModaxError> {
    let name = version.id().as_str();
    let path = artifact_path(linker_config_dir, name);

    match render(version) {
        Some(text) => {
            fs::create_dir_all(path.parent().unwrap_or(linker_config_dir))?;
            fs::write(&path, text)?;
            debug!("Wrote linker config for {} at {}", name, path.display());
            Ok(Some(path))
        }
        None => {
            if path.exists() {
                fs::remove_file(&path)?;
                // Drop the now-empty per-module dir as well.
                if let Some(dir) = path.parent() {
                    let _ = fs::remove_dir(dir);
                }
                debug!("Removed linker config for {}", name);
            }
            Ok(None)
        }
    }
}
