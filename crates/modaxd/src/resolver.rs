//! Activation resolver - computes the single active version per module.
//!
//! Resolution is pure: identical store content always yields the same
//! answer. Precedence is origin first (an updated copy, once accepted, is
//! authoritative regardless of version numbers), then highest version code
//! within an origin.

use std::collections::BTreeMap;
use std::sync::Arc;

use modax_shared::{ModuleId, ModuleVersion, Origin};

use crate::store::ModuleStore;

/// Full-system resolution over every known module.
pub fn resolve(store: &ModuleStore) -> BTreeMap<ModuleId, Arc<ModuleVersion>> {
    store
        .all()
        .iter()
        .filter_map(|(id, versions)| pick(versions).map(|v| (id.clone(), v)))
        .collect()
}

/// Bootstrap-phase resolution: only preinstalled versions flagged
/// bootstrap-eligible participate. This pass runs before the writable data
/// area is available, so updated copies are deliberately invisible to it.
pub fn resolve_bootstrap(store: &ModuleStore) -> BTreeMap<ModuleId, Arc<ModuleVersion>> {
    store
        .all()
        .iter()
        .filter_map(|(id, versions)| {
            let eligible: Vec<Arc<ModuleVersion>> = versions
                .iter()
                .filter(|v| v.origin == Origin::Preinstalled && v.is_bootstrap())
                .cloned()
                .collect();
            pick(&eligible).map(|v| (id.clone(), v))
        })
        .collect()
}

fn pick(versions: &[Arc<ModuleVersion>]) -> Option<Arc<ModuleVersion>> {
    let best_of = |origin: Origin| {
        versions
            .iter()
            .filter(|v| v.origin == origin)
            .max_by_key(|v| v.version_code())
            .cloned()
    };
    best_of(Origin::Updated).or_else(|| best_of(Origin::Preinstalled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn version(name: &str, code: i64, origin: Origin, bootstrap: bool) -> Arc<ModuleVersion> {
        let manifest: modax_shared::ModuleManifest = serde_json::from_str(&format!(
            r#"{{"name": "{}", "version_code": {}, "bootstrap": {}}}"#,
            name, code, bootstrap
        ))
        .unwrap();
        Arc::new(ModuleVersion {
            manifest,
            origin,
            content_root: PathBuf::from(format!("/pkg/{}@{}", name, code)),
        })
    }

    #[test]
    fn test_updated_dominates_even_when_older() {
        let versions = vec![
            version("foo", 5, Origin::Preinstalled, false),
            version("foo", 2, Origin::Updated, false),
        ];
        let picked = pick(&versions).unwrap();
        assert_eq!(picked.origin, Origin::Updated);
        assert_eq!(picked.version_code(), 2);
    }

    #[test]
    fn test_highest_version_within_origin() {
        let versions = vec![
            version("foo", 2, Origin::Updated, false),
            version("foo", 3, Origin::Updated, false),
            version("foo", 1, Origin::Preinstalled, false),
        ];
        let picked = pick(&versions).unwrap();
        assert_eq!(picked.version_code(), 3);
    }

    #[test]
    fn test_preinstalled_when_no_update() {
        let versions = vec![version("foo", 1, Origin::Preinstalled, false)];
        assert_eq!(pick(&versions).unwrap().origin, Origin::Preinstalled);
    }

    #[test]
    fn test_empty_is_none() {
        assert!(pick(&[]).is_none());
    }

    #[test]
    fn test_pick_is_deterministic() {
        let versions = vec![
            version("foo", 1, Origin::Preinstalled, false),
            version("foo", 2, Origin::Updated, false),
        ];
        let a = pick(&versions).unwrap();
        let b = pick(&versions).unwrap();
        assert_eq!(a, b);
    }
}
