//! Filesystem view builder - stable per-module activation paths.
//!
//! Each module gets a stable view path under `<data_dir>/modules/<name>`
//! that always resolves to the content of the currently active version.
//! The view is a symlink swapped with an atomic rename: an external reader
//! sees either the full prior content or the full new content, never a
//! partial overlay.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use tracing::debug;

use modax_shared::ModaxError;

use crate::activation::ActivationRecord;
use crate::config::Config;

/// Stable activation path for a module.
pub fn activation_path(config: &Config, name: &str) -> PathBuf {
    config.view_dir().join(name)
}

/// Point the module's view at the record's content root.
///
/// Any failure leaves the previous view untouched; the swap itself is a
/// single rename.
pub fn materialize(record: &ActivationRecord, config: &Config) -> Result<(), ModaxError> {
    let content_root = &record.version.content_root;
    let fail = |reason: String| ModaxError::MaterializeFailure {
        name: record.id.to_string(),
        reason,
    };

    if !content_root.is_dir() {
        return Err(fail(format!(
            "content root {} does not exist",
            content_root.display()
        )));
    }

    let view_dir = config.view_dir();
    fs::create_dir_all(&view_dir).map_err(|e| fail(e.to_string()))?;

    let link = view_dir.join(record.id.as_str());
    let staged = view_dir.join(format!(".{}.new", record.id));
    if staged.exists() || staged.symlink_metadata().is_ok() {
        fs::remove_file(&staged).map_err(|e| fail(e.to_string()))?;
    }
    symlink(content_root, &staged).map_err(|e| fail(e.to_string()))?;
    fs::rename(&staged, &link).map_err(|e| {
        let _ = fs::remove_file(&staged);
        fail(e.to_string())
    })?;

    debug!(
        "Materialized {} -> {}",
        link.display(),
        content_root.display()
    );
    Ok(())
}

/// Recursive copy used for stage-and-rename writes into the data area.
pub(crate) fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use modax_shared::{ModuleId, ModuleVersion, Origin};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.store.data_dir = root.join("data");
        config
    }

    fn record_backed_by(name: &str, code: i64, content_root: &Path) -> ActivationRecord {
        let manifest: modax_shared::ModuleManifest = serde_json::from_str(&format!(
            r#"{{"name": "{}", "version_code": {}}}"#,
            name, code
        ))
        .unwrap();
        ActivationRecord {
            id: ModuleId::from(name),
            version: Arc::new(ModuleVersion {
                manifest,
                origin: Origin::Preinstalled,
                content_root: content_root.to_path_buf(),
            }),
            activation_path: PathBuf::new(),
        }
    }

    #[test]
    fn test_materialize_exposes_content() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());

        let content = temp.path().join("pkg_v1");
        fs::create_dir_all(&content).unwrap();
        fs::write(content.join("payload.bin"), b"v1").unwrap();

        let record = record_backed_by("foo", 1, &content);
        materialize(&record, &config).unwrap();

        let view = activation_path(&config, "foo");
        assert_eq!(fs::read(view.join("payload.bin")).unwrap(), b"v1");
    }

    #[test]
    fn test_swap_replaces_whole_view() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());

        let v1 = temp.path().join("pkg_v1");
        fs::create_dir_all(&v1).unwrap();
        fs::write(v1.join("payload.bin"), b"v1").unwrap();
        fs::write(v1.join("only_in_v1"), b"x").unwrap();

        let v2 = temp.path().join("pkg_v2");
        fs::create_dir_all(&v2).unwrap();
        fs::write(v2.join("payload.bin"), b"v2").unwrap();

        materialize(&record_backed_by("foo", 1, &v1), &config).unwrap();
        materialize(&record_backed_by("foo", 2, &v2), &config).unwrap();

        let view = activation_path(&config, "foo");
        assert_eq!(fs::read(view.join("payload.bin")).unwrap(), b"v2");
        // Nothing of the old view bleeds through.
        assert!(!view.join("only_in_v1").exists());
    }

    #[test]
    fn test_failure_keeps_previous_view() {
        let temp = TempDir::new().unwrap();
        let config = test_config(temp.path());

        let v1 = temp.path().join("pkg_v1");
        fs::create_dir_all(&v1).unwrap();
        fs::write(v1.join("payload.bin"), b"v1").unwrap();
        materialize(&record_backed_by("foo", 1, &v1), &config).unwrap();

        let missing = temp.path().join("does_not_exist");
        let err = materialize(&record_backed_by("foo", 2, &missing), &config).unwrap_err();
        assert!(matches!(err, ModaxError::MaterializeFailure { .. }));

        let view = activation_path(&config, "foo");
        assert_eq!(fs::read(view.join("payload.bin")).unwrap(), b"v1");
    }

    #[test]
    fn test_copy_dir_all_recurses() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("a"), b"a").unwrap();
        fs::write(src.join("nested/b"), b"b").unwrap();

        let dst = temp.path().join("dst");
        copy_dir_all(&src, &dst).unwrap();
        assert_eq!(fs::read(dst.join("a")).unwrap(), b"a");
        assert_eq!(fs::read(dst.join("nested/b")).unwrap(), b"b");
    }
}
