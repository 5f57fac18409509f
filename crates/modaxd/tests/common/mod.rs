//! Shared fixtures for modaxd integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modaxd::config::Config;
use modaxd::orchestrator::Engine;
use modaxd::supervisor::ServiceSupervisor;

/// Supervisor double that records every call and can be slowed down to
/// hold lifecycle transitions open.
pub struct ScriptedSupervisor {
    events: Mutex<Vec<String>>,
    start_delay: Duration,
    stop_delay: Duration,
}

impl ScriptedSupervisor {
    pub fn new() -> Arc<Self> {
        Self::with_delays(Duration::ZERO, Duration::ZERO)
    }

    pub fn with_delays(start_delay: Duration, stop_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            start_delay,
            stop_delay,
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, needle: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.contains(needle))
            .collect()
    }
}

impl ServiceSupervisor for ScriptedSupervisor {
    fn start(&self, key: &str, _exec: &Path) -> Result<(), String> {
        if !self.start_delay.is_zero() {
            std::thread::sleep(self.start_delay);
        }
        self.events.lock().unwrap().push(format!("start {}", key));
        Ok(())
    }

    fn stop(&self, key: &str) -> Result<(), String> {
        if !self.stop_delay.is_zero() {
            std::thread::sleep(self.stop_delay);
        }
        self.events.lock().unwrap().push(format!("stop {}", key));
        Ok(())
    }
}

/// Engine configuration rooted entirely inside a temp directory.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.store.preinstalled_dirs = vec![root.join("preinstalled")];
    config.store.data_dir = root.join("data");
    config.store.linker_config_dir = root.join("linkerconfig");
    config
}

/// Write a package directory: manifest plus a payload file.
pub fn write_package(dir: &Path, manifest: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("manifest.json"), manifest).unwrap();
    fs::write(dir.join("payload.bin"), b"content").unwrap();
    dir.to_path_buf()
}

/// Put a package into the preinstalled (read-only image) area.
pub fn preinstall(config: &Config, subdir: &str, manifest: &str) -> PathBuf {
    write_package(&config.store.preinstalled_dirs[0].join(subdir), manifest)
}

pub fn engine_with(config: Config, supervisor: Arc<ScriptedSupervisor>) -> Arc<Engine> {
    Arc::new(Engine::new(config, supervisor).unwrap())
}
