//! Narrow interface to the service supervision layer.
//!
//! The engine only needs two things from whatever supervises processes:
//! signal a start, and stop with confirmation. Everything else (state
//! flags, readiness, ordering) is the coordinator's job.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::Mutex;

use tracing::{debug, warn};

/// Start/stop interface implemented by the process supervisor, and by
/// scripted doubles in tests. Methods may block; callers run them off the
/// async runtime.
pub trait ServiceSupervisor: Send + Sync {
    /// Launch the service. Returning `Ok` means the service has been
    /// brought up as far as the supervisor can confirm.
    fn start(&self, key: &str, exec: &Path) -> Result<(), String>;

    /// Stop the service and do not return until it is no longer running.
    /// Stopping something that is not running is not an error.
    fn stop(&self, key: &str) -> Result<(), String>;
}

/// Supervisor that runs services as child processes of the daemon.
pub struct ProcessSupervisor {
    children: Mutex<HashMap<String, Child>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            children: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceSupervisor for ProcessSupervisor {
    fn start(&self, key: &str, exec: &Path) -> Result<(), String> {
        let child = Command::new(exec)
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", exec.display(), e))?;
        debug!("Started {} (pid {})", key, child.id());
        self.children
            .lock()
            .expect("supervisor lock poisoned")
            .insert(key.to_string(), child);
        Ok(())
    }

    fn stop(&self, key: &str) -> Result<(), String> {
        let child = self
            .children
            .lock()
            .expect("supervisor lock poisoned")
            .remove(key);
        match child {
            Some(mut child) => {
                if let Err(e) = child.kill() {
                    // Already exited on its own.
                    warn!("Kill {} failed: {}", key, e);
                }
                child
                    .wait()
                    .map_err(|e| format!("wait for {} failed: {}", key, e))?;
                debug!("Stopped {}", key);
                Ok(())
            }
            None => Ok(()),
        }
    }
}
