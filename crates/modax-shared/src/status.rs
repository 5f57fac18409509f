//! Status types for the modax daemon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::module::{ModuleId, Origin};

/// Externally observable per-service lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Stopped => write!(f, "stopped"),
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Answer to the per-module active version query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveModuleInfo {
    pub name: ModuleId,
    pub version_code: i64,
    /// Content path backing the active version; its prefix tells
    /// preinstalled and updated copies apart.
    pub path: PathBuf,
    pub origin: Origin,
}

/// Orchestrator phase of an update session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    Idle,
    Validating,
    Committing,
    Converging,
    Aborted,
}

impl std::fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdatePhase::Idle => write!(f, "idle"),
            UpdatePhase::Validating => write!(f, "validating"),
            UpdatePhase::Committing => write!(f, "committing"),
            UpdatePhase::Converging => write!(f, "converging"),
            UpdatePhase::Aborted => write!(f, "aborted"),
        }
    }
}

/// Result of one accepted update submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
    pub session_id: Uuid,
    pub module: ModuleId,
    pub from_version: Option<i64>,
    pub to_version: i64,
    /// Last phase the session executed
    pub phase: UpdatePhase,
    /// True when the version was recorded but convergence waits for the
    /// next boot.
    pub deferred: bool,
    pub started_at: DateTime<Utc>,
}

/// Overall daemon status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub version: String,
    pub uptime_seconds: u64,
    pub platform_version: String,
    pub active_modules: usize,
    pub bootstrap_modules: Vec<String>,
    pub pending_reboot: Vec<String>,
}
