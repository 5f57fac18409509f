//! Shared types for the modax module installer.

pub mod error;
pub mod ipc;
pub mod module;
pub mod status;

pub use error::ModaxError;
pub use module::{
    ModuleId, ModuleManifest, ModuleVersion, Origin, ServiceDescriptor, StartPolicy,
};
pub use status::{ActiveModuleInfo, EngineStatus, ServiceState, UpdatePhase, UpdateReport};

/// Default unix socket path for daemon-client communication
pub const SOCKET_PATH: &str = "/run/modax/modax.sock";

/// Bounded wait for service readiness, in milliseconds
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 5_000;

/// Manifest file name expected at a package content root
pub const MANIFEST_FILE: &str = "manifest.json";
