//! Error types for modax.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModaxError {
    #[error("candidate {name} requires platform {required}, running platform is {platform}")]
    CompatibilityMismatch {
        name: String,
        required: String,
        platform: String,
    },

    #[error("store error: {0}")]
    StoreIo(String),

    #[error("failed to materialize view for {name}: {reason}")]
    MaterializeFailure { name: String, reason: String },

    #[error("update already in progress for {0}")]
    UpdateInProgress(String),

    #[error("service {service} did not leave starting state within {timeout_ms}ms")]
    ServiceStartTimeout { service: String, timeout_ms: u64 },

    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("invalid manifest at {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("{name} v{code} is already recorded")]
    VersionExists { name: String, code: i64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModaxError {
    pub fn code(&self) -> i32 {
        match self {
            ModaxError::CompatibilityMismatch { .. } => -32000,
            ModaxError::StoreIo(_) => -32001,
            ModaxError::MaterializeFailure { .. } => -32002,
            ModaxError::UpdateInProgress(_) => -32003,
            ModaxError::ServiceStartTimeout { .. } => -32004,
            ModaxError::UnknownModule(_) => -32005,
            ModaxError::InvalidManifest { .. } => -32006,
            ModaxError::Io(_) => -32007,
            ModaxError::VersionExists { .. } => -32008,
            ModaxError::Json(_) => -32700,
        }
    }
}
