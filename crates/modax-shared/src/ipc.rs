//! Line-delimited JSON protocol between modaxd and modaxctl.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::status::{ActiveModuleInfo, EngineStatus, UpdateReport};

/// Requests accepted by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Ping,
    Status,
    /// List all active modules
    List,
    /// Active version query for one module
    GetActive { name: String },
    /// Submit a candidate package for a rebootless update
    Submit { package_dir: PathBuf },
    /// Modules activated in the bootstrap phase
    Bootstrap,
    /// Service status and module readiness flags
    Flags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: Method,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    Ok,
    Status(EngineStatus),
    List(Vec<ActiveModuleInfo>),
    Active(ActiveModuleInfo),
    Update(UpdateReport),
    Bootstrap(Vec<String>),
    Flags(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<ResponseData, String>,
}
