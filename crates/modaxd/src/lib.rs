//! Modax daemon library - exposes modules for testing.

pub mod activation;
pub mod config;
pub mod linkerconfig;
pub mod orchestrator;
pub mod resolver;
pub mod rpc_server;
pub mod services;
pub mod store;
pub mod supervisor;
pub mod viewfs;
