//! Service lifecycle across a rebootless update: old services confirmed
//! stopped, new services started, readiness bounded by the configured
//! deadline.

mod common;

use std::time::Duration;

use tempfile::TempDir;

use common::{engine_with, preinstall, test_config, write_package, ScriptedSupervisor};
use modax_shared::{ModaxError, ModuleId, ServiceState};

const FOO: &str = "com.vendor.module.foo";

fn manifest_with_service(version: i64, service: &str) -> String {
    format!(
        r#"{{
            "name": "{}",
            "version_code": {},
            "services": [{{"name": "{}", "exec": "bin/{}"}}]
        }}"#,
        FOO, version, service, service
    )
}

#[tokio::test]
async fn test_update_swaps_service_generation() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    preinstall(&config, "foo", &manifest_with_service(1, "foo_svc_v1"));
    let supervisor = ScriptedSupervisor::new();
    let engine = engine_with(config, supervisor.clone());
    engine.boot().await.unwrap();

    let id = ModuleId::from(FOO);
    engine.wait_ready(&id).await.unwrap();

    let candidate = write_package(
        &temp.path().join("candidate_v2"),
        &manifest_with_service(2, "foo_svc_v2"),
    );
    engine.submit(&candidate).await.unwrap();
    engine.wait_ready(&id).await.unwrap();

    let coordinator = engine.coordinator();
    let old_key = format!("{}_1_foo_svc_v1", FOO);
    let new_key = format!("{}_2_foo_svc_v2", FOO);
    assert_eq!(
        coordinator.state_of(&old_key).await,
        Some(ServiceState::Stopped)
    );
    assert_eq!(coordinator.flag(&old_key).await.as_deref(), Some("stopped"));
    assert_eq!(
        coordinator.state_of(&new_key).await,
        Some(ServiceState::Running)
    );
    assert_eq!(coordinator.flag(&new_key).await.as_deref(), Some("running"));
    assert_eq!(
        coordinator.flag(&format!("{}_ready", FOO)).await.as_deref(),
        Some("true")
    );

    // Old generation confirmed down before the new one was signaled.
    let events = supervisor.events();
    let stop_pos = events
        .iter()
        .position(|e| *e == format!("stop {}", old_key))
        .unwrap();
    let start_pos = events
        .iter()
        .position(|e| *e == format!("start {}", new_key))
        .unwrap();
    assert!(stop_pos < start_pos);
}

#[tokio::test]
async fn test_update_during_slow_start_leaves_old_service_stopped() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    preinstall(&config, "foo", &manifest_with_service(1, "foo_svc_v1"));
    let supervisor =
        ScriptedSupervisor::with_delays(Duration::from_millis(300), Duration::ZERO);
    let engine = engine_with(config, supervisor.clone());
    engine.boot().await.unwrap();

    // Submit v2 while v1's start is still in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let candidate = write_package(
        &temp.path().join("candidate_v2"),
        &manifest_with_service(2, "foo_svc_v2"),
    );
    engine.submit(&candidate).await.unwrap();
    engine.wait_ready(&ModuleId::from(FOO)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let old_key = format!("{}_1_foo_svc_v1", FOO);
    let coordinator = engine.coordinator();
    assert_eq!(
        coordinator.state_of(&old_key).await,
        Some(ServiceState::Stopped)
    );
    assert_eq!(coordinator.flag(&old_key).await.as_deref(), Some("stopped"));

    // The stale start must not leave the old service's process behind.
    let old_events = supervisor.events_for("foo_svc_v1");
    assert!(old_events.last().unwrap().starts_with("stop"));
}

#[tokio::test]
async fn test_ready_deadline_elapsing_is_a_hard_failure() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(temp.path());
    config.services.ready_timeout_ms = 100;
    preinstall(&config, "foo", &manifest_with_service(1, "foo_svc"));

    let supervisor = ScriptedSupervisor::with_delays(Duration::from_millis(500), Duration::ZERO);
    let engine = engine_with(config, supervisor);
    engine.boot().await.unwrap();

    let err = engine.wait_ready(&ModuleId::from(FOO)).await.unwrap_err();
    match err {
        ModaxError::ServiceStartTimeout { timeout_ms, .. } => assert_eq!(timeout_ms, 100),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_update_does_not_touch_other_modules_services() {
    let temp = TempDir::new().unwrap();
    let config = test_config(temp.path());
    preinstall(&config, "foo", &manifest_with_service(1, "foo_svc_v1"));
    preinstall(
        &config,
        "bar",
        r#"{
            "name": "com.vendor.module.bar",
            "version_code": 1,
            "services": [{"name": "bar_svc", "exec": "bin/bar_svc"}]
        }"#,
    );
    let supervisor = ScriptedSupervisor::new();
    let engine = engine_with(config, supervisor.clone());
    engine.boot().await.unwrap();
    engine.wait_ready(&ModuleId::from(FOO)).await.unwrap();
    engine
        .wait_ready(&ModuleId::from("com.vendor.module.bar"))
        .await
        .unwrap();

    let bar_events_before = supervisor.events_for("bar_svc").len();

    let candidate = write_package(
        &temp.path().join("candidate_v2"),
        &manifest_with_service(2, "foo_svc_v2"),
    );
    engine.submit(&candidate).await.unwrap();
    engine.wait_ready(&ModuleId::from(FOO)).await.unwrap();

    assert_eq!(supervisor.events_for("bar_svc").len(), bar_events_before);
    assert_eq!(
        engine
            .coordinator()
            .state_of("com.vendor.module.bar_1_bar_svc")
            .await,
        Some(ServiceState::Running)
    );
}
