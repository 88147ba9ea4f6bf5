use super::*;
use crate::config::{InputSource, PostboxConfig};
use crate::counters::CounterFile;
use crate::dispatch::Input;
use crate::events::PostboxEvent;
use crate::sensor::{RawSample, SensorId};
use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

/// Config with fake sysfs pins and counters under a temporary directory
fn create_test_config(dir: &Path) -> PostboxConfig {
    let mut config = PostboxConfig::default();
    config.input.source = InputSource::Gpio;
    config.input.gpio_root = dir.join("gpio").display().to_string();
    config.sensors.letter.active_low = false;
    config.schedule.enabled = false;
    config.system.counters_path = Some(dir.join("counters.json").display().to_string());

    for pin in [
        config.sensors.letter.pin,
        config.sensors.beam_a.pin,
        config.sensors.beam_b.pin,
    ] {
        let pin_dir = dir.join("gpio").join(format!("gpio{}", pin));
        std::fs::create_dir_all(&pin_dir).unwrap();
        std::fs::write(pin_dir.join("value"), "0\n").unwrap();
    }
    config
}

async fn started_orchestrator() -> (PostboxOrchestrator, TempDir) {
    let dir = tempdir().unwrap();
    let mut orchestrator = PostboxOrchestrator::new(create_test_config(dir.path()))
        .await
        .unwrap();
    orchestrator.set_playback_enabled(false);
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();
    (orchestrator, dir)
}

#[tokio::test]
async fn test_orchestrator_creation() {
    let dir = tempdir().unwrap();
    let orchestrator = PostboxOrchestrator::new(create_test_config(dir.path()))
        .await
        .unwrap();

    let states = orchestrator.get_all_component_states().await;
    assert!(states.is_empty());
}

#[tokio::test]
async fn test_initialize_registers_components() {
    let dir = tempdir().unwrap();
    let mut orchestrator = PostboxOrchestrator::new(create_test_config(dir.path()))
        .await
        .unwrap();

    orchestrator.initialize().await.unwrap();

    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 4);
    assert!(states.values().all(|state| *state == ComponentState::Stopped));
}

#[tokio::test]
async fn test_component_state_management() {
    let dir = tempdir().unwrap();
    let orchestrator = PostboxOrchestrator::new(create_test_config(dir.path()))
        .await
        .unwrap();

    orchestrator
        .set_component_state("dispatcher", ComponentState::Starting)
        .await;
    assert_eq!(
        orchestrator.get_component_state("dispatcher").await,
        Some(ComponentState::Starting)
    );
    assert_eq!(orchestrator.get_component_state("unknown").await, None);
}

#[tokio::test]
async fn test_start_marks_components_running() {
    let (mut orchestrator, _dir) = started_orchestrator().await;

    let states = orchestrator.get_all_component_states().await;
    assert!(states.values().all(|state| *state == ComponentState::Running));

    let exit_code = orchestrator
        .shutdown(&ShutdownReason::UserRequest("test".to_string()))
        .await
        .unwrap();
    assert_eq!(exit_code, 0);

    let states = orchestrator.get_all_component_states().await;
    assert!(states.values().all(|state| *state == ComponentState::Stopped));
}

#[tokio::test]
async fn test_letter_is_counted_and_persisted_through_run() {
    let (mut orchestrator, dir) = started_orchestrator().await;
    let sender = orchestrator.input_sender();
    let bus = orchestrator.event_bus().clone();

    // Let the GPIO source report its baseline levels first
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::spawn(async move {
        sender
            .send(Input::Sample(RawSample::new(SensorId::Letter, true, Utc::now())))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        sender
            .send(Input::Sample(RawSample::new(SensorId::Letter, false, Utc::now())))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        bus.publish(PostboxEvent::ShutdownRequested {
            timestamp: Utc::now(),
            reason: "test complete".to_string(),
        })
        .unwrap();
    });

    let exit_code = tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);

    let counters = CounterFile::new(dir.path().join("counters.json"))
        .load()
        .await
        .unwrap();
    assert_eq!(counters.total_letters, 1);
    assert!(counters.last_letter_ts.is_some());
}

#[tokio::test]
async fn test_run_twice_fails() {
    let (mut orchestrator, _dir) = started_orchestrator().await;
    let bus = orchestrator.event_bus().clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = bus.publish(PostboxEvent::ShutdownRequested {
            timestamp: Utc::now(),
            reason: "first".to_string(),
        });
    });
    tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .unwrap()
        .unwrap();

    assert!(orchestrator.run().await.is_err());
}

#[tokio::test]
async fn test_shutdown_saves_final_counters() {
    let (mut orchestrator, dir) = started_orchestrator().await;
    let sender = orchestrator.input_sender();
    let path = dir.path().join("counters.json");

    tokio::time::sleep(Duration::from_millis(200)).await;
    sender
        .send(Input::Sample(RawSample::new(SensorId::Letter, true, Utc::now())))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    sender
        .send(Input::Sample(RawSample::new(SensorId::Letter, false, Utc::now())))
        .await
        .unwrap();

    wait_until(|| {
        std::fs::read_to_string(&path)
            .map(|content| content.contains("\"total_letters\": 1"))
            .unwrap_or(false)
    })
    .await;

    // The persister skips unchanged snapshots, so only shutdown can restore it
    std::fs::remove_file(&path).unwrap();

    let exit_code = orchestrator
        .shutdown(&ShutdownReason::UserRequest("test".to_string()))
        .await
        .unwrap();
    assert_eq!(exit_code, 0);

    let counters = CounterFile::new(&path).load().await.unwrap();
    assert_eq!(counters.total_letters, 1);
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
}
