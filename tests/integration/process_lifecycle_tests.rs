//! Integration tests for launching, stopping and adopting the simulator
//! process, using shell scripts as stand-in executables.

use std::time::Duration;

use simbridge::process::{probe, ProcessController};

use super::test_helpers::{
    exiting_script, long_running_script, test_config, wait_until, write_script,
};

#[tokio::test]
async fn missing_binary_fails_to_start() {
    let mut controller = ProcessController::new(&test_config(8211, 3009));

    assert!(!controller.start().await);

    let status = controller.status();
    assert!(!status.is_running);
    assert!(status.pid.is_none());
}

#[tokio::test]
async fn immediate_exit_reports_exit_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(8211, 3009);
    config.simulation.binary = exiting_script(dir.path());
    let mut controller = ProcessController::new(&config);

    assert!(!controller.start().await);

    let status = controller.status();
    assert!(!status.is_running);
    assert_eq!(status.exit_code, Some(3));
}

#[tokio::test]
async fn start_stop_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(8211, 3009);
    config.simulation.binary = long_running_script(dir.path());
    let mut controller = ProcessController::new(&config);

    assert!(controller.start().await);
    let first = controller.status();
    assert!(first.is_running);
    assert!(!first.adopted);
    assert!(first.pid.is_some());

    assert!(controller.start().await, "second start is a no-op");
    assert_eq!(controller.status().pid, first.pid);

    controller.stop().await;
    let stopped = controller.status();
    assert!(!stopped.is_running);
    assert!(stopped.pid.is_none());
    assert!(stopped.exit_code.is_none());

    controller.stop().await;
    assert!(!controller.is_running());
}

#[tokio::test]
async fn status_notices_a_process_that_died_after_startup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(8211, 3009);
    config.simulation.binary = write_script(dir.path(), "dies.sh", "sleep 1\nexit 3");
    let mut controller = ProcessController::new(&config);

    assert!(controller.start().await);
    assert!(wait_until(|| !controller.status().is_running).await);

    let status = controller.status();
    assert_eq!(status.exit_code, Some(3));
    assert!(!controller.is_running());

    assert!(controller.start().await, "start relaunches after an exit");
    assert!(controller.is_running());
    controller.stop().await;
}

#[tokio::test]
async fn restart_launches_a_new_process() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(8211, 3009);
    config.simulation.binary = long_running_script(dir.path());
    let mut controller = ProcessController::new(&config);

    assert!(controller.start().await);
    let before = controller.status().pid;

    assert!(controller.restart().await);
    let after = controller.status();
    assert!(after.is_running);
    assert_ne!(after.pid, before);

    controller.stop().await;
}

#[tokio::test]
async fn stop_force_kills_after_grace_period() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(8211, 3009);
    config.simulation.binary = write_script(
        dir.path(),
        "stubborn.sh",
        "trap '' TERM\nwhile true; do sleep 1; done",
    );
    config.simulation.stop_grace_seconds = 1;
    let mut controller = ProcessController::new(&config);

    assert!(controller.start().await);
    let started = std::time::Instant::now();
    controller.stop().await;

    assert!(!controller.is_running());
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
async fn launch_passes_flags_and_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("launch.txt");
    let body = format!(
        "echo \"$* | $HEADLESS $OMNI_LIVESTREAM $OMNI_WEBRTC_PORT_HTTP $ACCEPT_EULA $SIMBRIDGE_TEST\" > '{}'\nexec sleep 30",
        out.display()
    );
    let mut config = test_config(9000, 4000);
    config.simulation.binary = write_script(dir.path(), "record.sh", &body);
    config
        .simulation
        .env
        .insert("SIMBRIDGE_TEST".into(), "extra".into());
    let mut controller = ProcessController::new(&config);

    assert!(controller.start().await);
    assert!(
        wait_until(|| std::fs::read_to_string(&out).is_ok_and(|text| text.ends_with('\n'))).await
    );
    let recorded = std::fs::read_to_string(&out).expect("read launch record");

    assert_eq!(
        recorded.trim(),
        "--headless --livestream webrtc --webrtc-port 9000 --rest-port 4000 | 1 webrtc 9000 Y extra"
    );
    controller.stop().await;
}

#[tokio::test]
async fn adopts_running_instance_without_stopping_it() {
    let mut marker = std::process::Command::new("sleep")
        .arg("31.4159")
        .spawn()
        .expect("spawn marker process");

    // Discovery relies on pgrep; skip where it is unavailable.
    if probe::find_running("sleep 31.4159").await.is_none() {
        marker.kill().ok();
        marker.wait().ok();
        return;
    }

    let mut config = test_config(8211, 3009);
    config.simulation.discovery_pattern = Some("sleep 31.4159".into());
    let mut controller = ProcessController::new(&config);

    assert!(controller.start().await);
    let status = controller.status();
    assert!(status.adopted);
    assert_eq!(status.pid, Some(marker.id()));

    controller.stop().await;
    assert!(!controller.is_running());
    assert!(
        marker.try_wait().expect("poll marker").is_none(),
        "adopted instance must be left running"
    );

    marker.kill().ok();
    marker.wait().ok();
}
