use climalink_lib::config::AppConfig;
use climalink_lib::link::simulated::{SimulatedBackend, SimulatedPort};
use climalink_lib::link::*;
use std::sync::Arc;
use std::time::Duration;

fn create_test_controller() -> (LinkController, Arc<SimulatedPort>, Arc<RecordingSink>) {
    let port = SimulatedPort::new("SIM0");
    let sink = Arc::new(RecordingSink::new());
    let controller = LinkController::new(
        Arc::new(SimulatedBackend::new(port.clone())),
        sink.clone(),
        SerialConfig::default(),
    );
    (controller, port, sink)
}

async fn wait_for<F: Fn() -> bool>(check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn test_full_session_sequence() {
    let (controller, port, sink) = create_test_controller();

    controller.connect().await.unwrap();
    assert!(sink.state().controls_enabled);

    port.inject_rx(b"T25.5 H60\n");
    wait_for(|| sink.state().humidity.is_some()).await;
    let state = sink.state();
    assert_eq!(state.temperature.as_deref(), Some("25.5"));
    assert_eq!(state.humidity.as_deref(), Some("60"));

    let outcome = controller.send_command("LED_ON").await.unwrap();
    assert_eq!(outcome, SendOutcome::Sent(7));
    assert_eq!(port.writes(), vec![b"LED_ON\n".to_vec()]);
    assert_eq!(sink.state().status, Status::CommandSent("LED_ON".into()));

    controller.disconnect().await.unwrap();
    assert!(!port.is_open());
    assert!(!sink.state().controls_enabled);
    assert_eq!(sink.state().status, Status::NotConnected);

    let outcome = controller.send_command("LED_OFF").await.unwrap();
    assert_eq!(outcome, SendOutcome::Rejected);
    assert_eq!(port.writes().len(), 1);
    assert_eq!(sink.state().status, Status::Rejected);

    // Values from the finished session stay on the display.
    assert_eq!(sink.state().temperature.as_deref(), Some("25.5"));
}

#[tokio::test]
async fn test_disconnect_before_connect_is_noop() {
    let (controller, port, sink) = create_test_controller();
    controller.disconnect().await.unwrap();
    controller.disconnect().await.unwrap();
    assert_eq!(sink.statuses(), vec![Status::NotConnected, Status::NotConnected]);
    assert!(!port.is_open());
}

#[tokio::test]
async fn test_cancelled_read_is_not_reported() {
    let (controller, port, sink) = create_test_controller();
    controller.connect().await.unwrap();
    wait_for(|| port.is_read_locked()).await;

    controller.disconnect().await.unwrap();
    assert!(!port.is_read_locked());
    assert!(sink
        .statuses()
        .iter()
        .all(|s| !matches!(s, Status::ReadFailed(_))));
}

#[tokio::test]
async fn test_read_failure_reported_until_disconnect() {
    let (controller, port, sink) = create_test_controller();
    controller.connect().await.unwrap();

    port.inject_read_error("device unplugged");
    wait_for(|| matches!(sink.state().status, Status::ReadFailed(_))).await;

    // The session stays until the user disconnects.
    assert!(controller.is_connected().await);
    assert!(!controller.info().await.reading);

    controller.disconnect().await.unwrap();
    controller.connect().await.unwrap();
    port.inject_rx(b"H70");
    wait_for(|| sink.state().humidity.as_deref() == Some("70")).await;
    controller.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_partial_updates_keep_previous_values() {
    let (controller, port, sink) = create_test_controller();
    controller.connect().await.unwrap();

    port.inject_rx(b"T20 H50\n");
    wait_for(|| sink.state().humidity.is_some()).await;
    port.inject_rx(b"T21\n");
    wait_for(|| sink.state().temperature.as_deref() == Some("21")).await;
    port.inject_rx(b"garbage\n");
    port.inject_rx(b"H51\n");
    wait_for(|| sink.state().humidity.as_deref() == Some("51")).await;

    let state = sink.state();
    assert_eq!(state.temperature.as_deref(), Some("21"));
    controller.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_split_utf8_across_reads() {
    let (controller, port, sink) = create_test_controller();
    controller.connect().await.unwrap();

    let bytes = "T22.5°C H40".as_bytes();
    let split = bytes.iter().position(|&b| b == 0xC2).unwrap() + 1;
    port.inject_rx(&bytes[..split]);
    port.inject_rx(&bytes[split..]);
    wait_for(|| sink.state().humidity.is_some()).await;

    assert_eq!(sink.state().temperature.as_deref(), Some("22.5"));
    assert!(sink
        .events()
        .iter()
        .all(|e| !matches!(e, DisplayEvent::Status(Status::ReadFailed(_)))));
    controller.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_controls_from_config_drive_commands() {
    let config = AppConfig::default();
    let (controller, port, _sink) = create_test_controller();
    controller.connect().await.unwrap();

    for control in &config.controls {
        controller.send_command(&control.command).await.unwrap();
    }
    assert_eq!(
        port.written_bytes(),
        b"LED_ON\nLED_OFF\nFAN_ON\nFAN_OFF\n".to_vec()
    );
    assert_eq!(controller.info().await.stats.commands_tx, 4);
    controller.disconnect().await.unwrap();
}
