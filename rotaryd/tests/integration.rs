//! End-to-end wiring test: builds a `Controller` against `MockGpio` and
//! `SimulatedSignalingClient` instead of real hardware/network, drives a
//! rotary pulse train straight through the GPIO mock the way a real dial
//! would, and confirms the call reaches the persisted call log.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rotary_config::PhoneConfig;
use rotary_gpio::{Level, MockGpio};
use rotary_ringer::MockAudioSink;
use rotary_signaling::SimulatedSignalingClient;
use rotaryd::controller::Controller;
use rotaryd::signals::ControlSignal;
use tokio::sync::mpsc;

fn sample_config() -> &'static str {
    r#"
    [sip]
    server_host = "sip.example.com"
    user = "alice"
    credential = "hunter2"

    [hardware]
    hook_pin = 17
    pulse_pin = 4
    ringer_enable_pin = 27

    [timing]
    pulse_timeout_ms = 40
    inter_digit_timeout_ms = 60
    hook_debounce_ms = 10

    [speed_dial]
    "1" = "+15551234567"

    [allowlist]

    [audio]
    ring_file = "ring.wav"
    dial_tone_file = "dial.wav"
    busy_tone_file = "busy.wav"
    error_tone_file = "error.wav"
    "#
}

fn temp_db_path() -> std::path::PathBuf {
    let nonce = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    std::env::temp_dir().join(format!("rotaryd-integration-{}-{nonce}.db", std::process::id()))
}

async fn pulse(gpio: &MockGpio, pin: u8, n: u32) {
    for _ in 0..n {
        gpio.pulse(pin, 2_000, 2_000).await.unwrap();
    }
}

#[tokio::test]
async fn outbound_speed_dial_call_is_wired_end_to_end() {
    let config = PhoneConfig::parse(sample_config()).unwrap();
    let db_path = temp_db_path();

    let gpio = Arc::new(MockGpio::new());
    let audio: Arc<dyn rotary_ringer::AudioSink> = Arc::new(MockAudioSink::new(Duration::from_millis(5)));
    let signaling = Arc::new(SimulatedSignalingClient::new());
    let (signal_tx, signal_rx) = mpsc::channel(4);

    let controller = Controller::new(std::path::PathBuf::from("unused.toml"), db_path.clone());
    let run = tokio::spawn(controller.run_with_backend(config, signaling.clone(), gpio.clone(), audio, signal_rx));

    // Wait for the dial reader and hook monitor to configure their pins
    // before driving any edges.
    for _ in 0..100 {
        if gpio.read(17).is_ok() && gpio.read(4).is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Hook pin idle-high (on-hook); going low is pickup.
    gpio.set_level(17, Level::Low).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    pulse(&gpio, 4, 1).await;
    tokio::time::sleep(Duration::from_millis(120)).await;

    let mut handle = None;
    for _ in 0..50 {
        if let Some(h) = signaling.active_handle() {
            handle = Some(h);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let handle = handle.expect("outbound call never reached the signalling client");
    signaling.simulate_remote_answer(handle).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    signaling.simulate_remote_hangup(handle).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Hook back on-hook (high) to close the record and return to Idle.
    gpio.set_level(17, Level::High).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    signal_tx.send(ControlSignal::Shutdown).await.unwrap();
    run.await.unwrap().unwrap();

    let db_url = format!("sqlite://{}", db_path.display());
    let pool = sqlx::SqlitePool::connect(&db_url).await.unwrap();
    let row: (String, String, String) = sqlx::query_as(
        "SELECT direction, status, destination FROM call_log ORDER BY id DESC LIMIT 1",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.0, "Outbound");
    assert_eq!(row.1, "Completed");
    assert_eq!(row.2, "+15551234567");
    pool.close().await;

    let _ = std::fs::remove_file(&db_path);
}
