//! End-to-end scenarios driving the call manager through a mock GPIO ringer,
//! a mock audio sink, the deterministic signalling simulator, and a
//! SQLite-in-memory persistence sink — the same components spec.md's own
//! end-to-end scenarios describe, wired together exactly as `rotaryd` would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rotary_callcore::{build, CallCoreConfig, PhoneState};
use rotary_dial::HookEvent;
use rotary_events::{CallStatus, DomainEvent, Direction, EventBus, PersistenceQuery, PersistenceSink};
use rotary_gpio::MockGpio;
use rotary_ringer::{AudioSink, MockAudioSink, Ringer};
use rotary_signaling::SimulatedSignalingClient;

struct Harness {
    handle: rotary_callcore::CallManagerHandle,
    signaling: Arc<SimulatedSignalingClient>,
    states: Arc<Mutex<Vec<String>>>,
    query: PersistenceQuery,
    _sink: PersistenceSink,
    _run: tokio::task::JoinHandle<()>,
}

async fn harness(allowlist: Vec<String>, speed_dial: HashMap<String, String>) -> Harness {
    let gpio = Arc::new(MockGpio::new());
    let audio: Arc<dyn AudioSink> = Arc::new(MockAudioSink::new(Duration::from_millis(5)));
    let ringer = Arc::new(
        Ringer::new(gpio, 27, audio.clone(), "ring.wav", Duration::from_millis(30), Duration::from_millis(20))
            .unwrap(),
    );
    let signaling = Arc::new(SimulatedSignalingClient::new());
    let events = EventBus::new(256);

    let sink = PersistenceSink::connect("sqlite::memory:", &events).await.unwrap();
    let query = sink.query_handle();

    let states = Arc::new(Mutex::new(Vec::new()));
    let mut sub = events.subscribe();
    let states_task = states.clone();
    tokio::spawn(async move {
        while let Some(event) = sub.recv().await {
            if let DomainEvent::PhoneStateChanged { new, .. } = event {
                states_task.lock().unwrap().push(new);
            }
        }
    });

    let config = CallCoreConfig {
        speed_dial,
        allowlist,
        inter_digit_timeout: Duration::from_millis(80),
        call_attempt_timeout: Duration::from_secs(5),
        dial_tone_path: "dial.wav".into(),
        busy_tone_path: "busy.wav".into(),
        error_tone_path: "error.wav".into(),
    };

    let (manager, handle) = build(signaling.clone(), ringer, audio, events, config);
    let run = tokio::spawn(manager.run());

    Harness {
        handle,
        signaling,
        states,
        query,
        _sink: sink,
        _run: run,
    }
}

impl Harness {
    fn trace(&self) -> Vec<String> {
        self.states.lock().unwrap().clone()
    }

    async fn dial(&self, digits: &str) {
        for d in digits.chars() {
            let digit = d.to_digit(10).unwrap() as u8;
            self.handle.digits.send(digit).await.unwrap();
        }
    }

    async fn wait_for_active_handle(&self) -> rotary_signaling::CallHandle {
        for _ in 0..50 {
            if let Some(handle) = self.signaling.active_handle() {
                return handle;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("signalling client never reported an active call");
    }
}

#[tokio::test]
async fn speed_dial_outbound_call_completes() {
    let harness = harness(
        vec![],
        HashMap::from([("1".to_string(), "+15551234567".to_string())]),
    )
    .await;

    harness.handle.hook.send(HookEvent::OnPickup).await.unwrap();
    harness.dial("1").await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let call = harness.wait_for_active_handle().await;
    harness.signaling.simulate_remote_answer(call).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    harness.signaling.simulate_remote_hangup(call).unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    harness.handle.hook.send(HookEvent::OnHangup).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(
        harness.trace(),
        vec!["OffHookWaiting", "Dialing", "Validating", "Calling", "Connected", "Idle"]
    );

    let records = harness.query.list(10, 0).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.direction, Direction::Outbound);
    assert_eq!(record.status, CallStatus::Completed);
    assert_eq!(record.speed_dial_code.as_deref(), Some("1"));
    assert_eq!(record.destination.as_deref(), Some("+15551234567"));
}

#[tokio::test]
async fn blocked_destination_never_reaches_signalling() {
    let harness = harness(vec!["+15551234567".to_string()], HashMap::new()).await;

    harness.handle.hook.send(HookEvent::OnPickup).await.unwrap();
    harness.dial("15559999999").await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(harness.trace(), vec!["OffHookWaiting", "Dialing", "Validating", "Error"]);
    assert!(harness.signaling.active_handle().is_none());

    let records = harness.query.list(10, 0).await.unwrap();
    assert_eq!(records.len(), 0, "a policy rejection must never open a call record");

    harness.handle.hook.send(HookEvent::OnHangup).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(harness.trace().last().unwrap(), "Idle");
}

#[tokio::test]
async fn inbound_call_answered_then_hung_up_is_completed() {
    let harness = harness(vec![], HashMap::new()).await;

    let call = harness.signaling.simulate_incoming("+15551234567").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.trace(), vec!["Ringing"]);

    harness.handle.hook.send(HookEvent::OnPickup).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.trace(), vec!["Ringing", "Connected"]);

    harness.signaling.simulate_remote_hangup(call).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.handle.hook.send(HookEvent::OnHangup).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.trace(), vec!["Ringing", "Connected", "Idle"]);

    let records = harness.query.list(10, 0).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].direction, Direction::Inbound);
    assert_eq!(records[0].caller_id.as_deref(), Some("+15551234567"));
    assert_eq!(records[0].status, CallStatus::Completed);
}

#[tokio::test]
async fn inbound_call_cancelled_before_pickup_is_missed() {
    let harness = harness(vec![], HashMap::new()).await;

    let call = harness.signaling.simulate_incoming("+15559998888").unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.signaling.simulate_remote_hangup(call).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(harness.trace(), vec!["Ringing", "Idle"]);

    let records = harness.query.list(10, 0).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, CallStatus::Missed);
    assert_eq!(records[0].duration_seconds, 0);
}

#[tokio::test]
async fn hangup_mid_dialling_clears_buffer_without_a_record() {
    let harness = harness(vec!["*".to_string()], HashMap::new()).await;

    harness.handle.hook.send(HookEvent::OnPickup).await.unwrap();
    harness.dial("5").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    harness.handle.hook.send(HookEvent::OnHangup).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(harness.trace(), vec!["OffHookWaiting", "Dialing", "Idle"]);
    assert!(harness.query.list(10, 0).await.unwrap().is_empty());
    assert!(harness.signaling.active_handle().is_none());
}

#[tokio::test]
async fn call_setup_timeout_moves_calling_to_error() {
    let gpio = Arc::new(MockGpio::new());
    let audio: Arc<dyn AudioSink> = Arc::new(MockAudioSink::new(Duration::from_millis(5)));
    let ringer = Arc::new(
        Ringer::new(gpio, 27, audio.clone(), "ring.wav", Duration::from_millis(30), Duration::from_millis(20))
            .unwrap(),
    );
    let signaling = Arc::new(SimulatedSignalingClient::new());
    let events = EventBus::new(256);
    let states = Arc::new(Mutex::new(Vec::new()));
    let mut sub = events.subscribe();
    let states_task = states.clone();
    tokio::spawn(async move {
        while let Some(event) = sub.recv().await {
            if let DomainEvent::PhoneStateChanged { new, .. } = event {
                states_task.lock().unwrap().push(new);
            }
        }
    });

    let config = CallCoreConfig {
        speed_dial: HashMap::new(),
        allowlist: vec!["*".to_string()],
        inter_digit_timeout: Duration::from_millis(50),
        call_attempt_timeout: Duration::from_millis(80),
        dial_tone_path: "dial.wav".into(),
        busy_tone_path: "busy.wav".into(),
        error_tone_path: "error.wav".into(),
    };
    let (manager, handle) = build(signaling.clone(), ringer, audio, events, config);
    tokio::spawn(manager.run());

    handle.hook.send(HookEvent::OnPickup).await.unwrap();
    for d in "9".chars() {
        handle.digits.send(d.to_digit(10).unwrap() as u8).await.unwrap();
    }
    // Never simulate an answer: the call-attempt timeout alone must fire.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let trace = states.lock().unwrap().clone();
    assert_eq!(trace, vec!["OffHookWaiting", "Dialing", "Validating", "Calling", "Error"]);
}

#[allow(dead_code)]
fn assert_state(_s: PhoneState) {}
