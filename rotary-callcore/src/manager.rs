//! The call manager: the state machine that coordinates the dial reader,
//! hook monitor, ringer, and signalling client, applies dialling policy, and
//! is the sole publisher on the domain event bus.
//!
//! Every external input — a decoded digit, a debounced hook transition, a
//! signalling callback, a timer firing — arrives on one of a small number of
//! bounded channels owned by this struct and is processed to completion
//! before the next input is read. This single-threaded-by-construction
//! design (one `run` loop, one `tokio::select!`) is what makes the
//! transition table a total function over any interleaving of inputs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rotary_dial::HookEvent;
use rotary_events::{CallStatus, CloseCallRecord, DomainEvent, EventBus, NewCallRecord};
use rotary_ringer::{AudioSink, Ringer};
use rotary_signaling::{CallHandle, CallState as SipCallState, EndCause, SignalingClient};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::policy::{resolve_destination, Resolution};
use crate::state::PhoneState;

const MAX_DIGITS: usize = 20;
const DIGIT_CHANNEL_CAPACITY: usize = 32;
const HOOK_CHANNEL_CAPACITY: usize = 8;
const SIGNAL_CHANNEL_CAPACITY: usize = 32;
const CONFIG_RELOAD_CHANNEL_CAPACITY: usize = 4;

/// Default call-setup timeout, per spec.md §5's "`call_attempt_timeout`
/// after which `Calling` transitions to `Error` even without signalling
/// feedback" — the row spec.md §4.6 doesn't spell out explicitly.
pub const DEFAULT_CALL_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default inter-digit timeout: how long `Dialing` waits after the last
/// pulse before resolving the buffer.
pub const DEFAULT_INTER_DIGIT_TIMEOUT: Duration = Duration::from_secs(2);

/// The subset of the configuration document the call manager needs: dialling
/// policy and the timers/audio it drives directly. Built by the process
/// controller from the validated configuration document.
#[derive(Debug, Clone)]
pub struct CallCoreConfig {
    pub speed_dial: HashMap<String, String>,
    pub allowlist: Vec<String>,
    pub inter_digit_timeout: Duration,
    pub call_attempt_timeout: Duration,
    pub dial_tone_path: String,
    pub busy_tone_path: String,
    pub error_tone_path: String,
}

struct CurrentRecord {
    id: i64,
    answered_at: Option<Instant>,
}

enum SignalInput {
    Incoming { handle: CallHandle, caller_id: String },
    StateChanged { handle: CallHandle, state: SipCallState },
}

/// A validated configuration re-read, pushed in by the process controller on
/// `SIGHUP`. `changed_sections` names the sections that actually differ from
/// the configuration currently in effect (per `rotary_config::diff_sections`)
/// — the call manager publishes `ConfigChanged` for exactly these, since it
/// is the bus's sole publisher and a no-op re-read must stay silent.
pub struct ConfigReload {
    pub config: CallCoreConfig,
    pub changed_sections: Vec<String>,
}

/// The other end of a [`CallManager`]: channel handles owned by whatever
/// forwards hardware/timer/signalling input into it (the process
/// controller), plus a shutdown switch.
pub struct CallManagerHandle {
    pub digits: mpsc::Sender<u8>,
    pub hook: mpsc::Sender<HookEvent>,
    pub config_reload: mpsc::Sender<ConfigReload>,
    shutdown: watch::Sender<bool>,
}

impl CallManagerHandle {
    pub fn request_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

pub struct CallManager<S: SignalingClient + 'static> {
    state: PhoneState,
    buffer: String,
    config: CallCoreConfig,
    signaling: Arc<S>,
    ringer: Arc<Ringer>,
    audio: Arc<dyn AudioSink>,
    events: EventBus,
    next_record_id: i64,
    current_record: Option<CurrentRecord>,
    active_call: Option<CallHandle>,
    last_error: Option<String>,
    tone_task: Option<JoinHandle<()>>,
    inter_digit_deadline: Option<Instant>,
    call_attempt_deadline: Option<Instant>,
    digit_rx: mpsc::Receiver<u8>,
    hook_rx: mpsc::Receiver<HookEvent>,
    signal_rx: mpsc::Receiver<SignalInput>,
    config_reload_rx: mpsc::Receiver<ConfigReload>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Construct a call manager and the handle used to feed it. Registers the
/// signalling client's callbacks so every inbound call / call-state
/// transition is forwarded onto the manager's own input queue rather than
/// held as a back-reference, per the ownership-cycle design note.
pub fn build<S: SignalingClient + 'static>(
    signaling: Arc<S>,
    ringer: Arc<Ringer>,
    audio: Arc<dyn AudioSink>,
    events: EventBus,
    config: CallCoreConfig,
) -> (CallManager<S>, CallManagerHandle) {
    let (digit_tx, digit_rx) = mpsc::channel(DIGIT_CHANNEL_CAPACITY);
    let (hook_tx, hook_rx) = mpsc::channel(HOOK_CHANNEL_CAPACITY);
    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);
    let (config_reload_tx, config_reload_rx) = mpsc::channel(CONFIG_RELOAD_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let incoming_tx = signal_tx.clone();
    signaling.on_incoming(Box::new(move |handle, caller_id| {
        if incoming_tx
            .try_send(SignalInput::Incoming { handle, caller_id })
            .is_err()
        {
            tracing::error!("call manager input queue full, dropped incoming-call notification");
        }
    }));
    let state_tx = signal_tx.clone();
    signaling.on_call_state(Box::new(move |handle, state| {
        if state_tx
            .try_send(SignalInput::StateChanged { handle, state })
            .is_err()
        {
            tracing::error!("call manager input queue full, dropped call-state notification");
        }
    }));

    let manager = CallManager {
        state: PhoneState::Idle,
        buffer: String::new(),
        config,
        signaling,
        ringer,
        audio,
        events,
        next_record_id: 1,
        current_record: None,
        active_call: None,
        last_error: None,
        tone_task: None,
        inter_digit_deadline: None,
        call_attempt_deadline: None,
        digit_rx,
        hook_rx,
        signal_rx,
        config_reload_rx,
        shutdown_rx,
    };
    let handle = CallManagerHandle {
        digits: digit_tx,
        hook: hook_tx,
        config_reload: config_reload_tx,
        shutdown: shutdown_tx,
    };
    (manager, handle)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending().await,
    }
}

impl<S: SignalingClient + 'static> CallManager<S> {
    pub fn state(&self) -> PhoneState {
        self.state
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Drive the state machine until shutdown is requested or every input
    /// channel has closed.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("call manager shutting down");
                        break;
                    }
                }
                Some(event) = self.hook_rx.recv() => {
                    self.handle_hook(event).await;
                }
                Some(input) = self.signal_rx.recv() => {
                    self.handle_signal_input(input).await;
                }
                Some(digit) = self.digit_rx.recv() => {
                    self.handle_digit(digit).await;
                }
                Some(reload) = self.config_reload_rx.recv() => {
                    self.handle_config_reload(reload);
                }
                () = sleep_until_opt(self.inter_digit_deadline) => {
                    self.handle_inter_digit_timeout().await;
                }
                () = sleep_until_opt(self.call_attempt_deadline) => {
                    self.handle_call_attempt_timeout().await;
                }
                else => break,
            }
        }
    }

    /// Apply a validated configuration re-read and publish `ConfigChanged`
    /// for exactly the sections the controller reported as differing. A
    /// re-read that changed nothing publishes nothing.
    fn handle_config_reload(&mut self, reload: ConfigReload) {
        self.config = reload.config;
        for section in reload.changed_sections {
            self.events.publish(DomainEvent::ConfigChanged { section });
        }
    }

    fn transition_to(&mut self, new: PhoneState) {
        if self.state == new {
            return;
        }
        let old = self.state;
        self.state = new;
        let current_number = if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.clone())
        };
        let error = if new == PhoneState::Error {
            self.last_error.clone()
        } else {
            None
        };
        self.events.publish(DomainEvent::PhoneStateChanged {
            old: old.label().to_string(),
            new: new.label().to_string(),
            current_number,
            error,
        });
    }

    fn play_tone(&mut self, path: String) {
        self.stop_tone();
        let audio = self.audio.clone();
        self.tone_task = Some(tokio::spawn(async move {
            if let Err(err) = audio.play(&path).await {
                warn!(?err, "tone playback failed");
            }
        }));
    }

    fn stop_tone(&mut self) {
        if let Some(task) = self.tone_task.take() {
            task.abort();
        }
    }

    fn open_outbound_record(&mut self, dialed_number: String, destination: String, speed_dial_code: Option<String>) {
        let id = self.next_record_id;
        self.next_record_id += 1;
        self.current_record = Some(CurrentRecord { id, answered_at: None });
        let new = NewCallRecord {
            direction: rotary_events::Direction::Outbound,
            caller_id: None,
            dialed_number: Some(dialed_number),
            destination: Some(destination),
            speed_dial_code,
        };
        self.events.publish(new.into_event(id));
        self.events.publish(DomainEvent::CallLogUpdated { record_id: id });
    }

    fn open_inbound_record(&mut self, caller_id: String) {
        let id = self.next_record_id;
        self.next_record_id += 1;
        self.current_record = Some(CurrentRecord { id, answered_at: None });
        let new = NewCallRecord {
            direction: rotary_events::Direction::Inbound,
            caller_id: Some(caller_id),
            dialed_number: None,
            destination: None,
            speed_dial_code: None,
        };
        self.events.publish(new.into_event(id));
        self.events.publish(DomainEvent::CallLogUpdated { record_id: id });
    }

    fn close_record(&mut self, status: CallStatus, error_message: Option<String>) {
        if let Some(record) = self.current_record.take() {
            let duration_seconds = match (status, record.answered_at) {
                (CallStatus::Completed, Some(answered_at)) => answered_at.elapsed().as_secs() as i64,
                _ => 0,
            };
            let close = CloseCallRecord {
                status,
                duration_seconds,
                error_message,
            };
            self.events.publish(close.into_event(record.id));
            self.events.publish(DomainEvent::CallLogUpdated { record_id: record.id });
        }
    }

    async fn handle_hook(&mut self, event: HookEvent) {
        match event {
            HookEvent::OnPickup => self.handle_hook_pickup().await,
            HookEvent::OnHangup => self.handle_hook_hangup().await,
        }
    }

    async fn handle_hook_pickup(&mut self) {
        match self.state {
            PhoneState::Ringing if self.active_call.is_some() => {
                let handle = self.active_call.expect("checked Some above");
                if let Err(err) = self.signaling.answer(handle).await {
                    warn!(?err, "failed to answer inbound call");
                }
                self.ringer.stop();
                if let Some(record) = self.current_record.as_mut() {
                    record.answered_at = Some(Instant::now());
                }
                self.transition_to(PhoneState::Connected);
            }
            PhoneState::Idle => {
                self.transition_to(PhoneState::OffHookWaiting);
                self.play_tone(self.config.dial_tone_path.clone());
            }
            _ => {
                // Already off-hook (or ringing with no call attached, which
                // shouldn't happen): a pickup edge here is spurious.
            }
        }
    }

    async fn handle_hook_hangup(&mut self) {
        match self.state {
            PhoneState::Idle | PhoneState::Ringing => {
                // On-hook already; a still-ringing phone's own hook can't be
                // the thing that ends the call (spec.md leaves this
                // undefined — treated as a no-op).
            }
            _ => self.hangup_and_reset().await,
        }
    }

    async fn hangup_and_reset(&mut self) {
        self.stop_tone();
        self.ringer.stop();
        if let Some(handle) = self.active_call.take() {
            if let Err(err) = self.signaling.hangup(handle).await {
                warn!(?err, "failed to hang up active call");
            }
        }
        if self.current_record.is_some() {
            let status = if self.state == PhoneState::Connected {
                CallStatus::Completed
            } else {
                CallStatus::Failed
            };
            let error = (status == CallStatus::Failed).then(|| "call ended by local hang-up".to_string());
            self.close_record(status, error);
        }
        self.buffer.clear();
        self.inter_digit_deadline = None;
        self.call_attempt_deadline = None;
        self.last_error = None;
        self.transition_to(PhoneState::Idle);
    }

    fn emit_digit_dialed(&mut self, digit: u8) {
        self.events.publish(DomainEvent::DigitDialed {
            digit,
            number_so_far: self.buffer.clone(),
        });
    }

    fn rearm_inter_digit_timer(&mut self) {
        self.inter_digit_deadline = Some(Instant::now() + self.config.inter_digit_timeout);
    }

    async fn handle_digit(&mut self, digit: u8) {
        match self.state {
            PhoneState::OffHookWaiting => {
                self.stop_tone();
                self.buffer.push_str(&digit.to_string());
                self.transition_to(PhoneState::Dialing);
                self.rearm_inter_digit_timer();
                self.emit_digit_dialed(digit);
            }
            PhoneState::Dialing => {
                if self.buffer.len() < MAX_DIGITS {
                    self.buffer.push_str(&digit.to_string());
                    self.emit_digit_dialed(digit);
                }
                // Beyond the bound: silently discard, but still re-arm.
                self.rearm_inter_digit_timer();
            }
            _ => {
                // A pulse outside an active dialling session is spurious
                // (off-normal contact noise); ignore.
            }
        }
    }

    async fn handle_inter_digit_timeout(&mut self) {
        self.inter_digit_deadline = None;
        if self.state != PhoneState::Dialing || self.buffer.is_empty() {
            return;
        }
        self.transition_to(PhoneState::Validating);
        match resolve_destination(&self.buffer, &self.config.speed_dial, &self.config.allowlist) {
            Resolution::NotPermitted => {
                self.last_error = Some(format!("destination '{}' is not permitted", self.buffer));
                self.play_tone(self.config.error_tone_path.clone());
                self.transition_to(PhoneState::Error);
            }
            Resolution::SpeedDial { destination, code } => {
                self.start_outbound_call(destination, Some(code)).await;
            }
            Resolution::Allowed { destination } => {
                self.start_outbound_call(destination, None).await;
            }
        }
    }

    async fn start_outbound_call(&mut self, destination: String, speed_dial_code: Option<String>) {
        let dialed = self.buffer.clone();
        self.open_outbound_record(dialed, destination.clone(), speed_dial_code);
        self.call_attempt_deadline = Some(Instant::now() + self.config.call_attempt_timeout);
        self.transition_to(PhoneState::Calling);
        match self.signaling.place_call(&destination).await {
            Ok(handle) => self.active_call = Some(handle),
            Err(err) => {
                warn!(?err, "place_call failed immediately");
                self.call_attempt_deadline = None;
                let message = format!("call setup failed: {err}");
                self.close_record(CallStatus::Failed, Some(message.clone()));
                self.last_error = Some(message);
                self.play_tone(self.config.error_tone_path.clone());
                self.transition_to(PhoneState::Error);
            }
        }
    }

    async fn handle_call_attempt_timeout(&mut self) {
        self.call_attempt_deadline = None;
        if self.state != PhoneState::Calling {
            return;
        }
        if let Some(handle) = self.active_call.take() {
            let _ = self.signaling.hangup(handle).await;
        }
        self.close_record(CallStatus::Failed, Some("call setup timed out".to_string()));
        self.last_error = Some("call setup timed out".to_string());
        self.play_tone(self.config.error_tone_path.clone());
        self.transition_to(PhoneState::Error);
    }

    async fn handle_signal_input(&mut self, input: SignalInput) {
        match input {
            SignalInput::Incoming { handle, caller_id } => {
                self.handle_incoming_call(handle, caller_id).await
            }
            SignalInput::StateChanged { handle, state } => {
                self.handle_call_state(handle, state).await
            }
        }
    }

    async fn handle_incoming_call(&mut self, handle: CallHandle, caller_id: String) {
        if self.state != PhoneState::Idle {
            if let Err(err) = self.signaling.reject(handle).await {
                warn!(?err, "failed to reject incoming call while busy");
            }
            return;
        }
        self.active_call = Some(handle);
        self.open_inbound_record(caller_id);
        self.ringer.ring();
        self.transition_to(PhoneState::Ringing);
    }

    async fn handle_call_state(&mut self, handle: CallHandle, new_state: SipCallState) {
        if self.active_call != Some(handle) {
            return;
        }
        match (self.state, new_state) {
            (PhoneState::Calling, SipCallState::Connected) => {
                if let Some(record) = self.current_record.as_mut() {
                    record.answered_at = Some(Instant::now());
                }
                self.call_attempt_deadline = None;
                self.transition_to(PhoneState::Connected);
            }
            (PhoneState::Calling, SipCallState::Ended(cause)) => {
                self.call_attempt_deadline = None;
                self.active_call = None;
                let message = describe_cause(cause);
                self.close_record(CallStatus::Failed, Some(message.clone()));
                self.last_error = Some(message);
                let tone = if cause == EndCause::Busy {
                    self.config.busy_tone_path.clone()
                } else {
                    self.config.error_tone_path.clone()
                };
                self.play_tone(tone);
                self.transition_to(PhoneState::Error);
            }
            (PhoneState::Ringing, SipCallState::Ended(_cause)) => {
                self.active_call = None;
                self.ringer.stop();
                self.close_record(CallStatus::Missed, None);
                self.transition_to(PhoneState::Idle);
            }
            (PhoneState::Connected, SipCallState::Ended(_cause)) => {
                self.active_call = None;
                self.close_record(CallStatus::Completed, None);
                // PhoneState deliberately stays Connected: the local
                // handset hasn't hung up yet (real POTS behaviour is
                // silence/fast-busy until the receiver is replaced).
            }
            _ => {
                // Transient per-call states (Ringing, EarlyMedia, Answered)
                // on the signalling side require no action here.
            }
        }
    }
}

fn describe_cause(cause: EndCause) -> String {
    match cause {
        EndCause::Normal => "call ended normally".to_string(),
        EndCause::Busy => "destination busy".to_string(),
        EndCause::NoAnswer => "no answer".to_string(),
        EndCause::Rejected => "call rejected".to_string(),
        EndCause::NetworkError => "network error".to_string(),
    }
}
