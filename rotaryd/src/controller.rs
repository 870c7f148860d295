//! Wires every component together: loads and validates the configuration,
//! builds the GPIO/audio backends (real or mock depending on the `hardware`
//! feature), starts the dial reader, hook monitor, ringer, SIP signalling
//! client, event bus, and persistence sink, and drives the call manager
//! until a termination signal arrives.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rotary_callcore::{build, CallCoreConfig, ConfigReload};
use rotary_config::{diff_sections, PhoneConfig};
use rotary_dial::{DialReader, DialTiming, HookMonitor};
use rotary_events::{EventBus, PersistenceSink};
use rotary_gpio::GpioPort;
use rotary_ringer::{AudioSink, Ringer};
use rotary_signaling::sip::SipSignalingClient;
use rotary_signaling::{SignalingClient, SipConfig, SipCredential};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::RotarydError;
use crate::signals::{spawn_listener, ControlSignal};

pub struct Controller {
    config_path: PathBuf,
    db_path: PathBuf,
}

impl Controller {
    pub fn new(config_path: PathBuf, db_path: PathBuf) -> Self {
        Self { config_path, db_path }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = load_config(&self.config_path)?;
        let signaling = build_signaling_client(&config).await?;
        let gpio = build_gpio()?;
        let audio = build_audio_sink()?;
        let signals = spawn_listener()?;

        self.run_with_backend(config, signaling, gpio, audio, signals).await
    }

    /// The wiring and lifecycle loop shared by the real binary and the
    /// integration test suite. Everything that talks to physical hardware,
    /// the network, or the OS signal table is passed in already constructed,
    /// so a test can substitute `SimulatedSignalingClient`/`MockGpio` and a
    /// channel it drives by hand in place of `spawn_listener`.
    pub async fn run_with_backend<S: SignalingClient + 'static>(
        self,
        mut config: PhoneConfig,
        signaling: Arc<S>,
        gpio: Arc<dyn GpioPort>,
        audio: Arc<dyn AudioSink>,
        mut signals: mpsc::Receiver<ControlSignal>,
    ) -> anyhow::Result<()> {
        info!(sip_host = %config.sip.server_host, "configuration loaded");

        let ringer = Arc::new(
            Ringer::new(
                gpio.clone(),
                config.hardware.ringer_enable_pin,
                audio.clone(),
                config.audio.ring_file.clone(),
                Duration::from_millis(config.timing.ring_on_ms),
                Duration::from_millis(config.timing.ring_off_ms),
            )
            .map_err(|e| RotarydError::Hardware(e.to_string()))?,
        );

        let events = EventBus::default();
        let db_url = format!("sqlite://{}?mode=rwc", self.db_path.display());
        let sink = PersistenceSink::connect(&db_url, &events)
            .await
            .map_err(|e| RotarydError::Hardware(format!("failed to open call-log database: {e}")))?;

        signaling
            .register()
            .await
            .map_err(|e| RotarydError::Signaling(e.to_string()))?;

        let (manager, handle) = build(
            signaling.clone(),
            ringer,
            audio,
            events.clone(),
            to_call_core_config(&config),
        );
        let manager_task = tokio::spawn(manager.run());

        // The dial reader and hook monitor send straight into the call
        // manager's own input queues; nothing in this binary forwards
        // between intermediate channels.
        let _dial_reader = DialReader::start(
            gpio.clone(),
            config.hardware.pulse_pin,
            DialTiming {
                pulse_timeout: Duration::from_millis(config.timing.pulse_timeout_ms),
                debounce_window: rotary_dial::DEFAULT_DEBOUNCE_WINDOW,
            },
            handle.digits.clone(),
        )
        .map_err(|e| RotarydError::Hardware(e.to_string()))?;
        let _hook_monitor = HookMonitor::start(
            gpio.clone(),
            config.hardware.hook_pin,
            Duration::from_millis(config.timing.hook_debounce_ms),
            handle.hook.clone(),
        )
        .map_err(|e| RotarydError::Hardware(e.to_string()))?;

        while let Some(signal) = signals.recv().await {
            match signal {
                ControlSignal::Shutdown => {
                    info!("shutting down");
                    handle.request_shutdown();
                    break;
                }
                ControlSignal::Reload => match load_config(&self.config_path) {
                    Ok(new_config) => {
                        let changed = diff_sections(&config, &new_config);
                        if changed.is_empty() {
                            info!("configuration re-read: no changes");
                        } else {
                            info!(?changed, "configuration changed, applying");
                            let reload = ConfigReload {
                                config: to_call_core_config(&new_config),
                                changed_sections: changed.iter().map(ToString::to_string).collect(),
                            };
                            if handle.config_reload.send(reload).await.is_err() {
                                warn!("call manager already gone, dropping configuration reload");
                            }
                            config = new_config;
                        }
                    }
                    Err(err) => error!(%err, "configuration re-read failed, keeping previous configuration"),
                },
            }
        }

        manager_task.await.ok();
        if let Err(err) = signaling.shutdown().await {
            warn!(?err, "signalling client shutdown reported an error");
        }
        sink.shutdown().await;
        Ok(())
    }
}

fn load_config(path: &Path) -> anyhow::Result<PhoneConfig> {
    let config = PhoneConfig::load(path).map_err(RotarydError::Config)?;
    Ok(config)
}

fn to_call_core_config(config: &PhoneConfig) -> CallCoreConfig {
    CallCoreConfig {
        speed_dial: config.speed_dial.clone(),
        allowlist: config.allowlist.clone(),
        inter_digit_timeout: Duration::from_millis(config.timing.inter_digit_timeout_ms),
        call_attempt_timeout: Duration::from_millis(config.timing.call_attempt_timeout_ms),
        dial_tone_path: config.audio.dial_tone_file.clone(),
        busy_tone_path: config.audio.busy_tone_file.clone(),
        error_tone_path: config.audio.error_tone_file.clone(),
    }
}

async fn build_signaling_client(config: &PhoneConfig) -> anyhow::Result<Arc<SipSignalingClient>> {
    let sip_config = SipConfig {
        server_host: config.sip.server_host.clone(),
        server_port: config.sip.server_port,
        user: config.sip.user.clone(),
        credential: SipCredential(config.sip.credential.0.clone()),
        local_port: 0,
        register_interval: Duration::from_secs(config.sip.register_interval_secs),
        registration_timeout: Duration::from_secs(config.sip.registration_timeout_secs),
    };
    let client = SipSignalingClient::new(sip_config)
        .await
        .map_err(|e| RotarydError::Signaling(e.to_string()))?;
    Ok(client)
}

#[cfg(feature = "hardware")]
fn build_gpio() -> anyhow::Result<Arc<dyn GpioPort>> {
    let gpio = rotary_gpio::HardwareGpio::new().map_err(|e| RotarydError::Hardware(e.to_string()))?;
    Ok(Arc::new(gpio))
}

#[cfg(not(feature = "hardware"))]
fn build_gpio() -> anyhow::Result<Arc<dyn GpioPort>> {
    Ok(Arc::new(rotary_gpio::MockGpio::new()))
}

#[cfg(feature = "hardware")]
fn build_audio_sink() -> anyhow::Result<Arc<dyn AudioSink>> {
    let sink = rotary_ringer::RodioSink::new().map_err(|e| RotarydError::Hardware(e.to_string()))?;
    Ok(Arc::new(sink))
}

#[cfg(not(feature = "hardware"))]
fn build_audio_sink() -> anyhow::Result<Arc<dyn AudioSink>> {
    Ok(Arc::new(rotary_ringer::MockAudioSink::new(Duration::from_millis(50))))
}
