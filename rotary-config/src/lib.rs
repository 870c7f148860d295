//! Configuration schema, loading, and validation for the rotary phone core.
//!
//! The core itself never parses a file path — `load` is offered for
//! `rotaryd`'s convenience, but the call manager and its subordinates only
//! ever consume an already-validated [`PhoneConfig`] value, per the core's
//! external-interface contract. Re-reading is expected to be cheap and
//! side-effect-free: [`diff_sections`] compares two validated configs and
//! reports only the sections that actually changed, so a no-op re-read never
//! produces spurious `ConfigChanged` events.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// A secret configuration value (the SIP account password). Its `Debug`
/// impl never prints the contained value — secrets must never appear in
/// logs or events.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(pub String);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SipSection {
    pub server_host: String,
    #[serde(default = "default_sip_port")]
    pub server_port: u16,
    pub user: String,
    pub credential: Secret,
    #[serde(default = "default_register_interval_secs")]
    pub register_interval_secs: u64,
    #[serde(default = "default_registration_timeout_secs")]
    pub registration_timeout_secs: u64,
}

fn default_sip_port() -> u16 {
    5060
}
fn default_register_interval_secs() -> u64 {
    3600
}
fn default_registration_timeout_secs() -> u64 {
    8
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct HardwareSection {
    pub hook_pin: u8,
    pub pulse_pin: u8,
    pub dial_active_pin: Option<u8>,
    pub ringer_enable_pin: u8,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct TimingSection {
    #[serde(default = "default_pulse_timeout_ms")]
    pub pulse_timeout_ms: u64,
    #[serde(default = "default_inter_digit_timeout_ms")]
    pub inter_digit_timeout_ms: u64,
    #[serde(default = "default_hook_debounce_ms")]
    pub hook_debounce_ms: u64,
    #[serde(default = "default_ring_on_ms")]
    pub ring_on_ms: u64,
    #[serde(default = "default_ring_off_ms")]
    pub ring_off_ms: u64,
    #[serde(default = "default_call_attempt_timeout_ms")]
    pub call_attempt_timeout_ms: u64,
}

fn default_pulse_timeout_ms() -> u64 {
    300
}
fn default_inter_digit_timeout_ms() -> u64 {
    2_000
}
fn default_hook_debounce_ms() -> u64 {
    50
}
fn default_ring_on_ms() -> u64 {
    2_000
}
fn default_ring_off_ms() -> u64 {
    4_000
}
fn default_call_attempt_timeout_ms() -> u64 {
    30_000
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            pulse_timeout_ms: default_pulse_timeout_ms(),
            inter_digit_timeout_ms: default_inter_digit_timeout_ms(),
            hook_debounce_ms: default_hook_debounce_ms(),
            ring_on_ms: default_ring_on_ms(),
            ring_off_ms: default_ring_off_ms(),
            call_attempt_timeout_ms: default_call_attempt_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AudioSection {
    pub ring_file: String,
    pub dial_tone_file: String,
    pub busy_tone_file: String,
    pub error_tone_file: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct GainSection {
    #[serde(default = "default_gain")]
    pub mic_gain: f32,
    #[serde(default = "default_gain")]
    pub speaker_volume: f32,
}

fn default_gain() -> f32 {
    1.0
}

/// Permitted call destination; the literal `*` means unrestricted.
pub type AllowlistEntry = String;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PhoneConfig {
    pub sip: SipSection,
    pub hardware: HardwareSection,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub speed_dial: HashMap<String, String>,
    #[serde(default)]
    pub allowlist: Vec<AllowlistEntry>,
    pub audio: AudioSection,
    #[serde(default)]
    pub gain: GainSection,
}

impl Default for GainSection {
    fn default() -> Self {
        Self {
            mic_gain: default_gain(),
            speaker_volume: default_gain(),
        }
    }
}

/// The configuration sections named in [`ConfigSection`]/`ConfigChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Sip,
    Hardware,
    Timing,
    SpeedDial,
    Allowlist,
    Audio,
    Gain,
}

impl fmt::Display for ConfigSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfigSection::Sip => "sip",
            ConfigSection::Hardware => "hardware",
            ConfigSection::Timing => "timing",
            ConfigSection::SpeedDial => "speed_dial",
            ConfigSection::Allowlist => "allowlist",
            ConfigSection::Audio => "audio",
            ConfigSection::Gain => "gain",
        };
        f.write_str(s)
    }
}

impl PhoneConfig {
    /// Parse and validate a configuration document.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> ConfigResult<Self> {
        let config: PhoneConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that violate an invariant the rest of the core
    /// assumes holds (gain range, distinct pins, well-formed speed-dial
    /// codes). Fatal at load time (exit code 1 from the process controller).
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sip.server_host.trim().is_empty() {
            return Err(ConfigError::Validation("sip.server_host must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.gain.mic_gain) {
            return Err(ConfigError::Validation(format!(
                "gain.mic_gain must be within [0.0, 2.0], got {}",
                self.gain.mic_gain
            )));
        }
        if !(0.0..=2.0).contains(&self.gain.speaker_volume) {
            return Err(ConfigError::Validation(format!(
                "gain.speaker_volume must be within [0.0, 2.0], got {}",
                self.gain.speaker_volume
            )));
        }

        let mut pins = vec![self.hardware.hook_pin, self.hardware.pulse_pin, self.hardware.ringer_enable_pin];
        if let Some(dial_active) = self.hardware.dial_active_pin {
            pins.push(dial_active);
        }
        let distinct: std::collections::HashSet<_> = pins.iter().collect();
        if distinct.len() != pins.len() {
            return Err(ConfigError::Validation("hardware pin assignments must be distinct".into()));
        }

        for code in self.speed_dial.keys() {
            if code.is_empty() || code.len() > 2 || !code.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Validation(format!(
                    "speed_dial code {code:?} must be 1-2 decimal digits"
                )));
            }
        }

        Ok(())
    }
}

/// Compare two validated configurations and report which top-level sections
/// differ. An unchanged re-read returns an empty list.
pub fn diff_sections(old: &PhoneConfig, new: &PhoneConfig) -> Vec<ConfigSection> {
    let mut changed = Vec::new();
    if old.sip != new.sip {
        changed.push(ConfigSection::Sip);
    }
    if old.hardware != new.hardware {
        changed.push(ConfigSection::Hardware);
    }
    if old.timing != new.timing {
        changed.push(ConfigSection::Timing);
    }
    if old.speed_dial != new.speed_dial {
        changed.push(ConfigSection::SpeedDial);
    }
    if old.allowlist != new.allowlist {
        changed.push(ConfigSection::Allowlist);
    }
    if old.audio != new.audio {
        changed.push(ConfigSection::Audio);
    }
    if old.gain != new.gain {
        changed.push(ConfigSection::Gain);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"
        [sip]
        server_host = "sip.example.com"
        user = "alice"
        credential = "hunter2"

        [hardware]
        hook_pin = 17
        pulse_pin = 4
        ringer_enable_pin = 27

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

    #[test]
    fn parses_minimal_document_with_defaults() {
        let config = PhoneConfig::parse(sample()).unwrap();
        assert_eq!(config.sip.server_port, 5060);
        assert_eq!(config.timing.pulse_timeout_ms, 300);
        assert_eq!(config.gain.mic_gain, 1.0);
        assert_eq!(config.speed_dial.get("1").unwrap(), "+15551234567");
    }

    #[test]
    fn debug_never_prints_the_credential() {
        let config = PhoneConfig::parse(sample()).unwrap();
        let debug = format!("{:?}", config.sip);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("Secret(***)"));
    }

    #[test]
    fn rejects_out_of_range_gain() {
        let mut config = PhoneConfig::parse(sample()).unwrap();
        config.gain.mic_gain = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_pins() {
        let mut config = PhoneConfig::parse(sample()).unwrap();
        config.hardware.ringer_enable_pin = config.hardware.hook_pin;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unchanged_reread_has_no_diff() {
        let a = PhoneConfig::parse(sample()).unwrap();
        let b = PhoneConfig::parse(sample()).unwrap();
        assert!(diff_sections(&a, &b).is_empty());
    }

    #[test]
    fn changed_gain_section_is_reported_alone() {
        let a = PhoneConfig::parse(sample()).unwrap();
        let mut b = a.clone();
        b.gain.mic_gain = 1.5;
        assert_eq!(diff_sections(&a, &b), vec![ConfigSection::Gain]);
    }
}
