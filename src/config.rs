//! Configuration
//!
//! All tunables live in serde-friendly structs with sensible defaults so a
//! partial JSON file only needs to name the values it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PhonelineError, Result};

/// Nominal length of one playback session in seconds
pub const TOTAL_DURATION_SECS: f64 = 20.0;

/// Rendering engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Frames rendered per quantum (commands are applied between quanta)
    pub render_quantum: usize,
    /// Control loop rate in ticks per second
    pub tick_rate_hz: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            render_quantum: 128,
            tick_rate_hz: 60.0,
        }
    }
}

impl EngineConfig {
    /// Interval between control ticks in seconds
    pub fn tick_interval_secs(&self) -> f64 {
        1.0 / self.tick_rate_hz
    }
}

/// Degradation topology settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradeConfig {
    /// Bandpass center frequency in Hz
    pub filter_center_hz: f64,
    /// Bandpass quality factor
    pub filter_q: f64,
    /// Echo delay in seconds
    pub delay_time_secs: f64,
    /// Capacity of the delay line in seconds
    pub max_delay_secs: f64,
    /// Time constant for exponential parameter smoothing
    pub smoothing_time_constant_secs: f64,
    /// Length of the looped noise buffer in seconds
    pub noise_buffer_secs: f64,
    /// Fixed seed for the noise bed; drawn from entropy when absent
    pub noise_seed: Option<u64>,
}

impl Default for DegradeConfig {
    fn default() -> Self {
        Self {
            filter_center_hz: 1000.0,
            filter_q: 1.0,
            delay_time_secs: 0.3,
            max_delay_secs: 1.0,
            smoothing_time_constant_secs: 0.1,
            noise_buffer_secs: 2.0,
            noise_seed: None,
        }
    }
}

/// Playback session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Elapsed time at which progress reaches 1.0
    pub total_duration_secs: f64,
    /// Grace period past the nominal duration before a forced stop
    pub safety_margin_secs: f64,
    /// Length of the master fade-in at playback start
    pub fade_in_secs: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            total_duration_secs: TOTAL_DURATION_SECS,
            safety_margin_secs: 1.0,
            fade_in_secs: 0.1,
        }
    }
}

impl PlaybackConfig {
    /// Elapsed time after which a session is stopped regardless of the source
    pub fn safety_bound_secs(&self) -> f64 {
        self.total_duration_secs + self.safety_margin_secs
    }
}

/// Capture collaborator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// How long `stop` waits for the producer before finalizing anyway
    pub finalize_timeout_secs: f64,
    /// Maximum recording length in seconds
    pub max_duration_secs: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            finalize_timeout_secs: 1.0,
            max_duration_secs: TOTAL_DURATION_SECS,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhonelineConfig {
    pub engine: EngineConfig,
    pub degrade: DegradeConfig,
    pub playback: PlaybackConfig,
    pub capture: CaptureConfig,
}

impl PhonelineConfig {
    /// Load configuration from a JSON file, falling back to defaults for missing keys
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PhonelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        fn invalid(reason: String) -> Result<()> {
            Err(PhonelineError::Config { reason })
        }

        if self.engine.sample_rate == 0 {
            return invalid("engine.sample_rate must be positive".to_string());
        }
        if self.engine.render_quantum == 0 {
            return invalid("engine.render_quantum must be positive".to_string());
        }
        if !(self.engine.tick_rate_hz > 0.0) {
            return invalid(format!(
                "engine.tick_rate_hz must be positive, got {}",
                self.engine.tick_rate_hz
            ));
        }
        if !(self.degrade.filter_q > 0.0) {
            return invalid(format!("degrade.filter_q must be positive, got {}", self.degrade.filter_q));
        }
        if !(self.degrade.delay_time_secs > 0.0)
            || self.degrade.delay_time_secs > self.degrade.max_delay_secs
        {
            return invalid(format!(
                "degrade.delay_time_secs must be in (0, {}], got {}",
                self.degrade.max_delay_secs, self.degrade.delay_time_secs
            ));
        }
        if !(self.degrade.smoothing_time_constant_secs > 0.0) {
            return invalid("degrade.smoothing_time_constant_secs must be positive".to_string());
        }
        if !(self.degrade.noise_buffer_secs > 0.0) {
            return invalid("degrade.noise_buffer_secs must be positive".to_string());
        }
        if !(self.playback.total_duration_secs > 0.0) || self.playback.safety_margin_secs < 0.0 {
            return invalid("playback durations must be positive".to_string());
        }
        if self.playback.fade_in_secs < 0.0 {
            return invalid("playback.fade_in_secs must not be negative".to_string());
        }
        if !(self.capture.finalize_timeout_secs > 0.0) || !(self.capture.max_duration_secs > 0.0) {
            return invalid("capture timeouts and durations must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PhonelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.playback.total_duration_secs, 20.0);
        assert_eq!(config.playback.safety_bound_secs(), 21.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PhonelineConfig =
            serde_json::from_str(r#"{ "degrade": { "filter_q": 2.5 } }"#).unwrap();
        assert_eq!(config.degrade.filter_q, 2.5);
        assert_eq!(config.degrade.filter_center_hz, 1000.0);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_json_round_trip_preserves_config() {
        let mut config = PhonelineConfig::default();
        config.degrade.noise_seed = Some(7);
        config.capture.max_duration_secs = 12.0;
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: PhonelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_rejects_delay_beyond_capacity() {
        let mut config = PhonelineConfig::default();
        config.degrade.delay_time_secs = 1.5;
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_validate_rejects_zero_tick_rate() {
        let mut config = PhonelineConfig::default();
        config.engine.tick_rate_hz = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phoneline.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{ "engine": {{ "sample_rate": 44100 }} }}"#).unwrap();

        let config = PhonelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.engine.sample_rate, 44100);
        assert_eq!(config.engine.render_quantum, 128);
    }
}
