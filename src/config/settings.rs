//! Application settings structs, defaults, validation and TOML loading.
//!
//! The `[audio]` section is mandatory: capture cannot start without explicit
//! device parameters, so [`AppConfig::load_from`] fails on a missing or
//! malformed file.  The `[processing]` section is read separately by
//! [`ProcessingConfig::load_or_default`], which never fails and falls back to
//! built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Why a configuration file could not be turned into a usable [`AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Parameters parsed fine but are out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// SampleFormat
// ---------------------------------------------------------------------------

/// Sample encoding requested from the input device.
///
/// Integer formats are converted to `f32` in `[-1.0, 1.0]` while the capture
/// callback copies the driver buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    #[serde(alias = "float32")]
    F32,
    #[serde(alias = "int16")]
    I16,
    #[serde(alias = "uint16")]
    U16,
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self::F32
    }
}

impl SampleFormat {
    pub fn to_cpal(self) -> cpal::SampleFormat {
        match self {
            SampleFormat::F32 => cpal::SampleFormat::F32,
            SampleFormat::I16 => cpal::SampleFormat::I16,
            SampleFormat::U16 => cpal::SampleFormat::U16,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Hardware capture parameters.  All fields except `device` are required in
/// the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Samples per channel delivered by each hardware callback.
    pub block_size: u32,
    pub sample_format: SampleFormat,
    /// Input device name; `None` selects the host's default input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            block_size: 1_024,
            sample_format: SampleFormat::F32,
            device: None,
        }
    }
}

impl AudioConfig {
    /// Number of interleaved samples in one [`crate::audio::AudioFrame`].
    pub fn frame_len(&self) -> usize {
        self.block_size as usize * self.channels as usize
    }

    /// Check that every parameter is positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("audio.sample_rate must be > 0".into()));
        }
        if self.channels == 0 {
            return Err(ConfigError::Invalid("audio.channels must be > 0".into()));
        }
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("audio.block_size must be > 0".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ProcessingConfig
// ---------------------------------------------------------------------------

/// DSP parameters used by the processing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Spectral-gate threshold; bins with magnitude at or below it are zeroed.
    pub noise_threshold: f32,
    /// Low-pass cutoff in Hz applied after gating.
    pub low_pass_cutoff: f64,
    /// Butterworth order of the low-pass stage.
    pub filter_order: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 0.02,
            low_pass_cutoff: 4_000.0,
            filter_order: crate::dsp::DEFAULT_FILTER_ORDER,
        }
    }
}

/// Only the `[processing]` table of the settings file.
#[derive(Deserialize)]
struct ProcessingSection {
    processing: ProcessingConfig,
}

impl ProcessingConfig {
    /// Read the `[processing]` table from `path`.
    ///
    /// Any failure (missing file, bad TOML, missing table) is logged and the
    /// defaults are returned instead.
    pub fn load_or_default(path: &Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .map_err(ConfigError::from)
            .and_then(|content| Ok(toml::from_str::<ProcessingSection>(&content)?));

        match parsed {
            Ok(section) => section.processing,
            Err(e) => {
                log::warn!(
                    "processing config unavailable at {} ({e}); using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Replace parameters that cannot work at `sample_rate` with defaults.
    ///
    /// The cutoff must sit strictly below Nyquist.  When even the default
    /// cutoff does not fit (very low sample rates) it is placed at 45 % of
    /// the sample rate.
    pub fn sanitized(mut self, sample_rate: u32) -> Self {
        let defaults = Self::default();
        let nyquist = 0.5 * sample_rate as f64;

        if !self.noise_threshold.is_finite() || self.noise_threshold < 0.0 {
            log::warn!(
                "noise_threshold {} is invalid; using {}",
                self.noise_threshold,
                defaults.noise_threshold
            );
            self.noise_threshold = defaults.noise_threshold;
        }

        let cutoff_ok = |c: f64| c > 0.0 && c < nyquist;
        if !cutoff_ok(self.low_pass_cutoff) {
            let fallback = if cutoff_ok(defaults.low_pass_cutoff) {
                defaults.low_pass_cutoff
            } else {
                0.45 * sample_rate as f64
            };
            log::warn!(
                "low_pass_cutoff {} Hz is not below Nyquist ({nyquist} Hz); using {fallback} Hz",
                self.low_pass_cutoff
            );
            self.low_pass_cutoff = fallback;
        }

        if self.filter_order == 0 {
            log::warn!("filter_order 0 is invalid; using {}", defaults.filter_order);
            self.filter_order = defaults.filter_order;
        }

        self
    }
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

/// Capacities of the two bounded queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capture → pipeline.
    pub inbound_capacity: usize,
    /// Pipeline → dashboard.
    pub outbound_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 100,
            outbound_capacity: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Dashboard appearance and refresh settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Repaint interval in milliseconds.
    pub refresh_ms: u64,
    /// SNR below this value is shown as `CRITICAL`.
    pub snr_warning_db: f64,
    /// Initial window size `(width, height)` in points.
    pub window_size: (f32, f32),
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            refresh_ms: 30,
            snr_warning_db: 5.0,
            window_size: (1_000.0, 800.0),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```toml
/// [audio]
/// sample_rate = 16000
/// channels = 1
/// block_size = 1024
/// sample_format = "f32"
///
/// [processing]
/// noise_threshold = 0.02
/// low_pass_cutoff = 4000.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub audio: AudioConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            processing: ProcessingConfig::default(),
            queues: QueueConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the platform-appropriate `settings.toml`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    ///
    /// Unlike the processing section, the capture parameters have no
    /// fallback: a missing file is [`ConfigError::NotFound`].
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate everything capture depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        if self.queues.inbound_capacity == 0 || self.queues.outbound_capacity == 0 {
            return Err(ConfigError::Invalid("queue capacities must be > 0".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
        [audio]
        sample_rate = 44100
        channels = 1
        block_size = 512
        sample_format = "float32"
    "#;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).expect("write");
        path
    }

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let mut original = AppConfig::default();
        original.audio.sample_format = SampleFormat::I16;
        original.audio.device = Some("USB Mic".into());
        original.processing.noise_threshold = 0.5;
        original.queues.outbound_capacity = 8;
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(loaded, original);
    }

    #[test]
    fn load_missing_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)), "{err}");
    }

    #[test]
    fn load_malformed_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = write(&dir, "bad.toml", "[audio\nsample_rate = ");

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "{err}");
    }

    #[test]
    fn missing_audio_section_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = write(&dir, "no_audio.toml", "[processing]\nnoise_threshold = 0.1\n");

        assert!(matches!(
            AppConfig::load_from(&path).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn minimal_file_fills_optional_sections() {
        let dir = tempdir().expect("temp dir");
        let path = write(&dir, "minimal.toml", MINIMAL);

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.audio.sample_rate, 44_100);
        assert_eq!(cfg.audio.block_size, 512);
        assert_eq!(cfg.audio.sample_format, SampleFormat::F32);
        assert!(cfg.audio.device.is_none());
        assert_eq!(cfg.processing, ProcessingConfig::default());
        assert_eq!(cfg.queues, QueueConfig::default());
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.audio.sample_rate, 16_000);
        assert_eq!(cfg.audio.channels, 1);
        assert_eq!(cfg.audio.block_size, 1_024);
        assert_eq!(cfg.processing.noise_threshold, 0.02);
        assert_eq!(cfg.processing.low_pass_cutoff, 4_000.0);
        assert_eq!(cfg.processing.filter_order, 5);
        assert_eq!(cfg.queues.inbound_capacity, 100);
        assert_eq!(cfg.ui.refresh_ms, 30);
        assert_eq!(cfg.ui.snr_warning_db, 5.0);
    }

    #[test]
    fn frame_len_counts_all_channels() {
        let mut audio = AudioConfig::default();
        assert_eq!(audio.frame_len(), 1_024);

        audio.channels = 2;
        assert_eq!(audio.frame_len(), 2_048);
    }

    #[test]
    fn zero_parameters_rejected() {
        let patches: [fn(&mut AudioConfig); 3] = [
            |a| a.sample_rate = 0,
            |a| a.channels = 0,
            |a| a.block_size = 0,
        ];
        for patch in patches {
            let mut cfg = AppConfig::default();
            patch(&mut cfg.audio);
            assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        }

        let mut cfg = AppConfig::default();
        cfg.queues.inbound_capacity = 0;
        assert!(cfg.validate().is_err());
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn processing_falls_back_when_file_missing() {
        let dir = tempdir().expect("temp dir");
        let cfg = ProcessingConfig::load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(cfg, ProcessingConfig::default());
    }

    #[test]
    fn processing_falls_back_when_file_malformed() {
        let dir = tempdir().expect("temp dir");
        let path = write(&dir, "bad.toml", "processing = [");
        assert_eq!(ProcessingConfig::load_or_default(&path), ProcessingConfig::default());
    }

    #[test]
    fn processing_reads_section_even_without_audio() {
        let dir = tempdir().expect("temp dir");
        let path = write(&dir, "p.toml", "[processing]\nnoise_threshold = 0.3\n");

        let cfg = ProcessingConfig::load_or_default(&path);
        assert_eq!(cfg.noise_threshold, 0.3);
        assert_eq!(cfg.low_pass_cutoff, 4_000.0);
    }

    #[test]
    fn sanitized_keeps_valid_values() {
        let cfg = ProcessingConfig {
            noise_threshold: 0.1,
            low_pass_cutoff: 3_000.0,
            filter_order: 3,
        };
        assert_eq!(cfg.clone().sanitized(16_000), cfg);
    }

    #[test]
    fn sanitized_repairs_out_of_range_values() {
        let cfg = ProcessingConfig {
            noise_threshold: -1.0,
            low_pass_cutoff: 20_000.0,
            filter_order: 0,
        }
        .sanitized(16_000);
        assert_eq!(cfg, ProcessingConfig::default());

        // Default 4 kHz does not fit under an 8 kHz sample rate's Nyquist.
        let low = ProcessingConfig::default().sanitized(8_000);
        assert!((low.low_pass_cutoff - 3_600.0).abs() < 1e-9);
    }

    #[test]
    fn sample_format_maps_to_cpal() {
        assert_eq!(SampleFormat::F32.to_cpal(), cpal::SampleFormat::F32);
        assert_eq!(SampleFormat::I16.to_cpal(), cpal::SampleFormat::I16);
        assert_eq!(SampleFormat::U16.to_cpal(), cpal::SampleFormat::U16);
    }
}
