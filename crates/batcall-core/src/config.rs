//! Detection configuration
//!
//! Every field carries a serde default, so a partial TOML file only needs
//! to name the options it changes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Analysis window applied to each STFT frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    #[default]
    Hann,
    Hamming,
    Blackman,
    Rectangular,
}

/// Call detection and measurement options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    // Segmentation
    /// Segment threshold relative to the global spectrogram maximum (dB, <= 0)
    pub call_threshold_db: f64,
    pub min_call_duration_ms: f64,

    // High / low frequency measurement
    pub high_freq_threshold_db: f64,
    pub high_freq_threshold_auto: bool,
    pub low_freq_threshold_db: f64,
    pub low_freq_threshold_auto: bool,
    /// Tail fraction (percent of call duration) searched for the characteristic frequency
    pub characteristic_freq_percent_end: f64,

    // STFT shape
    pub fft_size: usize,
    pub hop_percent: f64,
    pub window_type: WindowType,

    // Anti-rebounce end detection
    #[serde(alias = "enable_backward_end_freq_scan")]
    pub enable_anti_rebounce: bool,
    pub max_frequency_drop_khz: f64,
    pub protection_window_after_peak_ms: f64,

    // High-pass pre-filter
    pub enable_highpass_filter: bool,
    pub highpass_filter_freq_khz: f64,
    pub highpass_filter_freq_auto: bool,
    pub highpass_filter_order: usize,

    // Time-expanded recordings
    pub time_expansion: bool,
    pub time_expansion_factor: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            call_threshold_db: -24.0,
            min_call_duration_ms: 1.0,

            high_freq_threshold_db: -24.0,
            high_freq_threshold_auto: true,
            low_freq_threshold_db: -24.0,
            low_freq_threshold_auto: true,
            characteristic_freq_percent_end: 40.0,

            fft_size: 512,
            hop_percent: 3.125,
            window_type: WindowType::Hann,

            enable_anti_rebounce: true,
            max_frequency_drop_khz: 10.0,
            protection_window_after_peak_ms: 10.0,

            enable_highpass_filter: false,
            highpass_filter_freq_khz: 30.0,
            highpass_filter_freq_auto: true,
            highpass_filter_order: 4,

            time_expansion: false,
            time_expansion_factor: 10.0,
        }
    }
}

impl DetectionConfig {
    /// Parse a TOML document; missing keys fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DetectionConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DetectionConfig = toml::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Hop size in samples: `floor(fft_size * hop_percent / 100)`.
    pub fn hop_size(&self) -> usize {
        (self.fft_size as f64 * self.hop_percent / 100.0).floor() as usize
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.fft_size < 16 {
            return Err(Error::config("fft_size must be >= 16"));
        }
        if !(self.hop_percent > 0.0 && self.hop_percent <= 100.0) {
            return Err(Error::config("hop_percent must be in (0, 100]"));
        }
        if self.hop_size() < 1 {
            return Err(Error::config("fft_size * hop_percent must give a hop of at least one sample"));
        }
        for (name, value) in [
            ("call_threshold_db", self.call_threshold_db),
            ("high_freq_threshold_db", self.high_freq_threshold_db),
            ("low_freq_threshold_db", self.low_freq_threshold_db),
        ] {
            if !value.is_finite() || value > 0.0 {
                return Err(Error::config(format!("{name} must be a finite value <= 0 dB")));
            }
        }
        if !(self.characteristic_freq_percent_end > 0.0
            && self.characteristic_freq_percent_end <= 100.0)
        {
            return Err(Error::config("characteristic_freq_percent_end must be in (0, 100]"));
        }
        if !(self.min_call_duration_ms >= 0.0) {
            return Err(Error::config("min_call_duration_ms must be >= 0"));
        }
        if !(self.max_frequency_drop_khz > 0.0) {
            return Err(Error::config("max_frequency_drop_khz must be > 0"));
        }
        if !(self.protection_window_after_peak_ms >= 0.0) {
            return Err(Error::config("protection_window_after_peak_ms must be >= 0"));
        }
        if !(self.highpass_filter_freq_khz > 0.0) {
            return Err(Error::config("highpass_filter_freq_khz must be > 0"));
        }
        if !(1..=10).contains(&self.highpass_filter_order) {
            return Err(Error::config("highpass_filter_order must be in 1..=10"));
        }
        if !(self.time_expansion_factor > 0.0 && self.time_expansion_factor.is_finite()) {
            return Err(Error::config("time_expansion_factor must be > 0"));
        }
        Ok(())
    }
}
