//! Measured call records

use crate::snr::SnrEstimate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Echolocation call shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallType {
    #[serde(rename = "CF")]
    Cf,
    #[serde(rename = "FM")]
    Fm,
    #[serde(rename = "CF-FM")]
    CfFm,
}

impl CallType {
    pub fn label(&self) -> &'static str {
        match self {
            CallType::Cf => "CF",
            CallType::Fm => "FM",
            CallType::CfFm => "CF-FM",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Quality label derived from SNR (dB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalQuality {
    #[serde(rename = "Very Poor")]
    VeryPoor,
    Poor,
    Normal,
    Good,
    Excellent,
}

impl SignalQuality {
    pub fn from_snr(snr_db: f64) -> Self {
        if snr_db.is_nan() || snr_db < 10.0 {
            SignalQuality::VeryPoor
        } else if snr_db < 15.0 {
            SignalQuality::Poor
        } else if snr_db < 20.0 {
            SignalQuality::Normal
        } else if snr_db < 30.0 {
            SignalQuality::Good
        } else {
            SignalQuality::Excellent
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignalQuality::VeryPoor => "Very Poor",
            SignalQuality::Poor => "Poor",
            SignalQuality::Normal => "Normal",
            SignalQuality::Good => "Good",
            SignalQuality::Excellent => "Excellent",
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One detected call.
///
/// Frequencies are in kHz. Times ending in `_ms` are relative to the call
/// start; `start_time_s`/`end_time_s` locate the call within the clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatCall {
    pub start_time_s: f64,
    pub end_time_s: f64,
    pub duration_ms: f64,

    pub peak_freq_khz: f64,
    pub peak_freq_time_ms: f64,
    pub high_freq_khz: f64,
    pub high_freq_time_ms: f64,
    pub start_freq_khz: f64,
    pub start_freq_time_ms: f64,
    pub end_freq_khz: f64,
    pub end_freq_time_ms: f64,
    pub low_freq_khz: f64,
    pub low_freq_time_ms: f64,
    pub characteristic_freq_khz: f64,
    pub characteristic_freq_time_ms: f64,
    pub knee_freq_khz: Option<f64>,
    pub knee_time_ms: Option<f64>,
    pub bandwidth_khz: f64,

    pub peak_power_db: f64,
    pub noise_floor_db: f64,
    pub snr_db: f64,
    pub quality: SignalQuality,
    pub snr: SnrEstimate,
    pub call_type: CallType,

    /// Thresholds actually used (dB relative to peak power)
    pub high_freq_threshold_db_used: f64,
    pub low_freq_threshold_db_used: f64,
    /// High-pass cut-off applied before measurement, if any
    pub highpass_cutoff_khz: Option<f64>,

    /// Absolute frame indices in the clip spectrogram
    pub start_frame: usize,
    pub end_frame: usize,

    /// Retained spectrogram slice (dB) [frame][bin] and its axes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spectrogram: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_axis_s: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub freq_axis_hz: Vec<f64>,
}

impl BatCall {
    /// Rescale for a time-expanded recording: frequencies × `factor`,
    /// times ÷ `factor`. Applying `1 / factor` afterwards restores the call.
    pub fn time_expanded(&self, factor: f64) -> BatCall {
        let f = |khz: f64| khz * factor;
        let t = |time: f64| time / factor;
        BatCall {
            start_time_s: t(self.start_time_s),
            end_time_s: t(self.end_time_s),
            duration_ms: t(self.duration_ms),
            peak_freq_khz: f(self.peak_freq_khz),
            peak_freq_time_ms: t(self.peak_freq_time_ms),
            high_freq_khz: f(self.high_freq_khz),
            high_freq_time_ms: t(self.high_freq_time_ms),
            start_freq_khz: f(self.start_freq_khz),
            start_freq_time_ms: t(self.start_freq_time_ms),
            end_freq_khz: f(self.end_freq_khz),
            end_freq_time_ms: t(self.end_freq_time_ms),
            low_freq_khz: f(self.low_freq_khz),
            low_freq_time_ms: t(self.low_freq_time_ms),
            characteristic_freq_khz: f(self.characteristic_freq_khz),
            characteristic_freq_time_ms: t(self.characteristic_freq_time_ms),
            knee_freq_khz: self.knee_freq_khz.map(f),
            knee_time_ms: self.knee_time_ms.map(t),
            bandwidth_khz: f(self.bandwidth_khz),
            highpass_cutoff_khz: self.highpass_cutoff_khz.map(f),
            time_axis_s: self.time_axis_s.iter().map(|&s| t(s)).collect(),
            freq_axis_hz: self.freq_axis_hz.iter().map(|&hz| hz * factor).collect(),
            ..self.clone()
        }
    }

    /// Drop the retained spectrogram slice (for compact export).
    pub fn without_spectrogram(mut self) -> BatCall {
        self.spectrogram = Vec::new();
        self.time_axis_s = Vec::new();
        self.freq_axis_hz = Vec::new();
        self
    }
}
