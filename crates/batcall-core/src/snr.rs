//! Signal-to-noise estimation
//!
//! The signal is the call's time/frequency box in the unfiltered clip
//! spectrogram, keeping only bins above `min + 0.25 × range` so weak edge
//! bins do not dilute it. Noise comes from a reference recording when one
//! is supplied, otherwise from every bin outside the box. Means are taken
//! in linear power.

use crate::call::SignalQuality;
use crate::segmentation::SILENCE_FLOOR_DB;
use crate::transform::{db_to_power, power_to_db, Spectrogram};
use serde::{Deserialize, Serialize};

/// Position of the signal threshold within the region's dynamic range.
const SIGNAL_THRESHOLD_FRACTION: f64 = 0.25;
/// Fewer signal bins than this is too little to average.
const MIN_SIGNAL_BINS: usize = 3;
/// Percentile of all power values used as the global noise floor.
const NOISE_FLOOR_PERCENTILE: f64 = 0.25;

/// How an estimate was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnrMethod {
    /// Mean signal power over mean noise power.
    Rms,
    /// Signal region too small; coarse peak-over-floor value used.
    SpectralFallback,
    /// Region could not be measured; coarse peak-over-floor value used.
    ErrorFallback,
}

/// SNR result with its diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnrEstimate {
    /// `+inf` when there is no noise to compare against
    pub snr_db: f64,
    pub quality: SignalQuality,
    pub method: SnrMethod,
    pub signal_power_db: f64,
    pub noise_power_db: f64,
    pub signal_bins: usize,
    pub noise_bins: usize,
}

impl SnrEstimate {
    fn coarse(method: SnrMethod, peak_power_db: f64, noise_floor_db: f64) -> Self {
        let snr_db = peak_power_db - noise_floor_db;
        Self {
            snr_db,
            quality: SignalQuality::from_snr(snr_db),
            method,
            signal_power_db: peak_power_db,
            noise_power_db: noise_floor_db,
            signal_bins: 0,
            noise_bins: 0,
        }
    }
}

/// Call box in the clip spectrogram: inclusive absolute frames, band in Hz
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnrRegion {
    pub start_frame: usize,
    pub end_frame: usize,
    pub low_freq_hz: f64,
    pub high_freq_hz: f64,
}

/// Global noise floor: 25th percentile of all power values, never below -80 dB.
pub fn noise_floor_db(spectrogram: &Spectrogram) -> f64 {
    let mut values: Vec<f64> = spectrogram.values().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        return SILENCE_FLOOR_DB;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let idx = ((values.len() - 1) as f64 * NOISE_FLOOR_PERCENTILE).round() as usize;
    values[idx].max(SILENCE_FLOOR_DB)
}

/// SNR estimator over one clip spectrogram
pub struct SnrEstimator<'a> {
    spectrogram: &'a Spectrogram,
    noise_reference: Option<&'a Spectrogram>,
}

impl<'a> SnrEstimator<'a> {
    pub fn new(spectrogram: &'a Spectrogram) -> Self {
        Self {
            spectrogram,
            noise_reference: None,
        }
    }

    /// Use a separate noise-only recording (same band) as the noise region.
    pub fn with_noise_reference(mut self, reference: Option<&'a Spectrogram>) -> Self {
        self.noise_reference = reference.filter(|r| r.num_frames() > 0 && r.num_bins() > 0);
        self
    }

    /// Estimate SNR for `region`. The coarse `peak - floor` value is
    /// substituted whenever the region cannot support a proper estimate.
    pub fn estimate(&self, region: &SnrRegion, peak_power_db: f64, noise_floor_db: f64) -> SnrEstimate {
        let Some((frames, bins)) = self.region_bounds(region) else {
            log::debug!("SNR region {:?} is outside the spectrogram", region);
            return SnrEstimate::coarse(SnrMethod::ErrorFallback, peak_power_db, noise_floor_db);
        };
        let spec = self.spectrogram;

        let region_values = || {
            spec.frames[frames.clone()]
                .iter()
                .flat_map(|row| row[bins.clone()].iter().copied())
        };
        let (min, max) = region_values().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        let range = max - min;
        let threshold = min + SIGNAL_THRESHOLD_FRACTION * range;

        let (signal_sum, signal_bins) = region_values()
            .filter(|&v| v > threshold || range <= 0.0)
            .fold((0.0, 0usize), |(sum, n), v| (sum + db_to_power(v), n + 1));
        if signal_bins < MIN_SIGNAL_BINS {
            return SnrEstimate::coarse(SnrMethod::SpectralFallback, peak_power_db, noise_floor_db);
        }
        let signal_mean = signal_sum / signal_bins as f64;

        let (noise_sum, noise_bins) = match self.noise_reference {
            Some(reference) => reference
                .values()
                .fold((0.0, 0usize), |(sum, n), v| (sum + db_to_power(v), n + 1)),
            None => spec
                .frames
                .iter()
                .enumerate()
                .flat_map(|(i, row)| {
                    let in_time = frames.contains(&i);
                    let bins = bins.clone();
                    row.iter()
                        .enumerate()
                        .filter(move |(b, _)| !(in_time && bins.contains(b)))
                        .map(|(_, &v)| v)
                })
                .fold((0.0, 0usize), |(sum, n), v| (sum + db_to_power(v), n + 1)),
        };

        let signal_power_db = power_to_db(signal_mean);
        let (snr_db, noise_power_db) = if noise_bins == 0 {
            (f64::INFINITY, f64::NEG_INFINITY)
        } else {
            let noise_mean = noise_sum / noise_bins as f64;
            (10.0 * (signal_mean / noise_mean).log10(), power_to_db(noise_mean))
        };

        SnrEstimate {
            snr_db,
            quality: SignalQuality::from_snr(snr_db),
            method: SnrMethod::Rms,
            signal_power_db,
            noise_power_db,
            signal_bins,
            noise_bins,
        }
    }

    fn region_bounds(
        &self,
        region: &SnrRegion,
    ) -> Option<(std::ops::RangeInclusive<usize>, std::ops::RangeInclusive<usize>)> {
        let spec = self.spectrogram;
        let valid = spec.num_bins() > 0
            && region.start_frame <= region.end_frame
            && region.end_frame < spec.num_frames()
            && region.low_freq_hz.is_finite()
            && region.high_freq_hz.is_finite()
            && region.low_freq_hz <= region.high_freq_hz;
        if !valid {
            return None;
        }
        let low_bin = spec.bin_for_frequency(region.low_freq_hz);
        let high_bin = spec.bin_for_frequency(region.high_freq_hz);
        Some((region.start_frame..=region.end_frame, low_bin..=high_bin))
    }
}
