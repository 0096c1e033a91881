//! Call detection pipeline
//!
//! spectrogram → segments → per-segment measurement (optionally on a
//! high-pass filtered copy) → noise floor and SNR → [`BatCall`] records.

use crate::call::BatCall;
use crate::config::DetectionConfig;
use crate::error::{Error, Result};
use crate::highpass::{auto_cutoff_khz, HighpassFilter};
use crate::measure::{CallMeasurement, ParameterMeasurer};
use crate::segmentation::{CallSegment, SegmentDetector};
use crate::snr::{noise_floor_db, SnrEstimate, SnrEstimator, SnrRegion};
use crate::transform::{compute_spectrogram, GoertzelBackend, Spectrogram, SpectrogramParams, SpectrumBackend};
use std::collections::HashMap;

#[cfg(test)]
mod tests;

/// Calls whose peak sits less than this far above the noise floor are dropped.
const MIN_COARSE_SNR_DB: f64 = -20.0;

/// Bat call detector.
///
/// Holds its own copy of the configuration; every `detect_calls`
/// invocation is independent and leaves the detector unchanged.
pub struct BatCallDetector<B: SpectrumBackend = GoertzelBackend> {
    config: DetectionConfig,
    backend: B,
}

impl BatCallDetector<GoertzelBackend> {
    /// Detector using the reference Goertzel transform.
    pub fn new(config: DetectionConfig) -> Self {
        Self::with_backend(config, GoertzelBackend)
    }
}

impl<B: SpectrumBackend> BatCallDetector<B> {
    pub fn with_backend(config: DetectionConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect and measure calls in mono `samples` within `flow_khz..fhigh_khz`.
    ///
    /// `fhigh_khz` is clamped to Nyquist. Silent, empty or too-short input
    /// yields an empty list; only an invalid configuration, sample rate or
    /// band is an error.
    pub fn detect_calls(
        &self,
        samples: &[f32],
        sample_rate: u32,
        flow_khz: f64,
        fhigh_khz: f64,
    ) -> Result<Vec<BatCall>> {
        self.detect_calls_with_noise_reference(samples, sample_rate, flow_khz, fhigh_khz, None)
    }

    /// As [`detect_calls`](Self::detect_calls), with a noise-only recording
    /// (same sample rate) used as the SNR noise region.
    pub fn detect_calls_with_noise_reference(
        &self,
        samples: &[f32],
        sample_rate: u32,
        flow_khz: f64,
        fhigh_khz: f64,
        noise: Option<&[f32]>,
    ) -> Result<Vec<BatCall>> {
        let config = &self.config;
        config.validate()?;
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }
        let nyquist_khz = sample_rate as f64 / 2000.0;
        let fhigh_khz = fhigh_khz.min(nyquist_khz);
        if !(flow_khz >= 0.0 && flow_khz < fhigh_khz) {
            return Err(Error::InvalidBand {
                low_khz: flow_khz,
                high_khz: fhigh_khz,
            });
        }

        let params = SpectrogramParams::from_config(config, flow_khz, fhigh_khz);
        let Some(spectrogram) = compute_spectrogram(samples, sample_rate, &params, &self.backend) else {
            log::debug!(
                "No usable spectrogram for {} samples (fft size {})",
                samples.len(),
                config.fft_size
            );
            return Ok(Vec::new());
        };

        let segments = SegmentDetector::new(config).detect(&spectrogram);
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        let noise_floor = noise_floor_db(&spectrogram);
        let reference = noise.and_then(|n| compute_spectrogram(n, sample_rate, &params, &self.backend));
        if noise.is_some() && reference.is_none() {
            log::warn!("Noise reference is shorter than one FFT frame, ignoring it");
        }

        let measurer = ParameterMeasurer::new(config, &spectrogram);
        let estimator = SnrEstimator::new(&spectrogram).with_noise_reference(reference.as_ref());
        let mut filtered: HashMap<u64, Option<Spectrogram>> = HashMap::new();

        let mut calls = Vec::with_capacity(segments.len());
        for segment in &segments {
            let frames = segment.start_frame..segment.end_frame + 1;
            let Some(raw) = measurer.measure(&spectrogram.slice(frames.clone())) else {
                continue;
            };

            let coarse_snr = raw.peak_power_db - noise_floor;
            if coarse_snr < MIN_COARSE_SNR_DB {
                log::debug!(
                    "Dropping call at frame {}: peak only {:.1} dB above noise floor",
                    segment.start_frame,
                    coarse_snr
                );
                continue;
            }

            let (measurement, cutoff_khz, measured_on) = match self.highpass_cutoff_khz(&raw) {
                Some(cutoff_khz) => {
                    let filtered_spec = filtered.entry(cutoff_khz.to_bits()).or_insert_with(|| {
                        self.filtered_spectrogram(samples, sample_rate, &params, cutoff_khz)
                    });
                    match filtered_spec.as_ref().and_then(|fs| {
                        ParameterMeasurer::new(config, fs)
                            .measure(&fs.slice(frames.clone()))
                            .map(|m| (m, fs))
                    }) {
                        Some((m, fs)) => (m, Some(cutoff_khz), fs.slice(frames.clone())),
                        None => (raw.clone(), None, spectrogram.slice(frames.clone())),
                    }
                }
                None => (raw.clone(), None, spectrogram.slice(frames.clone())),
            };

            // SNR always on the unfiltered spectrogram, over the unfiltered call box
            let region = SnrRegion {
                start_frame: segment.start_frame + raw.start_frame,
                end_frame: segment.start_frame + raw.end_frame,
                low_freq_hz: raw.low_freq_hz,
                high_freq_hz: raw.high_freq_hz,
            };
            let snr = estimator.estimate(&region, raw.peak_power_db, noise_floor);

            let call = build_call(
                segment,
                &measurement,
                &measured_on,
                noise_floor,
                cutoff_khz,
                snr,
            );
            calls.push(if config.time_expansion {
                call.time_expanded(config.time_expansion_factor)
            } else {
                call
            });
        }

        log::info!(
            "Detected {} calls in {} segments ({:.1} ms, {} Hz)",
            calls.len(),
            segments.len(),
            samples.len() as f64 * 1000.0 / sample_rate as f64,
            sample_rate
        );
        Ok(calls)
    }

    fn highpass_cutoff_khz(&self, measurement: &CallMeasurement) -> Option<f64> {
        let config = &self.config;
        if !config.enable_highpass_filter {
            return None;
        }
        if config.highpass_filter_freq_auto {
            auto_cutoff_khz(measurement.peak_freq_hz / 1000.0)
        } else {
            Some(config.highpass_filter_freq_khz)
        }
    }

    fn filtered_spectrogram(
        &self,
        samples: &[f32],
        sample_rate: u32,
        params: &SpectrogramParams,
        cutoff_khz: f64,
    ) -> Option<Spectrogram> {
        let Some(filter) =
            HighpassFilter::new(cutoff_khz * 1000.0, sample_rate, self.config.highpass_filter_order)
        else {
            log::warn!(
                "High-pass cut-off {:.1} kHz is outside (0, {:.1}) kHz, measuring unfiltered",
                cutoff_khz,
                sample_rate as f64 / 2000.0
            );
            return None;
        };
        log::debug!(
            "High-pass filtering at {:.1} kHz, order {}",
            filter.cutoff_hz() / 1000.0,
            self.config.highpass_filter_order
        );
        compute_spectrogram(&filter.apply(samples), sample_rate, params, &self.backend)
    }
}

fn build_call(
    segment: &CallSegment,
    m: &CallMeasurement,
    slice: &Spectrogram,
    noise_floor_db: f64,
    highpass_cutoff_khz: Option<f64>,
    snr: SnrEstimate,
) -> BatCall {
    let khz = |hz: f64| hz / 1000.0;
    let start_time_s = slice.times[m.start_frame];
    let retained = m.start_frame..m.end_frame + 1;

    BatCall {
        start_time_s,
        end_time_s: start_time_s + m.duration_ms / 1000.0,
        duration_ms: m.duration_ms,
        peak_freq_khz: khz(m.peak_freq_hz),
        peak_freq_time_ms: m.peak_time_ms,
        high_freq_khz: khz(m.high_freq_hz),
        high_freq_time_ms: m.high_time_ms,
        start_freq_khz: khz(m.start_freq_hz),
        start_freq_time_ms: 0.0,
        end_freq_khz: khz(m.end_freq_hz),
        end_freq_time_ms: m.end_time_ms,
        low_freq_khz: khz(m.low_freq_hz),
        low_freq_time_ms: m.low_time_ms,
        characteristic_freq_khz: khz(m.characteristic_freq_hz),
        characteristic_freq_time_ms: m.characteristic_time_ms,
        knee_freq_khz: m.knee.map(|k| khz(k.freq_hz)),
        knee_time_ms: m.knee.map(|k| k.time_ms),
        bandwidth_khz: khz(m.bandwidth_hz),
        peak_power_db: m.peak_power_db,
        noise_floor_db,
        snr_db: snr.snr_db,
        quality: snr.quality,
        snr,
        call_type: m.call_type,
        high_freq_threshold_db_used: m.high_threshold_db,
        low_freq_threshold_db_used: m.low_threshold_db,
        highpass_cutoff_khz,
        start_frame: segment.start_frame + m.start_frame,
        end_frame: segment.start_frame + m.end_frame,
        spectrogram: slice.frames[retained.clone()].to_vec(),
        time_axis_s: slice.times[retained].to_vec(),
        freq_axis_hz: slice.frequencies.clone(),
    }
}
