//! Call parameter measurement
//!
//! Works on the spectrogram slice of one segment and produces every
//! frequency/time parameter of the call. Times are in milliseconds from
//! the refined start frame.

mod boundaries;
mod shape;

pub use shape::Knee;

use crate::call::CallType;
use crate::config::DetectionConfig;
use crate::threshold::{dynamic_noise_floor, SearchTarget, ThresholdOptimizer};
use crate::transform::{db_to_power, frame_peak, power_to_db, Spectrogram};
use boundaries::{Crossing, EndScanOptions};

/// Start Frequency is always read at this threshold (dB below peak).
const START_FREQ_THRESHOLD_DB: f64 = -24.0;
/// Peak within this distance (Hz) of High Frequency marks an extended CF phase.
const EXTENDED_CF_MAX_GAP_HZ: f64 = 1000.0;

/// Spectrogram slice plus per-frame peak and energy, shared by the measurement steps.
pub(crate) struct CallView<'a> {
    pub spec: &'a Spectrogram,
    /// (bin, power dB) of each frame's maximum
    pub peaks: Vec<(usize, f64)>,
    /// Band-summed frame energy (dB)
    pub energy_db: Vec<f64>,
}

impl<'a> CallView<'a> {
    pub fn new(spec: &'a Spectrogram) -> Self {
        let peaks = spec.frames.iter().map(|frame| frame_peak(frame)).collect();
        let energy_db = spec
            .frames
            .iter()
            .map(|frame| power_to_db(frame.iter().map(|&p| db_to_power(p)).sum()))
            .collect();
        Self {
            spec,
            peaks,
            energy_db,
        }
    }

    pub fn num_frames(&self) -> usize {
        self.spec.num_frames()
    }

    pub fn hop_ms(&self) -> f64 {
        self.spec.hop_seconds * 1000.0
    }

    /// Milliseconds from frame `origin` to frame `frame`.
    pub fn time_ms(&self, frame: usize, origin: usize) -> f64 {
        (self.spec.times[frame] - self.spec.times[origin]) * 1000.0
    }

    /// Parabolically refined frequency around `bin` in `frame`.
    pub fn interpolated_frequency(&self, frame: usize, bin: usize) -> f64 {
        let row = &self.spec.frames[frame];
        let base = self.spec.frequencies[bin];
        if bin == 0 || bin + 1 >= row.len() {
            return base;
        }
        base + boundaries::parabolic_offset(row[bin - 1], row[bin], row[bin + 1]) * self.spec.freq_resolution
    }

    /// Refined peak frequency of one frame.
    pub fn frame_frequency(&self, frame: usize) -> f64 {
        self.interpolated_frequency(frame, self.peaks[frame].0)
    }
}

/// Everything measured for one call, before SNR and time expansion
#[derive(Debug, Clone, PartialEq)]
pub struct CallMeasurement {
    /// Slice-relative frame indices
    pub start_frame: usize,
    pub peak_frame: usize,
    /// Frame where Low/End Frequency was read; the call ends here
    pub end_frame: usize,

    pub peak_freq_hz: f64,
    pub peak_time_ms: f64,
    pub peak_power_db: f64,
    pub high_freq_hz: f64,
    pub high_time_ms: f64,
    pub start_freq_hz: f64,
    pub end_freq_hz: f64,
    pub end_time_ms: f64,
    pub low_freq_hz: f64,
    pub low_time_ms: f64,
    pub characteristic_freq_hz: f64,
    pub characteristic_time_ms: f64,
    pub knee: Option<Knee>,
    pub duration_ms: f64,
    pub bandwidth_hz: f64,
    pub call_type: CallType,

    pub high_threshold_db: f64,
    pub low_threshold_db: f64,
}

/// Parameter measurer bound to one configuration and clip
pub struct ParameterMeasurer<'a> {
    config: &'a DetectionConfig,
    noise_floor_db: f64,
}

impl<'a> ParameterMeasurer<'a> {
    /// `clip` is the whole spectrogram; its dynamic range sets the noise
    /// floor used by the threshold search.
    pub fn new(config: &'a DetectionConfig, clip: &Spectrogram) -> Self {
        Self {
            config,
            noise_floor_db: dynamic_noise_floor(clip.min_power(), clip.max_power()),
        }
    }

    /// Measure one call from its spectrogram slice.
    pub fn measure(&self, call: &Spectrogram) -> Option<CallMeasurement> {
        if call.num_frames() == 0 || call.num_bins() == 0 {
            return None;
        }
        let config = self.config;
        let view = CallView::new(call);
        let last = view.num_frames() - 1;

        let peak = boundaries::find_peak(&view);
        let boundary_threshold = peak.power_db + config.call_threshold_db;
        let start = boundaries::first_frame_above(&view, boundary_threshold, 0..=peak.frame)
            .unwrap_or(peak.frame);

        // High Frequency: frames from start up to the peak
        let high_at = |relative_db: f64| {
            boundaries::high_crossing(&view, start..=peak.frame, peak.power_db + relative_db)
        };
        let (high_threshold_db, high, high_search) = if config.high_freq_threshold_auto {
            let optimizer = ThresholdOptimizer::new(
                SearchTarget::HighFrequency,
                peak.power_db,
                peak.freq_hz,
                self.noise_floor_db,
            );
            match optimizer.optimize(|t| high_at(t).map(|c| c.freq_hz)) {
                Some(choice) => (choice.threshold_db, high_at(choice.threshold_db), Some(choice.outcome)),
                None => (config.high_freq_threshold_db, high_at(config.high_freq_threshold_db), None),
            }
        } else {
            (config.high_freq_threshold_db, high_at(config.high_freq_threshold_db), None)
        };
        let high = high.unwrap_or(Crossing {
            frame: peak.frame,
            freq_hz: peak.freq_hz,
        });

        let extended_cf = (peak.freq_hz - high.freq_hz).abs() < EXTENDED_CF_MAX_GAP_HZ;
        let (nominal_end, end_rule) = boundaries::find_end_frame(
            &view,
            peak.frame,
            boundary_threshold,
            EndScanOptions {
                anti_rebounce: config.enable_anti_rebounce && !extended_cf,
                max_frequency_drop_hz: config.max_frequency_drop_khz * 1000.0,
                protection_window_ms: config.protection_window_after_peak_ms,
            },
        );

        // Low/End Frequency: latest frame up to the nominal end still above threshold
        let low_at = |relative_db: f64| {
            let threshold = peak.power_db + relative_db;
            let frame = boundaries::last_frame_above(&view, threshold, peak.frame..=nominal_end)?;
            boundaries::low_crossing(&view, frame, threshold).map(|freq_hz| Crossing { frame, freq_hz })
        };
        let (low_threshold_db, low, low_search) = if config.low_freq_threshold_auto {
            let optimizer = ThresholdOptimizer::new(
                SearchTarget::LowFrequency,
                peak.power_db,
                peak.freq_hz,
                self.noise_floor_db,
            );
            match optimizer.optimize(|t| low_at(t).map(|c| c.freq_hz)) {
                Some(choice) => (choice.threshold_db, low_at(choice.threshold_db), Some(choice.outcome)),
                None => (config.low_freq_threshold_db, low_at(config.low_freq_threshold_db), None),
            }
        } else {
            let relative_db = config.low_freq_threshold_db;
            let at_nominal_end = boundaries::low_crossing(&view, nominal_end, peak.power_db + relative_db)
                .map(|freq_hz| Crossing {
                    frame: nominal_end,
                    freq_hz,
                });
            (relative_db, at_nominal_end.or_else(|| low_at(relative_db)), None)
        };
        let low = low.unwrap_or(Crossing {
            frame: nominal_end,
            freq_hz: peak.freq_hz,
        });
        let end = low.frame.clamp(peak.frame, last);

        // Start Frequency: first frame, low side, if it sits below the peak
        let start_freq_hz = boundaries::low_crossing(&view, start, peak.power_db + START_FREQ_THRESHOLD_DB)
            .filter(|&f| f < peak.freq_hz)
            .unwrap_or(high.freq_hz);

        let duration_ms = view.time_ms(end, start).max(view.hop_ms());
        let end_freq_hz = low.freq_hz;
        let (mut low_freq_hz, mut low_time_ms) = (end_freq_hz, duration_ms);
        if start_freq_hz < low_freq_hz {
            low_freq_hz = start_freq_hz;
            low_time_ms = 0.0;
        }

        let low_freq_hz = low_freq_hz.min(peak.freq_hz);
        let high_freq_hz = high.freq_hz.max(peak.freq_hz);

        let (characteristic_freq_hz, characteristic_time_ms) = shape::characteristic_frequency(
            &view,
            start,
            end,
            config.characteristic_freq_percent_end,
            boundary_threshold,
        );
        let characteristic_freq_hz = characteristic_freq_hz.clamp(low_freq_hz, peak.freq_hz);

        let knee = shape::find_knee(&view, start, end, duration_ms);
        let bandwidth_hz = high_freq_hz - low_freq_hz;
        let call_type = shape::classify(bandwidth_hz, extended_cf);

        log::debug!(
            "Call frames {}..={} (peak {}, end rule {:?}): peak {:.2} kHz, high {:.2} kHz @ {:.1} dB ({:?}), low {:.2} kHz @ {:.1} dB ({:?}), {}",
            start,
            end,
            peak.frame,
            end_rule,
            peak.freq_hz / 1000.0,
            high_freq_hz / 1000.0,
            high_threshold_db,
            high_search,
            low_freq_hz / 1000.0,
            low_threshold_db,
            low_search,
            call_type
        );

        Some(CallMeasurement {
            start_frame: start,
            peak_frame: peak.frame,
            end_frame: end,
            peak_freq_hz: peak.freq_hz,
            peak_time_ms: view.time_ms(peak.frame, start),
            peak_power_db: peak.power_db,
            high_freq_hz,
            high_time_ms: view.time_ms(high.frame, start),
            start_freq_hz,
            end_freq_hz,
            end_time_ms: duration_ms,
            low_freq_hz,
            low_time_ms,
            characteristic_freq_hz,
            characteristic_time_ms,
            knee,
            duration_ms,
            bandwidth_hz,
            call_type,
            high_threshold_db,
            low_threshold_db,
        })
    }
}
