//! Adaptive threshold search for the High and Low Frequency measurements
//!
//! Candidate thresholds sweep from -24 dB down to -70 dB (relative to the
//! call's peak power) in 0.5 dB steps. The target frequency is remeasured at
//! every step; the search freezes just before the first persistent jump.
//! A measurement that creeps away from its first plausible value by more
//! than the major jump limit, without ever jumping, is following window
//! leakage rather than the call; that search falls back to the safety
//! threshold.

/// First candidate threshold (dB relative to peak).
pub const SWEEP_START_DB: f64 = -24.0;
/// Last candidate threshold.
pub const SWEEP_END_DB: f64 = -70.0;
/// Step between candidates.
pub const SWEEP_STEP_DB: f64 = 0.5;
/// Substituted when the sweep finds no stopping point.
pub const SAFETY_THRESHOLD_DB: f64 = -30.0;

/// Steps after an anomaly that must return to the pre-anomaly level for it
/// to be discounted as noise.
const SPIKE_LOOKAHEAD: usize = 3;
/// Noise floor position within the spectrogram's dynamic range.
const NOISE_FLOOR_FRACTION: f64 = 0.6;

/// Which measurement is being optimized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTarget {
    HighFrequency,
    LowFrequency,
}

impl SearchTarget {
    /// (major, minor) jump limits in kHz
    fn jump_limits_khz(&self) -> (f64, f64) {
        match self {
            SearchTarget::HighFrequency => (4.0, 2.5),
            SearchTarget::LowFrequency => (2.0, 1.5),
        }
    }

    /// A High Frequency below peak, or a Low Frequency above it, is rejected.
    fn is_plausible(&self, value_hz: f64, peak_freq_hz: f64) -> bool {
        match self {
            SearchTarget::HighFrequency => value_hz >= peak_freq_hz,
            SearchTarget::LowFrequency => value_hz <= peak_freq_hz,
        }
    }
}

/// How the search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Frozen just before a persistent jump.
    Frozen,
    /// Major jump at or below the noise floor; last valid step accepted.
    NoiseFloor,
    /// No stopping point; safety threshold substituted.
    Exhausted,
    /// Gradual drift past the major limit; safety threshold substituted.
    Drifted,
}

/// Selected threshold and the frequency measured with it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdChoice {
    pub threshold_db: f64,
    pub value_hz: f64,
    pub outcome: SearchOutcome,
}

/// Dynamic noise floor: `min + 0.6 × (max - min)` over a whole spectrogram.
pub fn dynamic_noise_floor(min_db: f64, max_db: f64) -> f64 {
    min_db + NOISE_FLOOR_FRACTION * (max_db - min_db)
}

/// Candidate thresholds, -24 → -70 dB.
pub fn candidate_thresholds() -> Vec<f64> {
    let steps = ((SWEEP_START_DB - SWEEP_END_DB) / SWEEP_STEP_DB).round() as usize;
    (0..=steps)
        .map(|i| SWEEP_START_DB - i as f64 * SWEEP_STEP_DB)
        .collect()
}

/// Threshold optimizer for one call
#[derive(Debug, Clone)]
pub struct ThresholdOptimizer {
    target: SearchTarget,
    peak_power_db: f64,
    peak_freq_hz: f64,
    noise_floor_db: f64,
}

impl ThresholdOptimizer {
    pub fn new(
        target: SearchTarget,
        peak_power_db: f64,
        peak_freq_hz: f64,
        noise_floor_db: f64,
    ) -> Self {
        Self {
            target,
            peak_power_db,
            peak_freq_hz,
            noise_floor_db,
        }
    }

    /// Run the sweep. `measure` maps a relative threshold (dB) to the
    /// target frequency in Hz, or `None` when nothing crosses it.
    ///
    /// Returns `None` only if even the safety threshold measures nothing.
    pub fn optimize<F>(&self, mut measure: F) -> Option<ThresholdChoice>
    where
        F: FnMut(f64) -> Option<f64>,
    {
        let thresholds = candidate_thresholds();
        let values: Vec<Option<f64>> = thresholds.iter().map(|&t| measure(t)).collect();
        let (major_khz, minor_khz) = self.target.jump_limits_khz();

        let choose = |idx: usize, outcome: SearchOutcome| ThresholdChoice {
            threshold_db: thresholds[idx],
            value_hz: values[idx].unwrap_or(f64::NAN),
            outcome,
        };

        // Last non-anomalous measurement, and the last one that was also plausible
        let mut reference: Option<f64> = None;
        let mut last_valid: Option<usize> = None;
        // First plausible measurement
        let mut anchor: Option<f64> = None;
        let mut outcome = SearchOutcome::Exhausted;

        for (i, value) in values.iter().enumerate() {
            let Some(value) = *value else { continue };

            if let Some(previous) = reference {
                let jump_khz = (value - previous).abs() / 1000.0;
                if jump_khz > minor_khz {
                    let major = jump_khz > major_khz;
                    let at_noise_floor =
                        self.peak_power_db + thresholds[i] <= self.noise_floor_db;

                    if major && at_noise_floor {
                        if let Some(valid) = last_valid {
                            log::trace!(
                                "{:?}: {:.1} kHz jump at {:.1} dB hits the noise floor",
                                self.target,
                                jump_khz,
                                thresholds[i]
                            );
                            return Some(choose(valid, SearchOutcome::NoiseFloor));
                        }
                    }

                    if self.is_spike(&values, i, previous, minor_khz) {
                        log::trace!(
                            "{:?}: transient {:.1} kHz jump at {:.1} dB ignored",
                            self.target,
                            jump_khz,
                            thresholds[i]
                        );
                        continue;
                    }

                    if let Some(valid) = last_valid {
                        return Some(choose(valid, SearchOutcome::Frozen));
                    }
                    // Nothing plausible yet: keep sweeping from the new level
                }
            }

            reference = Some(value);
            if self.target.is_plausible(value, self.peak_freq_hz) {
                let first = *anchor.get_or_insert(value);
                if (value - first).abs() / 1000.0 > major_khz {
                    outcome = SearchOutcome::Drifted;
                    break;
                }
                last_valid = Some(i);
            }
        }

        log::debug!(
            "{:?}: sweep {:?}, using safety threshold {:.1} dB",
            self.target,
            outcome,
            SAFETY_THRESHOLD_DB
        );
        measure(SAFETY_THRESHOLD_DB).map(|value_hz| ThresholdChoice {
            threshold_db: SAFETY_THRESHOLD_DB,
            value_hz,
            outcome,
        })
    }

    /// True when the next steps all come back near the pre-anomaly value.
    fn is_spike(&self, values: &[Option<f64>], idx: usize, previous: f64, minor_khz: f64) -> bool {
        let ahead = &values[idx + 1..];
        ahead.len() >= SPIKE_LOOKAHEAD
            && ahead[..SPIKE_LOOKAHEAD].iter().all(|v| {
                v.map(|v| (v - previous).abs() / 1000.0 <= minor_khz)
                    .unwrap_or(false)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(threshold: f64) -> usize {
        ((SWEEP_START_DB - threshold) / SWEEP_STEP_DB).round() as usize
    }

    fn high_optimizer() -> ThresholdOptimizer {
        // Noise floor far below any candidate so the escape rule stays quiet
        ThresholdOptimizer::new(SearchTarget::HighFrequency, 0.0, 40_000.0, -200.0)
    }

    #[test]
    fn test_candidates_span_sweep() {
        let c = candidate_thresholds();
        assert_eq!(c.len(), 93);
        assert_eq!(c[0], -24.0);
        assert_eq!(*c.last().unwrap(), -70.0);
    }

    #[test]
    fn test_freezes_before_persistent_jump() {
        let jump_at = index_of(-40.0);
        let choice = high_optimizer()
            .optimize(|t| {
                let i = index_of(t);
                Some(if i < jump_at { 50_000.0 + i as f64 * 100.0 } else { 70_000.0 })
            })
            .unwrap();

        assert_eq!(choice.outcome, SearchOutcome::Frozen);
        assert_eq!(choice.threshold_db, -39.5);
    }

    #[test]
    fn test_single_step_spike_is_ignored() {
        let spike_at = index_of(-35.0);
        let jump_at = index_of(-50.0);
        let choice = high_optimizer()
            .optimize(|t| {
                let i = index_of(t);
                Some(if i == spike_at {
                    60_000.0
                } else if i >= jump_at {
                    80_000.0
                } else {
                    50_000.0
                })
            })
            .unwrap();

        assert_eq!(choice.outcome, SearchOutcome::Frozen);
        assert_eq!(choice.threshold_db, -49.5);
        assert_eq!(choice.value_hz, 50_000.0);
    }

    #[test]
    fn test_smooth_sweep_is_exhausted() {
        let choice = high_optimizer()
            .optimize(|t| Some(50_000.0 - t * 10.0))
            .unwrap();
        assert_eq!(choice.outcome, SearchOutcome::Exhausted);
        assert_eq!(choice.threshold_db, SAFETY_THRESHOLD_DB);
        assert_eq!(choice.value_hz, 50_300.0);
    }

    #[test]
    fn test_gradual_drift_uses_safety_threshold() {
        // 0.25 kHz per step: never a jump, but 4 kHz away from -24 dB by -32.5 dB
        let choice = high_optimizer()
            .optimize(|t| Some(50_000.0 + index_of(t) as f64 * 250.0))
            .unwrap();
        assert_eq!(choice.outcome, SearchOutcome::Drifted);
        assert_eq!(choice.threshold_db, SAFETY_THRESHOLD_DB);
        assert_eq!(choice.value_hz, 53_000.0);
    }

    #[test]
    fn test_drift_is_measured_from_first_plausible_value() {
        // Implausible (below peak) readings do not anchor the drift check
        let optimizer = ThresholdOptimizer::new(SearchTarget::HighFrequency, 0.0, 45_000.0, -200.0);
        let choice = optimizer
            .optimize(|t| {
                let i = index_of(t);
                Some(if t > -30.0 { 38_000.0 + i as f64 * 600.0 } else { 45_000.0 })
            })
            .unwrap();
        assert_eq!(choice.outcome, SearchOutcome::Exhausted);
        assert_eq!(choice.value_hz, 45_000.0);
    }

    #[test]
    fn test_noise_floor_escape() {
        // peak 0 dB, floor -45 dB: a major jump at -46 dB accepts -45.5 dB
        let optimizer = ThresholdOptimizer::new(SearchTarget::HighFrequency, 0.0, 40_000.0, -45.0);
        let jump_at = index_of(-46.0);
        let choice = optimizer
            .optimize(|t| Some(if index_of(t) < jump_at { 50_000.0 } else { 90_000.0 }))
            .unwrap();
        assert_eq!(choice.outcome, SearchOutcome::NoiseFloor);
        assert_eq!(choice.threshold_db, -45.5);
    }

    #[test]
    fn test_implausible_high_keeps_sweeping() {
        // Below peak until -30 dB, then a (plausible) jump, then a real anomaly at -60
        let optimizer = ThresholdOptimizer::new(SearchTarget::HighFrequency, 0.0, 45_000.0, -200.0);
        let choice = optimizer
            .optimize(|t| {
                Some(if t > -30.0 {
                    42_000.0
                } else if t > -60.0 {
                    48_000.0
                } else {
                    70_000.0
                })
            })
            .unwrap();
        assert_eq!(choice.outcome, SearchOutcome::Frozen);
        assert_eq!(choice.threshold_db, -59.5);
        assert!(choice.value_hz >= 45_000.0);
    }

    #[test]
    fn test_low_frequency_limits_are_tighter() {
        let optimizer = ThresholdOptimizer::new(SearchTarget::LowFrequency, 0.0, 40_000.0, -200.0);
        let jump_at = index_of(-30.0);
        let choice = optimizer
            .optimize(|t| Some(if index_of(t) < jump_at { 30_000.0 } else { 28_200.0 }))
            .unwrap();
        // 1.8 kHz exceeds the 1.5 kHz low-frequency limit
        assert_eq!(choice.threshold_db, -29.5);
    }

    #[test]
    fn test_choice_always_in_range() {
        for jump in [-24.5, -33.0, -51.5, -69.5] {
            let at = index_of(jump);
            let choice = high_optimizer()
                .optimize(|t| Some(if index_of(t) < at { 50_000.0 } else { 60_000.0 }))
                .unwrap();
            assert!(
                (SWEEP_END_DB..=SWEEP_START_DB).contains(&choice.threshold_db)
                    || choice.threshold_db == SAFETY_THRESHOLD_DB
            );
        }
    }
}
