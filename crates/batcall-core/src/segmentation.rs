//! Candidate call segmentation
//!
//! A frame is active when any bin rises above the global spectrogram
//! maximum plus a relative offset. Maximal runs of active frames become
//! candidate segments; runs shorter than the minimum call duration are dropped.

use crate::config::DetectionConfig;
use crate::transform::Spectrogram;

/// Absolute power floor (dB). Spectrograms peaking below it are silence,
/// and the global noise floor estimate never drops under it.
pub const SILENCE_FLOOR_DB: f64 = -80.0;

/// Inclusive frame range of one candidate call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSegment {
    pub start_frame: usize,
    pub end_frame: usize,
}

impl CallSegment {
    pub fn num_frames(&self) -> usize {
        self.end_frame - self.start_frame + 1
    }

    /// Duration derived from the frame count and hop.
    pub fn duration_ms(&self, hop_seconds: f64) -> f64 {
        self.num_frames() as f64 * hop_seconds * 1000.0
    }
}

/// Relative-energy segment detector
#[derive(Debug, Clone)]
pub struct SegmentDetector {
    threshold_db: f64,
    min_duration_ms: f64,
}

impl SegmentDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            threshold_db: config.call_threshold_db,
            min_duration_ms: config.min_call_duration_ms,
        }
    }

    /// Find segments, already filtered by minimum duration.
    pub fn detect(&self, spectrogram: &Spectrogram) -> Vec<CallSegment> {
        let global_max = spectrogram.max_power();
        if !(global_max > SILENCE_FLOOR_DB) {
            log::debug!(
                "No signal: spectrogram maximum {:.1} dB is below {:.1} dB",
                global_max,
                SILENCE_FLOOR_DB
            );
            return Vec::new();
        }

        let threshold = global_max + self.threshold_db;
        let active: Vec<bool> = spectrogram
            .frames
            .iter()
            .map(|frame| frame.iter().any(|&p| p > threshold))
            .collect();

        let mut segments = Vec::new();
        let mut run_start: Option<usize> = None;
        for (idx, &is_active) in active.iter().enumerate() {
            match (is_active, run_start) {
                (true, None) => run_start = Some(idx),
                (false, Some(start)) => {
                    segments.push(CallSegment { start_frame: start, end_frame: idx - 1 });
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            segments.push(CallSegment { start_frame: start, end_frame: active.len() - 1 });
        }

        let total = segments.len();
        segments.retain(|seg| seg.duration_ms(spectrogram.hop_seconds) >= self.min_duration_ms);
        if segments.len() < total {
            log::debug!(
                "Dropped {} segments shorter than {:.2} ms",
                total - segments.len(),
                self.min_duration_ms
            );
        }

        segments
    }
}
