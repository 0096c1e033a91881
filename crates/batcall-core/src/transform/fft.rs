//! Accelerated backend: full complex FFT via rustfft

use super::SpectrumBackend;
use rustfft::{num_complex::Complex, FftPlanner};
use std::ops::Range;

/// Runs one planned FFT per frame and keeps the requested bins.
#[derive(Debug, Clone, Copy, Default)]
pub struct FftBackend;

impl SpectrumBackend for FftBackend {
    fn name(&self) -> &'static str {
        "rustfft"
    }

    fn magnitudes(&self, frames: &[Vec<f64>], bins: Range<usize>) -> Vec<Vec<f64>> {
        let Some(fft_size) = frames.first().map(Vec::len) else {
            return Vec::new();
        };

        // Plan once for the whole invocation
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let mut buffer = vec![Complex::new(0.0, 0.0); fft_size];
        let mut scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        frames
            .iter()
            .map(|frame| {
                for (slot, &x) in buffer.iter_mut().zip(frame) {
                    *slot = Complex::new(x, 0.0);
                }
                fft.process_with_scratch(&mut buffer, &mut scratch);
                bins.clone().map(|k| buffer[k].norm()).collect()
            })
            .collect()
    }
}
