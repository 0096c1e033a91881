//! Butterworth high-pass pre-filter
//!
//! Cascade of second-order sections (plus one first-order section for odd
//! orders) designed with the bilinear transform, `K = tan(π·fc/fs)`.
//! Runs in f64 direct form II transposed.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    /// b0 b1 b2 / a1 a2, normalized by a0
    Biquad { b0: f64, b1: f64, b2: f64, a1: f64, a2: f64 },
    FirstOrder { b0: f64, b1: f64, a1: f64 },
}

impl Section {
    fn biquad(k: f64, q: f64) -> Self {
        let norm = 1.0 / (1.0 + k / q + k * k);
        Section::Biquad {
            b0: norm,
            b1: -2.0 * norm,
            b2: norm,
            a1: 2.0 * (k * k - 1.0) * norm,
            a2: (1.0 - k / q + k * k) * norm,
        }
    }

    fn first_order(k: f64) -> Self {
        let norm = 1.0 / (1.0 + k);
        Section::FirstOrder {
            b0: norm,
            b1: -norm,
            a1: (k - 1.0) * norm,
        }
    }

    fn process(&self, samples: &mut [f64]) {
        match *self {
            Section::Biquad { b0, b1, b2, a1, a2 } => {
                let (mut z1, mut z2) = (0.0, 0.0);
                for x in samples.iter_mut() {
                    let y = b0 * *x + z1;
                    z1 = b1 * *x - a1 * y + z2;
                    z2 = b2 * *x - a2 * y;
                    *x = y;
                }
            }
            Section::FirstOrder { b0, b1, a1 } => {
                let mut z1 = 0.0;
                for x in samples.iter_mut() {
                    let y = b0 * *x + z1;
                    z1 = b1 * *x - a1 * y;
                    *x = y;
                }
            }
        }
    }
}

/// Cascaded Butterworth high-pass filter
#[derive(Debug, Clone, PartialEq)]
pub struct HighpassFilter {
    cutoff_hz: f64,
    sections: Vec<Section>,
}

impl HighpassFilter {
    /// Design a filter of `order` at `cutoff_hz`.
    ///
    /// Returns `None` when the cut-off is not strictly between 0 and Nyquist
    /// or the order is zero.
    pub fn new(cutoff_hz: f64, sample_rate: u32, order: usize) -> Option<Self> {
        let nyquist = sample_rate as f64 / 2.0;
        if order == 0 || !(cutoff_hz > 0.0 && cutoff_hz < nyquist) {
            return None;
        }
        let k = (PI * cutoff_hz / sample_rate as f64).tan();

        let mut sections: Vec<Section> = (1..=order / 2)
            .map(|stage| {
                let q = 1.0 / (2.0 * ((2 * stage - 1) as f64 * PI / (2 * order) as f64).sin());
                Section::biquad(k, q)
            })
            .collect();
        if order % 2 == 1 {
            sections.push(Section::first_order(k));
        }

        Some(Self {
            cutoff_hz,
            sections,
        })
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    /// Filter a whole buffer from rest.
    pub fn apply(&self, samples: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        for section in &self.sections {
            section.process(&mut buffer);
        }
        buffer.into_iter().map(|s| s as f32).collect()
    }
}

/// Cut-off (kHz) chosen from a call's peak frequency, or `None` to skip filtering.
pub fn auto_cutoff_khz(peak_freq_khz: f64) -> Option<f64> {
    if peak_freq_khz >= 40.0 {
        Some(30.0)
    } else if peak_freq_khz >= 35.0 {
        Some(25.0)
    } else if peak_freq_khz >= 30.0 {
        Some(20.0)
    } else {
        None
    }
}
