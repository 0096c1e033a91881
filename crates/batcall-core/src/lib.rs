//! Batcall Core - Bat Echolocation Call Detection Library
//!
//! This crate finds echolocation calls in ultrasonic recordings and measures
//! their frequency/time parameters (peak, high, low, characteristic and knee
//! frequencies, duration, bandwidth), SNR and call type.

pub mod call;
pub mod config;
pub mod detector;
pub mod error;
pub mod highpass;
pub mod measure;
pub mod segmentation;
pub mod snr;
pub mod threshold;
pub mod transform;

#[cfg(test)]
mod test_signals;

pub use call::{BatCall, CallType, SignalQuality};
pub use config::{DetectionConfig, WindowType};
pub use detector::BatCallDetector;
pub use error::{Error, Result};
pub use snr::{SnrEstimate, SnrMethod};
pub use transform::{FftBackend, GoertzelBackend, SpectrumBackend};

/// Detect calls with the reference transform.
pub fn detect_calls(
    samples: &[f32],
    sample_rate: u32,
    flow_khz: f64,
    fhigh_khz: f64,
    config: &DetectionConfig,
) -> Result<Vec<BatCall>> {
    BatCallDetector::new(config.clone()).detect_calls(samples, sample_rate, flow_khz, fhigh_khz)
}
