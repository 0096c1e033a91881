//! Band-limited STFT power spectrogram
//!
//! Frames are DC-removed and windowed here; the magnitude of each requested
//! bin comes from a pluggable [`SpectrumBackend`]. Power is expressed as
//! PSD in dB: `10·log10(max(|X|²/N, 1e-16))`.

mod fft;
mod goertzel;

pub use fft::FftBackend;
pub use goertzel::GoertzelBackend;

use crate::config::{DetectionConfig, WindowType};
use std::f64::consts::PI;
use std::ops::Range;

/// Floor applied to linear power before every `log10`.
pub const POWER_FLOOR: f64 = 1e-16;

/// Source of per-bin magnitudes for prepared frames.
///
/// Receives every frame of one invocation in a single call so an
/// accelerated implementation can plan once and batch the work.
pub trait SpectrumBackend {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// `|X[k]|` for each `k` in `bins`, for every frame.
    fn magnitudes(&self, frames: &[Vec<f64>], bins: Range<usize>) -> Vec<Vec<f64>>;
}

/// Spectrogram representation
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    /// PSD values in dB [time_frame][frequency_bin]
    pub frames: Vec<Vec<f64>>,
    /// Frame centre time in seconds
    pub times: Vec<f64>,
    /// Bin centre frequency in Hz
    pub frequencies: Vec<f64>,
    /// Hz per bin
    pub freq_resolution: f64,
    /// Seconds between consecutive frames
    pub hop_seconds: f64,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn num_bins(&self) -> usize {
        self.frequencies.len()
    }

    /// Global maximum power (dB).
    pub fn max_power(&self) -> f64 {
        self.values().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Global minimum power (dB).
    pub fn min_power(&self) -> f64 {
        self.values().fold(f64::INFINITY, f64::min)
    }

    /// Iterate every power value in frame-major order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.frames.iter().flat_map(|frame| frame.iter().copied())
    }

    /// Bin index holding the highest power of a frame, with that power.
    pub fn frame_peak(&self, frame: usize) -> (usize, f64) {
        frame_peak(&self.frames[frame])
    }

    /// Index of the bin whose centre is nearest to `freq_hz`, clamped to the band.
    pub fn bin_for_frequency(&self, freq_hz: f64) -> usize {
        if self.frequencies.is_empty() {
            return 0;
        }
        let offset = (freq_hz - self.frequencies[0]) / self.freq_resolution;
        (offset.round().max(0.0) as usize).min(self.num_bins() - 1)
    }

    /// Copy of frames `range`, keeping the frequency axis.
    pub fn slice(&self, range: Range<usize>) -> Spectrogram {
        Spectrogram {
            frames: self.frames[range.clone()].to_vec(),
            times: self.times[range].to_vec(),
            frequencies: self.frequencies.clone(),
            freq_resolution: self.freq_resolution,
            hop_seconds: self.hop_seconds,
        }
    }
}

/// Highest-power bin of one frame.
pub(crate) fn frame_peak(frame: &[f64]) -> (usize, f64) {
    frame
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best })
}

/// STFT shape and band of interest
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrogramParams {
    pub fft_size: usize,
    /// Hop between frames, in samples
    pub hop_size: usize,
    pub window_type: WindowType,
    pub flow_khz: f64,
    pub fhigh_khz: f64,
}

impl SpectrogramParams {
    pub fn from_config(config: &DetectionConfig, flow_khz: f64, fhigh_khz: f64) -> Self {
        Self {
            fft_size: config.fft_size,
            hop_size: config.hop_size(),
            window_type: config.window_type,
            flow_khz,
            fhigh_khz,
        }
    }
}

/// Compute the band-limited power spectrogram.
///
/// Returns `None` when the buffer is shorter than one FFT frame, the hop is
/// below one sample, or the band holds no bins. Callers treat that as "no calls".
pub fn compute_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    params: &SpectrogramParams,
    backend: &dyn SpectrumBackend,
) -> Option<Spectrogram> {
    let fft_size = params.fft_size;
    let hop_size = params.hop_size;

    if sample_rate == 0 || fft_size == 0 || fft_size > samples.len() || hop_size < 1 {
        return None;
    }

    let freq_resolution = sample_rate as f64 / fft_size as f64;
    let first_bin = (params.flow_khz * 1000.0 / freq_resolution).floor().max(0.0) as usize;
    let last_bin = ((params.fhigh_khz * 1000.0 / freq_resolution).ceil() as usize).min(fft_size / 2);
    if first_bin > last_bin {
        return None;
    }
    let bins = first_bin..last_bin + 1;

    let num_frames = (samples.len() - fft_size) / hop_size + 1;
    let window = create_window(params.window_type, fft_size);

    let frames: Vec<Vec<f64>> = (0..num_frames)
        .map(|frame_idx| {
            let start = frame_idx * hop_size;
            prepare_frame(&samples[start..start + fft_size], &window)
        })
        .collect();

    let magnitudes = backend.magnitudes(&frames, bins.clone());

    let norm = fft_size as f64;
    let power_db: Vec<Vec<f64>> = magnitudes
        .iter()
        .map(|frame| frame.iter().map(|&m| power_to_db(m * m / norm)).collect())
        .collect();

    let times = (0..num_frames)
        .map(|i| (i * hop_size + fft_size / 2) as f64 / sample_rate as f64)
        .collect();
    let frequencies = bins.map(|k| k as f64 * freq_resolution).collect();

    log::debug!(
        "Spectrogram ({}): {} frames x {} bins, {:.1} Hz/bin",
        backend.name(),
        num_frames,
        last_bin + 1 - first_bin,
        freq_resolution
    );

    Some(Spectrogram {
        frames: power_db,
        times,
        frequencies,
        freq_resolution,
        hop_seconds: hop_size as f64 / sample_rate as f64,
    })
}

/// Linear power to dB with the `1e-16` floor.
pub fn power_to_db(power: f64) -> f64 {
    10.0 * power.max(POWER_FLOOR).log10()
}

/// dB back to linear power.
pub fn db_to_power(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

/// Remove the frame mean, then apply the window.
fn prepare_frame(samples: &[f32], window: &[f64]) -> Vec<f64> {
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64;
    samples
        .iter()
        .zip(window)
        .map(|(&s, &w)| (s as f64 - mean) * w)
        .collect()
}

/// Create a symmetric analysis window
fn create_window(window_type: WindowType, size: usize) -> Vec<f64> {
    if size < 2 {
        return vec![1.0; size];
    }
    let n = (size - 1) as f64;
    (0..size)
        .map(|i| {
            let x = 2.0 * PI * i as f64 / n;
            match window_type {
                WindowType::Hann => 0.5 * (1.0 - x.cos()),
                WindowType::Hamming => 0.54 - 0.46 * x.cos(),
                WindowType::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
                WindowType::Rectangular => 1.0,
            }
        })
        .collect()
}
