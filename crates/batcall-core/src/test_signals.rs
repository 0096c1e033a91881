//! Synthetic signals shared by unit tests

use std::f64::consts::PI;

fn len(sample_rate: u32, duration_s: f64) -> usize {
    (duration_s * sample_rate as f64).round() as usize
}

/// Constant-amplitude sine.
pub fn tone(freq_hz: f64, sample_rate: u32, duration_s: f64, amplitude: f64) -> Vec<f32> {
    (0..len(sample_rate, duration_s))
        .map(|i| (amplitude * (2.0 * PI * freq_hz * i as f64 / sample_rate as f64).sin()) as f32)
        .collect()
}

/// Sine with raised-cosine onset and offset ramps of `ramp_s` seconds.
pub fn tapered_tone(
    freq_hz: f64,
    sample_rate: u32,
    duration_s: f64,
    amplitude: f64,
    ramp_s: f64,
) -> Vec<f32> {
    let mut samples = tone(freq_hz, sample_rate, duration_s, amplitude);
    apply_ramps(&mut samples, len(sample_rate, ramp_s));
    samples
}

/// Linear frequency sweep from `f0_hz` to `f1_hz` with short cosine ramps.
pub fn sweep(f0_hz: f64, f1_hz: f64, sample_rate: u32, duration_s: f64, amplitude: f64) -> Vec<f32> {
    let n = len(sample_rate, duration_s);
    let rate = (f1_hz - f0_hz) / duration_s;
    let mut samples: Vec<f32> = (0..n)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let phase = 2.0 * PI * (f0_hz * t + 0.5 * rate * t * t);
            (amplitude * phase.sin()) as f32
        })
        .collect();
    apply_ramps(&mut samples, len(sample_rate, duration_s * 0.05));
    samples
}

/// Deterministic low-level noise (linear congruential generator).
pub fn noise(n: usize, amplitude: f64, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..n)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
            (amplitude * (2.0 * unit - 1.0)) as f32
        })
        .collect()
}

/// Silent buffer of `duration_s` with `signal` mixed in at `offset_s`.
pub fn place(sample_rate: u32, duration_s: f64, parts: &[(f64, &[f32])]) -> Vec<f32> {
    let mut buffer = vec![0.0f32; len(sample_rate, duration_s)];
    for (offset_s, signal) in parts {
        let start = len(sample_rate, *offset_s);
        for (slot, &s) in buffer.iter_mut().skip(start).zip(signal.iter()) {
            *slot += s;
        }
    }
    buffer
}

fn apply_ramps(samples: &mut [f32], ramp: usize) {
    let n = samples.len();
    if ramp == 0 || 2 * ramp > n {
        return;
    }
    for i in 0..ramp {
        let gain = (0.5 * (1.0 - (PI * i as f64 / ramp as f64).cos())) as f32;
        samples[i] *= gain;
        samples[n - 1 - i] *= gain;
    }
}

/// Hand-built spectrogram with one ridge per frame: `(freq_hz, power_db)`
/// sets the nearest bin, its two neighbours sit 6 dB lower, everything
/// else is -100 dB. Bins span 10–100 kHz at 500 Hz.
pub fn ridge_spectrogram(track: &[(f64, f64)], hop_seconds: f64) -> crate::transform::Spectrogram {
    let frequencies: Vec<f64> = (20..=200).map(|k| k as f64 * 500.0).collect();
    let frames = track
        .iter()
        .map(|&(freq_hz, power_db)| {
            let mut row = vec![-100.0; frequencies.len()];
            let bin = ((freq_hz - 10_000.0) / 500.0).round() as usize;
            row[bin] = power_db;
            if bin > 0 {
                row[bin - 1] = power_db - 6.0;
            }
            if bin + 1 < row.len() {
                row[bin + 1] = power_db - 6.0;
            }
            row
        })
        .collect();

    crate::transform::Spectrogram {
        frames,
        times: (0..track.len()).map(|i| i as f64 * hop_seconds).collect(),
        frequencies,
        freq_resolution: 500.0,
        hop_seconds,
    }
}
