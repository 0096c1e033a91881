//! Call shape: characteristic frequency, knee point and call type

use super::CallView;
use crate::call::CallType;
use crate::transform::db_to_power;

/// Smallest |incoming slope| (kHz/ms) that counts as an FM sweep into a knee.
const KNEE_MIN_INCOMING_SLOPE: f64 = 1.0;
/// Outgoing slope must be at most this share of the incoming one.
const KNEE_FLATTENING_RATIO: f64 = 0.7;
/// Peak curvature below this many standard deviations of the curvature is weak.
const KNEE_CURVATURE_SIGMA: f64 = 0.3;
/// Time window (fraction of the trajectory) searched by the slope fallback.
const KNEE_FALLBACK_WINDOW: (f64, f64) = (0.3, 0.9);
/// Bins within this many dB of a frame maximum feed the weighted-mean fallback.
const WEIGHTED_MEAN_SPAN_DB: f64 = 6.0;
/// Bandwidth (kHz) below which a call is constant-frequency.
const CF_MAX_BANDWIDTH_KHZ: f64 = 5.0;

/// CF→FM transition point, time relative to call start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knee {
    pub freq_hz: f64,
    pub time_ms: f64,
}

/// Characteristic frequency: the most stable point of the per-frame peak
/// frequency trajectory within the last `percent_end` of the call.
///
/// Only frames above `active_threshold` take part. With fewer than two such
/// frames the power-weighted mean frequency of the tail is used instead.
/// Returns `(freq_hz, time_ms)`.
pub(crate) fn characteristic_frequency(
    view: &CallView,
    start: usize,
    end: usize,
    percent_end: f64,
    active_threshold: f64,
) -> (f64, f64) {
    let span_ms = view.time_ms(end, start);
    let tail_start_ms = span_ms * (1.0 - percent_end / 100.0);
    let window: Vec<usize> = (start..=end)
        .filter(|&i| view.time_ms(i, start) >= tail_start_ms - 1e-9)
        .collect();

    let active: Vec<usize> = window
        .iter()
        .copied()
        .filter(|&i| view.peaks[i].1 > active_threshold)
        .collect();

    if active.len() >= 2 {
        let mut best: Option<(f64, usize, usize)> = None;
        for pair in active.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let dt_ms = view.time_ms(b, a);
            if dt_ms <= 0.0 {
                continue;
            }
            let slope = (view.frame_frequency(b) - view.frame_frequency(a)) / 1000.0 / dt_ms;
            if best.map_or(true, |(s, _, _)| slope.abs() < s) {
                best = Some((slope.abs(), a, b));
            }
        }
        if let Some((_, a, b)) = best {
            let freq = 0.5 * (view.frame_frequency(a) + view.frame_frequency(b));
            return (freq, view.time_ms(a, start));
        }
    }

    weighted_mean_frequency(view, &window, start)
}

fn weighted_mean_frequency(view: &CallView, window: &[usize], start: usize) -> (f64, f64) {
    let freqs = &view.spec.frequencies;
    let mut weighted = 0.0;
    let mut total = 0.0;
    for &i in window {
        let frame_max = view.peaks[i].1;
        for (bin, &power) in view.spec.frames[i].iter().enumerate() {
            if power >= frame_max - WEIGHTED_MEAN_SPAN_DB {
                let w = db_to_power(power);
                weighted += w * freqs[bin];
                total += w;
            }
        }
    }

    let mid = window.get(window.len() / 2).copied().unwrap_or(start);
    if total > 0.0 {
        (weighted / total, view.time_ms(mid, start))
    } else {
        (view.frame_frequency(mid), view.time_ms(mid, start))
    }
}

/// 5-point quadratic Savitzky-Golay smoothing; the two samples at each edge
/// are kept as they are.
pub(crate) fn savitzky_golay_5(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut smoothed = values.to_vec();
    if n < 5 {
        return smoothed;
    }
    for i in 2..n - 2 {
        smoothed[i] = (-3.0 * values[i - 2] + 12.0 * values[i - 1] + 17.0 * values[i]
            + 12.0 * values[i + 1]
            - 3.0 * values[i + 2])
            / 35.0;
    }
    smoothed
}

/// Locate the FM→CF knee between `start` and `end`.
///
/// The smoothed peak-frequency trajectory is differentiated twice and the
/// frame of maximum curvature `|f''| / (1 + f'²)^1.5` is taken, provided the
/// slope into it is steeply negative and the slope out of it is at least 30%
/// flatter. Weak or rejected curvature falls back to the steepest frame in
/// the 30–90% window under the same check.
pub(crate) fn find_knee(view: &CallView, start: usize, end: usize, duration_ms: f64) -> Option<Knee> {
    if end < start + 4 {
        return None;
    }
    let dt = view.hop_ms();
    if !(dt > 0.0) {
        return None;
    }

    let trajectory: Vec<f64> = (start..=end).map(|i| view.frame_frequency(i) / 1000.0).collect();
    let s = savitzky_golay_5(&trajectory);
    let n = s.len();

    let d1: Vec<f64> = (0..n)
        .map(|i| match i {
            0 => (s[1] - s[0]) / dt,
            i if i == n - 1 => (s[n - 1] - s[n - 2]) / dt,
            i => (s[i + 1] - s[i - 1]) / (2.0 * dt),
        })
        .collect();
    let curvature: Vec<f64> = (0..n)
        .map(|i| {
            if i == 0 || i == n - 1 {
                return 0.0;
            }
            let d2 = (s[i + 1] - 2.0 * s[i] + s[i - 1]) / (dt * dt);
            d2.abs() / (1.0 + d1[i] * d1[i]).powf(1.5)
        })
        .collect();

    let is_valid = |k: usize| {
        let incoming = (s[k] - s[k - 2]) / (2.0 * dt);
        let outgoing = (s[k + 2] - s[k]) / (2.0 * dt);
        incoming < -KNEE_MIN_INCOMING_SLOPE
            && outgoing >= incoming
            && outgoing.abs() <= KNEE_FLATTENING_RATIO * incoming.abs()
    };

    let candidates = 2..=n - 3;
    let k_max = candidates
        .clone()
        .fold(None, |best: Option<usize>, i| match best {
            Some(b) if curvature[b] >= curvature[i] => best,
            _ => Some(i),
        })?;

    let count = candidates.clone().count() as f64;
    let mean = candidates.clone().map(|i| curvature[i]).sum::<f64>() / count;
    let std = (candidates
        .clone()
        .map(|i| (curvature[i] - mean).powi(2))
        .sum::<f64>()
        / count)
        .sqrt();

    let knee_idx = if !curvature_is_weak(curvature[k_max], std) && is_valid(k_max) {
        Some(k_max)
    } else {
        let lo = ((KNEE_FALLBACK_WINDOW.0 * (n - 1) as f64).ceil() as usize).max(2);
        let hi = ((KNEE_FALLBACK_WINDOW.1 * (n - 1) as f64).floor() as usize).min(n - 3);
        (lo..=hi)
            .fold(None, |best: Option<usize>, i| match best {
                Some(b) if d1[b].abs() >= d1[i].abs() => best,
                _ => Some(i),
            })
            .filter(|&k| is_valid(k))
    }?;

    let time_ms = view.time_ms(start + knee_idx, start);
    if time_ms > 0.0 && time_ms < duration_ms {
        Some(Knee {
            freq_hz: s[knee_idx] * 1000.0,
            time_ms,
        })
    } else {
        None
    }
}

fn curvature_is_weak(peak: f64, std: f64) -> bool {
    !peak.is_finite() || peak < KNEE_CURVATURE_SIGMA * std
}

/// Classify by bandwidth and the presence of an extended CF phase.
pub(crate) fn classify(bandwidth_hz: f64, extended_cf: bool) -> CallType {
    if bandwidth_hz / 1000.0 < CF_MAX_BANDWIDTH_KHZ {
        CallType::Cf
    } else if extended_cf {
        CallType::CfFm
    } else {
        CallType::Fm
    }
}
