//! Call boundaries: peak location, threshold crossings and end-frame scanning

use super::CallView;
use std::ops::RangeInclusive;

/// A frame counts as declining once its energy is this far below the call maximum.
const DECLINE_ONSET_DB: f64 = 1.0;
/// Energy rise over the running minimum treated as an echo.
const REBOUNCE_RISE_DB: f64 = 0.5;
/// Energy this far below the call maximum, for good, ends the call.
const DECAY_FLOOR_DB: f64 = 18.0;

/// Global spectrogram peak of one call
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Peak {
    pub frame: usize,
    pub bin: usize,
    pub power_db: f64,
    /// Sub-bin frequency from parabolic interpolation
    pub freq_hz: f64,
}

/// Frequency where a threshold is crossed, and the frame it was found in
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Crossing {
    pub frame: usize,
    pub freq_hz: f64,
}

/// Which rule fixed the end frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndRule {
    FrequencyDrop,
    Rebounce,
    Decay,
    Threshold,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct EndScanOptions {
    pub anti_rebounce: bool,
    pub max_frequency_drop_hz: f64,
    pub protection_window_ms: f64,
}

/// Offset (in bins, within ±0.5) of the vertex of the parabola through three points.
pub(crate) fn parabolic_offset(alpha: f64, beta: f64, gamma: f64) -> f64 {
    let denom = alpha - 2.0 * beta + gamma;
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (0.5 * (alpha - gamma) / denom).clamp(-0.5, 0.5)
}

/// Linear interpolation of where `threshold` falls between an above-threshold
/// bin and its below-threshold neighbour.
fn interpolate_crossing(freq_above: f64, power_above: f64, freq_below: f64, power_below: f64, threshold: f64) -> f64 {
    let span = power_above - power_below;
    if span <= 0.0 {
        return freq_above;
    }
    let frac = ((power_above - threshold) / span).clamp(0.0, 1.0);
    freq_above + frac * (freq_below - freq_above)
}

pub(crate) fn find_peak(view: &CallView) -> Peak {
    let (frame, &(bin, power_db)) = view
        .peaks
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, &(usize, f64))>, (i, p)| match best {
            Some((_, b)) if b.1 >= p.1 => best,
            _ => Some((i, p)),
        })
        .unwrap_or((0, &(0, f64::NEG_INFINITY)));

    Peak {
        frame,
        bin,
        power_db,
        freq_hz: view.interpolated_frequency(frame, bin),
    }
}

/// First frame in `range` whose peak power exceeds `threshold`.
pub(crate) fn first_frame_above(view: &CallView, threshold: f64, range: RangeInclusive<usize>) -> Option<usize> {
    range.into_iter().find(|&i| view.peaks[i].1 > threshold)
}

/// Latest frame in `range` still carrying any bin above `threshold`.
/// Interior dips below the threshold are bridged.
pub(crate) fn last_frame_above(view: &CallView, threshold: f64, range: RangeInclusive<usize>) -> Option<usize> {
    range.into_iter().rev().find(|&i| view.peaks[i].1 > threshold)
}

/// Highest frequency above `threshold` across `frames`, scanning each
/// frame from the top bin down.
pub(crate) fn high_crossing(view: &CallView, frames: RangeInclusive<usize>, threshold: f64) -> Option<Crossing> {
    let freqs = &view.spec.frequencies;
    let mut best: Option<Crossing> = None;

    for frame in frames {
        let row = &view.spec.frames[frame];
        let Some(bin) = (0..row.len()).rev().find(|&b| row[b] > threshold) else {
            continue;
        };
        let freq_hz = if bin + 1 < row.len() {
            interpolate_crossing(freqs[bin], row[bin], freqs[bin + 1], row[bin + 1], threshold)
        } else {
            freqs[bin]
        };
        if best.map_or(true, |b| freq_hz > b.freq_hz) {
            best = Some(Crossing { frame, freq_hz });
        }
    }

    best
}

/// Lowest frequency above `threshold` in one frame, scanning from the bottom bin up.
pub(crate) fn low_crossing(view: &CallView, frame: usize, threshold: f64) -> Option<f64> {
    let freqs = &view.spec.frequencies;
    let row = &view.spec.frames[frame];
    let bin = (0..row.len()).find(|&b| row[b] > threshold)?;
    Some(if bin > 0 {
        interpolate_crossing(freqs[bin], row[bin], freqs[bin - 1], row[bin - 1], threshold)
    } else {
        freqs[bin]
    })
}

/// Nominal end frame, scanning forward from the peak.
///
/// With anti-rebounce enabled two rules compete and the first to fire wins:
/// a per-frame peak frequency drop larger than the configured limit inside
/// the protection window (FM), or an energy rebound after a sustained decline
/// (CF/QCF echo). Energy staying below `max - 18 dB` also ends the call.
/// Otherwise, and when disabled, the last frame above `end_threshold` is used.
pub(crate) fn find_end_frame(
    view: &CallView,
    peak_frame: usize,
    end_threshold: f64,
    options: EndScanOptions,
) -> (usize, EndRule) {
    let last = view.num_frames() - 1;
    let above = last_frame_above(view, end_threshold, peak_frame..=last).unwrap_or(peak_frame);

    if !options.anti_rebounce {
        return (above, EndRule::Threshold);
    }

    let energy = &view.energy_db;
    let max_energy = energy[peak_frame..=last]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let decay_floor = max_energy - DECAY_FLOOR_DB;

    let mut declining = false;
    let mut running_min = energy[peak_frame];

    for i in peak_frame + 1..=last {
        let (prev_power, power) = (view.peaks[i - 1].1, view.peaks[i].1);

        let elapsed_ms = view.time_ms(i, peak_frame);
        if elapsed_ms <= options.protection_window_ms && power > end_threshold && prev_power > end_threshold {
            let drop_hz = view.frame_frequency(i - 1) - view.frame_frequency(i);
            if drop_hz > options.max_frequency_drop_hz {
                return ((i - 1).min(above), EndRule::FrequencyDrop);
            }
        }

        let e = energy[i];
        if declining {
            if e > running_min + REBOUNCE_RISE_DB {
                return ((i - 1).min(above), EndRule::Rebounce);
            }
            running_min = running_min.min(e);
        } else if e < max_energy - DECLINE_ONSET_DB {
            declining = true;
            running_min = e;
        }

        if e < decay_floor && energy[i..].iter().all(|&later| later < decay_floor) {
            return ((i - 1).min(above), EndRule::Decay);
        }
    }

    (above, EndRule::Threshold)
}
