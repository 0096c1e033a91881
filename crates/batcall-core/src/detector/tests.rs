//! Tests for the detection pipeline

use super::*;
use crate::call::{CallType, SignalQuality};
use crate::snr::SnrMethod;
use crate::test_signals::{noise, place, sweep, tapered_tone, tone};
use crate::threshold::{SAFETY_THRESHOLD_DB, SWEEP_END_DB, SWEEP_START_DB};
use crate::transform::FftBackend;
use approx::assert_relative_eq;

const SAMPLE_RATE: u32 = 256_000;
const FLOW_KHZ: f64 = 10.0;
const FHIGH_KHZ: f64 = 128.0;

fn detect(config: DetectionConfig, samples: &[f32]) -> Vec<BatCall> {
    BatCallDetector::new(config)
        .detect_calls(samples, SAMPLE_RATE, FLOW_KHZ, FHIGH_KHZ)
        .unwrap()
}

/// 5 ms tone at 40 kHz inside 20 ms of silence.
fn cf_clip() -> Vec<f32> {
    let call = tapered_tone(40_000.0, SAMPLE_RATE, 0.005, 0.5, 0.0005);
    place(SAMPLE_RATE, 0.02, &[(0.006, &call)])
}

/// 3 ms linear sweep 80 → 20 kHz inside 20 ms of silence.
fn fm_clip() -> Vec<f32> {
    let call = sweep(80_000.0, 20_000.0, SAMPLE_RATE, 0.003, 0.5);
    place(SAMPLE_RATE, 0.02, &[(0.006, &call)])
}

fn manual_thresholds() -> DetectionConfig {
    DetectionConfig {
        high_freq_threshold_auto: false,
        low_freq_threshold_auto: false,
        ..Default::default()
    }
}

fn assert_invariants(call: &BatCall) {
    assert!(call.low_freq_khz <= call.peak_freq_khz, "{call:?}");
    assert!(call.peak_freq_khz <= call.high_freq_khz, "{call:?}");
    assert!(call.duration_ms > 0.0);
    assert!(call.end_time_s > call.start_time_s);
    for threshold in [call.high_freq_threshold_db_used, call.low_freq_threshold_db_used] {
        assert!(
            (SWEEP_END_DB..=SWEEP_START_DB).contains(&threshold) || threshold == SAFETY_THRESHOLD_DB,
            "threshold {threshold}"
        );
    }
}

#[test]
fn test_empty_buffer() {
    assert!(detect(DetectionConfig::default(), &[]).is_empty());
}

#[test]
fn test_buffer_shorter_than_fft() {
    let samples = tapered_tone(40_000.0, SAMPLE_RATE, 0.001, 0.5, 0.0001);
    assert!(detect(DetectionConfig::default(), &samples).is_empty());
}

#[test]
fn test_silence() {
    assert!(detect(DetectionConfig::default(), &vec![0.0; 5120]).is_empty());
    assert!(detect(DetectionConfig::default(), &noise(5120, 1e-5, 7)).is_empty());
}

#[test]
fn test_cf_tone() {
    let calls = detect(DetectionConfig::default(), &cf_clip());

    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert!((call.peak_freq_khz - 40.0).abs() <= 0.5, "peak {}", call.peak_freq_khz);
    assert_eq!(call.call_type, CallType::Cf, "bandwidth {}", call.bandwidth_khz);
    assert_invariants(call);
    assert!(call.start_time_s < 0.007 && call.end_time_s > 0.010);
}

#[test]
fn test_pure_tone_buffer() {
    // Every frame sees the steady 40 kHz tone
    let samples = tone(40_000.0, SAMPLE_RATE, 0.005, 0.5);
    let calls = detect(DetectionConfig::default(), &samples);

    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    assert!((call.peak_freq_khz - 40.0).abs() <= 0.5, "peak {}", call.peak_freq_khz);
    assert_eq!(call.call_type, CallType::Cf, "bandwidth {}", call.bandwidth_khz);
    assert!(call.bandwidth_khz < 2.0);
    assert_invariants(call);
}

#[test]
fn test_cf_tone_is_classified_cf() {
    let calls = detect(manual_thresholds(), &cf_clip());

    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].call_type, CallType::Cf);
    assert!(calls[0].bandwidth_khz < 5.0);
    assert_eq!(calls[0].high_freq_threshold_db_used, -24.0);
}

#[test]
fn test_fm_sweep() {
    let calls = detect(manual_thresholds(), &fm_clip());

    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    // A 512-point frame spans 2 ms, 40 kHz of this sweep, so the onset and
    // offset frames read slightly outside the nominal band edges.
    assert!(call.start_freq_khz > 80.0 && call.start_freq_khz < 85.5, "start {}", call.start_freq_khz);
    assert!(call.end_freq_khz > 17.5 && call.end_freq_khz < 20.5, "end {}", call.end_freq_khz);
    assert_eq!(call.call_type, CallType::Fm);
    assert_invariants(call);
}

#[test]
fn test_fm_sweep_with_auto_thresholds() {
    let calls = detect(DetectionConfig::default(), &fm_clip());

    assert_eq!(calls.len(), 1);
    let call = &calls[0];
    // Window leakage drifts the High Frequency reading; the search backs off
    // to the safety threshold instead of following it to -60 dB.
    assert_eq!(call.high_freq_threshold_db_used, SAFETY_THRESHOLD_DB);
    assert!(call.start_freq_khz > 80.0 && call.start_freq_khz < 90.0, "start {}", call.start_freq_khz);
    assert!(call.end_freq_khz > 15.5 && call.end_freq_khz < 21.0, "end {}", call.end_freq_khz);
    assert_eq!(call.call_type, CallType::Fm);
    assert_invariants(call);
}

#[test]
fn test_two_bursts_in_time_order() {
    let burst = tapered_tone(45_000.0, SAMPLE_RATE, 0.002, 0.5, 0.0003);
    let samples = place(SAMPLE_RATE, 0.02, &[(0.003, &burst), (0.010, &burst)]);
    let calls = detect(DetectionConfig::default(), &samples);

    assert_eq!(calls.len(), 2);
    assert!(calls[0].end_time_s <= calls[1].start_time_s);
    assert!(calls[0].end_frame < calls[1].start_frame);
    for call in &calls {
        assert!((call.peak_freq_khz - 45.0).abs() <= 0.5);
        assert_invariants(call);
    }
}

#[test]
fn test_detection_is_idempotent() {
    let detector = BatCallDetector::new(DetectionConfig::default());
    let samples = fm_clip();
    let first = detector.detect_calls(&samples, SAMPLE_RATE, FLOW_KHZ, FHIGH_KHZ).unwrap();
    let second = detector.detect_calls(&samples, SAMPLE_RATE, FLOW_KHZ, FHIGH_KHZ).unwrap();

    assert_eq!(first, second);
    assert_eq!(detector.config(), &DetectionConfig::default());
}

#[test]
fn test_time_expansion_scales_output() {
    let plain = detect(DetectionConfig::default(), &cf_clip());
    let expanded = detect(
        DetectionConfig {
            time_expansion: true,
            ..Default::default()
        },
        &cf_clip(),
    );

    assert_eq!(plain.len(), expanded.len());
    let (p, e) = (&plain[0], &expanded[0]);
    assert_relative_eq!(e.peak_freq_khz, p.peak_freq_khz * 10.0, max_relative = 1e-12);
    assert_relative_eq!(e.duration_ms, p.duration_ms / 10.0, max_relative = 1e-12);
    assert_eq!(e.snr_db, p.snr_db);

    let restored = e.time_expanded(0.1);
    assert_relative_eq!(restored.low_freq_khz, p.low_freq_khz, max_relative = 1e-12);
    assert_relative_eq!(restored.start_time_s, p.start_time_s, max_relative = 1e-12);
}

#[test]
fn test_snr_on_silent_background() {
    let calls = detect(DetectionConfig::default(), &cf_clip());
    let snr = &calls[0].snr;

    assert_eq!(snr.method, SnrMethod::Rms);
    assert!(snr.signal_bins >= 3);
    assert!(snr.noise_bins > 0);
    assert!(calls[0].snr_db > 30.0);
    assert_eq!(calls[0].quality, SignalQuality::Excellent);
    assert_relative_eq!(calls[0].noise_floor_db, -80.0);
}

#[test]
fn test_noise_reference() {
    let detector = BatCallDetector::new(DetectionConfig::default());
    let reference = noise(2560, 1e-3, 3);
    let calls = detector
        .detect_calls_with_noise_reference(&cf_clip(), SAMPLE_RATE, FLOW_KHZ, FHIGH_KHZ, Some(&reference))
        .unwrap();

    assert_eq!(calls.len(), 1);
    let snr = &calls[0].snr;
    // (2560 - 512) / 16 + 1 frames of the full band
    assert_eq!(snr.noise_bins, 129 * calls[0].freq_axis_hz.len());
    assert!(snr.snr_db.is_finite());
    assert_eq!(snr.quality, SignalQuality::Excellent);
}

#[test]
fn test_highpass_remeasures_call() {
    let config = DetectionConfig {
        enable_highpass_filter: true,
        ..Default::default()
    };
    let call = tapered_tone(45_000.0, SAMPLE_RATE, 0.004, 0.5, 0.0005);
    let samples = place(SAMPLE_RATE, 0.02, &[(0.006, &call)]);
    let calls = detect(config, &samples);

    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].highpass_cutoff_khz, Some(30.0));
    assert!((calls[0].peak_freq_khz - 45.0).abs() <= 0.5);
    assert_invariants(&calls[0]);
}

#[test]
fn test_fft_backend_matches_reference() {
    let samples = cf_clip();
    let reference = detect(DetectionConfig::default(), &samples);
    let accelerated = BatCallDetector::with_backend(DetectionConfig::default(), FftBackend)
        .detect_calls(&samples, SAMPLE_RATE, FLOW_KHZ, FHIGH_KHZ)
        .unwrap();

    assert_eq!(reference.len(), accelerated.len());
    assert_relative_eq!(reference[0].peak_freq_khz, accelerated[0].peak_freq_khz, epsilon = 1e-6);
    assert_eq!(reference[0].start_frame, accelerated[0].start_frame);
}

#[test]
fn test_retained_spectrogram_matches_call_frames() {
    let calls = detect(DetectionConfig::default(), &cf_clip());
    let call = &calls[0];

    assert_eq!(call.spectrogram.len(), call.end_frame - call.start_frame + 1);
    assert_eq!(call.time_axis_s.len(), call.spectrogram.len());
    assert_eq!(call.freq_axis_hz.len(), call.spectrogram[0].len());
    assert_relative_eq!(call.time_axis_s[0], call.start_time_s);
}

#[test]
fn test_input_errors() {
    let detector = BatCallDetector::new(DetectionConfig::default());
    let samples = cf_clip();

    assert!(matches!(
        detector.detect_calls(&samples, 0, FLOW_KHZ, FHIGH_KHZ),
        Err(Error::InvalidSampleRate(0))
    ));
    assert!(matches!(
        detector.detect_calls(&samples, SAMPLE_RATE, 90.0, 40.0),
        Err(Error::InvalidBand { .. })
    ));
    // Above Nyquist once clamped
    assert!(matches!(
        detector.detect_calls(&samples, SAMPLE_RATE, 150.0, 200.0),
        Err(Error::InvalidBand { .. })
    ));
    // Upper edge beyond Nyquist is clamped, not rejected
    assert_eq!(detector.detect_calls(&samples, SAMPLE_RATE, FLOW_KHZ, 500.0).unwrap().len(), 1);

    let bad = BatCallDetector::new(DetectionConfig {
        fft_size: 4,
        ..Default::default()
    });
    assert!(matches!(
        bad.detect_calls(&samples, SAMPLE_RATE, FLOW_KHZ, FHIGH_KHZ),
        Err(Error::InvalidConfig { .. })
    ));
}
