//! batdetect - Bat echolocation call detector
//!
//! Usage: batdetect [OPTIONS] <INPUT>...

use anyhow::{Context, Result};
use batcall_cli::audio::{decode_wav, AudioData};
use batcall_cli::output::{print_json_report, FileReport, Report};
use batcall_core::{BatCallDetector, DetectionConfig, FftBackend, SpectrumBackend};
use clap::{Parser, ValueEnum};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Reference per-bin Goertzel transform
    Goertzel,
    /// FFT transform (rustfft)
    Fft,
}

#[derive(Parser, Debug)]
#[command(name = "batdetect")]
#[command(about = "Detect and measure bat echolocation calls in WAV recordings", long_about = None)]
struct Args {
    /// Input WAV files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Lower edge of the analysis band (kHz)
    #[arg(long, default_value_t = 10.0)]
    flow: f64,

    /// Upper edge of the analysis band (kHz), defaults to Nyquist
    #[arg(long)]
    fhigh: Option<f64>,

    /// Detection config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Noise-only WAV recording used as the SNR noise reference
    #[arg(long)]
    noise: Option<PathBuf>,

    /// Spectrum transform
    #[arg(long, value_enum, default_value_t = Backend::Goertzel)]
    backend: Backend,

    /// Treat inputs as time-expanded recordings
    #[arg(long)]
    time_expansion: bool,

    /// Keep each call's spectrogram slice in the JSON output
    #[arg(long)]
    include_spectrogram: bool,

    /// Enable verbose logging (-vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Default: no logs (clean JSON output for parsing)
    let level = match args.verbose {
        0 => log::LevelFilter::Off,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let mut config = match &args.config {
        Some(path) => DetectionConfig::from_file(path)?,
        None => DetectionConfig::default(),
    };
    if args.time_expansion {
        config.time_expansion = true;
    }
    config.validate()?;

    let noise = args
        .noise
        .as_deref()
        .map(decode_wav)
        .transpose()
        .context("Failed to load noise reference")?;

    let report = match args.backend {
        Backend::Goertzel => run(&BatCallDetector::new(config), &args, noise.as_ref())?,
        Backend::Fft => run(&BatCallDetector::with_backend(config, FftBackend), &args, noise.as_ref())?,
    };

    log::info!(
        "Found {} calls in {} files",
        report.total_calls(),
        report.files.len()
    );
    print_json_report(&report);

    Ok(())
}

fn run<B: SpectrumBackend + Sync>(
    detector: &BatCallDetector<B>,
    args: &Args,
    noise: Option<&AudioData>,
) -> Result<Report> {
    let files = args
        .inputs
        .par_iter()
        .map(|input| process_file(detector, input, args, noise))
        .collect::<Result<Vec<_>>>()?;

    Ok(Report { files })
}

fn process_file<B: SpectrumBackend>(
    detector: &BatCallDetector<B>,
    input: &Path,
    args: &Args,
    noise: Option<&AudioData>,
) -> Result<FileReport> {
    let start = std::time::Instant::now();
    let audio = decode_wav(input)?;
    let samples = audio.to_mono();

    let noise_samples = noise.and_then(|n| {
        if n.sample_rate == audio.sample_rate {
            Some(n.to_mono())
        } else {
            log::warn!(
                "Noise reference is {} Hz but {} is {} Hz, ignoring it",
                n.sample_rate,
                input.display(),
                audio.sample_rate
            );
            None
        }
    });

    let nyquist_khz = audio.sample_rate as f64 / 2000.0;
    let calls = detector
        .detect_calls_with_noise_reference(
            &samples,
            audio.sample_rate,
            args.flow,
            args.fhigh.unwrap_or(nyquist_khz),
            noise_samples.as_deref(),
        )
        .with_context(|| format!("Detection failed for {}", input.display()))?;

    log::info!(
        "{}: {} calls in {:.2}s",
        input.display(),
        calls.len(),
        start.elapsed().as_secs_f64()
    );

    let calls = if args.include_spectrogram {
        calls
    } else {
        calls.into_iter().map(|c| c.without_spectrogram()).collect()
    };

    Ok(FileReport {
        input: input.display().to_string(),
        sample_rate: audio.sample_rate,
        duration_ms: audio.duration_ms(),
        calls,
    })
}
