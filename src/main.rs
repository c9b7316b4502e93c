//! Driftmeasure - command line drift measurement
//!
//! Reads interleaved 32-bit float audio (raw file, stdin or, with the
//! `capture` feature, a live input device) and writes one CSV line per
//! detected reference pulse.

use anyhow::{Context, Result};
use clap::Parser;
use driftmeasure::config::RunConfig;
use driftmeasure::input::FrameReader;
use driftmeasure::{DriftMeasure, StreamFormat, UndetectedPeakHandling, WriterSink};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Measures timing drift between audio channels using calibration pulses
#[derive(Parser, Debug)]
#[command(name = "driftmeasure", version, about)]
struct Args {
    /// Raw F32LE interleaved input file ("-" for stdin)
    #[arg(default_value = "-")]
    input: String,

    /// CSV output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON config file to load settings from
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings to this JSON file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Sample rate of the input, in Hz
    #[arg(short = 'r', long)]
    sample_rate: Option<u32>,

    /// Number of interleaved channels (at least 2)
    #[arg(short = 'c', long = "num-channels")]
    channels: Option<u32>,

    /// Channel that carries the reference pulses (0 - num_channels-1)
    #[arg(long)]
    reference_channel: Option<u32>,

    /// Amplitude threshold below which peaks are ignored (0.0 - 1.0)
    #[arg(long)]
    peak_threshold: Option<f32>,

    /// Length of the pulse whose peak shall be detected, in microseconds
    #[arg(long)]
    pulse_length: Option<u64>,

    /// Size of window for peak detection, in milliseconds
    #[arg(long)]
    window_size: Option<u64>,

    /// What to write when a channel has no peak: no-value, last-value, fill-value
    #[arg(long)]
    undetected_peak_handling: Option<UndetectedPeakHandling>,

    /// Drift value (ns) written by the fill-value policy
    #[arg(long, allow_hyphen_values = true)]
    fill_value: Option<i64>,

    /// Write nothing if no non-reference channel has a peak (true/false)
    #[arg(long, value_name = "BOOL")]
    omit_output_if_no_peaks: Option<bool>,

    /// Frames per processed batch
    #[arg(long)]
    block_frames: Option<usize>,

    /// Capture from a live input device instead of reading INPUT
    #[cfg(feature = "capture")]
    #[arg(long)]
    capture: bool,

    /// Input device name for --capture (default: system default)
    #[cfg(feature = "capture")]
    #[arg(short = 's', long)]
    device: Option<String>,

    /// Also record the captured audio to this WAV file
    #[cfg(feature = "capture")]
    #[arg(short = 'w', long)]
    output_wav: Option<PathBuf>,

    /// List available input devices
    #[cfg(feature = "capture")]
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    /// Apply command line overrides on top of file settings
    fn apply(&self, config: &mut RunConfig) {
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            config.channels = channels;
        }
        if let Some(block_frames) = self.block_frames {
            config.block_frames = block_frames;
        }
        let analysis = &mut config.analysis;
        if let Some(channel) = self.reference_channel {
            analysis.reference_channel = channel;
        }
        if let Some(threshold) = self.peak_threshold {
            analysis.peak_threshold = threshold;
        }
        if let Some(us) = self.pulse_length {
            analysis.pulse_length_ns = us.saturating_mul(1_000);
        }
        if let Some(ms) = self.window_size {
            analysis.window_size_ns = ms.saturating_mul(1_000_000);
        }
        if let Some(handling) = self.undetected_peak_handling {
            analysis.undetected_peak_handling = handling;
        }
        if let Some(fill) = self.fill_value {
            analysis.undetected_peak_fill_value = fill;
        }
        if let Some(omit) = self.omit_output_if_no_peaks {
            analysis.omit_output_if_no_peaks = omit;
        }
    }

    /// Settings from the config file with command line overrides, validated
    /// and (with `--save-config`) saved
    fn effective_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        self.apply(&mut config);

        config.analysis.validate()?;
        StreamFormat::interleaved(config.channels, config.sample_rate).validate()?;
        config
            .analysis
            .validate_reference_channel(config.channels)?;

        if let Some(path) = &self.save_config {
            config.save(path)?;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only CSV
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("driftmeasure=info".parse()?),
        )
        .init();

    let args = Args::parse();

    #[cfg(feature = "capture")]
    if args.list_devices {
        return list_devices();
    }

    let config = args.effective_config()?;

    info!(
        version = driftmeasure::VERSION,
        build_date = driftmeasure::BUILD_DATE,
        channels = config.channels,
        sample_rate = config.sample_rate,
        reference_channel = config.analysis.reference_channel,
        "driftmeasure starting"
    );

    let engine = DriftMeasure::new(config.analysis.clone())?;
    engine.set_format(StreamFormat::interleaved(config.channels, config.sample_rate))?;

    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("could not create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };
    let mut sink = WriterSink::new(output);

    let running = Arc::new(AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_running.store(false, Ordering::SeqCst);
    })
    .context("could not install Ctrl+C handler")?;

    #[cfg(feature = "capture")]
    if args.capture {
        run_capture(
            &engine,
            &config,
            args.device.as_deref(),
            args.output_wav.as_deref(),
            &running,
            &mut sink,
        )?;
        engine.end_of_stream();
        info!(records = sink.records_written(), "capture finished");
        return Ok(());
    }

    let input: Box<dyn Read> = if args.input == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(
            File::open(&args.input).with_context(|| format!("could not open {}", args.input))?,
        )
    };

    let frames = run_reader(&engine, &config, input, &running, &mut sink)?;
    engine.end_of_stream();

    info!(
        frames,
        records = sink.records_written(),
        "input finished"
    );
    Ok(())
}

/// Feed the engine from a raw frame stream until end of input or Ctrl+C
fn run_reader<W: Write>(
    engine: &DriftMeasure,
    config: &RunConfig,
    input: impl Read,
    running: &AtomicBool,
    sink: &mut WriterSink<W>,
) -> Result<u64> {
    let mut reader = FrameReader::new(input, config.channels as usize, config.block_frames);

    while running.load(Ordering::SeqCst) {
        let Some(block) = reader.next_block()? else {
            break;
        };
        engine.process(block, &mut *sink)?;
    }

    if !running.load(Ordering::SeqCst) {
        warn!("interrupted, stopping");
    }
    Ok(reader.frames_read())
}

#[cfg(feature = "capture")]
fn run_capture<W: Write>(
    engine: &DriftMeasure,
    config: &RunConfig,
    device: Option<&str>,
    wav_path: Option<&std::path::Path>,
    running: &AtomicBool,
    sink: &mut WriterSink<W>,
) -> Result<()> {
    use driftmeasure::capture::{Capture, WavRecorder};
    use std::time::Duration;

    let channels = u16::try_from(config.channels).context("channel count too large")?;
    let mut recorder = wav_path
        .map(|path| WavRecorder::create(path, channels, config.sample_rate))
        .transpose()?;
    let (capture, blocks) = Capture::start(device, channels, config.sample_rate)?;

    while running.load(Ordering::SeqCst) {
        match blocks.recv_timeout(Duration::from_millis(100)) {
            Ok(block) => {
                if let Some(recorder) = recorder.as_mut() {
                    recorder.write_block(&block)?;
                }
                engine.process(&block, &mut *sink)?;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    let dropped = capture.dropped_blocks();
    if dropped > 0 {
        warn!(dropped, "capture blocks dropped; analysis did not keep up");
    }
    if let Some(recorder) = recorder {
        recorder.finalize()?;
    }
    Ok(())
}

#[cfg(feature = "capture")]
fn list_devices() -> Result<()> {
    let devices = driftmeasure::capture::list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }

    println!("Found {} input device(s):", devices.len());
    println!();
    for (i, device) in devices.iter().enumerate() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}. {}{}", i + 1, device.name, default_marker);
        println!(
            "     Channels: {}, default rate: {} Hz",
            device.channels, device.sample_rate
        );
    }
    Ok(())
}
