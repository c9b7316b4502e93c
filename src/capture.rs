//! Live audio capture (requires the `capture` feature)
//!
//! Opens an input device through cpal and forwards interleaved blocks from
//! the audio callback to the analysis thread over a bounded channel. The
//! callback never blocks; if the analysis falls behind, blocks are dropped
//! and counted. Captured blocks can also be recorded to a WAV file.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Blocks buffered between callback and analysis
const CHANNEL_CAPACITY: usize = 64;

/// Input device information
#[derive(Debug, Clone)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub channels: u16,
    pub sample_rate: u32,
}

/// List available input devices of the default host
pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for device in host.input_devices()? {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let (channels, sample_rate) = device
            .default_input_config()
            .map(|c| (c.channels(), c.sample_rate().0))
            .unwrap_or((0, 0));
        devices.push(InputDeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            channels,
            sample_rate,
        });
    }
    Ok(devices)
}

fn find_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("Input device not found: {}", name)),
        None => host
            .default_input_device()
            .ok_or_else(|| anyhow!("No default input device")),
    }
}

/// Running capture stream; capture stops when dropped
pub struct Capture {
    _stream: Stream,
    dropped_blocks: Arc<AtomicU64>,
}

impl Capture {
    /// Start capturing `channels` channels at `sample_rate`
    ///
    /// Returns the capture handle and the receiver for interleaved blocks.
    pub fn start(
        device_name: Option<&str>,
        channels: u16,
        sample_rate: u32,
    ) -> Result<(Self, crossbeam_channel::Receiver<Vec<f32>>)> {
        let device = find_device(device_name)?;
        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = crossbeam_channel::bounded::<Vec<f32>>(CHANNEL_CAPACITY);
        let dropped_blocks = Arc::new(AtomicU64::new(0));
        let callback_dropped = Arc::clone(&dropped_blocks);

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if tx.try_send(data.to_vec()).is_err() {
                    callback_dropped.fetch_add(1, Ordering::Relaxed);
                }
            },
            move |err| {
                tracing::error!("Input stream error: {}", err);
            },
            None,
        )?;
        stream.play()?;

        tracing::info!(
            device = %device.name().unwrap_or_default(),
            channels,
            sample_rate,
            "capture_started"
        );

        Ok((
            Self {
                _stream: stream,
                dropped_blocks,
            },
            rx,
        ))
    }

    /// Blocks dropped because the analysis did not keep up
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks.load(Ordering::Relaxed)
    }
}

/// Writes captured interleaved blocks to a 32-bit float WAV file
pub struct WavRecorder {
    writer: hound::WavWriter<BufWriter<File>>,
    path: PathBuf,
    samples_written: u64,
}

impl WavRecorder {
    pub fn create(path: &Path, channels: u16, sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("could not create WAV file {}", path.display()))?;
        tracing::info!(path = %path.display(), channels, sample_rate, "wav_recording_started");
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            samples_written: 0,
        })
    }

    /// Append one interleaved block
    pub fn write_block(&mut self, block: &[f32]) -> Result<()> {
        for &sample in block {
            self.writer.write_sample(sample)?;
        }
        self.samples_written += block.len() as u64;
        Ok(())
    }

    /// Write the final header; the file is incomplete without this
    pub fn finalize(self) -> Result<()> {
        self.writer
            .finalize()
            .with_context(|| format!("could not finalize WAV file {}", self.path.display()))?;
        tracing::info!(
            path = %self.path.display(),
            samples = self.samples_written,
            "wav_recording_finished"
        );
        Ok(())
    }
}
