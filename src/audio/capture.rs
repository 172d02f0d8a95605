//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] owns the cpal device/stream lifecycle.  Everything that
//! runs inside the driver callback lives in [`FrameForwarder`], which can be
//! driven directly in tests without any audio hardware:
//!
//! ```text
//! cpal callback ──&[T]──▶ FrameForwarder
//!                           ├─ FrameAssembler (convert to f32, re-block)
//!                           └─ try_publish ──▶ inbound queue (drop newest when full)
//! ```
//!
//! The callback never blocks, never locks and never waits on the pipeline.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, SupportedBufferSize};
use thiserror::Error;
use tokio::sync::mpsc;

use super::frame::AudioFrame;
use super::queue::{try_publish, SendOutcome};
use crate::config::{AudioConfig, SampleFormat};
use crate::pipeline::{PipelineMetrics, SharedMetrics};

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening or starting the capture stream.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("input device rejected configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query supported input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build input stream: {0}")]
    BuildStream(cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(cpal::PlayStreamError),
}

impl From<cpal::BuildStreamError> for CaptureError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable("device disappeared while building stream".into())
            }
            cpal::BuildStreamError::StreamConfigNotSupported
            | cpal::BuildStreamError::InvalidArgument => {
                CaptureError::InvalidConfiguration(err.to_string())
            }
            other => CaptureError::BuildStream(other),
        }
    }
}

impl From<cpal::PlayStreamError> for CaptureError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable("device disappeared while starting stream".into())
            }
            other => CaptureError::PlayStream(other),
        }
    }
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Converts driver buffers to `f32` and cuts them into fixed-length frames.
///
/// Drivers are free to ignore the requested buffer size, so callbacks can
/// arrive with any length.  Leftover samples are carried into the next call.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_len: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    /// `frame_len` is in interleaved samples; zero is raised to one.
    pub fn new(frame_len: usize) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            frame_len,
            pending: Vec::with_capacity(frame_len),
        }
    }

    /// Samples buffered towards the next frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one driver buffer; `emit` is called once per completed frame.
    pub fn push<T>(&mut self, data: &[T], mut emit: impl FnMut(Vec<f32>))
    where
        T: Sample,
        f32: FromSample<T>,
    {
        let mut rest = data;

        // Aligned buffers skip the staging vector entirely.
        if self.pending.is_empty() {
            while rest.len() >= self.frame_len {
                let (block, tail) = rest.split_at(self.frame_len);
                emit(block.iter().map(|&s| f32::from_sample(s)).collect());
                rest = tail;
            }
        }

        for &s in rest {
            self.pending.push(f32::from_sample(s));
            if self.pending.len() == self.frame_len {
                let full =
                    std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_len));
                emit(full);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FrameForwarder
// ---------------------------------------------------------------------------

/// State moved into the cpal data callback.
///
/// Each completed block becomes an [`AudioFrame`] with the next sequence
/// number and is offered to the inbound queue.  A full queue drops the new
/// frame and bumps `inbound_dropped`.
pub struct FrameForwarder {
    tx: mpsc::Sender<AudioFrame>,
    assembler: FrameAssembler,
    sample_rate: u32,
    channels: u16,
    next_sequence: u64,
    metrics: SharedMetrics,
}

impl FrameForwarder {
    pub fn new(tx: mpsc::Sender<AudioFrame>, config: &AudioConfig, metrics: SharedMetrics) -> Self {
        Self {
            tx,
            assembler: FrameAssembler::new(config.frame_len()),
            sample_rate: config.sample_rate,
            channels: config.channels,
            next_sequence: 0,
            metrics,
        }
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Handle one driver buffer.  Never blocks.
    pub fn forward<T>(&mut self, data: &[T])
    where
        T: Sample,
        f32: FromSample<T>,
    {
        let tx = &self.tx;
        let metrics = &self.metrics;
        let sequence = &mut self.next_sequence;
        let (sample_rate, channels) = (self.sample_rate, self.channels);

        self.assembler.push(data, |samples| {
            let frame = AudioFrame::new(samples, sample_rate, channels, *sequence);
            *sequence += 1;
            PipelineMetrics::bump(&metrics.frames_captured);

            match try_publish(tx, frame) {
                SendOutcome::Queued => {}
                SendOutcome::DroppedFull | SendOutcome::Closed => {
                    PipelineMetrics::bump(&metrics.inbound_dropped);
                }
            }
        });
    }
}

/// Error callback body: driver problems are logged and counted, never fatal.
pub fn report_stream_error(metrics: &PipelineMetrics, err: &cpal::StreamError) {
    PipelineMetrics::bump(&metrics.stream_errors);
    log::error!("audio stream error: {err}");
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Input device plus (while running) its live stream.
///
/// # Example
///
/// ```rust,no_run
/// use helix_audio::audio::{bounded, AudioCapture, FrameForwarder};
/// use helix_audio::config::AudioConfig;
/// use helix_audio::pipeline::PipelineMetrics;
///
/// let config = AudioConfig::default();
/// let (tx, _rx) = bounded(100);
/// let mut capture = AudioCapture::open(&config).unwrap();
/// capture
///     .start(FrameForwarder::new(tx, &config, PipelineMetrics::shared()))
///     .unwrap();
/// // ...
/// capture.stop();
/// ```
pub struct AudioCapture {
    device: cpal::Device,
    stream_config: cpal::StreamConfig,
    sample_format: SampleFormat,
    stream: Option<cpal::Stream>,
}

impl AudioCapture {
    /// Select the configured (or default) input device and check that it
    /// supports the requested rate, channel count, format and block size.
    pub fn open(config: &AudioConfig) -> Result<Self, CaptureError> {
        config
            .validate()
            .map_err(|e| CaptureError::InvalidConfiguration(e.to_string()))?;

        let host = cpal::default_host();
        let device = match &config.device {
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == *wanted).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no input named {wanted:?}")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".into()))?,
        };

        check_supported(&device, config)?;

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(config.block_size),
        };

        log::info!(
            "input device {:?}: {} Hz, {} ch, block {}, {:?}",
            device.name().unwrap_or_else(|_| "<unnamed>".into()),
            config.sample_rate,
            config.channels,
            config.block_size,
            config.sample_format
        );

        Ok(Self {
            device,
            stream_config,
            sample_format: config.sample_format,
            stream: None,
        })
    }

    /// Build and play the input stream.  Calling `start` while already running
    /// is a no-op.
    pub fn start(&mut self, forwarder: FrameForwarder) -> Result<(), CaptureError> {
        if self.is_running() {
            log::warn!("capture already running; ignoring start");
            return Ok(());
        }

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(forwarder)?,
            SampleFormat::I16 => self.build_stream::<i16>(forwarder)?,
            SampleFormat::U16 => self.build_stream::<u16>(forwarder)?,
        };
        stream.play()?;

        self.stream = Some(stream);
        log::info!("capture started");
        Ok(())
    }

    fn build_stream<T>(&self, mut forwarder: FrameForwarder) -> Result<cpal::Stream, CaptureError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let metrics = forwarder.metrics().clone();
        let stream = self.device.build_input_stream(
            &self.stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| forwarder.forward(data),
            move |err: cpal::StreamError| report_stream_error(&metrics, &err),
            None,
        )?;
        Ok(stream)
    }

    /// Stop and release the stream.  Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("failed to pause input stream: {e}");
            }
            drop(stream);
            log::info!("capture stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "<unnamed>".into())
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn check_supported(device: &cpal::Device, config: &AudioConfig) -> Result<(), CaptureError> {
    let rate = cpal::SampleRate(config.sample_rate);
    let format = config.sample_format.to_cpal();

    let supported = device.supported_input_configs()?.any(|range| {
        let block_ok = match range.buffer_size() {
            SupportedBufferSize::Range { min, max } => (*min..=*max).contains(&config.block_size),
            SupportedBufferSize::Unknown => true,
        };
        range.channels() == config.channels
            && range.sample_format() == format
            && range.min_sample_rate() <= rate
            && rate <= range.max_sample_rate()
            && block_ok
    });

    if supported {
        Ok(())
    } else {
        Err(CaptureError::InvalidConfiguration(format!(
            "{} Hz / {} ch / {:?} / block {} not supported",
            config.sample_rate, config.channels, config.sample_format, config.block_size
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
