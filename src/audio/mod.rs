//! Audio capture boundary and the data that crosses the queues.
//!
//! # Flow
//!
//! ```text
//! Microphone → cpal callback → FrameForwarder → AudioFrame (bounded mpsc)
//!           → Pipeline → ProcessedPacket (bounded mpsc) → consumer
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use helix_audio::audio::{bounded, AudioCapture, AudioFrame, FrameForwarder};
//! use helix_audio::config::AudioConfig;
//! use helix_audio::pipeline::PipelineMetrics;
//!
//! let config = AudioConfig::default();
//! let (tx, mut rx) = bounded::<AudioFrame>(100);
//! let mut capture = AudioCapture::open(&config).unwrap();
//! capture
//!     .start(FrameForwarder::new(tx, &config, PipelineMetrics::shared()))
//!     .unwrap();
//!
//! while let Some(frame) = rx.blocking_recv() {
//!     println!("frame {} with {} samples", frame.sequence(), frame.len());
//! }
//! ```

pub mod capture;
pub mod frame;
pub mod queue;

pub use capture::{report_stream_error, AudioCapture, CaptureError, FrameAssembler, FrameForwarder};
pub use frame::{AudioFrame, ProcessedPacket};
pub use queue::{bounded, drain_latest, try_publish, SendOutcome};
