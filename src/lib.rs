//! Real-time microphone monitoring: capture, noise suppression, low-pass
//! filtering and signal metrics, wired through bounded drop-on-full queues.
//!
//! Modules, in data-flow order:
//!
//! * [`audio`]    — cpal capture boundary, frames and queue helpers
//! * [`pipeline`] — async processing worker, lifecycle and counters
//! * [`dsp`]      — stateless spectral gate, Butterworth filter, SNR, latency
//! * [`app`]      — egui dashboard consuming processed packets
//! * [`config`]   — TOML settings and platform paths

pub mod app;
pub mod audio;
pub mod config;
pub mod dsp;
pub mod pipeline;
