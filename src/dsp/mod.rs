//! Stateless signal-processing toolkit.
//!
//! Every function here is pure: it borrows a sample slice, returns a new owned
//! buffer or a scalar, and keeps no state between calls.  They are safe to
//! call from any thread and from any number of frames concurrently.
//!
//! # Processing chain
//!
//! ```text
//! raw frame ──▶ spectral_gate(threshold) ──▶ low_pass_filter(cutoff) ──▶ clean frame
//!     │
//!     └──────▶ estimate_snr ──▶ dB
//! ```
//!
//! # Example
//!
//! ```rust
//! use helix_audio::dsp::{estimate_snr, low_pass_filter, spectral_gate, DEFAULT_FILTER_ORDER};
//!
//! let frame: Vec<f32> = (0..1024)
//!     .map(|i| (2.0 * std::f32::consts::PI * 1_000.0 * i as f32 / 16_000.0).sin() * 0.5)
//!     .collect();
//!
//! let gated = spectral_gate(&frame, 0.02).unwrap();
//! let clean = low_pass_filter(&gated, 4_000.0, 16_000, DEFAULT_FILTER_ORDER).unwrap();
//! assert_eq!(clean.len(), frame.len());
//!
//! let snr_db = estimate_snr(&frame);
//! assert!(snr_db.is_finite());
//! ```

pub mod filter;
pub mod gate;
pub mod metrics;

use thiserror::Error;

pub use filter::{butterworth_lowpass, lfilter, low_pass_filter, FilterCoefficients, DEFAULT_FILTER_ORDER};
pub use gate::{spectral_gate, spectral_gate_detailed, GateOutput};
pub use metrics::{ensure_finite, estimate_snr, measure_latency, SILENCE_EPSILON};

// ---------------------------------------------------------------------------
// DspError
// ---------------------------------------------------------------------------

/// Reasons a DSP call can refuse to process a frame.
///
/// The pipeline treats every variant as a per-frame processing failure: it is
/// logged and counted, and the next frame is processed normally.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DspError {
    /// Cutoff / (sample_rate / 2) must lie strictly between 0 and 1.
    #[error("normalized cutoff {0:.4} is outside (0, 1)")]
    InvalidCutoff(f64),

    #[error("filter order must be at least 1")]
    InvalidOrder,

    #[error("gate threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f32),

    /// The frame contains NaN or infinite samples.
    #[error("frame contains a non-finite sample at index {index}")]
    NonFiniteSample { index: usize },
}
