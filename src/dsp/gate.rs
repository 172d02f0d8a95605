//! FFT-based spectral noise gate.
//!
//! ```text
//! time domain ──FFT──▶ bins ──|X[k]| <= threshold → 0──▶ inverse FFT ──▶ time domain
//! ```
//!
//! For real input the spectrum is Hermitian (`X[n-k] = conj(X[k])`), so the
//! gate decision is made on bins `0..=n/2` and mirrored onto the negative
//! frequencies.  That keeps the inverse transform real-valued.  The inverse
//! runs at the input length, so even and odd frame lengths both come back
//! with exactly `samples.len()` values.

use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

use super::DspError;

/// Gated samples plus what the forward transform saw.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutput {
    pub samples: Vec<f32>,
    /// Largest bin magnitude before gating; compare it with the threshold
    /// when tuning `noise_threshold`.
    pub peak_magnitude: f32,
}

/// Zero every frequency bin whose magnitude is at or below `threshold`.
///
/// Magnitudes are those of the unnormalized forward transform, so a full-scale
/// sine that lands on a bin of an `n`-sample frame has magnitude `n / 2`.
///
/// # Errors
///
/// [`DspError::InvalidThreshold`] for a negative or non-finite threshold.
///
/// # Example
///
/// ```rust
/// use helix_audio::dsp::spectral_gate;
///
/// let frame = vec![0.001_f32; 7];
/// // Threshold far above any bin: everything is gated.
/// let out = spectral_gate(&frame, 1_000.0).unwrap();
/// assert_eq!(out, vec![0.0; 7]);
/// ```
pub fn spectral_gate(samples: &[f32], threshold: f32) -> Result<Vec<f32>, DspError> {
    spectral_gate_detailed(samples, threshold).map(|out| out.samples)
}

/// [`spectral_gate`] that also reports the peak bin magnitude.
pub fn spectral_gate_detailed(samples: &[f32], threshold: f32) -> Result<GateOutput, DspError> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(DspError::InvalidThreshold(threshold));
    }

    let n = samples.len();
    if n == 0 {
        return Ok(GateOutput {
            samples: Vec::new(),
            peak_magnitude: 0.0,
        });
    }

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let mut spectrum: Vec<Complex32> = samples.iter().map(|&s| Complex32::new(s, 0.0)).collect();
    forward.process(&mut spectrum);

    let zero = Complex32::new(0.0, 0.0);
    let mut peak_magnitude = 0.0_f32;
    for k in 0..=n / 2 {
        let magnitude = spectrum[k].norm();
        peak_magnitude = peak_magnitude.max(magnitude);
        if magnitude <= threshold {
            spectrum[k] = zero;
            spectrum[(n - k) % n] = zero;
        }
    }

    inverse.process(&mut spectrum);

    // rustfft leaves the inverse unnormalized.
    let scale = 1.0 / n as f32;
    Ok(GateOutput {
        samples: spectrum.iter().map(|c| c.re * scale).collect(),
        peak_magnitude,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
