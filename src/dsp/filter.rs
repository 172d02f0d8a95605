//! Butterworth low-pass design and direct-form recursive filtering.
//!
//! [`butterworth_lowpass`] designs the digital filter through the bilinear
//! transform of the analog Butterworth prototype:
//!
//! 1. Analog prototype poles on the unit circle in the left half-plane:
//!    `p_k = exp(iπ(2k + N + 1) / 2N)`, `k = 0..N`.
//! 2. Pre-warp the normalized cutoff `Wn` so the digital -3 dB point lands
//!    exactly on `Wn`: `ω = 4·tan(π·Wn / 2)`, then scale the poles by `ω`.
//! 3. Bilinear transform (`fs = 2`): `z = (4 + p) / (4 - p)`; all `N` zeros
//!    map to `z = -1`.
//! 4. Expand zeros and poles into the `b` / `a` polynomial coefficients.
//!
//! [`lfilter`] then runs the classic transposed direct-form II recursion
//! starting from a zero state.

use rustfft::num_complex::Complex64;

use super::DspError;

/// Filter order used by the processing pipeline.
pub const DEFAULT_FILTER_ORDER: usize = 5;

// ---------------------------------------------------------------------------
// FilterCoefficients
// ---------------------------------------------------------------------------

/// Numerator (`b`) and denominator (`a`) coefficients of a recursive filter.
///
/// Both vectors have `order + 1` entries; `a[0]` is `1.0` for designs produced
/// by [`butterworth_lowpass`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCoefficients {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

impl FilterCoefficients {
    /// Gain at 0 Hz: `Σb / Σa`.
    pub fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }
}

// ---------------------------------------------------------------------------
// Design
// ---------------------------------------------------------------------------

/// Design an `order`-pole Butterworth low-pass filter.
///
/// `normalized_cutoff` is the cutoff as a fraction of the Nyquist frequency
/// and must lie strictly inside `(0, 1)`.
///
/// # Errors
///
/// [`DspError::InvalidOrder`] for `order == 0`, [`DspError::InvalidCutoff`]
/// when the cutoff is out of range.
pub fn butterworth_lowpass(
    order: usize,
    normalized_cutoff: f64,
) -> Result<FilterCoefficients, DspError> {
    if order == 0 {
        return Err(DspError::InvalidOrder);
    }
    if !(normalized_cutoff > 0.0 && normalized_cutoff < 1.0) {
        return Err(DspError::InvalidCutoff(normalized_cutoff));
    }

    let n = order as f64;
    let warped = 4.0 * (std::f64::consts::PI * normalized_cutoff / 2.0).tan();

    let analog_poles: Vec<Complex64> = (0..order)
        .map(|k| {
            let theta = std::f64::consts::PI * (2.0 * k as f64 + n + 1.0) / (2.0 * n);
            Complex64::from_polar(warped, theta)
        })
        .collect();

    let four = Complex64::new(4.0, 0.0);
    let digital_poles: Vec<Complex64> = analog_poles
        .iter()
        .map(|&p| (four + p) / (four - p))
        .collect();

    // No finite analog zeros, so the bilinear gain is ω^N / Π(4 - p).
    let denominator = analog_poles
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, &p| acc * (four - p));
    let gain = (Complex64::new(warped.powi(order as i32), 0.0) / denominator).re;

    let zeros = vec![Complex64::new(-1.0, 0.0); order];
    let b = poly_from_roots(&zeros)
        .into_iter()
        .map(|c| c.re * gain)
        .collect();
    let a = poly_from_roots(&digital_poles)
        .into_iter()
        .map(|c| c.re)
        .collect();

    Ok(FilterCoefficients { b, a })
}

/// Expand `Π(x - r)` into coefficients, highest power first.
fn poly_from_roots(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for &root in roots {
        coeffs.push(Complex64::new(0.0, 0.0));
        for i in (1..coeffs.len()).rev() {
            let prev = coeffs[i - 1];
            coeffs[i] -= root * prev;
        }
    }
    coeffs
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Apply a recursive filter to `samples` (transposed direct form II, zero
/// initial state).  Output length always equals input length.
pub fn lfilter(coeffs: &FilterCoefficients, samples: &[f32]) -> Vec<f32> {
    let a0 = coeffs.a.first().copied().unwrap_or(1.0);
    let len = coeffs.b.len().max(coeffs.a.len());

    let mut b = coeffs.b.clone();
    let mut a = coeffs.a.clone();
    b.resize(len, 0.0);
    a.resize(len, 0.0);
    for v in b.iter_mut().chain(a.iter_mut()) {
        *v /= a0;
    }

    let mut state = vec![0.0_f64; len.saturating_sub(1)];
    let mut out = Vec::with_capacity(samples.len());

    for &sample in samples {
        let x = sample as f64;
        let y = b[0] * x + state.first().copied().unwrap_or(0.0);

        for i in 0..state.len() {
            let next = state.get(i + 1).copied().unwrap_or(0.0);
            state[i] = b[i + 1] * x + next - a[i + 1] * y;
        }

        out.push(y as f32);
    }

    out
}

/// Remove content above `cutoff_hz` from `samples` captured at `sample_rate`.
///
/// ```rust
/// use helix_audio::dsp::low_pass_filter;
///
/// let out = low_pass_filter(&[0.1, 0.2, 0.3], 4_000.0, 16_000, 5).unwrap();
/// assert_eq!(out.len(), 3);
///
/// // 9 kHz is above Nyquist for 16 kHz audio.
/// assert!(low_pass_filter(&[0.1], 9_000.0, 16_000, 5).is_err());
/// ```
pub fn low_pass_filter(
    samples: &[f32],
    cutoff_hz: f64,
    sample_rate: u32,
    order: usize,
) -> Result<Vec<f32>, DspError> {
    let nyquist = 0.5 * sample_rate as f64;
    let coeffs = butterworth_lowpass(order, cutoff_hz / nyquist)?;
    Ok(lfilter(&coeffs, samples))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
