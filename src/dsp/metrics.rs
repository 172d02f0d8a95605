//! Per-frame quality metrics: signal-to-noise ratio and processing latency.
//!
//! The SNR estimate is deliberately frame-local.  The quietest 10 % of the
//! frame's samples stand in for the background noise; nothing is carried over
//! from previous frames.

use std::time::Instant;

use super::DspError;

/// Power level below which a frame counts as silent, and the floor applied to
/// the noise estimate.
pub const SILENCE_EPSILON: f64 = 1e-9;

/// Percentile of absolute sample values used as the noise-floor amplitude.
const NOISE_PERCENTILE: f64 = 10.0;

/// Estimate the signal-to-noise ratio of `samples` in decibels.
///
/// * signal power = mean of squared samples
/// * noise floor  = (10th percentile of `|x|`)²
///
/// Returns exactly `0.0` for silent (or empty) frames.  The noise floor is
/// clamped to [`SILENCE_EPSILON`], so the result is always finite for finite
/// input.
///
/// ```rust
/// use helix_audio::dsp::estimate_snr;
///
/// assert_eq!(estimate_snr(&[0.0; 512]), 0.0);
/// assert!(estimate_snr(&[0.5, -0.5, 0.5, -0.5]) > 0.0);
/// ```
pub fn estimate_snr(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let signal_power =
        samples.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / samples.len() as f64;

    if signal_power < SILENCE_EPSILON {
        return 0.0;
    }

    let floor_amplitude = percentile_abs(samples, NOISE_PERCENTILE);
    let noise_floor = (floor_amplitude * floor_amplitude).max(SILENCE_EPSILON);

    10.0 * (signal_power / noise_floor).log10()
}

/// `q`-th percentile of `|samples|` with linear interpolation between the
/// neighbouring order statistics.  `samples` must be non-empty.
fn percentile_abs(samples: &[f32], q: f64) -> f64 {
    let mut sorted: Vec<f64> = samples.iter().map(|&s| (s as f64).abs()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Elapsed milliseconds between two monotonic timestamps.
///
/// Saturates at `0.0` if `end` is earlier than `start`.
pub fn measure_latency(start: Instant, end: Instant) -> f64 {
    end.saturating_duration_since(start).as_secs_f64() * 1_000.0
}

/// Reject frames containing NaN or infinite samples.
pub fn ensure_finite(samples: &[f32]) -> Result<(), DspError> {
    match samples.iter().position(|s| !s.is_finite()) {
        Some(index) => Err(DspError::NonFiniteSample { index }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
