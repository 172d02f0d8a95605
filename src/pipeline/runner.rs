//! Processing pipeline: the single consumer of captured frames.
//!
//! [`Pipeline::run`] is an `async fn` meant to be spawned as a tokio task.
//! Each iteration:
//!
//! ```text
//! inbound.recv().await                      (only suspension point)
//!   └─▶ ensure_finite
//!         └─▶ spectral_gate(noise_threshold)
//!               └─▶ lfilter(butterworth low-pass)
//!                     └─▶ estimate_snr(raw) + latency
//!                           └─▶ try_publish(outbound)  (drop when full)
//! ```
//!
//! DSP runs synchronously on the worker; nothing inside an iteration yields.
//! A failing or panicking frame is counted and skipped.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::{try_publish, AudioFrame, ProcessedPacket, SendOutcome};
use crate::config::ProcessingConfig;
use crate::dsp::{
    butterworth_lowpass, ensure_finite, estimate_snr, lfilter, measure_latency,
    spectral_gate_detailed, DspError, FilterCoefficients,
};

use super::state::{PipelineControl, PipelineMetrics, PipelineState, SharedMetrics};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Why a single frame produced no packet.  Never fatal to the loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dsp failure: {0}")]
    Dsp(#[from] DspError),

    #[error("processing panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// PipelineHandle
// ---------------------------------------------------------------------------

/// Cloneable remote control for a running [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    control: Arc<PipelineControl>,
}

impl PipelineHandle {
    /// Ask the loop to exit.  The frame being processed (if any) still
    /// completes and publishes; no further frame is taken.
    pub fn stop(&self) {
        if self.control.request_stop() {
            log::info!("pipeline stop requested");
        }
    }

    pub fn state(&self) -> PipelineState {
        self.control.state()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Noise suppression, low-pass filtering and metrics for each captured frame.
///
/// ```rust,no_run
/// use helix_audio::audio::bounded;
/// use helix_audio::config::ProcessingConfig;
/// use helix_audio::pipeline::{Pipeline, PipelineMetrics};
///
/// # async fn example() {
/// let (in_tx, in_rx) = bounded(100);
/// let (out_tx, out_rx) = bounded(100);
/// let pipeline =
///     Pipeline::new(ProcessingConfig::default(), 16_000, PipelineMetrics::shared()).unwrap();
/// let handle = pipeline.handle();
/// let task = tokio::spawn(pipeline.run(in_rx, out_tx));
/// // hand in_tx to the capture side, read packets from out_rx ...
/// handle.stop();
/// task.await.unwrap();
/// # }
/// ```
pub struct Pipeline {
    config: ProcessingConfig,
    coeffs: FilterCoefficients,
    control: Arc<PipelineControl>,
    metrics: SharedMetrics,
    /// Frame sequence that makes `process_frame` panic.
    #[cfg(test)]
    panic_on_sequence: Option<u64>,
}

impl Pipeline {
    /// Build a pipeline for frames captured at `sample_rate`.
    ///
    /// Out-of-range processing parameters are replaced by defaults (see
    /// [`ProcessingConfig::sanitized`]); the low-pass filter is designed once
    /// here.
    pub fn new(
        config: ProcessingConfig,
        sample_rate: u32,
        metrics: SharedMetrics,
    ) -> Result<Self, PipelineError> {
        let config = config.sanitized(sample_rate);
        let normalized = config.low_pass_cutoff / (0.5 * sample_rate as f64);
        let coeffs = butterworth_lowpass(config.filter_order, normalized)?;

        log::debug!(
            "pipeline: threshold {}, cutoff {} Hz, order {} @ {} Hz",
            config.noise_threshold,
            config.low_pass_cutoff,
            config.filter_order,
            sample_rate
        );

        Ok(Self {
            config,
            coeffs,
            control: Arc::new(PipelineControl::new()),
            metrics,
            #[cfg(test)]
            panic_on_sequence: None,
        })
    }

    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            control: Arc::clone(&self.control),
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Per-frame work
    // -----------------------------------------------------------------------

    /// Run the full DSP chain on one frame.
    ///
    /// Multi-channel frames are gated and filtered per channel; SNR is taken
    /// over the whole raw frame.
    pub fn process_frame(&self, frame: AudioFrame) -> Result<ProcessedPacket, PipelineError> {
        let start = Instant::now();

        #[cfg(test)]
        if self.panic_on_sequence == Some(frame.sequence()) {
            panic!("dsp blew up on frame {}", frame.sequence());
        }

        ensure_finite(frame.samples())?;
        let (cleaned, peak_magnitude) = self.clean(frame.samples(), frame.channels() as usize)?;
        let snr_db = estimate_snr(frame.samples());

        let latency_ms = measure_latency(start, Instant::now());
        log::trace!(
            "pipeline: frame {} peak bin {:.4} (threshold {}), snr {:.2} dB, latency {:.3} ms",
            frame.sequence(),
            peak_magnitude,
            self.config.noise_threshold,
            snr_db,
            latency_ms
        );
        let clean = frame.with_samples(cleaned);

        Ok(ProcessedPacket {
            raw: frame,
            clean,
            snr_db,
            latency_ms,
        })
    }

    /// Returns the cleaned samples and the largest pre-gate bin magnitude
    /// across channels.
    fn clean(&self, samples: &[f32], channels: usize) -> Result<(Vec<f32>, f32), DspError> {
        if channels <= 1 {
            return self.clean_channel(samples);
        }

        let mut out = vec![0.0; samples.len()];
        let mut peak = 0.0_f32;
        for ch in 0..channels {
            let lane: Vec<f32> = samples.iter().skip(ch).step_by(channels).copied().collect();
            let (cleaned, lane_peak) = self.clean_channel(&lane)?;
            peak = peak.max(lane_peak);
            for (i, s) in cleaned.into_iter().enumerate() {
                out[i * channels + ch] = s;
            }
        }
        Ok((out, peak))
    }

    fn clean_channel(&self, samples: &[f32]) -> Result<(Vec<f32>, f32), DspError> {
        let gated = spectral_gate_detailed(samples, self.config.noise_threshold)?;
        Ok((lfilter(&self.coeffs, &gated.samples), gated.peak_magnitude))
    }

    fn handle_frame(&self, frame: AudioFrame, outbound: &mpsc::Sender<ProcessedPacket>) {
        let sequence = frame.sequence();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.process_frame(frame)))
            .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload))));

        let packet = match result {
            Ok(packet) => packet,
            Err(e) => {
                PipelineMetrics::bump(&self.metrics.processing_failures);
                log::warn!("pipeline: frame {sequence} skipped: {e}");
                return;
            }
        };
        PipelineMetrics::bump(&self.metrics.frames_processed);

        match try_publish(outbound, packet) {
            SendOutcome::Queued => PipelineMetrics::bump(&self.metrics.packets_published),
            SendOutcome::DroppedFull => PipelineMetrics::bump(&self.metrics.outbound_dropped),
            SendOutcome::Closed => {
                PipelineMetrics::bump(&self.metrics.outbound_dropped);
                log::debug!("pipeline: consumer gone, packet {sequence} discarded");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Consume `inbound` until stopped or until every sender is dropped.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<AudioFrame>,
        outbound: mpsc::Sender<ProcessedPacket>,
    ) {
        self.control.set_state(PipelineState::Running);
        log::info!("pipeline running");

        loop {
            if self.control.stop_requested() {
                break;
            }

            let frame = tokio::select! {
                biased;
                _ = self.control.stop_signal() => break,
                next = inbound.recv() => match next {
                    Some(frame) => frame,
                    None => {
                        log::info!("pipeline: inbound queue closed");
                        break;
                    }
                },
            };

            self.handle_frame(frame, &outbound);
        }

        self.control.set_state(PipelineState::Stopped);
        let snap = self.metrics.snapshot();
        log::info!(
            "pipeline stopped: {} processed, {} published, {} dropped, {} failed",
            snap.frames_processed,
            snap.packets_published,
            snap.outbound_dropped,
            snap.processing_failures
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{bounded, FrameForwarder};
    use crate::config::AudioConfig;
    use std::time::Duration;

    const RATE: u32 = 16_000;
    const BLOCK: usize = 1_024;

    fn audio_config() -> AudioConfig {
        AudioConfig {
            sample_rate: RATE,
            channels: 1,
            block_size: BLOCK as u32,
            ..AudioConfig::default()
        }
    }

    /// 1 kHz tone (amplitude 0.5) plus small deterministic noise.
    fn noisy_tone(seed: u64) -> Vec<f32> {
        let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        (0..BLOCK)
            .map(|n| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                let noise = ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0;
                let t = n as f64 / RATE as f64;
                (0.5 * (2.0 * std::f64::consts::PI * 1_000.0 * t).sin() + 0.01 * noise) as f32
            })
            .collect()
    }

    fn pipeline(metrics: &SharedMetrics) -> Pipeline {
        Pipeline::new(ProcessingConfig::default(), RATE, metrics.clone()).expect("pipeline")
    }

    fn collect(rx: &mut mpsc::Receiver<ProcessedPacket>) -> Vec<ProcessedPacket> {
        let mut out = Vec::new();
        while let Ok(p) = rx.try_recv() {
            out.push(p);
        }
        out
    }

    #[test]
    fn process_frame_preserves_length_and_tags() {
        let metrics = PipelineMetrics::shared();
        let p = pipeline(&metrics);

        let frame = AudioFrame::new(noisy_tone(1), RATE, 1, 7);
        let packet = p.process_frame(frame).expect("packet");

        assert_eq!(packet.clean.len(), BLOCK);
        assert_eq!(packet.raw.len(), BLOCK);
        assert_eq!(packet.sequence(), 7);
        assert_eq!(packet.clean.sequence(), 7);
        assert!(packet.snr_db.is_finite());
        assert!(packet.latency_ms >= 0.0);
    }

    #[test]
    fn process_frame_handles_stereo_per_channel() {
        let metrics = PipelineMetrics::shared();
        let p = pipeline(&metrics);

        // Left carries the tone, right is silent.
        let tone = noisy_tone(2);
        let mut interleaved = Vec::with_capacity(tone.len() * 2);
        for s in &tone {
            interleaved.push(*s);
            interleaved.push(0.0);
        }

        let packet = p
            .process_frame(AudioFrame::new(interleaved, RATE, 2, 0))
            .expect("packet");
        assert_eq!(packet.clean.len(), BLOCK * 2);
        assert!(packet.clean.samples().iter().skip(1).step_by(2).all(|s| *s == 0.0));
        assert!(packet.clean.samples().iter().step_by(2).any(|s| s.abs() > 0.1));
    }

    #[test]
    fn process_frame_rejects_nan() {
        let metrics = PipelineMetrics::shared();
        let p = pipeline(&metrics);

        let mut samples = noisy_tone(3);
        samples[10] = f32::NAN;
        let err = p.process_frame(AudioFrame::new(samples, RATE, 1, 0)).unwrap_err();
        assert!(matches!(err, PipelineError::Dsp(DspError::NonFiniteSample { index: 10 })));
    }

    #[test]
    fn cutoff_above_nyquist_is_sanitized() {
        let config = ProcessingConfig {
            low_pass_cutoff: 10_000.0,
            ..ProcessingConfig::default()
        };
        let p = Pipeline::new(config, RATE, PipelineMetrics::shared()).expect("pipeline");
        assert_eq!(p.config().low_pass_cutoff, 4_000.0);
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(3_u8)), "unknown panic payload");
    }

    #[tokio::test]
    async fn frames_flow_end_to_end_in_order() {
        let metrics = PipelineMetrics::shared();
        let (in_tx, in_rx) = bounded(100);
        let (out_tx, mut out_rx) = bounded(100);

        let p = pipeline(&metrics);
        let handle = p.handle();

        let mut fwd = FrameForwarder::new(in_tx, &audio_config(), metrics.clone());
        for seed in 0..5 {
            fwd.forward(&noisy_tone(seed));
        }
        drop(fwd); // closes the inbound queue so `run` returns

        tokio::time::timeout(Duration::from_secs(5), p.run(in_rx, out_tx))
            .await
            .expect("pipeline should finish");

        let packets = collect(&mut out_rx);
        assert_eq!(packets.len(), 5);
        for (i, packet) in packets.iter().enumerate() {
            assert_eq!(packet.sequence(), i as u64);
            assert_eq!(packet.clean.len(), BLOCK);
            assert!(packet.snr_db > 10.0, "snr {} dB", packet.snr_db);
            assert!(packet.latency_ms >= 0.0);
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.frames_captured, 5);
        assert_eq!(snap.frames_processed, 5);
        assert_eq!(snap.packets_published, 5);
        assert_eq!(snap.total_dropped(), 0);
        assert_eq!(handle.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn full_outbound_queue_drops_without_blocking() {
        let metrics = PipelineMetrics::shared();
        let (in_tx, in_rx) = bounded(8);
        let (out_tx, mut out_rx) = bounded(1);

        for seq in 0..5 {
            in_tx
                .try_send(AudioFrame::new(noisy_tone(seq), RATE, 1, seq))
                .expect("inbound has room");
        }
        drop(in_tx);

        // Nobody reads the outbound queue while the pipeline runs.
        tokio::time::timeout(Duration::from_secs(5), pipeline(&metrics).run(in_rx, out_tx))
            .await
            .expect("pipeline must not block on a full outbound queue");

        let snap = metrics.snapshot();
        assert_eq!(snap.frames_processed, 5);
        assert_eq!(snap.packets_published, 1);
        assert_eq!(snap.outbound_dropped, 4);

        let packets = collect(&mut out_rx);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].sequence(), 0);
    }

    #[tokio::test]
    async fn failed_frame_is_skipped_and_loop_continues() {
        let metrics = PipelineMetrics::shared();
        let (in_tx, in_rx) = bounded(8);
        let (out_tx, mut out_rx) = bounded(8);

        let mut bad = noisy_tone(1);
        bad[0] = f32::INFINITY;
        in_tx.try_send(AudioFrame::new(noisy_tone(0), RATE, 1, 0)).unwrap();
        in_tx.try_send(AudioFrame::new(bad, RATE, 1, 1)).unwrap();
        in_tx.try_send(AudioFrame::new(noisy_tone(2), RATE, 1, 2)).unwrap();
        drop(in_tx);

        pipeline(&metrics).run(in_rx, out_tx).await;

        let seqs: Vec<u64> = collect(&mut out_rx).iter().map(|p| p.sequence()).collect();
        assert_eq!(seqs, vec![0, 2]);
        assert_eq!(metrics.snapshot().processing_failures, 1);
    }

    #[tokio::test]
    async fn stop_lets_current_frame_finish_then_exits() {
        let metrics = PipelineMetrics::shared();
        let (in_tx, in_rx) = bounded(8);
        let (out_tx, mut out_rx) = bounded(8);

        let p = pipeline(&metrics);
        let handle = p.handle();
        let task = tokio::spawn(p.run(in_rx, out_tx));

        in_tx.send(AudioFrame::new(noisy_tone(0), RATE, 1, 0)).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), out_rx.recv())
            .await
            .expect("first packet")
            .expect("channel open");
        assert_eq!(first.sequence(), 0);

        handle.stop();
        // Queued after the stop: must never be processed.
        let _ = in_tx.try_send(AudioFrame::new(noisy_tone(1), RATE, 1, 1));

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("pipeline should stop")
            .expect("task should not panic");

        assert_eq!(handle.state(), PipelineState::Stopped);
        assert_eq!(metrics.snapshot().frames_processed, 1);
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn panicking_frame_is_counted_and_loop_continues() {
        let metrics = PipelineMetrics::shared();
        let (in_tx, in_rx) = bounded(8);
        let (out_tx, mut out_rx) = bounded(8);

        for seq in 0..3 {
            in_tx.try_send(AudioFrame::new(noisy_tone(seq), RATE, 1, seq)).unwrap();
        }
        drop(in_tx);

        let mut p = pipeline(&metrics);
        p.panic_on_sequence = Some(1);
        tokio::time::timeout(Duration::from_secs(5), p.run(in_rx, out_tx))
            .await
            .expect("pipeline should survive a panicking frame");

        let seqs: Vec<u64> = collect(&mut out_rx).iter().map(|p| p.sequence()).collect();
        assert_eq!(seqs, vec![0, 2]);

        let snap = metrics.snapshot();
        assert_eq!(snap.processing_failures, 1);
        assert_eq!(snap.frames_processed, 2);
        assert_eq!(snap.packets_published, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_during_dsp_publishes_in_flight_frame_only() {
        const BIG: usize = 1 << 22;
        let big_frame = |seq: u64| {
            let samples = (0..BIG).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
            AudioFrame::new(samples, RATE, 1, seq)
        };

        let metrics = PipelineMetrics::shared();
        let (in_tx, in_rx) = bounded(8);
        let (out_tx, mut out_rx) = bounded(8);

        let p = pipeline(&metrics);
        let handle = p.handle();
        let task = tokio::spawn(p.run(in_rx, out_tx));

        in_tx.try_send(big_frame(0)).unwrap();
        in_tx.try_send(big_frame(1)).unwrap();

        // Frame 0 has been dequeued once one queue slot is free again.
        tokio::time::timeout(Duration::from_secs(5), async {
            while in_tx.capacity() < in_tx.max_capacity() - 1 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("worker should take the first frame");
        tokio::time::sleep(Duration::from_millis(30)).await;

        handle.stop();

        tokio::time::timeout(Duration::from_secs(60), task)
            .await
            .expect("pipeline should stop after the in-flight frame")
            .expect("task should not panic");

        let seqs: Vec<u64> = collect(&mut out_rx).iter().map(|p| p.sequence()).collect();
        assert_eq!(seqs, vec![0]);
        assert_eq!(metrics.snapshot().frames_processed, 1);
        assert_eq!(handle.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn stop_wakes_idle_pipeline() {
        let metrics = PipelineMetrics::shared();
        let (_in_tx, in_rx) = bounded::<AudioFrame>(8);
        let (out_tx, _out_rx) = bounded(8);

        let p = pipeline(&metrics);
        let handle = p.handle();
        let task = tokio::spawn(p.run(in_rx, out_tx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("idle pipeline should stop promptly")
            .expect("task should not panic");
        assert_eq!(handle.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn stop_before_run_processes_nothing() {
        let metrics = PipelineMetrics::shared();
        let (in_tx, in_rx) = bounded(8);
        let (out_tx, _out_rx) = bounded(8);
        in_tx.try_send(AudioFrame::new(noisy_tone(0), RATE, 1, 0)).unwrap();

        let p = pipeline(&metrics);
        p.handle().stop();
        p.run(in_rx, out_tx).await;

        assert_eq!(metrics.snapshot().frames_processed, 0);
    }
}
