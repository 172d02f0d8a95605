//! Data carried through the queues: captured frames and processed packets.

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One block of captured audio, owned and immutable.
///
/// Samples are `f32` in `[-1.0, 1.0]`, interleaved when `channels > 1`.
/// `sequence` counts blocks in capture order, including blocks that were
/// later dropped, so a consumer can spot gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    sequence: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16, sequence: u64) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            sequence,
        }
    }

    /// A frame with the same tags and different sample data.
    pub fn with_samples(&self, samples: Vec<f32>) -> Self {
        Self {
            samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
            sequence: self.sequence,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

// ---------------------------------------------------------------------------
// ProcessedPacket
// ---------------------------------------------------------------------------

/// Result of one pipeline iteration, handed to the downstream consumer.
///
/// `clean.len() == raw.len()` always holds.  `snr_db` is measured on the raw
/// frame; `latency_ms` is the time spent in DSP for this frame.
#[derive(Debug, Clone)]
pub struct ProcessedPacket {
    pub raw: AudioFrame,
    pub clean: AudioFrame,
    pub snr_db: f64,
    pub latency_ms: f64,
}

impl ProcessedPacket {
    pub fn sequence(&self) -> u64 {
        self.raw.sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioFrame>();
        assert_send::<ProcessedPacket>();
    }

    #[test]
    fn with_samples_keeps_tags() {
        let raw = AudioFrame::new(vec![0.5; 4], 16_000, 1, 42);
        let clean = raw.with_samples(vec![0.0; 4]);

        assert_eq!(clean.sequence(), 42);
        assert_eq!(clean.sample_rate(), 16_000);
        assert_eq!(clean.channels(), 1);
        assert_eq!(clean.samples(), &[0.0; 4]);
        assert_eq!(raw.samples(), &[0.5; 4]);
    }
}
