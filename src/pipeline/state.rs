//! Pipeline lifecycle state and the counters shared across threads.
//!
//! [`PipelineState`] is the worker's lifecycle.  [`PipelineControl`] stores it
//! atomically together with the cooperative stop flag, so a
//! [`PipelineHandle`](super::PipelineHandle) on another thread can request a
//! stop and observe progress without locking.
//!
//! [`PipelineMetrics`] collects every drop and failure counter.  The capture
//! callback, the pipeline worker and the dashboard all hold the same
//! [`SharedMetrics`]; each counter has exactly one writer.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// Lifecycle of the processing worker.
///
/// ```text
/// Idle ──run()──▶ Running ──stop()──▶ Stopping ──iteration done──▶ Stopped
///                    └──────inbound queue closed─────────────────▶ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    /// Constructed, not yet consuming frames.
    Idle = 0,
    /// Consume loop active.
    Running = 1,
    /// Stop requested; the in-flight frame is still being finished.
    Stopping = 2,
    /// Loop exited.
    Stopped = 3,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PipelineState::Idle,
            1 => PipelineState::Running,
            2 => PipelineState::Stopping,
            _ => PipelineState::Stopped,
        }
    }

    /// A short human-readable label for the dashboard status line.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Running => "Running",
            PipelineState::Stopping => "Stopping",
            PipelineState::Stopped => "Stopped",
        }
    }

    /// `true` once the loop has exited.
    pub fn is_terminal(&self) -> bool {
        *self == PipelineState::Stopped
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState::Idle
    }
}

// ---------------------------------------------------------------------------
// PipelineControl
// ---------------------------------------------------------------------------

/// Atomic lifecycle state plus the stop flag.
#[derive(Debug, Default)]
pub struct PipelineControl {
    state: AtomicU8,
    stop_requested: AtomicBool,
    wake: Notify,
}

impl PipelineControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Raise the stop flag.  Returns `false` if it was already raised.
    pub fn request_stop(&self) -> bool {
        if self.stop_requested.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Running → Stopping; Idle stays Idle until the loop sees the flag.
        let _ = self.state.compare_exchange(
            PipelineState::Running as u8,
            PipelineState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        // notify_one stores a permit, so a stop raised before the worker
        // starts waiting is not lost.
        self.wake.notify_one();
        true
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolves once [`request_stop`](Self::request_stop) has been called.
    pub(crate) async fn stop_signal(&self) {
        while !self.stop_requested() {
            self.wake.notified().await;
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineMetrics
// ---------------------------------------------------------------------------

/// Counters for every frame that enters, leaves or is lost by the system.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Blocks assembled by the capture callback.
    pub frames_captured: AtomicU64,
    /// Frames discarded because the inbound queue was full (or closed).
    pub inbound_dropped: AtomicU64,
    /// Errors reported by the audio driver.
    pub stream_errors: AtomicU64,
    /// Frames that made it through DSP.
    pub frames_processed: AtomicU64,
    /// Packets accepted by the outbound queue.
    pub packets_published: AtomicU64,
    /// Packets discarded because the outbound queue was full (or closed).
    pub outbound_dropped: AtomicU64,
    /// Frames whose processing returned an error or panicked.
    pub processing_failures: AtomicU64,
}

/// Thread-safe handle to [`PipelineMetrics`].
pub type SharedMetrics = Arc<PipelineMetrics>;

impl PipelineMetrics {
    /// Create a fresh, zeroed [`SharedMetrics`].
    pub fn shared() -> SharedMetrics {
        Arc::new(Self::default())
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter.  Individual values are exact; the set is not an
    /// atomic snapshot across counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            inbound_dropped: self.inbound_dropped.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            packets_published: self.packets_published.load(Ordering::Relaxed),
            outbound_dropped: self.outbound_dropped.load(Ordering::Relaxed),
            processing_failures: self.processing_failures.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_captured: u64,
    pub inbound_dropped: u64,
    pub stream_errors: u64,
    pub frames_processed: u64,
    pub packets_published: u64,
    pub outbound_dropped: u64,
    pub processing_failures: u64,
}

impl MetricsSnapshot {
    /// All frames lost between the driver and the consumer.
    pub fn total_dropped(&self) -> u64 {
        self.inbound_dropped + self.outbound_dropped + self.processing_failures
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
