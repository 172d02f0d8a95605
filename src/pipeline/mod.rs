//! Pipeline module: the async worker between the two queues.
//!
//! # Architecture
//!
//! ```text
//! cpal driver thread          tokio worker task               egui thread
//! ──────────────────          ─────────────────               ───────────
//! FrameForwarder ──inbound──▶ Pipeline::run ──outbound──▶ DashboardApp
//!      │          (bounded)        │          (bounded)          │
//!      └──────────────┬────────────┴──────────────┬──────────────┘
//!                     ▼                           ▼
//!             SharedMetrics (atomic counters)   PipelineHandle (stop/state)
//! ```
//!
//! Both queues drop on full; every drop is visible in [`PipelineMetrics`].

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{Pipeline, PipelineError, PipelineHandle};
pub use state::{MetricsSnapshot, PipelineControl, PipelineMetrics, PipelineState, SharedMetrics};
