//! Monitoring dashboard — egui/eframe application.
//!
//! # Architecture
//!
//! [`DashboardApp`] is the downstream consumer of the outbound queue.  Every
//! refresh it drains the queue keeping only the newest [`ProcessedPacket`]
//! (see [`drain_latest`]) and renders it:
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Raw Audio        (waveform, y ∈ [-1, 1])      │
//! ├───────────────────────────────────────────────┤
//! │ Processed Audio  (waveform, y ∈ [-1, 1])      │
//! ├───────────────────────────────────────────────┤
//! │ SNR: 32.10 dB   Latency: 0.84 ms   Status: GOOD │
//! │ captured / processed / dropped / failed       │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The window never blocks on the pipeline; when no packet arrived since the
//! last refresh the previous one stays on screen.

use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;

use crate::audio::{drain_latest, ProcessedPacket};
use crate::config::UiConfig;
use crate::pipeline::{MetricsSnapshot, PipelineHandle, SharedMetrics};

// ---------------------------------------------------------------------------
// SignalStatus
// ---------------------------------------------------------------------------

/// Health of the incoming signal as judged from the raw-frame SNR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    Good,
    Critical,
}

impl SignalStatus {
    /// `Critical` when `snr_db` is strictly below `warning_db`.
    pub fn classify(snr_db: f64, warning_db: f64) -> Self {
        if snr_db < warning_db {
            SignalStatus::Critical
        } else {
            SignalStatus::Good
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignalStatus::Good => "GOOD",
            SignalStatus::Critical => "CRITICAL",
        }
    }

    fn color(&self) -> egui::Color32 {
        match self {
            SignalStatus::Good => egui::Color32::from_rgb(80, 200, 120),
            SignalStatus::Critical => egui::Color32::from_rgb(255, 68, 68),
        }
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

pub fn format_snr(snr_db: f64) -> String {
    format!("SNR: {snr_db:.2} dB")
}

pub fn format_latency(latency_ms: f64) -> String {
    format!("Latency: {latency_ms:.2} ms")
}

/// One-line summary of the drop and failure counters.
pub fn format_counters(snap: &MetricsSnapshot) -> String {
    format!(
        "captured {} · processed {} · published {} · inbound drops {} · outbound drops {} · failures {} · stream errors {}",
        snap.frames_captured,
        snap.frames_processed,
        snap.packets_published,
        snap.inbound_dropped,
        snap.outbound_dropped,
        snap.processing_failures,
        snap.stream_errors
    )
}

/// Map samples onto `rect` as a polyline, y range fixed to `[-1, 1]`.
///
/// Long frames are decimated to at most one point per horizontal pixel.
/// Out-of-range samples are clamped to the panel edge.
pub fn waveform_points(samples: &[f32], rect: egui::Rect) -> Vec<egui::Pos2> {
    if samples.is_empty() {
        return Vec::new();
    }

    let max_points = (rect.width().max(2.0)) as usize;
    let step = samples.len().div_ceil(max_points).max(1);
    let last = (samples.len() - 1).max(1) as f32;

    samples
        .iter()
        .enumerate()
        .step_by(step)
        .map(|(i, &s)| {
            let x = rect.left() + rect.width() * i as f32 / last;
            let y = rect.center().y - s.clamp(-1.0, 1.0) * rect.height() * 0.5;
            egui::pos2(x, y)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// DashboardApp
// ---------------------------------------------------------------------------

/// eframe application showing the latest packet and the pipeline counters.
pub struct DashboardApp {
    // ── Channels ─────────────────────────────────────────────────────────
    outbound_rx: mpsc::Receiver<ProcessedPacket>,

    // ── Shared state ─────────────────────────────────────────────────────
    metrics: SharedMetrics,
    pipeline: PipelineHandle,

    // ── Display ──────────────────────────────────────────────────────────
    /// Most recent packet; kept across refreshes with no new data.
    latest: Option<ProcessedPacket>,
    device_name: String,
    config: UiConfig,
}

impl DashboardApp {
    pub fn new(
        outbound_rx: mpsc::Receiver<ProcessedPacket>,
        metrics: SharedMetrics,
        pipeline: PipelineHandle,
        device_name: String,
        config: UiConfig,
    ) -> Self {
        Self {
            outbound_rx,
            metrics,
            pipeline,
            latest: None,
            device_name,
            config,
        }
    }

    /// Drain the outbound queue and keep the newest packet.
    fn poll_packets(&mut self) {
        if let Some(packet) = drain_latest(&mut self.outbound_rx) {
            log::trace!("dashboard: showing packet {}", packet.sequence());
            self.latest = Some(packet);
        }
    }

    // ── Panels ───────────────────────────────────────────────────────────

    fn draw_waveform(ui: &mut egui::Ui, title: &str, samples: &[f32], color: egui::Color32) {
        ui.label(egui::RichText::new(title).strong().size(14.0));

        let height = ((ui.available_height() - 24.0) * 0.5).max(80.0);
        let (rect, _) = ui.allocate_exact_size(
            egui::vec2(ui.available_width(), height),
            egui::Sense::hover(),
        );

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 4.0, egui::Color32::from_rgb(24, 24, 24));
        painter.line_segment(
            [
                egui::pos2(rect.left(), rect.center().y),
                egui::pos2(rect.right(), rect.center().y),
            ],
            egui::Stroke::new(1.0, egui::Color32::from_rgb(60, 60, 60)),
        );

        let points = waveform_points(samples, rect);
        if points.len() >= 2 {
            painter.add(egui::Shape::line(points, egui::Stroke::new(1.0, color)));
        }
    }

    fn draw_metrics(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| match &self.latest {
            Some(packet) => {
                let status = SignalStatus::classify(packet.snr_db, self.config.snr_warning_db);
                ui.label(egui::RichText::new(format_snr(packet.snr_db)).size(14.0));
                ui.separator();
                ui.label(egui::RichText::new(format_latency(packet.latency_ms)).size(14.0));
                ui.separator();
                ui.label(
                    egui::RichText::new(format!("Status: {}", status.label()))
                        .color(status.color())
                        .strong()
                        .size(14.0),
                );
            }
            None => {
                ui.label(
                    egui::RichText::new("Waiting for audio…")
                        .color(egui::Color32::from_rgb(140, 140, 140))
                        .size(14.0),
                );
            }
        });

        ui.add_space(2.0);
        ui.label(
            egui::RichText::new(format!(
                "{} · pipeline {} · {}",
                self.device_name,
                self.pipeline.state().label(),
                format_counters(&self.metrics.snapshot())
            ))
            .color(egui::Color32::from_rgb(150, 150, 150))
            .size(11.0),
        );
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_packets();

        egui::TopBottomPanel::bottom("metrics")
            .min_height(48.0)
            .show(ctx, |ui| {
                ui.add_space(4.0);
                self.draw_metrics(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            const EMPTY: &[f32] = &[];
            let (raw, clean) = match &self.latest {
                Some(p) => (p.raw.samples(), p.clean.samples()),
                None => (EMPTY, EMPTY),
            };
            Self::draw_waveform(ui, "Raw Audio", raw, egui::Color32::from_rgb(68, 136, 255));
            ui.add_space(8.0);
            Self::draw_waveform(ui, "Processed Audio", clean, egui::Color32::from_rgb(80, 200, 120));
        });

        ctx.request_repaint_after(Duration::from_millis(self.config.refresh_ms));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
