//! Application entry point — Helix audio monitor.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from the first CLI argument or the platform
//!    `settings.toml`.  A missing or invalid file is fatal.
//! 3. Create the [`tokio`] runtime and both bounded queues.
//! 4. Spawn the processing pipeline on the runtime.
//! 5. Open and start the cpal input stream.
//! 6. Run [`eframe::run_native`]; blocks until the window is closed.
//! 7. Stop capture, stop the pipeline, shut the runtime down.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use eframe::egui;

use helix_audio::{
    app::DashboardApp,
    audio::{bounded, AudioCapture, AudioFrame, FrameForwarder, ProcessedPacket},
    config::{AppConfig, AppPaths, ProcessingConfig, UiConfig},
    pipeline::{Pipeline, PipelineMetrics},
};

const PIPELINE_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Settings from the path given as the first argument, else the platform
/// `settings.toml`.  Returns the path actually read.
fn load_config() -> anyhow::Result<(AppConfig, PathBuf)> {
    let (loaded, path) = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => (AppConfig::load_from(&path), path),
        None => (AppConfig::load(), AppPaths::new().settings_file),
    };
    let config =
        loaded.with_context(|| format!("cannot load settings from {}", path.display()))?;
    Ok((config, path))
}

fn native_options(ui: &UiConfig) -> eframe::NativeOptions {
    let (width, height) = ui.window_size;
    let vp = egui::ViewportBuilder::default()
        .with_title("Helix Audio Monitor")
        .with_inner_size([width, height])
        .with_min_inner_size([480.0, 360.0]);

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn run() -> anyhow::Result<()> {
    // Configuration
    let (config, path) = load_config()?;
    config.validate().context("settings rejected")?;
    let processing = ProcessingConfig::load_or_default(&path);

    // Runtime, queues, counters
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let metrics = PipelineMetrics::shared();
    let (inbound_tx, inbound_rx) = bounded::<AudioFrame>(config.queues.inbound_capacity);
    let (outbound_tx, outbound_rx) = bounded::<ProcessedPacket>(config.queues.outbound_capacity);

    // Pipeline
    let pipeline = Pipeline::new(processing, config.audio.sample_rate, metrics.clone())
        .context("failed to build processing pipeline")?;
    let handle = pipeline.handle();
    let pipeline_task = rt.spawn(pipeline.run(inbound_rx, outbound_tx));

    // Capture
    let mut capture = AudioCapture::open(&config.audio).context("cannot open audio input")?;
    capture
        .start(FrameForwarder::new(inbound_tx, &config.audio, metrics.clone()))
        .context("cannot start audio capture")?;

    // Dashboard (blocks until the window closes)
    let app = DashboardApp::new(
        outbound_rx,
        metrics.clone(),
        handle.clone(),
        capture.device_name(),
        config.ui.clone(),
    );
    let ui_result = eframe::run_native(
        "Helix Audio Monitor",
        native_options(&config.ui),
        Box::new(move |_cc| Ok(Box::new(app))),
    );

    // Shutdown
    capture.stop();
    handle.stop();
    match rt.block_on(async { tokio::time::timeout(PIPELINE_JOIN_TIMEOUT, pipeline_task).await }) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("pipeline task ended abnormally: {e}"),
        Err(_) => log::warn!("pipeline did not stop within {PIPELINE_JOIN_TIMEOUT:?}"),
    }
    rt.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    let snap = metrics.snapshot();
    log::info!(
        "shutdown: {} captured, {} processed, {} dropped",
        snap.frames_captured,
        snap.frames_processed,
        snap.total_dropped()
    );

    ui_result.map_err(|e| anyhow::anyhow!("dashboard failed: {e}"))
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Helix audio monitor starting up");

    if let Err(e) = run() {
        log::error!("{e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
