use anyhow::Result;
use clap::Parser;
use loqa_capture::simulated::{MemoryPreviewSink, SimulatedDevices, SimulatedRecorderConfig, SimulatedRecorderFactory};
use loqa_capture::{CaptureController, CaptureError, Config};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "loqa-capture")]
#[command(about = "Run a capture session against simulated devices")]
struct Args {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/loqa-capture")]
    config: String,

    /// How long to record, in milliseconds
    #[arg(short, long, default_value = "2000")]
    duration_ms: u64,

    /// Interval between recorded segments, in milliseconds
    #[arg(long, default_value = "250")]
    segment_interval_ms: u64,

    /// Size of each recorded segment, in bytes
    #[arg(long, default_value = "4096")]
    segment_bytes: usize,

    /// Simulate the user denying camera/microphone permission
    #[arg(long)]
    deny: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let cfg = Config::load(&args.config)?;
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Container: {}", cfg.capture.container_mime_type);

    let devices = if args.deny {
        SimulatedDevices::denying(CaptureError::PermissionDenied)
    } else {
        SimulatedDevices::granting()
    };

    let recorders = SimulatedRecorderFactory::new(SimulatedRecorderConfig {
        segment_interval: Some(Duration::from_millis(args.segment_interval_ms)),
        segment_bytes: args.segment_bytes,
        ..SimulatedRecorderConfig::default()
    });

    let controller = CaptureController::new(
        cfg.capture.clone(),
        Arc::new(devices),
        Arc::new(recorders),
        Arc::new(MemoryPreviewSink::new()),
    );

    // Log every state change
    let mut states = controller.subscribe();
    let watcher = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match state.error {
                Some(err) => warn!("status -> {} ({})", state.status, err),
                None => info!("status -> {}", state.status),
            }
        }
    });

    if controller.begin().await.is_none() {
        warn!(
            "Capture did not start: {}",
            controller
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "superseded".to_string())
        );
        controller.shutdown().await;
        drop(controller);
        let _ = watcher.await;
        return Ok(());
    }

    info!("Recording for {}ms", args.duration_ms);
    sleep(Duration::from_millis(args.duration_ms)).await;

    let stats = controller.stats().await;
    info!(
        "Buffered {} segments ({} bytes)",
        stats.segments_buffered, stats.bytes_buffered
    );

    match controller.finish().await {
        Some(recording) => {
            println!("{}", serde_json::to_string_pretty(&recording.metadata())?);
            let uri = recording.encode().await?;
            let prefix: String = uri.chars().take(48).collect();
            info!("Artifact: {}... ({} chars)", prefix, uri.len());
        }
        None => warn!("No recording produced"),
    }

    controller.shutdown().await;
    drop(controller);
    let _ = watcher.await;

    Ok(())
}
