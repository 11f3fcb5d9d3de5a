use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use multicam_viewer::{
    config::Config, gst_utils, manager::ViewerManager, window::SurfaceHandle,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/multicam-viewer/config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// X11 window id to embed the video output into
    #[arg(long)]
    window_id: Option<u64>,

    /// Check available GStreamer plugins and exit
    #[arg(long)]
    check_plugins: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting Multicam Viewer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {:?}", args.config);

    let gst_capabilities = gst_utils::initialize()?;
    info!("GStreamer initialized successfully");

    if args.check_plugins {
        gst_utils::print_plugin_info(&gst_capabilities);
        return Ok(());
    }

    let config = Arc::new(Config::load_or_default(&args.config).await?);
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {} devices, {}x{} source, {}x{} canvas",
        config.video.devices.len(),
        config.video.source_width,
        config.video.source_height,
        config.video.output_width,
        config.video.output_height
    );

    let surface = args.window_id.map(SurfaceHandle);
    if surface.is_none() {
        warn!("No --window-id supplied, video output will not be embedded");
    }

    let manager = Arc::new(ViewerManager::new(config));
    manager.build(surface)?;
    manager.start()?;

    info!("Controls (forwarded by the window host):");
    info!("  Left Click:   tiled 2x2 view");
    info!("  Middle Click: cycle views");
    info!("  Right Click:  exit");
    info!("  1-4:          single camera view");
    info!("  0:            tiled 2x2 view");
    info!("  Escape/q:     exit");
    info!("  Mouse motion: show metrics overlay");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
        _ = manager.shutdown_requested() => {
            info!("Shutdown requested, shutting down");
        }
    }

    if let Err(e) = manager.stop() {
        error!("Error stopping media graph: {}", e);
    }
    manager.destroy();

    info!("Shutdown complete");
    Ok(())
}
