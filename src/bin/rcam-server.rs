//! Streaming server binary
//!
//! Runs the capture pipeline against the built-in synthetic camera. Real
//! sensor bindings plug in by handing [`rcam::Server::run`] another
//! [`rcam::camera::CameraDevice`] implementation.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rcam::camera::StubCamera;
use rcam::config::{DEFAULT_API_PORT, DEFAULT_JPEG_QUALITY};
use rcam::{OutputMode, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "rcam-server", about = "Live camera streaming server")]
struct Args {
    /// Listen address for both sockets
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Command port; the publish socket binds one above it
    #[arg(long, default_value_t = DEFAULT_API_PORT)]
    port: u16,

    /// Main stream width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Main stream height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Output mode: rgb, raw-linear or raw-gamma
    #[arg(long, default_value_t = OutputMode::Rgb)]
    mode: OutputMode,

    /// Maximum frame rate (0 = device maximum)
    #[arg(long, default_value_t = 0)]
    max_fps: u32,

    /// Fixed exposure time in microseconds (0 = auto exposure)
    #[arg(long, default_value_t = 0)]
    exposure_time: u32,

    /// Fixed analogue gain, used with --exposure-time
    #[arg(long, default_value_t = 0.0)]
    gain: f64,

    /// Flip the image horizontally
    #[arg(long)]
    hflip: bool,

    /// Flip the image vertically
    #[arg(long)]
    vflip: bool,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    quality: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::default()
        .with_bind_address(args.bind)
        .with_api_port(args.port)
        .with_resolution(args.width, args.height)
        .with_mode(args.mode)
        .with_max_fps(args.max_fps)
        .with_exposure(args.exposure_time, args.gain)
        .with_jpeg_quality(args.quality);
    config.hflip = args.hflip;
    config.vflip = args.vflip;

    info!(
        "starting server: {}x{} mode={}",
        args.width, args.height, args.mode
    );
    Server::new(config).run(Box::new(StubCamera::new())).await?;
    Ok(())
}
