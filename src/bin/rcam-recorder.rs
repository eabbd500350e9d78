//! Subscribes to a server's publish stream and records frames to disk

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rcam::client::FrameSubscriber;
use rcam::config::DEFAULT_API_PORT;
use rcam::recorder::RecorderSink;

#[derive(Parser)]
#[command(name = "rcam-recorder", about = "Record published frames to disk")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server command port; the publish stream is one above it
    #[arg(long, default_value_t = DEFAULT_API_PORT)]
    port: u16,

    /// Output directory
    #[arg(long, default_value = "recording")]
    out: String,

    /// Record only frames whose sequence advanced by at least this much
    #[arg(long, default_value_t = 0)]
    drop: u64,

    /// Stop after this many frames (0 = until the stream ends)
    #[arg(long, default_value_t = 0)]
    count: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut subscriber = FrameSubscriber::connect((args.host.as_str(), args.port + 1))
        .await?
        .with_drop_interval(args.drop);
    let mut sink = RecorderSink::create(&args.out)?;

    info!("recording to {}", args.out);
    while let Some(frame) = subscriber.next().await? {
        // decode as a sanity check; a corrupt frame is skipped, not fatal
        if let Err(e) = frame.decode() {
            warn!("skipping frame {}: {}", frame.sequence, e);
            continue;
        }
        sink.save(&frame)?;
        if args.count > 0 && sink.recorded() >= args.count {
            break;
        }
    }
    info!("recorded {} frames", sink.recorded());
    Ok(())
}
