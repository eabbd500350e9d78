//! Command-line remote control for a running server

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rcam::client::CommandClient;
use rcam::config::DEFAULT_API_PORT;
use rcam::{Command, ExposureLock};

#[derive(Parser)]
#[command(name = "rcam-ctl", about = "Send a command to a running rcam server")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server command port
    #[arg(long, default_value_t = DEFAULT_API_PORT)]
    port: u16,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Stop the server
    Shutdown,
    /// Set the published frame size
    SetSize { width: u32, height: u32 },
    /// Enable or disable auto exposure (and auto white balance)
    Ae {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
    /// Increase analogue gain one step
    GainUp {
        /// Keep overall brightness by adjusting exposure time inversely
        #[arg(long)]
        locked: bool,
    },
    /// Decrease analogue gain one step
    GainDown {
        #[arg(long)]
        locked: bool,
    },
    /// Increase exposure time one step
    ExposureUp {
        #[arg(long)]
        locked: bool,
    },
    /// Decrease exposure time one step
    ExposureDown {
        #[arg(long)]
        locked: bool,
    },
    /// Enable or disable continuous autofocus
    Af {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
    /// Run one autofocus cycle
    AfRun,
    /// Move the lens one step farther
    LensUp,
    /// Move the lens one step nearer
    LensDown,
    /// Fit frames by scaling down
    FitScaled,
    /// Fit frames by center-cropping
    FitCropped,
}

fn lock(locked: bool) -> ExposureLock {
    if locked {
        ExposureLock::Locked
    } else {
        ExposureLock::Unlocked
    }
}

impl Action {
    fn command(&self) -> Command {
        match self {
            Action::Shutdown => Command::Shutdown,
            Action::SetSize { width, height } => Command::SetSize {
                width: *width,
                height: *height,
            },
            Action::Ae { state } => Command::AutoExposure(state == "on"),
            Action::GainUp { locked } => Command::AnalogueGainIncrease(lock(*locked)),
            Action::GainDown { locked } => Command::AnalogueGainDecrease(lock(*locked)),
            Action::ExposureUp { locked } => Command::ExposureTimeIncrease(lock(*locked)),
            Action::ExposureDown { locked } => Command::ExposureTimeDecrease(lock(*locked)),
            Action::Af { state } => Command::AutoFocus(state == "on"),
            Action::AfRun => Command::RunAutofocus,
            Action::LensUp => Command::LensPositionIncrease,
            Action::LensDown => Command::LensPositionDecrease,
            Action::FitScaled => Command::FitScaled,
            Action::FitCropped => Command::FitCropped,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut client = CommandClient::connect((args.host.as_str(), args.port)).await?;
    client.send(args.action.command()).await?;
    Ok(())
}
