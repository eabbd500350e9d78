//! Server assembly and lifecycle
//!
//! Wires the capture pipeline, the command router and the two TCP sockets
//! together and runs until a shutdown command or Ctrl-C arrives.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::camera::{CameraConfig, CameraDevice, ControlRange};
use crate::command::{Command, CommandRouter, ControlRanges};
use crate::config::{OutputMode, ServerConfig};
use crate::control::{self, keys, ControlMap, ControlReceiver};
use crate::error::{RcamError, Result};
use crate::pipeline::{
    Capture, ExposureControl, FocusControl, FrameFit, JpegEncode, Pipeline, Publish, RawConvert,
    RawEncoding, WhiteBalanceControl,
};
use crate::protocol;
use crate::publish::PublishHub;

/// Startup controls derived from the configuration
///
/// Auto exposure and auto white balance start coupled; a fixed exposure on
/// the command line disables both and pins gain and exposure time.
fn startup_controls(config: &ServerConfig) -> ControlMap {
    let mut controls = ControlMap::new();
    let ae = config.ae_enabled();
    controls.insert(keys::AE_ENABLE.into(), json!(ae));
    controls.insert(keys::AWB_ENABLE.into(), json!(ae));
    if !ae {
        controls.insert(keys::EXPOSURE_TIME.into(), json!(config.exposure_time));
        if config.analogue_gain > 0.0 {
            controls.insert(keys::ANALOGUE_GAIN.into(), json!(config.analogue_gain));
        }
    }
    controls
}

/// Frame duration limits enforcing a frame rate ceiling
///
/// The lower bound is the longer of the device minimum and the requested
/// frame period; the upper bound stays at the device maximum.
fn frame_duration_limits(limits: ControlRange, max_fps: u32) -> (i64, i64) {
    let period = 1_000_000.0 / max_fps as f64;
    (limits.min.max(period).round() as i64, limits.max as i64)
}

/// The streaming server
pub struct Server {
    config: ServerConfig,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Configure the device, assemble the pipeline and bind both listeners
    ///
    /// With `api_port` 0 both sockets get ephemeral ports; the bound
    /// addresses are readable on the returned server.
    pub async fn bind(self, mut camera: Box<dyn CameraDevice>) -> Result<BoundServer> {
        let config = self.config;

        camera.configure(&CameraConfig {
            resolution: config.resolution,
            raw: config.mode.needs_raw(),
            hflip: config.hflip,
            vflip: config.vflip,
            controls: startup_controls(&config),
            ..Default::default()
        })?;

        let ranges = ControlRanges {
            gain: camera
                .control_range(keys::ANALOGUE_GAIN)
                .ok_or_else(|| RcamError::Config("device reports no gain range".into()))?,
            exposure: camera
                .control_range(keys::EXPOSURE_TIME)
                .ok_or_else(|| RcamError::Config("device reports no exposure range".into()))?,
            lens: camera.control_range(keys::LENS_POSITION),
        };

        if config.max_fps > 0 {
            match camera.control_range(keys::FRAME_DURATION_LIMITS) {
                Some(limits) => {
                    let (min, max) = frame_duration_limits(limits, config.max_fps);
                    let mut controls = ControlMap::new();
                    controls.insert(keys::FRAME_DURATION_LIMITS.into(), json!([min, max]));
                    camera.set_controls(&controls)?;
                    info!("frame duration limited to [{}, {}] us", min, max);
                }
                None => warn!("device reports no frame duration limits, fps cap ignored"),
            }
        }

        let (router_ep, pipeline_ep) = control::channel();
        let (to_pipeline, telemetry_rx) = router_ep.split();
        let router = CommandRouter::new(ranges, to_pipeline);

        let hub = PublishHub::new();
        let capture = Capture::from_properties(camera.as_ref());
        let mut pipeline = Pipeline::new(camera, pipeline_ep);
        let telemetry = pipeline.telemetry_sender();
        pipeline = pipeline
            .with_stage(capture)
            .with_stage(FocusControl::new())
            .with_stage(ExposureControl::new(config.ae_enabled()))
            .with_stage(WhiteBalanceControl::new(config.ae_enabled()));
        pipeline = match config.mode {
            OutputMode::Rgb => pipeline,
            OutputMode::RawLinear => pipeline.with_stage(RawConvert::new(RawEncoding::Linear8)),
            OutputMode::RawGamma => pipeline.with_stage(RawConvert::new(RawEncoding::Gamma8)),
        };
        let pipeline = pipeline
            .with_stage(FrameFit::new())
            .with_stage(JpegEncode::new(config.jpeg_quality))
            .with_stage(Publish::new(hub.clone(), telemetry));

        let api_listener =
            TcpListener::bind((config.bind_address.as_str(), config.api_port)).await?;
        // an ephemeral command port gets an ephemeral publish port too
        let pub_port = if config.api_port == 0 {
            0
        } else {
            config.pub_port()
        };
        let pub_listener = TcpListener::bind((config.bind_address.as_str(), pub_port)).await?;
        let api_addr = api_listener.local_addr()?;
        let pub_addr = pub_listener.local_addr()?;
        info!("listening on {} (commands) and {} (publish)", api_addr, pub_addr);

        Ok(BoundServer {
            api_addr,
            pub_addr,
            api_listener,
            pub_listener,
            hub,
            router,
            telemetry_rx,
            pipeline,
        })
    }

    /// Bind and run until shutdown
    pub async fn run(self, camera: Box<dyn CameraDevice>) -> Result<()> {
        self.bind(camera).await?.run().await
    }
}

/// A server with its listeners bound, ready to run
pub struct BoundServer {
    api_addr: SocketAddr,
    pub_addr: SocketAddr,
    api_listener: TcpListener,
    pub_listener: TcpListener,
    hub: Arc<PublishHub>,
    router: CommandRouter,
    telemetry_rx: ControlReceiver,
    pipeline: Pipeline,
}

impl BoundServer {
    /// Bound address of the command socket
    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    /// Bound address of the publish socket
    pub fn pub_addr(&self) -> SocketAddr {
        self.pub_addr
    }

    /// Run until a shutdown command or Ctrl-C arrives
    pub async fn run(self) -> Result<()> {
        let BoundServer {
            api_listener,
            pub_listener,
            hub,
            mut router,
            mut telemetry_rx,
            pipeline,
            ..
        } = self;

        let pub_task = tokio::spawn(accept_subscribers(pub_listener, hub));
        let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
        let cmd_task = tokio::spawn(accept_commands(api_listener, cmd_tx));

        let mut pipeline_task = tokio::task::spawn_blocking(move || pipeline.run());

        let run_result = loop {
            tokio::select! {
                joined = &mut pipeline_task => {
                    break joined.map_err(|e| {
                        RcamError::Camera(format!("pipeline task panicked: {}", e))
                    })?;
                }
                Some(command) = cmd_rx.recv() => {
                    router.handle(command);
                }
                Some(delta) = telemetry_rx.recv() => {
                    router.apply_telemetry(&delta);
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted, shutting down");
                    router.handle(Command::Shutdown);
                }
            }
        };

        cmd_task.abort();
        pub_task.abort();
        info!("server stopped");
        run_result
    }
}

/// Accept publish subscribers, each served by its own forwarding task
async fn accept_subscribers(listener: TcpListener, hub: Arc<PublishHub>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("publish connection from {}", peer);
                tokio::spawn(hub.clone().forward(stream));
            }
            Err(e) => {
                warn!("publish accept failed: {}", e);
            }
        }
    }
}

/// Accept command connections, one served at a time
///
/// A protocol error closes the offending connection; the listener itself
/// keeps running.
async fn accept_commands(listener: TcpListener, commands: mpsc::Sender<Command>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("command connection from {}", peer);
                if let Err(e) = serve_commands(stream, &commands).await {
                    error!("command connection from {} closed: {}", peer, e);
                }
            }
            Err(e) => {
                warn!("command accept failed: {}", e);
            }
        }
    }
}

async fn serve_commands(mut stream: TcpStream, commands: &mpsc::Sender<Command>) -> Result<()> {
    loop {
        let (tag, body) = match protocol::read_command(&mut stream).await {
            Ok(parts) => parts,
            Err(RcamError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let command = Command::parse(&tag, &body)?;
        if commands.send(command).await.is_err() {
            // router is gone, the server is shutting down
            return Ok(());
        }
    }
}
