//! Control channel between the command router and the frame pipeline
//!
//! A duplex, best-effort, non-blocking channel carrying sparse control deltas
//! in both directions. Sends are fire-and-forget; receives are polled. The
//! router side pushes control changes toward the pipeline, the pipeline pushes
//! derived telemetry (current gain, exposure, lens position) back.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::mpsc;

/// Sparse mapping from control name to value
///
/// Used for control deltas, per-frame merged controls, and frame metadata.
pub type ControlMap = BTreeMap<String, Value>;

/// Well-known control and metadata keys
pub mod keys {
    pub const ANALOGUE_GAIN: &str = "AnalogueGain";
    pub const EXPOSURE_TIME: &str = "ExposureTime";
    pub const AE_ENABLE: &str = "AeEnable";
    pub const AWB_ENABLE: &str = "AwbEnable";
    pub const AWB_MODE: &str = "AwbMode";
    pub const COLOUR_GAINS: &str = "ColourGains";
    pub const AF_ENABLE: &str = "AfEnable";
    pub const AF_MODE: &str = "AfMode";
    pub const AF_TRIGGER: &str = "AfTrigger";
    pub const LENS_POSITION: &str = "LensPosition";
    pub const FRAME_DURATION_LIMITS: &str = "FrameDurationLimits";
    pub const SENSOR_BLACK_LEVELS: &str = "SensorBlackLevels";
    pub const CAMERA_MODEL: &str = "CameraModel";
    pub const IMAGE_SIZE: &str = "ImageSize";
    pub const WIDTH: &str = "Width";
    pub const HEIGHT: &str = "Height";
    pub const FIT_MODE: &str = "FitMode";
    pub const OVER: &str = "Over";

    /// Metadata keys with this suffix carry bulky per-frame diagnostics and
    /// are stripped before publishing.
    pub const STATS_SUFFIX: &str = "StatsOutput";
}

/// Merge a delta into an accumulated control map; later values win per key
pub fn merge(into: &mut ControlMap, delta: ControlMap) {
    for (key, value) in delta {
        into.insert(key, value);
    }
}

/// Create a connected control channel pair
pub fn channel() -> (RouterEndpoint, PipelineEndpoint) {
    let (to_pipeline_tx, to_pipeline_rx) = mpsc::unbounded_channel();
    let (to_router_tx, to_router_rx) = mpsc::unbounded_channel();

    let router = RouterEndpoint {
        tx: ControlSender {
            tx: to_pipeline_tx,
        },
        rx: ControlReceiver { rx: to_router_rx },
    };
    let pipeline = PipelineEndpoint {
        tx: ControlSender { tx: to_router_tx },
        rx: ControlReceiver { rx: to_pipeline_rx },
    };
    (router, pipeline)
}

/// Sending half of one channel direction
///
/// `send` never blocks and never fails observably; a vanished peer simply
/// drops the delta.
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::UnboundedSender<ControlMap>,
}

impl ControlSender {
    pub fn send(&self, delta: ControlMap) {
        let _ = self.tx.send(delta);
    }
}

/// Receiving half of one channel direction
#[derive(Debug)]
pub struct ControlReceiver {
    rx: mpsc::UnboundedReceiver<ControlMap>,
}

impl ControlReceiver {
    /// All deltas received since the last call, in arrival order
    pub fn poll_all(&mut self) -> Vec<ControlMap> {
        let mut deltas = Vec::new();
        while let Ok(delta) = self.rx.try_recv() {
            deltas.push(delta);
        }
        deltas
    }

    /// Wait for the next delta; `None` once the peer is gone
    pub async fn recv(&mut self) -> Option<ControlMap> {
        self.rx.recv().await
    }
}

/// Router-side endpoint
#[derive(Debug)]
pub struct RouterEndpoint {
    tx: ControlSender,
    rx: ControlReceiver,
}

impl RouterEndpoint {
    /// Send a delta toward the pipeline
    pub fn send(&self, delta: ControlMap) {
        self.tx.send(delta);
    }

    /// Split into independent send/receive halves
    pub fn split(self) -> (ControlSender, ControlReceiver) {
        (self.tx, self.rx)
    }
}

/// Pipeline-side endpoint
#[derive(Debug)]
pub struct PipelineEndpoint {
    tx: ControlSender,
    rx: ControlReceiver,
}

impl PipelineEndpoint {
    /// Send a telemetry delta toward the router
    pub fn send(&self, delta: ControlMap) {
        self.tx.send(delta);
    }

    /// Clone of the telemetry sender, for the publish stage
    pub fn sender(&self) -> ControlSender {
        self.tx.clone()
    }

    /// All pending control deltas, in arrival order
    pub fn poll_all(&mut self) -> Vec<ControlMap> {
        self.rx.poll_all()
    }
}
