//! Frame pipeline
//!
//! A strictly ordered chain of stages, each consuming the previous stage's
//! frame 1:1 with no buffering, reordering or dropping inside the chain. The
//! driver merges pending control deltas once per iteration, runs the stages,
//! and exits gracefully after the cycle that carried the `Over` control.

pub mod capture;
pub mod encode;
pub mod exposure;
pub mod fit;
pub mod focus;
pub mod publish;
pub mod raw;
pub mod white_balance;

pub use capture::Capture;
pub use encode::JpegEncode;
pub use exposure::ExposureControl;
pub use fit::{FitMode, FrameFit};
pub use focus::FocusControl;
pub use publish::Publish;
pub use raw::{RawConvert, RawEncoding};
pub use white_balance::WhiteBalanceControl;

use tracing::{debug, info};

use crate::camera::{CameraDevice, Frame};
use crate::control::{self, ControlMap, PipelineEndpoint};
use crate::error::Result;

/// One frame-processing stage
///
/// Stages mutate the frame in place; stages that talk to the device get it
/// through the driver, which owns it exclusively.
pub trait Stage: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, camera: &mut dyn CameraDevice, frame: &mut Frame) -> Result<()>;
}

/// Pipeline driver: owns the capture device and the stage chain
pub struct Pipeline {
    camera: Box<dyn CameraDevice>,
    control: PipelineEndpoint,
    stages: Vec<Box<dyn Stage>>,
    sequence: u64,
}

impl Pipeline {
    pub fn new(camera: Box<dyn CameraDevice>, control: PipelineEndpoint) -> Self {
        Self {
            camera,
            control,
            stages: Vec::new(),
            sequence: 0,
        }
    }

    /// Append a stage to the chain
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Clone of the telemetry sender toward the router
    pub fn telemetry_sender(&self) -> control::ControlSender {
        self.control.sender()
    }

    /// Drain the control channel and merge pending deltas into one map;
    /// later deltas overwrite earlier ones per key.
    fn ingest_controls(&mut self) -> ControlMap {
        let mut merged = ControlMap::new();
        for delta in self.control.poll_all() {
            control::merge(&mut merged, delta);
        }
        merged
    }

    /// Run the capture loop until the `Over` control arrives
    ///
    /// The device is started here and the first capture issued before the
    /// loop, so every iteration finds a capture already in flight.
    pub fn run(mut self) -> Result<()> {
        info!("pipeline: start");
        self.camera.start()?;
        self.camera.start_capture()?;

        loop {
            let controls = self.ingest_controls();
            let mut frame = Frame::new(self.sequence, controls);
            self.sequence += 1;

            for stage in &mut self.stages {
                stage.process(self.camera.as_mut(), &mut frame)?;
            }
            debug!(sequence = frame.sequence, "cycle complete");

            // graceful drain: the final cycle runs to completion first
            if frame.is_over() {
                break;
            }
        }

        info!("pipeline: finish");
        Ok(())
    }
}
