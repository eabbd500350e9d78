//! Capture device abstraction
//!
//! The pipeline talks to the sensor exclusively through [`CameraDevice`].
//! Real sensor bindings implement it out of tree; [`super::stub::StubCamera`]
//! implements it in-process for tests and hardware-free operation.

use std::collections::BTreeMap;

use crate::camera::format::Resolution;
use crate::camera::frame::ImageBuffer;
use crate::control::ControlMap;
use crate::error::Result;

/// Authoritative value range of one device control
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ControlRange {
    pub fn new(min: f64, max: f64, default: f64) -> Self {
        Self { min, max, default }
    }

    /// Clamp a value into this range
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Static device properties, fixed after configuration
#[derive(Debug, Clone)]
pub struct CameraProperties {
    /// Sensor model string
    pub model: String,
    /// Configured main stream size
    pub resolution: Resolution,
}

/// Device configuration applied once before starting
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Requested main stream size
    pub resolution: Resolution,
    /// Also deliver the sensor-native raw stream
    pub raw: bool,
    /// Flip the image horizontally
    pub hflip: bool,
    /// Flip the image vertically
    pub vflip: bool,
    /// Number of device buffers
    pub buffer_count: u32,
    /// Controls applied at startup (auto exposure, fixed gain/exposure, ...)
    pub controls: ControlMap,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(1280, 720),
            raw: false,
            hflip: false,
            vflip: false,
            buffer_count: 3,
            controls: ControlMap::new(),
        }
    }
}

/// Result of one completed capture: image buffers by role plus the metadata
/// produced by the device for that exact capture.
#[derive(Debug)]
pub struct CaptureOutput {
    pub images: BTreeMap<String, ImageBuffer>,
    pub metadata: ControlMap,
}

/// Interface the pipeline needs from a capture device
///
/// The capture model is pipelined one frame deep: `start_capture` issues the
/// first asynchronous capture, and every `await_and_reissue` call waits for
/// the outstanding capture and immediately queues the next one before
/// returning, so the device is never idle while a frame is processed.
pub trait CameraDevice: Send {
    /// Apply the device configuration; fatal on unsupported settings
    fn configure(&mut self, config: &CameraConfig) -> Result<()>;

    /// Start the capture device
    fn start(&mut self) -> Result<()>;

    /// Issue the first asynchronous capture
    fn start_capture(&mut self) -> Result<()>;

    /// Wait for the outstanding capture, reissue, and return the completed one
    fn await_and_reissue(&mut self) -> Result<CaptureOutput>;

    /// Apply a sparse set of controls to the device
    fn set_controls(&mut self, controls: &ControlMap) -> Result<()>;

    /// `[min, max, default]` range of a control, if the device exposes it
    fn control_range(&self, name: &str) -> Option<ControlRange>;

    /// Static device properties
    fn properties(&self) -> &CameraProperties;
}
