//! Exposure control stage

use serde_json::{json, Value};

use super::Stage;
use crate::camera::{CameraDevice, Frame};
use crate::control::{keys, ControlMap};
use crate::error::Result;

/// Controls this stage owns and forwards to the device
const LOCAL_KEYS: [&str; 4] = [
    keys::AE_ENABLE,
    keys::AWB_ENABLE,
    keys::ANALOGUE_GAIN,
    keys::EXPOSURE_TIME,
];

/// Applies exposure-related control deltas to the device and stamps the
/// effective `AeEnable` state into the metadata.
pub struct ExposureControl {
    ae_enable: bool,
}

impl ExposureControl {
    /// `ae_enable` is the startup state (false when a fixed exposure was
    /// configured on the command line).
    pub fn new(ae_enable: bool) -> Self {
        Self { ae_enable }
    }
}

impl Stage for ExposureControl {
    fn name(&self) -> &'static str {
        "exposure"
    }

    fn process(&mut self, camera: &mut dyn CameraDevice, frame: &mut Frame) -> Result<()> {
        let mut device_controls = ControlMap::new();
        for key in LOCAL_KEYS {
            if let Some(value) = frame.controls.get(key) {
                device_controls.insert(key.to_string(), value.clone());
            }
        }

        if !device_controls.is_empty() {
            camera.set_controls(&device_controls)?;
        }

        if let Some(enable) = device_controls.get(keys::AE_ENABLE).and_then(Value::as_bool) {
            self.ae_enable = enable;
        }
        frame
            .metadata
            .insert(keys::AE_ENABLE.into(), json!(self.ae_enable));
        Ok(())
    }
}
