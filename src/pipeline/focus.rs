//! Focus control stage

use serde_json::{json, Value};

use super::Stage;
use crate::camera::{CameraDevice, Frame};
use crate::control::{keys, ControlMap};
use crate::error::Result;

/// Applies focus-related control deltas to the device and stamps the
/// effective `AfEnable` state into the metadata.
///
/// The device does not echo the autofocus mode back reliably, so the stage
/// tracks it locally across iterations. A manual lens position implicitly
/// switches autofocus off.
pub struct FocusControl {
    af_enable: bool,
    started: bool,
}

impl FocusControl {
    pub fn new() -> Self {
        Self {
            af_enable: true,
            started: false,
        }
    }
}

impl Default for FocusControl {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for FocusControl {
    fn name(&self) -> &'static str {
        "focus"
    }

    fn process(&mut self, camera: &mut dyn CameraDevice, frame: &mut Frame) -> Result<()> {
        let mut device_controls = ControlMap::new();

        // start in autofocus mode with a triggered focus run
        if !self.started {
            self.started = true;
            device_controls.insert(keys::AF_MODE.into(), json!("auto"));
            device_controls.insert(keys::AF_TRIGGER.into(), json!(true));
        }

        if let Some(enable) = frame.controls.get(keys::AF_ENABLE).and_then(Value::as_bool) {
            self.af_enable = enable;
            if enable {
                device_controls.insert(keys::AF_MODE.into(), json!("auto"));
                device_controls.insert(keys::AF_TRIGGER.into(), json!(true));
            } else {
                device_controls.insert(keys::AF_MODE.into(), json!("manual"));
            }
        }

        if frame
            .controls
            .get(keys::AF_TRIGGER)
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            device_controls.insert(keys::AF_TRIGGER.into(), json!(true));
        }

        if let Some(position) = frame.controls.get(keys::LENS_POSITION) {
            self.af_enable = false;
            device_controls.insert(keys::AF_MODE.into(), json!("manual"));
            device_controls.insert(keys::LENS_POSITION.into(), position.clone());
        }

        if !device_controls.is_empty() {
            camera.set_controls(&device_controls)?;
        }

        frame
            .metadata
            .insert(keys::AF_ENABLE.into(), json!(self.af_enable));
        Ok(())
    }
}
