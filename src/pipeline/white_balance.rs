//! White balance control stage

use serde_json::{json, Value};

use super::Stage;
use crate::camera::{CameraDevice, Frame};
use crate::control::{keys, ControlMap};
use crate::error::Result;

/// Narrow pass-through for white-balance-specific controls
///
/// `AwbEnable` itself is applied by the exposure stage; this stage tracks it
/// for the metadata stamp and forwards mode and gain overrides.
pub struct WhiteBalanceControl {
    awb_enable: bool,
}

impl WhiteBalanceControl {
    pub fn new(awb_enable: bool) -> Self {
        Self { awb_enable }
    }
}

impl Stage for WhiteBalanceControl {
    fn name(&self) -> &'static str {
        "white_balance"
    }

    fn process(&mut self, camera: &mut dyn CameraDevice, frame: &mut Frame) -> Result<()> {
        let mut device_controls = ControlMap::new();
        for key in [keys::AWB_MODE, keys::COLOUR_GAINS] {
            if let Some(value) = frame.controls.get(key) {
                device_controls.insert(key.to_string(), value.clone());
            }
        }

        if !device_controls.is_empty() {
            camera.set_controls(&device_controls)?;
        }

        if let Some(enable) = frame.controls.get(keys::AWB_ENABLE).and_then(Value::as_bool) {
            self.awb_enable = enable;
        }
        frame
            .metadata
            .insert(keys::AWB_ENABLE.into(), json!(self.awb_enable));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConfig, Resolution, StubCamera};

    #[test]
    fn tracks_awb_enable_and_stamps_metadata() {
        let mut camera = StubCamera::new();
        camera
            .configure(&CameraConfig {
                resolution: Resolution::new(8, 6),
                ..Default::default()
            })
            .unwrap();
        let mut stage = WhiteBalanceControl::new(true);

        let mut controls = ControlMap::new();
        controls.insert(keys::AWB_ENABLE.into(), json!(false));
        controls.insert(keys::COLOUR_GAINS.into(), json!([1.8, 1.4]));
        let mut frame = Frame::new(0, controls);
        stage.process(&mut camera, &mut frame).unwrap();
        assert_eq!(frame.metadata[keys::AWB_ENABLE], json!(false));

        let mut frame = Frame::new(1, ControlMap::new());
        stage.process(&mut camera, &mut frame).unwrap();
        assert_eq!(frame.metadata[keys::AWB_ENABLE], json!(false));
    }
}
