//! Capture stage

use serde_json::json;

use super::Stage;
use crate::camera::{CameraDevice, Frame, Resolution};
use crate::control::keys;
use crate::error::Result;

/// Waits on the in-flight capture and immediately reissues the next one, so
/// the device keeps exposing while the rest of the chain runs. Stamps the
/// camera model and configured image size into the frame metadata.
pub struct Capture {
    model: String,
    image_size: Resolution,
}

impl Capture {
    pub fn new(model: String, image_size: Resolution) -> Self {
        Self { model, image_size }
    }

    /// Build the stage from the device's static properties
    pub fn from_properties(camera: &dyn CameraDevice) -> Self {
        let properties = camera.properties();
        Self::new(properties.model.clone(), properties.resolution)
    }
}

impl Stage for Capture {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn process(&mut self, camera: &mut dyn CameraDevice, frame: &mut Frame) -> Result<()> {
        let output = camera.await_and_reissue()?;

        frame.images = output.images;
        frame.metadata = output.metadata;
        frame
            .metadata
            .insert(keys::CAMERA_MODEL.into(), json!(self.model));
        frame.metadata.insert(
            keys::IMAGE_SIZE.into(),
            json!([self.image_size.width, self.image_size.height]),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConfig, StubCamera, ROLE_MAIN};
    use crate::control::ControlMap;

    #[test]
    fn stamps_model_and_image_size() {
        let mut camera = StubCamera::new();
        camera
            .configure(&CameraConfig {
                resolution: Resolution::new(8, 6),
                ..Default::default()
            })
            .unwrap();
        camera.start().unwrap();
        camera.start_capture().unwrap();

        let mut stage = Capture::from_properties(&camera);
        let mut frame = Frame::new(0, ControlMap::new());
        stage.process(&mut camera, &mut frame).unwrap();

        assert_eq!(frame.metadata[keys::CAMERA_MODEL], json!("stub-imx477"));
        assert_eq!(frame.metadata[keys::IMAGE_SIZE], json!([8, 6]));
        assert!(frame.images.contains_key(ROLE_MAIN));
    }
}
