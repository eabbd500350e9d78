//! JPEG encode stage

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use super::Stage;
use crate::camera::{CameraDevice, Frame, PixelFormat, ROLE_MAIN};
use crate::error::{RcamError, Result};

/// Serializes the main image to JPEG at fixed quality
pub struct JpegEncode {
    quality: u8,
}

impl JpegEncode {
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }
}

impl Stage for JpegEncode {
    fn name(&self) -> &'static str {
        "jpeg_encode"
    }

    fn process(&mut self, _camera: &mut dyn CameraDevice, frame: &mut Frame) -> Result<()> {
        let image = frame
            .images
            .get(ROLE_MAIN)
            .ok_or_else(|| RcamError::Camera("no main image to encode".into()))?;
        if image.format != PixelFormat::Rgb24 {
            return Err(RcamError::Codec(format!(
                "JPEG encoder expects RGB input, got {}",
                image.format
            )));
        }

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.quality)
            .encode(
                &image.data,
                image.width,
                image.height,
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| RcamError::Codec(format!("JPEG encode failed: {}", e)))?;

        frame.jpeg = Some(Bytes::from(encoded));
        Ok(())
    }
}
