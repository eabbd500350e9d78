//! Frame fit stage
//!
//! Reconciles the captured image size with the most recently requested
//! display window, either by center-cropping or by scaling down with the
//! aspect ratio preserved. Never upscales.

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde_json::Value;

use super::Stage;
use crate::camera::{CameraDevice, Frame, ImageBuffer, PixelFormat, ROLE_MAIN};
use crate::control::keys;
use crate::error::{RcamError, Result};

/// Fit policy, switched at runtime by the `FitMode` control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Uniform downscale so neither dimension exceeds the window
    #[default]
    Scaled,
    /// Center-crop to the window
    Cropped,
}

/// Crop/scale stage
pub struct FrameFit {
    mode: FitMode,
    fit_width: u32,
    fit_height: u32,
}

impl FrameFit {
    pub fn new() -> Self {
        Self {
            mode: FitMode::default(),
            fit_width: u32::MAX,
            fit_height: u32::MAX,
        }
    }

    fn ingest_controls(&mut self, frame: &Frame) {
        if let Some(mode) = frame.controls.get(keys::FIT_MODE).and_then(Value::as_str) {
            self.mode = match mode {
                "cropped" => FitMode::Cropped,
                _ => FitMode::Scaled,
            };
        }
        if let Some(width) = frame.controls.get(keys::WIDTH).and_then(Value::as_u64) {
            self.fit_width = width as u32;
        }
        if let Some(height) = frame.controls.get(keys::HEIGHT).and_then(Value::as_u64) {
            self.fit_height = height as u32;
        }
    }

    fn crop(&self, image: &ImageBuffer) -> Option<ImageBuffer> {
        let crop_w = image.width.min(self.fit_width);
        let crop_h = image.height.min(self.fit_height);
        if crop_w == image.width && crop_h == image.height {
            // already small enough
            return None;
        }

        let x0 = ((image.width - crop_w) / 2) as usize;
        let y0 = ((image.height - crop_h) / 2) as usize;
        let src_stride = image.stride as usize;
        let row_bytes = crop_w as usize * 3;

        let mut data = Vec::with_capacity(crop_h as usize * row_bytes);
        for row in 0..crop_h as usize {
            let start = (y0 + row) * src_stride + x0 * 3;
            data.extend_from_slice(&image.data[start..start + row_bytes]);
        }
        Some(ImageBuffer::new(data, crop_w, crop_h, PixelFormat::Rgb24))
    }

    fn scale(&self, image: &ImageBuffer) -> Result<Option<ImageBuffer>> {
        let bound_w = image.width.min(self.fit_width);
        let bound_h = image.height.min(self.fit_height);
        if bound_w == image.width && bound_h == image.height {
            return Ok(None);
        }

        // preserve aspect ratio; never upscale
        let scale = (bound_w as f64 / image.width as f64)
            .min(bound_h as f64 / image.height as f64);
        let out_w = ((image.width as f64 * scale).round() as u32).max(1);
        let out_h = ((image.height as f64 * scale).round() as u32).max(1);

        let rgb = RgbImage::from_raw(image.width, image.height, image.data.clone())
            .ok_or_else(|| RcamError::Codec("main buffer size mismatch".into()))?;
        let resized = imageops::resize(&rgb, out_w, out_h, FilterType::Triangle);
        Ok(Some(ImageBuffer::new(
            resized.into_raw(),
            out_w,
            out_h,
            PixelFormat::Rgb24,
        )))
    }
}

impl Default for FrameFit {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for FrameFit {
    fn name(&self) -> &'static str {
        "frame_fit"
    }

    fn process(&mut self, _camera: &mut dyn CameraDevice, frame: &mut Frame) -> Result<()> {
        self.ingest_controls(frame);

        let image = frame
            .images
            .get(ROLE_MAIN)
            .ok_or_else(|| RcamError::Camera("no main image to fit".into()))?;
        if image.format != PixelFormat::Rgb24 {
            return Err(RcamError::Codec(format!(
                "frame fit expects RGB input, got {}",
                image.format
            )));
        }

        let replacement = match self.mode {
            FitMode::Cropped => self.crop(image),
            FitMode::Scaled => self.scale(image)?,
        };
        if let Some(replacement) = replacement {
            frame.images.insert(ROLE_MAIN.to_string(), replacement);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConfig, Resolution, StubCamera};
    use crate::control::ControlMap;
    use serde_json::json;

    fn stub() -> StubCamera {
        let mut camera = StubCamera::new();
        camera
            .configure(&CameraConfig {
                resolution: Resolution::new(8, 6),
                ..Default::default()
            })
            .unwrap();
        camera
    }

    /// Gradient where each pixel encodes its own coordinates
    fn coordinate_image(width: u32, height: u32) -> ImageBuffer {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x % 251) as u8);
                data.push((y % 251) as u8);
                data.push(0);
            }
        }
        ImageBuffer::new(data, width, height, PixelFormat::Rgb24)
    }

    fn frame_with(image: ImageBuffer, controls: ControlMap) -> Frame {
        let mut frame = Frame::new(0, controls);
        frame.images.insert(ROLE_MAIN.to_string(), image);
        frame
    }

    fn fit_controls(mode: &str, width: u32, height: u32) -> ControlMap {
        let mut controls = ControlMap::new();
        controls.insert(keys::FIT_MODE.into(), json!(mode));
        controls.insert(keys::WIDTH.into(), json!(width));
        controls.insert(keys::HEIGHT.into(), json!(height));
        controls
    }

    #[test]
    fn crop_is_centered() {
        let mut frame = frame_with(
            coordinate_image(1000, 800),
            fit_controls("cropped", 640, 480),
        );
        FrameFit::new().process(&mut stub(), &mut frame).unwrap();

        let main = frame.main().unwrap();
        assert_eq!((main.width, main.height), (640, 480));
        // crop origin is (180, 160)
        assert_eq!(main.data[0], (180u32 % 251) as u8);
        assert_eq!(main.data[1], (160u32 % 251) as u8);
    }

    #[test]
    fn crop_larger_window_is_a_noop() {
        let original = coordinate_image(320, 240);
        let mut frame = frame_with(original.clone(), fit_controls("cropped", 640, 480));
        FrameFit::new().process(&mut stub(), &mut frame).unwrap();
        let main = frame.main().unwrap();
        assert_eq!((main.width, main.height), (320, 240));
        assert_eq!(main.data, original.data);
    }

    #[test]
    fn scale_preserves_aspect_ratio() {
        let mut frame = frame_with(
            coordinate_image(1000, 500),
            fit_controls("scaled", 400, 400),
        );
        FrameFit::new().process(&mut stub(), &mut frame).unwrap();
        let main = frame.main().unwrap();
        assert_eq!((main.width, main.height), (400, 200));
    }

    #[test]
    fn scale_never_upscales() {
        let mut frame = frame_with(coordinate_image(320, 240), fit_controls("scaled", 640, 480));
        FrameFit::new().process(&mut stub(), &mut frame).unwrap();
        let main = frame.main().unwrap();
        assert_eq!((main.width, main.height), (320, 240));
    }

    #[test]
    fn fit_mode_persists_across_frames() {
        let mut stage = FrameFit::new();
        let mut camera = stub();

        let mut frame = frame_with(
            coordinate_image(1000, 800),
            fit_controls("cropped", 640, 480),
        );
        stage.process(&mut camera, &mut frame).unwrap();

        // next frame carries no controls but the crop still applies
        let mut frame = frame_with(coordinate_image(1000, 800), ControlMap::new());
        stage.process(&mut camera, &mut frame).unwrap();
        let main = frame.main().unwrap();
        assert_eq!((main.width, main.height), (640, 480));
    }
}
