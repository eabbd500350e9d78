//! Raw conversion stage
//!
//! Turns the sensor-native Bayer buffer into the visible RGB image: scale to
//! the full 16-bit range, subtract the per-frame sensor black level, demosaic,
//! then reduce to 8 bits either linearly or through a 1/2.2 power law.

use serde_json::Value;

use super::Stage;
use crate::camera::format::{CfaChannel, CfaPattern};
use crate::camera::{CameraDevice, Frame, ImageBuffer, PixelFormat, ROLE_MAIN, ROLE_RAW};
use crate::control::keys;
use crate::error::{RcamError, Result};

/// 8-bit reduction applied after demosaic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEncoding {
    /// Scale 65535 -> 255 linearly
    Linear8,
    /// Apply x^(1/2.2) before scaling to 8 bit
    Gamma8,
}

/// Demosaic stage, only present in the raw output modes
pub struct RawConvert {
    encoding: RawEncoding,
}

impl RawConvert {
    pub fn new(encoding: RawEncoding) -> Self {
        Self { encoding }
    }
}

impl Stage for RawConvert {
    fn name(&self) -> &'static str {
        "raw_convert"
    }

    fn process(&mut self, _camera: &mut dyn CameraDevice, frame: &mut Frame) -> Result<()> {
        let raw = frame
            .images
            .remove(ROLE_RAW)
            .ok_or_else(|| RcamError::Camera("raw mode selected but no raw plane".into()))?;

        let scale = raw
            .format
            .raw_scale()
            .ok_or_else(|| RcamError::Codec(format!("{} is not a raw format", raw.format)))?;
        let cfa = raw
            .format
            .cfa()
            .ok_or_else(|| RcamError::Codec(format!("{} has no CFA layout", raw.format)))?;

        let black_level = frame
            .metadata
            .get(keys::SENSOR_BLACK_LEVELS)
            .and_then(Value::as_array)
            .and_then(|levels| levels.first())
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as f32;

        // scale to the top of the 16-bit word, then subtract the black level
        let planar: Vec<u16> = raw
            .as_u16()
            .into_iter()
            .map(|sample| {
                let scaled = (sample as f32 * scale).min(65535.0);
                (scaled.max(black_level) - black_level) as u16
            })
            .collect();

        let rgb16 = demosaic(&planar, raw.width, raw.height, cfa);
        let rgb8: Vec<u8> = match self.encoding {
            RawEncoding::Linear8 => {
                let scale8 = 255.0 / 65535.0;
                rgb16
                    .iter()
                    .map(|&v| (v as f32 * scale8).round().min(255.0) as u8)
                    .collect()
            }
            RawEncoding::Gamma8 => {
                let scale8 = 255.0 / 65535f32.powf(1.0 / 2.2);
                rgb16
                    .iter()
                    .map(|&v| ((v as f32).powf(1.0 / 2.2) * scale8).round().min(255.0) as u8)
                    .collect()
            }
        };

        frame.images.insert(
            ROLE_MAIN.to_string(),
            ImageBuffer::new(rgb8, raw.width, raw.height, PixelFormat::Rgb24),
        );
        Ok(())
    }
}

/// Bilinear demosaic: each missing channel is the mean of the 3x3
/// neighborhood photosites of that channel.
fn demosaic(samples: &[u16], width: u32, height: u32, cfa: CfaPattern) -> Vec<u16> {
    let (w, h) = (width as i64, height as i64);
    let mut rgb = vec![0u16; (width * height * 3) as usize];

    for y in 0..h {
        for x in 0..w {
            let mut sums = [0u32; 3];
            let mut counts = [0u32; 3];
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let channel = match cfa.channel_at(nx as u32, ny as u32) {
                        CfaChannel::Red => 0,
                        CfaChannel::Green => 1,
                        CfaChannel::Blue => 2,
                    };
                    sums[channel] += samples[(ny * w + nx) as usize] as u32;
                    counts[channel] += 1;
                }
            }

            let own = samples[(y * w + x) as usize];
            let own_channel = match cfa.channel_at(x as u32, y as u32) {
                CfaChannel::Red => 0,
                CfaChannel::Green => 1,
                CfaChannel::Blue => 2,
            };

            let base = ((y * w + x) * 3) as usize;
            for channel in 0..3 {
                rgb[base + channel] = if channel == own_channel {
                    own
                } else if counts[channel] > 0 {
                    (sums[channel] / counts[channel]) as u16
                } else {
                    0
                };
            }
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConfig, Resolution, StubCamera};
    use crate::control::ControlMap;
    use serde_json::json;

    fn raw_frame(value: u16, black: u16) -> Frame {
        let (width, height) = (4u32, 4u32);
        let mut data = Vec::new();
        for _ in 0..width * height {
            data.extend_from_slice(&value.to_ne_bytes());
        }
        let mut frame = Frame::new(0, ControlMap::new());
        frame.images.insert(
            ROLE_RAW.to_string(),
            ImageBuffer::new(data, width, height, PixelFormat::SBggr16),
        );
        frame.metadata.insert(
            keys::SENSOR_BLACK_LEVELS.into(),
            json!([black, black, black, black]),
        );
        frame
    }

    fn stub() -> StubCamera {
        let mut camera = StubCamera::new();
        camera
            .configure(&CameraConfig {
                resolution: Resolution::new(4, 4),
                ..Default::default()
            })
            .unwrap();
        camera
    }

    #[test]
    fn constant_field_maps_linearly() {
        // 16448 = 64 * 257, so the linear 8-bit value is exactly 64
        let mut frame = raw_frame(16448, 0);
        let mut stage = RawConvert::new(RawEncoding::Linear8);
        stage.process(&mut stub(), &mut frame).unwrap();

        let main = frame.main().unwrap();
        assert_eq!(main.format, PixelFormat::Rgb24);
        assert_eq!(main.data.len(), 4 * 4 * 3);
        assert!(main.data.iter().all(|&v| v == 64));
        assert!(!frame.images.contains_key(ROLE_RAW));
    }

    #[test]
    fn black_level_is_subtracted() {
        let mut frame = raw_frame(4096, 4096);
        let mut stage = RawConvert::new(RawEncoding::Linear8);
        stage.process(&mut stub(), &mut frame).unwrap();
        assert!(frame.main().unwrap().data.iter().all(|&v| v == 0));
    }

    #[test]
    fn gamma_maps_white_to_white_and_brightens_midtones() {
        let mut white = raw_frame(65535, 0);
        RawConvert::new(RawEncoding::Gamma8)
            .process(&mut stub(), &mut white)
            .unwrap();
        assert!(white.main().unwrap().data.iter().all(|&v| v == 255));

        let mut mid_linear = raw_frame(16448, 0);
        RawConvert::new(RawEncoding::Linear8)
            .process(&mut stub(), &mut mid_linear)
            .unwrap();
        let mut mid_gamma = raw_frame(16448, 0);
        RawConvert::new(RawEncoding::Gamma8)
            .process(&mut stub(), &mut mid_gamma)
            .unwrap();
        assert!(mid_gamma.main().unwrap().data[0] > mid_linear.main().unwrap().data[0]);
    }

    #[test]
    fn stub_raw_gradient_survives_conversion() {
        let mut camera = StubCamera::new();
        camera
            .configure(&CameraConfig {
                resolution: Resolution::new(16, 12),
                raw: true,
                ..Default::default()
            })
            .unwrap();
        camera.start().unwrap();
        camera.start_capture().unwrap();
        let output = camera.await_and_reissue().unwrap();

        let mut frame = Frame::new(0, ControlMap::new());
        frame.images = output.images;
        frame.metadata = output.metadata;
        RawConvert::new(RawEncoding::Linear8)
            .process(&mut camera, &mut frame)
            .unwrap();

        let main = frame.main().unwrap();
        let min = *main.data.iter().min().unwrap();
        let max = *main.data.iter().max().unwrap();
        assert!(max > min, "converted raw image is flat");
        assert!(max < 255, "converted raw image saturated");
    }

    #[test]
    fn missing_raw_plane_is_an_error() {
        let mut frame = Frame::new(0, ControlMap::new());
        let mut stage = RawConvert::new(RawEncoding::Linear8);
        assert!(stage.process(&mut stub(), &mut frame).is_err());
    }
}
