//! In-process synthetic camera
//!
//! Generates a moving gradient test pattern and deterministic metadata. Used
//! by the test suite and by the shipped binaries when no real sensor binding
//! is linked in.

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Value};
use tracing::debug;

use super::device::{CameraConfig, CameraDevice, CameraProperties, CaptureOutput, ControlRange};
use super::format::{PixelFormat, Resolution};
use super::frame::{ImageBuffer, ROLE_MAIN, ROLE_RAW};
use crate::control::{keys, ControlMap};
use crate::error::{RcamError, Result};

/// Raw format the stub sensor produces when the raw stream is requested
pub const STUB_RAW_FORMAT: PixelFormat = PixelFormat::SBggr12;
/// Black level baked into the raw samples, in native 12-bit units
pub const STUB_BLACK_LEVEL_NATIVE: u16 = 256;
/// The same black level on the 16-bit scale, as reported in
/// `SensorBlackLevels` metadata
pub const STUB_BLACK_LEVEL: u16 = 4096;

/// Synthetic capture device
pub struct StubCamera {
    properties: CameraProperties,
    config: CameraConfig,
    ranges: HashMap<&'static str, ControlRange>,
    /// Control state as last applied via `set_controls`
    controls: ControlMap,
    started: bool,
    /// Whether an asynchronous capture is outstanding
    pending: bool,
    frame_counter: u64,
}

impl StubCamera {
    pub fn new() -> Self {
        let mut ranges = HashMap::new();
        ranges.insert(keys::ANALOGUE_GAIN, ControlRange::new(1.0, 16.0, 1.0));
        ranges.insert(
            keys::EXPOSURE_TIME,
            ControlRange::new(100.0, 66666.0, 20000.0),
        );
        ranges.insert(keys::LENS_POSITION, ControlRange::new(0.0, 32.0, 1.0));
        ranges.insert(
            keys::FRAME_DURATION_LIMITS,
            ControlRange::new(33333.0, 120000.0, 33333.0),
        );

        Self {
            properties: CameraProperties {
                model: "stub-imx477".to_string(),
                resolution: Resolution::new(1280, 720),
            },
            config: CameraConfig::default(),
            ranges,
            controls: ControlMap::new(),
            started: false,
            pending: false,
            frame_counter: 0,
        }
    }

    fn control_f64(&self, name: &str) -> f64 {
        self.controls
            .get(name)
            .and_then(Value::as_f64)
            .unwrap_or_else(|| self.ranges.get(name).map(|r| r.default).unwrap_or(0.0))
    }

    fn render_main(&self) -> ImageBuffer {
        let Resolution { width, height } = self.config.resolution;
        let phase = (self.frame_counter % 256) as u32;
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((((x + phase) * 255) / width.max(1)) as u8);
                data.push(((y * 255) / height.max(1)) as u8);
                data.push((phase % 256) as u8);
            }
        }
        ImageBuffer::new(data, width, height, PixelFormat::Rgb24)
    }

    fn render_raw(&self) -> ImageBuffer {
        let Resolution { width, height } = self.config.resolution;
        let phase = (self.frame_counter % 256) as u32;
        let black = STUB_BLACK_LEVEL_NATIVE as u32;
        let mut data = Vec::with_capacity((width * height * 2) as usize);
        for y in 0..height {
            for x in 0..width {
                // gradient in native 12-bit units, sitting on the black level
                let sample = (((x + y + phase) % (4095 - black)) + black) as u16;
                data.extend_from_slice(&sample.to_ne_bytes());
            }
        }
        ImageBuffer::new(data, width, height, STUB_RAW_FORMAT)
    }

    fn metadata(&self) -> ControlMap {
        let mut metadata = ControlMap::new();
        metadata.insert(
            keys::ANALOGUE_GAIN.into(),
            json!(self.control_f64(keys::ANALOGUE_GAIN)),
        );
        metadata.insert(
            keys::EXPOSURE_TIME.into(),
            json!(self.control_f64(keys::EXPOSURE_TIME).round() as i64),
        );
        metadata.insert(
            keys::LENS_POSITION.into(),
            json!(self.control_f64(keys::LENS_POSITION)),
        );
        metadata.insert("DigitalGain".into(), json!(1.0));
        metadata.insert(
            keys::SENSOR_BLACK_LEVELS.into(),
            json!([
                STUB_BLACK_LEVEL,
                STUB_BLACK_LEVEL,
                STUB_BLACK_LEVEL,
                STUB_BLACK_LEVEL
            ]),
        );
        metadata.insert("FrameDuration".into(), json!(33333));
        // bulky diagnostics the publish stage must strip
        metadata.insert("AeStatsOutput".into(), json!([0, 0, 0, 0]));
        metadata
    }
}

impl Default for StubCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDevice for StubCamera {
    fn configure(&mut self, config: &CameraConfig) -> Result<()> {
        if config.resolution.width == 0 || config.resolution.height == 0 {
            return Err(RcamError::Config(format!(
                "unsupported capture size {}",
                config.resolution
            )));
        }
        self.config = config.clone();
        self.properties.resolution = config.resolution;
        self.controls = config.controls.clone();
        debug!(
            "stub camera configured: {} raw={}",
            config.resolution, config.raw
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn start_capture(&mut self) -> Result<()> {
        if !self.started {
            return Err(RcamError::Camera("capture before start".into()));
        }
        self.pending = true;
        Ok(())
    }

    fn await_and_reissue(&mut self) -> Result<CaptureOutput> {
        if !self.pending {
            return Err(RcamError::Camera("no capture in flight".into()));
        }
        // complete the outstanding capture and queue the next one
        self.frame_counter += 1;

        let mut images = BTreeMap::new();
        images.insert(ROLE_MAIN.to_string(), self.render_main());
        if self.config.raw {
            images.insert(ROLE_RAW.to_string(), self.render_raw());
        }

        Ok(CaptureOutput {
            images,
            metadata: self.metadata(),
        })
    }

    fn set_controls(&mut self, controls: &ControlMap) -> Result<()> {
        for (key, value) in controls {
            self.controls.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn control_range(&self, name: &str) -> Option<ControlRange> {
        self.ranges.get(name).copied()
    }

    fn properties(&self) -> &CameraProperties {
        &self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_stub(raw: bool) -> StubCamera {
        let mut camera = StubCamera::new();
        let config = CameraConfig {
            resolution: Resolution::new(8, 6),
            raw,
            ..Default::default()
        };
        camera.configure(&config).unwrap();
        camera.start().unwrap();
        camera
    }

    #[test]
    fn await_without_outstanding_capture_fails() {
        let mut camera = started_stub(false);
        assert!(camera.await_and_reissue().is_err());
        camera.start_capture().unwrap();
        assert!(camera.await_and_reissue().is_ok());
        // reissued implicitly, so the next wait succeeds too
        assert!(camera.await_and_reissue().is_ok());
    }

    #[test]
    fn capture_delivers_main_and_metadata() {
        let mut camera = started_stub(false);
        camera.start_capture().unwrap();
        let output = camera.await_and_reissue().unwrap();
        let main = &output.images[ROLE_MAIN];
        assert_eq!(main.width, 8);
        assert_eq!(main.data.len(), 8 * 6 * 3);
        assert!(output.metadata.contains_key(keys::ANALOGUE_GAIN));
        assert!(output.metadata.contains_key("AeStatsOutput"));
    }

    #[test]
    fn raw_mode_adds_raw_plane() {
        let mut camera = started_stub(true);
        camera.start_capture().unwrap();
        let output = camera.await_and_reissue().unwrap();
        let raw = &output.images[ROLE_RAW];
        assert_eq!(raw.format, STUB_RAW_FORMAT);
        assert_eq!(raw.data.len(), 8 * 6 * 2);
    }

    #[test]
    fn raw_samples_stay_in_native_range() {
        // 12-bit samples with the black level in native units; the 16-bit
        // scaling is the raw conversion stage's job
        let mut camera = started_stub(true);
        camera.start_capture().unwrap();
        let output = camera.await_and_reissue().unwrap();
        let samples = output.images[ROLE_RAW].as_u16();
        assert!(samples.iter().all(|&s| s <= 4095));
        assert!(samples.iter().all(|&s| s >= STUB_BLACK_LEVEL_NATIVE));
    }

    #[test]
    fn set_controls_reflected_in_metadata() {
        let mut camera = started_stub(false);
        let mut controls = ControlMap::new();
        controls.insert(keys::ANALOGUE_GAIN.into(), json!(4.5));
        camera.set_controls(&controls).unwrap();
        camera.start_capture().unwrap();
        let output = camera.await_and_reissue().unwrap();
        assert_eq!(output.metadata[keys::ANALOGUE_GAIN], json!(4.5));
    }

    #[test]
    fn zero_size_configuration_is_fatal() {
        let mut camera = StubCamera::new();
        let config = CameraConfig {
            resolution: Resolution::new(0, 0),
            ..Default::default()
        };
        assert!(camera.configure(&config).is_err());
    }
}
