//! Frame data structures

use std::collections::BTreeMap;

use bytes::Bytes;

use super::format::{PixelFormat, Resolution};
use crate::control::ControlMap;

/// Role of the primary ISP-processed stream
pub const ROLE_MAIN: &str = "main";
/// Role of the optional sensor-native raw stream
pub const ROLE_RAW: &str = "raw";

/// An ownership-exclusive pixel buffer
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Bytes per line
    pub stride: u32,
    pub format: PixelFormat,
}

impl ImageBuffer {
    /// Create a tightly-packed buffer (stride = width * bytes per pixel)
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width * format.bytes_per_pixel() as u32;
        Self {
            data,
            width,
            height,
            stride,
            format,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Interpret a 16-bit-per-sample buffer as native-endian words
    ///
    /// Only meaningful for the unpacked raw formats.
    pub fn as_u16(&self) -> Vec<u16> {
        self.data
            .chunks_exact(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
            .collect()
    }
}

/// One capture cycle's payload
///
/// Created by the pipeline driver, filled by the capture stage, mutated in
/// place by every following stage and consumed by the publish stage. The
/// metadata and image buffers always originate from the same capture call.
#[derive(Debug)]
pub struct Frame {
    /// Monotonically increasing capture index, starting at 0
    pub sequence: u64,
    /// Image buffers keyed by role (`"main"`, optionally `"raw"`)
    pub images: BTreeMap<String, ImageBuffer>,
    /// Per-capture device metadata
    pub metadata: ControlMap,
    /// Control deltas merged in before this frame was captured
    pub controls: ControlMap,
    /// Encoded image, set by the encode stage
    pub jpeg: Option<Bytes>,
}

impl Frame {
    /// Create an empty frame carrying this cycle's merged controls
    pub fn new(sequence: u64, controls: ControlMap) -> Self {
        Self {
            sequence,
            images: BTreeMap::new(),
            metadata: ControlMap::new(),
            controls,
            jpeg: None,
        }
    }

    /// The main image buffer, if the capture stage has run
    pub fn main(&self) -> Option<&ImageBuffer> {
        self.images.get(ROLE_MAIN)
    }

    /// Whether this cycle carried the terminal `Over` control
    pub fn is_over(&self) -> bool {
        self.controls
            .get(crate::control::keys::OVER)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn over_flag_read_from_controls() {
        let mut controls = ControlMap::new();
        assert!(!Frame::new(0, controls.clone()).is_over());
        controls.insert(crate::control::keys::OVER.into(), json!(true));
        assert!(Frame::new(1, controls).is_over());
    }

    #[test]
    fn packed_stride() {
        let buffer = ImageBuffer::new(vec![0; 2 * 2 * 3], 2, 2, PixelFormat::Rgb24);
        assert_eq!(buffer.stride, 6);
        let raw = ImageBuffer::new(vec![0; 2 * 2 * 2], 2, 2, PixelFormat::SBggr12);
        assert_eq!(raw.stride, 4);
        assert_eq!(raw.as_u16().len(), 4);
    }
}
