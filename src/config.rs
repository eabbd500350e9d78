//! Server configuration

use std::fmt;
use std::str::FromStr;

use crate::camera::format::Resolution;

/// Default JPEG quality for the encode stage
pub const DEFAULT_JPEG_QUALITY: u8 = 95;
/// Default command (API) port; the publish port is always one above it
pub const DEFAULT_API_PORT: u16 = 8089;

/// Output mode selected at startup
///
/// `Rgb` publishes the ISP-processed main stream directly. The raw modes run
/// the sensor-native Bayer buffer through the raw conversion stage first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Plain RGB capture, no raw conversion
    #[default]
    Rgb,
    /// Demosaiced raw, linear 8-bit output
    RawLinear,
    /// Demosaiced raw, gamma-encoded (1/2.2) 8-bit output
    RawGamma,
}

impl OutputMode {
    /// Whether this mode needs the sensor-native raw stream
    pub fn needs_raw(&self) -> bool {
        matches!(self, OutputMode::RawLinear | OutputMode::RawGamma)
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputMode::Rgb => "rgb",
            OutputMode::RawLinear => "raw-linear",
            OutputMode::RawGamma => "raw-gamma",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(OutputMode::Rgb),
            "raw-linear" | "raw_linear" => Ok(OutputMode::RawLinear),
            "raw-gamma" | "raw_gamma" => Ok(OutputMode::RawGamma),
            _ => Err(format!("Unknown output mode: {}", s)),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address for both the command and publish sockets
    pub bind_address: String,
    /// Command port; the publish socket binds to `api_port + 1`
    pub api_port: u16,
    /// Requested main stream size
    pub resolution: Resolution,
    /// Output mode (plain RGB or raw conversion variant)
    pub mode: OutputMode,
    /// Maximum frame rate (0 = device maximum)
    pub max_fps: u32,
    /// Fixed exposure time in microseconds (0 = auto exposure)
    pub exposure_time: u32,
    /// Fixed analogue gain, used together with `exposure_time`
    pub analogue_gain: f64,
    /// Flip the image horizontally
    pub hflip: bool,
    /// Flip the image vertically
    pub vflip: bool,
    /// JPEG quality for the encode stage (1-100)
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            api_port: DEFAULT_API_PORT,
            resolution: Resolution::new(1280, 720),
            mode: OutputMode::Rgb,
            max_fps: 0,
            exposure_time: 0,
            analogue_gain: 0.0,
            hflip: false,
            vflip: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ServerConfig {
    /// Publish port (always one above the command port)
    pub fn pub_port(&self) -> u16 {
        self.api_port + 1
    }

    /// Whether auto exposure is enabled at startup
    ///
    /// A fixed exposure time on the command line disables it.
    pub fn ae_enabled(&self) -> bool {
        self.exposure_time == 0
    }

    /// Set the listen address
    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Set the command port
    pub fn with_api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }

    /// Set the main stream size
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Resolution::new(width, height);
        self
    }

    /// Set the output mode
    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the maximum frame rate
    pub fn with_max_fps(mut self, fps: u32) -> Self {
        self.max_fps = fps;
        self
    }

    /// Set a fixed exposure (disables auto exposure at startup)
    pub fn with_exposure(mut self, exposure_time: u32, analogue_gain: f64) -> Self {
        self.exposure_time = exposure_time;
        self.analogue_gain = analogue_gain;
        self
    }

    /// Set the JPEG quality
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }
}
