//! Pixel format and resolution definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bayer colour filter array layout, named by the top-left 2x2 quad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CfaPattern {
    Bggr,
    Grbg,
    Gbrg,
    Rggb,
}

/// Colour channel of a single photosite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfaChannel {
    Red,
    Green,
    Blue,
}

impl CfaPattern {
    /// Channel of the photosite at pixel coordinates `(x, y)`
    pub fn channel_at(&self, x: u32, y: u32) -> CfaChannel {
        let (even_x, even_y) = (x % 2 == 0, y % 2 == 0);
        match self {
            CfaPattern::Bggr => match (even_x, even_y) {
                (true, true) => CfaChannel::Blue,
                (false, false) => CfaChannel::Red,
                _ => CfaChannel::Green,
            },
            CfaPattern::Rggb => match (even_x, even_y) {
                (true, true) => CfaChannel::Red,
                (false, false) => CfaChannel::Blue,
                _ => CfaChannel::Green,
            },
            CfaPattern::Grbg => match (even_x, even_y) {
                (false, true) => CfaChannel::Red,
                (true, false) => CfaChannel::Blue,
                _ => CfaChannel::Green,
            },
            CfaPattern::Gbrg => match (even_x, even_y) {
                (false, true) => CfaChannel::Blue,
                (true, false) => CfaChannel::Red,
                _ => CfaChannel::Green,
            },
        }
    }
}

/// Supported pixel formats
///
/// The raw formats are the unpacked sensor-native Bayer layouts: 16 bits per
/// sample in memory with the active bits in the low part of the word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// RGB, 3 bytes per pixel
    Rgb24,
    /// 10-bit Bayer BGGR, unpacked to 16-bit words
    SBggr10,
    /// 12-bit Bayer BGGR, unpacked to 16-bit words
    SBggr12,
    /// 16-bit Bayer BGGR
    SBggr16,
    /// 16-bit Bayer GRBG
    SGrbg16,
    /// 16-bit Bayer GBRG
    SGbrg16,
    /// 16-bit Bayer RGGB
    SRggb16,
}

impl PixelFormat {
    /// Whether this is a sensor-native Bayer format
    pub fn is_raw(&self) -> bool {
        !matches!(self, PixelFormat::Rgb24)
    }

    /// Bytes per pixel as stored in memory
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            _ => 2,
        }
    }

    /// Scale factor that maps the native sample range onto 16 bits
    ///
    /// 10- and 12-bit sensors leave the top bits unused; full 16-bit formats
    /// need no scaling.
    pub fn raw_scale(&self) -> Option<f32> {
        match self {
            PixelFormat::Rgb24 => None,
            PixelFormat::SBggr10 => Some(65535.0 / 1023.0),
            PixelFormat::SBggr12 => Some(65535.0 / 4095.0),
            PixelFormat::SBggr16
            | PixelFormat::SGrbg16
            | PixelFormat::SGbrg16
            | PixelFormat::SRggb16 => Some(1.0),
        }
    }

    /// Colour filter array layout for raw formats
    pub fn cfa(&self) -> Option<CfaPattern> {
        match self {
            PixelFormat::Rgb24 => None,
            PixelFormat::SBggr10 | PixelFormat::SBggr12 | PixelFormat::SBggr16 => {
                Some(CfaPattern::Bggr)
            }
            PixelFormat::SGrbg16 => Some(CfaPattern::Grbg),
            PixelFormat::SGbrg16 => Some(CfaPattern::Gbrg),
            PixelFormat::SRggb16 => Some(CfaPattern::Rggb),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Rgb24 => "RGB888",
            PixelFormat::SBggr10 => "SBGGR10",
            PixelFormat::SBggr12 => "SBGGR12",
            PixelFormat::SBggr16 => "SBGGR16",
            PixelFormat::SGrbg16 => "SGRBG16",
            PixelFormat::SGbrg16 => "SGBRG16",
            PixelFormat::SRggb16 => "SRGGB16",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "RGB888" | "RGB24" => Ok(PixelFormat::Rgb24),
            "SBGGR10" => Ok(PixelFormat::SBggr10),
            "SBGGR12" => Ok(PixelFormat::SBggr12),
            "SBGGR16" => Ok(PixelFormat::SBggr16),
            "SGRBG16" => Ok(PixelFormat::SGrbg16),
            "SGBRG16" => Ok(PixelFormat::SGbrg16),
            "SRGGB16" => Ok(PixelFormat::SRggb16),
            _ => Err(format!("Unknown pixel format: {}", s)),
        }
    }
}

/// Resolution (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}
