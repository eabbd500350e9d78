//! Inbound command protocol
//!
//! Each command is a tag plus an opaque body. The four directional
//! gain/exposure commands carry an exposure-lock body; `set_size` carries
//! `"<width>x<height>"`; everything else has an empty body.

pub mod router;

pub use router::{CommandRouter, ControlRanges, ControlState};

use crate::error::{RcamError, Result};

/// Command tags as they appear on the wire
pub mod tags {
    pub const SHUTDOWN: &str = "shutdown";
    pub const SET_SIZE: &str = "set_size";
    pub const AE_ENABLE: &str = "ae_enable";
    pub const AE_DISABLE: &str = "ae_disable";
    pub const ANALOGUE_GAIN_INCREASE: &str = "analogue_gain_increase";
    pub const ANALOGUE_GAIN_DECREASE: &str = "analogue_gain_decrease";
    pub const EXPOSURE_TIME_INCREASE: &str = "exposure_time_increase";
    pub const EXPOSURE_TIME_DECREASE: &str = "exposure_time_decrease";
    pub const AF_ENABLE: &str = "af_enable";
    pub const AF_DISABLE: &str = "af_disable";
    pub const AF_RUN: &str = "af_run";
    pub const LENS_POSITION_INCREASE: &str = "lens_position_increase";
    pub const LENS_POSITION_DECREASE: &str = "lens_position_decrease";
    pub const FIT_SCALED: &str = "fit_scaled";
    pub const FIT_CROPPED: &str = "fit_cropped";

    pub const EXPOSURE_LOCKED: &str = "exposure_locked";
    pub const EXPOSURE_UNLOCKED: &str = "exposure_unlocked";
}

/// Whether a gain/exposure adjustment holds the gain*exposure product constant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureLock {
    Locked,
    Unlocked,
}

impl ExposureLock {
    pub fn is_locked(&self) -> bool {
        matches!(self, ExposureLock::Locked)
    }

    fn parse(body: &[u8]) -> Result<Self> {
        match body {
            b if b == tags::EXPOSURE_LOCKED.as_bytes() => Ok(ExposureLock::Locked),
            b if b == tags::EXPOSURE_UNLOCKED.as_bytes() => Ok(ExposureLock::Unlocked),
            other => Err(RcamError::Protocol(format!(
                "bad exposure lock body: {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    fn body(&self) -> &'static str {
        match self {
            ExposureLock::Locked => tags::EXPOSURE_LOCKED,
            ExposureLock::Unlocked => tags::EXPOSURE_UNLOCKED,
        }
    }
}

/// Closed set of inbound commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Shutdown,
    SetSize { width: u32, height: u32 },
    AutoExposure(bool),
    AnalogueGainIncrease(ExposureLock),
    AnalogueGainDecrease(ExposureLock),
    ExposureTimeIncrease(ExposureLock),
    ExposureTimeDecrease(ExposureLock),
    AutoFocus(bool),
    RunAutofocus,
    LensPositionIncrease,
    LensPositionDecrease,
    FitScaled,
    FitCropped,
}

impl Command {
    /// Wire tag for this command
    pub fn tag(&self) -> &'static str {
        match self {
            Command::Shutdown => tags::SHUTDOWN,
            Command::SetSize { .. } => tags::SET_SIZE,
            Command::AutoExposure(true) => tags::AE_ENABLE,
            Command::AutoExposure(false) => tags::AE_DISABLE,
            Command::AnalogueGainIncrease(_) => tags::ANALOGUE_GAIN_INCREASE,
            Command::AnalogueGainDecrease(_) => tags::ANALOGUE_GAIN_DECREASE,
            Command::ExposureTimeIncrease(_) => tags::EXPOSURE_TIME_INCREASE,
            Command::ExposureTimeDecrease(_) => tags::EXPOSURE_TIME_DECREASE,
            Command::AutoFocus(true) => tags::AF_ENABLE,
            Command::AutoFocus(false) => tags::AF_DISABLE,
            Command::RunAutofocus => tags::AF_RUN,
            Command::LensPositionIncrease => tags::LENS_POSITION_INCREASE,
            Command::LensPositionDecrease => tags::LENS_POSITION_DECREASE,
            Command::FitScaled => tags::FIT_SCALED,
            Command::FitCropped => tags::FIT_CROPPED,
        }
    }

    /// Wire body for this command
    pub fn body(&self) -> Vec<u8> {
        match self {
            Command::SetSize { width, height } => format!("{}x{}", width, height).into_bytes(),
            Command::AnalogueGainIncrease(lock)
            | Command::AnalogueGainDecrease(lock)
            | Command::ExposureTimeIncrease(lock)
            | Command::ExposureTimeDecrease(lock) => lock.body().as_bytes().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Decode a command from its wire tag and body
    ///
    /// Unknown tags and malformed bodies indicate a protocol mismatch between
    /// client and server and are surfaced as errors, not ignored.
    pub fn parse(tag: &[u8], body: &[u8]) -> Result<Self> {
        let tag = std::str::from_utf8(tag)
            .map_err(|_| RcamError::Protocol("non-UTF-8 command tag".into()))?;

        match tag {
            tags::SHUTDOWN => Ok(Command::Shutdown),
            tags::SET_SIZE => parse_size(body),
            tags::AE_ENABLE => Ok(Command::AutoExposure(true)),
            tags::AE_DISABLE => Ok(Command::AutoExposure(false)),
            tags::ANALOGUE_GAIN_INCREASE => {
                Ok(Command::AnalogueGainIncrease(ExposureLock::parse(body)?))
            }
            tags::ANALOGUE_GAIN_DECREASE => {
                Ok(Command::AnalogueGainDecrease(ExposureLock::parse(body)?))
            }
            tags::EXPOSURE_TIME_INCREASE => {
                Ok(Command::ExposureTimeIncrease(ExposureLock::parse(body)?))
            }
            tags::EXPOSURE_TIME_DECREASE => {
                Ok(Command::ExposureTimeDecrease(ExposureLock::parse(body)?))
            }
            tags::AF_ENABLE => Ok(Command::AutoFocus(true)),
            tags::AF_DISABLE => Ok(Command::AutoFocus(false)),
            tags::AF_RUN => Ok(Command::RunAutofocus),
            tags::LENS_POSITION_INCREASE => Ok(Command::LensPositionIncrease),
            tags::LENS_POSITION_DECREASE => Ok(Command::LensPositionDecrease),
            tags::FIT_SCALED => Ok(Command::FitScaled),
            tags::FIT_CROPPED => Ok(Command::FitCropped),
            other => Err(RcamError::Protocol(format!("unknown command: {}", other))),
        }
    }
}

fn parse_size(body: &[u8]) -> Result<Command> {
    let body = std::str::from_utf8(body)
        .map_err(|_| RcamError::Protocol("non-UTF-8 set_size body".into()))?;
    let (width, height) = body
        .split_once('x')
        .ok_or_else(|| RcamError::Protocol(format!("bad set_size body: {}", body)))?;
    let width = width
        .parse::<u32>()
        .map_err(|_| RcamError::Protocol(format!("bad set_size width: {}", body)))?;
    let height = height
        .parse::<u32>()
        .map_err(|_| RcamError::Protocol(format!("bad set_size height: {}", body)))?;
    Ok(Command::SetSize { width, height })
}
