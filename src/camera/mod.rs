//! Capture device abstraction, frame types and the stub sensor

pub mod device;
pub mod format;
pub mod frame;
pub mod stub;

pub use device::{CameraConfig, CameraDevice, CameraProperties, CaptureOutput, ControlRange};
pub use format::{CfaChannel, CfaPattern, PixelFormat, Resolution};
pub use frame::{Frame, ImageBuffer, ROLE_MAIN, ROLE_RAW};
pub use stub::StubCamera;
