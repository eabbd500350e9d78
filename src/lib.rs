//! rcam: live camera streaming server
//!
//! Captures frames from a camera device, runs them through a staged
//! processing pipeline (focus, exposure, white balance, raw conversion,
//! crop/scale fit, JPEG encode) and publishes metadata/image pairs over TCP,
//! steered at runtime by a small command protocol on a second socket.

pub mod camera;
pub mod client;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod publish;
pub mod recorder;
pub mod server;

pub use client::{CommandClient, FrameSubscriber, SubscribedFrame};
pub use command::{Command, CommandRouter, ExposureLock};
pub use config::{OutputMode, ServerConfig};
pub use error::{RcamError, Result};
pub use server::{BoundServer, Server};
