//! Client-side access to a running server
//!
//! [`CommandClient`] drives the command socket; [`FrameSubscriber`] consumes
//! the publish stream.

pub mod subscriber;

pub use subscriber::{FrameSubscriber, PauseHandle, SubscribedFrame};

use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::command::{Command, ExposureLock};
use crate::error::Result;
use crate::protocol;

/// Fire-and-forget sender for the command socket
///
/// The server never replies on this socket; each call pushes one command and
/// returns once it is written.
pub struct CommandClient {
    stream: TcpStream,
}

impl CommandClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, command: Command) -> Result<()> {
        debug!("sending command {}", command.tag());
        protocol::write_command(&mut self.stream, command.tag(), &command.body()).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    pub async fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
        self.send(Command::SetSize { width, height }).await
    }

    pub async fn auto_exposure(&mut self, enable: bool) -> Result<()> {
        self.send(Command::AutoExposure(enable)).await
    }

    pub async fn analogue_gain_increase(&mut self, lock: ExposureLock) -> Result<()> {
        self.send(Command::AnalogueGainIncrease(lock)).await
    }

    pub async fn analogue_gain_decrease(&mut self, lock: ExposureLock) -> Result<()> {
        self.send(Command::AnalogueGainDecrease(lock)).await
    }

    pub async fn exposure_time_increase(&mut self, lock: ExposureLock) -> Result<()> {
        self.send(Command::ExposureTimeIncrease(lock)).await
    }

    pub async fn exposure_time_decrease(&mut self, lock: ExposureLock) -> Result<()> {
        self.send(Command::ExposureTimeDecrease(lock)).await
    }

    pub async fn auto_focus(&mut self, enable: bool) -> Result<()> {
        self.send(Command::AutoFocus(enable)).await
    }

    pub async fn run_autofocus(&mut self) -> Result<()> {
        self.send(Command::RunAutofocus).await
    }

    pub async fn lens_position_increase(&mut self) -> Result<()> {
        self.send(Command::LensPositionIncrease).await
    }

    pub async fn lens_position_decrease(&mut self) -> Result<()> {
        self.send(Command::LensPositionDecrease).await
    }

    pub async fn fit_scaled(&mut self) -> Result<()> {
        self.send(Command::FitScaled).await
    }

    pub async fn fit_cropped(&mut self) -> Result<()> {
        self.send(Command::FitCropped).await
    }
}
