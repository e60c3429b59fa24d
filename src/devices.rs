//! Access to the local microphone, speaker and camera

use async_trait::async_trait;

use crate::audio::{CpalMicrophone, CpalOutput, Microphone, OutputSink, PlaybackNotifier};
use crate::config::CameraConfig;
use crate::video::{CommandCamera, FrameSource};
use crate::Result;

/// Opens the devices a live session needs
///
/// Device handles are not `Send` on every platform, so sessions using them
/// stay on one task.
#[async_trait(?Send)]
pub trait MediaDevices {
    /// Acquire the microphone
    ///
    /// # Errors
    ///
    /// Returns a permission error if the microphone is unavailable
    async fn open_microphone(&self) -> Result<Box<dyn Microphone>>;

    /// Open the speaker, reporting finished buffers to `notifier`
    ///
    /// # Errors
    ///
    /// Returns error if no output device can be opened
    fn open_speaker(&self, notifier: PlaybackNotifier) -> Result<Box<dyn OutputSink>>;

    /// Acquire the camera
    ///
    /// # Errors
    ///
    /// Returns a permission error if the camera is unavailable
    async fn open_camera(&self) -> Result<Box<dyn FrameSource>>;
}

/// The default devices of this machine
#[derive(Debug, Clone, Default)]
pub struct SystemDevices {
    camera: CameraConfig,
}

impl SystemDevices {
    /// Use the default audio devices and the given camera command
    #[must_use]
    pub const fn new(camera: CameraConfig) -> Self {
        Self { camera }
    }
}

#[async_trait(?Send)]
impl MediaDevices for SystemDevices {
    async fn open_microphone(&self) -> Result<Box<dyn Microphone>> {
        Ok(Box::new(CpalMicrophone::new()?))
    }

    fn open_speaker(&self, notifier: PlaybackNotifier) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(CpalOutput::new(notifier)?))
    }

    async fn open_camera(&self) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(CommandCamera::open(&self.camera)?))
    }
}
