//! Camera frames from an external capture command
//!
//! The command is run once per frame and must write a single encoded image
//! (PNG by default) to stdout.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use image::DynamicImage;
use tokio::process::Command;

use super::FrameSource;
use crate::config::CameraConfig;
use crate::{Error, Result};

/// Grabs frames by running a capture command
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandCamera {
    /// Resolve the configured capture command
    ///
    /// # Errors
    ///
    /// Returns a permission error if the command cannot be found
    pub fn open(config: &CameraConfig) -> Result<Self> {
        let program = which::which(&config.command).map_err(|e| {
            Error::Permission(format!("camera command {} unavailable: {e}", config.command))
        })?;

        tracing::debug!(program = %program.display(), "camera opened");

        Ok(Self {
            program,
            args: config.args.clone(),
        })
    }
}

#[async_trait]
impl FrameSource for CommandCamera {
    async fn grab(&mut self) -> Result<DynamicImage> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::Video(format!(
                "capture command exited with {}",
                output.status
            )));
        }

        image::load_from_memory(&output.stdout).map_err(|e| Error::Video(e.to_string()))
    }
}
