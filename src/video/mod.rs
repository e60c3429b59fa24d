//! Periodic camera frames for live sessions
//!
//! While camera mode is on, one frame per second is grabbed, scaled down,
//! JPEG-encoded and sent as inline media. Frames are fire-and-forget: a frame
//! that fails anywhere along the way is skipped.

mod camera;

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tokio::task::JoinHandle;

pub use camera::CommandCamera;

use crate::live::{MediaChunk, MediaSender};
use crate::{Error, Result};

/// Time between sampled frames
pub const FRAME_INTERVAL: Duration = Duration::from_secs(1);

/// JPEG quality of sent frames (0-100)
pub const JPEG_QUALITY: u8 = 70;

/// Frames wider than this are scaled down, keeping the aspect ratio
pub const MAX_FRAME_WIDTH: u32 = 640;

/// A camera that can produce the current frame on demand
#[async_trait]
pub trait FrameSource: Send {
    /// Capture the current frame
    ///
    /// # Errors
    ///
    /// Returns error if no frame could be captured
    async fn grab(&mut self) -> Result<DynamicImage>;
}

/// Scale and JPEG-encode a frame, returning base64
///
/// # Errors
///
/// Returns error if the frame is empty or cannot be encoded
pub fn encode_frame(frame: &DynamicImage) -> Result<String> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(Error::Video("empty frame".to_string()));
    }

    let scaled;
    let frame = if frame.width() > MAX_FRAME_WIDTH {
        let height = scaled_height(frame.width(), frame.height());
        scaled = frame.resize_exact(MAX_FRAME_WIDTH, height, FilterType::Triangle);
        &scaled
    } else {
        frame
    };

    let rgb = frame.to_rgb8();
    let mut jpeg = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| Error::Video(e.to_string()))?;

    Ok(STANDARD.encode(jpeg.into_inner()))
}

fn scaled_height(width: u32, height: u32) -> u32 {
    let scaled = u64::from(height) * u64::from(MAX_FRAME_WIDTH) / u64::from(width);
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

/// Background task sending one frame per [`FRAME_INTERVAL`]
#[derive(Debug)]
pub struct FrameSampler {
    task: JoinHandle<()>,
}

impl FrameSampler {
    /// Start sampling `source` into `sender`
    #[must_use]
    pub fn spawn(source: Box<dyn FrameSource>, sender: MediaSender) -> Self {
        Self::spawn_with_interval(source, sender, FRAME_INTERVAL)
    }

    /// Start sampling with a custom period
    #[must_use]
    pub fn spawn_with_interval(
        mut source: Box<dyn FrameSource>,
        sender: MediaSender,
        period: Duration,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                if !sender.is_open() {
                    break;
                }

                let frame = match source.grab().await {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping camera frame");
                        continue;
                    }
                };

                // Encoding is CPU-bound
                let encoded = tokio::task::spawn_blocking(move || encode_frame(&frame)).await;
                match encoded {
                    Ok(Ok(data)) => {
                        if !sender.send_media(MediaChunk::jpeg(data)) {
                            tracing::debug!("camera frame dropped");
                        }
                    }
                    Ok(Err(e)) => tracing::warn!(error = %e, "failed to encode camera frame"),
                    Err(e) => tracing::warn!(error = %e, "frame encoder task failed"),
                }
            }

            tracing::debug!("frame sampler finished");
        });

        tracing::debug!(period_ms = period.as_millis(), "frame sampler started");
        Self { task }
    }

    /// Stop sampling; a frame in flight is discarded
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.task.abort();
    }
}
