//! Microphone capture into fixed-size PCM blocks

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use super::pcm::encode_pcm16_base64;
use crate::live::{MediaChunk, MediaSender};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per outbound block (256ms at 16kHz)
pub const BLOCK_SIZE: usize = 4096;

/// Callback invoked with each complete capture block, in capture order
pub type BlockHandler = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// A microphone that can forward capture blocks once started
pub trait Microphone {
    /// Begin forwarding fixed-size blocks to `on_block`
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    fn start(&mut self, on_block: BlockHandler) -> Result<()>;

    /// Stop capturing; pending partial blocks are discarded
    fn stop(&mut self);
}

/// Splits an arbitrary stream of samples into fixed-size blocks
#[derive(Debug)]
pub struct BlockAssembler {
    block: Vec<f32>,
    size: usize,
}

impl BlockAssembler {
    /// Create an assembler emitting blocks of `size` samples
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            block: Vec::with_capacity(size),
            size,
        }
    }

    /// Feed samples, calling `emit` for every block completed
    pub fn push(&mut self, mut samples: &[f32], mut emit: impl FnMut(&[f32])) {
        while !samples.is_empty() {
            let take = (self.size - self.block.len()).min(samples.len());
            self.block.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.block.len() == self.size {
                emit(&self.block);
                self.block.clear();
            }
        }
    }

    /// Discard any partially filled block
    pub fn reset(&mut self) {
        self.block.clear();
    }

    /// Samples waiting for the current block to fill
    #[must_use]
    pub fn pending(&self) -> usize {
        self.block.len()
    }
}

/// Turns capture blocks into outbound media chunks
///
/// Blocks are dropped rather than queued when the session cannot take them.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    sender: MediaSender,
    muted: Arc<AtomicBool>,
}

impl CaptureSink {
    /// Create a sink forwarding to `sender` unless `muted` is set
    #[must_use]
    pub const fn new(sender: MediaSender, muted: Arc<AtomicBool>) -> Self {
        Self { sender, muted }
    }

    /// Encode and forward one block
    ///
    /// Returns whether the block was handed to the session.
    pub fn accept(&self, block: &[f32]) -> bool {
        if self.muted.load(Ordering::Relaxed) {
            return false;
        }

        let chunk = MediaChunk::pcm16(encode_pcm16_base64(block), SAMPLE_RATE);
        self.sender.send_media(chunk)
    }

    /// Wrap the sink as a block handler for a [`Microphone`]
    #[must_use]
    pub fn into_handler(self) -> BlockHandler {
        Box::new(move |block| {
            self.accept(block);
        })
    }
}

/// Captures audio from the default input device
pub struct CpalMicrophone {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl CpalMicrophone {
    /// Open the default input device at 16kHz
    ///
    /// # Errors
    ///
    /// Returns a permission error if no usable input device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Permission("no input device available".to_string()))?;

        let supports_rate = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        };

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Permission(e.to_string()))?
            .filter(supports_rate)
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .ok_or_else(|| Error::Audio("no 16kHz input config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }
}

impl Microphone for CpalMicrophone {
    fn start(&mut self, mut on_block: BlockHandler) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels.max(1));
        let mut assembler = BlockAssembler::new(BLOCK_SIZE);
        let mut mono = Vec::new();

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if channels == 1 {
                        assembler.push(data, &mut on_block);
                    } else {
                        mono.clear();
                        #[allow(clippy::cast_precision_loss)]
                        mono.extend(
                            data.chunks(channels)
                                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                        );
                        assembler.push(&mono, &mut on_block);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Permission(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::ClientMessage;

    #[test]
    fn test_assembler_emits_fixed_blocks() {
        let mut assembler = BlockAssembler::new(4);
        let mut blocks = Vec::new();

        assembler.push(&[1.0, 2.0, 3.0], |b| blocks.push(b.to_vec()));
        assert!(blocks.is_empty());
        assert_eq!(assembler.pending(), 3);

        assembler.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |b| blocks.push(b.to_vec()));
        assert_eq!(
            blocks,
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]
        );
        assert_eq!(assembler.pending(), 1);

        assembler.reset();
        assert_eq!(assembler.pending(), 0);
    }

    #[tokio::test]
    async fn test_capture_sink_encodes_block() {
        let (sender, mut rx) = MediaSender::channel(4);
        let sink = CaptureSink::new(sender, Arc::new(AtomicBool::new(false)));

        assert!(sink.accept(&[0.5, -0.5]));

        let Some(ClientMessage::RealtimeInput(input)) = rx.recv().await else {
            panic!("expected realtime input");
        };
        assert_eq!(input.media_chunks.len(), 1);
        assert_eq!(input.media_chunks[0].mime_type, "audio/pcm;rate=16000");
        // 16384 and -16384 little-endian
        assert_eq!(input.media_chunks[0].data, "AEAAwA==");
    }

    #[tokio::test]
    async fn test_capture_sink_skips_when_muted() {
        let (sender, mut rx) = MediaSender::channel(4);
        let muted = Arc::new(AtomicBool::new(true));
        let sink = CaptureSink::new(sender, Arc::clone(&muted));

        assert!(!sink.accept(&[0.1; 8]));
        assert!(rx.try_recv().is_err());

        muted.store(false, Ordering::Relaxed);
        assert!(sink.accept(&[0.1; 8]));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_capture_sink_drops_when_queue_full() {
        let (sender, mut rx) = MediaSender::channel(2);
        let sink = CaptureSink::new(sender.clone(), Arc::new(AtomicBool::new(false)));

        assert!(sink.accept(&[0.1]));
        assert!(sink.accept(&[0.2]));
        assert!(!sink.accept(&[0.3]));
        assert_eq!(sender.dropped(), 1);

        // Order of what was kept matches capture order
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let data = |m: ClientMessage| match m {
            ClientMessage::RealtimeInput(i) => i.media_chunks[0].data.clone(),
            _ => panic!("unexpected message"),
        };
        assert_eq!(data(first), encode_pcm16_base64(&[0.1]));
        assert_eq!(data(second), encode_pcm16_base64(&[0.2]));
    }
}
