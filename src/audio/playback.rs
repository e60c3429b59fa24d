//! Gapless scheduling of streamed output audio
//!
//! Incoming chunks are decoded into [`AudioBuffer`]s and handed to an
//! [`OutputSink`] at `max(now, next_start_time)`, so consecutive chunks play
//! back-to-back in arrival order. Every scheduled buffer is tracked until the
//! sink reports its natural end or the scheduler is interrupted.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::pcm::decode_pcm16_base64;
use crate::{Error, Result};

/// Sample rate of audio sent by the backend
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Identifier of one scheduled buffer
pub type HandleId = u64;

/// Decoded audio ready for playback, one plane per channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Per-channel samples, all the same length
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Create a buffer from per-channel planes
    #[must_use]
    pub const fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Decode a base64 16-bit PCM chunk
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not valid base64 PCM
    pub fn from_base64_pcm16(data: &str, sample_rate: u32, channels: u16) -> Result<Self> {
        Ok(Self::new(sample_rate, decode_pcm16_base64(data, channels)?))
    }

    /// Number of frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// One buffer handed to the output sink
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackHandle {
    /// Handle identifier, unique per scheduler
    pub id: HandleId,
    /// Start time on the output clock, in seconds
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl PlaybackHandle {
    /// Time on the output clock at which this buffer ends
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Reports that a scheduled buffer played to its natural end
#[derive(Clone)]
pub struct PlaybackNotifier(Arc<dyn Fn(HandleId) + Send + Sync>);

impl PlaybackNotifier {
    /// Wrap a callback
    pub fn new(f: impl Fn(HandleId) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// A notifier that discards every notification
    #[must_use]
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Notify that `id` finished
    pub fn finished(&self, id: HandleId) {
        (self.0)(id);
    }
}

impl std::fmt::Debug for PlaybackNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PlaybackNotifier")
    }
}

/// An output device with a monotonic clock that can play buffers at set times
///
/// Implementations call their [`PlaybackNotifier`] when a buffer ends
/// naturally, but never for buffers removed with [`OutputSink::stop`].
pub trait OutputSink {
    /// Current output clock time in seconds
    fn current_time(&self) -> f64;

    /// Play `buffer` starting at `start` seconds on the output clock
    ///
    /// # Errors
    ///
    /// Returns error if the buffer cannot be played on this device
    fn play_at(&mut self, id: HandleId, buffer: AudioBuffer, start: f64) -> Result<()>;

    /// Halt a scheduled buffer immediately
    fn stop(&mut self, id: HandleId);
}

/// Schedules output buffers back-to-back and tracks them until they end
pub struct PlaybackScheduler {
    sink: Box<dyn OutputSink>,
    next_start_time: f64,
    active: BTreeMap<HandleId, PlaybackHandle>,
    next_id: HandleId,
}

impl PlaybackScheduler {
    /// Create a scheduler on top of an output sink
    #[must_use]
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink,
            next_start_time: 0.0,
            active: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Decode a base64 PCM chunk and schedule it after everything queued
    ///
    /// # Errors
    ///
    /// Returns error if the chunk cannot be decoded or played
    pub fn enqueue_base64(
        &mut self,
        data: &str,
        sample_rate: u32,
        channels: u16,
    ) -> Result<PlaybackHandle> {
        let buffer = AudioBuffer::from_base64_pcm16(data, sample_rate, channels)?;
        self.enqueue(buffer)
    }

    /// Schedule a decoded buffer after everything queued
    ///
    /// # Errors
    ///
    /// Returns error if the buffer is empty or the sink rejects it
    pub fn enqueue(&mut self, buffer: AudioBuffer) -> Result<PlaybackHandle> {
        if buffer.frames() == 0 {
            return Err(Error::Audio("empty audio chunk".to_string()));
        }

        let start = self.sink.current_time().max(self.next_start_time);
        let duration = buffer.duration();
        let id = self.next_id;

        self.sink.play_at(id, buffer, start)?;

        self.next_id += 1;
        self.next_start_time = start + duration;

        let handle = PlaybackHandle {
            id,
            start,
            duration,
        };
        self.active.insert(id, handle);

        tracing::trace!(id, start, duration, "scheduled output buffer");
        Ok(handle)
    }

    /// Record that a buffer finished naturally
    ///
    /// Returns `true` if this emptied the set of playing buffers.
    pub fn on_ended(&mut self, id: HandleId) -> bool {
        self.active.remove(&id).is_some() && self.active.is_empty()
    }

    /// Halt every tracked buffer and reset the schedule
    ///
    /// Returns the number of buffers stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();

        for id in std::mem::take(&mut self.active).into_keys() {
            self.sink.stop(id);
        }
        self.next_start_time = 0.0;

        if stopped > 0 {
            tracing::debug!(stopped, "playback interrupted");
        }
        stopped
    }

    /// Whether any buffer is scheduled or playing
    #[must_use]
    pub fn is_playing(&self) -> bool {
        !self.active.is_empty()
    }

    /// Start time for the next buffer if the clock is behind it
    #[must_use]
    pub const fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Buffers scheduled but not yet finished, in scheduling order
    pub fn active_handles(&self) -> impl Iterator<Item = &PlaybackHandle> {
        self.active.values()
    }

    /// Current output clock time in seconds
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.sink.current_time()
    }
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("next_start_time", &self.next_start_time)
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}
