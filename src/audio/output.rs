//! Audio output to speakers on a sample-accurate timeline

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream};

use super::playback::{AudioBuffer, HandleId, OUTPUT_SAMPLE_RATE, OutputSink, PlaybackNotifier};
use crate::{Error, Result};

/// A buffer placed on the output timeline
#[derive(Debug)]
struct Voice {
    id: HandleId,
    start_frame: u64,
    planes: Vec<Vec<f32>>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.planes.first().map_or(0, Vec::len) as u64
    }
}

/// Shared state between the scheduler and the device callback
#[derive(Debug, Default)]
struct Timeline {
    frames_rendered: u64,
    voices: Vec<Voice>,
}

impl Timeline {
    /// Mix scheduled voices into an interleaved device buffer
    ///
    /// Returns the voices that finished within this buffer.
    fn render(&mut self, data: &mut [f32], channels: usize) -> Vec<HandleId> {
        let base = self.frames_rendered;

        for (offset, frame) in data.chunks_mut(channels).enumerate() {
            let position = base + offset as u64;
            frame.fill(0.0);

            for voice in &self.voices {
                if position < voice.start_frame || position >= voice.end_frame() {
                    continue;
                }
                #[allow(clippy::cast_possible_truncation)]
                let index = (position - voice.start_frame) as usize;
                let last_plane = voice.planes.len() - 1;

                for (channel, out) in frame.iter_mut().enumerate() {
                    *out += voice.planes[channel.min(last_plane)][index];
                }
            }
        }

        self.frames_rendered += (data.len() / channels) as u64;

        let now = self.frames_rendered;
        let mut finished = Vec::new();
        self.voices.retain(|voice| {
            if voice.end_frame() <= now {
                finished.push(voice.id);
                false
            } else {
                true
            }
        });
        finished
    }
}

/// Plays scheduled buffers on the default output device
///
/// The output clock is the number of frames the device has consumed, so it
/// advances in steps of one device callback.
pub struct CpalOutput {
    timeline: Arc<Mutex<Timeline>>,
    sample_rate: u32,
    _stream: Stream,
}

impl CpalOutput {
    /// Open the default output device at 24kHz
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(notifier: PlaybackNotifier) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |channels: u16| {
            move |c: &cpal::SupportedStreamConfigRange| {
                c.channels() == channels
                    && c.min_sample_rate() <= SampleRate(OUTPUT_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(OUTPUT_SAMPLE_RATE)
            }
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(supports(1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(supports(2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(OUTPUT_SAMPLE_RATE))
            .config();
        let channels = usize::from(config.channels);

        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let render_timeline = Arc::clone(&timeline);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let finished = match render_timeline.lock() {
                        Ok(mut timeline) => timeline.render(data, channels),
                        Err(_) => {
                            data.fill(0.0);
                            return;
                        }
                    };
                    for id in finished {
                        notifier.finished(id);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = OUTPUT_SAMPLE_RATE,
            channels,
            "audio playback initialized"
        );

        Ok(Self {
            timeline,
            sample_rate: OUTPUT_SAMPLE_RATE,
            _stream: stream,
        })
    }
}

impl OutputSink for CpalOutput {
    #[allow(clippy::cast_precision_loss)]
    fn current_time(&self) -> f64 {
        let frames = self
            .timeline
            .lock()
            .map(|t| t.frames_rendered)
            .unwrap_or_default();
        frames as f64 / f64::from(self.sample_rate)
    }

    fn play_at(&mut self, id: HandleId, buffer: AudioBuffer, start: f64) -> Result<()> {
        if buffer.sample_rate != self.sample_rate {
            return Err(Error::Audio(format!(
                "buffer at {}Hz cannot play on a {}Hz device",
                buffer.sample_rate, self.sample_rate
            )));
        }
        if buffer.channels.is_empty() {
            return Err(Error::Audio("buffer has no channels".to_string()));
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let start_frame = (start * f64::from(self.sample_rate)).round() as u64;

        let mut timeline = self
            .timeline
            .lock()
            .map_err(|_| Error::Audio("playback timeline poisoned".to_string()))?;
        timeline.voices.push(Voice {
            id,
            start_frame,
            planes: buffer.channels,
        });
        Ok(())
    }

    fn stop(&mut self, id: HandleId) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.voices.retain(|voice| voice.id != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: HandleId, start_frame: u64, samples: &[f32]) -> Voice {
        Voice {
            id,
            start_frame,
            planes: vec![samples.to_vec()],
        }
    }

    #[test]
    fn test_render_places_voices_on_timeline() {
        let mut timeline = Timeline::default();
        timeline.voices.push(voice(0, 1, &[0.5, 0.5]));
        timeline.voices.push(voice(1, 3, &[0.25]));

        let mut out = [9.0; 5];
        let finished = timeline.render(&mut out, 1);

        assert_eq!(out, [0.0, 0.5, 0.5, 0.25, 0.0]);
        assert_eq!(finished, vec![0, 1]);
        assert_eq!(timeline.frames_rendered, 5);
        assert!(timeline.voices.is_empty());
    }

    #[test]
    fn test_render_spans_callbacks() {
        let mut timeline = Timeline::default();
        timeline.voices.push(voice(7, 2, &[0.1, 0.2, 0.3, 0.4]));

        let mut first = [0.0; 4];
        assert!(timeline.render(&mut first, 1).is_empty());
        assert_eq!(first, [0.0, 0.0, 0.1, 0.2]);

        let mut second = [0.0; 4];
        assert_eq!(timeline.render(&mut second, 1), vec![7]);
        assert_eq!(second, [0.3, 0.4, 0.0, 0.0]);
    }

    #[test]
    fn test_render_duplicates_mono_to_stereo() {
        let mut timeline = Timeline::default();
        timeline.voices.push(voice(0, 0, &[0.5]));

        let mut out = [0.0; 4];
        timeline.render(&mut out, 2);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
    }
}
