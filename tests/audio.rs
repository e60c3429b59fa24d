//! Audio pipeline integration tests
//!
//! Tests capture encoding and playback scheduling without audio hardware

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use aura_sync::audio::pcm::{decode_pcm16_base64, encode_pcm16_base64};
use aura_sync::audio::{
    AudioBuffer, BLOCK_SIZE, BlockAssembler, HandleId, OUTPUT_SAMPLE_RATE, OutputSink,
    PlaybackScheduler, SAMPLE_RATE, samples_to_wav,
};

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

#[derive(Clone, Default)]
struct Clock {
    now: Arc<Mutex<f64>>,
    scheduled: Arc<Mutex<Vec<(HandleId, f64, f64)>>>,
}

impl OutputSink for Clock {
    fn current_time(&self) -> f64 {
        *self.now.lock().unwrap()
    }

    fn play_at(&mut self, id: HandleId, buffer: AudioBuffer, start: f64) -> aura_sync::Result<()> {
        self.scheduled
            .lock()
            .unwrap()
            .push((id, start, buffer.duration()));
        Ok(())
    }

    fn stop(&mut self, _id: HandleId) {}
}

#[test]
fn test_sine_survives_pcm_round_trip() {
    let original = generate_sine_samples(440.0, 0.5, 0.8);
    let decoded = decode_pcm16_base64(&encode_pcm16_base64(&original), 1).unwrap();

    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].len(), original.len());
    for (a, b) in original.iter().zip(&decoded[0]) {
        assert!((a - b).abs() <= 1.0 / 32768.0);
    }
}

#[test]
fn test_capture_blocks_from_irregular_callbacks() {
    let samples = generate_sine_samples(220.0, 1.0, 0.5);
    let mut assembler = BlockAssembler::new(BLOCK_SIZE);
    let mut blocks = Vec::new();

    for callback in samples.chunks(441) {
        assembler.push(callback, |block| blocks.push(block.to_vec()));
    }

    assert_eq!(blocks.len(), SAMPLE_RATE as usize / BLOCK_SIZE);
    assert!(blocks.iter().all(|b| b.len() == BLOCK_SIZE));
    assert_eq!(blocks.concat(), samples[..blocks.len() * BLOCK_SIZE]);
    assert_eq!(assembler.pending(), samples.len() % BLOCK_SIZE);
}

#[test]
fn test_schedule_never_overlaps_or_gaps() {
    let clock = Clock::default();
    let mut scheduler = PlaybackScheduler::new(Box::new(clock.clone()));

    // Chunk sizes as streamed by the backend vary
    for (i, frames) in [960, 1920, 480, 2400, 3840, 240].into_iter().enumerate() {
        *clock.now.lock().unwrap() = 0.01 * i as f64;
        scheduler
            .enqueue(AudioBuffer::new(OUTPUT_SAMPLE_RATE, vec![vec![0.0; frames]]))
            .unwrap();
    }

    let scheduled = clock.scheduled.lock().unwrap().clone();
    for pair in scheduled.windows(2) {
        let (_, start_a, duration_a) = pair[0];
        let (_, start_b, _) = pair[1];
        assert!(start_b >= start_a);
        assert!((start_b - (start_a + duration_a)).abs() < 1e-9);
    }
}

#[test]
fn test_wav_roundtrip() {
    let original = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&original, SAMPLE_RATE).unwrap();

    let mut reader = hound::WavReader::new(Cursor::new(wav_data)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let read: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(read.len(), original.len());
}
