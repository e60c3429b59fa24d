//! Audio pipelines for live sessions
//!
//! Capture turns microphone input into 16kHz PCM blocks; playback schedules
//! 24kHz PCM from the backend gaplessly on the output device.

mod capture;
mod output;
pub mod pcm;
mod playback;

pub use capture::{
    BLOCK_SIZE, BlockAssembler, BlockHandler, CaptureSink, CpalMicrophone, Microphone, SAMPLE_RATE,
};
pub use output::CpalOutput;
pub use pcm::samples_to_wav;
pub use playback::{
    AudioBuffer, HandleId, OUTPUT_SAMPLE_RATE, OutputSink, PlaybackHandle, PlaybackNotifier,
    PlaybackScheduler,
};
