//! Aura Sync - real-time voice and video companion sessions
//!
//! This library provides the live mode of the Aura companion:
//! - Microphone capture into 16kHz PCM blocks
//! - Gapless playback of streamed 24kHz model audio
//! - Periodic camera frames as JPEG
//! - Transcript turns and app-opening tool calls
//! - A session state machine over the Gemini Live WebSocket API
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  UI (aura live)                      │
//! │     commands in       │       snapshots out          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  LiveSession                         │
//! │  Capture │ Playback │ Frames │ Turns │ Tools         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │            Gemini Live (WebSocket)                   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod devices;
pub mod error;
pub mod live;
pub mod persona;
pub mod tools;
pub mod transcript;
pub mod video;

pub use config::Config;
pub use devices::{MediaDevices, SystemDevices};
pub use error::{Error, Result};
pub use live::{
    Command, LiveSession, SessionSettings, SessionSnapshot, SessionState, StartRequest,
    WebSocketConnector,
};
pub use persona::Persona;
pub use tools::{SystemOpener, ToolDispatcher, ToolInvocation, ToolResult};
pub use transcript::{Turn, TurnTracker};
