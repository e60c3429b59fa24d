//! Live voice/video sessions over the Gemini Live API
//!
//! [`LiveSession`] is the state machine the UI talks to. It opens one
//! [`Connection`] at a time through a [`Connector`] and consumes a single
//! queue of [`SessionEvent`]s fed by the connection, the speaker and the UI.

mod connection;
mod event;
mod protocol;
mod session;
mod transport;

pub use connection::{Connection, MediaSender};
pub use event::{Envelope, SessionEvent};
pub use protocol::{
    ClientMessage, FunctionOutput, FunctionResponse, JPEG_MIME, MediaChunk, RealtimeInput,
    ServerEvent, Setup, ToolResponse, parse_server_message,
};
pub use session::{
    Command, LiveSession, STATUS_CAMERA_FAILED, STATUS_CAMERA_NEEDS_SESSION, STATUS_CLOSED,
    STATUS_CONNECTING, STATUS_IDLE, STATUS_INTERRUPTED, STATUS_LISTENING, STATUS_LIVE,
    STATUS_MIC_DENIED, STATUS_MIC_FAILED, STATUS_NO_KEY, SessionSettings, SessionSnapshot,
    SessionState, StartRequest,
};
pub use transport::{Connector, FrameSink, FrameStream, Inbound, WebSocketConnector};
