//! Events delivered to the session's single consumer queue

use super::protocol::ServerEvent;
use crate::audio::HandleId;

/// Something the session must react to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A decoded backend message
    Server(ServerEvent),
    /// A scheduled output buffer played to its end
    PlaybackEnded(HandleId),
    /// The backend closed the connection
    Closed {
        /// Close reason, if the backend gave one
        reason: Option<String>,
    },
    /// The connection failed
    TransportError(String),
}

/// An event tagged with the session generation that produced it
///
/// Events from an earlier generation belong to a torn-down connection and are
/// ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Generation of the connection that emitted the event
    pub generation: u64,
    /// The event itself
    pub event: SessionEvent,
}

impl Envelope {
    /// Tag `event` with `generation`
    #[must_use]
    pub const fn new(generation: u64, event: SessionEvent) -> Self {
        Self { generation, event }
    }
}
