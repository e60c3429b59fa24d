//! One open connection to the live backend
//!
//! A connection owns two tasks: a writer draining the outbound queues into
//! the socket, and a reader turning inbound frames into [`Envelope`]s on the
//! session's event queue. Media goes through a bounded lossy queue; tool
//! results have their own lane that the writer drains first, so queueing one
//! never waits on the socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::event::{Envelope, SessionEvent};
use super::protocol::{ClientMessage, MediaChunk, parse_server_message};
use super::transport::{Connector, FrameSink, FrameStream, Inbound};
use crate::tools::ToolResult;
use crate::{Error, Result};

/// Handle for queueing outbound messages on a connection
///
/// Media is sent lossily: when the queue is full the newest chunk is dropped
/// and counted.
#[derive(Debug, Clone)]
pub struct MediaSender {
    tx: mpsc::Sender<ClientMessage>,
    dropped: Arc<AtomicU64>,
}

impl MediaSender {
    /// Create a sender and the queue it feeds
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ClientMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Queue a media chunk without waiting
    ///
    /// Returns whether the chunk was queued.
    pub fn send_media(&self, chunk: MediaChunk) -> bool {
        match self.tx.try_send(ClientMessage::media(chunk)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    tracing::warn!(dropped, "outbound queue full, dropping media");
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Media chunks dropped because the queue was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the connection still accepts messages
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// An established connection; dropping it shuts both tasks down
pub struct Connection {
    sender: MediaSender,
    tool_results: mpsc::UnboundedSender<ClientMessage>,
    generation: u64,
    shutdown: Option<oneshot::Sender<()>>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Connect, send `setup` first, and start the reader and writer tasks
    ///
    /// Inbound events are tagged with `generation` and pushed to `events`.
    ///
    /// # Errors
    ///
    /// Returns error if the connection or the setup message fails
    pub async fn open(
        connector: &dyn Connector,
        endpoint: &str,
        credential: &SecretString,
        setup: &ClientMessage,
        capacity: usize,
        generation: u64,
        events: mpsc::UnboundedSender<Envelope>,
    ) -> Result<Self> {
        let (mut sink, stream) = connector.connect(endpoint, credential).await?;

        let setup = serde_json::to_string(setup)?;
        sink.send(setup)
            .await
            .map_err(|e| Error::Transport(format!("failed to send setup: {e}")))?;

        let (sender, media) = MediaSender::channel(capacity);
        let (tool_results, tool_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let writer = tokio::spawn(write_loop(
            sink,
            Outbound {
                tool_results: tool_rx,
                media,
            },
            shutdown_rx,
            generation,
            events.clone(),
        ));
        let reader = tokio::spawn(read_loop(stream, generation, events));

        tracing::info!(generation, "live connection opened");

        Ok(Self {
            sender,
            tool_results,
            generation,
            shutdown: Some(shutdown_tx),
            writer,
            reader,
        })
    }

    /// A sender for queueing outbound messages
    #[must_use]
    pub fn sender(&self) -> MediaSender {
        self.sender.clone()
    }

    /// Queue a tool result ahead of any pending media
    ///
    /// Never waits, even when the media queue is full.
    ///
    /// # Errors
    ///
    /// Returns error if the writer has shut down
    pub fn send_tool_result(&self, result: ToolResult) -> Result<()> {
        self.tool_results
            .send(ClientMessage::tool_result(result))
            .map_err(|_| Error::Transport("connection closed".to_string()))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        // The writer may be parked on a stalled socket and never see shutdown
        self.writer.abort();
        self.reader.abort();
        tracing::debug!(generation = self.generation, "live connection closed");
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("generation", &self.generation)
            .field("dropped", &self.sender.dropped())
            .finish_non_exhaustive()
    }
}

struct Outbound {
    tool_results: mpsc::UnboundedReceiver<ClientMessage>,
    media: mpsc::Receiver<ClientMessage>,
}

async fn write_loop(
    mut sink: FrameSink,
    mut outbound: Outbound,
    mut shutdown: oneshot::Receiver<()>,
    generation: u64,
    events: mpsc::UnboundedSender<Envelope>,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            Some(msg) = outbound.tool_results.recv() => msg,
            msg = outbound.media.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize outbound message");
                continue;
            }
        };

        if let Err(e) = sink.send(json).await {
            tracing::warn!(generation, error = %e, "failed to send to live backend");
            let _ = events.send(Envelope::new(
                generation,
                SessionEvent::TransportError(e.to_string()),
            ));
            break;
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!(generation, error = %e, "error closing live connection");
    }
}

async fn read_loop(
    mut stream: FrameStream,
    generation: u64,
    events: mpsc::UnboundedSender<Envelope>,
) {
    let emit = |event| events.send(Envelope::new(generation, event)).is_ok();

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Inbound::Text(text)) => match parse_server_message(&text) {
                Ok(parsed) => {
                    for event in parsed {
                        if !emit(SessionEvent::Server(event)) {
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!(generation, error = %e, "ignoring malformed frame"),
            },
            Ok(Inbound::Closed(reason)) => {
                tracing::info!(
                    generation,
                    reason = reason.as_deref().unwrap_or_default(),
                    "live backend closed connection"
                );
                emit(SessionEvent::Closed { reason });
                return;
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "live connection failed");
                emit(SessionEvent::TransportError(e.to_string()));
                return;
            }
        }
    }

    emit(SessionEvent::Closed { reason: None });
}
