//! WebSocket transport for the live backend
//!
//! The session only needs a text sink and a text stream; [`Connector`] hides
//! the socket so sessions can run over in-memory channels in tests.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use secrecy::{ExposeSecret, SecretString};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::{Error, Result};

/// Outbound text frames
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound frames, ending after [`Inbound::Closed`] or an error
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Inbound>> + Send>>;

/// One frame received from the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A JSON text frame
    Text(String),
    /// The backend closed the connection, with its reason if any
    Closed(Option<String>),
}

/// Opens a bidirectional connection to the live backend
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `endpoint`, authenticating with `credential`
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be established
    async fn connect(
        &self,
        endpoint: &str,
        credential: &SecretString,
    ) -> Result<(FrameSink, FrameStream)>;
}

/// Connects over a TLS WebSocket, passing the API key as a query parameter
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        endpoint: &str,
        credential: &SecretString,
    ) -> Result<(FrameSink, FrameStream)> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid live endpoint: {e}")))?;

        // Logged before the key is attached
        tracing::debug!(
            host = url.host_str().unwrap_or_default(),
            path = url.path(),
            "connecting to live backend"
        );

        url.query_pairs_mut()
            .append_pair("key", credential.expose_secret());

        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::Transport(redact(&e.to_string(), credential)))?;

        let (sink, stream) = ws.split();

        let sink = sink
            .sink_map_err(Error::from)
            .with(|text: String| future::ready(Ok::<_, Error>(Message::Text(text.into()))));

        let stream = stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(Inbound::Text(text.as_str().to_owned()))),
                // Some frames arrive as binary JSON
                Ok(Message::Binary(bytes)) => {
                    Some(Ok(Inbound::Text(String::from_utf8_lossy(&bytes).into_owned())))
                }
                Ok(Message::Close(frame)) => Some(Ok(Inbound::Closed(
                    frame.map(|f| f.reason.as_str().to_owned()).filter(|r| !r.is_empty()),
                ))),
                Ok(_) => None,
                Err(e) => Some(Err(Error::from(e))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// Strip the credential from an error message
fn redact(message: &str, credential: &SecretString) -> String {
    let secret = credential.expose_secret();
    if secret.is_empty() {
        message.to_string()
    } else {
        message.replace(secret, "[REDACTED]")
    }
}
