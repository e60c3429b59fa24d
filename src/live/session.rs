//! Live session lifecycle
//!
//! [`LiveSession`] owns at most one [`Connection`] and drives everything
//! around it from a single event queue: capture is wired in once the backend
//! accepts the setup, inbound audio goes to the playback scheduler,
//! transcripts to the turn tracker and tool calls to the dispatcher. Every
//! failure that ends a session lands in the `status` line and tears down
//! playback, transcript and captures together.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, watch};

use super::connection::Connection;
use super::event::{Envelope, SessionEvent};
use super::protocol::{ClientMessage, ServerEvent, Setup};
use super::transport::Connector;
use crate::audio::{CaptureSink, Microphone, PlaybackNotifier, PlaybackScheduler};
use crate::config::Config;
use crate::devices::MediaDevices;
use crate::persona::with_camera;
use crate::tools::{ToolDispatcher, ToolInvocation, open_app_declaration};
use crate::transcript::{Turn, TurnTracker};
use crate::video::{FrameSampler, FrameSource};
use crate::{Error, Result};

/// Status while no session is running
pub const STATUS_IDLE: &str = "Tap to speak";
/// Status while connecting
pub const STATUS_CONNECTING: &str = "Initializing...";
/// Status once the backend accepted the setup
pub const STATUS_LIVE: &str = "Connection live. Listening...";
/// Status while waiting for the user
pub const STATUS_LISTENING: &str = "Listening...";
/// Status after a transport failure
pub const STATUS_INTERRUPTED: &str = "Connection interrupted.";
/// Status after the backend closed the connection
pub const STATUS_CLOSED: &str = "Connection closed.";
/// Status when no usable API key is configured
pub const STATUS_NO_KEY: &str = "API Key not configured. Please contact the administrator.";
/// Status when the microphone could not be acquired
pub const STATUS_MIC_DENIED: &str = "Failed to start. Check mic permissions.";
/// Status when the microphone could not be started
pub const STATUS_MIC_FAILED: &str = "Failed to access microphone.";
/// Status when the camera is toggled without a session
pub const STATUS_CAMERA_NEEDS_SESSION: &str = "Start conversation first to use camera.";
/// Status when the camera could not be acquired
pub const STATUS_CAMERA_FAILED: &str = "Couldn't access camera.";

/// What the UI asks for when starting a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// Prebuilt voice name
    pub voice: String,
    /// System instruction, before any camera suffix
    pub system_instruction: String,
    /// Stream camera frames as well
    pub camera_requested: bool,
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No connection
    #[default]
    Idle,
    /// Connection opening, waiting for the backend to accept setup
    Connecting,
    /// Streaming
    Active,
    /// Tearing down
    Closing,
}

/// Everything the UI renders, published after every change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Lifecycle state
    pub state: SessionState,
    /// Human-readable status line
    pub status: String,
    /// Model audio is playing
    pub ai_speaking: bool,
    /// Camera frames are being sent
    pub camera_on: bool,
    /// Microphone blocks are being discarded
    pub muted: bool,
    /// Finalized turns followed by the live one
    pub transcript: Vec<Turn>,
    /// How many leading entries of `transcript` are finalized
    pub finalized_turns: usize,
    /// Pro tier enabled
    pub pro: bool,
    /// Companion profile image
    pub profile_image: Option<PathBuf>,
}

/// A request from the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a session
    Start(StartRequest),
    /// Stop the session
    Stop,
    /// Turn camera streaming on or off
    ToggleCamera,
    /// Flip the mute flag
    ToggleMute,
    /// Set the mute flag
    SetMuted(bool),
}

/// Connection and presentation settings for sessions
#[derive(Debug)]
pub struct SessionSettings {
    /// Model identifier
    pub model: String,
    /// WebSocket endpoint, without credentials
    pub endpoint: String,
    /// Outbound queue capacity in messages
    pub outbound_capacity: usize,
    /// Usable API key, if one is configured
    pub credential: Option<SecretString>,
    /// Companion display name
    pub companion_name: String,
    /// Pro tier enabled
    pub pro: bool,
    /// Companion profile image
    pub profile_image: Option<PathBuf>,
}

impl SessionSettings {
    /// Derive session settings from configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.live.model.clone(),
            endpoint: config.live.endpoint.clone(),
            outbound_capacity: config.live.outbound_capacity,
            credential: config.credential().ok(),
            companion_name: config.persona.name.clone(),
            pro: config.persona.pro,
            profile_image: config.persona.profile_image.clone(),
        }
    }
}

type InteractionHook = Box<dyn FnMut()>;

/// The live session manager
pub struct LiveSession {
    settings: SessionSettings,
    connector: Box<dyn Connector>,
    devices: Box<dyn MediaDevices>,
    dispatcher: ToolDispatcher,
    on_interaction: InteractionHook,

    events_tx: mpsc::UnboundedSender<Envelope>,
    events_rx: mpsc::UnboundedReceiver<Envelope>,
    generation: u64,
    session_id: String,

    state: SessionState,
    status: String,
    ai_speaking: bool,
    camera_on: bool,
    muted: Arc<AtomicBool>,
    request: Option<StartRequest>,

    connection: Option<Connection>,
    microphone: Option<Box<dyn Microphone>>,
    camera: Option<Box<dyn FrameSource>>,
    sampler: Option<FrameSampler>,
    playback: Option<PlaybackScheduler>,
    tracker: TurnTracker,

    snapshot_tx: watch::Sender<SessionSnapshot>,
}

// Device handles are not Send, so the session stays on the task that owns it
#[allow(clippy::future_not_send)]
impl LiveSession {
    /// Create an idle session
    #[must_use]
    pub fn new(
        settings: SessionSettings,
        connector: Box<dyn Connector>,
        devices: Box<dyn MediaDevices>,
        dispatcher: ToolDispatcher,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        let session = Self {
            settings,
            connector,
            devices,
            dispatcher,
            on_interaction: Box::new(|| {}),
            events_tx,
            events_rx,
            generation: 0,
            session_id: String::new(),
            state: SessionState::Idle,
            status: STATUS_IDLE.to_string(),
            ai_speaking: false,
            camera_on: false,
            muted: Arc::new(AtomicBool::new(false)),
            request: None,
            connection: None,
            microphone: None,
            camera: None,
            sampler: None,
            playback: None,
            tracker: TurnTracker::new(),
            snapshot_tx,
        };
        session.publish();
        session
    }

    /// Call `hook` once for every start attempt that passes the credential check
    #[must_use]
    pub fn on_interaction(mut self, hook: impl FnMut() + 'static) -> Self {
        self.on_interaction = Box::new(hook);
        self
    }

    /// Receive a snapshot after every change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The current snapshot
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Status line
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Media chunks dropped on the current connection
    #[must_use]
    pub fn dropped_chunks(&self) -> u64 {
        self.connection.as_ref().map_or(0, |c| c.sender().dropped())
    }

    /// Start a session
    ///
    /// Does nothing while a session is connecting or active.
    ///
    /// # Errors
    ///
    /// Returns error if the credential is missing or the session could not
    /// be started; the status line says why and the session stays idle
    pub async fn start_session(&mut self, request: StartRequest) -> Result<()> {
        if matches!(self.state, SessionState::Connecting | SessionState::Active) {
            tracing::debug!(state = ?self.state, "session already running, ignoring start");
            return Ok(());
        }

        let Some(credential) = self
            .settings
            .credential
            .as_ref()
            .map(|key| SecretString::from(key.expose_secret().to_owned()))
        else {
            self.set_status(STATUS_NO_KEY);
            return Err(Error::Config("API key not configured".to_string()));
        };

        (self.on_interaction)();

        self.generation += 1;
        self.session_id = format!("live_{}", uuid::Uuid::new_v4().as_simple());
        self.state = SessionState::Connecting;
        self.request = Some(request.clone());
        self.set_status(STATUS_CONNECTING);

        tracing::info!(
            session = %self.session_id,
            generation = self.generation,
            voice = %request.voice,
            camera = request.camera_requested,
            "starting live session"
        );

        if let Err(e) = self.connect(&request, &credential).await {
            tracing::error!(error = %e, "failed to start live session");
            self.teardown();
            let status = match &e {
                Error::Permission(_) => STATUS_MIC_DENIED.to_string(),
                other => format!("Failed to start: {other}"),
            };
            self.set_status(&status);
            return Err(e);
        }

        self.publish();
        Ok(())
    }

    async fn connect(&mut self, request: &StartRequest, credential: &SecretString) -> Result<()> {
        let generation = self.generation;

        self.microphone = Some(self.devices.open_microphone().await?);

        let events = self.events_tx.clone();
        let notifier = PlaybackNotifier::new(move |id| {
            let _ = events.send(Envelope::new(generation, SessionEvent::PlaybackEnded(id)));
        });
        self.playback = Some(PlaybackScheduler::new(
            self.devices.open_speaker(notifier)?,
        ));

        let mut camera_on = false;
        if request.camera_requested {
            if self.camera.is_none() {
                match self.devices.open_camera().await {
                    Ok(camera) => self.camera = Some(camera),
                    Err(e) => {
                        tracing::warn!(error = %e, "camera unavailable, starting without video");
                    }
                }
            }
            camera_on = self.camera.is_some();
        }
        self.camera_on = camera_on;

        let instruction = if camera_on {
            with_camera(&request.system_instruction)
        } else {
            request.system_instruction.clone()
        };

        let setup = ClientMessage::Setup(Setup::new(
            &self.settings.model,
            &request.voice,
            &instruction,
            vec![open_app_declaration()],
        ));

        let connection = Connection::open(
            self.connector.as_ref(),
            &self.settings.endpoint,
            credential,
            &setup,
            self.settings.outbound_capacity,
            generation,
            self.events_tx.clone(),
        )
        .await?;
        self.connection = Some(connection);

        Ok(())
    }

    /// Stop the session and reset to idle
    ///
    /// Does nothing while idle.
    pub fn stop_session(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }

        tracing::info!(session = %self.session_id, "stopping live session");
        self.state = SessionState::Closing;
        self.publish();

        self.teardown();
        self.request = None;
        self.set_status(STATUS_IDLE);
    }

    /// Turn camera streaming on or off
    ///
    /// Only allowed while active. Either way the session restarts with a
    /// matching system instruction.
    ///
    /// # Errors
    ///
    /// Returns error if the camera cannot be acquired or the restart fails
    pub async fn toggle_camera(&mut self) -> Result<()> {
        let active = self.state == SessionState::Active;
        let Some(mut request) = self.request.clone().filter(|_| active) else {
            self.set_status(STATUS_CAMERA_NEEDS_SESSION);
            return Ok(());
        };

        let camera = if self.camera_on {
            None
        } else {
            match self.devices.open_camera().await {
                Ok(camera) => Some(camera),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to access camera");
                    self.set_status(STATUS_CAMERA_FAILED);
                    return Err(e);
                }
            }
        };

        request.camera_requested = camera.is_some();
        tracing::info!(camera = request.camera_requested, "restarting session for camera");

        self.state = SessionState::Closing;
        self.teardown();
        self.camera = camera;
        self.start_session(request).await
    }

    /// Set whether microphone blocks are discarded
    pub fn set_muted(&mut self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
        tracing::debug!(muted, "microphone mute changed");
        self.publish();
    }

    /// Flip the mute flag
    pub fn toggle_mute(&mut self) {
        let muted = !self.muted.load(Ordering::Relaxed);
        self.set_muted(muted);
    }

    /// Apply one UI command
    ///
    /// # Errors
    ///
    /// Returns error if a start or camera toggle fails
    pub async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Start(request) => self.start_session(request).await,
            Command::Stop => {
                self.stop_session();
                Ok(())
            }
            Command::ToggleCamera => self.toggle_camera().await,
            Command::ToggleMute => {
                self.toggle_mute();
                Ok(())
            }
            Command::SetMuted(muted) => {
                self.set_muted(muted);
                Ok(())
            }
        }
    }

    /// Wait for the next queued event
    pub async fn next_event(&mut self) -> Option<Envelope> {
        self.events_rx.recv().await
    }

    /// Handle every event already queued, returning how many there were
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.events_rx.try_recv() {
            self.handle_event(envelope).await;
            handled += 1;
        }
        handled
    }

    /// React to one event
    ///
    /// Events from a torn-down connection are ignored.
    pub async fn handle_event(&mut self, envelope: Envelope) {
        if envelope.generation != self.generation || self.state == SessionState::Idle {
            tracing::trace!(
                generation = envelope.generation,
                current = self.generation,
                "ignoring stale event"
            );
            return;
        }

        match envelope.event {
            SessionEvent::Server(event) => self.handle_server_event(event).await,
            SessionEvent::PlaybackEnded(id) => {
                let drained = self
                    .playback
                    .as_mut()
                    .is_some_and(|playback| playback.on_ended(id));
                if drained && self.ai_speaking {
                    self.ai_speaking = false;
                    self.status = STATUS_LISTENING.to_string();
                }
            }
            SessionEvent::Closed { reason } => {
                tracing::info!(
                    reason = reason.as_deref().unwrap_or_default(),
                    "session closed by backend"
                );
                self.teardown();
                self.status = STATUS_CLOSED.to_string();
            }
            SessionEvent::TransportError(error) => {
                tracing::error!(error = %error, "session transport failed");
                self.teardown();
                self.status = STATUS_INTERRUPTED.to_string();
            }
        }

        self.publish();
    }

    async fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SetupComplete => self.on_open(),
            ServerEvent::InputTranscript(text) => self.tracker.push_user(&text),
            ServerEvent::OutputTranscript(text) => self.tracker.push_ai(&text),
            ServerEvent::Interrupted => {
                if let Some(playback) = self.playback.as_mut() {
                    playback.interrupt();
                }
                self.ai_speaking = false;
                if self.state == SessionState::Active {
                    self.status = STATUS_LISTENING.to_string();
                }
            }
            ServerEvent::Audio {
                data,
                sample_rate,
                channels,
            } => {
                let Some(playback) = self.playback.as_mut() else {
                    return;
                };
                match playback.enqueue_base64(&data, sample_rate, channels) {
                    Ok(_) => {
                        if !self.ai_speaking {
                            self.ai_speaking = true;
                            self.status =
                                format!("{} is speaking...", self.settings.companion_name);
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping undecodable audio chunk"),
                }
            }
            ServerEvent::ToolCall(call) => self.run_tool(&call),
            ServerEvent::TurnComplete => {
                if let Some(finished) = self.tracker.complete_turn() {
                    tracing::debug!(
                        user_chars = finished.turn.user.len(),
                        ai_chars = finished.turn.ai.len(),
                        "turn finalized"
                    );
                }
            }
            ServerEvent::GoAway => tracing::info!("live backend will close the connection soon"),
        }
    }

    fn on_open(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        let Some(sender) = self.connection.as_ref().map(Connection::sender) else {
            return;
        };

        let sink = CaptureSink::new(sender.clone(), Arc::clone(&self.muted));
        let started = self
            .microphone
            .as_mut()
            .map_or(Ok(()), |microphone| microphone.start(sink.into_handler()));

        if let Err(e) = started {
            tracing::error!(error = %e, "failed to start microphone");
            self.teardown();
            self.status = STATUS_MIC_FAILED.to_string();
            return;
        }

        if self.camera_on
            && let Some(camera) = self.camera.take()
        {
            self.sampler = Some(FrameSampler::spawn(camera, sender));
        }

        self.state = SessionState::Active;
        self.status = STATUS_LIVE.to_string();
        tracing::info!(
            generation = self.generation,
            camera = self.camera_on,
            "live session active"
        );
    }

    fn run_tool(&self, call: &ToolInvocation) {
        let result = self.dispatcher.dispatch(call);
        tracing::info!(
            tool = %call.name,
            id = %call.id,
            result = %result.result,
            "tool call handled"
        );

        let Some(connection) = self.connection.as_ref() else {
            return;
        };
        if let Err(e) = connection.send_tool_result(result) {
            tracing::warn!(id = %call.id, error = %e, "failed to send tool result");
        }
    }

    /// Release everything tied to the current connection
    fn teardown(&mut self) {
        // Anything still queued from this connection is now stale
        self.generation += 1;

        if let Some(sampler) = self.sampler.take() {
            sampler.stop();
        }
        self.camera = None;
        if let Some(mut microphone) = self.microphone.take() {
            microphone.stop();
        }
        if let Some(mut playback) = self.playback.take() {
            playback.interrupt();
        }
        self.connection = None;

        self.tracker.clear();
        self.ai_speaking = false;
        self.camera_on = false;
        self.state = SessionState::Idle;
    }

    /// Drive the session from UI commands until the command channel closes
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if let Err(e) = self.execute(command).await {
                        tracing::debug!(error = %e, "command failed");
                    }
                }
                Some(envelope) = self.events_rx.recv() => self.handle_event(envelope).await,
            }
        }

        self.stop_session();
    }

    fn set_status(&mut self, status: &str) {
        status.clone_into(&mut self.status);
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            state: self.state,
            status: self.status.clone(),
            ai_speaking: self.ai_speaking,
            camera_on: self.camera_on,
            muted: self.muted.load(Ordering::Relaxed),
            transcript: self.tracker.view(),
            finalized_turns: self.tracker.log().len(),
            pro: self.settings.pro,
            profile_image: self.settings.profile_image.clone(),
        });
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSession")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
