//! Shared test utilities: in-memory backend, devices and opener

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use aura_sync::audio::{
    AudioBuffer, BlockHandler, HandleId, Microphone, OutputSink, PlaybackNotifier,
};
use aura_sync::live::{Connector, FrameSink, FrameStream, Inbound};
use aura_sync::video::FrameSource;
use aura_sync::{
    Error, LiveSession, MediaDevices, Result, SessionSettings, StartRequest, ToolDispatcher,
};
use futures::channel::mpsc as fmpsc;
use futures::StreamExt;
use image::{DynamicImage, Rgb, RgbImage};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

/// The backend's end of one fake connection
pub struct ServerSide {
    sent: fmpsc::UnboundedReceiver<String>,
    inbound: fmpsc::UnboundedSender<Result<Inbound>>,
}

impl ServerSide {
    /// Next JSON message the client sent
    pub async fn next_sent(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.sent.next())
            .await
            .expect("timed out waiting for client message")
            .expect("client closed the connection");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Deliver a server message
    pub fn push(&self, message: Value) {
        self.inbound
            .unbounded_send(Ok(Inbound::Text(message.to_string())))
            .expect("client stopped reading");
    }

    /// Close the connection from the server side
    pub fn close(&self, reason: &str) {
        let _ = self
            .inbound
            .unbounded_send(Ok(Inbound::Closed(Some(reason.to_string()))));
    }

    /// Fail the connection
    pub fn fail(&self, error: &str) {
        let _ = self
            .inbound
            .unbounded_send(Err(Error::Transport(error.to_string())));
    }
}

/// Connector handing each new connection to the test
#[derive(Clone)]
pub struct FakeConnector {
    links: mpsc::UnboundedSender<ServerSide>,
    pub connects: Arc<AtomicUsize>,
    pub credentials: Arc<Mutex<Vec<String>>>,
    pub endpoints: Arc<Mutex<Vec<String>>>,
    /// When set, every later send on any socket hangs
    pub stalled: Arc<AtomicBool>,
    /// Socket sinks not yet dropped
    pub live_sinks: Arc<AtomicUsize>,
}

/// Decrements the live sink count when the sink goes away
struct SinkGuard(Arc<AtomicUsize>);

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerSide>) {
        let (links, rx) = mpsc::unbounded_channel();
        (
            Self {
                links,
                connects: Arc::new(AtomicUsize::new(0)),
                credentials: Arc::default(),
                endpoints: Arc::default(),
                stalled: Arc::default(),
                live_sinks: Arc::default(),
            },
            rx,
        )
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Make the backend stop reading: sends never complete
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn live_sinks(&self) -> usize {
        self.live_sinks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        endpoint: &str,
        credential: &SecretString,
    ) -> Result<(FrameSink, FrameStream)> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().unwrap().push(endpoint.to_string());
        self.credentials
            .lock()
            .unwrap()
            .push(credential.expose_secret().to_string());

        let (out_tx, out_rx) = fmpsc::unbounded();
        let (in_tx, in_rx) = fmpsc::unbounded();

        self.links
            .send(ServerSide {
                sent: out_rx,
                inbound: in_tx,
            })
            .map_err(|_| Error::Transport("test dropped the link receiver".to_string()))?;

        self.live_sinks.fetch_add(1, Ordering::SeqCst);
        let state = (
            out_tx,
            SinkGuard(Arc::clone(&self.live_sinks)),
            Arc::clone(&self.stalled),
        );
        let sink: FrameSink = Box::pin(futures::sink::unfold(
            state,
            |(out_tx, guard, stalled), frame: String| async move {
                if stalled.load(Ordering::SeqCst) {
                    futures::future::pending::<()>().await;
                }
                out_tx
                    .unbounded_send(frame)
                    .map_err(|e| Error::Transport(e.to_string()))?;
                Ok((out_tx, guard, stalled))
            },
        ));
        let stream: FrameStream = Box::pin(in_rx);
        Ok((sink, stream))
    }
}

/// Everything the fake devices observed
#[derive(Default)]
pub struct DeviceState {
    pub mic_denied: bool,
    pub camera_denied: bool,
    pub mic_handler: Option<BlockHandler>,
    pub mic_starts: usize,
    pub mic_stops: usize,
    pub cameras_opened: usize,
    pub clock: f64,
    pub playing: Vec<(HandleId, f64, usize)>,
    pub stopped: Vec<HandleId>,
    pub notifier: Option<PlaybackNotifier>,
}

/// Devices backed by shared in-memory state
#[derive(Clone, Default)]
pub struct FakeDevices(pub Arc<Mutex<DeviceState>>);

impl FakeDevices {
    /// Push samples through the microphone, if it is capturing
    pub fn feed_mic(&self, samples: &[f32]) -> bool {
        let mut state = self.0.lock().unwrap();
        match state.mic_handler.as_mut() {
            Some(handler) => {
                handler(samples);
                true
            }
            None => false,
        }
    }

    /// Report that a scheduled buffer played to its end
    pub fn finish(&self, id: HandleId) {
        let notifier = self.0.lock().unwrap().notifier.clone();
        notifier.expect("speaker not opened").finished(id);
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, DeviceState> {
        self.0.lock().unwrap()
    }
}

struct FakeMicrophone(Arc<Mutex<DeviceState>>);

impl Microphone for FakeMicrophone {
    fn start(&mut self, on_block: BlockHandler) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        state.mic_handler = Some(on_block);
        state.mic_starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.mic_handler = None;
        state.mic_stops += 1;
    }
}

struct FakeSpeaker(Arc<Mutex<DeviceState>>);

impl OutputSink for FakeSpeaker {
    fn current_time(&self) -> f64 {
        self.0.lock().unwrap().clock
    }

    fn play_at(&mut self, id: HandleId, buffer: AudioBuffer, start: f64) -> Result<()> {
        self.0
            .lock()
            .unwrap()
            .playing
            .push((id, start, buffer.frames()));
        Ok(())
    }

    fn stop(&mut self, id: HandleId) {
        self.0.lock().unwrap().stopped.push(id);
    }
}

struct FakeCamera;

#[async_trait]
impl FrameSource for FakeCamera {
    async fn grab(&mut self) -> Result<DynamicImage> {
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            32,
            24,
            Rgb([200, 120, 40]),
        )))
    }
}

#[async_trait(?Send)]
impl MediaDevices for FakeDevices {
    async fn open_microphone(&self) -> Result<Box<dyn Microphone>> {
        if self.0.lock().unwrap().mic_denied {
            return Err(Error::Permission("microphone denied".to_string()));
        }
        Ok(Box::new(FakeMicrophone(Arc::clone(&self.0))))
    }

    fn open_speaker(&self, notifier: PlaybackNotifier) -> Result<Box<dyn OutputSink>> {
        self.0.lock().unwrap().notifier = Some(notifier);
        Ok(Box::new(FakeSpeaker(Arc::clone(&self.0))))
    }

    async fn open_camera(&self) -> Result<Box<dyn FrameSource>> {
        let mut state = self.0.lock().unwrap();
        if state.camera_denied {
            return Err(Error::Permission("camera denied".to_string()));
        }
        state.cameras_opened += 1;
        Ok(Box::new(FakeCamera))
    }
}

/// Records every URL it is asked to open
#[derive(Clone, Default)]
pub struct RecordingOpener(pub Arc<Mutex<Vec<String>>>);

impl aura_sync::tools::UrlOpener for RecordingOpener {
    fn open(&self, url: &str) -> Result<()> {
        self.0.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Session settings pointing at the fake backend
pub fn test_settings(credential: Option<&str>) -> SessionSettings {
    SessionSettings {
        model: "test-model".to_string(),
        endpoint: "wss://live.example.test/ws".to_string(),
        outbound_capacity: 16,
        credential: credential.map(|key| SecretString::from(key.to_string())),
        companion_name: "Nihara".to_string(),
        pro: false,
        profile_image: None,
    }
}

/// A start request with a recognizable instruction
pub fn start_request() -> StartRequest {
    StartRequest {
        voice: "Zephyr".to_string(),
        system_instruction: "You are a test companion.".to_string(),
        camera_requested: false,
    }
}

/// A session wired to fakes, plus handles on every fake
pub struct Harness {
    pub session: LiveSession,
    pub links: mpsc::UnboundedReceiver<ServerSide>,
    pub connector: FakeConnector,
    pub devices: FakeDevices,
    pub opened: RecordingOpener,
    pub interactions: Rc<Cell<usize>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_credential(Some("test-key"))
    }

    pub fn with_credential(credential: Option<&str>) -> Self {
        let (connector, links) = FakeConnector::new();
        let devices = FakeDevices::default();
        let opened = RecordingOpener::default();
        let interactions = Rc::new(Cell::new(0));

        let session = LiveSession::new(
            test_settings(credential),
            Box::new(connector.clone()),
            Box::new(devices.clone()),
            ToolDispatcher::new(Box::new(opened.clone())),
        )
        .on_interaction({
            let interactions = Rc::clone(&interactions);
            move || interactions.set(interactions.get() + 1)
        });

        Self {
            session,
            links,
            connector,
            devices,
            opened,
            interactions,
        }
    }

    /// Start a session and return the backend side with the setup consumed
    pub async fn start(&mut self) -> (ServerSide, Value) {
        self.session
            .start_session(start_request())
            .await
            .expect("session failed to start");
        let mut link = self.next_link().await;
        let setup = link.next_sent().await;
        (link, setup)
    }

    /// Start a session and complete the setup handshake
    pub async fn go_live(&mut self) -> ServerSide {
        let (link, _) = self.start().await;
        link.push(serde_json::json!({ "setupComplete": {} }));
        self.pump_until(|s| s.state() == aura_sync::SessionState::Active)
            .await;
        link
    }

    pub async fn next_link(&mut self) -> ServerSide {
        tokio::time::timeout(WAIT, self.links.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Handle exactly one queued event
    pub async fn pump(&mut self) {
        let envelope = tokio::time::timeout(WAIT, self.session.next_event())
            .await
            .expect("timed out waiting for a session event")
            .expect("event queue closed");
        self.session.handle_event(envelope).await;
    }

    /// Handle events until `done` holds
    pub async fn pump_until(&mut self, done: impl Fn(&LiveSession) -> bool) {
        while !done(&self.session) {
            self.pump().await;
        }
    }

    /// Handle `count` queued events
    pub async fn pump_n(&mut self, count: usize) {
        for _ in 0..count {
            self.pump().await;
        }
    }
}
