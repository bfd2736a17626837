//! Shared test utilities
//!
//! Fakes for every seam the voice pipeline and chat service talk through, so
//! the integration tests run without audio hardware or network access.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use nguru::live::{ClientCommand, LiveConnection, LiveConnector, LiveSetup, ServerEvent};
use nguru::store::LocalStore;
use nguru::voice::device::FrameCallback;
use nguru::voice::{AudioInput, AudioOutput, InputStream, OutputContext};
use nguru::{ChatMessage, Error, Result, TextGenerator};

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MicState {
    callback: Mutex<Option<FrameCallback>>,
    opens: Mutex<usize>,
}

/// Microphone whose frames are pushed by the test
#[derive(Clone, Default)]
pub struct FakeMic {
    state: Arc<MicState>,
    denied: bool,
}

impl FakeMic {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A microphone the user refused access to
    #[must_use]
    pub fn denied() -> Self {
        Self {
            denied: true,
            ..Self::default()
        }
    }

    /// Deliver frames as the audio thread would; false if no stream is open
    pub fn speak(&self, frames: &[f32]) -> bool {
        let mut callback = self.state.callback.lock().unwrap();
        match callback.as_mut() {
            Some(on_frames) => {
                on_frames(frames);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.callback.lock().unwrap().is_some()
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        *self.state.opens.lock().unwrap()
    }
}

struct FakeMicStream {
    state: Arc<MicState>,
}

impl InputStream for FakeMicStream {
    fn close(&mut self) {
        self.state.callback.lock().unwrap().take();
    }
}

impl AudioInput for FakeMic {
    fn open(&self, _sample_rate: u32, on_frames: FrameCallback) -> Result<Box<dyn InputStream>> {
        if self.denied {
            return Err(Error::Device("permission denied".to_string()));
        }
        *self.state.opens.lock().unwrap() += 1;
        *self.state.callback.lock().unwrap() = Some(on_frames);
        Ok(Box::new(FakeMicStream {
            state: Arc::clone(&self.state),
        }))
    }
}

// ---------------------------------------------------------------------------
// Speaker
// ---------------------------------------------------------------------------

/// One buffer handed to the output context
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scheduled {
    pub start: f64,
    pub samples: usize,
}

#[derive(Default)]
struct SpeakerState {
    now: f64,
    scheduled: Vec<Scheduled>,
    opens: usize,
    closes: usize,
}

/// Output device with a clock the test moves by hand
#[derive(Clone, Default)]
pub struct FakeSpeaker {
    state: Arc<Mutex<SpeakerState>>,
}

impl FakeSpeaker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&self, now: f64) {
        self.state.lock().unwrap().now = now;
    }

    #[must_use]
    pub fn scheduled(&self) -> Vec<Scheduled> {
        self.state.lock().unwrap().scheduled.clone()
    }

    #[must_use]
    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

struct FakeSpeakerContext {
    state: Arc<Mutex<SpeakerState>>,
    closed: bool,
}

impl AudioOutput for FakeSpeaker {
    fn open(&self, _sample_rate: u32) -> Result<Box<dyn OutputContext>> {
        self.state.lock().unwrap().opens += 1;
        Ok(Box::new(FakeSpeakerContext {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

impl OutputContext for FakeSpeakerContext {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().now
    }

    fn schedule(&mut self, samples: Vec<f32>, start_at: f64) -> Result<()> {
        if self.closed {
            return Err(Error::Audio("context closed".to_string()));
        }
        self.state.lock().unwrap().scheduled.push(Scheduled {
            start: start_at,
            samples: samples.len(),
        });
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().unwrap().closes += 1;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

// ---------------------------------------------------------------------------
// Live service
// ---------------------------------------------------------------------------

/// How the scripted service answers a connect
#[derive(Debug, Clone)]
pub enum Handshake {
    /// Report `Open` straight away
    Open,
    /// Report a transport error instead of opening
    Fail(String),
    /// Never say anything
    Silent,
}

/// The service side of one scripted session
pub struct Remote {
    pub events: mpsc::Sender<ServerEvent>,
    pub commands: mpsc::Receiver<ClientCommand>,
}

impl Remote {
    pub async fn send(&self, event: ServerEvent) {
        self.events.send(event).await.unwrap();
    }

    /// Every command the controller has sent so far
    pub fn drain(&mut self) -> Vec<ClientCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            commands.push(command);
        }
        commands
    }
}

#[derive(Default)]
struct ConnectorState {
    connects: usize,
    setups: Vec<LiveSetup>,
    remotes: VecDeque<Remote>,
}

/// Connector that hands the test the other end of every connection
#[derive(Clone)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ConnectorState>>,
    handshake: Handshake,
    has_credentials: bool,
}

impl ScriptedConnector {
    #[must_use]
    pub fn new(handshake: Handshake) -> Self {
        Self {
            state: Arc::default(),
            handshake,
            has_credentials: true,
        }
    }

    #[must_use]
    pub fn without_credentials() -> Self {
        Self {
            has_credentials: false,
            ..Self::new(Handshake::Open)
        }
    }

    /// The service end of the oldest connection not yet taken
    #[must_use]
    pub fn remote(&self) -> Remote {
        self.state
            .lock()
            .unwrap()
            .remotes
            .pop_front()
            .expect("no connection was opened")
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    #[must_use]
    pub fn setups(&self) -> Vec<LiveSetup> {
        self.state.lock().unwrap().setups.clone()
    }
}

#[async_trait]
impl LiveConnector for ScriptedConnector {
    fn check_credentials(&self) -> Result<()> {
        if self.has_credentials {
            Ok(())
        } else {
            Err(Error::Config("GEMINI_API_KEY is not set".to_string()))
        }
    }

    async fn connect(&self, setup: &LiveSetup) -> Result<LiveConnection> {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(256);

        match &self.handshake {
            Handshake::Open => event_tx.try_send(ServerEvent::Open).unwrap(),
            Handshake::Fail(reason) => event_tx
                .try_send(ServerEvent::Error(reason.clone()))
                .unwrap(),
            Handshake::Silent => {}
        }

        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        state.setups.push(setup.clone());
        state.remotes.push_back(Remote {
            events: event_tx,
            commands: command_rx,
        });

        Ok(LiveConnection::new(command_tx, event_rx))
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// One call the chat service made to the generator
#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub system_instruction: String,
    pub history: Vec<ChatMessage>,
    pub message: String,
}

/// Text generator that replays canned results
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    replies: Arc<Mutex<VecDeque<Result<Option<String>>>>>,
    calls: Arc<Mutex<Vec<GenerateCall>>>,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, text: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(Some(text.to_string())));
    }

    pub fn reply_empty(&self) {
        self.replies.lock().unwrap().push_back(Ok(None));
    }

    pub fn fail(&self) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(Error::Generation("model overloaded".to_string())));
    }

    #[must_use]
    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<Option<String>> {
        self.calls.lock().unwrap().push(GenerateCall {
            system_instruction: system_instruction.to_string(),
            history: history.to_vec(),
            message: message.to_string(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(None))
    }
}

/// Set up an in-memory profile store
#[must_use]
pub fn setup_test_store() -> Arc<LocalStore> {
    Arc::new(LocalStore::open_in_memory().expect("failed to init test store"))
}
