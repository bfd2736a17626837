//! Voice session controller
//!
//! Owns one capture encoder, one playback scheduler and at most one remote
//! session, and moves audio between them:
//!
//! ```text
//! mic ─▶ CaptureEncoder ─▶ mpsc(64) ─▶ OutboundGate ─▶ LiveConnection.outbound
//!                                                        │
//! speaker ◀─ PlaybackScheduler ◀─ ServerEvent::AudioChunk ◀┘
//! ```
//!
//! The controller is single-task: drive it with [`SessionController::run`]
//! or one event at a time with [`SessionController::step`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use super::capture::CaptureEncoder;
use super::device::{AudioInput, AudioOutput};
use super::gate::OutboundGate;
use super::pcm::EncodedAudioChunk;
use super::playback::PlaybackScheduler;
use super::speaking::SpeakingState;
use crate::live::{ClientCommand, LiveConnection, LiveConnector, LiveSetup, ServerEvent};
use crate::{Error, Result};

/// How long `connect` waits for the transport to open
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured chunks buffered between the audio thread and the controller
pub const CAPTURE_QUEUE_CAPACITY: usize = 64;

const TRANSITION_BUFFER: usize = 16;

/// Lifecycle of the remote session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Snapshot published to the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub speaking: bool,
    /// User-facing message for the most recent failure
    pub error: Option<String>,
    /// Text the model emitted during this session
    pub transcript: String,
}

struct ActiveSession {
    connection: LiveConnection,
    chunks: mpsc::Receiver<EncodedAudioChunk>,
    gate: OutboundGate,
}

enum Action {
    Server(ServerEvent),
    Captured(EncodedAudioChunk),
    SpeakingExpired,
    Shutdown,
    Ended,
}

/// Drives one realtime voice conversation at a time
pub struct SessionController {
    connector: Arc<dyn LiveConnector>,
    setup: LiveSetup,
    capture: CaptureEncoder,
    playback: PlaybackScheduler,
    session: Option<ActiveSession>,
    state: ConnectionState,
    speaking: SpeakingState,
    error: Option<String>,
    transcript: String,
    status: watch::Sender<SessionStatus>,
    transitions: broadcast::Sender<ConnectionState>,
}

#[allow(clippy::future_not_send)]
impl SessionController {
    #[must_use]
    pub fn new(
        connector: Arc<dyn LiveConnector>,
        input: Arc<dyn AudioInput>,
        output: Arc<dyn AudioOutput>,
        setup: LiveSetup,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            connector,
            setup,
            capture: CaptureEncoder::new(input),
            playback: PlaybackScheduler::new(output),
            session: None,
            state: ConnectionState::Idle,
            speaking: SpeakingState::default(),
            error: None,
            transcript: String::new(),
            status,
            transitions,
        }
    }

    /// Open a session and start streaming the microphone
    ///
    /// # Errors
    ///
    /// - `Error::InvalidState` unless idle
    /// - `Error::Config` if credentials are missing (nothing is opened)
    /// - `Error::Connection` if the service does not open within [`OPEN_TIMEOUT`]
    /// - `Error::Device` if the microphone cannot be opened
    ///
    /// On failure the controller passes through `Error`, everything opened so
    /// far is torn down and it ends back at idle.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state != ConnectionState::Idle {
            return Err(Error::InvalidState(format!(
                "cannot connect while {}",
                self.state
            )));
        }

        self.error = None;
        self.transcript.clear();

        if let Err(e) = self.connector.check_credentials() {
            self.report(&e);
            return Err(e);
        }

        self.set_state(ConnectionState::Connecting);

        if let Err(e) = self.open_session().await {
            tracing::error!(error = %e, "failed to start voice session");
            self.report(&e);
            self.set_state(ConnectionState::Error);
            self.disconnect();
            return Err(e);
        }

        Ok(())
    }

    async fn open_session(&mut self) -> Result<()> {
        if let Err(e) = self.playback.init() {
            tracing::warn!(error = %e, "playback unavailable, will retry on first audio");
        }

        let connection = self.connector.connect(&self.setup).await?;
        let (chunk_tx, chunks) = mpsc::channel(CAPTURE_QUEUE_CAPACITY);
        let session = self.session.insert(ActiveSession {
            connection,
            chunks,
            gate: OutboundGate::new(),
        });

        tokio::time::timeout(OPEN_TIMEOUT, wait_for_open(&mut session.connection.inbound))
            .await
            .map_err(|_| Error::Connection("timed out waiting for the voice service".to_string()))??;

        self.set_state(ConnectionState::Connected);
        self.capture
            .start(move |chunk| queue_chunk(&chunk_tx, chunk))?;

        tracing::info!(model = %self.setup.model, "voice session connected");
        Ok(())
    }

    /// Process events until the session ends or `shutdown` resolves
    pub async fn run<S>(&mut self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        while self.session.is_some() {
            let action = tokio::select! {
                biased;
                () = &mut shutdown => Action::Shutdown,
                action = self.next_action() => action,
            };
            self.apply(action).await;
        }
    }

    /// Wait for and process a single event
    ///
    /// Returns false once there is no session left to drive.
    pub async fn step(&mut self) -> bool {
        if self.session.is_none() {
            return false;
        }
        let action = self.next_action().await;
        self.apply(action).await;
        self.session.is_some()
    }

    async fn next_action(&mut self) -> Action {
        let deadline = self.speaking.deadline();
        let Some(session) = self.session.as_mut() else {
            return Action::Ended;
        };

        tokio::select! {
            biased;
            event = session.connection.inbound.recv() => {
                Action::Server(event.unwrap_or(ServerEvent::Closed { reason: None }))
            }
            Some(chunk) = session.chunks.recv() => Action::Captured(chunk),
            () = until(deadline) => Action::SpeakingExpired,
        }
    }

    async fn apply(&mut self, action: Action) {
        match action {
            Action::Server(event) => self.handle_server_event(event).await,
            Action::Captured(chunk) => self.forward_chunk(chunk).await,
            Action::SpeakingExpired => {
                if self.speaking.expire(Instant::now()) {
                    self.publish();
                }
            }
            Action::Shutdown => {
                tracing::info!("shutting down voice session");
                self.disconnect();
            }
            Action::Ended => {}
        }
    }

    /// Send one captured chunk, holding it if the service is not ready yet
    pub async fn forward_chunk(&mut self, chunk: EncodedAudioChunk) {
        let Some(session) = self.session.as_mut() else {
            tracing::trace!("no active session, dropping captured chunk");
            return;
        };

        if let Some(chunk) = session.gate.admit(chunk) {
            send_audio(&session.connection, chunk).await;
        }
    }

    /// React to one event from the remote session
    pub async fn handle_server_event(&mut self, event: ServerEvent) {
        if self.state != ConnectionState::Connected {
            tracing::debug!(?event, state = %self.state, "ignoring event outside a connected session");
            return;
        }

        match event {
            ServerEvent::Open => tracing::debug!("duplicate open event"),
            ServerEvent::SetupComplete => {
                if let Some(session) = self.session.as_mut() {
                    let pending = session.gate.open();
                    tracing::info!(pending = pending.len(), "voice session ready");
                    for chunk in pending {
                        send_audio(&session.connection, chunk).await;
                    }
                }
            }
            ServerEvent::AudioChunk(chunk) => {
                let was_speaking = self.speaking.is_speaking();
                self.speaking.mark_audio(Instant::now());
                self.playback.play(&chunk);
                if !was_speaking {
                    self.publish();
                }
            }
            ServerEvent::TextFragment(text) => {
                self.transcript.push_str(&text);
                self.publish();
            }
            ServerEvent::Interrupted => {
                tracing::debug!("model interrupted, flushing playback");
                self.playback.stop();
                if let Err(e) = self.playback.init() {
                    tracing::warn!(error = %e, "failed to reopen playback");
                }
                self.speaking.clear();
                self.publish();
            }
            ServerEvent::TurnComplete => tracing::debug!("model turn complete"),
            ServerEvent::Closed { reason } => {
                tracing::info!(reason = ?reason, "voice session closed by remote");
                self.disconnect();
            }
            ServerEvent::Error(message) => {
                tracing::error!(error = %message, "voice session error");
                self.report(&Error::Connection(message));
                self.set_state(ConnectionState::Error);
                self.disconnect();
            }
        }
    }

    /// Tear everything down and return to idle
    ///
    /// Valid from any state. Each step runs even if another had nothing to do.
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.connection.close();
        }
        self.capture.stop();
        self.playback.stop();
        self.speaking.clear();

        if self.state != ConnectionState::Idle {
            tracing::debug!(from = %self.state, "voice session torn down");
        }
        self.set_state(ConnectionState::Idle);
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.speaking.is_speaking()
    }

    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    #[must_use]
    pub const fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    /// Latest published status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receive every status change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Receive each lifecycle state as it is entered
    ///
    /// Unlike [`SessionController::subscribe`], intermediate states are not
    /// coalesced.
    #[must_use]
    pub fn transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }

    fn report(&mut self, error: &Error) {
        self.error = Some(error.user_message());
        self.publish();
    }

    fn set_state(&mut self, state: ConnectionState) {
        if state != self.state {
            let _ = self.transitions.send(state);
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(SessionStatus {
            state: self.state,
            speaking: self.speaking.is_speaking(),
            error: self.error.clone(),
            transcript: self.transcript.clone(),
        });
    }
}

async fn wait_for_open(inbound: &mut mpsc::Receiver<ServerEvent>) -> Result<()> {
    loop {
        match inbound.recv().await {
            Some(ServerEvent::Open) => return Ok(()),
            Some(ServerEvent::Error(message)) => return Err(Error::Connection(message)),
            Some(ServerEvent::Closed { reason }) => {
                return Err(Error::Connection(
                    reason.unwrap_or_else(|| "closed before opening".to_string()),
                ));
            }
            None => {
                return Err(Error::Connection(
                    "connection ended before opening".to_string(),
                ));
            }
            Some(other) => tracing::debug!(event = ?other, "ignoring event before open"),
        }
    }
}

/// Runs on the audio thread; never blocks
fn queue_chunk(tx: &mpsc::Sender<EncodedAudioChunk>, chunk: EncodedAudioChunk) {
    match tx.try_send(chunk) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            tracing::warn!(capacity = CAPTURE_QUEUE_CAPACITY, "capture queue full, dropping chunk");
        }
        Err(TrySendError::Closed(_)) => tracing::trace!("capture queue closed"),
    }
}

async fn send_audio(connection: &LiveConnection, chunk: EncodedAudioChunk) {
    if let Err(e) = connection
        .outbound
        .send(ClientCommand::RealtimeAudio(chunk))
        .await
    {
        tracing::warn!(error = %e, "failed to forward audio chunk");
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
