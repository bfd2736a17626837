//! Bidirectional streaming session with the conversational voice service
//!
//! A [`LiveConnector`] opens a [`LiveConnection`]: a pair of channels to a
//! background task that owns the socket. Commands go out through
//! `outbound`, and everything the service says comes back as
//! [`ServerEvent`]s on `inbound`.

mod client;
pub mod messages;

pub use client::{DEFAULT_LIVE_ENDPOINT, GeminiLiveConnector};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::Result;
use crate::voice::EncodedAudioChunk;

/// Session parameters sent in the setup message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSetup {
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
}

impl LiveSetup {
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        voice_name: impl Into<String>,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            voice_name: voice_name.into(),
            system_instruction: system_instruction.into(),
        }
    }
}

/// Commands sent to the connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Stream one captured microphone block
    RealtimeAudio(EncodedAudioChunk),
    /// Close the socket and end the task
    Close,
}

/// Everything the remote session can report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Transport is open and the setup message has been sent
    Open,
    /// Service accepted the setup; audio may now flow
    SetupComplete,
    /// One block of model speech
    AudioChunk(EncodedAudioChunk),
    /// Text emitted alongside the model's turn
    TextFragment(String),
    /// User barged in; queued model speech should be discarded
    Interrupted,
    /// Model finished its turn
    TurnComplete,
    /// Socket closed
    Closed { reason: Option<String> },
    /// Transport failure
    Error(String),
}

/// Handle to an open remote session
pub struct LiveConnection {
    pub outbound: mpsc::Sender<ClientCommand>,
    pub inbound: mpsc::Receiver<ServerEvent>,
    task: Option<JoinHandle<()>>,
}

impl LiveConnection {
    /// Wrap a channel pair with no background task attached
    #[must_use]
    pub const fn new(
        outbound: mpsc::Sender<ClientCommand>,
        inbound: mpsc::Receiver<ServerEvent>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            task: None,
        }
    }

    /// Attach the task driving the socket
    #[must_use]
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Ask the task to close the socket; aborts it if it is no longer listening
    pub fn close(mut self) {
        if let Err(e) = self.outbound.try_send(ClientCommand::Close) {
            tracing::debug!(error = %e, "connection task not accepting close");
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }
}

/// Opens remote sessions
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Fail early when credentials are missing, before any resource is opened
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the connector cannot authenticate
    fn check_credentials(&self) -> Result<()> {
        Ok(())
    }

    /// Start opening a session
    ///
    /// The returned connection reports [`ServerEvent::Open`] once the
    /// transport is up, or [`ServerEvent::Error`] if it never comes up.
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be started at all
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveConnection>;
}
