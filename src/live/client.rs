//! Gemini Live websocket connector
//!
//! ```text
//! ┌──────────────┐  ClientCommand   ┌─────────────────┐
//! │  controller  │─────────────────▶│  socket task    │◀──▶ wss://…BidiGenerateContent
//! │              │◀─────────────────│  (tokio::spawn) │
//! └──────────────┘   ServerEvent    └─────────────────┘
//! ```

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use super::messages::{RealtimeInputMessage, ServerMessage, SetupMessage};
use super::{ClientCommand, LiveConnection, LiveConnector, LiveSetup, ServerEvent};
use crate::{Error, Result};

/// Default websocket endpoint for the Live API
pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Connector for the hosted Gemini Live service
pub struct GeminiLiveConnector {
    api_key: Option<SecretString>,
    endpoint: String,
}

impl GeminiLiveConnector {
    #[must_use]
    pub fn new(api_key: Option<SecretString>, endpoint: Option<String>) -> Self {
        Self {
            api_key,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_LIVE_ENDPOINT.to_string()),
        }
    }

    /// Endpoint with the API key attached
    fn session_url(&self) -> Result<Url> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("GEMINI_API_KEY is not set".to_string()))?;

        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid live endpoint: {e}")))?;
        url.query_pairs_mut().append_pair("key", key.expose_secret());
        Ok(url)
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    fn check_credentials(&self) -> Result<()> {
        self.session_url().map(|_| ())
    }

    async fn connect(&self, setup: &LiveSetup) -> Result<LiveConnection> {
        let url = self.session_url()?;
        let setup_json = serde_json::to_string(&SetupMessage::new(setup))?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        tracing::debug!(model = %setup.model, voice = %setup.voice_name, "opening live session");
        let task = tokio::spawn(run_socket(url, setup_json, command_rx, event_tx));

        Ok(LiveConnection::new(command_tx, event_rx).with_task(task))
    }
}

/// Own the socket for the lifetime of one session
async fn run_socket(
    url: Url,
    setup_json: String,
    commands: mpsc::Receiver<ClientCommand>,
    events: mpsc::Sender<ServerEvent>,
) {
    match drive_socket(url, setup_json, commands, &events).await {
        Ok(()) => tracing::info!("live session closed"),
        Err(e) => {
            tracing::error!(error = %e, "live session failed");
            let _ = events.send(ServerEvent::Error(e.to_string())).await;
        }
    }
}

async fn drive_socket(
    url: Url,
    setup_json: String,
    mut commands: mpsc::Receiver<ClientCommand>,
    events: &mpsc::Sender<ServerEvent>,
) -> Result<()> {
    let (ws_stream, _response) = connect_async(url.as_str()).await?;
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    ws_sink.send(Message::Text(setup_json.into())).await?;

    tracing::info!("live session open");
    if events.send(ServerEvent::Open).await.is_err() {
        return Ok(());
    }

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(ClientCommand::RealtimeAudio(chunk)) => {
                        let json = match serde_json::to_string(&RealtimeInputMessage::audio(chunk)) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize audio chunk");
                                continue;
                            }
                        };
                        ws_sink.send(Message::Text(json.into())).await?;
                    }
                    Some(ClientCommand::Close) | None => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }

            message = ws_stream.next() => {
                match message {
                    Some(Ok(msg)) => {
                        let Some(batch) = frame_to_events(msg) else {
                            continue;
                        };
                        let closed = batch.iter().any(|e| matches!(e, ServerEvent::Closed { .. }));
                        for event in batch {
                            if events.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                        if closed {
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        let _ = events.send(ServerEvent::Closed { reason: None }).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Translate one websocket frame; `None` for frames with nothing to report
fn frame_to_events(message: Message) -> Option<Vec<ServerEvent>> {
    let payload = match &message {
        Message::Text(text) => text.as_str(),
        Message::Binary(data) => match std::str::from_utf8(data) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring non-utf8 binary frame");
                return None;
            }
        },
        Message::Close(frame) => {
            let reason = frame
                .as_ref()
                .map(|f| f.reason.to_string())
                .filter(|r| !r.is_empty());
            tracing::debug!(reason = ?reason, "received close frame");
            return Some(vec![ServerEvent::Closed { reason }]);
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return None,
    };

    match ServerMessage::parse(payload) {
        Ok(msg) => Some(msg.into_events()),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unparseable server message");
            None
        }
    }
}
