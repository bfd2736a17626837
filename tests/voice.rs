//! Voice pipeline integration tests
//!
//! Drives the session controller against a fake microphone, a fake speaker
//! with a manual clock and a scripted live service.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use nguru::live::{ClientCommand, LiveSetup, ServerEvent};
use nguru::voice::{
    CAPTURE_BLOCK_SIZE, CAPTURE_SAMPLE_RATE, ConnectionState, EncodedAudioChunk,
    PLAYBACK_SAMPLE_RATE, SessionController,
};
use nguru::Error;

mod common;

use common::{FakeMic, FakeSpeaker, Handshake, ScriptedConnector};

struct Rig {
    controller: SessionController,
    connector: ScriptedConnector,
    mic: FakeMic,
    speaker: FakeSpeaker,
}

fn rig_with(connector: ScriptedConnector, mic: FakeMic) -> Rig {
    let speaker = FakeSpeaker::new();
    let controller = SessionController::new(
        Arc::new(connector.clone()),
        Arc::new(mic.clone()),
        Arc::new(speaker.clone()),
        LiveSetup::new("test-live-model", "Kore", "Be warm."),
    );
    Rig {
        controller,
        connector,
        mic,
        speaker,
    }
}

fn rig() -> Rig {
    rig_with(ScriptedConnector::new(Handshake::Open), FakeMic::new())
}

/// One full capture block of a constant level
fn block(level: f32) -> Vec<f32> {
    vec![level; CAPTURE_BLOCK_SIZE]
}

/// 100ms of model speech
fn speech() -> EncodedAudioChunk {
    EncodedAudioChunk::from_samples(&vec![0.2; 2400], PLAYBACK_SAMPLE_RATE)
}

async fn step(controller: &mut SessionController) {
    tokio::time::timeout(Duration::from_secs(5), controller.step())
        .await
        .expect("controller did not make progress");
}

fn entered(transitions: &mut broadcast::Receiver<ConnectionState>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(state) = transitions.try_recv() {
        states.push(state);
    }
    states
}

fn audio_sent(commands: &[ClientCommand]) -> Vec<&EncodedAudioChunk> {
    commands
        .iter()
        .filter_map(|c| match c {
            ClientCommand::RealtimeAudio(chunk) => Some(chunk),
            ClientCommand::Close => None,
        })
        .collect()
}

#[tokio::test]
async fn test_connect_opens_session_and_microphone() {
    let mut rig = rig();

    rig.controller.connect().await.unwrap();

    assert_eq!(rig.controller.state(), ConnectionState::Connected);
    assert!(rig.mic.is_open());
    assert_eq!(rig.speaker.opens(), 1);
    assert_eq!(rig.connector.connects(), 1);

    let setup = &rig.connector.setups()[0];
    assert_eq!(setup.voice_name, "Kore");
    assert_eq!(setup.system_instruction, "Be warm.");
}

#[tokio::test]
async fn test_captured_block_is_forwarded_once() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let mut remote = rig.connector.remote();

    remote.send(ServerEvent::SetupComplete).await;
    step(&mut rig.controller).await;

    assert!(rig.mic.speak(&block(0.5)));
    step(&mut rig.controller).await;

    let commands = remote.drain();
    let sent = audio_sent(&commands);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].mime_type(), format!("audio/pcm;rate={CAPTURE_SAMPLE_RATE}"));
    assert_eq!(sent[0].decode_samples().unwrap().len(), CAPTURE_BLOCK_SIZE);
}

#[tokio::test]
async fn test_partial_block_is_not_sent() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let mut remote = rig.connector.remote();
    remote.send(ServerEvent::SetupComplete).await;
    step(&mut rig.controller).await;

    rig.mic.speak(&[0.1; 100]);
    rig.controller.disconnect();

    assert!(audio_sent(&remote.drain()).is_empty());
}

#[tokio::test]
async fn test_chunks_before_setup_are_flushed_in_order() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let mut remote = rig.connector.remote();

    rig.mic.speak(&block(0.25));
    rig.mic.speak(&block(-0.25));
    step(&mut rig.controller).await;
    step(&mut rig.controller).await;
    assert!(audio_sent(&remote.drain()).is_empty());

    remote.send(ServerEvent::SetupComplete).await;
    step(&mut rig.controller).await;

    let commands = remote.drain();
    let sent = audio_sent(&commands);
    assert_eq!(sent.len(), 2);
    assert!(sent[0].decode_samples().unwrap()[0] > 0.0);
    assert!(sent[1].decode_samples().unwrap()[0] < 0.0);
}

#[tokio::test]
async fn test_back_to_back_chunks_play_without_gap() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let remote = rig.connector.remote();

    rig.speaker.set_time(1.0);
    remote.send(ServerEvent::AudioChunk(speech())).await;
    remote.send(ServerEvent::AudioChunk(speech())).await;
    step(&mut rig.controller).await;
    step(&mut rig.controller).await;

    let scheduled = rig.speaker.scheduled();
    assert_eq!(scheduled.len(), 2);
    assert!((scheduled[0].start - 1.0).abs() < 1e-9);
    assert!((scheduled[1].start - 1.1).abs() < 1e-9);
    assert!(rig.controller.is_speaking());
    assert!(rig.controller.status().speaking);
}

#[tokio::test]
async fn test_chunk_arriving_mid_playback_starts_when_previous_ends() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let remote = rig.connector.remote();
    let long_speech = || EncodedAudioChunk::from_samples(&vec![0.2; 4800], PLAYBACK_SAMPLE_RATE);

    rig.speaker.set_time(0.0);
    remote.send(ServerEvent::AudioChunk(long_speech())).await;
    step(&mut rig.controller).await;

    rig.speaker.set_time(0.1);
    remote.send(ServerEvent::AudioChunk(long_speech())).await;
    step(&mut rig.controller).await;

    let scheduled = rig.speaker.scheduled();
    assert_eq!(scheduled.len(), 2);
    assert!(scheduled[0].start.abs() < f64::EPSILON);
    assert!((scheduled[1].start - 0.2).abs() < f64::EPSILON);
    assert_eq!(scheduled[1].samples, 4800);
}

#[tokio::test]
async fn test_missing_credentials_never_leave_idle() {
    let mut rig = rig_with(ScriptedConnector::without_credentials(), FakeMic::new());
    let mut transitions = rig.controller.transitions();

    rig.controller.connect().await.unwrap_err();

    assert!(entered(&mut transitions).is_empty());
}

#[tokio::test]
async fn test_schedule_never_falls_behind_clock() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let remote = rig.connector.remote();

    for now in [0.0, 0.05, 0.4, 0.41, 2.0, 2.0] {
        rig.speaker.set_time(now);
        remote.send(ServerEvent::AudioChunk(speech())).await;
        step(&mut rig.controller).await;
    }

    let scheduled = rig.speaker.scheduled();
    let clock = [0.0, 0.05, 0.4, 0.41, 2.0, 2.0];
    for (i, entry) in scheduled.iter().enumerate() {
        assert!(entry.start >= clock[i]);
        if i > 0 {
            assert!(entry.start >= scheduled[i - 1].start + 0.1 - 1e-9);
        }
    }
}

#[tokio::test]
async fn test_interruption_flushes_playback_and_clears_speaking() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let remote = rig.connector.remote();

    for _ in 0..3 {
        remote.send(ServerEvent::AudioChunk(speech())).await;
        step(&mut rig.controller).await;
    }
    assert!(rig.controller.is_speaking());
    assert!((rig.controller.playback().cursor() - 0.3).abs() < 1e-9);

    rig.speaker.set_time(0.12);
    remote.send(ServerEvent::Interrupted).await;
    step(&mut rig.controller).await;

    assert!(!rig.controller.is_speaking());
    assert!(!rig.controller.status().speaking);
    assert_eq!(rig.speaker.closes(), 1);
    assert_eq!(rig.speaker.opens(), 2);
    assert!((rig.controller.playback().cursor() - 0.12).abs() < 1e-9);

    remote.send(ServerEvent::AudioChunk(speech())).await;
    step(&mut rig.controller).await;
    let last = rig.speaker.scheduled().last().copied().unwrap();
    assert!((last.start - 0.12).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_speaking_clears_after_hold() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let remote = rig.connector.remote();

    remote.send(ServerEvent::AudioChunk(speech())).await;
    step(&mut rig.controller).await;
    assert!(rig.controller.is_speaking());

    // Nothing else arrives, so the next event is the hold running out
    step(&mut rig.controller).await;
    assert!(!rig.controller.is_speaking());
    assert_eq!(rig.controller.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_text_fragments_build_transcript() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let remote = rig.connector.remote();

    remote
        .send(ServerEvent::TextFragment("Light bends ".to_string()))
        .await;
    remote
        .send(ServerEvent::TextFragment("in water.".to_string()))
        .await;
    remote.send(ServerEvent::TurnComplete).await;
    for _ in 0..3 {
        step(&mut rig.controller).await;
    }

    assert_eq!(rig.controller.transcript(), "Light bends in water.");
    assert_eq!(rig.controller.status().transcript, "Light bends in water.");
}

#[tokio::test]
async fn test_permission_denied_rolls_back_to_idle() {
    let mut rig = rig_with(ScriptedConnector::new(Handshake::Open), FakeMic::denied());
    let mut transitions = rig.controller.transitions();

    let err = rig.controller.connect().await.unwrap_err();

    assert!(matches!(err, Error::Device(_)));
    assert_eq!(rig.controller.state(), ConnectionState::Idle);
    assert_eq!(
        entered(&mut transitions),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Error,
            ConnectionState::Idle,
        ]
    );
    let status = rig.controller.status();
    assert_eq!(status.state, ConnectionState::Idle);
    assert_eq!(status.error, Some(err.user_message()));
    assert!(status.error.unwrap().contains("Microphone"));

    let mut remote = rig.connector.remote();
    assert_eq!(remote.drain(), vec![ClientCommand::Close]);
    assert_eq!(rig.speaker.closes(), 1);
}

#[tokio::test]
async fn test_missing_credentials_open_nothing() {
    let mut rig = rig_with(ScriptedConnector::without_credentials(), FakeMic::new());

    let err = rig.controller.connect().await.unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(rig.controller.state(), ConnectionState::Idle);
    assert_eq!(rig.connector.connects(), 0);
    assert_eq!(rig.speaker.opens(), 0);
    assert_eq!(rig.mic.opens(), 0);
}

#[tokio::test]
async fn test_handshake_failure_reports_connection_error() {
    let mut rig = rig_with(
        ScriptedConnector::new(Handshake::Fail("403 forbidden".to_string())),
        FakeMic::new(),
    );
    let mut transitions = rig.controller.transitions();

    let err = rig.controller.connect().await.unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(rig.controller.state(), ConnectionState::Idle);
    assert_eq!(
        entered(&mut transitions),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Idle,
        ]
    );
    assert_eq!(
        rig.controller.status().error.as_deref(),
        Some("Connection lost. Please try again.")
    );
    assert_eq!(rig.mic.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_open_times_out() {
    let mut rig = rig_with(ScriptedConnector::new(Handshake::Silent), FakeMic::new());

    let err = rig.controller.connect().await.unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(rig.controller.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_connect_twice_is_invalid() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();

    let err = rig.controller.connect().await.unwrap_err();

    assert!(matches!(err, Error::InvalidState(_)));
    assert_eq!(rig.controller.state(), ConnectionState::Connected);
    assert_eq!(rig.connector.connects(), 1);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let mut rig = rig();
    rig.controller.disconnect();
    assert_eq!(rig.controller.state(), ConnectionState::Idle);

    rig.controller.connect().await.unwrap();
    rig.controller.disconnect();
    rig.controller.disconnect();

    assert_eq!(rig.controller.state(), ConnectionState::Idle);
    assert!(!rig.mic.is_open());
    assert!(!rig.controller.playback().is_active());
    assert!(rig.controller.playback().cursor().abs() < f64::EPSILON);

    let mut remote = rig.connector.remote();
    assert_eq!(remote.drain(), vec![ClientCommand::Close]);

    // A fresh session can follow
    rig.controller.connect().await.unwrap();
    assert_eq!(rig.controller.state(), ConnectionState::Connected);
    assert_eq!(rig.connector.connects(), 2);
}

#[tokio::test]
async fn test_remote_error_ends_session() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let remote = rig.connector.remote();

    remote
        .send(ServerEvent::Error("socket reset".to_string()))
        .await;
    rig.controller.run(std::future::pending()).await;

    assert_eq!(rig.controller.state(), ConnectionState::Idle);
    assert_eq!(
        rig.controller.status().error.as_deref(),
        Some("Connection lost. Please try again.")
    );
    assert!(!rig.mic.is_open());
}

#[tokio::test]
async fn test_remote_close_ends_session_quietly() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let remote = rig.connector.remote();

    remote.send(ServerEvent::Closed { reason: None }).await;
    rig.controller.run(std::future::pending()).await;

    assert_eq!(rig.controller.state(), ConnectionState::Idle);
    assert!(rig.controller.status().error.is_none());
}

#[tokio::test]
async fn test_shutdown_tears_down() {
    let mut rig = rig();
    rig.controller.connect().await.unwrap();
    let mut remote = rig.connector.remote();

    rig.controller.run(async {}).await;

    assert_eq!(rig.controller.state(), ConnectionState::Idle);
    assert!(!rig.mic.is_open());
    assert_eq!(remote.drain(), vec![ClientCommand::Close]);
}

#[tokio::test]
async fn test_status_updates_are_published() {
    let mut rig = rig();
    let mut status = rig.controller.subscribe();

    rig.controller.connect().await.unwrap();
    assert!(status.has_changed().unwrap());
    assert_eq!(
        status.borrow_and_update().state,
        ConnectionState::Connected
    );

    rig.controller.disconnect();
    assert_eq!(status.borrow_and_update().state, ConnectionState::Idle);
}
