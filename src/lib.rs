//! Nguru - a warm, curious teacher companion you can talk to
//!
//! This library provides the core functionality for Nguru:
//! - Realtime voice conversations (microphone capture, streaming, gapless playback)
//! - Text chat personalised with the learner's profile
//! - Profile and history storage (local `SQLite` or Firestore)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   CLI (nguru)                        │
//! │   voice  │  chat  │  onboard  │  profile  │  ...    │
//! └──────┬──────────────────┬───────────────────────────┘
//!        │                  │
//! ┌──────▼────────────┐ ┌───▼─────────────┐ ┌───────────┐
//! │ SessionController │ │  ChatService    │─▶ Profile   │
//! │ capture/playback  │ │  (generate)     │ │ Store     │
//! └──────┬────────────┘ └───┬─────────────┘ └───────────┘
//!        │                  │
//! ┌──────▼──────────────────▼───────────────────────────┐
//! │        Gemini Live (websocket)  │  Gemini REST       │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod live;
pub mod store;
pub mod voice;

pub use chat::{ChatService, GeminiTextClient, TextGenerator};
pub use config::Config;
pub use error::{Error, Result};
pub use live::{GeminiLiveConnector, LiveConnector, LiveSetup, ServerEvent};
pub use store::{ChatMessage, Profile, ProfileStore, Role};
pub use voice::{ConnectionState, EncodedAudioChunk, SessionController, SessionStatus};
