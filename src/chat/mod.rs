//! Text chat with Nguru
//!
//! [`ChatService`] ties a [`TextGenerator`] to a [`ProfileStore`]: it loads
//! the learner's profile and history, asks the model for a reply and keeps
//! the transcript.

mod client;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;

pub use client::{CHAT_TEMPERATURE, GeminiTextClient};
pub use prompt::{DISCOVER_TOPICS, ERROR_REPLY, FALLBACK_REPLY, GREETING, SOUL_PROMPT, Topic};

use crate::store::{ChatMessage, ProfileStore, Role};
use crate::{Error, Result};

/// Produces model replies for a conversation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply to `message` given the earlier turns
    ///
    /// Returns `None` when the model produced no text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Generation` if the service fails
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
        message: &str,
    ) -> Result<Option<String>>;
}

/// Conversation front-end used by the CLI
pub struct ChatService {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn ProfileStore>,
}

impl ChatService {
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>, store: Arc<dyn ProfileStore>) -> Self {
        Self { generator, store }
    }

    /// Stored history, or the greeting if there is none
    ///
    /// The greeting is not written to the store.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    pub async fn open(&self, user_id: &str) -> Result<Vec<ChatMessage>> {
        let history = self.store.list_messages(user_id).await?;
        if history.is_empty() {
            return Ok(vec![ChatMessage::new(Role::Model, GREETING)]);
        }
        Ok(history)
    }

    /// Open a conversation, optionally starting it with a discover topic
    ///
    /// The topic is only sent when the learner has no history; otherwise
    /// this is the same as [`ChatService::open`].
    ///
    /// # Errors
    ///
    /// Same as [`ChatService::open`] and [`ChatService::send`]
    pub async fn start(&self, user_id: &str, topic: Option<&str>) -> Result<Vec<ChatMessage>> {
        let history = self.store.list_messages(user_id).await?;
        if !history.is_empty() {
            return Ok(history);
        }

        match topic {
            Some(topic) => {
                let opening = ChatMessage::new(Role::User, topic);
                let reply = self.send(user_id, topic).await?;
                Ok(std::iter::once(opening).chain(reply).collect())
            }
            None => Ok(vec![ChatMessage::new(Role::Model, GREETING)]),
        }
    }

    /// Send one learner message and return Nguru's reply
    ///
    /// Blank input is ignored and yields `None`. A failed generation yields
    /// [`ERROR_REPLY`], which is shown but not stored.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if the learner has no profile
    /// - store errors while saving the turn
    pub async fn send(&self, user_id: &str, text: &str) -> Result<Option<ChatMessage>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let profile = self
            .store
            .get_profile(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("a profile for {user_id}")))?;

        let history = self.store.list_messages(user_id).await?;
        self.store.append_message(user_id, Role::User, text).await?;

        let instruction = prompt::teacher_instruction(&profile);
        match self.generator.generate(&instruction, &history, text).await {
            Ok(reply) => {
                let reply = reply
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_REPLY.to_string());
                let message = self
                    .store
                    .append_message(user_id, Role::Model, &reply)
                    .await?;
                Ok(Some(message))
            }
            Err(e) => {
                tracing::error!(error = %e, user_id, "failed to generate reply");
                Ok(Some(ChatMessage::new(Role::Model, ERROR_REPLY)))
            }
        }
    }
}
