//! Learner profiles and chat history
//!
//! Two interchangeable backends implement [`ProfileStore`]: a local `SQLite`
//! file and the Firestore REST API.

pub mod cloud;
pub mod local;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Config, Result};

pub use cloud::CloudStore;
pub use local::LocalStore;

/// What the learner told Nguru about how they like to learn
///
/// Every field is optional; saving a profile only overwrites the fields
/// that are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wonder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excitement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dislikes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_confusion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_onboarded: Option<bool>,
}

/// One learning-style answer on a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    Wonder,
    Excitement,
    ExplanationStyle,
    Dislikes,
    AgeGroup,
    RecentConfusion,
}

impl ProfileField {
    pub const ALL: [Self; 6] = [
        Self::Wonder,
        Self::Excitement,
        Self::ExplanationStyle,
        Self::Dislikes,
        Self::AgeGroup,
        Self::RecentConfusion,
    ];

    /// Key used in stored documents
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Wonder => "wonder",
            Self::Excitement => "excitement",
            Self::ExplanationStyle => "explanationStyle",
            Self::Dislikes => "dislikes",
            Self::AgeGroup => "ageGroup",
            Self::RecentConfusion => "recentConfusion",
        }
    }

    /// Label used when describing the learner to the model
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Wonder => "Wonder",
            Self::Excitement => "Excitement",
            Self::ExplanationStyle => "Explanation Style",
            Self::Dislikes => "Dislikes",
            Self::AgeGroup => "Age Group",
            Self::RecentConfusion => "Recent Confusion",
        }
    }
}

impl Profile {
    #[must_use]
    pub fn get(&self, field: ProfileField) -> Option<&str> {
        match field {
            ProfileField::Wonder => self.wonder.as_deref(),
            ProfileField::Excitement => self.excitement.as_deref(),
            ProfileField::ExplanationStyle => self.explanation_style.as_deref(),
            ProfileField::Dislikes => self.dislikes.as_deref(),
            ProfileField::AgeGroup => self.age_group.as_deref(),
            ProfileField::RecentConfusion => self.recent_confusion.as_deref(),
        }
    }

    pub fn set(&mut self, field: ProfileField, value: impl Into<String>) {
        let value = Some(value.into());
        match field {
            ProfileField::Wonder => self.wonder = value,
            ProfileField::Excitement => self.excitement = value,
            ProfileField::ExplanationStyle => self.explanation_style = value,
            ProfileField::Dislikes => self.dislikes = value,
            ProfileField::AgeGroup => self.age_group = value,
            ProfileField::RecentConfusion => self.recent_confusion = value,
        }
    }

    /// Overlay every field that is set on `update`
    pub fn merge(&mut self, update: Self) {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if update.$field.is_some() {
                    self.$field = update.$field;
                })*
            };
        }
        overlay!(
            wonder,
            excitement,
            explanation_style,
            dislikes,
            age_group,
            recent_confusion,
            is_onboarded
        );
    }

    #[must_use]
    pub fn is_onboarded(&self) -> bool {
        self.is_onboarded.unwrap_or(false)
    }
}

/// A question asked during onboarding and the field its answer fills
#[derive(Debug, Clone, Copy)]
pub struct OnboardingQuestion {
    pub field: ProfileField,
    pub text: &'static str,
}

pub const ONBOARDING_QUESTIONS: [OnboardingQuestion; 6] = [
    OnboardingQuestion {
        field: ProfileField::Wonder,
        text: "What's one thing in the world you've always wondered about?",
    },
    OnboardingQuestion {
        field: ProfileField::Excitement,
        text: "What topics or subjects make you feel most alive and excited?",
    },
    OnboardingQuestion {
        field: ProfileField::ExplanationStyle,
        text: "How do you love explanations best: super simple, with fun everyday stories, step-by-step, or cool analogies?",
    },
    OnboardingQuestion {
        field: ProfileField::Dislikes,
        text: "Are there any ways of learning that don't feel good for you?",
    },
    OnboardingQuestion {
        field: ProfileField::AgeGroup,
        text: "Roughly what age group are you (kid, teen, adult, parent, grandparent)?",
    },
    OnboardingQuestion {
        field: ProfileField::RecentConfusion,
        text: "Tell me one recent moment when you felt 'whoa!' or 'I don't get this'.",
    },
];

/// Who said a chat line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "model" => Some(Self::Model),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One line of text chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Profile and history persistence
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load a learner's profile
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>>;

    /// Save a profile, keeping stored values for fields not set on `profile`
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached
    async fn save_profile(&self, user_id: &str, profile: &Profile) -> Result<()>;

    /// Append one line to the learner's chat history
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached
    async fn append_message(&self, user_id: &str, role: Role, content: &str)
    -> Result<ChatMessage>;

    /// Full chat history, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached
    async fn list_messages(&self, user_id: &str) -> Result<Vec<ChatMessage>>;

    fn name(&self) -> &'static str;
}

/// Open the store the configuration selects
///
/// Firestore when a Firebase project is configured, otherwise the local
/// database under the data directory.
///
/// # Errors
///
/// Returns error if the local database cannot be created
pub fn open(config: &Config) -> Result<Arc<dyn ProfileStore>> {
    if let Some(firebase) = &config.firebase {
        tracing::info!(project = %firebase.project_id, "using firestore profile store");
        return Ok(Arc::new(CloudStore::new(
            firebase.project_id.clone(),
            firebase.api_key.clone(),
            firebase.id_token.clone(),
        )));
    }

    std::fs::create_dir_all(config.data_dir())?;
    let path = config.database_path();
    tracing::info!(path = %path.display(), "using local profile store");
    Ok(Arc::new(LocalStore::open(path)?))
}
