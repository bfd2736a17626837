//! Firestore REST backend
//!
//! Layout matches the web app: one `users/{uid}` document per learner and a
//! `users/{uid}/chats` subcollection ordered by `timestamp`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, Profile, ProfileField, ProfileStore, Role};
use crate::{Error, Result};

const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";

/// Profile store backed by a Firebase project's Firestore database
pub struct CloudStore {
    client: Client,
    base_url: String,
    project_id: String,
    api_key: SecretString,
    id_token: Option<SecretString>,
}

impl CloudStore {
    #[must_use]
    pub fn new(project_id: String, api_key: SecretString, id_token: Option<SecretString>) -> Self {
        Self {
            client: Client::new(),
            base_url: FIRESTORE_BASE.to_string(),
            project_id,
            api_key,
            id_token,
        }
    }

    /// Point at a different Firestore host, e.g. the local emulator
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.base_url.trim_end_matches('/'),
            self.project_id
        )
    }

    fn user_url(&self, user_id: &str) -> String {
        format!("{}/users/{user_id}", self.documents_url())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.query(&[("key", self.api_key.expose_secret())]);
        match &self.id_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Store(format!("Firestore {action} failed: {status} - {body}")))
    }
}

#[async_trait]
impl ProfileStore for CloudStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let response = self
            .authorize(self.client.get(self.user_url(user_id)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let document: Document = Self::check(response, "get profile").await?.json().await?;
        Ok(Some(profile_from_fields(&document.fields)))
    }

    async fn save_profile(&self, user_id: &str, profile: &Profile) -> Result<()> {
        let fields = profile_to_fields(profile);
        if fields.is_empty() {
            return Ok(());
        }

        // The update mask limits the write to the fields present, which gives merge semantics
        let mask: Vec<(&str, &str)> = fields
            .keys()
            .map(|key| ("updateMask.fieldPaths", key.as_str()))
            .collect();

        let response = self
            .authorize(self.client.patch(self.user_url(user_id)))
            .query(&mask)
            .json(&Document { fields })
            .send()
            .await?;
        Self::check(response, "save profile").await?;

        tracing::debug!(user_id, "profile saved to firestore");
        Ok(())
    }

    async fn append_message(
        &self,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ChatMessage> {
        let message = ChatMessage::new(role, content);

        let mut fields = BTreeMap::new();
        fields.insert("role".to_string(), Value::string(role.as_str()));
        fields.insert("content".to_string(), Value::string(content));
        fields.insert(
            "timestamp".to_string(),
            Value::timestamp(message.timestamp),
        );

        let response = self
            .authorize(
                self.client
                    .post(format!("{}/chats", self.user_url(user_id))),
            )
            .json(&Document { fields })
            .send()
            .await?;
        Self::check(response, "append message").await?;

        Ok(message)
    }

    async fn list_messages(&self, user_id: &str) -> Result<Vec<ChatMessage>> {
        let query = serde_json::json!({
            "structuredQuery": {
                "from": [{ "collectionId": "chats" }],
                "orderBy": [{ "field": { "fieldPath": "timestamp" }, "direction": "ASCENDING" }]
            }
        });

        let response = self
            .authorize(
                self.client
                    .post(format!("{}:runQuery", self.user_url(user_id))),
            )
            .json(&query)
            .send()
            .await?;

        let rows: Vec<QueryRow> = Self::check(response, "list messages").await?.json().await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.document)
            .filter_map(|doc| message_from_fields(&doc.fields))
            .collect())
    }

    fn name(&self) -> &'static str {
        "firestore"
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    #[serde(default)]
    document: Option<Document>,
}

/// A Firestore typed value; only the kinds this store writes are modelled
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Value {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    boolean_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp_value: Option<String>,
}

impl Value {
    fn string(s: &str) -> Self {
        Self {
            string_value: Some(s.to_string()),
            ..Self::default()
        }
    }

    const fn boolean(b: bool) -> Self {
        Self {
            string_value: None,
            boolean_value: Some(b),
            timestamp_value: None,
        }
    }

    fn timestamp(at: DateTime<Utc>) -> Self {
        Self {
            timestamp_value: Some(at.to_rfc3339()),
            ..Self::default()
        }
    }
}

fn profile_to_fields(profile: &Profile) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();
    for field in ProfileField::ALL {
        if let Some(value) = profile.get(field) {
            fields.insert(field.key().to_string(), Value::string(value));
        }
    }
    if let Some(onboarded) = profile.is_onboarded {
        fields.insert("isOnboarded".to_string(), Value::boolean(onboarded));
    }
    fields
}

fn profile_from_fields(fields: &BTreeMap<String, Value>) -> Profile {
    let mut profile = Profile::default();
    for field in ProfileField::ALL {
        if let Some(value) = fields.get(field.key()).and_then(|v| v.string_value.as_deref()) {
            profile.set(field, value);
        }
    }
    profile.is_onboarded = fields.get("isOnboarded").and_then(|v| v.boolean_value);
    profile
}

fn message_from_fields(fields: &BTreeMap<String, Value>) -> Option<ChatMessage> {
    let role = Role::parse(fields.get("role")?.string_value.as_deref()?)?;
    let content = fields.get("content")?.string_value.clone()?;
    let timestamp = fields
        .get("timestamp")
        .and_then(|v| v.timestamp_value.as_deref())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc));

    Some(ChatMessage {
        role,
        content,
        timestamp,
    })
}
