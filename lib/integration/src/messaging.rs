//! The messaging provider send API.
//!
//! Every send returns the provider's message id. Interactive message ids
//! are what later replies quote, so callers record them.

use crate::error::MessagingError;
use async_trait::async_trait;
use chatflow_workflow::MediaType;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::time::Duration;
use tracing::{debug, instrument};

/// Default provider base URL.
pub const DEFAULT_BASE_URL: &str = "https://gate.whapi.cloud";

/// An interactive message (buttons, list or carousel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveMessage {
    /// Provider layout: `button`, `list` or `carousel`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<JsonValue>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    /// Layout-specific action object (buttons, list sections, cards).
    pub action: JsonValue,
    /// Media shown with the message, for media quick replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

/// A media message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMessage {
    pub media_type: MediaType,
    pub url: String,
    pub caption: Option<String>,
    pub filename: Option<String>,
}

/// A location pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMessage {
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Sends messages through the provider.
///
/// `token` is the channel's send token; `to` is the participant phone.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Sends a text message.
    async fn send_text(
        &self,
        token: &str,
        to: &str,
        body: &str,
    ) -> Result<String, Report<MessagingError>>;

    /// Sends an interactive message.
    async fn send_interactive(
        &self,
        token: &str,
        to: &str,
        message: &InteractiveMessage,
    ) -> Result<String, Report<MessagingError>>;

    /// Sends a media message.
    async fn send_media(
        &self,
        token: &str,
        to: &str,
        message: &MediaMessage,
    ) -> Result<String, Report<MessagingError>>;

    /// Sends a location.
    async fn send_location(
        &self,
        token: &str,
        to: &str,
        message: &LocationMessage,
    ) -> Result<String, Report<MessagingError>>;
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    sent: bool,
    message: Option<SentMessage>,
}

#[derive(Deserialize)]
struct SentMessage {
    id: String,
}

/// HTTP client for a Whapi-style messaging gateway.
#[derive(Debug, Clone)]
pub struct WhapiClient {
    client: reqwest::Client,
    base_url: String,
}

impl WhapiClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, MessagingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MessagingError::Transport {
                details: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    #[instrument(skip(self, token, payload))]
    async fn post(
        &self,
        route: &str,
        token: &str,
        payload: &JsonValue,
    ) -> Result<String, Report<MessagingError>> {
        let response = self
            .client
            .post(format!("{}/messages/{route}", self.base_url))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await
            .map_err(|e| MessagingError::Transport {
                details: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(MessagingError::Provider {
                status: status.as_u16(),
                details,
            }
            .into());
        }

        let body: SendResponse =
            response
                .json()
                .await
                .map_err(|e| MessagingError::InvalidResponse {
                    details: e.to_string(),
                })?;
        match body.message {
            Some(message) if body.sent => {
                debug!(message_id = %message.id, "message sent");
                Ok(message.id)
            }
            _ => Err(MessagingError::InvalidResponse {
                details: "message was not sent".to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl MessagingClient for WhapiClient {
    async fn send_text(
        &self,
        token: &str,
        to: &str,
        body: &str,
    ) -> Result<String, Report<MessagingError>> {
        self.post("text", token, &json!({"to": to, "body": body}))
            .await
    }

    async fn send_interactive(
        &self,
        token: &str,
        to: &str,
        message: &InteractiveMessage,
    ) -> Result<String, Report<MessagingError>> {
        let mut payload = serde_json::to_value(message).map_err(|e| {
            MessagingError::InvalidResponse {
                details: e.to_string(),
            }
        })?;
        if let Some(object) = payload.as_object_mut() {
            object.insert("to".to_string(), json!(to));
            if let Some(body) = object.remove("body") {
                object.insert("body".to_string(), json!({"text": body}));
            }
            if let Some(footer) = object.remove("footer") {
                object.insert("footer".to_string(), json!({"text": footer}));
            }
        }
        self.post("interactive", token, &payload).await
    }

    async fn send_media(
        &self,
        token: &str,
        to: &str,
        message: &MediaMessage,
    ) -> Result<String, Report<MessagingError>> {
        let mut payload = json!({"to": to, "media": message.url});
        if let Some(object) = payload.as_object_mut() {
            if let Some(caption) = &message.caption {
                object.insert("caption".to_string(), json!(caption));
            }
            if let Some(filename) = &message.filename {
                object.insert("filename".to_string(), json!(filename));
            }
        }
        self.post(message.media_type.as_str(), token, &payload)
            .await
    }

    async fn send_location(
        &self,
        token: &str,
        to: &str,
        message: &LocationMessage,
    ) -> Result<String, Report<MessagingError>> {
        let mut payload = json!({
            "to": to,
            "latitude": message.latitude,
            "longitude": message.longitude,
        });
        if let Some(object) = payload.as_object_mut() {
            if let Some(name) = &message.name {
                object.insert("name".to_string(), json!(name));
            }
            if let Some(address) = &message.address {
                object.insert("address".to_string(), json!(address));
            }
        }
        self.post("location", token, &payload).await
    }
}
