//! Inbound event normalization.
//!
//! Turns one provider message event into an [`InboundEvent`]. Rules, in
//! order:
//!
//! 1. our own outbound echoes are ignorable
//! 2. events with neither a text body nor a recognized reply are ignorable
//! 3. group chats are ignorable
//! 4. button and list replies become interactive replies; anything else
//!    with a body is text
//!
//! Reply ids arrive namespaced by the provider (`ButtonsV3:btn_1`); the
//! logical id is everything after the last `:`.

use chatflow_conversation::MessageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

const GROUP_SUFFIX: &str = "@g.us";

/// A webhook delivery: zero or more message events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    /// Raw events, kept verbatim for the execution log.
    #[serde(default)]
    pub messages: Vec<JsonValue>,
}

/// One provider message event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    /// Unix seconds, sent as a number or a numeric string.
    #[serde(default, deserialize_with = "lenient_unix_seconds")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub reply: Option<Reply>,
    #[serde(default)]
    pub button: Option<LegacyButton>,
    #[serde(default)]
    pub context: Option<ReplyContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reply {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub buttons_reply: Option<ReplyOption>,
    #[serde(default)]
    pub list_reply: Option<ReplyOption>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyOption {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// The single-button field older provider versions send.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyButton {
    #[serde(default, alias = "payload")]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyContext {
    /// Provider id of the message being replied to.
    #[serde(default)]
    pub quoted_id: Option<String>,
}

// Unreadable timestamps become `None` instead of failing the whole event.
fn lenient_unix_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Number(number)) => number.as_i64(),
        Some(JsonValue::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

/// Why an event was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OwnMessage,
    NoContent,
    GroupChat,
    NoSender,
    Malformed,
}

/// A participant text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEvent {
    pub phone: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// A button or list reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEvent {
    pub phone: String,
    pub kind: MessageKind,
    /// Id as delivered, including any provider namespace.
    pub raw_id: String,
    /// Id used for edge matching.
    pub reply_id: String,
    pub title: Option<String>,
    /// Provider id of the message the participant replied to.
    pub quoted_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A classified inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Ignorable(IgnoreReason),
    Text(TextEvent),
    InteractiveReply(ReplyEvent),
}

impl InboundEvent {
    /// Decodes and classifies one raw event.
    ///
    /// `received_at` stands in for a missing or invalid event timestamp.
    #[must_use]
    pub fn from_raw(raw: &JsonValue, received_at: DateTime<Utc>) -> Self {
        match ProviderMessage::deserialize(raw) {
            Ok(message) => classify(&message, received_at),
            Err(_) => Self::Ignorable(IgnoreReason::Malformed),
        }
    }

    /// Returns the participant phone, if the event has one.
    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        match self {
            Self::Ignorable(_) => None,
            Self::Text(event) => Some(&event.phone),
            Self::InteractiveReply(event) => Some(&event.phone),
        }
    }
}

/// Classifies one provider message.
#[must_use]
pub fn classify(message: &ProviderMessage, received_at: DateTime<Utc>) -> InboundEvent {
    if message.from_me {
        return InboundEvent::Ignorable(IgnoreReason::OwnMessage);
    }

    let body = message
        .text
        .as_ref()
        .map(|text| text.body.trim())
        .filter(|body| !body.is_empty());
    let reply = reply_of(message);
    if body.is_none() && reply.is_none() {
        return InboundEvent::Ignorable(IgnoreReason::NoContent);
    }

    let chat = message.chat_id.as_deref().or(message.from.as_deref()).unwrap_or_default();
    if chat.ends_with(GROUP_SUFFIX) {
        return InboundEvent::Ignorable(IgnoreReason::GroupChat);
    }
    let phone = participant(chat);
    if phone.is_empty() {
        return InboundEvent::Ignorable(IgnoreReason::NoSender);
    }

    let timestamp = message
        .timestamp
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or(received_at);

    match (reply, body) {
        (Some((kind, raw_id, title)), _) => InboundEvent::InteractiveReply(ReplyEvent {
            phone,
            kind,
            reply_id: logical_reply_id(&raw_id).to_string(),
            raw_id,
            title,
            quoted_id: message
                .context
                .as_ref()
                .and_then(|context| context.quoted_id.clone()),
            timestamp,
        }),
        (None, Some(body)) => InboundEvent::Text(TextEvent {
            phone,
            body: body.to_string(),
            timestamp,
        }),
        (None, None) => InboundEvent::Ignorable(IgnoreReason::NoContent),
    }
}

/// Strips the provider namespace from a reply id.
#[must_use]
pub fn logical_reply_id(raw_id: &str) -> &str {
    raw_id.rsplit_once(':').map_or(raw_id, |(_, id)| id)
}

fn reply_of(message: &ProviderMessage) -> Option<(MessageKind, String, Option<String>)> {
    if let Some(reply) = &message.reply {
        let (kind, option) = match reply.kind.as_str() {
            "buttons_reply" => (MessageKind::ButtonReply, reply.buttons_reply.as_ref()),
            "list_reply" => (MessageKind::ListReply, reply.list_reply.as_ref()),
            _ => (MessageKind::ButtonReply, None),
        };
        if let Some(option) = option.filter(|option| !option.id.is_empty()) {
            return Some((kind, option.id.clone(), option.title.clone()));
        }
    }
    let button = message.button.as_ref()?;
    let id = button.id.as_deref().filter(|id| !id.is_empty())?;
    Some((MessageKind::ButtonReply, id.to_string(), button.text.clone()))
}

// "919800000001@s.whatsapp.net" -> "919800000001"
fn participant(chat: &str) -> String {
    chat.split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}
