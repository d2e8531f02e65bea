//! Workflow node types.
//!
//! Nodes are the building blocks of workflows. Each node has:
//! - An id unique within the workflow, authored by the editor
//! - A kind drawn from a closed set, carrying kind-specific configuration
//!
//! Stored documents use the editor's `{"id", "type", "data"}` shape. Unknown
//! type tags and configurations that fail to decode load as
//! [`NodeKind::Unsupported`] instead of failing the whole graph.

use crate::config::{
    BookAppointmentConfig, ButtonsMessageConfig, CarouselConfig, CheckBookingsConfig,
    HttpActionConfig, ListMessageConfig, LocationMessageConfig, MediaHeader, MediaMessageConfig,
    MediaType, QuickReplyConfig, TextMessageConfig,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// A node identifier, unique within one workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The category of a workflow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Sends a message and lets the chain continue.
    Message,
    /// Sends a message with reply options and waits for the customer.
    Interactive,
    /// Performs work and continues along a named outcome.
    Action,
    /// Starts a multi-step booking sub-flow.
    Booking,
    /// Could not be loaded; stops the chain.
    Unsupported,
}

/// The kind of a node together with its configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Text(TextMessageConfig),
    Media(MediaMessageConfig),
    Location(LocationMessageConfig),
    QuickReply(QuickReplyConfig),
    List(ListMessageConfig),
    Buttons(ButtonsMessageConfig),
    Carousel(CarouselConfig),
    HttpAction(HttpActionConfig),
    BookAppointment(BookAppointmentConfig),
    CheckBookings(CheckBookingsConfig),
    /// A node the engine cannot execute.
    Unsupported {
        /// The type tag as stored.
        kind: String,
        /// Why the node could not be loaded.
        reason: String,
    },
}

impl NodeKind {
    /// Decodes a kind from the stored type tag and data object.
    #[must_use]
    pub fn from_parts(tag: &str, data: JsonValue) -> Self {
        match tag {
            "textMessage" => decode(tag, data, Self::Text),
            "mediaMessage" => decode(tag, data, Self::Media),
            "locationMessage" => decode(tag, data, Self::Location),
            "quickReply" => decode(tag, data, Self::QuickReply),
            "quickReplyImage" => decode_media_quick_reply(tag, data, MediaType::Image),
            "quickReplyVideo" => decode_media_quick_reply(tag, data, MediaType::Video),
            "listMessage" => decode(tag, data, Self::List),
            "buttonsMessage" => decode(tag, data, Self::Buttons),
            "carousel" => decode(tag, data, Self::Carousel),
            "httpAction" => decode(tag, data, Self::HttpAction),
            "bookAppointment" => decode(tag, data, Self::BookAppointment),
            "checkBookings" => decode(tag, data, Self::CheckBookings),
            other => Self::Unsupported {
                kind: other.to_string(),
                reason: "unknown node type".to_string(),
            },
        }
    }

    /// Returns the stored type tag for this kind.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        match self {
            Self::Text(_) => "textMessage",
            Self::Media(_) => "mediaMessage",
            Self::Location(_) => "locationMessage",
            Self::QuickReply(config) => match config.media.as_ref().map(|m| m.media_type) {
                Some(MediaType::Video) => "quickReplyVideo",
                Some(_) => "quickReplyImage",
                None => "quickReply",
            },
            Self::List(_) => "listMessage",
            Self::Buttons(_) => "buttonsMessage",
            Self::Carousel(_) => "carousel",
            Self::HttpAction(_) => "httpAction",
            Self::BookAppointment(_) => "bookAppointment",
            Self::CheckBookings(_) => "checkBookings",
            Self::Unsupported { kind, .. } => kind,
        }
    }

    /// Returns the category of this kind.
    #[must_use]
    pub const fn category(&self) -> NodeCategory {
        match self {
            Self::Text(_) | Self::Media(_) | Self::Location(_) => NodeCategory::Message,
            Self::QuickReply(_) | Self::List(_) | Self::Buttons(_) | Self::Carousel(_) => {
                NodeCategory::Interactive
            }
            Self::HttpAction(_) => NodeCategory::Action,
            Self::BookAppointment(_) | Self::CheckBookings(_) => NodeCategory::Booking,
            Self::Unsupported { .. } => NodeCategory::Unsupported,
        }
    }

    /// Returns true if executing this node waits for a customer reply.
    #[must_use]
    pub const fn is_interactive(&self) -> bool {
        matches!(self.category(), NodeCategory::Interactive)
    }

    /// Returns every reply id this node can produce, in authored order.
    #[must_use]
    pub fn reply_ids(&self) -> Vec<&str> {
        match self {
            Self::QuickReply(config) => config.buttons.iter().map(|b| b.id.as_str()).collect(),
            Self::List(config) => config
                .sections
                .iter()
                .flat_map(|section| &section.rows)
                .map(|row| row.id.as_str())
                .collect(),
            Self::Buttons(config) => config.buttons.iter().map(|b| b.id()).collect(),
            Self::Carousel(config) => config
                .cards
                .iter()
                .flat_map(|card| &card.buttons)
                .map(|b| b.id())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns true if this node offers a reply with the given id.
    #[must_use]
    pub fn offers_reply(&self, reply_id: &str) -> bool {
        self.reply_ids().contains(&reply_id)
    }

    fn data(&self) -> JsonValue {
        let encoded = match self {
            Self::Text(config) => serde_json::to_value(config),
            Self::Media(config) => serde_json::to_value(config),
            Self::Location(config) => serde_json::to_value(config),
            Self::QuickReply(config) => serde_json::to_value(config),
            Self::List(config) => serde_json::to_value(config),
            Self::Buttons(config) => serde_json::to_value(config),
            Self::Carousel(config) => serde_json::to_value(config),
            Self::HttpAction(config) => serde_json::to_value(config),
            Self::BookAppointment(config) => serde_json::to_value(config),
            Self::CheckBookings(config) => serde_json::to_value(config),
            Self::Unsupported { .. } => Ok(JsonValue::Null),
        };
        encoded.unwrap_or(JsonValue::Null)
    }
}

fn decode<T: DeserializeOwned>(tag: &str, data: JsonValue, wrap: fn(T) -> NodeKind) -> NodeKind {
    match serde_json::from_value(normalize_data(data)) {
        Ok(config) => wrap(config),
        Err(e) => NodeKind::Unsupported {
            kind: tag.to_string(),
            reason: e.to_string(),
        },
    }
}

fn decode_media_quick_reply(tag: &str, data: JsonValue, media_type: MediaType) -> NodeKind {
    let media_url = data
        .get("mediaUrl")
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    match decode(tag, data, NodeKind::QuickReply) {
        NodeKind::QuickReply(mut config) => {
            match (config.media.as_mut(), media_url) {
                (Some(header), _) => header.media_type = media_type,
                (None, Some(url)) => config.media = Some(MediaHeader { media_type, url }),
                (None, None) => {
                    return NodeKind::Unsupported {
                        kind: tag.to_string(),
                        reason: "missing media url".to_string(),
                    };
                }
            }
            NodeKind::QuickReply(config)
        }
        other => other,
    }
}

// Editors that never touched a node store `null` for its data.
fn normalize_data(data: JsonValue) -> JsonValue {
    if data.is_null() {
        JsonValue::Object(serde_json::Map::new())
    } else {
        data
    }
}

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl Node {
    /// Creates a node.
    #[must_use]
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Returns true if executing this node waits for a customer reply.
    #[must_use]
    pub const fn is_interactive(&self) -> bool {
        self.kind.is_interactive()
    }
}

/// The stored shape of a node.
#[derive(Serialize, Deserialize)]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: JsonValue,
}

impl From<RawNode> for Node {
    fn from(raw: RawNode) -> Self {
        Self {
            kind: NodeKind::from_parts(&raw.kind, raw.data),
            id: raw.id,
        }
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        Self {
            kind: node.kind.type_tag().to_string(),
            data: node.kind.data(),
            id: node.id,
        }
    }
}
