//! Rendering node configuration into provider messages.
//!
//! Message node content is sent exactly as authored; no placeholders are
//! resolved.

use chatflow_booking::FlowMessage;
use chatflow_integration::{InteractiveMessage, LocationMessage, MediaMessage};
use chatflow_workflow::{
    ActionButton, ButtonsMessageConfig, CarouselConfig, ListMessageConfig, MediaHeader, NodeKind,
    QuickReplyConfig,
};
use serde_json::{Value as JsonValue, json};

/// A message ready to hand to the messaging client.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Interactive(InteractiveMessage),
    Media(MediaMessage),
    Location(LocationMessage),
}

impl OutboundMessage {
    /// Returns true for messages the participant can reply to.
    #[must_use]
    pub const fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive(_))
    }
}

/// Renders a message or interactive node. Returns `None` for node kinds
/// that do not send a message of their own.
#[must_use]
pub fn render_node(kind: &NodeKind) -> Option<OutboundMessage> {
    let message = match kind {
        NodeKind::Text(config) => OutboundMessage::Text(config.text.clone()),
        NodeKind::Media(config) => OutboundMessage::Media(MediaMessage {
            media_type: config.media_type,
            url: config.url.clone(),
            caption: config.caption.clone(),
            filename: config.filename.clone(),
        }),
        NodeKind::Location(config) => OutboundMessage::Location(LocationMessage {
            latitude: config.latitude,
            longitude: config.longitude,
            name: config.name.clone(),
            address: config.address.clone(),
        }),
        NodeKind::QuickReply(config) => OutboundMessage::Interactive(quick_reply(config)),
        NodeKind::List(config) => OutboundMessage::Interactive(list(config)),
        NodeKind::Buttons(config) => OutboundMessage::Interactive(buttons(config)),
        NodeKind::Carousel(config) => OutboundMessage::Interactive(carousel(config)),
        NodeKind::HttpAction(_)
        | NodeKind::BookAppointment(_)
        | NodeKind::CheckBookings(_)
        | NodeKind::Unsupported { .. } => return None,
    };
    Some(message)
}

/// Renders a booking sub-flow message.
#[must_use]
pub fn render_flow_message(message: &FlowMessage) -> OutboundMessage {
    match message {
        FlowMessage::Text(text) => OutboundMessage::Text(text.clone()),
        FlowMessage::List(config) => OutboundMessage::Interactive(list(config)),
    }
}

fn text_header(header: Option<&String>) -> Option<JsonValue> {
    header
        .filter(|text| !text.is_empty())
        .map(|text| json!({"text": text}))
}

fn quick_reply(config: &QuickReplyConfig) -> InteractiveMessage {
    let buttons: Vec<JsonValue> = config
        .buttons
        .iter()
        .map(|b| json!({"type": "quick_reply", "id": b.id, "title": b.title}))
        .collect();
    InteractiveMessage {
        kind: "button".to_string(),
        header: text_header(config.header.as_ref()),
        body: config.body.clone(),
        footer: config.footer.clone(),
        action: json!({"buttons": buttons}),
        media: config.media.as_ref().map(|media| media.url.clone()),
    }
}

fn list(config: &ListMessageConfig) -> InteractiveMessage {
    let sections: Vec<JsonValue> = config
        .sections
        .iter()
        .map(|section| {
            let rows: Vec<JsonValue> = section
                .rows
                .iter()
                .map(|row| {
                    let mut value = json!({"id": row.id, "title": row.title});
                    if let Some(description) = &row.description {
                        value["description"] = json!(description);
                    }
                    value
                })
                .collect();
            let mut value = json!({"rows": rows});
            if let Some(title) = &section.title {
                value["title"] = json!(title);
            }
            value
        })
        .collect();
    InteractiveMessage {
        kind: "list".to_string(),
        header: text_header(config.header.as_ref()),
        body: config.body.clone(),
        footer: config.footer.clone(),
        action: json!({"list": {"label": config.button_label, "sections": sections}}),
        media: None,
    }
}

fn action_button(button: &ActionButton) -> JsonValue {
    match button {
        ActionButton::QuickReply { id, title } => {
            json!({"type": "quick_reply", "id": id, "title": title})
        }
        ActionButton::Call {
            id,
            title,
            phone_number,
        } => json!({"type": "call", "id": id, "title": title, "phone_number": phone_number}),
        ActionButton::Url { id, title, url } => {
            json!({"type": "url", "id": id, "title": title, "url": url})
        }
        ActionButton::Copy {
            id,
            title,
            copy_code,
        } => json!({"type": "copy", "id": id, "title": title, "copy_code": copy_code}),
    }
}

fn buttons(config: &ButtonsMessageConfig) -> InteractiveMessage {
    let buttons: Vec<JsonValue> = config.buttons.iter().map(action_button).collect();
    InteractiveMessage {
        kind: "button".to_string(),
        header: text_header(config.header.as_ref()),
        body: config.body.clone(),
        footer: config.footer.clone(),
        action: json!({"buttons": buttons}),
        media: None,
    }
}

fn card_media(media: Option<&MediaHeader>) -> JsonValue {
    media.map_or(JsonValue::Null, |media| json!({"media": media.url}))
}

fn carousel(config: &CarouselConfig) -> InteractiveMessage {
    let cards: Vec<JsonValue> = config
        .cards
        .iter()
        .map(|card| {
            let buttons: Vec<JsonValue> = card.buttons.iter().map(action_button).collect();
            json!({
                "id": card.id,
                "media": card_media(card.media.as_ref()),
                "text": card.text,
                "action": {"buttons": buttons},
            })
        })
        .collect();
    InteractiveMessage {
        kind: "carousel".to_string(),
        header: None,
        body: config.body.clone(),
        footer: None,
        action: json!({"cards": cards}),
        media: None,
    }
}
