//! Per-kind node configuration.
//!
//! Configuration is authored by the visual editor and stored as the `data`
//! object of each node. Field names follow the editor's camelCase naming.
//! Every field that the editor may omit carries a default so that partially
//! filled nodes still load.

use serde::{Deserialize, Serialize};

/// Media kinds that can be sent or used as an interactive header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// A still image.
    #[default]
    Image,
    /// A video clip.
    Video,
    /// An arbitrary document.
    Document,
    /// An audio file or voice note.
    Audio,
}

impl MediaType {
    /// Returns the media type as the path segment used by the messaging API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
        }
    }
}

/// A plain text message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageConfig {
    /// Message body, sent as written.
    #[serde(default, alias = "message")]
    pub text: String,
}

/// A media message (image, video, document or audio).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMessageConfig {
    #[serde(default)]
    pub media_type: MediaType,
    /// Public URL of the media file.
    #[serde(default, alias = "mediaUrl")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A location pin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationMessageConfig {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Media shown above the body of an interactive message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaHeader {
    #[serde(default)]
    pub media_type: MediaType,
    pub url: String,
}

/// A reply button on a quick-reply message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyButton {
    /// Reply id echoed back by the provider when the button is pressed.
    pub id: String,
    pub title: String,
}

impl ReplyButton {
    /// Creates a reply button.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// A quick-reply message: text (or media) with up to three reply buttons.
///
/// The editor's `quickReplyImage` and `quickReplyVideo` variants load into
/// this configuration with [`media`](Self::media) populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickReplyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, alias = "text")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaHeader>,
    #[serde(default)]
    pub buttons: Vec<ReplyButton>,
}

/// One selectable row of a list message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ListRow {
    /// Creates a row without a description.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
        }
    }

    /// Sets the row description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A titled group of rows in a list message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub rows: Vec<ListRow>,
}

fn default_list_button_label() -> String {
    "Options".to_string()
}

/// A list message: a menu of sectioned rows behind a single button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, alias = "text")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    /// Label of the button that opens the list.
    #[serde(default = "default_list_button_label")]
    pub button_label: String,
    #[serde(default)]
    pub sections: Vec<ListSection>,
}

impl Default for ListMessageConfig {
    fn default() -> Self {
        Self {
            header: None,
            body: String::new(),
            footer: None,
            button_label: default_list_button_label(),
            sections: Vec::new(),
        }
    }
}

/// A button on a buttons message or carousel card.
///
/// Only quick-reply buttons produce a reply event; call, URL and copy
/// buttons act on the customer's device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ActionButton {
    QuickReply {
        id: String,
        title: String,
    },
    Call {
        id: String,
        title: String,
        phone_number: String,
    },
    Url {
        id: String,
        title: String,
        url: String,
    },
    Copy {
        id: String,
        title: String,
        copy_code: String,
    },
}

impl ActionButton {
    /// Returns the button id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::QuickReply { id, .. }
            | Self::Call { id, .. }
            | Self::Url { id, .. }
            | Self::Copy { id, .. } => id,
        }
    }

    /// Returns the button title.
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::QuickReply { title, .. }
            | Self::Call { title, .. }
            | Self::Url { title, .. }
            | Self::Copy { title, .. } => title,
        }
    }

    /// Returns true if pressing the button sends a reply event.
    #[must_use]
    pub const fn is_quick_reply(&self) -> bool {
        matches!(self, Self::QuickReply { .. })
    }
}

/// A buttons message mixing quick replies with call, URL and copy actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonsMessageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, alias = "text")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default)]
    pub buttons: Vec<ActionButton>,
}

/// One card of a carousel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarouselCard {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaHeader>,
    #[serde(default)]
    pub buttons: Vec<ActionButton>,
}

/// A horizontally scrolling set of cards, each with its own buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarouselConfig {
    #[serde(default, alias = "text")]
    pub body: String,
    #[serde(default)]
    pub cards: Vec<CarouselCard>,
}

impl CarouselConfig {
    /// Returns the total number of quick-reply buttons across all cards.
    #[must_use]
    pub fn quick_reply_count(&self) -> usize {
        self.cards
            .iter()
            .flat_map(|card| &card.buttons)
            .filter(|button| button.is_quick_reply())
            .count()
    }
}

/// HTTP methods supported by the HTTP action node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Returns the method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A templated name/value pair (header, query parameter or form field).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl KeyValue {
    /// Creates a pair.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Authentication attached to an outbound HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HttpAuth {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        #[serde(default)]
        password: String,
    },
}

/// Request body of an HTTP action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HttpBody {
    #[default]
    None,
    /// A JSON document whose string leaves are templates.
    Json { content: String },
    /// URL-encoded form fields.
    Form {
        #[serde(default)]
        fields: Vec<KeyValue>,
    },
}

/// Copies a value out of the response body into a context variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMapping {
    /// Dot/bracket path into the response JSON, e.g. `data.items[0].name`.
    pub path: String,
    /// Context variable that receives the value.
    pub variable: String,
}

/// An outbound HTTP call to a customer-configured endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpActionConfig {
    #[serde(default)]
    pub method: HttpMethod,
    /// Target URL; may contain placeholders.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub auth: HttpAuth,
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    #[serde(default)]
    pub query_params: Vec<KeyValue>,
    #[serde(default)]
    pub body: HttpBody,
    #[serde(default)]
    pub response_mapping: Vec<ResponseMapping>,
    /// Overrides the engine-wide request timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_department_prompt() -> String {
    "Please choose a department.".to_string()
}

fn default_staff_prompt() -> String {
    "Who would you like to book with?".to_string()
}

fn default_slot_prompt() -> String {
    "Please pick a time.".to_string()
}

fn default_name_prompt() -> String {
    "What name should we put the booking under?".to_string()
}

fn default_confirmation() -> String {
    "Your appointment with {{booking.staff}} on {{booking.date}} at {{booking.time}} is confirmed."
        .to_string()
}

fn default_no_slots() -> String {
    "Sorry, there are no available times right now.".to_string()
}

fn default_unavailable() -> String {
    "Sorry, that time is no longer available. Please start again.".to_string()
}

fn default_true() -> bool {
    true
}

/// The multi-step appointment booking node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookAppointmentConfig {
    #[serde(default = "default_department_prompt")]
    pub department_prompt: String,
    #[serde(default = "default_staff_prompt")]
    pub staff_prompt: String,
    #[serde(default = "default_slot_prompt")]
    pub slot_prompt: String,
    /// Whether to ask for the customer's name before confirming.
    #[serde(default = "default_true")]
    pub ask_name: bool,
    #[serde(default = "default_name_prompt")]
    pub name_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_question_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_question_2: Option<String>,
    /// Confirmation text; may reference `{{booking.*}}`.
    #[serde(default = "default_confirmation")]
    pub confirmation_message: String,
    #[serde(default = "default_no_slots")]
    pub no_slots_message: String,
    #[serde(default = "default_unavailable")]
    pub unavailable_message: String,
    /// Overrides the engine-wide look-ahead for slot options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_ahead: Option<u32>,
}

impl Default for BookAppointmentConfig {
    fn default() -> Self {
        Self {
            department_prompt: default_department_prompt(),
            staff_prompt: default_staff_prompt(),
            slot_prompt: default_slot_prompt(),
            ask_name: true,
            name_prompt: default_name_prompt(),
            custom_question_1: None,
            custom_question_2: None,
            confirmation_message: default_confirmation(),
            no_slots_message: default_no_slots(),
            unavailable_message: default_unavailable(),
            days_ahead: None,
        }
    }
}

fn default_bookings_prompt() -> String {
    "Here are your upcoming appointments.".to_string()
}

fn default_no_bookings() -> String {
    "You have no upcoming appointments.".to_string()
}

fn default_cancelled() -> String {
    "Your appointment has been cancelled.".to_string()
}

fn default_rescheduled() -> String {
    "Your appointment has been moved to {{booking.date}} at {{booking.time}}.".to_string()
}

/// The node that lists, cancels and reschedules a customer's bookings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckBookingsConfig {
    #[serde(default = "default_bookings_prompt")]
    pub prompt: String,
    #[serde(default = "default_no_bookings")]
    pub no_bookings_message: String,
    #[serde(default = "default_true")]
    pub allow_cancel: bool,
    #[serde(default = "default_true")]
    pub allow_reschedule: bool,
    #[serde(default = "default_slot_prompt")]
    pub slot_prompt: String,
    #[serde(default = "default_cancelled")]
    pub cancelled_message: String,
    #[serde(default = "default_rescheduled")]
    pub rescheduled_message: String,
    #[serde(default = "default_unavailable")]
    pub unavailable_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_ahead: Option<u32>,
}

impl Default for CheckBookingsConfig {
    fn default() -> Self {
        Self {
            prompt: default_bookings_prompt(),
            no_bookings_message: default_no_bookings(),
            allow_cancel: true,
            allow_reschedule: true,
            slot_prompt: default_slot_prompt(),
            cancelled_message: default_cancelled(),
            rescheduled_message: default_rescheduled(),
            unavailable_message: default_unavailable(),
            days_ahead: None,
        }
    }
}
