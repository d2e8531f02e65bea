//! Typed conversation context.
//!
//! The context is stored as one JSON object per conversation. Most keys
//! are free-form variables (HTTP results, mapped response values, booking
//! outcomes). Two keys are reserved for sub-flow scratch state:
//!
//! - `bookingState`: progress through a booking or check-bookings flow
//! - `captureState`: free-text answers being collected
//!
//! Sub-states are only ever replaced or cleared as a whole. A stored
//! sub-state that no longer decodes is dropped on load so the conversation
//! can never get stuck on it.

use chatflow_workflow::{BookAppointmentConfig, CheckBookingsConfig, NodeId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

const BOOKING_KEY: &str = "bookingState";
const CAPTURE_KEY: &str = "captureState";

/// Accumulated variables plus optional sub-flow state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, JsonValue>", into = "Map<String, JsonValue>")]
pub struct ConversationContext {
    vars: Map<String, JsonValue>,
    booking: Option<BookingState>,
    capture: Option<CaptureState>,
}

impl ConversationContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` names a sub-state slot.
    #[must_use]
    pub fn is_reserved(key: &str) -> bool {
        key == BOOKING_KEY || key == CAPTURE_KEY
    }

    /// Gets a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.vars.get(key)
    }

    /// Sets a variable. Reserved sub-state keys are ignored.
    pub fn set(&mut self, key: impl Into<String>, value: JsonValue) {
        let key = key.into();
        if !Self::is_reserved(&key) {
            self.vars.insert(key, value);
        }
    }

    /// Removes a variable.
    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        self.vars.remove(key)
    }

    /// Sets every entry of `values`, skipping reserved keys.
    pub fn merge(&mut self, values: Map<String, JsonValue>) {
        for (key, value) in values {
            self.set(key, value);
        }
    }

    /// Returns all variables.
    #[must_use]
    pub fn vars(&self) -> &Map<String, JsonValue> {
        &self.vars
    }

    /// Returns the in-progress booking sub-state.
    #[must_use]
    pub fn booking(&self) -> Option<&BookingState> {
        self.booking.as_ref()
    }

    /// Replaces (or clears, with `None`) the booking sub-state.
    pub fn replace_booking(&mut self, booking: Option<BookingState>) {
        self.booking = booking;
    }

    /// Returns the in-progress capture sub-state.
    #[must_use]
    pub fn capture(&self) -> Option<&CaptureState> {
        self.capture.as_ref()
    }

    /// Replaces (or clears, with `None`) the capture sub-state.
    pub fn replace_capture(&mut self, capture: Option<CaptureState>) {
        self.capture = capture;
    }

    /// Clears both sub-states, leaving variables untouched.
    pub fn clear_sub_flows(&mut self) {
        self.booking = None;
        self.capture = None;
    }
}

impl From<Map<String, JsonValue>> for ConversationContext {
    fn from(mut vars: Map<String, JsonValue>) -> Self {
        let booking = vars
            .remove(BOOKING_KEY)
            .and_then(|value| serde_json::from_value(value).ok());
        let capture = vars
            .remove(CAPTURE_KEY)
            .and_then(|value| serde_json::from_value(value).ok());
        Self {
            vars,
            booking,
            capture,
        }
    }
}

impl From<ConversationContext> for Map<String, JsonValue> {
    fn from(context: ConversationContext) -> Self {
        let mut map = context.vars;
        if let Some(value) = context
            .booking
            .and_then(|booking| serde_json::to_value(booking).ok())
        {
            map.insert(BOOKING_KEY.to_string(), value);
        }
        if let Some(value) = context
            .capture
            .and_then(|capture| serde_json::to_value(capture).ok())
        {
            map.insert(CAPTURE_KEY.to_string(), value);
        }
        map
    }
}

/// The step a booking sub-flow is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStep {
    SelectDepartment,
    SelectStaff,
    SelectSlot,
    EnterName,
    EnterCustom1,
    EnterCustom2,
    /// Check-bookings: picking a booking to cancel or reschedule.
    SelectBooking,
    /// Check-bookings: picking the new slot for a reschedule.
    SelectNewSlot,
}

impl BookingStep {
    /// Returns true if the step waits for free text rather than a reply.
    #[must_use]
    pub const fn awaits_text(&self) -> bool {
        matches!(self, Self::EnterName | Self::EnterCustom1 | Self::EnterCustom2)
    }
}

/// Which booking node started the sub-flow, with its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "config", rename_all = "snake_case")]
pub enum BookingFlow {
    Book(BookAppointmentConfig),
    Check(CheckBookingsConfig),
}

/// Progress through a booking sub-flow.
///
/// Ids are the booking store's numeric ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingState {
    pub step: BookingStep,
    /// The booking node that started the sub-flow.
    pub node_id: NodeId,
    pub flow: BookingFlow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Booking being rescheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<i64>,
}

impl BookingState {
    /// Creates a sub-state at `step` with no selections.
    #[must_use]
    pub fn new(node_id: NodeId, flow: BookingFlow, step: BookingStep) -> Self {
        Self {
            step,
            node_id,
            flow,
            department_id: None,
            staff_id: None,
            slot_id: None,
            date: None,
            booking_id: None,
        }
    }

    /// Returns a copy moved to `step`.
    #[must_use]
    pub fn at_step(&self, step: BookingStep) -> Self {
        Self {
            step,
            ..self.clone()
        }
    }
}

/// A free-text question awaiting an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureField {
    /// Key the answer is stored under, e.g. `name`.
    pub key: String,
    pub question: String,
}

impl CaptureField {
    /// Creates a field.
    #[must_use]
    pub fn new(key: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            question: question.into(),
        }
    }
}

/// A collected free-text answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedAnswer {
    pub key: String,
    pub question: String,
    pub value: String,
}

/// A sequence of free-text questions asked on behalf of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureState {
    pub node_id: NodeId,
    pub pending: Vec<CaptureField>,
    #[serde(default)]
    pub answers: Vec<CapturedAnswer>,
}

impl CaptureState {
    /// Creates a capture sequence.
    #[must_use]
    pub fn new(node_id: NodeId, pending: Vec<CaptureField>) -> Self {
        Self {
            node_id,
            pending,
            answers: Vec::new(),
        }
    }

    /// Returns the question currently awaiting an answer.
    #[must_use]
    pub fn current(&self) -> Option<&CaptureField> {
        self.pending.first()
    }

    /// Returns a copy with the current question answered.
    #[must_use]
    pub fn answered(&self, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        if !next.pending.is_empty() {
            let field = next.pending.remove(0);
            next.answers.push(CapturedAnswer {
                key: field.key,
                question: field.question,
                value: value.into(),
            });
        }
        next
    }

    /// Returns true once every question has an answer.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns the answer stored under `key`.
    #[must_use]
    pub fn answer(&self, key: &str) -> Option<&str> {
        self.answers
            .iter()
            .find(|answer| answer.key == key)
            .map(|answer| answer.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn booking_state() -> BookingState {
        BookingState::new(
            NodeId::from("book"),
            BookingFlow::Book(BookAppointmentConfig::default()),
            BookingStep::SelectDepartment,
        )
    }

    #[test]
    fn variables_and_sub_states_share_one_object() {
        let mut context = ConversationContext::new();
        context.set("customerId", json!("42"));
        context.replace_booking(Some(booking_state()));

        let value = serde_json::to_value(&context).expect("serialize");
        assert_eq!(value["customerId"], "42");
        assert_eq!(value["bookingState"]["step"], "select_department");
        assert_eq!(value["bookingState"]["flow"]["kind"], "book");

        let back: ConversationContext = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, context);
    }

    #[test]
    fn reserved_keys_are_not_variables() {
        let mut context = ConversationContext::new();
        context.set("bookingState", json!({"step": "bogus"}));
        assert!(context.get("bookingState").is_none());
        assert!(context.booking().is_none());
    }

    #[test]
    fn malformed_sub_state_is_dropped_on_load() {
        let context: ConversationContext = serde_json::from_value(json!({
            "name": "Asha",
            "bookingState": {"step": "not_a_step"}
        }))
        .expect("deserialize");

        assert!(context.booking().is_none());
        assert_eq!(context.get("name"), Some(&json!("Asha")));
    }

    #[test]
    fn clearing_sub_flows_keeps_variables() {
        let mut context = ConversationContext::new();
        context.set("order", json!({"id": 7}));
        context.replace_booking(Some(booking_state()));
        context.replace_capture(Some(CaptureState::new(NodeId::from("book"), Vec::new())));

        context.clear_sub_flows();

        assert!(context.booking().is_none());
        assert!(context.capture().is_none());
        assert_eq!(context.get("order"), Some(&json!({"id": 7})));
    }

    #[test]
    fn capture_answers_in_order() {
        let capture = CaptureState::new(
            NodeId::from("book"),
            vec![
                CaptureField::new("name", "Your name?"),
                CaptureField::new("custom_1", "Reason for visit?"),
            ],
        );
        assert_eq!(capture.current().map(|f| f.key.as_str()), Some("name"));

        let capture = capture.answered("Asha");
        assert!(!capture.is_complete());
        let capture = capture.answered("Checkup");
        assert!(capture.is_complete());
        assert_eq!(capture.answer("name"), Some("Asha"));
        assert_eq!(capture.answer("custom_1"), Some("Checkup"));
    }

    #[test]
    fn at_step_keeps_selections() {
        let mut state = booking_state();
        state.department_id = Some(7);
        let next = state.at_step(BookingStep::SelectStaff);
        assert_eq!(next.step, BookingStep::SelectStaff);
        assert_eq!(next.department_id, Some(7));
    }
}
