//! The booking sub-flow state machine.
//!
//! A booking node hands control to [`BookingSubFlow`], which keeps its
//! progress in the conversation context's booking sub-state and answers
//! each step with messages to send plus a [`FlowTransition`] telling the
//! executor what to do next.
//!
//! Book appointment:
//!
//! ```text
//! select_department -> select_staff -> select_slot
//!     -> [enter_name] -> [enter_custom1] -> [enter_custom2] -> booked
//! ```
//!
//! Check bookings:
//!
//! ```text
//! select_booking -> cancel                       -> updated
//!                -> reschedule -> select_new_slot -> updated
//! ```
//!
//! A selection that does not fit the current step, or that names an
//! entity the account does not own, resets the sub-state and is reported
//! as [`ReplyHandling::Rejected`] with nothing sent.

use crate::error::BookingError;
use crate::model::{Booking, BookingId, BookingStatus, NewBooking, StaffId};
use crate::selection::BookingSelection;
use crate::slots::{self, MAX_LIST_ROWS, SlotOccurrence};
use crate::store::{BookingStore, CreateOutcome};
use chatflow_conversation::{
    BookingFlow, BookingState, BookingStep, CaptureField, CaptureState, ConversationContext,
};
use chatflow_core::AccountId;
use chatflow_integration::template;
use chatflow_workflow::{
    BookAppointmentConfig, CheckBookingsConfig, ListMessageConfig, ListRow, ListSection, NodeId,
};
use chrono::{NaiveDate, NaiveTime};
use rootcause::Report;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Named outcome handles a booking node's edges may carry.
pub mod handles {
    /// A booking was created.
    pub const BOOKED: &str = "booked";
    /// No department, staff member or slot could be offered.
    pub const NO_SLOTS: &str = "no_slots";
    /// The participant has no upcoming bookings.
    pub const NO_BOOKINGS: &str = "no_bookings";
    /// A booking was cancelled or moved.
    pub const UPDATED: &str = "updated";
}

const NAME_FIELD: &str = "name";
const CUSTOM_1_FIELD: &str = "custom_1";
const CUSTOM_2_FIELD: &str = "custom_2";

/// Who is booking, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingScope {
    pub account_id: AccountId,
    pub phone: String,
    /// Local date of the inbound event.
    pub today: NaiveDate,
    /// Local time of the inbound event.
    pub now: NaiveTime,
}

/// A message the sub-flow wants sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowMessage {
    Text(String),
    List(ListMessageConfig),
}

/// What the executor does after sending a step's messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowTransition {
    /// Stop the chain and wait for the participant.
    AwaitReply,
    /// Stop the chain; the sub-flow is over without an outcome edge.
    Stop,
    /// Follow the booking node's edge with this handle.
    Follow(&'static str),
}

/// Messages plus the transition that follows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStep {
    pub messages: Vec<FlowMessage>,
    pub transition: FlowTransition,
}

impl FlowStep {
    fn await_reply(message: FlowMessage) -> Self {
        Self {
            messages: vec![message],
            transition: FlowTransition::AwaitReply,
        }
    }

    fn stop(messages: Vec<FlowMessage>) -> Self {
        Self {
            messages,
            transition: FlowTransition::Stop,
        }
    }

    fn follow(messages: Vec<FlowMessage>, handle: &'static str) -> Self {
        Self {
            messages,
            transition: FlowTransition::Follow(handle),
        }
    }
}

/// How an interactive reply was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyHandling {
    /// The reply is not a booking selection for an active sub-flow.
    NotForFlow,
    /// The selection did not fit; the sub-state was reset.
    Rejected,
    /// The sub-flow advanced.
    Handled(FlowStep),
}

/// Drives booking sub-flows against a [`BookingStore`].
#[derive(Clone)]
pub struct BookingSubFlow {
    store: Arc<dyn BookingStore>,
    default_days_ahead: u32,
}

impl BookingSubFlow {
    /// Creates a sub-flow driver.
    ///
    /// `default_days_ahead` applies to nodes that do not set their own
    /// look-ahead.
    #[must_use]
    pub fn new(store: Arc<dyn BookingStore>, default_days_ahead: u32) -> Self {
        Self {
            store,
            default_days_ahead,
        }
    }

    /// Enters a book-appointment node.
    ///
    /// # Errors
    ///
    /// Returns an error if the booking store fails.
    #[instrument(skip(self, scope, config, context), fields(phone = %scope.phone))]
    pub async fn start_booking(
        &self,
        scope: &BookingScope,
        node_id: &NodeId,
        config: &BookAppointmentConfig,
        context: &mut ConversationContext,
    ) -> Result<FlowStep, Report<BookingError>> {
        context.clear_sub_flows();
        let departments = self.store.list_departments(scope.account_id).await?;
        if departments.is_empty() {
            debug!("no departments to offer");
            return Ok(no_slots(config));
        }

        let rows = departments
            .iter()
            .take(MAX_LIST_ROWS)
            .map(|department| {
                let row = ListRow::new(
                    BookingSelection::Department(department.id).row_id(),
                    &department.name,
                );
                match &department.description {
                    Some(description) => row.with_description(description),
                    None => row,
                }
            })
            .collect();

        context.replace_booking(Some(BookingState::new(
            node_id.clone(),
            BookingFlow::Book(config.clone()),
            BookingStep::SelectDepartment,
        )));
        Ok(FlowStep::await_reply(list(
            &config.department_prompt,
            "Departments",
            rows,
        )))
    }

    /// Enters a check-bookings node.
    ///
    /// # Errors
    ///
    /// Returns an error if the booking store fails.
    #[instrument(skip(self, scope, config, context), fields(phone = %scope.phone))]
    pub async fn start_check(
        &self,
        scope: &BookingScope,
        node_id: &NodeId,
        config: &CheckBookingsConfig,
        context: &mut ConversationContext,
    ) -> Result<FlowStep, Report<BookingError>> {
        context.clear_sub_flows();
        let bookings = self
            .store
            .list_upcoming_bookings(scope.account_id, &scope.phone, scope.today)
            .await?;
        if bookings.is_empty() {
            return Ok(FlowStep::follow(
                vec![FlowMessage::Text(config.no_bookings_message.clone())],
                handles::NO_BOOKINGS,
            ));
        }

        if !config.allow_cancel && !config.allow_reschedule {
            let mut text = config.prompt.clone();
            for booking in &bookings {
                text.push('\n');
                text.push_str(&booking_label(booking));
            }
            return Ok(FlowStep::stop(vec![FlowMessage::Text(text)]));
        }

        let per_booking = usize::from(config.allow_cancel) + usize::from(config.allow_reschedule);
        let sections = bookings
            .iter()
            .take(MAX_LIST_ROWS / per_booking)
            .map(|booking| {
                let mut rows = Vec::with_capacity(per_booking);
                if config.allow_reschedule {
                    rows.push(ListRow::new(
                        BookingSelection::Reschedule(booking.id).row_id(),
                        "Reschedule",
                    ));
                }
                if config.allow_cancel {
                    rows.push(ListRow::new(
                        BookingSelection::Cancel(booking.id).row_id(),
                        "Cancel",
                    ));
                }
                ListSection {
                    title: Some(booking_label(booking)),
                    rows,
                }
            })
            .collect();

        context.replace_booking(Some(BookingState::new(
            node_id.clone(),
            BookingFlow::Check(config.clone()),
            BookingStep::SelectBooking,
        )));
        Ok(FlowStep::await_reply(FlowMessage::List(ListMessageConfig {
            body: config.prompt.clone(),
            button_label: "Bookings".to_string(),
            sections,
            ..ListMessageConfig::default()
        })))
    }

    /// Routes an interactive reply to the active sub-flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the booking store fails.
    #[instrument(skip(self, scope, context), fields(phone = %scope.phone))]
    pub async fn handle_reply(
        &self,
        scope: &BookingScope,
        reply_id: &str,
        context: &mut ConversationContext,
    ) -> Result<ReplyHandling, Report<BookingError>> {
        let Some(selection) = BookingSelection::parse(reply_id) else {
            return Ok(ReplyHandling::NotForFlow);
        };
        let Some(state) = context.booking().cloned() else {
            return Ok(ReplyHandling::NotForFlow);
        };

        let step = match (&state.flow, state.step, selection) {
            (BookingFlow::Book(config), BookingStep::SelectDepartment, BookingSelection::Department(id)) => {
                self.select_department(scope, &state, config, id, context).await?
            }
            (BookingFlow::Book(config), BookingStep::SelectStaff, BookingSelection::Staff(id)) => {
                self.select_staff(scope, &state, config, id, context).await?
            }
            (
                BookingFlow::Book(config),
                BookingStep::SelectSlot,
                BookingSelection::Slot { slot_id, date },
            ) => self.select_slot(scope, &state, config, slot_id, date, context).await?,
            (BookingFlow::Check(config), BookingStep::SelectBooking, BookingSelection::Cancel(id))
                if config.allow_cancel =>
            {
                self.cancel(scope, config, id, context).await?
            }
            (
                BookingFlow::Check(config),
                BookingStep::SelectBooking,
                BookingSelection::Reschedule(id),
            ) if config.allow_reschedule => {
                self.start_reschedule(scope, &state, config, id, context).await?
            }
            (
                BookingFlow::Check(config),
                BookingStep::SelectNewSlot,
                BookingSelection::NewSlot { slot_id, date },
            ) => {
                self.select_new_slot(scope, &state, config, slot_id, date, context)
                    .await?
            }
            _ => None,
        };

        Ok(match step {
            Some(step) => ReplyHandling::Handled(step),
            None => {
                debug!(reply_id, step = ?state.step, "booking selection rejected");
                context.clear_sub_flows();
                ReplyHandling::Rejected
            }
        })
    }

    /// Feeds free text to a sub-flow waiting for an answer.
    ///
    /// Returns `None` if no sub-flow is waiting for text.
    ///
    /// # Errors
    ///
    /// Returns an error if the booking store fails.
    #[instrument(skip(self, scope, text, context), fields(phone = %scope.phone))]
    pub async fn handle_text(
        &self,
        scope: &BookingScope,
        text: &str,
        context: &mut ConversationContext,
    ) -> Result<Option<FlowStep>, Report<BookingError>> {
        let Some(state) = context.booking().cloned() else {
            return Ok(None);
        };
        let Some(capture) = context.capture().cloned() else {
            return Ok(None);
        };
        if !state.step.awaits_text() {
            return Ok(None);
        }
        let BookingFlow::Book(config) = &state.flow else {
            return Ok(None);
        };

        let capture = capture.answered(text.trim());
        if let Some(field) = capture.current() {
            let question = field.question.clone();
            let next = state.at_step(step_for_field(&field.key));
            context.replace_booking(Some(next));
            context.replace_capture(Some(capture));
            return Ok(Some(FlowStep::await_reply(FlowMessage::Text(question))));
        }

        let step = self
            .complete_booking(scope, &state, config, Some(&capture), context)
            .await?;
        Ok(Some(step))
    }

    fn days_ahead(&self, configured: Option<u32>) -> u32 {
        configured.unwrap_or(self.default_days_ahead)
    }

    async fn select_department(
        &self,
        scope: &BookingScope,
        state: &BookingState,
        config: &BookAppointmentConfig,
        id: crate::model::DepartmentId,
        context: &mut ConversationContext,
    ) -> Result<Option<FlowStep>, Report<BookingError>> {
        let Some(department) = self.store.get_department(scope.account_id, id).await? else {
            return Ok(None);
        };
        let staff = self.store.list_staff(scope.account_id, department.id).await?;
        if staff.is_empty() {
            context.clear_sub_flows();
            return Ok(Some(no_slots(config)));
        }

        let rows = staff
            .iter()
            .take(MAX_LIST_ROWS)
            .map(|member| ListRow::new(BookingSelection::Staff(member.id).row_id(), &member.name))
            .collect();
        let mut next = state.at_step(BookingStep::SelectStaff);
        next.department_id = Some(department.id.get());
        context.replace_booking(Some(next));
        Ok(Some(FlowStep::await_reply(list(
            &config.staff_prompt,
            "Staff",
            rows,
        ))))
    }

    async fn select_staff(
        &self,
        scope: &BookingScope,
        state: &BookingState,
        config: &BookAppointmentConfig,
        id: StaffId,
        context: &mut ConversationContext,
    ) -> Result<Option<FlowStep>, Report<BookingError>> {
        let Some(staff) = self.store.get_staff(scope.account_id, id).await? else {
            return Ok(None);
        };
        if Some(staff.department_id.get()) != state.department_id {
            return Ok(None);
        }

        let occurrences = self
            .available_occurrences(scope, staff.id, self.days_ahead(config.days_ahead), None)
            .await?;
        if occurrences.is_empty() {
            context.clear_sub_flows();
            return Ok(Some(no_slots(config)));
        }

        let rows = occurrences
            .iter()
            .map(|o| {
                let selection = BookingSelection::Slot {
                    slot_id: o.slot.id,
                    date: o.date,
                };
                ListRow::new(selection.row_id(), o.label())
            })
            .collect();
        let mut next = state.at_step(BookingStep::SelectSlot);
        next.staff_id = Some(staff.id.get());
        context.replace_booking(Some(next));
        Ok(Some(FlowStep::await_reply(list(
            &config.slot_prompt,
            "Times",
            rows,
        ))))
    }

    async fn select_slot(
        &self,
        scope: &BookingScope,
        state: &BookingState,
        config: &BookAppointmentConfig,
        slot_id: crate::model::SlotId,
        date: NaiveDate,
        context: &mut ConversationContext,
    ) -> Result<Option<FlowStep>, Report<BookingError>> {
        let Some(slot) = self.store.get_slot(scope.account_id, slot_id).await? else {
            return Ok(None);
        };
        if Some(slot.staff_id.get()) != state.staff_id || !slot.occurs_on(date) || date < scope.today
        {
            return Ok(None);
        }

        let availability = self
            .store
            .check_slot_availability(slot.staff_id, date, slot.start_time, None)
            .await?;
        if !availability.available {
            context.clear_sub_flows();
            return Ok(Some(unavailable(&config.unavailable_message)));
        }

        let mut next = state.at_step(BookingStep::SelectSlot);
        next.slot_id = Some(slot.id.get());
        next.date = Some(date);

        let fields = capture_fields(config);
        let Some(first) = fields.first() else {
            return self
                .complete_booking(scope, &next, config, None, context)
                .await
                .map(Some);
        };
        let question = first.question.clone();
        let next = next.at_step(step_for_field(&first.key));
        context.replace_capture(Some(CaptureState::new(state.node_id.clone(), fields)));
        context.replace_booking(Some(next));
        Ok(Some(FlowStep::await_reply(FlowMessage::Text(question))))
    }

    async fn complete_booking(
        &self,
        scope: &BookingScope,
        state: &BookingState,
        config: &BookAppointmentConfig,
        capture: Option<&CaptureState>,
        context: &mut ConversationContext,
    ) -> Result<FlowStep, Report<BookingError>> {
        context.clear_sub_flows();
        let (Some(department_id), Some(slot_id), Some(date)) =
            (state.department_id, state.slot_id, state.date)
        else {
            return Ok(FlowStep::stop(Vec::new()));
        };
        let Some(slot) = self.store.get_slot(scope.account_id, slot_id.into()).await? else {
            return Ok(FlowStep::stop(Vec::new()));
        };

        // Re-checked here because the slot list may be minutes old.
        let availability = self
            .store
            .check_slot_availability(slot.staff_id, date, slot.start_time, None)
            .await?;
        if !availability.available {
            return Ok(unavailable(&config.unavailable_message));
        }

        let answer = |key: &str| capture.and_then(|c| c.answer(key)).map(str::to_string);
        let outcome = self
            .store
            .create_booking(NewBooking {
                account_id: scope.account_id,
                department_id: department_id.into(),
                staff_id: slot.staff_id,
                slot_id: slot.id,
                phone: scope.phone.clone(),
                customer_name: answer(NAME_FIELD),
                date,
                time: slot.start_time,
                custom_answer_1: answer(CUSTOM_1_FIELD),
                custom_answer_2: answer(CUSTOM_2_FIELD),
            })
            .await?;
        let booking = match outcome {
            CreateOutcome::Created(booking) => booking,
            CreateOutcome::SlotFull(availability) => {
                debug!(
                    existing = availability.existing_count,
                    capacity = availability.capacity,
                    "slot filled before booking"
                );
                return Ok(unavailable(&config.unavailable_message));
            }
        };

        debug!(booking_id = %booking.id, "booking created");
        let confirmation = self
            .announce(scope, &booking, &config.confirmation_message, context)
            .await?;
        Ok(FlowStep::follow(
            vec![FlowMessage::Text(confirmation)],
            handles::BOOKED,
        ))
    }

    async fn cancel(
        &self,
        scope: &BookingScope,
        config: &CheckBookingsConfig,
        id: BookingId,
        context: &mut ConversationContext,
    ) -> Result<Option<FlowStep>, Report<BookingError>> {
        let Some(booking) = self.owned_booking(scope, id).await? else {
            return Ok(None);
        };
        if !self.store.cancel_booking(scope.account_id, booking.id).await? {
            return Ok(None);
        }
        context.clear_sub_flows();
        let text = self
            .announce(scope, &booking, &config.cancelled_message, context)
            .await?;
        Ok(Some(FlowStep::follow(
            vec![FlowMessage::Text(text)],
            handles::UPDATED,
        )))
    }

    async fn start_reschedule(
        &self,
        scope: &BookingScope,
        state: &BookingState,
        config: &CheckBookingsConfig,
        id: BookingId,
        context: &mut ConversationContext,
    ) -> Result<Option<FlowStep>, Report<BookingError>> {
        let Some(booking) = self.owned_booking(scope, id).await? else {
            return Ok(None);
        };
        let occurrences = self
            .available_occurrences(
                scope,
                booking.staff_id,
                self.days_ahead(config.days_ahead),
                Some(booking.id),
            )
            .await?;
        let rows: Vec<ListRow> = occurrences
            .iter()
            .filter(|o| o.date != booking.date || o.slot.start_time != booking.time)
            .map(|o| {
                let selection = BookingSelection::NewSlot {
                    slot_id: o.slot.id,
                    date: o.date,
                };
                ListRow::new(selection.row_id(), o.label())
            })
            .collect();
        if rows.is_empty() {
            context.clear_sub_flows();
            return Ok(Some(unavailable(&config.unavailable_message)));
        }

        let mut next = state.at_step(BookingStep::SelectNewSlot);
        next.booking_id = Some(booking.id.get());
        next.staff_id = Some(booking.staff_id.get());
        context.replace_booking(Some(next));
        Ok(Some(FlowStep::await_reply(list(
            &config.slot_prompt,
            "Times",
            rows,
        ))))
    }

    async fn select_new_slot(
        &self,
        scope: &BookingScope,
        state: &BookingState,
        config: &CheckBookingsConfig,
        slot_id: crate::model::SlotId,
        date: NaiveDate,
        context: &mut ConversationContext,
    ) -> Result<Option<FlowStep>, Report<BookingError>> {
        let Some(booking_id) = state.booking_id.map(BookingId::new) else {
            return Ok(None);
        };
        let Some(slot) = self.store.get_slot(scope.account_id, slot_id).await? else {
            return Ok(None);
        };
        if Some(slot.staff_id.get()) != state.staff_id || !slot.occurs_on(date) || date < scope.today
        {
            return Ok(None);
        }
        if self.owned_booking(scope, booking_id).await?.is_none() {
            return Ok(None);
        }

        let outcome = self
            .store
            .reschedule_booking(scope.account_id, booking_id, &slot, date)
            .await?;
        context.clear_sub_flows();
        match outcome {
            None => Ok(None),
            Some(CreateOutcome::SlotFull(_)) => Ok(Some(unavailable(&config.unavailable_message))),
            Some(CreateOutcome::Created(booking)) => {
                debug!(booking_id = %booking.id, "booking rescheduled");
                let text = self
                    .announce(scope, &booking, &config.rescheduled_message, context)
                    .await?;
                Ok(Some(FlowStep::follow(
                    vec![FlowMessage::Text(text)],
                    handles::UPDATED,
                )))
            }
        }
    }

    /// Returns the booking if it is a confirmed booking of this phone.
    async fn owned_booking(
        &self,
        scope: &BookingScope,
        id: BookingId,
    ) -> Result<Option<Booking>, Report<BookingError>> {
        let booking = self.store.get_booking(scope.account_id, id).await?;
        Ok(booking.filter(|b| b.phone == scope.phone && b.status == BookingStatus::Confirmed))
    }

    async fn available_occurrences(
        &self,
        scope: &BookingScope,
        staff_id: StaffId,
        days_ahead: u32,
        excluding: Option<BookingId>,
    ) -> Result<Vec<SlotOccurrence>, Report<BookingError>> {
        let weekly = self.store.list_slots(scope.account_id, staff_id).await?;
        let mut available = Vec::new();
        for occurrence in slots::upcoming(&weekly, scope.today, scope.now, days_ahead) {
            if available.len() == MAX_LIST_ROWS {
                break;
            }
            let availability = self
                .store
                .check_slot_availability(
                    staff_id,
                    occurrence.date,
                    occurrence.slot.start_time,
                    excluding,
                )
                .await?;
            if availability.available {
                available.push(occurrence);
            }
        }
        Ok(available)
    }

    /// Stores the `booking` variable and renders `template` against the
    /// updated variables.
    async fn announce(
        &self,
        scope: &BookingScope,
        booking: &Booking,
        message: &str,
        context: &mut ConversationContext,
    ) -> Result<String, Report<BookingError>> {
        let department = self
            .store
            .get_department(scope.account_id, booking.department_id)
            .await?
            .map(|d| d.name)
            .unwrap_or_default();
        let staff = self
            .store
            .get_staff(scope.account_id, booking.staff_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_default();

        context.set(
            "booking",
            json!({
                "id": booking.id.get(),
                "department": department,
                "staff": staff,
                "date": slots::date_label(booking.date),
                "time": slots::time_label(booking.time),
                "name": booking.customer_name,
            }),
        );
        let mut vars = context.vars().clone();
        vars.insert("phone".to_string(), json!(scope.phone));
        Ok(template::resolve(message, &JsonValue::Object(vars)))
    }
}

fn list(body: &str, button_label: &str, rows: Vec<ListRow>) -> FlowMessage {
    FlowMessage::List(ListMessageConfig {
        body: body.to_string(),
        button_label: button_label.to_string(),
        sections: vec![ListSection { title: None, rows }],
        ..ListMessageConfig::default()
    })
}

fn no_slots(config: &BookAppointmentConfig) -> FlowStep {
    FlowStep::follow(
        vec![FlowMessage::Text(config.no_slots_message.clone())],
        handles::NO_SLOTS,
    )
}

fn unavailable(message: &str) -> FlowStep {
    FlowStep::stop(vec![FlowMessage::Text(message.to_string())])
}

fn booking_label(booking: &Booking) -> String {
    format!(
        "{} {}",
        slots::date_label(booking.date),
        slots::time_label(booking.time)
    )
}

fn capture_fields(config: &BookAppointmentConfig) -> Vec<CaptureField> {
    let mut fields = Vec::new();
    if config.ask_name {
        fields.push(CaptureField::new(NAME_FIELD, &config.name_prompt));
    }
    if let Some(question) = &config.custom_question_1 {
        fields.push(CaptureField::new(CUSTOM_1_FIELD, question));
    }
    if let Some(question) = &config.custom_question_2 {
        fields.push(CaptureField::new(CUSTOM_2_FIELD, question));
    }
    fields
}

fn step_for_field(key: &str) -> BookingStep {
    match key {
        CUSTOM_1_FIELD => BookingStep::EnterCustom1,
        CUSTOM_2_FIELD => BookingStep::EnterCustom2,
        _ => BookingStep::EnterName,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Department, TimeSlot};
    use crate::store::InMemoryBookingStore;
    use chrono::Weekday;

    struct Fixture {
        store: InMemoryBookingStore,
        flow: BookingSubFlow,
        scope: BookingScope,
        department: Department,
        staff_id: StaffId,
        slot: TimeSlot,
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).expect("date")
    }

    fn fixture(capacity: u32) -> Fixture {
        let store = InMemoryBookingStore::new();
        let account_id = AccountId::new();
        let department = store.add_department(account_id, "Dental");
        let staff = store.add_staff(account_id, department.id, "Dr. Rao");
        let slot = store.add_slot(
            account_id,
            staff.id,
            Weekday::Mon,
            NaiveTime::from_hms_opt(10, 30, 0).expect("time"),
            capacity,
        );
        Fixture {
            flow: BookingSubFlow::new(Arc::new(store.clone()), 7),
            store,
            scope: BookingScope {
                account_id,
                phone: "919800000001".to_string(),
                today: monday(),
                now: NaiveTime::from_hms_opt(8, 0, 0).expect("time"),
            },
            department,
            staff_id: staff.id,
            slot,
        }
    }

    fn quick_config() -> BookAppointmentConfig {
        BookAppointmentConfig {
            ask_name: false,
            ..BookAppointmentConfig::default()
        }
    }

    fn list_row_ids(step: &FlowStep) -> Vec<String> {
        match step.messages.first() {
            Some(FlowMessage::List(list)) => list
                .sections
                .iter()
                .flat_map(|s| s.rows.iter().map(|r| r.id.clone()))
                .collect(),
            other => panic!("expected a list, got {other:?}"),
        }
    }

    fn handled(handling: ReplyHandling) -> FlowStep {
        match handling {
            ReplyHandling::Handled(step) => step,
            other => panic!("expected handled, got {other:?}"),
        }
    }

    async fn walk_to_slot(f: &Fixture, config: &BookAppointmentConfig, ctx: &mut ConversationContext) {
        let node = NodeId::from("book");
        f.flow
            .start_booking(&f.scope, &node, config, ctx)
            .await
            .expect("start");
        let dept = BookingSelection::Department(f.department.id).row_id();
        handled(f.flow.handle_reply(&f.scope, &dept, ctx).await.expect("dept"));
        let staff = BookingSelection::Staff(f.staff_id).row_id();
        handled(f.flow.handle_reply(&f.scope, &staff, ctx).await.expect("staff"));
    }

    fn slot_row(f: &Fixture) -> String {
        BookingSelection::Slot {
            slot_id: f.slot.id,
            date: monday(),
        }
        .row_id()
    }

    #[tokio::test]
    async fn start_lists_departments() {
        let f = fixture(1);
        let mut ctx = ConversationContext::new();

        let step = f
            .flow
            .start_booking(&f.scope, &NodeId::from("book"), &quick_config(), &mut ctx)
            .await
            .expect("start");

        assert_eq!(step.transition, FlowTransition::AwaitReply);
        assert_eq!(
            list_row_ids(&step),
            vec![format!("booking_dept_{}", f.department.id)]
        );
        let state = ctx.booking().expect("booking state");
        assert_eq!(state.step, BookingStep::SelectDepartment);
        assert_eq!(state.node_id, NodeId::from("book"));
    }

    #[tokio::test]
    async fn no_departments_follows_no_slots() {
        let f = fixture(1);
        let scope = BookingScope {
            account_id: AccountId::new(),
            ..f.scope.clone()
        };
        let mut ctx = ConversationContext::new();

        let step = f
            .flow
            .start_booking(&scope, &NodeId::from("book"), &quick_config(), &mut ctx)
            .await
            .expect("start");

        assert_eq!(step.transition, FlowTransition::Follow(handles::NO_SLOTS));
        assert!(ctx.booking().is_none());
    }

    #[tokio::test]
    async fn bare_department_id_advances_to_staff() {
        let f = fixture(1);
        let mut ctx = ConversationContext::new();
        f.flow
            .start_booking(&f.scope, &NodeId::from("book"), &quick_config(), &mut ctx)
            .await
            .expect("start");

        let reply = format!("dept_{}", f.department.id);
        let step = handled(f.flow.handle_reply(&f.scope, &reply, &mut ctx).await.expect("reply"));

        assert_eq!(step.transition, FlowTransition::AwaitReply);
        let state = ctx.booking().expect("booking state");
        assert_eq!(state.step, BookingStep::SelectStaff);
        assert_eq!(state.department_id, Some(f.department.id.get()));
    }

    #[tokio::test]
    async fn slot_selection_without_questions_books_immediately() {
        let f = fixture(1);
        let mut ctx = ConversationContext::new();
        ctx.set("customerId", json!("42"));
        walk_to_slot(&f, &quick_config(), &mut ctx).await;

        let step = handled(
            f.flow
                .handle_reply(&f.scope, &slot_row(&f), &mut ctx)
                .await
                .expect("slot"),
        );

        assert_eq!(step.transition, FlowTransition::Follow(handles::BOOKED));
        assert_eq!(
            step.messages,
            vec![FlowMessage::Text(
                "Your appointment with Dr. Rao on Mon 09 Mar at 10:30 is confirmed.".to_string()
            )]
        );
        assert!(ctx.booking().is_none());
        assert_eq!(ctx.get("customerId"), Some(&json!("42")));
        assert_eq!(ctx.get("booking").and_then(|b| b.get("staff")), Some(&json!("Dr. Rao")));
        assert_eq!(f.store.bookings().len(), 1);
    }

    #[tokio::test]
    async fn questions_are_asked_in_order() {
        let f = fixture(1);
        let config = BookAppointmentConfig {
            custom_question_1: Some("Reason for visit?".to_string()),
            ..BookAppointmentConfig::default()
        };
        let mut ctx = ConversationContext::new();
        walk_to_slot(&f, &config, &mut ctx).await;

        let step = handled(
            f.flow
                .handle_reply(&f.scope, &slot_row(&f), &mut ctx)
                .await
                .expect("slot"),
        );
        assert_eq!(step.messages, vec![FlowMessage::Text(config.name_prompt.clone())]);
        assert_eq!(ctx.booking().map(|b| b.step), Some(BookingStep::EnterName));

        let step = f
            .flow
            .handle_text(&f.scope, " Asha ", &mut ctx)
            .await
            .expect("name")
            .expect("consumed");
        assert_eq!(
            step.messages,
            vec![FlowMessage::Text("Reason for visit?".to_string())]
        );
        assert_eq!(ctx.booking().map(|b| b.step), Some(BookingStep::EnterCustom1));

        let step = f
            .flow
            .handle_text(&f.scope, "Checkup", &mut ctx)
            .await
            .expect("answer")
            .expect("consumed");
        assert_eq!(step.transition, FlowTransition::Follow(handles::BOOKED));

        let bookings = f.store.bookings();
        assert_eq!(bookings[0].customer_name.as_deref(), Some("Asha"));
        assert_eq!(bookings[0].custom_answer_1.as_deref(), Some("Checkup"));
        assert!(ctx.capture().is_none());
    }

    #[tokio::test]
    async fn text_without_capture_is_not_consumed() {
        let f = fixture(1);
        let mut ctx = ConversationContext::new();
        walk_to_slot(&f, &quick_config(), &mut ctx).await;

        let consumed = f
            .flow
            .handle_text(&f.scope, "hello", &mut ctx)
            .await
            .expect("text");
        assert!(consumed.is_none());
    }

    #[tokio::test]
    async fn foreign_department_is_rejected_and_resets() {
        let f = fixture(1);
        let other = f.store.add_department(AccountId::new(), "Elsewhere");
        let mut ctx = ConversationContext::new();
        f.flow
            .start_booking(&f.scope, &NodeId::from("book"), &quick_config(), &mut ctx)
            .await
            .expect("start");

        let reply = BookingSelection::Department(other.id).row_id();
        let handling = f.flow.handle_reply(&f.scope, &reply, &mut ctx).await.expect("reply");

        assert_eq!(handling, ReplyHandling::Rejected);
        assert!(ctx.booking().is_none());
    }

    #[tokio::test]
    async fn selection_for_wrong_step_is_rejected() {
        let f = fixture(1);
        let mut ctx = ConversationContext::new();
        f.flow
            .start_booking(&f.scope, &NodeId::from("book"), &quick_config(), &mut ctx)
            .await
            .expect("start");

        let handling = f
            .flow
            .handle_reply(&f.scope, &slot_row(&f), &mut ctx)
            .await
            .expect("reply");
        assert_eq!(handling, ReplyHandling::Rejected);
    }

    #[tokio::test]
    async fn non_booking_reply_is_not_for_flow() {
        let f = fixture(1);
        let mut ctx = ConversationContext::new();
        f.flow
            .start_booking(&f.scope, &NodeId::from("book"), &quick_config(), &mut ctx)
            .await
            .expect("start");

        let handling = f.flow.handle_reply(&f.scope, "btn_yes", &mut ctx).await.expect("reply");
        assert_eq!(handling, ReplyHandling::NotForFlow);
        assert!(ctx.booking().is_some());
    }

    #[tokio::test]
    async fn slot_taken_meanwhile_reports_unavailable() {
        let f = fixture(1);
        let mut first = ConversationContext::new();
        let mut second = ConversationContext::new();
        walk_to_slot(&f, &quick_config(), &mut first).await;
        walk_to_slot(&f, &quick_config(), &mut second).await;

        let step = handled(
            f.flow
                .handle_reply(&f.scope, &slot_row(&f), &mut first)
                .await
                .expect("first"),
        );
        assert_eq!(step.transition, FlowTransition::Follow(handles::BOOKED));

        let step = handled(
            f.flow
                .handle_reply(&f.scope, &slot_row(&f), &mut second)
                .await
                .expect("second"),
        );
        assert_eq!(step.transition, FlowTransition::Stop);
        assert_eq!(
            step.messages,
            vec![FlowMessage::Text(quick_config().unavailable_message)]
        );
        assert!(second.booking().is_none());
        assert_eq!(f.store.bookings().len(), 1);
    }

    async fn book_once(f: &Fixture) -> Booking {
        let mut ctx = ConversationContext::new();
        walk_to_slot(f, &quick_config(), &mut ctx).await;
        handled(
            f.flow
                .handle_reply(&f.scope, &slot_row(f), &mut ctx)
                .await
                .expect("slot"),
        );
        f.store.bookings().remove(0)
    }

    #[tokio::test]
    async fn check_without_bookings_follows_no_bookings() {
        let f = fixture(1);
        let mut ctx = ConversationContext::new();

        let step = f
            .flow
            .start_check(
                &f.scope,
                &NodeId::from("check"),
                &CheckBookingsConfig::default(),
                &mut ctx,
            )
            .await
            .expect("check");
        assert_eq!(step.transition, FlowTransition::Follow(handles::NO_BOOKINGS));
    }

    #[tokio::test]
    async fn cancel_from_check_list() {
        let f = fixture(1);
        let booking = book_once(&f).await;
        let mut ctx = ConversationContext::new();

        let step = f
            .flow
            .start_check(
                &f.scope,
                &NodeId::from("check"),
                &CheckBookingsConfig::default(),
                &mut ctx,
            )
            .await
            .expect("check");
        assert_eq!(
            list_row_ids(&step),
            vec![
                format!("booking_resched_{}", booking.id),
                format!("booking_cancel_{}", booking.id)
            ]
        );

        let reply = BookingSelection::Cancel(booking.id).row_id();
        let step = handled(f.flow.handle_reply(&f.scope, &reply, &mut ctx).await.expect("cancel"));
        assert_eq!(step.transition, FlowTransition::Follow(handles::UPDATED));
        assert_eq!(f.store.bookings()[0].status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn reschedule_moves_to_new_slot() {
        let f = fixture(1);
        let booking = book_once(&f).await;
        let mut ctx = ConversationContext::new();
        let config = CheckBookingsConfig {
            days_ahead: Some(14),
            ..CheckBookingsConfig::default()
        };
        f.flow
            .start_check(&f.scope, &NodeId::from("check"), &config, &mut ctx)
            .await
            .expect("check");

        let reply = BookingSelection::Reschedule(booking.id).row_id();
        let step = handled(
            f.flow
                .handle_reply(&f.scope, &reply, &mut ctx)
                .await
                .expect("reschedule"),
        );
        let next_monday = monday() + chrono::Days::new(7);
        let new_slot = BookingSelection::NewSlot {
            slot_id: f.slot.id,
            date: next_monday,
        }
        .row_id();
        assert_eq!(list_row_ids(&step), vec![new_slot.clone()]);

        let step = handled(
            f.flow
                .handle_reply(&f.scope, &new_slot, &mut ctx)
                .await
                .expect("new slot"),
        );
        assert_eq!(step.transition, FlowTransition::Follow(handles::UPDATED));
        assert_eq!(
            step.messages,
            vec![FlowMessage::Text(
                "Your appointment has been moved to Mon 16 Mar at 10:30.".to_string()
            )]
        );
        assert_eq!(f.store.bookings()[0].date, next_monday);
    }

    #[tokio::test]
    async fn other_phones_booking_resets_silently() {
        let f = fixture(1);
        let booking = book_once(&f).await;
        let intruder = BookingScope {
            phone: "919800000099".to_string(),
            ..f.scope.clone()
        };
        let mut ctx = ConversationContext::new();
        ctx.replace_booking(Some(BookingState::new(
            NodeId::from("check"),
            BookingFlow::Check(CheckBookingsConfig::default()),
            BookingStep::SelectBooking,
        )));

        let reply = BookingSelection::Cancel(booking.id).row_id();
        let handling = f.flow.handle_reply(&intruder, &reply, &mut ctx).await.expect("reply");

        assert_eq!(handling, ReplyHandling::Rejected);
        assert!(ctx.booking().is_none());
        assert_eq!(f.store.bookings()[0].status, BookingStatus::Confirmed);
    }
}
