//! Appointment booking for the chatflow engine.
//!
//! This crate provides:
//!
//! - **Booking Model**: departments, staff, weekly time slots and bookings
//! - **Booking Store**: the data store seam, including the atomic
//!   capacity-checked booking creation
//! - **Selections**: the `booking_*` reply ids carried by booking lists
//! - **Booking Sub-Flow**: the state machine that walks a customer from
//!   department to confirmed booking, and through cancelling or moving an
//!   existing booking

pub mod error;
pub mod flow;
pub mod model;
pub mod selection;
pub mod slots;
pub mod store;

pub use error::BookingError;
pub use flow::{BookingScope, BookingSubFlow, FlowMessage, FlowStep, FlowTransition, ReplyHandling};
pub use model::{
    Booking, BookingId, BookingStatus, Department, DepartmentId, NewBooking, SlotAvailability,
    SlotId, Staff, StaffId, TimeSlot,
};
pub use selection::BookingSelection;
pub use store::{BookingStore, CreateOutcome, InMemoryBookingStore};
