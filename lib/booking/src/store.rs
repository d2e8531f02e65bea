//! Booking data store.

use crate::error::BookingError;
use crate::model::{
    Booking, BookingId, BookingStatus, Department, DepartmentId, NewBooking, SlotAvailability,
    SlotId, Staff, StaffId, TimeSlot,
};
use async_trait::async_trait;
use chatflow_core::AccountId;
use chrono::{NaiveDate, NaiveTime, Utc, Weekday};
use rootcause::Report;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Result of an attempt to take a place in a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The booking was written.
    Created(Booking),
    /// The slot filled up since it was listed.
    SlotFull(SlotAvailability),
}

/// Storage for departments, staff, slots and bookings.
///
/// Lookups by id are scoped to an account and return `None` for
/// entities of another account, so a spoofed id behaves like a missing
/// one.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Lists active departments of an account.
    async fn list_departments(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Department>, Report<BookingError>>;

    /// Gets an active department.
    async fn get_department(
        &self,
        account_id: AccountId,
        id: DepartmentId,
    ) -> Result<Option<Department>, Report<BookingError>>;

    /// Lists active staff of a department.
    async fn list_staff(
        &self,
        account_id: AccountId,
        department_id: DepartmentId,
    ) -> Result<Vec<Staff>, Report<BookingError>>;

    /// Gets an active staff member.
    async fn get_staff(
        &self,
        account_id: AccountId,
        id: StaffId,
    ) -> Result<Option<Staff>, Report<BookingError>>;

    /// Lists active weekly slots of a staff member.
    async fn list_slots(
        &self,
        account_id: AccountId,
        staff_id: StaffId,
    ) -> Result<Vec<TimeSlot>, Report<BookingError>>;

    /// Gets an active slot.
    async fn get_slot(
        &self,
        account_id: AccountId,
        id: SlotId,
    ) -> Result<Option<TimeSlot>, Report<BookingError>>;

    /// Reports how full a staff member's time is on a date.
    ///
    /// `excluding` leaves one booking out of the count, for reschedules.
    async fn check_slot_availability(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        time: NaiveTime,
        excluding: Option<BookingId>,
    ) -> Result<SlotAvailability, Report<BookingError>>;

    /// Creates a confirmed booking if its slot still has room.
    ///
    /// The availability check and the insert are atomic.
    async fn create_booking(
        &self,
        booking: NewBooking,
    ) -> Result<CreateOutcome, Report<BookingError>>;

    /// Lists confirmed bookings of a phone on or after `from`, soonest first.
    async fn list_upcoming_bookings(
        &self,
        account_id: AccountId,
        phone: &str,
        from: NaiveDate,
    ) -> Result<Vec<Booking>, Report<BookingError>>;

    /// Gets a booking.
    async fn get_booking(
        &self,
        account_id: AccountId,
        id: BookingId,
    ) -> Result<Option<Booking>, Report<BookingError>>;

    /// Cancels a confirmed booking. Returns false if there was none.
    async fn cancel_booking(
        &self,
        account_id: AccountId,
        id: BookingId,
    ) -> Result<bool, Report<BookingError>>;

    /// Moves a confirmed booking to another slot and date.
    ///
    /// Returns `None` if the booking does not exist. The availability
    /// check (ignoring the booking itself) and the update are atomic.
    async fn reschedule_booking(
        &self,
        account_id: AccountId,
        id: BookingId,
        slot: &TimeSlot,
        date: NaiveDate,
    ) -> Result<Option<CreateOutcome>, Report<BookingError>>;
}

#[derive(Debug, Default)]
struct Tables {
    departments: Vec<Department>,
    staff: Vec<Staff>,
    slots: Vec<TimeSlot>,
    bookings: Vec<Booking>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn availability(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        time: NaiveTime,
        excluding: Option<BookingId>,
    ) -> SlotAvailability {
        let Some(slot) = self.slots.iter().find(|slot| {
            slot.is_active && slot.staff_id == staff_id && slot.start_time == time && slot.occurs_on(date)
        }) else {
            return SlotAvailability::unavailable();
        };
        let existing = self
            .bookings
            .iter()
            .filter(|booking| {
                booking.status == BookingStatus::Confirmed
                    && booking.staff_id == staff_id
                    && booking.date == date
                    && booking.time == time
                    && Some(booking.id) != excluding
            })
            .count();
        SlotAvailability::from_counts(u32::try_from(existing).unwrap_or(u32::MAX), slot.capacity)
    }
}

/// In-memory booking store for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryBookingStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Tables>, BookingError> {
        self.tables.lock().map_err(|e| BookingError::StorageFailed {
            operation,
            reason: e.to_string(),
        })
    }

    /// Adds an active department.
    #[must_use]
    pub fn add_department(&self, account_id: AccountId, name: &str) -> Department {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let department = Department {
            id: DepartmentId::new(tables.next_id()),
            account_id,
            name: name.to_string(),
            description: None,
            is_active: true,
        };
        tables.departments.push(department.clone());
        department
    }

    /// Adds an active staff member.
    #[must_use]
    pub fn add_staff(&self, account_id: AccountId, department_id: DepartmentId, name: &str) -> Staff {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let staff = Staff {
            id: StaffId::new(tables.next_id()),
            account_id,
            department_id,
            name: name.to_string(),
            is_active: true,
        };
        tables.staff.push(staff.clone());
        staff
    }

    /// Adds an active weekly slot.
    #[must_use]
    pub fn add_slot(
        &self,
        account_id: AccountId,
        staff_id: StaffId,
        weekday: Weekday,
        start_time: NaiveTime,
        capacity: u32,
    ) -> TimeSlot {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = TimeSlot {
            id: SlotId::new(tables.next_id()),
            account_id,
            staff_id,
            weekday,
            start_time,
            capacity,
            is_active: true,
        };
        tables.slots.push(slot.clone());
        slot
    }

    /// Returns every stored booking.
    #[must_use]
    pub fn bookings(&self) -> Vec<Booking> {
        self.tables
            .lock()
            .map(|tables| tables.bookings.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn list_departments(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Department>, Report<BookingError>> {
        let tables = self.lock("list_departments")?;
        Ok(tables
            .departments
            .iter()
            .filter(|d| d.account_id == account_id && d.is_active)
            .cloned()
            .collect())
    }

    async fn get_department(
        &self,
        account_id: AccountId,
        id: DepartmentId,
    ) -> Result<Option<Department>, Report<BookingError>> {
        let tables = self.lock("get_department")?;
        Ok(tables
            .departments
            .iter()
            .find(|d| d.id == id && d.account_id == account_id && d.is_active)
            .cloned())
    }

    async fn list_staff(
        &self,
        account_id: AccountId,
        department_id: DepartmentId,
    ) -> Result<Vec<Staff>, Report<BookingError>> {
        let tables = self.lock("list_staff")?;
        Ok(tables
            .staff
            .iter()
            .filter(|s| s.account_id == account_id && s.department_id == department_id && s.is_active)
            .cloned()
            .collect())
    }

    async fn get_staff(
        &self,
        account_id: AccountId,
        id: StaffId,
    ) -> Result<Option<Staff>, Report<BookingError>> {
        let tables = self.lock("get_staff")?;
        Ok(tables
            .staff
            .iter()
            .find(|s| s.id == id && s.account_id == account_id && s.is_active)
            .cloned())
    }

    async fn list_slots(
        &self,
        account_id: AccountId,
        staff_id: StaffId,
    ) -> Result<Vec<TimeSlot>, Report<BookingError>> {
        let tables = self.lock("list_slots")?;
        Ok(tables
            .slots
            .iter()
            .filter(|s| s.account_id == account_id && s.staff_id == staff_id && s.is_active)
            .cloned()
            .collect())
    }

    async fn get_slot(
        &self,
        account_id: AccountId,
        id: SlotId,
    ) -> Result<Option<TimeSlot>, Report<BookingError>> {
        let tables = self.lock("get_slot")?;
        Ok(tables
            .slots
            .iter()
            .find(|s| s.id == id && s.account_id == account_id && s.is_active)
            .cloned())
    }

    async fn check_slot_availability(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        time: NaiveTime,
        excluding: Option<BookingId>,
    ) -> Result<SlotAvailability, Report<BookingError>> {
        let tables = self.lock("check_slot_availability")?;
        Ok(tables.availability(staff_id, date, time, excluding))
    }

    async fn create_booking(
        &self,
        booking: NewBooking,
    ) -> Result<CreateOutcome, Report<BookingError>> {
        let mut tables = self.lock("create_booking")?;
        let availability = tables.availability(booking.staff_id, booking.date, booking.time, None);
        if !availability.available {
            return Ok(CreateOutcome::SlotFull(availability));
        }
        let created = Booking {
            id: BookingId::new(tables.next_id()),
            account_id: booking.account_id,
            department_id: booking.department_id,
            staff_id: booking.staff_id,
            slot_id: booking.slot_id,
            phone: booking.phone,
            customer_name: booking.customer_name,
            date: booking.date,
            time: booking.time,
            custom_answer_1: booking.custom_answer_1,
            custom_answer_2: booking.custom_answer_2,
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
        };
        tables.bookings.push(created.clone());
        Ok(CreateOutcome::Created(created))
    }

    async fn list_upcoming_bookings(
        &self,
        account_id: AccountId,
        phone: &str,
        from: NaiveDate,
    ) -> Result<Vec<Booking>, Report<BookingError>> {
        let tables = self.lock("list_upcoming_bookings")?;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .iter()
            .filter(|b| {
                b.account_id == account_id
                    && b.phone == phone
                    && b.status == BookingStatus::Confirmed
                    && b.date >= from
            })
            .cloned()
            .collect();
        bookings.sort_by_key(|b| (b.date, b.time));
        Ok(bookings)
    }

    async fn get_booking(
        &self,
        account_id: AccountId,
        id: BookingId,
    ) -> Result<Option<Booking>, Report<BookingError>> {
        let tables = self.lock("get_booking")?;
        Ok(tables
            .bookings
            .iter()
            .find(|b| b.id == id && b.account_id == account_id)
            .cloned())
    }

    async fn cancel_booking(
        &self,
        account_id: AccountId,
        id: BookingId,
    ) -> Result<bool, Report<BookingError>> {
        let mut tables = self.lock("cancel_booking")?;
        let booking = tables.bookings.iter_mut().find(|b| {
            b.id == id && b.account_id == account_id && b.status == BookingStatus::Confirmed
        });
        Ok(match booking {
            Some(booking) => {
                booking.status = BookingStatus::Cancelled;
                true
            }
            None => false,
        })
    }

    async fn reschedule_booking(
        &self,
        account_id: AccountId,
        id: BookingId,
        slot: &TimeSlot,
        date: NaiveDate,
    ) -> Result<Option<CreateOutcome>, Report<BookingError>> {
        let mut tables = self.lock("reschedule_booking")?;
        let availability = tables.availability(slot.staff_id, date, slot.start_time, Some(id));
        let Some(booking) = tables.bookings.iter_mut().find(|b| {
            b.id == id && b.account_id == account_id && b.status == BookingStatus::Confirmed
        }) else {
            return Ok(None);
        };
        if !availability.available {
            return Ok(Some(CreateOutcome::SlotFull(availability)));
        }
        booking.slot_id = slot.id;
        booking.staff_id = slot.staff_id;
        booking.date = date;
        booking.time = slot.start_time;
        Ok(Some(CreateOutcome::Created(booking.clone())))
    }
}
