//! Booking departments, staff, weekly slots and bookings.

use super::decode_error;
use async_trait::async_trait;
use chatflow_booking::{
    Booking, BookingError, BookingId, BookingStatus, BookingStore, CreateOutcome, Department,
    DepartmentId, NewBooking, SlotAvailability, SlotId, Staff, StaffId, TimeSlot,
};
use chatflow_core::AccountId;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use rootcause::Report;
use sqlx::{FromRow, PgConnection, PgPool};
use std::str::FromStr;

fn parse_account(value: &str) -> Result<AccountId, sqlx::Error> {
    AccountId::from_str(value).map_err(|e| decode_error("account id", value, e))
}

fn weekday_number(weekday: Weekday) -> i16 {
    // Monday is 0.
    i16::try_from(weekday.num_days_from_monday()).unwrap_or_default()
}

/// Row type for department queries.
#[derive(FromRow)]
struct DepartmentRow {
    id: i64,
    account_id: String,
    name: String,
    description: Option<String>,
    is_active: bool,
}

impl DepartmentRow {
    fn try_into_department(self) -> Result<Department, sqlx::Error> {
        Ok(Department {
            id: DepartmentId::new(self.id),
            account_id: parse_account(&self.account_id)?,
            name: self.name,
            description: self.description,
            is_active: self.is_active,
        })
    }
}

/// Row type for staff queries.
#[derive(FromRow)]
struct StaffRow {
    id: i64,
    account_id: String,
    department_id: i64,
    name: String,
    is_active: bool,
}

impl StaffRow {
    fn try_into_staff(self) -> Result<Staff, sqlx::Error> {
        Ok(Staff {
            id: StaffId::new(self.id),
            account_id: parse_account(&self.account_id)?,
            department_id: DepartmentId::new(self.department_id),
            name: self.name,
            is_active: self.is_active,
        })
    }
}

/// Row type for slot queries.
#[derive(FromRow)]
struct SlotRow {
    id: i64,
    account_id: String,
    staff_id: i64,
    weekday: i16,
    start_time: NaiveTime,
    capacity: i32,
    is_active: bool,
}

impl SlotRow {
    fn try_into_slot(self) -> Result<TimeSlot, sqlx::Error> {
        let weekday = u8::try_from(self.weekday)
            .ok()
            .and_then(|day| Weekday::try_from(day).ok())
            .ok_or_else(|| decode_error("weekday", &self.weekday.to_string(), "out of range"))?;
        let capacity = u32::try_from(self.capacity)
            .map_err(|e| decode_error("capacity", &self.capacity.to_string(), e))?;
        Ok(TimeSlot {
            id: SlotId::new(self.id),
            account_id: parse_account(&self.account_id)?,
            staff_id: StaffId::new(self.staff_id),
            weekday,
            start_time: self.start_time,
            capacity,
            is_active: self.is_active,
        })
    }
}

/// The slot columns read under the creation lock.
#[derive(FromRow)]
struct SlotLockRow {
    staff_id: i64,
    weekday: i16,
    start_time: NaiveTime,
    capacity: i32,
}

impl SlotLockRow {
    /// Whether the slot belongs to `staff_id` and starts at `time` on `date`.
    fn serves(&self, staff_id: StaffId, date: NaiveDate, time: NaiveTime) -> bool {
        self.staff_id == staff_id.get()
            && self.weekday == weekday_number(date.weekday())
            && self.start_time == time
    }

    fn capacity(&self) -> u32 {
        u32::try_from(self.capacity).unwrap_or(0)
    }
}

/// Row type for booking queries.
#[derive(FromRow)]
struct BookingRow {
    id: i64,
    account_id: String,
    department_id: i64,
    staff_id: i64,
    slot_id: i64,
    phone: String,
    customer_name: Option<String>,
    booking_date: NaiveDate,
    booking_time: NaiveTime,
    custom_answer_1: Option<String>,
    custom_answer_2: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl BookingRow {
    fn try_into_booking(self) -> Result<Booking, sqlx::Error> {
        let status = BookingStatus::from_str_value(&self.status)
            .ok_or_else(|| decode_error("booking status", &self.status, "unknown status"))?;
        Ok(Booking {
            id: BookingId::new(self.id),
            account_id: parse_account(&self.account_id)?,
            department_id: DepartmentId::new(self.department_id),
            staff_id: StaffId::new(self.staff_id),
            slot_id: SlotId::new(self.slot_id),
            phone: self.phone,
            customer_name: self.customer_name,
            date: self.booking_date,
            time: self.booking_time,
            custom_answer_1: self.custom_answer_1,
            custom_answer_2: self.custom_answer_2,
            status,
            created_at: self.created_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, account_id, department_id, staff_id, slot_id, phone, \
    customer_name, booking_date, booking_time, custom_answer_1, custom_answer_2, status, \
    created_at";

/// Postgres-backed booking store.
///
/// Creating and rescheduling lock the chosen slot row by id before
/// counting, so two customers racing for the last place cannot both win it.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn storage_error(operation: &'static str, error: &sqlx::Error) -> BookingError {
        BookingError::StorageFailed {
            operation,
            reason: error.to_string(),
        }
    }

    // Locks the slot row; every writer for the slot queues behind it.
    async fn lock_slot(
        conn: &mut PgConnection,
        slot_id: SlotId,
    ) -> Result<Option<SlotLockRow>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT staff_id, weekday, start_time, capacity FROM booking_slots
            WHERE id = $1 AND is_active
            FOR UPDATE
            "#,
        )
        .bind(slot_id.get())
        .fetch_optional(&mut *conn)
        .await
    }

    async fn confirmed_count(
        conn: &mut PgConnection,
        staff_id: StaffId,
        date: NaiveDate,
        time: NaiveTime,
        excluding: Option<BookingId>,
    ) -> Result<u32, sqlx::Error> {
        let (existing,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM bookings
            WHERE staff_id = $1 AND booking_date = $2 AND booking_time = $3
              AND status = 'confirmed' AND ($4::BIGINT IS NULL OR id <> $4)
            "#,
        )
        .bind(staff_id.get())
        .bind(date)
        .bind(time)
        .bind(excluding.map(|id| id.get()))
        .fetch_one(&mut *conn)
        .await?;
        Ok(u32::try_from(existing).unwrap_or(u32::MAX))
    }

    // Availability of one slot on `date`, holding the slot lock until the
    // surrounding transaction ends.
    async fn locked_availability(
        conn: &mut PgConnection,
        slot_id: SlotId,
        staff_id: StaffId,
        date: NaiveDate,
        time: NaiveTime,
        excluding: Option<BookingId>,
    ) -> Result<SlotAvailability, sqlx::Error> {
        let Some(slot) = Self::lock_slot(conn, slot_id).await? else {
            return Ok(SlotAvailability::unavailable());
        };
        if !slot.serves(staff_id, date, time) {
            return Ok(SlotAvailability::unavailable());
        }
        let existing = Self::confirmed_count(conn, staff_id, date, time, excluding).await?;
        Ok(SlotAvailability::from_counts(existing, slot.capacity()))
    }

    async fn read_availability(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        time: NaiveTime,
        excluding: Option<BookingId>,
    ) -> Result<SlotAvailability, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        let capacity: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT capacity FROM booking_slots
            WHERE staff_id = $1 AND weekday = $2 AND start_time = $3 AND is_active
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(staff_id.get())
        .bind(weekday_number(date.weekday()))
        .bind(time)
        .fetch_optional(&mut *conn)
        .await?;
        let Some((capacity,)) = capacity else {
            return Ok(SlotAvailability::unavailable());
        };
        let existing = Self::confirmed_count(&mut conn, staff_id, date, time, excluding).await?;
        Ok(SlotAvailability::from_counts(
            existing,
            u32::try_from(capacity).unwrap_or(0),
        ))
    }

    async fn insert_booking(
        conn: &mut PgConnection,
        booking: NewBooking,
    ) -> Result<Booking, sqlx::Error> {
        let row: BookingRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO bookings
                (account_id, department_id, staff_id, slot_id, phone, customer_name,
                 booking_date, booking_time, custom_answer_1, custom_answer_2, status,
                 created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'confirmed', NOW())
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking.account_id.to_string())
        .bind(booking.department_id.get())
        .bind(booking.staff_id.get())
        .bind(booking.slot_id.get())
        .bind(&booking.phone)
        .bind(&booking.customer_name)
        .bind(booking.date)
        .bind(booking.time)
        .bind(&booking.custom_answer_1)
        .bind(&booking.custom_answer_2)
        .fetch_one(&mut *conn)
        .await?;
        row.try_into_booking()
    }

    async fn create_in_transaction(&self, booking: NewBooking) -> Result<CreateOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let availability = Self::locked_availability(
            &mut tx,
            booking.slot_id,
            booking.staff_id,
            booking.date,
            booking.time,
            None,
        )
        .await?;
        if !availability.available {
            tx.rollback().await?;
            return Ok(CreateOutcome::SlotFull(availability));
        }
        let created = Self::insert_booking(&mut tx, booking).await?;
        tx.commit().await?;
        Ok(CreateOutcome::Created(created))
    }

    async fn reschedule_in_transaction(
        &self,
        account_id: AccountId,
        id: BookingId,
        slot: &TimeSlot,
        date: NaiveDate,
    ) -> Result<Option<CreateOutcome>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let existing: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM bookings
            WHERE id = $1 AND account_id = $2 AND status = 'confirmed'
            FOR UPDATE
            "#,
        )
        .bind(id.get())
        .bind(account_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let availability = Self::locked_availability(
            &mut tx,
            slot.id,
            slot.staff_id,
            date,
            slot.start_time,
            Some(id),
        )
        .await?;
        if !availability.available {
            tx.rollback().await?;
            return Ok(Some(CreateOutcome::SlotFull(availability)));
        }

        let row: BookingRow = sqlx::query_as(&format!(
            r#"
            UPDATE bookings
            SET slot_id = $3, staff_id = $4, booking_date = $5, booking_time = $6
            WHERE id = $1 AND account_id = $2
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(account_id.to_string())
        .bind(slot.id.get())
        .bind(slot.staff_id.get())
        .bind(date)
        .bind(slot.start_time)
        .fetch_one(&mut *tx)
        .await?;
        let booking = row.try_into_booking()?;
        tx.commit().await?;
        Ok(Some(CreateOutcome::Created(booking)))
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn list_departments(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Department>, Report<BookingError>> {
        let rows: Vec<DepartmentRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, name, description, is_active
            FROM booking_departments
            WHERE account_id = $1 AND is_active
            ORDER BY id
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::storage_error("list_departments", &e))?;

        let departments = rows
            .into_iter()
            .map(DepartmentRow::try_into_department)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Self::storage_error("list_departments", &e))?;
        Ok(departments)
    }

    async fn get_department(
        &self,
        account_id: AccountId,
        id: DepartmentId,
    ) -> Result<Option<Department>, Report<BookingError>> {
        let row: Option<DepartmentRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, name, description, is_active
            FROM booking_departments
            WHERE id = $1 AND account_id = $2 AND is_active
            "#,
        )
        .bind(id.get())
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::storage_error("get_department", &e))?;

        Ok(row
            .map(DepartmentRow::try_into_department)
            .transpose()
            .map_err(|e| Self::storage_error("get_department", &e))?)
    }

    async fn list_staff(
        &self,
        account_id: AccountId,
        department_id: DepartmentId,
    ) -> Result<Vec<Staff>, Report<BookingError>> {
        let rows: Vec<StaffRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, department_id, name, is_active
            FROM booking_staff
            WHERE account_id = $1 AND department_id = $2 AND is_active
            ORDER BY id
            "#,
        )
        .bind(account_id.to_string())
        .bind(department_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::storage_error("list_staff", &e))?;

        let staff = rows
            .into_iter()
            .map(StaffRow::try_into_staff)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Self::storage_error("list_staff", &e))?;
        Ok(staff)
    }

    async fn get_staff(
        &self,
        account_id: AccountId,
        id: StaffId,
    ) -> Result<Option<Staff>, Report<BookingError>> {
        let row: Option<StaffRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, department_id, name, is_active
            FROM booking_staff
            WHERE id = $1 AND account_id = $2 AND is_active
            "#,
        )
        .bind(id.get())
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::storage_error("get_staff", &e))?;

        Ok(row
            .map(StaffRow::try_into_staff)
            .transpose()
            .map_err(|e| Self::storage_error("get_staff", &e))?)
    }

    async fn list_slots(
        &self,
        account_id: AccountId,
        staff_id: StaffId,
    ) -> Result<Vec<TimeSlot>, Report<BookingError>> {
        let rows: Vec<SlotRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, staff_id, weekday, start_time, capacity, is_active
            FROM booking_slots
            WHERE account_id = $1 AND staff_id = $2 AND is_active
            ORDER BY weekday, start_time, id
            "#,
        )
        .bind(account_id.to_string())
        .bind(staff_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::storage_error("list_slots", &e))?;

        let slots = rows
            .into_iter()
            .map(SlotRow::try_into_slot)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Self::storage_error("list_slots", &e))?;
        Ok(slots)
    }

    async fn get_slot(
        &self,
        account_id: AccountId,
        id: SlotId,
    ) -> Result<Option<TimeSlot>, Report<BookingError>> {
        let row: Option<SlotRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, staff_id, weekday, start_time, capacity, is_active
            FROM booking_slots
            WHERE id = $1 AND account_id = $2 AND is_active
            "#,
        )
        .bind(id.get())
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::storage_error("get_slot", &e))?;

        Ok(row
            .map(SlotRow::try_into_slot)
            .transpose()
            .map_err(|e| Self::storage_error("get_slot", &e))?)
    }

    async fn check_slot_availability(
        &self,
        staff_id: StaffId,
        date: NaiveDate,
        time: NaiveTime,
        excluding: Option<BookingId>,
    ) -> Result<SlotAvailability, Report<BookingError>> {
        Ok(self
            .read_availability(staff_id, date, time, excluding)
            .await
            .map_err(|e| Self::storage_error("check_slot_availability", &e))?)
    }

    async fn create_booking(
        &self,
        booking: NewBooking,
    ) -> Result<CreateOutcome, Report<BookingError>> {
        Ok(self
            .create_in_transaction(booking)
            .await
            .map_err(|e| Self::storage_error("create_booking", &e))?)
    }

    async fn list_upcoming_bookings(
        &self,
        account_id: AccountId,
        phone: &str,
        from: NaiveDate,
    ) -> Result<Vec<Booking>, Report<BookingError>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE account_id = $1 AND phone = $2 AND status = 'confirmed'
              AND booking_date >= $3
            ORDER BY booking_date, booking_time, id
            "#
        ))
        .bind(account_id.to_string())
        .bind(phone)
        .bind(from)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::storage_error("list_upcoming_bookings", &e))?;

        let bookings = rows
            .into_iter()
            .map(BookingRow::try_into_booking)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Self::storage_error("list_upcoming_bookings", &e))?;
        Ok(bookings)
    }

    async fn get_booking(
        &self,
        account_id: AccountId,
        id: BookingId,
    ) -> Result<Option<Booking>, Report<BookingError>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 AND account_id = $2"
        ))
        .bind(id.get())
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::storage_error("get_booking", &e))?;

        Ok(row
            .map(BookingRow::try_into_booking)
            .transpose()
            .map_err(|e| Self::storage_error("get_booking", &e))?)
    }

    async fn cancel_booking(
        &self,
        account_id: AccountId,
        id: BookingId,
    ) -> Result<bool, Report<BookingError>> {
        let result = sqlx::query(
            r#"
            UPDATE bookings SET status = 'cancelled'
            WHERE id = $1 AND account_id = $2 AND status = 'confirmed'
            "#,
        )
        .bind(id.get())
        .bind(account_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::storage_error("cancel_booking", &e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn reschedule_booking(
        &self,
        account_id: AccountId,
        id: BookingId,
        slot: &TimeSlot,
        date: NaiveDate,
    ) -> Result<Option<CreateOutcome>, Report<BookingError>> {
        Ok(self
            .reschedule_in_transaction(account_id, id, slot, date)
            .await
            .map_err(|e| Self::storage_error("reschedule_booking", &e))?)
    }
}
