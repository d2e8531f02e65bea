//! Booking data model.
//!
//! Departments group staff; each staff member has weekly recurring time
//! slots with a capacity; a booking reserves one place in a slot on a
//! concrete date. Booking entities use the numeric ids of the booking
//! tables.

use chatflow_core::AccountId;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! define_numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an id from its numeric value.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the numeric value.
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

define_numeric_id!(
    /// Identifier of a department.
    DepartmentId
);
define_numeric_id!(
    /// Identifier of a staff member.
    StaffId
);
define_numeric_id!(
    /// Identifier of a weekly time slot.
    SlotId
);
define_numeric_id!(
    /// Identifier of a booking.
    BookingId
);

/// A bookable department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub account_id: AccountId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

/// A staff member of a department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: StaffId,
    pub account_id: AccountId,
    pub department_id: DepartmentId,
    pub name: String,
    pub is_active: bool,
}

/// A weekly recurring appointment time for one staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: SlotId,
    pub account_id: AccountId,
    pub staff_id: StaffId,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    /// How many bookings the slot takes on one date.
    pub capacity: u32,
    pub is_active: bool,
}

impl TimeSlot {
    /// Returns true if the slot recurs on `date`.
    #[must_use]
    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        date.weekday() == self.weekday
    }
}

/// Lifecycle of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses from the stored string representation.
    #[must_use]
    pub fn from_str_value(value: &str) -> Option<Self> {
        match value {
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A reserved appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub account_id: AccountId,
    pub department_id: DepartmentId,
    pub staff_id: StaffId,
    pub slot_id: SlotId,
    pub phone: String,
    pub customer_name: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub custom_answer_1: Option<String>,
    pub custom_answer_2: Option<String>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields of a booking about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub account_id: AccountId,
    pub department_id: DepartmentId,
    pub staff_id: StaffId,
    pub slot_id: SlotId,
    pub phone: String,
    pub customer_name: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub custom_answer_1: Option<String>,
    pub custom_answer_2: Option<String>,
}

/// Occupancy of a staff member's time on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAvailability {
    pub available: bool,
    pub existing_count: u32,
    pub capacity: u32,
}

impl SlotAvailability {
    /// Computes availability from a count and a capacity.
    #[must_use]
    pub const fn from_counts(existing_count: u32, capacity: u32) -> Self {
        Self {
            available: existing_count < capacity,
            existing_count,
            capacity,
        }
    }

    /// Availability of a time no slot covers.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self::from_counts(0, 0)
    }
}
