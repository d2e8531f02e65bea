//! Reply ids of booking list rows.
//!
//! Every row the booking sub-flow sends carries an id that encodes the
//! selection, so a later reply can be routed back without looking at the
//! graph:
//!
//! | Row | Id |
//! |---|---|
//! | department | `booking_dept_<id>` |
//! | staff | `booking_staff_<id>` |
//! | slot | `booking_slot_<slot>_<yyyymmdd>` |
//! | reschedule | `booking_resched_<booking>` |
//! | cancel | `booking_cancel_<booking>` |
//! | new slot | `booking_newslot_<slot>_<yyyymmdd>` |
//!
//! The `booking_` prefix is optional when parsing.

use crate::model::{BookingId, DepartmentId, SlotId, StaffId};
use chrono::NaiveDate;
use std::fmt;

const PREFIX: &str = "booking_";
const DATE_FORMAT: &str = "%Y%m%d";

/// A decoded booking row selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingSelection {
    Department(DepartmentId),
    Staff(StaffId),
    Slot { slot_id: SlotId, date: NaiveDate },
    Reschedule(BookingId),
    Cancel(BookingId),
    NewSlot { slot_id: SlotId, date: NaiveDate },
}

impl BookingSelection {
    /// Returns the row id for this selection.
    #[must_use]
    pub fn row_id(&self) -> String {
        match self {
            Self::Department(id) => format!("{PREFIX}dept_{id}"),
            Self::Staff(id) => format!("{PREFIX}staff_{id}"),
            Self::Slot { slot_id, date } => {
                format!("{PREFIX}slot_{slot_id}_{}", date.format(DATE_FORMAT))
            }
            Self::Reschedule(id) => format!("{PREFIX}resched_{id}"),
            Self::Cancel(id) => format!("{PREFIX}cancel_{id}"),
            Self::NewSlot { slot_id, date } => {
                format!("{PREFIX}newslot_{slot_id}_{}", date.format(DATE_FORMAT))
            }
        }
    }

    /// Decodes a logical reply id. Returns `None` for ids that are not
    /// booking rows.
    #[must_use]
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.strip_prefix(PREFIX).unwrap_or(id);
        let (kind, rest) = id.split_once('_')?;
        match kind {
            "dept" => rest.parse().ok().map(Self::Department),
            "staff" => rest.parse().ok().map(Self::Staff),
            "resched" => rest.parse().ok().map(Self::Reschedule),
            "cancel" => rest.parse().ok().map(Self::Cancel),
            "slot" => {
                let (slot_id, date) = parse_slot(rest)?;
                Some(Self::Slot { slot_id, date })
            }
            "newslot" => {
                let (slot_id, date) = parse_slot(rest)?;
                Some(Self::NewSlot { slot_id, date })
            }
            _ => None,
        }
    }
}

impl fmt::Display for BookingSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.row_id())
    }
}

fn parse_slot(rest: &str) -> Option<(SlotId, NaiveDate)> {
    let (slot, date) = rest.split_once('_')?;
    let slot_id = slot.parse().ok()?;
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
    Some((slot_id, date))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).expect("date")
    }

    #[test]
    fn row_ids_encode_the_selection() {
        assert_eq!(
            BookingSelection::Department(DepartmentId::new(7)).row_id(),
            "booking_dept_7"
        );
        assert_eq!(
            BookingSelection::Slot {
                slot_id: SlotId::new(12),
                date: date()
            }
            .row_id(),
            "booking_slot_12_20260309"
        );
        assert_eq!(
            BookingSelection::Cancel(BookingId::new(3)).row_id(),
            "booking_cancel_3"
        );
    }

    #[test]
    fn parses_prefixed_and_bare_ids() {
        assert_eq!(
            BookingSelection::parse("booking_dept_7"),
            Some(BookingSelection::Department(DepartmentId::new(7)))
        );
        assert_eq!(
            BookingSelection::parse("dept_7"),
            Some(BookingSelection::Department(DepartmentId::new(7)))
        );
        assert_eq!(
            BookingSelection::parse("booking_newslot_4_20260309"),
            Some(BookingSelection::NewSlot {
                slot_id: SlotId::new(4),
                date: date()
            })
        );
    }

    #[test]
    fn rejects_foreign_and_malformed_ids() {
        assert_eq!(BookingSelection::parse("btn_yes"), None);
        assert_eq!(BookingSelection::parse("booking_dept_x"), None);
        assert_eq!(BookingSelection::parse("booking_slot_4"), None);
        assert_eq!(BookingSelection::parse("booking_slot_4_20261399"), None);
        assert_eq!(BookingSelection::parse("success"), None);
    }

    #[test]
    fn parse_inverts_row_id() {
        let selection = BookingSelection::Reschedule(BookingId::new(41));
        assert_eq!(BookingSelection::parse(&selection.to_string()), Some(selection));
    }
}
