//! Expansion of weekly slots into concrete upcoming appointment times.

use crate::model::TimeSlot;
use chrono::{Days, NaiveDate, NaiveTime};

/// Most rows a list message can carry.
pub const MAX_LIST_ROWS: usize = 10;

/// A weekly slot placed on a concrete date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOccurrence {
    pub slot: TimeSlot,
    pub date: NaiveDate,
}

impl SlotOccurrence {
    /// Row title, e.g. `Mon 09 Mar 09:30`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", date_label(self.date), time_label(self.slot.start_time))
    }
}

/// Formats a date the way booking messages show it.
#[must_use]
pub fn date_label(date: NaiveDate) -> String {
    date.format("%a %d %b").to_string()
}

/// Formats a time the way booking messages show it.
#[must_use]
pub fn time_label(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Lists occurrences of `slots` over the next `days_ahead` days starting
/// with `today`, soonest first.
///
/// Times earlier than `now` on `today` are skipped. Inactive slots never
/// occur. The result is not capped; availability filtering happens before
/// any cap is applied.
#[must_use]
pub fn upcoming(
    slots: &[TimeSlot],
    today: NaiveDate,
    now: NaiveTime,
    days_ahead: u32,
) -> Vec<SlotOccurrence> {
    let mut occurrences = Vec::new();
    for offset in 0..u64::from(days_ahead) {
        let Some(date) = today.checked_add_days(Days::new(offset)) else {
            break;
        };
        for slot in slots.iter().filter(|slot| slot.is_active && slot.occurs_on(date)) {
            if date == today && slot.start_time <= now {
                continue;
            }
            occurrences.push(SlotOccurrence {
                slot: slot.clone(),
                date,
            });
        }
    }
    occurrences.sort_by_key(|o| (o.date, o.slot.start_time, o.slot.id));
    occurrences
}
