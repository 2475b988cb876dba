//! Signed day-offset windows around an anchor record.
//!
//! ## Algorithm
//! 1. Shift the anchor date by the offset (negative looks back, positive forward)
//! 2. The window is the closed interval between the two dates, so the bounds
//!    are swapped automatically for negative offsets
//! 3. A record matches when user and proposition equal the anchor's and its
//!    date falls inside the window
//!
//! Matching is a plain filter over the slice. Records may arrive in any
//! order and the result is only ever counted or summed.

use crate::traits::TimedRecord;
use chrono::{Days, NaiveDate};

/// Look-back offsets for "seen before purchase" counts
pub const PRIOR_VIEW_OFFSETS: [i64; 3] = [-30, -7, -1];

/// Look-ahead offsets for "purchased after view" counts
pub const FOLLOWING_PURCHASE_OFFSETS: [i64; 2] = [7, 30];

/// Closed date interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Window between `anchor` and `anchor + offset_days`, inclusive.
    ///
    /// Offsets that leave chrono's date range saturate at its bounds.
    pub fn around(anchor: NaiveDate, offset_days: i64) -> Self {
        Self::between(anchor, shift(anchor, offset_days))
    }

    /// Window between two dates given in either order
    pub fn between(a: NaiveDate, b: NaiveDate) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Everything on or before `cutoff`
    pub fn up_to(cutoff: NaiveDate) -> Self {
        Self {
            start: NaiveDate::MIN,
            end: cutoff,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

fn shift(anchor: NaiveDate, offset_days: i64) -> NaiveDate {
    let days = Days::new(offset_days.unsigned_abs());
    if offset_days >= 0 {
        anchor.checked_add_days(days).unwrap_or(NaiveDate::MAX)
    } else {
        anchor.checked_sub_days(days).unwrap_or(NaiveDate::MIN)
    }
}

/// The (user, proposition, date) triple aggregates are computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor<'a> {
    pub user_id: &'a str,
    pub proposition_id: &'a str,
    pub date: NaiveDate,
}

impl<'a> Anchor<'a> {
    pub fn new(user_id: &'a str, proposition_id: &'a str, date: NaiveDate) -> Self {
        Self {
            user_id,
            proposition_id,
            date,
        }
    }

    /// Anchor on an existing record
    pub fn of<R: TimedRecord>(record: &'a R) -> Self {
        Self::new(record.user_id(), record.proposition_id(), record.date())
    }

    fn matches<R: TimedRecord>(&self, record: &R) -> bool {
        record.user_id() == self.user_id && record.proposition_id() == self.proposition_id
    }
}

/// Records with the anchor's user and proposition inside an explicit window
pub fn records_in<'r, R: TimedRecord>(records: &'r [R], anchor: &Anchor<'_>, window: DateWindow) -> Vec<&'r R> {
    records
        .iter()
        .filter(|record| anchor.matches(*record) && window.contains(record.date()))
        .collect()
}

/// Records with the anchor's user and proposition within `offset_days` of
/// the anchor date (see [`DateWindow::around`])
pub fn records_in_window<'r, R: TimedRecord>(records: &'r [R], anchor: &Anchor<'_>, offset_days: i64) -> Vec<&'r R> {
    records_in(records, anchor, DateWindow::around(anchor.date, offset_days))
}

/// Count of [`records_in_window`], 0 when nothing matches
pub fn count_in_window<R: TimedRecord>(records: &[R], anchor: &Anchor<'_>, offset_days: i64) -> usize {
    let window = DateWindow::around(anchor.date, offset_days);
    records
        .iter()
        .filter(|record| anchor.matches(*record) && window.contains(record.date()))
        .count()
}
