//! Working-calendar policy
//!
//! Immutable description of the business calendar: the daily work window,
//! the lunch exclusion, the workday set, and the fixed timezone every
//! civil-time decision is made in. Pure data, shared read-only.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use chrono_tz::Tz;
use thiserror::Error;

pub const MINUTES_IN_HOUR: u32 = 60;
pub const MINUTES_IN_DAY: u32 = 24 * 60;

/// Half-open interval of minutes from midnight: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteWindow {
    pub start: u32,
    pub end: u32,
}

impl MinuteWindow {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, minute: u32) -> bool {
        minute >= self.start && minute < self.end
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The windows must satisfy
    /// `0 <= work.start < lunch.start < lunch.end < work.end <= 1440`.
    #[error("calendar windows out of order: work {work_start}..{work_end}, lunch {lunch_start}..{lunch_end}")]
    WindowsOutOfOrder {
        work_start: u32,
        work_end: u32,
        lunch_start: u32,
        lunch_end: u32,
    },
    #[error("no working weekdays configured")]
    NoWorkdays,
}

/// The working calendar. Constructed once, treated as a shared constant.
#[derive(Debug, Clone)]
pub struct CalendarPolicy {
    work: MinuteWindow,
    lunch: MinuteWindow,
    workdays: [bool; 7],
    timezone: Tz,
}

impl CalendarPolicy {
    pub fn new(
        work: MinuteWindow,
        lunch: MinuteWindow,
        workdays: &[Weekday],
        timezone: Tz,
    ) -> Result<Self, PolicyError> {
        if !windows_ordered(work.start, lunch.start, lunch.end, work.end) {
            return Err(PolicyError::WindowsOutOfOrder {
                work_start: work.start,
                work_end: work.end,
                lunch_start: lunch.start,
                lunch_end: lunch.end,
            });
        }
        if workdays.is_empty() {
            return Err(PolicyError::NoWorkdays);
        }

        let mut set = [false; 7];
        for weekday in workdays {
            set[weekday.num_days_from_monday() as usize] = true;
        }

        Ok(Self {
            work,
            lunch,
            workdays: set,
            timezone,
        })
    }

    /// The production calendar: 08:00-17:00 with a 12:00-13:00 lunch gap,
    /// Monday through Friday, Bogota time (fixed UTC-5, no DST).
    pub fn bogota() -> Self {
        Self::new(
            MinuteWindow::new(8 * MINUTES_IN_HOUR, 17 * MINUTES_IN_HOUR),
            MinuteWindow::new(12 * MINUTES_IN_HOUR, 13 * MINUTES_IN_HOUR),
            &[
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            chrono_tz::America::Bogota,
        )
        .expect("default calendar satisfies the window invariant")
    }

    pub fn work(&self) -> MinuteWindow {
        self.work
    }

    pub fn lunch(&self) -> MinuteWindow {
        self.lunch
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn is_workday(&self, weekday: Weekday) -> bool {
        self.workdays[weekday.num_days_from_monday() as usize]
    }

    /// Working minutes a full business day provides.
    pub fn minutes_per_business_day(&self) -> u32 {
        self.work.len() - self.lunch.len()
    }

    /// Length of the pre-lunch block.
    pub fn morning_minutes(&self) -> u32 {
        self.lunch.start - self.work.start
    }

    /// Length of the post-lunch block.
    pub fn afternoon_minutes(&self) -> u32 {
        self.work.end - self.lunch.end
    }

    /// Working minutes from `minute` to the next boundary: the lunch start
    /// when before lunch, the work end otherwise. `minute` must lie inside
    /// the work window and outside the lunch window.
    pub fn minutes_to_boundary(&self, minute: u32) -> u32 {
        if minute < self.lunch.start {
            self.lunch.start - minute
        } else {
            self.work.end - minute
        }
    }
}

/// The window-ordering invariant as a standalone predicate.
pub fn windows_ordered(work_start: u32, lunch_start: u32, lunch_end: u32, work_end: u32) -> bool {
    work_start < lunch_start && lunch_start < lunch_end && lunch_end < work_end && work_end <= MINUTES_IN_DAY
}

/// Minutes from midnight, ignoring seconds.
pub fn minute_of_day(t: &NaiveDateTime) -> u32 {
    t.hour() * MINUTES_IN_HOUR + t.minute()
}

/// The instant `minute` minutes after midnight on `date`. Total for any
/// minute value; 1440 rolls into the next calendar day.
pub fn at_minute(date: NaiveDate, minute: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + chrono::Duration::minutes(minute as i64)
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn ordered_windows_have_positive_blocks() {
        let work_start: u32 = kani::any();
        let lunch_start: u32 = kani::any();
        let lunch_end: u32 = kani::any();
        let work_end: u32 = kani::any();
        kani::assume(windows_ordered(work_start, lunch_start, lunch_end, work_end));

        kani::assert(lunch_start - work_start > 0, "morning block is non-empty");
        kani::assert(work_end - lunch_end > 0, "afternoon block is non-empty");
        kani::assert(
            (work_end - work_start) > (lunch_end - lunch_start),
            "a business day always provides working minutes",
        );
    }

    #[kani::proof]
    fn boundary_distance_in_range() {
        let work_start: u32 = kani::any();
        let lunch_start: u32 = kani::any();
        let lunch_end: u32 = kani::any();
        let work_end: u32 = kani::any();
        kani::assume(windows_ordered(work_start, lunch_start, lunch_end, work_end));

        let minute: u32 = kani::any();
        kani::assume(minute >= work_start && minute < work_end);
        kani::assume(minute < lunch_start || minute >= lunch_end);

        let distance = if minute < lunch_start {
            lunch_start - minute
        } else {
            work_end - minute
        };
        kani::assert(distance >= 1, "in-window minutes always precede a boundary");
    }
}
