//! Business-time arithmetic engine
//!
//! Resolves "base instant + N business days + M business hours" against
//! the working calendar and the holiday cache. All business-rule decisions
//! happen on the civil (local) representation; conversion to and from
//! absolute time happens only at the `resolve` boundary.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::debug;

use crate::holidays::HolidayCache;
use crate::policy::{at_minute, minute_of_day, CalendarPolicy, MINUTES_IN_HOUR};

/// Day-only requests above this many days take the week-jumping path.
pub const BULK_DAYS_THRESHOLD: u64 = 50;

/// Upper bound on consecutive calendar days scanned for a business day.
/// Ten years of days; only pathological holiday data gets near it.
const MAX_DAY_SCAN: u32 = 3660;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller-supplied base instant is unusable. Surfaced, never
    /// retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// An iteration bound was exceeded. Signals a malformed policy or
    /// pathological holiday data, not bad caller input; cannot occur
    /// under a valid calendar.
    #[error("internal consistency: {0}")]
    InternalConsistency(String),
}

/// The engine is stateless given its cache reference; concurrent
/// `resolve` calls are independent.
pub struct BusinessTimeEngine {
    policy: CalendarPolicy,
    holidays: Arc<HolidayCache>,
}

impl BusinessTimeEngine {
    pub fn new(policy: CalendarPolicy, holidays: Arc<HolidayCache>) -> Self {
        Self { policy, holidays }
    }

    pub fn policy(&self) -> &CalendarPolicy {
        &self.policy
    }

    /// Parse a caller-supplied base instant (ISO-8601 with offset).
    pub fn parse_base(value: &str) -> Result<DateTime<Utc>, EngineError> {
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| EngineError::InvalidInput(format!("invalid date {:?}: {}", value, e)))
    }

    /// Resolve `base` advanced by `days` business days and `hours`
    /// business hours. `days = hours = 0` returns the business-time
    /// adjusted base.
    pub async fn resolve(
        &self,
        base: DateTime<Utc>,
        days: u64,
        hours: u64,
    ) -> Result<DateTime<Utc>, EngineError> {
        let civil = self.to_civil(base);
        debug!(
            "Resolving {} days + {} hours from {} local",
            days, hours, civil
        );

        let adjusted = self.adjust_to_business_instant(civil).await?;

        let result = if hours == 0 && days > BULK_DAYS_THRESHOLD {
            self.advance_bulk_days(adjusted, days).await?
        } else {
            let per_day = self.policy.minutes_per_business_day() as u64;
            let budget = days * per_day + hours * MINUTES_IN_HOUR as u64;
            self.add_business_minutes(adjusted, budget).await?
        };

        debug!("Resolved to {} local", result);
        self.to_utc(result)
    }

    /// Civil time in the policy timezone, truncated to whole minutes
    /// (business rules are minute-granular).
    fn to_civil(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        let local = self
            .policy
            .timezone()
            .from_utc_datetime(&instant.naive_utc())
            .naive_local();
        at_minute(local.date(), minute_of_day(&local))
    }

    fn to_utc(&self, civil: NaiveDateTime) -> Result<DateTime<Utc>, EngineError> {
        self.policy
            .timezone()
            .from_local_datetime(&civil)
            .single()
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| {
                EngineError::InternalConsistency(format!(
                    "civil time {} is not representable in {}",
                    civil,
                    self.policy.timezone()
                ))
            })
    }

    /// Weekday check first (cheap), then the holiday cache.
    async fn is_business_day(&self, date: NaiveDate) -> bool {
        if !self.policy.is_workday(date.weekday()) {
            return false;
        }
        !self.holidays.is_holiday(date).await
    }

    fn next_day(date: NaiveDate) -> Result<NaiveDate, EngineError> {
        date.succ_opt()
            .ok_or_else(|| EngineError::InternalConsistency("calendar range exhausted".to_string()))
    }

    /// Snap a civil instant forward to the nearest moment at which
    /// business minutes accrue: the work-window start of the next business
    /// day when outside working days or past the window, the window start
    /// when before it, the lunch end when inside lunch. Idempotent.
    pub(crate) async fn adjust_to_business_instant(
        &self,
        mut t: NaiveDateTime,
    ) -> Result<NaiveDateTime, EngineError> {
        let work = self.policy.work();
        let lunch = self.policy.lunch();

        for _ in 0..MAX_DAY_SCAN {
            if !self.is_business_day(t.date()).await {
                t = at_minute(Self::next_day(t.date())?, work.start);
                continue;
            }
            let minute = minute_of_day(&t);
            if minute < work.start {
                return Ok(at_minute(t.date(), work.start));
            }
            if minute >= work.end {
                t = at_minute(Self::next_day(t.date())?, work.start);
                continue;
            }
            if lunch.contains(minute) {
                return Ok(at_minute(t.date(), lunch.end));
            }
            return Ok(t);
        }

        Err(EngineError::InternalConsistency(format!(
            "no business day within {} calendar days",
            MAX_DAY_SCAN
        )))
    }

    /// Uniform additive walk: consume the minute budget block by block,
    /// re-adjusting between blocks so lunch skips and day rollovers are
    /// handled in one place.
    async fn add_business_minutes(
        &self,
        start: NaiveDateTime,
        budget: u64,
    ) -> Result<NaiveDateTime, EngineError> {
        let per_day = self.policy.minutes_per_business_day() as u64;
        // Two blocks per business day plus slack for the partial first
        // day; every iteration consumes at least one minute.
        let max_iterations = 4 * (budget / per_day.max(1) + 2);

        let mut t = start;
        let mut remaining = budget;
        let mut iterations = 0u64;

        while remaining > 0 {
            iterations += 1;
            if iterations > max_iterations {
                return Err(EngineError::InternalConsistency(format!(
                    "minute walk exceeded {} iterations with {} minutes left",
                    max_iterations, remaining
                )));
            }

            t = self.adjust_to_business_instant(t).await?;
            let available = self.policy.minutes_to_boundary(minute_of_day(&t)) as u64;
            let step = available.min(remaining);
            t += Duration::minutes(step as i64);
            remaining -= step;
        }

        Ok(t)
    }

    /// Week-jumping day advance for large day-only budgets. Produces the
    /// same instants as the minute walk: a budget that ends exactly at a
    /// block edge is expressed as that edge (the lunch start or the work
    /// end), never as the next block's opening.
    async fn advance_bulk_days(
        &self,
        start: NaiveDateTime,
        days: u64,
    ) -> Result<NaiveDateTime, EngineError> {
        let work = self.policy.work();
        let lunch = self.policy.lunch();
        let minute = minute_of_day(&start);

        if minute == work.start {
            // A whole-day budget from the window start ends at the work
            // end one business day earlier in the sequence.
            let date = self.advance_business_days(start.date(), days - 1).await?;
            Ok(at_minute(date, work.end))
        } else if minute == lunch.end {
            let date = self.advance_business_days(start.date(), days).await?;
            Ok(at_minute(date, lunch.start))
        } else {
            let date = self.advance_business_days(start.date(), days).await?;
            Ok(at_minute(date, minute))
        }
    }

    /// Advance `days` business days past `from` (itself a business day),
    /// one 7-day span at a time. The per-span business-day count is
    /// recomputed before every jump; holiday clustering makes weeks
    /// non-uniform.
    async fn advance_business_days(
        &self,
        from: NaiveDate,
        days: u64,
    ) -> Result<NaiveDate, EngineError> {
        let mut date = from;
        let mut remaining = days;
        let max_jumps = 2 * days + MAX_DAY_SCAN as u64;
        let mut jumps = 0u64;

        while remaining > 0 {
            jumps += 1;
            if jumps > max_jumps {
                return Err(EngineError::InternalConsistency(format!(
                    "business-day advance exceeded {} spans with {} days left",
                    max_jumps, remaining
                )));
            }

            let in_week = self.business_days_in_span(date, 7).await?;
            if remaining > in_week {
                date += Duration::days(7);
                remaining -= in_week;
            } else {
                // The remainder fits inside the span just counted.
                while remaining > 0 {
                    date = Self::next_day(date)?;
                    if self.is_business_day(date).await {
                        remaining -= 1;
                    }
                }
            }
        }

        Ok(date)
    }

    async fn business_days_in_span(&self, from: NaiveDate, span: u32) -> Result<u64, EngineError> {
        let mut date = from;
        let mut count = 0u64;
        for _ in 0..span {
            date = Self::next_day(date)?;
            if self.is_business_day(date).await {
                count += 1;
            }
        }
        Ok(count)
    }
}
