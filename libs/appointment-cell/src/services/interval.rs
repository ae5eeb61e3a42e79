// libs/appointment-cell/src/services/interval.rs
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::SchedulingError;

/// Half-open `[start, end)` span of time. Never empty once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SchedulingError> {
        if end <= start {
            return Err(SchedulingError::InvalidInterval);
        }
        Ok(Self { start, end })
    }

    pub fn starting_at(start: DateTime<Utc>, duration_minutes: i64) -> Result<Self, SchedulingError> {
        if duration_minutes <= 0 {
            return Err(SchedulingError::InvalidInterval);
        }
        let end = Duration::try_minutes(duration_minutes)
            .and_then(|length| start.checked_add_signed(length))
            .ok_or(SchedulingError::InvalidInterval)?;
        Self::new(start, end)
    }

    pub(crate) fn from_trusted(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end);
        Self { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// True iff `self.start < other.end + buffer` and `other.start < self.end + buffer`.
    /// A zero buffer is plain interval overlap; touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeInterval, buffer: Duration) -> bool {
        self.start < saturating_add(other.end, buffer) && other.start < saturating_add(self.end, buffer)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// The interval grown by `amount` on both sides.
    pub fn widened(&self, amount: Duration) -> TimeInterval {
        TimeInterval::from_trusted(saturating_sub(self.start, amount), saturating_add(self.end, amount))
    }
}

pub(crate) fn saturating_add(instant: DateTime<Utc>, amount: Duration) -> DateTime<Utc> {
    instant
        .checked_add_signed(amount)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) fn saturating_sub(instant: DateTime<Utc>, amount: Duration) -> DateTime<Utc> {
    instant
        .checked_sub_signed(amount)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
