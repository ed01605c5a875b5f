//! Turns a [`DateSelection`] into the ordered list of targets to process.

use crate::error::ApodError;
use crate::types::{DateSelection, Target};
use chrono::{DateTime, Days, NaiveDate, TimeDelta, Utc};

/// Hours the service's publishing calendar lags UTC (US Eastern standard
/// time). During daylight saving this runs one hour behind the real
/// Eastern date, which only ever hides an entry that is not published yet.
const ARCHIVE_UTC_OFFSET_HOURS: i64 = 5;

/// The newest date the archive can have an entry for at `now`.
pub fn archive_date(now: DateTime<Utc>) -> NaiveDate {
    (now - TimeDelta::hours(ARCHIVE_UTC_OFFSET_HOURS)).date_naive()
}

/// [`archive_date`] for the current instant.
pub fn archive_today() -> NaiveDate {
    archive_date(Utc::now())
}

/// Dates the archive can answer for, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveBounds {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

impl ArchiveBounds {
    pub fn new(earliest: NaiveDate, latest: NaiveDate) -> Self {
        Self { earliest, latest }
    }

    fn check(&self, date: NaiveDate) -> Result<(), ApodError> {
        if date < self.earliest {
            return Err(ApodError::InvalidSelection(format!(
                "{} is before the first archive entry ({})",
                date, self.earliest
            )));
        }
        if date > self.latest {
            return Err(ApodError::InvalidSelection(format!(
                "{} is in the future (latest available is {})",
                date, self.latest
            )));
        }
        Ok(())
    }
}

/// Resolves a selection into a non-empty, strictly ascending target list.
///
/// `Latest` and `Random` resolve to a single placeholder target since only
/// the service knows which date they refer to.
pub fn resolve(selection: DateSelection, bounds: ArchiveBounds) -> Result<Vec<Target>, ApodError> {
    let (start, end) = match selection {
        DateSelection::Latest => return Ok(vec![Target::Latest]),
        DateSelection::Random => return Ok(vec![Target::Random]),
        DateSelection::SingleDate(date) => (date, date),
        DateSelection::Range { start, end } => {
            if start > end {
                return Err(ApodError::InvalidSelection(format!(
                    "range start {} is after range end {}",
                    start, end
                )));
            }
            (start, end)
        }
        DateSelection::LastNDays { n, reference } => {
            if n <= 0 {
                return Err(ApodError::InvalidSelection(format!(
                    "last-days count must be positive, got {}",
                    n
                )));
            }
            let start = reference
                .checked_sub_days(Days::new((n - 1) as u64))
                .ok_or_else(|| {
                    ApodError::InvalidSelection(format!("{} days before {} is out of range", n, reference))
                })?;
            (start, reference)
        }
    };

    bounds.check(start)?;
    bounds.check(end)?;

    Ok(start.iter_days().take_while(|d| *d <= end).map(Target::Date).collect())
}
