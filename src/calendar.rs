//! Month arithmetic shared by the adjustment endpoint and the share calculator.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 9999;

/// A validated calendar month.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct MonthPeriod {
    year: i32,
    month: u32,
}

/// What a member's active days are when no adjustment exists for the month.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveDaysDefault {
    FullMonth,
}

pub const MISSING_ADJUSTMENT_POLICY: ActiveDaysDefault = ActiveDaysDefault::FullMonth;

impl ActiveDaysDefault {
    pub fn active_days(self, period: MonthPeriod) -> u32 {
        match self {
            ActiveDaysDefault::FullMonth => period.days_in_month(),
        }
    }
}

/// Raw `month`/`year` pair as it arrives in a query string or JSON body.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct MonthParams {
    pub month: u32,
    pub year: i32,
}

impl TryFrom<MonthParams> for MonthPeriod {
    type Error = AppError;

    fn try_from(params: MonthParams) -> AppResult<Self> {
        MonthPeriod::new(params.year, params.month)
    }
}

impl MonthPeriod {
    pub fn new(year: i32, month: u32) -> AppResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(AppError::validation(format!(
                "month must be between 1 and 12, got {month}"
            )));
        }
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(AppError::validation(format!(
                "year must be between {MIN_YEAR} and {MAX_YEAR}, got {year}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        // Constructor guarantees a representable date.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day() - Duration::days(1)
    }

    pub fn days_in_month(&self) -> u32 {
        self.last_day().day()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn next(&self) -> MonthPeriod {
        if self.month == 12 {
            MonthPeriod {
                year: self.year + 1,
                month: 1,
            }
        } else {
            MonthPeriod {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Inclusive UTC window from the first instant of the month to its last millisecond.
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        day_window(self.first_day(), self.last_day())
    }
}

/// Inclusive UTC window covering every instant of the given days.
pub fn day_window(first: NaiveDate, last: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN));
    let end = Utc.from_utc_datetime(&(last + Duration::days(1)).and_time(NaiveTime::MIN))
        - Duration::milliseconds(1);
    (start, end)
}
