//! Persian (Jalali) calendar helpers
//!
//! Committee metrics are windowed by Persian year. Conversion goes through
//! ICU4X calendar arithmetic rather than hand-rolled formulas.

use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};
use icu_calendar::persian::Persian;
use icu_calendar::{Date, Iso};

/// Persian year containing the given Gregorian date
pub fn persian_year_of(date: NaiveDate) -> Result<i32> {
    let iso = Date::try_new_iso_date(date.year(), date.month() as u8, date.day() as u8)
        .map_err(|e| Error::InvalidInput(format!("Invalid date {}: {}", date, e)))?;
    Ok(iso.to_calendar(Persian).year().number)
}

/// Inclusive Gregorian bounds of the given Persian year
pub fn persian_year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate)> {
    let first = persian_date(year, 1, 1)?;
    let twelfth = persian_date(year, 12, 1)?;
    let last = persian_date(year, 12, twelfth.days_in_month())?;

    Ok((to_naive(first.to_iso())?, to_naive(last.to_iso())?))
}

/// Gregorian windows for the Persian year containing `as_of` and the year
/// before it, in that order
pub fn committee_year_windows(
    as_of: NaiveDate,
) -> Result<((NaiveDate, NaiveDate), (NaiveDate, NaiveDate))> {
    let year = persian_year_of(as_of)?;
    Ok((persian_year_bounds(year)?, persian_year_bounds(year - 1)?))
}

fn persian_date(year: i32, month: u8, day: u8) -> Result<Date<Persian>> {
    Date::try_new_persian_date(year, month, day).map_err(|e| {
        Error::InvalidInput(format!(
            "Invalid Persian date {}-{}-{}: {}",
            year, month, day, e
        ))
    })
}

fn to_naive(iso: Date<Iso>) -> Result<NaiveDate> {
    let year = iso.year().number;
    let month = iso.month().ordinal;
    let day = iso.day_of_month().0;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        Error::Internal(format!(
            "Calendar conversion out of range: {}-{}-{}",
            year, month, day
        ))
    })
}
